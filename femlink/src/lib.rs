//! # Femlink Solver Data Exchange
//!
//! A bidirectional data-exchange layer between a numeric host process and an
//! external finite-element solver process. Arrays of floating-point values
//! move through named shared-memory segments with semaphore hand-off, or
//! through a file-based fallback when shared memory is unavailable.
//!
//! ## Features
//!
//! - **Named Segments**: `/dev/shm` backed segments with a fixed-layout
//!   header, addressable by logical name from both processes
//! - **Typed Slots**: offset-addressed scalar, string, and array accessors
//!   with bounds checking on every access
//! - **Shape Metadata**: multi-array exchanges carry count and dimension
//!   information so the reader reconstructs shapes without prior agreement
//! - **Hand-Off Synchronization**: POSIX named semaphores implement a
//!   turn-taking protocol with bounded waits
//! - **Transparent Fallback**: a file transport with identical semantics
//!   when the shared-memory prerequisites are missing
//! - **Session Isolation**: per-instance registries and namespaces let
//!   independent sessions coexist in one process
//!
//! ## Usage
//!
//! ### Host-side exchange
//!
//! ```rust,no_run
//! use femlink::{ExchangeConfig, Transport, TransportSelector};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExchangeConfig::default();
//! let mut transport = TransportSelector::select(&config)?;
//!
//! // Hand the solver three arrays over a 5 x 4 grid
//! let arrays: Vec<Vec<f64>> = vec![vec![0.0; 20]; 3];
//! transport.put_arrays("density", &arrays, &[5, 4])?;
//!
//! // Collect the solver's answer
//! let (shape, results) = transport.take_arrays("gradient", Duration::from_secs(5))?;
//! println!("{} arrays of {} values", shape.num_arrays, shape.elements_per_array);
//!
//! transport.teardown_exchange("density")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Raw segment access
//!
//! ```rust,no_run
//! use femlink::{Segment, layout};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let path = Path::new("/dev/shm/femlink_state");
//! let mut segment = Segment::create_or_attach(path, "state", 4096)?;
//! layout::write_f64(&mut segment, 0, 3.25)?;
//! layout::write_i32(&mut segment, 8, 42)?;
//! assert_eq!(layout::read_f64(&segment, 0)?, 3.25);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, ExchangeError>`:
//!
//! ```rust,no_run
//! use femlink::{ExchangeError, Segment};
//! use std::path::Path;
//!
//! match Segment::attach(Path::new("/dev/shm/femlink_results"), "results") {
//!     Ok(segment) => { /* read it */ }
//!     Err(ExchangeError::NotFound { name }) => {
//!         eprintln!("segment '{}' not created yet - is the solver running?", name);
//!     }
//!     Err(e) => eprintln!("attach failed: {}", e),
//! }
//! ```
//!
//! ## Protocol Notes
//!
//! - All multi-byte values are little-endian
//! - Writer and reader alternate strictly: whoever wrote last waits for the
//!   peer's signal before touching the segment again
//! - Timeouts on the hand-off wait are outcomes, not panics, so a crashed
//!   peer degrades into an error the host can report

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod file;
pub mod gate;
pub mod launch;
pub mod layout;
pub mod platform;
pub mod registry;
pub mod segment;
pub mod select;
pub mod shape;
pub mod shm;

pub use config::{ConfigError, ExchangeConfig, TransportPreference};
pub use error::{ExchangeError, ExchangeResult};
pub use file::FileTransport;
pub use gate::{SyncGate, WaitOutcome};
pub use launch::{CommandLauncher, IdentityPaths, LaunchOutcome, PathTranslator, SolverLauncher};
pub use registry::{SegmentRecord, SegmentRegistry};
pub use segment::{AttachMode, HEADER_SIZE, Segment, SegmentHeader};
pub use select::{ActiveTransport, Transport, TransportSelector};
pub use shape::{ArrayShape, MAX_DIMS, ShapeMetadata};
pub use shm::ShmTransport;

/// Initialize tracing from the `RUST_LOG` environment
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
