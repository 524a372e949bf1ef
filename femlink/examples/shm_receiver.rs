//! Solver-side receiver example: take arrays, double them, send them back
//!
//! Run `shm_sender` first, then this in a second terminal.

use femlink::{ExchangeConfig, ExchangeResult, ShmTransport};
use std::time::Duration;

fn main() -> ExchangeResult<()> {
    femlink::init_tracing();

    println!("Femlink Shared Memory Receiver");
    println!("==============================");

    let config = ExchangeConfig::default();
    let mut transport = ShmTransport::new(config)?;

    println!("Waiting for the host's arrays...");
    let (shape, arrays) = transport.recv_arrays("density", Duration::from_secs(60))?;
    println!(
        "✓ Received {} arrays of {} values",
        shape.num_arrays, shape.elements_per_array
    );
    if let Some((rows, cols)) = shape.grid_rows_cols() {
        println!("  Grid layout: {} rows x {} cols", rows, cols);
    }

    // Stand-in for the actual solve
    let doubled: Vec<Vec<f64>> = arrays
        .iter()
        .map(|a| a.iter().map(|v| v * 2.0).collect())
        .collect();

    println!("Sending results back...");
    transport.send_arrays("gradient", &doubled, &shape.dims)?;
    println!("✓ Done");
    Ok(())
}
