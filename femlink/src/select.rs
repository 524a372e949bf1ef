//! Transport selection and the uniform operation set
//!
//! Callers talk to a [`Transport`] trait object and never branch on the
//! underlying mechanism. Selection is a local recovery decision made once at
//! session start: probe the fast path, fall back to files, and keep that
//! choice for the life of the session.

use crate::config::{ExchangeConfig, TransportPreference};
use crate::error::{ExchangeError, ExchangeResult};
use crate::file::FileTransport;
use crate::shape::ShapeMetadata;
use crate::shm::ShmTransport;
use std::time::Duration;
use tracing::{debug, info};

/// Which mechanism a session ended up on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTransport {
    /// Shared-memory fast path
    SharedMemory,
    /// File-based fallback
    File,
}

/// Uniform operation set both transports honor
pub trait Transport {
    /// The mechanism behind this session
    fn kind(&self) -> ActiveTransport;

    /// Hand a multi-array exchange to the peer
    fn put_arrays(&mut self, name: &str, arrays: &[Vec<f64>], dims: &[u32]) -> ExchangeResult<()>;

    /// Collect a multi-array exchange from the peer
    ///
    /// The timeout only applies to transports with a hand-off wait; the file
    /// transport reads synchronously and ignores it.
    fn take_arrays(
        &mut self,
        name: &str,
        timeout: Duration,
    ) -> ExchangeResult<(ShapeMetadata, Vec<Vec<f64>>)>;

    /// Collect an exchange using the session's configured wait budget
    fn take_arrays_default(
        &mut self,
        name: &str,
    ) -> ExchangeResult<(ShapeMetadata, Vec<Vec<f64>>)>;

    /// Remove the exchange's OS objects or files; idempotent
    fn teardown_exchange(&mut self, name: &str) -> ExchangeResult<()>;
}

impl Transport for ShmTransport {
    fn kind(&self) -> ActiveTransport {
        ActiveTransport::SharedMemory
    }

    fn put_arrays(&mut self, name: &str, arrays: &[Vec<f64>], dims: &[u32]) -> ExchangeResult<()> {
        self.send_arrays(name, arrays, dims)
    }

    fn take_arrays(
        &mut self,
        name: &str,
        timeout: Duration,
    ) -> ExchangeResult<(ShapeMetadata, Vec<Vec<f64>>)> {
        self.recv_arrays(name, timeout)
    }

    fn take_arrays_default(
        &mut self,
        name: &str,
    ) -> ExchangeResult<(ShapeMetadata, Vec<Vec<f64>>)> {
        self.recv_arrays_default(name)
    }

    fn teardown_exchange(&mut self, name: &str) -> ExchangeResult<()> {
        self.teardown(name)
    }
}

impl Transport for FileTransport {
    fn kind(&self) -> ActiveTransport {
        ActiveTransport::File
    }

    fn put_arrays(&mut self, name: &str, arrays: &[Vec<f64>], dims: &[u32]) -> ExchangeResult<()> {
        self.write_arrays(name, arrays, dims)
    }

    fn take_arrays(
        &mut self,
        name: &str,
        _timeout: Duration,
    ) -> ExchangeResult<(ShapeMetadata, Vec<Vec<f64>>)> {
        self.read_arrays(name)
    }

    fn take_arrays_default(
        &mut self,
        name: &str,
    ) -> ExchangeResult<(ShapeMetadata, Vec<Vec<f64>>)> {
        self.read_arrays(name)
    }

    fn teardown_exchange(&mut self, name: &str) -> ExchangeResult<()> {
        self.teardown(name)
    }
}

/// One-shot transport selection for a session
pub struct TransportSelector;

impl TransportSelector {
    /// Pick the transport for `config`
    ///
    /// `Auto` probes the shared-memory prerequisites and silently falls back
    /// to files; `Shm` fails hard with `TransportUnavailable` instead of
    /// degrading, because the caller asked for the fast path specifically.
    pub fn select(config: &ExchangeConfig) -> ExchangeResult<Box<dyn Transport>> {
        match config.transport {
            TransportPreference::Shm => {
                let transport = ShmTransport::new(config.clone())?;
                Ok(Box::new(transport))
            }
            TransportPreference::File => {
                let transport = FileTransport::new(&config.spool_dir)?;
                Ok(Box::new(transport))
            }
            TransportPreference::Auto => {
                if ShmTransport::available() {
                    info!(session = %config.session_name, "selected shared-memory transport");
                    let transport = ShmTransport::new(config.clone())?;
                    Ok(Box::new(transport))
                } else {
                    debug!(
                        session = %config.session_name,
                        "shared memory unavailable, falling back to files"
                    );
                    let transport = FileTransport::new(&config.spool_dir)?;
                    Ok(Box::new(transport))
                }
            }
        }
    }

    /// Probe result without constructing a transport
    pub fn probe() -> Result<(), ExchangeError> {
        if ShmTransport::available() {
            Ok(())
        } else {
            Err(ExchangeError::TransportUnavailable {
                reason: "shared-memory directory missing or not writable".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_file_transport_is_honored() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ExchangeConfig {
            transport: TransportPreference::File,
            spool_dir: dir.path().to_path_buf(),
            ..ExchangeConfig::default()
        };
        let transport = TransportSelector::select(&config).unwrap();
        assert_eq!(transport.kind(), ActiveTransport::File);
    }

    #[test]
    fn auto_selects_something() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ExchangeConfig {
            namespace: format!("femlink_sel_{}_", std::process::id()),
            spool_dir: dir.path().to_path_buf(),
            ..ExchangeConfig::default()
        };
        // Whichever branch the host supports, selection must succeed.
        let transport = TransportSelector::select(&config).unwrap();
        let _ = transport.kind();
    }

    #[test]
    fn uniform_ops_roundtrip_through_trait_object() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ExchangeConfig {
            transport: TransportPreference::File,
            spool_dir: dir.path().to_path_buf(),
            ..ExchangeConfig::default()
        };
        let mut transport = TransportSelector::select(&config).unwrap();

        let arrays = vec![vec![1.0, 2.0, 3.0]];
        transport.put_arrays("uniform", &arrays, &[3]).unwrap();
        let (_, back) = transport
            .take_arrays("uniform", Duration::from_millis(100))
            .unwrap();
        assert_eq!(back, arrays);

        // The configured-budget variant reads the same exchange.
        let (_, again) = transport.take_arrays_default("uniform").unwrap();
        assert_eq!(again, arrays);

        transport.teardown_exchange("uniform").unwrap();
    }
}
