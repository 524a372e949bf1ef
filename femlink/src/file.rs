//! File-based fallback transport
//!
//! Mirrors the logical operations of the shared-memory path with two plain
//! files per exchange: a data file (one value per line, 15-significant-digit
//! precision) and an optional metadata file (`num_arrays elements_per_array`
//! on the first line, dimension sizes on the second). A missing metadata
//! file means "single flat 1-D array" for backward compatibility.
//!
//! No synchronization primitive is involved: the solver process is invoked
//! run-to-completion between the write and the read, so the files are never
//! accessed concurrently.

use crate::error::{ExchangeError, ExchangeResult};
use crate::shape::ShapeMetadata;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Write values one per line at 15-significant-digit precision
pub fn write_values(path: &Path, values: &[f64]) -> ExchangeResult<()> {
    let mut out = String::with_capacity(values.len() * 24);
    for value in values {
        // {:.15e} carries 16 significant digits, above the 15-digit
        // precision floor of the exchange format.
        out.push_str(&format!("{:.15e}\n", value));
    }
    let mut file = std::fs::File::create(path)?;
    file.write_all(out.as_bytes())?;
    Ok(())
}

/// Read whitespace- or newline-separated values
pub fn read_values(path: &Path) -> ExchangeResult<Vec<f64>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ExchangeError::NotFound {
                name: path.display().to_string(),
            }
        } else {
            e.into()
        }
    })?;
    text.split_whitespace()
        .map(|field| {
            field.parse::<f64>().map_err(|e| ExchangeError::MalformedMetadata {
                path: path.display().to_string(),
                reason: format!("bad value '{}': {}", field, e),
            })
        })
        .collect()
}

/// File transport rooted at a spool directory
///
/// Each exchange name maps to `{name}.dat` and `{name}.meta` inside the
/// spool directory, so both processes derive the paths independently.
pub struct FileTransport {
    spool_dir: PathBuf,
}

impl FileTransport {
    /// New transport writing under `spool_dir`
    pub fn new(spool_dir: &Path) -> ExchangeResult<Self> {
        std::fs::create_dir_all(spool_dir)?;
        info!(spool = %spool_dir.display(), "file transport ready");
        Ok(Self {
            spool_dir: spool_dir.to_path_buf(),
        })
    }

    /// Data file path for an exchange name
    pub fn data_path(&self, name: &str) -> PathBuf {
        self.spool_dir.join(format!("{}.dat", name))
    }

    /// Metadata file path for an exchange name
    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.spool_dir.join(format!("{}.meta", name))
    }

    /// Write a multi-array exchange: concatenated data plus metadata file
    ///
    /// A single 1-D array with no explicit dimensions skips the metadata
    /// file entirely, matching what a metadata-unaware reader expects.
    pub fn write_arrays(&self, name: &str, arrays: &[Vec<f64>], dims: &[u32]) -> ExchangeResult<()> {
        let elements_per_array = arrays.first().map(|a| a.len()).unwrap_or(0);
        for array in arrays {
            if array.len() != elements_per_array {
                return Err(ExchangeError::TypeMismatch {
                    expected: format!("{} elements in every array", elements_per_array),
                    found: format!("{} elements", array.len()),
                });
            }
        }
        let meta = ShapeMetadata::new(arrays.len() as u32, elements_per_array as u32, dims.to_vec());
        meta.validate()?;

        let flat: Vec<f64> = arrays.iter().flatten().copied().collect();
        write_values(&self.data_path(name), &flat)?;

        let needs_metadata = arrays.len() > 1 || dims.len() > 1;
        if needs_metadata {
            std::fs::write(self.metadata_path(name), meta.to_metadata_text())?;
        } else {
            // Stale metadata from an earlier multi-array run must not
            // reshape this flat exchange.
            let _ = std::fs::remove_file(self.metadata_path(name));
        }
        debug!(exchange = name, values = flat.len(), "arrays spooled");
        Ok(())
    }

    /// Read an exchange, reconstructing shape from the metadata file
    ///
    /// Absent metadata means one flat 1-D array.
    pub fn read_arrays(&self, name: &str) -> ExchangeResult<(ShapeMetadata, Vec<Vec<f64>>)> {
        let flat = read_values(&self.data_path(name))?;

        let metadata_path = self.metadata_path(name);
        let meta = if metadata_path.exists() {
            let text = std::fs::read_to_string(&metadata_path)?;
            let meta =
                ShapeMetadata::parse_metadata_text(&text, &metadata_path.display().to_string())?;
            meta.validate()?;
            meta
        } else {
            ShapeMetadata::flat(flat.len())
        };

        let arrays = meta.split(&flat)?;
        debug!(exchange = name, arrays = arrays.len(), "arrays read back");
        Ok((meta, arrays))
    }

    /// Remove the data and metadata files for an exchange; idempotent
    pub fn teardown(&self, name: &str) -> ExchangeResult<()> {
        for path in [self.data_path(name), self.metadata_path(name)] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
