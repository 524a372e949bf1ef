//! Array shape descriptors and the multi-array metadata record
//!
//! Flattening is row-major: element `(i0, .., in)` of an array with
//! dimensions `dims` lives at `i0 * dims[1] * .. * dims[n] + .. + in`, so
//! the last index varies fastest. For grid-of-cells exchanges the convention is
//! `dims = [width + 1, height + 1]` (point counts, not cell counts); both
//! sides carry that off-by-one consistently.

use crate::error::{ExchangeError, ExchangeResult};
use serde::{Deserialize, Serialize};

/// Maximum number of dimensions carried in the binary metadata record
pub const MAX_DIMS: usize = 8;

/// Byte length of the encoded [`ShapeMetadata`] record
///
/// `num_arrays`, `elements_per_array`, `ndim`, then `MAX_DIMS` dimension
/// slots, all `u32` little-endian; padded to an 8-byte boundary so the
/// payload that follows stays aligned.
pub const SHAPE_RECORD_LEN: usize = 48;

/// Descriptor for one flat array region: element count and byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayShape {
    /// Number of elements
    pub count: usize,
    /// Byte offset of the first element inside the payload region
    pub offset: usize,
}

impl ArrayShape {
    /// New shape descriptor
    pub fn new(count: usize, offset: usize) -> Self {
        Self { count, offset }
    }

    /// Byte length of the region when elements are `f64`
    pub fn byte_len_f64(&self) -> usize {
        self.count.saturating_mul(8)
    }
}

/// Descriptor for reconstructing one or more flat arrays into N-D form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeMetadata {
    /// Number of arrays in the exchange
    pub num_arrays: u32,
    /// Element count of each array
    pub elements_per_array: u32,
    /// Ordered dimension sizes (row-major)
    pub dims: Vec<u32>,
}

impl ShapeMetadata {
    /// New metadata record
    pub fn new(num_arrays: u32, elements_per_array: u32, dims: Vec<u32>) -> Self {
        Self {
            num_arrays,
            elements_per_array,
            dims,
        }
    }

    /// Metadata for a single flat 1-D array of `n` elements
    pub fn flat(n: usize) -> Self {
        Self {
            num_arrays: 1,
            elements_per_array: n as u32,
            dims: vec![n as u32],
        }
    }

    /// Total element count across all arrays
    pub fn total_elements(&self) -> usize {
        self.num_arrays as usize * self.elements_per_array as usize
    }

    /// Row-major flat index of `indices` within `dims`
    ///
    /// Panics if `indices.len() != dims.len()` (caller contract).
    pub fn flat_index(dims: &[u32], indices: &[usize]) -> usize {
        assert_eq!(
            indices.len(),
            dims.len(),
            "index rank must match dimension rank"
        );
        let mut index = 0usize;
        for (i, &idx) in indices.iter().enumerate() {
            index = index * dims[i] as usize + idx;
        }
        index
    }

    /// Split a flat buffer into `num_arrays` arrays of `elements_per_array`
    ///
    /// Fails with `TypeMismatch` when the buffer length disagrees with the
    /// record.
    pub fn split(&self, flat: &[f64]) -> ExchangeResult<Vec<Vec<f64>>> {
        let expected = self.total_elements();
        if flat.len() != expected {
            return Err(ExchangeError::TypeMismatch {
                expected: format!(
                    "{} x {} = {} elements",
                    self.num_arrays, self.elements_per_array, expected
                ),
                found: format!("{} elements", flat.len()),
            });
        }
        let per = self.elements_per_array as usize;
        if per == 0 {
            // chunks() over an empty slice yields nothing; the record still
            // promises num_arrays arrays.
            return Ok(vec![Vec::new(); self.num_arrays as usize]);
        }
        Ok(flat.chunks(per).map(|c| c.to_vec()).collect())
    }

    /// Validate internal consistency
    ///
    /// The dimension product must equal `elements_per_array` when dimensions
    /// are present.
    pub fn validate(&self) -> ExchangeResult<()> {
        if !self.dims.is_empty() {
            let product: u64 = self.dims.iter().map(|&d| d as u64).product();
            if product != self.elements_per_array as u64 {
                return Err(ExchangeError::TypeMismatch {
                    expected: format!("{} elements per array", self.elements_per_array),
                    found: format!("dims {:?} (product {})", self.dims, product),
                });
            }
        }
        Ok(())
    }

    /// Encode as the fixed-width binary record placed ahead of the payload
    pub fn encode(&self) -> ExchangeResult<[u8; SHAPE_RECORD_LEN]> {
        if self.dims.len() > MAX_DIMS {
            return Err(ExchangeError::MalformedMetadata {
                path: "<shape record>".to_string(),
                reason: format!("{} dimensions exceed the {} slot limit", self.dims.len(), MAX_DIMS),
            });
        }
        let mut buf = [0u8; SHAPE_RECORD_LEN];
        buf[0..4].copy_from_slice(&self.num_arrays.to_le_bytes());
        buf[4..8].copy_from_slice(&self.elements_per_array.to_le_bytes());
        buf[8..12].copy_from_slice(&(self.dims.len() as u32).to_le_bytes());
        for (i, &dim) in self.dims.iter().enumerate() {
            let at = 12 + i * 4;
            buf[at..at + 4].copy_from_slice(&dim.to_le_bytes());
        }
        Ok(buf)
    }

    /// Decode the fixed-width binary record
    pub fn decode(buf: &[u8]) -> ExchangeResult<Self> {
        if buf.len() < SHAPE_RECORD_LEN {
            return Err(ExchangeError::MalformedMetadata {
                path: "<shape record>".to_string(),
                reason: format!("record truncated at {} bytes", buf.len()),
            });
        }
        let num_arrays = u32::from_le_bytes(buf[0..4].try_into().unwrap_or([0; 4]));
        let elements_per_array = u32::from_le_bytes(buf[4..8].try_into().unwrap_or([0; 4]));
        let ndim = u32::from_le_bytes(buf[8..12].try_into().unwrap_or([0; 4])) as usize;
        if ndim > MAX_DIMS {
            return Err(ExchangeError::MalformedMetadata {
                path: "<shape record>".to_string(),
                reason: format!("dimension count {} exceeds the {} slot limit", ndim, MAX_DIMS),
            });
        }
        let mut dims = Vec::with_capacity(ndim);
        for i in 0..ndim {
            let at = 12 + i * 4;
            dims.push(u32::from_le_bytes(buf[at..at + 4].try_into().unwrap_or([0; 4])));
        }
        Ok(Self {
            num_arrays,
            elements_per_array,
            dims,
        })
    }

    /// Row and column counts for the common 2-D grid case
    ///
    /// The metadata records dimensions in writer order `nx ny` (grid points
    /// per axis, i.e. cells + 1); row-major reconstruction therefore uses
    /// `ny` rows of `nx` columns.
    pub fn grid_rows_cols(&self) -> Option<(usize, usize)> {
        if self.dims.len() == 2 {
            Some((self.dims[1] as usize, self.dims[0] as usize))
        } else {
            None
        }
    }

    /// Render the two-line text form used by the file transport
    ///
    /// Line 1: `num_arrays elements_per_array`; line 2: dimension sizes.
    pub fn to_metadata_text(&self) -> String {
        let dims = self
            .dims
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {}\n{}\n", self.num_arrays, self.elements_per_array, dims)
    }

    /// Parse the two-line text form
    pub fn parse_metadata_text(text: &str, origin: &str) -> ExchangeResult<Self> {
        let malformed = |reason: String| ExchangeError::MalformedMetadata {
            path: origin.to_string(),
            reason,
        };

        let mut lines = text.lines();
        let first = lines
            .next()
            .ok_or_else(|| malformed("empty metadata".to_string()))?;
        let mut fields = first.split_whitespace();
        let num_arrays: u32 = fields
            .next()
            .ok_or_else(|| malformed("missing array count".to_string()))?
            .parse()
            .map_err(|e| malformed(format!("bad array count: {}", e)))?;
        let elements_per_array: u32 = fields
            .next()
            .ok_or_else(|| malformed("missing element count".to_string()))?
            .parse()
            .map_err(|e| malformed(format!("bad element count: {}", e)))?;

        let dims = match lines.next() {
            Some(line) => line
                .split_whitespace()
                .map(|f| {
                    f.parse::<u32>()
                        .map_err(|e| malformed(format!("bad dimension: {}", e)))
                })
                .collect::<ExchangeResult<Vec<u32>>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            num_arrays,
            elements_per_array,
            dims,
        })
    }
}
