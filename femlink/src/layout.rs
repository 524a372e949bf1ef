//! Typed, bounds-checked accessors over a segment payload
//!
//! All values are little-endian. Offsets are payload-relative (the header
//! region is not addressable through these accessors). Readers and writers
//! agree on offsets and types out of band; re-reading a region under a
//! different type is permitted and yields an undefined numeric result, not a
//! crash: every accessor validates bounds before touching memory.

use crate::error::{ExchangeError, ExchangeResult};
use crate::segment::Segment;
use crate::shape::ArrayShape;

/// Write an `i32` at a byte offset
pub fn write_i32(seg: &mut Segment, offset: usize, value: i32) -> ExchangeResult<()> {
    seg.check_bounds(offset, 4)?;
    seg.data_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Read an `i32` from a byte offset
pub fn read_i32(seg: &Segment, offset: usize) -> ExchangeResult<i32> {
    seg.check_bounds(offset, 4)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&seg.data()[offset..offset + 4]);
    Ok(i32::from_le_bytes(buf))
}

/// Write an `f64` at a byte offset
pub fn write_f64(seg: &mut Segment, offset: usize, value: f64) -> ExchangeResult<()> {
    seg.check_bounds(offset, 8)?;
    seg.data_mut()[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Read an `f64` from a byte offset
pub fn read_f64(seg: &Segment, offset: usize) -> ExchangeResult<f64> {
    seg.check_bounds(offset, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&seg.data()[offset..offset + 8]);
    Ok(f64::from_le_bytes(buf))
}

/// Write a length-prefixed UTF-8 string at a byte offset
///
/// Layout: `u32` byte count followed by the raw bytes. The encoding is not
/// self-terminating; readers rely on the prefix.
pub fn write_str(seg: &mut Segment, offset: usize, value: &str) -> ExchangeResult<()> {
    let bytes = value.as_bytes();
    let len = u32::try_from(bytes.len()).map_err(|_| ExchangeError::InvalidSize {
        size: bytes.len(),
    })?;
    seg.check_bounds(offset, 4 + bytes.len())?;
    let data = seg.data_mut();
    data[offset..offset + 4].copy_from_slice(&len.to_le_bytes());
    data[offset + 4..offset + 4 + bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Read a length-prefixed UTF-8 string from a byte offset
pub fn read_str(seg: &Segment, offset: usize) -> ExchangeResult<String> {
    seg.check_bounds(offset, 4)?;
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&seg.data()[offset..offset + 4]);
    let len = u32::from_le_bytes(len_buf) as usize;
    seg.check_bounds(offset + 4, len)?;
    let bytes = seg.data()[offset + 4..offset + 4 + len].to_vec();
    Ok(String::from_utf8(bytes)?)
}

/// Write a flat `f64` array described by `shape`
///
/// `data.len()` must equal `shape.count`.
pub fn write_f64_array(seg: &mut Segment, shape: ArrayShape, data: &[f64]) -> ExchangeResult<()> {
    if data.len() != shape.count {
        return Err(ExchangeError::TypeMismatch {
            expected: format!("{} elements", shape.count),
            found: format!("{} elements", data.len()),
        });
    }
    seg.check_bounds(shape.offset, shape.count.saturating_mul(8))?;
    let dst = seg.data_mut();
    for (i, value) in data.iter().enumerate() {
        let at = shape.offset + i * 8;
        dst[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }
    Ok(())
}

/// Read a flat `f64` array described by `shape`
pub fn read_f64_array(seg: &Segment, shape: ArrayShape) -> ExchangeResult<Vec<f64>> {
    seg.check_bounds(shape.offset, shape.count.saturating_mul(8))?;
    let src = seg.data();
    let mut out = Vec::with_capacity(shape.count);
    for i in 0..shape.count {
        let at = shape.offset + i * 8;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&src[at..at + 8]);
        out.push(f64::from_le_bytes(buf));
    }
    Ok(out)
}

/// Write a flat `i32` array described by `shape`
pub fn write_i32_array(seg: &mut Segment, shape: ArrayShape, data: &[i32]) -> ExchangeResult<()> {
    if data.len() != shape.count {
        return Err(ExchangeError::TypeMismatch {
            expected: format!("{} elements", shape.count),
            found: format!("{} elements", data.len()),
        });
    }
    seg.check_bounds(shape.offset, shape.count.saturating_mul(4))?;
    let dst = seg.data_mut();
    for (i, value) in data.iter().enumerate() {
        let at = shape.offset + i * 4;
        dst[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
    Ok(())
}

/// Read a flat `i32` array described by `shape`
pub fn read_i32_array(seg: &Segment, shape: ArrayShape) -> ExchangeResult<Vec<i32>> {
    seg.check_bounds(shape.offset, shape.count.saturating_mul(4))?;
    let src = seg.data();
    let mut out = Vec::with_capacity(shape.count);
    for i in 0..shape.count {
        let at = shape.offset + i * 4;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&src[at..at + 4]);
        out.push(i32::from_le_bytes(buf));
    }
    Ok(out)
}

/// Write raw bytes at a byte offset
pub fn write_bytes(seg: &mut Segment, offset: usize, bytes: &[u8]) -> ExchangeResult<()> {
    seg.check_bounds(offset, bytes.len())?;
    seg.data_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Read `len` raw bytes from a byte offset
pub fn read_bytes(seg: &Segment, offset: usize, len: usize) -> ExchangeResult<Vec<u8>> {
    seg.check_bounds(offset, len)?;
    Ok(seg.data()[offset..offset + len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::segment_path;
    use proptest::prelude::*;

    fn scratch(name: &str, data_size: usize) -> (Segment, std::path::PathBuf) {
        let unique = format!("{}_{}", name, std::process::id());
        let path = segment_path("femlink_test_", &unique);
        let _ = std::fs::remove_file(&path);
        let seg = Segment::create_or_attach(&path, &unique, data_size).unwrap();
        (seg, path)
    }

    #[test]
    fn scalar_roundtrip() {
        let (mut seg, path) = scratch("codec_scalar", 256);

        write_i32(&mut seg, 0, -42).unwrap();
        write_f64(&mut seg, 8, 3.141592653589793).unwrap();

        assert_eq!(read_i32(&seg, 0).unwrap(), -42);
        assert_eq!(read_f64(&seg, 8).unwrap(), 3.141592653589793);

        Segment::unlink(&path).unwrap();
    }

    #[test]
    fn string_roundtrip() {
        let (mut seg, path) = scratch("codec_str", 256);

        write_str(&mut seg, 16, "solver ready").unwrap();
        assert_eq!(read_str(&seg, 16).unwrap(), "solver ready");

        // Empty string is valid too
        write_str(&mut seg, 64, "").unwrap();
        assert_eq!(read_str(&seg, 64).unwrap(), "");

        Segment::unlink(&path).unwrap();
    }

    #[test]
    fn array_roundtrip() {
        let (mut seg, path) = scratch("codec_array", 1024);

        let values = vec![1.0, 2.5, -3.75, 1e-300, 1e300];
        let shape = ArrayShape::new(values.len(), 0);
        write_f64_array(&mut seg, shape, &values).unwrap();
        assert_eq!(read_f64_array(&seg, shape).unwrap(), values);

        let ints = vec![i32::MIN, -1, 0, 1, i32::MAX];
        let shape = ArrayShape::new(ints.len(), 512);
        write_i32_array(&mut seg, shape, &ints).unwrap();
        assert_eq!(read_i32_array(&seg, shape).unwrap(), ints);

        Segment::unlink(&path).unwrap();
    }

    #[test]
    fn every_accessor_enforces_bounds() {
        let (mut seg, path) = scratch("codec_bounds", 64);

        assert!(matches!(
            write_i32(&mut seg, 61, 1),
            Err(ExchangeError::OutOfBounds { .. })
        ));
        assert!(matches!(
            write_f64(&mut seg, 60, 1.0),
            Err(ExchangeError::OutOfBounds { .. })
        ));
        assert!(matches!(
            write_str(&mut seg, 60, "too long"),
            Err(ExchangeError::OutOfBounds { .. })
        ));
        assert!(matches!(
            write_f64_array(&mut seg, ArrayShape::new(9, 0), &[0.0; 9]),
            Err(ExchangeError::OutOfBounds { .. })
        ));
        assert!(matches!(
            read_f64(&seg, 64),
            Err(ExchangeError::OutOfBounds { .. })
        ));

        // Failed writes must leave memory untouched
        assert_eq!(seg.data(), &[0u8; 64][..]);

        Segment::unlink(&path).unwrap();
    }

    #[test]
    fn array_length_must_match_shape() {
        let (mut seg, path) = scratch("codec_mismatch", 256);

        let result = write_f64_array(&mut seg, ArrayShape::new(4, 0), &[1.0, 2.0]);
        assert!(matches!(result, Err(ExchangeError::TypeMismatch { .. })));

        Segment::unlink(&path).unwrap();
    }

    proptest! {
        #[test]
        fn f64_roundtrip_preserves_value(value in -1.0e300f64..1.0e300f64, offset in 0usize..56) {
            let unique = format!("codec_prop_{}_{}", std::process::id(), offset);
            let path = segment_path("femlink_test_", &unique);
            let _ = std::fs::remove_file(&path);
            let mut seg = Segment::create_or_attach(&path, &unique, 64).unwrap();

            write_f64(&mut seg, offset, value).unwrap();
            prop_assert_eq!(read_f64(&seg, offset).unwrap(), value);

            Segment::unlink(&path).unwrap();
        }
    }
}
