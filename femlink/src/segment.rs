//! Segment lifecycle and the self-describing header region
//!
//! A segment is a named, fixed-size mapped region. Its first
//! [`HEADER_SIZE`] bytes hold a [`SegmentHeader`] so a second attach that
//! does not know the size in advance can map just the header, read the real
//! size, and re-attach (see [`Segment::attach_header`]).
//!
//! Either side of the exchange may run first, so the central constructor is
//! [`Segment::create_or_attach`]: whichever process arrives first creates the
//! object, the other attaches to it.

use crate::error::{ExchangeError, ExchangeResult};
use crate::platform::{attach_mmap, attach_mmap_len, create_mmap, object_exists};
use memmap2::MmapMut;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Byte length of the reserved header region at the start of every segment
pub const HEADER_SIZE: usize = 128;

/// Fixed width of the header type tag field
pub const TYPE_TAG_LEN: usize = 32;

/// Fixed width of the header semaphore name field
pub const SEM_NAME_LEN: usize = 64;

/// Magic word validating that a mapped file is one of our segments
pub const SEGMENT_MAGIC: u64 = 0x464D_4C4E_4B53_4547; // "FMLNKSEG"

/// Self-describing header written at offset 0 of every segment
///
/// Encoded little-endian field by field rather than transmuted, so no raw
/// pointer to the mapping escapes the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Magic word, [`SEGMENT_MAGIC`]
    pub magic: u64,
    /// Total mapped size in bytes, header included
    pub total_byte_size: u64,
    /// Number of payload elements (meaning depends on the type tag)
    pub element_count: u64,
    /// NUL-padded type tag, e.g. `"double_array"`
    pub type_tag: [u8; TYPE_TAG_LEN],
    /// NUL-padded name of the paired semaphore
    pub semaphore_name: [u8; SEM_NAME_LEN],
}

impl SegmentHeader {
    /// Create a header for a segment with `data_size` payload bytes
    pub fn new(data_size: usize, element_count: u64, type_tag: &str, sem_name: &str) -> Self {
        let mut header = Self {
            magic: SEGMENT_MAGIC,
            total_byte_size: (HEADER_SIZE + data_size) as u64,
            element_count,
            type_tag: [0; TYPE_TAG_LEN],
            semaphore_name: [0; SEM_NAME_LEN],
        };
        header.set_type_tag(type_tag);
        header.set_semaphore_name(sem_name);
        header
    }

    /// Set the type tag, truncating to the fixed field width
    pub fn set_type_tag(&mut self, tag: &str) {
        self.type_tag = [0; TYPE_TAG_LEN];
        let bytes = tag.as_bytes();
        let n = bytes.len().min(TYPE_TAG_LEN - 1);
        self.type_tag[..n].copy_from_slice(&bytes[..n]);
    }

    /// Set the paired semaphore name, truncating to the fixed field width
    pub fn set_semaphore_name(&mut self, name: &str) {
        self.semaphore_name = [0; SEM_NAME_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(SEM_NAME_LEN - 1);
        self.semaphore_name[..n].copy_from_slice(&bytes[..n]);
    }

    /// Type tag with NUL padding stripped
    pub fn type_tag_str(&self) -> &str {
        Self::fixed_str(&self.type_tag)
    }

    /// Semaphore name with NUL padding stripped
    pub fn semaphore_name_str(&self) -> &str {
        Self::fixed_str(&self.semaphore_name)
    }

    /// Payload capacity in bytes
    pub fn data_size(&self) -> usize {
        (self.total_byte_size as usize).saturating_sub(HEADER_SIZE)
    }

    fn fixed_str(field: &[u8]) -> &str {
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        std::str::from_utf8(&field[..end]).unwrap_or("")
    }

    /// Encode into the reserved header region
    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.magic.to_le_bytes());
        buf[8..16].copy_from_slice(&self.total_byte_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.element_count.to_le_bytes());
        buf[24..24 + TYPE_TAG_LEN].copy_from_slice(&self.type_tag);
        buf[56..56 + SEM_NAME_LEN].copy_from_slice(&self.semaphore_name);
        // Remaining header bytes stay zero (reserved).
    }

    /// Decode from a header region, validating the magic word
    pub fn decode(buf: &[u8], name: &str) -> ExchangeResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ExchangeError::InvalidSize { size: buf.len() });
        }
        let magic = u64::from_le_bytes(buf[0..8].try_into().unwrap_or([0; 8]));
        if magic != SEGMENT_MAGIC {
            return Err(ExchangeError::TypeMismatch {
                expected: format!("segment magic {:#x}", SEGMENT_MAGIC),
                found: format!("{:#x} in '{}'", magic, name),
            });
        }
        let total_byte_size = u64::from_le_bytes(buf[8..16].try_into().unwrap_or([0; 8]));
        let element_count = u64::from_le_bytes(buf[16..24].try_into().unwrap_or([0; 8]));
        let mut type_tag = [0u8; TYPE_TAG_LEN];
        type_tag.copy_from_slice(&buf[24..24 + TYPE_TAG_LEN]);
        let mut semaphore_name = [0u8; SEM_NAME_LEN];
        semaphore_name.copy_from_slice(&buf[56..56 + SEM_NAME_LEN]);

        Ok(Self {
            magic,
            total_byte_size,
            element_count,
            type_tag,
            semaphore_name,
        })
    }
}

/// Whether this handle created the underlying object or joined an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    /// This handle created and zero-initialized the object
    Created,
    /// This handle attached to an object created elsewhere
    Attached,
}

/// Handle to a named, fixed-size shared memory segment
///
/// The mapping is owned exclusively by this handle; `detach` drops it and no
/// aliasing pointer survives. Size is fixed at creation.
pub struct Segment {
    name: String,
    path: PathBuf,
    data_size: usize,
    mode: AttachMode,
    map: Option<MmapMut>,
}

impl Segment {
    /// Create the segment if absent, otherwise attach to the existing one
    ///
    /// On creation the payload region holds exactly `data_size` zeroed bytes
    /// and a fresh header is written. On attach the existing object is mapped
    /// at its real size regardless of `data_size`; the caller verifies
    /// expectations against the header.
    pub fn create_or_attach(path: &Path, name: &str, data_size: usize) -> ExchangeResult<Self> {
        if data_size == 0 {
            return Err(ExchangeError::InvalidSize { size: data_size });
        }
        if object_exists(path) {
            debug!(segment = name, "attaching to existing segment");
            return Self::attach(path, name);
        }

        let total = HEADER_SIZE + data_size;
        let mut map = create_mmap(path, total).map_err(|e| ExchangeError::CreateFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let header = SegmentHeader::new(data_size, 0, "", "");
        header.encode(&mut map[..HEADER_SIZE]);
        debug!(segment = name, total, "created segment");

        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            data_size,
            mode: AttachMode::Created,
            map: Some(map),
        })
    }

    /// Attach to an existing segment; fails with `NotFound` if absent
    pub fn attach(path: &Path, name: &str) -> ExchangeResult<Self> {
        if !object_exists(path) {
            return Err(ExchangeError::NotFound {
                name: name.to_string(),
            });
        }
        let map = attach_mmap(path)?;
        if map.len() < HEADER_SIZE {
            return Err(ExchangeError::InvalidSize { size: map.len() });
        }
        SegmentHeader::decode(&map[..HEADER_SIZE], name)?;
        let data_size = map.len() - HEADER_SIZE;
        debug!(segment = name, data_size, "attached segment");

        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            data_size,
            mode: AttachMode::Attached,
            map: Some(map),
        })
    }

    /// Read the header of an existing segment without mapping the payload
    ///
    /// This is the first half of the attach-with-unknown-size protocol: the
    /// caller inspects `total_byte_size` and then calls [`Segment::attach`].
    pub fn attach_header(path: &Path, name: &str) -> ExchangeResult<SegmentHeader> {
        if !object_exists(path) {
            return Err(ExchangeError::NotFound {
                name: name.to_string(),
            });
        }
        let map = attach_mmap_len(path, HEADER_SIZE)?;
        SegmentHeader::decode(&map[..HEADER_SIZE], name)
    }

    /// Unmap the region; idempotent
    pub fn detach(&mut self) {
        if self.map.take().is_some() {
            debug!(segment = %self.name, "detached segment");
        }
    }

    /// Remove the OS-level object so no further attach can succeed
    ///
    /// Existing mappings remain valid until detached. Removing an
    /// already-removed name is a no-op.
    pub fn unlink(path: &Path) -> ExchangeResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Segment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing object path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Payload capacity in bytes (header excluded)
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Whether this handle created the object
    pub fn mode(&self) -> AttachMode {
        self.mode
    }

    /// Whether the region is currently mapped
    pub fn is_attached(&self) -> bool {
        self.map.is_some()
    }

    /// Decode the current header
    pub fn header(&self) -> ExchangeResult<SegmentHeader> {
        SegmentHeader::decode(&self.map()[..HEADER_SIZE], &self.name)
    }

    /// Overwrite the header region
    pub fn write_header(&mut self, header: &SegmentHeader) {
        let map = self.map_mut();
        header.encode(&mut map[..HEADER_SIZE]);
    }

    /// Validate that `offset + len` stays inside the payload region
    ///
    /// Every typed accessor calls this before touching memory; a violation is
    /// an error, never an access.
    pub fn check_bounds(&self, offset: usize, len: usize) -> ExchangeResult<()> {
        let end = offset.checked_add(len).unwrap_or(usize::MAX);
        if end > self.data_size {
            return Err(ExchangeError::OutOfBounds {
                offset,
                len,
                size: self.data_size,
            });
        }
        Ok(())
    }

    /// Payload region as a slice
    pub fn data(&self) -> &[u8] {
        &self.map()[HEADER_SIZE..]
    }

    /// Payload region as a mutable slice
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.map_mut()[HEADER_SIZE..]
    }

    // Use after detach is a caller contract violation, not a recoverable
    // condition.
    fn map(&self) -> &MmapMut {
        self.map
            .as_ref()
            .unwrap_or_else(|| panic!("segment '{}' used after detach", self.name))
    }

    fn map_mut(&mut self) -> &mut MmapMut {
        let name = self.name.clone();
        self.map
            .as_mut()
            .unwrap_or_else(|| panic!("segment '{}' used after detach", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::segment_path;

    fn unique(name: &str) -> String {
        format!("{}_{}", name, std::process::id())
    }

    #[test]
    fn header_roundtrip() {
        let header = SegmentHeader::new(4096, 512, "double_array", "/femlink_sem_x");
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf);
        let decoded = SegmentHeader::decode(&buf, "x").unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.type_tag_str(), "double_array");
        assert_eq!(decoded.semaphore_name_str(), "/femlink_sem_x");
        assert_eq!(decoded.data_size(), 4096);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let buf = [0u8; HEADER_SIZE];
        assert!(matches!(
            SegmentHeader::decode(&buf, "x"),
            Err(ExchangeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn create_then_attach_shares_bytes() {
        let name = unique("seg_share");
        let path = segment_path("femlink_test_", &name);

        let mut created = Segment::create_or_attach(&path, &name, 256).unwrap();
        assert_eq!(created.mode(), AttachMode::Created);
        created.data_mut()[0..4].copy_from_slice(&[1, 2, 3, 4]);

        let attached = Segment::create_or_attach(&path, &name, 256).unwrap();
        assert_eq!(attached.mode(), AttachMode::Attached);
        assert_eq!(&attached.data()[0..4], &[1, 2, 3, 4]);

        Segment::unlink(&path).unwrap();
    }

    #[test]
    fn detach_is_idempotent() {
        let name = unique("seg_detach");
        let path = segment_path("femlink_test_", &name);

        let mut seg = Segment::create_or_attach(&path, &name, 64).unwrap();
        seg.detach();
        seg.detach();
        assert!(!seg.is_attached());

        Segment::unlink(&path).unwrap();
    }

    #[test]
    fn attach_after_unlink_fails() {
        let name = unique("seg_unlink");
        let path = segment_path("femlink_test_", &name);

        let _seg = Segment::create_or_attach(&path, &name, 64).unwrap();
        Segment::unlink(&path).unwrap();
        // Idempotent unlink
        Segment::unlink(&path).unwrap();

        assert!(matches!(
            Segment::attach(&path, &name),
            Err(ExchangeError::NotFound { .. })
        ));
    }

    #[test]
    fn bounds_check_rejects_overflow() {
        let name = unique("seg_bounds");
        let path = segment_path("femlink_test_", &name);

        let seg = Segment::create_or_attach(&path, &name, 64).unwrap();
        assert!(seg.check_bounds(0, 64).is_ok());
        assert!(seg.check_bounds(60, 8).is_err());
        assert!(seg.check_bounds(usize::MAX, 8).is_err());

        Segment::unlink(&path).unwrap();
    }

    #[test]
    fn attach_header_rejects_truncated_file() {
        let name = unique("seg_trunc");
        let path = segment_path("femlink_test_", &name);

        // A foreign file under the namespace path, shorter than the header
        std::fs::write(&path, [0u8; 16]).unwrap();
        assert!(matches!(
            Segment::attach_header(&path, &name),
            Err(ExchangeError::InvalidSize { .. })
        ));

        Segment::unlink(&path).unwrap();
    }

    #[test]
    fn attach_header_reads_real_size() {
        let name = unique("seg_hdr");
        let path = segment_path("femlink_test_", &name);

        let mut seg = Segment::create_or_attach(&path, &name, 2048).unwrap();
        let mut header = seg.header().unwrap();
        header.element_count = 256;
        header.set_type_tag("double_array");
        seg.write_header(&header);

        let peeked = Segment::attach_header(&path, &name).unwrap();
        assert_eq!(peeked.data_size(), 2048);
        assert_eq!(peeked.element_count, 256);
        assert_eq!(peeked.type_tag_str(), "double_array");

        Segment::unlink(&path).unwrap();
    }
}
