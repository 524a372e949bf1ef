//! Shared-memory fast-path transport
//!
//! Composes segments, the typed codec, hand-off gates, and shape metadata
//! into the write-signal-wait-read exchange:
//!
//! ```text
//! host                         solver
//! ----                         ------
//! send_arrays(name, ..)
//!   create-or-attach segment
//!   write header + shape + payload
//!   signal gate  ─────────────▶ wait gate
//!                               attach (header first, then full size)
//!                               read shape + payload, compute
//!                               write result, signal ◀── recv_arrays(name, ..)
//! ```
//!
//! A writer completes all writes before signaling, and a reader hands the
//! turn back with its own signal; the transport provides no mutual exclusion
//! beyond that turn-taking discipline.

use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, ExchangeResult};
use crate::gate::{SyncGate, WaitOutcome};
use crate::layout;
use crate::platform;
use crate::registry::{SegmentRecord, SegmentRegistry};
use crate::segment::{AttachMode, Segment, SegmentHeader};
use crate::shape::{ArrayShape, SHAPE_RECORD_LEN, ShapeMetadata};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// Type tag written in the header of array exchanges
pub const DOUBLE_ARRAY_TAG: &str = "double_array";

/// Payload offset of the binary shape record in array exchanges
pub const SHAPE_OFFSET: usize = 0;

/// Payload offset of the first array element in array exchanges
pub const ARRAY_DATA_OFFSET: usize = SHAPE_RECORD_LEN;

/// Shared-memory transport bound to one session configuration
///
/// Owns every segment mapping and gate it opens; nothing global. Dropping
/// the transport detaches all mappings (teardown of the named OS objects is
/// explicit via [`ShmTransport::teardown`]).
pub struct ShmTransport {
    config: ExchangeConfig,
    registry: SegmentRegistry,
    segments: HashMap<String, Segment>,
    gates: HashMap<String, SyncGate>,
}

impl ShmTransport {
    /// Create a transport session; fails if the fast path is unavailable
    pub fn new(config: ExchangeConfig) -> ExchangeResult<Self> {
        if !Self::available() {
            return Err(ExchangeError::TransportUnavailable {
                reason: "shared-memory directory missing or not writable".to_string(),
            });
        }
        let registry = SegmentRegistry::new(&platform::shm_dir(), &config.namespace);
        info!(session = %config.session_name, "shared-memory transport ready");
        Ok(Self {
            config,
            registry,
            segments: HashMap::new(),
            gates: HashMap::new(),
        })
    }

    /// Whether the fast-path prerequisites are present on this host
    pub fn available() -> bool {
        platform::shm_dir_writable()
    }

    /// Names of segments this session has registered
    pub fn list(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Session configuration
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Create or attach a slot segment at the configured default capacity
    ///
    /// Uses `segment_size` from the session configuration; for explicitly
    /// sized segments use [`ShmTransport::open_segment`].
    pub fn open_slot(&mut self, name: &str) -> ExchangeResult<()> {
        let data_size = self.config.segment_size;
        self.open_segment(name, data_size)
    }

    /// Create or attach a segment with `data_size` payload bytes
    ///
    /// Whichever side runs first creates the object; the other attaches at
    /// the existing real size regardless of `data_size`. Idempotent for a
    /// name already open in this session.
    pub fn open_segment(&mut self, name: &str, data_size: usize) -> ExchangeResult<()> {
        if self.segments.contains_key(name) {
            return Ok(());
        }
        let path = self.segment_path(name);
        let segment = Segment::create_or_attach(&path, name, data_size)?;
        if segment.mode() == AttachMode::Attached {
            if let Some(record) = self.registry.read_sidecar(name) {
                if !record.owner_alive() {
                    warn!(
                        segment = name,
                        owner_pid = record.owner_pid,
                        "attached to segment whose creator has died"
                    );
                }
            }
        }
        self.registry.register(SegmentRecord {
            name: name.to_string(),
            data_size: segment.data_size(),
            created_here: segment.mode() == AttachMode::Created,
            owner_pid: platform::current_pid(),
            created_at: SystemTime::now(),
        });
        self.segments.insert(name.to_string(), segment);
        Ok(())
    }

    /// Detach a segment mapping without removing the OS object
    pub fn close_segment(&mut self, name: &str) {
        if let Some(mut segment) = self.segments.remove(name) {
            segment.detach();
        }
    }

    /// Write an `i32` slot at a payload offset
    pub fn write_i32(&mut self, name: &str, offset: usize, value: i32) -> ExchangeResult<()> {
        layout::write_i32(self.segment_mut(name)?, offset, value)
    }

    /// Read an `i32` slot from a payload offset
    pub fn read_i32(&self, name: &str, offset: usize) -> ExchangeResult<i32> {
        layout::read_i32(self.segment(name)?, offset)
    }

    /// Write an `f64` slot at a payload offset
    pub fn write_f64(&mut self, name: &str, offset: usize, value: f64) -> ExchangeResult<()> {
        layout::write_f64(self.segment_mut(name)?, offset, value)
    }

    /// Read an `f64` slot from a payload offset
    pub fn read_f64(&self, name: &str, offset: usize) -> ExchangeResult<f64> {
        layout::read_f64(self.segment(name)?, offset)
    }

    /// Write a length-prefixed string slot at a payload offset
    pub fn write_str(&mut self, name: &str, offset: usize, value: &str) -> ExchangeResult<()> {
        layout::write_str(self.segment_mut(name)?, offset, value)
    }

    /// Read a length-prefixed string slot from a payload offset
    pub fn read_str(&self, name: &str, offset: usize) -> ExchangeResult<String> {
        layout::read_str(self.segment(name)?, offset)
    }

    /// Write a flat `f64` array slot
    pub fn write_f64_array(
        &mut self,
        name: &str,
        shape: ArrayShape,
        data: &[f64],
    ) -> ExchangeResult<()> {
        layout::write_f64_array(self.segment_mut(name)?, shape, data)
    }

    /// Read a flat `f64` array slot
    pub fn read_f64_array(&self, name: &str, shape: ArrayShape) -> ExchangeResult<Vec<f64>> {
        layout::read_f64_array(self.segment(name)?, shape)
    }

    /// Signal the gate paired with `name`
    pub fn signal(&mut self, name: &str) -> ExchangeResult<()> {
        self.gate(name)?.signal()
    }

    /// Wait on the gate paired with `name`
    pub fn wait(&mut self, name: &str, timeout: Duration) -> ExchangeResult<WaitOutcome> {
        self.gate(name)?.wait(timeout)
    }

    /// Write a multi-array exchange and signal the peer
    ///
    /// All arrays must share one element count. The segment is sized from
    /// the payload (shape record + flat data) when created here; an existing
    /// peer-created segment must be at least that large.
    pub fn send_arrays(
        &mut self,
        name: &str,
        arrays: &[Vec<f64>],
        dims: &[u32],
    ) -> ExchangeResult<()> {
        let elements_per_array = arrays.first().map(|a| a.len()).unwrap_or(0);
        for array in arrays {
            if array.len() != elements_per_array {
                return Err(ExchangeError::TypeMismatch {
                    expected: format!("{} elements in every array", elements_per_array),
                    found: format!("{} elements", array.len()),
                });
            }
        }
        let meta = ShapeMetadata::new(
            arrays.len() as u32,
            elements_per_array as u32,
            dims.to_vec(),
        );
        meta.validate()?;

        let total = meta.total_elements();
        let data_size = ARRAY_DATA_OFFSET + total.saturating_mul(8);
        self.open_segment(name, data_size)?;

        let sem_name = self.gate_name(name);
        let shape_record = meta.encode()?;
        {
            let segment = self.segment_mut(name)?;
            // An attached peer-created segment may be smaller than we need.
            segment.check_bounds(0, data_size)?;

            let header =
                SegmentHeader::new(segment.data_size(), total as u64, DOUBLE_ARRAY_TAG, &sem_name);
            segment.write_header(&header);

            layout::write_bytes(segment, SHAPE_OFFSET, &shape_record)?;
            for (i, array) in arrays.iter().enumerate() {
                let shape =
                    ArrayShape::new(elements_per_array, ARRAY_DATA_OFFSET + i * elements_per_array * 8);
                layout::write_f64_array(segment, shape, array)?;
            }
        }

        self.signal(name)?;
        info!(
            segment = name,
            arrays = arrays.len(),
            elements = total,
            "arrays handed off"
        );
        Ok(())
    }

    /// [`ShmTransport::recv_arrays`] with the configured wait budget
    pub fn recv_arrays_default(
        &mut self,
        name: &str,
    ) -> ExchangeResult<(ShapeMetadata, Vec<Vec<f64>>)> {
        let timeout = self.config.wait_timeout();
        self.recv_arrays(name, timeout)
    }

    /// Wait for the peer's signal, then read a multi-array exchange
    ///
    /// Either side may run first: the gate name is derivable, so the reader
    /// waits on it even when the segment does not exist yet and attaches
    /// after the writer's signal. Runs the attach-with-unknown-size
    /// protocol: peek at the header, map the full segment, read shape plus
    /// payload. Signals the gate again on the way out to hand the turn back
    /// to the writer.
    pub fn recv_arrays(
        &mut self,
        name: &str,
        timeout: Duration,
    ) -> ExchangeResult<(ShapeMetadata, Vec<Vec<f64>>)> {
        let path = self.segment_path(name);
        // A header left by an earlier exchange may carry its own semaphore
        // name; a missing segment means the writer has not run yet and the
        // derived name applies.
        let sem_name = match Segment::attach_header(&path, name) {
            Ok(peek) => match peek.semaphore_name_str() {
                "" => self.gate_name(name),
                s => s.to_string(),
            },
            Err(ExchangeError::NotFound { .. }) => self.gate_name(name),
            Err(e) => return Err(e),
        };
        let gate = SyncGate::open_or_create(&sem_name)?;

        let started = Instant::now();
        if gate.wait(timeout)? == WaitOutcome::TimedOut {
            return Err(ExchangeError::TimedOut {
                name: name.to_string(),
                waited_ms: started.elapsed().as_millis() as u64,
            });
        }

        // Writer has finished; the header is now authoritative.
        let header = Segment::attach_header(&path, name)?;
        if header.type_tag_str() != DOUBLE_ARRAY_TAG {
            // Hand the token back so a correctly-typed reader can still run.
            gate.signal()?;
            return Err(ExchangeError::TypeMismatch {
                expected: DOUBLE_ARRAY_TAG.to_string(),
                found: header.type_tag_str().to_string(),
            });
        }

        let mut segment = Segment::attach(&path, name)?;
        let record = layout::read_bytes(&segment, SHAPE_OFFSET, SHAPE_RECORD_LEN)?;
        let meta = ShapeMetadata::decode(&record)?;
        meta.validate()?;

        let total = meta.total_elements();
        let flat = layout::read_f64_array(&segment, ArrayShape::new(total, ARRAY_DATA_OFFSET))?;
        segment.detach();

        let arrays = meta.split(&flat)?;
        gate.signal()?;
        debug!(segment = name, arrays = arrays.len(), "arrays received");
        Ok((meta, arrays))
    }

    /// Detach, unlink the segment and its semaphore, drop bookkeeping
    ///
    /// Existing mappings in the peer stay valid until it detaches; no new
    /// attach can succeed afterwards.
    pub fn teardown(&mut self, name: &str) -> ExchangeResult<()> {
        self.close_segment(name);
        self.gates.remove(name);
        Segment::unlink(&self.segment_path(name))?;
        SyncGate::unlink(&self.gate_name(name))?;
        self.registry.unregister(name)?;
        info!(segment = name, "segment torn down");
        Ok(())
    }

    fn segment(&self, name: &str) -> ExchangeResult<&Segment> {
        self.segments.get(name).ok_or_else(|| ExchangeError::NotFound {
            name: name.to_string(),
        })
    }

    fn segment_mut(&mut self, name: &str) -> ExchangeResult<&mut Segment> {
        self.segments
            .get_mut(name)
            .ok_or_else(|| ExchangeError::NotFound {
                name: name.to_string(),
            })
    }

    fn gate(&mut self, name: &str) -> ExchangeResult<&SyncGate> {
        if !self.gates.contains_key(name) {
            let gate = SyncGate::open_or_create(&self.gate_name(name))?;
            self.gates.insert(name.to_string(), gate);
        }
        Ok(&self.gates[name])
    }

    fn segment_path(&self, name: &str) -> PathBuf {
        platform::segment_path(&self.config.namespace, name)
    }

    fn gate_name(&self, name: &str) -> String {
        platform::semaphore_name(&self.config.namespace, name)
    }
}

impl Drop for ShmTransport {
    fn drop(&mut self) {
        for segment in self.segments.values_mut() {
            segment.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(ns: &str) -> ShmTransport {
        let config = ExchangeConfig {
            namespace: format!("{}_{}_", ns, std::process::id()),
            ..ExchangeConfig::default()
        };
        ShmTransport::new(config).unwrap()
    }

    #[test]
    fn scalar_slots_roundtrip() {
        let mut t = session("shm_scalar");
        t.open_segment("slots", 256).unwrap();

        t.write_i32("slots", 0, 7).unwrap();
        t.write_f64("slots", 8, 2.5).unwrap();
        t.write_str("slots", 16, "mesh ready").unwrap();

        assert_eq!(t.read_i32("slots", 0).unwrap(), 7);
        assert_eq!(t.read_f64("slots", 8).unwrap(), 2.5);
        assert_eq!(t.read_str("slots", 16).unwrap(), "mesh ready");

        t.teardown("slots").unwrap();
    }

    #[test]
    fn send_and_recv_arrays() {
        let mut host = session("shm_send");
        let mut solver = session("shm_send");

        let arrays = vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]];
        host.send_arrays("field", &arrays, &[2, 2]).unwrap();

        let (meta, received) = solver
            .recv_arrays("field", Duration::from_millis(500))
            .unwrap();
        assert_eq!(meta.num_arrays, 2);
        assert_eq!(meta.elements_per_array, 4);
        assert_eq!(meta.dims, vec![2, 2]);
        assert_eq!(received, arrays);

        host.teardown("field").unwrap();
    }

    #[test]
    fn recv_without_send_times_out() {
        let mut host = session("shm_timeout");
        let mut solver = session("shm_timeout");

        // Segment exists but no signal is ever posted.
        host.open_segment("quiet", 1024).unwrap();
        {
            let header = SegmentHeader::new(1024, 0, DOUBLE_ARRAY_TAG, "");
            host.segment_mut("quiet").unwrap().write_header(&header);
        }

        let result = solver.recv_arrays("quiet", Duration::from_millis(100));
        assert!(matches!(result, Err(ExchangeError::TimedOut { .. })));

        host.teardown("quiet").unwrap();
    }

    #[test]
    fn recv_without_any_writer_times_out() {
        let mut solver = session("shm_missing");
        let result = solver.recv_arrays("never_created", Duration::from_millis(50));
        assert!(matches!(result, Err(ExchangeError::TimedOut { .. })));
    }

    #[test]
    fn reader_may_start_before_writer() {
        let mut host = session("shm_first");
        let reader_config = host.config().clone();

        let reader = std::thread::spawn(move || -> ExchangeResult<Vec<Vec<f64>>> {
            let mut solver = ShmTransport::new(reader_config)?;
            let (_, arrays) = solver.recv_arrays("early", Duration::from_secs(2))?;
            Ok(arrays)
        });

        // Give the reader time to block before the segment even exists.
        std::thread::sleep(Duration::from_millis(100));
        host.send_arrays("early", &[vec![7.0, 8.0]], &[2]).unwrap();

        assert_eq!(reader.join().unwrap().unwrap(), vec![vec![7.0, 8.0]]);
        host.teardown("early").unwrap();
    }

    #[test]
    fn configured_defaults_drive_slot_size_and_wait() {
        let config = ExchangeConfig {
            namespace: format!("shm_cfg_{}_", std::process::id()),
            segment_size: 512,
            wait_timeout_ms: 100,
            ..ExchangeConfig::default()
        };
        let mut t = ShmTransport::new(config).unwrap();

        t.open_slot("slot").unwrap();
        // Capacity comes from the configuration, not a caller argument.
        t.write_f64("slot", 504, 1.0).unwrap();
        assert!(matches!(
            t.write_f64("slot", 512, 1.0),
            Err(ExchangeError::OutOfBounds { .. })
        ));

        let started = std::time::Instant::now();
        let result = t.recv_arrays_default("slot");
        assert!(matches!(result, Err(ExchangeError::TimedOut { .. })));
        // The 100 ms configured budget applied, not the 5 s fallback.
        assert!(started.elapsed() < Duration::from_secs(2));

        t.teardown("slot").unwrap();
    }

    #[test]
    fn two_handles_share_bytes_after_handoff() {
        let mut host = session("shm_share");
        let mut solver = session("shm_share");

        host.open_segment("both", 128).unwrap();
        solver.open_segment("both", 128).unwrap();

        host.write_f64("both", 0, 42.0).unwrap();
        host.signal("both").unwrap();

        assert_eq!(
            solver.wait("both", Duration::from_millis(500)).unwrap(),
            WaitOutcome::Signaled
        );
        assert_eq!(solver.read_f64("both", 0).unwrap(), 42.0);

        host.teardown("both").unwrap();
    }

    #[test]
    fn teardown_then_attach_fails() {
        let mut host = session("shm_teardown");
        host.open_segment("gone", 64).unwrap();
        host.teardown("gone").unwrap();

        let path = crate::platform::segment_path(&host.config().namespace, "gone");
        assert!(matches!(
            Segment::attach(&path, "gone"),
            Err(ExchangeError::NotFound { .. })
        ));

        // A late receiver finds nothing to wait for and times out.
        let mut late = ShmTransport::new(host.config().clone()).unwrap();
        let result = late.recv_arrays("gone", Duration::from_millis(50));
        assert!(matches!(result, Err(ExchangeError::TimedOut { .. })));

        // Teardown of an already-removed name stays quiet.
        host.teardown("gone").unwrap();
    }

    #[test]
    fn bookkeeping_lists_only_this_session() {
        let mut a = session("shm_list_a");
        let mut b = session("shm_list_b");

        a.open_segment("one", 64).unwrap();
        b.open_segment("two", 64).unwrap();

        assert_eq!(a.list(), vec!["one"]);
        assert_eq!(b.list(), vec!["two"]);

        a.teardown("one").unwrap();
        b.teardown("two").unwrap();
    }
}
