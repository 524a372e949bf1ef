//! Linux-specific mapping and named-semaphore primitives
//!
//! Segments are backed by files under `/dev/shm` so that both sides of the
//! exchange can derive the OS object name from the logical segment name
//! alone. Named POSIX semaphores pair with segments the same way.

use crate::error::{ExchangeError, ExchangeResult};
use memmap2::{MmapMut, MmapOptions};
use std::ffi::CString;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding segment backing files
pub fn shm_dir() -> PathBuf {
    PathBuf::from("/dev/shm")
}

/// Pid of the calling process
pub fn current_pid() -> u32 {
    nix::unistd::getpid().as_raw() as u32
}

/// Check whether a process with the given pid is alive
pub fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(nix::Error::EPERM) => true, // Exists, owned by someone else
        Err(_) => false,
    }
}

/// Check whether the shared-memory directory exists and is writable
pub fn shm_dir_writable() -> bool {
    let dir = shm_dir();
    if !dir.is_dir() {
        return false;
    }
    // A metadata query is not enough to prove writability under restrictive
    // mounts, so probe with an actual create.
    let probe = dir.join(format!(".femlink_probe_{}", std::process::id()));
    match std::fs::File::create(&probe) {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

/// Derive the backing file path for a named segment
pub fn segment_path(namespace: &str, name: &str) -> PathBuf {
    shm_dir().join(format!("{}{}", namespace, name))
}

/// Derive the named-semaphore name paired with a segment
///
/// Both processes compute this independently; no negotiation happens.
pub fn semaphore_name(namespace: &str, name: &str) -> String {
    format!("/{}sem_{}", namespace, name)
}

/// Check whether a segment backing object exists
pub fn object_exists(path: &Path) -> bool {
    path.exists()
}

/// Create (or open) a segment backing file and map it read-write
///
/// A freshly created file is extended with `set_len`, which zero-fills the
/// region.
pub fn create_mmap(path: &Path, size: usize) -> ExchangeResult<MmapMut> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .mode(0o600) // Owner read/write only
        .open(path)?;

    file.set_len(size as u64)?;

    let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
    Ok(mmap)
}

/// Map an existing segment backing file read-write, full length
pub fn attach_mmap(path: &Path) -> ExchangeResult<MmapMut> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
    Ok(mmap)
}

/// Map only the first `len` bytes of an existing backing file
///
/// Used by the attach-with-unknown-size protocol: map the header region,
/// read the real size from it, then re-attach with the full length. A file
/// shorter than `len` would fault on access, so the length is checked up
/// front.
pub fn attach_mmap_len(path: &Path, len: usize) -> ExchangeResult<MmapMut> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let actual = file.metadata()?.len() as usize;
    if actual < len {
        return Err(ExchangeError::InvalidSize { size: actual });
    }
    let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file)? };
    Ok(mmap)
}

/// Thin RAII wrapper around a POSIX named semaphore
///
/// The raw handle is process-local; the semaphore itself lives in the kernel
/// under its name until `sem_unlink`.
pub struct RawSemaphore {
    sem: *mut libc::sem_t,
}

// The sem_t handle may be used from any thread of the owning process.
unsafe impl Send for RawSemaphore {}

impl RawSemaphore {
    /// Open the named semaphore, creating it with count 0 if absent
    pub fn open_or_create(name: &str) -> ExchangeResult<Self> {
        let c_name = CString::new(name).map_err(|_| ExchangeError::CreateFailed {
            name: name.to_string(),
            reason: "semaphore name contains NUL".to_string(),
        })?;

        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT,
                0o600 as libc::c_uint,
                0 as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            let err = std::io::Error::last_os_error();
            return Err(ExchangeError::CreateFailed {
                name: name.to_string(),
                reason: format!("sem_open: {}", err),
            });
        }

        Ok(Self { sem })
    }

    /// Increment the semaphore (non-blocking)
    pub fn post(&self) -> ExchangeResult<()> {
        let rc = unsafe { libc::sem_post(self.sem) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }

    /// Wait for the semaphore with a relative timeout
    ///
    /// Returns `Ok(true)` when signaled, `Ok(false)` on timeout. EINTR is
    /// retried against the same absolute deadline.
    pub fn timed_wait(&self, timeout: Duration) -> ExchangeResult<bool> {
        let mut now = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        let nanos = now.tv_nsec + timeout.subsec_nanos() as libc::c_long;
        let deadline = libc::timespec {
            tv_sec: now.tv_sec
                + timeout.as_secs() as libc::time_t
                + (nanos / 1_000_000_000) as libc::time_t,
            tv_nsec: nanos % 1_000_000_000,
        };

        loop {
            let rc = unsafe { libc::sem_timedwait(self.sem, &deadline) };
            if rc == 0 {
                return Ok(true);
            }
            let err = std::io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) => return Ok(false),
                _ => return Err(err.into()),
            }
        }
    }
}

impl Drop for RawSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

/// Remove the kernel object backing a named semaphore
///
/// Already-removed names are a no-op so teardown stays idempotent.
pub fn sem_unlink(name: &str) -> ExchangeResult<()> {
    let c_name = match CString::new(name) {
        Ok(c) => c,
        Err(_) => return Ok(()),
    };
    let rc = unsafe { libc::sem_unlink(c_name.as_ptr()) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_path_uses_namespace() {
        let path = segment_path("femlink_", "input");
        assert_eq!(path, PathBuf::from("/dev/shm/femlink_input"));
    }

    #[test]
    fn semaphore_name_is_deterministic() {
        assert_eq!(semaphore_name("femlink_", "input"), "/femlink_sem_input");
        assert_eq!(semaphore_name("femlink_", "input"), "/femlink_sem_input");
    }

    #[test]
    fn semaphore_post_then_wait() {
        let name = format!("/femlink_test_sem_{}", std::process::id());
        let sem = RawSemaphore::open_or_create(&name).unwrap();
        sem.post().unwrap();
        assert!(sem.timed_wait(Duration::from_millis(100)).unwrap());
        sem_unlink(&name).unwrap();
    }

    #[test]
    fn semaphore_wait_times_out() {
        let name = format!("/femlink_test_sem_to_{}", std::process::id());
        let sem = RawSemaphore::open_or_create(&name).unwrap();
        assert!(!sem.timed_wait(Duration::from_millis(50)).unwrap());
        sem_unlink(&name).unwrap();
    }
}
