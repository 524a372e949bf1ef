//! Platform-specific shared memory and semaphore operations

pub mod linux;

pub use linux::{
    RawSemaphore, attach_mmap, attach_mmap_len, create_mmap, current_pid, object_exists,
    process_alive, segment_path, sem_unlink, semaphore_name, shm_dir, shm_dir_writable,
};
