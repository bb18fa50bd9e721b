//! Compile-time sizing for the execution core.
//!
//! Everything here is a fixed capacity: the tables in this kernel are
//! arena-style arrays that never grow, so these constants bound memory
//! use for the whole core.

/// Maximum number of processes in the global table.
pub const NPROC: usize = 64;

/// Maximum number of threads per process.
pub const NTHREAD: usize = 8;

/// Maximum number of processors the scheduler will run on.
pub const NCPU: usize = 8;

/// Open-file slots per process.
pub const NOFILE: usize = 16;

/// Number of signal numbers (valid signals are 1..NSIG).
pub const NSIG: usize = 32;

/// Size of the global binary-semaphore pool.
pub const MAX_BSEM: usize = 128;

/// Bytes of user stack a kernel-created thread is given. The thread entry
/// stack pointer is placed 16 bytes below the top for ABI alignment.
pub const KTHREAD_STACK_SIZE: u64 = 4000;
