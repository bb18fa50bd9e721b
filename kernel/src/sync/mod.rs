//! Semaphores built on the blocking/wakeup channel.

pub mod bsem;
pub mod csem;

pub use bsem::{bsem_alloc, bsem_down, bsem_free, bsem_up, BsemId, SemError};
pub use csem::CountingSemaphore;
