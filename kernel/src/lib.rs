//! The execution core of a small multiprocessor teaching kernel.
//!
//! This crate owns every runnable unit of work: the fixed process and
//! thread tables, the per-processor round-robin scheduler, the
//! sleep/wakeup channel, deferred signal delivery, and the semaphore
//! subsystem. It deliberately owns nothing else; page tables, file
//! systems and the trap/boot machinery are collaborators behind the
//! traits in [`arch`], [`memory`] and [`fs`], registered once at boot
//! through [`init`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod fs;
pub mod memory;
pub mod per_cpu;
pub mod process;
pub mod signal;
pub mod spinlock;
pub mod sync;
pub mod task;

#[cfg(any(test, feature = "testing"))]
pub mod test_support;

use arch::Machine;
use memory::MemoryManager;

/// Wire the platform in. Call exactly once, before the first process is
/// spawned; later calls are ignored.
pub fn init(machine: &'static dyn Machine, memory: &'static dyn MemoryManager) {
    arch::register_machine(machine);
    memory::register_memory(memory);
    log::info!(
        "execution core ready: {} process slots, {} threads each, {} semaphores",
        config::NPROC,
        config::NTHREAD,
        config::MAX_BSEM
    );
}
