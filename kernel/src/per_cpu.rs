//! Per-processor state.
//!
//! Each processor owns one `Cpu` record: the thread it is currently
//! running, the scheduler's own switch context, and the spinlock
//! push-off/pop-off bookkeeping. A `Cpu` is only ever touched from its own
//! processor with interrupts disabled, which is what makes the plain
//! `Cell`/`UnsafeCell` fields sound.

use core::cell::{Cell, UnsafeCell};

use crate::arch::machine;
use crate::config::NCPU;
use crate::process::table;
use crate::process::Process;
use crate::spinlock::{pop_off, push_off};
use crate::task::context::Context;
use crate::task::thread::Thread;

/// The process/thread slot a processor is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Current {
    pub proc_idx: usize,
    pub thread_idx: usize,
}

/// One processor's private record.
pub struct Cpu {
    /// What this processor is running, if anything.
    current: Cell<Option<Current>>,
    /// The scheduler loop's saved context; `sched` switches here.
    context: UnsafeCell<Context>,
    /// Depth of push-off nesting (held spinlocks).
    lock_depth: Cell<u32>,
    /// Interrupt state before the outermost push-off.
    saved_interrupts: Cell<bool>,
}

// Safety: each Cpu is accessed only by its own processor while interrupts
// are disabled, so there is never concurrent access to the same record.
unsafe impl Sync for Cpu {}

impl Cpu {
    const fn new() -> Self {
        Self {
            current: Cell::new(None),
            context: UnsafeCell::new(Context::zeroed()),
            lock_depth: Cell::new(0),
            saved_interrupts: Cell::new(false),
        }
    }

    pub fn lock_depth(&self) -> u32 {
        self.lock_depth.get()
    }

    pub fn set_lock_depth(&self, depth: u32) {
        self.lock_depth.set(depth);
    }

    pub fn saved_interrupts(&self) -> bool {
        self.saved_interrupts.get()
    }

    pub fn set_saved_interrupts(&self, enabled: bool) {
        self.saved_interrupts.set(enabled);
    }
}

static CPUS: [Cpu; NCPU] = [const { Cpu::new() }; NCPU];

/// This processor's record. Interrupts must be disabled, otherwise the
/// thread could migrate between the id read and the use of the reference.
pub fn cpu() -> &'static Cpu {
    &CPUS[machine().cpu_id()]
}

/// The slot this processor is running, read with interrupts briefly
/// disabled so the answer is coherent.
pub fn current() -> Option<Current> {
    push_off();
    let cur = cpu().current.get();
    pop_off();
    cur
}

/// The process the calling thread belongs to, if a thread is running.
pub fn my_proc() -> Option<&'static Process> {
    current().map(|c| table::by_index(c.proc_idx))
}

/// The calling thread and its process, if a thread is running.
pub fn my_thread() -> Option<(&'static Process, &'static Thread)> {
    current().map(|c| {
        let p = table::by_index(c.proc_idx);
        (p, &p.threads[c.thread_idx])
    })
}

/// Record or clear what this processor is running. Interrupts must be
/// disabled; only the scheduler path (and the test harness) does this.
pub(crate) fn set_current(cur: Option<Current>) {
    cpu().current.set(cur);
}

/// The scheduler context slot for this processor. Interrupts must be
/// disabled.
pub(crate) fn scheduler_context() -> *mut Context {
    cpu().context.get()
}
