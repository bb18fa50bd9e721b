//! Thread control blocks.
//!
//! Threads live in a fixed array inside their owning process; a slot is
//! recycled, never reallocated. Each slot splits in two: `ThreadInner`,
//! guarded by the slot's own lock (state, sleep channel, kill flag), and
//! `ThreadData`, private to the running thread (kernel stack, switch
//! context, signal-delivery backup frame). Another thread must hold the
//! slot lock before touching `ThreadInner` and must never touch
//! `ThreadData` at all unless it holds the lock during creation/teardown.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU64, Ordering};

use alloc::boxed::Box;

use crate::memory::{self, KernelStack};
use crate::per_cpu;
use crate::process::Process;
use crate::spinlock::{SpinLock, SpinLockGuard};
use crate::task::context::{Context, TrapFrame};
use crate::task::scheduler::fork_ret;
use crate::task::sleep::Channel;

/// Thread identifier, unique for the thread's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tid(u64);

impl Tid {
    /// The tid of an unoccupied slot. Never handed out by the allocator.
    pub const NONE: Tid = Tid(0);

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Unused,
    Used,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    /// No free slot in the process's thread array.
    OutOfThreads,
    /// A stack or trap-frame allocation failed.
    OutOfMemory,
    /// No thread with the requested tid in this process.
    NotFound,
    /// The operation needs a running thread and none is current.
    NoCurrentThread,
}

/// Fields guarded by the slot's lock.
pub struct ThreadInner {
    pub state: ThreadState,
    /// Set iff the thread is Sleeping; what it is waiting for.
    pub chan: Option<Channel>,
    /// Cooperative cancellation: the thread notices this on its own exit
    /// path after being forced out of any sleep.
    pub killed: bool,
    /// Exit status collected by join.
    pub xstate: i32,
    pub tid: Tid,
    /// This thread's slot in the process trap-frame block.
    pub trap_index: usize,
}

/// Fields private to the running thread.
pub struct ThreadData {
    pub kstack: Option<KernelStack>,
    /// Kernel-level switch context; `sched` switches through this.
    pub context: Context,
    /// Snapshot of the trap frame taken when a user signal handler is
    /// installed, restored by sigreturn.
    pub trap_backup: Option<Box<TrapFrame>>,
}

pub struct Thread {
    pub inner: SpinLock<ThreadInner>,
    data: UnsafeCell<ThreadData>,
}

// Safety: ThreadInner is lock-guarded; ThreadData follows the private-data
// discipline documented on the module.
unsafe impl Sync for Thread {}

impl Thread {
    pub(crate) const fn new() -> Self {
        Thread {
            inner: SpinLock::new(ThreadInner {
                state: ThreadState::Unused,
                chan: None,
                killed: false,
                xstate: 0,
                tid: Tid::NONE,
                trap_index: 0,
            }),
            data: UnsafeCell::new(ThreadData {
                kstack: None,
                context: Context::zeroed(),
                trap_backup: None,
            }),
        }
    }

    /// The thread-private side. See the module discipline note.
    pub fn data(&self) -> &ThreadData {
        unsafe { &*self.data.get() }
    }

    /// Mutable access to the thread-private side. See the module
    /// discipline note.
    #[allow(clippy::mut_from_ref)]
    pub fn data_mut(&self) -> &mut ThreadData {
        unsafe { &mut *self.data.get() }
    }

    /// Pointer to the switch context, for `sched` and the scheduler loop.
    pub(crate) fn context_ptr(&self) -> *mut Context {
        unsafe { &mut (*self.data.get()).context }
    }

    /// Whether this thread has been asked to die. Checked by blocking
    /// paths after every wakeup.
    pub fn killed(&self) -> bool {
        self.inner.lock().killed
    }

    /// Reset the slot to its defaults, releasing the stack and backup
    /// frame. Idempotent; the caller holds the slot lock.
    pub(crate) fn free(&self, inner: &mut ThreadInner) {
        inner.state = ThreadState::Unused;
        inner.chan = None;
        inner.killed = false;
        inner.xstate = 0;
        inner.tid = Tid::NONE;
        inner.trap_index = 0;
        let data = self.data_mut();
        data.trap_backup = None;
        data.kstack = None;
        data.context = Context::zeroed();
    }
}

static NEXT_TID: AtomicU64 = AtomicU64::new(1);

/// Hand out the next tid. Monotonic for the life of the system.
fn alloc_tid() -> Tid {
    Tid(NEXT_TID.fetch_add(1, Ordering::Relaxed))
}

/// Find an unused slot in `p`'s thread array and set it up to run in the
/// kernel: fresh tid, backup trap frame, kernel stack, and a context that
/// resumes at the first-entry routine. The calling thread's own slot is
/// never a candidate. Returns with the slot lock held; any allocation
/// failure fully unwinds the slot first.
pub(crate) fn alloc_thread(
    p: &'static Process,
) -> Result<(&'static Thread, SpinLockGuard<'static, ThreadInner>), ThreadError> {
    let me = per_cpu::my_thread().map(|(_, t)| t as *const Thread);

    for (i, t) in p.threads.iter().enumerate() {
        if me == Some(t as *const Thread) {
            continue;
        }
        let mut guard = t.inner.lock();
        if guard.state != ThreadState::Unused {
            continue;
        }

        guard.state = ThreadState::Used;
        guard.killed = false;
        guard.xstate = 0;
        guard.tid = alloc_tid();
        guard.trap_index = i;

        let data = t.data_mut();

        match memory::memory().alloc_trap_frame() {
            Ok(frame) => data.trap_backup = Some(frame),
            Err(_) => {
                t.free(&mut guard);
                return Err(ThreadError::OutOfMemory);
            }
        }

        // Fresh context: first run resumes at fork_ret on a new stack.
        data.context = Context::zeroed();
        data.context.ra = fork_ret as usize as u64;
        match memory::memory().alloc_page() {
            Ok(page) => {
                let stack = KernelStack::new(page);
                data.context.sp = stack.top();
                data.kstack = Some(stack);
            }
            Err(_) => {
                t.free(&mut guard);
                return Err(ThreadError::OutOfMemory);
            }
        }

        log::trace!("thread {} allocated in slot {}", guard.tid.as_u64(), i);
        return Ok((t, guard));
    }

    Err(ThreadError::OutOfThreads)
}
