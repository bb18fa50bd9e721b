//! The global process table.
//!
//! A fixed array of `NPROC` slots plus the process tree: a parent-link
//! map under a single lock, acquired before any process lock. Parent
//! links are weak references by slot index, resolved by scanning, so the
//! hierarchy never creates ownership cycles.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::config::{NPROC, NTHREAD};
use crate::fs::DirRef;
use crate::memory;
use crate::process::process::{ProcState, Process, ProcessInner};
use crate::process::Pid;
use crate::signal::types::SignalState;
use crate::spinlock::{SpinLock, SpinLockGuard};
use crate::task::thread::{self, ThreadError, ThreadState};

/// Parent slot index per child slot, or None for roots. Guarded by the
/// tree lock, which orders before every process lock.
pub type ParentMap = [Option<usize>; NPROC];

struct ProcTable {
    pool: [Process; NPROC],
    tree: SpinLock<ParentMap>,
}

static PROCS: ProcTable = ProcTable {
    pool: [const { Process::new() }; NPROC],
    tree: SpinLock::new([None; NPROC]),
};

static NEXT_PID: AtomicU64 = AtomicU64::new(1);

/// Slot index of the init process; `usize::MAX` until init is spawned.
static INIT_SLOT: AtomicUsize = AtomicUsize::new(usize::MAX);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// Every slot in the table is occupied.
    OutOfProcesses,
    /// No free thread slot for the first thread.
    OutOfThreads,
    /// An address-space, trap-frame, or stack allocation failed.
    OutOfMemory,
    /// `wait` found nothing to wait for (or the waiter was killed).
    NoChildren,
}

impl From<ThreadError> for ProcessError {
    fn from(err: ThreadError) -> Self {
        match err {
            ThreadError::OutOfThreads => ProcessError::OutOfThreads,
            _ => ProcessError::OutOfMemory,
        }
    }
}

pub fn pool() -> &'static [Process; NPROC] {
    &PROCS.pool
}

pub fn by_index(idx: usize) -> &'static Process {
    &PROCS.pool[idx]
}

/// Slot index of a process in the table.
pub fn index_of(p: &Process) -> usize {
    let base = PROCS.pool.as_ptr() as usize;
    let addr = p as *const Process as usize;
    (addr - base) / core::mem::size_of::<Process>()
}

/// The process tree lock and parent map.
pub fn tree() -> &'static SpinLock<ParentMap> {
    &PROCS.tree
}

fn alloc_pid() -> Pid {
    Pid::new(NEXT_PID.fetch_add(1, Ordering::Relaxed))
}

/// The init process, once spawned. Orphans are reparented to it.
pub fn init_process() -> Option<&'static Process> {
    init_index().map(by_index)
}

pub fn init_index() -> Option<usize> {
    let idx = INIT_SLOT.load(Ordering::Acquire);
    (idx != usize::MAX).then_some(idx)
}

/// Find an Unused slot and bring it to Used: fresh pid, default signal
/// state, trap-frame page, empty address space, and a first thread ready
/// to enter the kernel. Returns with the slot lock held. Any failure in
/// the chain unwinds everything acquired so far and reports it.
pub fn alloc_process(
) -> Result<(&'static Process, SpinLockGuard<'static, ProcessInner>), ProcessError> {
    for p in PROCS.pool.iter() {
        let mut guard = p.inner.lock();
        if guard.state != ProcState::Unused {
            continue;
        }

        guard.pid = alloc_pid();
        guard.state = ProcState::Used;
        guard.killed = false;
        guard.xstate = 0;
        guard.signals = SignalState::new();

        let data = p.data_mut();

        match memory::memory().alloc_trap_block() {
            Ok(block) => data.trap_frames = Some(block),
            Err(_) => {
                free_process(p, &mut guard);
                return Err(ProcessError::OutOfMemory);
            }
        }

        match memory::memory().create_address_space() {
            Ok(space) => data.addr_space = Some(space),
            Err(_) => {
                free_process(p, &mut guard);
                return Err(ProcessError::OutOfMemory);
            }
        }

        match thread::alloc_thread(p) {
            Ok((_, thread_guard)) => drop(thread_guard),
            Err(err) => {
                free_process(p, &mut guard);
                return Err(err.into());
            }
        }

        log::debug!("process {} allocated", guard.pid.as_u64());
        return Ok((p, guard));
    }

    Err(ProcessError::OutOfProcesses)
}

/// Reset a slot and everything hanging from it to defaults. Idempotent;
/// the caller holds the slot lock (passed as `inner`).
pub fn free_process(p: &Process, inner: &mut ProcessInner) {
    let data = p.data_mut();
    data.trap_frames = None;
    data.addr_space = None;
    data.files.close_all();
    data.cwd = None;
    data.name.clear();

    inner.pid = Pid::NONE;
    inner.killed = false;
    inner.xstate = 0;
    inner.signals = SignalState::new();
    inner.state = ProcState::Unused;

    for t in p.threads.iter() {
        let mut guard = t.inner.lock();
        t.free(&mut guard);
    }
}

/// Create the first process. The platform provides the entry point and
/// user stack top for its initial trap frame, and optionally a root
/// directory handle. Init must exist before anything exits: orphaned
/// children are handed to it, and it is expected to reap forever.
pub fn spawn_init(entry: u64, stack_top: u64, cwd: Option<DirRef>) -> Result<Pid, ProcessError> {
    let (p, guard) = alloc_process()?;

    let data = p.data_mut();
    data.name.push_str("init");
    data.cwd = cwd;
    {
        let frames = data
            .trap_frames
            .as_mut()
            .expect("fresh process without trap frames");
        let frame = frames.frame_mut(0);
        frame.epc = entry;
        frame.sp = stack_top;
    }

    INIT_SLOT.store(index_of(p), Ordering::Release);

    {
        let mut tg = p.threads[0].inner.lock();
        tg.state = ThreadState::Runnable;
    }

    let pid = guard.pid;
    drop(guard);
    log::info!("init process spawned as pid {}", pid.as_u64());
    Ok(pid)
}

/// Print a process listing. Takes no locks so it stays usable when the
/// machine is wedged; the snapshot may be torn.
pub fn dump() {
    for p in PROCS.pool.iter() {
        let inner = unsafe { &*p.inner.data_ptr() };
        if inner.state == ProcState::Unused {
            continue;
        }
        let data = p.data();
        let live_threads = p
            .threads
            .iter()
            .filter(|t| {
                let tg = unsafe { &*t.inner.data_ptr() };
                tg.state != ThreadState::Unused
            })
            .count();
        log::info!(
            "pid {} state {:?} name {:?} threads {}/{}",
            inner.pid.as_u64(),
            inner.state,
            data.name,
            live_threads,
            NTHREAD
        );
    }
}

/// Test-harness hook: forget the init slot so a fresh one can be spawned.
#[cfg(any(test, feature = "testing"))]
pub(crate) fn reset_init_slot() {
    INIT_SLOT.store(usize::MAX, Ordering::Release);
}
