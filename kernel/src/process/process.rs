//! Process control blocks.
//!
//! One `Process` per table slot, recycled forever. Like threads, a
//! process splits into a lock-guarded side (`ProcessInner`: lifecycle
//! state, identity, signal state) and a private side (`ProcessData`:
//! address space, open files, trap-frame block) that only the process's
//! own threads touch, or other actors while holding the slot lock during
//! creation and teardown. The parent link does not live here at all; it
//! sits in the table's tree map under its own lock.

use core::cell::UnsafeCell;

use alloc::boxed::Box;
use alloc::string::String;

use crate::config::NTHREAD;
use crate::fs::{DirRef, FileTable};
use crate::memory::AddressSpace;
use crate::signal::types::SignalState;
use crate::spinlock::SpinLock;
use crate::task::context::TrapFrameBlock;
use crate::task::thread::Thread;

/// Process identifier. Assigned once per slot occupancy, globally unique
/// and monotonically increasing for the life of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pid(u64);

impl Pid {
    /// The pid of an unoccupied slot. Never handed out by the allocator.
    pub const NONE: Pid = Pid(0);

    pub(crate) fn new(raw: u64) -> Self {
        Pid(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Used,
    /// Exited but not yet reaped by a waiting parent.
    Zombie,
}

/// Fields guarded by the slot lock.
pub struct ProcessInner {
    pub state: ProcState,
    pub pid: Pid,
    /// Set by kill delivery; threads notice it and unwind through exit.
    pub killed: bool,
    /// Exit status handed to the reaping parent.
    pub xstate: i32,
    pub signals: SignalState,
}

/// Fields private to the process's own threads.
pub struct ProcessData {
    /// Name for debug listings.
    pub name: String,
    pub addr_space: Option<Box<dyn AddressSpace>>,
    /// The trap-context page: one frame per thread slot.
    pub trap_frames: Option<Box<TrapFrameBlock>>,
    pub files: FileTable,
    pub cwd: Option<DirRef>,
}

pub struct Process {
    pub inner: SpinLock<ProcessInner>,
    data: UnsafeCell<ProcessData>,
    /// Fixed thread array; each slot carries its own lock.
    pub threads: [Thread; NTHREAD],
}

// Safety: ProcessInner is lock-guarded, ProcessData follows the
// private-data discipline above, and each Thread synchronizes itself.
unsafe impl Sync for Process {}

impl Process {
    pub(crate) const fn new() -> Self {
        Process {
            inner: SpinLock::new(ProcessInner {
                state: ProcState::Unused,
                pid: Pid::NONE,
                killed: false,
                xstate: 0,
                signals: SignalState::new(),
            }),
            data: UnsafeCell::new(ProcessData {
                name: String::new(),
                addr_space: None,
                trap_frames: None,
                files: FileTable::new(),
                cwd: None,
            }),
            threads: [const { Thread::new() }; NTHREAD],
        }
    }

    /// The process-private side. See the module discipline note.
    pub fn data(&self) -> &ProcessData {
        unsafe { &*self.data.get() }
    }

    /// Mutable access to the process-private side. See the module
    /// discipline note.
    #[allow(clippy::mut_from_ref)]
    pub fn data_mut(&self) -> &mut ProcessData {
        unsafe { &mut *self.data.get() }
    }

    /// This process's pid (locks the slot briefly).
    pub fn pid(&self) -> Pid {
        self.inner.lock().pid
    }

    /// Whether a kill has been delivered. Blocking paths check this and
    /// unwind through exit instead of going back to sleep.
    pub fn killed(&self) -> bool {
        self.inner.lock().killed
    }
}
