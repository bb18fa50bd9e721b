//! Mock platform and test harness.
//!
//! Compiled only for tests (or with the `testing` feature). The mock
//! machine models a single processor with a software interrupt flag and
//! no real context switch; the mock memory manager backs address spaces
//! with plain buffers and can be told to start failing, which is how the
//! allocation-rollback paths get exercised. Because the kernel's tables
//! are global, tests run serialized through [`run_isolated`], which also
//! resets every table first.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use conquer_once::spin::OnceCell;
use log::{LevelFilter, Log, Metadata, Record};

use crate::arch::Machine;
use crate::fs::{DirRef, Directory, FileObject, FileRef};
use crate::memory::{AddressSpace, MemoryManager, Page, VmError};
use crate::per_cpu::{self, Current};
use crate::process::table;
use crate::process::{Pid, ProcState, Process};
use crate::task::context::{Context, TrapFrame, TrapFrameBlock};

/// Bytes of simulated user memory per mock address space.
pub const MOCK_SPACE_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Mock machine
// ---------------------------------------------------------------------------

/// One software-modeled processor. Everything except a real context
/// switch; tests are written so they never reach one.
pub struct MockMachine {
    interrupts: AtomicBool,
}

impl MockMachine {
    const fn new() -> Self {
        MockMachine {
            interrupts: AtomicBool::new(true),
        }
    }
}

impl Machine for MockMachine {
    fn cpu_id(&self) -> usize {
        0
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts.load(Ordering::Relaxed)
    }

    unsafe fn enable_interrupts(&self) {
        self.interrupts.store(true, Ordering::Relaxed);
    }

    unsafe fn disable_interrupts(&self) {
        self.interrupts.store(false, Ordering::Relaxed);
    }

    unsafe fn context_switch(&self, _save: *mut Context, _load: *const Context) {
        panic!("mock machine cannot context switch; this path needs real hardware");
    }

    unsafe fn return_to_user(&self) -> ! {
        panic!("mock machine cannot return to user mode");
    }
}

// ---------------------------------------------------------------------------
// Mock memory
// ---------------------------------------------------------------------------

/// Buffer-backed allocator with failure injection. The budget counts the
/// allocations that will still succeed; `usize::MAX` means unlimited.
pub struct MockMemory {
    budget: AtomicUsize,
}

impl MockMemory {
    const fn new() -> Self {
        MockMemory {
            budget: AtomicUsize::new(usize::MAX),
        }
    }

    fn take_budget(&self) -> Result<(), VmError> {
        loop {
            let left = self.budget.load(Ordering::Relaxed);
            if left == usize::MAX {
                return Ok(());
            }
            if left == 0 {
                return Err(VmError::OutOfMemory);
            }
            if self
                .budget
                .compare_exchange(left, left - 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(());
            }
        }
    }
}

impl MemoryManager for MockMemory {
    fn create_address_space(&self) -> Result<Box<dyn AddressSpace>, VmError> {
        self.take_budget()?;
        Ok(Box::new(MockAddressSpace {
            mem: vec![0; MOCK_SPACE_SIZE],
        }))
    }

    fn alloc_page(&self) -> Result<Box<Page>, VmError> {
        self.take_budget()?;
        Ok(Box::new(Page::zeroed()))
    }

    fn alloc_trap_block(&self) -> Result<Box<TrapFrameBlock>, VmError> {
        self.take_budget()?;
        Ok(Box::new(TrapFrameBlock::zeroed()))
    }

    fn alloc_trap_frame(&self) -> Result<Box<TrapFrame>, VmError> {
        self.take_budget()?;
        Ok(Box::new(TrapFrame::zeroed()))
    }
}

/// Let the next `n` platform allocations succeed, then fail them all.
pub fn set_alloc_budget(n: usize) {
    MEMORY.budget.store(n, Ordering::Relaxed);
}

/// Back to unlimited allocations.
pub fn clear_alloc_budget() {
    MEMORY.budget.store(usize::MAX, Ordering::Relaxed);
}

/// A user address space as a flat buffer; addresses are offsets.
struct MockAddressSpace {
    mem: Vec<u8>,
}

impl MockAddressSpace {
    fn check(&self, addr: u64, len: usize) -> Result<usize, VmError> {
        let start = addr as usize;
        let end = start.checked_add(len).ok_or(VmError::BadAddress)?;
        if end > self.mem.len() {
            return Err(VmError::BadAddress);
        }
        Ok(start)
    }
}

impl AddressSpace for MockAddressSpace {
    fn size(&self) -> usize {
        self.mem.len()
    }

    fn clone_into(&self, target: &mut dyn AddressSpace) -> Result<(), VmError> {
        target.copy_out(0, &self.mem)
    }

    fn copy_out(&mut self, dst: u64, src: &[u8]) -> Result<(), VmError> {
        let start = self.check(dst, src.len())?;
        self.mem[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn copy_in(&self, src: u64, dst: &mut [u8]) -> Result<(), VmError> {
        let start = self.check(src, dst.len())?;
        dst.copy_from_slice(&self.mem[start..start + dst.len()]);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock file system objects
// ---------------------------------------------------------------------------

pub struct StubFile;
impl FileObject for StubFile {}

pub struct StubDir;
impl Directory for StubDir {}

/// A fresh open-file handle with observable reference count.
pub fn stub_file() -> FileRef {
    alloc::sync::Arc::new(StubFile)
}

/// A fresh directory handle.
pub fn stub_dir() -> DirRef {
    alloc::sync::Arc::new(StubDir)
}

// ---------------------------------------------------------------------------
// Capturing logger
// ---------------------------------------------------------------------------

struct CaptureLogger;

static CAPTURED: spin::Mutex<Vec<String>> = spin::Mutex::new(Vec::new());

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        CAPTURED
            .lock()
            .push(format!("{} {}", record.level(), record.args()));
    }

    fn flush(&self) {}
}

/// Everything logged since the last reset.
pub fn captured_logs() -> Vec<String> {
    CAPTURED.lock().clone()
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

static MACHINE: MockMachine = MockMachine::new();
static MEMORY: MockMemory = MockMemory::new();
static LOGGER: CaptureLogger = CaptureLogger;
static TEST_LOCK: spin::Mutex<()> = spin::Mutex::new(());

fn bootstrap() {
    static BOOT: OnceCell<()> = OnceCell::uninit();
    let _ = BOOT.try_init_once(|| {
        crate::init(&MACHINE, &MEMORY);
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);
    });
}

/// Put every global table back to its boot state.
fn reset() {
    unsafe { MACHINE.enable_interrupts() };
    let cpu = per_cpu::cpu();
    cpu.set_lock_depth(0);
    cpu.set_saved_interrupts(false);
    per_cpu::set_current(None);
    clear_alloc_budget();

    for p in table::pool().iter() {
        let mut guard = p.inner.lock();
        table::free_process(p, &mut guard);
    }
    *table::tree().lock() = [None; crate::config::NPROC];
    table::reset_init_slot();
    crate::sync::bsem::reset_pool();

    CAPTURED.lock().clear();
}

/// Run `f` with the mock platform registered and all tables fresh.
/// Tests share global state, so they serialize through here.
pub fn run_isolated<F: FnOnce()>(f: F) {
    let _serial = TEST_LOCK.lock();
    bootstrap();
    reset();
    f();
}

/// Run `f` as if thread `thread_idx` of `p` were executing on this
/// processor, the way the scheduler would have set things up.
pub fn with_current<R>(p: &'static Process, thread_idx: usize, f: impl FnOnce() -> R) -> R {
    per_cpu::set_current(Some(Current {
        proc_idx: table::index_of(p),
        thread_idx,
    }));
    let result = f();
    per_cpu::set_current(None);
    result
}

/// Allocate a process slot the way the lifecycle paths do, name it, and
/// hand it back unlocked.
pub fn stage_process(name: &str) -> (&'static Process, Pid) {
    let (p, guard) = table::alloc_process().expect("test: process table full");
    p.data_mut().name.push_str(name);
    let pid = guard.pid;
    drop(guard);
    (p, pid)
}

/// Mark a staged process as an exited child with the given status.
pub fn make_zombie(p: &'static Process, status: i32) {
    let mut guard = p.inner.lock();
    guard.state = ProcState::Zombie;
    guard.xstate = status;
}

/// Link `child` under `parent` in the process tree.
pub fn set_parent(child: &'static Process, parent: &'static Process) {
    let mut tree = table::tree().lock();
    tree[table::index_of(child)] = Some(table::index_of(parent));
}
