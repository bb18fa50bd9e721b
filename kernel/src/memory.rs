//! Interface to the virtual-memory collaborator.
//!
//! The execution core does not manage page tables. It asks the platform
//! for exactly four things: a fresh empty address space, a copy of an
//! address space's mapped range, movement of bytes across the user/kernel
//! boundary, and page-sized allocations for kernel stacks and trap
//! contexts. Freeing is dropping: everything handed out is an owned value.

use alloc::boxed::Box;
use conquer_once::spin::OnceCell;

use crate::task::context::{TrapFrame, TrapFrameBlock};

/// Size of one kernel page.
pub const PAGE_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The platform could not satisfy an allocation. Always recoverable;
    /// creation paths unwind and report it to their caller.
    OutOfMemory,
    /// A user-space range was not mapped or not accessible.
    BadAddress,
}

/// One page of kernel memory, page-aligned.
#[repr(C, align(4096))]
pub struct Page(pub [u8; PAGE_SIZE]);

impl Page {
    pub const fn zeroed() -> Self {
        Page([0; PAGE_SIZE])
    }
}

/// A thread's kernel stack, one page, used top-down.
pub struct KernelStack {
    page: Box<Page>,
}

impl KernelStack {
    pub fn new(page: Box<Page>) -> Self {
        KernelStack { page }
    }

    /// Address just past the stack's highest byte; the initial stack
    /// pointer for a fresh thread context.
    pub fn top(&self) -> u64 {
        self.page.0.as_ptr() as u64 + PAGE_SIZE as u64
    }
}

/// One process's user address space. The concrete mapping machinery
/// belongs to the platform; dropping the object tears the space down.
pub trait AddressSpace: Send {
    /// Bytes currently mapped for user code, data and stack.
    fn size(&self) -> usize;

    /// Duplicate this space's mapped range into `target` (fork).
    fn clone_into(&self, target: &mut dyn AddressSpace) -> Result<(), VmError>;

    /// Copy `src` to user address `dst`.
    fn copy_out(&mut self, dst: u64, src: &[u8]) -> Result<(), VmError>;

    /// Copy `len(dst)` bytes from user address `src`.
    fn copy_in(&self, src: u64, dst: &mut [u8]) -> Result<(), VmError>;
}

/// The platform's allocator for everything the core owns per process and
/// per thread. All methods are fallible; callers unwind partial creations.
pub trait MemoryManager: Send + Sync {
    /// A fresh, empty address space.
    fn create_address_space(&self) -> Result<Box<dyn AddressSpace>, VmError>;

    /// One zeroed kernel page (kernel stacks).
    fn alloc_page(&self) -> Result<Box<Page>, VmError>;

    /// The per-process trap-context page holding one frame per thread slot.
    fn alloc_trap_block(&self) -> Result<Box<TrapFrameBlock>, VmError>;

    /// A single trap frame (a thread's signal-delivery backup).
    fn alloc_trap_frame(&self) -> Result<Box<TrapFrame>, VmError>;
}

static MEMORY: OnceCell<&'static dyn MemoryManager> = OnceCell::uninit();

/// Register the platform allocator. First registration wins.
pub fn register_memory(mm: &'static dyn MemoryManager) {
    let _ = MEMORY.try_init_once(|| mm);
}

/// The registered allocator. Use before registration is a boot bug.
pub fn memory() -> &'static dyn MemoryManager {
    *MEMORY
        .get()
        .expect("memory: no MemoryManager registered; call kernel::init first")
}
