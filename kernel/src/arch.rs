//! Interface to the platform's processor primitives.
//!
//! The core never touches hardware directly. The boot layer registers a
//! [`Machine`] implementation once, early, and everything else goes through
//! it: interrupt masking for the spinlock protocol, processor identity for
//! per-CPU state, and the two context primitives (`context_switch` for
//! kernel-level switches, `return_to_user` for the trap-return path).

use conquer_once::spin::OnceCell;

use crate::task::context::Context;

/// Processor primitives supplied by the platform.
///
/// All methods must be callable from any processor. `cpu_id` is only
/// meaningful while interrupts are disabled (a thread could otherwise
/// migrate between the read and its use).
pub trait Machine: Send + Sync {
    /// Identity of the executing processor, in `0..NCPU`.
    fn cpu_id(&self) -> usize;

    /// Whether interrupts are currently enabled on this processor.
    fn interrupts_enabled(&self) -> bool;

    /// Enable interrupts on this processor.
    ///
    /// # Safety
    /// The caller must not hold any spinlock.
    unsafe fn enable_interrupts(&self);

    /// Disable interrupts on this processor.
    ///
    /// # Safety
    /// Must be balanced by the push-off/pop-off discipline in `spinlock`.
    unsafe fn disable_interrupts(&self);

    /// Save the callee-saved register context into `save` and resume
    /// execution from `load`. Returns only when something later switches
    /// back into `save`.
    ///
    /// # Safety
    /// Both pointers must reference live, exclusively-owned `Context`
    /// records, and the caller must satisfy the `sched` lock contract.
    unsafe fn context_switch(&self, save: *mut Context, load: *const Context);

    /// Resume user execution from the current thread's saved trap context.
    ///
    /// # Safety
    /// Only valid from a thread that entered the kernel through a trap.
    unsafe fn return_to_user(&self) -> !;
}

static MACHINE: OnceCell<&'static dyn Machine> = OnceCell::uninit();

/// Register the platform. The first registration wins; later calls are
/// ignored so test harnesses can call `init` repeatedly.
pub fn register_machine(machine: &'static dyn Machine) {
    let _ = MACHINE.try_init_once(|| machine);
}

/// The registered platform. Calling this before registration is a boot
/// sequencing bug and halts.
pub fn machine() -> &'static dyn Machine {
    *MACHINE
        .get()
        .expect("arch: no Machine registered; call kernel::init first")
}
