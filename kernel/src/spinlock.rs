//! Spinlocks with interrupt-disable-on-acquire semantics.
//!
//! Holding a spinlock with interrupts enabled invites a classic deadlock:
//! an interrupt handler on the same processor spins on a lock its own
//! interrupted context holds. Acquiring any `SpinLock` therefore disables
//! interrupts first, and the push-off/pop-off pair tracks nesting so the
//! original interrupt state is restored only when the outermost lock is
//! released.
//!
//! The scheduler's switch protocol needs two escape hatches a plain RAII
//! guard cannot express: a lock acquired on one kernel stack is released on
//! another after a context switch. `SpinLockGuard::leak` keeps the lock
//! held while discarding the guard, and `force_unlock` releases a lock the
//! current stack never acquired. Everything outside the switch path uses
//! the guard normally.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::arch::machine;
use crate::per_cpu;

/// Disable interrupts and bump this processor's lock-nesting depth,
/// remembering the pre-disable interrupt state at depth zero.
pub fn push_off() {
    let m = machine();
    let was_enabled = m.interrupts_enabled();
    unsafe { m.disable_interrupts() };
    let cpu = per_cpu::cpu();
    if cpu.lock_depth() == 0 {
        cpu.set_saved_interrupts(was_enabled);
    }
    cpu.set_lock_depth(cpu.lock_depth() + 1);
}

/// Undo one `push_off`, re-enabling interrupts when the outermost level
/// is reached and they were enabled before.
pub fn pop_off() {
    let m = machine();
    if m.interrupts_enabled() {
        panic!("pop_off: interrupts enabled under a held lock");
    }
    let cpu = per_cpu::cpu();
    let depth = cpu.lock_depth();
    if depth == 0 {
        panic!("pop_off: unbalanced");
    }
    cpu.set_lock_depth(depth - 1);
    if depth == 1 && cpu.saved_interrupts() {
        unsafe { m.enable_interrupts() };
    }
}

/// A test-and-set spinlock guarding `T`, tagged with the owning processor
/// so `holding` checks and recursion detection work.
pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    /// Owning cpu id plus one; zero means unheld.
    owner: AtomicUsize,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            owner: AtomicUsize::new(0),
            data: UnsafeCell::new(value),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Acquire the lock, spinning until it is free. Interrupts stay
    /// disabled until the returned guard (and any nested guards) drop.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        push_off();
        if self.holding() {
            panic!("spinlock: recursive acquire");
        }
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin_loop();
        }
        self.owner.store(machine().cpu_id() + 1, Ordering::Relaxed);
        SpinLockGuard { lock: self }
    }

    /// Whether the executing processor holds this lock. Only meaningful
    /// with interrupts disabled.
    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
            && self.owner.load(Ordering::Relaxed) == machine().cpu_id() + 1
    }

    /// Release a lock this stack did not acquire through a live guard.
    /// The scheduler uses this to drop a thread lock that crossed a
    /// context switch.
    ///
    /// # Safety
    /// The lock must actually be held, and no guard for it may be alive.
    pub unsafe fn force_unlock(&self) {
        self.release();
    }

    /// Release `guard` and hand back the lock it came from, so the caller
    /// can reacquire later. This is the sleep protocol's way of saying
    /// "unlock now, relock after waking".
    pub fn unlock<'a>(guard: SpinLockGuard<'a, T>) -> &'a SpinLock<T> {
        let lock = guard.lock;
        drop(guard);
        lock
    }

    /// Raw pointer to the protected data, for lock-free debug readers.
    pub fn data_ptr(&self) -> *mut T {
        self.data.get()
    }

    fn release(&self) {
        if !self.holding() {
            panic!("spinlock: release of a lock not held by this cpu");
        }
        self.owner.store(0, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        pop_off();
    }
}

pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

impl<'a, T: ?Sized> SpinLockGuard<'a, T> {
    /// Keep the lock held but destroy the guard, returning direct access
    /// to the data. Ownership of the lock passes to whoever eventually
    /// calls `force_unlock`.
    pub fn leak(this: Self) -> &'a mut T {
        let ptr = this.lock.data.get();
        core::mem::forget(this);
        unsafe { &mut *ptr }
    }
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
