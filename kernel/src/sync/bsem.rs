//! The binary-semaphore pool.
//!
//! A fixed array of two-state flags, each under its own lock, blocking
//! through the sleep/wakeup channel keyed on the slot's address. This is
//! the foundation every higher-level synchronization primitive in the
//! system is built from.

use crate::config::MAX_BSEM;
use crate::spinlock::SpinLock;
use crate::task::sleep::{sleep, wakeup, Channel};

/// Handle into the pool. Only `bsem_alloc` creates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BsemId(usize);

impl BsemId {
    pub fn as_usize(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemError {
    /// No free slot in the pool.
    PoolExhausted,
    /// Counting semaphores reject a negative seed value.
    NegativeValue,
}

struct BsemSlot {
    used: bool,
    signaled: bool,
}

struct BinarySemaphore {
    inner: SpinLock<BsemSlot>,
}

impl BinarySemaphore {
    const fn new() -> Self {
        BinarySemaphore {
            inner: SpinLock::new(BsemSlot {
                used: false,
                signaled: false,
            }),
        }
    }
}

static POOL: [BinarySemaphore; MAX_BSEM] = [const { BinarySemaphore::new() }; MAX_BSEM];

/// Claim the first free slot, initially signaled.
pub fn bsem_alloc() -> Result<BsemId, SemError> {
    for (i, sem) in POOL.iter().enumerate() {
        let mut guard = sem.inner.lock();
        if !guard.used {
            guard.used = true;
            guard.signaled = true;
            log::trace!("bsem {} allocated", i);
            return Ok(BsemId(i));
        }
    }
    Err(SemError::PoolExhausted)
}

/// Return a slot to the pool. Sleepers still blocked on it fall through
/// their next wakeup's recheck and return (the handle is gone).
pub fn bsem_free(id: BsemId) {
    if id.0 >= MAX_BSEM {
        return;
    }
    let mut guard = POOL[id.0].inner.lock();
    guard.used = false;
    guard.signaled = false;
}

/// Consume the signal, blocking until one is available. A `down` on a
/// slot that has been freed returns immediately.
pub fn bsem_down(id: BsemId) {
    let sem = &POOL[id.0];
    let mut guard = sem.inner.lock();
    // Recheck after every wakeup: channels are shared by coincidence of
    // address reuse and wakeups can be spurious.
    while guard.used && !guard.signaled {
        guard = sleep(Channel::of(sem), guard);
    }
    if guard.used {
        guard.signaled = false;
    }
}

/// Raise the signal and wake everyone blocked on this slot. Exactly one
/// of them will consume it; the rest go back to sleep.
pub fn bsem_up(id: BsemId) {
    if id.0 >= MAX_BSEM {
        return;
    }
    let sem = &POOL[id.0];
    let mut guard = sem.inner.lock();
    guard.signaled = true;
    wakeup(Channel::of(sem));
    drop(guard);
}

/// Observe a slot's signaled flag without consuming it.
#[cfg(any(test, feature = "testing"))]
pub fn bsem_is_signaled(id: BsemId) -> bool {
    POOL[id.0].inner.lock().signaled
}

/// Test-harness hook: return every slot to the pool.
#[cfg(any(test, feature = "testing"))]
pub(crate) fn reset_pool() {
    for sem in POOL.iter() {
        let mut guard = sem.inner.lock();
        guard.used = false;
        guard.signaled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn alloc_starts_signaled_and_down_consumes() {
        test_support::run_isolated(|| {
            let id = bsem_alloc().unwrap();
            assert!(bsem_is_signaled(id));
            bsem_down(id); // does not block: signal is available
            assert!(!bsem_is_signaled(id));
            bsem_up(id);
            assert!(bsem_is_signaled(id));
            bsem_free(id);
        });
    }

    #[test]
    fn down_on_freed_slot_returns_immediately() {
        test_support::run_isolated(|| {
            let id = bsem_alloc().unwrap();
            bsem_free(id);
            bsem_down(id); // no blocking, no effect
            assert!(!bsem_is_signaled(id));
        });
    }

    #[test]
    fn pool_exhaustion_reports_failure_and_free_recovers() {
        test_support::run_isolated(|| {
            let mut ids = alloc::vec::Vec::new();
            for _ in 0..crate::config::MAX_BSEM {
                ids.push(bsem_alloc().unwrap());
            }
            assert_eq!(bsem_alloc(), Err(SemError::PoolExhausted));
            bsem_free(ids.pop().unwrap());
            assert!(bsem_alloc().is_ok());
        });
    }
}
