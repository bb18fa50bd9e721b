//! Counting semaphores.
//!
//! Built from two binary semaphores rather than a native counter: S1
//! serializes updates of the value, S2 gates blocking when the value is
//! exhausted. A `down` first passes through S2, so when the count runs
//! out the S2 signal stays consumed and later callers block there; an
//! `up` that brings the value back from zero re-opens S2 for exactly one
//! waiter, which re-opens it for the next if value allows. Counting
//! semaphores are created per use-site; only their two gates live in the
//! global pool.

use core::sync::atomic::{AtomicI32, Ordering};

use super::bsem::{bsem_alloc, bsem_down, bsem_free, bsem_up, BsemId, SemError};

pub struct CountingSemaphore {
    /// The count. Serialized by S1; the atomic is for shared access, not
    /// for lock-free ordering.
    value: AtomicI32,
    s1: BsemId,
    s2: BsemId,
}

impl CountingSemaphore {
    /// Create a semaphore seeded with `initial` permits. Negative seeds
    /// are rejected; a seed below one leaves S2 consumed so the first
    /// `down` blocks.
    pub fn new(initial: i32) -> Result<Self, SemError> {
        if initial < 0 {
            return Err(SemError::NegativeValue);
        }

        let s1 = bsem_alloc()?;
        let s2 = match bsem_alloc() {
            Ok(id) => id,
            Err(err) => {
                bsem_free(s1);
                return Err(err);
            }
        };

        if initial < 1 {
            bsem_down(s2);
        }

        Ok(CountingSemaphore {
            value: AtomicI32::new(initial),
            s1,
            s2,
        })
    }

    /// Take one permit, blocking while none are available.
    pub fn down(&self) {
        bsem_down(self.s2);
        bsem_down(self.s1);
        let value = self.value.fetch_sub(1, Ordering::Relaxed) - 1;
        if value > 0 {
            // Still permits left; let the next waiter through S2.
            bsem_up(self.s2);
        }
        bsem_up(self.s1);
    }

    /// Release one permit, waking a blocked waiter when the count comes
    /// back from zero.
    pub fn up(&self) {
        bsem_down(self.s1);
        let value = self.value.fetch_add(1, Ordering::Relaxed) + 1;
        if value == 1 {
            bsem_up(self.s2);
        }
        bsem_up(self.s1);
    }

    /// Current permit count. Racy by nature; useful for diagnostics and
    /// tests.
    pub fn value(&self) -> i32 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Drop for CountingSemaphore {
    fn drop(&mut self) {
        bsem_free(self.s1);
        bsem_free(self.s2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::bsem::bsem_is_signaled;
    use crate::test_support;

    #[test]
    fn negative_seed_is_rejected() {
        test_support::run_isolated(|| {
            assert!(matches!(
                CountingSemaphore::new(-1),
                Err(SemError::NegativeValue)
            ));
        });
    }

    #[test]
    fn balanced_ups_and_downs_restore_the_seed() {
        test_support::run_isolated(|| {
            let sem = CountingSemaphore::new(3).unwrap();
            sem.down();
            sem.down();
            sem.up();
            sem.down();
            sem.up();
            sem.up();
            assert_eq!(sem.value(), 3);
        });
    }

    #[test]
    fn zero_seed_leaves_the_gate_closed() {
        test_support::run_isolated(|| {
            let sem = CountingSemaphore::new(0).unwrap();
            // S2 was consumed at creation: a down would block right now.
            assert!(!bsem_is_signaled(sem.s2));
            sem.up();
            assert_eq!(sem.value(), 1);
            // The gate reopened; this down must not block.
            sem.down();
            assert_eq!(sem.value(), 0);
            assert!(!bsem_is_signaled(sem.s2));
        });
    }

    #[test]
    fn gate_stays_open_while_permits_remain() {
        test_support::run_isolated(|| {
            let sem = CountingSemaphore::new(2).unwrap();
            sem.down();
            // One permit left: the next waiter may pass.
            assert!(bsem_is_signaled(sem.s2));
            sem.down();
            // Count hit zero: the gate is closed.
            assert!(!bsem_is_signaled(sem.s2));
        });
    }

    #[test]
    fn dropping_returns_both_gates_to_the_pool() {
        test_support::run_isolated(|| {
            let before = {
                let sem = CountingSemaphore::new(1).unwrap();
                (sem.s1, sem.s2)
            };
            // Both slots are reusable immediately after the drop.
            let a = crate::sync::bsem::bsem_alloc().unwrap();
            let b = crate::sync::bsem::bsem_alloc().unwrap();
            assert_eq!((a, b), before);
        });
    }
}
