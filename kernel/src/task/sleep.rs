//! The blocking/wakeup channel.
//!
//! A channel is an opaque key, conventionally the address of the object
//! being waited on. Sleepers record the key and go to sleep; `wakeup`
//! makes every sleeper with a matching key runnable. Keys can collide
//! across unrelated objects and wakeups can be spurious, so every sleeper
//! re-checks its condition in a loop after waking.

use crate::per_cpu;
use crate::spinlock::{SpinLock, SpinLockGuard};
use crate::task::scheduler::sched;
use crate::task::thread::ThreadState;

/// A sleep key. Two sleepers wait for the same event iff their channels
/// compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel(usize);

impl Channel {
    /// Key derived from an object's address. Stable for objects in the
    /// fixed tables, which is where every wait in this kernel lives.
    pub fn of<T>(obj: &T) -> Channel {
        Channel(obj as *const T as usize)
    }
}

/// Atomically release `guard` and sleep on `chan`; reacquire the same
/// lock before returning.
///
/// The ordering is what makes this race-free: the calling thread's own
/// lock is taken before the caller's lock is released, and any `wakeup`
/// must take that same thread lock to move the thread out of Sleeping.
/// A wakeup issued between our release and our switch therefore spins
/// until we are fully parked, and is not lost.
pub fn sleep<'a, T>(chan: Channel, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
    let (_, t) = per_cpu::my_thread().expect("sleep: no running thread");

    let mut tg = t.inner.lock();
    let lock = SpinLock::unlock(guard);

    tg.chan = Some(chan);
    tg.state = ThreadState::Sleeping;

    let mut tg = sched(tg, t.context_ptr());

    tg.chan = None;
    drop(tg);

    lock.lock()
}

/// Make every thread sleeping on `chan` runnable, except the caller.
///
/// Takes each thread's lock in turn, so the caller must not already hold
/// any thread lock other than its own.
pub fn wakeup(chan: Channel) {
    let me = per_cpu::my_thread().map(|(_, t)| t as *const _);

    for p in crate::process::table::pool() {
        for t in p.threads.iter() {
            if Some(t as *const _) == me {
                continue;
            }
            let mut guard = t.inner.lock();
            if guard.state == ThreadState::Sleeping && guard.chan == Some(chan) {
                guard.state = ThreadState::Runnable;
            }
        }
    }
}
