//! Thread lifecycle inside a process: create, identify, exit, join.
//!
//! Threads are cooperative. Creation clones the calling thread's trap
//! frame and redirects it at a caller-supplied entry point and stack;
//! exit turns the slot Zombie and wakes joiners; join reaps the Zombie
//! and recycles the slot. The last live thread exiting takes the whole
//! process down through the normal process exit path.

use core::ptr;

use crate::config::KTHREAD_STACK_SIZE;
use crate::per_cpu;
use crate::process::lifecycle;
use crate::task::scheduler::sched;
use crate::task::sleep::{sleep, wakeup, Channel};
use crate::task::thread::{self, ThreadError, ThreadState, Tid};

/// Create a new thread in the calling process. It becomes runnable with
/// a copy of the caller's trap frame, resuming at `entry` on the stack
/// region starting at `stack_base` (which the caller owns and must keep
/// alive for the thread's lifetime).
pub fn kthread_create(entry: u64, stack_base: u64) -> Result<Tid, ThreadError> {
    let (p, t) = per_cpu::my_thread().ok_or(ThreadError::NoCurrentThread)?;
    let caller_idx = t.inner.lock().trap_index;

    let (_, mut guard) = thread::alloc_thread(p)?;
    let tid = guard.tid;

    {
        let data = p.data_mut();
        let frames = data
            .trap_frames
            .as_mut()
            .expect("kthread_create: process without trap frames");
        let src = *frames.frame(caller_idx);
        let frame = frames.frame_mut(guard.trap_index);
        *frame = src;
        frame.epc = entry;
        frame.sp = stack_base + KTHREAD_STACK_SIZE - 16;
    }

    guard.state = ThreadState::Runnable;
    drop(guard);

    log::debug!(
        "kthread_create: tid {} entry {:#x}",
        tid.as_u64(),
        entry
    );
    Ok(tid)
}

/// The calling thread's tid.
pub fn kthread_id() -> Result<Tid, ThreadError> {
    per_cpu::my_thread()
        .map(|(_, t)| t.inner.lock().tid)
        .ok_or(ThreadError::NoCurrentThread)
}

/// Exit the calling thread. If it is the last live thread of its
/// process, the whole process exits with `status` instead. Never
/// returns; the slot stays Zombie until a join collects it.
pub fn kthread_exit(status: i32) -> ! {
    let (p, t) = per_cpu::my_thread().expect("kthread_exit: no running thread");

    let others_alive = {
        let _guard = p.inner.lock();
        let mut alive = 0;
        for other in p.threads.iter() {
            if ptr::eq(other, t) {
                continue;
            }
            let tg = other.inner.lock();
            if tg.state != ThreadState::Unused && tg.state != ThreadState::Zombie {
                alive += 1;
            }
        }
        alive
    };

    if others_alive == 0 {
        lifecycle::exit(status);
    }

    let mut tg = t.inner.lock();
    tg.xstate = status;
    tg.state = ThreadState::Zombie;
    log::debug!("kthread_exit: tid {} status {}", tg.tid.as_u64(), status);

    // Joiners sleep on this slot's channel. Our own lock is held, which
    // wakeup tolerates because it skips the caller.
    wakeup(Channel::of(t));

    let _tg = sched(tg, t.context_ptr());
    panic!("zombie thread resumed");
}

/// Wait for the thread `tid` of the calling process to finish, reap its
/// slot, and return its exit status. Returns 0 when the slot was already
/// recycled by the time we looked. Fails if no thread in this process
/// carries that tid.
pub fn kthread_join(tid: Tid) -> Result<i32, ThreadError> {
    let (p, _) = per_cpu::my_thread().ok_or(ThreadError::NoCurrentThread)?;

    for target in p.threads.iter() {
        let mut tg = target.inner.lock();
        if tg.tid != tid {
            continue;
        }

        while tg.state != ThreadState::Unused && tg.state != ThreadState::Zombie {
            tg = sleep(Channel::of(target), tg);
        }

        let status = if tg.state == ThreadState::Zombie {
            let status = tg.xstate;
            target.free(&mut tg);
            status
        } else {
            0
        };
        return Ok(status);
    }

    Err(ThreadError::NotFound)
}
