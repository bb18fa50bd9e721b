//! The per-processor scheduler.
//!
//! Every processor runs `scheduler` forever: scan the process table in
//! order, and for each eligible process scan its thread array in order,
//! switching into the first Runnable thread found. There is no ready
//! queue and no explicit rotation; round-robin behavior emerges from
//! rescanning from the top after every switch back.
//!
//! Control returns here only when the running thread calls `sched` with
//! its own lock held. Lock ownership crosses the switch in both
//! directions: the scheduler acquires the thread lock and the thread
//! releases it after resuming (see `fork_ret` and `sleep`), and on the
//! way back the thread's `sched` leaves its lock for the scheduler loop
//! to release.

use crate::arch::machine;
use crate::per_cpu::{self, Current};
use crate::process::table;
use crate::process::ProcessInner;
use crate::process::ProcState;
use crate::signal::constants::{sig_mask, SIGCONT, SIGKILL};
use crate::spinlock::SpinLockGuard;
use crate::task::context::Context;
use crate::task::thread::{ThreadInner, ThreadState};

/// Whether a process's threads may be scheduled at all.
///
/// A stopped process is skipped, unless a kill is queued or an unblocked
/// continue is waiting; those must get a chance to run the delivery path.
pub fn is_schedulable(inner: &ProcessInner) -> bool {
    inner.state == ProcState::Used
        && (!inner.signals.stopped
            || inner.signals.pending & sig_mask(SIGKILL) != 0
            || (inner.signals.pending & sig_mask(SIGCONT) != 0
                && inner.signals.blocked & sig_mask(SIGCONT) == 0))
}

/// The scheduler loop. Never returns.
pub fn scheduler() -> ! {
    loop {
        // With nothing runnable the loop spins; interrupts must be able
        // to land here or a processor waiting for another's wakeup would
        // never see it.
        unsafe { machine().enable_interrupts() };

        for (pi, p) in table::pool().iter().enumerate() {
            let eligible = {
                let guard = p.inner.lock();
                is_schedulable(&guard)
            };
            if !eligible {
                continue;
            }

            for (ti, t) in p.threads.iter().enumerate() {
                let guard = t.inner.lock();
                if guard.state != ThreadState::Runnable {
                    continue;
                }

                // Keep the slot locked across the switch; the resuming
                // thread releases it on its side, and whoever switches
                // back leaves it held for the force_unlock below. Note
                // that a thread yielding straight back is examined again
                // before this pass moves on, which biases toward
                // immediately-rerunnable threads.
                let inner = SpinLockGuard::leak(guard);
                inner.state = ThreadState::Running;
                per_cpu::set_current(Some(Current {
                    proc_idx: pi,
                    thread_idx: ti,
                }));

                unsafe {
                    machine().context_switch(per_cpu::scheduler_context(), t.context_ptr());
                }

                // The thread is done for now; it set a non-Running state
                // before switching back.
                per_cpu::set_current(None);
                unsafe { t.inner.force_unlock() };
            }
        }
    }
}

/// Switch from the current thread to this processor's scheduler loop.
///
/// Contract: the caller holds exactly its own thread lock (passed as
/// `guard`), has already moved the thread out of Running, and interrupts
/// are disabled at the hardware level. Anything else means a wakeup
/// could be lost or a lock could deadlock across processors, so each
/// violation halts.
pub fn sched<'a>(
    guard: SpinLockGuard<'a, ThreadInner>,
    ctx: *mut Context,
) -> SpinLockGuard<'a, ThreadInner> {
    let m = machine();
    let cpu = per_cpu::cpu();

    if cpu.lock_depth() != 1 {
        panic!("sched: holding locks besides the thread lock");
    }
    if guard.state == ThreadState::Running {
        panic!("sched: thread still Running");
    }
    if m.interrupts_enabled() {
        panic!("sched: interruptible");
    }

    // The saved-interrupt flag travels with the thread, not the
    // processor; another thread will run here before we return.
    let intena = cpu.saved_interrupts();
    unsafe { m.context_switch(ctx, per_cpu::scheduler_context()) };
    per_cpu::cpu().set_saved_interrupts(intena);

    guard
}

/// Give up the processor for one scheduling round.
pub fn yield_now() {
    let (_, t) = per_cpu::my_thread().expect("yield: no running thread");
    let mut guard = t.inner.lock();
    guard.state = ThreadState::Runnable;
    let guard = sched(guard, t.context_ptr());
    drop(guard);
}

/// First landing point of every new thread, entered from the scheduler's
/// switch with the thread lock still held.
pub(crate) extern "C" fn fork_ret() -> ! {
    let (_, t) = per_cpu::my_thread().expect("fork_ret: no current thread");
    // Release the lock the scheduler acquired on our behalf.
    unsafe { t.inner.force_unlock() };
    unsafe { machine().return_to_user() }
}
