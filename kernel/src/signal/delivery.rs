//! Signal posting and delivery.
//!
//! Raising a signal only sets a pending bit; nothing is ever pushed into
//! another thread's execution synchronously. The target delivers to
//! itself: `deliver_pending` runs in the target's own context at the one
//! well-defined check point, just before returning to user mode.
//!
//! Kill, stop and continue are handled in the kernel. Everything else
//! with a registered handler takes the user path: the thread's trap frame
//! is snapshotted, the trampoline is copied below the user stack pointer,
//! and the frame is rewritten so the thread resumes inside its handler.
//! The handler's return lands in the trampoline, whose sigreturn request
//! undoes all of it.

use super::constants::*;
use super::trampoline::SIGRETURN_TRAMPOLINE;
use crate::config::NSIG;
use crate::per_cpu;
use crate::process::table;
use crate::process::{Pid, ProcState, Process, ProcessInner};
use crate::signal::types::SigAction;
use crate::task::thread::{Thread, ThreadState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// Not a valid signal number.
    InvalidSignal,
    /// The kill/stop pair cannot be reconfigured.
    ProtectedSignal,
    /// No live process with that pid.
    NotFound,
}

/// Queue `sig` for the process `pid`.
///
/// Posting to a process that ignores the signal succeeds as a no-op
/// (except for the unignorable kill/stop pair). Posting to a zombie or
/// an unknown pid fails. Delivery itself happens later, in the target's
/// own context.
pub fn send_signal(pid: Pid, sig: u32) -> Result<(), SignalError> {
    if !is_valid_signal(sig) {
        return Err(SignalError::InvalidSignal);
    }

    for p in table::pool().iter() {
        let mut guard = p.inner.lock();
        if guard.state == ProcState::Unused || guard.pid != pid {
            continue;
        }

        if is_catchable(sig) && guard.signals.action(sig).is_ignore() {
            log::debug!(
                "signal: {} ignored by pid {}",
                signal_name(sig),
                pid.as_u64()
            );
            return Ok(());
        }
        if guard.state == ProcState::Zombie {
            return Err(SignalError::NotFound);
        }

        guard.signals.set_pending(sig);
        log::debug!(
            "signal: {} queued for pid {}",
            signal_name(sig),
            pid.as_u64()
        );
        return Ok(());
    }

    Err(SignalError::NotFound)
}

/// Deliver every pending, unblocked signal of `t`'s process, in
/// ascending signal-number order. Runs in the target's own context on
/// the way back to user mode; `t` is the thread about to resume.
pub fn deliver_pending(p: &'static Process, t: &'static Thread) {
    let trap_idx = t.inner.lock().trap_index;
    let mut guard = p.inner.lock();

    for sig in 1..NSIG as u32 {
        if guard.signals.deliverable() & sig_mask(sig) == 0 {
            continue;
        }

        let action = guard.signals.action(sig);

        // Mask the handler's set plus the signal itself while it is
        // being handled, so delivery cannot re-enter. The previous mask
        // is restored right away on the kernel path, and by sigreturn on
        // the user path.
        guard.signals.mask_backup = guard.signals.blocked;
        guard.signals.blocked = action.mask | sig_mask(sig);

        if action.is_default() || sig == SIGCONT {
            kernel_path(p, &mut guard, sig);
            guard.signals.blocked = guard.signals.mask_backup;
        } else if action.is_ignore() {
            // Normally unreachable: posting an ignored signal is a no-op.
            // A disposition changed after posting still gets dropped.
            guard.signals.clear_pending(sig);
            guard.signals.blocked = guard.signals.mask_backup;
        } else {
            user_path(p, &mut guard, t, trap_idx, sig, action);
        }
    }
}

/// Kernel-defined semantics for default dispositions and continue.
fn kernel_path(p: &Process, guard: &mut ProcessInner, sig: u32) {
    match sig {
        SIGSTOP => {
            guard.signals.clear_pending(sig);
            guard.signals.stopped = true;
            log::info!("signal: pid {} stopped", guard.pid.as_u64());
        }
        SIGCONT => {
            guard.signals.clear_pending(sig);
            guard.signals.stopped = false;
            log::info!("signal: pid {} continued", guard.pid.as_u64());
        }
        _ => {
            // Kill semantics: mark the process and force every sleeping
            // thread runnable so it unwinds to exit promptly.
            guard.killed = true;
            guard.signals.clear_pending(sig);
            guard.signals.stopped = false;
            for t in p.threads.iter() {
                let mut tg = t.inner.lock();
                if tg.state == ThreadState::Sleeping {
                    tg.state = ThreadState::Runnable;
                }
            }
            log::info!(
                "signal: pid {} killed by {}",
                guard.pid.as_u64(),
                signal_name(sig)
            );
        }
    }
}

/// Redirect the thread into a registered user handler.
fn user_path(
    p: &'static Process,
    guard: &mut ProcessInner,
    t: &'static Thread,
    trap_idx: usize,
    sig: u32,
    action: SigAction,
) {
    let data = p.data_mut();
    let sp;
    {
        let frames = data
            .trap_frames
            .as_mut()
            .expect("delivery: process without trap frames");
        let frame = frames.frame_mut(trap_idx);

        // Snapshot the interrupted state; sigreturn restores it.
        let backup = t
            .data_mut()
            .trap_backup
            .as_mut()
            .expect("delivery: thread without backup frame");
        **backup = *frame;

        sp = frame.sp - SIGRETURN_TRAMPOLINE.len() as u64;
    }

    {
        let space = data
            .addr_space
            .as_mut()
            .expect("delivery: process without address space");
        if space.copy_out(sp, &SIGRETURN_TRAMPOLINE).is_err() {
            // Leave the signal pending and retry at the next check
            // point rather than jump through a bad stack.
            guard.signals.blocked = guard.signals.mask_backup;
            log::warn!(
                "signal: trampoline copy failed for pid {}, {} deferred",
                guard.pid.as_u64(),
                signal_name(sig)
            );
            return;
        }
    }

    {
        let frames = data
            .trap_frames
            .as_mut()
            .expect("delivery: process without trap frames");
        let frame = frames.frame_mut(trap_idx);
        frame.sp = sp;
        frame.ra = sp; // handler returns into the trampoline
        frame.a0 = sig as u64;
        frame.epc = action.handler;
    }

    guard.signals.clear_pending(sig);
    log::debug!(
        "signal: {} delivered to pid {} handler {:#x}",
        signal_name(sig),
        guard.pid.as_u64(),
        action.handler
    );
}

/// Undo a user-path delivery: restore the thread's trap frame from its
/// backup and the process's blocked mask from the pre-delivery backup.
/// Invoked exactly once per delivery, by the trampoline's request, never
/// by ordinary user code.
pub fn sigreturn(p: &'static Process, t: &'static Thread) {
    let mut guard = p.inner.lock();
    let tg = t.inner.lock();

    {
        let frames = p
            .data_mut()
            .trap_frames
            .as_mut()
            .expect("sigreturn: process without trap frames");
        let backup = t
            .data()
            .trap_backup
            .as_ref()
            .expect("sigreturn: thread without backup frame");
        *frames.frame_mut(tg.trap_index) = **backup;
    }

    guard.signals.blocked = guard.signals.mask_backup;
    log::debug!("sigreturn: pid {} restored", guard.pid.as_u64());
}

/// Replace the calling process's blocked-signal mask, returning the
/// previous one. The kill/stop pair is silently excluded; it can never
/// be masked.
pub fn set_signal_mask(mask: u32) -> u32 {
    let p = per_cpu::my_proc().expect("sigprocmask: no running process");
    let mut guard = p.inner.lock();
    let old = guard.signals.blocked;
    guard.signals.set_blocked(mask);
    old
}

/// Inspect and optionally replace the calling process's disposition for
/// `sig`. Returns the previous action. The kill/stop pair is protected
/// and cannot be reconfigured.
pub fn set_handler(sig: u32, new: Option<SigAction>) -> Result<SigAction, SignalError> {
    if !is_valid_signal(sig) {
        return Err(SignalError::InvalidSignal);
    }
    if !is_catchable(sig) {
        return Err(SignalError::ProtectedSignal);
    }

    let p = per_cpu::my_proc().expect("sigaction: no running process");
    let mut guard = p.inner.lock();
    let old = guard.signals.action(sig);
    if let Some(action) = new {
        guard.signals.set_action(sig, action);
    }
    Ok(old)
}
