//! Per-process signal state.

use super::constants::*;
use crate::config::NSIG;

/// A registered disposition for one signal: handler address plus the
/// signals to block while that handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigAction {
    /// `SIG_DFL`, `SIG_IGN`, or a user handler address.
    pub handler: u64,
    /// Mask installed for the duration of the handler.
    pub mask: u32,
}

impl SigAction {
    pub const DEFAULT: SigAction = SigAction {
        handler: SIG_DFL,
        mask: 0,
    };

    #[inline]
    pub fn is_default(&self) -> bool {
        self.handler == SIG_DFL
    }

    #[inline]
    pub fn is_ignore(&self) -> bool {
        self.handler == SIG_IGN
    }

    #[inline]
    pub fn is_user_handler(&self) -> bool {
        self.handler > SIG_IGN
    }
}

impl Default for SigAction {
    fn default() -> Self {
        SigAction::DEFAULT
    }
}

/// Everything a process knows about signals: what is queued, what is
/// masked, the registered dispositions, the mask saved across a delivery,
/// and whether the process is administratively stopped.
#[derive(Debug, Clone, Copy)]
pub struct SignalState {
    /// Signals raised but not yet delivered.
    pub pending: u32,
    /// Signals the process currently masks. Never contains the
    /// uncatchable pair when set through `set_blocked`.
    pub blocked: u32,
    /// `blocked` as it was before the delivery in progress; restored by
    /// the kernel path immediately, by `sigreturn` for the user path.
    pub mask_backup: u32,
    /// Set by the stop signal, cleared by continue or kill. A stopped
    /// process's threads are skipped by the scheduler.
    pub stopped: bool,
    actions: [SigAction; NSIG],
}

impl SignalState {
    pub const fn new() -> Self {
        SignalState {
            pending: 0,
            blocked: 0,
            mask_backup: 0,
            stopped: false,
            actions: [SigAction::DEFAULT; NSIG],
        }
    }

    pub fn action(&self, sig: u32) -> SigAction {
        if is_valid_signal(sig) {
            self.actions[sig as usize]
        } else {
            SigAction::DEFAULT
        }
    }

    pub fn set_action(&mut self, sig: u32, action: SigAction) {
        if is_valid_signal(sig) {
            self.actions[sig as usize] = action;
        }
    }

    #[inline]
    pub fn set_pending(&mut self, sig: u32) {
        self.pending |= sig_mask(sig);
    }

    #[inline]
    pub fn clear_pending(&mut self, sig: u32) {
        self.pending &= !sig_mask(sig);
    }

    #[inline]
    pub fn is_pending(&self, sig: u32) -> bool {
        self.pending & sig_mask(sig) != 0
    }

    /// Pending and not blocked.
    #[inline]
    pub fn deliverable(&self) -> u32 {
        self.pending & !self.blocked
    }

    /// Install a new blocked mask. The uncatchable signals are excluded
    /// no matter what the caller asks for.
    #[inline]
    pub fn set_blocked(&mut self, mask: u32) {
        self.blocked = mask & !UNCATCHABLE_SIGNALS;
    }

    /// Handlers and mask a fork child inherits. Pending signals do not
    /// follow the child.
    pub fn inherited(&self) -> SignalState {
        SignalState {
            pending: 0,
            blocked: self.blocked,
            mask_backup: 0,
            stopped: false,
            actions: self.actions,
        }
    }
}

impl Default for SignalState {
    fn default() -> Self {
        SignalState::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_bits_round_trip() {
        let mut s = SignalState::new();
        s.set_pending(SIGUSR1);
        s.set_pending(SIGTERM);
        assert!(s.is_pending(SIGUSR1));
        assert!(s.is_pending(SIGTERM));
        s.clear_pending(SIGUSR1);
        assert!(!s.is_pending(SIGUSR1));
        assert!(s.is_pending(SIGTERM));
    }

    #[test]
    fn blocked_mask_never_covers_kill_or_stop() {
        let mut s = SignalState::new();
        s.set_blocked(u32::MAX);
        assert_eq!(s.blocked & sig_mask(SIGKILL), 0);
        assert_eq!(s.blocked & sig_mask(SIGSTOP), 0);
        assert_ne!(s.blocked & sig_mask(SIGTERM), 0);
    }

    #[test]
    fn deliverable_excludes_blocked() {
        let mut s = SignalState::new();
        s.set_pending(SIGUSR1);
        s.set_pending(SIGUSR2);
        s.set_blocked(sig_mask(SIGUSR1));
        assert_eq!(s.deliverable(), sig_mask(SIGUSR2));
    }

    #[test]
    fn handler_table_round_trip() {
        let mut s = SignalState::new();
        let custom = SigAction {
            handler: 0x4000_0000,
            mask: sig_mask(SIGUSR2),
        };
        s.set_action(SIGUSR1, custom);
        assert_eq!(s.action(SIGUSR1), custom);
        s.set_action(SIGUSR1, SigAction::DEFAULT);
        assert_eq!(s.action(SIGUSR1), SigAction::DEFAULT);
    }

    #[test]
    fn child_inherits_dispositions_but_not_pending() {
        let mut s = SignalState::new();
        s.set_pending(SIGTERM);
        s.set_blocked(sig_mask(SIGUSR1));
        s.set_action(
            SIGUSR2,
            SigAction {
                handler: 0x1000,
                mask: 0,
            },
        );
        let child = s.inherited();
        assert_eq!(child.pending, 0);
        assert_eq!(child.blocked, s.blocked);
        assert_eq!(child.action(SIGUSR2).handler, 0x1000);
        assert!(!child.stopped);
    }
}
