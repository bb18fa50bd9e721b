//! Signal state and delivery.

pub mod constants;
pub mod delivery;
pub mod trampoline;
pub mod types;

pub use constants::{
    is_catchable, is_valid_signal, sig_mask, signal_name, SIGCONT, SIGKILL, SIGSTOP, SIG_DFL,
    SIG_IGN, UNCATCHABLE_SIGNALS,
};
pub use delivery::{
    deliver_pending, send_signal, set_handler, set_signal_mask, sigreturn, SignalError,
};
pub use trampoline::{SIGRETURN_TRAMPOLINE, SIGRETURN_TRAMPOLINE_SIZE};
pub use types::{SigAction, SignalState};
