//! Processes: control blocks, the global table, and lifecycle.

pub mod lifecycle;
pub mod process;
pub mod table;

pub use lifecycle::{exit, fork, wait};
pub use process::{Pid, ProcState, Process, ProcessData, ProcessInner};
pub use table::{spawn_init, ProcessError};
