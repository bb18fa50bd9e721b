//! Saved register state for switches and traps.
//!
//! Two layers of state exist. `Context` is the minimal callee-saved set a
//! kernel-level switch needs; the platform's `context_switch` primitive
//! saves and restores exactly these fields. `TrapFrame` is the full user
//! register file captured on kernel entry; the trap-return primitive
//! restores it on the way back out, and signal delivery edits it to steer
//! the thread into a handler.

use crate::config::NTHREAD;

/// Callee-saved registers for kernel context switches.
///
/// Field order is the contract with the platform's switch primitive, so
/// the layout is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Context {
    pub ra: u64,
    pub sp: u64,

    // callee-saved
    pub s0: u64,
    pub s1: u64,
    pub s2: u64,
    pub s3: u64,
    pub s4: u64,
    pub s5: u64,
    pub s6: u64,
    pub s7: u64,
    pub s8: u64,
    pub s9: u64,
    pub s10: u64,
    pub s11: u64,
}

impl Context {
    pub const fn zeroed() -> Self {
        Context {
            ra: 0,
            sp: 0,
            s0: 0,
            s1: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
        }
    }
}

/// The full register file saved when a thread enters the kernel.
///
/// `epc` is the user program counter to resume at; `sp`, `ra` and the
/// argument registers are what signal delivery manipulates. The layout is
/// shared with the platform's trap entry/exit code and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct TrapFrame {
    /// Saved user program counter.
    pub epc: u64,
    pub ra: u64,
    pub sp: u64,
    pub gp: u64,
    pub tp: u64,
    pub t0: u64,
    pub t1: u64,
    pub t2: u64,
    pub s0: u64,
    pub s1: u64,
    pub a0: u64,
    pub a1: u64,
    pub a2: u64,
    pub a3: u64,
    pub a4: u64,
    pub a5: u64,
    pub a6: u64,
    pub a7: u64,
    pub s2: u64,
    pub s3: u64,
    pub s4: u64,
    pub s5: u64,
    pub s6: u64,
    pub s7: u64,
    pub s8: u64,
    pub s9: u64,
    pub s10: u64,
    pub s11: u64,
    pub t3: u64,
    pub t4: u64,
    pub t5: u64,
    pub t6: u64,
}

impl TrapFrame {
    pub const fn zeroed() -> Self {
        // Every field is zero; spelled via Default at runtime call sites,
        // but const contexts need an explicit value.
        TrapFrame {
            epc: 0,
            ra: 0,
            sp: 0,
            gp: 0,
            tp: 0,
            t0: 0,
            t1: 0,
            t2: 0,
            s0: 0,
            s1: 0,
            a0: 0,
            a1: 0,
            a2: 0,
            a3: 0,
            a4: 0,
            a5: 0,
            a6: 0,
            a7: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
            t3: 0,
            t4: 0,
            t5: 0,
            t6: 0,
        }
    }
}

/// A process's trap-context page: one frame per thread slot, owned by the
/// process and indexed by each thread's slot position.
#[repr(C)]
pub struct TrapFrameBlock {
    frames: [TrapFrame; NTHREAD],
}

impl TrapFrameBlock {
    pub const fn zeroed() -> Self {
        TrapFrameBlock {
            frames: [TrapFrame::zeroed(); NTHREAD],
        }
    }

    pub fn frame(&self, idx: usize) -> &TrapFrame {
        &self.frames[idx]
    }

    pub fn frame_mut(&mut self, idx: usize) -> &mut TrapFrame {
        &mut self.frames[idx]
    }
}
