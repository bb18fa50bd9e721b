//! The return-from-signal trampoline.
//!
//! When a user handler is about to run, this sequence is copied onto the
//! user stack just below the interrupted stack pointer and the return
//! address register is pointed at it. Its only job is to issue the
//! return-from-signal request once the handler returns; it must never be
//! reached any other way.

/// The trampoline's system call number for return-from-signal.
pub const SYS_SIGRETURN: u64 = 24;

/// Raw machine code, RISC-V RV64:
///
/// ```text
///   li   a7, 24      ; SYS_SIGRETURN        93 08 80 01
///   ecall                                    73 00 00 00
///   ebreak           ; never reached         73 00 10 00
/// ```
///
/// Encodings, little-endian: `addi a7, x0, 24` is `0x01800893`, `ecall`
/// is `0x00000073`, `ebreak` is `0x00100073`.
pub static SIGRETURN_TRAMPOLINE: [u8; 12] = [
    0x93, 0x08, 0x80, 0x01, // li a7, SYS_SIGRETURN
    0x73, 0x00, 0x00, 0x00, // ecall
    0x73, 0x00, 0x10, 0x00, // ebreak (never reached)
];

/// Size of the trampoline in bytes; the user stack pointer drops by this
/// much during delivery.
pub const SIGRETURN_TRAMPOLINE_SIZE: usize = SIGRETURN_TRAMPOLINE.len();
