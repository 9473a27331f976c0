//! GDB remote-protocol register view.
//!
//! Register numbering: `0..32` are r0..r31 (1 byte each), 32 is SREG (1 byte),
//! 33 is SP (2 bytes), 34 is PC as a byte address (4 bytes). Multi-byte values
//! are little-endian.

use crate::state::{AvrState, NUM_REGS};
use crate::PC_MASK;

pub const NUM_GDB_REGS: usize = 35;

const GDB_SREG: usize = NUM_REGS;
const GDB_SP: usize = NUM_REGS + 1;
const GDB_PC: usize = NUM_REGS + 2;

/// Appends register `n` to `out` and returns how many bytes were written (0
/// for an unknown register).
pub fn read_register(state: &AvrState, n: usize, out: &mut Vec<u8>) -> usize {
    match n {
        0..=31 => {
            out.push(state.regs[n]);
            1
        }
        GDB_SREG => {
            out.push(state.sreg());
            1
        }
        GDB_SP => {
            out.extend_from_slice(&state.sp.to_le_bytes());
            2
        }
        GDB_PC => {
            out.extend_from_slice(&state.pc_bytes().to_le_bytes());
            4
        }
        _ => 0,
    }
}

/// Writes register `n` from `buf`, returning the number of bytes consumed (0 if
/// the register is unknown or `buf` is too short).
pub fn write_register(state: &mut AvrState, n: usize, buf: &[u8]) -> usize {
    match (n, buf) {
        (0..=31, [v, ..]) => {
            state.regs[n] = *v;
            1
        }
        (GDB_SREG, [v, ..]) => {
            state.set_sreg(*v);
            1
        }
        (GDB_SP, [lo, hi, ..]) => {
            state.sp = u16::from_le_bytes([*lo, *hi]);
            2
        }
        (GDB_PC, [a, b, c, d, ..]) => {
            state.pc = (u32::from_le_bytes([*a, *b, *c, *d]) >> 1) & PC_MASK;
            4
        }
        _ => 0,
    }
}

/// All registers in order, the payload of a `g` packet.
pub fn read_all(state: &AvrState) -> Vec<u8> {
    let mut out = Vec::with_capacity(NUM_REGS + 7);
    for n in 0..NUM_GDB_REGS {
        read_register(state, n, &mut out);
    }
    out
}
