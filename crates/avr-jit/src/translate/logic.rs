//! Logic, shifts, moves and SREG bit instructions.

use avr_cpu_core::{Features, Flag};
use avr_decoder::{fields, InstDesc, Opcode};

use super::{sreg_flag, TResult, TranslateCtx, TranslateError};
use crate::block::BlockState;
use crate::flags::{self, BitAlgebra};
use crate::ir::{BinOp, ValueId};

pub(super) fn translate(ctx: &mut TranslateCtx, inst: &InstDesc) -> TResult {
    let raw = inst.raw;
    let d = fields::rd5(raw);
    let dh = fields::rd_high(raw);
    let k = u32::from(fields::imm8(raw));

    match inst.opcode {
        Opcode::And => {
            let rr = ctx.r(fields::rr5(raw));
            logic(ctx, d, BinOp::And, rr)
        }
        Opcode::Andi => {
            let k = ctx.ir.konst(k);
            logic(ctx, dh, BinOp::And, k)
        }
        Opcode::Or => {
            let rr = ctx.r(fields::rr5(raw));
            logic(ctx, d, BinOp::Or, rr)
        }
        Opcode::Ori => {
            let k = ctx.ir.konst(k);
            logic(ctx, dh, BinOp::Or, k)
        }
        Opcode::Eor => {
            let rr = ctx.r(fields::rr5(raw));
            logic(ctx, d, BinOp::Xor, rr)
        }
        Opcode::Com => com(ctx, d),
        Opcode::Lsr => lsr(ctx, d),
        Opcode::Asr => asr_ror(ctx, d, false),
        Opcode::Ror => asr_ror(ctx, d, true),
        Opcode::Swap => swap(ctx, d),

        Opcode::Mov => {
            let rr = ctx.r(fields::rr5(raw));
            ctx.set_r(d, rr);
            Ok(BlockState::Continue)
        }
        Opcode::Movw => {
            ctx.require(Features::MOVW)?;
            let (d, r) = (fields::movw_rd(raw), fields::movw_rr(raw));
            let lo = ctx.r(r);
            let hi = ctx.r(r + 1);
            ctx.set_r(d, lo);
            ctx.set_r(d + 1, hi);
            Ok(BlockState::Continue)
        }
        Opcode::Ldi => {
            let k = ctx.ir.konst(k);
            ctx.set_r(dh, k);
            Ok(BlockState::Continue)
        }

        Opcode::Bld => bld(ctx, d, fields::bit3(raw)),
        Opcode::Bst => {
            let rd = ctx.r(d);
            let t = ctx.ir.bit(rd, u32::from(fields::bit3(raw)));
            ctx.ir.write_flag(Flag::T, t);
            Ok(BlockState::Continue)
        }
        Opcode::Bset => sreg_bit(ctx, sreg_flag(fields::sreg_bit(raw)), true),
        Opcode::Bclr => sreg_bit(ctx, sreg_flag(fields::sreg_bit(raw)), false),

        _ => Err(TranslateError::Unsupported),
    }
}

/// `AND`/`OR`/`EOR` and immediates: V cleared, C and H untouched.
fn logic(ctx: &mut TranslateCtx, d: u8, op: BinOp, rr: ValueId) -> TResult {
    let rd = ctx.r(d);
    let r = ctx.ir.bin(op, rd, rr);

    let v = ctx.ir.konst(0);
    let zns = flags::zns(&mut ctx.ir, r, v);
    ctx.ir.write_flag(Flag::V, v);
    ctx.ir.write_flag(Flag::Z, zns.z);
    ctx.ir.write_flag(Flag::N, zns.n);
    ctx.ir.write_flag(Flag::S, zns.s);

    ctx.set_r(d, r);
    Ok(BlockState::Continue)
}

fn com(ctx: &mut TranslateCtx, d: u8) -> TResult {
    let rd = ctx.r(d);
    let r = ctx.ir.bin_imm(BinOp::Xor, rd, 0xff);

    let v = ctx.ir.konst(0);
    let zns = flags::zns(&mut ctx.ir, r, v);
    ctx.ir.write_flag_const(Flag::C, 1);
    ctx.ir.write_flag(Flag::V, v);
    ctx.ir.write_flag(Flag::Z, zns.z);
    ctx.ir.write_flag(Flag::N, zns.n);
    ctx.ir.write_flag(Flag::S, zns.s);

    ctx.set_r(d, r);
    Ok(BlockState::Continue)
}

fn lsr(ctx: &mut TranslateCtx, d: u8) -> TResult {
    let rd = ctx.r(d);
    let c = ctx.ir.bin_imm(BinOp::And, rd, 1);
    let r = ctx.ir.bin_imm(BinOp::Shr, rd, 1);

    // N is always 0, so V = N ^ C = C and S = N ^ V = C.
    ctx.ir.write_flag(Flag::C, c);
    ctx.ir.write_flag(Flag::Z, r);
    ctx.ir.write_flag_const(Flag::N, 0);
    ctx.ir.write_flag(Flag::V, c);
    ctx.ir.write_flag(Flag::S, c);

    ctx.set_r(d, r);
    Ok(BlockState::Continue)
}

/// `ASR` keeps bit 7; `ROR` rotates the old carry into it.
fn asr_ror(ctx: &mut TranslateCtx, d: u8, through_carry: bool) -> TResult {
    let rd = ctx.r(d);
    let top = if through_carry {
        let c = ctx.ir.read_flag(Flag::C);
        ctx.ir.bin_imm(BinOp::Shl, c, 7)
    } else {
        ctx.ir.bin_imm(BinOp::And, rd, 0x80)
    };
    let c = ctx.ir.bin_imm(BinOp::And, rd, 1);
    let r = ctx.ir.bin_imm(BinOp::Shr, rd, 1);
    let r = ctx.ir.bin(BinOp::Or, r, top);

    let f = flags::rshift_znvs(&mut ctx.ir, r, c);
    ctx.ir.write_flag(Flag::C, c);
    ctx.ir.write_flag(Flag::Z, f.z);
    ctx.ir.write_flag(Flag::N, f.n);
    ctx.ir.write_flag(Flag::V, f.v);
    ctx.ir.write_flag(Flag::S, f.s);

    ctx.set_r(d, r);
    Ok(BlockState::Continue)
}

fn swap(ctx: &mut TranslateCtx, d: u8) -> TResult {
    let rd = ctx.r(d);
    let lo = ctx.ir.bin_imm(BinOp::Shl, rd, 4);
    let lo = ctx.ir.bin_imm(BinOp::And, lo, 0xf0);
    let hi = ctx.ir.bin_imm(BinOp::Shr, rd, 4);
    let r = ctx.ir.bin(BinOp::Or, lo, hi);
    ctx.set_r(d, r);
    Ok(BlockState::Continue)
}

fn bld(ctx: &mut TranslateCtx, d: u8, bit: u8) -> TResult {
    let rd = ctx.r(d);
    let cleared = ctx.ir.bin_imm(BinOp::And, rd, !(1u32 << bit) & 0xff);
    let t = ctx.ir.read_flag(Flag::T);
    let t = ctx.ir.bin_imm(BinOp::Shl, t, u32::from(bit));
    let r = ctx.ir.bin(BinOp::Or, cleared, t);
    ctx.set_r(d, r);
    Ok(BlockState::Continue)
}

/// `BSET`/`BCLR`. Z is stored inverted: setting it stores 0.
fn sreg_bit(ctx: &mut TranslateCtx, flag: Flag, set: bool) -> TResult {
    let stored = match flag {
        Flag::Z => u32::from(!set),
        _ => u32::from(set),
    };
    ctx.ir.write_flag_const(flag, stored);
    Ok(BlockState::Continue)
}
