//! Add/subtract/compare, increment/decrement, word arithmetic and multiply.

use avr_cpu_core::{Features, Flag};
use avr_decoder::{fields, InstDesc, Opcode};

use super::{TResult, TranslateCtx, TranslateError};
use crate::block::BlockState;
use crate::flags::{self, BitAlgebra};
use crate::ir::{BinOp, CmpOp, ValueId};

pub(super) fn translate(ctx: &mut TranslateCtx, inst: &InstDesc) -> TResult {
    let raw = inst.raw;
    let d = fields::rd5(raw);
    let rr = Operand::Reg(fields::rr5(raw));
    let dh = fields::rd_high(raw);
    let k = Operand::Imm(fields::imm8(raw));
    let (md, mr) = (fields::rd_mul3(raw), fields::rr_mul3(raw));

    match inst.opcode {
        Opcode::Add => add(ctx, d, rr, false),
        Opcode::Adc => add(ctx, d, rr, true),

        Opcode::Sub => sub(ctx, d, rr, Sub::Plain, true),
        Opcode::Subi => sub(ctx, dh, k, Sub::Plain, true),
        Opcode::Sbc => sub(ctx, d, rr, Sub::WithCarry, true),
        Opcode::Sbci => sub(ctx, dh, k, Sub::WithCarry, true),
        Opcode::Cp => sub(ctx, d, rr, Sub::Plain, false),
        Opcode::Cpc => sub(ctx, d, rr, Sub::WithCarry, false),
        Opcode::Cpi => sub(ctx, dh, k, Sub::Plain, false),

        Opcode::Neg => neg(ctx, d),
        Opcode::Inc => inc_dec(ctx, d, BinOp::Add, 0x80),
        Opcode::Dec => inc_dec(ctx, d, BinOp::Sub, 0x7f),

        Opcode::Adiw => word_op(ctx, fields::adiw_rd(raw), fields::adiw_imm(raw), BinOp::Add),
        Opcode::Sbiw => word_op(ctx, fields::adiw_rd(raw), fields::adiw_imm(raw), BinOp::Sub),

        Opcode::Mul => multiply(ctx, d, fields::rr5(raw), Signs::UU, false),
        Opcode::Muls => multiply(ctx, dh, fields::rr_high(raw), Signs::SS, false),
        Opcode::Mulsu => multiply(ctx, md, mr, Signs::SU, false),
        Opcode::Fmul => multiply(ctx, md, mr, Signs::UU, true),
        Opcode::Fmuls => multiply(ctx, md, mr, Signs::SS, true),
        Opcode::Fmulsu => multiply(ctx, md, mr, Signs::SU, true),

        _ => Err(TranslateError::Unsupported),
    }
}

#[derive(Clone, Copy)]
enum Operand {
    Reg(u8),
    Imm(u8),
}

impl Operand {
    fn emit(self, ctx: &mut TranslateCtx) -> ValueId {
        match self {
            Operand::Reg(r) => ctx.r(r),
            Operand::Imm(k) => ctx.ir.konst(u32::from(k)),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Sub {
    Plain,
    /// `SBC`/`SBCI`/`CPC`: subtract C too; `Z` can only stay set.
    WithCarry,
}

#[derive(Clone, Copy)]
enum Signs {
    UU,
    SS,
    SU,
}

fn add(ctx: &mut TranslateCtx, d: u8, rr: Operand, with_carry: bool) -> TResult {
    let rd = ctx.r(d);
    let rr = rr.emit(ctx);
    let mut r = ctx.ir.bin(BinOp::Add, rd, rr);
    if with_carry {
        let c = ctx.ir.read_flag(Flag::C);
        r = ctx.ir.bin(BinOp::Add, r, c);
    }
    let r = ctx.mask8(r);

    let ch = flags::add_ch(&mut ctx.ir, r, rd, rr);
    let v = flags::add_v(&mut ctx.ir, r, rd, rr);
    let zns = flags::zns(&mut ctx.ir, r, v);
    ctx.ir.write_flag(Flag::C, ch.c);
    ctx.ir.write_flag(Flag::H, ch.h);
    ctx.ir.write_flag(Flag::V, v);
    ctx.ir.write_flag(Flag::Z, zns.z);
    ctx.ir.write_flag(Flag::N, zns.n);
    ctx.ir.write_flag(Flag::S, zns.s);

    ctx.set_r(d, r);
    Ok(BlockState::Continue)
}

fn sub(ctx: &mut TranslateCtx, d: u8, rr: Operand, kind: Sub, write_back: bool) -> TResult {
    let rd = ctx.r(d);
    let rr = rr.emit(ctx);
    let mut r = ctx.ir.bin(BinOp::Sub, rd, rr);
    if kind == Sub::WithCarry {
        let c = ctx.ir.read_flag(Flag::C);
        r = ctx.ir.bin(BinOp::Sub, r, c);
    }
    let r = ctx.mask8(r);

    let ch = flags::sub_ch(&mut ctx.ir, r, rd, rr);
    let v = flags::sub_v(&mut ctx.ir, r, rd, rr);
    ctx.ir.write_flag(Flag::C, ch.c);
    ctx.ir.write_flag(Flag::H, ch.h);
    ctx.ir.write_flag(Flag::V, v);
    match kind {
        Sub::Plain => {
            let zns = flags::zns(&mut ctx.ir, r, v);
            ctx.ir.write_flag(Flag::Z, zns.z);
            ctx.ir.write_flag(Flag::N, zns.n);
            ctx.ir.write_flag(Flag::S, zns.s);
        }
        Sub::WithCarry => {
            // Stored Z is "last result"; OR-ing keeps a cleared Z cleared.
            let z = ctx.ir.read_flag(Flag::Z);
            let z = ctx.ir.bin(BinOp::Or, z, r);
            ctx.ir.write_flag(Flag::Z, z);
            let (n, s) = flags::ns(&mut ctx.ir, r, v);
            ctx.ir.write_flag(Flag::N, n);
            ctx.ir.write_flag(Flag::S, s);
        }
    }

    if write_back {
        ctx.set_r(d, r);
    }
    Ok(BlockState::Continue)
}

fn neg(ctx: &mut TranslateCtx, d: u8) -> TResult {
    let rd = ctx.r(d);
    let zero = ctx.ir.konst(0);
    let r = ctx.ir.bin(BinOp::Sub, zero, rd);
    let r = ctx.mask8(r);

    let ch = flags::sub_ch(&mut ctx.ir, r, zero, rd);
    let v = flags::sub_v(&mut ctx.ir, r, zero, rd);
    let zns = flags::zns(&mut ctx.ir, r, v);
    ctx.ir.write_flag(Flag::C, ch.c);
    ctx.ir.write_flag(Flag::H, ch.h);
    ctx.ir.write_flag(Flag::V, v);
    ctx.ir.write_flag(Flag::Z, zns.z);
    ctx.ir.write_flag(Flag::N, zns.n);
    ctx.ir.write_flag(Flag::S, zns.s);

    ctx.set_r(d, r);
    Ok(BlockState::Continue)
}

/// `INC`/`DEC`: C untouched, V set when the result is `overflow_at`.
fn inc_dec(ctx: &mut TranslateCtx, d: u8, op: BinOp, overflow_at: u32) -> TResult {
    let rd = ctx.r(d);
    let r = ctx.ir.bin_imm(op, rd, 1);
    let r = ctx.mask8(r);

    let v = ctx.ir.cmp_imm(CmpOp::Eq, r, overflow_at);
    let zns = flags::zns(&mut ctx.ir, r, v);
    ctx.ir.write_flag(Flag::V, v);
    ctx.ir.write_flag(Flag::Z, zns.z);
    ctx.ir.write_flag(Flag::N, zns.n);
    ctx.ir.write_flag(Flag::S, zns.s);

    ctx.set_r(d, r);
    Ok(BlockState::Continue)
}

/// `ADIW`/`SBIW` on the pair `r[lo+1]:r[lo]`.
fn word_op(ctx: &mut TranslateCtx, lo: u8, k: u8, op: BinOp) -> TResult {
    ctx.require(Features::ADIW_SBIW)?;

    let rd = ctx.compose(None, lo);
    let r = ctx.ir.bin_imm(op, rd, u32::from(k));
    let r = ctx.ir.bin_imm(BinOp::And, r, 0xffff);

    let (c, v) = match op {
        BinOp::Add => flags::adiw_cv(&mut ctx.ir, r, rd),
        _ => flags::sbiw_cv(&mut ctx.ir, r, rd),
    };
    let n = ctx.ir.bit(r, 15);
    let s = ctx.ir.xor(n, v);
    ctx.ir.write_flag(Flag::C, c);
    ctx.ir.write_flag(Flag::V, v);
    ctx.ir.write_flag(Flag::Z, r);
    ctx.ir.write_flag(Flag::N, n);
    ctx.ir.write_flag(Flag::S, s);

    ctx.decompose(None, lo, r);
    Ok(BlockState::Continue)
}

/// `MUL*` and `FMUL*`: 16-bit product into `r1:r0`. `C` is bit 15 of the
/// unshifted product; `FMUL*` then shifts left by one.
fn multiply(ctx: &mut TranslateCtx, d: u8, rr: u8, signs: Signs, fractional: bool) -> TResult {
    ctx.require(Features::MUL)?;

    let mut a = ctx.r(d);
    let mut b = ctx.r(rr);
    match signs {
        Signs::UU => {}
        Signs::SS => {
            a = ctx.ir.sext8(a);
            b = ctx.ir.sext8(b);
        }
        Signs::SU => a = ctx.ir.sext8(a),
    }
    let product = ctx.ir.bin(BinOp::Mul, a, b);
    let c = ctx.ir.bit(product, 15);
    let r = if fractional {
        ctx.ir.bin_imm(BinOp::Shl, product, 1)
    } else {
        product
    };
    let r = ctx.ir.bin_imm(BinOp::And, r, 0xffff);

    ctx.ir.write_flag(Flag::C, c);
    ctx.ir.write_flag(Flag::Z, r);
    ctx.decompose(None, 0, r);
    Ok(BlockState::Continue)
}
