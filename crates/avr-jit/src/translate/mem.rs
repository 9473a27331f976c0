//! Data loads/stores, program-memory reads, stack and atomic read-modify-write.

use avr_cpu_core::{Features, MemSpace, ADDR_MASK, REG_X, REG_Y, REG_Z};
use avr_decoder::{fields, InstDesc, Opcode};

use super::{TResult, TranslateCtx, TranslateError};
use crate::block::BlockState;
use crate::flags::BitAlgebra;
use crate::ir::{BinOp, GuestReg, ValueId};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plain,
    PostInc,
    PreDec,
}

#[derive(Clone, Copy)]
enum Pointer {
    X,
    Y,
    Z,
}

impl Pointer {
    fn lo(self) -> u8 {
        match self {
            Pointer::X => REG_X,
            Pointer::Y => REG_Y,
            Pointer::Z => REG_Z,
        }
    }

    fn ramp(self) -> (Features, GuestReg) {
        match self {
            Pointer::X => (Features::RAMPX, GuestReg::RampX),
            Pointer::Y => (Features::RAMPY, GuestReg::RampY),
            Pointer::Z => (Features::RAMPZ, GuestReg::RampZ),
        }
    }
}

pub(super) fn translate(ctx: &mut TranslateCtx, inst: &InstDesc) -> TResult {
    let raw = inst.raw;
    let d = fields::rd5(raw);
    let q = fields::ldd_q(raw);

    match inst.opcode {
        Opcode::LdX => ld(ctx, d, Pointer::X, Mode::Plain),
        Opcode::LdXInc => ld(ctx, d, Pointer::X, Mode::PostInc),
        Opcode::LdXDec => ld(ctx, d, Pointer::X, Mode::PreDec),
        Opcode::LdYInc => ld(ctx, d, Pointer::Y, Mode::PostInc),
        Opcode::LdYDec => ld(ctx, d, Pointer::Y, Mode::PreDec),
        Opcode::LdZInc => ld(ctx, d, Pointer::Z, Mode::PostInc),
        Opcode::LdZDec => ld(ctx, d, Pointer::Z, Mode::PreDec),
        Opcode::LddY => ldd(ctx, d, Pointer::Y, q),
        Opcode::LddZ => ldd(ctx, d, Pointer::Z, q),

        Opcode::StX => st(ctx, d, Pointer::X, Mode::Plain),
        Opcode::StXInc => st(ctx, d, Pointer::X, Mode::PostInc),
        Opcode::StXDec => st(ctx, d, Pointer::X, Mode::PreDec),
        Opcode::StYInc => st(ctx, d, Pointer::Y, Mode::PostInc),
        Opcode::StYDec => st(ctx, d, Pointer::Y, Mode::PreDec),
        Opcode::StZInc => st(ctx, d, Pointer::Z, Mode::PostInc),
        Opcode::StZDec => st(ctx, d, Pointer::Z, Mode::PreDec),
        Opcode::StdY => std(ctx, d, Pointer::Y, q),
        Opcode::StdZ => std(ctx, d, Pointer::Z, q),

        Opcode::Lds => {
            let addr = direct_addr(ctx, fields::lds_addr(raw));
            let v = ctx.load_data(addr);
            ctx.set_r(fields::lds_rd(raw), v);
            Ok(BlockState::Continue)
        }
        Opcode::Sts => {
            let addr = direct_addr(ctx, fields::lds_addr(raw));
            let v = ctx.r(fields::lds_rd(raw));
            ctx.store_data(addr, v);
            Ok(BlockState::Continue)
        }

        Opcode::Lpm => {
            ctx.require(Features::LPM)?;
            lpm(ctx, 0, false, false)
        }
        Opcode::LpmZ => {
            ctx.require(Features::LPM)?;
            lpm(ctx, d, false, false)
        }
        Opcode::LpmZInc => {
            ctx.require(Features::LPMX)?;
            lpm(ctx, d, false, true)
        }
        Opcode::Elpm => {
            ctx.require(Features::ELPM)?;
            lpm(ctx, 0, true, false)
        }
        Opcode::ElpmZ => {
            ctx.require(Features::ELPM)?;
            lpm(ctx, d, true, false)
        }
        Opcode::ElpmZInc => {
            ctx.require(Features::ELPMX)?;
            lpm(ctx, d, true, true)
        }

        Opcode::Push => {
            let v = ctx.r(d);
            ctx.push_byte(v);
            Ok(BlockState::Continue)
        }
        Opcode::Pop => {
            let v = ctx.pop_byte();
            ctx.set_r(d, v);
            Ok(BlockState::Continue)
        }

        Opcode::Xch | Opcode::Las | Opcode::Lac | Opcode::Lat => {
            ctx.require(Features::RMW)?;
            rmw(ctx, d, inst.opcode)
        }

        _ => Err(TranslateError::Unsupported),
    }
}

fn ramp_of(ctx: &TranslateCtx, ptr: Pointer) -> Option<GuestReg> {
    let (feature, reg) = ptr.ramp();
    ctx.has(feature).then_some(reg)
}

fn pointer_addr(ctx: &mut TranslateCtx, ptr: Pointer) -> ValueId {
    let ramp = ramp_of(ctx, ptr);
    ctx.compose(ramp, ptr.lo())
}

/// Effective address for the access; updates the pointer for `PreDec` before
/// and `PostInc` after the caller's access via the returned follow-up.
fn address_for(ctx: &mut TranslateCtx, ptr: Pointer, mode: Mode) -> (ValueId, Option<ValueId>) {
    let addr = pointer_addr(ctx, ptr);
    match mode {
        Mode::Plain => (addr, None),
        Mode::PreDec => {
            let addr = ctx.offset_addr(addr, -1);
            let ramp = ramp_of(ctx, ptr);
            ctx.decompose(ramp, ptr.lo(), addr);
            (addr, None)
        }
        Mode::PostInc => {
            let next = ctx.offset_addr(addr, 1);
            (addr, Some(next))
        }
    }
}

fn write_back(ctx: &mut TranslateCtx, ptr: Pointer, next: Option<ValueId>) {
    if let Some(next) = next {
        let ramp = ramp_of(ctx, ptr);
        ctx.decompose(ramp, ptr.lo(), next);
    }
}

fn ld(ctx: &mut TranslateCtx, d: u8, ptr: Pointer, mode: Mode) -> TResult {
    let (addr, next) = address_for(ctx, ptr, mode);
    let v = ctx.load_data(addr);
    write_back(ctx, ptr, next);
    // Loading into a pointer register wins over the pointer update.
    ctx.set_r(d, v);
    Ok(BlockState::Continue)
}

fn st(ctx: &mut TranslateCtx, d: u8, ptr: Pointer, mode: Mode) -> TResult {
    // The stored value is the register before any pointer update.
    let v = ctx.r(d);
    let (addr, next) = address_for(ctx, ptr, mode);
    ctx.store_data(addr, v);
    write_back(ctx, ptr, next);
    Ok(BlockState::Continue)
}

fn ldd(ctx: &mut TranslateCtx, d: u8, ptr: Pointer, q: u8) -> TResult {
    let base = pointer_addr(ctx, ptr);
    let addr = ctx.offset_addr(base, i32::from(q));
    let v = ctx.load_data(addr);
    ctx.set_r(d, v);
    Ok(BlockState::Continue)
}

fn std(ctx: &mut TranslateCtx, d: u8, ptr: Pointer, q: u8) -> TResult {
    let base = pointer_addr(ctx, ptr);
    let addr = ctx.offset_addr(base, i32::from(q));
    let v = ctx.r(d);
    ctx.store_data(addr, v);
    Ok(BlockState::Continue)
}

/// `LDS`/`STS` address: `RAMPD:k16` when the part has RAMPD.
fn direct_addr(ctx: &mut TranslateCtx, k: u16) -> ValueId {
    let k = ctx.ir.konst(u32::from(k));
    if ctx.has(Features::RAMPD) {
        let rampd = ctx.ir.read(GuestReg::RampD);
        ctx.ir.or(rampd, k)
    } else {
        k
    }
}

/// `LPM`/`ELPM` family. `LPM Z+` only increments the 16-bit Z; `ELPM Z+`
/// carries into RAMPZ.
fn lpm(ctx: &mut TranslateCtx, d: u8, extended: bool, post_inc: bool) -> TResult {
    let ramp = extended.then_some(GuestReg::RampZ);
    let addr = ctx.compose(ramp, REG_Z);
    let v = ctx.ir.load(MemSpace::Code, addr);
    if post_inc {
        let next = ctx.ir.bin_imm(BinOp::Add, addr, 1);
        let mask = if extended { ADDR_MASK } else { 0xffff };
        let next = ctx.ir.bin_imm(BinOp::And, next, mask);
        ctx.decompose(ramp, REG_Z, next);
    }
    ctx.set_r(d, v);
    Ok(BlockState::Continue)
}

/// `XCH`/`LAS`/`LAC`/`LAT` on `(RAMPZ:Z)`: `Rd` receives the old memory byte.
fn rmw(ctx: &mut TranslateCtx, d: u8, op: Opcode) -> TResult {
    let addr = pointer_addr(ctx, Pointer::Z);
    let rd = ctx.r(d);
    let old = ctx.load_data(addr);
    let new = match op {
        Opcode::Xch => rd,
        Opcode::Las => ctx.ir.or(old, rd),
        Opcode::Lac => {
            let keep = ctx.ir.bin_imm(BinOp::Xor, rd, 0xff);
            ctx.ir.and(old, keep)
        }
        _ => ctx.ir.xor(old, rd),
    };
    ctx.store_data(addr, new);
    ctx.set_r(d, old);
    Ok(BlockState::Continue)
}
