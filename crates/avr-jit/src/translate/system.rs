//! I/O, power management, debugging and self-programming.

use avr_cpu_core::{Features, REG_Z};
use avr_decoder::{fields, InstDesc, Opcode};

use super::{TResult, TranslateCtx, TranslateError};
use crate::block::BlockState;
use crate::ir::{BinOp, GuestReg, Helper, TrapKind};

pub(super) fn translate(ctx: &mut TranslateCtx, inst: &InstDesc) -> TResult {
    let raw = inst.raw;

    match inst.opcode {
        Opcode::Nop => Ok(BlockState::Continue),

        Opcode::In => {
            let port = ctx.ir.konst(u32::from(fields::io_port6(raw)));
            let v = ctx.ir.call_ret(Helper::InB, &[port]);
            ctx.set_r(fields::rd5(raw), v);
            Ok(BlockState::Continue)
        }
        Opcode::Out => {
            let port = ctx.ir.konst(u32::from(fields::io_port6(raw)));
            let v = ctx.r(fields::rd5(raw));
            ctx.ir.call(Helper::OutB, &[port, v]);
            Ok(BlockState::Continue)
        }
        Opcode::Cbi | Opcode::Sbi => {
            let port = ctx.ir.konst(u32::from(fields::io_port5(raw)));
            let mask = 1u32 << fields::bit3(raw);
            let v = ctx.ir.call_ret(Helper::InB, &[port]);
            let v = if inst.opcode == Opcode::Sbi {
                ctx.ir.bin_imm(BinOp::Or, v, mask)
            } else {
                ctx.ir.bin_imm(BinOp::And, v, !mask & 0xff)
            };
            ctx.ir.call(Helper::OutB, &[port, v]);
            Ok(BlockState::Continue)
        }

        Opcode::Sleep => {
            ctx.ir.trap(TrapKind::Sleep, Some(inst.npc));
            Ok(BlockState::Exception)
        }
        Opcode::Break => {
            ctx.require(Features::BREAK)?;
            if ctx.debugger_attached {
                ctx.ir.trap(TrapKind::Break, Some(inst.cpc));
                Ok(BlockState::Exception)
            } else {
                Ok(BlockState::Continue)
            }
        }
        Opcode::Wdr => {
            ctx.ir.call(Helper::Wdr, &[]);
            Ok(BlockState::Continue)
        }

        Opcode::Spm => {
            ctx.require(Features::SPM)?;
            spm(ctx, false)
        }
        Opcode::SpmZInc => {
            ctx.require(Features::SPMX)?;
            spm(ctx, true)
        }

        Opcode::Des => {
            ctx.require(Features::DES)?;
            let round = ctx.ir.konst(u32::from(fields::des_round(raw)));
            ctx.ir.call(Helper::Des, &[round]);
            Ok(BlockState::Continue)
        }

        _ => Err(TranslateError::Unsupported),
    }
}

/// Writes `r1:r0` to program memory at `RAMPZ:Z`. Code may have changed, so
/// the block ends here.
fn spm(ctx: &mut TranslateCtx, post_inc: bool) -> TResult {
    let ramp = ctx.has(Features::RAMPZ).then_some(GuestReg::RampZ);
    let addr = ctx.compose(ramp, REG_Z);
    let data = ctx.compose(None, 0);
    ctx.ir.call(Helper::Spm, &[addr, data]);
    if post_inc {
        let next = ctx.offset_addr(addr, 2);
        ctx.decompose(ramp, REG_Z, next);
    }
    Ok(BlockState::Stop)
}
