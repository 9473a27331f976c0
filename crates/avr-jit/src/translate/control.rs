//! Jumps, calls, returns, conditional branches and skips.

use avr_cpu_core::{Features, Flag, REG_Z};
use avr_decoder::{fields, InstDesc, Opcode};

use super::{sreg_flag, TResult, TranslateCtx, TranslateError};
use crate::block::BlockState;
use crate::flags::BitAlgebra;
use crate::ir::{CmpOp, GuestReg, Helper, ValueId};

pub(super) fn translate(ctx: &mut TranslateCtx, inst: &InstDesc) -> TResult {
    let raw = inst.raw;
    let rel = |offset: i32| inst.npc.wrapping_add(offset as u32);

    match inst.opcode {
        Opcode::Rjmp => Ok(ctx.jump(rel(fields::rjmp_offset(raw)))),
        Opcode::Rcall => {
            ctx.push_ret(inst.npc);
            Ok(ctx.jump(rel(fields::rjmp_offset(raw))))
        }
        Opcode::Jmp => {
            ctx.require(Features::JMP_CALL)?;
            Ok(ctx.jump(fields::jmp_addr(raw)))
        }
        Opcode::Call => {
            ctx.require(Features::JMP_CALL)?;
            ctx.push_ret(inst.npc);
            Ok(ctx.jump(fields::jmp_addr(raw)))
        }

        Opcode::Ijmp => {
            ctx.require(Features::IJMP_ICALL)?;
            let target = ctx.compose(None, REG_Z);
            Ok(ctx.indirect_jump(target))
        }
        Opcode::Icall => {
            ctx.require(Features::IJMP_ICALL)?;
            ctx.push_ret(inst.npc);
            let target = ctx.compose(None, REG_Z);
            Ok(ctx.indirect_jump(target))
        }
        Opcode::Eijmp => {
            ctx.require(Features::EIJMP_EICALL)?;
            let target = ctx.compose(Some(GuestReg::Eind), REG_Z);
            Ok(ctx.indirect_jump(target))
        }
        Opcode::Eicall => {
            ctx.require(Features::EIJMP_EICALL)?;
            ctx.push_ret(inst.npc);
            let target = ctx.compose(Some(GuestReg::Eind), REG_Z);
            Ok(ctx.indirect_jump(target))
        }

        Opcode::Ret => {
            let target = ctx.pop_ret();
            Ok(ctx.indirect_jump(target))
        }
        Opcode::Reti => {
            let target = ctx.pop_ret();
            ctx.ir.write_flag_const(Flag::I, 1);
            Ok(ctx.indirect_jump(target))
        }

        Opcode::Brbs | Opcode::Brbc => {
            let flag = sreg_flag(fields::bit3(raw));
            let stored = ctx.ir.read_flag(flag);
            let set = flag_is_set(ctx, flag, stored);
            let cond = if inst.opcode == Opcode::Brbs {
                set
            } else {
                ctx.ir.cmp_imm(CmpOp::Eq, set, 0)
            };
            Ok(ctx.cond_jump(cond, rel(fields::branch_offset(raw)), inst.npc))
        }

        Opcode::Cpse => {
            let skip = ctx.skip_target()?;
            let rd = ctx.r(fields::rd5(raw));
            let rr = ctx.r(fields::rr5(raw));
            let cond = ctx.ir.cmp(CmpOp::Eq, rd, rr);
            Ok(ctx.cond_jump(cond, skip, inst.npc))
        }
        Opcode::Sbrc | Opcode::Sbrs => {
            let skip = ctx.skip_target()?;
            let rd = ctx.r(fields::rd5(raw));
            let bit = ctx.ir.bit(rd, u32::from(fields::bit3(raw)));
            let cond = bit_test(ctx, bit, inst.opcode == Opcode::Sbrs);
            Ok(ctx.cond_jump(cond, skip, inst.npc))
        }
        Opcode::Sbic | Opcode::Sbis => {
            let skip = ctx.skip_target()?;
            let port = ctx.ir.konst(u32::from(fields::io_port5(raw)));
            let v = ctx.ir.call_ret(Helper::InB, &[port]);
            let bit = ctx.ir.bit(v, u32::from(fields::bit3(raw)));
            let cond = bit_test(ctx, bit, inst.opcode == Opcode::Sbis);
            Ok(ctx.cond_jump(cond, skip, inst.npc))
        }

        _ => Err(TranslateError::Unsupported),
    }
}

/// 0/1 value of a flag from its raw slot.
fn flag_is_set(ctx: &mut TranslateCtx, flag: Flag, stored: ValueId) -> ValueId {
    match flag {
        Flag::Z => ctx.ir.cmp_imm(CmpOp::Eq, stored, 0),
        _ => ctx.ir.cmp_imm(CmpOp::Ne, stored, 0),
    }
}

fn bit_test(ctx: &mut TranslateCtx, bit: ValueId, skip_if_set: bool) -> ValueId {
    let op = if skip_if_set { CmpOp::Ne } else { CmpOp::Eq };
    ctx.ir.cmp_imm(op, bit, 0)
}
