//! Per-instruction translation into IR.
//!
//! A translator first performs every feasibility check (feature gates, skip
//! lookahead) and only then emits IR, so a rejected instruction leaves nothing
//! behind but the single trap node [`translate_inst`] adds.

mod arith;
mod control;
mod logic;
mod mem;
mod system;

use avr_cpu_core::stack::frame_slots;
use avr_cpu_core::{BusFault, CpuConfig, Features, Flag, MemSpace, ADDR_MASK, PC_MASK};
use avr_decoder::{InstDesc, Opcode};
use tracing::trace;

use crate::block::BlockState;
use crate::builder::IrBuilder;
use crate::error::JitError;
use crate::ir::{BinOp, GuestReg, IrTerminator, TrapKind, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TranslateError {
    /// Missing feature or unassigned encoding.
    Unsupported,
    /// A skip instruction needs the following instruction, which could not be
    /// fetched.
    Lookahead(BusFault),
}

pub(crate) type TResult = Result<BlockState, TranslateError>;

/// Per-block translation state shared by all instruction translators.
pub(crate) struct TranslateCtx {
    pub ir: IrBuilder,
    config: CpuConfig,
    debugger_attached: bool,
    lookahead: Option<Result<InstDesc, BusFault>>,
    exit: Option<IrTerminator>,
}

impl TranslateCtx {
    pub fn new(config: CpuConfig, debugger_attached: bool) -> Self {
        Self {
            ir: IrBuilder::new(),
            config,
            debugger_attached,
            lookahead: None,
            exit: None,
        }
    }

    pub fn set_lookahead(&mut self, next: Result<InstDesc, BusFault>) {
        self.lookahead = Some(next);
    }

    /// The successor a `Branch` translator picked, if any.
    pub fn take_exit(&mut self) -> Option<IrTerminator> {
        self.exit.take()
    }

    pub fn finish(self) -> IrBuilder {
        self.ir
    }

    fn require(&self, feature: Features) -> Result<(), TranslateError> {
        if self.config.has(feature) {
            Ok(())
        } else {
            Err(TranslateError::Unsupported)
        }
    }

    fn has(&self, feature: Features) -> bool {
        self.config.has(feature)
    }

    /// Address just past the instruction following the current one.
    fn skip_target(&self) -> Result<u32, TranslateError> {
        match self.lookahead {
            Some(Ok(next)) => Ok(next.npc),
            Some(Err(fault)) => Err(TranslateError::Lookahead(fault)),
            None => Err(TranslateError::Unsupported),
        }
    }

    fn jump(&mut self, target: u32) -> BlockState {
        self.exit = Some(IrTerminator::Jump {
            target: target & PC_MASK,
        });
        BlockState::Branch
    }

    fn cond_jump(&mut self, cond: ValueId, target: u32, fallthrough: u32) -> BlockState {
        self.exit = Some(IrTerminator::CondJump {
            cond,
            target: target & PC_MASK,
            fallthrough: fallthrough & PC_MASK,
        });
        BlockState::Branch
    }

    fn indirect_jump(&mut self, target: ValueId) -> BlockState {
        let target = self.ir.bin_imm(BinOp::And, target, PC_MASK);
        self.exit = Some(IrTerminator::IndirectJump { target });
        BlockState::Branch
    }

    fn r(&mut self, reg: u8) -> ValueId {
        self.ir.read_gpr(reg)
    }

    fn set_r(&mut self, reg: u8, v: ValueId) {
        self.ir.write_gpr(reg, v);
    }

    fn mask8(&mut self, v: ValueId) -> ValueId {
        self.ir.bin_imm(BinOp::And, v, 0xff)
    }

    /// `ramp | r[lo+1] << 8 | r[lo]`
    fn compose(&mut self, ramp: Option<GuestReg>, lo: u8) -> ValueId {
        let l = self.r(lo);
        let h = self.r(lo + 1);
        let h = self.ir.bin_imm(BinOp::Shl, h, 8);
        let addr = self.ir.bin(BinOp::Or, h, l);
        match ramp {
            Some(ramp) => {
                let ramp = self.ir.read(ramp);
                self.ir.bin(BinOp::Or, ramp, addr)
            }
            None => addr,
        }
    }

    /// Inverse of [`Self::compose`].
    fn decompose(&mut self, ramp: Option<GuestReg>, lo: u8, addr: ValueId) {
        let l = self.mask8(addr);
        let h = self.ir.bin_imm(BinOp::Shr, addr, 8);
        let h = self.mask8(h);
        self.set_r(lo, l);
        self.set_r(lo + 1, h);
        if let Some(ramp) = ramp {
            let r = self.ir.bin_imm(BinOp::And, addr, 0x00ff_0000);
            self.ir.write(ramp, r);
        }
    }

    fn offset_addr(&mut self, addr: ValueId, delta: i32) -> ValueId {
        let sum = self.ir.bin_imm(BinOp::Add, addr, delta as u32);
        self.ir.bin_imm(BinOp::And, sum, ADDR_MASK)
    }

    fn load_data(&mut self, addr: ValueId) -> ValueId {
        self.ir.load(MemSpace::Data, addr)
    }

    fn store_data(&mut self, addr: ValueId, v: ValueId) {
        self.ir.store(MemSpace::Data, addr, v);
    }

    fn sp_offset(&mut self, sp: ValueId, delta: i32) -> ValueId {
        let sum = self.ir.bin_imm(BinOp::Add, sp, delta as u32);
        self.ir.bin_imm(BinOp::And, sum, 0xffff)
    }

    fn push_byte(&mut self, v: ValueId) {
        let sp = self.ir.read(GuestReg::Sp);
        self.store_data(sp, v);
        let sp = self.sp_offset(sp, -1);
        self.ir.write(GuestReg::Sp, sp);
    }

    fn pop_byte(&mut self) -> ValueId {
        let sp = self.ir.read(GuestReg::Sp);
        let sp = self.sp_offset(sp, 1);
        self.ir.write(GuestReg::Sp, sp);
        self.load_data(sp)
    }

    /// Pushes a return address using the variant's frame layout.
    fn push_ret(&mut self, ret: u32) {
        let width = self.config.pc_width();
        let base = self.ir.read(GuestReg::Sp);
        for slot in frame_slots(width) {
            let addr = self.sp_offset(base, -i32::from(slot.offset));
            let byte = self.ir.konst((ret >> slot.shift) & 0xff);
            self.store_data(addr, byte);
        }
        let sp = self.sp_offset(base, -i32::from(width.bytes()));
        self.ir.write(GuestReg::Sp, sp);
    }

    fn pop_ret(&mut self) -> ValueId {
        let width = self.config.pc_width();
        let sp = self.ir.read(GuestReg::Sp);
        let base = self.sp_offset(sp, i32::from(width.bytes()));
        let mut ret = self.ir.konst(0);
        for slot in frame_slots(width) {
            let addr = self.sp_offset(base, -i32::from(slot.offset));
            let byte = self.load_data(addr);
            let byte = self.ir.bin_imm(BinOp::Shl, byte, slot.shift);
            ret = self.ir.bin(BinOp::Or, ret, byte);
        }
        self.ir.write(GuestReg::Sp, base);
        ret
    }
}

/// Maps an SREG bit index to its flag.
fn sreg_flag(bit: u8) -> Flag {
    Flag::ALL[usize::from(bit & 7)]
}

/// Translates one instruction into `ctx`.
///
/// Rejected instructions become a single `Unsupported` trap and end the block;
/// a failed skip lookahead aborts the whole block build.
pub(crate) fn translate_inst(ctx: &mut TranslateCtx, inst: &InstDesc) -> Result<BlockState, JitError> {
    let mark = ctx.ir.len();
    match dispatch(ctx, inst) {
        Ok(state) => Ok(state),
        Err(TranslateError::Unsupported) => {
            debug_assert_eq!(ctx.ir.len(), mark, "{} emitted IR before rejecting", inst.opcode);
            trace!(pc = inst.cpc, opcode = inst.raw, "unsupported {}", inst.opcode);
            ctx.exit = None;
            ctx.ir.trap(
                TrapKind::Unsupported { opcode: inst.raw },
                Some(inst.cpc),
            );
            Ok(BlockState::Exception)
        }
        Err(TranslateError::Lookahead(fault)) => Err(JitError::Fetch(fault)),
    }
}

fn dispatch(ctx: &mut TranslateCtx, inst: &InstDesc) -> TResult {
    use Opcode::*;

    match inst.opcode {
        Add | Adc | Sub | Subi | Sbc | Sbci | Cp | Cpc | Cpi | Neg | Inc | Dec | Adiw | Sbiw
        | Mul | Muls | Mulsu | Fmul | Fmuls | Fmulsu => arith::translate(ctx, inst),

        And | Andi | Or | Ori | Eor | Com | Lsr | Asr | Ror | Swap | Mov | Movw | Ldi | Bld
        | Bst | Bset | Bclr => logic::translate(ctx, inst),

        LddZ | LddY | StdZ | StdY | Lds | Sts | LdX | LdXInc | LdXDec | LdYInc | LdYDec
        | LdZInc | LdZDec | StX | StXInc | StXDec | StYInc | StYDec | StZInc | StZDec | Lpm
        | LpmZ | LpmZInc | Elpm | ElpmZ | ElpmZInc | Push | Pop | Xch | Las | Lac | Lat => {
            mem::translate(ctx, inst)
        }

        Rjmp | Rcall | Jmp | Call | Ijmp | Icall | Eijmp | Eicall | Ret | Reti | Brbs | Brbc
        | Cpse | Sbrc | Sbrs | Sbic | Sbis => control::translate(ctx, inst),

        Nop | In | Out | Cbi | Sbi | Sleep | Break | Wdr | Spm | SpmZInc | Des => {
            system::translate(ctx, inst)
        }

        Undefined => Err(TranslateError::Unsupported),
    }
}
