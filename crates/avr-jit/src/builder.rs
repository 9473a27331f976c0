use avr_cpu_core::{Flag, MemSpace};

use crate::ir::{BinOp, CmpOp, GuestReg, Helper, IrBlock, IrInst, IrTerminator, TrapKind, ValueId};

/// Append-only IR emitter. Every value-producing call allocates a fresh
/// [`ValueId`].
#[derive(Debug, Default)]
pub struct IrBuilder {
    insts: Vec<IrInst>,
    next_value: u32,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn insts(&self) -> &[IrInst] {
        &self.insts
    }

    fn fresh(&mut self) -> ValueId {
        let v = ValueId(self.next_value);
        self.next_value += 1;
        v
    }

    pub fn konst(&mut self, value: u32) -> ValueId {
        let dst = self.fresh();
        self.insts.push(IrInst::Const { dst, value });
        dst
    }

    pub fn read(&mut self, reg: GuestReg) -> ValueId {
        let dst = self.fresh();
        self.insts.push(IrInst::ReadReg { dst, reg });
        dst
    }

    pub fn write(&mut self, reg: GuestReg, src: ValueId) {
        self.insts.push(IrInst::WriteReg { reg, src });
    }

    pub fn read_gpr(&mut self, r: u8) -> ValueId {
        self.read(GuestReg::Gpr(r))
    }

    pub fn write_gpr(&mut self, r: u8, src: ValueId) {
        self.write(GuestReg::Gpr(r), src);
    }

    pub fn read_flag(&mut self, flag: Flag) -> ValueId {
        self.read(GuestReg::Flag(flag))
    }

    pub fn write_flag(&mut self, flag: Flag, src: ValueId) {
        self.write(GuestReg::Flag(flag), src);
    }

    pub fn write_flag_const(&mut self, flag: Flag, value: u32) {
        let v = self.konst(value);
        self.write_flag(flag, v);
    }

    pub fn bin(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let dst = self.fresh();
        self.insts.push(IrInst::BinOp { dst, op, lhs, rhs });
        dst
    }

    pub fn bin_imm(&mut self, op: BinOp, lhs: ValueId, imm: u32) -> ValueId {
        let rhs = self.konst(imm);
        self.bin(op, lhs, rhs)
    }

    pub fn cmp(&mut self, op: CmpOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let dst = self.fresh();
        self.insts.push(IrInst::Cmp { dst, op, lhs, rhs });
        dst
    }

    pub fn cmp_imm(&mut self, op: CmpOp, lhs: ValueId, imm: u32) -> ValueId {
        let rhs = self.konst(imm);
        self.cmp(op, lhs, rhs)
    }

    pub fn select(&mut self, cond: ValueId, if_true: ValueId, if_false: ValueId) -> ValueId {
        let dst = self.fresh();
        self.insts.push(IrInst::Select {
            dst,
            cond,
            if_true,
            if_false,
        });
        dst
    }

    pub fn sext8(&mut self, src: ValueId) -> ValueId {
        let dst = self.fresh();
        self.insts.push(IrInst::SignExt8 { dst, src });
        dst
    }

    pub fn load(&mut self, space: MemSpace, addr: ValueId) -> ValueId {
        let dst = self.fresh();
        self.insts.push(IrInst::Load { dst, space, addr });
        dst
    }

    pub fn store(&mut self, space: MemSpace, addr: ValueId, value: ValueId) {
        self.insts.push(IrInst::Store { space, addr, value });
    }

    pub fn call(&mut self, helper: Helper, args: &[ValueId]) {
        self.insts.push(IrInst::CallHelper {
            helper,
            args: args.to_vec(),
            ret: None,
        });
    }

    pub fn call_ret(&mut self, helper: Helper, args: &[ValueId]) -> ValueId {
        let ret = self.fresh();
        self.insts.push(IrInst::CallHelper {
            helper,
            args: args.to_vec(),
            ret: Some(ret),
        });
        ret
    }

    pub fn trap(&mut self, kind: TrapKind, pc: Option<u32>) {
        self.insts.push(IrInst::Trap { kind, pc });
    }

    pub fn finish(self, entry_pc: u32, terminator: IrTerminator) -> IrBlock {
        IrBlock {
            entry_pc,
            insts: self.insts,
            terminator,
            value_count: self.next_value,
        }
    }
}
