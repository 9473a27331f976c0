//! Translation IR.
//!
//! A block is a straight-line list of [`IrInst`] over SSA-style 32-bit values
//! followed by exactly one [`IrTerminator`]. Guest state is only touched through
//! `ReadReg`/`WriteReg`, memory through `Load`/`Store`, and anything with host
//! side effects through `CallHelper`.

use std::fmt;

use avr_cpu_core::{Flag, MemSpace};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GuestReg {
    Gpr(u8),
    /// Raw flag slot; see `AvrState` for the `Z` encoding.
    Flag(Flag),
    RampD,
    RampX,
    RampY,
    RampZ,
    Eind,
    Sp,
    Pc,
}

impl fmt::Display for GuestReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuestReg::Gpr(r) => write!(f, "r{r}"),
            GuestReg::Flag(flag) => write!(f, "{}f", flag.letter()),
            GuestReg::RampD => f.write_str("rampd"),
            GuestReg::RampX => f.write_str("rampx"),
            GuestReg::RampY => f.write_str("rampy"),
            GuestReg::RampZ => f.write_str("rampz"),
            GuestReg::Eind => f.write_str("eind"),
            GuestReg::Sp => f.write_str("sp"),
            GuestReg::Pc => f.write_str("pc"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinOp {
    /// 32-bit wrapping semantics; shift counts are taken modulo 32.
    pub fn eval(self, lhs: u32, rhs: u32) -> u32 {
        match self {
            BinOp::Add => lhs.wrapping_add(rhs),
            BinOp::Sub => lhs.wrapping_sub(rhs),
            BinOp::Mul => lhs.wrapping_mul(rhs),
            BinOp::And => lhs & rhs,
            BinOp::Or => lhs | rhs,
            BinOp::Xor => lhs ^ rhs,
            BinOp::Shl => lhs.wrapping_shl(rhs),
            BinOp::Shr => lhs.wrapping_shr(rhs),
        }
    }

    fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
}

impl CmpOp {
    pub fn eval(self, lhs: u32, rhs: u32) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
        }
    }
}

/// Host services reachable from generated code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Helper {
    /// `(port) -> value`
    InB,
    /// `(port, value)`
    OutB,
    /// `()`
    Wdr,
    /// `(byte address, data word)`
    Spm,
    /// `(round)`, operates on r0..r15 with `H` selecting decryption.
    Des,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrapKind {
    /// Instruction not available on this CPU variant (or an unassigned
    /// encoding).
    Unsupported { opcode: u32 },
    Breakpoint,
    SingleStep,
    Sleep,
    /// `BREAK` with a debugger attached.
    Break,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IrInst {
    Const {
        dst: ValueId,
        value: u32,
    },
    ReadReg {
        dst: ValueId,
        reg: GuestReg,
    },
    WriteReg {
        reg: GuestReg,
        src: ValueId,
    },
    BinOp {
        dst: ValueId,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// `dst = (lhs op rhs) as u32`
    Cmp {
        dst: ValueId,
        op: CmpOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Select {
        dst: ValueId,
        cond: ValueId,
        if_true: ValueId,
        if_false: ValueId,
    },
    /// Sign-extends the low byte of `src`.
    SignExt8 {
        dst: ValueId,
        src: ValueId,
    },
    /// Byte load.
    Load {
        dst: ValueId,
        space: MemSpace,
        addr: ValueId,
    },
    /// Byte store (low 8 bits of `value`).
    Store {
        space: MemSpace,
        addr: ValueId,
        value: ValueId,
    },
    CallHelper {
        helper: Helper,
        args: Vec<ValueId>,
        ret: Option<ValueId>,
    },
    /// Leaves the block. With `pc: Some(_)` the PC is set first; otherwise the
    /// block has already written it.
    Trap {
        kind: TrapKind,
        pc: Option<u32>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IrTerminator {
    /// Static successor; chainable.
    Jump {
        target: u32,
    },
    /// Two static successors; chainable.
    CondJump {
        cond: ValueId,
        target: u32,
        fallthrough: u32,
    },
    IndirectJump {
        target: ValueId,
    },
    /// Return to the execution loop with the PC already in state.
    Exit,
}

impl IrTerminator {
    pub fn is_chainable(&self) -> bool {
        matches!(self, IrTerminator::Jump { .. } | IrTerminator::CondJump { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IrBlock {
    pub entry_pc: u32,
    pub insts: Vec<IrInst>,
    pub terminator: IrTerminator,
    pub value_count: u32,
}

impl IrBlock {
    pub fn traps(&self) -> impl Iterator<Item = TrapKind> + '_ {
        self.insts.iter().filter_map(|inst| match inst {
            IrInst::Trap { kind, .. } => Some(*kind),
            _ => None,
        })
    }

    pub fn calls_helper(&self, helper: Helper) -> bool {
        self.insts
            .iter()
            .any(|inst| matches!(inst, IrInst::CallHelper { helper: h, .. } if *h == helper))
    }
}

impl fmt::Display for IrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "block @{:#07x}:", self.entry_pc)?;
        for inst in &self.insts {
            write!(f, "  ")?;
            match inst {
                IrInst::Const { dst, value } => writeln!(f, "{dst} = const {value:#x}")?,
                IrInst::ReadReg { dst, reg } => writeln!(f, "{dst} = read {reg}")?,
                IrInst::WriteReg { reg, src } => writeln!(f, "write {reg}, {src}")?,
                IrInst::BinOp { dst, op, lhs, rhs } => {
                    writeln!(f, "{dst} = {} {lhs}, {rhs}", op.name())?
                }
                IrInst::Cmp { dst, op, lhs, rhs } => writeln!(f, "{dst} = cmp.{op:?} {lhs}, {rhs}")?,
                IrInst::Select {
                    dst,
                    cond,
                    if_true,
                    if_false,
                } => writeln!(f, "{dst} = select {cond}, {if_true}, {if_false}")?,
                IrInst::SignExt8 { dst, src } => writeln!(f, "{dst} = sext8 {src}")?,
                IrInst::Load { dst, space, addr } => writeln!(f, "{dst} = load.{space:?} [{addr}]")?,
                IrInst::Store { space, addr, value } => {
                    writeln!(f, "store.{space:?} [{addr}], {value}")?
                }
                IrInst::CallHelper { helper, args, ret } => {
                    if let Some(ret) = ret {
                        write!(f, "{ret} = ")?;
                    }
                    write!(f, "call {helper:?}(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    writeln!(f, ")")?
                }
                IrInst::Trap { kind, pc } => match pc {
                    Some(pc) => writeln!(f, "trap {kind:?} @{pc:#07x}")?,
                    None => writeln!(f, "trap {kind:?}")?,
                },
            }
        }
        match &self.terminator {
            IrTerminator::Jump { target } => writeln!(f, "  jump {target:#07x}"),
            IrTerminator::CondJump {
                cond,
                target,
                fallthrough,
            } => writeln!(f, "  br {cond}, {target:#07x}, {fallthrough:#07x}"),
            IrTerminator::IndirectJump { target } => writeln!(f, "  jump {target}"),
            IrTerminator::Exit => writeln!(f, "  exit"),
        }
    }
}
