//! Reference interpreter for translated blocks.
//!
//! Executes an [`IrBlock`] directly against [`AvrState`] and a [`CpuBus`]. It
//! is the execution engine of [`crate::runtime::Cpu`] and the oracle the
//! translation tests compare against.

use avr_cpu_core::{io, AvrState, BusFault, CpuBus, Flag, MemSpace, ADDR_MASK};

use crate::ir::{GuestReg, Helper, IrBlock, IrInst, IrTerminator, TrapKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecResult {
    /// The block ran to its terminator; `state.pc == next_pc`.
    Continue {
        next_pc: u32,
        /// The successor was static (`Jump`/`CondJump`).
        chained: bool,
    },
    /// A trap node ended the block early.
    Trap { kind: TrapKind, pc: u32 },
}

fn read_reg(state: &AvrState, reg: GuestReg) -> u32 {
    match reg {
        GuestReg::Gpr(r) => u32::from(state.regs[usize::from(r)]),
        GuestReg::Flag(flag) => state.flag_raw(flag),
        GuestReg::RampD => state.rampd,
        GuestReg::RampX => state.rampx,
        GuestReg::RampY => state.rampy,
        GuestReg::RampZ => state.rampz,
        GuestReg::Eind => state.eind,
        GuestReg::Sp => u32::from(state.sp),
        GuestReg::Pc => state.pc,
    }
}

fn write_reg(state: &mut AvrState, reg: GuestReg, v: u32) {
    const RAMP_MASK: u32 = 0x00ff_0000;
    match reg {
        GuestReg::Gpr(r) => state.regs[usize::from(r)] = v as u8,
        GuestReg::Flag(flag) => state.set_flag_raw(flag, v),
        GuestReg::RampD => state.rampd = v & RAMP_MASK,
        GuestReg::RampX => state.rampx = v & RAMP_MASK,
        GuestReg::RampY => state.rampy = v & RAMP_MASK,
        GuestReg::RampZ => state.rampz = v & RAMP_MASK,
        GuestReg::Eind => state.eind = v & RAMP_MASK,
        GuestReg::Sp => state.sp = v as u16,
        GuestReg::Pc => state.set_pc(v),
    }
}

fn call_helper<B: CpuBus + ?Sized>(
    state: &mut AvrState,
    bus: &mut B,
    helper: Helper,
    args: &[u32],
) -> Result<u32, BusFault> {
    let arg = |i: usize| args.get(i).copied().unwrap_or(0);
    Ok(match helper {
        Helper::InB => u32::from(io::read_port(state, bus, arg(0) as u8)?),
        Helper::OutB => {
            io::write_port(state, bus, arg(0) as u8, arg(1) as u8)?;
            0
        }
        Helper::Wdr => {
            bus.watchdog_reset();
            0
        }
        Helper::Spm => {
            bus.spm(arg(0), arg(1) as u16)?;
            0
        }
        Helper::Des => {
            let decrypt = state.flag(Flag::H);
            bus.des_round(&mut state.regs, arg(0) as u8, decrypt);
            0
        }
    })
}

/// Runs `block` to completion. A bus fault stops execution at the faulting
/// access; state changes made before it are kept.
pub fn execute_block<B: CpuBus + ?Sized>(
    block: &IrBlock,
    state: &mut AvrState,
    bus: &mut B,
) -> Result<ExecResult, BusFault> {
    let mut temps = vec![0u32; block.value_count as usize];
    let mut args = Vec::new();

    for inst in &block.insts {
        match inst {
            IrInst::Const { dst, value } => temps[dst.0 as usize] = *value,
            IrInst::ReadReg { dst, reg } => temps[dst.0 as usize] = read_reg(state, *reg),
            IrInst::WriteReg { reg, src } => write_reg(state, *reg, temps[src.0 as usize]),
            IrInst::BinOp { dst, op, lhs, rhs } => {
                temps[dst.0 as usize] = op.eval(temps[lhs.0 as usize], temps[rhs.0 as usize]);
            }
            IrInst::Cmp { dst, op, lhs, rhs } => {
                temps[dst.0 as usize] =
                    u32::from(op.eval(temps[lhs.0 as usize], temps[rhs.0 as usize]));
            }
            IrInst::Select {
                dst,
                cond,
                if_true,
                if_false,
            } => {
                let pick = if temps[cond.0 as usize] != 0 {
                    if_true
                } else {
                    if_false
                };
                temps[dst.0 as usize] = temps[pick.0 as usize];
            }
            IrInst::SignExt8 { dst, src } => {
                temps[dst.0 as usize] = temps[src.0 as usize] as u8 as i8 as i32 as u32;
            }
            IrInst::Load { dst, space, addr } => {
                let addr = temps[addr.0 as usize] & ADDR_MASK;
                let v = match space {
                    MemSpace::Data => io::load_data(state, bus, addr)?,
                    MemSpace::Code => bus.load(MemSpace::Code, addr)?,
                };
                temps[dst.0 as usize] = u32::from(v);
            }
            IrInst::Store { space, addr, value } => {
                let addr = temps[addr.0 as usize] & ADDR_MASK;
                let v = temps[value.0 as usize] as u8;
                match space {
                    MemSpace::Data => io::store_data(state, bus, addr, v)?,
                    MemSpace::Code => bus.store(MemSpace::Code, addr, v)?,
                }
            }
            IrInst::CallHelper {
                helper,
                args: arg_ids,
                ret,
            } => {
                args.clear();
                args.extend(arg_ids.iter().map(|a| temps[a.0 as usize]));
                let v = call_helper(state, bus, *helper, &args)?;
                if let Some(ret) = ret {
                    temps[ret.0 as usize] = v;
                }
            }
            IrInst::Trap { kind, pc } => {
                if let Some(pc) = pc {
                    state.set_pc(*pc);
                }
                return Ok(ExecResult::Trap {
                    kind: *kind,
                    pc: state.pc,
                });
            }
        }
    }

    let chained = block.terminator.is_chainable();
    match block.terminator {
        IrTerminator::Jump { target } => state.set_pc(target),
        IrTerminator::CondJump {
            cond,
            target,
            fallthrough,
        } => {
            let next = if temps[cond.0 as usize] != 0 {
                target
            } else {
                fallthrough
            };
            state.set_pc(next);
        }
        IrTerminator::IndirectJump { target } => state.set_pc(temps[target.0 as usize]),
        IrTerminator::Exit => {}
    }
    Ok(ExecResult::Continue {
        next_pc: state.pc,
        chained,
    })
}

#[cfg(test)]
mod tests {
    use avr_cpu_core::{CpuConfig, CpuModel, FlatBus};

    use super::*;
    use crate::builder::IrBuilder;
    use crate::ir::{BinOp, CmpOp};

    fn state() -> AvrState {
        AvrState::new(CpuConfig::for_model(CpuModel::Xmega7))
    }

    #[test]
    fn register_writes_truncate_to_their_width() {
        let mut b = IrBuilder::new();
        let v = b.konst(0x1234_5678);
        b.write_gpr(3, v);
        b.write(GuestReg::Sp, v);
        b.write(GuestReg::RampZ, v);
        b.write(GuestReg::Pc, v);
        let block = b.finish(0, IrTerminator::Exit);

        let mut s = state();
        let mut bus = FlatBus::new(0, 0);
        let res = execute_block(&block, &mut s, &mut bus).unwrap();
        assert_eq!(s.regs[3], 0x78);
        assert_eq!(s.sp, 0x5678);
        assert_eq!(s.rampz, 0x0034_0000);
        assert_eq!(s.pc, 0x1234_5678 & avr_cpu_core::PC_MASK);
        assert_eq!(
            res,
            ExecResult::Continue {
                next_pc: s.pc,
                chained: false
            }
        );
    }

    #[test]
    fn low_data_addresses_hit_registers_and_io() {
        let mut b = IrBuilder::new();
        let r5 = b.konst(0x05);
        let sreg = b.konst(0x5f);
        let ram = b.konst(0x100);
        let v = b.konst(0xa5);
        b.store(MemSpace::Data, r5, v);
        let s = b.load(MemSpace::Data, sreg);
        b.store(MemSpace::Data, ram, s);
        let block = b.finish(0, IrTerminator::Exit);

        let mut s = state();
        s.set_sreg(0x81);
        let mut bus = FlatBus::new(0, 0x200);
        execute_block(&block, &mut s, &mut bus).unwrap();
        assert_eq!(s.regs[5], 0xa5);
        assert_eq!(bus.data()[0x100], 0x81);
    }

    #[test]
    fn cond_jump_and_select_follow_the_condition() {
        let mut b = IrBuilder::new();
        let r = b.read_gpr(0);
        let c = b.cmp_imm(CmpOp::Eq, r, 7);
        let one = b.konst(1);
        let two = b.konst(2);
        let sel = b.select(c, one, two);
        b.write_gpr(1, sel);
        let block = b.finish(
            0,
            IrTerminator::CondJump {
                cond: c,
                target: 0x40,
                fallthrough: 0x10,
            },
        );

        let mut bus = FlatBus::new(0, 0);
        for (r0, want_r1, want_pc) in [(7u8, 1u8, 0x40u32), (8, 2, 0x10)] {
            let mut s = state();
            s.regs[0] = r0;
            let res = execute_block(&block, &mut s, &mut bus).unwrap();
            assert_eq!(s.regs[1], want_r1);
            assert_eq!(
                res,
                ExecResult::Continue {
                    next_pc: want_pc,
                    chained: true
                }
            );
        }
    }

    #[test]
    fn trap_stops_before_later_instructions() {
        let mut b = IrBuilder::new();
        let v = b.konst(9);
        b.trap(TrapKind::Sleep, Some(0x22));
        b.write_gpr(0, v);
        let block = b.finish(0, IrTerminator::Jump { target: 0 });

        let mut s = state();
        let mut bus = FlatBus::new(0, 0);
        let res = execute_block(&block, &mut s, &mut bus).unwrap();
        assert_eq!(
            res,
            ExecResult::Trap {
                kind: TrapKind::Sleep,
                pc: 0x22
            }
        );
        assert_eq!(s.regs[0], 0);
    }

    #[test]
    fn bus_fault_is_reported() {
        let mut b = IrBuilder::new();
        let a = b.konst(0x1_0000);
        let a = b.bin_imm(BinOp::Or, a, 0x20_0000);
        b.load(MemSpace::Data, a);
        let block = b.finish(0, IrTerminator::Exit);

        let mut s = state();
        let mut bus = FlatBus::new(0, 0x100);
        assert_eq!(
            execute_block(&block, &mut s, &mut bus),
            Err(BusFault::data(0x21_0000))
        );
    }

    #[test]
    fn helpers_reach_the_bus() {
        let mut b = IrBuilder::new();
        b.call(Helper::Wdr, &[]);
        let port = b.konst(0x3d);
        let spl = b.call_ret(Helper::InB, &[port]);
        b.write_gpr(2, spl);
        let block = b.finish(0, IrTerminator::Exit);

        let mut s = state();
        s.sp = 0x1ff;
        let mut bus = FlatBus::new(0, 0);
        execute_block(&block, &mut s, &mut bus).unwrap();
        assert_eq!(bus.wdr_count(), 1);
        assert_eq!(s.regs[2], 0xff);
    }
}
