//! Translation-block construction.
//!
//! A block is a run of consecutive guest instructions starting at one PC. It
//! ends at the first instruction that changes control flow or traps, after
//! [`JitConfig::max_block_insns`] instructions, in single-step mode after one
//! instruction, or before an instruction that would reach past the starting
//! page of program memory.

use std::collections::BTreeSet;

use avr_cpu_core::{BusFault, CpuBus, CpuConfig, Features, PC_MASK};
use avr_decoder::{decode_at, InstDesc};
use tracing::trace;

use crate::config::JitConfig;
use crate::error::Result;
use crate::ir::{GuestReg, IrBlock, IrTerminator, TrapKind};
use crate::translate::{translate_inst, TranslateCtx};

/// Outcome of translating one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Fall through to the next instruction.
    Continue,
    /// End the block and continue at the next instruction.
    Stop,
    /// The translator chose the block's successor.
    Branch,
    /// A trap was emitted; control returns to the execution loop.
    Exception,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationBlock {
    /// Word address of the first instruction.
    pub start: u32,
    /// Word address just past the last instruction.
    pub end: u32,
    pub icount: u32,
    /// Feature set the block was translated for.
    pub features: Features,
    pub ir: IrBlock,
}

impl TranslationBlock {
    pub fn size_bytes(&self) -> u32 {
        (self.end - self.start) * 2
    }

    pub fn contains(&self, pc: u32) -> bool {
        (self.start..self.end).contains(&pc)
    }

    /// Whether the block shares a word with `[start, end)`.
    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        self.start < end && start < self.end
    }
}

static NO_BREAKPOINTS: BTreeSet<u32> = BTreeSet::new();

/// Debugger-visible knobs that change what gets translated.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions<'a> {
    pub singlestep: bool,
    pub debugger_attached: bool,
    /// Word addresses.
    pub breakpoints: &'a BTreeSet<u32>,
}

impl Default for BuildOptions<'static> {
    fn default() -> Self {
        Self {
            singlestep: false,
            debugger_attached: false,
            breakpoints: &NO_BREAKPOINTS,
        }
    }
}

/// Translates the block starting at word address `pc`.
///
/// Fails only when an instruction the block needs cannot be fetched: the first
/// one, the second word of a 32-bit instruction, or the instruction a skip
/// would jump over.
pub fn build_block<B: CpuBus + ?Sized>(
    bus: &mut B,
    config: &CpuConfig,
    pc: u32,
    jit: &JitConfig,
    opts: &BuildOptions<'_>,
) -> Result<TranslationBlock> {
    let start = pc & PC_MASK;
    let page_mask = jit.page_mask();
    let start_page = (start * 2) & page_mask;
    let mut fetch = |addr: u32| -> std::result::Result<u16, BusFault> { bus.fetch(addr) };

    let mut ctx = TranslateCtx::new(*config, opts.debugger_attached);
    let mut cur = decode_at(start, &mut fetch)?;
    let mut icount = 0u32;

    let state = loop {
        let next = decode_at(cur.npc, &mut fetch);
        // A trailing breakpoint counts too: the block spans its address.
        icount += 1;

        if opts.breakpoints.contains(&cur.cpc) {
            ctx.ir.trap(TrapKind::Breakpoint, Some(cur.cpc));
            break BlockState::Exception;
        }

        ctx.set_lookahead(next);
        let state = translate_inst(&mut ctx, &cur)?;
        if state != BlockState::Continue || icount >= jit.max_block_insns || opts.singlestep {
            break state;
        }
        match next {
            Ok(n) if ((n.npc * 2 - 1) & page_mask) == start_page => cur = n,
            _ => break BlockState::Stop,
        }
    };

    let terminator = match state {
        BlockState::Exception => IrTerminator::Exit,
        _ if opts.singlestep => {
            materialize_pc(&mut ctx, state, &cur);
            ctx.ir.trap(TrapKind::SingleStep, None);
            IrTerminator::Exit
        }
        BlockState::Continue | BlockState::Stop => IrTerminator::Jump {
            target: cur.npc & PC_MASK,
        },
        BlockState::Branch => ctx.take_exit().unwrap_or(IrTerminator::Exit),
    };

    let ir = ctx.finish().finish(start, terminator);
    trace!(
        start,
        end = cur.npc,
        icount,
        insts = ir.insts.len(),
        "built block"
    );
    Ok(TranslationBlock {
        start,
        end: cur.npc,
        icount,
        features: config.features(),
        ir,
    })
}

/// Writes the PC the block would have continued at, turning a branch exit into
/// plain IR.
fn materialize_pc(ctx: &mut TranslateCtx, state: BlockState, cur: &InstDesc) {
    let target = match state {
        BlockState::Branch => match ctx.take_exit() {
            Some(IrTerminator::Jump { target }) => ctx.ir.konst(target),
            Some(IrTerminator::CondJump {
                cond,
                target,
                fallthrough,
            }) => {
                let t = ctx.ir.konst(target);
                let f = ctx.ir.konst(fallthrough);
                ctx.ir.select(cond, t, f)
            }
            Some(IrTerminator::IndirectJump { target }) => target,
            Some(IrTerminator::Exit) | None => return,
        },
        _ => ctx.ir.konst(cur.npc & PC_MASK),
    };
    ctx.ir.write(GuestReg::Pc, target);
}

#[cfg(test)]
mod tests {
    use avr_cpu_core::{CpuModel, FlatBus};

    use super::*;
    use crate::error::JitError;
    use crate::ir::IrInst;

    const NOP: u16 = 0x0000;

    fn bus_with(words: &[u16]) -> FlatBus {
        let mut bus = FlatBus::new(0x400, 0x100);
        bus.load_program(0, words);
        bus
    }

    fn build(bus: &mut FlatBus, pc: u32, jit: &JitConfig, opts: &BuildOptions<'_>) -> TranslationBlock {
        let config = CpuConfig::for_model(CpuModel::Avr6);
        build_block(bus, &config, pc, jit, opts).unwrap()
    }

    #[test]
    fn straight_line_code_ends_at_the_page_boundary() {
        let mut bus = bus_with(&[NOP; 0x200]);
        let block = build(&mut bus, 0, &JitConfig::default(), &BuildOptions::default());
        assert_eq!((block.start, block.end, block.icount), (0, 128, 128));
        assert_eq!(block.size_bytes(), 256);
        assert_eq!(block.ir.terminator, IrTerminator::Jump { target: 128 });
        assert!(block.contains(127));
        assert!(!block.contains(128));
    }

    #[test]
    fn instruction_limit_ends_the_block() {
        let mut bus = bus_with(&[NOP; 16]);
        let jit = JitConfig {
            max_block_insns: 3,
            ..JitConfig::default()
        };
        let block = build(&mut bus, 2, &jit, &BuildOptions::default());
        assert_eq!((block.start, block.end, block.icount), (2, 5, 3));
        assert_eq!(block.ir.terminator, IrTerminator::Jump { target: 5 });
    }

    #[test]
    fn long_instruction_straddling_the_page_starts_the_next_block() {
        // 16-byte pages: words 0..8. `JMP` at word 7 would end in word 8.
        let mut words = [NOP; 10];
        words[7] = 0x940c;
        words[8] = 0x0000;
        let mut bus = bus_with(&words);
        let jit = JitConfig {
            page_shift: 4,
            ..JitConfig::default()
        };
        let block = build(&mut bus, 5, &jit, &BuildOptions::default());
        assert_eq!((block.end, block.icount), (7, 2));
        assert_eq!(block.ir.terminator, IrTerminator::Jump { target: 7 });
    }

    #[test]
    fn breakpoint_traps_before_the_instruction() {
        let mut bus = bus_with(&[0xe402, 0x0f01, NOP]);
        let breakpoints = BTreeSet::from([1]);
        let opts = BuildOptions {
            breakpoints: &breakpoints,
            ..BuildOptions::default()
        };
        let block = build(&mut bus, 0, &JitConfig::default(), &opts);
        assert_eq!((block.end, block.icount), (2, 2));
        assert_eq!(block.ir.terminator, IrTerminator::Exit);
        assert_eq!(
            block.ir.insts.last(),
            Some(&IrInst::Trap {
                kind: TrapKind::Breakpoint,
                pc: Some(1)
            })
        );
        // `ADD` itself was not translated.
        assert_eq!(block.ir.traps().count(), 1);
        assert!(!block.ir.to_string().contains("add"));
    }

    #[test]
    fn singlestep_materializes_the_next_pc() {
        let mut bus = bus_with(&[0xe402, 0x0f01]);
        let opts = BuildOptions {
            singlestep: true,
            ..BuildOptions::default()
        };
        let block = build(&mut bus, 0, &JitConfig::default(), &opts);
        assert_eq!(block.icount, 1);
        assert_eq!(block.ir.terminator, IrTerminator::Exit);
        let n = block.ir.insts.len();
        assert!(matches!(
            block.ir.insts[n - 2],
            IrInst::WriteReg {
                reg: GuestReg::Pc,
                ..
            }
        ));
        assert_eq!(
            block.ir.insts[n - 1],
            IrInst::Trap {
                kind: TrapKind::SingleStep,
                pc: None
            }
        );
    }

    #[test]
    fn singlestep_over_a_conditional_branch_selects_the_target() {
        // breq .+4
        let mut bus = bus_with(&[0xf011, NOP]);
        let opts = BuildOptions {
            singlestep: true,
            ..BuildOptions::default()
        };
        let block = build(&mut bus, 0, &JitConfig::default(), &opts);
        assert!(block
            .ir
            .insts
            .iter()
            .any(|i| matches!(i, IrInst::Select { .. })));
        assert_eq!(block.ir.terminator, IrTerminator::Exit);
    }

    #[test]
    fn relative_jump_becomes_a_chainable_exit() {
        // rjmp .-2 (to itself)
        let mut bus = bus_with(&[NOP, 0xcfff]);
        let block = build(&mut bus, 0, &JitConfig::default(), &BuildOptions::default());
        assert_eq!(block.icount, 2);
        assert_eq!(block.ir.terminator, IrTerminator::Jump { target: 1 });
        assert!(block.ir.terminator.is_chainable());
    }

    #[test]
    fn unsupported_instruction_is_a_single_trap() {
        let mut bus = bus_with(&[NOP, 0x9f01]);
        let config = CpuConfig::for_model(CpuModel::Avr2);
        let block = build_block(
            &mut bus,
            &config,
            0,
            &JitConfig::default(),
            &BuildOptions::default(),
        )
        .unwrap();
        assert_eq!(block.ir.terminator, IrTerminator::Exit);
        assert_eq!(
            block.ir.insts,
            vec![IrInst::Trap {
                kind: TrapKind::Unsupported { opcode: 0x9f01 },
                pc: Some(1)
            }]
        );
        assert_eq!(block.features, config.features());
    }

    #[test]
    fn fetch_fault_on_the_first_instruction_aborts() {
        let mut bus = FlatBus::new(4, 0);
        let config = CpuConfig::default();
        let err = build_block(
            &mut bus,
            &config,
            2,
            &JitConfig::default(),
            &BuildOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, JitError::Fetch(BusFault::code(2)));
    }

    #[test]
    fn skip_without_lookahead_aborts_but_plain_code_just_ends() {
        let config = CpuConfig::default();
        let jit = JitConfig::default();

        // cpse r0, r0 as the last word of program memory.
        let mut bus = FlatBus::new(4, 0);
        bus.load_program(0, &[NOP, 0x1000]);
        let err = build_block(&mut bus, &config, 0, &jit, &BuildOptions::default()).unwrap_err();
        assert_eq!(err, JitError::Fetch(BusFault::code(2)));

        let mut bus = FlatBus::new(4, 0);
        bus.load_program(0, &[NOP, NOP]);
        let block = build_block(&mut bus, &config, 0, &jit, &BuildOptions::default()).unwrap();
        assert_eq!((block.end, block.icount), (2, 2));
        assert_eq!(block.ir.terminator, IrTerminator::Jump { target: 2 });
    }

    #[test]
    fn overlap_is_half_open() {
        let mut bus = bus_with(&[NOP; 4]);
        let jit = JitConfig {
            max_block_insns: 2,
            ..JitConfig::default()
        };
        let block = build(&mut bus, 1, &jit, &BuildOptions::default());
        assert!(block.overlaps(0, 2));
        assert!(block.overlaps(2, 3));
        assert!(!block.overlaps(3, 4));
        assert!(!block.overlaps(0, 1));
    }
}
