//! Execution loop: interrupt dispatch, block lookup/translation and execution.

use std::collections::BTreeSet;

use avr_cpu_core::interrupts::{self, Delivery};
use avr_cpu_core::{AvrState, BusFault, CpuBus, CpuConfig, MemSpace, PC_MASK};
use tracing::{debug, trace, warn};

use crate::block::{build_block, BuildOptions};
use crate::cache::{BlockCache, BlockCacheStats};
use crate::config::JitConfig;
use crate::error::JitError;
use crate::interp::{execute_block, ExecResult};
use crate::ir::TrapKind;

/// Why [`Cpu::step`] or [`Cpu::run`] handed control back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuExit {
    /// `SLEEP` executed, or the CPU is still asleep with nothing to wake it.
    Sleep,
    Breakpoint { pc: u32 },
    SingleStep { pc: u32 },
    /// `BREAK` with a debugger attached.
    Break { pc: u32 },
    /// Instruction not implemented by this CPU model.
    IllegalInstruction { pc: u32, opcode: u32 },
    BusFault(BusFault),
    /// [`Cpu::run`] executed its block budget without another exit.
    BudgetExhausted,
}

/// Forwards to the host bus and records every program-memory write so the
/// blocks covering it can be dropped.
struct CodeWriteTracker<'a, B: ?Sized> {
    inner: &'a mut B,
    /// Word addresses.
    written: Vec<u32>,
}

impl<'a, B: CpuBus + ?Sized> CodeWriteTracker<'a, B> {
    fn new(inner: &'a mut B) -> Self {
        Self {
            inner,
            written: Vec::new(),
        }
    }
}

impl<B: CpuBus + ?Sized> CpuBus for CodeWriteTracker<'_, B> {
    fn fetch(&mut self, word_addr: u32) -> Result<u16, BusFault> {
        self.inner.fetch(word_addr)
    }

    fn load(&mut self, space: MemSpace, addr: u32) -> Result<u8, BusFault> {
        self.inner.load(space, addr)
    }

    fn store(&mut self, space: MemSpace, addr: u32, val: u8) -> Result<(), BusFault> {
        if space == MemSpace::Code {
            self.written.push(addr / 2);
        }
        self.inner.store(space, addr, val)
    }

    fn watchdog_reset(&mut self) {
        self.inner.watchdog_reset();
    }

    fn spm(&mut self, addr: u32, data: u16) -> Result<(), BusFault> {
        self.written.push(addr / 2);
        self.inner.spm(addr, data)
    }

    fn des_round(&mut self, regs: &mut [u8; 32], round: u8, decrypt: bool) {
        self.inner.des_round(regs, round, decrypt);
    }
}

pub struct Cpu {
    state: AvrState,
    jit: JitConfig,
    cache: BlockCache,
    /// Word addresses.
    breakpoints: BTreeSet<u32>,
    singlestep: bool,
    debugger_attached: bool,
    /// Fetch fault from the last block build, reported by the next step.
    pending_fault: Option<BusFault>,
}

impl Cpu {
    pub fn new(config: CpuConfig, jit: JitConfig) -> Self {
        let cache = BlockCache::new(jit.cache_capacity);
        Self {
            state: AvrState::new(config),
            jit,
            cache,
            breakpoints: BTreeSet::new(),
            singlestep: false,
            debugger_attached: false,
            pending_fault: None,
        }
    }

    pub fn state(&self) -> &AvrState {
        &self.state
    }

    /// Direct state access. Changing registers is fine; to change the CPU
    /// model use [`Cpu::switch_model`] so stale translations are dropped.
    pub fn state_mut(&mut self) -> &mut AvrState {
        &mut self.state
    }

    pub fn config(&self) -> &CpuConfig {
        self.state.config()
    }

    pub fn jit_config(&self) -> &JitConfig {
        &self.jit
    }

    pub fn cache_stats(&self) -> BlockCacheStats {
        self.cache.stats()
    }

    pub fn cached_blocks(&self) -> usize {
        self.cache.len()
    }

    /// Power-on reset; pending interrupt lines survive.
    pub fn reset(&mut self) {
        self.state.reset();
        self.pending_fault = None;
        self.cache.flush();
    }

    /// Replaces the CPU with a fresh one of a different model.
    pub fn switch_model(&mut self, config: CpuConfig) {
        debug!(from = ?self.state.config().model(), to = ?config.model(), "switching cpu model");
        self.state = AvrState::new(config);
        self.pending_fault = None;
        self.cache.flush();
    }

    pub fn raise_interrupt(&mut self, line: u32) -> avr_cpu_core::Result<()> {
        self.state.set_interrupt_line(line, true)
    }

    pub fn lower_interrupt(&mut self, line: u32) -> avr_cpu_core::Result<()> {
        self.state.set_interrupt_line(line, false)
    }

    pub fn request_reset(&mut self) {
        self.state.request_reset();
    }

    pub fn breakpoints(&self) -> &BTreeSet<u32> {
        &self.breakpoints
    }

    pub fn is_breakpoint(&self, pc: u32) -> bool {
        self.breakpoints.contains(&pc)
    }

    /// Returns `false` if the breakpoint was already set.
    pub fn insert_breakpoint(&mut self, pc: u32) -> bool {
        let pc = pc & PC_MASK;
        let inserted = self.breakpoints.insert(pc);
        if inserted {
            self.cache.invalidate_range(pc, pc + 1);
        }
        inserted
    }

    /// Returns `false` if there was no breakpoint at `pc`.
    pub fn remove_breakpoint(&mut self, pc: u32) -> bool {
        let pc = pc & PC_MASK;
        let removed = self.breakpoints.remove(&pc);
        if removed {
            self.cache.invalidate_range(pc, pc + 1);
        }
        removed
    }

    pub fn singlestep(&self) -> bool {
        self.singlestep
    }

    pub fn set_singlestep(&mut self, enabled: bool) {
        if self.singlestep != enabled {
            self.singlestep = enabled;
            self.cache.flush();
        }
    }

    /// With a debugger attached, `BREAK` stops execution instead of being a
    /// no-op.
    pub fn set_debugger_attached(&mut self, attached: bool) {
        if self.debugger_attached != attached {
            self.debugger_attached = attached;
            self.cache.flush();
        }
    }

    /// Drops translations covering program memory the host changed behind the
    /// CPU's back. Word addresses, half-open.
    pub fn invalidate_code(&mut self, start: u32, end: u32) -> usize {
        self.cache.invalidate_range(start, end)
    }

    /// Dispatches interrupts, then translates (if needed) and executes one
    /// block. Returns `None` when execution can simply continue.
    pub fn step<B: CpuBus + ?Sized>(&mut self, bus: &mut B) -> Option<CpuExit> {
        match interrupts::deliver(&mut self.state, bus) {
            Ok(Some(delivery)) => {
                // The fetch fault belonged to the old PC.
                self.pending_fault = None;
                if delivery == Delivery::Reset {
                    self.cache.flush();
                }
            }
            Ok(None) => {}
            Err(fault) => {
                warn!(addr = fault.addr, "bus fault during interrupt delivery");
                return Some(CpuExit::BusFault(fault));
            }
        }

        if let Some(fault) = self.pending_fault.take() {
            warn!(addr = fault.addr, space = ?fault.space, pc = self.state.pc, "bus fault");
            return Some(CpuExit::BusFault(fault));
        }

        if self.state.halted {
            return Some(CpuExit::Sleep);
        }

        let pc = self.state.pc;
        if self.cache.get(pc).is_none() {
            let opts = BuildOptions {
                singlestep: self.singlestep,
                debugger_attached: self.debugger_attached,
                breakpoints: &self.breakpoints,
            };
            match build_block(bus, self.state.config(), pc, &self.jit, &opts) {
                Ok(block) => self.cache.insert(block),
                Err(JitError::Fetch(fault)) => {
                    trace!(pc, "block build aborted");
                    self.pending_fault = Some(fault);
                    return None;
                }
            }
        }
        let block = self.cache.peek(pc)?;

        let mut tracker = CodeWriteTracker::new(bus);
        let result = execute_block(&block.ir, &mut self.state, &mut tracker);
        for word in tracker.written {
            self.cache.invalidate_range(word, word + 1);
        }

        let exit = match result {
            Ok(ExecResult::Continue { .. }) => return None,
            Ok(ExecResult::Trap { kind, pc }) => match kind {
                TrapKind::Unsupported { opcode } => CpuExit::IllegalInstruction { pc, opcode },
                TrapKind::Breakpoint => CpuExit::Breakpoint { pc },
                TrapKind::SingleStep => CpuExit::SingleStep { pc },
                TrapKind::Break => CpuExit::Break { pc },
                TrapKind::Sleep => {
                    self.state.halted = true;
                    CpuExit::Sleep
                }
            },
            Err(fault) => {
                warn!(addr = fault.addr, space = ?fault.space, pc, "bus fault");
                CpuExit::BusFault(fault)
            }
        };
        debug!(?exit, "cpu exit");
        Some(exit)
    }

    /// Steps until something needs the host's attention or `max_blocks`
    /// blocks have run.
    pub fn run<B: CpuBus + ?Sized>(&mut self, bus: &mut B, max_blocks: u64) -> CpuExit {
        for _ in 0..max_blocks {
            if let Some(exit) = self.step(bus) {
                return exit;
            }
        }
        CpuExit::BudgetExhausted
    }
}
