#![forbid(unsafe_code)]

//! AVR instruction translation and block execution.
//!
//! Pipeline:
//! 1. [`block::build_block`] decodes guest code with `avr-decoder` and hands
//!    each instruction to the per-opcode translators, which emit [`ir`] through
//!    an [`IrBuilder`]. Flag updates come from the closed-form formulas in
//!    [`flags`].
//! 2. Finished [`TranslationBlock`]s live in a [`BlockCache`] keyed by start PC.
//! 3. [`interp::execute_block`] runs a block against `AvrState` and a
//!    `CpuBus`.
//! 4. [`Cpu`] ties it together with interrupt delivery, breakpoints and
//!    single-stepping.

pub mod block;
pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod flags;
pub mod interp;
pub mod ir;
pub mod runtime;
mod translate;

pub use block::{build_block, BlockState, BuildOptions, TranslationBlock};
pub use builder::IrBuilder;
pub use cache::{BlockCache, BlockCacheStats};
pub use config::JitConfig;
pub use error::{JitError, Result};
pub use interp::{execute_block, ExecResult};
pub use ir::{BinOp, CmpOp, GuestReg, Helper, IrBlock, IrInst, IrTerminator, TrapKind, ValueId};
pub use runtime::{Cpu, CpuExit};
