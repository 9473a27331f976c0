#![forbid(unsafe_code)]

//! Architectural state and host-facing plumbing for an 8-bit AVR guest CPU.
//!
//! Everything here is shared between the translator (`avr-jit`) and whatever
//! embeds the CPU:
//! - [`features`]: the per-variant feature bitset and the validated [`CpuConfig`]
//! - [`state::AvrState`]: registers, flags, extended-address registers, SP/PC and
//!   pending-interrupt bookkeeping
//! - [`mem::CpuBus`]: code fetch plus byte-wide data/code loads and stores
//! - [`interrupts`]: reset/interrupt dispatch between translation blocks
//!
//! The crate has no notion of translation blocks; it only defines the state the
//! generated IR reads and writes.

pub mod error;
pub mod features;
pub mod gdb;
pub mod interrupts;
pub mod io;
pub mod mem;
pub mod snapshot;
pub mod stack;
pub mod state;

pub use error::{CpuError, Result};
pub use features::{CpuConfig, CpuModel, Features, PcWidth, SpWidth};
pub use interrupts::Delivery;
pub use mem::{BusFault, CpuBus, FlatBus, MemSpace};
pub use state::{AvrState, Flag, NUM_INTERRUPT_LINES, REG_X, REG_Y, REG_Z};

/// Mask applied to the word-addressed program counter (22 bits).
pub const PC_MASK: u32 = 0x003f_ffff;

/// Mask applied to composed 24-bit data/code addresses.
pub const ADDR_MASK: u32 = 0x00ff_ffff;
