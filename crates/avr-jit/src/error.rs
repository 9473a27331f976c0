use avr_cpu_core::BusFault;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JitError {
    /// Instruction fetch failed while building a block; no block is produced.
    #[error("block build aborted: {0}")]
    Fetch(#[from] BusFault),
}

pub type Result<T> = std::result::Result<T, JitError>;
