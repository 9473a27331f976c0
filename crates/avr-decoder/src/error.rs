use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unassigned opcode {opcode:#06x}")]
    Unassigned { opcode: u16 },
}
