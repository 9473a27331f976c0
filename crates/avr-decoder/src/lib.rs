#![forbid(unsafe_code)]

//! AVR instruction decoder.
//!
//! [`decode`] maps one 16-bit instruction word to an [`Opcode`] handler and an
//! encoding length. Operand extraction lives in [`fields`]; feature checks are
//! left to the translator, so decoding is the same for every CPU variant.

mod decoder;
mod error;
mod opcode;

pub mod fields;

pub use decoder::{decode, decode_at, decode_checked, Decoded, InstDesc, InstLen};
pub use error::DecodeError;
pub use opcode::Opcode;
