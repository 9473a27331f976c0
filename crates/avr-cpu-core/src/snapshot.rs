//! Binary save/restore of [`AvrState`].
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic        8  b"AVRSNAP\0"
//! version      u16
//! model        u8   index into `CpuModel::ALL`, 0xff for a custom feature set
//! features     u32
//! regs         32 bytes
//! flags        8 x u32 (raw slots, C..I)
//! rampd/x/y/z  4 x u32 (pre-shifted)
//! eind         u32
//! sp           u16
//! pc           u32
//! intsrc       u64
//! reset        u8
//! halted       u8
//! ```

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::features::{CpuConfig, CpuModel, Features};
use crate::state::{AvrState, Flag, NUM_REGS};
use crate::PC_MASK;

pub const SNAPSHOT_MAGIC: &[u8; 8] = b"AVRSNAP\0";
pub const SNAPSHOT_VERSION: u16 = 1;

const CUSTOM_MODEL: u8 = 0xff;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid snapshot magic")]
    InvalidMagic,

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u16),

    #[error("corrupt snapshot: {0}")]
    Corrupt(&'static str),
}

type SnapResult<T> = std::result::Result<T, SnapshotError>;

pub trait WriteLeExt: Write {
    fn write_u8(&mut self, v: u8) -> SnapResult<()> {
        self.write_all(&[v])?;
        Ok(())
    }

    fn write_u16_le(&mut self, v: u16) -> SnapResult<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_u32_le(&mut self, v: u32) -> SnapResult<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_u64_le(&mut self, v: u64) -> SnapResult<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }
}

impl<T: Write + ?Sized> WriteLeExt for T {}

pub trait ReadLeExt: Read {
    fn read_u8(&mut self) -> SnapResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16_le(&mut self) -> SnapResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32_le(&mut self) -> SnapResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64_le(&mut self) -> SnapResult<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

impl<T: Read + ?Sized> ReadLeExt for T {}

pub fn save_state<W: Write>(state: &AvrState, w: &mut W) -> SnapResult<()> {
    let config = state.config();
    w.write_all(SNAPSHOT_MAGIC)?;
    w.write_u16_le(SNAPSHOT_VERSION)?;
    w.write_u8(config.model().map_or(CUSTOM_MODEL, CpuModel::index))?;
    w.write_u32_le(config.features().bits())?;
    w.write_all(&state.regs)?;
    for flag in Flag::ALL {
        w.write_u32_le(state.flag_raw(flag))?;
    }
    for ramp in [state.rampd, state.rampx, state.rampy, state.rampz, state.eind] {
        w.write_u32_le(ramp)?;
    }
    w.write_u16_le(state.sp)?;
    w.write_u32_le(state.pc)?;
    w.write_u64_le(state.intsrc)?;
    w.write_u8(u8::from(state.reset_pending))?;
    w.write_u8(u8::from(state.halted))?;
    Ok(())
}

pub fn restore_state<R: Read>(r: &mut R) -> SnapResult<AvrState> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if &magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::InvalidMagic);
    }
    let version = r.read_u16_le()?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }

    let model = r.read_u8()?;
    let features = Features::from_bits(r.read_u32_le()?)
        .ok_or(SnapshotError::Corrupt("unknown feature bits"))?;
    let config = if model == CUSTOM_MODEL {
        CpuConfig::custom(features).map_err(|_| SnapshotError::Corrupt("invalid feature set"))?
    } else {
        let model = CpuModel::from_index(model).ok_or(SnapshotError::Corrupt("unknown model"))?;
        if model.features() != features {
            return Err(SnapshotError::Corrupt("model/feature mismatch"));
        }
        CpuConfig::for_model(model)
    };

    let mut state = AvrState::new(config);
    let mut regs = [0u8; NUM_REGS];
    r.read_exact(&mut regs)?;
    state.regs = regs;
    for flag in Flag::ALL {
        state.set_flag_raw(flag, r.read_u32_le()?);
    }
    state.rampd = r.read_u32_le()?;
    state.rampx = r.read_u32_le()?;
    state.rampy = r.read_u32_le()?;
    state.rampz = r.read_u32_le()?;
    state.eind = r.read_u32_le()?;
    state.sp = r.read_u16_le()?;
    let pc = r.read_u32_le()?;
    if pc & !PC_MASK != 0 {
        return Err(SnapshotError::Corrupt("pc out of range"));
    }
    state.pc = pc;
    state.intsrc = r.read_u64_le()?;
    state.reset_pending = r.read_u8()? != 0;
    state.halted = r.read_u8()? != 0;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn busy_state() -> AvrState {
        let mut s = AvrState::new(CpuConfig::for_model(CpuModel::Xmega7));
        for (i, r) in s.regs.iter_mut().enumerate() {
            *r = (i as u8).wrapping_mul(7);
        }
        s.set_flag_raw(Flag::Z, 0x42);
        s.set_flag(Flag::H, true);
        s.rampz = 0x3_0000;
        s.eind = 0x1_0000;
        s.sp = 0x3ffe;
        s.pc = 0x1_2345;
        s.intsrc = 1 << 40;
        s.halted = true;
        s
    }

    #[test]
    fn binary_round_trip() {
        let state = busy_state();
        let mut buf = Vec::new();
        save_state(&state, &mut buf).unwrap();
        let restored = restore_state(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn custom_configs_round_trip() {
        let cfg = CpuConfig::custom(Features::PC_1_BYTE | Features::DES).unwrap();
        let state = AvrState::new(cfg);
        let mut buf = Vec::new();
        save_state(&state, &mut buf).unwrap();
        let restored = restore_state(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored.config(), &cfg);
    }

    #[test]
    fn rejects_bad_headers() {
        let mut buf = Vec::new();
        save_state(&busy_state(), &mut buf).unwrap();

        let mut bad_magic = buf.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            restore_state(&mut Cursor::new(bad_magic)),
            Err(SnapshotError::InvalidMagic)
        ));

        let mut bad_version = buf.clone();
        bad_version[8] = 9;
        assert!(matches!(
            restore_state(&mut Cursor::new(bad_version)),
            Err(SnapshotError::UnsupportedVersion(9))
        ));

        buf.truncate(buf.len() - 1);
        assert!(matches!(
            restore_state(&mut Cursor::new(buf)),
            Err(SnapshotError::Io(_))
        ));
    }

    #[test]
    fn serde_round_trip() {
        let state = busy_state();
        let json = serde_json::to_string(&state).unwrap();
        let back: AvrState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
