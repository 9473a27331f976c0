//! CPU variant feature model.
//!
//! A variant is nothing more than a feature bitset. The translator checks it
//! before emitting any IR for an instruction; the dispatcher uses it to pick the
//! return-address width and the interrupt vector size.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{CpuError, Result};

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Features: u32 {
        const LPM = 1 << 0;
        const IJMP_ICALL = 1 << 1;
        const ADIW_SBIW = 1 << 2;
        const SRAM = 1 << 3;
        const BREAK = 1 << 4;

        const PC_1_BYTE = 1 << 5;
        const PC_2_BYTE = 1 << 6;
        const PC_3_BYTE = 1 << 7;
        const SP_1_BYTE = 1 << 8;
        const SP_2_BYTE = 1 << 9;

        const LPMX = 1 << 10;
        const MOVW = 1 << 11;
        const MUL = 1 << 12;
        const JMP_CALL = 1 << 13;

        const RAMPD = 1 << 14;
        const RAMPX = 1 << 15;
        const RAMPY = 1 << 16;
        const RAMPZ = 1 << 17;

        const ELPM = 1 << 18;
        const ELPMX = 1 << 19;
        const EIJMP_EICALL = 1 << 20;
        const RMW = 1 << 21;
        const DES = 1 << 22;
        const SPM = 1 << 23;
        const SPMX = 1 << 24;

        const PC_WIDTH = Self::PC_1_BYTE.bits() | Self::PC_2_BYTE.bits() | Self::PC_3_BYTE.bits();
        const SP_WIDTH = Self::SP_1_BYTE.bits() | Self::SP_2_BYTE.bits();
    }
}

impl Features {
    #[inline]
    pub fn has(self, feature: Features) -> bool {
        self.contains(feature)
    }

    /// Width of a pushed return address, if exactly one width class is set.
    pub fn pc_width(self) -> Option<PcWidth> {
        match self & Features::PC_WIDTH {
            w if w == Features::PC_1_BYTE => Some(PcWidth::One),
            w if w == Features::PC_2_BYTE => Some(PcWidth::Two),
            w if w == Features::PC_3_BYTE => Some(PcWidth::Three),
            _ => None,
        }
    }

    pub fn sp_width(self) -> Option<SpWidth> {
        match self & Features::SP_WIDTH {
            w if w == Features::SP_1_BYTE => Some(SpWidth::One),
            w if w == Features::SP_2_BYTE => Some(SpWidth::Two),
            _ => None,
        }
    }

    /// Rejects feature combinations no real part has.
    pub fn validate(self) -> Result<()> {
        let fail = |reason| {
            Err(CpuError::Misconfiguration {
                features: self,
                reason,
            })
        };

        if self.pc_width().is_none() {
            return fail("exactly one PC width must be selected");
        }
        if (self & Features::SP_WIDTH) == Features::SP_WIDTH {
            return fail("at most one SP width may be selected");
        }
        if self.intersects(Features::ELPM | Features::ELPMX) && !self.has(Features::RAMPZ) {
            return fail("ELPM requires RAMPZ");
        }
        if self.has(Features::ELPMX) && !self.has(Features::ELPM) {
            return fail("ELPMX requires ELPM");
        }
        if self.has(Features::EIJMP_EICALL) && !self.has(Features::PC_3_BYTE) {
            return fail("EIJMP/EICALL require a 3-byte PC");
        }
        if self.has(Features::LPMX) && !self.has(Features::LPM) {
            return fail("LPMX requires LPM");
        }
        if self.has(Features::SPMX) && !self.has(Features::SPM) {
            return fail("SPMX requires SPM");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PcWidth {
    One,
    Two,
    Three,
}

impl PcWidth {
    #[inline]
    pub const fn bytes(self) -> u16 {
        match self {
            PcWidth::One => 1,
            PcWidth::Two => 2,
            PcWidth::Three => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpWidth {
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuModel {
    Avr1,
    Avr2,
    Avr25,
    Avr3,
    Avr31,
    Avr35,
    Avr4,
    Avr5,
    Avr51,
    Avr6,
    Xmega2,
    Xmega4,
    Xmega5,
    Xmega6,
    Xmega7,
}

impl CpuModel {
    pub const ALL: [CpuModel; 15] = [
        CpuModel::Avr1,
        CpuModel::Avr2,
        CpuModel::Avr25,
        CpuModel::Avr3,
        CpuModel::Avr31,
        CpuModel::Avr35,
        CpuModel::Avr4,
        CpuModel::Avr5,
        CpuModel::Avr51,
        CpuModel::Avr6,
        CpuModel::Xmega2,
        CpuModel::Xmega4,
        CpuModel::Xmega5,
        CpuModel::Xmega6,
        CpuModel::Xmega7,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            CpuModel::Avr1 => "avr1",
            CpuModel::Avr2 => "avr2",
            CpuModel::Avr25 => "avr25",
            CpuModel::Avr3 => "avr3",
            CpuModel::Avr31 => "avr31",
            CpuModel::Avr35 => "avr35",
            CpuModel::Avr4 => "avr4",
            CpuModel::Avr5 => "avr5",
            CpuModel::Avr51 => "avr51",
            CpuModel::Avr6 => "avr6",
            CpuModel::Xmega2 => "xmega2",
            CpuModel::Xmega4 => "xmega4",
            CpuModel::Xmega5 => "xmega5",
            CpuModel::Xmega6 => "xmega6",
            CpuModel::Xmega7 => "xmega7",
        }
    }

    /// Stable index used by the binary snapshot format.
    pub fn index(self) -> u8 {
        Self::ALL.iter().position(|m| *m == self).unwrap_or(0) as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn features(self) -> Features {
        const AVR1: Features = Features::LPM
            .union(Features::SP_2_BYTE)
            .union(Features::PC_2_BYTE);
        const AVR2: Features = AVR1
            .union(Features::IJMP_ICALL)
            .union(Features::ADIW_SBIW)
            .union(Features::SRAM)
            .union(Features::BREAK);
        const AVR25: Features = AVR2.union(Features::LPMX).union(Features::MOVW);
        const AVR3: Features = AVR2.union(Features::JMP_CALL);
        const AVR4: Features = AVR25.union(Features::MUL);
        const AVR5: Features = AVR4.union(Features::JMP_CALL);
        const AVR51: Features = AVR5
            .union(Features::RAMPZ)
            .union(Features::ELPMX)
            .union(Features::ELPM);
        const AVR6: Features = AVR51
            .difference(Features::PC_2_BYTE)
            .union(Features::PC_3_BYTE)
            .union(Features::EIJMP_EICALL);
        const XMEGA_RAMPS: Features = Features::RAMPD
            .union(Features::RAMPX)
            .union(Features::RAMPY);

        match self {
            CpuModel::Avr1 => AVR1,
            CpuModel::Avr2 => AVR2,
            CpuModel::Avr25 => AVR25,
            CpuModel::Avr3 => AVR3,
            CpuModel::Avr31 => AVR3.union(Features::RAMPZ).union(Features::ELPM),
            CpuModel::Avr35 => AVR3.union(Features::LPMX).union(Features::MOVW),
            CpuModel::Avr4 => AVR4,
            CpuModel::Avr5 => AVR5,
            CpuModel::Avr51 => AVR51,
            CpuModel::Avr6 => AVR6,
            CpuModel::Xmega2 => AVR5.union(Features::RMW),
            CpuModel::Xmega4 => AVR51.union(Features::RMW),
            CpuModel::Xmega5 => AVR51.union(Features::RMW).union(XMEGA_RAMPS),
            CpuModel::Xmega6 => AVR6.union(Features::RMW),
            CpuModel::Xmega7 => AVR6.union(Features::RMW).union(XMEGA_RAMPS),
        }
    }
}

impl fmt::Display for CpuModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CpuModel {
    type Err = CpuError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CpuError::UnknownModel(s.to_owned()))
    }
}

/// Constant per-CPU configuration. Built once, never mutated; changing the
/// variant means building a new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCpuConfig")]
pub struct CpuConfig {
    model: Option<CpuModel>,
    features: Features,
    pc_width: PcWidth,
}

/// Unchecked wire form of [`CpuConfig`].
#[derive(Deserialize)]
struct RawCpuConfig {
    model: Option<CpuModel>,
    features: Features,
    pc_width: PcWidth,
}

impl TryFrom<RawCpuConfig> for CpuConfig {
    type Error = CpuError;

    fn try_from(raw: RawCpuConfig) -> Result<Self> {
        let config = match raw.model {
            Some(model) => Self::for_model(model),
            None => Self::custom(raw.features)?,
        };
        if config.features != raw.features || config.pc_width != raw.pc_width {
            return Err(CpuError::Misconfiguration {
                features: raw.features,
                reason: "does not match the named model or PC width",
            });
        }
        Ok(config)
    }
}

impl CpuConfig {
    pub fn for_model(model: CpuModel) -> Self {
        let features = model.features();
        Self {
            model: Some(model),
            features,
            pc_width: features.pc_width().unwrap_or(PcWidth::Two),
        }
    }

    /// Builds a configuration from an arbitrary feature set.
    pub fn custom(features: Features) -> Result<Self> {
        features.validate()?;
        let pc_width = features.pc_width().ok_or(CpuError::Misconfiguration {
            features,
            reason: "exactly one PC width must be selected",
        })?;
        Ok(Self {
            model: None,
            features,
            pc_width,
        })
    }

    pub fn model(&self) -> Option<CpuModel> {
        self.model
    }

    pub fn features(&self) -> Features {
        self.features
    }

    #[inline]
    pub fn has(&self, feature: Features) -> bool {
        self.features.has(feature)
    }

    pub fn pc_width(&self) -> PcWidth {
        self.pc_width
    }

    /// Vector table entry size in words: a `JMP` (2 words) when the part has
    /// `JMP`/`CALL`, an `RJMP` otherwise.
    pub fn vector_size(&self) -> u32 {
        if self.has(Features::JMP_CALL) {
            2
        } else {
            1
        }
    }
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self::for_model(CpuModel::Avr6)
    }
}
