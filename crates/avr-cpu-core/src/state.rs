use std::fmt;

use serde::{Deserialize, Serialize};

use crate::features::{CpuConfig, Features};
use crate::PC_MASK;

pub const NUM_REGS: usize = 32;

/// Number of external interrupt lines a CPU exposes.
pub const NUM_INTERRUPT_LINES: u32 = 57;

/// Index of the low register of the X, Y and Z pointer pairs.
pub const REG_X: u8 = 26;
pub const REG_Y: u8 = 28;
pub const REG_Z: u8 = 30;

/// Status-register flags, in SREG bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Flag {
    C = 0,
    Z = 1,
    N = 2,
    V = 3,
    S = 4,
    H = 5,
    T = 6,
    I = 7,
}

impl Flag {
    pub const ALL: [Flag; 8] = [
        Flag::C,
        Flag::Z,
        Flag::N,
        Flag::V,
        Flag::S,
        Flag::H,
        Flag::T,
        Flag::I,
    ];

    #[inline]
    pub const fn bit(self) -> u8 {
        self as u8
    }

    pub fn from_bit(bit: u8) -> Option<Flag> {
        Self::ALL.get(bit as usize).copied()
    }

    pub const fn letter(self) -> char {
        match self {
            Flag::C => 'C',
            Flag::Z => 'Z',
            Flag::N => 'N',
            Flag::V => 'V',
            Flag::S => 'S',
            Flag::H => 'H',
            Flag::T => 'T',
            Flag::I => 'I',
        }
    }
}

/// Architectural register file of one AVR CPU.
///
/// Flags are stored one per slot so generated code can update them without
/// read-modify-write on SREG. Every slot holds 0 or 1, except `Z`, which holds
/// the last result: the zero flag is set iff the stored value is 0.
///
/// The extended-address registers (`RAMPD/X/Y/Z`, `EIND`) are kept pre-shifted
/// into bits 16..23 so composing a 24-bit address is a single OR.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvrState {
    pub regs: [u8; NUM_REGS],
    flags: [u32; 8],

    pub rampd: u32,
    pub rampx: u32,
    pub rampy: u32,
    pub rampz: u32,
    pub eind: u32,

    pub sp: u16,
    /// Word-addressed program counter.
    pub pc: u32,

    /// Pending interrupt lines, bit `n` for line `n`.
    pub intsrc: u64,
    pub reset_pending: bool,
    /// Set by `SLEEP`, cleared by interrupt delivery.
    pub halted: bool,

    config: CpuConfig,
}

impl AvrState {
    pub fn new(config: CpuConfig) -> Self {
        let mut state = Self {
            regs: [0; NUM_REGS],
            flags: [0; 8],
            rampd: 0,
            rampx: 0,
            rampy: 0,
            rampz: 0,
            eind: 0,
            sp: 0,
            pc: 0,
            intsrc: 0,
            reset_pending: false,
            halted: false,
            config,
        };
        state.reset();
        state
    }

    /// Power-on/reset values: everything zero except `I`, which comes up set.
    ///
    /// Pending interrupt lines are left alone; they belong to the devices.
    pub fn reset(&mut self) {
        self.regs = [0; NUM_REGS];
        self.flags = [0; 8];
        self.flags[Flag::I as usize] = 1;
        self.rampd = 0;
        self.rampx = 0;
        self.rampy = 0;
        self.rampz = 0;
        self.eind = 0;
        self.sp = 0;
        self.pc = 0;
        self.reset_pending = false;
        self.halted = false;
    }

    #[inline]
    pub fn config(&self) -> &CpuConfig {
        &self.config
    }

    #[inline]
    pub fn features(&self) -> Features {
        self.config.features()
    }

    /// Raw storage slot of a flag (see the type docs for the `Z` encoding).
    #[inline]
    pub fn flag_raw(&self, flag: Flag) -> u32 {
        self.flags[flag as usize]
    }

    #[inline]
    pub fn set_flag_raw(&mut self, flag: Flag, value: u32) {
        self.flags[flag as usize] = value;
    }

    #[inline]
    pub fn flag(&self, flag: Flag) -> bool {
        match flag {
            Flag::Z => self.flags[Flag::Z as usize] == 0,
            _ => self.flags[flag as usize] != 0,
        }
    }

    #[inline]
    pub fn set_flag(&mut self, flag: Flag, value: bool) {
        self.flags[flag as usize] = match flag {
            Flag::Z => u32::from(!value),
            _ => u32::from(value),
        };
    }

    /// Packs the flags into the architectural SREG byte.
    pub fn sreg(&self) -> u8 {
        Flag::ALL
            .iter()
            .filter(|f| self.flag(**f))
            .fold(0u8, |acc, f| acc | (1 << f.bit()))
    }

    pub fn set_sreg(&mut self, sreg: u8) {
        for flag in Flag::ALL {
            self.set_flag(flag, sreg & (1 << flag.bit()) != 0);
        }
    }

    #[inline]
    pub fn pair(&self, lo: u8) -> u16 {
        let lo = lo as usize;
        u16::from(self.regs[lo]) | (u16::from(self.regs[lo + 1]) << 8)
    }

    #[inline]
    pub fn set_pair(&mut self, lo: u8, value: u16) {
        let lo = lo as usize;
        self.regs[lo] = value as u8;
        self.regs[lo + 1] = (value >> 8) as u8;
    }

    pub fn x(&self) -> u16 {
        self.pair(REG_X)
    }

    pub fn y(&self) -> u16 {
        self.pair(REG_Y)
    }

    pub fn z(&self) -> u16 {
        self.pair(REG_Z)
    }

    #[inline]
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc & PC_MASK;
    }

    /// Program counter as a byte address, the way debuggers see it.
    pub fn pc_bytes(&self) -> u32 {
        self.pc << 1
    }
}

impl fmt::Debug for AvrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvrState")
            .field("pc", &format_args!("{:#07x}", self.pc))
            .field("sp", &format_args!("{:#06x}", self.sp))
            .field("sreg", &format_args!("{:#04x}", self.sreg()))
            .field("regs", &self.regs)
            .field("intsrc", &format_args!("{:#x}", self.intsrc))
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for AvrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sreg = String::with_capacity(8);
        for flag in Flag::ALL.iter().rev() {
            sreg.push(if self.flag(*flag) { flag.letter() } else { '-' });
        }

        writeln!(f)?;
        writeln!(f, "PC:    {:06x}", self.pc_bytes())?;
        writeln!(f, "SP:      {:04x}", self.sp)?;
        writeln!(f, "rampD:     {:02x}", self.rampd >> 16)?;
        writeln!(f, "rampX:     {:02x}", self.rampx >> 16)?;
        writeln!(f, "rampY:     {:02x}", self.rampy >> 16)?;
        writeln!(f, "rampZ:     {:02x}", self.rampz >> 16)?;
        writeln!(f, "EIND:      {:02x}", self.eind >> 16)?;
        writeln!(f, "X:       {:02x}{:02x}", self.regs[27], self.regs[26])?;
        writeln!(f, "Y:       {:02x}{:02x}", self.regs[29], self.regs[28])?;
        writeln!(f, "Z:       {:02x}{:02x}", self.regs[31], self.regs[30])?;
        writeln!(f, "SREG:    [ {sreg} ]")?;
        writeln!(f)?;

        for row in 0..(NUM_REGS / 8) {
            for col in 0..8 {
                let reg = row * 8 + col;
                write!(f, "R[{reg:02}]:  {:02x}   ", self.regs[reg])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
