use std::fmt;

/// Instruction handler selected by the decoder.
///
/// Addressing-mode variants of `LD`/`ST`/`LPM`/`ELPM` get their own handler so
/// the translator never re-inspects the encoding to pick a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop,
    Movw,
    Muls,
    Mulsu,
    Fmul,
    Fmuls,
    Fmulsu,
    Cpc,
    Sbc,
    Add,
    And,
    Eor,
    Or,
    Mov,
    Cpse,
    Cp,
    Sub,
    Adc,
    Cpi,
    Sbci,
    Ori,
    Subi,
    Andi,

    /// `LDD Rd, Z+q` (also `LD Rd, Z` with `q == 0`).
    LddZ,
    LddY,
    StdZ,
    StdY,
    Lds,
    /// `LD Rd, Z+`
    LdZInc,
    /// `LD Rd, -Z`
    LdZDec,
    /// `LPM Rd, Z`
    LpmZ,
    /// `LPM Rd, Z+`
    LpmZInc,
    /// `ELPM Rd, Z`
    ElpmZ,
    /// `ELPM Rd, Z+`
    ElpmZInc,
    LdYInc,
    LdYDec,
    LdX,
    LdXInc,
    LdXDec,
    Pop,
    Sts,
    StZInc,
    StZDec,
    Xch,
    Las,
    Lac,
    Lat,
    StYInc,
    StYDec,
    StX,
    StXInc,
    StXDec,
    Push,

    Com,
    Neg,
    Swap,
    Inc,
    Asr,
    Lsr,
    Ror,
    Dec,
    Des,

    Bset,
    Bclr,
    Ijmp,
    Eijmp,
    Icall,
    Eicall,
    Ret,
    Reti,
    Sleep,
    Break,
    Wdr,
    /// `LPM` (implied `r0, Z`)
    Lpm,
    /// `ELPM` (implied `r0, RAMPZ:Z`)
    Elpm,
    Spm,
    /// `SPM Z+`
    SpmZInc,
    Jmp,
    Call,

    Adiw,
    Sbiw,
    Cbi,
    Sbic,
    Sbi,
    Sbis,
    Mul,
    In,
    Out,
    Rjmp,
    Ldi,
    Rcall,
    Brbs,
    Brbc,
    Bld,
    Bst,
    Sbrc,
    Sbrs,

    /// An encoding slot no AVR part assigns.
    Undefined,
}

impl Opcode {
    /// Whether the encoding carries a second instruction word.
    pub const fn is_32bit(self) -> bool {
        matches!(self, Opcode::Lds | Opcode::Sts | Opcode::Jmp | Opcode::Call)
    }

    /// Whether the instruction conditionally skips the following instruction.
    pub const fn is_skip(self) -> bool {
        matches!(
            self,
            Opcode::Cpse | Opcode::Sbrc | Opcode::Sbrs | Opcode::Sbic | Opcode::Sbis
        )
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::Movw => "movw",
            Opcode::Muls => "muls",
            Opcode::Mulsu => "mulsu",
            Opcode::Fmul => "fmul",
            Opcode::Fmuls => "fmuls",
            Opcode::Fmulsu => "fmulsu",
            Opcode::Cpc => "cpc",
            Opcode::Sbc => "sbc",
            Opcode::Add => "add",
            Opcode::And => "and",
            Opcode::Eor => "eor",
            Opcode::Or => "or",
            Opcode::Mov => "mov",
            Opcode::Cpse => "cpse",
            Opcode::Cp => "cp",
            Opcode::Sub => "sub",
            Opcode::Adc => "adc",
            Opcode::Cpi => "cpi",
            Opcode::Sbci => "sbci",
            Opcode::Ori => "ori",
            Opcode::Subi => "subi",
            Opcode::Andi => "andi",
            Opcode::LddZ | Opcode::LddY => "ldd",
            Opcode::StdZ | Opcode::StdY => "std",
            Opcode::Lds => "lds",
            Opcode::LdZInc
            | Opcode::LdZDec
            | Opcode::LdYInc
            | Opcode::LdYDec
            | Opcode::LdX
            | Opcode::LdXInc
            | Opcode::LdXDec => "ld",
            Opcode::LpmZ | Opcode::LpmZInc | Opcode::Lpm => "lpm",
            Opcode::ElpmZ | Opcode::ElpmZInc | Opcode::Elpm => "elpm",
            Opcode::Pop => "pop",
            Opcode::Sts => "sts",
            Opcode::StZInc
            | Opcode::StZDec
            | Opcode::StYInc
            | Opcode::StYDec
            | Opcode::StX
            | Opcode::StXInc
            | Opcode::StXDec => "st",
            Opcode::Xch => "xch",
            Opcode::Las => "las",
            Opcode::Lac => "lac",
            Opcode::Lat => "lat",
            Opcode::Push => "push",
            Opcode::Com => "com",
            Opcode::Neg => "neg",
            Opcode::Swap => "swap",
            Opcode::Inc => "inc",
            Opcode::Asr => "asr",
            Opcode::Lsr => "lsr",
            Opcode::Ror => "ror",
            Opcode::Dec => "dec",
            Opcode::Des => "des",
            Opcode::Bset => "bset",
            Opcode::Bclr => "bclr",
            Opcode::Ijmp => "ijmp",
            Opcode::Eijmp => "eijmp",
            Opcode::Icall => "icall",
            Opcode::Eicall => "eicall",
            Opcode::Ret => "ret",
            Opcode::Reti => "reti",
            Opcode::Sleep => "sleep",
            Opcode::Break => "break",
            Opcode::Wdr => "wdr",
            Opcode::Spm | Opcode::SpmZInc => "spm",
            Opcode::Jmp => "jmp",
            Opcode::Call => "call",
            Opcode::Adiw => "adiw",
            Opcode::Sbiw => "sbiw",
            Opcode::Cbi => "cbi",
            Opcode::Sbic => "sbic",
            Opcode::Sbi => "sbi",
            Opcode::Sbis => "sbis",
            Opcode::Mul => "mul",
            Opcode::In => "in",
            Opcode::Out => "out",
            Opcode::Rjmp => "rjmp",
            Opcode::Ldi => "ldi",
            Opcode::Rcall => "rcall",
            Opcode::Brbs => "brbs",
            Opcode::Brbc => "brbc",
            Opcode::Bld => "bld",
            Opcode::Bst => "bst",
            Opcode::Sbrc => "sbrc",
            Opcode::Sbrs => "sbrs",
            Opcode::Undefined => "(undefined)",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
