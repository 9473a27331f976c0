use crate::error::DecodeError;
use crate::opcode::Opcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstLen {
    Bits16,
    Bits32,
}

impl InstLen {
    #[inline]
    pub const fn words(self) -> u32 {
        match self {
            InstLen::Bits16 => 1,
            InstLen::Bits32 => 2,
        }
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.words() * 16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decoded {
    pub opcode: Opcode,
    pub len: InstLen,
}

impl Decoded {
    const fn short(opcode: Opcode) -> Self {
        Self {
            opcode,
            len: InstLen::Bits16,
        }
    }

    const fn long(opcode: Opcode) -> Self {
        Self {
            opcode,
            len: InstLen::Bits32,
        }
    }
}

/// A decoded instruction located in program memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstDesc {
    pub opcode: Opcode,
    pub len: InstLen,
    /// The encoding as the operand extractors expect it: the first word alone
    /// for 16-bit instructions, `first << 16 | second` for 32-bit ones.
    pub raw: u32,
    /// Word address of the instruction.
    pub cpc: u32,
    /// Word address of the next instruction.
    pub npc: u32,
}

/// Decodes the instruction at `cpc`, pulling the second word through `fetch`
/// when the first one announces a 32-bit encoding.
pub fn decode_at<E>(
    cpc: u32,
    mut fetch: impl FnMut(u32) -> Result<u16, E>,
) -> Result<InstDesc, E> {
    let first = fetch(cpc)?;
    let Decoded { opcode, len } = decode(first);
    let raw = match len {
        InstLen::Bits16 => u32::from(first),
        InstLen::Bits32 => (u32::from(first) << 16) | u32::from(fetch(cpc + 1)?),
    };
    Ok(InstDesc {
        opcode,
        len,
        raw,
        cpc,
        npc: cpc + len.words(),
    })
}

/// Like [`decode`], but reports unassigned encodings as an error.
pub fn decode_checked(word: u16) -> Result<Decoded, DecodeError> {
    let decoded = decode(word);
    if decoded.opcode == Opcode::Undefined {
        return Err(DecodeError::Unassigned { opcode: word });
    }
    Ok(decoded)
}

/// Decodes one instruction word.
///
/// The tree tests a handful of discriminating bits per level; every one of the
/// 65536 words lands on exactly one leaf. The result does not depend on the
/// CPU variant.
pub fn decode(word: u16) -> Decoded {
    use Opcode::*;

    let opc = word;
    let d = Decoded::short;

    match opc & 0xd000 {
        0x0000 => match opc & 0x2c00 {
            0x0000 => match opc & 0x0300 {
                0x0000 => d(Nop),
                0x0100 => d(Movw),
                0x0200 => d(Muls),
                _ => match opc & 0x0088 {
                    0x0000 => d(Mulsu),
                    0x0008 => d(Fmul),
                    0x0080 => d(Fmuls),
                    _ => d(Fmulsu),
                },
            },
            0x0400 => d(Cpc),
            0x0800 => d(Sbc),
            0x0c00 => d(Add),
            0x2000 => d(And),
            0x2400 => d(Eor),
            0x2800 => d(Or),
            _ => d(Mov),
        },
        0x1000 => match opc & 0x2000 {
            0x0000 => match opc & 0x0c00 {
                0x0000 => d(Cpse),
                0x0400 => d(Cp),
                0x0800 => d(Sub),
                _ => d(Adc),
            },
            _ => d(Cpi),
        },
        0x4000 => match opc & 0x2000 {
            0x0000 => d(Sbci),
            _ => d(Ori),
        },
        0x5000 => match opc & 0x2000 {
            0x0000 => d(Subi),
            _ => d(Andi),
        },
        0x8000 => match opc & 0x0208 {
            0x0000 => d(LddZ),
            0x0008 => d(LddY),
            0x0200 => d(StdZ),
            _ => d(StdY),
        },
        0x9000 => match opc & 0x2800 {
            0x0000 => match opc & 0x0600 {
                0x0000 => decode_load_group(opc),
                0x0200 => decode_store_group(opc),
                0x0400 => decode_one_operand_group(opc),
                _ => match opc & 0x0100 {
                    0x0000 => d(Adiw),
                    _ => d(Sbiw),
                },
            },
            0x0800 => match opc & 0x0400 {
                0x0000 => match opc & 0x0300 {
                    0x0000 => d(Cbi),
                    0x0100 => d(Sbic),
                    0x0200 => d(Sbi),
                    _ => d(Sbis),
                },
                _ => d(Mul),
            },
            0x2000 => d(In),
            _ => d(Out),
        },
        0xc000 => match opc & 0x2000 {
            0x0000 => d(Rjmp),
            _ => d(Ldi),
        },
        _ => match opc & 0x2000 {
            0x0000 => d(Rcall),
            _ => match opc & 0x0c00 {
                0x0000 => d(Brbs),
                0x0400 => d(Brbc),
                0x0800 => match opc & 0x0200 {
                    0x0000 => d(Bld),
                    _ => d(Bst),
                },
                _ => match opc & 0x0200 {
                    0x0000 => d(Sbrc),
                    _ => d(Sbrs),
                },
            },
        },
    }
}

/// `1001_000d_dddd_xxxx`
fn decode_load_group(opc: u16) -> Decoded {
    use Opcode::*;
    let d = Decoded::short;
    match opc & 0x000f {
        0x0 => Decoded::long(Lds),
        0x1 => d(LdZInc),
        0x2 => d(LdZDec),
        0x4 => d(LpmZ),
        0x5 => d(LpmZInc),
        0x6 => d(ElpmZ),
        0x7 => d(ElpmZInc),
        0x9 => d(LdYInc),
        0xa => d(LdYDec),
        0xc => d(LdX),
        0xd => d(LdXInc),
        0xe => d(LdXDec),
        0xf => d(Pop),
        _ => d(Undefined),
    }
}

/// `1001_001r_rrrr_xxxx`
fn decode_store_group(opc: u16) -> Decoded {
    use Opcode::*;
    let d = Decoded::short;
    match opc & 0x000f {
        0x0 => Decoded::long(Sts),
        0x1 => d(StZInc),
        0x2 => d(StZDec),
        0x4 => d(Xch),
        0x5 => d(Las),
        0x6 => d(Lac),
        0x7 => d(Lat),
        0x9 => d(StYInc),
        0xa => d(StYDec),
        0xc => d(StX),
        0xd => d(StXInc),
        0xe => d(StXDec),
        0xf => d(Push),
        _ => d(Undefined),
    }
}

/// `1001_010x_xxxx_xxxx`
fn decode_one_operand_group(opc: u16) -> Decoded {
    use Opcode::*;
    let d = Decoded::short;
    let low = opc & 0x0001 != 0;
    match opc & 0x000e {
        0x0 => d(if low { Neg } else { Com }),
        0x2 => d(if low { Inc } else { Swap }),
        0x4 => d(Asr),
        0x6 => d(if low { Ror } else { Lsr }),
        0x8 => decode_misc_group(opc),
        0xa => d(if low { Des } else { Dec }),
        0xc => Decoded::long(Jmp),
        _ => Decoded::long(Call),
    }
}

/// `1001_010x_xxxx_100x`: SREG bit ops, indirect
/// control flow and the system instructions.
fn decode_misc_group(opc: u16) -> Decoded {
    use Opcode::*;
    let d = Decoded::short;
    let ext = opc & 0x0010 != 0;
    match opc & 0x0181 {
        0x000 => d(Bset),
        0x001 => d(if ext { Eijmp } else { Ijmp }),
        0x080 => d(Bclr),
        0x100 => d(if ext { Reti } else { Ret }),
        0x101 => d(if ext { Eicall } else { Icall }),
        0x180 => match opc & 0x0070 {
            0x00 => d(Sleep),
            0x10 => d(Break),
            0x20 => d(Wdr),
            0x40 => d(Lpm),
            0x50 => d(Elpm),
            0x60 => d(Spm),
            0x70 => d(SpmZInc),
            _ => d(Undefined),
        },
        _ => d(Undefined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_encodings() {
        let cases: &[(u16, Opcode)] = &[
            (0x0000, Opcode::Nop),
            (0x0f01, Opcode::Add),
            (0xe402, Opcode::Ldi),
            (0x9508, Opcode::Ret),
            (0x9518, Opcode::Reti),
            (0x9409, Opcode::Ijmp),
            (0x9419, Opcode::Eijmp),
            (0x9509, Opcode::Icall),
            (0x9519, Opcode::Eicall),
            (0x9588, Opcode::Sleep),
            (0x9598, Opcode::Break),
            (0x95a8, Opcode::Wdr),
            (0x95c8, Opcode::Lpm),
            (0x95d8, Opcode::Elpm),
            (0x95e8, Opcode::Spm),
            (0x95f8, Opcode::SpmZInc),
            (0x9408, Opcode::Bset),
            (0x94f8, Opcode::Bclr),
            (0x920f, Opcode::Push),
            (0x900f, Opcode::Pop),
            (0x9005, Opcode::LpmZInc),
            (0x9405, Opcode::Asr),
            (0x940b, Opcode::Des),
            (0x9601, Opcode::Adiw),
            (0x9701, Opcode::Sbiw),
            (0x9a00, Opcode::Sbi),
            (0x9c00, Opcode::Mul),
            (0xb000, Opcode::In),
            (0xb800, Opcode::Out),
            (0xc000, Opcode::Rjmp),
            (0xd000, Opcode::Rcall),
            (0xf001, Opcode::Brbs),
            (0xf401, Opcode::Brbc),
            (0xfe00, Opcode::Sbrs),
            (0x8000, Opcode::LddZ),
            (0xa208, Opcode::StdY),
            (0x0380, Opcode::Fmuls),
        ];
        for (word, expected) in cases {
            assert_eq!(decode(*word).opcode, *expected, "{word:#06x}");
        }
    }

    #[test]
    fn long_encodings() {
        for word in [0x9000, 0x9200, 0x940c, 0x940e, 0x95fd, 0x95ff] {
            assert_eq!(decode(word).len, InstLen::Bits32, "{word:#06x}");
        }
        assert_eq!(decode(0x940c).opcode, Opcode::Jmp);
        assert_eq!(decode(0x95ff).opcode, Opcode::Call);
    }

    #[test]
    fn unassigned_slots() {
        for word in [
            0x9003, 0x9008, 0x900b, 0x9203, 0x9208, 0x920b, 0x9489, 0x9589, 0x95b8,
        ] {
            assert_eq!(decode(word).opcode, Opcode::Undefined, "{word:#06x}");
            assert_eq!(
                decode_checked(word),
                Err(DecodeError::Unassigned { opcode: word })
            );
        }
    }

    #[test]
    fn decode_at_joins_the_second_word() {
        let program = [0x940e_u16, 0x1234, 0x0000];
        let fetch = |pc: u32| program.get(pc as usize).copied().ok_or(pc);

        let call = decode_at(0, fetch).unwrap();
        assert_eq!(call.opcode, Opcode::Call);
        assert_eq!(call.raw, 0x940e_1234);
        assert_eq!(call.npc, 2);

        let nop = decode_at(2, fetch).unwrap();
        assert_eq!(nop.raw, 0);
        assert_eq!(nop.npc, 3);

        assert_eq!(decode_at(3, fetch), Err(3));
    }

    #[test]
    fn second_word_fault_propagates() {
        let program = [0x9000_u16];
        let fetch = |pc: u32| program.get(pc as usize).copied().ok_or(pc);
        assert_eq!(decode_at(0, fetch), Err(1));
    }
}
