//! Operand extraction.
//!
//! Every extractor takes the instruction as [`crate::InstDesc::raw`] holds it:
//! the first word for 16-bit encodings, `first << 16 | second` for the 32-bit
//! ones. Register results are absolute register numbers (`0..32`).

#[inline]
fn bits(raw: u32, start: u32, len: u32) -> u32 {
    (raw >> start) & ((1 << len) - 1)
}

#[inline]
fn sext(value: u32, len: u32) -> i32 {
    let shift = 32 - len;
    ((value << shift) as i32) >> shift
}

/// `xxxx_xxxd_dddd_xxxx`
#[inline]
pub fn rd5(raw: u32) -> u8 {
    bits(raw, 4, 5) as u8
}

/// `xxxx_xxrx_xxxx_rrrr`
#[inline]
pub fn rr5(raw: u32) -> u8 {
    ((bits(raw, 9, 1) << 4) | bits(raw, 0, 4)) as u8
}

/// `xxxx_xxxx_dddd_xxxx`, registers r16..r31.
#[inline]
pub fn rd_high(raw: u32) -> u8 {
    16 + bits(raw, 4, 4) as u8
}

/// `xxxx_xxxx_xxxx_rrrr`, registers r16..r31.
#[inline]
pub fn rr_high(raw: u32) -> u8 {
    16 + bits(raw, 0, 4) as u8
}

/// `xxxx_xxxx_xddd_xxxx`, registers r16..r23.
#[inline]
pub fn rd_mul3(raw: u32) -> u8 {
    16 + bits(raw, 4, 3) as u8
}

/// `xxxx_xxxx_xxxx_xrrr`, registers r16..r23.
#[inline]
pub fn rr_mul3(raw: u32) -> u8 {
    16 + bits(raw, 0, 3) as u8
}

/// `MOVW`: destination pair (even register).
#[inline]
pub fn movw_rd(raw: u32) -> u8 {
    bits(raw, 4, 4) as u8 * 2
}

/// `MOVW`: source pair (even register).
#[inline]
pub fn movw_rr(raw: u32) -> u8 {
    bits(raw, 0, 4) as u8 * 2
}

/// `xxxx_KKKK_xxxx_KKKK`
#[inline]
pub fn imm8(raw: u32) -> u8 {
    ((bits(raw, 8, 4) << 4) | bits(raw, 0, 4)) as u8
}

/// `ADIW`/`SBIW`: low register of the pair (r24, r26, r28, r30).
#[inline]
pub fn adiw_rd(raw: u32) -> u8 {
    24 + 2 * bits(raw, 4, 2) as u8
}

/// `ADIW`/`SBIW`: 6-bit immediate `KKxx_KKKK`.
#[inline]
pub fn adiw_imm(raw: u32) -> u8 {
    ((bits(raw, 6, 2) << 4) | bits(raw, 0, 4)) as u8
}

/// `LDD`/`STD` displacement: `xxqx_qqxx_xxxx_xqqq`.
#[inline]
pub fn ldd_q(raw: u32) -> u8 {
    ((bits(raw, 13, 1) << 5) | (bits(raw, 10, 2) << 3) | bits(raw, 0, 3)) as u8
}

/// `LDS`/`STS`: register from the first word.
#[inline]
pub fn lds_rd(raw: u32) -> u8 {
    bits(raw, 20, 5) as u8
}

/// `LDS`/`STS`: 16-bit data address from the second word.
#[inline]
pub fn lds_addr(raw: u32) -> u16 {
    bits(raw, 0, 16) as u16
}

/// `JMP`/`CALL`: 22-bit word address.
#[inline]
pub fn jmp_addr(raw: u32) -> u32 {
    (bits(raw, 20, 5) << 17) | bits(raw, 0, 17)
}

/// `IN`/`OUT`: 6-bit I/O port `xxxx_xAAx_xxxx_AAAA`.
#[inline]
pub fn io_port6(raw: u32) -> u8 {
    ((bits(raw, 9, 2) << 4) | bits(raw, 0, 4)) as u8
}

/// `CBI`/`SBI`/`SBIC`/`SBIS`: 5-bit I/O port `xxxx_xxxx_AAAA_Axxx`.
#[inline]
pub fn io_port5(raw: u32) -> u8 {
    bits(raw, 3, 5) as u8
}

/// Bit index in the low three bits (`CBI`, `SBRC`, `BLD`, `BRBS`, ...).
#[inline]
pub fn bit3(raw: u32) -> u8 {
    bits(raw, 0, 3) as u8
}

/// `BSET`/`BCLR`: SREG bit `xxxx_xxxx_xsss_xxxx`.
#[inline]
pub fn sreg_bit(raw: u32) -> u8 {
    bits(raw, 4, 3) as u8
}

/// `RJMP`/`RCALL`: signed 12-bit word offset.
#[inline]
pub fn rjmp_offset(raw: u32) -> i32 {
    sext(bits(raw, 0, 12), 12)
}

/// `BRBS`/`BRBC`: signed 7-bit word offset `xxxx_xxkk_kkkk_kxxx`.
#[inline]
pub fn branch_offset(raw: u32) -> i32 {
    sext(bits(raw, 3, 7), 7)
}

/// `DES`: round number `xxxx_xxxx_KKKK_xxxx`.
#[inline]
pub fn des_round(raw: u32) -> u8 {
    bits(raw, 4, 4) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_fields() {
        // add r16, r17
        assert_eq!(rd5(0x0f01), 16);
        assert_eq!(rr5(0x0f01), 17);
        // ldi r16, 0x42
        assert_eq!(rd_high(0xe402), 16);
        assert_eq!(imm8(0xe402), 0x42);
        // movw r30, r24
        assert_eq!(movw_rd(0x01fc), 30);
        assert_eq!(movw_rr(0x01fc), 24);
        // fmulsu r23, r16
        assert_eq!(rd_mul3(0x03f8), 23);
        assert_eq!(rr_mul3(0x03f8), 16);
        assert_eq!(rr_high(0x021f), 31);
    }

    #[test]
    fn immediates_and_displacements() {
        // adiw r30, 63
        assert_eq!(adiw_rd(0x96ff), 30);
        assert_eq!(adiw_imm(0x96ff), 63);
        // ldd r0, Y+63
        assert_eq!(ldd_q(0xac0f), 63);
        assert_eq!(ldd_q(0x8008 | 0x2000), 32);
        assert_eq!(io_port6(0xbe0f), 0x3f);
        assert_eq!(io_port5(0x9af8), 0x1f);
        assert_eq!(bit3(0x9af7), 7);
        assert_eq!(sreg_bit(0x94f8), 7);
        assert_eq!(des_round(0x94fb), 15);
    }

    #[test]
    fn long_forms() {
        // lds r24, 0x0100
        let lds = (0x9180u32 << 16) | 0x0100;
        assert_eq!(lds_rd(lds), 24);
        assert_eq!(lds_addr(lds), 0x0100);
        // call 0x3fffff (all address bits set)
        let call = (0x95ffu32 << 16) | 0xffff;
        assert_eq!(jmp_addr(call), 0x3f_ffff);
        let jmp = (0x940cu32 << 16) | 0x1234;
        assert_eq!(jmp_addr(jmp), 0x1234);
    }

    #[test]
    fn signed_offsets() {
        assert_eq!(rjmp_offset(0xcfff), -1);
        assert_eq!(rjmp_offset(0xc7ff), 2047);
        assert_eq!(rjmp_offset(0xc800), -2048);
        assert_eq!(branch_offset(0xf3f9), -1);
        assert_eq!(branch_offset(0xf1f9), 63);
        assert_eq!(branch_offset(0xf201), -64);
    }
}
