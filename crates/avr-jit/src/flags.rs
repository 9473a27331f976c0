//! SREG flag formulas.
//!
//! Each formula is a handful of bitwise ops on the operands and the truncated
//! result; nothing depends on host overflow detection. They are written against
//! [`BitAlgebra`] so the translator emits them as IR (via [`IrBuilder`]) and tests
//! evaluate the very same code on plain integers (via [`Eval`]).

use crate::builder::IrBuilder;
use crate::ir::{BinOp, ValueId};

pub trait BitAlgebra {
    type V: Copy;

    fn konst(&mut self, v: u32) -> Self::V;
    fn and(&mut self, a: Self::V, b: Self::V) -> Self::V;
    fn or(&mut self, a: Self::V, b: Self::V) -> Self::V;
    fn xor(&mut self, a: Self::V, b: Self::V) -> Self::V;
    fn shr(&mut self, a: Self::V, n: u32) -> Self::V;

    fn not(&mut self, a: Self::V) -> Self::V {
        let ones = self.konst(u32::MAX);
        self.xor(a, ones)
    }

    /// `a & !b`
    fn andc(&mut self, a: Self::V, b: Self::V) -> Self::V {
        let nb = self.not(b);
        self.and(a, nb)
    }

    /// Bit `n` of `a` as 0/1.
    fn bit(&mut self, a: Self::V, n: u32) -> Self::V {
        let shifted = self.shr(a, n);
        let one = self.konst(1);
        self.and(shifted, one)
    }
}

impl BitAlgebra for IrBuilder {
    type V = ValueId;

    fn konst(&mut self, v: u32) -> ValueId {
        IrBuilder::konst(self, v)
    }

    fn and(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.bin(BinOp::And, a, b)
    }

    fn or(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.bin(BinOp::Or, a, b)
    }

    fn xor(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.bin(BinOp::Xor, a, b)
    }

    fn shr(&mut self, a: ValueId, n: u32) -> ValueId {
        self.bin_imm(BinOp::Shr, a, n)
    }
}

/// Direct evaluation on integers.
#[derive(Debug, Default, Clone, Copy)]
pub struct Eval;

impl BitAlgebra for Eval {
    type V = u32;

    fn konst(&mut self, v: u32) -> u32 {
        v
    }

    fn and(&mut self, a: u32, b: u32) -> u32 {
        a & b
    }

    fn or(&mut self, a: u32, b: u32) -> u32 {
        a | b
    }

    fn xor(&mut self, a: u32, b: u32) -> u32 {
        a ^ b
    }

    fn shr(&mut self, a: u32, n: u32) -> u32 {
        a >> n
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarryHalf<V> {
    pub c: V,
    pub h: V,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zns<V> {
    pub z: V,
    pub n: V,
    pub s: V,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Znvs<V> {
    pub z: V,
    pub n: V,
    pub v: V,
    pub s: V,
}

/// Carry out of bits 7 and 3 of `rd + rr (+ c) = r`.
pub fn add_ch<A: BitAlgebra>(a: &mut A, r: A::V, rd: A::V, rr: A::V) -> CarryHalf<A::V> {
    let t1 = a.and(rd, rr);
    let t2 = a.andc(rd, r);
    let t3 = a.andc(rr, r);
    let t = a.or(t1, t2);
    let t = a.or(t, t3);
    CarryHalf {
        c: a.bit(t, 7),
        h: a.bit(t, 3),
    }
}

pub fn add_v<A: BitAlgebra>(a: &mut A, r: A::V, rd: A::V, rr: A::V) -> A::V {
    let t1 = a.xor(rd, r);
    let t2 = a.xor(rd, rr);
    let t = a.andc(t1, t2);
    a.bit(t, 7)
}

/// Borrow into bits 7 and 3 of `rd - rr (- c) = r`.
pub fn sub_ch<A: BitAlgebra>(a: &mut A, r: A::V, rd: A::V, rr: A::V) -> CarryHalf<A::V> {
    let nrd = a.not(rd);
    let t1 = a.and(nrd, rr);
    let t2 = a.or(nrd, rr);
    let t2 = a.and(t2, r);
    let t = a.or(t1, t2);
    CarryHalf {
        c: a.bit(t, 7),
        h: a.bit(t, 3),
    }
}

pub fn sub_v<A: BitAlgebra>(a: &mut A, r: A::V, rd: A::V, rr: A::V) -> A::V {
    let t1 = a.xor(rd, r);
    let t2 = a.xor(rd, rr);
    let t = a.and(t1, t2);
    a.bit(t, 7)
}

/// `Z` is the result itself (zero flag set iff it is 0).
pub fn zns<A: BitAlgebra>(a: &mut A, r: A::V, v: A::V) -> Zns<A::V> {
    let (n, s) = ns(a, r, v);
    Zns { z: r, n, s }
}

pub fn ns<A: BitAlgebra>(a: &mut A, r: A::V, v: A::V) -> (A::V, A::V) {
    let n = a.bit(r, 7);
    let s = a.xor(n, v);
    (n, s)
}

/// Flags after `ASR`/`ROR`: `V = N ^ C`, `S = N ^ V`.
pub fn rshift_znvs<A: BitAlgebra>(a: &mut A, r: A::V, c: A::V) -> Znvs<A::V> {
    let n = a.bit(r, 7);
    let v = a.xor(n, c);
    let s = a.xor(n, v);
    Znvs { z: r, n, v, s }
}

/// `ADIW` carry/overflow on the 16-bit pair value.
pub fn adiw_cv<A: BitAlgebra>(a: &mut A, r: A::V, rd: A::V) -> (A::V, A::V) {
    let c = a.andc(rd, r);
    let v = a.andc(r, rd);
    (a.bit(c, 15), a.bit(v, 15))
}

/// `SBIW` carry/overflow on the 16-bit pair value.
pub fn sbiw_cv<A: BitAlgebra>(a: &mut A, r: A::V, rd: A::V) -> (A::V, A::V) {
    let c = a.andc(r, rd);
    let v = a.andc(rd, r);
    (a.bit(c, 15), a.bit(v, 15))
}
