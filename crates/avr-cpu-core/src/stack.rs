//! Return-address frame layout.
//!
//! A `CALL` pushes the return address low byte first, growing down, so with
//! `S` the stack pointer before the push the frame is:
//!
//! | width | `S`  | `S-1` | `S-2` | SP after |
//! |-------|------|-------|-------|----------|
//! | 1     | lo   |       |       | `S-1`    |
//! | 2     | lo   | hi    |       | `S-2`    |
//! | 3     | lo   | mid   | hi    | `S-3`    |
//!
//! The translator emits IR from the same table the dispatcher uses, so both
//! paths agree on the layout.

use crate::features::PcWidth;
use crate::io;
use crate::mem::{BusFault, CpuBus};
use crate::state::AvrState;
use crate::PC_MASK;

/// One byte of a pushed return address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    /// Distance below the frame base (`S` on push, `SP + width` on pop).
    pub offset: u16,
    /// Position of the byte within the return address.
    pub shift: u32,
}

const SLOTS: [FrameSlot; 3] = [
    FrameSlot {
        offset: 0,
        shift: 0,
    },
    FrameSlot {
        offset: 1,
        shift: 8,
    },
    FrameSlot {
        offset: 2,
        shift: 16,
    },
];

pub fn frame_slots(width: PcWidth) -> &'static [FrameSlot] {
    &SLOTS[..width.bytes() as usize]
}

#[inline]
pub fn slot_addr(base: u16, slot: FrameSlot) -> u32 {
    u32::from(base.wrapping_sub(slot.offset))
}

pub fn push_return_address<B: CpuBus + ?Sized>(
    state: &mut AvrState,
    bus: &mut B,
    ret: u32,
) -> Result<(), BusFault> {
    let width = state.config().pc_width();
    let base = state.sp;
    for slot in frame_slots(width) {
        io::store_data(state, bus, slot_addr(base, *slot), (ret >> slot.shift) as u8)?;
    }
    state.sp = base.wrapping_sub(width.bytes());
    Ok(())
}

pub fn pop_return_address<B: CpuBus + ?Sized>(
    state: &mut AvrState,
    bus: &mut B,
) -> Result<u32, BusFault> {
    let width = state.config().pc_width();
    let base = state.sp.wrapping_add(width.bytes());
    let mut ret = 0u32;
    for slot in frame_slots(width) {
        ret |= u32::from(io::load_data(state, bus, slot_addr(base, *slot))?) << slot.shift;
    }
    state.sp = base;
    Ok(ret & PC_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{CpuConfig, CpuModel};
    use crate::mem::FlatBus;

    #[test]
    fn three_byte_frame_layout() {
        let mut s = AvrState::new(CpuConfig::for_model(CpuModel::Avr6));
        let mut bus = FlatBus::new(0, 0x200);
        s.sp = 0x100;

        push_return_address(&mut s, &mut bus, 0x52_3456).unwrap();
        assert_eq!(bus.data()[0x100], 0x56);
        assert_eq!(bus.data()[0xff], 0x34);
        assert_eq!(bus.data()[0xfe], 0x52);
        assert_eq!(s.sp, 0xfd);

        // Bit 22 of the high byte is past the 22-bit PC; the pop drops it.
        assert_eq!(pop_return_address(&mut s, &mut bus).unwrap(), 0x12_3456);
        assert_eq!(s.sp, 0x100);
    }

    #[test]
    fn two_byte_frame_layout() {
        let mut s = AvrState::new(CpuConfig::for_model(CpuModel::Avr5));
        let mut bus = FlatBus::new(0, 0x200);
        s.sp = 0x1ff;

        push_return_address(&mut s, &mut bus, 0x1234).unwrap();
        assert_eq!(bus.data()[0x1ff], 0x34);
        assert_eq!(bus.data()[0x1fe], 0x12);
        assert_eq!(s.sp, 0x1fd);
        assert_eq!(pop_return_address(&mut s, &mut bus).unwrap(), 0x1234);
        assert_eq!(s.sp, 0x1ff);
    }

    #[test]
    fn frame_tables() {
        assert_eq!(frame_slots(PcWidth::One).len(), 1);
        assert_eq!(frame_slots(PcWidth::Two).len(), 2);
        let three = frame_slots(PcWidth::Three);
        assert_eq!(three[2], FrameSlot { offset: 2, shift: 16 });
    }
}
