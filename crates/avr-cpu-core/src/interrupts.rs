//! Reset and external-interrupt delivery.
//!
//! Delivery only happens between translation blocks. A reset request is always
//! taken first and ignores `I`; otherwise, with `I` set, the lowest pending line
//! wins. Line `n` uses vector `n + 1` (vector 0 is reset).

use tracing::debug;

use crate::error::{CpuError, Result};
use crate::mem::{BusFault, CpuBus};
use crate::stack;
use crate::state::{AvrState, Flag, NUM_INTERRUPT_LINES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Reset,
    Interrupt { line: u32 },
}

impl Delivery {
    pub fn vector(self) -> u32 {
        match self {
            Delivery::Reset => 0,
            Delivery::Interrupt { line } => line + 1,
        }
    }
}

impl AvrState {
    /// Raises (`level == true`) or lowers an external interrupt line.
    pub fn set_interrupt_line(&mut self, line: u32, level: bool) -> Result<()> {
        if line >= NUM_INTERRUPT_LINES {
            return Err(CpuError::InvalidInterruptLine(line));
        }
        if level {
            self.intsrc |= 1 << line;
        } else {
            self.intsrc &= !(1 << line);
        }
        Ok(())
    }

    pub fn request_reset(&mut self) {
        self.reset_pending = true;
    }

    /// Whether any interrupt could be taken right now.
    pub fn has_deliverable_interrupt(&self) -> bool {
        pending_delivery(self).is_some()
    }
}

/// The event [`deliver`] would take, without touching state.
pub fn pending_delivery(state: &AvrState) -> Option<Delivery> {
    if state.reset_pending {
        return Some(Delivery::Reset);
    }
    if state.flag(Flag::I) && state.intsrc != 0 {
        return Some(Delivery::Interrupt {
            line: state.intsrc.trailing_zeros(),
        });
    }
    None
}

/// Takes the highest-priority pending event, if any.
///
/// Pushes the current PC, clears `I`, jumps to the vector and drops exactly the
/// serviced request. A sleeping CPU wakes up.
///
/// A fault while pushing the frame aborts an interrupt and leaves it pending.
/// A reset still goes through; its frame is best effort.
pub fn deliver<B: CpuBus + ?Sized>(
    state: &mut AvrState,
    bus: &mut B,
) -> std::result::Result<Option<Delivery>, BusFault> {
    let Some(delivery) = pending_delivery(state) else {
        return Ok(None);
    };

    let ret = state.pc;
    if let Err(fault) = stack::push_return_address(state, bus, ret) {
        if delivery != Delivery::Reset {
            return Err(fault);
        }
        debug!(addr = fault.addr, sp = state.sp, "reset frame push faulted");
    }
    state.set_flag(Flag::I, false);
    let vector = delivery.vector();
    state.set_pc(vector * state.config().vector_size());

    match delivery {
        Delivery::Reset => state.reset_pending = false,
        Delivery::Interrupt { line } => state.intsrc &= !(1 << line),
    }
    state.halted = false;

    debug!(
        vector,
        ret_pc = ret,
        new_pc = state.pc,
        sp = state.sp,
        "delivered {:?}",
        delivery
    );
    Ok(Some(delivery))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{CpuConfig, CpuModel};
    use crate::mem::FlatBus;

    fn setup(model: CpuModel) -> (AvrState, FlatBus) {
        let mut s = AvrState::new(CpuConfig::for_model(model));
        s.sp = 0x2ff;
        (s, FlatBus::new(0, 0x300))
    }

    #[test]
    fn lowest_line_wins() {
        let (mut s, mut bus) = setup(CpuModel::Avr5);
        s.pc = 0x123;
        s.set_interrupt_line(2, true).unwrap();
        s.set_interrupt_line(5, true).unwrap();

        let taken = deliver(&mut s, &mut bus).unwrap();
        assert_eq!(taken, Some(Delivery::Interrupt { line: 2 }));
        assert_eq!(s.intsrc, 1 << 5);
        assert_eq!(s.pc, 3 * 2);
        assert!(!s.flag(Flag::I));
        assert_eq!(s.sp, 0x2fd);
        assert_eq!(bus.data()[0x2ff], 0x23);
        assert_eq!(bus.data()[0x2fe], 0x01);

        // I is clear now, so line 5 stays pending.
        assert_eq!(deliver(&mut s, &mut bus).unwrap(), None);
        assert_eq!(s.intsrc, 1 << 5);
    }

    #[test]
    fn reset_preempts_and_ignores_i() {
        let (mut s, mut bus) = setup(CpuModel::Avr5);
        s.set_interrupt_line(2, true).unwrap();
        s.set_interrupt_line(5, true).unwrap();
        s.set_flag(Flag::I, false);
        s.request_reset();

        assert_eq!(deliver(&mut s, &mut bus).unwrap(), Some(Delivery::Reset));
        assert_eq!(s.pc, 0);
        assert!(!s.reset_pending);
        assert_eq!(s.intsrc, (1 << 2) | (1 << 5));
    }

    #[test]
    fn small_parts_use_single_word_vectors() {
        let (mut s, mut bus) = setup(CpuModel::Avr2);
        s.set_interrupt_line(3, true).unwrap();
        deliver(&mut s, &mut bus).unwrap();
        assert_eq!(s.pc, 4);
    }

    #[test]
    fn delivery_wakes_a_sleeping_cpu() {
        let (mut s, mut bus) = setup(CpuModel::Avr5);
        s.halted = true;
        s.set_interrupt_line(0, true).unwrap();
        deliver(&mut s, &mut bus).unwrap();
        assert!(!s.halted);
    }

    #[test]
    fn line_bounds() {
        let (mut s, _) = setup(CpuModel::Avr5);
        assert!(s.set_interrupt_line(NUM_INTERRUPT_LINES - 1, true).is_ok());
        assert!(matches!(
            s.set_interrupt_line(NUM_INTERRUPT_LINES, true),
            Err(CpuError::InvalidInterruptLine(57))
        ));
        s.set_interrupt_line(56, false).unwrap();
        assert_eq!(s.intsrc, 0);
    }

    #[test]
    fn interrupt_stack_fault_surfaces() {
        let mut s = AvrState::new(CpuConfig::for_model(CpuModel::Avr5));
        let mut bus = FlatBus::new(0, 0x100);
        s.sp = 0x8ff;
        s.pc = 0x40;
        s.set_interrupt_line(1, true).unwrap();
        assert_eq!(deliver(&mut s, &mut bus), Err(BusFault::data(0x8ff)));
        assert_eq!(s.pc, 0x40);
        assert_eq!(s.sp, 0x8ff);
        assert_eq!(s.intsrc, 1 << 1);
        assert!(s.flag(Flag::I));
    }

    #[test]
    fn reset_goes_through_a_faulting_push() {
        let mut s = AvrState::new(CpuConfig::for_model(CpuModel::Avr5));
        let mut bus = FlatBus::new(0, 0x100);
        s.sp = 0xfff0;
        s.pc = 0x10;
        s.halted = true;
        s.set_interrupt_line(1, true).unwrap();
        s.request_reset();

        assert_eq!(deliver(&mut s, &mut bus), Ok(Some(Delivery::Reset)));
        assert_eq!(s.pc, 0);
        assert!(!s.reset_pending);
        assert!(!s.flag(Flag::I));
        assert!(!s.halted);
        assert_eq!(s.intsrc, 1 << 1);
        // I is clear, so the line waits.
        assert_eq!(deliver(&mut s, &mut bus), Ok(None));
    }
}
