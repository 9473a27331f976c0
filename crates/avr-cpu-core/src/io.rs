//! I/O space and the low data-address window.
//!
//! The 64 I/O ports live at data addresses `0x20..0x60`, right above the 32
//! general-purpose registers. The top eight ports are CPU registers; the rest
//! belong to peripherals and are forwarded to the bus.

use crate::features::Features;
use crate::mem::{BusFault, CpuBus, MemSpace};
use crate::state::{AvrState, NUM_REGS};

/// Data address of I/O port 0.
pub const IO_BASE: u32 = 0x20;
pub const NUM_IO_PORTS: u32 = 64;

pub const PORT_RAMPD: u8 = 0x38;
pub const PORT_RAMPX: u8 = 0x39;
pub const PORT_RAMPY: u8 = 0x3a;
pub const PORT_RAMPZ: u8 = 0x3b;
pub const PORT_EIND: u8 = 0x3c;
pub const PORT_SPL: u8 = 0x3d;
pub const PORT_SPH: u8 = 0x3e;
pub const PORT_SREG: u8 = 0x3f;

/// `IN`: reads an I/O port.
pub fn read_port<B: CpuBus + ?Sized>(
    state: &AvrState,
    bus: &mut B,
    port: u8,
) -> Result<u8, BusFault> {
    let port = port & 0x3f;
    Ok(match port {
        PORT_RAMPD => (state.rampd >> 16) as u8,
        PORT_RAMPX => (state.rampx >> 16) as u8,
        PORT_RAMPY => (state.rampy >> 16) as u8,
        PORT_RAMPZ => (state.rampz >> 16) as u8,
        PORT_EIND => (state.eind >> 16) as u8,
        PORT_SPL => state.sp as u8,
        PORT_SPH => (state.sp >> 8) as u8,
        PORT_SREG => state.sreg(),
        _ => bus.load(MemSpace::Data, IO_BASE + u32::from(port))?,
    })
}

/// `OUT`: writes an I/O port. Writes to extended-address registers the part
/// does not have are dropped.
pub fn write_port<B: CpuBus + ?Sized>(
    state: &mut AvrState,
    bus: &mut B,
    port: u8,
    val: u8,
) -> Result<(), BusFault> {
    let port = port & 0x3f;
    let features = state.features();
    let shifted = u32::from(val) << 16;
    match port {
        PORT_RAMPD => {
            if features.has(Features::RAMPD) {
                state.rampd = shifted;
            }
        }
        PORT_RAMPX => {
            if features.has(Features::RAMPX) {
                state.rampx = shifted;
            }
        }
        PORT_RAMPY => {
            if features.has(Features::RAMPY) {
                state.rampy = shifted;
            }
        }
        PORT_RAMPZ => {
            if features.has(Features::RAMPZ) {
                state.rampz = shifted;
            }
        }
        PORT_EIND => {
            if features.has(Features::EIJMP_EICALL) {
                state.eind = shifted;
            }
        }
        PORT_SPL => state.sp = (state.sp & 0xff00) | u16::from(val),
        PORT_SPH => {
            if features.has(Features::SP_2_BYTE) {
                state.sp = (state.sp & 0x00ff) | (u16::from(val) << 8);
            }
        }
        PORT_SREG => state.set_sreg(val),
        _ => bus.store(MemSpace::Data, IO_BASE + u32::from(port), val)?,
    }
    Ok(())
}

/// Byte load from data space, resolving the register file and I/O window.
pub fn load_data<B: CpuBus + ?Sized>(
    state: &AvrState,
    bus: &mut B,
    addr: u32,
) -> Result<u8, BusFault> {
    if addr < NUM_REGS as u32 {
        Ok(state.regs[addr as usize])
    } else if addr < IO_BASE + NUM_IO_PORTS {
        read_port(state, bus, (addr - IO_BASE) as u8)
    } else {
        bus.load(MemSpace::Data, addr)
    }
}

/// Byte store to data space, resolving the register file and I/O window.
pub fn store_data<B: CpuBus + ?Sized>(
    state: &mut AvrState,
    bus: &mut B,
    addr: u32,
    val: u8,
) -> Result<(), BusFault> {
    if addr < NUM_REGS as u32 {
        state.regs[addr as usize] = val;
        Ok(())
    } else if addr < IO_BASE + NUM_IO_PORTS {
        write_port(state, bus, (addr - IO_BASE) as u8, val)
    } else {
        bus.store(MemSpace::Data, addr, val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{CpuConfig, CpuModel};
    use crate::mem::FlatBus;
    use crate::state::Flag;

    #[test]
    fn cpu_ports_map_to_state() {
        let mut s = AvrState::new(CpuConfig::for_model(CpuModel::Xmega7));
        let mut bus = FlatBus::new(0, 0x100);

        write_port(&mut s, &mut bus, PORT_SPL, 0xff).unwrap();
        write_port(&mut s, &mut bus, PORT_SPH, 0x21).unwrap();
        write_port(&mut s, &mut bus, PORT_RAMPZ, 0x02).unwrap();
        write_port(&mut s, &mut bus, PORT_EIND, 0x01).unwrap();
        write_port(&mut s, &mut bus, PORT_SREG, 0x03).unwrap();

        assert_eq!(s.sp, 0x21ff);
        assert_eq!(s.rampz, 0x2_0000);
        assert_eq!(s.eind, 0x1_0000);
        assert!(s.flag(Flag::C) && s.flag(Flag::Z) && !s.flag(Flag::I));
        assert_eq!(read_port(&s, &mut bus, PORT_SPH).unwrap(), 0x21);
        assert_eq!(read_port(&s, &mut bus, PORT_RAMPZ).unwrap(), 0x02);
        assert_eq!(read_port(&s, &mut bus, PORT_SREG).unwrap(), 0x03);
        assert!(bus.data().iter().all(|b| *b == 0));
    }

    #[test]
    fn absent_ramp_registers_ignore_writes() {
        let mut s = AvrState::new(CpuConfig::for_model(CpuModel::Avr5));
        let mut bus = FlatBus::new(0, 0x100);
        write_port(&mut s, &mut bus, PORT_RAMPZ, 0x02).unwrap();
        write_port(&mut s, &mut bus, PORT_RAMPD, 0x02).unwrap();
        write_port(&mut s, &mut bus, PORT_EIND, 0x02).unwrap();
        assert_eq!((s.rampz, s.rampd, s.eind), (0, 0, 0));
    }

    #[test]
    fn peripheral_ports_forward_to_the_bus() {
        let mut s = AvrState::new(CpuConfig::for_model(CpuModel::Avr5));
        let mut bus = FlatBus::new(0, 0x100);
        write_port(&mut s, &mut bus, 0x05, 0xa5).unwrap();
        assert_eq!(bus.data()[0x25], 0xa5);
        assert_eq!(load_data(&s, &mut bus, 0x25).unwrap(), 0xa5);
    }

    #[test]
    fn low_data_addresses_alias_registers() {
        let mut s = AvrState::new(CpuConfig::for_model(CpuModel::Avr5));
        let mut bus = FlatBus::new(0, 0x100);
        store_data(&mut s, &mut bus, 0x1f, 0x77).unwrap();
        assert_eq!(s.regs[31], 0x77);
        store_data(&mut s, &mut bus, 0x5d, 0x10).unwrap();
        assert_eq!(s.sp & 0xff, 0x10);
        store_data(&mut s, &mut bus, 0x80, 0x33).unwrap();
        assert_eq!(bus.data()[0x80], 0x33);
    }
}
