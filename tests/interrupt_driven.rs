//! A small interrupt-driven firmware run end to end: decoder, translator,
//! block cache, interrupt dispatch and the debugger hooks together.

use avr_cpu_core::{gdb, snapshot, AvrState, BusFault, CpuBus, CpuConfig, CpuModel, FlatBus};
use avr_decoder::decode;
use avr_jit::{Cpu, CpuExit, JitConfig};
use tracing::info;

const MAIN: u16 = 0x10;
const ISR: u16 = 0x20;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Vector table, a main loop that sleeps and counts wakeups in r20, and a
/// handler for line 0 that counts in r21.
fn firmware() -> FlatBus {
    let mut bus = FlatBus::new(0x1000, 0x900);
    bus.load_program(0, &[0x940c, MAIN, 0x940c, ISR]);
    bus.load_program(
        u32::from(MAIN),
        &[
            0xef0f, // ldi r16, 0xff
            0xbf0d, // out SPL, r16
            0xe008, // ldi r16, 0x08
            0xbf0e, // out SPH, r16
            0x9478, // sei
            0x9588, // sleep
            0x9543, // inc r20
            0xcffd, // rjmp -3
        ],
    );
    bus.load_program(
        u32::from(ISR),
        &[
            0x9553, // inc r21
            0x9518, // reti
        ],
    );
    bus
}

fn boot() -> (Cpu, FlatBus) {
    let mut cpu = Cpu::new(CpuConfig::for_model(CpuModel::Avr5), JitConfig::default());
    let mut bus = firmware();
    assert_eq!(cpu.run(&mut bus, 100), CpuExit::Sleep);
    assert_eq!(cpu.state().pc, u32::from(MAIN) + 6);
    (cpu, bus)
}

#[test]
fn wakes_once_per_interrupt() {
    init_tracing();
    let (mut cpu, mut bus) = boot();

    for n in 1..=3u8 {
        cpu.raise_interrupt(0).unwrap();
        assert_eq!(cpu.run(&mut bus, 100), CpuExit::Sleep);
        info!(n, pc = cpu.state().pc, "back to sleep");
        assert_eq!((cpu.state().regs[20], cpu.state().regs[21]), (n, n));
        assert_eq!(cpu.state().sp, 0x8ff);
    }

    // Nothing pending: the CPU stays asleep without running anything.
    let before = cpu.cache_stats();
    assert_eq!(cpu.run(&mut bus, 100), CpuExit::Sleep);
    assert_eq!(cpu.cache_stats(), before);
    assert!(cpu.cached_blocks() > 0);
}

#[test]
fn masked_interrupts_stay_pending() {
    init_tracing();
    let (mut cpu, mut bus) = boot();

    cpu.state_mut().set_sreg(0);
    cpu.raise_interrupt(0).unwrap();
    assert_eq!(cpu.run(&mut bus, 100), CpuExit::Sleep);
    assert_eq!(cpu.state().regs[21], 0);
    assert_eq!(cpu.state().intsrc, 1);

    cpu.state_mut().set_sreg(0x80);
    assert_eq!(cpu.run(&mut bus, 100), CpuExit::Sleep);
    assert_eq!(cpu.state().regs[21], 1);
    assert_eq!(cpu.state().intsrc, 0);
}

#[test]
fn reset_request_restarts_at_vector_zero() {
    init_tracing();
    let (mut cpu, mut bus) = boot();
    cpu.raise_interrupt(0).unwrap();
    cpu.run(&mut bus, 100);

    let invalidated = cpu.cache_stats().invalidations;
    cpu.request_reset();
    assert_eq!(cpu.run(&mut bus, 100), CpuExit::Sleep);
    assert_eq!(cpu.state().pc, u32::from(MAIN) + 6);
    assert!(!cpu.state().reset_pending);
    assert!(cpu.cache_stats().invalidations > invalidated);
}

#[test]
fn reset_recovers_from_a_runaway_stack() {
    init_tracing();
    let (mut cpu, mut bus) = boot();

    cpu.state_mut().sp = 0xfff0;
    cpu.raise_interrupt(0).unwrap();
    for _ in 0..3 {
        assert_eq!(
            cpu.run(&mut bus, 100),
            CpuExit::BusFault(BusFault::data(0xfff0))
        );
    }
    assert_eq!(cpu.state().intsrc, 1);

    cpu.lower_interrupt(0).unwrap();
    cpu.request_reset();
    assert_eq!(cpu.run(&mut bus, 100), CpuExit::Sleep);
    assert!(!cpu.state().reset_pending);
    assert_eq!(cpu.state().pc, u32::from(MAIN) + 6);
    assert_eq!(cpu.state().sp, 0x8ff);
    assert_eq!(cpu.state().regs[21], 0);
}

#[test]
fn debugger_stops_in_the_handler() {
    init_tracing();
    let (mut cpu, mut bus) = boot();

    assert!(cpu.insert_breakpoint(u32::from(ISR)));
    cpu.raise_interrupt(0).unwrap();
    assert_eq!(
        cpu.run(&mut bus, 100),
        CpuExit::Breakpoint {
            pc: u32::from(ISR)
        }
    );

    let handler: Vec<String> = (0..2)
        .map(|i| bus.fetch(u32::from(ISR) + i).map(|w| decode(w).opcode.to_string()))
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(handler, ["inc", "reti"]);

    let regs = gdb::read_all(cpu.state());
    assert_eq!(regs.len(), 32 + 1 + 2 + 4);
    assert_eq!(&regs[35..], &(u32::from(ISR) * 2).to_le_bytes());

    assert!(cpu.remove_breakpoint(u32::from(ISR)));
    cpu.set_singlestep(true);
    assert_eq!(
        cpu.run(&mut bus, 100),
        CpuExit::SingleStep {
            pc: u32::from(ISR) + 1
        }
    );
    assert_eq!(cpu.state().regs[21], 1);

    cpu.set_singlestep(false);
    assert_eq!(cpu.run(&mut bus, 100), CpuExit::Sleep);
    assert_eq!(cpu.state().regs[20], 1);
}

#[test]
fn state_survives_a_snapshot_round_trip() {
    init_tracing();
    let (mut cpu, mut bus) = boot();
    cpu.raise_interrupt(0).unwrap();
    cpu.run(&mut bus, 100);
    cpu.raise_interrupt(7).unwrap();
    cpu.state_mut().set_sreg(0x35);

    let mut buf = Vec::new();
    snapshot::save_state(cpu.state(), &mut buf).unwrap();
    let restored = snapshot::restore_state(&mut buf.as_slice()).unwrap();
    assert_eq!(&restored, cpu.state());

    let json = serde_json::to_string(cpu.state()).unwrap();
    let from_json: AvrState = serde_json::from_str(&json).unwrap();
    assert_eq!(&from_json, cpu.state());
}
