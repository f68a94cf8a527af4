//! Bench scenarios replayed against the model with default host timing.

use spi_pwm_core::peripherals::CARRIER_PERIOD_CYCLES;
use spi_pwm_core::{Bus, Peripheral, PwmMeasurement, SpiHost, Transaction, CLOCK_HZ, RESET_CYCLES};

/// Long enough for at least two carrier periods.
const EDGE_TIMEOUT: u64 = 10_000;

fn booted() -> Peripheral {
    let mut dev = Peripheral::new();
    dev.power_on_reset(RESET_CYCLES);
    dev
}

fn measure(dev: &mut Peripheral) -> PwmMeasurement {
    dev.measure_pwm(Bus::Secondary, 0, EDGE_TIMEOUT).unwrap()
}

#[test]
fn test_static_registers_reach_pins() {
    let mut dev = booted();
    dev.write_register(0x00, 0xF0);
    assert_eq!(dev.outputs().uo_out, 0xF0);
    dev.write_register(0x01, 0xCC);
    assert_eq!(dev.outputs().uio_out, 0xCC);
    assert_eq!(dev.outputs().uo_out, 0xF0);
    assert_eq!(dev.outputs().uio_oe, 0xFF);
}

#[test]
fn test_unmapped_and_read_frames_change_nothing() {
    let mut dev = booted();
    dev.write_register(0x00, 0xF0);
    dev.write_register(0x01, 0xCC);
    let regs = dev.regs;

    dev.write_register(0x30, 0xAA);
    dev.read_transaction(0x30, 0xBE);
    dev.read_transaction(0x41, 0xEF);
    dev.write_register(0x7F, 0x00);

    assert_eq!(dev.regs, regs);
    assert_eq!(dev.outputs().uo_out, 0xF0);
    assert_eq!(dev.outputs().uio_out, 0xCC);
    assert_eq!(dev.stats.unmapped_writes, 2);
    assert_eq!(dev.stats.reads, 2);
}

#[test]
fn test_partial_frame_is_atomic() {
    let mut dev = booted();
    dev.write_register(0x00, 0x0F);
    let host = SpiHost::new();
    for bits in [1, 8, 15] {
        host.send_truncated(&mut dev, Transaction::write(0x00, 0xFF), bits);
        assert_eq!(dev.outputs().uo_out, 0x0F, "after {} bits", bits);
    }
    assert_eq!(dev.stats.aborted, 3);
    // A full frame right after still lands
    dev.write_register(0x00, 0xA5);
    assert_eq!(dev.outputs().uo_out, 0xA5);
}

#[test]
fn test_pwm_frequency() {
    let mut dev = booted();
    dev.write_register(0x00, 0x01);
    dev.write_register(0x02, 0x01);
    dev.write_register(0x04, 0x80);
    dev.run_cycles(10_000);

    let m = measure(&mut dev);
    let hz = m.frequency_hz(CLOCK_HZ);
    assert!((2970.0..=3030.0).contains(&hz), "carrier {} Hz", hz);
}

#[test]
fn test_pwm_frequency_independent_of_duty() {
    let mut dev = booted();
    dev.write_register(0x02, 0x01);
    let mut periods = Vec::new();
    for duty in [0x01, 0x40, 0x80, 0xCF, 0xFE] {
        dev.write_register(0x04, duty);
        dev.run_cycles(10_000);
        periods.push(measure(&mut dev).period_cycles);
    }
    assert!(periods.iter().all(|&p| p == periods[0]), "{:?}", periods);
}

#[test]
fn test_pwm_duty_range() {
    let mut dev = booted();
    dev.write_register(0x00, 0x01);
    dev.write_register(0x02, 0x01);
    dev.write_register(0x04, 0x80);
    dev.run_cycles(10_000);
    let duty = measure(&mut dev).duty_percent();
    assert!((49.0..=51.0).contains(&duty), "duty {}%", duty);

    dev.write_register(0x04, 0x00);
    dev.run_cycles(10_000);
    for _ in 0..10_000 {
        dev.tick();
        assert_eq!(dev.outputs().uio_out & 1, 0);
    }

    dev.write_register(0x04, 0xFF);
    dev.run_cycles(10_000);
    for _ in 0..10_000 {
        dev.tick();
        assert_eq!(dev.outputs().uio_out & 1, 1);
    }
}

#[test]
fn test_duty_extremes_settle_within_one_period() {
    let period = CARRIER_PERIOD_CYCLES as u64;
    let mut dev = booted();
    dev.write_register(0x02, 0x01);
    dev.write_register(0x04, 0x80);
    dev.run_cycles(2 * period);

    for (duty, level) in [(0x00, 0), (0xFF, 1)] {
        dev.write_register(0x04, duty);
        dev.run_cycles(period);
        for _ in 0..2 * period {
            dev.tick();
            assert_eq!(dev.outputs().uio_out & 1, level, "duty 0x{:02X}", duty);
        }
    }
}

#[test]
fn test_mask_covers_both_buses() {
    let mut dev = booted();
    dev.write_register(0x00, 0xF0);
    dev.write_register(0x01, 0x0F);
    dev.write_register(0x02, 0x81);
    dev.write_register(0x04, 0xFF);
    dev.run_cycles(10_000);
    assert_eq!(dev.outputs().uo_out, 0xF1);
    assert_eq!(dev.outputs().uio_out, 0x8F);

    dev.write_register(0x04, 0x00);
    dev.run_cycles(10_000);
    assert_eq!(dev.outputs().uo_out, 0x70);
    assert_eq!(dev.outputs().uio_out, 0x0E);
}

#[test]
fn test_trace_agrees_with_live_measurement() {
    let mut dev = booted();
    dev.write_register(0x02, 0x01);
    dev.write_register(0x04, 0x40);
    dev.trace.enabled = true;
    dev.run_cycles(20_000);

    let m = dev.trace.measure(Bus::Secondary, 0).unwrap();
    assert_eq!(m.period_cycles, CARRIER_PERIOD_CYCLES as u64);
    assert_eq!(m.high_cycles, 0x40 * 13);
    assert_eq!(dev.trace.measure(Bus::Primary, 0), Some(m));
}
