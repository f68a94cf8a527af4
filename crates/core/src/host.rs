//! Bit-banged SPI controller.
//!
//! Drives the peripheral's input pins the way an external controller would:
//!
//! ```text
//! nCS  ‾‾\_________________________ ... ______/‾‾‾‾‾‾‾‾
//! SCLK ____________/‾‾‾‾‾‾\______/ ... ‾‾‾‾‾\__________
//! COPI ----<  bit 15       >< bit 14  ... bit 0>-------
//!       1 cyc | half | half |
//! ```
//!
//! COPI changes while SCLK is low and is held through the high phase. After
//! the last bit nCS returns high and the host idles for `settle_cycles` so
//! the outputs can settle before anything is checked.

use serde::{Deserialize, Serialize};

use crate::peripherals::{Transaction, FRAME_BITS};
use crate::Peripheral;

/// Controller pacing, in system clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostTiming {
    /// Cycles per SCLK phase
    pub half_period_cycles: u32,
    /// Idle cycles after nCS is released
    pub settle_cycles: u32,
}

impl Default for HostTiming {
    /// Just over 5 µs per SCLK phase at 10 MHz and a 60 µs settle.
    fn default() -> Self {
        HostTiming { half_period_cycles: 51, settle_cycles: 600 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpiHost {
    pub timing: HostTiming,
}

impl SpiHost {
    pub fn new() -> Self {
        SpiHost::default()
    }

    pub fn with_timing(timing: HostTiming) -> Self {
        SpiHost { timing }
    }

    /// System clocks taken by one complete frame including settle time.
    pub fn frame_cycles(&self) -> u64 {
        1 + FRAME_BITS as u64 * 2 * self.timing.half_period_cycles as u64
            + self.timing.settle_cycles as u64
    }

    pub fn send(&self, dev: &mut Peripheral, tx: Transaction) {
        self.shift_out(dev, tx.to_frame(), FRAME_BITS);
    }

    pub fn write(&self, dev: &mut Peripheral, address: u8, data: u8) {
        self.send(dev, Transaction::write(address, data));
    }

    pub fn read(&self, dev: &mut Peripheral, address: u8, data: u8) {
        self.send(dev, Transaction::read(address, data));
    }

    /// Shift out only the first `bits` bits of a frame, then release nCS.
    pub fn send_truncated(&self, dev: &mut Peripheral, tx: Transaction, bits: u8) {
        self.shift_out(dev, tx.to_frame(), bits.min(FRAME_BITS));
    }

    fn shift_out(&self, dev: &mut Peripheral, frame: u16, bits: u8) {
        let half = self.timing.half_period_cycles as u64;

        dev.pins.set_spi(false, false, false);
        dev.run_cycles(1);

        for i in 0..bits {
            let bit = (frame >> (15 - i)) & 1 != 0;
            dev.pins.set_spi(false, bit, false);
            dev.run_cycles(half);
            dev.pins.set_spi(false, bit, true);
            dev.run_cycles(half);
        }

        dev.pins.set_spi(true, false, false);
        dev.run_cycles(self.timing.settle_cycles as u64);
    }
}
