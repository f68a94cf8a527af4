//! Pin-level interface of the peripheral.
//!
//! Inputs are sampled on every system clock. The dedicated input byte
//! (`ui_in`) carries the serial control lines:
//!
//! ```text
//!  bit   7   6   5   4   3    2     1     0
//!       --- --- --- --- ---  nCS  COPI  SCLK
//! ```
//!
//! Outputs are two 8-bit buses: the primary bus (`uo_out`) and the
//! bidirectional bus (`uio_out`), which this design always drives as outputs.

use serde::{Deserialize, Serialize};

/// SPI clock bit in `ui_in`
pub const PIN_SCLK: u8 = 0;
/// SPI controller-out/peripheral-in data bit in `ui_in`
pub const PIN_COPI: u8 = 1;
/// SPI chip select bit in `ui_in` (active low)
pub const PIN_NCS: u8 = 2;

/// Input pins as seen by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPins {
    /// Dedicated input byte
    pub ui_in: u8,
    /// Global enable
    pub ena: bool,
    /// Reset (active low)
    pub rst_n: bool,
}

impl InputPins {
    /// Enabled, out of reset, chip select deasserted, SCLK and COPI low.
    pub fn idle() -> Self {
        InputPins { ui_in: 1 << PIN_NCS, ena: true, rst_n: true }
    }

    /// Pack the three serial lines into a `ui_in` value.
    pub fn spi_byte(ncs: bool, copi: bool, sclk: bool) -> u8 {
        ((ncs as u8) << PIN_NCS) | ((copi as u8) << PIN_COPI) | ((sclk as u8) << PIN_SCLK)
    }

    /// Drive the serial lines, leaving the unused `ui_in` bits untouched.
    pub fn set_spi(&mut self, ncs: bool, copi: bool, sclk: bool) {
        let mask = (1 << PIN_NCS) | (1 << PIN_COPI) | (1 << PIN_SCLK);
        self.ui_in = (self.ui_in & !mask) | Self::spi_byte(ncs, copi, sclk);
    }

    pub fn sclk(&self) -> bool { self.ui_in & (1 << PIN_SCLK) != 0 }
    pub fn copi(&self) -> bool { self.ui_in & (1 << PIN_COPI) != 0 }
    pub fn ncs(&self) -> bool { self.ui_in & (1 << PIN_NCS) != 0 }
}

impl Default for InputPins {
    fn default() -> Self {
        Self::idle()
    }
}

/// Output bus selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bus {
    /// `uo_out`, static value from register 0x00
    Primary,
    /// `uio_out`, static value from register 0x01
    Secondary,
}

impl Bus {
    pub fn name(self) -> &'static str {
        match self {
            Bus::Primary => "uo_out",
            Bus::Secondary => "uio_out",
        }
    }
}

/// Latched output pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutputPins {
    pub uo_out: u8,
    pub uio_out: u8,
    /// Direction of the bidirectional bus (1 = output)
    pub uio_oe: u8,
}

impl OutputPins {
    pub fn bus(&self, bus: Bus) -> u8 {
        match bus {
            Bus::Primary => self.uo_out,
            Bus::Secondary => self.uio_out,
        }
    }

    /// Level of one bit of a bus. Bits above 7 read as low.
    pub fn bit(&self, bus: Bus, bit: u8) -> bool {
        bit < 8 && self.bus(bus) & (1 << bit) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_pins() {
        let p = InputPins::idle();
        assert!(p.ncs());
        assert!(!p.copi());
        assert!(!p.sclk());
        assert!(p.ena && p.rst_n);
        assert_eq!(p.ui_in, 0b0000_0100);
    }

    #[test]
    fn test_set_spi_preserves_unused_bits() {
        let mut p = InputPins::idle();
        p.ui_in |= 0xF0;
        p.set_spi(false, true, true);
        assert_eq!(p.ui_in, 0xF0 | 0b011);
        assert!(!p.ncs());
        assert!(p.copi() && p.sclk());
    }

    #[test]
    fn test_output_bits() {
        let o = OutputPins { uo_out: 0xF0, uio_out: 0x01, uio_oe: 0xFF };
        assert!(o.bit(Bus::Primary, 7));
        assert!(!o.bit(Bus::Primary, 0));
        assert!(o.bit(Bus::Secondary, 0));
        assert!(!o.bit(Bus::Secondary, 9));
        assert_eq!(o.bus(Bus::Secondary), 0x01);
    }
}
