//! SPI command decoder.
//!
//! Runs as a peripheral (SPI mode 0) on the system clock. SCLK, COPI and nCS
//! are asynchronous to the system clock, so each goes through a two-flop
//! synchroniser and edges are detected on the synchronised copies. COPI is
//! sampled on every synchronised SCLK rising edge while nCS is low.
//!
//! A frame is exactly 16 bits, MSB first:
//!
//! ```text
//!  15   14..8      7..0
//! R/W  address    data      (R/W = 1 for write)
//! ```
//!
//! The frame is reported once the 16th bit is in. Deasserting nCS earlier
//! throws the partial frame away.

use serde::{Deserialize, Serialize};

use crate::pins::InputPins;

/// Bits per frame
pub const FRAME_BITS: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Read,
    Write,
}

/// One decoded 16-bit command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub direction: Direction,
    /// 7-bit register address
    pub address: u8,
    pub data: u8,
}

impl Transaction {
    pub fn write(address: u8, data: u8) -> Self {
        Transaction { direction: Direction::Write, address: address & 0x7F, data }
    }

    pub fn read(address: u8, data: u8) -> Self {
        Transaction { direction: Direction::Read, address: address & 0x7F, data }
    }

    pub fn from_frame(frame: u16) -> Self {
        let direction = if frame & 0x8000 != 0 { Direction::Write } else { Direction::Read };
        Transaction {
            direction,
            address: ((frame >> 8) & 0x7F) as u8,
            data: (frame & 0xFF) as u8,
        }
    }

    /// Wire image, first bit transmitted in bit 15.
    pub fn to_frame(&self) -> u16 {
        let rw = match self.direction {
            Direction::Write => 0x8000,
            Direction::Read => 0,
        };
        rw | (((self.address & 0x7F) as u16) << 8) | self.data as u16
    }

    pub fn is_write(&self) -> bool {
        self.direction == Direction::Write
    }
}

/// Decoder output for one system clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiEvent {
    /// All 16 bits sampled with nCS still asserted
    Frame(Transaction),
    /// nCS deasserted after `bits` bits (1..=15)
    Aborted { bits: u8 },
}

/// Framing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoderState {
    /// Waiting for nCS to fall
    Idle,
    /// Shifting in bits
    Sampling { bits: u8, shift: u16 },
    /// Frame reported, ignoring SCLK until nCS rises
    Done,
}

/// Two-flop synchroniser with the previous synchronised level kept for
/// edge detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synchronizer {
    meta: bool,
    stable: bool,
    prev: bool,
}

impl Synchronizer {
    pub fn new(level: bool) -> Self {
        Synchronizer { meta: level, stable: level, prev: level }
    }

    #[inline]
    pub fn clock(&mut self, pin: bool) {
        self.prev = self.stable;
        self.stable = self.meta;
        self.meta = pin;
    }

    pub fn level(&self) -> bool { self.stable }
    pub fn rose(&self) -> bool { self.stable && !self.prev }
    pub fn fell(&self) -> bool { !self.stable && self.prev }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiDecoder {
    sclk: Synchronizer,
    copi: Synchronizer,
    ncs: Synchronizer,
    state: DecoderState,
}

impl SpiDecoder {
    pub fn new() -> Self {
        SpiDecoder {
            sclk: Synchronizer::new(false),
            copi: Synchronizer::new(false),
            ncs: Synchronizer::new(true),
            state: DecoderState::Idle,
        }
    }

    /// Return to `Idle` with the synchronisers settled on the current pin
    /// levels, so lines already low or high across a reset are not seen as
    /// edges afterwards.
    pub fn reset(&mut self, pins: &InputPins) {
        *self = SpiDecoder {
            sclk: Synchronizer::new(pins.sclk()),
            copi: Synchronizer::new(pins.copi()),
            ncs: Synchronizer::new(pins.ncs()),
            state: DecoderState::Idle,
        };
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// True while a frame is being shifted in.
    pub fn busy(&self) -> bool {
        matches!(self.state, DecoderState::Sampling { .. })
    }

    /// Advance one system clock.
    pub fn clock(&mut self, pins: &InputPins) -> Option<SpiEvent> {
        self.sclk.clock(pins.sclk());
        self.copi.clock(pins.copi());
        self.ncs.clock(pins.ncs());

        if self.ncs.level() {
            // Deselected: any partial frame is dropped
            let event = match self.state {
                DecoderState::Sampling { bits, .. } if bits > 0 => Some(SpiEvent::Aborted { bits }),
                _ => None,
            };
            self.state = DecoderState::Idle;
            return event;
        }

        if self.state == DecoderState::Idle && self.ncs.fell() {
            self.state = DecoderState::Sampling { bits: 0, shift: 0 };
        }

        if let DecoderState::Sampling { bits, shift } = self.state {
            if self.sclk.rose() {
                let shift = (shift << 1) | self.copi.level() as u16;
                let bits = bits + 1;
                if bits == FRAME_BITS {
                    self.state = DecoderState::Done;
                    return Some(SpiEvent::Frame(Transaction::from_frame(shift)));
                }
                self.state = DecoderState::Sampling { bits, shift };
            }
        }
        None
    }
}

impl Default for SpiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Clock `n` cycles with the given pins, collecting events.
    fn hold(dec: &mut SpiDecoder, pins: &InputPins, n: usize, events: &mut Vec<SpiEvent>) {
        for _ in 0..n {
            if let Some(e) = dec.clock(pins) {
                events.push(e);
            }
        }
    }

    fn shift_bits(dec: &mut SpiDecoder, frame: u16, bits: u8, events: &mut Vec<SpiEvent>) {
        let mut pins = InputPins::idle();
        pins.set_spi(false, false, false);
        hold(dec, &pins, 3, events);
        for i in 0..bits {
            let bit = (frame >> (15 - i)) & 1 != 0;
            pins.set_spi(false, bit, false);
            hold(dec, &pins, 4, events);
            pins.set_spi(false, bit, true);
            hold(dec, &pins, 4, events);
        }
        pins.set_spi(true, false, false);
        hold(dec, &pins, 4, events);
    }

    #[test]
    fn test_frame_layout() {
        let tx = Transaction::from_frame(0x80F0);
        assert_eq!(tx, Transaction::write(0x00, 0xF0));
        let tx = Transaction::from_frame(0x30BE);
        assert_eq!(tx.direction, Direction::Read);
        assert_eq!(tx.address, 0x30);
        assert_eq!(tx.data, 0xBE);
        assert_eq!(Transaction::write(0x04, 0x80).to_frame(), 0x8480);
        assert_eq!(Transaction::write(0xC1, 0x00).address, 0x41);
    }

    #[test]
    fn test_decode_write_frame() {
        let mut dec = SpiDecoder::new();
        let mut events = Vec::new();
        shift_bits(&mut dec, 0x81CC, 16, &mut events);
        assert_eq!(events, vec![SpiEvent::Frame(Transaction::write(0x01, 0xCC))]);
        assert_eq!(dec.state(), DecoderState::Idle);
    }

    #[test]
    fn test_truncated_frame_is_dropped() {
        let mut dec = SpiDecoder::new();
        let mut events = Vec::new();
        shift_bits(&mut dec, 0x8455, 9, &mut events);
        assert_eq!(events, vec![SpiEvent::Aborted { bits: 9 }]);
        // The next full frame still decodes from a clean start
        events.clear();
        shift_bits(&mut dec, 0x8455, 16, &mut events);
        assert_eq!(events, vec![SpiEvent::Frame(Transaction::write(0x04, 0x55))]);
    }

    #[test]
    fn test_extra_clocks_after_frame_ignored() {
        let mut dec = SpiDecoder::new();
        let mut events = Vec::new();
        let mut pins = InputPins::idle();
        pins.set_spi(false, false, false);
        hold(&mut dec, &pins, 3, &mut events);
        for i in 0..20u8 {
            let bit = i < 16 && (0xFFFFu16 >> (15 - i)) & 1 != 0;
            pins.set_spi(false, bit, false);
            hold(&mut dec, &pins, 4, &mut events);
            pins.set_spi(false, bit, true);
            hold(&mut dec, &pins, 4, &mut events);
        }
        assert_eq!(events, vec![SpiEvent::Frame(Transaction::write(0x7F, 0xFF))]);
        assert_eq!(dec.state(), DecoderState::Done);
    }

    #[test]
    fn test_sclk_without_select_ignored() {
        let mut dec = SpiDecoder::new();
        let mut events = Vec::new();
        let mut pins = InputPins::idle();
        for _ in 0..32 {
            pins.set_spi(true, true, true);
            hold(&mut dec, &pins, 3, &mut events);
            pins.set_spi(true, true, false);
            hold(&mut dec, &pins, 3, &mut events);
        }
        assert!(events.is_empty());
        assert!(!dec.busy());
    }

    #[test]
    fn test_reset_with_select_held_low() {
        let mut dec = SpiDecoder::new();
        let mut events = Vec::new();
        let mut pins = InputPins::idle();
        pins.set_spi(false, true, true);
        hold(&mut dec, &pins, 4, &mut events);
        assert!(dec.busy());

        dec.reset(&pins);
        assert_eq!(dec.state(), DecoderState::Idle);
        // Held-low select and high SCLK are levels, not edges
        for _ in 0..16 {
            pins.set_spi(false, true, false);
            hold(&mut dec, &pins, 4, &mut events);
            pins.set_spi(false, true, true);
            hold(&mut dec, &pins, 4, &mut events);
        }
        assert!(events.is_empty());
        assert_eq!(dec.state(), DecoderState::Idle);
    }

    #[test]
    fn test_synchronizer_latency() {
        let mut s = Synchronizer::new(false);
        s.clock(true);
        assert!(!s.level());
        s.clock(true);
        assert!(s.level() && s.rose());
        s.clock(true);
        assert!(s.level() && !s.rose());
    }
}
