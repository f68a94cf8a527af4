//! Peripheral building blocks.
//!
//! - [`SpiDecoder`]: SPI peripheral that turns nCS/COPI/SCLK into 16-bit frames
//! - [`RegisterBank`]: the four mapped configuration registers
//! - [`PwmGenerator`]: shared carrier and per-bit static/PWM output selection

mod spi;
mod regs;
mod pwm;

pub use spi::{Direction, DecoderState, SpiDecoder, SpiEvent, Synchronizer, Transaction, FRAME_BITS};
pub use regs::{Register, RegisterBank, WriteOutcome};
pub use pwm::{
    duty_threshold, ChannelMode, PwmGenerator, CARRIER_PERIOD_CYCLES, PWM_PRESCALE, PWM_STEPS,
    THRESHOLD_FULL,
};
