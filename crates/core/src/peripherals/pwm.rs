//! PWM generator.
//!
//! A single free-running carrier shared by every channel: the system clock
//! is divided by [`PWM_PRESCALE`] and drives an 8-bit step counter. One
//! carrier period is `PWM_PRESCALE * PWM_STEPS` system clocks:
//!
//! f_pwm = f_clk / (13 * 256) = 10 MHz / 3328 ≈ 3004.8 Hz
//!
//! The duty threshold is latched from the duty register at the start of each
//! period, so a new duty value never cuts a period short. Duty 0xFF maps to
//! a threshold one past the last step, which keeps the output high across
//! the wrap.

use serde::{Deserialize, Serialize};

/// System clocks per counter step
pub const PWM_PRESCALE: u32 = 13;
/// Counter steps per carrier period
pub const PWM_STEPS: u32 = 256;
/// System clocks per carrier period
pub const CARRIER_PERIOD_CYCLES: u32 = PWM_PRESCALE * PWM_STEPS;
/// Threshold that holds the output high for the whole period
pub const THRESHOLD_FULL: u16 = PWM_STEPS as u16;

/// Map a duty register value to counter steps.
pub fn duty_threshold(duty: u8) -> u16 {
    if duty == 0xFF { THRESHOLD_FULL } else { duty as u16 }
}

/// Source of one output bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelMode {
    /// Register bit passed straight through
    Static(bool),
    /// Carrier output
    Pwm,
}

impl ChannelMode {
    /// Mode of `bit` given its bus's static register and the enable mask.
    pub fn select(static_value: u8, mask: u8, bit: u8) -> Self {
        if mask & (1 << bit) != 0 {
            ChannelMode::Pwm
        } else {
            ChannelMode::Static(static_value & (1 << bit) != 0)
        }
    }

    #[inline]
    pub fn level(self, carrier: bool) -> bool {
        match self {
            ChannelMode::Static(v) => v,
            ChannelMode::Pwm => carrier,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PwmGenerator {
    /// Prescaler phase, 0..PWM_PRESCALE
    prescale: u32,
    /// Step counter, 0..PWM_STEPS
    counter: u16,
    /// Active threshold for the current period
    threshold: u16,
    /// Completed carrier periods since reset
    periods: u64,
}

impl PwmGenerator {
    pub fn new() -> Self {
        PwmGenerator::default()
    }

    pub fn reset(&mut self) {
        *self = PwmGenerator::new();
    }

    /// Advance one system clock. `duty` is the current duty register.
    pub fn clock(&mut self, duty: u8) {
        self.prescale += 1;
        if self.prescale == PWM_PRESCALE {
            self.prescale = 0;
            self.counter += 1;
            if self.counter as u32 == PWM_STEPS {
                self.counter = 0;
                self.periods += 1;
            }
        }
        if self.prescale == 0 && self.counter == 0 {
            self.threshold = duty_threshold(duty);
        }
    }

    /// Carrier level for the current step.
    #[inline]
    pub fn level(&self) -> bool {
        self.counter < self.threshold
    }

    /// Compose a bus from its static register and the enable mask.
    pub fn drive(&self, static_value: u8, mask: u8) -> u8 {
        let carrier = self.level();
        (0..8u8).fold(0, |acc, bit| {
            let mode = ChannelMode::select(static_value, mask, bit);
            acc | ((mode.level(carrier) as u8) << bit)
        })
    }

    pub fn counter(&self) -> u16 { self.counter }
    pub fn threshold(&self) -> u16 { self.threshold }
    pub fn periods(&self) -> u64 { self.periods }

    /// Carrier frequency for a given system clock.
    pub fn carrier_hz(clock_hz: u32) -> f64 {
        clock_hz as f64 / CARRIER_PERIOD_CYCLES as f64
    }

    pub fn dbg_info(&self) -> String {
        format!("cnt={} ps={} thr={} periods={}",
            self.counter, self.prescale, self.threshold, self.periods)
    }
}
