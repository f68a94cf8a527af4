//! Scripted stimulus for headless runs.
//!
//! A scenario is a JSON document with optional host timing and a list of
//! steps, each tagged with `op`:
//!
//! ```json
//! { "host": { "half_period_cycles": 51 },
//!   "steps": [
//!     { "op": "reset" },
//!     { "op": "write", "address": 0, "data": 240 },
//!     { "op": "expect", "bus": "primary", "value": 240 },
//!     { "op": "measure", "bus": "secondary", "min_hz": 2970.0, "max_hz": 3030.0 }
//! ] }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use spi_pwm_core::peripherals::FRAME_BITS;
use spi_pwm_core::{Bus, HostTiming, Peripheral, SpiHost, Transaction, CLOCK_HZ, RESET_CYCLES};

/// Per-edge timeout used by `measure` steps.
const MEASURE_TIMEOUT: u64 = 20_000;

fn default_reset_cycles() -> u64 {
    RESET_CYCLES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Hold rst_n low, then release, `cycles` each
    Reset {
        #[serde(default = "default_reset_cycles")]
        cycles: u64,
    },
    Write { address: u8, data: u8 },
    Read {
        address: u8,
        #[serde(default)]
        data: u8,
    },
    /// Send only the first `bits` bits (under 16) of a write frame
    Abort { address: u8, data: u8, bits: u8 },
    Wait { cycles: u64 },
    /// Compare a whole output bus
    Expect { bus: Bus, value: u8 },
    /// Measure one PWM period and check it against optional bounds
    Measure {
        bus: Bus,
        #[serde(default)]
        bit: u8,
        min_hz: Option<f64>,
        max_hz: Option<f64>,
        min_duty: Option<f64>,
        max_duty: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: HostTiming,
    pub steps: Vec<Step>,
}

/// Counts reported at the end of a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct Report {
    pub steps: usize,
    pub checks: usize,
}

fn check(what: &str, value: f64, min: Option<f64>, max: Option<f64>) -> Result<()> {
    if let Some(lo) = min {
        if value < lo {
            bail!("{} {:.2} below minimum {:.2}", what, value, lo);
        }
    }
    if let Some(hi) = max {
        if value > hi {
            bail!("{} {:.2} above maximum {:.2}", what, value, hi);
        }
    }
    Ok(())
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(text)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Reject host timing that cannot clock a frame.
    pub fn validate(&self) -> Result<()> {
        if self.host.half_period_cycles == 0 {
            bail!("host.half_period_cycles must be at least 1");
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The bench sequence: static writes, ignored frames, duty sweep, then a
    /// 50% carrier measurement and the 0% / 100% extremes.
    pub fn builtin() -> Self {
        use Step::*;
        let steps = vec![
            Reset { cycles: RESET_CYCLES },
            Write { address: 0x00, data: 0xF0 },
            Expect { bus: Bus::Primary, value: 0xF0 },
            Wait { cycles: 1000 },
            Write { address: 0x01, data: 0xCC },
            Expect { bus: Bus::Secondary, value: 0xCC },
            Wait { cycles: 100 },
            Write { address: 0x30, data: 0xAA },
            Wait { cycles: 100 },
            Read { address: 0x30, data: 0xBE },
            Expect { bus: Bus::Primary, value: 0xF0 },
            Wait { cycles: 100 },
            Read { address: 0x41, data: 0xEF },
            Wait { cycles: 100 },
            Write { address: 0x02, data: 0xFF },
            Wait { cycles: 100 },
            Write { address: 0x04, data: 0xCF },
            Wait { cycles: 30_000 },
            Write { address: 0x04, data: 0xFF },
            Wait { cycles: 30_000 },
            Write { address: 0x04, data: 0x00 },
            Wait { cycles: 30_000 },
            Write { address: 0x04, data: 0x01 },
            Wait { cycles: 30_000 },
            Reset { cycles: RESET_CYCLES },
            Write { address: 0x00, data: 0x01 },
            Write { address: 0x02, data: 0x01 },
            Write { address: 0x04, data: 0x80 },
            Wait { cycles: 10_000 },
            Measure {
                bus: Bus::Secondary,
                bit: 0,
                min_hz: Some(2970.0),
                max_hz: Some(3030.0),
                min_duty: Some(45.0),
                max_duty: Some(55.0),
            },
            Write { address: 0x04, data: 0x00 },
            Wait { cycles: 10_000 },
            Expect { bus: Bus::Secondary, value: 0x00 },
            Write { address: 0x04, data: 0xFF },
            Wait { cycles: 10_000 },
            Expect { bus: Bus::Secondary, value: 0x01 },
        ];
        Scenario { name: "bench".into(), host: HostTiming::default(), steps }
    }

    /// Run every step, stopping at the first failed expectation.
    pub fn run(&self, dev: &mut Peripheral) -> Result<Report> {
        self.validate()?;
        let host = SpiHost::with_timing(self.host);
        let mut report = Report::default();
        if !self.name.is_empty() {
            log::info!("scenario '{}': {} steps", self.name, self.steps.len());
        }

        for (i, step) in self.steps.iter().enumerate() {
            report.steps += 1;
            log::debug!("step {} @{}: {:?}", i, dev.cycle(), step);
            match *step {
                Step::Reset { cycles } => dev.power_on_reset(cycles),
                Step::Write { address, data } => host.write(dev, address, data),
                Step::Read { address, data } => host.read(dev, address, data),
                Step::Abort { address, data, bits } => {
                    if bits >= FRAME_BITS {
                        bail!("step {}: abort after {} bits would complete the frame (max {})",
                            i, bits, FRAME_BITS - 1);
                    }
                    host.send_truncated(dev, Transaction::write(address, data), bits)
                }
                Step::Wait { cycles } => dev.run_cycles(cycles),
                Step::Expect { bus, value } => {
                    report.checks += 1;
                    let got = dev.outputs().bus(bus);
                    if got != value {
                        bail!("step {}: expected {}=0x{:02X}, got 0x{:02X} at cycle {}",
                            i, bus.name(), value, got, dev.cycle());
                    }
                    println!("  @{:>9}  {:<7} = 0x{:02X}  ok", dev.cycle(), bus.name(), got);
                }
                Step::Measure { bus, bit, min_hz, max_hz, min_duty, max_duty } => {
                    report.checks += 1;
                    let m = dev.measure_pwm(bus, bit, MEASURE_TIMEOUT)
                        .with_context(|| format!("step {}", i))?;
                    let hz = m.frequency_hz(CLOCK_HZ);
                    let duty = m.duty_percent();
                    println!("  @{:>9}  {}[{}] period {:.0} ns ({:.1} Hz), high {} cyc, duty {:.2}%",
                        dev.cycle(), bus.name(), bit, m.period_ns(CLOCK_HZ), hz, m.high_cycles, duty);
                    check("frequency", hz, min_hz, max_hz).with_context(|| format!("step {}", i))?;
                    check("duty", duty, min_duty, max_duty).with_context(|| format!("step {}", i))?;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scenario_passes() {
        let mut dev = Peripheral::new();
        let report = Scenario::builtin().run(&mut dev).unwrap();
        assert_eq!(report.checks, 6);
        assert_eq!(dev.outputs().uio_out, 0x01);
    }

    #[test]
    fn test_parse_with_defaults() {
        let json = r#"{ "steps": [
            { "op": "reset" },
            { "op": "write", "address": 4, "data": 128 },
            { "op": "read", "address": 65 },
            { "op": "measure", "bus": "secondary", "min_hz": 2970.0 }
        ] }"#;
        let s = Scenario::from_json(json).unwrap();
        assert_eq!(s.host, HostTiming::default());
        assert_eq!(s.steps[0], Step::Reset { cycles: RESET_CYCLES });
        assert_eq!(s.steps[2], Step::Read { address: 0x41, data: 0 });
        assert!(matches!(s.steps[3], Step::Measure { bit: 0, max_hz: None, .. }));
    }

    #[test]
    fn test_failed_expectation_stops_run() {
        let s = Scenario {
            name: String::new(),
            host: HostTiming { half_period_cycles: 4, settle_cycles: 20 },
            steps: vec![
                Step::Reset { cycles: 2 },
                Step::Abort { address: 0x00, data: 0xFF, bits: 12 },
                Step::Expect { bus: Bus::Primary, value: 0xFF },
                Step::Wait { cycles: 1 },
            ],
        };
        let mut dev = Peripheral::new();
        let err = s.run(&mut dev).unwrap_err();
        assert!(err.to_string().contains("expected uo_out=0xFF"), "{}", err);
    }

    #[test]
    fn test_abort_must_stop_short_of_full_frame() {
        let s = Scenario {
            name: String::new(),
            host: HostTiming { half_period_cycles: 4, settle_cycles: 20 },
            steps: vec![Step::Abort { address: 0x00, data: 0xFF, bits: FRAME_BITS }],
        };
        let mut dev = Peripheral::new();
        let err = s.run(&mut dev).unwrap_err();
        assert!(err.to_string().contains("abort after 16 bits"), "{}", err);
        assert_eq!(dev.regs.output_a(), 0);
        assert_eq!(dev.stats.frames, 0);
    }

    #[test]
    fn test_zero_half_period_rejected() {
        let json = r#"{ "host": { "half_period_cycles": 0 }, "steps": [] }"#;
        let err = Scenario::from_json(json).unwrap_err();
        assert!(err.to_string().contains("half_period_cycles"), "{}", err);
        let s = Scenario {
            name: String::new(),
            host: HostTiming { half_period_cycles: 0, settle_cycles: 0 },
            steps: vec![Step::Write { address: 0x00, data: 0xFF }],
        };
        assert!(s.run(&mut Peripheral::new()).is_err());
    }

    #[test]
    fn test_builtin_json_round_trip() {
        let s = Scenario::builtin();
        let back: Scenario = serde_json::from_str(&s.to_json().unwrap()).unwrap();
        assert_eq!(back, s);
    }
}
