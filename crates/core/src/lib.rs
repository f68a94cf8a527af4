//! # spi-pwm-core
//!
//! Cycle-accurate model of a small SPI-controlled output peripheral.
//!
//! The peripheral runs from a 10 MHz system clock. An external controller
//! writes 16-bit frames over a write-only SPI link (nCS/COPI/SCLK on
//! `ui_in`); decoded writes land in a four-register bank that drives two
//! 8-bit output buses. Each output bit either reflects its static register
//! bit or, when enabled in the PWM mask, a ~3 kHz PWM carrier whose duty is
//! set by the duty register.
//!
//! ## Architecture
//!
//! - [`Peripheral`]: Top-level model that wires pins, decoder, registers and PWM
//! - [`pins`]: Input/output pin layout
//! - [`peripherals`]: [`SpiDecoder`], [`RegisterBank`], [`PwmGenerator`]
//! - [`host`]: Bit-banged SPI controller used to drive the model
//! - [`trace`]: Pin-change recorder and PWM period measurement
//! - [`vcd`]: Value Change Dump export of a trace
//! - [`savestate`]: Compressed save/restore of the full model state
//! - [`debugger`]: Register dump, write watchpoints, frame history
//!
//! ## Cycle ordering
//!
//! Within one [`Peripheral::tick`] the PWM carrier advances and the output
//! latch is recomputed from the register bank *before* the decoder runs. A
//! write committed on cycle N therefore reaches the pins on cycle N+1, and
//! never before the 16th bit has been sampled.

pub mod pins;
pub mod peripherals;
pub mod host;
pub mod trace;
pub mod vcd;
pub mod savestate;
pub mod debugger;

use serde::{Deserialize, Serialize};

pub use host::{HostTiming, SpiHost};
pub use peripherals::{
    Direction, PwmGenerator, Register, RegisterBank, SpiDecoder, SpiEvent, Transaction, WriteOutcome,
};
pub use pins::{Bus, InputPins, OutputPins};
pub use trace::{MeasureError, PwmMeasurement, Trace};

use debugger::{FrameOutcome, FrameRecord};

/// System clock frequency: 10 MHz
pub const CLOCK_HZ: u32 = 10_000_000;
/// `uio_oe` while running: the bidirectional bus is always an output
pub const UIO_OE_OUTPUT: u8 = 0xFF;
/// Default reset pulse, in cycles
pub const RESET_CYCLES: u64 = 5;

/// Frame counters since power-up. Kept across resets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Complete 16-bit frames (read and write)
    pub frames: u64,
    /// Writes committed to a mapped register
    pub writes: u64,
    /// Writes to unmapped addresses
    pub unmapped_writes: u64,
    /// Read frames
    pub reads: u64,
    /// Frames cut short by nCS
    pub aborted: u64,
    /// Reset assertions seen on `rst_n`
    pub resets: u64,
}

/// The peripheral with its pins.
pub struct Peripheral {
    /// Input pins, sampled on every tick
    pub pins: InputPins,
    outputs: OutputPins,
    pub regs: RegisterBank,
    pub spi: SpiDecoder,
    pub pwm: PwmGenerator,
    cycle: u64,
    pub stats: Stats,
    in_reset: bool,
    /// Pin-change recorder (disabled by default)
    pub trace: Trace,
    pub debugger: debugger::Debugger,
}

impl Peripheral {
    /// Create a peripheral in its reset state with idle input pins.
    pub fn new() -> Self {
        Peripheral {
            pins: InputPins::idle(),
            outputs: OutputPins { uo_out: 0, uio_out: 0, uio_oe: UIO_OE_OUTPUT },
            regs: RegisterBank::new(),
            spi: SpiDecoder::new(),
            pwm: PwmGenerator::new(),
            cycle: 0,
            stats: Stats::default(),
            in_reset: false,
            trace: Trace::new(),
            debugger: debugger::Debugger::new(),
        }
    }

    /// Zero all peripheral state immediately, truncating any frame in flight.
    ///
    /// Pins, the cycle counter, statistics, trace and debugger are kept.
    pub fn reset(&mut self) {
        if self.spi.busy() {
            log::debug!("reset truncates frame in flight at cycle {}", self.cycle);
        }
        self.regs.reset();
        self.spi.reset(&self.pins);
        self.pwm.reset();
        self.outputs = OutputPins::default();
    }

    /// Hold `rst_n` low for `cycles`, then release it for another `cycles`.
    pub fn power_on_reset(&mut self, cycles: u64) {
        self.pins = InputPins { rst_n: false, ..InputPins::idle() };
        self.run_cycles(cycles);
        self.pins.rst_n = true;
        self.run_cycles(cycles);
        log::debug!("power-on reset done at cycle {}", self.cycle);
    }

    /// Advance one system clock.
    pub fn tick(&mut self) {
        self.cycle += 1;

        if !self.pins.rst_n {
            if !self.in_reset {
                self.stats.resets += 1;
                log::debug!("rst_n asserted at cycle {}", self.cycle);
            }
            self.in_reset = true;
            self.reset();
            self.record();
            return;
        }
        self.in_reset = false;
        if !self.pins.ena {
            self.record();
            return;
        }

        // Generator and output latch see the bank as it stood at the start
        // of this cycle; a commit below shows up on the next one.
        self.pwm.clock(self.regs.duty_cycle());
        self.outputs = OutputPins {
            uo_out: self.pwm.drive(self.regs.output_a(), self.regs.pwm_enable()),
            uio_out: self.pwm.drive(self.regs.output_b(), self.regs.pwm_enable()),
            uio_oe: UIO_OE_OUTPUT,
        };

        if let Some(event) = self.spi.clock(&self.pins) {
            self.handle_spi(event);
        }

        self.record();
    }

    #[inline]
    fn record(&mut self) {
        if self.trace.enabled {
            self.trace.record(self.cycle, self.pins, self.outputs);
        }
    }

    fn handle_spi(&mut self, event: SpiEvent) {
        let (transaction, outcome) = match event {
            SpiEvent::Aborted { bits } => {
                self.stats.aborted += 1;
                log::debug!("frame aborted after {} bits at cycle {}", bits, self.cycle);
                (None, FrameOutcome::Aborted { bits })
            }
            SpiEvent::Frame(tx) => {
                self.stats.frames += 1;
                (Some(tx), self.commit(tx))
            }
        };
        self.debugger.log_frame(FrameRecord { cycle: self.cycle, transaction, outcome });
    }

    fn commit(&mut self, tx: Transaction) -> FrameOutcome {
        match tx.direction {
            Direction::Read => {
                self.stats.reads += 1;
                log::trace!("read frame 0x{:02X} ignored (no read path)", tx.address);
                FrameOutcome::Read
            }
            Direction::Write => {
                if !self.debugger.watchpoints.is_empty() {
                    let old = self.regs.read(tx.address);
                    self.debugger.check_write(self.cycle, tx.address, old, tx.data);
                }
                match self.regs.write(tx.address, tx.data) {
                    WriteOutcome::Written { register, old, new } => {
                        self.stats.writes += 1;
                        log::debug!("{} <- 0x{:02X} (was 0x{:02X}) at cycle {}",
                            register.name(), new, old, self.cycle);
                        FrameOutcome::Written { register, old }
                    }
                    WriteOutcome::Unmapped => {
                        self.stats.unmapped_writes += 1;
                        log::trace!("write to unmapped 0x{:02X} ignored", tx.address);
                        FrameOutcome::Unmapped
                    }
                }
            }
        }
    }

    /// Advance `n` system clocks.
    pub fn run_cycles(&mut self, n: u64) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Run until a watchpoint fires or `max_cycles` elapse.
    pub fn run_until_watch(&mut self, max_cycles: u64) -> Option<debugger::WatchHit> {
        for _ in 0..max_cycles {
            self.tick();
            if let Some(hit) = self.debugger.take_hit() {
                return Some(hit);
            }
        }
        None
    }

    /// Cycles since the model was created.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn outputs(&self) -> OutputPins {
        self.outputs
    }

    /// Write a register over SPI with default host timing.
    pub fn write_register(&mut self, address: u8, data: u8) {
        SpiHost::new().write(self, address, data);
    }

    /// Send a read frame with default host timing. It has no effect on the
    /// peripheral; there is no read-data path.
    pub fn read_transaction(&mut self, address: u8, data: u8) {
        SpiHost::new().read(self, address, data);
    }

    /// Run until `bit` of `bus` makes the requested transition.
    ///
    /// Returns the cycle on which the new level first appears.
    pub fn wait_for_edge(&mut self, bus: Bus, bit: u8, rising: bool, timeout: u64) -> Result<u64, MeasureError> {
        if bit > 7 {
            return Err(MeasureError::BadBit(bit));
        }
        let mut prev = self.outputs.bit(bus, bit);
        for _ in 0..timeout {
            self.tick();
            let level = self.outputs.bit(bus, bit);
            if level != prev && level == rising {
                return Ok(self.cycle);
            }
            prev = level;
        }
        Err(MeasureError::Timeout {
            bus: bus.name(),
            bit,
            edge: if rising { "rising" } else { "falling" },
            cycles: timeout,
        })
    }

    /// Measure one PWM period on `bit` of `bus`: rising, falling, rising.
    /// `timeout` applies to each edge.
    pub fn measure_pwm(&mut self, bus: Bus, bit: u8, timeout: u64) -> Result<PwmMeasurement, MeasureError> {
        let rise = self.wait_for_edge(bus, bit, true, timeout)?;
        let fall = self.wait_for_edge(bus, bit, false, timeout)?;
        let next = self.wait_for_edge(bus, bit, true, timeout)?;
        Ok(PwmMeasurement::from_edges(rise, fall, next))
    }

    pub fn dump_regs(&self) -> String {
        let mut s = debugger::dump_regs(&self.regs);
        s.push_str(&format!("  uo_out=0x{:02X} uio_out=0x{:02X} cycle={} pwm[{}] spi={:?}\n",
            self.outputs.uo_out, self.outputs.uio_out, self.cycle, self.pwm.dbg_info(), self.spi.state()));
        s
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> savestate::SaveState {
        savestate::SaveState {
            cycle: self.cycle,
            pins: self.pins,
            outputs: self.outputs,
            regs: self.regs,
            spi: self.spi,
            pwm: self.pwm,
            stats: self.stats,
            in_reset: self.in_reset,
        }
    }

    /// Restore state from save state. Trace and debugger are left alone.
    pub fn load_state(&mut self, s: &savestate::SaveState) {
        self.cycle = s.cycle;
        self.pins = s.pins;
        self.outputs = s.outputs;
        self.regs = s.regs;
        self.spi = s.spi;
        self.pwm = s.pwm;
        self.stats = s.stats;
        self.in_reset = s.in_reset;
    }
}

impl Default for Peripheral {
    fn default() -> Self {
        Self::new()
    }
}
