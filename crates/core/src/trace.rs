//! Pin trace and PWM waveform measurement.
//!
//! The trace records a [`PinSample`] every time any input or output pin
//! changes, stamped with the system-clock cycle. Output bits can then be
//! reduced to edge lists and measured the way a bench logic analyser would:
//! rising edge, falling edge, next rising edge.

use thiserror::Error;

use crate::pins::{Bus, InputPins, OutputPins};

/// Default number of samples kept before recording stops.
pub const DEFAULT_TRACE_CAPACITY: usize = 1 << 20;

/// Pin state after a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinSample {
    pub cycle: u64,
    pub inputs: InputPins,
    pub outputs: OutputPins,
}

/// A single output-bit transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Cycle on which the new level first appeared on the pin
    pub cycle: u64,
    /// Level after the transition (true = high)
    pub level: bool,
}

/// One measured PWM period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmMeasurement {
    /// Rising edge to next rising edge
    pub period_cycles: u64,
    /// Rising edge to falling edge
    pub high_cycles: u64,
}

impl PwmMeasurement {
    /// Build from the cycles of a rising, falling and following rising edge.
    pub fn from_edges(rise: u64, fall: u64, next_rise: u64) -> Self {
        PwmMeasurement {
            period_cycles: next_rise.saturating_sub(rise),
            high_cycles: fall.saturating_sub(rise),
        }
    }

    pub fn frequency_hz(&self, clock_hz: u32) -> f64 {
        if self.period_cycles == 0 { return 0.0; }
        clock_hz as f64 / self.period_cycles as f64
    }

    pub fn period_ns(&self, clock_hz: u32) -> f64 {
        self.period_cycles as f64 * 1e9 / clock_hz as f64
    }

    /// High time as a percentage of the period.
    pub fn duty_percent(&self) -> f64 {
        if self.period_cycles == 0 { return 0.0; }
        self.high_cycles as f64 * 100.0 / self.period_cycles as f64
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum MeasureError {
    #[error("no {edge} edge on {bus}[{bit}] within {cycles} cycles")]
    Timeout { bus: &'static str, bit: u8, edge: &'static str, cycles: u64 },
    #[error("bit {0} is outside the 8-bit bus")]
    BadBit(u8),
}

/// Change-only pin recorder.
#[derive(Debug)]
pub struct Trace {
    /// Recording switch; the peripheral skips [`Trace::record`] when false
    pub enabled: bool,
    samples: Vec<PinSample>,
    capacity: usize,
    /// Changes not recorded because the trace was full
    dropped: u64,
}

impl Trace {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TRACE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Trace { enabled: false, samples: Vec::new(), capacity, dropped: 0 }
    }

    /// Record the pins if anything changed since the last sample.
    pub fn record(&mut self, cycle: u64, inputs: InputPins, outputs: OutputPins) {
        if let Some(last) = self.samples.last() {
            if last.inputs == inputs && last.outputs == outputs {
                return;
            }
        }
        if self.samples.len() >= self.capacity {
            if self.dropped == 0 {
                log::warn!("pin trace full at {} samples, recording stopped", self.capacity);
            }
            self.dropped += 1;
            return;
        }
        self.samples.push(PinSample { cycle, inputs, outputs });
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.dropped = 0;
    }

    pub fn samples(&self) -> &[PinSample] { &self.samples }
    pub fn len(&self) -> usize { self.samples.len() }
    pub fn is_empty(&self) -> bool { self.samples.is_empty() }
    pub fn dropped(&self) -> u64 { self.dropped }

    /// Transitions of one output bit. The first sample only sets the
    /// starting level and is not an edge.
    pub fn edges(&self, bus: Bus, bit: u8) -> Vec<Edge> {
        let mut edges = Vec::new();
        let mut level: Option<bool> = None;
        for s in &self.samples {
            let l = s.outputs.bit(bus, bit);
            match level {
                Some(prev) if prev != l => edges.push(Edge { cycle: s.cycle, level: l }),
                _ => {}
            }
            level = Some(l);
        }
        edges
    }

    /// Measure the first complete period found in the trace.
    pub fn measure(&self, bus: Bus, bit: u8) -> Option<PwmMeasurement> {
        let edges = self.edges(bus, bit);
        let first_rise = edges.iter().position(|e| e.level)?;
        let rest = &edges[first_rise..];
        match rest {
            [rise, fall, next, ..] if !fall.level && next.level => {
                Some(PwmMeasurement::from_edges(rise.cycle, fall.cycle, next.cycle))
            }
            _ => None,
        }
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}
