//! Value Change Dump writer.
//!
//! Turns a [`Trace`] into an IEEE 1364 VCD file for a waveform viewer. The
//! trace already holds change-only samples, so each sample becomes one
//! timestamp with the signals that differ from the previous sample.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::pins::{InputPins, OutputPins};
use crate::trace::Trace;

/// (identifier, name, width)
const SIGNALS: [(&str, &str, u8); 8] = [
    ("!", "rst_n", 1),
    ("\"", "ena", 1),
    ("#", "sclk", 1),
    ("$", "copi", 1),
    ("%", "ncs", 1),
    ("&", "uo_out", 8),
    ("'", "uio_out", 8),
    ("(", "uio_oe", 8),
];

fn values(inputs: &InputPins, outputs: &OutputPins) -> [u8; 8] {
    [
        inputs.rst_n as u8,
        inputs.ena as u8,
        inputs.sclk() as u8,
        inputs.copi() as u8,
        inputs.ncs() as u8,
        outputs.uo_out,
        outputs.uio_out,
        outputs.uio_oe,
    ]
}

fn write_value<W: Write>(w: &mut W, id: &str, width: u8, v: u8) -> io::Result<()> {
    if width == 1 {
        writeln!(w, "{}{}", v & 1, id)
    } else {
        writeln!(w, "b{:08b} {}", v, id)
    }
}

/// Write the trace as VCD. Timestamps are in nanoseconds.
pub fn write_vcd<W: Write>(trace: &Trace, clock_hz: u32, mut w: W) -> io::Result<()> {
    let ns_per_cycle = 1e9 / clock_hz as f64;

    writeln!(w, "$version spi-pwm-core {} $end", env!("CARGO_PKG_VERSION"))?;
    writeln!(w, "$timescale 1ns $end")?;
    writeln!(w, "$scope module peripheral $end")?;
    for (id, name, width) in SIGNALS {
        if width == 1 {
            writeln!(w, "$var wire 1 {} {} $end", id, name)?;
        } else {
            writeln!(w, "$var wire {} {} {} [{}:0] $end", width, id, name, width - 1)?;
        }
    }
    writeln!(w, "$upscope $end")?;
    writeln!(w, "$enddefinitions $end")?;

    let mut prev: Option<[u8; 8]> = None;
    for s in trace.samples() {
        let cur = values(&s.inputs, &s.outputs);
        let t = (s.cycle as f64 * ns_per_cycle).round() as u64;
        writeln!(w, "#{}", t)?;
        if prev.is_none() {
            writeln!(w, "$dumpvars")?;
        }
        for (i, (id, _, width)) in SIGNALS.iter().enumerate() {
            if prev.map_or(true, |p| p[i] != cur[i]) {
                write_value(&mut w, id, *width, cur[i])?;
            }
        }
        if prev.is_none() {
            writeln!(w, "$end")?;
        }
        prev = Some(cur);
    }
    w.flush()
}

pub fn save_vcd(trace: &Trace, clock_hz: u32, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_vcd(trace, clock_hz, BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vcd_changes_only() {
        let mut t = Trace::new();
        let p = InputPins::idle();
        let o = OutputPins { uo_out: 0, uio_out: 0, uio_oe: 0xFF };
        t.record(0, p, o);
        t.record(10, p, OutputPins { uo_out: 0xF0, ..o });

        let mut buf = Vec::new();
        write_vcd(&t, 10_000_000, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("$var wire 8 & uo_out [7:0] $end"));
        assert!(text.contains("$dumpvars"));
        assert!(text.contains("#1000\nb11110000 &\n"));
        // Unchanged signals are not repeated after the initial dump
        let after = text.split("#1000").nth(1).unwrap();
        assert!(!after.contains("uio_out"));
        assert_eq!(after.lines().filter(|l| !l.is_empty()).count(), 1);
    }
}
