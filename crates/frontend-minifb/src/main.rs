//! SPI PWM peripheral simulator frontend v0.3.0.
//!
//! Provides two execution modes:
//!
//! - **GUI mode** (default): Logic-analyzer window showing all 16 output bits
//!   in real time, with keyboard control of the duty cycle and PWM mask.
//! - **Headless mode** (`--headless`): Runs a scenario (JSON file or the
//!   built-in bench sequence) and exits non-zero on a failed expectation.
//!
//! GUI keys: Up/Down=Duty ±16  1-8=Toggle PWM bit  R=Reset  D=Dump
//!           S=Save state  L=Load state  Esc=Quit

mod scenario;

use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use minifb::{Key, Scale, ScaleMode, Window, WindowOptions};
use spi_pwm_core::peripherals::CARRIER_PERIOD_CYCLES;
use spi_pwm_core::{savestate, vcd, Bus, OutputPins, Peripheral, SpiHost, CLOCK_HZ, RESET_CYCLES};

use scenario::Scenario;

/// Visible samples per lane
const SCOPE_WIDTH: usize = 832;
/// Pixel height of one bit lane
const LANE_HEIGHT: usize = 20;
const LANES: usize = 16;
const SCOPE_HEIGHT: usize = LANE_HEIGHT * LANES;
/// Carrier periods shown across the window
const SCOPE_PERIODS: usize = 4;
const SCOPE_CYCLES: usize = SCOPE_PERIODS * CARRIER_PERIOD_CYCLES as usize;
const TARGET_FPS: usize = 60;
/// System clocks per displayed frame at real-time speed
const CYCLES_PER_FRAME: u64 = CLOCK_HZ as u64 / TARGET_FPS as u64;
const DUTY_STEP: u8 = 16;
const STATE_FILE: &str = "spi-pwm.state";

const COLOR_BG: u32 = 0x10_14_18;
const COLOR_GRID: u32 = 0x30_34_3C;
const COLOR_PRIMARY: u32 = 0x40_E0_60;
const COLOR_SECONDARY: u32 = 0x40_C0_E0;
const COLOR_PWM: u32 = 0xF0_C0_40;

/// SPI-controlled PWM peripheral simulator
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Scenario file (JSON). The built-in bench sequence is used when omitted.
    scenario: Option<PathBuf>,
    /// Run the scenario without a window.
    #[arg(long)]
    headless: bool,
    /// Verbose logging and frame history.
    #[arg(long)]
    debug: bool,
    /// Write a VCD waveform of the headless run.
    #[arg(long)]
    vcd: Option<PathBuf>,
    /// Save state after the headless run.
    #[arg(long)]
    save_state: Option<PathBuf>,
    /// Load state before running.
    #[arg(long)]
    load_state: Option<PathBuf>,
    /// Watch writes to a register address, hex (repeatable).
    #[arg(long, value_parser = parse_hex_u8)]
    watch: Vec<u8>,
    /// Window scale 1-4.
    #[arg(long, default_value_t = 1)]
    scale: u8,
    /// Print the built-in scenario as JSON and exit.
    #[arg(long)]
    dump_scenario: bool,
}

fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| format!("{}: {}", s, e))
}

fn init_logging(debug: bool) {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", if debug { "spi_pwm=debug" } else { "spi_pwm=info" });
    }
    let _ = pretty_env_logger::try_init_timed();
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    if args.dump_scenario {
        println!("{}", Scenario::builtin().to_json()?);
        return Ok(());
    }

    let mut dev = Peripheral::new();
    if let Some(ref path) = args.load_state {
        let state = savestate::load_from_file(path)
            .with_context(|| format!("loading state {}", path.display()))?;
        dev.load_state(&state);
        log::info!("state loaded from {} (cycle {})", path.display(), dev.cycle());
    }
    for &addr in &args.watch {
        let idx = dev.debugger.add_watchpoint(addr);
        log::debug!("watchpoint [{}] at 0x{:02X}", idx, addr);
    }

    if args.headless {
        run_headless(&args, &mut dev)
    } else {
        run_gui(&args, &mut dev)
    }
}

// ─── Headless Mode ──────────────────────────────────────────────────────────

fn run_headless(args: &Args, dev: &mut Peripheral) -> Result<()> {
    let scenario = match args.scenario {
        Some(ref path) => Scenario::load(path)?,
        None => Scenario::builtin(),
    };
    dev.trace.enabled = args.vcd.is_some();

    let start = Instant::now();
    let result = scenario.run(dev);
    let elapsed = start.elapsed().as_secs_f64();

    println!("\n{}", dev.dump_regs());
    if !dev.debugger.watchpoints.is_empty() {
        print!("{}", dev.debugger.list_watchpoints());
    }
    if args.debug {
        println!("History:\n{}", dev.debugger.format_history());
    }
    let st = dev.stats;
    println!("frames={} writes={} unmapped={} reads={} aborted={}",
        st.frames, st.writes, st.unmapped_writes, st.reads, st.aborted);

    // Artifacts are written even when a check failed
    if let Some(ref path) = args.vcd {
        vcd::save_vcd(&dev.trace, CLOCK_HZ, path)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("VCD: {} ({} changes)", path.display(), dev.trace.len());
    }
    if let Some(ref path) = args.save_state {
        savestate::save_to_file(&dev.save_state(), path)
            .with_context(|| format!("saving state {}", path.display()))?;
        log::info!("state saved to {}", path.display());
    }

    let report = result?;
    println!("PASS: {} steps, {} checks, {} cycles in {:.2}s",
        report.steps, report.checks, dev.cycle(), elapsed);
    Ok(())
}

// ─── GUI Mode ───────────────────────────────────────────────────────────────

fn window_options(scale: u8) -> WindowOptions {
    let scale = match scale {
        0 | 1 => Scale::X1,
        2 => Scale::X2,
        _ => Scale::X4,
    };
    WindowOptions { scale, scale_mode: ScaleMode::AspectRatioStretch, resize: true, ..Default::default() }
}

/// Logic-analyzer frame: one sample per column across `SCOPE_CYCLES`.
fn capture(dev: &mut Peripheral, columns: &mut Vec<OutputPins>) {
    columns.clear();
    let mut done = 0usize;
    for col in 0..SCOPE_WIDTH {
        let target = (col + 1) * SCOPE_CYCLES / SCOPE_WIDTH;
        dev.run_cycles((target - done) as u64);
        done = target;
        columns.push(dev.outputs());
    }
}

fn render(buf: &mut [u32], columns: &[OutputPins], mask: u8) {
    buf.fill(COLOR_BG);

    for lane in 0..LANES {
        let y = (lane + 1) * LANE_HEIGHT - 1;
        buf[y * SCOPE_WIDTH..(y + 1) * SCOPE_WIDTH].fill(COLOR_GRID);
    }
    for p in 0..SCOPE_PERIODS {
        let x = p * SCOPE_WIDTH / SCOPE_PERIODS;
        for y in 0..SCOPE_HEIGHT {
            buf[y * SCOPE_WIDTH + x] = COLOR_GRID;
        }
    }

    for lane in 0..LANES {
        let (bus, bit) = if lane < 8 { (Bus::Primary, lane as u8) } else { (Bus::Secondary, lane as u8 - 8) };
        let color = if mask & (1 << bit) != 0 {
            COLOR_PWM
        } else if bus == Bus::Primary {
            COLOR_PRIMARY
        } else {
            COLOR_SECONDARY
        };
        let top = lane * LANE_HEIGHT + 3;
        let bottom = (lane + 1) * LANE_HEIGHT - 4;

        let mut prev: Option<bool> = None;
        for (x, out) in columns.iter().enumerate() {
            let level = out.bit(bus, bit);
            let y = if level { top } else { bottom };
            buf[y * SCOPE_WIDTH + x] = color;
            if prev.map_or(false, |p| p != level) {
                for yy in top..=bottom {
                    buf[yy * SCOPE_WIDTH + x] = color;
                }
            }
            prev = Some(level);
        }
    }
}

/// Title text from the first PWM-enabled bit seen in the trace.
fn scope_title(dev: &Peripheral) -> String {
    let mask = dev.regs.pwm_enable();
    let regs = format!("A={:02X} B={:02X} EN={:02X} DUTY={:02X}",
        dev.regs.output_a(), dev.regs.output_b(), mask, dev.regs.duty_cycle());
    let measured = (0..8u8)
        .find(|b| mask & (1 << b) != 0)
        .and_then(|bit| dev.trace.measure(Bus::Primary, bit));
    match measured {
        Some(m) => format!("SPI PWM - {} - {:.1} Hz {:.1}%", regs, m.frequency_hz(CLOCK_HZ), m.duty_percent()),
        None => format!("SPI PWM - {}", regs),
    }
}

fn run_gui(args: &Args, dev: &mut Peripheral) -> Result<()> {
    let mut window = Window::new("SPI PWM", SCOPE_WIDTH, SCOPE_HEIGHT, window_options(args.scale))
        .context("creating window")?;
    window.set_target_fps(TARGET_FPS);

    if args.load_state.is_none() {
        dev.power_on_reset(RESET_CYCLES);
    }
    let host = SpiHost::new();
    let mut buf = vec![0u32; SCOPE_WIDTH * SCOPE_HEIGHT];
    let mut columns = Vec::with_capacity(SCOPE_WIDTH);
    let mut last_title = Instant::now();
    let start_time = Instant::now();
    let mut frame_count: u64 = 0;

    let mut prev_up = false;
    let mut prev_down = false;
    let mut prev_r = false;
    let mut prev_d = false;
    let mut prev_s = false;
    let mut prev_l = false;
    let mut prev_num = [false; 8];

    while window.is_open() && !window.is_key_down(Key::Escape) {
        // Duty (Up/Down)
        let up = window.is_key_down(Key::Up);
        if up && !prev_up {
            let duty = dev.regs.duty_cycle().saturating_add(DUTY_STEP);
            host.write(dev, 0x04, duty);
        }
        prev_up = up;
        let down = window.is_key_down(Key::Down);
        if down && !prev_down {
            let duty = dev.regs.duty_cycle().saturating_sub(DUTY_STEP);
            host.write(dev, 0x04, duty);
        }
        prev_down = down;

        // PWM enable bits (1-8)
        let num = [
            window.is_key_down(Key::Key1), window.is_key_down(Key::Key2),
            window.is_key_down(Key::Key3), window.is_key_down(Key::Key4),
            window.is_key_down(Key::Key5), window.is_key_down(Key::Key6),
            window.is_key_down(Key::Key7), window.is_key_down(Key::Key8),
        ];
        for i in 0..8 {
            if num[i] && !prev_num[i] {
                let mask = dev.regs.pwm_enable() ^ (1 << i);
                host.write(dev, 0x02, mask);
            }
        }
        prev_num = num;

        // Reset (R)
        let r = window.is_key_down(Key::R);
        if r && !prev_r {
            dev.power_on_reset(RESET_CYCLES);
            log::info!("reset at cycle {}", dev.cycle());
        }
        prev_r = r;

        // Reg dump (D)
        let d = window.is_key_down(Key::D);
        if d && !prev_d {
            eprintln!("--- Regs (frame {}) ---\n{}History:\n{}---",
                frame_count, dev.dump_regs(), dev.debugger.format_history());
        }
        prev_d = d;

        // Save / load state (S / L)
        let s = window.is_key_down(Key::S);
        if s && !prev_s {
            match savestate::save_to_file(&dev.save_state(), STATE_FILE.as_ref()) {
                Ok(()) => log::info!("state saved to {}", STATE_FILE),
                Err(e) => log::error!("save state: {}", e),
            }
        }
        prev_s = s;
        let l = window.is_key_down(Key::L);
        if l && !prev_l {
            match savestate::load_from_file(STATE_FILE.as_ref()) {
                Ok(state) => {
                    dev.load_state(&state);
                    log::info!("state loaded from {}", STATE_FILE);
                }
                Err(e) => log::error!("load state: {}", e),
            }
        }
        prev_l = l;

        if let Some(hit) = dev.debugger.take_hit() {
            log::info!("watchpoint [{}] 0x{:02X}: {:?} -> 0x{:02X} at cycle {}",
                hit.index, hit.address, hit.old_val, hit.new_val, hit.cycle);
        }

        // Run the frame's remaining time untraced, then capture the window
        dev.trace.enabled = false;
        dev.run_cycles(CYCLES_PER_FRAME.saturating_sub(SCOPE_CYCLES as u64));
        dev.trace.clear();
        dev.trace.enabled = true;
        capture(dev, &mut columns);
        dev.trace.enabled = false;
        frame_count += 1;

        render(&mut buf, &columns, dev.regs.pwm_enable());
        window.update_with_buffer(&buf, SCOPE_WIDTH, SCOPE_HEIGHT).context("updating window")?;

        if last_title.elapsed() >= Duration::from_millis(250) {
            window.set_title(&scope_title(dev));
            last_title = Instant::now();
        }
    }

    let e = start_time.elapsed().as_secs_f64();
    log::debug!("{} frames in {:.1}s, {} cycles", frame_count, e, dev.cycle());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u8() {
        assert_eq!(parse_hex_u8("0x04"), Ok(0x04));
        assert_eq!(parse_hex_u8("7F"), Ok(0x7F));
        assert!(parse_hex_u8("100").is_err());
    }

    #[test]
    fn test_capture_and_title() {
        let mut dev = Peripheral::new();
        dev.power_on_reset(RESET_CYCLES);
        dev.write_register(0x02, 0x01);
        dev.write_register(0x04, 0x80);
        dev.trace.enabled = true;
        let mut columns = Vec::new();
        capture(&mut dev, &mut columns);
        assert_eq!(columns.len(), SCOPE_WIDTH);
        assert!(columns.iter().any(|o| o.uo_out & 1 == 1));
        assert!(columns.iter().any(|o| o.uo_out & 1 == 0));
        assert!(scope_title(&dev).contains("50.0%"));

        let mut buf = vec![0u32; SCOPE_WIDTH * SCOPE_HEIGHT];
        render(&mut buf, &columns, 0x01);
        assert!(buf.contains(&COLOR_PWM));
        assert!(buf.contains(&COLOR_PRIMARY));
    }
}
