//! Debugging facilities.
//!
//! - **Register dump**: named listing of the register bank
//! - **Watchpoints**: trigger on write frames to a given address
//! - **Frame history**: bounded log of decoded frames and what they did
//!
//! Watchpoints are checked when the decoder reports a write frame, before the
//! register bank is updated, so unmapped addresses can be watched as well.

use std::collections::VecDeque;

use crate::peripherals::{Register, RegisterBank, Transaction};

/// Frames kept in the history by default
pub const DEFAULT_HISTORY: usize = 64;

/// What a decoded frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Mapped write committed
    Written { register: Register, old: u8 },
    /// Write to an unmapped address, dropped
    Unmapped,
    /// Read frame, no effect
    Read,
    /// nCS released before the frame completed
    Aborted { bits: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    pub cycle: u64,
    /// `None` for aborted frames
    pub transaction: Option<Transaction>,
    pub outcome: FrameOutcome,
}

/// A register-write watchpoint.
#[derive(Debug, Clone)]
pub struct Watchpoint {
    /// 7-bit address to watch
    pub address: u8,
    /// Optional: only trigger when this value is written
    pub value_match: Option<u8>,
    pub hits: u64,
    pub enabled: bool,
}

/// Watchpoint trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchHit {
    pub index: usize,
    pub address: u8,
    /// Previous register value, `None` for unmapped addresses
    pub old_val: Option<u8>,
    pub new_val: u8,
    pub cycle: u64,
}

pub struct Debugger {
    pub watchpoints: Vec<Watchpoint>,
    /// First hit since the last [`Debugger::take_hit`]
    pub watch_hit: Option<WatchHit>,
    history: VecDeque<FrameRecord>,
    history_len: usize,
}

impl Debugger {
    pub fn new() -> Self {
        Debugger {
            watchpoints: Vec::new(),
            watch_hit: None,
            history: VecDeque::with_capacity(DEFAULT_HISTORY),
            history_len: DEFAULT_HISTORY,
        }
    }

    /// Add a watchpoint. Returns its index.
    pub fn add_watchpoint(&mut self, address: u8) -> usize {
        let idx = self.watchpoints.len();
        self.watchpoints.push(Watchpoint {
            address: address & 0x7F, value_match: None, hits: 0, enabled: true,
        });
        idx
    }

    /// Add a watchpoint that only fires on a specific value.
    pub fn add_value_watchpoint(&mut self, address: u8, value: u8) -> usize {
        let idx = self.add_watchpoint(address);
        self.watchpoints[idx].value_match = Some(value);
        idx
    }

    pub fn remove_watchpoint(&mut self, idx: usize) -> bool {
        if idx < self.watchpoints.len() {
            self.watchpoints.remove(idx);
            true
        } else { false }
    }

    /// Check watchpoints for a write frame.
    #[inline]
    pub fn check_write(&mut self, cycle: u64, address: u8, old_val: Option<u8>, new_val: u8) {
        for (i, wp) in self.watchpoints.iter_mut().enumerate() {
            if !wp.enabled || wp.address != address { continue; }
            if let Some(v) = wp.value_match {
                if new_val != v { continue; }
            }
            wp.hits += 1;
            if self.watch_hit.is_none() {
                self.watch_hit = Some(WatchHit { index: i, address, old_val, new_val, cycle });
            }
        }
    }

    /// Take pending watchpoint hit (returns and clears it).
    pub fn take_hit(&mut self) -> Option<WatchHit> {
        self.watch_hit.take()
    }

    pub fn list_watchpoints(&self) -> String {
        if self.watchpoints.is_empty() { return "No watchpoints set.\n".into(); }
        let mut s = String::new();
        for (i, wp) in self.watchpoints.iter().enumerate() {
            let en = if wp.enabled { " " } else { "!" };
            let name = Register::from_address(wp.address).map_or("unmapped", |r| r.name());
            let vm = match wp.value_match {
                Some(v) => format!(" =0x{:02X}", v),
                None => String::new(),
            };
            s.push_str(&format!("  [{}]{} 0x{:02X} {:<8} hits={}{}\n",
                i, en, wp.address, name, wp.hits, vm));
        }
        s
    }

    /// Append to the frame history, dropping the oldest entry when full.
    pub fn log_frame(&mut self, record: FrameRecord) {
        if self.history_len == 0 { return; }
        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    pub fn set_history_len(&mut self, len: usize) {
        self.history_len = len;
        while self.history.len() > len {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &FrameRecord> {
        self.history.iter()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn format_history(&self) -> String {
        let mut s = String::new();
        for r in &self.history {
            let tx = match r.transaction {
                Some(t) => format!("{} 0x{:02X} <- 0x{:02X}",
                    if t.is_write() { "W" } else { "R" }, t.address, t.data),
                None => "-".to_string(),
            };
            let what = match r.outcome {
                FrameOutcome::Written { register, old } => format!("{} was 0x{:02X}", register.name(), old),
                FrameOutcome::Unmapped => "unmapped, ignored".to_string(),
                FrameOutcome::Read => "read, ignored".to_string(),
                FrameOutcome::Aborted { bits } => format!("aborted after {} bits", bits),
            };
            s.push_str(&format!("  @{:>10}  {:<18} {}\n", r.cycle, tx, what));
        }
        s
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

/// Named register listing.
pub fn dump_regs(bank: &RegisterBank) -> String {
    let mut s = String::new();
    for reg in Register::ALL {
        let v = bank.get(reg);
        s.push_str(&format!("  0x{:02X} {:<7}= 0x{:02X} ({:08b})\n", reg.address(), reg.name(), v, v));
    }
    s
}
