//! Configuration register bank.
//!
//! | Addr | Register    | Function                                     |
//! |------|-------------|----------------------------------------------|
//! | 0x00 | `OutputA`   | static value of `uo_out`                     |
//! | 0x01 | `OutputB`   | static value of `uio_out`                    |
//! | 0x02 | `PwmEnable` | bit n = 1 puts bit n of both buses on PWM    |
//! | 0x04 | `DutyCycle` | 0x00 always low .. 0xFF always high          |
//!
//! Every other address in the 7-bit space is unmapped. Writes there are
//! dropped without any indication.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    OutputA,
    OutputB,
    PwmEnable,
    DutyCycle,
}

impl Register {
    pub const ALL: [Register; 4] = [
        Register::OutputA,
        Register::OutputB,
        Register::PwmEnable,
        Register::DutyCycle,
    ];

    pub fn from_address(addr: u8) -> Option<Self> {
        match addr {
            0x00 => Some(Register::OutputA),
            0x01 => Some(Register::OutputB),
            0x02 => Some(Register::PwmEnable),
            0x04 => Some(Register::DutyCycle),
            _ => None,
        }
    }

    pub fn address(self) -> u8 {
        match self {
            Register::OutputA => 0x00,
            Register::OutputB => 0x01,
            Register::PwmEnable => 0x02,
            Register::DutyCycle => 0x04,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Register::OutputA => "OUT_A",
            Register::OutputB => "OUT_B",
            Register::PwmEnable => "PWM_EN",
            Register::DutyCycle => "DUTY",
        }
    }
}

/// Result of a register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { register: Register, old: u8, new: u8 },
    /// Address not decoded, nothing changed
    Unmapped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisterBank {
    output_a: u8,
    output_b: u8,
    pwm_enable: u8,
    duty_cycle: u8,
}

impl RegisterBank {
    pub fn new() -> Self {
        RegisterBank::default()
    }

    pub fn reset(&mut self) {
        *self = RegisterBank::new();
    }

    pub fn get(&self, reg: Register) -> u8 {
        match reg {
            Register::OutputA => self.output_a,
            Register::OutputB => self.output_b,
            Register::PwmEnable => self.pwm_enable,
            Register::DutyCycle => self.duty_cycle,
        }
    }

    fn slot(&mut self, reg: Register) -> &mut u8 {
        match reg {
            Register::OutputA => &mut self.output_a,
            Register::OutputB => &mut self.output_b,
            Register::PwmEnable => &mut self.pwm_enable,
            Register::DutyCycle => &mut self.duty_cycle,
        }
    }

    /// Model-side lookup by address. The wire protocol has no read path.
    pub fn read(&self, addr: u8) -> Option<u8> {
        Register::from_address(addr).map(|r| self.get(r))
    }

    /// Replace a whole register. Unmapped addresses are ignored.
    pub fn write(&mut self, addr: u8, value: u8) -> WriteOutcome {
        match Register::from_address(addr) {
            Some(register) => {
                let slot = self.slot(register);
                let old = *slot;
                *slot = value;
                WriteOutcome::Written { register, old, new: value }
            }
            None => WriteOutcome::Unmapped,
        }
    }

    pub fn output_a(&self) -> u8 { self.output_a }
    pub fn output_b(&self) -> u8 { self.output_b }
    pub fn pwm_enable(&self) -> u8 { self.pwm_enable }
    pub fn duty_cycle(&self) -> u8 { self.duty_cycle }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_map() {
        for reg in Register::ALL {
            assert_eq!(Register::from_address(reg.address()), Some(reg));
        }
        assert_eq!(Register::from_address(0x03), None);
        assert_eq!(Register::from_address(0x30), None);
        assert_eq!(Register::from_address(0x41), None);
        assert_eq!(Register::from_address(0x7F), None);
    }

    #[test]
    fn test_write_and_read_back() {
        let mut bank = RegisterBank::new();
        assert_eq!(
            bank.write(0x01, 0xCC),
            WriteOutcome::Written { register: Register::OutputB, old: 0, new: 0xCC }
        );
        assert_eq!(bank.read(0x01), Some(0xCC));
        assert_eq!(bank.output_b(), 0xCC);
        assert_eq!(
            bank.write(0x01, 0x33),
            WriteOutcome::Written { register: Register::OutputB, old: 0xCC, new: 0x33 }
        );
    }

    #[test]
    fn test_unmapped_write_changes_nothing() {
        let mut bank = RegisterBank::new();
        bank.write(0x00, 0xF0);
        bank.write(0x04, 0x80);
        let before = bank;
        for addr in (0u8..0x80).filter(|a| Register::from_address(*a).is_none()) {
            assert_eq!(bank.write(addr, 0xAA), WriteOutcome::Unmapped);
            assert_eq!(bank.read(addr), None);
        }
        assert_eq!(bank, before);
    }

    #[test]
    fn test_reset_clears_all() {
        let mut bank = RegisterBank::new();
        for reg in Register::ALL {
            bank.write(reg.address(), 0x5A);
        }
        bank.reset();
        for reg in Register::ALL {
            assert_eq!(bank.get(reg), 0);
        }
    }
}
