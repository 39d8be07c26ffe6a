//! LTC4151 high voltage I2C current and voltage monitor
//! ```
//! # use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
//! # use linduino::power::ltc4151::{Ltc4151, Register, DEFAULT_ADDRESS};
//! # let i2c = Mock::new(&[Transaction::write_read(0x6f, vec![0x02], vec![0x32, 0x00])]);
//! let mut monitor = Ltc4151::new(i2c, DEFAULT_ADDRESS);
//! let code = monitor.read_12_bits(Register::Vin).unwrap();
//! assert_eq!(code, 0x320);
//! # monitor.destroy().done();
//! ```

use embedded_hal::i2c::I2c;

use crate::bus::I2cExt;
use crate::encode::left_aligned_12;
use crate::Result;

/// Address with both address pins low
pub const DEFAULT_ADDRESS: u8 = 0x6f;
/// Address every LTC4151 answers to
pub const GLOBAL_ADDRESS: u8 = 0x66;

/// Nominal SENSE LSB in volts
pub const SENSE_LSB: f32 = 20e-6;
/// Nominal VIN LSB in volts
pub const VIN_LSB: f32 = 25e-3;
/// Nominal ADIN LSB in volts
pub const ADIN_LSB: f32 = 0.5e-3;

/// Register map
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    /// Current sense voltage
    Sense = 0x00,
    /// Supply voltage
    Vin = 0x02,
    /// ADIN voltage
    Adin = 0x04,
    /// ADC mode control
    Control = 0x06,
}

/// Control register bits
pub mod control {
    /// Snapshot SENSE
    pub const SENSE_CHANNEL: u8 = 0x00;
    /// Snapshot VIN
    pub const VIN_CHANNEL: u8 = 0x20;
    /// Snapshot ADIN
    pub const ADIN_CHANNEL: u8 = 0x40;
    /// Convert continuously
    pub const CONTINUOUS_MODE: u8 = 0x00;
    /// Convert the selected channel once
    pub const SNAPSHOT_MODE: u8 = 0x80;
}

/// LTC4151 driver
#[derive(Debug)]
pub struct Ltc4151<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Ltc4151<I2C> {
    /// Construct a driver for the monitor at `address`
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Write the control register, see [`control`]
    pub fn write_control(&mut self, value: u8) -> Result<(), I2C::Error> {
        self.i2c
            .write_byte_data(self.address, Register::Control as u8, value)
    }

    /// Read a 12-bit conversion result
    pub fn read_12_bits(&mut self, register: Register) -> Result<u16, I2C::Error> {
        let word = self.i2c.read_word_data(self.address, register as u8)?;
        Ok(left_aligned_12(word))
    }

    /// Destroy the driver, return the wrapped I2C
    pub fn destroy(self) -> I2C {
        self.i2c
    }
}

/// Current through the sense resistor in amps
pub fn code_to_sense_current(code: u16, resistor: f32, sense_lsb: f32) -> f32 {
    code as f32 * sense_lsb / resistor
}

/// VIN voltage in volts
pub fn code_to_vin_voltage(code: u16, vin_lsb: f32) -> f32 {
    code as f32 * vin_lsb
}

/// ADIN voltage in volts
pub fn code_to_adin_voltage(code: u16, adin_lsb: f32) -> f32 {
    code as f32 * adin_lsb
}
