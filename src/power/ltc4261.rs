//! LTC4261 negative voltage hot swap controller with 10-bit ADC

use embedded_hal::i2c::I2c;

use crate::bus::I2cExt;
use crate::encode::split_10;
use crate::Result;

/// Address with all address pins low. Pin strapping selects 0x10 to 0x17.
pub const DEFAULT_ADDRESS: u8 = 0x10;
/// SMBus alert response address
pub const ALERT_RESPONSE_ADDRESS: u8 = 0x0c;
/// Address every LTC4261 accepts writes on
pub const MASS_WRITE_ADDRESS: u8 = 0x3e;

/// Nominal ADIN LSB in volts
pub const ADIN_LSB: f32 = 2.5e-3;
/// Nominal SENSE LSB in volts
pub const SENSE_LSB: f32 = 62.5e-6;

/// Register map
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    /// Live status
    Status = 0x00,
    /// Latched faults
    Fault = 0x01,
    /// Alert enables
    Alert = 0x02,
    /// Control
    Control = 0x03,
    /// SENSE conversion, 10 bits
    Sense = 0x04,
    /// ADIN2 conversion, 10 bits
    Adin2 = 0x06,
    /// ADIN conversion, 10 bits
    Adin = 0x08,
}

/// Control register bits
pub mod control {
    /// PGIO configured as general purpose input
    pub const PGIO_CONFIG: u8 = 0xc0;
    /// Test mode
    pub const TEST_MODE: u8 = 0x20;
    /// Retry after power bad
    pub const POWER_BAD_AUTO_RETRY: u8 = 0x10;
    /// Turn the FET on
    pub const FET_ON: u8 = 0x08;
    /// Retry after overcurrent
    pub const OVERCURRENT_AUTO_RETRY: u8 = 0x04;
    /// Retry after undervoltage
    pub const UNDERVOLTAGE_AUTO_RETRY: u8 = 0x02;
    /// Retry after overvoltage
    pub const OVERVOLTAGE_AUTO_RETRY: u8 = 0x01;
}

/// Fault and alert register bits
pub mod fault {
    /// External fault
    pub const EXTERNAL: u8 = 0x80;
    /// PGIO input high
    pub const PGIO: u8 = 0x40;
    /// FET short
    pub const FET_SHORT: u8 = 0x20;
    /// EN changed state
    pub const EN_CHANGE: u8 = 0x10;
    /// Power bad
    pub const POWER_BAD: u8 = 0x08;
    /// Overcurrent
    pub const OVERCURRENT: u8 = 0x04;
    /// Undervoltage
    pub const UNDERVOLTAGE: u8 = 0x02;
    /// Overvoltage
    pub const OVERVOLTAGE: u8 = 0x01;
}

/// LTC4261 driver
#[derive(Debug)]
pub struct Ltc4261<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Ltc4261<I2C> {
    /// Construct a driver for the controller at `address`
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Read a register
    pub fn read(&mut self, register: Register) -> Result<u8, I2C::Error> {
        self.i2c.read_byte_data(self.address, register as u8)
    }

    /// Write a register
    pub fn write(&mut self, register: Register, value: u8) -> Result<(), I2C::Error> {
        self.i2c.write_byte_data(self.address, register as u8, value)
    }

    /// Read a 10-bit conversion result
    pub fn read_10_bits(&mut self, register: Register) -> Result<u16, I2C::Error> {
        let mut data = [0u8; 2];
        self.i2c
            .read_block_data(self.address, register as u8, &mut data)?;
        Ok(split_10(data[0], data[1]))
    }

    /// Destroy the driver, return the wrapped I2C
    pub fn destroy(self) -> I2C {
        self.i2c
    }
}

/// Send an SMBus alert response. The device pulling ALERT low answers with its address,
/// returned here as a 7-bit address.
pub fn alert_response<I2C: I2c>(i2c: &mut I2C) -> Result<u8, I2C::Error> {
    Ok(i2c.read_byte(ALERT_RESPONSE_ADDRESS)? >> 1)
}

/// ADIN voltage in volts scaled back through the external divider
pub fn adin_code_to_voltage(code: u16, adin_lsb: f32, divider_ratio: f32) -> f32 {
    code as f32 * adin_lsb * divider_ratio
}

/// Current through the sense resistor in amps
pub fn code_to_current(code: u16, resistor: f32, sense_lsb: f32) -> f32 {
    code as f32 * sense_lsb / resistor
}
