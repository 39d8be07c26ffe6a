//! LTC2942 battery gas gauge with temperature and voltage measurement.
//!
//! The accumulated charge register counts in steps of `0.085 mAh * M / 128` for a 50 mΩ sense
//! resistor, where M is the programmed prescaler. Voltage and temperature are 16-bit codes
//! over fixed full scales.

use embedded_hal::i2c::I2c;

use crate::bus::I2cExt;
use crate::Result;

/// Fixed bus address
pub const ADDRESS: u8 = 0x64;
/// SMBus alert response address
pub const ALERT_RESPONSE_ADDRESS: u8 = 0x0c;

/// Charge LSB in mAh for a 50 mΩ sense resistor and M = 128
pub const CHARGE_LSB: f32 = 0.085e-3;
/// Voltage full scale in volts
pub const FULLSCALE_VOLTAGE: f32 = 6.0;
/// Temperature full scale in kelvin
pub const FULLSCALE_TEMPERATURE: f32 = 600.0;

/// Register map. 16-bit values are MSB first.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Register {
    /// Status (read only)
    Status = 0x00,
    /// Control
    Control = 0x01,
    /// Accumulated charge, 16 bits
    AccumulatedCharge = 0x02,
    /// Charge threshold high, 16 bits
    ChargeThresholdHigh = 0x04,
    /// Charge threshold low, 16 bits
    ChargeThresholdLow = 0x06,
    /// Voltage, 16 bits
    Voltage = 0x08,
    /// Voltage threshold high
    VoltageThresholdHigh = 0x0a,
    /// Voltage threshold low
    VoltageThresholdLow = 0x0b,
    /// Temperature, 16 bits
    Temperature = 0x0c,
    /// Temperature threshold high
    TemperatureThresholdHigh = 0x0e,
    /// Temperature threshold low
    TemperatureThresholdLow = 0x0f,
}

/// ADC mode, control bits 7..6
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum AdcMode {
    /// Convert voltage and temperature continuously
    Automatic = 0xc0,
    /// Convert voltage once
    ManualVoltage = 0x80,
    /// Convert temperature once
    ManualTemperature = 0x40,
    /// ADC off
    Sleep = 0x00,
}

/// ALCC pin function, control bits 2..1
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Alcc {
    /// Alert output
    Alert = 0x04,
    /// Charge complete input
    ChargeComplete = 0x02,
    /// Pin disabled
    Disabled = 0x00,
}

/// Control register bit that shuts the analog section down
pub const SHUTDOWN: u8 = 0x01;

/// Control register value for a mode, prescaler `m` (1, 2, 4 ... 128) and ALCC function.
///
/// Prescalers that are not a power of two are rounded down to the next one.
pub fn control(mode: AdcMode, m: u8, alcc: Alcc) -> u8 {
    let exponent = if m == 0 { 0 } else { 7 - m.leading_zeros() as u8 };
    mode as u8 | exponent << 3 | alcc as u8
}

/// LTC2942 driver
#[derive(Debug)]
pub struct Ltc2942<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> Ltc2942<I2C> {
    /// Construct a driver
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Read an 8-bit register
    pub fn read(&mut self, register: Register) -> Result<u8, I2C::Error> {
        self.i2c.read_byte_data(ADDRESS, register as u8)
    }

    /// Write an 8-bit register
    pub fn write(&mut self, register: Register, value: u8) -> Result<(), I2C::Error> {
        self.i2c.write_byte_data(ADDRESS, register as u8, value)
    }

    /// Read a 16-bit register
    pub fn read_16_bits(&mut self, register: Register) -> Result<u16, I2C::Error> {
        self.i2c.read_word_data(ADDRESS, register as u8)
    }

    /// Write a 16-bit register
    pub fn write_16_bits(&mut self, register: Register, value: u16) -> Result<(), I2C::Error> {
        self.i2c.write_word_data(ADDRESS, register as u8, value)
    }

    /// Read-modify-write: clear `clear`, then set `set`
    pub fn register_set_clear_bits(
        &mut self,
        register: Register,
        set: u8,
        clear: u8,
    ) -> Result<(), I2C::Error> {
        let value = self.read(register)?;
        self.write(register, (value & !clear) | set)
    }

    /// Destroy the driver, return the wrapped I2C
    pub fn destroy(self) -> I2C {
        self.i2c
    }
}

/// Accumulated charge in mAh for a sense resistor in ohms and prescaler M
pub fn code_to_mah(code: u16, resistor: f32, m: u16) -> f32 {
    1000.0 * (code as f32 * CHARGE_LSB * m as f32 * 50e-3) / (resistor * 128.0)
}

/// Accumulated charge in coulombs
pub fn code_to_coulombs(code: u16, resistor: f32, m: u16) -> f32 {
    code_to_mah(code, resistor, m) * 3.6
}

/// Battery voltage in volts
pub fn code_to_voltage(code: u16) -> f32 {
    code as f32 / 65535.0 * FULLSCALE_VOLTAGE
}

/// Die temperature in kelvin
pub fn code_to_kelvin(code: u16) -> f32 {
    code as f32 * (FULLSCALE_TEMPERATURE / 65535.0)
}

/// Die temperature in degrees Celsius
pub fn code_to_celsius(code: u16) -> f32 {
    code_to_kelvin(code) - 273.15
}
