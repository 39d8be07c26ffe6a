//! LTC2485 24-bit delta-sigma ADC with I2C interface and internal temperature sensor.
//!
//! The converter NACKs its address while a conversion is running, so a read is retried every
//! millisecond until the result is ready. Each read also sends the configuration that applies
//! to the *next* conversion.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::debug;

use crate::bus::{retry_on_nack, I2cExt};
use crate::encode::delta_sigma_24;
use crate::Result;

/// Address all LTC2485s on the bus answer to
pub const GLOBAL_ADDRESS: u8 = 0x77;
/// Conversion time at 1X speed, in milliseconds
pub const CONVERSION_TIME_1X_MS: u32 = 150;
/// Conversion time at 2X speed, in milliseconds
pub const CONVERSION_TIME_2X_MS: u32 = 75;

/// Output rate
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Speed {
    /// Auto-calibrated, 1X output rate
    X1 = 0x00,
    /// 2X output rate, offset calibration skipped
    X2 = 0x01,
}

/// Line frequency rejection
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Rejection {
    /// Simultaneous 50 Hz and 60 Hz rejection
    Both = 0x00,
    /// 50 Hz rejection
    Hz50 = 0x02,
    /// 60 Hz rejection
    Hz60 = 0x04,
}

/// Converter input
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Input {
    /// Differential input pins
    External = 0x00,
    /// Internal temperature sensor
    Temperature = 0x08,
}

/// Configuration for the next conversion
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Config {
    /// Input to convert
    pub input: Input,
    /// Line frequency rejection
    pub rejection: Rejection,
    /// Output rate
    pub speed: Speed,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: Input::External,
            rejection: Rejection::Both,
            speed: Speed::X1,
        }
    }
}

impl Config {
    /// Time a conversion with this configuration takes. The temperature sensor always
    /// converts at 1X speed.
    pub fn conversion_time_ms(&self) -> u32 {
        match (self.input, self.speed) {
            (Input::External, Speed::X2) => CONVERSION_TIME_2X_MS,
            _ => CONVERSION_TIME_1X_MS,
        }
    }
}

impl From<Config> for u8 {
    fn from(config: Config) -> Self {
        config.input as u8 | config.rejection as u8 | config.speed as u8
    }
}

/// LTC2485 driver
#[derive(Debug)]
pub struct Ltc2485<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Ltc2485<I2C> {
    /// Construct a driver for the converter at `address`
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Read the last conversion result and program `config` for the next one.
    ///
    /// Returns the signed 24-bit code. An overrange input reads as `i32::MAX`, an underrange
    /// input as `i32::MIN`.
    pub fn read<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        config: Config,
        timeout_ms: u32,
    ) -> Result<i32, I2C::Error> {
        let command = u8::from(config);
        let address = self.address;
        let i2c = &mut self.i2c;
        let mut data = [0u8; 4];
        retry_on_nack(delay, timeout_ms, || {
            i2c.read_block_data(address, command, &mut data)
        })?;

        let code = delta_sigma_24(data);
        debug!("ltc2485 @0x{:02x} cmd {:02x} code {}", address, command, code);
        Ok(code)
    }

    /// Destroy the driver, return the wrapped I2C
    pub fn destroy(self) -> I2C {
        self.i2c
    }
}

/// Input voltage for a code, given the reference voltage
pub fn code_to_voltage(code: i32, vref: f32) -> f32 {
    code as f32 / 16_777_216.0 * vref
}
