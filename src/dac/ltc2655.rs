//! LTC2655 quad 16-bit DAC with I2C interface and optional internal reference

use embedded_hal::i2c::I2c;

use super::{write_word, Command};
use crate::convert::LinearCalibration;
use crate::Result;

/// Address with all address pins tied low
pub const DEFAULT_ADDRESS: u8 = 0x10;

/// DAC channel
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Channel {
    /// DAC A
    A = 0x00,
    /// DAC B
    B = 0x01,
    /// DAC C
    C = 0x02,
    /// DAC D
    D = 0x03,
    /// All four DACs
    All = 0x0f,
}

impl Channel {
    /// Channel for index 0..=3
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::A),
            1 => Some(Self::B),
            2 => Some(Self::C),
            3 => Some(Self::D),
            _ => None,
        }
    }
}

/// LTC2655 driver
#[derive(Debug)]
pub struct Ltc2655<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Ltc2655<I2C> {
    /// Construct a driver for the DAC at `address`
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Send `command` with `code` to `channel`
    pub fn write(
        &mut self,
        command: Command,
        channel: Channel,
        code: u16,
    ) -> Result<(), I2C::Error> {
        write_word(&mut self.i2c, self.address, command, channel as u8, code)
    }

    /// Write and update `channel` with the code nearest to `volts`
    pub fn write_voltage(
        &mut self,
        channel: Channel,
        volts: f32,
        calibration: &LinearCalibration,
    ) -> Result<(), I2C::Error> {
        self.write(Command::WriteUpdate, channel, calibration.dac_code(volts))
    }

    /// Power down `channel`
    pub fn power_down(&mut self, channel: Channel) -> Result<(), I2C::Error> {
        self.write(Command::PowerDown, channel, 0)
    }

    /// Power down all DACs and the reference
    pub fn power_down_all(&mut self) -> Result<(), I2C::Error> {
        self.write(Command::PowerDownAll, Channel::All, 0)
    }

    /// Select the internal or an external reference
    pub fn use_internal_reference(&mut self, internal: bool) -> Result<(), I2C::Error> {
        let command = if internal {
            Command::InternalReference
        } else {
            Command::ExternalReference
        };
        self.write(command, Channel::All, 0)
    }

    /// Destroy the driver, return the wrapped I2C
    pub fn destroy(self) -> I2C {
        self.i2c
    }
}
