//! LTC2607 dual 16-bit rail-to-rail DAC with I2C interface
//! ```
//! # use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
//! # use linduino::dac::ltc2607::{Channel, Ltc2607};
//! # use linduino::convert::LinearCalibration;
//! # let i2c = Mock::new(&[Transaction::write(0x72, vec![0x30, 0x40, 0x00])]);
//! let mut dac = Ltc2607::new(i2c, 0x72);
//! dac.write_voltage(Channel::A, 1.25, &LinearCalibration::ideal(5.0 / 65535.0))
//!     .unwrap();
//! # dac.destroy().done();
//! ```

use embedded_hal::i2c::I2c;

use super::{write_word, Command};
use crate::convert::LinearCalibration;
use crate::Result;

/// Nominal LSB with a 5 V reference
pub const TYPICAL_LSB: f32 = 5.0 / 65535.0;

/// DAC channel
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Channel {
    /// DAC A
    A = 0x00,
    /// DAC B
    B = 0x01,
    /// Both DACs
    All = 0x0f,
}

/// LTC2607 driver
#[derive(Debug)]
pub struct Ltc2607<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Ltc2607<I2C> {
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

    /// Destroy the driver, return the wrapped I2C
    pub fn destroy(self) -> I2C {
        self.i2c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate std;
    use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
    use std::vec;

    #[test]
    fn writes_command_channel_and_code() {
        let expectations = [
            Transaction::write(0x72, vec![0x01, 0x12, 0x34]),
            Transaction::write(0x72, vec![0x1f, 0x00, 0x00]),
            Transaction::write(0x72, vec![0x41, 0x00, 0x00]),
        ];
        let mut dac = Ltc2607::new(Mock::new(&expectations), 0x72);

        dac.write(Command::Write, Channel::B, 0x1234).unwrap();
        dac.write(Command::Update, Channel::All, 0).unwrap();
        dac.power_down(Channel::B).unwrap();

        dac.destroy().done();
    }

    #[test]
    fn voltage_is_clamped() {
        let expectations = [Transaction::write(0x72, vec![0x30, 0xff, 0xff])];
        let mut dac = Ltc2607::new(Mock::new(&expectations), 0x72);

        dac.write_voltage(Channel::A, 7.0, &LinearCalibration::ideal(TYPICAL_LSB))
            .unwrap();

        dac.destroy().done();
    }
}
