//! LT3965 octal matrix LED bypass switch.
//!
//! The switch answers on several address blocks, each selecting a bus mode. The 4-bit device
//! address set by its pins is OR'd into the block base:
//!
//! - acknowledge configuration (AC) mode for reading and writing the global configuration
//! - single channel (SC) mode for one LED's mode register and dimming value
//! - broadcast (BC) read of the fault status of all devices

use embedded_hal::i2c::I2c;

use crate::bus::I2cExt;
use crate::{Error, Result};

/// Base of the AC mode address block
pub const AC_ADDRESS: u8 = 0x20;
/// Base of the SC mode address block
pub const SC_ADDRESS: u8 = 0x50;
/// Broadcast read address
pub const BC_ADDRESS: u8 = 0x0c;
/// Test mode address
pub const TM_ADDRESS: u8 = 0x73;

/// Number of LED channels
pub const CHANNELS: u8 = 8;

const LONG_FORMAT: u8 = 0x80;

/// LT3965 driver
#[derive(Debug)]
pub struct Lt3965<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Lt3965<I2C> {
    /// Construct a driver for the switch with pin address `address` (0 to 15)
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address: address & 0x0f,
        }
    }

    /// Write the AC mode configuration byte
    pub fn ac_write(&mut self, value: u8) -> Result<(), I2C::Error> {
        self.i2c.write_byte(self.address | AC_ADDRESS, value)
    }

    /// Read the three AC mode status bytes
    pub fn ac_read(&mut self) -> Result<[u8; 3], I2C::Error> {
        let mut values = [0u8; 3];
        self.i2c.read_block(self.address | AC_ADDRESS, &mut values)?;
        Ok(values)
    }

    /// SC mode short write: set the mode register of `channel`
    pub fn sc_write_short(&mut self, channel: u8, scm_reg: u8) -> Result<(), I2C::Error> {
        let command = sc_command::<I2C::Error>(channel, scm_reg)?;
        self.i2c.write_byte(self.address | SC_ADDRESS, command)
    }

    /// SC mode long write: set the mode register and dimming value of `channel`
    pub fn sc_write_long(
        &mut self,
        channel: u8,
        scm_reg: u8,
        dimming: u8,
    ) -> Result<(), I2C::Error> {
        let command = LONG_FORMAT | sc_command::<I2C::Error>(channel, scm_reg)?;
        self.i2c
            .write_byte_data(self.address | SC_ADDRESS, command, dimming)
    }

    /// SC mode short write followed by a read of the channel's two status bytes
    pub fn sc_write_short_read(&mut self, channel: u8, scm_reg: u8) -> Result<[u8; 2], I2C::Error> {
        let command = sc_command::<I2C::Error>(channel, scm_reg)?;
        let mut values = [0u8; 2];
        self.i2c
            .read_block_data(self.address | SC_ADDRESS, command, &mut values)?;
        Ok(values)
    }

    /// Broadcast read of the combined fault status
    pub fn bc_read(&mut self) -> Result<u8, I2C::Error> {
        self.i2c.read_byte(BC_ADDRESS)
    }

    /// Destroy the driver, return the wrapped I2C
    pub fn destroy(self) -> I2C {
        self.i2c
    }
}

fn sc_command<E>(channel: u8, scm_reg: u8) -> Result<u8, E> {
    if channel >= CHANNELS {
        return Err(Error::OutOfRange);
    }
    Ok(channel << 4 | (scm_reg & 0x0f))
}
