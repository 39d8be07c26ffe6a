//! 16-bit digital to analog converters

pub mod ltc2607;
pub mod ltc2655;
pub mod ltc2668;

pub use ltc2607::Ltc2607;
pub use ltc2655::Ltc2655;
pub use ltc2668::Ltc2668;

use embedded_hal::i2c::I2c;
use log::trace;

use crate::bus::I2cExt;
use crate::encode::dac_command;
use crate::Result;

/// Address every LTC2607 and LTC2655 on the bus answers to
pub const GLOBAL_ADDRESS: u8 = 0x73;

/// Commands understood by the I2C DACs
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Write the input register
    Write = 0x00,
    /// Copy the input register to the DAC register and power up
    Update = 0x10,
    /// Write the input register and update
    WriteUpdate = 0x30,
    /// Power the channel down
    PowerDown = 0x40,
    /// Power down all channels and the reference (LTC2655)
    PowerDownAll = 0x50,
    /// Use the internal reference (LTC2655)
    InternalReference = 0x60,
    /// Use an external reference (LTC2655)
    ExternalReference = 0x70,
    /// No operation
    NoOperation = 0xf0,
}

/// `[command | channel, MSB, LSB]`
fn write_word<I2C: I2c>(
    i2c: &mut I2C,
    address: u8,
    command: Command,
    channel: u8,
    code: u16,
) -> Result<(), I2C::Error> {
    let command = dac_command(command as u8, channel);
    trace!("dac @0x{:02x} cmd {:02x} code {:04x}", address, command, code);
    i2c.write_word_data(address, command, code)
}
