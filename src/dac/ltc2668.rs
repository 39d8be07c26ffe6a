//! LTC2668 16-channel 16-bit SoftSpan DAC with SPI interface.
//!
//! Every 32-bit frame shifts the previous frame back out on SDO. [`Ltc2668::write_checked`]
//! uses that echo to verify a frame reached the chip.

use embedded_hal::spi::SpiDevice;
use log::warn;

use crate::bus::SpiExt;
use crate::convert::Span;
use crate::encode::dac_frame;
use crate::{Error, Result};

/// Number of output channels
pub const CHANNELS: u8 = 16;
/// Data word that enables the monitor mux, OR'd with the channel
pub const MUX_ENABLE: u16 = 0x0010;

/// LTC2668 command nibbles
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Write input register n
    Write = 0x00,
    /// Update DAC register n
    Update = 0x10,
    /// Write input register n, update all
    WriteThenUpdateAll = 0x20,
    /// Write and update n
    WriteUpdate = 0x30,
    /// Power down n
    PowerDown = 0x40,
    /// Power down the chip
    PowerDownChip = 0x50,
    /// Write span of n
    Span = 0x60,
    /// Write the configuration register
    Config = 0x70,
    /// Write all input registers
    WriteAll = 0x80,
    /// Update all DAC registers
    UpdateAll = 0x90,
    /// Write and update all
    WriteUpdateAll = 0xa0,
    /// Monitor mux control
    Mux = 0xb0,
    /// Toggle select
    ToggleSelect = 0xc0,
    /// Global toggle
    GlobalToggle = 0xd0,
    /// Write span of all channels
    SpanAll = 0xe0,
    /// No operation
    NoOperation = 0xf0,
}

/// SoftSpan output range
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum SoftSpan {
    /// 0 V to 5 V
    Unipolar5 = 0,
    /// 0 V to 10 V
    Unipolar10 = 1,
    /// -5 V to 5 V
    Bipolar5 = 2,
    /// -10 V to 10 V
    Bipolar10 = 3,
    /// -2.5 V to 2.5 V
    Bipolar2_5 = 4,
}

impl From<SoftSpan> for Span {
    fn from(span: SoftSpan) -> Self {
        match span {
            SoftSpan::Unipolar5 => Span::new(0.0, 5.0),
            SoftSpan::Unipolar10 => Span::new(0.0, 10.0),
            SoftSpan::Bipolar5 => Span::new(-5.0, 5.0),
            SoftSpan::Bipolar10 => Span::new(-10.0, 10.0),
            SoftSpan::Bipolar2_5 => Span::new(-2.5, 2.5),
        }
    }
}

/// LTC2668 driver
#[derive(Debug)]
pub struct Ltc2668<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> Ltc2668<SPI> {
    /// Wrap an SPI device
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Send one frame, return the previous frame as echoed by the chip
    pub fn write(
        &mut self,
        command: Command,
        channel: u8,
        code: u16,
    ) -> Result<[u8; 4], SPI::Error> {
        if channel >= CHANNELS {
            return Err(Error::OutOfRange);
        }
        let tx = dac_frame(command as u8, channel, code);
        let mut rx = [0u8; 4];
        self.spi.transfer_block(&tx, &mut rx)?;
        Ok(rx)
    }

    /// Send a frame followed by a no-op and check the chip echoes it back
    pub fn write_checked(
        &mut self,
        command: Command,
        channel: u8,
        code: u16,
    ) -> Result<(), SPI::Error> {
        let sent = dac_frame(command as u8, channel, code);
        self.write(command, channel, code)?;
        let echo = self.write(Command::NoOperation, 0, 0)?;
        if echo[1..] != sent[1..] {
            warn!("ltc2668 echo {:02x?} for {:02x?}", echo, sent);
            return Err(Error::Mismatch);
        }
        Ok(())
    }

    /// Program the output range of `channel`
    pub fn set_span(&mut self, channel: u8, span: SoftSpan) -> Result<(), SPI::Error> {
        self.write(Command::Span, channel, span as u16).map(|_| ())
    }

    /// Program the output range of every channel
    pub fn set_span_all(&mut self, span: SoftSpan) -> Result<(), SPI::Error> {
        self.write(Command::SpanAll, 0, span as u16).map(|_| ())
    }

    /// Write and update `channel` with the code nearest to `volts` in `span`
    pub fn write_voltage(
        &mut self,
        channel: u8,
        volts: f32,
        span: SoftSpan,
    ) -> Result<(), SPI::Error> {
        let code = Span::from(span).code(volts);
        self.write(Command::WriteUpdate, channel, code).map(|_| ())
    }

    /// Power down `channel`
    pub fn power_down(&mut self, channel: u8) -> Result<(), SPI::Error> {
        self.write(Command::PowerDown, channel, 0).map(|_| ())
    }

    /// Route `channel` to the MUX pin, or disconnect the mux with `None`
    pub fn select_mux(&mut self, channel: Option<u8>) -> Result<(), SPI::Error> {
        let code = match channel {
            Some(ch) if ch < CHANNELS => MUX_ENABLE | ch as u16,
            Some(_) => return Err(Error::OutOfRange),
            None => 0,
        };
        self.write(Command::Mux, 0, code).map(|_| ())
    }

    /// Destroy the driver, return the wrapped SPI device
    pub fn destroy(self) -> SPI {
        self.spi
    }
}

/// Nearest code for `volts` in `span`
pub fn voltage_to_code(volts: f32, span: SoftSpan) -> u16 {
    Span::from(span).code(volts)
}

/// Output voltage of `code` in `span`
pub fn code_to_voltage(code: u16, span: SoftSpan) -> f32 {
    Span::from(span).value(code)
}
