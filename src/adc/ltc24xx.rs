//! Reads shared by the LTC24XX delta-sigma family.
//!
//! The family comes in SPI and I2C flavours with 24- or 32-bit output words and 0, 8 or 16
//! bits of configuration. Results are brought into a common format: offset binary with the
//! MSB at bit 29, so `0x2000_0000` is zero volts differential. The `*_code_to_voltage`
//! functions operate on that format.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;
use embedded_hal::i2c::I2c;
use embedded_hal::spi::SpiDevice;
use libm::floorf;
use log::debug;

use crate::bus::{retry_on_nack, I2cExt, SpiExt};
use crate::convert::LinearCalibration;
use crate::encode::{i2c_to_spi_format, left_justify_24, ping_pong};
use crate::{Error, Result};

/// Code that reads as zero volts
pub const MIDSCALE: i32 = 0x2000_0000;

/// Channel a ping-pong converter reported, with the channel bits cleared from the code
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct PingPong {
    /// Channel 0 or 1
    pub channel: u8,
    /// Conversion result
    pub code: i32,
}

/// SPI member of the family. Each read is one chip-select frame.
#[derive(Debug)]
pub struct SpiAdc<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> SpiAdc<SPI> {
    /// Wrap an SPI device
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Poll SDO until the converter pulls it low to signal end of conversion
    pub fn wait_for_eoc<P, D>(
        &mut self,
        miso: &mut P,
        delay: &mut D,
        timeout_ms: u32,
    ) -> Result<(), SPI::Error>
    where
        P: InputPin,
        D: DelayNs + ?Sized,
    {
        let mut waited = 0;
        while miso.is_high().map_err(|_| Error::Pin)? {
            if waited >= timeout_ms {
                debug!("no end of conversion after {} ms", waited);
                return Err(Error::Timeout);
            }
            waited += 1;
            delay.delay_ms(1);
        }
        Ok(())
    }

    fn frame32(&mut self, tx: [u8; 4]) -> Result<u32, SPI::Error> {
        let mut rx = [0u8; 4];
        self.spi.transfer_block(&tx, &mut rx)?;
        Ok(u32::from_be_bytes(rx))
    }

    fn frame24(&mut self, tx: [u8; 3]) -> Result<u32, SPI::Error> {
        let mut rx = [0u8; 3];
        self.spi.transfer_block(&tx, &mut rx)?;
        Ok(left_justify_24(rx))
    }

    /// 32-bit result, no configuration
    pub fn read_32(&mut self) -> Result<i32, SPI::Error> {
        Ok(self.frame32([0; 4])? as i32)
    }

    /// 32-bit result after an 8-bit configuration
    pub fn read_32_command8(&mut self, command: u8) -> Result<i32, SPI::Error> {
        Ok(self.frame32([command, 0, 0, 0])? as i32)
    }

    /// 32-bit result after a 16-bit configuration
    pub fn read_32_command16(&mut self, command: u16) -> Result<i32, SPI::Error> {
        let [high, low] = command.to_be_bytes();
        Ok(self.frame32([high, low, 0, 0])? as i32)
    }

    /// 32-bit result of a two channel ping-pong converter
    pub fn read_ping_pong_32(&mut self) -> Result<PingPong, SPI::Error> {
        let (channel, code) = ping_pong(self.frame32([0; 4])?);
        Ok(PingPong { channel, code })
    }

    /// 24-bit result, no configuration
    pub fn read_24(&mut self) -> Result<i32, SPI::Error> {
        Ok(self.frame24([0; 3])? as i32)
    }

    /// 24-bit result after an 8-bit configuration
    pub fn read_24_command8(&mut self, command: u8) -> Result<i32, SPI::Error> {
        Ok(self.frame24([command, 0, 0])? as i32)
    }

    /// 24-bit result after a 16-bit configuration
    pub fn read_24_command16(&mut self, command: u16) -> Result<i32, SPI::Error> {
        let [high, low] = command.to_be_bytes();
        Ok(self.frame24([high, low, 0])? as i32)
    }

    /// 24-bit result of a two channel ping-pong converter
    pub fn read_ping_pong_24(&mut self) -> Result<PingPong, SPI::Error> {
        let (channel, code) = ping_pong(self.frame24([0; 3])?);
        Ok(PingPong { channel, code })
    }

    /// Destroy the driver, return the wrapped SPI device
    pub fn destroy(self) -> SPI {
        self.spi
    }
}

/// I2C member of the family. The converter NACKs while busy, so reads retry until
/// `timeout_ms` has passed.
#[derive(Debug)]
pub struct I2cAdc<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> I2cAdc<I2C> {
    /// Converter at `address`
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// 32-bit result, no configuration
    pub fn read_32<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        timeout_ms: u32,
    ) -> Result<i32, I2C::Error> {
        let (i2c, address) = (&mut self.i2c, self.address);
        let mut data = [0u8; 4];
        retry_on_nack(delay, timeout_ms, || i2c.read_block(address, &mut data))?;
        Ok(i2c_to_spi_format(u32::from_be_bytes(data)))
    }

    /// 32-bit result after an 8-bit configuration
    pub fn read_32_command8<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        command: u8,
        timeout_ms: u32,
    ) -> Result<i32, I2C::Error> {
        let (i2c, address) = (&mut self.i2c, self.address);
        let mut data = [0u8; 4];
        retry_on_nack(delay, timeout_ms, || {
            i2c.read_block_data(address, command, &mut data)
        })?;
        Ok(i2c_to_spi_format(u32::from_be_bytes(data)))
    }

    /// 32-bit result after a 16-bit configuration
    pub fn read_32_command16<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        command: u16,
        timeout_ms: u32,
    ) -> Result<i32, I2C::Error> {
        let (i2c, address) = (&mut self.i2c, self.address);
        let mut data = [0u8; 4];
        retry_on_nack(delay, timeout_ms, || {
            i2c.two_byte_command_read_block(address, command, &mut data)
        })?;
        Ok(i2c_to_spi_format(u32::from_be_bytes(data)))
    }

    /// 24-bit result after an 8-bit configuration
    pub fn read_24_command8<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        command: u8,
        timeout_ms: u32,
    ) -> Result<i32, I2C::Error> {
        let (i2c, address) = (&mut self.i2c, self.address);
        let mut data = [0u8; 3];
        retry_on_nack(delay, timeout_ms, || {
            i2c.read_block_data(address, command, &mut data)
        })?;
        Ok(i2c_to_spi_format(left_justify_24(data)))
    }

    /// Destroy the driver, return the wrapped I2C
    pub fn destroy(self) -> I2C {
        self.i2c
    }
}

/// Single-ended input voltage. Codes are two's complement 32-bit words, so a frame read with
/// /EOC still high wraps instead of failing.
pub fn se_code_to_voltage(code: i32, vref: f32) -> f32 {
    code.wrapping_sub(MIDSCALE) as f32 / 268_435_456.0 * vref
}

/// Differential input voltage. A code of 0 is what the 2X mode of some parts returns for
/// zero input and reads as zero.
pub fn diff_code_to_voltage(code: i32, vref: f32) -> f32 {
    let code = if code == 0 { MIDSCALE } else { code };
    code.wrapping_sub(MIDSCALE) as f32 / 536_870_912.0 * vref
}

/// Differential input voltage using a two-point calibration
pub fn diff_code_to_calibrated_voltage(code: i32, calibration: &LinearCalibration) -> f32 {
    let code = if code == 0 { MIDSCALE } else { code };
    calibration.value(code.wrapping_sub(MIDSCALE))
}

/// Calibrate from a zero and a full scale reading. `None` if both codes are equal.
pub fn calibrate(
    zero_code: i32,
    fs_code: i32,
    zero_voltage: f32,
    fs_voltage: f32,
) -> Option<LinearCalibration> {
    let zero = zero_code.wrapping_sub(MIDSCALE);
    let fs = fs_code.wrapping_sub(MIDSCALE);
    if zero == fs {
        return None;
    }
    let lsb = (fs_voltage - zero_voltage) / (fs as i64 - zero as i64) as f32;
    // round half up
    let offset = floorf(zero_voltage / lsb - zero as f32 + 0.5) as i32;
    Some(LinearCalibration::new(lsb, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate std;
    use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};
    use embedded_hal_mock::eh1::MockError;
    use std::vec;

    fn close(a: f32, b: f32) -> bool {
        libm::fabsf(a - b) < 1e-5
    }

    #[test]
    fn spi_reads() {
        let expectations = [
            SpiTransaction::transaction_start(),
            SpiTransaction::transfer(vec![0xb0, 0x80, 0x00, 0x00], vec![0x20, 0x00, 0x01, 0x00]),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::transfer(vec![0xa0, 0x00, 0x00], vec![0x30, 0x00, 0x01]),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::transfer(vec![0x00, 0x00, 0x00, 0x00], vec![0x60, 0x00, 0x00, 0x10]),
            SpiTransaction::transaction_end(),
        ];
        let mut adc = SpiAdc::new(SpiMock::new(&expectations));

        assert_eq!(adc.read_32_command16(0xb080).unwrap(), 0x2000_0100);
        assert_eq!(adc.read_24_command8(0xa0).unwrap(), 0x3000_0100);
        assert_eq!(
            adc.read_ping_pong_32().unwrap(),
            PingPong {
                channel: 1,
                code: 0x2000_0010
            }
        );

        adc.destroy().done();
    }

    #[test]
    fn eoc_wait() {
        let mut pin = PinMock::new(&[
            PinTransaction::get(State::High),
            PinTransaction::get(State::High),
            PinTransaction::get(State::Low),
        ]);
        let idle: [SpiTransaction<u8>; 0] = [];
        let mut adc = SpiAdc::new(SpiMock::new(&idle));
        let mut delay = NoopDelay::new();

        adc.wait_for_eoc(&mut pin, &mut delay, 5).unwrap();

        pin.done();
        adc.destroy().done();
    }

    #[test]
    fn eoc_timeout() {
        let mut pin = PinMock::new(&[
            PinTransaction::get(State::High),
            PinTransaction::get(State::High),
            PinTransaction::get(State::High),
        ]);
        let idle: [SpiTransaction<u8>; 0] = [];
        let mut adc = SpiAdc::new(SpiMock::new(&idle));
        let mut delay = NoopDelay::new();

        assert_eq!(adc.wait_for_eoc(&mut pin, &mut delay, 2), Err(Error::Timeout));

        pin.done();
        adc.destroy().done();
    }

    #[test]
    fn eoc_pin_failure() {
        let mut pin = PinMock::new(&[PinTransaction::get(State::High)
            .with_error(MockError::Io(std::io::ErrorKind::NotConnected))]);
        let idle: [SpiTransaction<u8>; 0] = [];
        let mut adc = SpiAdc::new(SpiMock::new(&idle));
        let mut delay = NoopDelay::new();

        assert_eq!(adc.wait_for_eoc(&mut pin, &mut delay, 2), Err(Error::Pin));

        pin.done();
        adc.destroy().done();
    }

    #[test]
    fn frame_with_eoc_high_wraps() {
        let expectations = [
            SpiTransaction::transaction_start(),
            SpiTransaction::transfer(vec![0x00, 0x00, 0x00], vec![0x80, 0x00, 0x00]),
            SpiTransaction::transaction_end(),
        ];
        let mut adc = SpiAdc::new(SpiMock::new(&expectations));

        let code = adc.read_24().unwrap();
        assert_eq!(code, i32::MIN);
        assert!(close(se_code_to_voltage(code, 5.0), 30.0));
        assert!(close(diff_code_to_voltage(code, 5.0), 15.0));
        assert!(calibrate(i32::MIN, i32::MAX, 0.0, 1.0).is_some());

        adc.destroy().done();
    }

    #[test]
    fn i2c_read_moves_to_spi_format() {
        let nack = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);
        let expectations = [
            I2cTransaction::write_read(0x24, vec![0xb0], vec![0; 4]).with_error(nack),
            I2cTransaction::write_read(0x24, vec![0xb0], vec![0xc0, 0x00, 0x00, 0x03]),
            I2cTransaction::read(0x24, vec![0x80, 0x00, 0x00, 0x00]),
        ];
        let mut adc = I2cAdc::new(I2cMock::new(&expectations), 0x24);
        let mut delay = NoopDelay::new();

        assert_eq!(adc.read_32_command8(&mut delay, 0xb0, 10).unwrap(), 0x3000_0000);
        assert_eq!(adc.read_32(&mut delay, 10).unwrap(), MIDSCALE);

        adc.destroy().done();
    }

    #[test]
    fn voltages() {
        assert!(close(se_code_to_voltage(MIDSCALE, 5.0), 0.0));
        assert!(close(se_code_to_voltage(0x3000_0000, 5.0), 5.0));
        assert!(close(diff_code_to_voltage(0x3000_0000, 5.0), 2.5));
        assert!(close(diff_code_to_voltage(0, 5.0), 0.0));
    }

    #[test]
    fn calibration_round_trip() {
        let cal = calibrate(MIDSCALE + 100, MIDSCALE + 100_100, 0.0, 1.0).unwrap();
        assert!(close(cal.lsb, 1.0e-5));
        assert_eq!(cal.offset, -100);
        assert!(close(diff_code_to_calibrated_voltage(MIDSCALE + 50_100, &cal), 0.5));
        assert_eq!(calibrate(5, 5, 0.0, 1.0), None);
    }
}
