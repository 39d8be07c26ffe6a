//! Byte-level I2C and SPI helpers shared by the chip drivers.
//!
//! Every chip on a Linduino shield talks one of a handful of framings: a bare byte, a command
//! byte followed by a byte or a big-endian word, or a command followed by a block read. The
//! [`I2cExt`] and [`SpiExt`] extension traits provide those framings on top of any
//! `embedded-hal` bus so the drivers only deal with registers.
//!
//! SMBus parts that check packets get the `*_pec` variants. Those append or verify a
//! [`pec`] byte and use SMBus byte order: words LSB first, blocks led by a byte count.

use crc::{Crc, CRC_8_SMBUS};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as I2cError, ErrorKind, I2c};
use embedded_hal::spi::SpiDevice;
use log::{debug, trace};

use crate::{Error, Result};

/// Longest block accepted by [`I2cExt::write_block_data`] and the SMBus block calls
pub const MAX_BLOCK: usize = 32;

/// CRC-8 with polynomial x^8 + x^2 + x + 1, zero initial value
pub const PEC: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Packet error code over every byte of a transaction, address bytes included
pub fn pec(bytes: &[u8]) -> u8 {
    PEC.checksum(bytes)
}

/// `true` if `code` is the packet error code of a read of `data` after `command`
fn read_pec_matches(address: u8, command: u8, data: &[u8], code: u8) -> bool {
    let mut digest = PEC.digest();
    digest.update(&[address << 1, command, (address << 1) | 1]);
    digest.update(data);
    let expected = digest.finalize();
    if expected != code {
        debug!(
            "PEC from 0x{:02x}[{:02x}]: {:02x}, expected {:02x}",
            address, command, code, expected
        );
    }
    expected == code
}

/// Register framings on top of an I2C bus. Addresses are 7-bit.
pub trait I2cExt: I2c {
    /// Read a single byte without sending a command first
    fn read_byte(&mut self, address: u8) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.read(address, &mut buf).map_err(Error::Bus)?;
        trace!("R @0x{:02x}={:02x}", address, buf[0]);
        Ok(buf[0])
    }

    /// Write a single byte without a command
    fn write_byte(&mut self, address: u8, value: u8) -> Result<(), Self::Error> {
        trace!("W @0x{:02x}={:02x}", address, value);
        self.write(address, &[value]).map_err(Error::Bus)
    }

    /// Send `command`, then read one byte after a repeated start
    fn read_byte_data(&mut self, address: u8, command: u8) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.write_read(address, &[command], &mut buf)
            .map_err(Error::Bus)?;
        trace!("R @0x{:02x}[{:02x}]={:02x}", address, command, buf[0]);
        Ok(buf[0])
    }

    /// Send `command` followed by one data byte
    fn write_byte_data(&mut self, address: u8, command: u8, value: u8) -> Result<(), Self::Error> {
        trace!("W @0x{:02x}[{:02x}]={:02x}", address, command, value);
        self.write(address, &[command, value]).map_err(Error::Bus)
    }

    /// Send `command`, then read a word MSB first
    fn read_word_data(&mut self, address: u8, command: u8) -> Result<u16, Self::Error> {
        let mut buf = [0u8; 2];
        self.write_read(address, &[command], &mut buf)
            .map_err(Error::Bus)?;
        let value = u16::from_be_bytes(buf);
        trace!("R @0x{:02x}[{:02x}]={:04x}", address, command, value);
        Ok(value)
    }

    /// Send `command` followed by a word MSB first
    fn write_word_data(&mut self, address: u8, command: u8, value: u16) -> Result<(), Self::Error> {
        trace!("W @0x{:02x}[{:02x}]={:04x}", address, command, value);
        let [msb, lsb] = value.to_be_bytes();
        self.write(address, &[command, msb, lsb])
            .map_err(Error::Bus)
    }

    /// Send `command`, then fill `values` in the order the bytes arrive
    fn read_block_data(
        &mut self,
        address: u8,
        command: u8,
        values: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.write_read(address, &[command], values)
            .map_err(Error::Bus)?;
        trace!("R @0x{:02x}[{:02x}]={:02x?}", address, command, values);
        Ok(())
    }

    /// Fill `values` from the device without sending a command
    fn read_block(&mut self, address: u8, values: &mut [u8]) -> Result<(), Self::Error> {
        self.read(address, values).map_err(Error::Bus)?;
        trace!("R @0x{:02x}={:02x?}", address, values);
        Ok(())
    }

    /// Send `command` followed by up to [`MAX_BLOCK`] bytes of `values` in one transfer
    fn write_block_data(
        &mut self,
        address: u8,
        command: u8,
        values: &[u8],
    ) -> Result<(), Self::Error> {
        if values.len() > MAX_BLOCK {
            return Err(Error::OutOfRange);
        }
        trace!("W @0x{:02x}[{:02x}]={:02x?}", address, command, values);
        let mut frame = [0u8; MAX_BLOCK + 1];
        frame[0] = command;
        frame[1..=values.len()].copy_from_slice(values);
        self.write(address, &frame[..=values.len()])
            .map_err(Error::Bus)
    }

    /// Send a 16-bit command MSB first, then fill `values`
    fn two_byte_command_read_block(
        &mut self,
        address: u8,
        command: u16,
        values: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.write_read(address, &command.to_be_bytes(), values)
            .map_err(Error::Bus)?;
        trace!("R @0x{:02x}[{:04x}]={:02x?}", address, command, values);
        Ok(())
    }

    /// SMBus write byte followed by its packet error code
    fn write_byte_data_pec(
        &mut self,
        address: u8,
        command: u8,
        value: u8,
    ) -> Result<(), Self::Error> {
        trace!("W @0x{:02x}[{:02x}]={:02x} +PEC", address, command, value);
        let code = pec(&[address << 1, command, value]);
        self.write(address, &[command, value, code])
            .map_err(Error::Bus)
    }

    /// SMBus read byte. Fails with [`Error::Mismatch`] on a bad packet error code.
    fn read_byte_data_pec(&mut self, address: u8, command: u8) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 2];
        self.write_read(address, &[command], &mut buf)
            .map_err(Error::Bus)?;
        trace!("R @0x{:02x}[{:02x}]={:02x?} +PEC", address, command, buf);
        if !read_pec_matches(address, command, &buf[..1], buf[1]) {
            return Err(Error::Mismatch);
        }
        Ok(buf[0])
    }

    /// SMBus write word, LSB first, followed by its packet error code
    fn write_word_data_pec(
        &mut self,
        address: u8,
        command: u8,
        value: u16,
    ) -> Result<(), Self::Error> {
        trace!("W @0x{:02x}[{:02x}]={:04x} +PEC", address, command, value);
        let [lsb, msb] = value.to_le_bytes();
        let code = pec(&[address << 1, command, lsb, msb]);
        self.write(address, &[command, lsb, msb, code])
            .map_err(Error::Bus)
    }

    /// SMBus read word, LSB first. Fails with [`Error::Mismatch`] on a bad packet error code.
    fn read_word_data_pec(&mut self, address: u8, command: u8) -> Result<u16, Self::Error> {
        let mut buf = [0u8; 3];
        self.write_read(address, &[command], &mut buf)
            .map_err(Error::Bus)?;
        trace!("R @0x{:02x}[{:02x}]={:02x?} +PEC", address, command, buf);
        if !read_pec_matches(address, command, &buf[..2], buf[2]) {
            return Err(Error::Mismatch);
        }
        Ok(u16::from_le_bytes([buf[0], buf[1]]))
    }

    /// SMBus block write: byte count, up to [`MAX_BLOCK`] bytes, packet error code
    fn write_block_data_pec(
        &mut self,
        address: u8,
        command: u8,
        values: &[u8],
    ) -> Result<(), Self::Error> {
        let len = values.len();
        if len > MAX_BLOCK {
            return Err(Error::OutOfRange);
        }
        trace!("W @0x{:02x}[{:02x}]={:02x?} +PEC", address, command, values);
        let mut frame = [0u8; MAX_BLOCK + 3];
        frame[0] = command;
        frame[1] = len as u8;
        frame[2..2 + len].copy_from_slice(values);
        let mut digest = PEC.digest();
        digest.update(&[address << 1]);
        digest.update(&frame[..2 + len]);
        frame[2 + len] = digest.finalize();
        self.write(address, &frame[..3 + len])
            .map_err(Error::Bus)
    }

    /// SMBus block read into `values`, returning the byte count the device sent.
    ///
    /// Reads `values.len()` data bytes plus the count and the packet error code. A count larger
    /// than `values` fails with [`Error::OutOfRange`], a bad packet error code with
    /// [`Error::Mismatch`].
    fn read_block_data_pec(
        &mut self,
        address: u8,
        command: u8,
        values: &mut [u8],
    ) -> Result<usize, Self::Error> {
        if values.len() > MAX_BLOCK {
            return Err(Error::OutOfRange);
        }
        let mut buf = [0u8; MAX_BLOCK + 2];
        let frame = &mut buf[..values.len() + 2];
        self.write_read(address, &[command], frame)
            .map_err(Error::Bus)?;
        trace!("R @0x{:02x}[{:02x}]={:02x?} +PEC", address, command, frame);
        let count = frame[0] as usize;
        if count > values.len() {
            debug!("block of {} bytes from 0x{:02x} does not fit", count, address);
            return Err(Error::OutOfRange);
        }
        if !read_pec_matches(address, command, &frame[..=count], frame[count + 1]) {
            return Err(Error::Mismatch);
        }
        values[..count].copy_from_slice(&frame[1..=count]);
        Ok(count)
    }

    /// Address the device without data. `true` if it acknowledged.
    fn poll(&mut self, address: u8) -> Result<bool, Self::Error> {
        match self.write(address, &[]) {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.kind(), ErrorKind::NoAcknowledge(_)) => {
                debug!("no ack from 0x{:02x}", address);
                Ok(false)
            }
            Err(e) => Err(Error::Bus(e)),
        }
    }
}

impl<T: I2c + ?Sized> I2cExt for T {}

/// `true` when the error is an I2C not-acknowledge
pub fn is_nack<E: I2cError>(error: &Error<E>) -> bool {
    match error {
        Error::Bus(e) => matches!(e.kind(), ErrorKind::NoAcknowledge(_)),
        _ => false,
    }
}

/// Run `op` until it stops failing with a not-acknowledge.
///
/// Converters that are still busy NACK their address. Between attempts this waits 1 ms, and
/// gives up with [`Error::Timeout`] after `timeout_ms` such waits. Any other error is returned
/// straight away.
pub fn retry_on_nack<T, E, D, F>(delay: &mut D, timeout_ms: u32, mut op: F) -> Result<T, E>
where
    E: I2cError,
    D: DelayNs + ?Sized,
    F: FnMut() -> Result<T, E>,
{
    let mut waited = 0;
    loop {
        match op() {
            Err(ref e) if is_nack(e) => {
                if waited >= timeout_ms {
                    debug!("gave up after {} ms without ack", waited);
                    return Err(Error::Timeout);
                }
                waited += 1;
                delay.delay_ms(1);
            }
            other => return other,
        }
    }
}

/// Framings on top of an SPI device. Each call is one chip-select frame.
pub trait SpiExt: SpiDevice {
    /// Exchange one byte
    fn transfer_byte(&mut self, tx: u8) -> Result<u8, Self::Error> {
        let mut rx = [0u8; 1];
        self.transfer(&mut rx, &[tx]).map_err(Error::Bus)?;
        trace!("SPI {:02x}->{:02x}", tx, rx[0]);
        Ok(rx[0])
    }

    /// Exchange a word, MSB first
    fn transfer_word(&mut self, tx: u16) -> Result<u16, Self::Error> {
        let mut rx = [0u8; 2];
        self.transfer(&mut rx, &tx.to_be_bytes())
            .map_err(Error::Bus)?;
        let value = u16::from_be_bytes(rx);
        trace!("SPI {:04x}->{:04x}", tx, value);
        Ok(value)
    }

    /// Exchange equally long blocks in wire order
    fn transfer_block(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::Error> {
        if tx.len() != rx.len() {
            return Err(Error::OutOfRange);
        }
        self.transfer(rx, tx).map_err(Error::Bus)?;
        trace!("SPI {:02x?}->{:02x?}", tx, rx);
        Ok(())
    }

    /// Clock out a block, ignoring what comes back
    fn write_block(&mut self, tx: &[u8]) -> Result<(), Self::Error> {
        trace!("SPI {:02x?}", tx);
        self.write(tx).map_err(Error::Bus)
    }
}

impl<T: SpiDevice + ?Sized> SpiExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate std;
    use embedded_hal::i2c::NoAcknowledgeSource;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};
    use std::vec;

    const NACK: ErrorKind = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);

    #[test]
    fn word_data_is_msb_first() {
        let expectations = [
            I2cTransaction::write(0x10, vec![0x30, 0x12, 0x34]),
            I2cTransaction::write_read(0x10, vec![0x02], vec![0xab, 0xcd]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        i2c.write_word_data(0x10, 0x30, 0x1234).unwrap();
        assert_eq!(i2c.read_word_data(0x10, 0x02).unwrap(), 0xabcd);

        i2c.done();
    }

    #[test]
    fn block_read_keeps_wire_order() {
        let expectations = [
            I2cTransaction::write_read(0x14, vec![0x04], vec![1, 2, 3, 4]),
            I2cTransaction::write(0x14, vec![0x20, 5, 6, 7]),
            I2cTransaction::write_read(0x14, vec![0x12, 0x34], vec![9, 8]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut buf = [0u8; 4];
        i2c.read_block_data(0x14, 0x04, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);

        i2c.write_block_data(0x14, 0x20, &[5, 6, 7]).unwrap();

        let mut buf = [0u8; 2];
        i2c.two_byte_command_read_block(0x14, 0x1234, &mut buf)
            .unwrap();
        assert_eq!(buf, [9, 8]);

        i2c.done();
    }

    #[test]
    fn poll_reports_ack_and_nack() {
        let expectations = [
            I2cTransaction::write(0x50, vec![]),
            I2cTransaction::write(0x50, vec![]).with_error(NACK),
            I2cTransaction::write(0x50, vec![]).with_error(ErrorKind::Bus),
        ];
        let mut i2c = I2cMock::new(&expectations);

        assert!(i2c.poll(0x50).unwrap());
        assert!(!i2c.poll(0x50).unwrap());
        assert_eq!(i2c.poll(0x50), Err(Error::Bus(ErrorKind::Bus)));

        i2c.done();
    }

    #[test]
    fn retry_waits_out_busy_device() {
        let expectations = [
            I2cTransaction::read(0x14, vec![0]).with_error(NACK),
            I2cTransaction::read(0x14, vec![0]).with_error(NACK),
            I2cTransaction::read(0x14, vec![0x5a]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = NoopDelay::new();

        let value = retry_on_nack(&mut delay, 10, || i2c.read_byte(0x14)).unwrap();
        assert_eq!(value, 0x5a);

        i2c.done();
    }

    #[test]
    fn retry_times_out() {
        let expectations = [
            I2cTransaction::read(0x14, vec![0]).with_error(NACK),
            I2cTransaction::read(0x14, vec![0]).with_error(NACK),
            I2cTransaction::read(0x14, vec![0]).with_error(NACK),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = NoopDelay::new();

        let result = retry_on_nack(&mut delay, 2, || i2c.read_byte(0x14));
        assert_eq!(result, Err(Error::Timeout));

        i2c.done();
    }

    #[test]
    fn retry_without_timeout_tries_once() {
        let expectations = [I2cTransaction::read(0x14, vec![0]).with_error(NACK)];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = NoopDelay::new();

        let result = retry_on_nack(&mut delay, 0, || i2c.read_byte(0x14));
        assert_eq!(result, Err(Error::Timeout));

        i2c.done();
    }

    #[test]
    fn pec_is_crc8_smbus() {
        assert_eq!(pec(b"123456789"), 0xf4);
        assert_eq!(pec(&[]), 0x00);
    }

    #[test]
    fn byte_and_word_with_pec() {
        let expectations = [
            I2cTransaction::write(0x5a, vec![0x01, 0x80, 0xdd]),
            I2cTransaction::write_read(0x5a, vec![0x20], vec![0x42, 0x44]),
            I2cTransaction::write(0x5a, vec![0x21, 0x34, 0x12, 0x3b]),
            I2cTransaction::write_read(0x5a, vec![0x8b], vec![0xcd, 0xab, 0x83]),
            I2cTransaction::write_read(0x5a, vec![0x8b], vec![0xcd, 0xab, 0x84]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        i2c.write_byte_data_pec(0x5a, 0x01, 0x80).unwrap();
        assert_eq!(i2c.read_byte_data_pec(0x5a, 0x20).unwrap(), 0x42);
        i2c.write_word_data_pec(0x5a, 0x21, 0x1234).unwrap();
        assert_eq!(i2c.read_word_data_pec(0x5a, 0x8b).unwrap(), 0xabcd);
        assert_eq!(i2c.read_word_data_pec(0x5a, 0x8b), Err(Error::Mismatch));

        i2c.done();
    }

    #[test]
    fn block_with_pec() {
        let expectations = [
            I2cTransaction::write(0x5a, vec![0x30, 3, 1, 2, 3, 0xc9]),
            I2cTransaction::write_read(0x5a, vec![0x9e], vec![2, 0x4c, 0x54, 0x16, 0x00, 0x00]),
            I2cTransaction::write_read(0x5a, vec![0x9e], vec![5, 0, 0, 0, 0, 0]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        i2c.write_block_data_pec(0x5a, 0x30, &[1, 2, 3]).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(i2c.read_block_data_pec(0x5a, 0x9e, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"LT");
        assert_eq!(
            i2c.read_block_data_pec(0x5a, 0x9e, &mut buf),
            Err(Error::OutOfRange)
        );
        assert_eq!(
            i2c.write_block_data_pec(0x5a, 0x30, &[0; MAX_BLOCK + 1]),
            Err(Error::OutOfRange)
        );

        i2c.done();
    }

    #[test]
    fn retry_passes_other_errors_through() {
        let expectations =
            [I2cTransaction::read(0x14, vec![0]).with_error(ErrorKind::ArbitrationLoss)];
        let mut i2c = I2cMock::new(&expectations);
        let mut delay = NoopDelay::new();

        let result = retry_on_nack(&mut delay, 5, || i2c.read_byte(0x14));
        assert_eq!(result, Err(Error::Bus(ErrorKind::ArbitrationLoss)));

        i2c.done();
    }

    #[test]
    fn spi_word_and_block() {
        let expectations = [
            SpiTransaction::transaction_start(),
            SpiTransaction::transfer(vec![0x07, 0x00], vec![0x00, 0x42]),
            SpiTransaction::transaction_end(),
            SpiTransaction::transaction_start(),
            SpiTransaction::transfer(vec![1, 2, 3], vec![4, 5, 6]),
            SpiTransaction::transaction_end(),
        ];
        let mut spi = SpiMock::new(&expectations);

        assert_eq!(spi.transfer_word(0x0700).unwrap(), 0x0042);
        let mut rx = [0u8; 3];
        spi.transfer_block(&[1, 2, 3], &mut rx).unwrap();
        assert_eq!(rx, [4, 5, 6]);
        assert_eq!(
            spi.transfer_block(&[1, 2], &mut rx),
            Err(Error::OutOfRange)
        );

        spi.done();
    }
}
