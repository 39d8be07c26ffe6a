//! QuikEval demo board EEPROM.
//!
//! Every QuikEval compatible demo board carries a small I2C EEPROM. Its first bytes hold a
//! comma separated ID string naming the part and the demo board, and boards that support
//! calibration keep a key at [`CAL_STATUS_ADDRESS`] followed by their calibration constants.
//!
//! ```
//! # use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
//! use linduino::eeprom::Eeprom;
//! # let mut id = b"LTC2654-L16,Cls,D2636,01,01,DC,DC1678A-A,-------\n".to_vec();
//! # id.resize(52, 0xff);
//! # let i2c = Mock::new(&[Transaction::write_read(0x50, vec![0x00], id)]);
//! let mut eeprom = Eeprom::new(i2c);
//! let mut buf = [0u8; 52];
//! let board = eeprom.discover_demo_board("DC1678", &mut buf).unwrap().unwrap();
//! assert_eq!(board.product, "LTC2654-L16");
//! assert_eq!(board.option, Some('A'));
//! # eeprom.destroy().done();
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, warn};

use crate::bus::{retry_on_nack, I2cExt};
use crate::{Error, Result};

/// 7-bit address of the demo board EEPROM
pub const ADDRESS: u8 = 0x50;
/// Capacity in bytes
pub const SIZE: usize = 256;
/// Bytes per page write
pub const PAGE_SIZE: usize = 16;
/// Longest write cycle, in milliseconds
pub const TIMEOUT_MS: u32 = 10;
/// Length of the ID string
pub const ID_SIZE: usize = 50;
/// Byte terminating the ID string
pub const ID_TERMINATOR: u8 = b'\n';
/// Location of the calibration key
pub const CAL_STATUS_ADDRESS: u8 = 0x40;
/// Key marking a board as calibrated
pub const CAL_KEY: i16 = 0x1234;

/// Demo board identification parsed from the ID string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct BoardId<'a> {
    /// Part on the board, e.g. `LTC2654-L16`
    pub product: &'a str,
    /// Six character demo board name, e.g. `DC1678`
    pub board: &'a str,
    /// Assembly option letter following the `-` in the board field
    pub option: Option<char>,
}

impl<'a> BoardId<'a> {
    /// Parse an ID string such as `LTC2654-L16,Cls,D2636,01,01,DC,DC1678A-A,-------`.
    ///
    /// The product is everything before the first comma and the board name sits between the
    /// sixth and seventh commas. Some boards leave out the seventh comma, in which case the
    /// name runs up to the trailing dashes.
    pub fn parse(id: &'a str) -> Option<Self> {
        let id = id.trim_end_matches(|c: char| c == '\n' || c == '\r' || c == '\0');
        let mut commas = id.match_indices(',').map(|(i, _)| i);

        let product_end = commas.next()?;
        let board_start = commas.nth(4)? + 1;
        let raw = match commas.next() {
            Some(end) => &id[board_start..end],
            None => id[board_start..].trim_end_matches('-'),
        };

        let option = raw
            .rfind('-')
            .and_then(|i| raw[i + 1..].chars().next())
            .filter(|c| c.is_ascii_uppercase());

        Some(Self {
            product: &id[..product_end],
            board: raw.get(..6).unwrap_or(raw),
            option,
        })
    }
}

/// Driver for the demo board EEPROM
#[derive(Debug)]
pub struct Eeprom<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Eeprom<I2C> {
    /// EEPROM at the standard QuikEval address
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, ADDRESS)
    }

    /// EEPROM at a different address, e.g. behind an address translator
    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Wait for the EEPROM to acknowledge its address, which it only does once a write cycle
    /// has completed.
    pub fn poll<D: DelayNs + ?Sized>(&mut self, delay: &mut D) -> Result<(), I2C::Error> {
        let address = self.address;
        let i2c = &mut self.i2c;
        retry_on_nack(delay, TIMEOUT_MS, || {
            i2c.write(address, &[]).map_err(Error::Bus)
        })
    }

    /// Read one byte
    pub fn read_byte(&mut self, address: u8) -> Result<u8, I2C::Error> {
        self.i2c.read_byte_data(self.address, address)
    }

    /// Sequential read filling `buf` starting at `address`
    pub fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), I2C::Error> {
        check_bounds::<I2C::Error>(address, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        self.i2c.read_block_data(self.address, address, buf)
    }

    /// Read up to and including `terminator`, returning the number of bytes that belong to
    /// the string. The read stops at the end of `buf` or of the EEPROM.
    pub fn read_until(
        &mut self,
        address: u8,
        terminator: u8,
        buf: &mut [u8],
    ) -> Result<usize, I2C::Error> {
        let len = buf.len().min(SIZE - address as usize);
        self.read(address, &mut buf[..len])?;
        Ok(buf[..len]
            .iter()
            .position(|&b| b == terminator)
            .map_or(len, |i| i + 1))
    }

    /// Write one byte and wait for the write cycle
    pub fn write_byte<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        address: u8,
        value: u8,
    ) -> Result<(), I2C::Error> {
        self.i2c.write_byte_data(self.address, address, value)?;
        self.poll(delay)
    }

    /// Write `data` starting at `address`, split on page boundaries
    pub fn write<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        address: u8,
        data: &[u8],
    ) -> Result<(), I2C::Error> {
        check_bounds::<I2C::Error>(address, data.len())?;

        let mut at = address as usize;
        let mut rest = data;
        while !rest.is_empty() {
            let room = PAGE_SIZE - at % PAGE_SIZE;
            let (page, tail) = rest.split_at(room.min(rest.len()));
            debug!("eeprom page write @0x{:02x}, {} bytes", at, page.len());
            self.i2c.write_block_data(self.address, at as u8, page)?;
            self.poll(delay)?;
            at += page.len();
            rest = tail;
        }
        Ok(())
    }

    /// Little-endian `i16`
    pub fn read_i16(&mut self, address: u8) -> Result<i16, I2C::Error> {
        let mut buf = [0u8; 2];
        self.read(address, &mut buf)?;
        Ok(i16::from_le_bytes(buf))
    }

    /// Store a little-endian `i16`
    pub fn write_i16<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        address: u8,
        value: i16,
    ) -> Result<(), I2C::Error> {
        self.write(delay, address, &value.to_le_bytes())
    }

    /// Little-endian `i32`
    pub fn read_i32(&mut self, address: u8) -> Result<i32, I2C::Error> {
        let mut buf = [0u8; 4];
        self.read(address, &mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Store a little-endian `i32`
    pub fn write_i32<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        address: u8,
        value: i32,
    ) -> Result<(), I2C::Error> {
        self.write(delay, address, &value.to_le_bytes())
    }

    /// Little-endian IEEE-754 `f32`
    pub fn read_f32(&mut self, address: u8) -> Result<f32, I2C::Error> {
        let mut buf = [0u8; 4];
        self.read(address, &mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    /// Store a little-endian IEEE-754 `f32`
    pub fn write_f32<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        address: u8,
        value: f32,
    ) -> Result<(), I2C::Error> {
        self.write(delay, address, &value.to_le_bytes())
    }

    /// Mark the board as calibrated
    pub fn enable_calibration<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), I2C::Error> {
        self.write_i16(delay, CAL_STATUS_ADDRESS, CAL_KEY)
    }

    /// Erase the calibration key
    pub fn disable_calibration<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), I2C::Error> {
        self.write_i16(delay, CAL_STATUS_ADDRESS, -1)
    }

    /// `true` if the calibration key is present
    pub fn calibration_enabled(&mut self) -> Result<bool, I2C::Error> {
        Ok(self.read_i16(CAL_STATUS_ADDRESS)? == CAL_KEY)
    }

    /// Read the ID string into `buf` and parse it. `None` if the EEPROM holds no readable ID.
    pub fn read_id<'b>(&mut self, buf: &'b mut [u8]) -> Result<Option<BoardId<'b>>, I2C::Error> {
        let len = buf.len().min(ID_SIZE + 2);
        let count = self.read_until(0, ID_TERMINATOR, &mut buf[..len])?;
        let buf: &'b [u8] = buf;
        Ok(core::str::from_utf8(&buf[..count])
            .ok()
            .and_then(BoardId::parse))
    }

    /// Read the ID and check it names the demo board `name`
    pub fn discover_demo_board<'b>(
        &mut self,
        name: &str,
        buf: &'b mut [u8],
    ) -> Result<Option<BoardId<'b>>, I2C::Error> {
        match self.read_id(buf)? {
            Some(id) if id.board == name => {
                debug!("found {} with {}", id.board, id.product);
                Ok(Some(id))
            }
            Some(id) => {
                warn!("demo board {} not found, found {} instead", name, id.board);
                Ok(None)
            }
            None => {
                warn!("demo board {} not found, no ID string", name);
                Ok(None)
            }
        }
    }

    /// Destroy the driver, return the wrapped I2C
    pub fn destroy(self) -> I2C {
        self.i2c
    }
}

fn check_bounds<E>(address: u8, len: usize) -> Result<(), E> {
    if address as usize + len > SIZE {
        Err(Error::OutOfRange)
    } else {
        Ok(())
    }
}
