//! LTC6945 ultralow noise integer-N frequency synthesizer.
//!
//! Settings live in named bit fields spread over twelve 8-bit registers. A field may straddle
//! consecutive registers, with its most significant bits in the lower address. Each SPI frame
//! is a 16-bit word: the register address shifted left by one with the read flag in bit 0,
//! then the data byte.
//! ```
//! # use embedded_hal_mock::eh1::spi::{Mock, Transaction};
//! # use linduino::pll::{Field, Ltc6945};
//! # let spi = Mock::new(&[
//! #     Transaction::transaction_start(),
//! #     Transaction::transfer(vec![0x17, 0x00], vec![0x00, 0x45]),
//! #     Transaction::transaction_end(),
//! # ]);
//! let mut pll = Ltc6945::new(spi);
//! assert_eq!(pll.read_field(Field::PART).unwrap(), 0x05);
//! # pll.destroy().done();
//! ```

use embedded_hal::spi::SpiDevice;
use log::debug;

use crate::bus::SpiExt;
use crate::{Error, Result};

/// Number of registers
pub const NUM_REGISTERS: u8 = 12;
/// Lowest supported output frequency
pub const MIN_FREQ_HZ: u64 = 350_000_000;
/// Highest supported output frequency
pub const MAX_FREQ_HZ: u64 = 6_000_000_000;
/// Lowest supported reference frequency
pub const MIN_REF_FREQ_HZ: u64 = 10_000_000;
/// Highest supported reference frequency
pub const MAX_REF_FREQ_HZ: u64 = 250_000_000;
/// Largest output divider
pub const MAX_OUTPUT_DIVIDER: u64 = 6;

/// Location of a bit field in the register map
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Field {
    /// Register holding the most significant bits
    pub address: u8,
    /// Bit position of the field MSB within that register
    pub msb: u8,
    /// Width in bits
    pub bits: u8,
    /// Status fields cannot be written
    pub read_only: bool,
}

impl Field {
    const fn rw(address: u8, msb: u8, bits: u8) -> Self {
        Self {
            address,
            msb,
            bits,
            read_only: false,
        }
    }

    const fn ro(address: u8, msb: u8, bits: u8) -> Self {
        Self {
            address,
            msb,
            bits,
            read_only: true,
        }
    }

    /// Reference boost
    pub const BST: Field = Field::rw(0x08, 7, 1);
    /// Charge pump current
    pub const CP: Field = Field::rw(0x09, 3, 4);
    /// Charge pump clamp high
    pub const CPCHI: Field = Field::rw(0x0a, 7, 1);
    /// Charge pump clamp low
    pub const CPCLO: Field = Field::rw(0x0a, 6, 1);
    /// Force charge pump down
    pub const CPDN: Field = Field::rw(0x0a, 0, 1);
    /// Invert charge pump polarity
    pub const CPINV: Field = Field::rw(0x0a, 4, 1);
    /// Charge pump mid-rail bias
    pub const CPMID: Field = Field::rw(0x0a, 5, 1);
    /// Charge pump three-state
    pub const CPRST: Field = Field::rw(0x0a, 2, 1);
    /// Force charge pump up
    pub const CPUP: Field = Field::rw(0x0a, 1, 1);
    /// Extended charge pump pulse width
    pub const CPWIDE: Field = Field::rw(0x0a, 3, 1);
    /// Reference input filter
    pub const FILT: Field = Field::rw(0x08, 6, 2);
    /// Lock indicator count
    pub const LKCT: Field = Field::rw(0x09, 5, 2);
    /// Lock indicator enable
    pub const LKEN: Field = Field::rw(0x07, 0, 1);
    /// Lock indicator window
    pub const LKWIN: Field = Field::rw(0x09, 7, 2);
    /// PLL lock status
    pub const LOCK: Field = Field::ro(0x00, 2, 1);
    /// N divider
    pub const ND: Field = Field::rw(0x05, 7, 16);
    /// Output divider
    pub const OD: Field = Field::rw(0x08, 2, 3);
    /// Mute the RF output
    pub const OMUTE: Field = Field::rw(0x02, 1, 1);
    /// Part code
    pub const PART: Field = Field::ro(0x0b, 4, 5);
    /// Power down everything
    pub const PDALL: Field = Field::rw(0x02, 7, 1);
    /// Power down the output
    pub const PDOUT: Field = Field::rw(0x02, 4, 1);
    /// Power down the PLL
    pub const PDPLL: Field = Field::rw(0x02, 6, 1);
    /// Power down the reference output
    pub const PDREFO: Field = Field::rw(0x02, 3, 1);
    /// Power-on reset
    pub const POR: Field = Field::rw(0x02, 0, 1);
    /// R divider
    pub const RD: Field = Field::rw(0x03, 1, 10);
    /// Revision
    pub const REV: Field = Field::ro(0x0b, 7, 3);
    /// RF output power
    pub const RFO: Field = Field::rw(0x08, 4, 2);
    /// Tune voltage high
    pub const THI: Field = Field::ro(0x00, 1, 1);
    /// Tune voltage low
    pub const TLO: Field = Field::ro(0x00, 0, 1);
    /// PLL unlock status
    pub const UNLOCK: Field = Field::ro(0x00, 5, 1);
    /// Status mask
    pub const X: Field = Field::rw(0x01, 5, 6);

    fn mask(&self) -> u32 {
        if self.bits >= 32 {
            u32::MAX
        } else {
            (1u32 << self.bits) - 1
        }
    }
}

/// Output and VCO frequencies for [`Ltc6945::set_frf`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct FrequencyPlan {
    /// Reference frequency
    pub fref_hz: u64,
    /// Wanted output frequency
    pub frf_hz: u64,
    /// Lowest frequency the VCO tunes to
    pub vco_min_hz: u64,
    /// Highest frequency the VCO tunes to
    pub vco_max_hz: u64,
}

impl Default for FrequencyPlan {
    /// Plan for the demo board VCO
    fn default() -> Self {
        Self {
            fref_hz: 100_000_000,
            frf_hz: 914_000_000,
            vco_min_hz: 902_000_000,
            vco_max_hz: 928_000_000,
        }
    }
}

impl FrequencyPlan {
    /// Largest output divider that puts the VCO inside its tuning range
    pub fn output_divider(&self) -> Option<u64> {
        (1..=MAX_OUTPUT_DIVIDER).rev().find(|o| {
            let vco = self.frf_hz * o;
            vco >= self.vco_min_hz && vco <= self.vco_max_hz
        })
    }

    fn in_limits(&self) -> bool {
        (MIN_FREQ_HZ..=MAX_FREQ_HZ).contains(&self.frf_hz)
            && (MIN_REF_FREQ_HZ..=MAX_REF_FREQ_HZ).contains(&self.fref_hz)
    }
}

/// LTC6945 driver
#[derive(Debug)]
pub struct Ltc6945<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> Ltc6945<SPI> {
    /// Wrap an SPI device
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Read one register
    pub fn read(&mut self, address: u8) -> Result<u8, SPI::Error> {
        if address >= NUM_REGISTERS {
            return Err(Error::OutOfRange);
        }
        let word = self.spi.transfer_word((((address << 1) | 1) as u16) << 8)?;
        Ok(word as u8)
    }

    /// Write one register
    pub fn write(&mut self, address: u8, data: u8) -> Result<(), SPI::Error> {
        if address >= NUM_REGISTERS {
            return Err(Error::OutOfRange);
        }
        self.spi
            .transfer_word(((address << 1) as u16) << 8 | data as u16)?;
        Ok(())
    }

    /// Write registers 1 to 10 in order
    pub fn write_all(&mut self, registers: &[u8; 10]) -> Result<(), SPI::Error> {
        for (address, data) in (1..).zip(registers) {
            self.write(address, *data)?;
        }
        Ok(())
    }

    /// Read the registers a field spans, MSB register first. Returns the joined registers,
    /// how many were read and the right shift that aligns the field.
    fn read_span(&mut self, field: Field) -> Result<(u32, u8, u32), SPI::Error> {
        let mut value = 0u32;
        let mut count = 0u8;
        loop {
            let shift = (field.msb as i32 + 1) - (field.bits as i32 - 8 * count as i32);
            value = (value << 8) | self.read(field.address + count)? as u32;
            count += 1;
            if shift >= 0 || count == 4 {
                return Ok((value, count, shift.max(0) as u32));
            }
        }
    }

    /// Read a field
    pub fn read_field(&mut self, field: Field) -> Result<u32, SPI::Error> {
        let (value, _, shift) = self.read_span(field)?;
        Ok((value >> shift) & field.mask())
    }

    /// Replace the bits of a field, leaving the rest of its registers as they are
    pub fn write_field(&mut self, field: Field, data: u32) -> Result<(), SPI::Error> {
        if field.read_only || data > field.mask() {
            return Err(Error::OutOfRange);
        }
        let (current, count, shift) = self.read_span(field)?;
        let mask = field.mask() << shift;
        let desired = (current & !mask) | (data << shift);
        for i in 0..count {
            let byte = (desired >> (8 * (count - 1 - i) as u32)) as u8;
            self.write(field.address + i, byte)?;
        }
        Ok(())
    }

    /// Program the dividers for `plan`. Returns the output frequency actually reached.
    pub fn set_frf(&mut self, plan: &FrequencyPlan) -> Result<u64, SPI::Error> {
        if !plan.in_limits() {
            return Err(Error::OutOfRange);
        }
        let Some(o) = plan.output_divider() else {
            return Err(Error::OutOfRange);
        };
        let r = self.read_field(Field::RD)? as u64;
        if r == 0 {
            return Err(Error::OutOfRange);
        }
        let n = (plan.frf_hz * o * r + plan.fref_hz / 2) / plan.fref_hz;
        if n > Field::ND.mask() as u64 {
            return Err(Error::OutOfRange);
        }

        self.write_field(Field::OD, o as u32)?;
        self.write_field(Field::ND, n as u32)?;

        let actual = plan.fref_hz * n / r / o;
        debug!("ltc6945 O={} R={} N={} frf={} Hz", o, r, n, actual);
        Ok(actual)
    }

    /// Destroy the driver, return the wrapped SPI device
    pub fn destroy(self) -> SPI {
        self.spi
    }
}
