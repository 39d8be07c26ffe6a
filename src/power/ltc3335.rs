//! LTC3335 nanopower buck-boost converter with integrated coulomb counter.
//!
//! The coulomb counter accumulates discharged charge in an 8-bit register whose LSB weight is
//! set by the prescaler. The prescaler is picked so the battery capacity just fits into the
//! counter range. The register pointer is left at the last subaddress written, so polling the
//! same register only needs a read.
//! ```
//! # use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
//! # use linduino::power::ltc3335::*;
//! # let i2c = Mock::new(&[
//! #     Transaction::write(0x64, vec![0x01, 0xc8]),
//! #     Transaction::write(0x64, vec![0x02, 0xb6]),
//! #     Transaction::write(0x64, vec![0x05, 0x00]),
//! #     Transaction::write(0x64, vec![0x03]),
//! #     Transaction::read(0x64, vec![10]),
//! # ]);
//! let config = Config {
//!     ipeak: Ipeak::Ma100,
//!     voltage: OutputVoltage::V3_3,
//!     capacity_mah: 2400,
//!     alarm_mah: 2000,
//!     counter_test: false,
//!     correction: 0,
//! };
//! let mut converter = Ltc3335::init(i2c, config).unwrap();
//! assert_eq!(converter.prescaler(), 8);
//! // ten counts of 39547 mAs
//! assert_eq!(converter.discharged_capacity().unwrap(), 395_470);
//! # converter.destroy().done();
//! ```

use embedded_hal::i2c::I2c;
use log::debug;

use crate::bus::I2cExt;
use crate::Result;

/// Fixed bus address
pub const ADDRESS: u8 = 0x64;
/// Full scale switch on time in seconds
pub const TFS: f64 = 11.74e-6;
/// Typical quiescent current in amps
pub const IQ: f32 = 680e-9;
/// Largest prescaler
pub const PRESCALER_MAX: u8 = 15;
/// Counter correction for a 3.6 V battery with 100 mA IPEAK and 3.3 V out, at room temperature
/// and with the recommended inductor
pub const CORRECTION_FACTOR_TYP: i16 = -487;

const REGISTER_A: u8 = 0x01;
const REGISTER_B: u8 = 0x02;
const REGISTER_C: u8 = 0x03;
const REGISTER_D: u8 = 0x04;
const REGISTER_E: u8 = 0x05;

const CLEAR_INT: u8 = 0x01;
const COUNTER_TEST: u8 = 0x02;

/// Software selected output voltage
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[repr(u8)]
pub enum OutputVoltage {
    /// 1.8 V
    V1_8 = 0,
    /// 2.5 V
    V2_5 = 1,
    /// 2.8 V
    V2_8 = 2,
    /// 3.0 V
    V3_0 = 3,
    /// 3.3 V
    V3_3 = 4,
    /// 3.6 V
    V3_6 = 5,
    /// 4.5 V
    V4_5 = 6,
    /// 5.0 V
    V5_0 = 7,
}

/// Peak inductor current, selected by pin strapping
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Ipeak {
    /// 5 mA
    Ma5,
    /// 10 mA
    Ma10,
    /// 15 mA
    Ma15,
    /// 25 mA
    Ma25,
    /// 50 mA
    Ma50,
    /// 100 mA
    Ma100,
    /// 150 mA
    Ma150,
    /// 250 mA
    Ma250,
}

impl Ipeak {
    /// Peak current in mA
    pub fn milliamps(self) -> u32 {
        match self {
            Ipeak::Ma5 => 5,
            Ipeak::Ma10 => 10,
            Ipeak::Ma15 => 15,
            Ipeak::Ma25 => 25,
            Ipeak::Ma50 => 50,
            Ipeak::Ma100 => 100,
            Ipeak::Ma150 => 150,
            Ipeak::Ma250 => 250,
        }
    }
}

/// Application settings applied by [`Ltc3335::init`]
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Config {
    /// IPEAK the board is strapped for
    pub ipeak: Ipeak,
    /// Output voltage
    pub voltage: OutputVoltage,
    /// Battery capacity in mAh
    pub capacity_mah: u32,
    /// Discharge that raises the alarm, in mAh
    pub alarm_mah: u32,
    /// Start with the counter test running
    pub counter_test: bool,
    /// Software correction of the counter in steps of 2^-16, 0 for none. See
    /// [`CORRECTION_FACTOR_TYP`].
    pub correction: i16,
}

/// Latched alarms from register D
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Alarms {
    /// The AC on-time counter overflowed
    pub ac_on_time_overflow: bool,
    /// The coulomb counter overflowed
    pub counter_overflow: bool,
    /// The accumulator reached the alarm threshold
    pub alarm_trip: bool,
}

impl From<u8> for Alarms {
    fn from(value: u8) -> Self {
        Self {
            ac_on_time_overflow: value & 0x01 != 0,
            counter_overflow: value & 0x02 != 0,
            alarm_trip: value & 0x04 != 0,
        }
    }
}

/// Charge per accumulator count in mAs for a prescaler
pub fn resolution(ipeak: Ipeak, prescaler: u8) -> u32 {
    let scale = (1u64 << (41 - prescaler.min(PRESCALER_MAX))) as f64;
    (ipeak.milliamps() as f64 * TFS * scale / 255.0 + 0.5) as u32
}

/// Smallest prescaler whose counter range still holds `capacity_mah`
pub fn prescaler_for_capacity(ipeak: Ipeak, capacity_mah: u32) -> u8 {
    let range = 255 * resolution(ipeak, PRESCALER_MAX) as u64;
    let counts = capacity_mah as u64 * 3600 / range;
    let bits = 64 - counts.leading_zeros() as u8;
    PRESCALER_MAX.saturating_sub(bits)
}

/// Scale `value` by `1 + correction / 2^16`, rounding the correction to nearest
pub fn corrected(value: u64, correction: i16) -> u64 {
    let value = value as i128;
    let adjusted = value + ((value * correction as i128 + (1 << 15)) >> 16);
    adjusted.clamp(0, u64::MAX as i128) as u64
}

/// Register B value for an alarm at `alarm_mah`, rounded down
pub fn alarm_threshold(ipeak: Ipeak, prescaler: u8, alarm_mah: u32, correction: i16) -> u8 {
    let per_count = corrected(resolution(ipeak, prescaler) as u64, correction).max(1);
    let counts = alarm_mah as u64 * 3600 / per_count;
    counts.min(u8::MAX as u64) as u8
}

/// Average battery current in µA seen by the counter test.
///
/// `edges` is the number of IRQ edges counted over `elapsed_ticks` of a timer running at
/// `ticks_per_sec`. Returns `None` if no time has elapsed.
pub fn counter_test_current(
    ipeak: Ipeak,
    correction: i16,
    edges: u32,
    elapsed_ticks: u32,
    ticks_per_sec: u32,
) -> Option<u16> {
    if elapsed_ticks == 0 {
        return None;
    }
    if edges == 0 {
        return Some(0);
    }
    let per_edge = (ipeak.milliamps() as f64 * 1000.0 * TFS * ticks_per_sec as f64) as u64;
    let charge = corrected(per_edge.saturating_mul(edges as u64), correction);
    let microamps = charge.saturating_add(elapsed_ticks as u64 / 2) / elapsed_ticks as u64;
    Some(microamps.min(u16::MAX as u64) as u16)
}

/// LTC3335 driver
#[derive(Debug)]
pub struct Ltc3335<I2C> {
    i2c: I2C,
    ipeak: Ipeak,
    prescaler: u8,
    correction: i16,
    counter_test: bool,
    subaddress: Option<u8>,
}

impl<I2C: I2c> Ltc3335<I2C> {
    /// Program output voltage, prescaler, alarm threshold and counter test from `config`
    pub fn init(i2c: I2C, config: Config) -> Result<Self, I2C::Error> {
        let prescaler = prescaler_for_capacity(config.ipeak, config.capacity_mah);
        let mut converter = Self {
            i2c,
            ipeak: config.ipeak,
            prescaler,
            correction: config.correction,
            counter_test: false,
            subaddress: None,
        };
        debug!(
            "ltc3335 prescaler {} resolution {} mAs",
            prescaler,
            resolution(config.ipeak, prescaler)
        );

        converter.set_voltage(true, config.voltage)?;
        let threshold =
            alarm_threshold(config.ipeak, prescaler, config.alarm_mah, config.correction);
        converter.set_register(REGISTER_B, threshold)?;
        converter.set_counter_test(config.counter_test)?;
        Ok(converter)
    }

    /// Prescaler in use
    pub fn prescaler(&self) -> u8 {
        self.prescaler
    }

    /// Select the output voltage in software, or hand it back to the pins with `enabled` false
    pub fn set_voltage(&mut self, enabled: bool, voltage: OutputVoltage) -> Result<(), I2C::Error> {
        let value = (enabled as u8) << 7 | (voltage as u8) << 4 | self.prescaler;
        self.set_register(REGISTER_A, value)
    }

    /// Read the latched alarms
    pub fn alarms(&mut self) -> Result<Alarms, I2C::Error> {
        Ok(Alarms::from(self.get_register(REGISTER_D)?))
    }

    /// Clear the interrupt. A counter overflow is cleared by rewriting the accumulator.
    pub fn clear_int(&mut self, alarms: &Alarms) -> Result<(), I2C::Error> {
        if alarms.counter_overflow {
            let accumulator = self.get_register(REGISTER_C)?;
            self.set_register(REGISTER_C, accumulator)?;
        }
        let mut value = CLEAR_INT;
        if self.counter_test {
            value |= COUNTER_TEST;
        }
        self.set_register(REGISTER_E, value)
    }

    /// Discharged capacity in mAs, with the software correction applied
    pub fn discharged_capacity(&mut self) -> Result<u64, I2C::Error> {
        let accumulator = self.get_register(REGISTER_C)?;
        let raw = accumulator as u64 * resolution(self.ipeak, self.prescaler) as u64;
        Ok(corrected(raw, self.correction))
    }

    /// Start or stop the counter test, which toggles IRQ on every coulomb counter tick
    pub fn set_counter_test(&mut self, enabled: bool) -> Result<(), I2C::Error> {
        let value = if enabled { COUNTER_TEST } else { 0 };
        self.set_register(REGISTER_E, value)?;
        self.counter_test = enabled;
        Ok(())
    }

    /// Battery current in µA from counter test edges. `None` while the test is stopped or
    /// before any time has elapsed.
    pub fn counter_test_current(
        &self,
        edges: u32,
        elapsed_ticks: u32,
        ticks_per_sec: u32,
    ) -> Option<u16> {
        if !self.counter_test {
            return None;
        }
        counter_test_current(self.ipeak, self.correction, edges, elapsed_ticks, ticks_per_sec)
    }

    fn set_register(&mut self, subaddress: u8, value: u8) -> Result<(), I2C::Error> {
        self.subaddress = None;
        self.i2c.write_byte_data(ADDRESS, subaddress, value)?;
        self.subaddress = Some(subaddress);
        Ok(())
    }

    fn get_register(&mut self, subaddress: u8) -> Result<u8, I2C::Error> {
        if self.subaddress != Some(subaddress) {
            self.subaddress = None;
            self.i2c.write_byte(ADDRESS, subaddress)?;
            self.subaddress = Some(subaddress);
        }
        self.i2c.read_byte(ADDRESS)
    }

    /// Destroy the driver, return the wrapped I2C
    pub fn destroy(self) -> I2C {
        self.i2c
    }
}
