//! EasySMU: one channel of a stackable source-measure unit.
//!
//! Each channel has four I2C devices behind an address translator:
//!
//! - an LTC2655 DAC whose outputs set the voltage (A), the sourcing current limit (B), the
//!   sinking current limit (C) and enable the output stage (D)
//! - an LTC2485 measuring the output voltage
//! - an LTC2485 measuring the output current
//! - a calibration EEPROM
//!
//! Up to eight channels share one bus, so [`EasySmu`] is usually handed a shared bus device
//! such as `&mut I2C` or one from `embedded-hal-bus`.
//!
//! ```
//! # use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
//! use linduino::easysmu::{Addresses, EasySmu};
//! # let i2c = Mock::new(&[Transaction::write(0x10, vec![0x30, 0x7a, 0x1c])]);
//! let addresses = Addresses {
//!     eeprom: 0x50,
//!     dac: 0x10,
//!     voltage_adc: 0x14,
//!     current_adc: 0x24,
//! };
//! let mut smu = EasySmu::new(i2c, addresses);
//! smu.set_voltage(1.0).unwrap();
//! assert_eq!(smu.voltage_code(), 31260);
//! # smu.destroy().done();
//! ```

pub mod calibrate;
pub mod record;

pub use calibrate::{Instruction, Operator, Prompt, SaveChoice};
pub use record::CalibrationRecord;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use libm::{fabsf, roundf};
use log::{debug, warn};

use crate::adc::ltc2485::{Config, Input, Ltc2485, Rejection, Speed, CONVERSION_TIME_1X_MS};
use crate::convert::clamp_u16;
use crate::dac::ltc2655::{Channel, Ltc2655};
use crate::dac::Command;
use crate::eeprom::{Eeprom, CAL_KEY};
use crate::Result;
use record::{FACTORY_ADDRESS, INFO_ADDRESS, INFO_SIZE, SIZE, USER_ADDRESS};

/// Identification string reported by the EasySMU firmware
pub const ID_STRING: &str = "Linear Technology, EasySMU-1.01 DC2591A";
/// Channels one bus can hold
pub const CHANNELS: usize = 8;
/// Timeout for one ADC reading, in milliseconds
pub const ADC_TIMEOUT_MS: u32 = CONVERSION_TIME_1X_MS;
/// Smallest current limit a step may reach, in amps
pub const MIN_CURRENT: f32 = 0.0006;

const VOLTAGE_DAC: Channel = Channel::A;
const PULLUP_DAC: Channel = Channel::B;
const PULLDOWN_DAC: Channel = Channel::C;
const ENABLE_DAC: Channel = Channel::D;

const MEASURE: Config = Config {
    input: Input::External,
    rejection: Rejection::Hz60,
    speed: Speed::X1,
};
const TEMPERATURE: Config = Config {
    input: Input::Temperature,
    ..MEASURE
};

/// Bus addresses of one channel's devices
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Addresses {
    /// Calibration EEPROM
    pub eeprom: u8,
    /// LTC2655 DAC
    pub dac: u8,
    /// Voltage sense LTC2485
    pub voltage_adc: u8,
    /// Current sense LTC2485
    pub current_adc: u8,
}

/// Which current limits are active
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Direction {
    /// Source only, the pull-down limit is zero
    SourceOnly,
    /// Source and sink up to the same limit
    SourceAndSink,
    /// Sink only, the pull-up limit is zero
    SinkOnly,
}

/// One voltage and current reading
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Measurement {
    /// Output voltage in volts
    pub voltage: f32,
    /// Output current in amps
    pub current: f32,
    /// Raw voltage ADC code
    pub voltage_code: i32,
    /// Raw current ADC code
    pub current_code: i32,
}

/// Die temperatures of the two ADCs
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Temperatures {
    /// Voltage ADC in °C
    pub voltage_adc: f32,
    /// Current ADC in °C
    pub current_adc: f32,
    /// Raw voltage ADC temperature code
    pub voltage_adc_code: i32,
    /// Raw current ADC temperature code
    pub current_adc_code: i32,
}

/// Driver for one EasySMU channel
#[derive(Debug)]
pub struct EasySmu<I2C> {
    i2c: I2C,
    addresses: Addresses,
    calibration: CalibrationRecord,
    present: bool,
    voltage_code: u16,
    pullup_code: u16,
    pulldown_code: u16,
    current_setting: f32,
}

impl<I2C: I2c> EasySmu<I2C> {
    /// Channel at `addresses`, starting out with the typical calibration and all DAC codes at
    /// zero. Nothing is sent until a setting is committed.
    pub fn new(i2c: I2C, addresses: Addresses) -> Self {
        Self {
            i2c,
            addresses,
            calibration: CalibrationRecord::typical(),
            present: true,
            voltage_code: 0,
            pullup_code: 0,
            pulldown_code: 0,
            current_setting: 0.0,
        }
    }

    /// Bus addresses of the channel's devices
    pub fn addresses(&self) -> Addresses {
        self.addresses
    }

    /// Calibration in use
    pub fn calibration(&self) -> &CalibrationRecord {
        &self.calibration
    }

    /// Replace the calibration in use without touching the EEPROM
    pub fn set_calibration(&mut self, calibration: CalibrationRecord) {
        self.calibration = calibration;
    }

    /// `false` once the EEPROM failed to answer in [`read_calibration`](Self::read_calibration)
    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Load the user calibration from the EEPROM.
    ///
    /// Returns `true` if a calibration was found. Otherwise the typical calibration is loaded
    /// and `false` returned. An EEPROM that does not answer marks the channel absent.
    pub fn read_calibration<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
    ) -> Result<bool, I2C::Error> {
        let polled = Eeprom::with_address(&mut self.i2c, self.addresses.eeprom).poll(delay);
        self.present = polled.is_ok();
        if let Err(e) = polled {
            warn!("easysmu eeprom @0x{:02x} not found", self.addresses.eeprom);
            return Err(e);
        }

        let mut eeprom = Eeprom::with_address(&mut self.i2c, self.addresses.eeprom);
        if eeprom.read_i16(USER_ADDRESS)? != CAL_KEY {
            warn!("easysmu @0x{:02x} not calibrated", self.addresses.dac);
            self.calibration = CalibrationRecord::typical();
            return Ok(false);
        }

        let mut bytes = [0u8; SIZE];
        eeprom.read(USER_ADDRESS, &mut bytes)?;
        self.calibration = CalibrationRecord::from_bytes(&bytes);
        debug!("easysmu @0x{:02x} calibration loaded", self.addresses.dac);
        Ok(true)
    }

    /// Mark the calibration in use as valid and store it as the user calibration
    pub fn write_calibration<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), I2C::Error> {
        self.store_calibration(delay, USER_ADDRESS)
    }

    /// Mark the calibration in use as valid and store it as the factory backup
    pub fn write_factory_calibration<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), I2C::Error> {
        self.store_calibration(delay, FACTORY_ADDRESS)
    }

    fn store_calibration<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        address: u8,
    ) -> Result<(), I2C::Error> {
        self.calibration.key = CAL_KEY;
        let bytes = self.calibration.to_bytes();
        Eeprom::with_address(&mut self.i2c, self.addresses.eeprom).write(delay, address, &bytes)
    }

    /// Copy the factory backup over the user calibration. The calibration in use is left
    /// alone, call [`read_calibration`](Self::read_calibration) to load the restored one.
    pub fn restore_factory_calibration<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
    ) -> Result<(), I2C::Error> {
        let mut eeprom = Eeprom::with_address(&mut self.i2c, self.addresses.eeprom);
        let mut bytes = [0u8; SIZE];
        eeprom.read(FACTORY_ADDRESS, &mut bytes)?;
        eeprom.write(delay, USER_ADDRESS, &bytes)?;
        debug!("easysmu @0x{:02x} factory calibration restored", self.addresses.dac);
        Ok(())
    }

    /// Read the factory info string into `buf`, returning its length without the terminator
    pub fn read_factory_info<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        buf: &mut [u8; INFO_SIZE],
    ) -> Result<usize, I2C::Error> {
        let mut eeprom = Eeprom::with_address(&mut self.i2c, self.addresses.eeprom);
        eeprom.poll(delay)?;
        eeprom.read(INFO_ADDRESS, buf)?;
        Ok(buf.iter().position(|&b| b == 0).unwrap_or(INFO_SIZE))
    }

    /// Store `info` as the factory info string, truncated to leave room for the terminator
    pub fn write_factory_info<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        info: &[u8],
    ) -> Result<(), I2C::Error> {
        let mut eeprom = Eeprom::with_address(&mut self.i2c, self.addresses.eeprom);
        eeprom.poll(delay)?;
        let mut buf = [0u8; INFO_SIZE];
        let len = info.len().min(INFO_SIZE - 1);
        buf[..len].copy_from_slice(&info[..len]);
        eeprom.write(delay, INFO_ADDRESS, &buf)
    }

    /// Voltage DAC code
    pub fn voltage_code(&self) -> u16 {
        self.voltage_code
    }

    /// Set the voltage DAC code, saturated to 16 bits, and commit it
    pub fn set_voltage_code(&mut self, code: i32) -> Result<(), I2C::Error> {
        self.voltage_code = clamp_u16(code);
        self.commit_voltage_source()
    }

    /// Move the voltage DAC code by `step` codes without committing. The output stage inverts,
    /// so a positive step lowers the code.
    pub fn step_voltage_code(&mut self, step: i32) {
        self.voltage_code = clamp_u16(self.voltage_code as i32 - step);
    }

    /// Set and commit the output voltage in volts
    pub fn set_voltage(&mut self, volts: f32) -> Result<(), I2C::Error> {
        let cal = &self.calibration;
        let code = cal.voltage_source_offset as i32 - roundf(volts / cal.voltage_source_lsb) as i32;
        self.set_voltage_code(code)
    }

    /// Output voltage the voltage DAC code corresponds to
    pub fn voltage_setting(&self) -> f32 {
        let cal = &self.calibration;
        (self.voltage_code as i32 - cal.voltage_source_offset as i32) as f32
            * -cal.voltage_source_lsb
    }

    /// Write the voltage DAC code to the DAC
    pub fn commit_voltage_source(&mut self) -> Result<(), I2C::Error> {
        self.write_dac(VOLTAGE_DAC, self.voltage_code)
    }

    /// Pull-up (sourcing) current limit DAC code
    pub fn pullup_code(&self) -> u16 {
        self.pullup_code
    }

    /// Pull-down (sinking) current limit DAC code
    pub fn pulldown_code(&self) -> u16 {
        self.pulldown_code
    }

    /// Set both current limit codes without committing
    pub fn set_current_codes(&mut self, pullup: u16, pulldown: u16) {
        self.pullup_code = pullup;
        self.pulldown_code = pulldown;
    }

    /// Set and commit the current limit in amps for the given direction
    pub fn set_current(&mut self, amps: f32, direction: Direction) -> Result<(), I2C::Error> {
        let cal = &self.calibration;
        let pullup = (amps / cal.current_source_pullup_lsb
            - cal.current_source_pullup_offset as f32) as i32;
        let pulldown = (amps / cal.current_source_pulldown_lsb
            - cal.current_source_pulldown_offset as f32) as i32;
        self.pullup_code = clamp_u16(pullup);
        self.pulldown_code = clamp_u16(pulldown);
        self.current_setting = self.pullup_current().max(0.0);

        match direction {
            Direction::SinkOnly => self.pullup_code = 0,
            Direction::SourceOnly => self.pulldown_code = 0,
            Direction::SourceAndSink => {}
        }
        self.commit_current_source()
    }

    /// Move the current limit by `step` amps without committing.
    ///
    /// Steps smaller than one code become 1.2 codes so every step changes the output, and the
    /// limit never drops below [`MIN_CURRENT`]. When a limit saturates, the difference between
    /// the pull-up and pull-down codes is kept.
    pub fn step_current(&mut self, step: f32) {
        let cal = self.calibration;
        let pullup_lsb = cal.current_source_pullup_lsb;
        let pullup_offset = cal.current_source_pullup_offset as i32;
        let pulldown_offset = cal.current_source_pulldown_offset as i32;

        let mut step = step;
        if fabsf(step / pullup_lsb) < 1.0 {
            step = (if step > 0.0 { 1.2 } else { -1.2 }) * pullup_lsb;
        }
        if self.current_setting + step < MIN_CURRENT {
            step = MIN_CURRENT - self.current_setting;
        }

        let target = self.current_setting + step;
        let pullup = (target / pullup_lsb - pullup_offset as f32) as i32;
        let pulldown = (target / cal.current_source_pulldown_lsb - pulldown_offset as f32) as i32;
        let delta = pulldown - pullup;

        let (pullup, pulldown) = if pullup < 0 || pulldown < delta {
            (0, delta)
        } else if pullup > 0xffff - delta || pulldown > 0xffff {
            (0xffff - delta, 0xffff)
        } else {
            (pullup, pulldown)
        };
        self.pullup_code = clamp_u16(pullup);
        self.pulldown_code = clamp_u16(pulldown);

        if self.pulldown_code as i32 + pulldown_offset < 0 {
            self.pulldown_code = 0;
            self.pullup_code = clamp_u16(pullup_offset - pulldown_offset);
        }
        self.current_setting = self.pullup_current();
    }

    /// Current limit in amps
    pub fn current_setting(&self) -> f32 {
        self.current_setting
    }

    fn pullup_current(&self) -> f32 {
        let cal = &self.calibration;
        (self.pullup_code as i32 + cal.current_source_pullup_offset as i32) as f32
            * cal.current_source_pullup_lsb
    }

    /// Write the pull-up then the pull-down code to the DAC
    pub fn commit_current_source(&mut self) -> Result<(), I2C::Error> {
        self.write_dac(PULLUP_DAC, self.pullup_code)?;
        self.write_dac(PULLDOWN_DAC, self.pulldown_code)
    }

    /// Connect the output
    pub fn enable_output(&mut self) -> Result<(), I2C::Error> {
        self.write_dac(ENABLE_DAC, 0xffff)
    }

    /// Disconnect the output
    pub fn disable_output(&mut self) -> Result<(), I2C::Error> {
        self.write_dac(ENABLE_DAC, 0)
    }

    /// Read the current ADC, then the voltage ADC
    pub fn measure<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
    ) -> Result<Measurement, I2C::Error> {
        let (voltage_adc, current_adc) = (self.addresses.voltage_adc, self.addresses.current_adc);
        let current_code = self.read_adc(delay, current_adc, MEASURE, ADC_TIMEOUT_MS)?;
        let voltage_code = self.read_adc(delay, voltage_adc, MEASURE, ADC_TIMEOUT_MS)?;
        Ok(Measurement {
            voltage: self.calibration.voltage(voltage_code),
            current: self.calibration.current(current_code, voltage_code),
            voltage_code,
            current_code,
        })
    }

    /// Output voltage in volts
    pub fn measure_voltage<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
    ) -> Result<f32, I2C::Error> {
        let code = self.read_adc(delay, self.addresses.voltage_adc, MEASURE, ADC_TIMEOUT_MS)?;
        Ok(self.calibration.voltage(code))
    }

    /// Output current in amps. The voltage is read as well to correct for the feedback network.
    pub fn measure_current<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
    ) -> Result<f32, I2C::Error> {
        Ok(self.measure(delay)?.current)
    }

    /// Read the temperature sensors of both ADCs.
    ///
    /// The temperature is taken relative to the codes stored at calibration, which are assumed
    /// to be 25 °C.
    pub fn measure_temperatures<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
    ) -> Result<Temperatures, I2C::Error> {
        let (voltage_adc, current_adc) = (self.addresses.voltage_adc, self.addresses.current_adc);
        delay.delay_ms(1);
        // arm the sensors, the results come with the next read
        self.read_adc(delay, current_adc, TEMPERATURE, ADC_TIMEOUT_MS)?;
        self.read_adc(delay, voltage_adc, TEMPERATURE, ADC_TIMEOUT_MS)?;
        let current_adc_code = self.read_adc(delay, current_adc, MEASURE, 2 * ADC_TIMEOUT_MS)?;
        let voltage_adc_code = self.read_adc(delay, voltage_adc, MEASURE, 2 * ADC_TIMEOUT_MS)?;

        let cal = &self.calibration;
        Ok(Temperatures {
            voltage_adc: celsius(voltage_adc_code, cal.temperature_vadc_code),
            current_adc: celsius(current_adc_code, cal.temperature_iadc_code),
            voltage_adc_code,
            current_adc_code,
        })
    }

    /// Destroy the driver, return the wrapped I2C
    pub fn destroy(self) -> I2C {
        self.i2c
    }

    fn write_dac(&mut self, channel: Channel, code: u16) -> Result<(), I2C::Error> {
        Ltc2655::new(&mut self.i2c, self.addresses.dac).write(Command::WriteUpdate, channel, code)
    }

    fn read_adc<D: DelayNs + ?Sized>(
        &mut self,
        delay: &mut D,
        address: u8,
        config: Config,
        timeout_ms: u32,
    ) -> Result<i32, I2C::Error> {
        Ltc2485::new(&mut self.i2c, address).read(delay, config, timeout_ms)
    }
}

/// Proportional-to-absolute-temperature code scaled against the 25 °C calibration code
fn celsius(code: i32, calibration_code: i32) -> f32 {
    code as u32 as f32 / calibration_code as u32 as f32 * 298.0 - 273.0
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate std;
    use crate::Error;
    use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
    use std::vec;
    use std::vec::Vec;

    const NACK: ErrorKind = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);
    const ADDRESSES: Addresses = Addresses {
        eeprom: 0x50,
        dac: 0x10,
        voltage_adc: 0x14,
        current_adc: 0x24,
    };

    /// LTC2485 output word for a code
    pub(crate) fn adc_word(code: i32) -> Vec<u8> {
        ((((code << 8) as u32) >> 1).to_be_bytes()).to_vec()
    }

    fn close(a: f32, b: f32, tol: f32) -> bool {
        fabsf(a - b) <= tol
    }

    #[test]
    fn voltage_source() {
        let expectations = [
            Transaction::write(0x10, vec![0x30, 0x7a, 0x1c]),
            Transaction::write(0x10, vec![0x30, 0xff, 0xff]),
            Transaction::write(0x10, vec![0x30, 0x00, 0x00]),
            Transaction::write(0x10, vec![0x30, 0x00, 0x0a]),
        ];
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);

        smu.set_voltage(1.0).unwrap();
        assert_eq!(smu.voltage_code(), 31260);
        assert!(close(smu.voltage_setting(), 1.0, 1e-3));

        smu.set_voltage_code(70_000).unwrap();
        assert_eq!(smu.voltage_code(), 0xffff);
        smu.set_voltage_code(-5).unwrap();
        assert_eq!(smu.voltage_code(), 0);

        smu.step_voltage_code(-10);
        assert_eq!(smu.voltage_code(), 10);
        smu.commit_voltage_source().unwrap();
        smu.step_voltage_code(20);
        assert_eq!(smu.voltage_code(), 0);

        smu.destroy().done();
    }

    #[test]
    fn current_source_directions() {
        let expectations = [
            Transaction::write(0x10, vec![0x31, 0x3d, 0x00]),
            Transaction::write(0x10, vec![0x32, 0x3f, 0xc1]),
            Transaction::write(0x10, vec![0x31, 0x00, 0x00]),
            Transaction::write(0x10, vec![0x32, 0x3f, 0xc1]),
            Transaction::write(0x10, vec![0x31, 0x3d, 0x00]),
            Transaction::write(0x10, vec![0x32, 0x00, 0x00]),
        ];
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);

        smu.set_current(0.01, Direction::SourceAndSink).unwrap();
        assert_eq!((smu.pullup_code(), smu.pulldown_code()), (15616, 16321));
        assert!(close(smu.current_setting(), 0.01, 1e-6));

        smu.set_current(0.01, Direction::SinkOnly).unwrap();
        smu.set_current(0.01, Direction::SourceOnly).unwrap();
        assert!(close(smu.current_setting(), 0.01, 1e-6));

        smu.destroy().done();
    }

    #[test]
    fn negative_current_clamps_codes() {
        let expectations = [
            Transaction::write(0x10, vec![0x31, 0x00, 0x00]),
            Transaction::write(0x10, vec![0x32, 0x00, 0x00]),
            Transaction::write(0x10, vec![0x31, 0x00, 0x00]),
            Transaction::write(0x10, vec![0x32, 0x00, 0x00]),
        ];
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);

        // code 0 still leaves the pull-up offset
        smu.set_current(-0.01, Direction::SourceAndSink).unwrap();
        let cal = *smu.calibration();
        let floor = cal.current_source_pullup_offset as f32 * cal.current_source_pullup_lsb;
        assert!(floor > 0.0);
        assert_eq!(smu.current_setting(), floor);

        smu.set_calibration(CalibrationRecord {
            current_source_pullup_offset: -100,
            ..cal
        });
        smu.set_current(-0.01, Direction::SourceAndSink).unwrap();
        assert_eq!(smu.current_setting(), 0.0);

        smu.destroy().done();
    }

    #[test]
    fn current_steps() {
        let expectations = [
            Transaction::write(0x10, vec![0x31, 0x04, 0xf6]),
            Transaction::write(0x10, vec![0x32, 0x07, 0x4b]),
        ];
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);

        smu.step_current(0.001);
        assert_eq!((smu.pullup_code(), smu.pulldown_code()), (1270, 1867));
        assert!(close(smu.current_setting(), 0.001, 1e-6));
        smu.commit_current_source().unwrap();

        // never below the minimum
        smu.step_current(-1.0);
        assert_eq!((smu.pullup_code(), smu.pulldown_code()), (632, 1225));
        assert!(smu.current_setting() >= MIN_CURRENT - 1e-6);

        // a tiny step still moves by a code
        let before = smu.pullup_code();
        smu.step_current(1e-9);
        assert_eq!(smu.pullup_code(), before + 1);

        smu.destroy().done();
    }

    #[test]
    fn current_step_keeps_code_difference_at_full_scale() {
        let mut smu = EasySmu::new(Mock::new(&[]), ADDRESSES);

        smu.step_current(1.0);
        assert_eq!(smu.pulldown_code(), 0xffff);
        assert_eq!(smu.pullup_code(), 53003);

        smu.destroy().done();
    }

    #[test]
    fn output_enable() {
        let expectations = [
            Transaction::write(0x10, vec![0x33, 0xff, 0xff]),
            Transaction::write(0x10, vec![0x33, 0x00, 0x00]),
        ];
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);

        smu.enable_output().unwrap();
        smu.disable_output().unwrap();

        smu.destroy().done();
    }

    #[test]
    fn measure_reads_current_then_voltage() {
        let cal = CalibrationRecord::typical();
        let voltage_code = cal.voltage_measure_offset + 463_317;
        let current_code = cal.current_measure_offset - 1_529_351;
        let expectations = [
            Transaction::write_read(0x24, vec![0x04], adc_word(current_code)),
            Transaction::write_read(0x14, vec![0x04], adc_word(voltage_code)),
            Transaction::write_read(0x14, vec![0x04], adc_word(voltage_code)),
        ];
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);
        let mut delay = NoopDelay::new();

        let m = smu.measure(&mut delay).unwrap();
        assert_eq!((m.voltage_code, m.current_code), (voltage_code, current_code));
        assert!(close(m.voltage, 1.0, 1e-4));
        assert!(close(
            m.current,
            cal.current(current_code, voltage_code),
            1e-9
        ));
        assert!(close(smu.measure_voltage(&mut delay).unwrap(), 1.0, 1e-4));

        smu.destroy().done();
    }

    #[test]
    fn adc_busy_until_timeout() {
        let mut expectations = Vec::new();
        for _ in 0..=ADC_TIMEOUT_MS {
            expectations
                .push(Transaction::write_read(0x14, vec![0x04], vec![0; 4]).with_error(NACK));
        }
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);
        let mut delay = NoopDelay::new();

        assert_eq!(smu.measure_voltage(&mut delay), Err(Error::Timeout));

        smu.destroy().done();
    }

    #[test]
    fn temperatures() {
        let cal = CalibrationRecord::typical().temperature_vadc_code;
        let warm = cal + cal / 298 * 10;
        let expectations = [
            Transaction::write_read(0x24, vec![0x0c], adc_word(0)),
            Transaction::write_read(0x14, vec![0x0c], adc_word(0)),
            Transaction::write_read(0x24, vec![0x04], adc_word(cal)),
            Transaction::write_read(0x14, vec![0x04], adc_word(warm)),
        ];
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);
        let mut delay = NoopDelay::new();

        let t = smu.measure_temperatures(&mut delay).unwrap();
        assert!(close(t.current_adc, 25.0, 1e-3));
        assert!(close(t.voltage_adc, 35.0, 1e-2));
        assert_eq!(t.voltage_adc_code, warm);

        smu.destroy().done();
    }

    fn record_pages(address: u8, record: &CalibrationRecord) -> Vec<Transaction> {
        let bytes = record.to_bytes();
        let mut expectations = Vec::new();
        for (i, page) in bytes.chunks(16).enumerate() {
            let mut frame = vec![address + 16 * i as u8];
            frame.extend_from_slice(page);
            expectations.push(Transaction::write(0x50, frame));
            expectations.push(Transaction::write(0x50, vec![]));
        }
        expectations
    }

    #[test]
    fn calibration_found() {
        let record = CalibrationRecord {
            key: CAL_KEY,
            voltage_source_offset: 30000,
            ..CalibrationRecord::typical()
        };
        let expectations = [
            Transaction::write(0x50, vec![]),
            Transaction::write_read(0x50, vec![0x40], vec![0x34, 0x12]),
            Transaction::write_read(0x50, vec![0x40], record.to_bytes().to_vec()),
        ];
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);
        let mut delay = NoopDelay::new();

        assert!(smu.read_calibration(&mut delay).unwrap());
        assert_eq!(smu.calibration(), &record);
        assert!(smu.is_present());

        smu.destroy().done();
    }

    #[test]
    fn calibration_missing() {
        let expectations = [
            Transaction::write(0x50, vec![]),
            Transaction::write_read(0x50, vec![0x40], vec![0xff, 0xff]),
        ];
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);
        smu.set_calibration(CalibrationRecord {
            voltage_source_offset: 1,
            ..CalibrationRecord::typical()
        });
        let mut delay = NoopDelay::new();

        assert!(!smu.read_calibration(&mut delay).unwrap());
        assert_eq!(smu.calibration(), &CalibrationRecord::typical());

        smu.destroy().done();
    }

    #[test]
    fn absent_channel() {
        let mut expectations = Vec::new();
        for _ in 0..=crate::eeprom::TIMEOUT_MS {
            expectations.push(Transaction::write(0x50, vec![]).with_error(NACK));
        }
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);
        let mut delay = NoopDelay::new();

        assert_eq!(smu.read_calibration(&mut delay), Err(Error::Timeout));
        assert!(!smu.is_present());

        smu.destroy().done();
    }

    #[test]
    fn store_user_and_factory_calibration() {
        let stored = CalibrationRecord {
            key: CAL_KEY,
            ..CalibrationRecord::typical()
        };
        let mut expectations = record_pages(0x40, &stored);
        expectations.extend(record_pages(0x70, &stored));
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);
        let mut delay = NoopDelay::new();

        smu.write_calibration(&mut delay).unwrap();
        assert!(smu.calibration().is_calibrated());
        smu.write_factory_calibration(&mut delay).unwrap();

        smu.destroy().done();
    }

    #[test]
    fn restore_factory_copies_block() {
        let factory = CalibrationRecord {
            key: CAL_KEY,
            current_measure_offset: -2000,
            ..CalibrationRecord::typical()
        };
        let mut expectations = vec![Transaction::write_read(
            0x50,
            vec![0x70],
            factory.to_bytes().to_vec(),
        )];
        expectations.extend(record_pages(0x40, &factory));
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);
        let mut delay = NoopDelay::new();

        smu.restore_factory_calibration(&mut delay).unwrap();
        assert!(!smu.calibration().is_calibrated());

        smu.destroy().done();
    }

    #[test]
    fn factory_info() {
        let mut stored = b"cal 2018-03-01".to_vec();
        stored.resize(INFO_SIZE, 0);
        let mut first = vec![0xa0];
        first.extend_from_slice(&stored[..16]);
        let mut second = vec![0xb0];
        second.extend_from_slice(&stored[16..]);
        let expectations = [
            Transaction::write(0x50, vec![]),
            Transaction::write(0x50, first),
            Transaction::write(0x50, vec![]),
            Transaction::write(0x50, second),
            Transaction::write(0x50, vec![]),
            Transaction::write(0x50, vec![]),
            Transaction::write_read(0x50, vec![0xa0], stored.clone()),
        ];
        let mut smu = EasySmu::new(Mock::new(&expectations), ADDRESSES);
        let mut delay = NoopDelay::new();

        smu.write_factory_info(&mut delay, b"cal 2018-03-01").unwrap();
        let mut buf = [0u8; INFO_SIZE];
        let len = smu.read_factory_info(&mut delay, &mut buf).unwrap();
        assert_eq!(&buf[..len], b"cal 2018-03-01");

        smu.destroy().done();
    }
}
