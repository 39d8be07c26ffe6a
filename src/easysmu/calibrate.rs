//! Calibration of a channel against an external meter.
//!
//! The routine drives the output to a handful of set points and asks an [`Operator`] for the
//! value a bench meter shows at each. Every constant of the [`CalibrationRecord`] follows from
//! a two-point line fit.
//!
//! [`CalibrationRecord`]: super::CalibrationRecord

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use libm::roundf;
use log::{debug, warn};

use super::record::INFO_SIZE;
use super::EasySmu;
use crate::eeprom::CAL_KEY;
use crate::{Error, Result};

/// Voltage DAC code for about +5 V
pub const VSET_P5V: u16 = 44337;
/// Voltage DAC code for about -5 V
pub const VSET_M5V: u16 = 15234;
/// Current limit DAC code used while calibrating the voltage paths
pub const ISET: u16 = 48000;
/// Warm-up before the first point, in milliseconds
pub const SETTLE_MS: u32 = 10_000;
/// Wait after changing a set point, in milliseconds
pub const POINT_SETTLE_MS: u32 = 200;

const ISET_HIGH: u16 = 20000;
const ISET_LOW: u16 = 5000;

/// Value the operator is asked to read off the meter
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Prompt {
    /// Output voltage in volts
    Volts,
    /// Output voltage in millivolts
    Millivolts,
    /// Output current in milliamps, meter connected as an ammeter
    Milliamps,
}

impl Prompt {
    /// Prompt text
    pub fn as_str(&self) -> &'static str {
        match self {
            Prompt::Volts => "(V)? ",
            Prompt::Millivolts => "(mV)? ",
            Prompt::Milliamps => "(mA)? ",
        }
    }
}

/// Setup step for the operator
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Instruction {
    /// Connect a voltmeter to the output
    ConnectVoltmeter,
    /// Leave the output open
    DisconnectMeter,
}

impl Instruction {
    /// Instruction text
    pub fn as_str(&self) -> &'static str {
        match self {
            Instruction::ConnectVoltmeter => "Connect to voltmeter and wait ten seconds.",
            Instruction::DisconnectMeter => "Disconnect meter.",
        }
    }
}

/// What to do with a finished calibration
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum SaveChoice {
    /// Keep it in memory only
    Discard,
    /// Store it as the user calibration
    User,
    /// Store it as the factory backup, with an info string, and as the user calibration
    Factory,
}

/// The person at the bench
pub trait Operator {
    /// Show a setup step. Returns once the operator has carried it out.
    fn instruct(&mut self, instruction: Instruction);

    /// Ask for a meter reading. `None` aborts the calibration.
    fn measured(&mut self, prompt: Prompt) -> Option<f32>;

    /// Ask whether and where to store the calibration
    fn confirm_save(&mut self) -> SaveChoice;

    /// Fill `buf` with the factory info string, returning its length
    fn factory_info(&mut self, buf: &mut [u8]) -> usize;
}

struct Point {
    reading: f32,
    voltage_code: i32,
    current_code: i32,
}

impl<I2C: I2c> EasySmu<I2C> {
    /// Run the calibration routine.
    ///
    /// The new constants replace the calibration in use even when the operator chooses not to
    /// store them. Returns `true` if they were written to the EEPROM. The voltage source is
    /// left at 0 V.
    pub fn calibrate<D, O>(&mut self, delay: &mut D, operator: &mut O) -> Result<bool, I2C::Error>
    where
        D: DelayNs + ?Sized,
        O: Operator + ?Sized,
    {
        let mut cal = self.calibration;

        operator.instruct(Instruction::ConnectVoltmeter);
        self.set_voltage_code(VSET_P5V as i32)?;
        self.set_current_codes(ISET, ISET);
        self.commit_current_source()?;
        delay.delay_ms(SETTLE_MS);
        let temperatures = self.measure_temperatures(delay)?;
        cal.temperature_vadc_code = temperatures.voltage_adc_code;
        cal.temperature_iadc_code = temperatures.current_adc_code;

        let plus = self.point(delay, operator, VSET_P5V as i32, ISET, Some(Prompt::Volts))?;
        let minus = self.point(delay, operator, VSET_M5V as i32, ISET, Some(Prompt::Volts))?;
        let span = minus.reading - plus.reading;
        cal.voltage_measure_lsb = span / (minus.voltage_code - plus.voltage_code) as f32;
        cal.voltage_source_lsb = span / (VSET_P5V - VSET_M5V) as f32;
        // first estimate, refined from the millivolts left over at this code
        cal.voltage_source_offset =
            (plus.reading / cal.voltage_source_lsb + VSET_P5V as f32) as i16;

        let zero = self.point(
            delay,
            operator,
            cal.voltage_source_offset as i32,
            ISET,
            Some(Prompt::Millivolts),
        )?;
        let residual = zero.reading / 1000.0;
        cal.voltage_measure_offset =
            zero.voltage_code - (residual / cal.voltage_measure_lsb) as i32;
        cal.voltage_source_offset = (roundf(residual / cal.voltage_source_lsb) as i32
            + self.voltage_code() as i32) as i16;
        self.set_voltage_code(cal.voltage_source_offset as i32)?;
        debug!(
            "voltage: source {} V/code @{}, measure {} V/code @{}",
            cal.voltage_source_lsb,
            cal.voltage_source_offset,
            cal.voltage_measure_lsb,
            cal.voltage_measure_offset
        );

        // current through the feedback network with nothing connected
        operator.instruct(Instruction::DisconnectMeter);
        let plus_open = self.point(delay, operator, VSET_P5V as i32, ISET, None)?;
        let minus_open = self.point(delay, operator, VSET_M5V as i32, ISET, None)?;
        let rout = -((minus_open.current_code - plus_open.current_code) as f32)
            / (minus.voltage_code - plus.voltage_code) as f32;
        cal.current_measure_output_resistance = rout;
        let zero_open = self.point(delay, operator, cal.voltage_source_offset as i32, ISET, None)?;
        cal.current_measure_offset =
            (rout * zero_open.voltage_code as f32 + zero_open.current_code as f32) as i32;

        let source = self.point(delay, operator, VSET_P5V as i32, ISET, Some(Prompt::Milliamps))?;
        let sink = self.point(delay, operator, VSET_M5V as i32, ISET, Some(Prompt::Milliamps))?;
        let codes = (source.current_code - sink.current_code)
            + (rout * (source.voltage_code - sink.voltage_code) as f32) as i32;
        cal.current_measure_lsb = (source.reading / 1000.0 - sink.reading / 1000.0) / codes as f32;
        debug!(
            "current measure {} A/code @{}, rout {}",
            cal.current_measure_lsb, cal.current_measure_offset, rout
        );

        let (lsb, offset) = self.current_limit_line(delay, operator, VSET_P5V, 1.0)?;
        cal.current_source_pullup_lsb = lsb;
        cal.current_source_pullup_offset = offset;
        let (lsb, offset) = self.current_limit_line(delay, operator, VSET_M5V, -1.0)?;
        cal.current_source_pulldown_lsb = lsb;
        cal.current_source_pulldown_offset = offset;

        cal.key = CAL_KEY;
        self.calibration = cal;

        let saved = match operator.confirm_save() {
            SaveChoice::Discard => false,
            SaveChoice::User => {
                self.write_calibration(delay)?;
                true
            }
            SaveChoice::Factory => {
                self.write_factory_calibration(delay)?;
                let mut info = [0u8; INFO_SIZE - 1];
                let len = operator.factory_info(&mut info).min(info.len());
                self.write_factory_info(delay, &info[..len])?;
                self.write_calibration(delay)?;
                true
            }
        };
        self.set_voltage_code(self.calibration.voltage_source_offset as i32)?;
        Ok(saved)
    }

    /// Current limit LSB and offset from the readings at two limit codes. `sign` turns sinking
    /// readings positive.
    fn current_limit_line<D, O>(
        &mut self,
        delay: &mut D,
        operator: &mut O,
        voltage_code: u16,
        sign: f32,
    ) -> Result<(f32, i16), I2C::Error>
    where
        D: DelayNs + ?Sized,
        O: Operator + ?Sized,
    {
        let voltage_code = voltage_code as i32;
        let high = self.point(delay, operator, voltage_code, ISET_HIGH, Some(Prompt::Milliamps))?;
        let low = self.point(delay, operator, voltage_code, ISET_LOW, Some(Prompt::Milliamps))?;
        let high = sign * high.reading / 1000.0;
        let low = sign * low.reading / 1000.0;

        let lsb = (high - low) / (ISET_HIGH - ISET_LOW) as f32;
        let offset = (low / lsb - ISET_LOW as f32) as i16;
        debug!("current limit {} A/code @{}", lsb, offset);
        Ok((lsb, offset))
    }

    /// Apply a set point, take the operator's reading and measure once the output settled.
    /// The second of two conversions is kept. Fails with [`Error::OutOfRange`] if either ADC
    /// is over- or underrange.
    fn point<D, O>(
        &mut self,
        delay: &mut D,
        operator: &mut O,
        voltage_code: i32,
        current_code: u16,
        prompt: Option<Prompt>,
    ) -> Result<Point, I2C::Error>
    where
        D: DelayNs + ?Sized,
        O: Operator + ?Sized,
    {
        self.set_voltage_code(voltage_code)?;
        self.set_current_codes(current_code, current_code);
        self.commit_current_source()?;

        let reading = match prompt {
            Some(prompt) => match operator.measured(prompt) {
                Some(reading) => reading,
                None => {
                    warn!("calibration aborted at {}", prompt.as_str());
                    return Err(Error::Aborted);
                }
            },
            None => 0.0,
        };

        delay.delay_ms(POINT_SETTLE_MS);
        self.measure(delay)?;
        let measurement = self.measure(delay)?;
        // over- and underrange saturate, the line fits below need real codes
        let clipped = [i32::MAX, i32::MIN];
        if clipped.contains(&measurement.voltage_code)
            || clipped.contains(&measurement.current_code)
        {
            warn!("adc out of range at voltage code {}", voltage_code);
            return Err(Error::OutOfRange);
        }
        Ok(Point {
            reading,
            voltage_code: measurement.voltage_code,
            current_code: measurement.current_code,
        })
    }
}
