//! Calibration record kept in the channel EEPROM.
//!
//! The record is stored packed and little-endian, fields in declaration order. The user copy
//! sits at [`USER_ADDRESS`], a backup of the factory calibration right behind it, followed by
//! a short free-form info string written at the factory.

use crate::eeprom::{CAL_KEY, CAL_STATUS_ADDRESS};

/// Packed size of a record in bytes
pub const SIZE: usize = 48;
/// Location of the active calibration
pub const USER_ADDRESS: u8 = CAL_STATUS_ADDRESS;
/// Location of the factory calibration backup
pub const FACTORY_ADDRESS: u8 = USER_ADDRESS + SIZE as u8;
/// Location of the factory info string
pub const INFO_ADDRESS: u8 = FACTORY_ADDRESS + SIZE as u8;
/// Space reserved for the factory info string, including its NUL terminator
pub const INFO_SIZE: usize = 32;

/// Calibration constants of one channel
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct CalibrationRecord {
    /// [`CAL_KEY`] once the channel has been calibrated
    pub key: i16,
    /// Voltage DAC code giving 0 V at the output
    pub voltage_source_offset: i16,
    /// Volts per voltage DAC code. Negative, the output stage inverts.
    pub voltage_source_lsb: f32,
    /// Pull-up DAC code that would give 0 A
    pub current_source_pullup_offset: i16,
    /// Amps per pull-up DAC code
    pub current_source_pullup_lsb: f32,
    /// Pull-down DAC code that would give 0 A
    pub current_source_pulldown_offset: i16,
    /// Amps per pull-down DAC code
    pub current_source_pulldown_lsb: f32,
    /// Voltage ADC code at 0 V
    pub voltage_measure_offset: i32,
    /// Volts per voltage ADC code
    pub voltage_measure_lsb: f32,
    /// Amps per current ADC code
    pub current_measure_lsb: f32,
    /// Current ADC codes per voltage ADC code leaking through the feedback network
    pub current_measure_output_resistance: f32,
    /// Current ADC code at 0 A
    pub current_measure_offset: i32,
    /// Voltage ADC temperature code taken during calibration, assumed to be 25 °C
    pub temperature_vadc_code: i32,
    /// Current ADC temperature code taken during calibration, assumed to be 25 °C
    pub temperature_iadc_code: i32,
}

impl CalibrationRecord {
    /// Typical constants for an uncalibrated board
    pub const fn typical() -> Self {
        Self {
            key: 0,
            voltage_source_offset: 29801,
            voltage_source_lsb: -0.000_685_298_3,
            current_source_pullup_offset: 324,
            current_source_pullup_lsb: 6.273_333e-7,
            current_source_pulldown_offset: -262,
            current_source_pulldown_lsb: 6.226_666e-7,
            voltage_measure_offset: -1_525_982,
            voltage_measure_lsb: 2.158_354e-6,
            current_measure_lsb: -6.538_718e-9,
            current_measure_output_resistance: 0.008_131_025,
            current_measure_offset: -2420,
            temperature_vadc_code: 2_272_596,
            temperature_iadc_code: 2_272_596,
        }
    }

    /// `true` if the record carries the calibration key
    pub fn is_calibrated(&self) -> bool {
        self.key == CAL_KEY
    }

    /// Output voltage for a voltage ADC code
    pub fn voltage(&self, voltage_code: i32) -> f32 {
        voltage_code as f32 * self.voltage_measure_lsb
            - self.voltage_measure_offset as f32 * self.voltage_measure_lsb
    }

    /// Output current for a current ADC code, corrected for the current drawn by the feedback
    /// network at the accompanying voltage ADC code
    pub fn current(&self, current_code: i32, voltage_code: i32) -> f32 {
        (current_code as f32
            + (voltage_code as f32 * self.current_measure_output_resistance
                - self.current_measure_offset as f32))
            * self.current_measure_lsb
    }

    /// Packed EEPROM image
    pub fn to_bytes(&self) -> [u8; SIZE] {
        let mut out = Packer {
            buf: [0u8; SIZE],
            at: 0,
        };
        out.put(&self.key.to_le_bytes());
        out.put(&self.voltage_source_offset.to_le_bytes());
        out.put(&self.voltage_source_lsb.to_le_bytes());
        out.put(&self.current_source_pullup_offset.to_le_bytes());
        out.put(&self.current_source_pullup_lsb.to_le_bytes());
        out.put(&self.current_source_pulldown_offset.to_le_bytes());
        out.put(&self.current_source_pulldown_lsb.to_le_bytes());
        out.put(&self.voltage_measure_offset.to_le_bytes());
        out.put(&self.voltage_measure_lsb.to_le_bytes());
        out.put(&self.current_measure_lsb.to_le_bytes());
        out.put(&self.current_measure_output_resistance.to_le_bytes());
        out.put(&self.current_measure_offset.to_le_bytes());
        out.put(&self.temperature_vadc_code.to_le_bytes());
        out.put(&self.temperature_iadc_code.to_le_bytes());
        out.buf
    }

    /// Unpack an EEPROM image
    pub fn from_bytes(bytes: &[u8; SIZE]) -> Self {
        let mut r = Unpacker { buf: bytes, at: 0 };
        Self {
            key: i16::from_le_bytes(r.take()),
            voltage_source_offset: i16::from_le_bytes(r.take()),
            voltage_source_lsb: f32::from_le_bytes(r.take()),
            current_source_pullup_offset: i16::from_le_bytes(r.take()),
            current_source_pullup_lsb: f32::from_le_bytes(r.take()),
            current_source_pulldown_offset: i16::from_le_bytes(r.take()),
            current_source_pulldown_lsb: f32::from_le_bytes(r.take()),
            voltage_measure_offset: i32::from_le_bytes(r.take()),
            voltage_measure_lsb: f32::from_le_bytes(r.take()),
            current_measure_lsb: f32::from_le_bytes(r.take()),
            current_measure_output_resistance: f32::from_le_bytes(r.take()),
            current_measure_offset: i32::from_le_bytes(r.take()),
            temperature_vadc_code: i32::from_le_bytes(r.take()),
            temperature_iadc_code: i32::from_le_bytes(r.take()),
        }
    }
}

impl Default for CalibrationRecord {
    fn default() -> Self {
        Self::typical()
    }
}

struct Packer {
    buf: [u8; SIZE],
    at: usize,
}

impl Packer {
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.at..self.at + bytes.len()].copy_from_slice(bytes);
        self.at += bytes.len();
    }
}

struct Unpacker<'a> {
    buf: &'a [u8; SIZE],
    at: usize,
}

impl Unpacker<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut field = [0u8; N];
        field.copy_from_slice(&self.buf[self.at..self.at + N]);
        self.at += N;
        field
    }
}
