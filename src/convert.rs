//! Linear code <-> engineering unit conversion.
//!
//! Every converter in the collection maps a raw code to a physical value with
//! `code = value / lsb - offset`, where `lsb` is the weight of one code in volts, amps or
//! whatever unit the channel measures and `offset` is the code that reads as zero.

use libm::roundf;

/// LSB weight and offset for one channel
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct LinearCalibration {
    /// Engineering-unit value of one code step
    pub lsb: f32,
    /// Code offset, added to a raw code before scaling
    pub offset: i32,
}

impl LinearCalibration {
    /// Calibration with the given LSB weight and offset
    pub const fn new(lsb: f32, offset: i32) -> Self {
        Self { lsb, offset }
    }

    /// Ideal calibration with no offset
    pub const fn ideal(lsb: f32) -> Self {
        Self { lsb, offset: 0 }
    }

    /// Derive LSB and offset from two measured points.
    ///
    /// Returns `None` if both codes are the same or both values are equal, since no slope can
    /// be taken from them.
    pub fn from_two_points(code1: i32, value1: f32, code2: i32, value2: f32) -> Option<Self> {
        if code1 == code2 {
            return None;
        }
        let lsb = (value2 - value1) / (code2 - code1) as f32;
        if lsb == 0.0 || !lsb.is_finite() {
            return None;
        }
        let offset = roundf(value1 / lsb - code1 as f32) as i32;
        Some(Self { lsb, offset })
    }

    /// Nearest code for `value`
    pub fn code(&self, value: f32) -> i32 {
        roundf(value / self.lsb - self.offset as f32) as i32
    }

    /// Nearest 16-bit DAC code for `value`, clamped to the DAC range
    pub fn dac_code(&self, value: f32) -> u16 {
        clamp_u16(self.code(value))
    }

    /// Value represented by `code`
    pub fn value(&self, code: i32) -> f32 {
        (code as i64 + self.offset as i64) as f32 * self.lsb
    }
}

/// Output range of a span-programmed DAC
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Span {
    /// Output at code 0
    pub min: f32,
    /// Output at full scale
    pub max: f32,
}

impl Span {
    /// Span from `min` to `max`
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Nearest 16-bit code for `value`, clamped to the span
    pub fn code(&self, value: f32) -> u16 {
        let code = 65535.0 * (value - self.min) / (self.max - self.min);
        if code <= 0.0 {
            0
        } else if code >= 65535.0 {
            u16::MAX
        } else {
            roundf(code) as u16
        }
    }

    /// Output for a 16-bit `code`
    pub fn value(&self, code: u16) -> f32 {
        code as f32 / 65535.0 * (self.max - self.min) + self.min
    }
}

/// Saturate a code into the 16-bit DAC range
pub fn clamp_u16(code: i32) -> u16 {
    code.clamp(0, u16::MAX as i32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32, tol: f32) -> bool {
        libm::fabsf(a - b) <= tol
    }

    #[test]
    fn code_and_value_are_inverse() {
        let cal = LinearCalibration::new(76.295109e-6, 12);
        let code = cal.code(1.0);
        assert_eq!(code, 13095);
        assert!(close(cal.value(code), 1.0, cal.lsb));
    }

    #[test]
    fn two_point_fit_recovers_lsb_and_offset() {
        let lsb = 1.0e-3;
        let (low, high) = ((100 + 7) as f32 * lsb, (4000 + 7) as f32 * lsb);
        let cal = LinearCalibration::from_two_points(100, low, 4000, high).unwrap();
        assert!(close(cal.lsb, lsb, 1e-7));
        assert_eq!(cal.offset, 7);
    }

    #[test]
    fn two_point_fit_rejects_degenerate_points() {
        assert_eq!(LinearCalibration::from_two_points(5, 1.0, 5, 2.0), None);
        assert_eq!(LinearCalibration::from_two_points(5, 1.0, 6, 1.0), None);
    }

    #[test]
    fn dac_code_clamps() {
        let cal = LinearCalibration::ideal(5.0 / 65535.0);
        assert_eq!(cal.dac_code(-1.0), 0);
        assert_eq!(cal.dac_code(6.0), 0xffff);
        assert_eq!(cal.dac_code(5.0), 0xffff);
    }

    #[test]
    fn negative_lsb_runs_backwards() {
        let cal = LinearCalibration::new(-0.5, 0);
        assert_eq!(cal.code(1.0), -2);
        assert_eq!(cal.dac_code(1.0), 0);
    }

    #[test]
    fn span_conversion() {
        let span = Span::new(-10.0, 10.0);
        assert_eq!(span.code(-10.0), 0);
        assert_eq!(span.code(10.0), 0xffff);
        assert_eq!(span.code(0.0), 32768);
        assert_eq!(span.code(20.0), 0xffff);
        assert!(close(span.value(0xffff), 10.0, 1e-5));
        assert!(close(span.value(0), -10.0, 1e-5));
    }
}
