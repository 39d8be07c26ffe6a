//! *Linear Technology / Analog Devices Linduino drivers for Rust Embedded HAL*
//!
//! Drivers for the converters, power monitors and clock parts found on Linear Technology demo
//! boards, built on top of the Rust [embedded HAL](https://github.com/rust-embedded/embedded-hal).
//! Every driver wraps an I2C or SPI device, speaks the part's framing and converts raw codes
//! to volts, amps, coulombs or degrees using a [`convert::LinearCalibration`] or a fixed LSB
//! weight.
//!
//! Converters that are still busy NACK their address. Drivers for those parts take a
//! [`DelayNs`](embedded_hal::delay::DelayNs) and retry every millisecond up to a timeout:
//! ```
//! # use embedded_hal_mock::eh1::delay::NoopDelay;
//! # use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
//! use linduino::adc::ltc2485::{self, Config, Ltc2485};
//! # let word = vec![0x20, 0x00, 0x00, 0x00];
//! # let i2c = Mock::new(&[Transaction::write_read(0x14, vec![0x00], word)]);
//! # let mut delay = NoopDelay::new();
//! let mut adc = Ltc2485::new(i2c, 0x14);
//! let code = adc.read(&mut delay, Config::default(), ltc2485::CONVERSION_TIME_1X_MS).unwrap();
//! assert_eq!(code, 0x40_0000);
//! assert_eq!(ltc2485::code_to_voltage(code, 5.0), 1.25);
//! # adc.destroy().done();
//! ```
//!
//! Demo boards are identified by the ID string in their [`eeprom`], which also holds the
//! calibration constants of boards like the [`easysmu`].
//!
//! The drivers log bus traffic at `trace` level and conversions at `debug` level through the
//! [`log`](https://docs.rs/log) facade. Enable the `defmt-03` feature to derive
//! `defmt::Format` on the public types.
//!
//! ## More information
//! - [Linduino](https://www.analog.com/en/design-center/evaluation-hardware-and-software/evaluation-development-platforms/linduino.html)
//! - [embedded-hal documentation](https://docs.rs/embedded-hal/)
//!
#![no_std]
#![warn(missing_debug_implementations, missing_docs)]

mod encode;
mod error;

pub mod adc;
pub mod bus;
pub mod convert;
pub mod dac;
pub mod easysmu;
pub mod eeprom;
pub mod led;
pub mod pll;
pub mod power;

pub use error::{Error, Result};
