//! Delta-sigma analog to digital converters

pub mod ltc2485;
pub mod ltc24xx;

pub use ltc2485::Ltc2485;
pub use ltc24xx::{I2cAdc, SpiAdc};
