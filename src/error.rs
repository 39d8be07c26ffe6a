use core::fmt;

/// Errors returned by the drivers in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error<E> {
    /// Error reported by the underlying I2C or SPI bus
    Bus(E),
    /// The device did not acknowledge before the timeout ran out
    Timeout,
    /// Address, length or setting outside of what the device accepts
    OutOfRange,
    /// Data clocked back from the device did not match what was sent
    Mismatch,
    /// An end-of-conversion pin could not be read
    Pin,
    /// The operator cancelled a calibration
    Aborted,
}

/// Result alias used throughout the crate
pub type Result<T, E> = core::result::Result<T, Error<E>>;

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus error: {:?}", e),
            Error::Timeout => f.write_str("device did not acknowledge in time"),
            Error::OutOfRange => f.write_str("value out of range"),
            Error::Mismatch => f.write_str("readback mismatch"),
            Error::Pin => f.write_str("pin read failed"),
            Error::Aborted => f.write_str("calibration aborted"),
        }
    }
}
