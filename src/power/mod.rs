//! Power monitors, gas gauges and power management

pub mod ltc2942;
pub mod ltc3335;
pub mod ltc4151;
pub mod ltc4261;

pub use ltc2942::Ltc2942;
pub use ltc3335::Ltc3335;
pub use ltc4151::Ltc4151;
pub use ltc4261::Ltc4261;
