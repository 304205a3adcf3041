//! Signal fabric and shared buses.
//!
//! A [`Signals`] registry holds the fixed set of Z80 pinout lines. Each line
//! carries a boolean level and an ordered list of subscriber callbacks that
//! fire synchronously on `raise`/`drop`. The address and data buses are plain
//! shared state: writes are immediate stores, nobody is notified.

mod bus;
mod error;
mod signal;

pub use bus::SystemBus;
pub use error::SignalError;
pub use signal::{Signals, SignalLine};
