//! **`can-core`**, the device independent part of the Canalyst-II driver.
//!
//! Identifiers, the [`Frame`] and [`Device`] traits, channel configuration and
//! the error type every driver operation returns.

mod constants;
pub use constants::*;
mod device;
pub use device::*;
mod frame;
pub use frame::*;

pub mod error;
pub mod utils;
