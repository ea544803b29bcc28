mod identifier;
pub use identifier::*;

use std::fmt::{Display, Formatter, Write};
use crate::utils::can_dlc;

/// CAN 2.0 frame
pub trait Frame: Send + Sync {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self>
    where
        Self: Sized;

    fn new_remote(id: impl Into<Id>, len: usize) -> Option<Self>
    where
        Self: Sized;

    /// Receive time in microseconds, 0 for frames that were never received.
    fn timestamp(&self) -> u64;

    fn set_timestamp(&mut self, value: Option<u64>) -> &mut Self
    where
        Self: Sized;

    fn id(&self) -> Id;

    fn is_remote(&self) -> bool;

    fn is_extended(&self) -> bool;

    /// ensure return the actual length of data.
    fn data(&self) -> &[u8];

    fn dlc(&self) -> Option<usize> {
        can_dlc(self.length())
    }

    fn length(&self) -> usize;
}

impl Display for dyn Frame {
    /// One `asc` style line, the timestamp in seconds.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4} {:>8x}{:<4} {} {:>2} ",
               self.timestamp() as f64 / 1_000_000.,
               self.id().into_bits(),
               if self.is_extended() { "x" } else { "" },
               if self.is_remote() { "r" } else { "d" },
               self.length())?;

        if self.is_remote() {
            return f.write_char(' ');
        }
        self.data()
            .iter()
            .try_for_each(|b| write!(f, "{:02x} ", b))
    }
}
