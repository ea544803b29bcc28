use bitflags::bitflags;
use crate::constants::{EFF_MASK, SFF_MASK};
use crate::error::CanError;

bitflags! {
    /// Flags folded into the top bits of a raw 32-bit identifier.
    ///
    /// The values follow the Linux SocketCAN convention, so a raw value such as
    /// `0x8000_0123` reads as the extended identifier `0x123`.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IdentifierFlags: u32 {
        /// 29-bit identifier.
        const EXTENDED = 0x8000_0000;
    }
}

/// CAN identifier, 11-bit standard or 29-bit extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Id {
    Standard(u16),
    Extended(u32),
}

impl From<Id> for u32 {
    #[inline]
    fn from(id: Id) -> Self {
        id.into_bits()
    }
}

/// Values above the 11-bit range, or carrying [`IdentifierFlags::EXTENDED`],
/// become extended identifiers.
impl From<u32> for Id {
    fn from(raw: u32) -> Self {
        if raw & IdentifierFlags::EXTENDED.bits() != 0 || (raw & EFF_MASK) > SFF_MASK {
            Self::Extended(raw & EFF_MASK)
        }
        else {
            Self::Standard(raw as u16)
        }
    }
}

impl Id {
    #[inline]
    pub fn new_standard(id: u16) -> Self {
        Self::Standard(id)
    }

    #[inline]
    pub fn new_extended(id: u32) -> Self {
        Self::Extended(id)
    }

    /// Checks `id` against the 11-bit or 29-bit range selected by `extended`.
    pub fn try_new(id: u32, extended: bool) -> Result<Self, CanError> {
        match (extended, id) {
            (false, 0..=SFF_MASK) => Ok(Self::Standard(id as u16)),
            (true, 0..=EFF_MASK) => Ok(Self::Extended(id)),
            (false, _) => Err(CanError::validation_error(format!("standard id: {:#x} exceeds 11 bits", id))),
            (true, _) => Err(CanError::validation_error(format!("extended id: {:#x} exceeds 29 bits", id))),
        }
    }

    /// Like `From<u32>`, `extended` set to `Some(true)` forces the 29-bit form.
    #[inline]
    pub fn from_bits(id: u32, extended: Option<bool>) -> Self {
        match extended {
            Some(true) => Self::Extended(id & EFF_MASK),
            _ => Self::from(id),
        }
    }

    /// The identifier value, without flags.
    #[inline]
    pub fn into_bits(self) -> u32 {
        match self {
            Self::Standard(id) => id as u32,
            Self::Extended(id) => id,
        }
    }

    #[inline]
    pub fn as_raw(self) -> u32 {
        self.into_bits()
    }

    #[inline]
    pub fn is_extended(&self) -> bool {
        matches!(self, Self::Extended(_))
    }
}
