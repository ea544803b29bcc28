use std::fmt::{Display, Formatter};
use bitflags::bitflags;
use can_core::{CAN_FRAME_MAX_SIZE, Frame, Id, error::CanError, utils::{can_dlc, pad_data}};
use crate::constant::TIMESTAMP_UNIT_US;

bitflags! {
    /// Transmit flags of a frame, may be combined.
    #[repr(transparent)]
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct SendType: u8 {
        /// Drop the frame if the first transmission attempt fails.
        const NO_RETRY = 0x01;
        /// Echo the frame back as received, even if transmission failed.
        const ECHO = 0x02;
    }
}

/// One CAN frame as the Canalyst-II carries it.
///
/// Fields are public so any value can be built, [`CanMessage::validate`] is
/// what the send path checks before anything goes out.
///
/// Equality compares the frame content only: the device `timestamp` and the
/// transmit `send_type` are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanMessage {
    pub id: u32,
    pub extended: bool,
    pub remote: bool,
    pub data_len: u8,
    pub data: [u8; CAN_FRAME_MAX_SIZE],
    /// Device time of reception in units of 100us, wraps around.
    pub timestamp: u32,
    pub send_type: SendType,
}

impl CanMessage {
    /// Check the identifier range and the data length.
    pub fn validate(&self) -> Result<(), CanError> {
        Id::try_new(self.id, self.extended)?;
        if can_dlc(self.data_len as usize).is_none() {
            return Err(CanError::validation_error(
                format!("data length: {} of frame {:#x} is out of range", self.data_len, self.id)
            ));
        }

        Ok(())
    }

    #[inline(always)]
    pub fn send_type(&self) -> SendType {
        self.send_type
    }

    #[inline(always)]
    pub fn set_send_type(&mut self, send_type: SendType) -> &mut Self {
        self.send_type = send_type;
        self
    }
}

impl Frame for CanMessage {
    #[inline]
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        let id: Id = id.into();
        let padded = pad_data(data)?;

        Some(Self {
            id: id.as_raw(),
            extended: id.is_extended(),
            data_len: data.len() as u8,
            data: padded,
            ..Default::default()
        })
    }

    #[inline]
    fn new_remote(id: impl Into<Id>, len: usize) -> Option<Self> {
        let id: Id = id.into();
        let len = can_dlc(len)?;

        Some(Self {
            id: id.as_raw(),
            extended: id.is_extended(),
            remote: true,
            data_len: len as u8,
            ..Default::default()
        })
    }

    #[inline]
    fn timestamp(&self) -> u64 {
        self.timestamp as u64 * TIMESTAMP_UNIT_US
    }

    #[inline]
    fn set_timestamp(&mut self, value: Option<u64>) -> &mut Self {
        self.timestamp = (value.unwrap_or_default() / TIMESTAMP_UNIT_US) as u32;
        self
    }

    #[inline]
    fn id(&self) -> Id {
        Id::from_bits(self.id, Some(self.extended))
    }

    #[inline]
    fn is_remote(&self) -> bool {
        self.remote
    }

    #[inline]
    fn is_extended(&self) -> bool {
        self.extended
    }

    #[inline]
    fn data(&self) -> &[u8] {
        if self.remote {
            return &[];
        }
        let len = (self.data_len as usize).min(CAN_FRAME_MAX_SIZE);
        &self.data[..len]
    }

    #[inline]
    fn length(&self) -> usize {
        self.data_len as usize
    }
}

impl PartialEq for CanMessage {
    fn eq(&self, other: &Self) -> bool {
        if self.data_len != other.data_len {
            return false;
        }

        (self.id == other.id) &&
            (self.extended == other.extended) &&
            (self.remote == other.remote) &&
            (self.data() == other.data())
    }
}

impl Eq for CanMessage {}

impl Display for CanMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <dyn Frame as Display>::fmt(self, f)
    }
}
