use crate::ChannelState;

/// Errors surfaced by every driver operation.
///
/// None of them is retried internally. Receive-buffer overflow, lost
/// arbitration and a missing ACK are *not* represented here: the hardware
/// gives no signal for them, so they show up only as frames that never arrive.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum CanError {
    /// No usable bit timing, or an invalid configuration value.
    #[error("CAN-CORE - configuration error: {0}")]
    ConfigurationError(String),
    #[error("CAN-CORE - channel: {channel} is {state}, can't {operation}")]
    StateError {
        channel: u8,
        state: ChannelState,
        operation: &'static str,
    },
    /// Malformed frame or argument, rejected before anything is transferred.
    #[error("CAN-CORE - validation error: {0}")]
    ValidationError(String),
    /// The device answered with something that can't be decoded.
    #[error("CAN-CORE - protocol error: {0}")]
    ProtocolError(String),
    #[error("CAN-CORE - transport error: {0}")]
    TransportError(String),
    #[error("CAN-CORE - device is not opened")]
    DeviceNotOpened,
}

impl CanError {
    #[inline]
    pub fn configuration_error<T: Into<String>>(msg: T) -> Self {
        Self::ConfigurationError(msg.into())
    }

    #[inline]
    pub fn validation_error<T: Into<String>>(msg: T) -> Self {
        Self::ValidationError(msg.into())
    }

    #[inline]
    pub fn protocol_error<T: Into<String>>(msg: T) -> Self {
        Self::ProtocolError(msg.into())
    }

    #[inline]
    pub fn transport_error<T: Into<String>>(msg: T) -> Self {
        Self::TransportError(msg.into())
    }
}
