use std::{fmt::{Display, Formatter}, time::Duration};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use crate::error::CanError;
use crate::frame::Frame;

/// Poll driven CAN device.
///
/// Nothing is delivered in the background: frames buffered by the hardware are
/// only fetched when [`Device::receive`] is called, and the caller's poll
/// interval decides how much the hardware must hold in between.
pub trait Device {
    type Channel: Display + Copy;
    type Frame: Frame;
    #[inline]
    fn is_closed(&self) -> bool {
        self.opened_channels().is_empty()
    }
    /// get all channels that have been started
    fn opened_channels(&self) -> Vec<Self::Channel>;
    /// Transmit CAN frames, all of them or none.
    fn transmit(&mut self, channel: Self::Channel, frames: Vec<Self::Frame>) -> Result<(), CanError>;
    /// Receive CAN frames buffered on the channel.
    fn receive(&mut self, channel: Self::Channel, timeout: Option<Duration>) -> Result<Vec<Self::Frame>, CanError>;
    /// Close CAN device.
    fn shutdown(&mut self);
}

/// Lifecycle of a single channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    #[default]
    Uninitialized,
    Initialized,
    Started,
    Stopped,
}

impl Display for ChannelState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Initialized => f.write_str("initialized"),
            Self::Started => f.write_str("started"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Per channel configuration, as found in a device configuration file.
///
/// `timing0`/`timing1` are raw bit timing registers and take precedence over
/// `bitrate` when both are present.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize, Getters)]
pub struct ChannelConfig {
    #[getter(copy)]
    bitrate: u32,
    #[getter(copy)]
    #[serde(default)]
    timing0: Option<u8>,
    #[getter(copy)]
    #[serde(default)]
    timing1: Option<u8>,
    #[getter(copy)]
    #[serde(default)]
    acc_code: Option<u32>,
    #[getter(copy)]
    #[serde(default)]
    acc_mask: Option<u32>,
    #[getter(copy)]
    #[serde(default)]
    filter: Option<u8>,
    #[getter(copy)]
    #[serde(default)]
    mode: Option<u8>,
}

impl ChannelConfig {
    pub fn new(bitrate: u32) -> Self {
        Self {
            bitrate,
            ..Default::default()
        }
    }

    pub fn set_timing(&mut self, timing0: u8, timing1: u8) -> &mut Self {
        self.timing0 = Some(timing0);
        self.timing1 = Some(timing1);
        self
    }

    pub fn set_acc_code(&mut self, acc_code: u32) -> &mut Self {
        self.acc_code = Some(acc_code);
        self
    }

    pub fn set_acc_mask(&mut self, acc_mask: u32) -> &mut Self {
        self.acc_mask = Some(acc_mask);
        self
    }

    pub fn set_filter(&mut self, filter: u8) -> &mut Self {
        self.filter = Some(filter);
        self
    }

    pub fn set_mode(&mut self, mode: u8) -> &mut Self {
        self.mode = Some(mode);
        self
    }

    /// Raw timing registers, if both are configured.
    pub fn raw_timing(&self) -> Result<Option<(u8, u8)>, CanError> {
        match (self.timing0, self.timing1) {
            (Some(t0), Some(t1)) => Ok(Some((t0, t1))),
            (None, None) => Ok(None),
            _ => Err(CanError::configuration_error(
                "both `timing0` and `timing1` must be set to use raw timings"
            )),
        }
    }
}
