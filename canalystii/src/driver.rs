use std::time::{Duration, Instant};
use can_core::{ChannelState, Device, error::CanError};
use crate::channel::{Channels, InitOptions, Operation};
use crate::config::DeviceConfig;
use crate::constant::{ENDPOINT_IN, MESSAGES_PER_BUFFER, PACKET_SIZE, USB_TIMEOUT};
use crate::message::CanMessage;
use crate::protocol::*;
use crate::timing::{compute, TimingParameters};
use crate::transport::Transport;

/// One Canalyst-II session, driving both channels over a single transport.
///
/// The device is polled: nothing happens between calls, and the caller's poll
/// rate decides what the hardware has to buffer. Some losses are not reported
/// by the hardware at all, so no error is raised for them:
///
/// * each channel buffers about 1000 received frames and silently drops the
///   oldest ones when polled too slowly;
/// * a frame leaving the TX buffer may still have lost arbitration or gone
///   unacknowledged.
pub struct CanalystDevice<T: Transport> {
    transport: Option<T>,
    channels: Channels,
    timeout: Duration,
}

#[cfg(feature = "usb")]
impl CanalystDevice<crate::transport::UsbTransport> {
    /// Open the `index`th Canalyst-II found on the USB bus.
    pub fn open(index: usize) -> Result<Self, CanError> {
        Ok(Self::new(crate::transport::UsbTransport::open(index)?))
    }

    /// Open the device named by a configuration, init and start its channels.
    pub fn open_with_config(cfg: &DeviceConfig) -> Result<Self, CanError> {
        let mut device = Self::open(cfg.device_index())?;
        device.apply_config(cfg)?;

        Ok(device)
    }
}

impl<T: Transport> CanalystDevice<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
            channels: Default::default(),
            timeout: USB_TIMEOUT,
        }
    }

    /// Timeout of each single bulk transfer.
    pub fn set_transfer_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn state(&self, channel: u8) -> Result<ChannelState, CanError> {
        self.channels.state(channel)
    }

    /// Init `channel` at `bitrate`, the channel is not started.
    ///
    /// Accepted in any state, a started channel ends up `Initialized` and has
    /// to be started again.
    pub fn init(&mut self, channel: u8, bitrate: u32, options: InitOptions) -> Result<(), CanError> {
        let timing = compute(bitrate)?;
        self.init_with_timing(channel, &timing, options)
    }

    /// Init `channel` with explicit bit timing registers.
    pub fn init_with_timing(&mut self, channel: u8, timing: &TimingParameters, options: InitOptions) -> Result<(), CanError> {
        self.channels.check(channel, Operation::Init)?;
        let transfer = encode_init(channel, timing, &options)?;
        self.write(&transfer)?;
        log::info!("CANALYST-II - channel: {} init with {}", channel, timing);
        self.channels.transit(channel, Operation::Init)?;

        Ok(())
    }

    /// Start `channel` with its last init configuration.
    pub fn start(&mut self, channel: u8) -> Result<(), CanError> {
        self.command(channel, Operation::Start, encode_start)
    }

    pub fn stop(&mut self, channel: u8) -> Result<(), CanError> {
        self.command(channel, Operation::Stop, encode_stop)
    }

    /// Transmit frames in order, as few bulk transfers as possible.
    ///
    /// Every frame is checked before anything is written, a single bad frame
    /// fails the call with nothing sent. Returning `Ok` only means the device
    /// accepted the frames.
    pub fn send<I>(&mut self, channel: u8, frames: I) -> Result<(), CanError>
    where
        I: IntoIterator<Item = CanMessage>,
    {
        self.channels.check(channel, Operation::Send)?;
        let frames: Vec<_> = frames.into_iter().collect();
        frames.iter().try_for_each(CanMessage::validate)?;
        if frames.is_empty() {
            return Ok(());
        }

        let transfer = encode_send(channel, &frames)?;
        self.write(&transfer)?;
        log::trace!("CANALYST-II - channel: {} sent {} frames", channel, frames.len());

        Ok(())
    }

    /// [`send`](Self::send) then [`flush_tx_buffer`](Self::flush_tx_buffer).
    pub fn send_flush<I>(&mut self, channel: u8, frames: I, timeout: Option<Duration>) -> Result<bool, CanError>
    where
        I: IntoIterator<Item = CanMessage>,
    {
        self.send(channel, frames)?;
        self.flush_tx_buffer(channel, timeout)
    }

    /// Poll until the TX buffer of `channel` is empty or `timeout` has passed.
    ///
    /// Without timeout the buffer is checked once. Returns whether it is
    /// empty, which does not tell the frames were acknowledged.
    pub fn flush_tx_buffer(&mut self, channel: u8, timeout: Option<Duration>) -> Result<bool, CanError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let status = self.message_status(channel)?;
            if status.tx_pending() == 0 {
                return Ok(true);
            }
            match deadline {
                Some(v) if Instant::now() < v => continue,
                _ => {
                    log::debug!("CANALYST-II - channel: {} flush timeout with {} frames pending",
                        channel, status.tx_pending());
                    return Ok(false);
                },
            }
        }
    }

    /// Fetch the frames buffered on `channel`.
    ///
    /// With a timeout, polls until something is pending or the timeout has
    /// passed. Without one, returns at once, maybe empty. The frames counted
    /// pending at the first non empty poll are read, the ones arriving later
    /// are left for the next call. Draining also ends at the deadline and on
    /// a read holding no frame, what is left pending waits for the next call.
    ///
    /// A transfer failing after frames were read ends the call with those
    /// frames, the error is logged only.
    pub fn receive(&mut self, channel: u8, timeout: Option<Duration>) -> Result<Received, CanError> {
        self.channels.check(channel, Operation::Receive)?;
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut result = Received::new(channel);

        let mut pending = loop {
            let pending = self.message_status(channel)?.rx_pending() as usize;
            if pending > 0 {
                break pending;
            }
            match deadline {
                Some(v) if Instant::now() < v => continue,
                _ => return Ok(result),
            }
        };

        let endpoint = message_endpoint(channel)? | ENDPOINT_IN;
        loop {
            match self.read_messages(endpoint, pending, &mut result) {
                Ok(0) => break,
                Ok(count) => pending = pending.saturating_sub(count),
                Err(e) if !result.is_empty() => {
                    log::warn!("CANALYST-II - channel: {} read failed, keeping {} frames: {}", channel, result.len(), e);
                    break;
                },
                Err(e) => return Err(e),
            }
            if pending == 0 || deadline.is_some_and(|v| Instant::now() >= v) {
                break;
            }

            match self.message_status(channel) {
                Ok(status) if status.rx_pending() == 0 => break,
                Ok(status) => pending = pending.min(status.rx_pending() as usize),
                Err(e) => {
                    log::warn!("CANALYST-II - channel: {} status failed, keeping {} frames: {}", channel, result.len(), e);
                    break;
                },
            }
        }

        Ok(result)
    }

    /// Registers and error counters of `channel`, as reported.
    pub fn status(&mut self, channel: u8) -> Result<CanStatus, CanError> {
        if self.channels.state(channel)? == ChannelState::Uninitialized {
            log::warn!("CANALYST-II - channel: {} is not initialized, CAN status may be invalid", channel);
        }
        let data = self.query(encode_status_query(channel)?)?;

        decode_status(&data)
    }

    /// Frames pending in the RX and TX buffers of `channel`.
    pub fn message_status(&mut self, channel: u8) -> Result<MessageStatus, CanError> {
        let data = self.query(encode_message_status_query(channel)?)?;

        decode_message_status(&data)
    }

    /// Drop the frames buffered on `channel`.
    ///
    /// On a busy bus a few older frames may still be delivered afterwards.
    pub fn clear_rx_buffer(&mut self, channel: u8) -> Result<(), CanError> {
        let transfer = encode_clear_rx_buffer(channel)?;
        self.write(&transfer)?;
        log::debug!("CANALYST-II - channel: {} RX buffer cleared", channel);

        Ok(())
    }

    /// Init and start every channel present in `cfg`.
    pub fn apply_config(&mut self, cfg: &DeviceConfig) -> Result<(), CanError> {
        for (&channel, chl_cfg) in cfg.channels() {
            let options = InitOptions::try_from(chl_cfg)?;
            let timing = match chl_cfg.raw_timing()? {
                Some((timing0, timing1)) => TimingParameters::from_registers(timing0, timing1),
                None => compute(chl_cfg.bitrate())?,
            };
            self.init_with_timing(channel, &timing, options)?;
            self.start(channel)?;
        }

        Ok(())
    }

    /// Stop the started channels and release the transport.
    ///
    /// Failing stops are logged only. Every later call fails with
    /// [`CanError::DeviceNotOpened`].
    pub fn close(&mut self) {
        if self.transport.is_none() {
            return;
        }

        for channel in self.channels.started() {
            if let Err(e) = self.stop(channel) {
                log::warn!("CANALYST-II - channel: {} stop failed: {}", channel, e);
            }
        }
        self.transport = None;
        self.channels = Default::default();
        log::info!("CANALYST-II - device closed");
    }

    #[inline]
    fn transport(&mut self) -> Result<&mut T, CanError> {
        self.transport.as_mut().ok_or(CanError::DeviceNotOpened)
    }

    fn command(&mut self, channel: u8, operation: Operation, encode: fn(u8) -> Result<Transfer, CanError>) -> Result<(), CanError> {
        self.channels.check(channel, operation)?;
        let transfer = encode(channel)?;
        self.write(&transfer)?;
        self.channels.transit(channel, operation)?;

        Ok(())
    }

    fn write(&mut self, transfer: &Transfer) -> Result<(), CanError> {
        let timeout = self.timeout;
        let len = self.transport()?.write_bulk(transfer.endpoint, &transfer.data, timeout)?;
        if len != transfer.data.len() {
            return Err(CanError::transport_error(
                format!("short write on endpoint: {:#04x}, {} of {} bytes", transfer.endpoint, len, transfer.data.len())
            ));
        }

        Ok(())
    }

    /// One read from a message endpoint, sized for `pending` frames plus a
    /// spare buffer since a frame sometimes comes in the next one.
    fn read_messages(&mut self, endpoint: u8, pending: usize, result: &mut Received) -> Result<usize, CanError> {
        let mut buffer = vec![0; (pending.div_ceil(MESSAGES_PER_BUFFER) + 1) * PACKET_SIZE];
        let timeout = self.timeout;
        let len = self.transport()?.read_bulk(endpoint, &mut buffer, timeout)?;
        if len == 0 {
            return Ok(0);
        }
        let count = result.append(&buffer[..len])?;
        log::trace!("CANALYST-II - endpoint: {:#04x} read {} bytes with {} frames", endpoint, len, count);

        Ok(count)
    }

    /// Write a command and read its response.
    fn query(&mut self, transfer: Transfer) -> Result<Vec<u8>, CanError> {
        self.write(&transfer)?;
        let timeout = self.timeout;
        let mut data = vec![0; PACKET_SIZE];
        let len = self.transport()?.read_bulk(transfer.endpoint | ENDPOINT_IN, &mut data, timeout)?;
        data.truncate(len);

        Ok(data)
    }
}

impl<T: Transport> Drop for CanalystDevice<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Transport> Device for CanalystDevice<T> {
    type Channel = u8;
    type Frame = CanMessage;

    #[inline]
    fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    #[inline]
    fn opened_channels(&self) -> Vec<Self::Channel> {
        self.channels.started()
    }

    #[inline]
    fn transmit(&mut self, channel: Self::Channel, frames: Vec<Self::Frame>) -> Result<(), CanError> {
        self.send(channel, frames)
    }

    #[inline]
    fn receive(&mut self, channel: Self::Channel, timeout: Option<Duration>) -> Result<Vec<Self::Frame>, CanError> {
        Ok(CanalystDevice::receive(self, channel, timeout)?.collect())
    }

    #[inline]
    fn shutdown(&mut self) {
        self.close()
    }
}
