#![allow(unused)]

use std::{cell::RefCell, collections::VecDeque, rc::Rc, time::Duration};
use can_core::error::CanError;
use canalystii::{CanMessage, CanalystDevice, InitOptions, MESSAGES_PER_BUFFER, MESSAGE_SIZE, PACKET_SIZE, SendType};
use canalystii::protocol::{decode_message, encode_message};
use canalystii::transport::Transport;

/// Frames one simulated channel buffers before dropping the oldest.
pub const RX_CAPACITY: usize = 1000;

const COMMAND_EP: [u8; 2] = [2, 4];
const MESSAGE_EP: [u8; 2] = [1, 3];

#[derive(Debug, Default)]
struct SimChannel {
    init: Option<Vec<u8>>,
    started: bool,
    rx: VecDeque<CanMessage>,
    response: Option<Vec<u8>>,
    tx_pending: u16,
}

#[derive(Debug, Default)]
struct Inner {
    channels: [SimChannel; 2],
    transfers: Vec<(u8, Vec<u8>)>,
    ticks: u32,
    short_write: bool,
    buffers_per_read: Option<usize>,
    empty_first_buffer: bool,
    empty_reads: bool,
    fail_read: Option<usize>,
    message_reads: usize,
    fail_status: Option<usize>,
    status_reads: usize,
}

impl Inner {
    fn push_rx(&mut self, channel: usize, mut msg: CanMessage) {
        self.ticks += 1;
        msg.timestamp = self.ticks;
        let rx = &mut self.channels[channel].rx;
        if rx.len() == RX_CAPACITY {
            rx.pop_front();
        }
        rx.push_back(msg);
    }
}

/// Two channel Canalyst-II with a cable between its channels.
///
/// Frames sent on a started channel arrive on the other one when it is
/// started too, frames sent with `SendType::ECHO` arrive on the sender.
#[derive(Debug, Clone, Default)]
pub struct SimDevice(Rc<RefCell<Inner>>);

impl SimDevice {
    pub fn new() -> Self {
        Default::default()
    }

    /// Put a frame in the RX buffer of `channel` as if it came from the bus.
    pub fn inject(&self, channel: u8, msg: CanMessage) {
        self.0.borrow_mut().push_rx(channel as usize, msg);
    }

    pub fn rx_len(&self, channel: u8) -> usize {
        self.0.borrow().channels[channel as usize].rx.len()
    }

    pub fn set_tx_pending(&self, channel: u8, pending: u16) {
        self.0.borrow_mut().channels[channel as usize].tx_pending = pending;
    }

    pub fn set_short_write(&self, value: bool) {
        self.0.borrow_mut().short_write = value;
    }

    /// Deliver at most `buffers` message buffers per read.
    pub fn set_buffers_per_read(&self, buffers: Option<usize>) {
        self.0.borrow_mut().buffers_per_read = buffers;
    }

    /// Deliver an empty buffer ahead of the frames, as the firmware sometimes does.
    pub fn set_empty_first_buffer(&self, value: bool) {
        self.0.borrow_mut().empty_first_buffer = value;
    }

    /// Answer every message read with a buffer holding no frame while the
    /// status keeps counting the buffered ones.
    pub fn set_empty_reads(&self, value: bool) {
        self.0.borrow_mut().empty_reads = value;
    }

    /// Fail the `n`th message read from now on, 1 based.
    pub fn set_fail_read(&self, n: Option<usize>) {
        let mut inner = self.0.borrow_mut();
        inner.fail_read = n;
        inner.message_reads = 0;
    }

    /// Fail the `n`th message status response from now on, 1 based.
    pub fn set_fail_status(&self, n: Option<usize>) {
        let mut inner = self.0.borrow_mut();
        inner.fail_status = n;
        inner.status_reads = 0;
    }

    /// Raw init packet last received by `channel`.
    pub fn init_packet(&self, channel: u8) -> Option<Vec<u8>> {
        self.0.borrow().channels[channel as usize].init.clone()
    }

    /// Every transfer written, as `(endpoint, data)`.
    pub fn transfers(&self) -> Vec<(u8, Vec<u8>)> {
        self.0.borrow().transfers.clone()
    }

    /// Opcodes written on the command endpoint of `channel`, status queries excluded.
    pub fn commands(&self, channel: u8) -> Vec<u8> {
        let ep = COMMAND_EP[channel as usize];
        self.0.borrow().transfers.iter()
            .filter(|(e, data)| *e == ep && data[0] != 0x0A)
            .map(|(_, data)| data[0])
            .collect()
    }

    pub fn clear_transfers(&self) {
        self.0.borrow_mut().transfers.clear();
    }

    fn command(inner: &mut Inner, channel: usize, data: &[u8]) {
        let command = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let chl = &mut inner.channels[channel];
        match command {
            0x01 => {
                chl.init = Some(data.to_vec());
                chl.started = false;
            },
            0x02 => chl.started = true,
            0x03 => chl.started = false,
            0x05 => chl.rx.clear(),
            0x0A => {
                let mut resp = vec![0; PACKET_SIZE];
                resp[0] = 0x0A;
                resp[4..8].copy_from_slice(&(chl.rx.len() as u32).to_le_bytes());
                resp[8..10].copy_from_slice(&chl.tx_pending.to_le_bytes());
                chl.response = Some(resp);
            },
            0x0B => {
                let mut resp = vec![0; PACKET_SIZE];
                resp[0] = 0x0B;
                // reg_status of an idle bus, counters stay 0
                resp[12] = 0x0C;
                chl.response = Some(resp);
            },
            _ => {},
        }
    }

    fn messages(inner: &mut Inner, channel: usize, data: &[u8]) {
        if !inner.channels[channel].started {
            return;
        }
        let other = 1 - channel;
        for buffer in data.chunks(PACKET_SIZE) {
            for i in 0..buffer[0] as usize {
                let offset = 1 + i * MESSAGE_SIZE;
                let msg = match decode_message(&buffer[offset..offset + MESSAGE_SIZE]) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if inner.channels[other].started {
                    inner.push_rx(other, msg);
                }
                if msg.send_type().contains(SendType::ECHO) {
                    inner.push_rx(channel, msg);
                }
            }
        }
    }
}

impl Transport for SimDevice {
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], _: Duration) -> Result<usize, CanError> {
        let mut inner = self.0.borrow_mut();
        inner.transfers.push((endpoint, data.to_vec()));

        if let Some(channel) = COMMAND_EP.iter().position(|&v| v == endpoint) {
            Self::command(&mut inner, channel, data);
        }
        else if let Some(channel) = MESSAGE_EP.iter().position(|&v| v == endpoint) {
            Self::messages(&mut inner, channel, data);
        }
        else {
            return Err(CanError::transport_error(format!("no OUT endpoint: {:#04x}", endpoint)));
        }

        if inner.short_write {
            Ok(data.len() / 2)
        }
        else {
            Ok(data.len())
        }
    }

    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], _: Duration) -> Result<usize, CanError> {
        let mut inner = self.0.borrow_mut();
        let ep = endpoint & 0x7F;
        if endpoint & 0x80 == 0 {
            return Err(CanError::transport_error(format!("no IN endpoint: {:#04x}", endpoint)));
        }

        if let Some(channel) = COMMAND_EP.iter().position(|&v| v == ep) {
            let resp = inner.channels[channel].response.take()
                .ok_or(CanError::transport_error("timeout"))?;
            if resp[0] == 0x0A {
                inner.status_reads += 1;
                if inner.fail_status == Some(inner.status_reads) {
                    return Err(CanError::transport_error("pipe error"));
                }
            }
            let len = resp.len().min(buf.len());
            buf[..len].copy_from_slice(&resp[..len]);
            return Ok(len);
        }

        let channel = MESSAGE_EP.iter().position(|&v| v == ep)
            .ok_or(CanError::transport_error(format!("no IN endpoint: {:#04x}", endpoint)))?;
        inner.message_reads += 1;
        if inner.fail_read == Some(inner.message_reads) {
            return Err(CanError::transport_error("pipe error"));
        }
        if inner.empty_reads {
            buf[..PACKET_SIZE].fill(0);
            return Ok(PACKET_SIZE);
        }

        let mut max = buf.len() / PACKET_SIZE;
        if let Some(v) = inner.buffers_per_read {
            max = max.min(v);
        }

        let mut len = 0;
        if inner.empty_first_buffer && max > 1 {
            buf[..PACKET_SIZE].fill(0);
            len += PACKET_SIZE;
            max -= 1;
        }
        let rx = &mut inner.channels[channel].rx;
        for _ in 0..max {
            if rx.is_empty() {
                break;
            }
            let buffer = &mut buf[len..len + PACKET_SIZE];
            buffer.fill(0);
            let mut count = 0;
            while count < MESSAGES_PER_BUFFER {
                let Some(msg) = rx.pop_front() else { break };
                let offset = 1 + count * MESSAGE_SIZE;
                encode_message(&msg, &mut buffer[offset..offset + MESSAGE_SIZE]);
                count += 1;
            }
            buffer[0] = count as u8;
            len += PACKET_SIZE;
        }

        Ok(len)
    }
}

/// Session on a simulated device with both channels started at 500kbit/s.
pub fn started_device() -> anyhow::Result<(SimDevice, CanalystDevice<SimDevice>)> {
    let sim = SimDevice::new();
    let mut device = CanalystDevice::new(sim.clone());
    for channel in 0..2 {
        device.init(channel, 500_000, InitOptions::default())?;
        device.start(channel)?;
    }

    Ok((sim, device))
}

pub fn frame(id: u32, data: &[u8]) -> CanMessage {
    use can_core::Frame;
    CanMessage::new(id, data).unwrap()
}
