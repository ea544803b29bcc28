//! On the wire format of the Canalyst-II.
//!
//! Every transfer is made of 64 byte little-endian packets. The channel isn't
//! part of any packet: each channel has its own pair of command and message
//! endpoints, so the endpoint a packet travels on addresses the channel.
//!
//! ```text
//! command   | u32 command | payload ...                              | 0 padding
//! buffer    | u8 count    | slot 0 (21) | slot 1 (21) | slot 2 (21)  |
//! slot      | u32 can_id | u32 timestamp | u8 time_flag | u8 send_type |
//!           | u8 remote | u8 extended | u8 data_len | [u8; 8] data |
//! ```

use derive_getters::Getters;
use can_core::{CAN_FRAME_MAX_SIZE, error::CanError};
use crate::channel::{index, InitOptions};
use crate::constant::*;
use crate::message::{CanMessage, SendType};
use crate::timing::TimingParameters;

const INIT_WORDS: usize = 10;
const MESSAGE_STATUS_SIZE: usize = 12;
const CAN_STATUS_SIZE: usize = 36;

/// One bulk transfer, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub endpoint: u8,
    pub data: Vec<u8>,
}

/// Response of the message status query.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Getters)]
pub struct MessageStatus {
    #[getter(copy)]
    rx_pending: u32,
    #[getter(copy)]
    tx_pending: u16,
    /// Has been seen set to 1 once, meaning unknown.
    #[getter(copy)]
    unknown: u16,
}

/// Response of the CAN status query.
///
/// The field names are borrowed from the vendor library structure. How the
/// firmware fills them isn't known, they are handed out as read.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Getters)]
pub struct CanStatus {
    #[getter(copy)]
    err_interrupt: u32,
    #[getter(copy)]
    reg_mode: u32,
    #[getter(copy)]
    reg_status: u32,
    #[getter(copy)]
    reg_al_capture: u32,
    #[getter(copy)]
    reg_ec_capture: u32,
    #[getter(copy)]
    reg_ew_limit: u32,
    #[getter(copy)]
    reg_re_counter: u32,
    #[getter(copy)]
    reg_te_counter: u32,
}

#[inline]
pub(crate) fn command_endpoint(channel: u8) -> Result<u8, CanError> {
    Ok(CHANNEL_TO_COMMAND_EP[index(channel)?])
}

#[inline]
pub(crate) fn message_endpoint(channel: u8) -> Result<u8, CanError> {
    Ok(CHANNEL_TO_MESSAGE_EP[index(channel)?])
}

#[inline]
fn put_u32(packet: &mut [u8], word: usize, value: u32) {
    packet[word * 4..word * 4 + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn get_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

#[inline]
fn get_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn check_size(data: &[u8], expect: usize, what: &str) -> Result<(), CanError> {
    if data.len() < expect {
        return Err(CanError::protocol_error(
            format!("expected {} minimum {} bytes, got {} bytes", what, expect, data.len())
        ));
    }

    Ok(())
}

fn simple_command(channel: u8, command: u32) -> Result<Transfer, CanError> {
    let mut data = vec![0; PACKET_SIZE];
    put_u32(&mut data, 0, command);

    Ok(Transfer { endpoint: command_endpoint(channel)?, data })
}

pub fn encode_init(channel: u8, timing: &TimingParameters, options: &InitOptions) -> Result<Transfer, CanError> {
    let (timing0, timing1) = timing.registers();
    let words: [u32; INIT_WORDS] = [
        COMMAND_INIT,
        options.acc_code(),
        options.acc_mask(),
        0,
        options.filter() as u32,
        0,
        timing0 as u32,
        timing1 as u32,
        options.mode() as u32,
        INIT_UNKNOWN2,
    ];

    let mut transfer = simple_command(channel, COMMAND_INIT)?;
    words.iter()
        .enumerate()
        .for_each(|(i, &v)| put_u32(&mut transfer.data, i, v));

    Ok(transfer)
}

#[inline]
pub fn encode_start(channel: u8) -> Result<Transfer, CanError> {
    simple_command(channel, COMMAND_START)
}

#[inline]
pub fn encode_stop(channel: u8) -> Result<Transfer, CanError> {
    simple_command(channel, COMMAND_STOP)
}

#[inline]
pub fn encode_clear_rx_buffer(channel: u8) -> Result<Transfer, CanError> {
    simple_command(channel, COMMAND_CLEAR_RX_BUFFER)
}

#[inline]
pub fn encode_message_status_query(channel: u8) -> Result<Transfer, CanError> {
    simple_command(channel, COMMAND_MESSAGE_STATUS)
}

#[inline]
pub fn encode_status_query(channel: u8) -> Result<Transfer, CanError> {
    simple_command(channel, COMMAND_CAN_STATUS)
}

/// Pack one frame into a 21 byte slot. Data past `data_len` is zeroed.
pub fn encode_message(msg: &CanMessage, slot: &mut [u8]) {
    let len = (msg.data_len as usize).min(CAN_FRAME_MAX_SIZE);
    slot[0..4].copy_from_slice(&msg.id.to_le_bytes());
    slot[4..8].copy_from_slice(&msg.timestamp.to_le_bytes());
    slot[8] = TIME_FLAG_VALID;
    slot[9] = msg.send_type.bits();
    slot[10] = msg.remote as u8;
    slot[11] = msg.extended as u8;
    slot[12] = msg.data_len;
    slot[13..13 + CAN_FRAME_MAX_SIZE].fill(0);
    slot[13..13 + len].copy_from_slice(&msg.data[..len]);
}

/// Unpack a 21 byte slot.
pub fn decode_message(slot: &[u8]) -> Result<CanMessage, CanError> {
    check_size(slot, MESSAGE_SIZE, "message")?;
    if slot[12] as usize > CAN_FRAME_MAX_SIZE {
        return Err(CanError::protocol_error(format!("received data length: {}", slot[12])));
    }

    Ok(read_message(slot))
}

fn read_message(slot: &[u8]) -> CanMessage {
    let mut data = [0; CAN_FRAME_MAX_SIZE];
    data.copy_from_slice(&slot[13..13 + CAN_FRAME_MAX_SIZE]);

    CanMessage {
        id: get_u32(slot, 0),
        timestamp: get_u32(slot, 4),
        send_type: SendType::from_bits_retain(slot[9]),
        remote: slot[10] != 0,
        extended: slot[11] != 0,
        data_len: slot[12],
        data,
    }
}

/// Pack frames into message buffers of three, in order, for one transfer.
///
/// Frames are not validated here.
pub fn encode_send(channel: u8, frames: &[CanMessage]) -> Result<Transfer, CanError> {
    let endpoint = message_endpoint(channel)?;
    let mut data = Vec::with_capacity(frames.len().div_ceil(MESSAGES_PER_BUFFER) * PACKET_SIZE);
    for chunk in frames.chunks(MESSAGES_PER_BUFFER) {
        let mut buffer = [0u8; PACKET_SIZE];
        buffer[0] = chunk.len() as u8;
        for (i, msg) in chunk.iter().enumerate() {
            let offset = 1 + i * MESSAGE_SIZE;
            encode_message(msg, &mut buffer[offset..offset + MESSAGE_SIZE]);
        }
        data.extend_from_slice(&buffer);
    }

    Ok(Transfer { endpoint, data })
}

/// Validate the bytes read from a message endpoint and demultiplex them to
/// their channel. Any number of buffers is accepted.
pub fn decode_receive_batch(endpoint: u8, data: &[u8]) -> Result<Received, CanError> {
    let ep = endpoint & !ENDPOINT_IN;
    let channel = CHANNEL_TO_MESSAGE_EP.iter()
        .position(|&v| v == ep)
        .ok_or(CanError::protocol_error(format!("endpoint: {:#04x} carries no CAN messages", endpoint)))?;

    let mut result = Received::new(channel as u8);
    result.append(data)?;

    Ok(result)
}

pub fn decode_message_status(data: &[u8]) -> Result<MessageStatus, CanError> {
    check_size(data, MESSAGE_STATUS_SIZE, "message status")?;

    Ok(MessageStatus {
        rx_pending: get_u32(data, 4),
        tx_pending: get_u16(data, 8),
        unknown: get_u16(data, 10),
    })
}

pub fn decode_status(data: &[u8]) -> Result<CanStatus, CanError> {
    check_size(data, CAN_STATUS_SIZE, "CAN status")?;
    let word = |i: usize| get_u32(data, i * 4);

    Ok(CanStatus {
        err_interrupt: word(1),
        reg_mode: word(2),
        reg_status: word(3),
        reg_al_capture: word(4),
        reg_ec_capture: word(5),
        reg_ew_limit: word(6),
        reg_re_counter: word(7),
        reg_te_counter: word(8),
    })
}

/// Frames received on one channel by a single `receive` call.
///
/// The raw buffers are kept as read and decoded one frame at a time while
/// iterating, in the order the hardware delivered them.
#[derive(Debug, Clone, Default)]
pub struct Received {
    channel: u8,
    data: Vec<u8>,
    count: usize,
    buffer: usize,
    slot: usize,
}

impl Received {
    pub(crate) fn new(channel: u8) -> Self {
        Self { channel, ..Default::default() }
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Frames not iterated yet.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Validate and queue raw message buffers.
    pub(crate) fn append(&mut self, data: &[u8]) -> Result<usize, CanError> {
        check_size(data, PACKET_SIZE, "message buffer")?;
        if data.len() % PACKET_SIZE != 0 {
            return Err(CanError::protocol_error(
                format!("received {} bytes, not a multiple of {}", data.len(), PACKET_SIZE)
            ));
        }

        let mut count = 0;
        for buffer in data.chunks(PACKET_SIZE) {
            let frames = buffer[0] as usize;
            if frames > MESSAGES_PER_BUFFER {
                return Err(CanError::protocol_error(format!("message buffer holds {} frames", frames)));
            }
            for i in 0..frames {
                let offset = 1 + i * MESSAGE_SIZE;
                decode_message(&buffer[offset..offset + MESSAGE_SIZE])?;
            }
            count += frames;
        }

        self.data.extend_from_slice(data);
        self.count += count;

        Ok(count)
    }
}

impl Iterator for Received {
    type Item = CanMessage;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let start = self.buffer * PACKET_SIZE;
            let buffer = self.data.get(start..start + PACKET_SIZE)?;
            if self.slot < buffer[0] as usize {
                let offset = 1 + self.slot * MESSAGE_SIZE;
                self.slot += 1;
                self.count -= 1;
                return Some(read_message(&buffer[offset..offset + MESSAGE_SIZE]));
            }
            self.buffer += 1;
            self.slot = 0;
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.count, Some(self.count))
    }
}

impl ExactSizeIterator for Received {}
