use crate::constants::{CAN_FRAME_MAX_SIZE, DEFAULT_PADDING};

/// Copy `data` into a full CAN data field, padding with [`DEFAULT_PADDING`].
///
/// Returns `None` when `data` doesn't fit a CAN 2.0 frame.
#[inline]
pub fn pad_data(data: &[u8]) -> Option<[u8; CAN_FRAME_MAX_SIZE]> {
    let length = can_dlc(data.len())?;
    let mut result = [DEFAULT_PADDING; CAN_FRAME_MAX_SIZE];
    result[..length].copy_from_slice(data);

    Some(result)
}

/// get CAN dlc
#[inline]
pub fn can_dlc(length: usize) -> Option<usize> {
    if length <= CAN_FRAME_MAX_SIZE {
        Some(length)
    }
    else {
        None
    }
}
