use std::time::Duration;

/// Microchip's vendor id, the Canalyst-II firmware runs on a PIC32.
pub const USB_ID_VENDOR: u16 = 0x04D8;
pub const USB_ID_PRODUCT: u16 = 0x0053;
#[cfg_attr(not(feature = "usb"), allow(dead_code))]
pub(crate) const USB_PRODUCT: &str = "Chuangxin Tech USBCAN/CANalyst-II";
#[cfg_attr(not(feature = "usb"), allow(dead_code))]
pub(crate) const USB_CONFIGURATION: u8 = 1;
#[cfg_attr(not(feature = "usb"), allow(dead_code))]
pub(crate) const USB_INTERFACE_COUNT: usize = 1;
/// The firmware exposes six bidirectional bulk endpoints.
#[cfg_attr(not(feature = "usb"), allow(dead_code))]
pub(crate) const USB_ENDPOINT_COUNT: usize = 12;
pub(crate) const USB_TIMEOUT: Duration = Duration::from_millis(100);
pub(crate) const ENDPOINT_IN: u8 = 0x80;

pub const CHANNEL_COUNT: u8 = 2;
/// Command endpoint of channel 0, 1
pub(crate) const CHANNEL_TO_COMMAND_EP: [u8; 2] = [2, 4];
/// CAN message endpoint of channel 0, 1
pub(crate) const CHANNEL_TO_MESSAGE_EP: [u8; 2] = [1, 3];

/// Every packet on the wire has this size.
pub const PACKET_SIZE: usize = 0x40;
/// Size of one CAN frame slot inside a message buffer.
pub const MESSAGE_SIZE: usize = 0x15;
/// Frames carried by one message buffer.
pub const MESSAGES_PER_BUFFER: usize = 3;

pub(crate) const COMMAND_INIT: u32 = 0x01;
pub(crate) const COMMAND_START: u32 = 0x02;
pub(crate) const COMMAND_STOP: u32 = 0x03;
pub(crate) const COMMAND_CLEAR_RX_BUFFER: u32 = 0x05;
pub(crate) const COMMAND_MESSAGE_STATUS: u32 = 0x0A;
pub(crate) const COMMAND_CAN_STATUS: u32 = 0x0B;

pub(crate) const DEFAULT_ACC_CODE: u32 = 0x1;
pub(crate) const DEFAULT_ACC_MASK: u32 = 0xFFFF_FFFF;
/// Written as the last init word by the vendor tool.
pub(crate) const INIT_UNKNOWN2: u32 = 0x1;
pub(crate) const TIME_FLAG_VALID: u8 = 1;
/// Timestamps count in units of 100us.
pub(crate) const TIMESTAMP_UNIT_US: u64 = 100;

/// Frequency feeding the bit timing prescaler (16MHz crystal / 2).
pub const CAN_CLOCK: u32 = 8_000_000;

pub(crate) const CANALYST_ENV: &str = "canalyst.env";
pub(crate) const CANALYST_VAR: &str = "CANALYST_CONFIG";
pub(crate) const CONFIG_FILENAME: &str = "canalyst.cfg.yaml";
