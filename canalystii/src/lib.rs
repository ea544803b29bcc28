//! **`canalystii`**, userspace driver of the Canalyst-II two channel USB CAN analyzer.

mod constant;
pub use constant::{CAN_CLOCK, CHANNEL_COUNT, MESSAGES_PER_BUFFER, MESSAGE_SIZE, PACKET_SIZE, USB_ID_PRODUCT, USB_ID_VENDOR};
mod channel;
pub use channel::{ChannelMode, FilterType, InitOptions};
mod config;
pub use config::DeviceConfig;
mod driver;
pub use driver::CanalystDevice;
mod message;
pub use message::{CanMessage, SendType};

pub mod protocol;
pub mod timing;
pub mod transport;
