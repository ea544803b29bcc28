//! Needs a Canalyst-II with CAN1 wired to CAN2.

use std::time::Duration;
use can_core::Frame;
use canalystii::{CanMessage, CanalystDevice, InitOptions};

fn main() -> anyhow::Result<()> {
    let mut device = CanalystDevice::open(0)?;
    for channel in 0..2 {
        device.init(channel, 500_000, InitOptions::default())?;
        device.start(channel)?;
    }

    let msg = CanMessage::new(0x7DF, &[0x02, 0x10, 0x01]).unwrap();
    device.send_flush(0, [msg; 3], Some(Duration::from_millis(100)))?;

    for msg in device.receive(1, Some(Duration::from_millis(500)))? {
        println!("{}", msg);
    }
    println!("{:?}", device.status(1)?);

    device.close();

    Ok(())
}
