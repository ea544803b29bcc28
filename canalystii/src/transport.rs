use std::time::Duration;
use can_core::error::CanError;

/// Blocking bulk transfers on the device endpoints.
///
/// `endpoint` is the full endpoint address, IN endpoints have bit 7 set.
pub trait Transport {
    /// Write `data`, returns the number of bytes the device accepted.
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, CanError>;
    /// Read into `buf`, returns the number of bytes read.
    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, CanError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    #[inline]
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, CanError> {
        (**self).write_bulk(endpoint, data, timeout)
    }

    #[inline]
    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, CanError> {
        (**self).read_bulk(endpoint, buf, timeout)
    }
}

#[cfg(feature = "usb")]
pub use self::usb::UsbTransport;

#[cfg(feature = "usb")]
mod usb {
    use std::time::Duration;
    use rusb::{DeviceHandle, GlobalContext};
    use can_core::error::CanError;
    use crate::constant::*;
    use super::Transport;

    #[inline]
    fn usb_error(e: rusb::Error) -> CanError {
        CanError::transport_error(e.to_string())
    }

    /// Canalyst-II found on the USB bus through `rusb`.
    pub struct UsbTransport {
        handle: DeviceHandle<GlobalContext>,
    }

    impl UsbTransport {
        /// Open the `index`th Canalyst-II in enumeration order.
        pub fn open(index: usize) -> Result<Self, CanError> {
            let devices = rusb::devices().map_err(usb_error)?;
            let found: Vec<_> = devices.iter()
                .filter(|dev| dev.device_descriptor()
                    .map(|desc| desc.vendor_id() == USB_ID_VENDOR && desc.product_id() == USB_ID_PRODUCT)
                    .unwrap_or_default())
                .collect();
            if found.is_empty() {
                return Err(CanError::transport_error("no Canalyst-II USB device found"));
            }
            let device = found.get(index)
                .ok_or(CanError::transport_error(
                    format!("can't open device index: {}, only {} devices found", index, found.len())
                ))?;

            let mut handle = device.open().map_err(usb_error)?;
            if handle.active_configuration().map_err(usb_error)? != USB_CONFIGURATION {
                handle.set_active_configuration(USB_CONFIGURATION).map_err(usb_error)?;
            }

            // unofficial firmware, check this is the one the protocol was taken from
            let desc = device.device_descriptor().map_err(usb_error)?;
            match handle.read_product_string_ascii(&desc) {
                Ok(product) if product != USB_PRODUCT =>
                    log::warn!("CANALYST-II - unexpected USB product: {}, firmware may be unsupported", product),
                Ok(_) => {},
                Err(e) => log::warn!("CANALYST-II - can't read USB product string: {}", e),
            }

            let config = device.active_config_descriptor().map_err(usb_error)?;
            let interfaces = config.num_interfaces() as usize;
            if interfaces != USB_INTERFACE_COUNT {
                log::warn!("CANALYST-II - unexpected interface count: {}, firmware may be unsupported", interfaces);
            }
            let interface = config.interfaces()
                .next()
                .and_then(|i| i.descriptors().next())
                .ok_or(CanError::transport_error("device has no interface"))?;
            let endpoints = interface.num_endpoints() as usize;
            if endpoints != USB_ENDPOINT_COUNT {
                log::warn!("CANALYST-II - unexpected endpoint count: {}, firmware may be unsupported", endpoints);
            }
            handle.claim_interface(interface.interface_number()).map_err(usb_error)?;

            log::info!("CANALYST-II - device: {} opened at bus: {} address: {}",
                index, device.bus_number(), device.address());
            Ok(Self { handle })
        }
    }

    impl Transport for UsbTransport {
        fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, CanError> {
            self.handle.write_bulk(endpoint, data, timeout).map_err(usb_error)
        }

        fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, CanError> {
            self.handle.read_bulk(endpoint, buf, timeout).map_err(usb_error)
        }
    }

    impl Drop for UsbTransport {
        /// The device only opens again in the same process after a reset.
        fn drop(&mut self) {
            if let Err(e) = self.handle.reset() {
                log::warn!("CANALYST-II - USB reset failed: {}", e);
            }
        }
    }
}
