//! Bulk-USB dongle variant, grounded on `ant/base/driver.py`'s
//! `USBDriver`/`USB2Driver`/`USB3Driver` (pyusb-based: find device,
//! detach kernel driver, find IN/OUT bulk endpoints) but built on
//! `rusb` (libusb bindings) instead.

use std::time::Duration;

use rusb::{DeviceHandle, GlobalContext};

use super::Driver;
use crate::error::{Error, Result};

const READ_TIMEOUT: Duration = Duration::from_millis(50);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);
const INTERFACE: u8 = 0;

pub struct UsbDriver {
    vendor: u16,
    product: u16,
    handle: Option<DeviceHandle<GlobalContext>>,
    endpoint_in: u8,
    endpoint_out: u8,
}

impl UsbDriver {
    pub fn new(vendor: u16, product: u16) -> Self {
        UsbDriver {
            vendor,
            product,
            handle: None,
            endpoint_in: 0x81,
            endpoint_out: 0x01,
        }
    }

    pub fn find_ids(vendor: u16, product: u16) -> bool {
        rusb::devices()
            .ok()
            .map(|list| {
                list.iter().any(|dev| {
                    dev.device_descriptor()
                        .map(|d| d.vendor_id() == vendor && d.product_id() == product)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }
}

impl Driver for UsbDriver {
    fn find() -> bool {
        // Concrete vendor/product are only known once constructed; the
        // transport's probe loop calls `find_ids` directly instead.
        false
    }

    fn open(&mut self) -> Result<()> {
        let handle = rusb::open_device_with_vid_pid(self.vendor, self.product)
            .ok_or_else(|| Error::DriverOpenFailed("device not found".into()))?;

        if handle
            .kernel_driver_active(INTERFACE)
            .unwrap_or(false)
        {
            handle
                .detach_kernel_driver(INTERFACE)
                .map_err(|e| Error::DriverOpenFailed(e.to_string()))?;
        }

        handle
            .set_active_configuration(1)
            .map_err(|e| Error::DriverOpenFailed(e.to_string()))?;
        handle
            .claim_interface(INTERFACE)
            .map_err(|e| Error::DriverOpenFailed(e.to_string()))?;

        self.handle = Some(handle);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.release_interface(INTERFACE);
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        let handle = self.handle.as_ref().expect("driver not open");
        let mut buf = [0u8; 4096];
        match handle.read_bulk(self.endpoint_in, &mut buf, READ_TIMEOUT) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(rusb::Error::Timeout) => Ok(Vec::new()),
            Err(e) => Err(Error::DriverOpenFailed(e.to_string())),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let handle = self.handle.as_ref().expect("driver not open");
        handle
            .write_bulk(self.endpoint_out, data, WRITE_TIMEOUT)
            .map(|_| ())
            .map_err(|e| match e {
                rusb::Error::Timeout => Error::DriverTimeout,
                other => Error::DriverOpenFailed(other.to_string()),
            })
    }
}
