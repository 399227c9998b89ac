//! Serial-over-USB dongle variant, grounded on `ant/base/driver.py`'s
//! `SerialDriver` (which scans `/sys/bus/usb-serial/devices` for a
//! matching vendor/product pair) but built on the `serialport` crate
//! instead of pyserial.

use std::time::Duration;

use serialport::SerialPort;

use super::Driver;
use crate::error::{Error, Result};

const ID_VENDOR: u16 = 0x0fcf;
const ID_PRODUCT: u16 = 0x1004;
const BAUD_RATE: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_millis(50);

pub struct SerialDriver {
    port_name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialDriver {
    pub fn new() -> Result<Self> {
        let port_name = Self::find_port().ok_or(Error::DriverNotFound)?;
        Ok(SerialDriver {
            port_name,
            port: None,
        })
    }

    fn find_port() -> Option<String> {
        serialport::available_ports()
            .ok()?
            .into_iter()
            .find_map(|info| match info.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    if usb.vid == ID_VENDOR || usb.pid == ID_PRODUCT {
                        Some(info.port_name)
                    } else {
                        None
                    }
                }
                _ => None,
            })
    }
}

impl Driver for SerialDriver {
    fn find() -> bool {
        Self::find_port().is_some()
    }

    fn open(&mut self) -> Result<()> {
        let port = serialport::new(&self.port_name, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| Error::DriverOpenFailed(e.to_string()))?;
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.port = None;
        Ok(())
    }

    fn read(&mut self) -> Result<Vec<u8>> {
        let port = self.port.as_mut().expect("driver not open");
        let mut buf = [0u8; 4096];
        match port.read(&mut buf) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().expect("driver not open");
        port.write_all(data).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                Error::DriverTimeout
            } else {
                Error::Io(e)
            }
        })
    }
}
