//! Dongle driver (spec §4.1): an opaque byte pipe to the radio hardware.
//! The transport core only ever sees `read`/`write`; no framing leaks
//! through this boundary.

mod serial;
mod usb;

pub use serial::SerialDriver;
pub use usb::UsbDriver;

use crate::error::{Error, Result};

/// Capability set a dongle driver must provide. Implementations are
/// selected by probing `find()` in a fixed order (spec §4.1): the first
/// variant whose `find` succeeds is opened.
pub trait Driver: Send {
    /// Probe whether this driver's hardware is present, without opening it.
    fn find() -> bool
    where
        Self: Sized;

    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;

    /// Read whatever bytes are currently available. Returns an empty
    /// vector if nothing arrived before the driver's internal timeout;
    /// never blocks indefinitely.
    fn read(&mut self) -> Result<Vec<u8>>;

    /// Write a fully framed message. Fails with [`Error::DriverTimeout`]
    /// if the pipe cannot accept it.
    fn write(&mut self, data: &[u8]) -> Result<()>;
}

/// (vendor id, product id) pairs this build recognises, probed in order.
const USB_IDS: &[(u16, u16)] = &[(0x0fcf, 0x1008), (0x0fcf, 0x1009)];

/// Probe known driver variants in a fixed order and open the first match
/// (spec §4.1). Serial-over-USB is tried first since it requires no
/// libusb kernel-driver detachment dance.
pub fn open_first_available() -> Result<Box<dyn Driver>> {
    if SerialDriver::find() {
        let mut d = SerialDriver::new()?;
        d.open()?;
        return Ok(Box::new(d));
    }
    for &(vendor, product) in USB_IDS {
        if UsbDriver::find_ids(vendor, product) {
            let mut d = UsbDriver::new(vendor, product);
            d.open()?;
            return Ok(Box::new(d));
        }
    }
    Err(Error::DriverNotFound)
}
