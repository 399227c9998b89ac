//! Host-side client library for ANT-FS wireless file-sync devices
//! (Garmin/Dynastream sport watches and similar).
//!
//! Layered bottom-up: [`frame`] (wire framing + CRC-checked messages),
//! [`driver`] (dongle I/O), [`transport`] (reader thread + beacon/event
//! routing), [`channel`] (ANT channel configuration and request/response
//! helpers), [`fs`] (the ANT-FS protocol: beacons, session commands,
//! directory model, download/upload engines), and [`sync`] (orchestrates
//! a full link/authenticate/transport cycle against local storage).

pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod fs;
pub mod scripting;
pub mod sync;
pub mod transport;

pub use error::{Error, Result};
