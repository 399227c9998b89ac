//! ANT-FS protocol layer: beacon/command wire format, CRC, directory
//! model, session state machine, and the download/upload engines.

pub mod beacon;
pub mod command;
pub mod crc;
pub mod download;
pub mod file;
pub mod session;
pub mod upload;

pub use beacon::{Beacon, ClientDeviceState};
pub use download::{download, download_directory};
pub use file::{Directory, File, Identifier};
pub use session::Session;
pub use upload::upload;
