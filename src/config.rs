//! On-disk layout and CLI arguments (spec §5 "Host-side storage"),
//! grounded on `antfs_cli/program.py`'s `Device`/`main` and
//! `antfs_cli/utilities.py`'s `XDG`.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use directories::ProjectDirs;

use crate::error::{Error, Result};
use crate::fs::Identifier;

const PROFILE_VERSION: u32 = 1;
const PROFILE_VERSION_FILE: &str = "profile_version";
const AUTHFILE: &str = "authfile";

/// Local folder name paired with the [`Identifier`] it stores, replacing
/// the Python original's string-keyed `_directories` dict with a fixed
/// table (per spec.md's redesign note on dict-keyed lookups).
pub const FOLDERS: &[(&str, Option<Identifier>)] = &[
    (".", Some(Identifier::Device)),
    ("activities", Some(Identifier::Activity)),
    ("courses", Some(Identifier::Course)),
    ("monitoring_b", Some(Identifier::MonitoringB)),
    ("settings", Some(Identifier::Setting)),
    ("sports", Some(Identifier::SportSetting)),
    ("totals", Some(Identifier::Totals)),
    ("weight", Some(Identifier::Weight)),
    ("workouts", Some(Identifier::Workout)),
];

pub fn folder_for(identifier: Identifier) -> Option<&'static str> {
    FOLDERS
        .iter()
        .find(|(_, id)| *id == Some(identifier))
        .map(|(folder, _)| *folder)
}

fn makedirs_if_not_exists(path: &Path) -> Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Command-line arguments, replacing the Python original's `ArgumentParser`
/// with a `clap` derive (spec §6).
#[derive(Debug, Parser)]
#[command(
    name = "antfs-cli",
    about = "Extracts FIT files from ANT-FS based sport watches."
)]
pub struct Args {
    /// Enable uploading.
    #[arg(long)]
    pub upload: bool,

    /// Enable debug logging to stderr.
    #[arg(long)]
    pub debug: bool,

    /// Force pairing even if already paired.
    #[arg(long)]
    pub pair: bool,

    /// Don't download files marked as "archived" on the watch.
    #[arg(short = 'a', long = "skip-archived")]
    pub skip_archived: bool,
}

/// Application config directory, resolved via `directories::ProjectDirs`
/// rather than hand-rolled `XDG_CONFIG_HOME` parsing.
pub fn config_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "antfs-cli")
        .ok_or_else(|| Error::DriverOpenFailed("no home directory for config resolution".into()))?;
    Ok(dirs.config_dir().to_path_buf())
}

/// Per-device subtree under the config directory: profile-version guard,
/// per-folder layout, and the saved passkey (spec §5), grounded on
/// `Device.__init__`/`read_passkey`/`write_passkey`.
pub struct Device {
    path: PathBuf,
    serial: u32,
    name: Option<String>,
}

impl Device {
    pub fn open(base_dir: &Path, serial: u32, name: Option<String>) -> Result<Device> {
        let path = base_dir.join(serial.to_string());

        if path.is_dir() {
            let found = read_profile_version(&path);
            if found != PROFILE_VERSION {
                return Err(Error::ProfileVersionMismatch {
                    found,
                    expected: PROFILE_VERSION,
                });
            }
        }

        makedirs_if_not_exists(&path)?;
        for (folder, _) in FOLDERS {
            makedirs_if_not_exists(&path.join(folder))?;
        }

        let version_path = path.join(PROFILE_VERSION_FILE);
        if !version_path.exists() {
            fs::write(&version_path, PROFILE_VERSION.to_string())?;
        }

        Ok(Device { path, serial, name })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn read_passkey(&self) -> Option<Vec<u8>> {
        fs::read(self.path.join(AUTHFILE)).ok()
    }

    pub fn write_passkey(&self, passkey: &[u8]) -> Result<()> {
        fs::write(self.path.join(AUTHFILE), passkey)?;
        Ok(())
    }
}

fn read_profile_version(path: &Path) -> u32 {
    fs::read_to_string(path.join(PROFILE_VERSION_FILE))
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_for_round_trips_against_table() {
        for (folder, identifier) in FOLDERS {
            if let Some(identifier) = identifier {
                assert_eq!(folder_for(*identifier), Some(*folder));
            }
        }
    }

    #[test]
    fn new_device_creates_layout_and_profile_file() {
        let tmp = std::env::temp_dir().join(format!("antfs-test-{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        let device = Device::open(&tmp, 42, Some("watch".into())).unwrap();
        assert!(device.path().join("activities").is_dir());
        assert!(device.path().join(PROFILE_VERSION_FILE).exists());
        assert_eq!(device.serial(), 42);
        fs::remove_dir_all(&tmp).unwrap();
    }
}
