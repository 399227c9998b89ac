//! Directory listing and per-file entries (spec §3 "Directory entry"),
//! grounded on `ant/fs/file.py`'s `Directory.parse`/`File.parse`.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// Seconds between the ANT-FS local epoch and the Unix epoch.
pub const ANTFS_EPOCH_OFFSET: i64 = 631_065_600;

pub const FILE_TYPE_FIT: u8 = 0x80;

/// `fit_sub_type` values (spec's folder-mapping identifiers), grounded on
/// `File.Identifier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Identifier {
    Device = 1,
    Setting = 2,
    SportSetting = 3,
    Activity = 4,
    Workout = 5,
    Course = 6,
    Weight = 9,
    Totals = 10,
    Goals = 11,
    BloodPressure = 14,
    ActivitySummary = 20,
    /// Garmin monitoring/daily-activity files; present on the wire but not
    /// enumerated in `File.Identifier` upstream. Folder `monitoring_b`.
    MonitoringB = 15,
}

impl Identifier {
    pub fn from_u8(v: u8) -> Option<Self> {
        use Identifier::*;
        Some(match v {
            1 => Device,
            2 => Setting,
            3 => SportSetting,
            4 => Activity,
            5 => Workout,
            6 => Course,
            9 => Weight,
            10 => Totals,
            11 => Goals,
            14 => BloodPressure,
            15 => MonitoringB,
            20 => ActivitySummary,
            _ => return None,
        })
    }
}

/// One 16-byte directory entry (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub index: u16,
    pub data_type: u8,
    /// Raw 3-byte identifier: `[fit_sub_type, fit_file_number_lo, fit_file_number_hi]`.
    identifier: [u8; 3],
    pub type_flags: u8,
    pub flags: u8,
    pub size: u32,
    pub date_raw: u32,
}

impl File {
    pub fn fit_sub_type(&self) -> u8 {
        self.identifier[0]
    }

    pub fn fit_file_number(&self) -> u16 {
        u16::from_le_bytes([self.identifier[1], self.identifier[2]])
    }

    pub fn identifier(&self) -> Option<Identifier> {
        Identifier::from_u8(self.fit_sub_type())
    }

    pub fn date(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.date_raw as i64 + ANTFS_EPOCH_OFFSET, 0)
            .single()
            .expect("ANT-FS timestamps fit in range")
    }

    pub fn is_readable(&self) -> bool {
        self.flags & 0b0000_1000 == 0
    }

    pub fn is_writeable(&self) -> bool {
        self.flags & 0b0001_0000 == 0
    }

    pub fn is_erasable(&self) -> bool {
        self.flags & 0b0010_0000 == 0
    }

    pub fn is_archived(&self) -> bool {
        self.flags & 0b0100_0000 == 0
    }

    pub fn is_append_only(&self) -> bool {
        self.flags & 0b1000_0000 == 0
    }

    pub fn parse(data: &[u8]) -> Result<File> {
        if data.len() != 16 {
            return Err(Error::DirectoryDecode(format!(
                "file entry must be 16 bytes, got {}",
                data.len()
            )));
        }
        Ok(File {
            index: u16::from_le_bytes([data[0], data[1]]),
            data_type: data[2],
            identifier: [data[3], data[4], data[5]],
            type_flags: data[6],
            flags: data[7],
            size: u32::from_le_bytes(data[8..12].try_into().unwrap()),
            date_raw: u32::from_le_bytes(data[12..16].try_into().unwrap()),
        })
    }
}

/// The directory file (index 0): a 16-byte header followed by N 16-byte
/// [`File`] entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub version_major: u8,
    pub version_minor: u8,
    pub structure_length: u8,
    pub time_format: u8,
    pub current_system_time: u32,
    pub last_modified: u32,
    files: Vec<File>,
}

impl Directory {
    pub fn files(&self) -> &[File] {
        &self.files
    }

    pub fn parse(data: &[u8]) -> Result<Directory> {
        if data.len() < 16 {
            return Err(Error::DirectoryDecode("directory shorter than its 16-byte header".into()));
        }
        let version = data[0];
        let structure_length = data[1];
        let time_format = data[2];
        let current_system_time = u32::from_le_bytes(data[8..12].try_into().unwrap());
        let last_modified = u32::from_le_bytes(data[12..16].try_into().unwrap());

        let mut files = Vec::new();
        let mut offset = 16;
        while offset + 16 <= data.len() {
            files.push(File::parse(&data[offset..offset + 16])?);
            offset += 16;
        }

        Ok(Directory {
            version_major: (version & 0xf0) >> 4,
            version_minor: version & 0x0f,
            structure_length,
            time_format,
            current_system_time,
            last_modified,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(index: u16, sub_type: u8, fit_number: u16, flags: u8) -> Vec<u8> {
        let mut out = index.to_le_bytes().to_vec();
        out.push(FILE_TYPE_FIT);
        out.push(sub_type);
        out.extend_from_slice(&fit_number.to_le_bytes());
        out.push(0); // type_flags
        out.push(flags);
        out.extend_from_slice(&1000u32.to_le_bytes()); // size
        out.extend_from_slice(&100u32.to_le_bytes()); // date_raw
        out
    }

    #[test]
    fn parses_header_and_entries() {
        let mut data = vec![0x12, 0x00, 0x00, 0, 0, 0, 0, 0];
        data.extend_from_slice(&500u32.to_le_bytes());
        data.extend_from_slice(&600u32.to_le_bytes());
        data.extend(sample_entry(1, Identifier::Activity as u8, 42, 0));
        data.extend(sample_entry(2, Identifier::Course as u8, 7, 0b0100_0000));

        let dir = Directory::parse(&data).unwrap();
        assert_eq!(dir.version_major, 1);
        assert_eq!(dir.version_minor, 2);
        assert_eq!(dir.current_system_time, 500);
        assert_eq!(dir.last_modified, 600);
        assert_eq!(dir.files().len(), 2);
        assert_eq!(dir.files()[0].identifier(), Some(Identifier::Activity));
        assert_eq!(dir.files()[0].fit_file_number(), 42);
        assert!(dir.files()[0].is_archived());
        assert!(!dir.files()[1].is_archived());
    }

    #[test]
    fn date_applies_antfs_epoch_offset() {
        let entry = File::parse(&sample_entry(1, Identifier::Activity as u8, 1, 0)).unwrap();
        assert_eq!(entry.date().timestamp(), 100 + ANTFS_EPOCH_OFFSET);
    }

    #[test]
    fn rejects_short_header() {
        assert!(Directory::parse(&[0u8; 8]).is_err());
    }
}
