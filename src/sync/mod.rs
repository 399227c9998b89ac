//! Directory diff and transfer orchestration (spec §4.9 "Sync
//! orchestration"), grounded on `antfs_cli/program.py`'s
//! `AntFSCLI.on_transport`.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};

use crate::config::{folder_for, Device, FOLDERS};
use crate::error::Result;
use crate::fs::file::File as RemoteFile;
use crate::fs::{download, upload, Directory, Identifier, Session};
use crate::scripting::Runner;

/// A `.fit` file found on disk, paired with the folder's [`Identifier`].
struct LocalFile {
    path: PathBuf,
    filename: String,
    filetype: Identifier,
}

fn canonical_filename(file: &RemoteFile) -> String {
    format!(
        "{}_{}_{}.fit",
        file.date().format("%Y-%m-%d_%H-%M-%S"),
        file.fit_sub_type(),
        file.fit_file_number()
    )
}

fn scan_local_files(device: &Device) -> Vec<LocalFile> {
    let mut files = Vec::new();
    for (folder, filetype) in FOLDERS {
        let Some(filetype) = filetype else { continue };
        let dir = device.path().join(folder);
        let Ok(entries) = fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("fit")) != Some(true) {
                continue;
            }
            let filename = path.file_name().unwrap().to_string_lossy().to_string();
            files.push(LocalFile {
                path,
                filename,
                filetype: *filetype,
            });
        }
    }
    files
}

/// First free upload slot for `filetype`: an existing writeable, empty
/// directory entry of that type if the device already advertises one,
/// otherwise one past the highest index in use. The retrieved protocol
/// sources never implement slot allocation for new files, so this is an
/// engineering approximation rather than a literal port.
fn allocate_upload_index(directory: &Directory, filetype: Identifier) -> u16 {
    directory
        .files()
        .iter()
        .find(|f| f.identifier() == Some(filetype) && f.is_writeable() && f.size == 0)
        .map(|f| f.index)
        .unwrap_or_else(|| directory.files().iter().map(|f| f.index).max().unwrap_or(0) + 1)
}

/// Runs one full link -> authenticate -> transport cycle's transport-phase
/// work: compute the local/remote diff, download what's missing, and
/// (if enabled) upload what the device doesn't have yet.
pub struct Orchestrator<'a> {
    session: &'a Session<'a>,
    device: &'a Device,
    runner: &'a Runner,
    upload_enabled: bool,
    skip_archived: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        session: &'a Session<'a>,
        device: &'a Device,
        runner: &'a Runner,
        upload_enabled: bool,
        skip_archived: bool,
    ) -> Self {
        Orchestrator {
            session,
            device,
            runner,
            upload_enabled,
            skip_archived,
        }
    }

    pub fn run(&self) -> Result<()> {
        let directory = download::download_directory(self.session, |_| {})?;

        let local_files = scan_local_files(self.device);
        let local_names: HashSet<&str> = local_files.iter().map(|f| f.filename.as_str()).collect();

        let mut remote_files: Vec<(String, &RemoteFile)> = directory
            .files()
            .iter()
            .filter(|f| f.identifier().is_some() && f.is_readable())
            .map(|f| (canonical_filename(f), f))
            .collect();
        let remote_names: HashSet<&str> = remote_files.iter().map(|(name, _)| name.as_str()).collect();

        let mut downloading: Vec<(String, &RemoteFile)> = remote_files
            .drain(..)
            .filter(|(name, f)| !local_names.contains(name.as_str()) || !f.is_archived())
            .collect();
        if self.skip_archived {
            downloading.retain(|(_, f)| !f.is_archived());
        }

        let uploading: Vec<&LocalFile> = local_files
            .iter()
            .filter(|f| !remote_names.contains(f.filename.as_str()))
            .collect();

        info!("downloading {} file(s)", downloading.len());
        if self.upload_enabled {
            info!("uploading {} file(s)", uploading.len());
        }

        for (filename, file) in &downloading {
            self.download_file(filename, file)?;
        }

        if self.upload_enabled && !uploading.is_empty() {
            let mut uploaded = Vec::new();
            for local in &uploading {
                match self.upload_file(local, &directory) {
                    Ok(index) => uploaded.push((*local, index)),
                    Err(e) => warn!("upload of {} failed: {}", local.filename, e),
                }
            }

            if !uploaded.is_empty() {
                let directory = download::download_directory(self.session, |_| {})?;
                for (local, index) in uploaded {
                    self.rename_after_upload(local, index, &directory);
                }
            }
        }

        Ok(())
    }

    fn download_file(&self, filename: &str, file: &RemoteFile) -> Result<()> {
        let identifier = file.identifier().expect("filtered to known identifiers above");
        let folder = folder_for(identifier).unwrap_or(".");
        let path = self.device.path().join(folder).join(filename);

        info!("downloading {}", filename);
        let data = download::download(self.session, file.index, |_| {})?;
        fs::write(&path, &data)?;

        self.runner.run_download(&path, file.fit_sub_type());
        Ok(())
    }

    fn upload_file(&self, local: &LocalFile, directory: &Directory) -> Result<u16> {
        let data = fs::read(&local.path)?;
        let index = allocate_upload_index(directory, local.filetype);

        info!("uploading {} as index {}", local.filename, index);
        upload::upload(self.session, index, &data, |_| {})?;

        self.runner.run_upload(&local.path, local.filetype as u8);
        Ok(index)
    }

    fn rename_after_upload(&self, local: &LocalFile, index: u16, directory: &Directory) {
        let Some(remote) = directory.files().iter().find(|f| f.index == index) else {
            warn!("uploaded index {} not found in refreshed directory", index);
            return;
        };
        let folder = folder_for(local.filetype).unwrap_or(".");
        let dest = self.device.path().join(folder).join(canonical_filename(remote));
        if let Err(e) = fs::rename(&local.path, &dest) {
            warn!("could not rename {} to {}: {}", local.path.display(), dest.display(), e);
        } else {
            info!("renamed {} to {}", local.path.display(), dest.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: u16, sub_type: u8, fit_number: u16, flags: u8, size: u32, date_raw: u32) -> Vec<u8> {
        let mut out = index.to_le_bytes().to_vec();
        out.push(crate::fs::file::FILE_TYPE_FIT);
        out.push(sub_type);
        out.extend_from_slice(&fit_number.to_le_bytes());
        out.push(0);
        out.push(flags);
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&date_raw.to_le_bytes());
        out
    }

    fn directory_with(entries: &[Vec<u8>]) -> Directory {
        let mut data = vec![0x12, 0x00, 0x00, 0, 0, 0, 0, 0];
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        for e in entries {
            data.extend_from_slice(e);
        }
        Directory::parse(&data).unwrap()
    }

    #[test]
    fn canonical_filename_embeds_timestamp_and_identity() {
        let file = RemoteFile::parse(&entry(1, Identifier::Activity as u8, 42, 0, 1000, 100)).unwrap();
        let name = canonical_filename(&file);
        assert!(name.ends_with("_4_42.fit"));
        assert!(name.starts_with(&file.date().format("%Y-%m-%d_%H-%M-%S").to_string()));
    }

    #[test]
    fn allocate_upload_index_reuses_empty_writeable_slot() {
        let dir = directory_with(&[
            entry(1, Identifier::Activity as u8, 1, 0, 0, 0),
            entry(2, Identifier::Course as u8, 1, 0, 500, 0),
        ]);
        assert_eq!(allocate_upload_index(&dir, Identifier::Activity), 1);
    }

    #[test]
    fn allocate_upload_index_falls_back_to_next_free_index() {
        let dir = directory_with(&[
            entry(1, Identifier::Course as u8, 1, 0, 500, 0),
            entry(5, Identifier::Course as u8, 1, 0, 900, 0),
        ]);
        assert_eq!(allocate_upload_index(&dir, Identifier::Activity), 6);
    }

    #[test]
    fn allocate_upload_index_skips_non_writeable_empty_slot() {
        let dir = directory_with(&[entry(3, Identifier::Activity as u8, 1, 0b0001_0000, 0, 0)]);
        assert_eq!(allocate_upload_index(&dir, Identifier::Activity), 4);
    }

    #[test]
    fn scan_local_files_finds_fit_files_case_insensitively() {
        let tmp = std::env::temp_dir().join(format!("antfs-sync-test-{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        let device = Device::open(&tmp, 99, None).unwrap();
        fs::write(device.path().join("activities").join("a.FIT"), b"x").unwrap();
        fs::write(device.path().join("activities").join("b.txt"), b"x").unwrap();
        fs::write(device.path().join("courses").join("c.fit"), b"x").unwrap();

        let mut names: Vec<String> = scan_local_files(&device).into_iter().map(|f| f.filename).collect();
        names.sort();
        assert_eq!(names, vec!["a.FIT", "c.fit"]);

        fs::remove_dir_all(&tmp).unwrap();
    }
}
