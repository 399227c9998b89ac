//! Post-transfer hook scripts (spec §9 "Scripting hooks"), grounded on
//! `antfs_cli/scripting.py`'s `Runner`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;

use log::warn;

/// The action names passed as `argv[1]` to hook scripts, matching
/// `Runner.run_download`/`run_upload`/`run_delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Download,
    Upload,
    Delete,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::Download => "DOWNLOAD",
            Action::Upload => "UPLOAD",
            Action::Delete => "DELETE",
        }
    }
}

/// Runs every executable under a scripts directory, in sorted order, with
/// `(action, path, fit_type)` as arguments. Spawned detached on a
/// background thread the way `Runner.run_action` does, so a slow or
/// hanging hook never blocks the sync loop.
pub struct Runner {
    directory: PathBuf,
}

impl Runner {
    pub fn new(directory: impl Into<PathBuf>) -> Runner {
        Runner {
            directory: directory.into(),
        }
    }

    fn scripts(&self) -> Vec<PathBuf> {
        let mut scripts: Vec<PathBuf> = fs::read_dir(&self.directory)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        scripts.sort();
        scripts
    }

    fn run_action(&self, action: Action, filename: &Path, fit_type: u8) {
        for script in self.scripts() {
            let status = Command::new(&script)
                .arg(action.as_str())
                .arg(filename)
                .arg(fit_type.to_string())
                .status();
            match status {
                Ok(status) if !status.success() => {
                    warn!("hook script {} exited with {}", script.display(), status);
                }
                Err(e) => {
                    warn!("could not run hook script {}: {}", script.display(), e);
                }
                Ok(_) => {}
            }
        }
    }

    fn spawn(&self, action: Action, filename: PathBuf, fit_type: u8) {
        let directory = self.directory.clone();
        thread::spawn(move || {
            Runner { directory }.run_action(action, &filename, fit_type);
        });
    }

    pub fn run_download(&self, filename: impl Into<PathBuf>, fit_type: u8) {
        self.spawn(Action::Download, filename.into(), fit_type);
    }

    pub fn run_upload(&self, filename: impl Into<PathBuf>, fit_type: u8) {
        self.spawn(Action::Upload, filename.into(), fit_type);
    }

    pub fn run_delete(&self, filename: impl Into<PathBuf>, fit_type: u8) {
        self.spawn(Action::Delete, filename.into(), fit_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_are_sorted() {
        let tmp = std::env::temp_dir().join(format!("antfs-scripts-test-{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        fs::write(tmp.join("b.sh"), "#!/bin/sh\n").unwrap();
        fs::write(tmp.join("a.sh"), "#!/bin/sh\n").unwrap();

        let runner = Runner::new(&tmp);
        let names: Vec<_> = runner
            .scripts()
            .iter()
            .map(|p| p.file_name().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["a.sh", "b.sh"]);

        fs::remove_dir_all(&tmp).unwrap();
    }
}
