//! Host directory standing in for the guest disk

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use super::guest::{ClipboardIo, GuestFiles, GuestIo, GuestIoError};

/// Guest backed by a host directory
///
/// Guest paths are resolved component by component under `root`, matching
/// names case-insensitively. The signal word is the first two bytes of the
/// signal file; the clipboard is the whole clipboard file.
#[derive(Debug, Clone)]
pub struct DirectoryGuest {
    root: PathBuf,
    signal_file: String,
    clipboard_file: String,
}

impl DirectoryGuest {
    /// Guest rooted at `root` with its signal and clipboard files given as guest paths
    pub fn new(root: impl Into<PathBuf>, signal_file: impl Into<String>, clipboard_file: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            signal_file: signal_file.into(),
            clipboard_file: clipboard_file.into(),
        }
    }

    /// Host root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a guest path to a host path
    ///
    /// Components that exist under a different case resolve to the existing
    /// entry. Missing components are kept verbatim so writes can create them.
    /// A leading drive letter maps to `root`. A `..` steps back one component
    /// and never climbs above `root`.
    pub fn host_path(&self, guest_path: &str) -> PathBuf {
        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        let components = guest_path.split(['\\', '/']).filter(|c| !c.is_empty() && *c != ".");
        for (index, component) in components.enumerate() {
            if index == 0 && is_drive(component) {
                continue;
            }
            if component == ".." {
                if depth > 0 {
                    resolved.pop();
                    depth -= 1;
                }
                continue;
            }
            depth += 1;
            let exact = resolved.join(component);
            if exact.exists() {
                resolved = exact;
                continue;
            }
            let matched = fs::read_dir(&resolved).ok().and_then(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .find(|entry| entry.file_name().to_string_lossy().eq_ignore_ascii_case(component))
                    .map(|entry| entry.path())
            });
            resolved = matched.unwrap_or(exact);
        }
        resolved
    }

    fn io_error(path: &str, source: io::Error) -> GuestIoError {
        if source.kind() == io::ErrorKind::NotFound {
            GuestIoError::NotFound(path.to_string())
        } else {
            GuestIoError::Io {
                path: path.to_string(),
                source,
            }
        }
    }
}

fn is_drive(component: &str) -> bool {
    matches!(component.as_bytes(), [letter, b':'] if letter.is_ascii_alphabetic())
}

impl GuestFiles for DirectoryGuest {
    fn read(&self, path: &str) -> Result<Vec<u8>, GuestIoError> {
        fs::read(self.host_path(path)).map_err(|err| Self::io_error(path, err))
    }

    fn write(&mut self, path: &str, bytes: &[u8]) -> Result<(), GuestIoError> {
        let host = self.host_path(path);
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent).map_err(|err| Self::io_error(path, err))?;
        }
        fs::write(host, bytes).map_err(|err| Self::io_error(path, err))
    }
}

impl GuestIo for DirectoryGuest {
    fn poll_signal(&self) -> u16 {
        match fs::read(self.host_path(&self.signal_file)) {
            Ok(bytes) => match bytes.as_slice() {
                [lo, hi, ..] => u16::from_le_bytes([*lo, *hi]),
                [lo] => u16::from(*lo),
                [] => 0,
            },
            Err(_) => 0,
        }
    }

    fn clear_signal(&mut self) {
        let path = self.signal_file.clone();
        if let Err(err) = self.write(&path, &[0, 0]) {
            warn!(%err, "unable to clear signal");
        }
    }
}

impl ClipboardIo for DirectoryGuest {
    fn poll_clipboard(&self) -> Option<Vec<u8>> {
        fs::read(self.host_path(&self.clipboard_file)).ok()
    }

    fn clear_clipboard(&mut self) {
        let host = self.host_path(&self.clipboard_file);
        if let Err(err) = fs::remove_file(&host) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %host.display(), %err, "unable to clear clipboard");
            }
        }
    }
}
