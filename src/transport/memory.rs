//! In-memory guest

use std::collections::HashMap;

use super::guest::{ClipboardIo, GuestFiles, GuestIo, GuestIoError};

/// Guest whose disk, signal and clipboard live in memory
///
/// Paths are matched case-insensitively with `/` and `\` treated alike, the
/// way DOS resolves them. Drive letters and leading separators are dropped,
/// so every guest path is relative to one disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryGuest {
    files: HashMap<String, Vec<u8>>,
    signal: u16,
    clipboard: Option<Vec<u8>>,
    writes: Vec<String>,
}

fn key(path: &str) -> String {
    let path = path.replace('/', "\\").to_ascii_uppercase();
    let path = match path.as_bytes() {
        [drive, b':', ..] if drive.is_ascii_alphabetic() => &path[2..],
        _ => &path[..],
    };
    path.trim_start_matches('\\').to_string()
}

impl MemoryGuest {
    /// Empty guest
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a file on the guest disk
    pub fn insert_file(&mut self, path: &str, bytes: Vec<u8>) {
        self.files.insert(key(path), bytes);
    }

    /// Contents of a guest file
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(&key(path)).map(Vec::as_slice)
    }

    /// Paths written by the bridge, in order
    pub fn writes(&self) -> &[String] {
        &self.writes
    }

    /// Raise the signal word
    pub fn raise_signal(&mut self, signal: u16) {
        self.signal = signal;
    }

    /// Current signal word
    pub fn signal(&self) -> u16 {
        self.signal
    }

    /// Put data on the clipboard
    pub fn set_clipboard(&mut self, data: Vec<u8>) {
        self.clipboard = Some(data);
    }

    /// Current clipboard contents
    pub fn clipboard(&self) -> Option<&[u8]> {
        self.clipboard.as_deref()
    }
}

impl GuestFiles for MemoryGuest {
    fn read(&self, path: &str) -> Result<Vec<u8>, GuestIoError> {
        self.files
            .get(&key(path))
            .cloned()
            .ok_or_else(|| GuestIoError::NotFound(path.to_string()))
    }

    fn write(&mut self, path: &str, bytes: &[u8]) -> Result<(), GuestIoError> {
        self.files.insert(key(path), bytes.to_vec());
        self.writes.push(path.to_string());
        Ok(())
    }
}

impl GuestIo for MemoryGuest {
    fn poll_signal(&self) -> u16 {
        self.signal
    }

    fn clear_signal(&mut self) {
        self.signal = 0;
    }
}

impl ClipboardIo for MemoryGuest {
    fn poll_clipboard(&self) -> Option<Vec<u8>> {
        self.clipboard.clone()
    }

    fn clear_clipboard(&mut self) {
        self.clipboard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_ignore_case_and_separator() {
        let mut guest = MemoryGuest::new();
        guest.insert_file("game\\sfx/Boom.wav", vec![1, 2]);
        assert_eq!(guest.read("GAME/SFX\\BOOM.WAV").unwrap(), vec![1, 2]);
        assert_eq!(guest.read("C:\\GAME\\SFX\\BOOM.WAV").unwrap(), vec![1, 2]);
        assert!(matches!(guest.read("GAME\\OTHER.WAV"), Err(GuestIoError::NotFound(_))));
    }

    #[test]
    fn test_writes_are_tracked() {
        let mut guest = MemoryGuest::new();
        guest.write("DS4QB.VCW", &[9]).unwrap();
        assert_eq!(guest.writes(), ["DS4QB.VCW"]);
        assert_eq!(guest.file("ds4qb.vcw"), Some(&[9u8][..]));
    }
}
