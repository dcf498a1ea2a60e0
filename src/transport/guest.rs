//! Guest collaborator traits
//!
//! The bridge never touches the emulator directly. It reads and writes guest
//! files by their DOS path and watches one of two notification channels: a
//! signal word (DS4QB++ and DS4QB2) or the clipboard (DS4QB1).

use std::io;

/// Guest file access failures
#[derive(thiserror::Error, Debug)]
pub enum GuestIoError {
    /// No file at this guest path
    #[error("guest file not found: {0}")]
    NotFound(String),

    /// Host I/O failed while accessing a guest file
    #[error("guest file {path}: {source}")]
    Io {
        /// Guest path
        path: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Guest disk access by DOS path
pub trait GuestFiles {
    /// Read a whole guest file
    fn read(&self, path: &str) -> Result<Vec<u8>, GuestIoError>;

    /// Create or replace a guest file
    fn write(&mut self, path: &str, bytes: &[u8]) -> Result<(), GuestIoError>;
}

/// Guest with a signal word
pub trait GuestIo: GuestFiles {
    /// Current signal value; zero means no command is pending
    fn poll_signal(&self) -> u16;

    /// Reset the signal to zero
    fn clear_signal(&mut self);
}

/// Guest with a clipboard
pub trait ClipboardIo: GuestFiles {
    /// Current clipboard contents, if any
    fn poll_clipboard(&self) -> Option<Vec<u8>>;

    /// Empty the clipboard
    fn clear_clipboard(&mut self);
}
