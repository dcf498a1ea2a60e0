//! Host audio backend boundary
//!
//! The engine drives audio exclusively through [`AudioBackend`]. Handles are
//! opaque newtypes handed out by the backend; the engine never interprets
//! them.
//!
//! Three implementations ship with the crate:
//! - [`NullBackend`]: accepts everything, logs at `trace`
//! - [`RecordingBackend`]: records every call for inspection
//! - `streaming::RodioBackend` (feature `streaming`): real output through rodio

mod null;
mod recording;

pub use null::NullBackend;
pub use recording::{BackendCall, RecordingBackend};

use std::fmt;
use std::time::Duration;

/// Handle of a loaded sample or stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleHandle(pub u32);

/// Handle of a ready tracker module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleHandle(pub u32);

/// Ticket for a tracker module still being prepared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleTicket(pub u32);

impl fmt::Display for SampleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sample#{}", self.0)
    }
}

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// Encoding of sample bytes handed to [`AudioBackend::load_sample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// RIFF/WAVE sound effect
    Wav,
    /// Compressed stream (MP3, OGG, ...)
    Stream,
}

/// Tracker module repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Play through once
    Once,
    /// Loop until stopped
    Forever,
}

/// Readiness of a tracker module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Still preparing
    Loading,
    /// Ready for playback
    Ready(ModuleHandle),
    /// Preparation failed
    Failed(BackendError),
}

/// Backend failures
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Audio data could not be decoded
    #[error("decode failed: {0}")]
    Decode(String),

    /// Output device failure
    #[error("audio device: {0}")]
    Device(String),

    /// Handle was never issued or has been released
    #[error("unknown handle {0}")]
    UnknownHandle(u32),

    /// Operation or format not supported by this backend
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Host audio operations used by the engine
///
/// Volumes are gains in 0..1, pans are in -1..1 and rates are ratios of the
/// nominal playback frequency. Stream positions and durations are in seconds.
pub trait AudioBackend {
    /// Decode and register a sample or stream
    fn load_sample(&mut self, bytes: Vec<u8>, format: SampleFormat) -> Result<SampleHandle, BackendError>;

    /// Start playback from the beginning
    fn play(&mut self, handle: SampleHandle) -> Result<(), BackendError>;

    /// Pause playback, keeping the position
    fn pause(&mut self, handle: SampleHandle) -> Result<(), BackendError>;

    /// Resume paused playback
    fn resume(&mut self, handle: SampleHandle) -> Result<(), BackendError>;

    /// Stop playback and rewind
    fn stop(&mut self, handle: SampleHandle) -> Result<(), BackendError>;

    /// Free the sample; the handle becomes invalid
    fn release(&mut self, handle: SampleHandle) -> Result<(), BackendError>;

    /// Set output gain (0..1)
    fn set_volume(&mut self, handle: SampleHandle, volume: f32) -> Result<(), BackendError>;

    /// Set stereo pan (-1..1)
    fn set_pan(&mut self, handle: SampleHandle, pan: f32) -> Result<(), BackendError>;

    /// Set playback rate ratio
    fn set_rate(&mut self, handle: SampleHandle, rate: f32) -> Result<(), BackendError>;

    /// Enable or disable looping
    fn set_loop(&mut self, handle: SampleHandle, looping: bool) -> Result<(), BackendError>;

    /// Ramp the gain from `from` to `to` over `duration`
    fn fade(&mut self, handle: SampleHandle, from: f32, to: f32, duration: Duration) -> Result<(), BackendError>;

    /// Total length in seconds, if known
    fn duration(&mut self, handle: SampleHandle) -> Result<Option<f64>, BackendError>;

    /// Playback position in seconds
    fn position(&mut self, handle: SampleHandle) -> Result<f64, BackendError>;

    /// Jump to a position in seconds
    fn seek(&mut self, handle: SampleHandle, secs: f64) -> Result<(), BackendError>;

    /// Start preparing a tracker module
    fn load_module(&mut self, bytes: Vec<u8>, repeat: Repeat) -> Result<ModuleTicket, BackendError>;

    /// Check whether a module finished preparing
    fn poll_module(&mut self, ticket: ModuleTicket) -> ModuleStatus;

    /// Start module playback
    fn module_play(&mut self, handle: ModuleHandle) -> Result<(), BackendError>;

    /// Pause module playback
    fn module_pause(&mut self, handle: ModuleHandle) -> Result<(), BackendError>;

    /// Resume module playback
    fn module_resume(&mut self, handle: ModuleHandle) -> Result<(), BackendError>;

    /// Stop module playback
    fn module_stop(&mut self, handle: ModuleHandle) -> Result<(), BackendError>;

    /// Free the module
    fn module_release(&mut self, handle: ModuleHandle) -> Result<(), BackendError>;

    /// Set module output gain (0..1)
    fn module_set_volume(&mut self, handle: ModuleHandle, volume: f32) -> Result<(), BackendError>;

    /// Number of entries in the module's order list
    fn module_total_orders(&mut self, handle: ModuleHandle) -> Result<u16, BackendError>;

    /// Current (order, row)
    fn module_order_row(&mut self, handle: ModuleHandle) -> Result<(u16, u16), BackendError>;

    /// Jump to (order, row)
    fn module_set_order_row(&mut self, handle: ModuleHandle, order: u16, row: u16) -> Result<(), BackendError>;
}
