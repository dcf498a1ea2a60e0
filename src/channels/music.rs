//! Loaded music state
//!
//! Streams and tracker modules measure length and position in different
//! units (bytes vs. order/row), so they live in separate variants and every
//! reader has to match on the kind.

use crate::backend::{ModuleHandle, ModuleTicket, SampleHandle};

/// Volume of a freshly loaded music channel
pub const INITIAL_MUSIC_VOLUME: u16 = 50;

/// One loaded long-form track
#[derive(Debug, Clone, PartialEq)]
pub enum MusicChannel {
    /// Compressed stream (MP3/OGG); position and length in bytes
    Stream(StreamChannel),
    /// Tracker module; position and length in orders and rows
    Tracker(TrackerChannel),
}

impl MusicChannel {
    /// Logical channel volume (0-100)
    pub fn volume(&self) -> u16 {
        match self {
            MusicChannel::Stream(stream) => stream.volume,
            MusicChannel::Tracker(tracker) => tracker.volume,
        }
    }

    /// Replace the logical channel volume
    pub fn set_volume(&mut self, volume: u16) {
        match self {
            MusicChannel::Stream(stream) => stream.volume = volume,
            MusicChannel::Tracker(tracker) => tracker.volume = volume,
        }
    }

    /// Short kind label for log events
    pub fn kind(&self) -> &'static str {
        match self {
            MusicChannel::Stream(_) => "stream",
            MusicChannel::Tracker(_) => "tracker",
        }
    }
}

/// Streamed compressed audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamChannel {
    /// Backend handle of the decoded stream
    pub handle: SampleHandle,
    /// Channel volume (0-100)
    pub volume: u16,
    /// Size of the source file; the guest addresses positions in these units
    pub byte_length: u32,
    /// Current pan (-100..100)
    pub pan: i16,
}

impl StreamChannel {
    /// State of a freshly loaded stream
    pub fn new(handle: SampleHandle, byte_length: u32) -> Self {
        Self {
            handle,
            volume: INITIAL_MUSIC_VOLUME,
            byte_length,
            pan: 0,
        }
    }
}

/// Tracker module channel
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerChannel {
    /// Channel volume (0-100)
    pub volume: u16,
    /// Preparation state
    pub state: TrackerState,
}

impl TrackerChannel {
    /// Channel waiting for the backend to finish preparing a module
    pub fn loading(ticket: ModuleTicket) -> Self {
        Self {
            volume: INITIAL_MUSIC_VOLUME,
            state: TrackerState::Loading {
                ticket,
                deferred: Vec::new(),
            },
        }
    }

    /// Ready module handle, if preparation finished
    pub fn handle(&self) -> Option<ModuleHandle> {
        match self.state {
            TrackerState::Ready(handle) => Some(handle),
            TrackerState::Loading { .. } | TrackerState::Failed => None,
        }
    }
}

/// Two-phase tracker lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerState {
    /// Backend still preparing; control ops are queued in arrival order
    Loading {
        /// Backend ticket to poll
        ticket: ModuleTicket,
        /// Operations that arrived while loading
        deferred: Vec<ModuleOp>,
    },
    /// Module ready for playback
    Ready(ModuleHandle),
    /// Preparation failed; the entry is dropped on the next promotion pass
    Failed,
}

/// Tracker control operation that can be deferred until the module is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleOp {
    /// Start playback
    Play,
    /// Pause playback
    Pause,
    /// Resume paused playback
    Resume,
    /// Stop playback
    Stop,
    /// Jump to an order/row position
    SetOrderRow {
        /// Pattern order index
        order: u16,
        /// Row inside the pattern
        row: u16,
    },
}
