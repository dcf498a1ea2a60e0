//! DS4QB sound middleware bridge for virtualized DOS guests
//!
//! DOS-era QuickBasic programs drive sound through the DS4QB family of resident
//! drivers. This crate emulates the guest-facing side of those drivers on the
//! host: it watches a guest signal, decodes the command the guest left behind,
//! keeps the driver's slot tables and mixer state, and turns every command into
//! calls on a host [`AudioBackend`].
//!
//! # Protocol variants
//! - [`protocol::binary`]: DS4QB++, fixed-layout little-endian command file
//! - [`protocol::token`]: DS4QB2, whitespace-separated parameter file keyed by a signal byte
//! - [`protocol::clipboard`]: DS4QB1, textual commands passed through the DOS clipboard
//!
//! # Crate feature flags
//! - `streaming` (opt-in): real-time audio output through rodio ([`streaming::RodioBackend`])
//! - `tracker` (opt-in): XM module playback through xmrs, rendered on a worker thread
//!
//! # Quick start
//! ```no_run
//! use ds4qb_bridge::backend::RecordingBackend;
//! use ds4qb_bridge::protocol::binary::BinaryProtocol;
//! use ds4qb_bridge::transport::{MemoryGuest, PollingLoop};
//! use ds4qb_bridge::Engine;
//!
//! let protocol = BinaryProtocol::new("C:\\GAME");
//! let engine = Engine::new(RecordingBackend::new());
//! let mut driver = PollingLoop::new(protocol, engine, MemoryGuest::new());
//! driver.tick();
//! ```

#![warn(missing_docs)]

pub mod backend; // Host audio boundary
pub mod channels; // Slot tables and mixer state
pub mod config; // Adapter configuration
pub mod engine; // Dispatcher state machine shared by all variants
pub mod mixer; // Volume, pan and 2D positional math
pub mod protocol; // Wire decoders and per-variant dispatch
#[cfg(feature = "streaming")]
pub mod streaming; // Audio Output & Streaming
pub mod transport; // Guest I/O and polling loop

/// Error types for bridge operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Guest command could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] protocol::DecodeError),

    /// Guest file or signal access failed
    #[error("Guest I/O error: {0}")]
    Guest(#[from] transport::GuestIoError),

    /// Host audio backend failed
    #[error("Audio backend error: {0}")]
    Backend(#[from] backend::BackendError),

    /// Command referenced state the engine does not hold
    #[error("Engine error: {0}")]
    Engine(#[from] engine::EngineError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

// Public API exports
pub use backend::{AudioBackend, BackendError, ModuleHandle, ModuleTicket, SampleHandle};
pub use channels::{ChannelStore, MixerState, MusicChannel, SlotId, SoundSlot};
pub use config::{AdapterConfig, ProtocolVariant};
pub use engine::{Engine, EngineError};
pub use protocol::{DecodeError, Dispatch, ProtocolAdapter};
pub use transport::{GuestIoError, PollingLoop, TickOutcome};
#[cfg(feature = "streaming")]
pub use streaming::RodioBackend;
