//! Wire protocols
//!
//! Each DS4QB generation talks to the host differently. A [`ProtocolAdapter`]
//! knows how to notice a pending guest command, decode it into its own typed
//! command set and dispatch that onto the shared [`Engine`].

pub mod binary;
pub mod clipboard;
pub mod filename;
pub mod token;

use std::fmt;
use std::time::Duration;

use tracing::error;

use crate::backend::AudioBackend;
use crate::channels::SlotId;
use crate::engine::{Engine, EngineError, PendingQuery};
use crate::transport::GuestIoError;

/// Raw command acquired from the guest
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload {
    /// Signal word that announced the command (0 for clipboard commands)
    pub signal: u16,
    /// Command bytes
    pub bytes: Vec<u8>,
}

/// Result of checking the guest for a new command
#[derive(Debug)]
pub enum Acquired {
    /// Nothing to do
    Idle,
    /// A command is waiting
    Payload(Payload),
    /// A command was signalled but its payload could not be read
    Failed(GuestIoError),
}

/// Outcome of dispatching one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Finished, with an optional response for the guest
    Done(Option<Vec<u8>>),
    /// Waiting on a tracker module; the signal stays raised until resolved
    Pending(PendingQuery),
}

/// Command decoding failures
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer too short to hold an opcode
    #[error("command buffer holds {got} bytes, no opcode")]
    Empty {
        /// Bytes available
        got: usize,
    },

    /// Buffer shorter than the opcode's layout
    #[error("opcode {opcode} needs {needed} bytes, got {got}")]
    Truncated {
        /// Raw opcode
        opcode: u16,
        /// Bytes required
        needed: usize,
        /// Bytes available
        got: usize,
    },

    /// Text command lacks a positional parameter
    #[error("{command}: missing parameter {index}")]
    MissingToken {
        /// Command name
        command: &'static str,
        /// Zero-based parameter index
        index: usize,
    },

    /// Numeric parameter is not a decimal number
    #[error("{command}: invalid number {token:?}")]
    InvalidNumber {
        /// Command name
        command: &'static str,
        /// Offending token
        token: String,
    },

    /// Command text could not be interpreted
    #[error("invalid command text: {0}")]
    InvalidText(String),

    /// Fade speed of zero would never finish
    #[error("fade speed must be non-zero")]
    ZeroFadeSpeed,
}

/// One DS4QB protocol generation over guest collaborator `G`
pub trait ProtocolAdapter<G: ?Sized> {
    /// Typed command set of this protocol
    type Command: fmt::Debug;

    /// Protocol name for log events
    fn name(&self) -> &'static str;

    /// Polling interval of the DOS-side driver
    fn default_interval(&self) -> Duration;

    /// Check the guest for a pending command and fetch its payload
    fn acquire(&mut self, guest: &mut G) -> Acquired;

    /// Decode a payload into a command
    fn decode(&self, payload: &Payload) -> Result<Self::Command, DecodeError>;

    /// Run a command against the engine
    fn dispatch<B: AudioBackend>(&mut self, engine: &mut Engine<B>, guest: &mut G, command: Self::Command) -> Dispatch;

    /// Write a response where the guest expects it
    fn respond(&mut self, guest: &mut G, response: &[u8]) -> Result<(), GuestIoError>;

    /// Acknowledge the command so the guest can send the next one
    fn complete(&mut self, guest: &mut G);
}

/// Log a failed engine operation against its command and slot
pub(crate) fn logged<T>(command: &'static str, slot: impl Into<SlotId>, result: Result<T, EngineError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            let slot: SlotId = slot.into();
            error!(command, slot, %err, "command failed");
            None
        }
    }
}

/// Map a query reply onto a dispatch outcome
pub(crate) fn reply_dispatch(reply: crate::engine::Reply) -> Dispatch {
    match reply {
        crate::engine::Reply::Ready(bytes) => Dispatch::Done(Some(bytes)),
        crate::engine::Reply::Pending(query) => Dispatch::Pending(query),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Reply;

    #[test]
    fn test_logged_passes_values_and_drops_errors() {
        assert_eq!(logged("PlaySnd", 3u16, Ok::<_, EngineError>(7)), Some(7));
        assert_eq!(logged::<()>("PlaySample", 9u32, Err(EngineError::SoundNotFound(9))), None);
    }

    #[test]
    fn test_reply_dispatch() {
        assert_eq!(reply_dispatch(Reply::Ready(vec![1, 0])), Dispatch::Done(Some(vec![1, 0])));
    }
}
