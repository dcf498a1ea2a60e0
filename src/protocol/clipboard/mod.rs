//! DS4QB1 clipboard protocol
//!
//! The guest places `DS4QB` followed by a text command on the clipboard.
//! The clipboard is only cleared once a marked command has been taken, so
//! anything else the user copies is left alone.

mod command;

pub use command::{decode, sample_list, Command};

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::backend::{AudioBackend, Repeat};
use crate::channels::SlotId;
use crate::engine::Engine;
use crate::protocol::{logged, Acquired, DecodeError, Dispatch, Payload, ProtocolAdapter};
use crate::transport::{ClipboardIo, GuestFiles, GuestIoError};

/// Prefix that marks clipboard text as a command
pub const MARKER: &str = "DS4QB";

/// Music slot holding the module
pub const MODULE_SLOT: SlotId = 0;

/// Music slot holding the stream
pub const STREAM_SLOT: SlotId = 1;

/// Polling interval of the DS4QB1 driver
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

/// DS4QB1 adapter
///
/// Samples get 1-based ids in list order, continuing across LOADSAMPLES
/// commands until REMOVESAMPLES.
#[derive(Debug, Clone, Default)]
pub struct ClipboardProtocol {
    sample_count: SlotId,
}

impl ClipboardProtocol {
    /// New adapter with no samples
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sample ids handed out so far
    pub fn sample_count(&self) -> SlotId {
        self.sample_count
    }

    fn run<B: AudioBackend, G: GuestFiles + ?Sized>(
        &mut self,
        engine: &mut Engine<B>,
        guest: &mut G,
        command: Command,
    ) -> Dispatch {
        match command {
            Command::LoadMod { path, looping } => {
                let bytes = match guest.read(&path) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        error!(%path, %err, "LoadMod: unable to load file");
                        return Dispatch::Done(None);
                    }
                };
                let repeat = if looping { Repeat::Forever } else { Repeat::Once };
                let result = engine
                    .load_tracker(MODULE_SLOT, bytes, repeat)
                    .and_then(|()| engine.play_music(MODULE_SLOT));
                if let Some(applied) = logged("LoadMod", MODULE_SLOT, result) {
                    info!(%path, looping, ?applied, "LoadMod");
                }
            }
            Command::LoadSamples { list_path } => {
                let list = match guest.read(&list_path) {
                    Ok(list) => sample_list(&list),
                    Err(err) => {
                        error!(path = %list_path, %err, "LoadSamples: unable to load sample list");
                        return Dispatch::Done(None);
                    }
                };
                for path in &list {
                    self.sample_count += 1;
                    let id = self.sample_count;
                    match guest.read(path) {
                        Ok(bytes) => {
                            if let Some(handle) = logged("LoadSamples", id, engine.load_sound(id, bytes)) {
                                debug!(id, %path, %handle, "sample loaded");
                            }
                        }
                        Err(err) => error!(id, %path, %err, "LoadSamples: file not found"),
                    }
                }
                info!(path = %list_path, count = list.len(), "LoadSamples");
            }
            Command::LoadStream { path, looping } => {
                let bytes = match guest.read(&path) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        error!(%path, %err, "LoadStream: error loading file");
                        return Dispatch::Done(None);
                    }
                };
                let result = engine
                    .load_stream(STREAM_SLOT, bytes, looping)
                    .and_then(|_| engine.play_music(STREAM_SLOT));
                if logged("LoadStream", STREAM_SLOT, result).is_some() {
                    info!(%path, looping, "LoadStream");
                }
            }
            Command::PlayCd { track } => warn!(%track, "PlayCD: not implemented"),
            Command::PlaySample { id } => {
                if logged("PlaySample", id, engine.trigger_sound(id)).is_some() {
                    info!(id, "PlaySample");
                }
            }
            Command::RemoveModule => match engine.delete_music(MODULE_SLOT) {
                Ok(()) => info!("RemoveModule"),
                Err(err) => debug!(%err, "RemoveModule: no module"),
            },
            Command::RemoveSamples => {
                let released = engine.release_all_sounds();
                self.sample_count = 0;
                info!(released, "RemoveSamples");
            }
            Command::RemoveStream => match engine.delete_music(STREAM_SLOT) {
                Ok(()) => info!("RemoveStream"),
                Err(err) => error!(%err, "RemoveStream: no active stream"),
            },
            Command::Unknown(text) => warn!(%text, "unrecognized command"),
        }
        Dispatch::Done(None)
    }
}

impl<G: ClipboardIo + ?Sized> ProtocolAdapter<G> for ClipboardProtocol {
    type Command = Command;

    fn name(&self) -> &'static str {
        "ds4qb1"
    }

    fn default_interval(&self) -> Duration {
        DEFAULT_INTERVAL
    }

    fn acquire(&mut self, guest: &mut G) -> Acquired {
        let Some(mut data) = guest.poll_clipboard() else {
            return Acquired::Idle;
        };
        if let Some(nul) = data.iter().position(|&b| b == 0) {
            data.truncate(nul);
        }
        let text = String::from_utf8_lossy(&data);
        match text.strip_prefix(MARKER) {
            Some(command) => Acquired::Payload(Payload {
                signal: 0,
                bytes: command.as_bytes().to_vec(),
            }),
            None => Acquired::Idle,
        }
    }

    fn decode(&self, payload: &Payload) -> Result<Command, DecodeError> {
        decode(&String::from_utf8_lossy(&payload.bytes))
    }

    fn dispatch<B: AudioBackend>(&mut self, engine: &mut Engine<B>, guest: &mut G, command: Command) -> Dispatch {
        self.run(engine, guest, command)
    }

    fn respond(&mut self, _guest: &mut G, _response: &[u8]) -> Result<(), GuestIoError> {
        Ok(())
    }

    fn complete(&mut self, guest: &mut G) {
        guest.clear_clipboard();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};
    use crate::transport::MemoryGuest;

    fn setup() -> (ClipboardProtocol, Engine<RecordingBackend>, MemoryGuest) {
        (
            ClipboardProtocol::new(),
            Engine::new(RecordingBackend::new()),
            MemoryGuest::new(),
        )
    }

    #[test]
    fn test_acquire_requires_marker() {
        let (mut protocol, _, mut guest) = setup();
        assert!(matches!(protocol.acquire(&mut guest), Acquired::Idle));

        guest.set_clipboard(b"hello world".to_vec());
        assert!(matches!(protocol.acquire(&mut guest), Acquired::Idle));
        assert!(guest.clipboard().is_some());

        guest.set_clipboard(b"DS4QBPLAYSAMPLE1|\0garbage".to_vec());
        let Acquired::Payload(payload) = protocol.acquire(&mut guest) else {
            panic!("expected payload");
        };
        assert_eq!(payload.bytes, b"PLAYSAMPLE1|");
        assert_eq!(
            ProtocolAdapter::<MemoryGuest>::decode(&protocol, &payload),
            Ok(Command::PlaySample { id: 1 })
        );
    }

    #[test]
    fn test_samples_are_one_based_with_gaps() {
        let (mut protocol, mut engine, mut guest) = setup();
        guest.insert_file("SFX.LST", b"A.WAV\r\nMISSING.WAV\r\nB.WAV\r\n".to_vec());
        guest.insert_file("A.WAV", vec![0; 4]);
        guest.insert_file("B.WAV", vec![0; 4]);
        protocol.dispatch(&mut engine, &mut guest, Command::LoadSamples { list_path: "SFX.LST".into() });

        assert_eq!(protocol.sample_count(), 3);
        assert!(engine.sounds().contains(1));
        assert!(!engine.sounds().contains(2));
        assert!(engine.sounds().contains(3));

        engine.backend_mut().take_calls();
        protocol.dispatch(&mut engine, &mut guest, Command::PlaySample { id: 3 });
        assert!(matches!(engine.backend().calls(), [BackendCall::Play(_)]));
    }

    #[test]
    fn test_remove_samples_restarts_ids() {
        let (mut protocol, mut engine, mut guest) = setup();
        guest.insert_file("SFX.LST", b"A.WAV".to_vec());
        guest.insert_file("A.WAV", vec![0; 4]);
        protocol.dispatch(&mut engine, &mut guest, Command::LoadSamples { list_path: "SFX.LST".into() });
        protocol.dispatch(&mut engine, &mut guest, Command::RemoveSamples);
        assert_eq!(protocol.sample_count(), 0);
        assert!(engine.sounds().is_empty());

        protocol.dispatch(&mut engine, &mut guest, Command::LoadSamples { list_path: "SFX.LST".into() });
        assert!(engine.sounds().contains(1));
    }

    #[test]
    fn test_load_mod_plays_once_ready() {
        let (mut protocol, mut engine, mut guest) = setup();
        guest.insert_file("SONG.XM", vec![0; 64]);
        protocol.dispatch(
            &mut engine,
            &mut guest,
            Command::LoadMod {
                path: "SONG.XM".into(),
                looping: true,
            },
        );
        let played = |engine: &Engine<RecordingBackend>| {
            engine
                .backend()
                .calls()
                .iter()
                .any(|call| matches!(call, BackendCall::ModulePlay(_)))
        };
        assert!(!played(&engine));
        assert_eq!(engine.poll_modules(), 1);
        assert!(played(&engine));
    }

    #[test]
    fn test_load_stream_and_remove() {
        let (mut protocol, mut engine, mut guest) = setup();
        guest.insert_file("TITLE.MP3", vec![0; 64]);
        protocol.dispatch(
            &mut engine,
            &mut guest,
            Command::LoadStream {
                path: "TITLE.MP3".into(),
                looping: false,
            },
        );
        assert!(engine.music().contains(STREAM_SLOT));
        assert!(matches!(engine.backend().calls().last(), Some(BackendCall::Play(_))));

        protocol.dispatch(&mut engine, &mut guest, Command::RemoveStream);
        assert!(!engine.music().contains(STREAM_SLOT));
        assert_eq!(engine.backend().live_sample_count(), 0);
    }

    #[test]
    fn test_complete_clears_clipboard() {
        let (mut protocol, _, mut guest) = setup();
        guest.set_clipboard(b"DS4QBREMOVESTREAM|".to_vec());
        ProtocolAdapter::<MemoryGuest>::complete(&mut protocol, &mut guest);
        assert!(guest.clipboard().is_none());
    }
}
