//! DS4QB++ binary protocol
//!
//! The guest raises a non-zero signal word after writing a fixed-layout
//! command to `DS4QB.QBW` in its working directory. Query responses go to
//! `DS4QB.VCW` next to it.

mod command;

pub use command::{decode, Command, MusicFlags, MusicType, Opcode, Sound2DEntry, SoundEntry, ENTRY_LEN, NAME_FIELD_LEN};

use std::time::Duration;

use tracing::{error, info, warn};

use crate::backend::{AudioBackend, Repeat};
use crate::engine::Engine;
use crate::protocol::filename::join_guest_path;
use crate::protocol::{logged, reply_dispatch, Acquired, DecodeError, Dispatch, Payload, ProtocolAdapter};
use crate::transport::{GuestFiles, GuestIo, GuestIoError};

/// Command file written by the guest
pub const COMMAND_FILE: &str = "DS4QB.QBW";

/// Response file read back by the guest
pub const RESPONSE_FILE: &str = "DS4QB.VCW";

/// Polling interval of the DS4QB++ driver
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2);

/// DS4QB++ adapter
#[derive(Debug, Clone)]
pub struct BinaryProtocol {
    working_dir: String,
    command_path: String,
    response_path: String,
}

impl BinaryProtocol {
    /// Adapter for a guest working in `working_dir`
    pub fn new(working_dir: impl Into<String>) -> Self {
        let working_dir = working_dir.into();
        Self {
            command_path: join_guest_path(&working_dir, COMMAND_FILE),
            response_path: join_guest_path(&working_dir, RESPONSE_FILE),
            working_dir,
        }
    }

    /// Guest working directory
    pub fn working_dir(&self) -> &str {
        &self.working_dir
    }

    /// Guest path of the command file
    pub fn command_path(&self) -> &str {
        &self.command_path
    }

    /// Guest path of the response file
    pub fn response_path(&self) -> &str {
        &self.response_path
    }

    fn run<B: AudioBackend, G: GuestFiles + ?Sized>(
        &mut self,
        engine: &mut Engine<B>,
        guest: &mut G,
        command: Command,
    ) -> Dispatch {
        match command {
            Command::Initialize { quality, flags } => info!(quality, flags, "Initialize"),
            Command::Close => {
                let (sounds, music) = engine.release_all();
                info!(sounds, music, "Close");
            }
            Command::Reset => {
                let (sounds, music) = engine.release_all();
                info!(sounds, music, "Reset");
            }
            Command::LoadSnd { slot, path, flags } => {
                let bytes = match guest.read(&path) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        error!(slot, %path, %err, "LoadSnd: unable to read file");
                        return Dispatch::Done(None);
                    }
                };
                if let Some(handle) = logged("LoadSnd", slot, engine.load_sound(slot.into(), bytes)) {
                    info!(slot, %path, flags, %handle, "LoadSnd");
                }
            }
            Command::PlaySnd { slot, params } => {
                if let Some(sound) = logged("PlaySnd", slot, engine.play_sound(slot.into(), params)) {
                    info!(
                        slot,
                        freq = sound.frequency,
                        volume = sound.volume,
                        pan = sound.pan,
                        looping = sound.looping,
                        "PlaySnd"
                    );
                }
            }
            Command::SetSndAttr { slot, params, flags } => {
                if let Some(sound) = logged("SetSndAttr", slot, engine.set_sound_attributes(slot.into(), params)) {
                    info!(
                        slot,
                        freq = sound.frequency,
                        volume = sound.volume,
                        pan = sound.pan,
                        looping = sound.looping,
                        flags,
                        "SetSndAttr"
                    );
                }
            }
            Command::GetSndAttr { slot } => warn!(slot, "GetSndAttr: not implemented"),
            Command::LoadMusic {
                slot,
                path,
                flags,
                music_type,
            } => {
                let bytes = match guest.read(&path) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        error!(slot, %path, %err, "LoadMusic: unable to read file");
                        return Dispatch::Done(None);
                    }
                };
                let looping = MusicFlags::is_looping(flags);
                let result = match music_type {
                    MusicType::Stream => engine.load_stream(slot.into(), bytes, looping).map(|_| ()),
                    MusicType::Tracker => {
                        let repeat = if looping { Repeat::Forever } else { Repeat::Once };
                        engine.load_tracker(slot.into(), bytes, repeat)
                    }
                };
                if logged("LoadMusic", slot, result).is_some() {
                    info!(slot, %path, flags, ?music_type, looping, "LoadMusic");
                }
            }
            Command::PlayMusic { slot } => {
                if let Some(applied) = logged("PlayMusic", slot, engine.play_music(slot.into())) {
                    info!(slot, ?applied, "PlayMusic");
                }
            }
            Command::SetMusicAttr { slot, pan, volume } => {
                if logged("SetMusicAttr", slot, engine.set_music_attributes(slot.into(), pan, volume)).is_some() {
                    info!(slot, pan, volume, "SetMusicAttr");
                }
            }
            Command::GetMusicAttr { slot } => warn!(slot, "GetMusicAttr: not implemented"),
            Command::StopSnd { slot } => {
                if logged("StopSnd", slot, engine.stop_sound(slot.into())).is_some() {
                    info!(slot, "StopSnd");
                }
            }
            Command::PauseMusic { slot } => {
                if let Some(applied) = logged("PauseMusic", slot, engine.pause_music(slot.into())) {
                    info!(slot, ?applied, "PauseMusic");
                }
            }
            Command::ResumeMusic { slot } => {
                if let Some(applied) = logged("ResumeMusic", slot, engine.resume_music(slot.into())) {
                    info!(slot, ?applied, "ResumeMusic");
                }
            }
            Command::StopMusic { slot } => {
                if let Some(applied) = logged("StopMusic", slot, engine.stop_music(slot.into())) {
                    info!(slot, ?applied, "StopMusic");
                }
            }
            Command::DeleteSnd { slot } => {
                if logged("DeleteSnd", slot, engine.delete_sound(slot.into())).is_some() {
                    info!(slot, "DeleteSnd");
                }
            }
            Command::DeleteMusic { slot } => {
                if logged("DeleteMusic", slot, engine.delete_music(slot.into())).is_some() {
                    info!(slot, "DeleteMusic");
                }
            }
            Command::SetVolume { volume } => {
                let master = engine.set_master_volume(volume);
                info!(volume, master, "SetVolume");
            }
            Command::SetGlobalVols { sound, music } => {
                let (sound_volume, music_volume) = engine.set_global_volumes(sound, music);
                info!(sound, music, sound_volume, music_volume, "SetGlobalVols");
            }
            Command::Play2DSounds { listener, entries } => {
                for entry in &entries {
                    let result = engine.play_sound_2d(entry.slot.into(), entry.frequency, entry.volume, entry.x, entry.y);
                    logged("Play2DSounds", entry.slot, result);
                }
                info!(?listener, count = entries.len(), "Play2DSounds");
            }
            Command::GetMusicLength { slot } => {
                if let Some(reply) = logged("GetMusicLength", slot, engine.music_length(slot.into())) {
                    info!(slot, ?reply, "GetMusicLength");
                    return reply_dispatch(reply);
                }
            }
            Command::SetMusicPos { slot, position } => {
                if let Some(applied) = logged("SetMusicPos", slot, engine.set_music_position(slot.into(), position)) {
                    info!(slot, position, ?applied, "SetMusicPos");
                }
            }
            Command::GetMusicPos { slot } => {
                if let Some(reply) = logged("GetMusicPos", slot, engine.music_position(slot.into())) {
                    info!(slot, ?reply, "GetMusicPos");
                    return reply_dispatch(reply);
                }
            }
            Command::PlaySounds { entries } => {
                for entry in &entries {
                    logged("PlaySounds", entry.slot, engine.play_sound(entry.slot.into(), entry.params));
                }
                info!(count = entries.len(), "PlaySounds");
            }
            Command::PlaySnd2D { entry } => {
                let result = engine.play_sound_2d(entry.slot.into(), entry.frequency, entry.volume, entry.x, entry.y);
                if let Some(mix) = logged("PlaySnd2D", entry.slot, result) {
                    info!(
                        slot = entry.slot,
                        x = entry.x,
                        y = entry.y,
                        angle = entry.angle,
                        volume = mix.volume,
                        pan = mix.pan,
                        "PlaySnd2D"
                    );
                }
            }
            Command::Set2DPos { listener } => {
                engine.set_listener(listener);
                info!(x = listener.x, y = listener.y, angle = listener.angle, "Set2DPos");
            }
            Command::Set2DDistFactor { factor } => match engine.set_distance_factor(f64::from(factor)) {
                Ok(()) => info!(factor, "Set2DDistFactor"),
                Err(err) => error!(%err, "Set2DDistFactor"),
            },
            Command::Unsupported(opcode) => {
                warn!(?opcode, "not implemented");
                match opcode {
                    Opcode::GetTracks => return Dispatch::Done(Some(vec![0; 2])),
                    Opcode::GetTrackLength => return Dispatch::Done(Some(vec![0; 4])),
                    _ => {}
                }
            }
            Command::Unknown(opcode) => error!(opcode, "unrecognized command"),
        }
        Dispatch::Done(None)
    }
}

impl<G: GuestIo + ?Sized> ProtocolAdapter<G> for BinaryProtocol {
    type Command = Command;

    fn name(&self) -> &'static str {
        "ds4qb++"
    }

    fn default_interval(&self) -> Duration {
        DEFAULT_INTERVAL
    }

    fn acquire(&mut self, guest: &mut G) -> Acquired {
        let signal = guest.poll_signal();
        if signal == 0 {
            return Acquired::Idle;
        }
        match guest.read(&self.command_path) {
            Ok(bytes) => Acquired::Payload(Payload { signal, bytes }),
            Err(err) => Acquired::Failed(err),
        }
    }

    fn decode(&self, payload: &Payload) -> Result<Command, DecodeError> {
        decode(&payload.bytes, &self.working_dir)
    }

    fn dispatch<B: AudioBackend>(&mut self, engine: &mut Engine<B>, guest: &mut G, command: Command) -> Dispatch {
        self.run(engine, guest, command)
    }

    fn respond(&mut self, guest: &mut G, response: &[u8]) -> Result<(), GuestIoError> {
        guest.write(&self.response_path, response)
    }

    fn complete(&mut self, guest: &mut G) {
        guest.clear_signal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};
    use crate::transport::MemoryGuest;

    fn setup() -> (BinaryProtocol, Engine<RecordingBackend>, MemoryGuest) {
        (
            BinaryProtocol::new("GAME"),
            Engine::new(RecordingBackend::new()),
            MemoryGuest::new(),
        )
    }

    #[test]
    fn test_paths() {
        let protocol = BinaryProtocol::new("GAME\\");
        assert_eq!(protocol.command_path(), "GAME\\DS4QB.QBW");
        assert_eq!(protocol.response_path(), "GAME\\DS4QB.VCW");
        assert_eq!(BinaryProtocol::new("").command_path(), "DS4QB.QBW");
    }

    #[test]
    fn test_acquire_requires_signal() {
        let (mut protocol, _, mut guest) = setup();
        guest.insert_file("GAME\\DS4QB.QBW", vec![1, 0]);
        assert!(matches!(protocol.acquire(&mut guest), Acquired::Idle));
        guest.raise_signal(1);
        let Acquired::Payload(payload) = protocol.acquire(&mut guest) else {
            panic!("expected payload");
        };
        assert_eq!(payload.bytes, vec![1, 0]);
    }

    #[test]
    fn test_load_failure_keeps_slot_empty() {
        let (mut protocol, mut engine, mut guest) = setup();
        let command = Command::LoadSnd {
            slot: 2,
            path: "GAME\\MISSING.WAV".into(),
            flags: 0,
        };
        assert_eq!(protocol.dispatch(&mut engine, &mut guest, command), Dispatch::Done(None));
        assert!(engine.sounds().is_empty());
        assert!(engine.backend().calls().is_empty());
    }

    #[test]
    fn test_cd_stubs_answer_zeroes() {
        let (mut protocol, mut engine, mut guest) = setup();
        assert_eq!(
            protocol.dispatch(&mut engine, &mut guest, Command::Unsupported(Opcode::GetTracks)),
            Dispatch::Done(Some(vec![0, 0]))
        );
        assert_eq!(
            protocol.dispatch(&mut engine, &mut guest, Command::Unsupported(Opcode::GetTrackLength)),
            Dispatch::Done(Some(vec![0, 0, 0, 0]))
        );
        assert_eq!(
            protocol.dispatch(&mut engine, &mut guest, Command::Unsupported(Opcode::SetEAX)),
            Dispatch::Done(None)
        );
    }

    #[test]
    fn test_load_music_tracker_loops_on_default_flags() {
        let (mut protocol, mut engine, mut guest) = setup();
        guest.insert_file("GAME\\SONG.XM", vec![0; 32]);
        let command = Command::LoadMusic {
            slot: 0,
            path: "GAME\\SONG.XM".into(),
            flags: 0xFFFE,
            music_type: MusicType::Tracker,
        };
        protocol.dispatch(&mut engine, &mut guest, command);
        assert!(matches!(
            engine.backend().calls(),
            [BackendCall::LoadModule {
                repeat: Repeat::Forever,
                len: 32,
                ..
            }]
        ));
    }

    #[test]
    fn test_play_2d_batch_skips_missing_slots() {
        let (mut protocol, mut engine, mut guest) = setup();
        let handle = engine.load_sound(4, vec![0; 4]).unwrap();
        engine.backend_mut().take_calls();
        let entry = |slot| Sound2DEntry {
            id: 0,
            slot,
            frequency: 0x00FF_FFFF,
            volume: 100,
            x: 3,
            y: 3,
            angle: 0,
        };
        let command = Command::Play2DSounds {
            listener: crate::channels::Listener { x: 3, y: 3, angle: 0 },
            entries: vec![entry(9), entry(4)],
        };
        protocol.dispatch(&mut engine, &mut guest, command);

        // Mixed against the stored listener at the origin, so d = 3*3 + 3*3
        let calls = engine.backend().calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(calls[1], BackendCall::SetVolume(h, gain) if h == handle && (gain - 1.0 / 18.0).abs() < 1e-6));
        assert_eq!(calls[3], BackendCall::Play(handle));
        assert_eq!(engine.mixer().listener, crate::channels::Listener::default());
    }
}
