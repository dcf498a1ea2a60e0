//! DS4QB2 token protocol
//!
//! The guest writes whitespace-separated parameters to `DS4QB2.DAT` in its
//! data directory and then raises the signal byte with the opcode. Feedback
//! answers are written back over the same DAT file.

mod command;

pub use command::{decode, tokens, Command, Opcode, PLAY_SFX_BASE};

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::backend::{AudioBackend, Repeat};
use crate::channels::SlotId;
use crate::engine::Engine;
use crate::protocol::filename::join_guest_path;
use crate::protocol::{logged, Acquired, DecodeError, Dispatch, Payload, ProtocolAdapter};
use crate::transport::{GuestFiles, GuestIo, GuestIoError};

/// Parameter and feedback file
pub const DAT_FILE: &str = "DS4QB2.DAT";

/// Polling interval of the DS4QB2 driver
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

/// Feedback answer: two zero words
const FEEDBACK_REPLY: [u8; 8] = [0; 8];

/// DS4QB2 adapter
///
/// Samples are numbered in load order across LoadSfx commands, starting at
/// zero. Exit releases everything and restarts the numbering.
#[derive(Debug, Clone)]
pub struct TokenProtocol {
    working_dir: String,
    dat_path: String,
    next_sfx: SlotId,
}

impl TokenProtocol {
    /// Adapter for a guest working in `working_dir` with its DAT file in `dat_dir`
    pub fn new(working_dir: impl Into<String>, dat_dir: &str) -> Self {
        Self {
            working_dir: working_dir.into(),
            dat_path: join_guest_path(dat_dir, DAT_FILE),
            next_sfx: 0,
        }
    }

    /// Guest path of the DAT file
    pub fn dat_path(&self) -> &str {
        &self.dat_path
    }

    /// Id the next loaded sample will get
    pub fn next_sfx(&self) -> SlotId {
        self.next_sfx
    }

    fn run<B: AudioBackend, G: GuestFiles + ?Sized>(
        &mut self,
        engine: &mut Engine<B>,
        guest: &mut G,
        command: Command,
    ) -> Dispatch {
        match command {
            Command::PlayMusic {
                path,
                stream,
                channel,
                repeat,
            } => {
                let bytes = match guest.read(&path) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        error!(channel, %path, %err, "PlayMusic: unable to read file");
                        return Dispatch::Done(None);
                    }
                };
                let loaded = if stream {
                    engine.load_stream(channel, bytes, repeat).map(|_| ())
                } else {
                    let repeat = if repeat { Repeat::Forever } else { Repeat::Once };
                    engine.load_tracker(channel, bytes, repeat)
                };
                if let Some(applied) = logged("PlayMusic", channel, loaded.and_then(|()| engine.play_music(channel))) {
                    info!(channel, %path, stream, repeat, ?applied, "PlayMusic");
                }
            }
            Command::ClearMusic { channel } => {
                if let Some(applied) = logged("ClearMusic", channel, engine.stop_music(channel)) {
                    info!(channel, ?applied, "ClearMusic");
                }
            }
            Command::LoadSfx { paths } => {
                for path in &paths {
                    let id = self.next_sfx;
                    self.next_sfx += 1;
                    match guest.read(path) {
                        Ok(bytes) => {
                            if let Some(handle) = logged("LoadSfx", id, engine.load_sound(id, bytes)) {
                                debug!(id, %path, %handle, "sample loaded");
                            }
                        }
                        Err(err) => error!(id, %path, %err, "LoadSfx: unable to read file"),
                    }
                }
                info!(count = paths.len(), next = self.next_sfx, "LoadSfx");
            }
            Command::SetVolume { music, sample, stream } => {
                engine.set_all_sound_volumes(sample);
                engine.set_music_volume_by_kind(true, music);
                engine.set_music_volume_by_kind(false, stream);
                info!(music, sample, stream, "SetVolume");
            }
            Command::StopSfx { index } => {
                if logged("StopSfx", index, engine.stop_sound(index)).is_some() {
                    info!(index, "StopSfx");
                }
            }
            Command::Fade {
                channel,
                from,
                to,
                speed,
            } => {
                let duration = Duration::from_micros(u64::from(from.abs_diff(to)) * 1000 / u64::from(speed));
                match engine.fade_music(channel, from, to, duration) {
                    Ok(true) => info!(channel, from, to, speed, ?duration, "Fade"),
                    Ok(false) => debug!(channel, "Fade: tracker channels do not fade"),
                    Err(err) => error!(channel, %err, "Fade"),
                }
            }
            Command::FeedbackMod { channel } => {
                info!(channel, "FeedbackMod");
                return Dispatch::Done(Some(FEEDBACK_REPLY.to_vec()));
            }
            Command::FeedbackMp3 { channel } => {
                info!(channel, "FeedbackMp3");
                return Dispatch::Done(Some(FEEDBACK_REPLY.to_vec()));
            }
            Command::SetPosition { channel, pos1, pos2 } => {
                warn!(channel, pos1, pos2, "SetPosition: not implemented");
            }
            Command::Pause { channel } => {
                if let Some(applied) = logged("Pause", channel, engine.pause_music(channel)) {
                    info!(channel, ?applied, "Pause");
                }
            }
            Command::Resume { channel } => {
                if let Some(applied) = logged("Resume", channel, engine.resume_music(channel)) {
                    info!(channel, ?applied, "Resume");
                }
            }
            Command::Exit => {
                let (sounds, music) = engine.release_all();
                self.next_sfx = 0;
                info!(sounds, music, "Exit");
            }
            Command::PlaySfx { index } => {
                if logged("PlaySfx", index, engine.trigger_sound(index)).is_some() {
                    info!(index, "PlaySfx");
                }
            }
            Command::Ignored { opcode, tokens } => info!(?opcode, ?tokens, "accepted without effect"),
            Command::Unknown(signal) => error!(signal, "unrecognized command"),
        }
        Dispatch::Done(None)
    }
}

impl<G: GuestIo + ?Sized> ProtocolAdapter<G> for TokenProtocol {
    type Command = Command;

    fn name(&self) -> &'static str {
        "ds4qb2"
    }

    fn default_interval(&self) -> Duration {
        DEFAULT_INTERVAL
    }

    fn acquire(&mut self, guest: &mut G) -> Acquired {
        let signal = guest.poll_signal();
        if signal == 0 {
            return Acquired::Idle;
        }
        // Exit and PlaySfx carry no parameters, so a missing DAT is not fatal
        let bytes = guest.read(&self.dat_path).unwrap_or_else(|err| {
            debug!(signal, %err, "no parameter file");
            Vec::new()
        });
        Acquired::Payload(Payload { signal, bytes })
    }

    fn decode(&self, payload: &Payload) -> Result<Command, DecodeError> {
        decode(payload.signal, &payload.bytes, &self.working_dir)
    }

    fn dispatch<B: AudioBackend>(&mut self, engine: &mut Engine<B>, guest: &mut G, command: Command) -> Dispatch {
        self.run(engine, guest, command)
    }

    fn respond(&mut self, guest: &mut G, response: &[u8]) -> Result<(), GuestIoError> {
        guest.write(&self.dat_path, response)
    }

    fn complete(&mut self, guest: &mut G) {
        guest.clear_signal();
    }
}
