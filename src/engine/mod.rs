//! Dispatcher state machine shared by every protocol variant
//!
//! [`Engine`] owns the channel tables, the mixer state and the backend. The
//! protocol adapters translate their own command sets into calls on it, so
//! slot validation, sentinel resolution, load/replace ordering and volume
//! propagation are implemented once.
//!
//! Every operation is one atomic step from the caller's point of view:
//! validate the slot, mutate state, drive the backend. A missing slot
//! returns an error before anything is touched.

mod music;
mod sound;

pub use music::{Applied, PendingQuery, QueryKind, Reply, Resolution};
pub use sound::SoundParams;

use tracing::{debug, warn};

use crate::backend::{AudioBackend, BackendError, ModuleTicket};
use crate::channels::{ChannelStore, Listener, MixerState, MusicChannel, SlotId, SoundSlot, TrackerState};
use crate::mixer::sentinel::{resolve, Attribute, Volume};
use crate::mixer::{effective_volume, VolumeKind};

/// Engine operation failures
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// No sound loaded in the slot
    #[error("sound slot {0} is not loaded")]
    SoundNotFound(SlotId),

    /// No music loaded in the slot
    #[error("music slot {0} is not loaded")]
    MusicNotFound(SlotId),

    /// Stream has a zero byte length, so positions cannot be mapped
    #[error("music slot {0} has zero byte length")]
    EmptyStream(SlotId),

    /// Requested byte position lies beyond the stream
    #[error("position {position} is past the end of music slot {slot} ({byte_length} bytes)")]
    PositionOutOfRange {
        /// Target slot
        slot: SlotId,
        /// Requested byte position
        position: u32,
        /// Stream length in bytes
        byte_length: u32,
    },

    /// Backend cannot report the stream's duration
    #[error("duration of music slot {0} is unknown")]
    UnknownDuration(SlotId),

    /// Tracker module failed to load
    #[error("module in music slot {0} failed to load")]
    ModuleFailed(SlotId),

    /// Distance factor must be finite and non-zero
    #[error("invalid 2D distance factor {0}")]
    InvalidDistanceFactor(f64),

    /// Backend rejected a call
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Channel tables, mixer state and backend of one adapter instance
pub struct Engine<B: AudioBackend> {
    backend: B,
    sounds: ChannelStore<SoundSlot>,
    music: ChannelStore<MusicChannel>,
    mixer: MixerState,
    // Tickets of modules replaced while still loading; released once ready
    orphaned: Vec<ModuleTicket>,
}

impl<B: AudioBackend> Engine<B> {
    /// Create an engine with empty tables and default mixer state
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            sounds: ChannelStore::new(),
            music: ChannelStore::new(),
            mixer: MixerState::default(),
            orphaned: Vec::new(),
        }
    }

    /// Backend in use
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Backend in use, mutably
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Loaded sound slots
    pub fn sounds(&self) -> &ChannelStore<SoundSlot> {
        &self.sounds
    }

    /// Loaded music channels
    pub fn music(&self) -> &ChannelStore<MusicChannel> {
        &self.music
    }

    /// Current mixer state
    pub fn mixer(&self) -> &MixerState {
        &self.mixer
    }

    /// Set the master volume; CURRENT keeps it, DEFAULT resets to 50
    ///
    /// Every live channel's effective volume is re-applied on change.
    pub fn set_master_volume(&mut self, volume: u16) -> u16 {
        if volume != Volume::CURRENT {
            self.mixer.master_volume = resolve::<Volume>(volume, self.mixer.master_volume);
            self.apply_all_sound_volumes();
            self.apply_all_music_volumes();
        }
        self.mixer.master_volume
    }

    /// Set the per-kind global volumes; each kind is re-applied only when touched
    pub fn set_global_volumes(&mut self, sound: u16, music: u16) -> (u16, u16) {
        if sound != Volume::CURRENT {
            self.mixer.global_volume.sound = resolve::<Volume>(sound, self.mixer.global_volume.sound);
            self.apply_all_sound_volumes();
        }
        if music != Volume::CURRENT {
            self.mixer.global_volume.music = resolve::<Volume>(music, self.mixer.global_volume.music);
            self.apply_all_music_volumes();
        }
        (self.mixer.global_volume.sound, self.mixer.global_volume.music)
    }

    /// Move the 2D listener
    pub fn set_listener(&mut self, listener: Listener) {
        self.mixer.listener = listener;
    }

    /// Set the 2D distance factor
    pub fn set_distance_factor(&mut self, factor: f64) -> Result<(), EngineError> {
        if !factor.is_finite() || factor == 0.0 {
            return Err(EngineError::InvalidDistanceFactor(factor));
        }
        self.mixer.distance_factor = factor;
        Ok(())
    }

    /// Stop and release every sound and music entry
    ///
    /// Mixer state is kept. Returns the number of sounds and music channels
    /// released.
    pub fn release_all(&mut self) -> (usize, usize) {
        let sounds = self.release_all_sounds();
        let music: Vec<_> = self.music.drain().collect();
        let music_count = music.len();
        for (slot, channel) in music {
            self.release_music_entry(slot, channel);
        }
        (sounds, music_count)
    }

    /// Stop and release every sound slot
    pub fn release_all_sounds(&mut self) -> usize {
        let sounds: Vec<_> = self.sounds.drain().collect();
        let count = sounds.len();
        for (slot, sound) in sounds {
            self.release_sound_entry(slot, sound);
        }
        count
    }

    fn release_sound_entry(&mut self, slot: SlotId, sound: SoundSlot) {
        debug!(slot, handle = %sound.handle, "releasing sound");
        if let Err(err) = self.backend.stop(sound.handle) {
            warn!(slot, %err, "stop failed while releasing sound");
        }
        if let Err(err) = self.backend.release(sound.handle) {
            warn!(slot, %err, "release failed");
        }
    }

    fn release_music_entry(&mut self, slot: SlotId, channel: MusicChannel) {
        debug!(slot, kind = channel.kind(), "releasing music");
        match channel {
            MusicChannel::Stream(stream) => {
                if let Err(err) = self.backend.stop(stream.handle) {
                    warn!(slot, %err, "stop failed while releasing stream");
                }
                if let Err(err) = self.backend.release(stream.handle) {
                    warn!(slot, %err, "release failed");
                }
            }
            MusicChannel::Tracker(tracker) => match tracker.state {
                TrackerState::Ready(handle) => {
                    if let Err(err) = self.backend.module_stop(handle) {
                        warn!(slot, %err, "stop failed while releasing module");
                    }
                    if let Err(err) = self.backend.module_release(handle) {
                        warn!(slot, %err, "module release failed");
                    }
                }
                TrackerState::Loading { ticket, .. } => self.orphaned.push(ticket),
                TrackerState::Failed => {}
            },
        }
    }

    fn apply_sound_volume(&mut self, slot: SlotId) {
        let Some(sound) = self.sounds.get(slot) else {
            return;
        };
        let gain = effective_volume(f64::from(sound.volume), &self.mixer, VolumeKind::Sound);
        if let Err(err) = self.backend.set_volume(sound.handle, gain) {
            warn!(slot, %err, "set_volume failed");
        }
    }

    fn apply_music_volume(&mut self, slot: SlotId) {
        let Some(channel) = self.music.get(slot) else {
            return;
        };
        let gain = effective_volume(f64::from(channel.volume()), &self.mixer, VolumeKind::Music);
        let result = match channel {
            MusicChannel::Stream(stream) => self.backend.set_volume(stream.handle, gain),
            MusicChannel::Tracker(tracker) => match tracker.handle() {
                Some(handle) => self.backend.module_set_volume(handle, gain),
                // Applied on promotion
                None => Ok(()),
            },
        };
        if let Err(err) = result {
            warn!(slot, %err, "music volume update failed");
        }
    }

    fn apply_all_sound_volumes(&mut self) {
        for slot in self.sounds.slots() {
            self.apply_sound_volume(slot);
        }
    }

    fn apply_all_music_volumes(&mut self) {
        for slot in self.music.slots() {
            self.apply_music_volume(slot);
        }
    }
}
