//! Sound slot operations

use tracing::debug;

use super::{Engine, EngineError};
use crate::backend::{AudioBackend, SampleFormat, SampleHandle};
use crate::channels::{SlotId, SoundSlot};
use crate::mixer::sentinel::{resolve, resolve_change, Frequency, Looping, Pan, Volume};
use crate::mixer::{effective_volume, mix_2d, pan_ratio, Positional, VolumeKind};

/// Attribute words carried by play and set-attribute commands
///
/// Each field may hold its kind's CURRENT or DEFAULT sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundParams {
    /// Frequency in Hz
    pub frequency: u32,
    /// Volume 0-100
    pub volume: u16,
    /// Pan -100..100
    pub pan: i16,
    /// Looping flag word
    pub looping: u16,
}

impl SoundParams {
    /// Parameters that leave every attribute unchanged
    pub const UNCHANGED: SoundParams = SoundParams {
        frequency: 0x00FF_FFFF,
        volume: 0xFFFF,
        pan: -1,
        looping: 0xFFFF,
    };
}

impl<B: AudioBackend> Engine<B> {
    /// Load WAV bytes into a sound slot, replacing any previous occupant
    ///
    /// A backend failure leaves the slot untouched. On success the prior
    /// occupant is stopped and released before the new entry is installed.
    pub fn load_sound(&mut self, slot: SlotId, bytes: Vec<u8>) -> Result<SampleHandle, EngineError> {
        let handle = self.backend.load_sample(bytes, SampleFormat::Wav)?;
        if let Some(previous) = self.sounds.remove(slot) {
            self.release_sound_entry(slot, previous);
        }
        self.sounds.insert(slot, SoundSlot::new(handle));
        self.apply_sound_volume(slot);
        debug!(slot, %handle, "sound loaded");
        Ok(handle)
    }

    /// Resolve attributes and play
    ///
    /// Rate and volume are always pushed; pan and looping only when their
    /// resolved value changed.
    pub fn play_sound(&mut self, slot: SlotId, params: SoundParams) -> Result<SoundSlot, EngineError> {
        let sound = self.sounds.get_mut(slot).ok_or(EngineError::SoundNotFound(slot))?;
        sound.frequency = resolve::<Frequency>(params.frequency, sound.frequency);
        sound.volume = resolve::<Volume>(params.volume, sound.volume);
        let pan = resolve_change::<Pan>(params.pan, sound.pan);
        let looping = resolve_change::<Looping>(params.looping, sound.looping);
        if let Some(pan) = pan {
            sound.pan = pan;
        }
        if let Some(looping) = looping {
            sound.looping = looping;
        }
        let sound = *sound;

        let gain = effective_volume(f64::from(sound.volume), &self.mixer, VolumeKind::Sound);
        self.backend.set_rate(sound.handle, sound.rate())?;
        self.backend.set_volume(sound.handle, gain)?;
        if pan.is_some() {
            self.backend.set_pan(sound.handle, pan_ratio(f64::from(sound.pan)))?;
        }
        if looping.is_some() {
            self.backend.set_loop(sound.handle, sound.is_looping())?;
        }
        self.backend.play(sound.handle)?;
        Ok(sound)
    }

    /// Resolve attributes without playing; only changed values reach the backend
    pub fn set_sound_attributes(&mut self, slot: SlotId, params: SoundParams) -> Result<SoundSlot, EngineError> {
        let sound = self.sounds.get_mut(slot).ok_or(EngineError::SoundNotFound(slot))?;
        let frequency = resolve_change::<Frequency>(params.frequency, sound.frequency);
        let volume = resolve_change::<Volume>(params.volume, sound.volume);
        let pan = resolve_change::<Pan>(params.pan, sound.pan);
        let looping = resolve_change::<Looping>(params.looping, sound.looping);
        if let Some(frequency) = frequency {
            sound.frequency = frequency;
        }
        if let Some(volume) = volume {
            sound.volume = volume;
        }
        if let Some(pan) = pan {
            sound.pan = pan;
        }
        if let Some(looping) = looping {
            sound.looping = looping;
        }
        let sound = *sound;

        if frequency.is_some() {
            self.backend.set_rate(sound.handle, sound.rate())?;
        }
        if volume.is_some() {
            let gain = effective_volume(f64::from(sound.volume), &self.mixer, VolumeKind::Sound);
            self.backend.set_volume(sound.handle, gain)?;
        }
        if pan.is_some() {
            self.backend.set_pan(sound.handle, pan_ratio(f64::from(sound.pan)))?;
        }
        if looping.is_some() {
            self.backend.set_loop(sound.handle, sound.is_looping())?;
        }
        Ok(sound)
    }

    /// Play a sound positioned in 2D relative to the listener
    ///
    /// Frequency and volume are resolved and stored; the computed pan is
    /// sent to the backend but not stored. `listener` overrides the stored
    /// listener for this call only.
    pub fn play_sound_2d(
        &mut self,
        slot: SlotId,
        frequency: u32,
        volume: u16,
        x: i16,
        y: i16,
    ) -> Result<Positional, EngineError> {
        let sound = self.sounds.get_mut(slot).ok_or(EngineError::SoundNotFound(slot))?;
        sound.frequency = resolve::<Frequency>(frequency, sound.frequency);
        sound.volume = resolve::<Volume>(volume, sound.volume);
        let sound = *sound;

        let mix = mix_2d(self.mixer.listener, self.mixer.distance_factor, x, y, f64::from(sound.volume));
        let gain = effective_volume(mix.volume, &self.mixer, VolumeKind::Sound);

        self.backend.set_rate(sound.handle, sound.rate())?;
        self.backend.set_volume(sound.handle, gain)?;
        self.backend.set_pan(sound.handle, pan_ratio(mix.pan))?;
        self.backend.play(sound.handle)?;
        Ok(mix)
    }

    /// Play a sound with its stored attributes
    pub fn trigger_sound(&mut self, slot: SlotId) -> Result<SoundSlot, EngineError> {
        let sound = *self.sounds.get(slot).ok_or(EngineError::SoundNotFound(slot))?;
        self.backend.play(sound.handle)?;
        Ok(sound)
    }

    /// Stop a playing sound
    pub fn stop_sound(&mut self, slot: SlotId) -> Result<(), EngineError> {
        let sound = self.sounds.get(slot).ok_or(EngineError::SoundNotFound(slot))?;
        self.backend.stop(sound.handle)?;
        Ok(())
    }

    /// Stop, release and remove a sound
    pub fn delete_sound(&mut self, slot: SlotId) -> Result<(), EngineError> {
        let sound = self.sounds.remove(slot).ok_or(EngineError::SoundNotFound(slot))?;
        self.release_sound_entry(slot, sound);
        Ok(())
    }

    /// Set the logical volume of every loaded sound and re-apply it
    pub fn set_all_sound_volumes(&mut self, volume: u16) {
        for (_, sound) in self.sounds.iter_mut() {
            sound.volume = volume;
        }
        self.apply_all_sound_volumes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};
    use crate::channels::Listener;
    use approx::assert_relative_eq;

    fn loaded(slot: SlotId) -> (Engine<RecordingBackend>, SampleHandle) {
        let mut engine = Engine::new(RecordingBackend::new());
        let handle = engine.load_sound(slot, vec![0; 16]).unwrap();
        engine.backend_mut().take_calls();
        (engine, handle)
    }

    #[test]
    fn test_play_defaults_and_current() {
        let (mut engine, handle) = loaded(3);
        let params = SoundParams {
            frequency: 0xFF_FFFE,
            volume: 0xFFFE,
            pan: -1,
            looping: 0xFFFE,
        };
        let sound = engine.play_sound(3, params).unwrap();

        assert_eq!(sound.frequency, 44_050);
        assert_eq!(sound.volume, 50);
        assert_eq!(sound.pan, 0);
        assert_eq!(sound.looping, 0);
        assert_eq!(
            engine.backend().calls(),
            &[
                BackendCall::SetRate(handle, 1.0),
                BackendCall::SetVolume(handle, 0.5),
                BackendCall::Play(handle),
            ]
        );
    }

    #[test]
    fn test_play_pushes_changed_pan_and_loop() {
        let (mut engine, handle) = loaded(1);
        let params = SoundParams {
            frequency: 22_025,
            volume: 100,
            pan: -50,
            looping: 1,
        };
        engine.play_sound(1, params).unwrap();
        assert_eq!(
            engine.backend().calls(),
            &[
                BackendCall::SetRate(handle, 0.5),
                BackendCall::SetVolume(handle, 1.0),
                BackendCall::SetPan(handle, -0.5),
                BackendCall::SetLoop(handle, true),
                BackendCall::Play(handle),
            ]
        );
    }

    #[test]
    fn test_set_attributes_only_changes() {
        let (mut engine, handle) = loaded(2);
        let params = SoundParams {
            volume: 80,
            ..SoundParams::UNCHANGED
        };
        engine.set_sound_attributes(2, params).unwrap();
        assert_eq!(engine.backend().calls(), &[BackendCall::SetVolume(handle, 0.8)]);

        engine.backend_mut().take_calls();
        engine.set_sound_attributes(2, params).unwrap();
        assert!(engine.backend().calls().is_empty());
    }

    #[test]
    fn test_missing_slot_is_untouched() {
        let mut engine = Engine::new(RecordingBackend::new());
        let params = SoundParams::UNCHANGED;
        assert_eq!(engine.play_sound(7, params), Err(EngineError::SoundNotFound(7)));
        assert_eq!(engine.set_sound_attributes(7, params), Err(EngineError::SoundNotFound(7)));
        assert_eq!(engine.stop_sound(7), Err(EngineError::SoundNotFound(7)));
        assert_eq!(engine.delete_sound(7), Err(EngineError::SoundNotFound(7)));
        assert!(engine.backend().calls().is_empty());
        assert!(engine.sounds().is_empty());
    }

    #[test]
    fn test_reload_releases_previous_first() {
        let mut engine = Engine::new(RecordingBackend::new());
        let first = engine.load_sound(5, vec![1]).unwrap();
        engine.backend_mut().take_calls();
        let second = engine.load_sound(5, vec![2, 2]).unwrap();

        assert_eq!(
            engine.backend().calls(),
            &[
                BackendCall::LoadSample {
                    handle: second,
                    format: SampleFormat::Wav,
                    len: 2
                },
                BackendCall::Stop(first),
                BackendCall::Release(first),
                BackendCall::SetVolume(second, 1.0),
            ]
        );
        assert_eq!(engine.sounds().len(), 1);
        assert_eq!(engine.sounds().get(5).map(|s| s.handle), Some(second));
    }

    #[test]
    fn test_failed_load_keeps_previous() {
        let mut engine = Engine::new(RecordingBackend::new());
        let first = engine.load_sound(5, vec![1]).unwrap();
        engine.backend_mut().fail_sample_loads = true;
        assert!(engine.load_sound(5, vec![2]).is_err());
        assert_eq!(engine.sounds().get(5).map(|s| s.handle), Some(first));
        assert!(engine.backend().is_live(first));
    }

    #[test]
    fn test_play_2d_does_not_store_pan() {
        let (mut engine, handle) = loaded(9);
        let mix = engine.play_sound_2d(9, 0xFF_FFFF, 100, 0, 10).unwrap();
        assert_relative_eq!(mix.pan, 99.0, epsilon = 1e-9);
        assert_eq!(engine.sounds().get(9).map(|s| s.pan), Some(0));

        let calls = engine.backend().calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], BackendCall::SetRate(handle, 1.0));
        assert!(matches!(calls[1], BackendCall::SetVolume(h, gain) if h == handle && (gain - 0.01).abs() < 1e-6));
        assert!(matches!(calls[2], BackendCall::SetPan(h, pan) if h == handle && (pan - 0.99).abs() < 1e-6));
        assert_eq!(calls[3], BackendCall::Play(handle));
    }

    #[test]
    fn test_play_2d_mixes_against_stored_listener() {
        let (mut engine, _) = loaded(1);
        engine.set_listener(Listener { x: 5, y: 5, angle: 90 });
        let mix = engine.play_sound_2d(1, 0xFF_FFFF, 100, 5, 5).unwrap();
        assert_eq!(mix.volume, 100.0);
    }
}
