//! Mixing math
//!
//! Pure functions over channel and mixer state. Nothing here touches the
//! backend or mutates a channel.

pub mod positional;
pub mod sentinel;

pub use positional::{mix_2d, Positional};

use crate::channels::MixerState;

/// Which global volume multiplier applies to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKind {
    /// Sound slots
    Sound,
    /// Every music channel kind
    Music,
}

/// Effective 0..1 output gain of a channel with logical `volume` (0-100)
///
/// `volume` is an `f64` so that 2D-attenuated volumes can be passed through
/// unchanged.
pub fn effective_volume(volume: f64, mixer: &MixerState, kind: VolumeKind) -> f32 {
    let global = match kind {
        VolumeKind::Sound => mixer.global_volume.sound,
        VolumeKind::Music => mixer.global_volume.music,
    };
    let gain = (volume / 100.0) * (f64::from(mixer.master_volume) / 100.0) * (f64::from(global) / 100.0);
    gain as f32
}

/// Pan in -100..100 logical units converted to the backend's -1..1 range
pub fn pan_ratio(pan: f64) -> f32 {
    (pan / 100.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::GlobalVolume;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn mixer(master: u16, sound: u16, music: u16) -> MixerState {
        MixerState {
            master_volume: master,
            global_volume: GlobalVolume { sound, music },
            ..MixerState::default()
        }
    }

    #[test]
    fn test_defaults_pass_volume_through() {
        let mixer = MixerState::default();
        assert_relative_eq!(effective_volume(100.0, &mixer, VolumeKind::Sound), 1.0);
        assert_relative_eq!(effective_volume(50.0, &mixer, VolumeKind::Music), 0.5);
    }

    #[test]
    fn test_music_uses_music_global() {
        let mixer = mixer(100, 100, 25);
        assert_relative_eq!(effective_volume(100.0, &mixer, VolumeKind::Music), 0.25);
        assert_relative_eq!(effective_volume(100.0, &mixer, VolumeKind::Sound), 1.0);
    }

    #[test]
    fn test_pan_ratio() {
        assert_relative_eq!(pan_ratio(-100.0), -1.0);
        assert_relative_eq!(pan_ratio(99.0), 0.99);
    }

    proptest! {
        #[test]
        fn prop_effective_volume_formula(volume in 0u16..=100, master in 0u16..=100, global in 0u16..=100) {
            let expected = f64::from(volume) * f64::from(master) * f64::from(global) / 1_000_000.0;
            let mixer = mixer(master, global, global);
            let sound = effective_volume(f64::from(volume), &mixer, VolumeKind::Sound);
            let music = effective_volume(f64::from(volume), &mixer, VolumeKind::Music);
            prop_assert!((f64::from(sound) - expected).abs() < 1e-6);
            prop_assert!((f64::from(music) - expected).abs() < 1e-6);
            prop_assert!((0.0..=1.0).contains(&sound));
        }

        #[test]
        fn prop_recomputation_is_idempotent(volume in 0u16..=100, master in 0u16..=100, first in 0u16..=100, second in 0u16..=100) {
            let mut state = mixer(master, first, 100);
            let _ = effective_volume(f64::from(volume), &state, VolumeKind::Sound);
            state.global_volume.sound = second;
            let recomputed = effective_volume(f64::from(volume), &state, VolumeKind::Sound);
            let fresh = effective_volume(f64::from(volume), &mixer(master, second, 100), VolumeKind::Sound);
            prop_assert_eq!(recomputed, fresh);
        }
    }
}
