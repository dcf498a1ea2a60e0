//! Adapter-wide mixer state

/// Position and facing of the 2D listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Listener {
    /// Horizontal position
    pub x: i16,
    /// Vertical position
    pub y: i16,
    /// Facing angle in degrees
    pub angle: i16,
}

/// Per-kind global volume multipliers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalVolume {
    /// Applied to every sound slot (0-100)
    pub sound: u16,
    /// Applied to every music channel (0-100)
    pub music: u16,
}

impl Default for GlobalVolume {
    fn default() -> Self {
        Self {
            sound: 100,
            music: 100,
        }
    }
}

/// Mixer state shared by every channel of one adapter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerState {
    /// Master volume (0-100)
    pub master_volume: u16,
    /// Per-kind global volume
    pub global_volume: GlobalVolume,
    /// 2D listener
    pub listener: Listener,
    /// Scale applied to 2D distances
    pub distance_factor: f64,
}

impl Default for MixerState {
    fn default() -> Self {
        Self {
            master_volume: 100,
            global_volume: GlobalVolume::default(),
            listener: Listener::default(),
            distance_factor: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixer_defaults() {
        let mixer = MixerState::default();
        assert_eq!(mixer.master_volume, 100);
        assert_eq!(mixer.global_volume, GlobalVolume { sound: 100, music: 100 });
        assert_eq!(mixer.listener, Listener { x: 0, y: 0, angle: 0 });
        assert_eq!(mixer.distance_factor, 1.0);
    }
}
