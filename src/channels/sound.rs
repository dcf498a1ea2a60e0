//! Loaded sound-effect state

use crate::backend::SampleHandle;
use crate::mixer::sentinel::NOMINAL_FREQUENCY;

/// One loaded short sample
///
/// Attribute values are kept in the guest's logical units: frequency in Hz,
/// volume 0-100, pan -100..100 and the raw looping flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundSlot {
    /// Backend sample handle
    pub handle: SampleHandle,
    /// Playback frequency in Hz
    pub frequency: u32,
    /// Channel volume (0-100)
    pub volume: u16,
    /// Stereo pan (-100 = left, 100 = right)
    pub pan: i16,
    /// Looping flag word (non-zero = loop)
    pub looping: u16,
}

impl SoundSlot {
    /// State of a freshly loaded sample
    pub fn new(handle: SampleHandle) -> Self {
        Self {
            handle,
            frequency: NOMINAL_FREQUENCY,
            volume: 100,
            pan: 0,
            looping: 0,
        }
    }

    /// Rate ratio handed to the backend
    pub fn rate(&self) -> f32 {
        self.frequency as f32 / NOMINAL_FREQUENCY as f32
    }

    /// Whether the looping word requests a loop
    pub fn is_looping(&self) -> bool {
        self.looping != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults() {
        let slot = SoundSlot::new(SampleHandle(1));
        assert_eq!(slot.frequency, 44_050);
        assert_eq!(slot.volume, 100);
        assert_eq!(slot.pan, 0);
        assert!(!slot.is_looping());
        assert_eq!(slot.rate(), 1.0);
    }

    #[test]
    fn test_rate_ratio() {
        let mut slot = SoundSlot::new(SampleHandle(1));
        slot.frequency = 22_025;
        assert_eq!(slot.rate(), 0.5);
    }
}
