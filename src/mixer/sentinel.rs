//! CURRENT/DEFAULT sentinel resolution
//!
//! Every attribute carried by a guest command may hold one of two reserved
//! values: `CURRENT` keeps what is stored, `DEFAULT` resets to the nominal.
//! The reserved encodings differ by field width, so each attribute kind gets
//! its own marker type.

use std::fmt::Debug;

/// Nominal playback frequency in Hz; also the unit rate ratio
pub const NOMINAL_FREQUENCY: u32 = 44_050;

/// Flag word sentinel meaning "default", used by music loads to request looping
pub const DEFAULT_FLAGS: u32 = 0xFFFE;

/// A guest attribute with reserved CURRENT/DEFAULT encodings
pub trait Attribute {
    /// Wire representation
    type Value: Copy + PartialEq + Debug;
    /// "Leave unchanged"
    const CURRENT: Self::Value;
    /// "Reset to nominal"
    const DEFAULT: Self::Value;
    /// Value `DEFAULT` resolves to
    const NOMINAL: Self::Value;
}

/// Volume in 0-100 logical units
#[derive(Debug, Clone, Copy)]
pub struct Volume;

impl Attribute for Volume {
    type Value = u16;
    const CURRENT: u16 = 0xFFFF;
    const DEFAULT: u16 = 0xFFFE;
    const NOMINAL: u16 = 50;
}

/// Looping flag word
#[derive(Debug, Clone, Copy)]
pub struct Looping;

impl Attribute for Looping {
    type Value = u16;
    const CURRENT: u16 = 0xFFFF;
    const DEFAULT: u16 = 0xFFFE;
    const NOMINAL: u16 = 0;
}

/// Playback frequency in Hz
#[derive(Debug, Clone, Copy)]
pub struct Frequency;

impl Attribute for Frequency {
    type Value = u32;
    const CURRENT: u32 = 0x00FF_FFFF;
    const DEFAULT: u32 = 0x00FF_FFFE;
    const NOMINAL: u32 = NOMINAL_FREQUENCY;
}

/// Stereo pan, -100..100
#[derive(Debug, Clone, Copy)]
pub struct Pan;

impl Attribute for Pan {
    type Value = i16;
    const CURRENT: i16 = -1;
    const DEFAULT: i16 = -2;
    const NOMINAL: i16 = 0;
}

/// Resolve an incoming attribute value against the stored one
pub fn resolve<A: Attribute>(incoming: A::Value, stored: A::Value) -> A::Value {
    if incoming == A::CURRENT {
        stored
    } else if incoming == A::DEFAULT {
        A::NOMINAL
    } else {
        incoming
    }
}

/// Resolve and report the new value only when it differs from the stored one
pub fn resolve_change<A: Attribute>(incoming: A::Value, stored: A::Value) -> Option<A::Value> {
    let resolved = resolve::<A>(incoming, stored);
    (resolved != stored).then_some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_nominals() {
        assert_eq!(resolve::<Volume>(0xFFFE, 100), 50);
        assert_eq!(resolve::<Frequency>(0xFF_FFFE, 11_025), 44_050);
        assert_eq!(resolve::<Pan>(-2, 60), 0);
        assert_eq!(resolve::<Looping>(0xFFFE, 1), 0);
    }

    #[test]
    fn test_narrow_sentinels_are_literal_frequencies() {
        // 16-bit sentinels carried in the 32-bit frequency field are plain values
        assert_eq!(resolve::<Frequency>(0xFFFF, 44_050), 0xFFFF);
        assert_eq!(resolve::<Frequency>(0xFFFE, 44_050), 0xFFFE);
    }

    #[test]
    fn test_resolve_change_reports_only_differences() {
        assert_eq!(resolve_change::<Volume>(0xFFFF, 70), None);
        assert_eq!(resolve_change::<Volume>(70, 70), None);
        assert_eq!(resolve_change::<Volume>(0xFFFE, 70), Some(50));
        assert_eq!(resolve_change::<Pan>(-100, 0), Some(-100));
        assert_eq!(resolve_change::<Pan>(-1, 25), None);
    }

    fn check<A: Attribute>(incoming: A::Value, stored: A::Value) -> std::result::Result<(), TestCaseError> {
        let resolved = resolve::<A>(incoming, stored);
        if incoming == A::CURRENT {
            prop_assert_eq!(resolved, stored);
        } else if incoming == A::DEFAULT {
            prop_assert_eq!(resolved, A::NOMINAL);
        } else {
            prop_assert_eq!(resolved, incoming);
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_volume_resolution(incoming in prop_oneof![Just(0xFFFFu16), Just(0xFFFE), any::<u16>()], stored: u16) {
            check::<Volume>(incoming, stored)?;
        }

        #[test]
        fn prop_looping_resolution(incoming in prop_oneof![Just(0xFFFFu16), Just(0xFFFE), any::<u16>()], stored: u16) {
            check::<Looping>(incoming, stored)?;
        }

        #[test]
        fn prop_frequency_resolution(incoming in prop_oneof![Just(0xFF_FFFFu32), Just(0xFF_FFFE), any::<u32>()], stored: u32) {
            check::<Frequency>(incoming, stored)?;
        }

        #[test]
        fn prop_pan_resolution(incoming in prop_oneof![Just(-1i16), Just(-2), -100i16..=100], stored in -100i16..=100) {
            check::<Pan>(incoming, stored)?;
        }

        #[test]
        fn prop_current_never_reports_change(stored: u16) {
            prop_assert_eq!(resolve_change::<Volume>(Volume::CURRENT, stored), None);
            prop_assert_eq!(resolve_change::<Looping>(Looping::CURRENT, stored), None);
        }
    }
}
