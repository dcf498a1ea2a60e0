//! Per-voice PCM source with shared controls
//!
//! A [`Voice`] is the rodio side of a loaded sample: it walks decoded stereo
//! PCM at a variable rate and applies gain, pan and fades. The backend keeps
//! the matching [`VoiceControls`] and changes them from the polling thread.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rodio::Source;

/// Seek slot value meaning "no seek requested"
const NO_SEEK: u64 = u64::MAX;

/// Decoded interleaved stereo PCM
#[derive(Debug, Clone, PartialEq)]
pub struct Pcm {
    /// Interleaved left/right samples
    pub samples: Vec<f32>,
    /// Frames per second
    pub sample_rate: u32,
}

impl Pcm {
    /// Interleave source channels down (or up) to stereo
    pub fn from_interleaved(samples: &[f32], channels: u16, sample_rate: u32) -> Self {
        let channels = usize::from(channels.max(1));
        let mut stereo = Vec::with_capacity(samples.len() / channels * 2);
        for frame in samples.chunks_exact(channels) {
            let left = frame[0];
            let right = if channels > 1 { frame[1] } else { left };
            stereo.push(left);
            stereo.push(right);
        }
        Self {
            samples: stereo,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Length in seconds
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

#[derive(Debug, Clone, Copy)]
struct Fade {
    from: f32,
    to: f32,
    frames: u64,
    elapsed: u64,
}

/// Controls shared between the backend and the playing source
#[derive(Debug)]
pub struct VoiceControls {
    gain: AtomicU32,
    pan: AtomicU32,
    rate: AtomicU32,
    looping: AtomicBool,
    /// Playback cursor in frames, stored as `f64` bits
    cursor: AtomicU64,
    seek_to: AtomicU64,
    fade: Mutex<Option<Fade>>,
}

impl Default for VoiceControls {
    fn default() -> Self {
        Self {
            gain: AtomicU32::new(1.0f32.to_bits()),
            pan: AtomicU32::new(0.0f32.to_bits()),
            rate: AtomicU32::new(1.0f32.to_bits()),
            looping: AtomicBool::new(false),
            cursor: AtomicU64::new(0.0f64.to_bits()),
            seek_to: AtomicU64::new(NO_SEEK),
            fade: Mutex::new(None),
        }
    }
}

impl VoiceControls {
    /// Set gain (0..1); cancels a running fade
    pub fn set_gain(&self, gain: f32) {
        *self.fade.lock() = None;
        self.gain.store(gain.max(0.0).to_bits(), Ordering::Relaxed);
    }

    /// Current gain
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    /// Set pan (-1 left .. 1 right)
    pub fn set_pan(&self, pan: f32) {
        self.pan.store(pan.clamp(-1.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Set playback rate ratio
    pub fn set_rate(&self, rate: f32) {
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        self.rate.store(rate.to_bits(), Ordering::Relaxed);
    }

    /// Loop at end of data
    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    /// Fade gain from `from` to `to` over `frames` output frames
    pub fn start_fade(&self, from: f32, to: f32, frames: u64) {
        if frames == 0 {
            self.set_gain(to);
            return;
        }
        self.gain.store(from.to_bits(), Ordering::Relaxed);
        *self.fade.lock() = Some(Fade {
            from,
            to,
            frames,
            elapsed: 0,
        });
    }

    /// Playback cursor in frames
    pub fn cursor(&self) -> f64 {
        f64::from_bits(self.cursor.load(Ordering::Relaxed))
    }

    /// Ask the source to jump to `frame`
    pub fn seek(&self, frame: u64) {
        self.seek_to.store(frame, Ordering::Relaxed);
        self.cursor.store((frame as f64).to_bits(), Ordering::Relaxed);
    }

    /// Rewind to the start
    pub fn rewind(&self) {
        self.seek(0);
    }

    // Gain for the next frame, advancing any fade
    fn frame_gain(&self) -> f32 {
        let mut fade = self.fade.lock();
        let Some(active) = fade.as_mut() else {
            return self.gain();
        };
        active.elapsed += 1;
        let t = (active.elapsed as f32 / active.frames as f32).min(1.0);
        let gain = active.from + (active.to - active.from) * t;
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
        if active.elapsed >= active.frames {
            *fade = None;
        }
        gain
    }
}

/// rodio source over shared PCM
pub struct Voice {
    pcm: Arc<Pcm>,
    controls: Arc<VoiceControls>,
    position: f64,
    right: Option<f32>,
}

impl Voice {
    /// Source starting at the controls' cursor
    pub fn new(pcm: Arc<Pcm>, controls: Arc<VoiceControls>) -> Self {
        let position = controls.cursor();
        Self {
            pcm,
            controls,
            position,
            right: None,
        }
    }

    fn frame(&self) -> (f32, f32) {
        let frames = self.pcm.frames();
        let index = self.position.floor() as usize;
        let frac = (self.position - self.position.floor()) as f32;
        let at = |i: usize| {
            let i = if i >= frames { index } else { i };
            (self.pcm.samples[i * 2], self.pcm.samples[i * 2 + 1])
        };
        let (l0, r0) = at(index);
        let (l1, r1) = at(index + 1);
        (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
    }
}

impl Iterator for Voice {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if let Some(right) = self.right.take() {
            return Some(right);
        }

        let seek = self.controls.seek_to.swap(NO_SEEK, Ordering::Relaxed);
        if seek != NO_SEEK {
            self.position = seek as f64;
        }

        let frames = self.pcm.frames() as f64;
        if self.position >= frames {
            if frames > 0.0 && self.controls.looping.load(Ordering::Relaxed) {
                self.position %= frames;
            } else {
                self.controls.cursor.store(frames.to_bits(), Ordering::Relaxed);
                return None;
            }
        }

        let (left, right) = self.frame();
        let gain = self.controls.frame_gain();
        let pan = f32::from_bits(self.controls.pan.load(Ordering::Relaxed));
        let left_gain = gain * (1.0 - pan).min(1.0);
        let right_gain = gain * (1.0 + pan).min(1.0);

        let rate = f32::from_bits(self.controls.rate.load(Ordering::Relaxed));
        self.position += f64::from(rate);
        self.controls.cursor.store(self.position.to_bits(), Ordering::Relaxed);

        self.right = Some(right * right_gain);
        Some(left * left_gain)
    }
}

impl Source for Voice {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.pcm.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pcm(frames: &[(f32, f32)]) -> Arc<Pcm> {
        let samples = frames.iter().flat_map(|&(l, r)| [l, r]).collect();
        Arc::new(Pcm {
            samples,
            sample_rate: 100,
        })
    }

    #[test]
    fn test_mono_is_duplicated() {
        let pcm = Pcm::from_interleaved(&[0.1, 0.2], 1, 8000);
        assert_eq!(pcm.samples, vec![0.1, 0.1, 0.2, 0.2]);
        assert_relative_eq!(pcm.duration_secs(), 2.0 / 8000.0);
    }

    #[test]
    fn test_extra_channels_are_dropped() {
        let pcm = Pcm::from_interleaved(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3, 8000);
        assert_eq!(pcm.samples, vec![0.1, 0.2, 0.4, 0.5]);
    }

    #[test]
    fn test_plays_to_end_then_stops() {
        let controls = Arc::new(VoiceControls::default());
        let voice = Voice::new(pcm(&[(0.5, 0.5), (0.25, 0.25)]), Arc::clone(&controls));
        let out: Vec<f32> = voice.collect();
        assert_eq!(out, vec![0.5, 0.5, 0.25, 0.25]);
        assert_relative_eq!(controls.cursor(), 2.0);
    }

    #[test]
    fn test_gain_and_pan() {
        let controls = Arc::new(VoiceControls::default());
        controls.set_gain(0.5);
        controls.set_pan(1.0);
        let mut voice = Voice::new(pcm(&[(1.0, 1.0)]), Arc::clone(&controls));
        assert_relative_eq!(voice.next().unwrap(), 0.0);
        assert_relative_eq!(voice.next().unwrap(), 0.5);
    }

    #[test]
    fn test_looping_wraps() {
        let controls = Arc::new(VoiceControls::default());
        controls.set_looping(true);
        let voice = Voice::new(pcm(&[(1.0, 1.0), (0.0, 0.0)]), Arc::clone(&controls));
        let out: Vec<f32> = voice.take(8).collect();
        assert_eq!(out, vec![1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_fade_reaches_target() {
        let controls = Arc::new(VoiceControls::default());
        controls.start_fade(1.0, 0.0, 2);
        let mut voice = Voice::new(pcm(&[(1.0, 1.0); 4]), Arc::clone(&controls));
        let left: Vec<f32> = (0..4).map(|_| voice.next().unwrap_or_default()).step_by(2).collect();
        assert_relative_eq!(left[0], 0.5);
        assert_relative_eq!(left[1], 0.0);
        assert_relative_eq!(controls.gain(), 0.0);
    }

    #[test]
    fn test_seek_and_rate() {
        let controls = Arc::new(VoiceControls::default());
        controls.set_rate(2.0);
        let mut voice = Voice::new(pcm(&[(0.0, 0.0), (0.1, 0.1), (0.2, 0.2), (0.3, 0.3)]), Arc::clone(&controls));
        assert_relative_eq!(voice.next().unwrap(), 0.0);
        voice.next();
        assert_relative_eq!(voice.next().unwrap(), 0.2);
        voice.next();
        controls.seek(1);
        assert_relative_eq!(voice.next().unwrap(), 0.1);
    }
}
