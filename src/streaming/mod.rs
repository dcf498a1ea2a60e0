//! Real-time audio output through rodio
//!
//! Every loaded sample is decoded up front to stereo `f32` PCM. Each play
//! appends a fresh [`voice::Voice`] to a new rodio `Sink`; gain, pan, rate,
//! looping and fades are shared with the audio thread through
//! [`voice::VoiceControls`].
//!
//! With the `tracker` feature, XM modules are rendered to PCM on a worker
//! thread and then played like any other voice.

#[cfg(feature = "tracker")]
mod tracker;
pub mod voice;

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tracing::debug;

use crate::backend::{AudioBackend, BackendError, ModuleHandle, ModuleStatus, ModuleTicket, Repeat, SampleFormat, SampleHandle};
use voice::{Pcm, Voice, VoiceControls};

/// Decode WAV bytes with hound
pub fn decode_wav(bytes: &[u8]) -> Result<Pcm, BackendError> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| BackendError::Decode(format!("wav: {e}")))?;
    let spec = reader.spec();
    let samples: Result<Vec<f32>, hound::Error> = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect(),
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|s| s as f32 * scale))
                .collect()
        }
    };
    let samples = samples.map_err(|e| BackendError::Decode(format!("wav: {e}")))?;
    Ok(Pcm::from_interleaved(&samples, spec.channels, spec.sample_rate))
}

/// Decode a compressed stream with rodio's decoder
pub fn decode_stream(bytes: Vec<u8>) -> Result<Pcm, BackendError> {
    let decoder = Decoder::new(Cursor::new(bytes)).map_err(|e| BackendError::Decode(format!("stream: {e}")))?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.convert_samples().collect();
    Ok(Pcm::from_interleaved(&samples, channels, sample_rate))
}

struct Channel {
    pcm: Arc<Pcm>,
    controls: Arc<VoiceControls>,
    sink: Option<Sink>,
}

impl Channel {
    fn new(pcm: Pcm) -> Self {
        Self {
            pcm: Arc::new(pcm),
            controls: Arc::new(VoiceControls::default()),
            sink: None,
        }
    }

    fn play(&mut self, output: &OutputStreamHandle) -> Result<(), BackendError> {
        // Retrigger from the start; a stopped voice keeps any seek made since
        let finished = self.controls.cursor() >= self.pcm.frames() as f64;
        if let Some(sink) = self.sink.take() {
            sink.stop();
            self.controls.rewind();
        } else if finished {
            self.controls.rewind();
        }
        let sink = Sink::try_new(output).map_err(|e| BackendError::Device(e.to_string()))?;
        sink.append(Voice::new(Arc::clone(&self.pcm), Arc::clone(&self.controls)));
        self.sink = Some(sink);
        Ok(())
    }

    fn pause(&self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn resume(&self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.controls.rewind();
    }

    fn position_secs(&self) -> f64 {
        self.controls.cursor() / f64::from(self.pcm.sample_rate)
    }
}

#[cfg(feature = "tracker")]
struct ModuleChannel {
    channel: Channel,
    timeline: tracker::Timeline,
}

/// Audio backend playing through the default output device
pub struct RodioBackend {
    _stream: OutputStream,
    output: OutputStreamHandle,
    samples: HashMap<SampleHandle, Channel>,
    #[cfg(feature = "tracker")]
    modules: HashMap<ModuleHandle, ModuleChannel>,
    #[cfg(feature = "tracker")]
    renderer: tracker::Renderer,
    next_id: u32,
}

impl RodioBackend {
    /// Open the default output device
    pub fn new() -> Result<Self, BackendError> {
        let (stream, output) =
            OutputStream::try_default().map_err(|e| BackendError::Device(format!("Failed to create audio stream: {e}")))?;
        Ok(Self {
            _stream: stream,
            output,
            samples: HashMap::new(),
            #[cfg(feature = "tracker")]
            modules: HashMap::new(),
            #[cfg(feature = "tracker")]
            renderer: tracker::Renderer::new(),
            next_id: 0,
        })
    }

    fn issue(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn sample(&mut self, handle: SampleHandle) -> Result<&mut Channel, BackendError> {
        self.samples.get_mut(&handle).ok_or(BackendError::UnknownHandle(handle.0))
    }

    #[cfg(feature = "tracker")]
    fn module(&mut self, handle: ModuleHandle) -> Result<&mut ModuleChannel, BackendError> {
        self.modules.get_mut(&handle).ok_or(BackendError::UnknownHandle(handle.0))
    }

    #[cfg(not(feature = "tracker"))]
    fn module(&mut self, handle: ModuleHandle) -> Result<&mut Channel, BackendError> {
        Err(BackendError::UnknownHandle(handle.0))
    }
}

#[cfg(feature = "tracker")]
fn module_channel(module: &mut ModuleChannel) -> &mut Channel {
    &mut module.channel
}

#[cfg(not(feature = "tracker"))]
fn module_channel(channel: &mut Channel) -> &mut Channel {
    channel
}

impl AudioBackend for RodioBackend {
    fn load_sample(&mut self, bytes: Vec<u8>, format: SampleFormat) -> Result<SampleHandle, BackendError> {
        let pcm = match format {
            SampleFormat::Wav => decode_wav(&bytes)?,
            SampleFormat::Stream => decode_stream(bytes)?,
        };
        let handle = SampleHandle(self.issue());
        debug!(%handle, ?format, frames = pcm.frames(), rate = pcm.sample_rate, "sample decoded");
        self.samples.insert(handle, Channel::new(pcm));
        Ok(handle)
    }

    fn play(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        let output = self.output.clone();
        self.sample(handle)?.play(&output)
    }

    fn pause(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        self.sample(handle)?.pause();
        Ok(())
    }

    fn resume(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        self.sample(handle)?.resume();
        Ok(())
    }

    fn stop(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        self.sample(handle)?.stop();
        Ok(())
    }

    fn release(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        let mut channel = self.samples.remove(&handle).ok_or(BackendError::UnknownHandle(handle.0))?;
        channel.stop();
        Ok(())
    }

    fn set_volume(&mut self, handle: SampleHandle, volume: f32) -> Result<(), BackendError> {
        self.sample(handle)?.controls.set_gain(volume);
        Ok(())
    }

    fn set_pan(&mut self, handle: SampleHandle, pan: f32) -> Result<(), BackendError> {
        self.sample(handle)?.controls.set_pan(pan);
        Ok(())
    }

    fn set_rate(&mut self, handle: SampleHandle, rate: f32) -> Result<(), BackendError> {
        self.sample(handle)?.controls.set_rate(rate);
        Ok(())
    }

    fn set_loop(&mut self, handle: SampleHandle, looping: bool) -> Result<(), BackendError> {
        self.sample(handle)?.controls.set_looping(looping);
        Ok(())
    }

    fn fade(&mut self, handle: SampleHandle, from: f32, to: f32, duration: Duration) -> Result<(), BackendError> {
        let channel = self.sample(handle)?;
        let frames = (duration.as_secs_f64() * f64::from(channel.pcm.sample_rate)).round() as u64;
        channel.controls.start_fade(from, to, frames);
        Ok(())
    }

    fn duration(&mut self, handle: SampleHandle) -> Result<Option<f64>, BackendError> {
        Ok(Some(self.sample(handle)?.pcm.duration_secs()))
    }

    fn position(&mut self, handle: SampleHandle) -> Result<f64, BackendError> {
        Ok(self.sample(handle)?.position_secs())
    }

    fn seek(&mut self, handle: SampleHandle, secs: f64) -> Result<(), BackendError> {
        let channel = self.sample(handle)?;
        let frame = (secs.max(0.0) * f64::from(channel.pcm.sample_rate)) as u64;
        channel.controls.seek(frame);
        Ok(())
    }

    #[cfg(feature = "tracker")]
    fn load_module(&mut self, bytes: Vec<u8>, repeat: Repeat) -> Result<ModuleTicket, BackendError> {
        let ticket = ModuleTicket(self.issue());
        self.renderer.submit(ticket, bytes, repeat);
        Ok(ticket)
    }

    #[cfg(not(feature = "tracker"))]
    fn load_module(&mut self, bytes: Vec<u8>, repeat: Repeat) -> Result<ModuleTicket, BackendError> {
        tracing::warn!(len = bytes.len(), ?repeat, "tracker playback needs the tracker feature");
        Err(BackendError::Unsupported("tracker modules need the `tracker` feature".into()))
    }

    #[cfg(feature = "tracker")]
    fn poll_module(&mut self, ticket: ModuleTicket) -> ModuleStatus {
        match self.renderer.poll(ticket) {
            tracker::RenderStatus::Rendering => ModuleStatus::Loading,
            tracker::RenderStatus::Unknown => ModuleStatus::Failed(BackendError::UnknownHandle(ticket.0)),
            tracker::RenderStatus::Failed(err) => ModuleStatus::Failed(err),
            tracker::RenderStatus::Done(rendered) => {
                let handle = ModuleHandle(self.issue());
                let channel = Channel::new(rendered.pcm);
                channel.controls.set_looping(rendered.repeat == Repeat::Forever);
                debug!(%handle, orders = rendered.timeline.total_orders(), "module rendered");
                self.modules.insert(
                    handle,
                    ModuleChannel {
                        channel,
                        timeline: rendered.timeline,
                    },
                );
                ModuleStatus::Ready(handle)
            }
        }
    }

    #[cfg(not(feature = "tracker"))]
    fn poll_module(&mut self, ticket: ModuleTicket) -> ModuleStatus {
        ModuleStatus::Failed(BackendError::UnknownHandle(ticket.0))
    }

    fn module_play(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        let output = self.output.clone();
        module_channel(self.module(handle)?).play(&output)
    }

    fn module_pause(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        module_channel(self.module(handle)?).pause();
        Ok(())
    }

    fn module_resume(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        module_channel(self.module(handle)?).resume();
        Ok(())
    }

    fn module_stop(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        module_channel(self.module(handle)?).stop();
        Ok(())
    }

    #[cfg(feature = "tracker")]
    fn module_release(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        let mut module = self.modules.remove(&handle).ok_or(BackendError::UnknownHandle(handle.0))?;
        module.channel.stop();
        Ok(())
    }

    #[cfg(not(feature = "tracker"))]
    fn module_release(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        Err(BackendError::UnknownHandle(handle.0))
    }

    fn module_set_volume(&mut self, handle: ModuleHandle, volume: f32) -> Result<(), BackendError> {
        module_channel(self.module(handle)?).controls.set_gain(volume);
        Ok(())
    }

    #[cfg(feature = "tracker")]
    fn module_total_orders(&mut self, handle: ModuleHandle) -> Result<u16, BackendError> {
        Ok(self.module(handle)?.timeline.total_orders())
    }

    #[cfg(not(feature = "tracker"))]
    fn module_total_orders(&mut self, handle: ModuleHandle) -> Result<u16, BackendError> {
        Err(BackendError::UnknownHandle(handle.0))
    }

    #[cfg(feature = "tracker")]
    fn module_order_row(&mut self, handle: ModuleHandle) -> Result<(u16, u16), BackendError> {
        let module = self.module(handle)?;
        let frame = module.channel.controls.cursor() as u64;
        Ok(module.timeline.order_row_at(frame))
    }

    #[cfg(not(feature = "tracker"))]
    fn module_order_row(&mut self, handle: ModuleHandle) -> Result<(u16, u16), BackendError> {
        Err(BackendError::UnknownHandle(handle.0))
    }

    #[cfg(feature = "tracker")]
    fn module_set_order_row(&mut self, handle: ModuleHandle, order: u16, row: u16) -> Result<(), BackendError> {
        let module = self.module(handle)?;
        let frame = module
            .timeline
            .frame_of(order, row)
            .ok_or_else(|| BackendError::Unsupported(format!("order {order} row {row} is never reached")))?;
        module.channel.controls.seek(frame);
        Ok(())
    }

    #[cfg(not(feature = "tracker"))]
    fn module_set_order_row(&mut self, handle: ModuleHandle, _order: u16, _row: u16) -> Result<(), BackendError> {
        Err(BackendError::UnknownHandle(handle.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn wav_bytes(spec: hound::WavSpec, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &sample in samples {
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_mono_wav() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 11025,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let pcm = decode_wav(&wav_bytes(spec, &[16384, -16384])).unwrap();
        assert_eq!(pcm.sample_rate, 11025);
        assert_eq!(pcm.frames(), 2);
        assert_relative_eq!(pcm.samples[0], 0.5);
        assert_relative_eq!(pcm.samples[1], 0.5);
        assert_relative_eq!(pcm.samples[2], -0.5);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(decode_wav(b"not a wav"), Err(BackendError::Decode(_))));
        assert!(matches!(decode_stream(vec![0; 16]), Err(BackendError::Decode(_))));
    }

    #[test]
    fn test_backend_without_device() {
        // CI machines often lack an output device
        let Ok(mut backend) = RodioBackend::new() else {
            return;
        };
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let handle = backend
            .load_sample(wav_bytes(spec, &[0; 44100]), SampleFormat::Wav)
            .unwrap();
        assert_relative_eq!(backend.duration(handle).unwrap().unwrap(), 1.0);
        backend.seek(handle, 0.5).unwrap();
        assert_relative_eq!(backend.position(handle).unwrap(), 0.5);
        backend.release(handle).unwrap();
        assert_eq!(backend.play(handle), Err(BackendError::UnknownHandle(handle.0)));
    }
}
