//! Backend that records every call
//!
//! Used by the test suites to assert exact call sequences, and handy for
//! dry runs where no audio device is available.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::{AudioBackend, BackendError, ModuleHandle, ModuleStatus, ModuleTicket, Repeat, SampleFormat, SampleHandle};

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    /// `load_sample` succeeded with this handle
    LoadSample {
        /// Issued handle
        handle: SampleHandle,
        /// Requested format
        format: SampleFormat,
        /// Byte count
        len: usize,
    },
    /// `play`
    Play(SampleHandle),
    /// `pause`
    Pause(SampleHandle),
    /// `resume`
    Resume(SampleHandle),
    /// `stop`
    Stop(SampleHandle),
    /// `release`
    Release(SampleHandle),
    /// `set_volume`
    SetVolume(SampleHandle, f32),
    /// `set_pan`
    SetPan(SampleHandle, f32),
    /// `set_rate`
    SetRate(SampleHandle, f32),
    /// `set_loop`
    SetLoop(SampleHandle, bool),
    /// `fade`
    Fade {
        /// Target handle
        handle: SampleHandle,
        /// Start gain
        from: f32,
        /// End gain
        to: f32,
        /// Ramp length
        duration: Duration,
    },
    /// `seek`
    Seek(SampleHandle, f64),
    /// `load_module` succeeded with this ticket
    LoadModule {
        /// Issued ticket
        ticket: ModuleTicket,
        /// Requested repeat mode
        repeat: Repeat,
        /// Byte count
        len: usize,
    },
    /// `module_play`
    ModulePlay(ModuleHandle),
    /// `module_pause`
    ModulePause(ModuleHandle),
    /// `module_resume`
    ModuleResume(ModuleHandle),
    /// `module_stop`
    ModuleStop(ModuleHandle),
    /// `module_release`
    ModuleRelease(ModuleHandle),
    /// `module_set_volume`
    ModuleSetVolume(ModuleHandle, f32),
    /// `module_set_order_row`
    ModuleSetOrderRow(ModuleHandle, u16, u16),
}

/// In-memory backend recording every mutating call in order
///
/// Queries (`duration`, `position`, module position) are answered from
/// configurable tables and are not recorded.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    calls: Vec<BackendCall>,
    next_id: u32,
    live_samples: HashSet<SampleHandle>,
    live_modules: HashSet<ModuleHandle>,
    pending_modules: HashMap<ModuleTicket, usize>,
    durations: HashMap<SampleHandle, f64>,
    positions: HashMap<SampleHandle, f64>,
    module_orders: HashMap<ModuleHandle, u16>,
    module_positions: HashMap<ModuleHandle, (u16, u16)>,
    /// Reject every `load_sample`
    pub fail_sample_loads: bool,
    /// Reject every `load_module`
    pub fail_module_loads: bool,
    /// Report `Failed` when a module would become ready
    pub fail_module_preparation: bool,
    /// Number of polls answered with `Loading` before a module becomes ready
    pub module_polls: usize,
    /// Total orders reported for new modules
    pub default_total_orders: u16,
}

impl RecordingBackend {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls recorded so far
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Take the recorded calls, leaving the log empty
    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    /// Whether a sample handle is loaded and not yet released
    pub fn is_live(&self, handle: SampleHandle) -> bool {
        self.live_samples.contains(&handle)
    }

    /// Whether a module handle is ready and not yet released
    pub fn is_module_live(&self, handle: ModuleHandle) -> bool {
        self.live_modules.contains(&handle)
    }

    /// Number of live samples
    pub fn live_sample_count(&self) -> usize {
        self.live_samples.len()
    }

    /// Set the duration reported for a sample
    pub fn set_duration(&mut self, handle: SampleHandle, secs: f64) {
        self.durations.insert(handle, secs);
    }

    /// Set the position reported for a sample
    pub fn set_position(&mut self, handle: SampleHandle, secs: f64) {
        self.positions.insert(handle, secs);
    }

    /// Set the order/row reported for a module
    pub fn set_module_position(&mut self, handle: ModuleHandle, order: u16, row: u16) {
        self.module_positions.insert(handle, (order, row));
    }

    fn issue(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn sample(&mut self, call: BackendCall, handle: SampleHandle) -> Result<(), BackendError> {
        self.calls.push(call);
        if self.live_samples.contains(&handle) {
            Ok(())
        } else {
            Err(BackendError::UnknownHandle(handle.0))
        }
    }

    fn module(&mut self, call: BackendCall, handle: ModuleHandle) -> Result<(), BackendError> {
        self.calls.push(call);
        if self.live_modules.contains(&handle) {
            Ok(())
        } else {
            Err(BackendError::UnknownHandle(handle.0))
        }
    }
}

impl AudioBackend for RecordingBackend {
    fn load_sample(&mut self, bytes: Vec<u8>, format: SampleFormat) -> Result<SampleHandle, BackendError> {
        if self.fail_sample_loads {
            return Err(BackendError::Decode("rejected by recorder".into()));
        }
        let handle = SampleHandle(self.issue());
        self.live_samples.insert(handle);
        self.calls.push(BackendCall::LoadSample {
            handle,
            format,
            len: bytes.len(),
        });
        Ok(handle)
    }

    fn play(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        self.sample(BackendCall::Play(handle), handle)
    }

    fn pause(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        self.sample(BackendCall::Pause(handle), handle)
    }

    fn resume(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        self.sample(BackendCall::Resume(handle), handle)
    }

    fn stop(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        self.sample(BackendCall::Stop(handle), handle)
    }

    fn release(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        let result = self.sample(BackendCall::Release(handle), handle);
        self.live_samples.remove(&handle);
        result
    }

    fn set_volume(&mut self, handle: SampleHandle, volume: f32) -> Result<(), BackendError> {
        self.sample(BackendCall::SetVolume(handle, volume), handle)
    }

    fn set_pan(&mut self, handle: SampleHandle, pan: f32) -> Result<(), BackendError> {
        self.sample(BackendCall::SetPan(handle, pan), handle)
    }

    fn set_rate(&mut self, handle: SampleHandle, rate: f32) -> Result<(), BackendError> {
        self.sample(BackendCall::SetRate(handle, rate), handle)
    }

    fn set_loop(&mut self, handle: SampleHandle, looping: bool) -> Result<(), BackendError> {
        self.sample(BackendCall::SetLoop(handle, looping), handle)
    }

    fn fade(&mut self, handle: SampleHandle, from: f32, to: f32, duration: Duration) -> Result<(), BackendError> {
        self.sample(
            BackendCall::Fade {
                handle,
                from,
                to,
                duration,
            },
            handle,
        )
    }

    fn duration(&mut self, handle: SampleHandle) -> Result<Option<f64>, BackendError> {
        if !self.live_samples.contains(&handle) {
            return Err(BackendError::UnknownHandle(handle.0));
        }
        Ok(self.durations.get(&handle).copied())
    }

    fn position(&mut self, handle: SampleHandle) -> Result<f64, BackendError> {
        if !self.live_samples.contains(&handle) {
            return Err(BackendError::UnknownHandle(handle.0));
        }
        Ok(self.positions.get(&handle).copied().unwrap_or(0.0))
    }

    fn seek(&mut self, handle: SampleHandle, secs: f64) -> Result<(), BackendError> {
        self.sample(BackendCall::Seek(handle, secs), handle)?;
        self.positions.insert(handle, secs);
        Ok(())
    }

    fn load_module(&mut self, bytes: Vec<u8>, repeat: Repeat) -> Result<ModuleTicket, BackendError> {
        if self.fail_module_loads {
            return Err(BackendError::Unsupported("rejected by recorder".into()));
        }
        let ticket = ModuleTicket(self.issue());
        self.pending_modules.insert(ticket, self.module_polls);
        self.calls.push(BackendCall::LoadModule {
            ticket,
            repeat,
            len: bytes.len(),
        });
        Ok(ticket)
    }

    fn poll_module(&mut self, ticket: ModuleTicket) -> ModuleStatus {
        let Some(remaining) = self.pending_modules.get_mut(&ticket) else {
            return ModuleStatus::Failed(BackendError::UnknownHandle(ticket.0));
        };
        if *remaining > 0 {
            *remaining -= 1;
            return ModuleStatus::Loading;
        }
        self.pending_modules.remove(&ticket);
        if self.fail_module_preparation {
            return ModuleStatus::Failed(BackendError::Decode("module preparation failed".into()));
        }
        let handle = ModuleHandle(self.issue());
        self.live_modules.insert(handle);
        self.module_orders.insert(handle, self.default_total_orders);
        ModuleStatus::Ready(handle)
    }

    fn module_play(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        self.module(BackendCall::ModulePlay(handle), handle)
    }

    fn module_pause(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        self.module(BackendCall::ModulePause(handle), handle)
    }

    fn module_resume(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        self.module(BackendCall::ModuleResume(handle), handle)
    }

    fn module_stop(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        self.module(BackendCall::ModuleStop(handle), handle)
    }

    fn module_release(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        let result = self.module(BackendCall::ModuleRelease(handle), handle);
        self.live_modules.remove(&handle);
        result
    }

    fn module_set_volume(&mut self, handle: ModuleHandle, volume: f32) -> Result<(), BackendError> {
        self.module(BackendCall::ModuleSetVolume(handle, volume), handle)
    }

    fn module_total_orders(&mut self, handle: ModuleHandle) -> Result<u16, BackendError> {
        self.module_orders
            .get(&handle)
            .copied()
            .ok_or(BackendError::UnknownHandle(handle.0))
    }

    fn module_order_row(&mut self, handle: ModuleHandle) -> Result<(u16, u16), BackendError> {
        if !self.live_modules.contains(&handle) {
            return Err(BackendError::UnknownHandle(handle.0));
        }
        Ok(self.module_positions.get(&handle).copied().unwrap_or((0, 0)))
    }

    fn module_set_order_row(&mut self, handle: ModuleHandle, order: u16, row: u16) -> Result<(), BackendError> {
        self.module(BackendCall::ModuleSetOrderRow(handle, order, row), handle)?;
        self.module_positions.insert(handle, (order, row));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let mut backend = RecordingBackend::new();
        let handle = backend.load_sample(vec![0; 4], SampleFormat::Wav).unwrap();
        backend.set_rate(handle, 1.0).unwrap();
        backend.play(handle).unwrap();
        assert_eq!(
            backend.calls(),
            &[
                BackendCall::LoadSample {
                    handle,
                    format: SampleFormat::Wav,
                    len: 4
                },
                BackendCall::SetRate(handle, 1.0),
                BackendCall::Play(handle),
            ]
        );
    }

    #[test]
    fn test_release_invalidates_handle() {
        let mut backend = RecordingBackend::new();
        let handle = backend.load_sample(vec![], SampleFormat::Wav).unwrap();
        backend.release(handle).unwrap();
        assert!(!backend.is_live(handle));
        assert_eq!(backend.play(handle), Err(BackendError::UnknownHandle(handle.0)));
    }

    #[test]
    fn test_module_readiness_after_polls() {
        let mut backend = RecordingBackend::new();
        backend.module_polls = 2;
        let ticket = backend.load_module(vec![], Repeat::Forever).unwrap();
        assert_eq!(backend.poll_module(ticket), ModuleStatus::Loading);
        assert_eq!(backend.poll_module(ticket), ModuleStatus::Loading);
        assert!(matches!(backend.poll_module(ticket), ModuleStatus::Ready(_)));
    }
}
