//! Backend that produces no sound

use std::time::Duration;

use tracing::trace;

use super::{AudioBackend, BackendError, ModuleHandle, ModuleStatus, ModuleTicket, Repeat, SampleFormat, SampleHandle};

/// Accepts every call and only logs it
///
/// Handles are issued from a counter. Modules are ready on the first poll.
#[derive(Debug, Default)]
pub struct NullBackend {
    next_id: u32,
}

impl NullBackend {
    /// Create a silent backend
    pub fn new() -> Self {
        Self::default()
    }

    fn issue(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl AudioBackend for NullBackend {
    fn load_sample(&mut self, bytes: Vec<u8>, format: SampleFormat) -> Result<SampleHandle, BackendError> {
        let handle = SampleHandle(self.issue());
        trace!(%handle, ?format, len = bytes.len(), "load_sample");
        Ok(handle)
    }

    fn play(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        trace!(%handle, "play");
        Ok(())
    }

    fn pause(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        trace!(%handle, "pause");
        Ok(())
    }

    fn resume(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        trace!(%handle, "resume");
        Ok(())
    }

    fn stop(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        trace!(%handle, "stop");
        Ok(())
    }

    fn release(&mut self, handle: SampleHandle) -> Result<(), BackendError> {
        trace!(%handle, "release");
        Ok(())
    }

    fn set_volume(&mut self, handle: SampleHandle, volume: f32) -> Result<(), BackendError> {
        trace!(%handle, volume, "set_volume");
        Ok(())
    }

    fn set_pan(&mut self, handle: SampleHandle, pan: f32) -> Result<(), BackendError> {
        trace!(%handle, pan, "set_pan");
        Ok(())
    }

    fn set_rate(&mut self, handle: SampleHandle, rate: f32) -> Result<(), BackendError> {
        trace!(%handle, rate, "set_rate");
        Ok(())
    }

    fn set_loop(&mut self, handle: SampleHandle, looping: bool) -> Result<(), BackendError> {
        trace!(%handle, looping, "set_loop");
        Ok(())
    }

    fn fade(&mut self, handle: SampleHandle, from: f32, to: f32, duration: Duration) -> Result<(), BackendError> {
        trace!(%handle, from, to, ?duration, "fade");
        Ok(())
    }

    fn duration(&mut self, _handle: SampleHandle) -> Result<Option<f64>, BackendError> {
        Ok(None)
    }

    fn position(&mut self, _handle: SampleHandle) -> Result<f64, BackendError> {
        Ok(0.0)
    }

    fn seek(&mut self, handle: SampleHandle, secs: f64) -> Result<(), BackendError> {
        trace!(%handle, secs, "seek");
        Ok(())
    }

    fn load_module(&mut self, bytes: Vec<u8>, repeat: Repeat) -> Result<ModuleTicket, BackendError> {
        let ticket = ModuleTicket(self.issue());
        trace!(ticket = ticket.0, ?repeat, len = bytes.len(), "load_module");
        Ok(ticket)
    }

    fn poll_module(&mut self, ticket: ModuleTicket) -> ModuleStatus {
        ModuleStatus::Ready(ModuleHandle(ticket.0))
    }

    fn module_play(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        trace!(%handle, "module_play");
        Ok(())
    }

    fn module_pause(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        trace!(%handle, "module_pause");
        Ok(())
    }

    fn module_resume(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        trace!(%handle, "module_resume");
        Ok(())
    }

    fn module_stop(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        trace!(%handle, "module_stop");
        Ok(())
    }

    fn module_release(&mut self, handle: ModuleHandle) -> Result<(), BackendError> {
        trace!(%handle, "module_release");
        Ok(())
    }

    fn module_set_volume(&mut self, handle: ModuleHandle, volume: f32) -> Result<(), BackendError> {
        trace!(%handle, volume, "module_set_volume");
        Ok(())
    }

    fn module_total_orders(&mut self, _handle: ModuleHandle) -> Result<u16, BackendError> {
        Ok(0)
    }

    fn module_order_row(&mut self, _handle: ModuleHandle) -> Result<(u16, u16), BackendError> {
        Ok((0, 0))
    }

    fn module_set_order_row(&mut self, handle: ModuleHandle, order: u16, row: u16) -> Result<(), BackendError> {
        trace!(%handle, order, row, "module_set_order_row");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_distinct() {
        let mut backend = NullBackend::new();
        let a = backend.load_sample(vec![], SampleFormat::Wav).unwrap();
        let b = backend.load_sample(vec![], SampleFormat::Stream).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_module_ready_immediately() {
        let mut backend = NullBackend::new();
        let ticket = backend.load_module(vec![1, 2, 3], Repeat::Once).unwrap();
        assert!(matches!(backend.poll_module(ticket), ModuleStatus::Ready(_)));
    }
}
