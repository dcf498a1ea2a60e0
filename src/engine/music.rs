//! Music channel operations
//!
//! Streams answer immediately. Tracker modules go through a two-phase
//! lifecycle: while the backend prepares a module, control operations are
//! queued and queries report [`Reply::Pending`]. [`Engine::poll_modules`]
//! promotes ready modules and replays the queue in arrival order.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{Engine, EngineError};
use crate::backend::{AudioBackend, ModuleHandle, ModuleStatus, Repeat, SampleFormat, SampleHandle};
use crate::channels::{ModuleOp, MusicChannel, SlotId, StreamChannel, TrackerChannel, TrackerState};
use crate::mixer::sentinel::{resolve, resolve_change, Attribute, Pan, Volume};
use crate::mixer::{effective_volume, pan_ratio, VolumeKind};

/// Whether a control operation ran now or was queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Sent to the backend
    Now,
    /// Queued until the module is ready
    Deferred,
}

/// Music query kinds that may have to wait for a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Length (bytes or total orders)
    Length,
    /// Position (bytes or order/row)
    Position,
}

/// A query parked until its tracker module is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingQuery {
    /// Queried music slot
    pub slot: SlotId,
    /// What was asked
    pub kind: QueryKind,
}

/// Answer to a music query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Response bytes for the guest
    Ready(Vec<u8>),
    /// Module still loading
    Pending(PendingQuery),
}

/// Outcome of re-checking a parked query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Module still loading
    Waiting,
    /// Query finished; `None` when it ended in an error
    Complete(Option<Vec<u8>>),
}

impl<B: AudioBackend> Engine<B> {
    /// Load a compressed stream into a music slot, replacing any previous occupant
    pub fn load_stream(&mut self, slot: SlotId, bytes: Vec<u8>, looping: bool) -> Result<SampleHandle, EngineError> {
        let byte_length = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        let handle = self.backend.load_sample(bytes, SampleFormat::Stream)?;
        if let Some(previous) = self.music.remove(slot) {
            self.release_music_entry(slot, previous);
        }
        self.music
            .insert(slot, MusicChannel::Stream(StreamChannel::new(handle, byte_length)));
        if let Err(err) = self.backend.set_loop(handle, looping) {
            warn!(slot, %err, "set_loop failed on new stream");
        }
        self.apply_music_volume(slot);
        debug!(slot, %handle, byte_length, looping, "stream loaded");
        Ok(handle)
    }

    /// Start preparing a tracker module in a music slot
    ///
    /// The channel stays `Loading` until [`Engine::poll_modules`] sees the
    /// backend report it ready.
    pub fn load_tracker(&mut self, slot: SlotId, bytes: Vec<u8>, repeat: Repeat) -> Result<(), EngineError> {
        let ticket = self.backend.load_module(bytes, repeat)?;
        if let Some(previous) = self.music.remove(slot) {
            self.release_music_entry(slot, previous);
        }
        self.music
            .insert(slot, MusicChannel::Tracker(TrackerChannel::loading(ticket)));
        debug!(slot, ticket = ticket.0, ?repeat, "module loading");
        Ok(())
    }

    /// Start music playback
    pub fn play_music(&mut self, slot: SlotId) -> Result<Applied, EngineError> {
        self.music_op(slot, ModuleOp::Play)
    }

    /// Pause music playback
    pub fn pause_music(&mut self, slot: SlotId) -> Result<Applied, EngineError> {
        self.music_op(slot, ModuleOp::Pause)
    }

    /// Resume paused music
    pub fn resume_music(&mut self, slot: SlotId) -> Result<Applied, EngineError> {
        self.music_op(slot, ModuleOp::Resume)
    }

    /// Stop music playback
    pub fn stop_music(&mut self, slot: SlotId) -> Result<Applied, EngineError> {
        self.music_op(slot, ModuleOp::Stop)
    }

    /// Stop, release and remove a music channel
    pub fn delete_music(&mut self, slot: SlotId) -> Result<(), EngineError> {
        let channel = self.music.remove(slot).ok_or(EngineError::MusicNotFound(slot))?;
        self.release_music_entry(slot, channel);
        Ok(())
    }

    /// Apply pan and volume words to a music channel
    ///
    /// Pan only applies to streams; tracker modules have no pan control.
    pub fn set_music_attributes(&mut self, slot: SlotId, pan: i16, volume: u16) -> Result<(), EngineError> {
        let channel = self.music.get_mut(slot).ok_or(EngineError::MusicNotFound(slot))?;
        match channel {
            MusicChannel::Stream(stream) => {
                if let Some(pan) = resolve_change::<Pan>(pan, stream.pan) {
                    stream.pan = pan;
                    let handle = stream.handle;
                    self.backend.set_pan(handle, pan_ratio(f64::from(pan)))?;
                }
            }
            MusicChannel::Tracker(_) => {
                if pan != Pan::CURRENT {
                    debug!(slot, pan, "pan ignored for tracker module");
                }
            }
        }
        if volume != Volume::CURRENT {
            let channel = self.music.get_mut(slot).ok_or(EngineError::MusicNotFound(slot))?;
            let volume = resolve::<Volume>(volume, channel.volume());
            channel.set_volume(volume);
            self.apply_music_volume(slot);
        }
        Ok(())
    }

    /// Assign a literal volume (0-100) to a music channel and re-apply it
    pub fn set_music_volume(&mut self, slot: SlotId, volume: u16) -> Result<(), EngineError> {
        let channel = self.music.get_mut(slot).ok_or(EngineError::MusicNotFound(slot))?;
        channel.set_volume(volume);
        self.apply_music_volume(slot);
        Ok(())
    }

    /// Assign a literal volume to every music channel of one kind
    pub fn set_music_volume_by_kind(&mut self, tracker: bool, volume: u16) {
        for slot in self.music.slots() {
            let matches = matches!(
                (self.music.get(slot), tracker),
                (Some(MusicChannel::Tracker(_)), true) | (Some(MusicChannel::Stream(_)), false)
            );
            if matches {
                if let Some(channel) = self.music.get_mut(slot) {
                    channel.set_volume(volume);
                }
                self.apply_music_volume(slot);
            }
        }
    }

    /// Fade a stream between two logical volumes
    ///
    /// Returns `false` for tracker channels, which do not fade. The stored
    /// volume becomes `to`.
    pub fn fade_music(&mut self, slot: SlotId, from: u16, to: u16, duration: Duration) -> Result<bool, EngineError> {
        let channel = self.music.get_mut(slot).ok_or(EngineError::MusicNotFound(slot))?;
        let MusicChannel::Stream(stream) = channel else {
            return Ok(false);
        };
        stream.volume = to;
        let handle = stream.handle;
        let from = effective_volume(f64::from(from), &self.mixer, VolumeKind::Music);
        let to = effective_volume(f64::from(to), &self.mixer, VolumeKind::Music);
        self.backend.fade(handle, from, to, duration)?;
        Ok(true)
    }

    /// Music length: stream byte length, or tracker total orders
    ///
    /// Both answers are 4 bytes little-endian; the tracker form is the order
    /// count followed by a zero word.
    pub fn music_length(&mut self, slot: SlotId) -> Result<Reply, EngineError> {
        let channel = self.music.get(slot).ok_or(EngineError::MusicNotFound(slot))?;
        match channel {
            MusicChannel::Stream(stream) => Ok(Reply::Ready(stream.byte_length.to_le_bytes().to_vec())),
            MusicChannel::Tracker(tracker) => match tracker.state {
                TrackerState::Ready(handle) => {
                    let orders = self.backend.module_total_orders(handle)?;
                    Ok(Reply::Ready(order_row_bytes(orders, 0)))
                }
                TrackerState::Loading { .. } => Ok(Reply::Pending(PendingQuery {
                    slot,
                    kind: QueryKind::Length,
                })),
                TrackerState::Failed => Err(EngineError::ModuleFailed(slot)),
            },
        }
    }

    /// Music position: stream byte offset, or tracker order/row
    pub fn music_position(&mut self, slot: SlotId) -> Result<Reply, EngineError> {
        let channel = self.music.get(slot).ok_or(EngineError::MusicNotFound(slot))?;
        match channel {
            MusicChannel::Stream(stream) => {
                let stream = *stream;
                if stream.byte_length == 0 {
                    return Err(EngineError::EmptyStream(slot));
                }
                let duration = match self.backend.duration(stream.handle)? {
                    Some(duration) if duration > 0.0 => duration,
                    _ => return Err(EngineError::UnknownDuration(slot)),
                };
                let position = self.backend.position(stream.handle)?;
                let offset = (position / duration * f64::from(stream.byte_length)).floor();
                let offset = offset.clamp(0.0, f64::from(u32::MAX)) as u32;
                Ok(Reply::Ready(offset.to_le_bytes().to_vec()))
            }
            MusicChannel::Tracker(tracker) => match tracker.state {
                TrackerState::Ready(handle) => {
                    let (order, row) = self.backend.module_order_row(handle)?;
                    Ok(Reply::Ready(order_row_bytes(order, row)))
                }
                TrackerState::Loading { .. } => Ok(Reply::Pending(PendingQuery {
                    slot,
                    kind: QueryKind::Position,
                })),
                TrackerState::Failed => Err(EngineError::ModuleFailed(slot)),
            },
        }
    }

    /// Move the music position
    ///
    /// For streams `position` is a byte offset mapped onto the duration. For
    /// trackers the low word is the order and the high word the row.
    pub fn set_music_position(&mut self, slot: SlotId, position: u32) -> Result<Applied, EngineError> {
        let stream = match self.music.get(slot) {
            Some(MusicChannel::Stream(stream)) => Some(*stream),
            Some(MusicChannel::Tracker(_)) => None,
            None => return Err(EngineError::MusicNotFound(slot)),
        };
        match stream {
            Some(stream) => {
                if stream.byte_length == 0 {
                    return Err(EngineError::EmptyStream(slot));
                }
                if position > stream.byte_length {
                    return Err(EngineError::PositionOutOfRange {
                        slot,
                        position,
                        byte_length: stream.byte_length,
                    });
                }
                let duration = self
                    .backend
                    .duration(stream.handle)?
                    .ok_or(EngineError::UnknownDuration(slot))?;
                let secs = f64::from(position) / f64::from(stream.byte_length) * duration;
                self.backend.seek(stream.handle, secs)?;
                Ok(Applied::Now)
            }
            None => {
                let order = (position & 0xFFFF) as u16;
                let row = (position >> 16) as u16;
                self.music_op(slot, ModuleOp::SetOrderRow { order, row })
            }
        }
    }

    /// Promote tracker channels whose module finished preparing
    ///
    /// Entries that failed on an earlier pass are dropped first. Ready
    /// modules get their effective volume and then every deferred operation
    /// in arrival order. Returns the number of promoted channels.
    pub fn poll_modules(&mut self) -> usize {
        self.poll_orphans();

        let failed: Vec<_> = self
            .music
            .iter()
            .filter(|(_, channel)| {
                matches!(
                    channel,
                    MusicChannel::Tracker(TrackerChannel {
                        state: TrackerState::Failed,
                        ..
                    })
                )
            })
            .map(|(slot, _)| *slot)
            .collect();
        for slot in failed {
            self.music.remove(slot);
            debug!(slot, "dropped failed module");
        }

        let mut promoted = 0;
        for slot in self.music.slots() {
            if self.promote(slot) == Some(true) {
                promoted += 1;
            }
        }
        promoted
    }

    /// Re-check a parked query
    pub fn resolve(&mut self, query: &PendingQuery) -> Resolution {
        self.promote(query.slot);
        match self.music.get(query.slot) {
            Some(MusicChannel::Tracker(TrackerChannel {
                state: TrackerState::Loading { .. },
                ..
            })) => return Resolution::Waiting,
            None => {
                error!(slot = query.slot, "music slot vanished before query resolved");
                return Resolution::Complete(None);
            }
            Some(_) => {}
        }
        let reply = match query.kind {
            QueryKind::Length => self.music_length(query.slot),
            QueryKind::Position => self.music_position(query.slot),
        };
        match reply {
            Ok(Reply::Ready(bytes)) => Resolution::Complete(Some(bytes)),
            Ok(Reply::Pending(_)) => Resolution::Waiting,
            Err(err) => {
                error!(slot = query.slot, %err, "deferred music query failed");
                Resolution::Complete(None)
            }
        }
    }

    // Some(true) when the slot was promoted to Ready by this call
    fn promote(&mut self, slot: SlotId) -> Option<bool> {
        let Some(MusicChannel::Tracker(tracker)) = self.music.get_mut(slot) else {
            return None;
        };
        let TrackerState::Loading { ticket, .. } = tracker.state else {
            return Some(false);
        };
        match self.backend.poll_module(ticket) {
            ModuleStatus::Loading => Some(false),
            ModuleStatus::Failed(err) => {
                error!(slot, %err, "module failed to load");
                tracker.state = TrackerState::Failed;
                Some(false)
            }
            ModuleStatus::Ready(handle) => {
                let previous = std::mem::replace(&mut tracker.state, TrackerState::Ready(handle));
                let deferred = match previous {
                    TrackerState::Loading { deferred, .. } => deferred,
                    TrackerState::Ready(_) | TrackerState::Failed => Vec::new(),
                };
                info!(slot, %handle, deferred = deferred.len(), "module ready");
                self.apply_music_volume(slot);
                for op in deferred {
                    if let Err(err) = self.apply_module_op(handle, op) {
                        error!(slot, ?op, %err, "deferred module operation failed");
                    }
                }
                Some(true)
            }
        }
    }

    fn poll_orphans(&mut self) {
        let orphaned = std::mem::take(&mut self.orphaned);
        for ticket in orphaned {
            match self.backend.poll_module(ticket) {
                ModuleStatus::Loading => self.orphaned.push(ticket),
                ModuleStatus::Ready(handle) => {
                    if let Err(err) = self.backend.module_release(handle) {
                        warn!(%handle, %err, "releasing replaced module failed");
                    }
                }
                ModuleStatus::Failed(_) => {}
            }
        }
    }

    fn music_op(&mut self, slot: SlotId, op: ModuleOp) -> Result<Applied, EngineError> {
        let channel = self.music.get_mut(slot).ok_or(EngineError::MusicNotFound(slot))?;
        match channel {
            MusicChannel::Stream(stream) => {
                let handle = stream.handle;
                match op {
                    ModuleOp::Play => self.backend.play(handle)?,
                    ModuleOp::Pause => self.backend.pause(handle)?,
                    ModuleOp::Resume => self.backend.resume(handle)?,
                    ModuleOp::Stop => self.backend.stop(handle)?,
                    ModuleOp::SetOrderRow { .. } => {}
                }
                Ok(Applied::Now)
            }
            MusicChannel::Tracker(tracker) => match &mut tracker.state {
                TrackerState::Loading { deferred, .. } => {
                    deferred.push(op);
                    Ok(Applied::Deferred)
                }
                TrackerState::Ready(handle) => {
                    let handle = *handle;
                    self.apply_module_op(handle, op)?;
                    Ok(Applied::Now)
                }
                TrackerState::Failed => Err(EngineError::ModuleFailed(slot)),
            },
        }
    }

    fn apply_module_op(&mut self, handle: ModuleHandle, op: ModuleOp) -> Result<(), EngineError> {
        match op {
            ModuleOp::Play => self.backend.module_play(handle)?,
            ModuleOp::Pause => self.backend.module_pause(handle)?,
            ModuleOp::Resume => self.backend.module_resume(handle)?,
            ModuleOp::Stop => self.backend.module_stop(handle)?,
            ModuleOp::SetOrderRow { order, row } => self.backend.module_set_order_row(handle, order, row)?,
        }
        Ok(())
    }
}

fn order_row_bytes(order: u16, row: u16) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(4);
    bytes.extend_from_slice(&order.to_le_bytes());
    bytes.extend_from_slice(&row.to_le_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};

    fn engine() -> Engine<RecordingBackend> {
        Engine::new(RecordingBackend::new())
    }

    fn tracker_handle(engine: &Engine<RecordingBackend>, slot: SlotId) -> ModuleHandle {
        match engine.music().get(slot) {
            Some(MusicChannel::Tracker(tracker)) => tracker.handle().expect("module ready"),
            other => panic!("expected ready tracker, got {other:?}"),
        }
    }

    #[test]
    fn test_stream_load_applies_loop_and_volume() {
        let mut engine = engine();
        let handle = engine.load_stream(1, vec![0; 1000], true).unwrap();
        let calls = engine.backend().calls();
        assert_eq!(calls[1], BackendCall::SetLoop(handle, true));
        assert_eq!(calls[2], BackendCall::SetVolume(handle, 0.5));
    }

    #[test]
    fn test_stream_length_is_byte_length() {
        let mut engine = engine();
        engine.load_stream(1, vec![0; 1000], false).unwrap();
        assert_eq!(engine.music_length(1).unwrap(), Reply::Ready(1000u32.to_le_bytes().to_vec()));
    }

    #[test]
    fn test_stream_position_maps_seconds_to_bytes() {
        let mut engine = engine();
        let handle = engine.load_stream(1, vec![0; 1000], false).unwrap();
        engine.backend_mut().set_duration(handle, 8.0);
        engine.backend_mut().set_position(handle, 3.0);
        assert_eq!(engine.music_position(1).unwrap(), Reply::Ready(375u32.to_le_bytes().to_vec()));
    }

    #[test]
    fn test_stream_position_needs_duration() {
        let mut engine = engine();
        engine.load_stream(1, vec![0; 1000], false).unwrap();
        assert_eq!(engine.music_position(1), Err(EngineError::UnknownDuration(1)));
    }

    #[test]
    fn test_stream_seek_checks_range() {
        let mut engine = engine();
        let handle = engine.load_stream(2, vec![0; 100], false).unwrap();
        engine.backend_mut().set_duration(handle, 10.0);
        assert!(matches!(
            engine.set_music_position(2, 101),
            Err(EngineError::PositionOutOfRange { position: 101, .. })
        ));
        engine.backend_mut().take_calls();
        engine.set_music_position(2, 25).unwrap();
        assert_eq!(engine.backend().calls(), &[BackendCall::Seek(handle, 2.5)]);
    }

    #[test]
    fn test_empty_stream_position_is_error() {
        let mut engine = engine();
        engine.load_stream(2, Vec::new(), false).unwrap();
        assert_eq!(engine.set_music_position(2, 0), Err(EngineError::EmptyStream(2)));
        assert_eq!(engine.music_position(2), Err(EngineError::EmptyStream(2)));
    }

    #[test]
    fn test_tracker_ops_deferred_until_ready() {
        let mut engine = engine();
        engine.backend_mut().module_polls = 1;
        engine.load_tracker(0, vec![0; 64], Repeat::Forever).unwrap();

        assert_eq!(engine.set_music_position(0, 0x0003_0002).unwrap(), Applied::Deferred);
        assert_eq!(engine.play_music(0).unwrap(), Applied::Deferred);
        engine.backend_mut().take_calls();

        assert_eq!(engine.poll_modules(), 0);
        assert!(engine.backend().calls().is_empty());
        assert_eq!(engine.poll_modules(), 1);

        let handle = tracker_handle(&engine, 0);
        assert_eq!(
            engine.backend().calls(),
            &[
                BackendCall::ModuleSetVolume(handle, 0.5),
                BackendCall::ModuleSetOrderRow(handle, 2, 3),
                BackendCall::ModulePlay(handle),
            ]
        );
        assert_eq!(engine.play_music(0).unwrap(), Applied::Now);
    }

    #[test]
    fn test_tracker_query_pending_then_resolved() {
        let mut engine = engine();
        engine.backend_mut().module_polls = 2;
        engine.backend_mut().default_total_orders = 12;
        engine.load_tracker(4, vec![0; 64], Repeat::Once).unwrap();

        let Reply::Pending(query) = engine.music_length(4).unwrap() else {
            panic!("expected pending reply");
        };
        assert_eq!(engine.resolve(&query), Resolution::Waiting);
        assert_eq!(engine.resolve(&query), Resolution::Waiting);
        assert_eq!(engine.resolve(&query), Resolution::Complete(Some(vec![12, 0, 0, 0])));
    }

    #[test]
    fn test_failed_module_is_dropped() {
        let mut engine = engine();
        engine.backend_mut().fail_module_preparation = true;
        engine.load_tracker(4, vec![0; 64], Repeat::Once).unwrap();
        engine.poll_modules();
        assert_eq!(engine.play_music(4), Err(EngineError::ModuleFailed(4)));
        engine.poll_modules();
        assert!(engine.music().get(4).is_none());
    }

    #[test]
    fn test_replacing_loading_module_releases_it_later() {
        let mut engine = engine();
        engine.backend_mut().module_polls = 1;
        engine.load_tracker(0, vec![1], Repeat::Once).unwrap();
        engine.load_stream(0, vec![2; 10], false).unwrap();
        engine.backend_mut().take_calls();

        engine.poll_modules();
        engine.poll_modules();
        assert!(matches!(engine.backend().calls(), [BackendCall::ModuleRelease(_)]));
    }

    #[test]
    fn test_tracker_pan_is_ignored() {
        let mut engine = engine();
        engine.load_tracker(0, vec![1], Repeat::Once).unwrap();
        engine.poll_modules();
        let handle = tracker_handle(&engine, 0);
        engine.backend_mut().take_calls();

        engine.set_music_attributes(0, 40, 0xFFFE).unwrap();
        assert_eq!(engine.backend().calls(), &[BackendCall::ModuleSetVolume(handle, 0.5)]);
    }

    #[test]
    fn test_fade_stream_only() {
        let mut engine = engine();
        let handle = engine.load_stream(1, vec![0; 10], false).unwrap();
        engine.load_tracker(0, vec![1], Repeat::Once).unwrap();
        engine.backend_mut().take_calls();

        assert!(engine.fade_music(1, 100, 0, Duration::from_millis(500)).unwrap());
        assert!(!engine.fade_music(0, 100, 0, Duration::from_millis(500)).unwrap());
        assert_eq!(
            engine.backend().calls(),
            &[BackendCall::Fade {
                handle,
                from: 1.0,
                to: 0.0,
                duration: Duration::from_millis(500)
            }]
        );
        assert_eq!(engine.music().get(1).map(MusicChannel::volume), Some(0));
    }

    #[test]
    fn test_missing_music_slot() {
        let mut engine = engine();
        assert_eq!(engine.music_length(3), Err(EngineError::MusicNotFound(3)));
        assert_eq!(engine.play_music(3), Err(EngineError::MusicNotFound(3)));
        assert!(engine.backend().calls().is_empty());
    }
}
