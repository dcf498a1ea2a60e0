//! Guest I/O and the polling loop
//!
//! [`PollingLoop`] owns the protocol adapter, the engine and the guest. Each
//! tick handles at most one guest command, so commands run strictly in
//! arrival order and at most one is ever in flight.

mod directory;
mod guest;
mod memory;

pub use directory::DirectoryGuest;
pub use guest::{ClipboardIo, GuestFiles, GuestIo, GuestIoError};
pub use memory::MemoryGuest;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::backend::AudioBackend;
use crate::engine::{Engine, PendingQuery, Resolution};
use crate::protocol::{Acquired, Dispatch, ProtocolAdapter};

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No command pending
    Idle,
    /// A command ran to completion
    Dispatched,
    /// A command is waiting on a tracker module
    Waiting,
    /// A waiting command finished
    Resolved,
    /// A command could not be read or decoded and was acknowledged
    Skipped,
    /// The loop has been stopped
    Stopped,
}

/// Handle that stops a [`PollingLoop`] from another thread
#[derive(Debug, Clone)]
pub struct StopHandle {
    live: Arc<AtomicBool>,
}

impl StopHandle {
    /// Stop the loop; later ticks do nothing
    pub fn stop(&self) {
        self.live.store(false, Ordering::Relaxed);
    }

    /// Whether stop has been requested
    pub fn is_stopped(&self) -> bool {
        !self.live.load(Ordering::Relaxed)
    }
}

/// Cooperative polling driver for one protocol adapter
pub struct PollingLoop<P, B, G>
where
    P: ProtocolAdapter<G>,
    B: AudioBackend,
{
    protocol: P,
    engine: Engine<B>,
    guest: G,
    interval: Duration,
    pending: Option<PendingQuery>,
    live: Arc<AtomicBool>,
}

impl<P, B, G> PollingLoop<P, B, G>
where
    P: ProtocolAdapter<G>,
    B: AudioBackend,
{
    /// Loop polling at the adapter's default interval
    pub fn new(protocol: P, engine: Engine<B>, guest: G) -> Self {
        let interval = protocol.default_interval();
        Self {
            protocol,
            engine,
            guest,
            interval,
            pending: None,
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Override the polling interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Polling interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Protocol adapter
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// Engine state
    pub fn engine(&self) -> &Engine<B> {
        &self.engine
    }

    /// Mutable engine state
    pub fn engine_mut(&mut self) -> &mut Engine<B> {
        &mut self.engine
    }

    /// Guest collaborator
    pub fn guest(&self) -> &G {
        &self.guest
    }

    /// Mutable guest collaborator
    pub fn guest_mut(&mut self) -> &mut G {
        &mut self.guest
    }

    /// Query currently waiting on a tracker module
    pub fn pending(&self) -> Option<PendingQuery> {
        self.pending
    }

    /// Whether the loop still accepts ticks
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    /// Handle for stopping the loop from elsewhere
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            live: Arc::clone(&self.live),
        }
    }

    /// Stop the loop
    pub fn stop(&self) {
        self.live.store(false, Ordering::Relaxed);
    }

    /// Handle at most one guest command
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_live() {
            return TickOutcome::Stopped;
        }

        if let Some(query) = self.pending {
            return match self.engine.resolve(&query) {
                Resolution::Waiting => TickOutcome::Waiting,
                Resolution::Complete(response) => {
                    self.pending = None;
                    debug!(slot = query.slot, kind = ?query.kind, "deferred query resolved");
                    self.finish(response);
                    TickOutcome::Resolved
                }
            };
        }

        let promoted = self.engine.poll_modules();
        if promoted > 0 {
            debug!(promoted, "modules ready");
        }

        let payload = match self.protocol.acquire(&mut self.guest) {
            Acquired::Idle => return TickOutcome::Idle,
            Acquired::Payload(payload) => payload,
            Acquired::Failed(err) => {
                error!(protocol = self.protocol.name(), %err, "unable to read command");
                self.protocol.complete(&mut self.guest);
                return TickOutcome::Skipped;
            }
        };

        let command = match self.protocol.decode(&payload) {
            Ok(command) => command,
            Err(err) => {
                error!(protocol = self.protocol.name(), signal = payload.signal, %err, "unable to decode command");
                self.protocol.complete(&mut self.guest);
                return TickOutcome::Skipped;
            }
        };
        debug!(protocol = self.protocol.name(), ?command, "dispatching");

        match self.protocol.dispatch(&mut self.engine, &mut self.guest, command) {
            Dispatch::Done(response) => {
                self.finish(response);
                TickOutcome::Dispatched
            }
            Dispatch::Pending(query) => {
                debug!(slot = query.slot, kind = ?query.kind, "query waiting on module");
                self.pending = Some(query);
                TickOutcome::Waiting
            }
        }
    }

    fn finish(&mut self, response: Option<Vec<u8>>) {
        if let Some(bytes) = response {
            if !self.is_live() {
                debug!(len = bytes.len(), "dropping response after stop");
            } else if let Err(err) = self.protocol.respond(&mut self.guest, &bytes) {
                error!(protocol = self.protocol.name(), %err, "unable to write response");
            }
        }
        self.protocol.complete(&mut self.guest);
    }

    /// Tick and sleep until `running` is cleared or the loop is stopped
    pub fn run(&mut self, running: &AtomicBool) {
        info!(protocol = self.protocol.name(), interval = ?self.interval, "polling");
        while running.load(Ordering::Relaxed) && self.is_live() {
            self.tick();
            std::thread::sleep(self.interval);
        }
        info!(protocol = self.protocol.name(), "polling stopped");
    }

    /// Stop the loop and release every loaded sound and music channel
    pub fn shutdown(&mut self) -> (usize, usize) {
        self.stop();
        self.pending = None;
        self.engine.release_all()
    }
}
