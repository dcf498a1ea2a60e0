//! XM module rendering
//!
//! Modules are rendered once, off the polling thread, into PCM plus a
//! timeline recording the frame at which each order/row starts. Position
//! queries and jumps are answered from that timeline.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use tracing::{debug, warn};
use xmrs::import::xm::xmmodule::XmModule;
use xmrsplayer::prelude::XmrsPlayer;

use super::voice::Pcm;
use crate::backend::{BackendError, ModuleTicket, Repeat};

/// Render sample rate
const RENDER_RATE: u32 = 44_100;

/// Upper bound on rendered length for modules that never end
const MAX_RENDER_SECS: u64 = 20 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RowStart {
    order: u16,
    row: u16,
    frame: u64,
}

/// Frame positions of every order/row reached while rendering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct Timeline {
    rows: Vec<RowStart>,
    total_orders: u16,
}

impl Timeline {
    fn record(&mut self, order: u16, row: u16, frame: u64) {
        let changed = self
            .rows
            .last()
            .map_or(true, |last| last.order != order || last.row != row);
        if changed {
            self.rows.push(RowStart { order, row, frame });
            self.total_orders = self.total_orders.max(order.saturating_add(1));
        }
    }

    /// Number of orders the module played through
    pub(super) fn total_orders(&self) -> u16 {
        self.total_orders
    }

    /// Order and row playing at `frame`
    pub(super) fn order_row_at(&self, frame: u64) -> (u16, u16) {
        let index = self.rows.partition_point(|start| start.frame <= frame);
        match index.checked_sub(1).and_then(|i| self.rows.get(i)) {
            Some(start) => (start.order, start.row),
            None => (0, 0),
        }
    }

    /// First frame of `order`/`row`, if it is ever reached
    pub(super) fn frame_of(&self, order: u16, row: u16) -> Option<u64> {
        self.rows
            .iter()
            .find(|start| start.order == order && start.row == row)
            .map(|start| start.frame)
    }
}

/// A finished render
pub(super) struct RenderedModule {
    pub pcm: Pcm,
    pub timeline: Timeline,
    pub repeat: Repeat,
}

/// Where a render stands
pub(super) enum RenderStatus {
    Rendering,
    Unknown,
    Failed(BackendError),
    Done(RenderedModule),
}

type RenderResult = (ModuleTicket, Result<RenderedModule, BackendError>);

/// Runs renders on worker threads and collects their results
pub(super) struct Renderer {
    tx: Sender<RenderResult>,
    rx: Receiver<RenderResult>,
    in_flight: HashSet<ModuleTicket>,
    finished: HashMap<ModuleTicket, Result<RenderedModule, BackendError>>,
}

impl Renderer {
    pub(super) fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            in_flight: HashSet::new(),
            finished: HashMap::new(),
        }
    }

    pub(super) fn submit(&mut self, ticket: ModuleTicket, bytes: Vec<u8>, repeat: Repeat) {
        self.in_flight.insert(ticket);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = render(&bytes, repeat);
            let _ = tx.send((ticket, result));
        });
    }

    pub(super) fn poll(&mut self, ticket: ModuleTicket) -> RenderStatus {
        while let Ok((done, result)) = self.rx.try_recv() {
            self.finished.insert(done, result);
        }
        match self.finished.remove(&ticket) {
            Some(result) => {
                self.in_flight.remove(&ticket);
                match result {
                    Ok(rendered) => RenderStatus::Done(rendered),
                    Err(err) => RenderStatus::Failed(err),
                }
            }
            None if self.in_flight.contains(&ticket) => RenderStatus::Rendering,
            None => RenderStatus::Unknown,
        }
    }
}

fn render(bytes: &[u8], repeat: Repeat) -> Result<RenderedModule, BackendError> {
    let xm = XmModule::load(bytes).map_err(|e| BackendError::Decode(format!("xm: {e:?}")))?;
    let module = xm.to_module();

    let mut player = XmrsPlayer::new(&module, RENDER_RATE as f32, 1024, false);
    player.set_max_loop_count(1);

    let limit = u64::from(RENDER_RATE) * MAX_RENDER_SECS;
    let mut samples = Vec::new();
    let mut timeline = Timeline::default();
    let mut frame = 0u64;
    while frame < limit {
        let order = u16::try_from(player.get_current_table_index()).unwrap_or(u16::MAX);
        let row = u16::try_from(player.get_current_row()).unwrap_or(u16::MAX);
        timeline.record(order, row, frame);
        let Some((left, right)) = player.sample(true) else {
            break;
        };
        samples.push(left);
        samples.push(right);
        frame += 1;
    }
    if frame >= limit {
        warn!(secs = MAX_RENDER_SECS, "module render truncated");
    }
    debug!(frames = frame, orders = timeline.total_orders(), "module rendered");

    Ok(RenderedModule {
        pcm: Pcm {
            samples,
            sample_rate: RENDER_RATE,
        },
        timeline,
        repeat,
    })
}
