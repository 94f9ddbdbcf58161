//! Render completion correlation
//!
//! The renderer applies source updates asynchronously and reports each one as a
//! `(source id, data id)` pair. [`RenderCompletionTracker`] maps those reports back to the
//! route ids a submission was about. A newer data id completing for a source cancels every
//! older entry still pending for that source.
//!
//! The registry is plain owned state. [`CompletionTrackerHandle`] moves it into a single
//! tokio task so renderer events can be posted from any thread.

use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, oneshot};

/// A generation of data pushed to a renderer source
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderBatchId {
    pub source_id: String,
    /// Strictly increasing per source
    pub data_id: u64,
}

impl RenderBatchId {
    pub fn new(source_id: impl Into<String>, data_id: u64) -> Self {
        Self {
            source_id: source_id.into(),
            data_id,
        }
    }
}

/// Kind of a renderer load event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceDataType {
    /// The source finished applying new data
    Metadata,
    /// A tile of the source finished loading
    Tile,
}

/// Renderer event reporting that a source finished loading data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceDataLoaded {
    pub source_id: String,
    pub data_type: SourceDataType,
    /// Data id as reported by the renderer; non-numeric ids are ignored
    pub data_id: Option<String>,
}

impl SourceDataLoaded {
    pub fn metadata(batch: &RenderBatchId) -> Self {
        Self {
            source_id: batch.source_id.clone(),
            data_type: SourceDataType::Metadata,
            data_id: Some(batch.data_id.to_string()),
        }
    }
}

/// The batches a submission waits for and the routes each of them draws or removes
///
/// A single batch may both draw one route and remove another, as when a source switches
/// from one alternative to the next.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpectedRender {
    rendered: HashMap<RenderBatchId, String>,
    cleared: HashMap<RenderBatchId, String>,
}

impl ExpectedRender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect `route_id` to be drawn once `source_id` reports `data_id`
    pub fn add_rendered_route(&mut self, source_id: &str, data_id: u64, route_id: impl Into<String>) {
        self.rendered
            .insert(RenderBatchId::new(source_id, data_id), route_id.into());
    }

    /// Expect `route_id` to be removed once `source_id` reports `data_id`
    pub fn add_cleared_route(&mut self, source_id: &str, data_id: u64, route_id: impl Into<String>) {
        self.cleared
            .insert(RenderBatchId::new(source_id, data_id), route_id.into());
    }

    pub fn is_empty(&self) -> bool {
        self.rendered.is_empty() && self.cleared.is_empty()
    }

    /// Number of expected entries, rendered and cleared
    pub fn len(&self) -> usize {
        self.rendered.len() + self.cleared.len()
    }

    /// Batches this expectation waits for, each once
    pub fn batches(&self) -> impl Iterator<Item = &RenderBatchId> {
        self.rendered.keys().chain(
            self.cleared
                .keys()
                .filter(|batch| !self.rendered.contains_key(*batch)),
        )
    }
}

/// Outcome of a submission; every route id lands in exactly one set
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutesRenderedResult {
    pub successfully_rendered: HashSet<String>,
    pub rendering_cancelled: HashSet<String>,
    pub successfully_cleared: HashSet<String>,
    pub clearing_cancelled: HashSet<String>,
}

type Callback = Box<dyn FnOnce(RoutesRenderedResult) + Send>;

struct Waiter {
    rendered_ids: HashSet<String>,
    cleared_ids: HashSet<String>,
    pending_rendered: HashMap<RenderBatchId, String>,
    pending_cleared: HashMap<RenderBatchId, String>,
    rendering_cancelled: HashSet<String>,
    clearing_cancelled: HashSet<String>,
    callback: Callback,
}

impl Waiter {
    fn is_resolved(&self) -> bool {
        self.pending_rendered.is_empty() && self.pending_cleared.is_empty()
    }

    /// Cancel entries of older batches of the completed source, then resolve the exact match
    fn on_batch_completed(&mut self, completed: &RenderBatchId) {
        let is_superseded = |batch: &RenderBatchId| {
            batch.source_id == completed.source_id && batch.data_id < completed.data_id
        };
        self.pending_rendered.retain(|batch, route_id| {
            if is_superseded(batch) {
                tracing::debug!(%route_id, source_id = %batch.source_id, data_id = batch.data_id, "Render superseded by a newer batch");
                self.rendering_cancelled.insert(route_id.clone());
                return false;
            }
            batch != completed
        });
        self.pending_cleared.retain(|batch, route_id| {
            if is_superseded(batch) {
                tracing::debug!(%route_id, source_id = %batch.source_id, data_id = batch.data_id, "Clearing superseded by a newer batch");
                self.clearing_cancelled.insert(route_id.clone());
                return false;
            }
            batch != completed
        });
    }

    fn finish(self) {
        let Waiter {
            rendered_ids,
            cleared_ids,
            rendering_cancelled,
            clearing_cancelled,
            callback,
            ..
        } = self;
        let result = RoutesRenderedResult {
            successfully_rendered: rendered_ids
                .difference(&rendering_cancelled)
                .cloned()
                .collect(),
            successfully_cleared: cleared_ids.difference(&clearing_cancelled).cloned().collect(),
            rendering_cancelled,
            clearing_cancelled,
        };
        callback(result);
    }
}

/// Registry of submissions waiting for renderer completion
#[derive(Default)]
pub struct RenderCompletionTracker {
    waiters: Vec<Waiter>,
}

impl std::fmt::Debug for RenderCompletionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCompletionTracker")
            .field("pending_waiters", &self.waiters.len())
            .finish()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RenderCompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a submission
    ///
    /// # Arguments
    /// * `rendered_ids` - Route ids the submission draws
    /// * `cleared_ids` - Route ids the submission removes
    /// * `expected` - Batches to wait for; when empty `callback` runs right away
    /// * `callback` - Receives the outcome once every expected batch resolved
    pub fn submit(
        &mut self,
        rendered_ids: HashSet<String>,
        cleared_ids: HashSet<String>,
        expected: ExpectedRender,
        callback: impl FnOnce(RoutesRenderedResult) + Send + 'static,
    ) {
        let mut rendered_ids = rendered_ids;
        let mut cleared_ids = cleared_ids;
        rendered_ids.extend(expected.rendered.values().cloned());
        cleared_ids.extend(expected.cleared.values().cloned());

        let waiter = Waiter {
            rendered_ids,
            cleared_ids,
            pending_rendered: expected.rendered,
            pending_cleared: expected.cleared,
            rendering_cancelled: HashSet::new(),
            clearing_cancelled: HashSet::new(),
            callback: Box::new(callback),
        };
        if waiter.is_resolved() {
            waiter.finish();
        } else {
            self.waiters.push(waiter);
        }
    }

    /// Feed a renderer load event
    pub fn on_source_data_loaded(&mut self, event: &SourceDataLoaded) {
        if event.data_type != SourceDataType::Metadata {
            return;
        }
        let Some(data_id) = event.data_id.as_deref().and_then(|id| id.parse::<u64>().ok()) else {
            tracing::trace!(source_id = %event.source_id, data_id = ?event.data_id, "Ignoring load event without a numeric data id");
            return;
        };
        self.on_batch_completed(&RenderBatchId::new(event.source_id.clone(), data_id));
    }

    /// Resolve entries against a completed batch and finalize waiters with nothing pending
    pub fn on_batch_completed(&mut self, completed: &RenderBatchId) {
        for waiter in &mut self.waiters {
            waiter.on_batch_completed(completed);
        }

        let (finished, waiting): (Vec<Waiter>, Vec<Waiter>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(Waiter::is_resolved);
        self.waiters = waiting;
        for waiter in finished {
            waiter.finish();
        }
    }

    /// Number of submissions still waiting
    pub fn pending_waiters(&self) -> usize {
        self.waiters.len()
    }

    /// Whether load events are still of interest
    pub fn is_listening(&self) -> bool {
        !self.waiters.is_empty()
    }
}

enum Command {
    Submit {
        rendered_ids: HashSet<String>,
        cleared_ids: HashSet<String>,
        expected: ExpectedRender,
        reply: oneshot::Sender<RoutesRenderedResult>,
    },
    SourceDataLoaded(SourceDataLoaded),
    PendingWaiters(oneshot::Sender<usize>),
}

/// Cloneable handle to a [`RenderCompletionTracker`] owned by a tokio task
#[derive(Clone, Debug)]
pub struct CompletionTrackerHandle {
    sender: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Submit { expected, .. } => write!(f, "Submit({} batches)", expected.len()),
            Command::SourceDataLoaded(event) => write!(f, "SourceDataLoaded({event:?})"),
            Command::PendingWaiters(_) => write!(f, "PendingWaiters"),
        }
    }
}

impl CompletionTrackerHandle {
    /// Spawn the tracker task on the current tokio runtime
    ///
    /// The task ends once every handle is dropped.
    pub fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Command>();
        tokio::spawn(async move {
            let mut tracker = RenderCompletionTracker::new();
            while let Some(command) = receiver.recv().await {
                match command {
                    Command::Submit {
                        rendered_ids,
                        cleared_ids,
                        expected,
                        reply,
                    } => tracker.submit(rendered_ids, cleared_ids, expected, move |result| {
                        // the submitter may have stopped waiting
                        let _ = reply.send(result);
                    }),
                    Command::SourceDataLoaded(event) => tracker.on_source_data_loaded(&event),
                    Command::PendingWaiters(reply) => {
                        let _ = reply.send(tracker.pending_waiters());
                    }
                }
            }
            tracing::debug!(
                pending = tracker.pending_waiters(),
                "Render completion tracker stopped"
            );
        });
        Self { sender }
    }

    /// Submit a batch; the receiver resolves once the renderer reported every batch
    pub fn submit(
        &self,
        rendered_ids: HashSet<String>,
        cleared_ids: HashSet<String>,
        expected: ExpectedRender,
    ) -> oneshot::Receiver<RoutesRenderedResult> {
        let (reply, receiver) = oneshot::channel();
        let command = Command::Submit {
            rendered_ids,
            cleared_ids,
            expected,
            reply,
        };
        if self.sender.send(command).is_err() {
            tracing::warn!("Render completion tracker is gone, submission dropped");
        }
        receiver
    }

    /// Post a renderer load event; callable from any thread
    pub fn source_data_loaded(&self, event: SourceDataLoaded) {
        if self.sender.send(Command::SourceDataLoaded(event)).is_err() {
            tracing::debug!("Render completion tracker is gone, load event dropped");
        }
    }

    /// Number of submissions still waiting, `0` if the tracker stopped
    pub async fn pending_waiters(&self) -> usize {
        let (reply, receiver) = oneshot::channel();
        if self.sender.send(Command::PendingWaiters(reply)).is_err() {
            return 0;
        }
        receiver.await.unwrap_or(0)
    }
}
