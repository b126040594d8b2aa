use std::{
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use tokio::{
    runtime::Handle,
    sync::oneshot,
    task::JoinHandle,
    time::{Instant, sleep, sleep_until},
};
use tracing::{debug, trace, warn};

use crate::{
    FlowError, Result, ShareLock,
    common::{BroadcastQueue, Queue, Shutdown},
    config::AutosaveConfig,
    events::{EditorEvent, Event, Message, SaveEvent, SaveRetryEvent},
    model::{DocumentId, GraphDocument},
    persist::PersistenceGateway,
    utils,
};

/// Autosave status of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SaveStatus {
    /// nothing to save since the worker started
    #[default]
    Idle,
    /// changes are waiting for the debounce window
    Pending,
    /// a save is in flight
    Saving,
    /// the latest save was confirmed
    Saved,
    /// the latest save failed after every retry
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveState {
    pub status: SaveStatus,
    /// newest version the gateway confirmed; never moves backwards
    pub confirmed: i64,
    /// when the last confirmation arrived, in milliseconds
    pub last_saved_at: Option<i64>,
    pub last_error: Option<FlowError>,
}

enum SaveRequest {
    Snapshot(GraphDocument),
    Flush(GraphDocument, oneshot::Sender<Result<()>>),
}

/// Debounced, ordered saving of one document.
///
/// Snapshots are handed to a single background worker, so saves run one at a
/// time in version order and an older snapshot can never land after a newer
/// one.
pub struct Autosave {
    doc: DocumentId,
    queue: Arc<Queue<SaveRequest>>,
    state: ShareLock<SaveState>,
    shutdown: Arc<Shutdown>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Autosave {
    /// Spawn the worker for `doc`. `confirmed` is the version already stored.
    pub(crate) fn start(
        handle: &Handle,
        gateway: Arc<dyn PersistenceGateway>,
        config: AutosaveConfig,
        doc: DocumentId,
        confirmed: i64,
        events: Arc<BroadcastQueue<Event<Message>>>,
    ) -> Self {
        let queue = Queue::new();
        let state = Arc::new(RwLock::new(SaveState {
            confirmed,
            ..Default::default()
        }));
        let shutdown = Arc::new(Shutdown::new());

        let worker = Worker {
            doc: doc.clone(),
            gateway,
            config,
            queue: queue.clone(),
            state: state.clone(),
            events,
            shutdown: shutdown.clone(),
        };
        let join = handle.spawn(worker.run());

        Self {
            doc,
            queue,
            state,
            shutdown,
            worker: Mutex::new(Some(join)),
        }
    }

    /// Queue a snapshot for a debounced save. Never waits on the gateway.
    pub fn schedule(
        &self,
        snapshot: GraphDocument,
    ) -> Result<()> {
        self.ensure_running()?;
        {
            let mut state = self.state.write().unwrap();
            if snapshot.updated_at() <= state.confirmed {
                return Ok(());
            }
            if state.status != SaveStatus::Saving {
                state.status = SaveStatus::Pending;
            }
        }
        self.queue.send(SaveRequest::Snapshot(snapshot))
    }

    /// Save `snapshot` now, skipping the debounce window, and wait for the result.
    pub async fn flush(
        &self,
        snapshot: GraphDocument,
    ) -> Result<()> {
        self.ensure_running()?;
        let (tx, rx) = oneshot::channel();
        self.queue.send(SaveRequest::Flush(snapshot, tx))?;
        rx.await.map_err(|_| FlowError::Persistence(format!("autosave for {} stopped before the save completed", self.doc)))?
    }

    /// Stop the worker, dropping pending and in-flight saves, and wait for it to exit.
    pub async fn shutdown(&self) {
        debug!(doc = %self.doc, "autosave shutdown");
        self.shutdown.shutdown();
        let join = self.worker.lock().unwrap().take();
        if let Some(join) = join {
            let _ = join.await;
        }
    }

    pub fn state(&self) -> SaveState {
        self.state.read().unwrap().clone()
    }

    /// Whether `version` is newer than the last confirmed save.
    pub fn is_dirty(
        &self,
        version: i64,
    ) -> bool {
        version > self.state.read().unwrap().confirmed
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_terminated()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutdown.is_terminated() {
            return Err(FlowError::Persistence(format!("autosave for {} is stopped", self.doc)));
        }
        Ok(())
    }
}

struct Worker {
    doc: DocumentId,
    gateway: Arc<dyn PersistenceGateway>,
    config: AutosaveConfig,
    queue: Arc<Queue<SaveRequest>>,
    state: ShareLock<SaveState>,
    events: Arc<BroadcastQueue<Event<Message>>>,
    shutdown: Arc<Shutdown>,
}

/// Snapshot waiting for its debounce window.
struct Pending {
    snapshot: GraphDocument,
    first_at: Instant,
    last_at: Instant,
}

impl Worker {
    async fn run(self) {
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let max_delay = Duration::from_millis(self.config.max_delay_ms);
        let mut pending: Option<Pending> = None;

        loop {
            let deadline = pending.as_ref().map(|p| (p.last_at + debounce).min(p.first_at + max_delay));
            let idle = deadline.unwrap_or_else(|| Instant::now() + max_delay);

            tokio::select! {
                biased;
                _ = self.shutdown.wait() => break,
                request = self.queue.next_async() => match request {
                    Some(SaveRequest::Snapshot(snapshot)) => {
                        let now = Instant::now();
                        let version = snapshot.updated_at();
                        trace!("autosave::schedule({}, {})", self.doc, version);
                        match pending.as_mut() {
                            Some(p) => {
                                p.last_at = now;
                                if version >= p.snapshot.updated_at() {
                                    p.snapshot = snapshot;
                                }
                            }
                            None => {
                                pending = Some(Pending {
                                    snapshot,
                                    first_at: now,
                                    last_at: now,
                                });
                            }
                        }
                        self.emit(SaveEvent::Scheduled(version));
                    }
                    Some(SaveRequest::Flush(snapshot, reply)) => {
                        let version = snapshot.updated_at();
                        let snapshot = match pending.take() {
                            Some(p) if p.snapshot.updated_at() > version => p.snapshot,
                            _ => snapshot,
                        };
                        let Some(result) = self.save_cancellable(snapshot).await else {
                            break;
                        };
                        let _ = reply.send(result);
                    }
                    None => break,
                },
                _ = sleep_until(idle), if pending.is_some() => {
                    if let Some(p) = pending.take() {
                        if self.save_cancellable(p.snapshot).await.is_none() {
                            break;
                        }
                    }
                }
            }

            if pending.is_some() || self.queue.len() > 0 {
                let mut state = self.state.write().unwrap();
                if state.status != SaveStatus::Failed {
                    state.status = SaveStatus::Pending;
                }
            }
        }
        debug!(doc = %self.doc, "autosave worker stopped");
    }

    /// `None` when shutdown interrupted the save.
    async fn save_cancellable(
        &self,
        snapshot: GraphDocument,
    ) -> Option<Result<()>> {
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => {
                debug!(doc = %self.doc, version = snapshot.updated_at(), "save cancelled");
                None
            }
            result = self.save(&snapshot) => Some(result),
        }
    }

    async fn save(
        &self,
        snapshot: &GraphDocument,
    ) -> Result<()> {
        let version = snapshot.updated_at();
        {
            let mut state = self.state.write().unwrap();
            if version <= state.confirmed {
                return Ok(());
            }
            state.status = SaveStatus::Saving;
        }
        self.emit(SaveEvent::Saving(version));

        let mut attempt = 0;
        loop {
            match self.gateway.save(snapshot).await {
                Ok(stored) => {
                    {
                        let mut state = self.state.write().unwrap();
                        state.confirmed = state.confirmed.max(version);
                        state.status = SaveStatus::Saved;
                        state.last_saved_at = Some(utils::time::time_millis());
                        state.last_error = None;
                    }
                    self.emit(if stored { SaveEvent::Saved(version) } else { SaveEvent::Discarded(version) });
                    return Ok(());
                }
                Err(err) if attempt < self.config.retry_times => {
                    attempt += 1;
                    warn!(doc = %self.doc, version, attempt, error = %err, "save failed, retrying");
                    self.emit(SaveEvent::Retry(SaveRetryEvent {
                        version,
                        attempt,
                        error: err.to_string(),
                    }));
                    sleep(Duration::from_millis(self.config.retry_interval_ms)).await;
                }
                Err(err) => {
                    warn!(doc = %self.doc, version, error = %err, "save failed");
                    {
                        let mut state = self.state.write().unwrap();
                        state.status = SaveStatus::Failed;
                        state.last_error = Some(err.clone());
                    }
                    self.emit(SaveEvent::Failed(err.to_string()));
                    return Err(err);
                }
            }
        }
    }

    fn emit(
        &self,
        event: SaveEvent,
    ) {
        self.events.send(Event::new(&Message::document(&self.doc, EditorEvent::Save(event))));
    }
}
