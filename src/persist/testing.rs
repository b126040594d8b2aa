//! Gateways for tests: record every save and fail on demand.

use std::{
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    FlowError, Result,
    model::GraphDocument,
    persist::{MemStore, PersistenceGateway},
};

/// Wraps a `MemStore`, recording each attempted save.
#[derive(Default)]
pub(crate) struct RecordingGateway {
    pub(crate) store: MemStore,
    saved: Mutex<Vec<GraphDocument>>,
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordingGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every save takes `delay` before it completes.
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// The next `times` saves fail; `usize::MAX` fails forever.
    pub(crate) fn fail_next(
        &self,
        times: usize,
    ) {
        self.fail_next.store(times, Ordering::SeqCst);
    }

    /// Snapshots that were stored, in order.
    pub(crate) fn saved(&self) -> Vec<GraphDocument> {
        self.saved.lock().unwrap().clone()
    }

    pub(crate) fn saved_versions(&self) -> Vec<i64> {
        self.saved().iter().map(|d| d.updated_at()).collect()
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceGateway for RecordingGateway {
    async fn save(
        &self,
        document: &GraphDocument,
    ) -> Result<bool> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self.fail_next.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
            0 => None,
            usize::MAX => Some(usize::MAX),
            n => Some(n - 1),
        });
        if failing.is_ok() {
            return Err(FlowError::Persistence("gateway unavailable".into()));
        }

        self.saved.lock().unwrap().push(document.clone());
        self.store.save(document).await
    }

    async fn load(
        &self,
        id: &str,
    ) -> Result<GraphDocument> {
        self.store.load(id).await
    }

    async fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        self.store.exists(id).await
    }
}
