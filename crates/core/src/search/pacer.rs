use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

/// Suspends the search between cycles.
#[async_trait]
pub trait CyclePacer: Send + Sync {
    async fn wait(&self, interval: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioPacer;

#[async_trait]
impl CyclePacer for TokioPacer {
    async fn wait(&self, interval: Duration) {
        tokio::time::sleep(interval).await;
    }
}

/// Returns immediately and remembers every requested wait.
#[derive(Clone, Debug, Default)]
pub struct RecordingPacer {
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingPacer {
    pub fn waits(&self) -> Vec<Duration> {
        match self.waits.lock() {
            Ok(waits) => waits.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl CyclePacer for RecordingPacer {
    async fn wait(&self, interval: Duration) {
        match self.waits.lock() {
            Ok(mut waits) => waits.push(interval),
            Err(poisoned) => poisoned.into_inner().push(interval),
        }
    }
}
