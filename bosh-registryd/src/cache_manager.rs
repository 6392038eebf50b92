use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use shared::types::Catalog;
use crate::catalog::hash;
use crate::catalog::projector::Projector;
use crate::error::Result;

struct Snapshot {
    catalog: Arc<Catalog>,
    built_at: Instant,
}

/// Time-windowed cache in front of the projector.
///
/// One lock covers both the freshness check and the rebuild, so callers
/// arriving while a rebuild is running wait for it and then share its result.
/// A failed rebuild leaves the old snapshot and its timestamp untouched; being
/// stale, it is never served again and the next caller rebuilds.
pub struct CatalogCache {
    projector: Projector,
    freshness: Duration,
    snapshot: Mutex<Option<Snapshot>>,
}

impl CatalogCache {
    pub fn new(projector: Projector, freshness: Duration) -> Self {
        Self {
            projector,
            freshness,
            snapshot: Mutex::new(None),
        }
    }

    pub async fn get_catalog(&self) -> Result<Arc<Catalog>> {
        let mut snapshot = self.snapshot.lock().await;

        if let Some(current) = snapshot.as_ref() {
            if current.built_at.elapsed() < self.freshness {
                return Ok(current.catalog.clone());
            }
        }

        let started = Instant::now();
        let catalog = Arc::new(self.projector.project().await?);
        tracing::debug!(
            "Rebuilt catalog with {} services in {:?}",
            catalog.len(),
            started.elapsed()
        );

        *snapshot = Some(Snapshot {
            catalog: catalog.clone(),
            built_at: Instant::now(),
        });
        Ok(catalog)
    }
}

/// Generic signal handed to subscribers. It carries no diff: receivers are
/// expected to query the catalog again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogChanged;

pub type ChangeHandler = Arc<dyn Fn(CatalogChanged) + Send + Sync>;

/// Polls the cache on a fixed interval and notifies every subscriber once per
/// observed change of the whole catalog.
pub struct Controller {
    cache: Arc<CatalogCache>,
    poll_interval: Duration,
    service_handlers: Vec<ChangeHandler>,
    instance_handlers: Vec<ChangeHandler>,
}

impl Controller {
    pub fn new(cache: Arc<CatalogCache>, poll_interval: Duration) -> Self {
        Self {
            cache,
            poll_interval,
            service_handlers: Vec::new(),
            instance_handlers: Vec::new(),
        }
    }

    pub fn append_service_handler(&mut self, handler: impl Fn(CatalogChanged) + Send + Sync + 'static) {
        self.service_handlers.push(Arc::new(handler));
    }

    pub fn append_instance_handler(&mut self, handler: impl Fn(CatalogChanged) + Send + Sync + 'static) {
        self.instance_handlers.push(Arc::new(handler));
    }

    /// Poll until cancelled. A poll already in progress runs to completion, but
    /// its result is dropped and no subscriber hears about it.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        // ticks missed during a slow rebuild must not queue up behind it
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut baseline: Option<Arc<Catalog>> = None;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!("Catalog poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll(&mut baseline, &cancel).await;
                }
            }
        }
    }

    /// Returns true when subscribers were notified
    async fn poll(&self, baseline: &mut Option<Arc<Catalog>>, cancel: &CancellationToken) -> bool {
        let catalog = match self.cache.get_catalog().await {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::warn!("Periodic director poll failed: {}", e);
                return false;
            }
        };

        if baseline.as_deref() == Some(&*catalog) {
            tracing::debug!("Catalog unchanged ({} services)", catalog.len());
            return false;
        }

        if cancel.is_cancelled() {
            tracing::debug!("Poller stopped during rebuild, dropping change");
            return false;
        }

        let digest = hash::compute_hash(&catalog).unwrap_or_else(|e| format!("unavailable: {e}"));
        tracing::info!("Catalog changed: {} services, digest {}", catalog.len(), digest);

        *baseline = Some(catalog);
        self.notify();
        true
    }

    fn notify(&self) {
        for handler in self.service_handlers.iter().chain(&self.instance_handlers) {
            let handler = handler.clone();
            tokio::spawn(async move { handler(CatalogChanged) });
        }
    }
}
