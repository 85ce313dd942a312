//! Background refresh of hot pairs.

use parking_lot::RwLock;
use quotedesk_common::PairKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::service::PriceService;

/// Prewarmer configuration.
#[derive(Debug, Clone)]
pub struct PrewarmConfig {
    /// Time between refresh passes.
    pub refresh_interval: Duration,
    /// Pause between two pairs within a pass.
    pub pause: Duration,
    /// Pairs registered at startup.
    pub pairs: Vec<PairKey>,
}

impl Default for PrewarmConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            pause: Duration::from_millis(120),
            pairs: Vec::new(),
        }
    }
}

impl PrewarmConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.refresh_interval.is_zero() {
            return Err("Refresh interval must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
}

/// Keeps a set of pairs warm in the service's cache.
///
/// Pairs are refreshed one at a time, in registration order, so a pass
/// never bursts the providers.
#[derive(Clone)]
pub struct Prewarmer {
    service: PriceService,
    pairs: Arc<RwLock<Vec<PairKey>>>,
    refresh_interval: Duration,
    pause: Duration,
}

impl Prewarmer {
    pub fn new(service: PriceService, config: PrewarmConfig) -> Self {
        let prewarmer = Self {
            service,
            pairs: Arc::new(RwLock::new(Vec::new())),
            refresh_interval: config.refresh_interval,
            pause: config.pause,
        };
        prewarmer.prewarm_pairs(config.pairs);
        prewarmer
    }

    /// Register pairs to keep warm. Returns how many were new.
    pub fn prewarm_pairs(&self, pairs: impl IntoIterator<Item = PairKey>) -> usize {
        let mut warm = self.pairs.write();
        let mut added = 0;
        for pair in pairs {
            if !warm.contains(&pair) {
                debug!(pair = %pair, "Registered warm pair");
                warm.push(pair);
                added += 1;
            }
        }
        added
    }

    /// Currently registered pairs.
    pub fn pairs(&self) -> Vec<PairKey> {
        self.pairs.read().clone()
    }

    /// Refresh every registered pair once, fresh cache entries included.
    ///
    /// A pair that cannot be refreshed is logged and skipped.
    pub async fn refresh_once(&self) -> RefreshReport {
        let pairs = self.pairs();
        let mut report = RefreshReport::default();

        for (i, pair) in pairs.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            match self.service.refresh(pair).await {
                Ok(resolved) if !resolved.stale => report.refreshed += 1,
                Ok(_) => {
                    warn!(pair = %pair, "Refresh failed, only a stale quote is cached");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(pair = %pair, error = %e, "Refresh failed");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Refresh on every interval tick, the first one immediately, until
    /// `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.refresh_interval.as_secs(),
            pairs = self.pairs.read().len(),
            "Prewarmer started"
        );

        let mut timer = tokio::time::interval(self.refresh_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Prewarmer shutting down");
                        return;
                    }
                }
                report = async {
                    timer.tick().await;
                    self.refresh_once().await
                } => {
                    debug!(refreshed = report.refreshed, failed = report.failed, "Refresh pass complete");
                }
            }
        }
    }

    /// Run the loop on its own task.
    pub fn spawn(&self) -> PrewarmerHandle {
        let (shutdown, rx) = watch::channel(false);
        let prewarmer = self.clone();
        let task = tokio::spawn(async move { prewarmer.run(rx).await });

        PrewarmerHandle {
            shutdown,
            task,
            pairs: Arc::clone(&self.pairs),
        }
    }
}

/// Handle on a running prewarm loop.
pub struct PrewarmerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    pairs: Arc<RwLock<Vec<PairKey>>>,
}

impl PrewarmerHandle {
    /// Stop the loop, wait for it to exit and forget every warm pair.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Prewarmer task failed");
        }
        self.pairs.write().clear();
    }
}
