use crate::detection::EventClassifier;
use crate::monitor::error::MonitorResult;
use crate::monitor::sink::NotificationSink;
use crate::monitor::store::CursorStore;
use crate::types::MonitorConfig;
use crate::watcher::venue::{PassStats, VenueWatcher};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Outcome of one orchestration pass
#[derive(Debug, Default)]
pub struct PassSummary {
    pub succeeded: Vec<(String, PassStats)>,
    pub failed: Vec<(String, String)>,
}

impl PassSummary {
    pub fn notified(&self) -> usize {
        self.succeeded.iter().map(|(_, s)| s.notified).sum()
    }
}

/// Runs every venue watcher once per pass, isolating failures per venue
pub struct WatcherOrchestrator {
    watchers: Vec<VenueWatcher>,
    concurrent: bool,
}

impl WatcherOrchestrator {
    pub fn new(watchers: Vec<VenueWatcher>, concurrent: bool) -> Self {
        Self {
            watchers,
            concurrent,
        }
    }

    /// Build a watcher per configured venue. A venue whose filter cannot be
    /// derived is reported and left out; the others still run.
    pub fn build(
        config: &MonitorConfig,
        classifier: Arc<EventClassifier>,
        store: Arc<dyn CursorStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let mut watchers = Vec::with_capacity(config.venues.len());
        for venue in &config.venues {
            let name = venue.name.clone();
            match VenueWatcher::new(
                venue.clone(),
                config,
                classifier.clone(),
                store.clone(),
                sink.clone(),
            ) {
                Ok(watcher) => watchers.push(watcher),
                Err(e) => error!("❌ Skipping venue {}: {}", name, e),
            }
        }

        info!(
            "Watching {} of {} configured venues",
            watchers.len(),
            config.venues.len()
        );
        Self::new(watchers, config.concurrent_venues)
    }

    pub fn venue_names(&self) -> Vec<&str> {
        self.watchers.iter().map(|w| w.name()).collect()
    }

    /// Poll every venue once
    pub async fn run_once(&mut self) -> PassSummary {
        let results: Vec<(String, MonitorResult<PassStats>)> = if self.concurrent {
            join_all(self.watchers.iter_mut().map(|watcher| async move {
                let result = watcher.run().await;
                (watcher.name().to_string(), result)
            }))
            .await
        } else {
            let mut results = Vec::with_capacity(self.watchers.len());
            for watcher in &mut self.watchers {
                let result = watcher.run().await;
                results.push((watcher.name().to_string(), result));
            }
            results
        };

        let mut summary = PassSummary::default();
        for (name, result) in results {
            match result {
                Ok(stats) => summary.succeeded.push((name, stats)),
                Err(e) => {
                    error!(venue = %name, "Venue pass failed: {}", e);
                    summary.failed.push((name, e.to_string()));
                }
            }
        }
        summary
    }

    /// Run passes until cancelled, waiting `interval` after each pass finishes.
    /// Cancellation is observed between passes, never mid-page.
    pub async fn run(&mut self, interval: Duration, shutdown: CancellationToken) {
        info!(
            "Polling {} venues every {:?} after each pass",
            self.watchers.len(),
            interval
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let summary = self.run_once().await;
            info!(
                "Pass done: {} venues ok, {} failed, {} notified",
                summary.succeeded.len(),
                summary.failed.len(),
                summary.notified()
            );

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Watcher loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::cache::TransactionCache;
    use crate::monitor::error::MonitorError;
    use crate::monitor::retry::RetryPolicy;
    use crate::monitor::rpc::RpcGateway;
    use crate::monitor::store::MemoryStore;
    use crate::monitor::testing::{
        FakeLedger, POOL_PKG, RecordingSink, TRACKED, change, detail, sample_event,
        swap_event_type,
    };
    use crate::types::{EventId, VenueConfig};

    fn setup(venues: Vec<VenueConfig>) -> (Arc<FakeLedger>, Arc<RecordingSink>, WatcherOrchestrator) {
        setup_with(venues, RecordingSink::default(), false)
    }

    fn setup_with(
        venues: Vec<VenueConfig>,
        sink: RecordingSink,
        concurrent: bool,
    ) -> (Arc<FakeLedger>, Arc<RecordingSink>, WatcherOrchestrator) {
        let ledger = Arc::new(FakeLedger::default());
        let gateway = Arc::new(RpcGateway::new(ledger.clone(), RetryPolicy::default()));
        let classifier = Arc::new(EventClassifier::new(
            TRACKED,
            6,
            gateway,
            Arc::new(TransactionCache::new(16)),
        ));
        let sink = Arc::new(sink);
        let config = MonitorConfig {
            tracked_token: TRACKED.to_string(),
            concurrent_venues: concurrent,
            backfill: true,
            venues,
            ..MonitorConfig::default()
        };
        let orchestrator =
            WatcherOrchestrator::build(&config, classifier, Arc::new(MemoryStore::new()), sink.clone());
        (ledger, sink, orchestrator)
    }

    #[tokio::test]
    async fn test_invalid_venue_is_skipped() {
        let (_, _, orchestrator) = setup(vec![
            VenueConfig::event_type("broken", "SwapEvent"),
            VenueConfig::event_type("cetus", &format!("{}::pool::SwapEvent", POOL_PKG)),
        ]);
        assert_eq!(orchestrator.venue_names(), vec!["cetus"]);
    }

    #[tokio::test]
    async fn test_failing_venue_does_not_block_others() {
        let (ledger, sink, mut orchestrator) = setup(vec![
            VenueConfig::event_type("first", &format!("{}::pool::SwapEvent", POOL_PKG)),
            VenueConfig::event_type("second", &format!("{}::pool::SwapEvent", POOL_PKG)),
        ]);
        ledger.set_event_page(
            None,
            vec![sample_event("D1", "0", &swap_event_type())],
            Some(EventId::new("D1", "0")),
            false,
        );
        ledger.add_transaction(detail("D1", vec![change("0xb", TRACKED, "3")]));
        ledger.fail_next(MonitorError::Rpc {
            code: 500,
            message: "boom".to_string(),
        });

        let summary = orchestrator.run_once().await;

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "first");
        assert_eq!(summary.succeeded.len(), 1);
        assert_eq!(summary.notified(), 1);
        assert_eq!(sink.received()[0].venue, "second");
    }

    #[tokio::test]
    async fn test_concurrent_pass_runs_every_venue() {
        let (ledger, _, orchestrator) = setup(vec![
            VenueConfig::event_type("a", &format!("{}::pool::SwapEvent", POOL_PKG)),
            VenueConfig::event_type("b", &format!("{}::pool::SwapEvent", POOL_PKG)),
        ]);
        let mut orchestrator = WatcherOrchestrator::new(orchestrator.watchers, true);

        let summary = orchestrator.run_once().await;
        assert_eq!(summary.succeeded.len(), 2);
        assert_eq!(ledger.event_queries().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_venues_notify_shared_digest_once() {
        let (ledger, sink, mut orchestrator) = setup_with(
            vec![
                VenueConfig::event_type("router", &format!("{}::pool::SwapEvent", POOL_PKG)),
                VenueConfig::event_type("pool", &format!("{}::pool::SwapEvent", POOL_PKG)),
            ],
            RecordingSink::yielding(),
            true,
        );
        ledger.set_event_page(
            None,
            vec![
                sample_event("D1", "0", &swap_event_type()),
                sample_event("D1", "1", &swap_event_type()),
            ],
            Some(EventId::new("D1", "1")),
            false,
        );
        ledger.add_transaction(detail("D1", vec![change("0xbuyer", TRACKED, "1000000")]));

        let summary = orchestrator.run_once().await;

        assert_eq!(summary.succeeded.len(), 2);
        assert_eq!(summary.notified(), 1);
        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].tx_digest, "D1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_on_cancel() {
        let (ledger, _, mut orchestrator) = setup(vec![VenueConfig::event_type(
            "cetus",
            &format!("{}::pool::SwapEvent", POOL_PKG),
        )]);
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2_500)).await;
            trigger.cancel();
        });
        orchestrator.run(Duration::from_secs(1), shutdown).await;
        stopper.await.unwrap();

        // Passes at t=0, 1s and 2s; cancelled while waiting after the third
        assert_eq!(ledger.event_queries().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let (ledger, _, mut orchestrator) = setup(vec![VenueConfig::event_type(
            "cetus",
            &format!("{}::pool::SwapEvent", POOL_PKG),
        )]);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        orchestrator.run(Duration::from_secs(1), shutdown).await;
        assert!(ledger.event_queries().is_empty());
    }
}
