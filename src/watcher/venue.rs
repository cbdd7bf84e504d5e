use crate::detection::EventClassifier;
use crate::detection::types::{BuyVerdict, Relevance};
use crate::monitor::error::MonitorResult;
use crate::monitor::sink::NotificationSink;
use crate::monitor::store::CursorStore;
use crate::types::{
    BuyNotification, CandidateEvent, Cursor, EventFilter, EventId, MonitorConfig, SortOrder,
    TransactionFilter, TransactionSummary, VenueConfig, buy_key, explorer_link,
    transaction_seen_key,
};
use crate::watcher::filter::{QueryPlan, build_query_plan};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

const VERDICT_MEMO_SIZE: usize = 1_000;

/// Counters for one polling pass of one venue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub pages: usize,
    pub candidates: usize,
    pub already_seen: usize,
    pub rejected: usize,
    pub buys: usize,
    pub notified: usize,
}

impl fmt::Display for PassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages, {} new, {} seen, {} rejected, {} buys, {} notified",
            self.pages, self.candidates, self.already_seen, self.rejected, self.buys, self.notified
        )
    }
}

/// Recently confirmed verdicts by digest, oldest evicted first
struct VerdictMemo {
    verdicts: HashMap<String, BuyVerdict>,
    order: VecDeque<String>,
    capacity: usize,
}

impl VerdictMemo {
    fn new(capacity: usize) -> Self {
        Self {
            verdicts: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, digest: &str) -> Option<&BuyVerdict> {
        self.verdicts.get(digest)
    }

    fn insert(&mut self, digest: &str, verdict: BuyVerdict) {
        if self.verdicts.insert(digest.to_string(), verdict).is_none() {
            self.order.push_back(digest.to_string());
        }

        if self.order.len() > self.capacity {
            let to_remove = (self.capacity / 10).max(1);
            for old in self.order.drain(..to_remove) {
                self.verdicts.remove(&old);
            }
        }
    }
}

/// Polls one venue: pages through its stream from the persisted cursor,
/// classifies each unseen item and notifies confirmed buys
pub struct VenueWatcher {
    venue: VenueConfig,
    plan: QueryPlan,
    max_pages: usize,
    page_size: usize,
    order: SortOrder,
    backfill: bool,
    symbol: String,
    explorer_tx_url: String,
    classifier: Arc<EventClassifier>,
    store: Arc<dyn CursorStore>,
    sink: Arc<dyn NotificationSink>,
    verdicts: VerdictMemo,
}

impl VenueWatcher {
    /// Fails when the venue's selector cannot be turned into a query
    pub fn new(
        venue: VenueConfig,
        config: &MonitorConfig,
        classifier: Arc<EventClassifier>,
        store: Arc<dyn CursorStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> MonitorResult<Self> {
        let plan = build_query_plan(&venue)?;
        let max_pages = if plan.is_broad() {
            config.broad_max_pages()
        } else {
            config.max_pages.max(1)
        };

        debug!(
            "Venue {} polls {:?} with up to {} pages of {}",
            venue.name, plan, max_pages, config.page_size
        );

        Ok(Self {
            venue,
            plan,
            max_pages,
            page_size: config.page_size,
            order: config.order,
            backfill: config.backfill,
            symbol: config.token_symbol.clone(),
            explorer_tx_url: config.explorer_tx_url.clone(),
            classifier,
            store,
            sink,
            verdicts: VerdictMemo::new(VERDICT_MEMO_SIZE),
        })
    }

    pub fn name(&self) -> &str {
        &self.venue.name
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// One bounded polling session. Any RPC or store error aborts the pass;
    /// items of the failing page stay unseen and are retried next pass.
    pub async fn run(&mut self) -> MonitorResult<PassStats> {
        let stats = match self.plan.clone() {
            QueryPlan::Events(filter) => self.poll_events(&filter).await?,
            QueryPlan::Transactions(filter) => self.poll_transactions(&filter).await?,
        };

        info!(venue = %self.venue.name, "Pass complete: {}", stats);
        Ok(stats)
    }

    async fn poll_events(&mut self, filter: &EventFilter) -> MonitorResult<PassStats> {
        let mut stats = PassStats::default();
        let mut cursor = match self.store.get(&self.venue.name).await? {
            Some(Cursor::Event(id)) => Some(id),
            Some(other) => {
                warn!(venue = %self.venue.name, "Ignoring non-event cursor {}", other);
                None
            }
            None => None,
        };
        if cursor.is_none() && self.starts_at_head() {
            cursor = self.seed_event_cursor(filter).await?;
        }

        while stats.pages < self.max_pages {
            let page = self
                .classifier
                .gateway()
                .query_events(filter, cursor.as_ref(), self.page_size, self.order)
                .await?;
            stats.pages += 1;

            debug!(
                venue = %self.venue.name,
                "Page {}: {} events, has_next={}",
                stats.pages,
                page.data.len(),
                page.has_next_page
            );

            for event in &page.data {
                self.process_event(event, &mut stats).await?;
            }

            let Some(next) = page.next_cursor else {
                break;
            };
            self.store
                .set(&self.venue.name, Some(Cursor::Event(next.clone())))
                .await?;
            cursor = Some(next);

            if !page.has_next_page {
                break;
            }
        }

        Ok(stats)
    }

    async fn poll_transactions(&mut self, filter: &TransactionFilter) -> MonitorResult<PassStats> {
        let mut stats = PassStats::default();
        let mut cursor = self
            .store
            .get(&self.venue.name)
            .await?
            .map(|c| c.as_transaction().to_string());
        if cursor.is_none() && self.starts_at_head() {
            cursor = self.seed_transaction_cursor(filter).await?;
        }

        while stats.pages < self.max_pages {
            let page = self
                .classifier
                .gateway()
                .query_transactions(filter, cursor.as_deref(), self.page_size, self.order)
                .await?;
            stats.pages += 1;

            debug!(
                venue = %self.venue.name,
                "Page {}: {} transactions, has_next={}",
                stats.pages,
                page.data.len(),
                page.has_next_page
            );

            for summary in &page.data {
                self.process_transaction(summary, &mut stats).await?;
            }

            let Some(next) = page.next_cursor else {
                break;
            };
            self.store
                .set(&self.venue.name, Some(Cursor::Transaction(next.clone())))
                .await?;
            cursor = Some(next);

            if !page.has_next_page {
                break;
            }
        }

        Ok(stats)
    }

    /// A venue without a cursor skips its history unless backfilling.
    /// Descending reads already begin at the newest item.
    fn starts_at_head(&self) -> bool {
        !self.backfill && !self.order.is_descending()
    }

    /// Persist the newest event as the cursor so the first ascending page
    /// holds only what arrives after startup
    async fn seed_event_cursor(&self, filter: &EventFilter) -> MonitorResult<Option<EventId>> {
        let page = self
            .classifier
            .gateway()
            .query_events(filter, None, 1, SortOrder::Descending)
            .await?;

        let Some(head) = page.data.first().map(|e| e.id.clone()).or(page.next_cursor) else {
            debug!(venue = %self.venue.name, "No events yet, starting from the beginning");
            return Ok(None);
        };

        self.store
            .set(&self.venue.name, Some(Cursor::Event(head.clone())))
            .await?;
        info!(venue = %self.venue.name, "First run: starting after newest event {}", head.seen_key());
        Ok(Some(head))
    }

    async fn seed_transaction_cursor(
        &self,
        filter: &TransactionFilter,
    ) -> MonitorResult<Option<String>> {
        let page = self
            .classifier
            .gateway()
            .query_transactions(filter, None, 1, SortOrder::Descending)
            .await?;

        let Some(head) = page.data.first().map(|t| t.digest.clone()).or(page.next_cursor) else {
            debug!(venue = %self.venue.name, "No transactions yet, starting from the beginning");
            return Ok(None);
        };

        self.store
            .set(&self.venue.name, Some(Cursor::Transaction(head.clone())))
            .await?;
        info!(venue = %self.venue.name, "First run: starting after newest transaction {}", head);
        Ok(Some(head))
    }

    async fn process_event(
        &mut self,
        event: &CandidateEvent,
        stats: &mut PassStats,
    ) -> MonitorResult<()> {
        let key = event.id.seen_key();
        if self.store.seen(&key).await? {
            stats.already_seen += 1;
            return Ok(());
        }
        stats.candidates += 1;

        let relevance = self.classifier.prefilter_event(event, self.venue.payload);
        if let Relevance::PayloadMatch(ref swap) = relevance {
            debug!(
                venue = %self.venue.name,
                "{} payload {} tracked token: {} in, {} out",
                key,
                if swap.buys(self.classifier.tracked_type()) { "receives" } else { "spends" },
                swap.amount_in.as_deref().unwrap_or("?"),
                swap.amount_out.as_deref().unwrap_or("?")
            );
        }
        if relevance.is_relevant() {
            let trader = relevance.trader_hint().map(str::to_string);
            self.handle_candidate(&event.id.tx_digest, trader, stats)
                .await?;
        } else {
            stats.rejected += 1;
            debug!(venue = %self.venue.name, "Rejected {} ({})", key, event.event_type);
        }

        self.store.mark_seen(&key).await?;
        Ok(())
    }

    async fn process_transaction(
        &mut self,
        summary: &TransactionSummary,
        stats: &mut PassStats,
    ) -> MonitorResult<()> {
        let key = transaction_seen_key(&summary.digest);
        if self.store.seen(&key).await? {
            stats.already_seen += 1;
            return Ok(());
        }
        stats.candidates += 1;

        if self.classifier.prefilter_transaction(summary) {
            self.handle_candidate(&summary.digest, None, stats).await?;
        } else {
            stats.rejected += 1;
            debug!(venue = %self.venue.name, "Rejected {}: tracked token not in type arguments", key);
        }

        self.store.mark_seen(&key).await?;
        Ok(())
    }

    /// Confirm a relevant candidate and notify at most once per digest
    async fn handle_candidate(
        &mut self,
        digest: &str,
        trader: Option<String>,
        stats: &mut PassStats,
    ) -> MonitorResult<()> {
        let verdict = match self.verdicts.get(digest) {
            Some(verdict) => verdict.clone(),
            None => {
                let verdict = self.classifier.confirm(digest).await?;
                self.verdicts.insert(digest, verdict.clone());
                verdict
            }
        };

        if !verdict.is_buy {
            return Ok(());
        }
        stats.buys += 1;

        // Claimed before delivery: of several venues racing on one digest,
        // only the one whose insert succeeds notifies
        if !self.store.mark_seen(&buy_key(digest)).await? {
            debug!(venue = %self.venue.name, "Buy {} already notified", digest);
            return Ok(());
        }

        let notification = BuyNotification {
            venue: self.venue.name.clone(),
            tx_digest: digest.to_string(),
            amount: Some(verdict.magnitude.clone()),
            ui_amount: verdict.ui_amount,
            symbol: Some(self.symbol.clone()),
            approx_usd_value: None,
            buyer: verdict.buyer.clone().or(trader),
            link: Some(explorer_link(&self.explorer_tx_url, digest)),
        };

        match self.sink.notify_buy(&notification).await {
            Ok(()) => stats.notified += 1,
            Err(e) => warn!(
                venue = %self.venue.name,
                digest = %digest,
                "Notification failed, not retried: {}",
                e
            ),
        }

        Ok(())
    }
}
