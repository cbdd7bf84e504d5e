//! Scripted collaborators shared by unit tests.

use crate::monitor::error::{MonitorError, MonitorResult};
use crate::monitor::rpc::{EventPage, LedgerRpc, TransactionPage};
use crate::monitor::sink::NotificationSink;
use crate::monitor::store::{CursorStore, MemoryStore};
use crate::types::{
    BalanceChange, BuyNotification, CandidateEvent, Cursor, EventFilter, EventId, MoveCall, Page,
    SortOrder, TransactionDetail, TransactionFilter, TransactionSummary,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

pub const TRACKED: &str =
    "0xdeb831e796f16f8257681c0d5d4108fa94333060300b2459133a96631bf470b8::suitrump::SUITRUMP";
pub const SUI: &str = "0x2::sui::SUI";
pub const POOL_PKG: &str = "0x1eabed72c53feb3805120a081dc15963c204dc8d091542592abaf7a35689b2fb";

pub fn swap_event_type() -> String {
    format!("{}::pool::SwapEvent<{}, {}>", POOL_PKG, SUI, TRACKED)
}

pub fn sample_event(digest: &str, seq: &str, event_type: &str) -> CandidateEvent {
    CandidateEvent {
        id: EventId::new(digest, seq),
        event_type: event_type.to_string(),
        sender: Some("0xsender".to_string()),
        parsed_json: Value::Null,
        timestamp_ms: None,
    }
}

pub fn change(owner: &str, coin_type: &str, amount: &str) -> BalanceChange {
    BalanceChange {
        owner: Some(owner.to_string()),
        coin_type: coin_type.to_string(),
        amount: amount.to_string(),
    }
}

pub fn detail(digest: &str, changes: Vec<BalanceChange>) -> TransactionDetail {
    TransactionDetail {
        digest: digest.to_string(),
        sender: Some("0xsender".to_string()),
        balance_changes: changes,
        event_types: Vec::new(),
        timestamp_ms: None,
    }
}

pub fn summary(digest: &str, type_arguments: &[&str]) -> TransactionSummary {
    TransactionSummary {
        digest: digest.to_string(),
        sender: Some("0xsender".to_string()),
        move_calls: vec![MoveCall {
            package: POOL_PKG.to_string(),
            module: "router".to_string(),
            function: "swap".to_string(),
            type_arguments: type_arguments.iter().map(|s| s.to_string()).collect(),
        }],
    }
}

/// In-memory ledger answering pages by the cursor they were requested with.
#[derive(Default)]
pub struct FakeLedger {
    event_pages: Mutex<HashMap<Option<EventId>, EventPage>>,
    tx_pages: Mutex<HashMap<Option<String>, TransactionPage>>,
    transactions: Mutex<HashMap<String, TransactionDetail>>,
    failures: Mutex<VecDeque<MonitorError>>,
    calls: Mutex<Vec<Instant>>,
    event_queries: Mutex<Vec<(EventFilter, Option<EventId>)>>,
    event_orders: Mutex<Vec<(SortOrder, usize)>>,
    tx_fetches: Mutex<Vec<String>>,
}

impl FakeLedger {
    pub fn set_event_page(
        &self,
        cursor: Option<EventId>,
        data: Vec<CandidateEvent>,
        next_cursor: Option<EventId>,
        has_next_page: bool,
    ) {
        self.event_pages.lock().unwrap().insert(
            cursor,
            Page {
                data,
                next_cursor,
                has_next_page,
            },
        );
    }

    pub fn set_tx_page(
        &self,
        cursor: Option<String>,
        data: Vec<TransactionSummary>,
        next_cursor: Option<String>,
        has_next_page: bool,
    ) {
        self.tx_pages.lock().unwrap().insert(
            cursor,
            Page {
                data,
                next_cursor,
                has_next_page,
            },
        );
    }

    pub fn add_transaction(&self, detail: TransactionDetail) {
        self.transactions
            .lock()
            .unwrap()
            .insert(detail.digest.clone(), detail);
    }

    /// Queue an error returned by the next call of any kind
    pub fn fail_next(&self, error: MonitorError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    pub fn event_queries(&self) -> Vec<(EventFilter, Option<EventId>)> {
        self.event_queries.lock().unwrap().clone()
    }

    /// Order and limit of every event query, in call order
    pub fn event_orders(&self) -> Vec<(SortOrder, usize)> {
        self.event_orders.lock().unwrap().clone()
    }

    pub fn tx_fetches(&self) -> Vec<String> {
        self.tx_fetches.lock().unwrap().clone()
    }

    fn enter(&self) -> MonitorResult<()> {
        self.calls.lock().unwrap().push(Instant::now());
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerRpc for FakeLedger {
    async fn query_events(
        &self,
        filter: &EventFilter,
        cursor: Option<&EventId>,
        limit: usize,
        order: SortOrder,
    ) -> MonitorResult<EventPage> {
        self.enter()?;
        self.event_queries
            .lock()
            .unwrap()
            .push((filter.clone(), cursor.cloned()));
        self.event_orders.lock().unwrap().push((order, limit));
        let page = self.event_pages.lock().unwrap().get(&cursor.cloned()).cloned();
        Ok(page.unwrap_or(Page {
            data: Vec::new(),
            next_cursor: cursor.cloned(),
            has_next_page: false,
        }))
    }

    async fn query_transactions(
        &self,
        _filter: &TransactionFilter,
        cursor: Option<&str>,
        _limit: usize,
        _order: SortOrder,
    ) -> MonitorResult<TransactionPage> {
        self.enter()?;
        let key = cursor.map(str::to_string);
        let page = self.tx_pages.lock().unwrap().get(&key).cloned();
        Ok(page.unwrap_or(Page {
            data: Vec::new(),
            next_cursor: key,
            has_next_page: false,
        }))
    }

    async fn get_transaction(&self, digest: &str) -> MonitorResult<TransactionDetail> {
        self.enter()?;
        self.tx_fetches.lock().unwrap().push(digest.to_string());
        self.transactions
            .lock()
            .unwrap()
            .get(digest)
            .cloned()
            .ok_or_else(|| MonitorError::Rpc {
                code: -32602,
                message: format!("Could not find the referenced transaction {}", digest),
            })
    }
}

/// Sink that records every notification, optionally failing each delivery
/// or yielding to the scheduler before recording it
#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<BuyNotification>>,
    pub fail: bool,
    pub yield_first: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn yielding() -> Self {
        Self {
            yield_first: true,
            ..Self::default()
        }
    }

    pub fn received(&self) -> Vec<BuyNotification> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify_buy(&self, buy: &BuyNotification) -> MonitorResult<()> {
        if self.yield_first {
            tokio::task::yield_now().await;
        }
        self.received.lock().unwrap().push(buy.clone());
        if self.fail {
            return Err(MonitorError::Sink("delivery refused".to_string()));
        }
        Ok(())
    }
}

/// Memory store that also counts `mark_seen` calls per key
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    marks: Mutex<HashMap<String, usize>>,
}

impl CountingStore {
    pub fn marks_for(&self, key: &str) -> usize {
        self.marks.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CursorStore for CountingStore {
    async fn get(&self, venue: &str) -> MonitorResult<Option<Cursor>> {
        self.inner.get(venue).await
    }

    async fn set(&self, venue: &str, cursor: Option<Cursor>) -> MonitorResult<()> {
        self.inner.set(venue, cursor).await
    }

    async fn seen(&self, key: &str) -> MonitorResult<bool> {
        self.inner.seen(key).await
    }

    async fn mark_seen(&self, key: &str) -> MonitorResult<bool> {
        *self.marks.lock().unwrap().entry(key.to_string()).or_default() += 1;
        self.inner.mark_seen(key).await
    }
}
