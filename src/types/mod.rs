pub mod type_tag;

use crate::monitor::retry::RetryPolicy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// Position of one event on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventId {
    pub tx_digest: String,
    pub event_seq: String,
}

impl EventId {
    pub fn new(tx_digest: impl Into<String>, event_seq: impl Into<String>) -> Self {
        Self {
            tx_digest: tx_digest.into(),
            event_seq: event_seq.into(),
        }
    }

    /// Dedup key for this event: `{txDigest}:{eventSeq}`
    pub fn seen_key(&self) -> String {
        format!("{}:{}", self.tx_digest, self.event_seq)
    }
}

/// Dedup key for a transaction matched by a function-call filter
pub fn transaction_seen_key(digest: &str) -> String {
    format!("{}:0", digest)
}

/// Digest-level key marked once a buy has been notified, across all venues
pub fn buy_key(digest: &str) -> String {
    format!("buy:{}", digest)
}

/// Explorer URL for a transaction: the configured prefix plus the digest
pub fn explorer_link(prefix: &str, digest: &str) -> String {
    format!("{}{}", prefix, digest)
}

/// Opaque pagination token. Absent cursors are `Option::None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cursor {
    /// Structured (digest, sequence) pair returned by event queries
    Event(EventId),
    /// Plain string returned by transaction queries
    Transaction(String),
}

impl Cursor {
    /// Transaction queries can resume from either shape: a structured cursor
    /// contributes its digest.
    pub fn as_transaction(&self) -> &str {
        match self {
            Cursor::Event(id) => &id.tx_digest,
            Cursor::Transaction(digest) => digest,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Event(id) => write!(f, "{}", id.seen_key()),
            Cursor::Transaction(digest) => write!(f, "{}", digest),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn is_descending(self) -> bool {
        self == SortOrder::Descending
    }
}

/// Event query filter, serialized in the node's externally tagged form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EventFilter {
    MoveEventType(String),
    MoveModule { package: String, module: String },
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFilter::MoveEventType(event_type) => write!(f, "event {}", event_type),
            EventFilter::MoveModule { package, module } => {
                write!(f, "module {}::{}", package, module)
            }
        }
    }
}

/// Transaction query filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransactionFilter {
    MoveFunction(FunctionTarget),
}

impl fmt::Display for TransactionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionFilter::MoveFunction(target) => write!(
                f,
                "function {}::{}::{}",
                target.package, target.module, target.function
            ),
        }
    }
}

/// One page of a cursor-paginated query
#[derive(Debug, Clone)]
pub struct Page<T, C> {
    pub data: Vec<T>,
    pub next_cursor: Option<C>,
    pub has_next_page: bool,
}

/// Raw event emitted by a venue. Lives for one polling iteration.
#[derive(Debug, Clone)]
pub struct CandidateEvent {
    pub id: EventId,
    pub event_type: String,
    pub sender: Option<String>,
    pub parsed_json: Value,
    pub timestamp_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCall {
    pub package: String,
    pub module: String,
    pub function: String,
    pub type_arguments: Vec<String>,
}

/// Transaction returned by a function-call query, with its programmable calls
#[derive(Debug, Clone)]
pub struct TransactionSummary {
    pub digest: String,
    pub sender: Option<String>,
    pub move_calls: Vec<MoveCall>,
}

impl TransactionSummary {
    pub fn type_arguments(&self) -> impl Iterator<Item = &str> {
        self.move_calls
            .iter()
            .flat_map(|call| call.type_arguments.iter().map(String::as_str))
    }
}

/// Signed balance change of one coin type for one owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    pub owner: Option<String>,
    pub coin_type: String,
    /// Signed integer in the coin's smallest unit, as reported by the node
    pub amount: String,
}

/// Full transaction fetched lazily by digest
#[derive(Debug, Clone, Default)]
pub struct TransactionDetail {
    pub digest: String,
    pub sender: Option<String>,
    pub balance_changes: Vec<BalanceChange>,
    pub event_types: Vec<String>,
    pub timestamp_ms: Option<u64>,
}

/// Event payload layouts used by individual venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadShape {
    Router,
    Settle,
    BlueMove,
    SuiRewardsMe,
    Aftermath,
}

impl fmt::Display for PayloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadShape::Router => write!(f, "Router"),
            PayloadShape::Settle => write!(f, "Settle"),
            PayloadShape::BlueMove => write!(f, "BlueMove"),
            PayloadShape::SuiRewardsMe => write!(f, "SuiRewardsMe"),
            PayloadShape::Aftermath => write!(f, "Aftermath"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionTarget {
    pub package: String,
    pub module: String,
    pub function: String,
}

/// How a venue's stream is selected on the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueSelector {
    /// Exact event type, falling back to its module when not well-formed
    EventType(String),
    /// Module-level filter taken from the package+module prefix of a type string
    Module(String),
    /// Transactions calling a specific entry function
    MoveFunction(FunctionTarget),
}

/// Static venue descriptor, immutable after load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueConfig {
    pub name: String,
    pub selector: VenueSelector,
    pub payload: Option<PayloadShape>,
}

impl VenueConfig {
    pub fn event_type(name: &str, event_type: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: VenueSelector::EventType(event_type.to_string()),
            payload: None,
        }
    }
}

/// Confirmed buy handed to notification sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyNotification {
    pub venue: String,
    pub tx_digest: String,
    /// Absolute net delta in the token's smallest unit
    pub amount: Option<String>,
    pub ui_amount: Option<Decimal>,
    pub symbol: Option<String>,
    pub approx_usd_value: Option<f64>,
    pub buyer: Option<String>,
    pub link: Option<String>,
}

impl BuyNotification {
    pub fn description(&self) -> String {
        let amount = match (&self.ui_amount, &self.amount) {
            (Some(ui), _) => ui.normalize().to_string(),
            (None, Some(raw)) => raw.clone(),
            (None, None) => "?".to_string(),
        };
        format!(
            "{} BUY {} {} by {} ({})",
            self.venue,
            amount,
            self.symbol.as_deref().unwrap_or(""),
            self.buyer.as_deref().unwrap_or("unknown"),
            self.tx_digest
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaffleSettings {
    pub prize: Decimal,
    pub duration_hours: u64,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// JSON-RPC endpoint of the ledger node
    pub rpc_endpoint: String,

    /// Fully qualified coin type of the tracked token
    pub tracked_token: String,

    pub token_symbol: String,

    pub token_decimals: u32,

    /// Page ceiling per tick for exact event-type venues
    pub max_pages: usize,

    pub page_size: usize,

    pub order: SortOrder,

    /// Read a venue's whole history on first start instead of starting at
    /// the newest item
    pub backfill: bool,

    /// Delay between the end of one pass and the start of the next
    pub poll_interval_secs: u64,

    /// Poll venues concurrently within one pass
    pub concurrent_venues: bool,

    pub tx_cache_capacity: usize,

    /// Prefix that a transaction digest is appended to
    pub explorer_tx_url: String,

    pub request_timeout_secs: u64,

    pub retry: RetryPolicy,

    pub store_kind: StoreKind,

    pub store_path: PathBuf,

    pub telegram: Option<TelegramSettings>,

    /// Raffle started when the watcher launches
    pub raffle: Option<RaffleSettings>,

    pub log_level: String,

    pub venues: Vec<VenueConfig>,
}

impl MonitorConfig {
    pub fn explorer_link(&self, digest: &str) -> String {
        explorer_link(&self.explorer_tx_url, digest)
    }

    /// Page ceiling for module-level and function-call venues, which match a noisier stream
    pub fn broad_max_pages(&self) -> usize {
        (self.max_pages * 5).max(1)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: "https://fullnode.mainnet.sui.io:443".to_string(),
            tracked_token: String::new(),
            token_symbol: "TOKEN".to_string(),
            token_decimals: 6,
            max_pages: 3,
            page_size: 50,
            order: SortOrder::Ascending,
            backfill: false,
            poll_interval_secs: 15,
            concurrent_venues: true,
            tx_cache_capacity: 500,
            explorer_tx_url: "https://suiscan.xyz/mainnet/tx/".to_string(),
            request_timeout_secs: 20,
            retry: RetryPolicy::default(),
            store_kind: StoreKind::Memory,
            store_path: PathBuf::from("watcher_state.json"),
            telegram: None,
            raffle: None,
            log_level: "info".to_string(),
            venues: Vec::new(),
        }
    }
}
