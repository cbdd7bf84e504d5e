use crate::monitor::error::{MonitorError, MonitorResult};
use crate::monitor::retry::{RetryPolicy, with_backoff};
use crate::types::{
    BalanceChange, CandidateEvent, EventFilter, EventId, MoveCall, Page, SortOrder,
    TransactionDetail, TransactionFilter, TransactionSummary,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

pub type EventPage = Page<CandidateEvent, EventId>;
pub type TransactionPage = Page<TransactionSummary, String>;

/// Raw ledger node access. One call, no retries.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn query_events(
        &self,
        filter: &EventFilter,
        cursor: Option<&EventId>,
        limit: usize,
        order: SortOrder,
    ) -> MonitorResult<EventPage>;

    async fn query_transactions(
        &self,
        filter: &TransactionFilter,
        cursor: Option<&str>,
        limit: usize,
        order: SortOrder,
    ) -> MonitorResult<TransactionPage>;

    async fn get_transaction(&self, digest: &str) -> MonitorResult<TransactionDetail>;
}

/// Ledger access with rate-limit backoff applied to every call
pub struct RpcGateway {
    rpc: Arc<dyn LedgerRpc>,
    retry: RetryPolicy,
}

impl RpcGateway {
    pub fn new(rpc: Arc<dyn LedgerRpc>, retry: RetryPolicy) -> Self {
        Self { rpc, retry }
    }

    pub async fn query_events(
        &self,
        filter: &EventFilter,
        cursor: Option<&EventId>,
        limit: usize,
        order: SortOrder,
    ) -> MonitorResult<EventPage> {
        with_backoff(&self.retry, "queryEvents", move || {
            self.rpc.query_events(filter, cursor, limit, order)
        })
        .await
    }

    pub async fn query_transactions(
        &self,
        filter: &TransactionFilter,
        cursor: Option<&str>,
        limit: usize,
        order: SortOrder,
    ) -> MonitorResult<TransactionPage> {
        with_backoff(&self.retry, "queryTransactionBlocks", move || {
            self.rpc.query_transactions(filter, cursor, limit, order)
        })
        .await
    }

    pub async fn get_transaction(&self, digest: &str) -> MonitorResult<TransactionDetail> {
        with_backoff(&self.retry, "getTransactionBlock", move || {
            self.rpc.get_transaction(digest)
        })
        .await
    }
}

/// JSON-RPC 2.0 client for a Sui full node
pub struct SuiRpcClient {
    http: Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl SuiRpcClient {
    pub fn new(endpoint: &str, timeout: Duration) -> MonitorResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> MonitorResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("RPC {} #{}", method, id);
        let response = self.http.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MonitorError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MonitorError::Rpc {
                code: i64::from(status.as_u16()),
                message,
            });
        }

        let bytes = response.bytes().await?;
        let envelope: RpcEnvelope<T> = serde_json::from_slice(&bytes)?;

        if let Some(error) = envelope.error {
            return Err(MonitorError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        envelope.result.ok_or_else(|| {
            MonitorError::InvalidResponse(format!("{} returned neither result nor error", method))
        })
    }
}

#[async_trait]
impl LedgerRpc for SuiRpcClient {
    async fn query_events(
        &self,
        filter: &EventFilter,
        cursor: Option<&EventId>,
        limit: usize,
        order: SortOrder,
    ) -> MonitorResult<EventPage> {
        let params = json!([filter, cursor, limit, order.is_descending()]);
        let page: WirePage<WireEvent, EventId> = self.call("suix_queryEvents", params).await?;

        Ok(Page {
            data: page.data.into_iter().map(CandidateEvent::from).collect(),
            next_cursor: page.next_cursor,
            has_next_page: page.has_next_page,
        })
    }

    async fn query_transactions(
        &self,
        filter: &TransactionFilter,
        cursor: Option<&str>,
        limit: usize,
        order: SortOrder,
    ) -> MonitorResult<TransactionPage> {
        let query = json!({
            "filter": filter,
            "options": { "showInput": true },
        });
        let params = json!([query, cursor, limit, order.is_descending()]);
        let page: WirePage<WireTransactionBlock, String> =
            self.call("suix_queryTransactionBlocks", params).await?;

        Ok(Page {
            data: page
                .data
                .into_iter()
                .map(WireTransactionBlock::into_summary)
                .collect(),
            next_cursor: page.next_cursor,
            has_next_page: page.has_next_page,
        })
    }

    async fn get_transaction(&self, digest: &str) -> MonitorResult<TransactionDetail> {
        let options = json!({
            "showInput": true,
            "showEvents": true,
            "showBalanceChanges": true,
        });
        let block: WireTransactionBlock = self
            .call("sui_getTransactionBlock", json!([digest, options]))
            .await?;
        Ok(block.into_detail())
    }
}

// ---- wire format ----

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePage<T, C> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    next_cursor: Option<C>,
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    id: EventId,
    #[serde(rename = "type", default)]
    event_type: String,
    sender: Option<String>,
    #[serde(default)]
    parsed_json: Value,
    timestamp_ms: Option<String>,
}

impl From<WireEvent> for CandidateEvent {
    fn from(event: WireEvent) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type,
            sender: event.sender,
            parsed_json: event.parsed_json,
            timestamp_ms: event.timestamp_ms.and_then(|ms| ms.parse().ok()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTransactionBlock {
    digest: String,
    transaction: Option<WireTransactionEnvelope>,
    #[serde(default)]
    balance_changes: Vec<WireBalanceChange>,
    #[serde(default)]
    events: Vec<WireEventType>,
    timestamp_ms: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTransactionEnvelope {
    data: Option<WireTransactionData>,
}

#[derive(Debug, Deserialize)]
struct WireTransactionData {
    sender: Option<String>,
    #[serde(default)]
    transaction: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBalanceChange {
    #[serde(default)]
    owner: Value,
    coin_type: String,
    amount: String,
}

#[derive(Debug, Deserialize)]
struct WireEventType {
    #[serde(rename = "type")]
    event_type: String,
}

impl WireTransactionBlock {
    fn data(&self) -> Option<&WireTransactionData> {
        self.transaction.as_ref().and_then(|t| t.data.as_ref())
    }

    fn into_summary(self) -> TransactionSummary {
        let (sender, move_calls) = match self.data() {
            Some(data) => (data.sender.clone(), move_calls(&data.transaction)),
            None => (None, Vec::new()),
        };
        TransactionSummary {
            digest: self.digest,
            sender,
            move_calls,
        }
    }

    fn into_detail(self) -> TransactionDetail {
        let sender = self.data().and_then(|d| d.sender.clone());
        TransactionDetail {
            digest: self.digest,
            sender,
            balance_changes: self
                .balance_changes
                .into_iter()
                .map(|c| BalanceChange {
                    owner: owner_address(&c.owner),
                    coin_type: c.coin_type,
                    amount: c.amount,
                })
                .collect(),
            event_types: self.events.into_iter().map(|e| e.event_type).collect(),
            timestamp_ms: self.timestamp_ms.and_then(|ms| ms.parse().ok()),
        }
    }
}

/// Address of an `AddressOwner` / `ObjectOwner` owner; shared and immutable owners have none.
fn owner_address(owner: &Value) -> Option<String> {
    ["AddressOwner", "ObjectOwner"]
        .iter()
        .find_map(|key| owner.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Move calls of a programmable transaction. Other kinds have none.
fn move_calls(kind: &Value) -> Vec<MoveCall> {
    if kind.get("kind").and_then(Value::as_str) != Some("ProgrammableTransaction") {
        return Vec::new();
    }

    let Some(commands) = kind.get("transactions").and_then(Value::as_array) else {
        return Vec::new();
    };

    commands
        .iter()
        .filter_map(|command| command.get("MoveCall"))
        .map(|call| {
            let field = |name: &str| {
                call.get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            MoveCall {
                package: field("package"),
                module: field("module"),
                function: field("function"),
                type_arguments: call
                    .get("type_arguments")
                    .and_then(Value::as_array)
                    .map(|args| {
                        args.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::{FakeLedger, sample_event};
    use crate::types::FunctionTarget;

    #[test]
    fn test_filter_wire_shapes() {
        let exact = EventFilter::MoveEventType("0x1::pool::SwapEvent".to_string());
        assert_eq!(
            serde_json::to_value(&exact).unwrap(),
            json!({ "MoveEventType": "0x1::pool::SwapEvent" })
        );

        let module = EventFilter::MoveModule {
            package: "0x1".to_string(),
            module: "pool".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&module).unwrap(),
            json!({ "MoveModule": { "package": "0x1", "module": "pool" } })
        );

        let function = TransactionFilter::MoveFunction(FunctionTarget {
            package: "0x1".to_string(),
            module: "router".to_string(),
            function: "swap".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&function).unwrap(),
            json!({ "MoveFunction": { "package": "0x1", "module": "router", "function": "swap" } })
        );
    }

    #[test]
    fn test_decode_event_page() {
        let raw = json!({
            "data": [{
                "id": { "txDigest": "D1", "eventSeq": "2" },
                "packageId": "0x1",
                "transactionModule": "pool",
                "sender": "0xabc",
                "type": "0x1::pool::SwapEvent",
                "parsedJson": { "amount_in": "10" },
                "timestampMs": "1700000000000"
            }],
            "nextCursor": { "txDigest": "D1", "eventSeq": "2" },
            "hasNextPage": false
        });

        let page: WirePage<WireEvent, EventId> = serde_json::from_value(raw).unwrap();
        let event = CandidateEvent::from(page.data.into_iter().next().unwrap());
        assert_eq!(event.id, EventId::new("D1", "2"));
        assert_eq!(event.event_type, "0x1::pool::SwapEvent");
        assert_eq!(event.timestamp_ms, Some(1_700_000_000_000));
        assert_eq!(page.next_cursor, Some(EventId::new("D1", "2")));
        assert!(!page.has_next_page);
    }

    #[test]
    fn test_decode_transaction_detail() {
        let raw = json!({
            "digest": "D9",
            "transaction": { "data": { "sender": "0xbuyer", "transaction": { "kind": "ProgrammableTransaction" } } },
            "balanceChanges": [
                { "owner": { "AddressOwner": "0xbuyer" }, "coinType": "0x2::sui::SUI", "amount": "-5000000000" },
                { "owner": "Immutable", "coinType": "0xt::t::T", "amount": "1000000" }
            ],
            "events": [{ "type": "0x1::pool::SwapEvent" }],
            "timestampMs": "42"
        });

        let block: WireTransactionBlock = serde_json::from_value(raw).unwrap();
        let detail = block.into_detail();
        assert_eq!(detail.sender.as_deref(), Some("0xbuyer"));
        assert_eq!(detail.balance_changes.len(), 2);
        assert_eq!(detail.balance_changes[0].owner.as_deref(), Some("0xbuyer"));
        assert_eq!(detail.balance_changes[1].owner, None);
        assert_eq!(detail.event_types, vec!["0x1::pool::SwapEvent".to_string()]);
        assert_eq!(detail.timestamp_ms, Some(42));
    }

    #[test]
    fn test_decode_move_calls() {
        let kind = json!({
            "kind": "ProgrammableTransaction",
            "inputs": [],
            "transactions": [
                { "SplitCoins": ["GasCoin", [{ "Input": 0 }]] },
                { "MoveCall": {
                    "package": "0x1",
                    "module": "router",
                    "function": "swap",
                    "type_arguments": ["0x2::sui::SUI", "0xt::t::T"]
                } }
            ]
        });

        let calls = move_calls(&kind);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function, "swap");
        assert_eq!(calls[0].type_arguments, vec!["0x2::sui::SUI", "0xt::t::T"]);

        assert!(move_calls(&json!({ "kind": "ConsensusCommitPrologue" })).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_retries_rate_limited_query() {
        let ledger = Arc::new(FakeLedger::default());
        ledger.fail_next(MonitorError::RateLimited);
        ledger.fail_next(MonitorError::RateLimited);

        let filter = EventFilter::MoveEventType("0x1::pool::SwapEvent".to_string());
        ledger.set_event_page(
            None,
            vec![sample_event("D1", "0", "0x1::pool::SwapEvent")],
            Some(EventId::new("D1", "0")),
            false,
        );

        let gateway = RpcGateway::new(ledger.clone(), RetryPolicy::default());
        let page = gateway
            .query_events(&filter, None, 50, SortOrder::Ascending)
            .await
            .unwrap();

        assert_eq!(page.data.len(), 1);
        assert_eq!(page.next_cursor, Some(EventId::new("D1", "0")));

        let times = ledger.call_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_millis(200));
        assert_eq!(times[2] - times[1], Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_propagates_non_rate_limit_error() {
        let ledger = Arc::new(FakeLedger::default());
        ledger.fail_next(MonitorError::Rpc {
            code: -32000,
            message: "Could not find the referenced transaction".to_string(),
        });

        let gateway = RpcGateway::new(ledger.clone(), RetryPolicy::default());
        let result = gateway.get_transaction("missing").await;

        assert!(matches!(result, Err(MonitorError::Rpc { code: -32000, .. })));
        assert_eq!(ledger.call_times().len(), 1);
    }
}
