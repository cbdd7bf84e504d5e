//! Buy detection by net balance delta
//!
//! A venue's swap event records one hop's gross legs, but a wallet's real
//! outcome across a routed trade only shows in the net change of the tracked
//! token over the whole transaction. Event shapes are used as a cheap
//! pre-filter; the balance delta is the verdict.

pub mod adapters;
pub mod balance_analyzer;
pub mod prefilter;
pub mod trade_classifier;
pub mod types;

use crate::monitor::cache::TransactionCache;
use crate::monitor::error::MonitorResult;
use crate::monitor::rpc::RpcGateway;
use crate::types::type_tag::same_type;
use crate::types::{CandidateEvent, PayloadShape, TransactionDetail, TransactionSummary};
use balance_analyzer::BalanceAnalyzer;
use std::sync::Arc;
use trade_classifier::TradeClassifier;
use tracing::{debug, info};
use types::{BuyVerdict, Relevance};

/// Shared classifier: pre-filters candidates and confirms buys against the
/// transaction's balance changes
pub struct EventClassifier {
    tracked_type: String,
    token_decimals: u32,
    gateway: Arc<RpcGateway>,
    cache: Arc<TransactionCache>,
    balance_analyzer: BalanceAnalyzer,
    trade_classifier: TradeClassifier,
}

impl EventClassifier {
    pub fn new(
        tracked_type: &str,
        token_decimals: u32,
        gateway: Arc<RpcGateway>,
        cache: Arc<TransactionCache>,
    ) -> Self {
        Self {
            tracked_type: tracked_type.to_string(),
            token_decimals,
            gateway,
            cache,
            balance_analyzer: BalanceAnalyzer::new(tracked_type),
            trade_classifier: TradeClassifier::new(),
        }
    }

    pub fn tracked_type(&self) -> &str {
        &self.tracked_type
    }

    pub fn gateway(&self) -> &RpcGateway {
        &self.gateway
    }

    /// Decide from the event alone whether a transaction fetch is worth it
    pub fn prefilter_event(
        &self,
        event: &CandidateEvent,
        payload: Option<PayloadShape>,
    ) -> Relevance {
        if prefilter::type_matches(&event.event_type, &self.tracked_type) {
            return Relevance::TypeMatch;
        }

        if let Some(shape) = payload {
            if let Some(swap) = adapters::normalize(shape, &event.parsed_json) {
                if swap.touches(&self.tracked_type) {
                    return Relevance::PayloadMatch(swap);
                }
            }
        }

        Relevance::Irrelevant
    }

    /// A function-call candidate is relevant when the tracked token is one of
    /// its type arguments
    pub fn prefilter_transaction(&self, summary: &TransactionSummary) -> bool {
        summary
            .type_arguments()
            .any(|t| same_type(t, &self.tracked_type))
    }

    /// Fetch a transaction, serving repeat digests from the cache
    pub async fn fetch_transaction(&self, digest: &str) -> MonitorResult<Arc<TransactionDetail>> {
        if let Some(cached) = self.cache.get(digest) {
            debug!("Transaction cache hit for {}", digest);
            return Ok(cached);
        }

        let detail = self.gateway.get_transaction(digest).await?;
        Ok(self.cache.insert(detail))
    }

    /// Classify an already fetched transaction
    pub fn verdict(&self, detail: &TransactionDetail) -> BuyVerdict {
        let delta = self.balance_analyzer.analyze(detail);
        let kind = self.trade_classifier.classify(delta.as_ref());

        let net_delta = delta.as_ref().map(|d| d.delta).unwrap_or(0);
        let ui_amount = delta
            .as_ref()
            .and_then(|d| d.ui_amount(self.token_decimals));
        let buyer = delta
            .and_then(|d| d.top_receiver)
            .or_else(|| detail.sender.clone());

        BuyVerdict {
            kind,
            is_buy: kind.should_notify(),
            net_delta,
            magnitude: net_delta.unsigned_abs().to_string(),
            ui_amount,
            buyer,
        }
    }

    /// Fetch and classify one transaction by digest
    pub async fn confirm(&self, digest: &str) -> MonitorResult<BuyVerdict> {
        let detail = self.fetch_transaction(digest).await?;
        let verdict = self.verdict(&detail);

        if verdict.is_buy {
            info!("📈 {} confirmed as buy of {}", digest, verdict.magnitude);
        } else {
            debug!("{} is {} (net {})", digest, verdict.kind, verdict.net_delta);
        }
        Ok(verdict)
    }
}
