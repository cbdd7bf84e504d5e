use rust_decimal::Decimal;
use std::fmt;

/// Net change of one coin type across every balance-change entry of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDelta {
    /// Coin type exactly as reported by the node
    pub coin_type: String,

    /// Signed sum in the coin's smallest unit (negative = left wallets, positive = arrived)
    pub delta: i128,

    /// Number of entries that were summed
    pub entries: usize,

    /// Owner with the largest positive net change of this coin, if any
    pub top_receiver: Option<String>,
}

impl BalanceDelta {
    /// Get the absolute amount that changed
    pub fn abs_amount(&self) -> u128 {
        self.delta.unsigned_abs()
    }

    /// Human-readable amount, `None` if it cannot be represented at this scale
    pub fn ui_amount(&self, decimals: u32) -> Option<Decimal> {
        let abs = i128::try_from(self.abs_amount()).ok()?;
        Decimal::try_from_i128_with_scale(abs, decimals).ok()
    }
}

/// Outcome of checking the tracked token's net delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeKind {
    /// Net positive: notify
    Buy,

    /// Net negative
    Sell,

    /// Netted out, or the token never moved
    NoChange,
}

impl TradeKind {
    pub fn should_notify(&self) -> bool {
        matches!(self, TradeKind::Buy)
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeKind::Buy => write!(f, "BUY"),
            TradeKind::Sell => write!(f, "SELL"),
            TradeKind::NoChange => write!(f, "NO CHANGE"),
        }
    }
}

/// Derived classification of one transaction; never stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyVerdict {
    pub kind: TradeKind,

    pub is_buy: bool,

    /// Signed net delta of the tracked token
    pub net_delta: i128,

    /// Absolute net delta as a decimal string in the smallest unit
    pub magnitude: String,

    pub ui_amount: Option<Decimal>,

    pub buyer: Option<String>,
}

/// Canonical swap legs pulled out of one venue's event payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedSwap {
    pub input_type: Option<String>,
    pub output_type: Option<String>,
    pub amount_in: Option<String>,
    pub amount_out: Option<String>,
    pub trader: Option<String>,
}

/// Result of the cheap pre-filter applied before any transaction fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relevance {
    /// Swap-like event type parameterized by the tracked token
    TypeMatch,

    /// The venue's payload adapter found the tracked token on one of the legs
    PayloadMatch(NormalizedSwap),

    Irrelevant,
}

impl Relevance {
    pub fn is_relevant(&self) -> bool {
        !matches!(self, Relevance::Irrelevant)
    }

    pub fn trader_hint(&self) -> Option<&str> {
        match self {
            Relevance::PayloadMatch(swap) => swap.trader.as_deref(),
            _ => None,
        }
    }
}
