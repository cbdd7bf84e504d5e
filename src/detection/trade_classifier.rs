use crate::detection::types::{BalanceDelta, TradeKind};
use tracing::debug;

/// Classifies a transaction from the tracked token's net balance delta
pub struct TradeClassifier {}

impl TradeClassifier {
    /// Create a new trade classifier
    pub fn new() -> Self {
        Self {}
    }

    /// A buy is a strictly positive net delta; no entries at all is no change
    pub fn classify(&self, delta: Option<&BalanceDelta>) -> TradeKind {
        let kind = match delta.map(|d| d.delta) {
            Some(net) if net > 0 => TradeKind::Buy,
            Some(net) if net < 0 => TradeKind::Sell,
            _ => TradeKind::NoChange,
        };

        debug!("Tracked delta classified as: {}", kind);
        kind
    }
}

impl Default for TradeClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(net: i128) -> BalanceDelta {
        BalanceDelta {
            coin_type: "0xt::t::T".to_string(),
            delta: net,
            entries: 1,
            top_receiver: None,
        }
    }

    #[test]
    fn test_positive_delta_is_buy() {
        let classifier = TradeClassifier::new();
        assert_eq!(classifier.classify(Some(&delta(1))), TradeKind::Buy);
        assert!(classifier.classify(Some(&delta(1))).should_notify());
    }

    #[test]
    fn test_negative_delta_is_sell() {
        let classifier = TradeClassifier::new();
        assert_eq!(classifier.classify(Some(&delta(-40))), TradeKind::Sell);
        assert!(!classifier.classify(Some(&delta(-40))).should_notify());
    }

    #[test]
    fn test_zero_or_missing_is_no_change() {
        let classifier = TradeClassifier::new();
        assert_eq!(classifier.classify(Some(&delta(0))), TradeKind::NoChange);
        assert_eq!(classifier.classify(None), TradeKind::NoChange);
    }
}
