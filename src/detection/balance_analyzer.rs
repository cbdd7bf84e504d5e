use crate::detection::types::BalanceDelta;
use crate::types::{BalanceChange, TransactionDetail};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Coalesces a transaction's balance changes into net per-coin deltas
pub struct BalanceAnalyzer {
    tracked_type: String,
}

impl BalanceAnalyzer {
    pub fn new(tracked_type: impl Into<String>) -> Self {
        Self {
            tracked_type: tracked_type.into(),
        }
    }

    /// Net delta for every coin type that moved, in order of first appearance.
    /// Coin types whose entries cancel out are dropped.
    pub fn net_deltas(&self, changes: &[BalanceChange]) -> Vec<BalanceDelta> {
        let mut order: Vec<&str> = Vec::new();
        for change in changes {
            if !order.contains(&change.coin_type.as_str()) {
                order.push(&change.coin_type);
            }
        }

        order
            .into_iter()
            .map(|coin_type| self.delta_for(changes, coin_type))
            .filter(|delta| delta.delta != 0)
            .collect()
    }

    /// Net delta of the tracked token, `None` if the token has no entries at all
    pub fn tracked_delta(&self, changes: &[BalanceChange]) -> Option<BalanceDelta> {
        let delta = self.delta_for(changes, &self.tracked_type);
        (delta.entries > 0).then_some(delta)
    }

    pub fn analyze(&self, transaction: &TransactionDetail) -> Option<BalanceDelta> {
        let delta = self.tracked_delta(&transaction.balance_changes);
        match &delta {
            Some(d) => debug!(
                "{}: tracked delta {} over {} entries",
                transaction.digest, d.delta, d.entries
            ),
            None => debug!("{}: tracked token not in balance changes", transaction.digest),
        }
        delta
    }

    /// Sum every entry whose coin type string equals `coin_type`
    fn delta_for(&self, changes: &[BalanceChange], coin_type: &str) -> BalanceDelta {
        let mut total: i128 = 0;
        let mut entries = 0;
        let mut by_owner: HashMap<&str, i128> = HashMap::new();

        for change in changes.iter().filter(|c| c.coin_type == coin_type) {
            let amount = match change.amount.trim().parse::<i128>() {
                Ok(amount) => amount,
                Err(e) => {
                    warn!(
                        "Skipping unparseable balance change {:?} of {}: {}",
                        change.amount, coin_type, e
                    );
                    continue;
                }
            };

            total = total.saturating_add(amount);
            entries += 1;
            if let Some(ref owner) = change.owner {
                *by_owner.entry(owner.as_str()).or_default() += amount;
            }
        }

        let top_receiver = by_owner
            .into_iter()
            .filter(|(_, net)| *net > 0)
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(owner, _)| owner.to_string());

        BalanceDelta {
            coin_type: coin_type.to_string(),
            delta: total,
            entries,
            top_receiver,
        }
    }
}
