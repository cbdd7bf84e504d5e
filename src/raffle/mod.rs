//! Time-boxed raffle fed by observed buys and admin grants

use crate::monitor::error::MonitorResult;
use crate::monitor::sink::NotificationSink;
use crate::types::BuyNotification;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Bonus-adjusted ticket count for a wallet holding `n` raw tickets
pub fn bonus_tickets(n: u64) -> u64 {
    let scaled = |pct: u128| (u128::from(n) * pct / 100) as u64;
    match n {
        0 => 0,
        n if n < 1_000_000 => n,
        n if n < 5_000_000 => scaled(103),
        n if n < 20_000_000 => scaled(106),
        n if n < 50_000_000 => scaled(108),
        _ => scaled(110),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raffle {
    pub prize: Decimal,
    pub duration_hours: u64,
    pub started_at: DateTime<Utc>,
    pub winner: Option<String>,
}

impl Raffle {
    pub fn ends_at(&self) -> DateTime<Utc> {
        i64::try_from(self.duration_hours)
            .ok()
            .and_then(Duration::try_hours)
            .and_then(|d| self.started_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.ends_at()
    }
}

#[derive(Debug, Clone)]
struct RaffleEntry {
    wallet: String,
    tickets: u64,
}

#[derive(Debug, Default)]
struct RaffleState {
    raffle: Option<Raffle>,
    entries: Vec<RaffleEntry>,
}

#[derive(Debug, Default)]
pub struct RaffleBook {
    state: Mutex<RaffleState>,
}

impl RaffleBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RaffleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> Option<Raffle> {
        self.lock().raffle.clone()
    }

    /// Start a raffle unless one is still running. Restarting clears all entries.
    pub fn start(&self, prize: Decimal, duration_hours: u64, now: DateTime<Utc>) -> bool {
        let mut state = self.lock();
        if state.raffle.as_ref().is_some_and(|r| r.is_active(now)) {
            return false;
        }

        state.raffle = Some(Raffle {
            prize,
            duration_hours,
            started_at: now,
            winner: None,
        });
        state.entries.clear();
        info!("🎟️ Raffle started: prize {} for {}h", prize, duration_hours);
        true
    }

    /// Tickets equal to the whole-token amount bought, while a raffle is active
    pub fn record_buy(&self, wallet: &str, amount: Decimal, now: DateTime<Utc>) -> bool {
        let tickets = amount.floor().to_u64().unwrap_or(0);
        self.add_entry(wallet, tickets, now)
    }

    /// Admin grant, subject to the same active window
    pub fn grant(&self, wallet: &str, tickets: u64, now: DateTime<Utc>) -> bool {
        self.add_entry(wallet, tickets, now)
    }

    fn add_entry(&self, wallet: &str, tickets: u64, now: DateTime<Utc>) -> bool {
        let mut state = self.lock();
        if !state.raffle.as_ref().is_some_and(|r| r.is_active(now)) {
            debug!("No active raffle, ignoring {} tickets for {}", tickets, wallet);
            return false;
        }

        state.entries.push(RaffleEntry {
            wallet: wallet.to_string(),
            tickets,
        });
        true
    }

    fn raw_by_wallet(state: &RaffleState) -> BTreeMap<String, u64> {
        let mut totals = BTreeMap::new();
        for entry in &state.entries {
            *totals.entry(entry.wallet.clone()).or_insert(0u64) += entry.tickets;
        }
        totals
    }

    /// Per-wallet totals after the bonus tier is applied
    pub fn tickets_by_wallet(&self) -> BTreeMap<String, u64> {
        let state = self.lock();
        Self::raw_by_wallet(&state)
            .into_iter()
            .map(|(wallet, n)| (wallet, bonus_tickets(n)))
            .collect()
    }

    /// Raw tickets across all entries, before bonuses
    pub fn total_tickets(&self) -> u64 {
        self.lock().entries.iter().map(|e| e.tickets).sum()
    }

    pub fn unique_wallets(&self) -> usize {
        Self::raw_by_wallet(&self.lock()).len()
    }

    /// Wallets ordered by bonus-adjusted tickets, highest first
    pub fn leaderboard(&self, limit: usize) -> Vec<(String, u64)> {
        let mut ranking: Vec<_> = self.tickets_by_wallet().into_iter().collect();
        ranking.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranking.truncate(limit);
        ranking
    }

    /// Draw once, weighted by bonus-adjusted tickets. A drawn winner is kept
    /// and returned on later calls.
    pub fn pick_winner<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        let mut state = self.lock();
        if let Some(winner) = state.raffle.as_ref().and_then(|r| r.winner.clone()) {
            return Some(winner);
        }

        let weighted: Vec<(String, u64)> = Self::raw_by_wallet(&state)
            .into_iter()
            .map(|(wallet, n)| (wallet, bonus_tickets(n)))
            .filter(|(_, n)| *n > 0)
            .collect();
        let total: u64 = weighted.iter().map(|(_, n)| n).sum();
        if total == 0 {
            return None;
        }

        let winning_ticket = rng.gen_range(0..total);
        let mut cumulative = 0;
        let winner = weighted.into_iter().find_map(|(wallet, n)| {
            cumulative += n;
            (winning_ticket < cumulative).then_some(wallet)
        })?;

        info!("🏆 Raffle winner: {} (ticket {} of {})", winner, winning_ticket, total);
        if let Some(raffle) = state.raffle.as_mut() {
            raffle.winner = Some(winner.clone());
        }
        Some(winner)
    }
}

/// Feeds every notified buy into the raffle book
pub struct RaffleSink {
    book: Arc<RaffleBook>,
}

impl RaffleSink {
    pub fn new(book: Arc<RaffleBook>) -> Self {
        Self { book }
    }
}

#[async_trait]
impl NotificationSink for RaffleSink {
    async fn notify_buy(&self, buy: &BuyNotification) -> MonitorResult<()> {
        if let (Some(buyer), Some(amount)) = (&buy.buyer, buy.ui_amount) {
            if self.book.record_buy(buyer, amount, Utc::now()) {
                debug!("Raffle entry for {} from {}", buyer, buy.tx_digest);
            }
        }
        Ok(())
    }
}
