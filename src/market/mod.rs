//! Market snapshot model and the synchroniser that keeps it fresh.
//!
//! A [`MarketSnapshot`] is the full client-side view of one market. It is
//! updated from three sources - direct fetch, the periodic background
//! refetch, and push events - reconciled last-write-wins per field group:
//! a pool update only ever touches pool/percentage/bet-count fields, a
//! market update only status/winner/time-remaining fields.

pub mod cache;
pub mod sse;
pub mod sync;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub use cache::SnapshotCache;
pub use sse::{PushConnect, PushError, PushStream, SseConnector};
pub use sync::{MarketView, MarketWatcher, WatchOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketStatus {
    Active,
    Closed,
    Resolved,
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketStatus::Active => write!(f, "ACTIVE"),
            MarketStatus::Closed => write!(f, "CLOSED"),
            MarketStatus::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// Aggregate stats block, present when requested with `includeStats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStats {
    pub unique_wallets: u64,
    pub avg_bet_size: Decimal,
    pub largest_bet: Decimal,
    pub smallest_bet: Decimal,
}

/// Full client-side state of one market.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub market_id: String,
    pub question: String,
    pub status: MarketStatus,
    /// Set whenever `status` is RESOLVED (enforced at the wire boundary).
    pub winner: Option<String>,
    pub yes_pool: Decimal,
    pub no_pool: Decimal,
    pub total_pool: Decimal,
    pub yes_percent: f64,
    pub no_percent: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub time_remaining_secs: i64,
    pub has_ended: bool,
    pub total_bets: u64,
    pub stats: Option<MarketStats>,
}

impl MarketSnapshot {
    pub fn is_active(&self) -> bool {
        self.status == MarketStatus::Active && !self.has_ended
    }

    pub fn is_closed(&self) -> bool {
        self.status == MarketStatus::Closed
    }

    pub fn is_resolved(&self) -> bool {
        self.status == MarketStatus::Resolved
    }

    pub fn can_bet(&self) -> bool {
        self.is_active()
    }

    /// Merge a pool update. Touches only the pool, percentage and bet-count
    /// fields; everything else keeps its prior value.
    pub fn apply_pool_update(&mut self, update: &PoolUpdate) {
        self.yes_pool = update.yes_pool;
        self.no_pool = update.no_pool;
        self.total_pool = update.total_pool;
        self.yes_percent = update.yes_percent;
        self.no_percent = update.no_percent;
        self.total_bets = update.total_bets;
    }

    /// Merge a market update. Touches only status, winner, time remaining
    /// and the ended flag.
    pub fn apply_market_update(&mut self, update: &MarketUpdate) {
        self.status = update.status;
        self.winner = update.winner.clone();
        self.time_remaining_secs = update.time_remaining;
        self.has_ended = update.has_ended;
    }
}

/// Pool share split. Both sides are 0 when the pools are empty; otherwise
/// the two sides sum to 100.
pub fn pool_percentages(yes_pool: Decimal, no_pool: Decimal) -> (f64, f64) {
    let total = yes_pool + no_pool;
    if total.is_zero() {
        return (0.0, 0.0);
    }
    let yes = (yes_pool / total * Decimal::from(100))
        .to_f64()
        .unwrap_or(0.0);
    (yes, 100.0 - yes)
}

/// POOL_UPDATE push payload: the pool field group only.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolUpdate {
    pub yes_pool: Decimal,
    pub no_pool: Decimal,
    pub total_pool: Decimal,
    pub yes_percent: f64,
    pub no_percent: f64,
    pub total_bets: u64,
}

/// MARKET_UPDATE push payload: the status field group only.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketUpdate {
    pub status: MarketStatus,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub time_remaining: i64,
    #[serde(default)]
    pub has_ended: bool,
}

impl MarketUpdate {
    /// True when this update means the market will take no further bets.
    pub fn indicates_ended(&self) -> bool {
        self.has_ended || self.status != MarketStatus::Active
    }
}

/// Typed event from the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Pool(PoolUpdate),
    Market(MarketUpdate),
    StreamError { message: String, code: Option<String> },
}

/// Time-remaining decomposition for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRemaining {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub total_secs: i64,
}

impl TimeRemaining {
    pub fn from_secs(secs: i64) -> Self {
        let secs = secs.max(0);
        Self {
            days: secs / 86_400,
            hours: (secs % 86_400) / 3_600,
            minutes: (secs % 3_600) / 60,
            seconds: secs % 60,
            total_secs: secs,
        }
    }
}

impl std::fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}d {}h {}m {}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Client-side countdown: captures a remaining-seconds value and decrements
/// it once per second, independent of any network activity. The task stops
/// when the remaining time hits zero or every receiver is dropped.
pub struct Countdown;

impl Countdown {
    pub fn start(remaining_secs: i64) -> watch::Receiver<TimeRemaining> {
        let (tx, rx) = watch::channel(TimeRemaining::from_secs(remaining_secs));
        tokio::spawn(async move {
            let mut remaining = remaining_secs.max(0);
            let mut tick = tokio::time::interval(std::time::Duration::from_secs(1));
            tick.tick().await; // immediate first tick
            while remaining > 0 {
                tokio::select! {
                    _ = tick.tick() => {
                        remaining -= 1;
                        if tx.send(TimeRemaining::from_secs(remaining)).is_err() {
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                }
            }
        });
        rx
    }
}

/// `$1234.50` style formatting for pool amounts.
pub fn format_usd(amount: Decimal) -> String {
    format!("${:.2}", amount)
}

/// `62.5%` style formatting for pool shares.
pub fn format_percent(percent: f64) -> String {
    format!("{:.1}%", percent)
}

/// Snapshot fixture shared by test modules across the crate.
#[cfg(test)]
pub(crate) fn sample_snapshot(yes: i64, no: i64, yes_pct: f64, no_pct: f64) -> MarketSnapshot {
    MarketSnapshot {
        market_id: "m1".into(),
        question: "Will BTC reach $100k?".into(),
        status: MarketStatus::Active,
        winner: None,
        yes_pool: Decimal::from(yes),
        no_pool: Decimal::from(no),
        total_pool: Decimal::from(yes + no),
        yes_percent: yes_pct,
        no_percent: no_pct,
        start_date: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        end_date: DateTime::from_timestamp(1_700_600_000, 0).unwrap(),
        time_remaining_secs: 600_000,
        has_ended: false,
        total_bets: 10,
        stats: None,
    }
}
