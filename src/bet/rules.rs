//! Business rules checked before any chain or network call.
//!
//! All checks are pure functions over the intent plus a [`RuleContext`]
//! describing the wallet's recent activity, so they are trivially testable
//! and never block.

use crate::errors::{ErrorCode, ErrorInfo};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::{Duration, Instant};

/// Limits applied to every bet.
#[derive(Debug, Clone)]
pub struct BetLimits {
    pub min_bet: Decimal,
    pub max_bet: Decimal,
    /// Required gap between bets from one wallet.
    pub cooldown: Duration,
    /// Maximum bets per wallet per market.
    pub max_bets_per_wallet: u32,
    /// Maximum share of the pool one wallet may hold, in percent.
    pub max_exposure_percent: f64,
}

impl Default for BetLimits {
    fn default() -> Self {
        Self {
            min_bet: Decimal::ONE,
            max_bet: Decimal::from(10_000),
            cooldown: Duration::from_secs(60),
            max_bets_per_wallet: 10,
            max_exposure_percent: 25.0,
        }
    }
}

impl BetLimits {
    pub fn from_config(cfg: &crate::config::LimitsConfig) -> Self {
        Self {
            min_bet: cfg.min_bet,
            max_bet: cfg.max_bet,
            cooldown: Duration::from_secs(cfg.cooldown_secs),
            max_bets_per_wallet: cfg.max_bets_per_wallet,
            max_exposure_percent: cfg.max_exposure_percent,
        }
    }
}

/// Wallet activity the rule checks run against.
#[derive(Debug, Clone, Default)]
pub struct RuleContext {
    pub cooldown_remaining: Duration,
    pub bets_placed: u32,
    /// Total already staked by this wallet on this market.
    pub wallet_stake: Decimal,
    /// Current total pool, when a cached snapshot is available.
    pub pool_total: Option<Decimal>,
}

/// Amount bounds check. Runs before anything else.
pub fn validate_amount(amount: Decimal, limits: &BetLimits) -> Result<(), ErrorInfo> {
    if amount <= Decimal::ZERO {
        return Err(ErrorInfo::new(
            ErrorCode::InvalidAmount,
            "bet amount must be positive",
        ));
    }
    if amount < limits.min_bet || amount > limits.max_bet {
        return Err(ErrorInfo::new(
            ErrorCode::InvalidAmount,
            format!(
                "bet amount {} outside limits [{}, {}]",
                amount, limits.min_bet, limits.max_bet
            ),
        ));
    }
    Ok(())
}

/// Cooldown, bet-count, and exposure checks.
pub fn validate_rules(
    amount: Decimal,
    limits: &BetLimits,
    ctx: &RuleContext,
) -> Result<(), ErrorInfo> {
    if !ctx.cooldown_remaining.is_zero() {
        return Err(ErrorInfo::new(
            ErrorCode::CooldownActive,
            format!(
                "wait {}s before placing another bet",
                ctx.cooldown_remaining.as_secs().max(1)
            ),
        ));
    }

    if ctx.bets_placed >= limits.max_bets_per_wallet {
        return Err(ErrorInfo::new(
            ErrorCode::BetLimitReached,
            format!(
                "wallet already placed {} of {} allowed bets",
                ctx.bets_placed, limits.max_bets_per_wallet
            ),
        ));
    }

    if let Some(pool) = ctx.pool_total {
        let percent = wallet_pool_percent(ctx.wallet_stake + amount, pool + amount);
        if percent > limits.max_exposure_percent {
            return Err(ErrorInfo::new(
                ErrorCode::ExposureTooHigh,
                format!(
                    "bet would give wallet {:.1}% of the pool (max {:.1}%)",
                    percent, limits.max_exposure_percent
                ),
            ));
        }
    }

    Ok(())
}

/// Time left before this wallet may bet again.
pub fn cooldown_remaining(last_bet: Option<Instant>, cooldown: Duration) -> Duration {
    match last_bet {
        Some(at) => cooldown.saturating_sub(at.elapsed()),
        None => Duration::ZERO,
    }
}

/// Bets this wallet may still place under the per-wallet limit.
pub fn remaining_bets_allowed(placed: u32, max: u32) -> u32 {
    max.saturating_sub(placed)
}

/// A wallet's share of the pool, in percent. Empty pools count as zero.
pub fn wallet_pool_percent(stake: Decimal, pool: Decimal) -> f64 {
    if pool <= Decimal::ZERO {
        return 0.0;
    }
    (stake / pool * Decimal::from(100)).to_f64().unwrap_or(0.0)
}
