//! Bet placement: intent, business rules, and the lifecycle orchestrator.

pub mod orchestrator;
pub mod rules;

use crate::errors::ErrorInfo;
use alloy::primitives::{Address, B256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use orchestrator::{
    retry_bet_confirmation, retry_bet_confirmation_with_backoff, BetOrchestrator,
    OrchestratorTiming,
};
pub use rules::BetLimits;

/// Which side of a binary market the bet backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetChoice {
    Yes,
    No,
}

impl BetChoice {
    /// Wire encoding used by the market contract.
    pub fn code(&self) -> u8 {
        match self {
            BetChoice::Yes => 0,
            BetChoice::No => 1,
        }
    }
}

impl std::fmt::Display for BetChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BetChoice::Yes => write!(f, "YES"),
            BetChoice::No => write!(f, "NO"),
        }
    }
}

/// A caller's validated request to wager. Immutable; consumed by one
/// orchestration run.
#[derive(Debug, Clone, PartialEq)]
pub struct BetIntent {
    pub choice: BetChoice,
    pub amount: Decimal,
    pub market_id: String,
    pub wallet: Address,
}

/// Phase of one bet attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BetPhase {
    #[default]
    Idle,
    /// Spending allowance was short; an approval transaction is in flight.
    Approving,
    /// Bet transaction submitted, waiting for the receipt.
    Pending,
    /// On-chain success; backend confirmation call in flight.
    Confirming,
    Success,
    Error,
}

impl std::fmt::Display for BetPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BetPhase::Idle => write!(f, "idle"),
            BetPhase::Approving => write!(f, "approval"),
            BetPhase::Pending => write!(f, "pending"),
            BetPhase::Confirming => write!(f, "confirming"),
            BetPhase::Success => write!(f, "success"),
            BetPhase::Error => write!(f, "error"),
        }
    }
}

/// Observable state of one bet attempt.
///
/// Invariants: `bet_id` is set only in `Success`; `error` only in `Error`.
/// The tx hash is recorded as soon as the bet transaction is submitted, so
/// a caller can show it even if a later step fails.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BetState {
    pub phase: BetPhase,
    pub tx_hash: Option<B256>,
    pub bet_id: Option<String>,
    pub error: Option<ErrorInfo>,
}

/// Result value returned to the caller. Failures carry their detail in the
/// observable state, never across this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BetOutcome {
    pub success: bool,
    pub bet_id: Option<String>,
}

impl BetOutcome {
    pub fn failed() -> Self {
        Self::default()
    }

    pub fn confirmed(bet_id: String) -> Self {
        Self {
            success: true,
            bet_id: Some(bet_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_codes_match_the_contract() {
        assert_eq!(BetChoice::Yes.code(), 0);
        assert_eq!(BetChoice::No.code(), 1);
    }

    #[test]
    fn choice_serialises_uppercase() {
        assert_eq!(serde_json::to_string(&BetChoice::Yes).unwrap(), "\"YES\"");
        assert_eq!(serde_json::to_string(&BetChoice::No).unwrap(), "\"NO\"");
    }

    #[test]
    fn fresh_state_is_idle_and_empty() {
        let state = BetState::default();
        assert_eq!(state.phase, BetPhase::Idle);
        assert!(state.tx_hash.is_none());
        assert!(state.bet_id.is_none());
        assert!(state.error.is_none());
    }
}
