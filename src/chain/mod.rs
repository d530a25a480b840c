//! On-chain capability consumed by the bet orchestrator.
//!
//! The orchestrator only ever talks to the [`ChainClient`] trait: allowance
//! and balance reads, approval and bet submission, receipt lookup. The
//! production implementation over JSON-RPC lives in [`rpc`]; tests inject
//! fakes.

pub mod rpc;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

pub use rpc::RpcChainClient;

/// USDT on Cronos uses 6 decimals. All user-facing amounts are converted
/// through this constant before touching the chain.
pub const USDT_DECIMALS: u32 = 6;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("invalid chain configuration: {0}")]
    Config(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("amount not representable in base units: {0}")]
    Amount(String),
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Injected chain reader/writer. One instance is bound to a wallet, the
/// USDT token contract, and the prediction market contract.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// USDT spending allowance granted by `owner` to the market contract.
    async fn allowance(&self, owner: Address) -> Result<U256, ChainError>;

    /// USDT balance of `owner`, in base units.
    async fn balance_of(&self, owner: Address) -> Result<U256, ChainError>;

    /// Chain id reported by the connected node.
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Submit `approve(market, amount)` on the token. Returns the tx hash
    /// as soon as the transaction is accepted into the mempool.
    async fn submit_approval(&self, amount: U256) -> Result<B256, ChainError>;

    /// Submit `placeBet(choice_code, amount)` on the market contract.
    async fn submit_place_bet(&self, choice_code: u8, amount: U256) -> Result<B256, ChainError>;

    /// Receipt for a submitted transaction, or None while still pending.
    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, ChainError>;
}

/// Convert a user-facing USDT amount into integer base units.
///
/// Rejects non-positive amounts and amounts with more fractional digits
/// than the token carries, rather than silently rounding a user's stake.
pub fn to_base_units(amount: Decimal) -> Result<U256, ChainError> {
    if amount <= Decimal::ZERO {
        return Err(ChainError::Amount(format!("non-positive amount {amount}")));
    }
    let scaled = amount
        .checked_mul(Decimal::from(10u64.pow(USDT_DECIMALS)))
        .ok_or_else(|| ChainError::Amount(format!("{amount} overflows base units")))?;
    if scaled != scaled.trunc() {
        return Err(ChainError::Amount(format!(
            "{amount} has more than {USDT_DECIMALS} fractional digits"
        )));
    }
    let units = scaled
        .to_u128()
        .ok_or_else(|| ChainError::Amount(format!("{amount} overflows base units")))?;
    Ok(U256::from(units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn converts_whole_and_fractional_amounts() {
        assert_eq!(
            to_base_units(Decimal::from(50)).unwrap(),
            U256::from(50_000_000u64)
        );
        assert_eq!(
            to_base_units(Decimal::from_str("0.000001").unwrap()).unwrap(),
            U256::from(1u64)
        );
        assert_eq!(
            to_base_units(Decimal::from_str("12.5").unwrap()).unwrap(),
            U256::from(12_500_000u64)
        );
    }

    #[test]
    fn rejects_unrepresentable_amounts() {
        assert!(to_base_units(Decimal::ZERO).is_err());
        assert!(to_base_units(Decimal::from(-5)).is_err());
        // 7 fractional digits cannot survive a 6-decimal token
        assert!(to_base_units(Decimal::from_str("0.0000001").unwrap()).is_err());
    }
}
