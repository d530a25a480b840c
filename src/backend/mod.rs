//! HTTP client for the backend bets/markets API.
//!
//! Responses are modeled as tagged outcomes rather than optional-field
//! objects: a confirmation is either `Confirmed` with a bet id or
//! `Rejected` with the backend's message and code, so a forgotten
//! success-flag check cannot typecheck.

use crate::bet::{BetChoice, BetIntent};
use alloy::primitives::B256;
use crate::errors::{ErrorCode, ErrorInfo};
use crate::market::{pool_percentages, MarketSnapshot, MarketStats, MarketStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },
    #[error("invalid payload: {0}")]
    InvalidData(String),
}

impl ApiError {
    /// Collapse into the `{message, code}` form carried in observable
    /// state. Backend-supplied codes pass through unchanged.
    pub fn to_error_info(&self) -> ErrorInfo {
        match self {
            ApiError::Request(e) => ErrorInfo::new(ErrorCode::FetchError, e.to_string()),
            ApiError::Api { message, code, .. } => {
                let code = code
                    .as_deref()
                    .map(ErrorCode::from_backend)
                    .unwrap_or(ErrorCode::ApiError);
                ErrorInfo::new(code, message.clone())
            }
            ApiError::InvalidData(msg) => ErrorInfo::new(ErrorCode::InvalidData, msg.clone()),
        }
    }
}

/// Bet confirmation request body, exactly the wire shape the backend
/// validates against the transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub tx_hash: String,
    pub market_id: String,
    pub choice: BetChoice,
    pub amount: Decimal,
    pub wallet_address: String,
}

impl ConfirmRequest {
    /// The confirmation body for an intent whose bet transaction was
    /// submitted as `tx_hash`.
    pub fn from_intent(intent: &BetIntent, tx_hash: B256) -> Self {
        Self {
            tx_hash: tx_hash.to_string(),
            market_id: intent.market_id.clone(),
            choice: intent.choice,
            amount: intent.amount,
            wallet_address: intent.wallet.to_string(),
        }
    }
}

/// Outcome of a confirmation call that reached the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    Confirmed { bet_id: String },
    Rejected { message: String, code: Option<String> },
}

/// Capability to durably record a confirmed bet.
#[async_trait]
pub trait ConfirmApi: Send + Sync + 'static {
    async fn confirm_bet(&self, request: &ConfirmRequest) -> Result<ConfirmOutcome, ApiError>;
}

/// Capability to fetch a market snapshot.
#[async_trait]
pub trait MarketFetch: Send + Sync + 'static {
    async fn fetch_market(
        &self,
        market_id: &str,
        include_stats: bool,
    ) -> Result<MarketSnapshot, ApiError>;
}

/// Backend API client over reqwest.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl ConfirmApi for BackendClient {
    async fn confirm_bet(&self, request: &ConfirmRequest) -> Result<ConfirmOutcome, ApiError> {
        let url = format!("{}/api/bets/confirm", self.base_url);
        let resp = self.http.post(&url).json(request).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        if !(200..300).contains(&status) {
            // Error bodies still carry {error, code} when the backend
            // rejected the bet rather than fell over.
            if let Ok(err) = serde_json::from_str::<WireError>(&body) {
                return Ok(ConfirmOutcome::Rejected {
                    message: err.error,
                    code: err.code,
                });
            }
            return Err(ApiError::Api {
                status,
                message: body,
                code: None,
            });
        }

        let parsed: WireConfirm = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidData(format!("confirm response: {e}")))?;
        if parsed.success {
            let bet_id = parsed
                .bet_id
                .ok_or_else(|| ApiError::InvalidData("success without betId".to_string()))?;
            debug!(bet_id = %bet_id, "bet confirmed by backend");
            Ok(ConfirmOutcome::Confirmed { bet_id })
        } else {
            Ok(ConfirmOutcome::Rejected {
                message: parsed
                    .error
                    .unwrap_or_else(|| "bet confirmation failed".to_string()),
                code: parsed.code,
            })
        }
    }
}

#[async_trait]
impl MarketFetch for BackendClient {
    async fn fetch_market(
        &self,
        market_id: &str,
        include_stats: bool,
    ) -> Result<MarketSnapshot, ApiError> {
        let mut url = format!("{}/api/markets/{}", self.base_url, market_id);
        if include_stats {
            url.push_str("?includeStats=true");
        }

        let resp = self.http.get(&url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        if !(200..300).contains(&status) {
            let err = serde_json::from_str::<WireError>(&body).unwrap_or(WireError {
                error: body,
                code: None,
            });
            return Err(ApiError::Api {
                status,
                message: err.error,
                code: err.code,
            });
        }

        let envelope: WireMarketEnvelope = serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidData(format!("market response: {e}")))?;
        if !envelope.success {
            return Err(ApiError::InvalidData("market envelope not successful".into()));
        }
        let market = envelope
            .market
            .ok_or_else(|| ApiError::InvalidData("market envelope missing market".into()))?;
        market.into_snapshot()
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireConfirm {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    bet_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMarketEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    market: Option<WireMarket>,
}

/// Market as the backend serialises it. Converted into the domain
/// snapshot with the RESOLVED-implies-winner invariant enforced.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMarket {
    market_id: String,
    question: String,
    status: MarketStatus,
    #[serde(default)]
    winner: Option<String>,
    yes_pool: Decimal,
    no_pool: Decimal,
    total_pool: Decimal,
    #[serde(default)]
    yes_percent: Option<f64>,
    #[serde(default)]
    no_percent: Option<f64>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    #[serde(default)]
    time_remaining: Option<i64>,
    #[serde(default)]
    has_ended: bool,
    #[serde(default)]
    total_bets: u64,
    #[serde(default)]
    stats: Option<MarketStats>,
}

impl WireMarket {
    fn into_snapshot(self) -> Result<MarketSnapshot, ApiError> {
        if self.status == MarketStatus::Resolved && self.winner.is_none() {
            return Err(ApiError::InvalidData(format!(
                "market {} resolved without a winner",
                self.market_id
            )));
        }

        let (yes_percent, no_percent) = match (self.yes_percent, self.no_percent) {
            (Some(yes), Some(no)) => (yes, no),
            _ => pool_percentages(self.yes_pool, self.no_pool),
        };
        let time_remaining_secs = self
            .time_remaining
            .unwrap_or_else(|| (self.end_date - Utc::now()).num_seconds().max(0));

        Ok(MarketSnapshot {
            market_id: self.market_id,
            question: self.question,
            status: self.status,
            winner: self.winner,
            yes_pool: self.yes_pool,
            no_pool: self.no_pool,
            total_pool: self.total_pool,
            yes_percent,
            no_percent,
            start_date: self.start_date,
            end_date: self.end_date,
            time_remaining_secs,
            has_ended: self.has_ended,
            total_bets: self.total_bets,
            stats: self.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_market_parses_and_converts() {
        let json = r#"{
            "marketId": "btc-100k",
            "question": "Will BTC reach $100k?",
            "status": "ACTIVE",
            "yesPool": "150",
            "noPool": "100",
            "totalPool": "250",
            "startDate": "2026-01-01T00:00:00Z",
            "endDate": "2026-12-31T00:00:00Z",
            "timeRemaining": 86400,
            "totalBets": 11
        }"#;
        let wire: WireMarket = serde_json::from_str(json).unwrap();
        let snap = wire.into_snapshot().unwrap();
        assert_eq!(snap.market_id, "btc-100k");
        assert_eq!(snap.yes_pool, Decimal::from(150));
        // percents absent from the wire are derived from the pools
        assert!((snap.yes_percent - 60.0).abs() < 1e-9);
        assert!((snap.no_percent - 40.0).abs() < 1e-9);
        assert_eq!(snap.time_remaining_secs, 86400);
    }

    #[test]
    fn resolved_without_winner_is_invalid() {
        let json = r#"{
            "marketId": "m1",
            "question": "q",
            "status": "RESOLVED",
            "yesPool": "1",
            "noPool": "1",
            "totalPool": "2",
            "startDate": "2026-01-01T00:00:00Z",
            "endDate": "2026-01-02T00:00:00Z"
        }"#;
        let wire: WireMarket = serde_json::from_str(json).unwrap();
        assert!(matches!(
            wire.into_snapshot(),
            Err(ApiError::InvalidData(_))
        ));
    }

    #[test]
    fn confirm_request_serialises_to_the_wire_contract() {
        let req = ConfirmRequest {
            tx_hash: "0xabc".into(),
            market_id: "m1".into(),
            choice: BetChoice::Yes,
            amount: Decimal::from(50),
            wallet_address: "0xwallet".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["txHash"], "0xabc");
        assert_eq!(json["marketId"], "m1");
        assert_eq!(json["choice"], "YES");
        assert_eq!(json["walletAddress"], "0xwallet");
    }

    #[test]
    fn api_error_maps_backend_codes_unchanged() {
        let err = ApiError::Api {
            status: 400,
            message: "market closed".into(),
            code: Some("MARKET_NOT_ACTIVE".into()),
        };
        let info = err.to_error_info();
        assert_eq!(info.code, ErrorCode::MarketNotActive);
        assert_eq!(info.message, "market closed");

        let unknown = ApiError::Api {
            status: 400,
            message: "odds moved".into(),
            code: Some("ODDS_CHANGED".into()),
        };
        assert_eq!(
            unknown.to_error_info().code,
            ErrorCode::Backend("ODDS_CHANGED".into())
        );
    }
}
