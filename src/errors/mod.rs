//! Stable error codes surfaced to callers.
//!
//! Every failure the engine records carries a machine-stable code plus the
//! raw message from whichever layer produced it. Message text for display
//! lives in a separate mapping (`user_message`) so the UI can override it;
//! unmapped codes fall back to the raw message.

use serde::{Deserialize, Serialize};

/// Machine-stable failure identifier. Codes from the backend that we do not
/// recognise are passed through verbatim as `Backend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    WalletNotConnected,
    WrongNetwork,
    InsufficientBalance,
    ApprovalRequired,
    TxFailed,
    TxTimeout,
    MarketNotActive,
    InvalidChoice,
    InvalidAmount,
    InvalidMarket,
    CooldownActive,
    BetLimitReached,
    ExposureTooHigh,
    ApiError,
    FetchError,
    InvalidData,
    Unknown,
    /// Unrecognised backend code, preserved unchanged.
    Backend(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::WalletNotConnected => "WALLET_NOT_CONNECTED",
            ErrorCode::WrongNetwork => "WRONG_NETWORK",
            ErrorCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorCode::ApprovalRequired => "APPROVAL_REQUIRED",
            ErrorCode::TxFailed => "TX_FAILED",
            ErrorCode::TxTimeout => "TX_TIMEOUT",
            ErrorCode::MarketNotActive => "MARKET_NOT_ACTIVE",
            ErrorCode::InvalidChoice => "INVALID_CHOICE",
            ErrorCode::InvalidAmount => "INVALID_AMOUNT",
            ErrorCode::InvalidMarket => "INVALID_MARKET",
            ErrorCode::CooldownActive => "COOLDOWN_ACTIVE",
            ErrorCode::BetLimitReached => "BET_LIMIT_REACHED",
            ErrorCode::ExposureTooHigh => "EXPOSURE_TOO_HIGH",
            ErrorCode::ApiError => "API_ERROR",
            ErrorCode::FetchError => "FETCH_ERROR",
            ErrorCode::InvalidData => "INVALID_DATA",
            ErrorCode::Unknown => "UNKNOWN_ERROR",
            ErrorCode::Backend(code) => code,
        }
    }

    /// Map a code string from a backend response onto the taxonomy,
    /// preserving unknown codes unchanged.
    pub fn from_backend(code: &str) -> Self {
        match code {
            "WALLET_NOT_CONNECTED" => ErrorCode::WalletNotConnected,
            "WRONG_NETWORK" => ErrorCode::WrongNetwork,
            "INSUFFICIENT_BALANCE" => ErrorCode::InsufficientBalance,
            "APPROVAL_REQUIRED" => ErrorCode::ApprovalRequired,
            "TX_FAILED" => ErrorCode::TxFailed,
            "TX_TIMEOUT" => ErrorCode::TxTimeout,
            "MARKET_NOT_ACTIVE" => ErrorCode::MarketNotActive,
            "INVALID_AMOUNT" => ErrorCode::InvalidAmount,
            "API_ERROR" => ErrorCode::ApiError,
            "UNKNOWN_ERROR" => ErrorCode::Unknown,
            other => ErrorCode::Backend(other.to_string()),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error as recorded in observable state: raw message plus stable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    pub code: ErrorCode,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Human-readable text for the wallet-facing codes. Presentation layers may
/// substitute their own table; anything unmapped falls back to the raw
/// message via [`display_message`].
pub fn user_message(code: &ErrorCode) -> Option<&'static str> {
    match code {
        ErrorCode::WalletNotConnected => Some("Please connect your wallet"),
        ErrorCode::WrongNetwork => Some("Please switch to the Cronos network"),
        ErrorCode::InsufficientBalance => Some("Insufficient USDT balance"),
        ErrorCode::ApprovalRequired => Some("Please approve USDT spending"),
        ErrorCode::TxFailed => Some("Transaction failed on blockchain"),
        ErrorCode::TxTimeout => Some("Transaction took too long"),
        ErrorCode::MarketNotActive => Some("Market is not accepting bets"),
        _ => None,
    }
}

/// Display text for an error: the mapped message when the code is known,
/// the raw message otherwise.
pub fn display_message(err: &ErrorInfo) -> String {
    user_message(&err.code)
        .map(str::to_string)
        .unwrap_or_else(|| err.message.clone())
}
