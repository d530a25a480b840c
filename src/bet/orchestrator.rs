//! Transaction lifecycle orchestrator.
//!
//! Drives one bet attempt through an explicit state machine:
//!
//!   Idle -> Approving? -> Pending -> Confirming -> Success | Error
//!
//! Steps are strictly sequential; no step starts before the previous one's
//! terminal outcome is known. Errors are captured into the observable
//! [`BetState`] and never thrown across the public operation boundary.
//! `reset()` bumps a run epoch: a superseded run stops polling and its late
//! results no longer mutate state, though requests already in flight are
//! not aborted server-side.

use crate::backend::{ConfirmApi, ConfirmOutcome, ConfirmRequest};
use crate::bet::rules::{self, BetLimits, RuleContext};
use crate::bet::{BetChoice, BetIntent, BetOutcome, BetPhase, BetState};
use crate::chain::{to_base_units, ChainClient, TxReceipt};
use crate::errors::{ErrorCode, ErrorInfo};
use crate::market::SnapshotCache;
use alloy::primitives::{Address, B256};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Receipt polling cadence and ceiling.
#[derive(Debug, Clone)]
pub struct OrchestratorTiming {
    pub receipt_poll: Duration,
    pub receipt_timeout: Duration,
}

impl Default for OrchestratorTiming {
    fn default() -> Self {
        Self {
            receipt_poll: Duration::from_secs(3),
            receipt_timeout: Duration::from_secs(60),
        }
    }
}

impl OrchestratorTiming {
    pub fn from_config(cfg: &crate::config::ChainConfig) -> Self {
        Self {
            receipt_poll: Duration::from_millis(cfg.receipt_poll_ms),
            receipt_timeout: Duration::from_secs(cfg.receipt_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MarketActivity {
    bets: u32,
    staked: Decimal,
}

enum WaitOutcome {
    Mined(TxReceipt),
    TimedOut,
    Cancelled,
}

/// Orchestrates bet placement against an injected chain client and
/// confirmation API. One instance per wallet session; attempts are
/// independent across instances.
pub struct BetOrchestrator {
    chain: Arc<dyn ChainClient>,
    confirm: Arc<dyn ConfirmApi>,
    limits: BetLimits,
    timing: OrchestratorTiming,
    expected_chain_id: u64,
    wallet: Option<Address>,
    /// Shared snapshot cache, consulted (never fetched) for local
    /// market-status and exposure checks.
    cache: Option<SnapshotCache>,
    state_tx: watch::Sender<BetState>,
    epoch: AtomicU64,
    last_bet_at: DashMap<Address, Instant>,
    activity: DashMap<(Address, String), MarketActivity>,
}

impl BetOrchestrator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        confirm: Arc<dyn ConfirmApi>,
        limits: BetLimits,
        timing: OrchestratorTiming,
        expected_chain_id: u64,
        wallet: Option<Address>,
    ) -> Self {
        let (state_tx, _) = watch::channel(BetState::default());
        Self {
            chain,
            confirm,
            limits,
            timing,
            expected_chain_id,
            wallet,
            cache: None,
            state_tx,
            epoch: AtomicU64::new(0),
            last_bet_at: DashMap::new(),
            activity: DashMap::new(),
        }
    }

    /// Use the shared market cache for local status and exposure checks.
    pub fn with_market_cache(mut self, cache: SnapshotCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Observe phase transitions, tx hash, bet id and errors.
    pub fn subscribe(&self) -> watch::Receiver<BetState> {
        self.state_tx.subscribe()
    }

    /// Current state snapshot.
    pub fn state(&self) -> BetState {
        self.state_tx.borrow().clone()
    }

    /// Back to `Idle`, discarding any in-flight polling. In-flight network
    /// calls are not suppressed; only their effects on state are.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.state_tx.send_replace(BetState::default());
        debug!("orchestrator reset");
    }

    /// Place a bet. Returns the outcome; failure detail is in the
    /// observable state.
    pub async fn place_bet(
        &self,
        choice: BetChoice,
        amount: Decimal,
        market_id: &str,
    ) -> BetOutcome {
        let run = self.epoch.load(Ordering::SeqCst);
        let started = Instant::now();

        // ---- input validation: no network or chain calls ----
        let wallet = match self.wallet {
            Some(w) => w,
            None => {
                return self.fail(
                    run,
                    "validate",
                    started,
                    ErrorInfo::new(ErrorCode::WalletNotConnected, "wallet not connected"),
                );
            }
        };
        if market_id.is_empty() {
            return self.fail(
                run,
                "validate",
                started,
                ErrorInfo::new(ErrorCode::InvalidMarket, "market id is empty"),
            );
        }
        if let Err(info) = rules::validate_amount(amount, &self.limits) {
            return self.fail(run, "validate", started, info);
        }
        let intent = BetIntent {
            choice,
            amount,
            market_id: market_id.to_string(),
            wallet,
        };

        // ---- business rules: still before any chain call ----
        let ctx = self.rule_context(wallet, market_id);
        if let Err(info) = rules::validate_rules(amount, &self.limits, &ctx) {
            return self.fail(run, "rules", started, info);
        }
        if let Some(snapshot) = self.cache.as_ref().and_then(|c| c.get_fresh(market_id)) {
            if !snapshot.can_bet() {
                return self.fail(
                    run,
                    "rules",
                    started,
                    ErrorInfo::new(
                        ErrorCode::MarketNotActive,
                        format!("market {market_id} is not accepting bets"),
                    ),
                );
            }
        }

        info!(
            choice = %choice,
            amount = %amount,
            market = market_id,
            "bet placement started"
        );

        let amount_units = match to_base_units(amount) {
            Ok(units) => units,
            Err(e) => {
                return self.fail(
                    run,
                    "validate",
                    started,
                    ErrorInfo::new(ErrorCode::InvalidAmount, e.to_string()),
                );
            }
        };

        // ---- wallet / network checks ----
        match self.chain.chain_id().await {
            Ok(id) if id == self.expected_chain_id => {}
            Ok(id) => {
                return self.fail(
                    run,
                    "network",
                    started,
                    ErrorInfo::new(
                        ErrorCode::WrongNetwork,
                        format!("connected to chain {id}, expected {}", self.expected_chain_id),
                    ),
                );
            }
            Err(e) => {
                return self.fail(
                    run,
                    "network",
                    started,
                    ErrorInfo::new(ErrorCode::Unknown, e.to_string()),
                );
            }
        }

        match self.chain.balance_of(wallet).await {
            Ok(balance) if balance >= amount_units => {}
            Ok(_) => {
                return self.fail(
                    run,
                    "balance",
                    started,
                    ErrorInfo::new(
                        ErrorCode::InsufficientBalance,
                        format!("USDT balance below bet of {amount}"),
                    ),
                );
            }
            Err(e) => {
                return self.fail(
                    run,
                    "balance",
                    started,
                    ErrorInfo::new(ErrorCode::Unknown, e.to_string()),
                );
            }
        }

        // ---- approval, only when the allowance is short ----
        match self.chain.allowance(wallet).await {
            Ok(allowance) if allowance >= amount_units => {
                debug!(market = market_id, "allowance sufficient, skipping approval");
            }
            Ok(_) => {
                if !self.run_approval(run).await {
                    return BetOutcome::failed();
                }
            }
            Err(e) => {
                return self.fail(
                    run,
                    "approval",
                    started,
                    ErrorInfo::new(ErrorCode::Unknown, e.to_string()),
                );
            }
        }

        if self.cancelled(run) {
            return BetOutcome::failed();
        }

        // ---- submit the bet transaction ----
        self.apply(run, |s| {
            s.phase = BetPhase::Pending;
            s.error = None;
            s.bet_id = None;
            s.tx_hash = None;
        });

        let tx_hash = match self.chain.submit_place_bet(choice.code(), amount_units).await {
            Ok(hash) => hash,
            Err(e) => {
                return self.fail(
                    run,
                    "submit",
                    started,
                    ErrorInfo::new(ErrorCode::TxFailed, e.to_string()),
                );
            }
        };
        // Recorded before confirmation so the caller can show a pending
        // hash even if a later step fails.
        self.apply(run, |s| s.tx_hash = Some(tx_hash));
        info!(tx = %tx_hash, choice = %choice, amount = %amount, "bet transaction sent");

        // ---- wait for the receipt ----
        let receipt = match self.wait_for_receipt(run, tx_hash).await {
            WaitOutcome::Mined(receipt) => receipt,
            WaitOutcome::TimedOut => {
                return self.fail(
                    run,
                    "receipt",
                    started,
                    ErrorInfo::new(
                        ErrorCode::TxTimeout,
                        format!(
                            "no receipt for {tx_hash} within {}s",
                            self.timing.receipt_timeout.as_secs()
                        ),
                    ),
                );
            }
            WaitOutcome::Cancelled => return BetOutcome::failed(),
        };
        if !receipt.success {
            return self.fail(
                run,
                "receipt",
                started,
                ErrorInfo::new(ErrorCode::TxFailed, format!("transaction {tx_hash} reverted")),
            );
        }
        info!(
            tx = %tx_hash,
            block = receipt.block_number,
            duration_ms = started.elapsed().as_millis() as u64,
            "bet transaction confirmed on chain"
        );

        // ---- backend confirmation ----
        self.apply(run, |s| s.phase = BetPhase::Confirming);
        let request = ConfirmRequest::from_intent(&intent, tx_hash);
        let outcome = match self.confirm.confirm_bet(&request).await {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(run, "confirm", started, e.to_error_info()),
        };
        let bet_id = match outcome {
            ConfirmOutcome::Confirmed { bet_id } => bet_id,
            ConfirmOutcome::Rejected { message, code } => {
                let code = code
                    .as_deref()
                    .map(ErrorCode::from_backend)
                    .unwrap_or(ErrorCode::ApiError);
                return self.fail(run, "confirm", started, ErrorInfo::new(code, message));
            }
        };

        // ---- success ----
        if self.cancelled(run) {
            return BetOutcome::failed();
        }
        self.record_bet(wallet, market_id, amount);
        self.apply(run, |s| {
            s.phase = BetPhase::Success;
            s.bet_id = Some(bet_id.clone());
            s.error = None;
        });
        info!(
            bet_id = %bet_id,
            tx = %tx_hash,
            market = market_id,
            duration_ms = started.elapsed().as_millis() as u64,
            "bet placed successfully"
        );
        BetOutcome::confirmed(bet_id)
    }

    /// Standalone USDT approval: submit, then poll until terminal.
    pub async fn approve_usdt(&self) -> bool {
        let run = self.epoch.load(Ordering::SeqCst);
        if self.wallet.is_none() {
            self.fail(
                run,
                "approval",
                Instant::now(),
                ErrorInfo::new(ErrorCode::WalletNotConnected, "wallet not connected"),
            );
            return false;
        }
        let approved = self.run_approval(run).await;
        if approved {
            self.apply(run, |s| s.phase = BetPhase::Idle);
        }
        approved
    }

    /// The approval sub-sequence: submit approve(market, max_bet), poll the
    /// receipt until success, failure, or the timeout ceiling.
    async fn run_approval(&self, run: u64) -> bool {
        let started = Instant::now();
        self.apply(run, |s| {
            s.phase = BetPhase::Approving;
            s.error = None;
        });
        info!(stage = "approval", "requesting USDT approval");

        let approve_units = match to_base_units(self.limits.max_bet) {
            Ok(units) => units,
            Err(e) => {
                self.fail(
                    run,
                    "approval",
                    started,
                    ErrorInfo::new(ErrorCode::ApprovalRequired, e.to_string()),
                );
                return false;
            }
        };
        let tx_hash = match self.chain.submit_approval(approve_units).await {
            Ok(hash) => hash,
            Err(e) => {
                self.fail(
                    run,
                    "approval",
                    started,
                    ErrorInfo::new(ErrorCode::ApprovalRequired, e.to_string()),
                );
                return false;
            }
        };
        info!(stage = "approval", tx = %tx_hash, "approval transaction sent");

        match self.wait_for_receipt(run, tx_hash).await {
            WaitOutcome::Mined(receipt) if receipt.success => {
                info!(
                    stage = "approval",
                    tx = %tx_hash,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "USDT approval confirmed"
                );
                true
            }
            WaitOutcome::Mined(_) => {
                self.fail(
                    run,
                    "approval",
                    started,
                    ErrorInfo::new(
                        ErrorCode::TxFailed,
                        format!("approval transaction {tx_hash} reverted"),
                    ),
                );
                false
            }
            WaitOutcome::TimedOut => {
                self.fail(
                    run,
                    "approval",
                    started,
                    ErrorInfo::new(ErrorCode::TxTimeout, "approval transaction timeout"),
                );
                false
            }
            WaitOutcome::Cancelled => false,
        }
    }

    /// Poll the receipt at the configured cadence, bounded by the timeout
    /// ceiling. Transient lookup errors are tolerated until the ceiling.
    async fn wait_for_receipt(&self, run: u64, tx_hash: B256) -> WaitOutcome {
        let started = Instant::now();
        loop {
            if self.cancelled(run) {
                return WaitOutcome::Cancelled;
            }
            match self.chain.receipt(tx_hash).await {
                Ok(Some(receipt)) => return WaitOutcome::Mined(receipt),
                Ok(None) => {}
                Err(e) => {
                    warn!(tx = %tx_hash, error = %e, "receipt lookup failed, retrying");
                }
            }
            let elapsed = started.elapsed();
            if elapsed >= self.timing.receipt_timeout {
                return WaitOutcome::TimedOut;
            }
            let wait = self
                .timing
                .receipt_poll
                .min(self.timing.receipt_timeout - elapsed);
            tokio::time::sleep(wait).await;
        }
    }

    fn rule_context(&self, wallet: Address, market_id: &str) -> RuleContext {
        let cooldown_remaining = rules::cooldown_remaining(
            self.last_bet_at.get(&wallet).map(|at| *at),
            self.limits.cooldown,
        );
        let (bets_placed, wallet_stake) = self
            .activity
            .get(&(wallet, market_id.to_string()))
            .map(|a| (a.bets, a.staked))
            .unwrap_or((0, Decimal::ZERO));
        let pool_total = self
            .cache
            .as_ref()
            .and_then(|c| c.get_fresh(market_id))
            .map(|s| s.total_pool);
        RuleContext {
            cooldown_remaining,
            bets_placed,
            wallet_stake,
            pool_total,
        }
    }

    fn record_bet(&self, wallet: Address, market_id: &str, amount: Decimal) {
        self.last_bet_at.insert(wallet, Instant::now());
        let mut entry = self
            .activity
            .entry((wallet, market_id.to_string()))
            .or_default();
        entry.bets += 1;
        entry.staked += amount;
    }

    fn cancelled(&self, run: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != run
    }

    /// Mutate observable state unless this run has been superseded by a
    /// `reset()`.
    fn apply(&self, run: u64, mutate: impl FnOnce(&mut BetState)) {
        self.state_tx.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != run {
                return false;
            }
            mutate(state);
            true
        });
    }

    fn fail(&self, run: u64, stage: &str, started: Instant, info: ErrorInfo) -> BetOutcome {
        error!(
            stage = stage,
            code = %info.code,
            error = %info.message,
            duration_ms = started.elapsed().as_millis() as u64,
            "bet placement failed"
        );
        self.apply(run, move |s| {
            s.phase = BetPhase::Error;
            s.bet_id = None;
            s.error = Some(info);
        });
        BetOutcome::failed()
    }
}

/// Re-attempt only the backend confirmation step for an already-submitted
/// transaction, with exponential backoff across bounded attempts.
pub async fn retry_bet_confirmation(
    confirm: &dyn ConfirmApi,
    request: &ConfirmRequest,
    max_retries: u32,
) -> BetOutcome {
    retry_bet_confirmation_with_backoff(confirm, request, max_retries, Duration::from_secs(1)).await
}

/// As [`retry_bet_confirmation`] with an explicit backoff unit; the delay
/// before attempt `n+1` is `backoff_unit * 2^(n-1)`.
pub async fn retry_bet_confirmation_with_backoff(
    confirm: &dyn ConfirmApi,
    request: &ConfirmRequest,
    max_retries: u32,
    backoff_unit: Duration,
) -> BetOutcome {
    let mut last_error = String::new();
    for attempt in 1..=max_retries {
        info!(
            tx = %request.tx_hash,
            attempt,
            max_retries,
            "retrying bet confirmation"
        );
        match confirm.confirm_bet(request).await {
            Ok(ConfirmOutcome::Confirmed { bet_id }) => {
                info!(tx = %request.tx_hash, attempt, bet_id = %bet_id, "retry succeeded");
                return BetOutcome::confirmed(bet_id);
            }
            Ok(ConfirmOutcome::Rejected { message, .. }) => last_error = message,
            Err(e) => last_error = e.to_string(),
        }
        if attempt < max_retries {
            tokio::time::sleep(backoff_unit * 2u32.pow(attempt - 1)).await;
        }
    }
    error!(
        tx = %request.tx_hash,
        max_retries,
        error = %last_error,
        "all confirmation retries failed"
    );
    BetOutcome::failed()
}
