//! Client-side engine for the betline wagering front end.
//!
//! Two core components:
//! - [`bet::BetOrchestrator`] drives a bet from validated intent through
//!   token approval, on-chain submission, receipt confirmation, and backend
//!   settlement confirmation.
//! - [`market::MarketWatcher`] keeps a cached, push-updated, poll-refreshed
//!   view of one market consistent for display.
//!
//! Everything network- or chain-facing sits behind a trait
//! ([`chain::ChainClient`], [`backend::ConfirmApi`], [`backend::MarketFetch`],
//! [`market::PushConnect`]) so the engine runs identically under a UI,
//! a CLI, or a test harness.

pub mod backend;
pub mod bet;
pub mod chain;
pub mod config;
pub mod errors;
pub mod market;
