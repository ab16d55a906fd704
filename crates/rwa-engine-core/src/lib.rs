//! Black-Litterman allocation engine.
//!
//! Blends a market-equilibrium prior with subjective investor views,
//! optimises the posterior distribution for maximum Sharpe ratio, and
//! applies deterministic risk guardrails before weights reach execution.
//! A walk-forward backtester replays the full pipeline through historical
//! time and audits the resulting weight history.
//!
//! All arithmetic uses `rust_decimal` for reproducible, precision-stable
//! results. Market-data retrieval, view inference (ML/LLM), signing and
//! plotting are external collaborators and live outside this crate.

pub mod analysis;
pub mod core;
pub mod error;
pub mod execution;
mod matrix;
pub mod strategy;
pub mod types;

pub use error::EngineError;
pub use types::*;

/// Standard result type for all engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
