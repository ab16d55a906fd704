//! Investor-view sources.
//!
//! Every view source implements [`ViewGenerator`], so the optimization
//! engine consumes views through one uniform contract regardless of where
//! they come from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;

use crate::types::InvestorView;
use crate::EngineResult;

/// Contract every investor-view source must satisfy.
///
/// `current_prices` carries the latest price per ticker; implementations
/// use it to validate asset coverage before emitting a view. A view that
/// references an asset outside the current universe must never reach the
/// blender.
pub trait ViewGenerator {
    fn generate_views(
        &self,
        current_prices: &BTreeMap<String, Decimal>,
    ) -> EngineResult<Vec<InvestorView>>;
}

/// Produces views from a caller-supplied list.
///
/// Views referencing tickers absent from the current market data are
/// skipped, so downstream code never receives a view it cannot act on.
pub struct ManualViewGenerator {
    views: Vec<InvestorView>,
}

impl ManualViewGenerator {
    pub fn new(views: Vec<InvestorView>) -> Self {
        Self { views }
    }
}

impl ViewGenerator for ManualViewGenerator {
    fn generate_views(
        &self,
        current_prices: &BTreeMap<String, Decimal>,
    ) -> EngineResult<Vec<InvestorView>> {
        let universe: Vec<String> = current_prices.keys().cloned().collect();
        Ok(self
            .views
            .iter()
            .filter(|v| v.validate(&universe).is_ok())
            .cloned()
            .collect())
    }
}

/// Loads investor views from a static JSON file keyed by portfolio name.
///
/// Expected structure (decimals are string-encoded):
///
/// ```json
/// {
///   "mag_seven": [
///     {
///       "assets": ["NVDA"],
///       "weights": ["1.0"],
///       "expected_return": "0.30",
///       "confidence": "0.85",
///       "description": "Strong AI demand outlook"
///     }
///   ]
/// }
/// ```
///
/// A missing file or an absent portfolio key yields an empty view list;
/// a malformed file is an error. Views whose assets are missing from the
/// current market data are skipped.
pub struct JsonViewGenerator {
    portfolio_name: String,
    file_path: PathBuf,
}

impl JsonViewGenerator {
    const DEFAULT_VIEW_FILE: &'static str = "portfolios/views.json";

    pub fn new(portfolio_name: impl Into<String>) -> Self {
        Self {
            portfolio_name: portfolio_name.into(),
            file_path: PathBuf::from(Self::DEFAULT_VIEW_FILE),
        }
    }

    pub fn with_path(portfolio_name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            portfolio_name: portfolio_name.into(),
            file_path: path.as_ref().to_path_buf(),
        }
    }
}

impl ViewGenerator for JsonViewGenerator {
    fn generate_views(
        &self,
        current_prices: &BTreeMap<String, Decimal>,
    ) -> EngineResult<Vec<InvestorView>> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }

        let raw = std::fs::read_to_string(&self.file_path).map_err(|e| {
            crate::EngineError::DataIntegrity(format!(
                "cannot read view file {}: {e}",
                self.file_path.display()
            ))
        })?;

        let mut by_portfolio: BTreeMap<String, Vec<InvestorView>> = serde_json::from_str(&raw)?;
        let views = by_portfolio.remove(&self.portfolio_name).unwrap_or_default();

        let universe: Vec<String> = current_prices.keys().cloned().collect();
        Ok(views
            .into_iter()
            .filter(|v| v.validate(&universe).is_ok())
            .collect())
    }
}
