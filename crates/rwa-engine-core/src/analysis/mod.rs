pub mod backtester;
pub mod benchmark;
pub mod strategies;

pub use backtester::{BacktestOutput, WalkForwardBacktester, WeightSnapshot};
pub use strategies::{BlStrategy, MarkowitzStrategy, Strategy};
