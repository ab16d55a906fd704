pub mod covariance;
pub mod engine;
pub mod optimizer;
pub mod posterior;
pub mod prior;
