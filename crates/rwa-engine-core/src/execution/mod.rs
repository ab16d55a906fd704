pub mod risk_manager;

pub use risk_manager::RiskGuardrailEngine;
