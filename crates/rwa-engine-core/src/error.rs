use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {field} — {reason}")]
    Configuration { field: String, reason: String },

    #[error("Data integrity: {0}")]
    DataIntegrity(String),

    #[error("Singular matrix encountered in {context}")]
    SingularMatrix { context: String },

    #[error("Infeasible optimization: {0}")]
    InfeasibleOptimization(String),

    #[error("Invalid view: {0}")]
    ViewValidation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}
