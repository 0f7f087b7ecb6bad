use thiserror::Error;

/// Errors surfaced by the simulator core.
///
/// Every fallible operation fails fast and leaves the game state untouched;
/// callers can treat any error as a no-op on the aggregate.
#[derive(Debug, Clone, Error)]
pub enum SimError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("insufficient balance: need {needed:.2}, have {available:.2}")]
    InsufficientBalance { needed: f64, available: f64 },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("insufficient data: need {need} candles, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
