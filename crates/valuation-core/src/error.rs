use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Undefined formula: {0}")]
    UndefinedFormula(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Stale inputs: {0}")]
    StaleInputs(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Training unstable: {0}")]
    TrainingUnstable(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Machine-readable reason code carried in response `reasons[]`.
    pub fn reason_code(&self) -> &'static str {
        match self {
            EngineError::InsufficientData(_) => "insufficient_data",
            EngineError::UndefinedFormula(_) => "undefined_formula",
            EngineError::UpstreamUnavailable(_) => "upstream_unavailable",
            EngineError::StaleInputs(_) => "stale_inputs",
            EngineError::InvariantViolation(_) => "invariant_violation",
            EngineError::TrainingUnstable(_) => "training_unstable",
            EngineError::DeadlineExceeded(_) => "deadline_exceeded",
            EngineError::Storage(_) => "storage_error",
        }
    }
}
