//! Error handling for the simulation core.
//!
//! Configuration problems are always fatal and surface before any patient is
//! simulated; run-time sampling never fails. Invariant violations are
//! programming defects and are asserted at the point of detection rather
//! than reported through this type.

/// Specialized error type for the simulation core
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Malformed or inconsistent configuration, naming the offending parameter
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A precondition check failed before the run started
    #[error("Precondition error: {0}")]
    PreconditionError(String),

    /// A disease-state label outside the closed enumeration
    #[error("Unknown disease state: {0}")]
    UnknownState(String),

    /// A discontinuation-reason tag outside the fixed taxonomy
    #[error("Unknown discontinuation reason: {0}")]
    UnknownReason(String),
}

impl SimulationError {
    /// Configuration error naming the offending parameter
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Failed precondition check before the run starts
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionError(msg.into())
    }
}

/// Result type for simulation-core operations
pub type Result<T> = std::result::Result<T, SimulationError>;
