use crate::{
    allocation::AllocationError,
    config::ConfigError,
    ledger::{LedgerError, RateError},
};

/// Recoverable failures of a simulation run.
///
/// Conservation violations are not represented here: they abort the run from
/// [`ClearingHouse::check_invariant`](crate::ledger::ClearingHouse::check_invariant).
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Rate(#[from] RateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("population generation failed: {0}")]
    Population(String),

    #[error("failed to write metrics: {0}")]
    Metrics(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to encode snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}
