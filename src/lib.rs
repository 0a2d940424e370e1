//! Agent-based monthly economy simulator.
//!
//! Every movement of money goes through a single [`ledger::ClearingHouse`],
//! which applies tax at the moment of transfer and guarantees that the sum of
//! all balances equals the money issued by the central bank.

pub mod agents;
pub mod allocation;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod model;
pub mod population;

pub use allocation::{proportional_split, AllocationError, Disbursement, PlannedTransfer};
pub use config::{Config, ConfigError, Policy};
pub use error::SimulationError;
pub use ledger::{AccountId, Amount, ClearingHouse, LedgerError, LedgerSnapshot, Rate, TaxRate};
pub use metrics::{MetricsLog, StepMetrics};
pub use model::{EconomyModel, Phase};
