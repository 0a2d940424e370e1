use std::{fs::File, io::Write, path::Path};

use serde::Serialize;

use crate::{error::SimulationError, ledger::Amount};

/// One row of the metrics log, taken after a month has been cleared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepMetrics {
    pub step: u64,
    pub gdp: Amount,
    pub total_tax: Amount,
    pub export: Amount,
    pub import: Amount,
    pub avg_wage: f64,
    pub unemployment: f64,
    pub gini_income: f64,
    pub gini_wealth: f64,
    pub hh_debt: Amount,
    pub firm_debt: Amount,
    pub bank_capital: Amount,
    pub bank_loans: Amount,
    pub bank_deposits: Amount,
    pub capital_adequacy: Option<f64>,
    pub ledger_digest: String,
}

#[derive(Debug, Default)]
pub struct MetricsLog {
    rows: Vec<StepMetrics>,
}

impl MetricsLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: StepMetrics) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[StepMetrics] {
        &self.rows
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), SimulationError> {
        let mut csv = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv.serialize(row)?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Writes the log as CSV. An empty log writes nothing.
    pub fn save(&self, path: &Path) -> Result<(), SimulationError> {
        if self.rows.is_empty() {
            return Ok(());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.write_to(File::create(path)?)
    }
}

/// Gini coefficient of `values`; 0 when they sum to zero. Negative values
/// (debts) are kept as they are.
pub fn gini(values: &[Amount]) -> f64 {
    let total: i128 = values.iter().map(|v| i128::from(*v)).sum();
    if values.is_empty() || total == 0 {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len() as f64;
    let mut running: i128 = 0;
    let mut cumulative_sum = 0.0;
    for value in &sorted {
        running += i128::from(*value);
        cumulative_sum += running as f64;
    }
    (n + 1.0 - 2.0 * cumulative_sum / total as f64) / n
}
