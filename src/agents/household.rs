use serde::{Deserialize, Serialize};

use crate::{
    allocation::Disbursement,
    config::Policy,
    error::SimulationError,
    ledger::{AccountId, Amount, ClearingHouse, Rate},
};

use super::{EMPLOYMENT_EXCHANGE, FOREIGN_SECTOR};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Worker,
    Pensioner,
    Disabled,
    Veteran,
    ChildFamily,
    Unemployed,
}

impl Category {
    /// Categories that take a job when one is available.
    pub fn in_labour_force(self) -> bool {
        matches!(self, Category::Worker | Category::ChildFamily)
    }
}

#[derive(Clone, Debug)]
pub struct Household {
    pub id: AccountId,
    pub region: AccountId,
    /// Firm the household works for, or the employment exchange.
    pub employer: Option<AccountId>,
    pub category: Category,
    pub age: u32,
    pub children: u32,
    /// Mirror of the ledger balance, refreshed after every month.
    pub savings: Amount,
    pub consumption_rate: Rate,
    pub income_labor: Amount,
    pub income_transfer: Amount,
}

/// What one household spent in a month.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spending {
    pub imports: Amount,
    pub domestic: Disbursement,
    pub tax: Amount,
}

impl Household {
    pub fn income(&self) -> Amount {
        self.income_labor + self.income_transfer
    }

    pub fn is_unemployed(&self) -> bool {
        self.employer == Some(EMPLOYMENT_EXCHANGE)
    }

    pub fn start_month(&mut self) {
        self.income_labor = 0;
        self.income_transfer = 0;
    }

    pub fn receive_wage(&mut self, amount: Amount) {
        self.income_labor += amount;
    }

    pub fn receive_transfer(&mut self, amount: Amount) {
        self.income_transfer += amount;
    }

    pub fn sync(&mut self, ledger: &ClearingHouse) {
        self.savings = ledger.balance(self.id);
    }

    /// Spends `round(income * consumption_rate)`: an import share goes to the
    /// foreign sector, the rest is split across `sellers` by weight. All
    /// purchases are taxed. Spending may exceed income and run into savings.
    pub fn consume(
        &self,
        ledger: &mut ClearingHouse,
        sellers: &[(AccountId, u64)],
        policy: &Policy,
    ) -> Result<Spending, SimulationError> {
        let mut spending = Spending {
            imports: 0,
            domestic: Disbursement {
                from: self.id,
                transfers: Vec::new(),
            },
            tax: 0,
        };
        let budget = self.consumption_rate.apply(self.income())?;
        if budget <= 0 {
            return Ok(spending);
        }

        let imports = policy.import_share.apply(budget)?;
        if imports > 0 {
            spending.tax += ledger.transfer(self.id, FOREIGN_SECTOR, imports, Some(policy.tax))?;
            spending.imports = imports;
        }

        let domestic = budget - imports;
        if domestic <= 0 || sellers.is_empty() {
            return Ok(spending);
        }
        spending.domestic = Disbursement::proportional(self.id, domestic, sellers)?;
        spending.tax += ledger.execute(&spending.domestic, Some(policy.tax))?;
        Ok(spending)
    }
}
