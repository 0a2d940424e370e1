use crate::ledger::{AccountId, Amount, ClearingHouse};

/// Keeps the recorded capital the conservation check runs against, plus
/// aggregate loan and deposit figures.
#[derive(Clone, Debug)]
pub struct CentralBank {
    pub id: AccountId,
    capital: Amount,
    pub total_loans: Amount,
    pub total_deposits: Amount,
}

impl CentralBank {
    pub fn new(id: AccountId, initial_capital: Amount) -> Self {
        Self {
            id,
            capital: initial_capital,
            total_loans: 0,
            total_deposits: 0,
        }
    }

    pub fn capital(&self) -> Amount {
        self.capital
    }

    /// Records money issued as an opening balance outside the bank's own
    /// account.
    pub fn record_issue(&mut self, amount: Amount) {
        self.capital += amount;
    }

    /// Loans are negative balances, deposits positive ones. External accounts
    /// and the bank's own account are left out.
    pub fn update_stats(&mut self, ledger: &ClearingHouse) {
        let mut loans = 0;
        let mut deposits = 0;
        for (id, balance) in ledger.accounts() {
            if id == self.id || ledger.is_external(id) {
                continue;
            }
            if balance < 0 {
                loans -= balance;
            } else {
                deposits += balance;
            }
        }
        self.total_loans = loans;
        self.total_deposits = deposits;
    }

    pub fn capital_adequacy(&self) -> Option<f64> {
        (self.total_loans != 0).then(|| self.capital as f64 / self.total_loans as f64)
    }
}
