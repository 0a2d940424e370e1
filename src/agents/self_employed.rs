use crate::ledger::{AccountId, Amount, ClearingHouse};

/// A one-person business that sells to households.
#[derive(Clone, Debug)]
pub struct SelfEmployed {
    pub id: AccountId,
    pub region: AccountId,
    pub savings: Amount,
    /// Nominal monthly income before tax.
    pub income: Amount,
    pub revenue: Amount,
}

impl SelfEmployed {
    /// Seller weight, equal to a one-employee firm.
    pub const SIZE: u64 = 1;

    pub fn start_month(&mut self) {
        self.revenue = 0;
    }

    pub fn book_revenue(&mut self, amount: Amount) {
        self.revenue += amount;
    }

    pub fn sync(&mut self, ledger: &ClearingHouse) {
        self.savings = ledger.balance(self.id);
    }
}
