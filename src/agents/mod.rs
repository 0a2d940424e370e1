//! Economic agents. Every behaviour moves money only through the
//! [`ClearingHouse`](crate::ledger::ClearingHouse) it is handed.

use crate::ledger::AccountId;

mod central_bank;
mod firm;
mod foreign_sector;
mod government;
mod household;
mod self_employed;

pub use central_bank::CentralBank;
pub use firm::Firm;
pub use foreign_sector::ForeignSector;
pub use government::{BudgetSplit, EmploymentExchange, MinistryOfFinance, Region, TaxService};
pub use household::{Category, Household, Spending};
pub use self_employed::SelfEmployed;

pub const TAX_SERVICE: AccountId = 1;
pub const MINISTRY_OF_FINANCE: AccountId = 2;
pub const EMPLOYMENT_EXCHANGE: AccountId = 3;
pub const CENTRAL_BANK: AccountId = 4;
pub const FOREIGN_SECTOR: AccountId = 5;

pub const FIRST_REGION: AccountId = 101;
pub const REGION_COUNT: usize = 8;

/// First identity handed out to households, firms and self-employed.
pub const FIRST_AGENT_ID: AccountId = 1000;

pub fn region_ids() -> impl Iterator<Item = AccountId> {
    (0..REGION_COUNT as AccountId).map(|offset| FIRST_REGION + offset)
}

/// Hands out agent identities in one sequence so no two agents collide.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: AccountId,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next: FIRST_AGENT_ID,
        }
    }

    pub fn next_id(&mut self) -> AccountId {
        let id = self.next;
        self.next += 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
