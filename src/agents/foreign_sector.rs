use crate::{
    allocation::proportional_split,
    config::Policy,
    error::SimulationError,
    ledger::{AccountId, Amount, ClearingHouse},
};

use super::Firm;

/// The rest of the world: buys exports, sells imports.
#[derive(Clone, Debug)]
pub struct ForeignSector {
    pub id: AccountId,
    pub balance: Amount,
    /// Gross export proceeds paid this month.
    pub exports: Amount,
    /// Household imports received this month, tax excluded.
    pub imports: Amount,
}

impl ForeignSector {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            balance: 0,
            exports: 0,
            imports: 0,
        }
    }

    pub fn start_month(&mut self) {
        self.exports = 0;
        self.imports = 0;
    }

    pub fn record_import(&mut self, amount: Amount) {
        self.imports += amount;
    }

    pub fn sync(&mut self, ledger: &ClearingHouse) {
        self.balance = ledger.balance(self.id);
    }

    /// Buys `round(total_export_value * export_share)` from the export sector,
    /// split by firm size.
    pub fn pay_exports(
        &mut self,
        ledger: &mut ClearingHouse,
        firms: &mut [Firm],
        policy: &Policy,
    ) -> Result<Amount, SimulationError> {
        let total = policy.export_share.apply(policy.total_export_value)?;
        let exporters: Vec<usize> = (0..firms.len())
            .filter(|idx| firms[*idx].is_exporter())
            .collect();
        if total <= 0 || exporters.is_empty() {
            return Ok(0);
        }

        let weights: Vec<u64> = exporters.iter().map(|idx| firms[*idx].size()).collect();
        let amounts = proportional_split(total, &weights)?;
        for (idx, amount) in exporters.into_iter().zip(amounts) {
            if amount > 0 {
                firms[idx].receive_export(ledger, self.id, amount, policy.tax)?;
                self.exports += amount;
            }
        }
        Ok(self.exports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agents::{FOREIGN_SECTOR, TAX_SERVICE},
        config::Config,
    };

    fn firm(id: AccountId, sector: u8, size_worker: u32) -> Firm {
        Firm {
            id,
            sector,
            region: 101,
            size_dir: 0,
            size_men: 0,
            size_worker,
            wage_per_dir: 0,
            wage_per_men: 0,
            wage_per_worker: 100,
            balance: 0,
            revenue: 0,
            workers: vec![],
        }
    }

    #[test]
    fn exports_go_to_sector_three_by_size() {
        let mut config = Config::default();
        config.foreign_trade.total_export_value = 12_000;
        config.foreign_trade.export_sector_3_share = 0.5;
        let policy = config.policy().unwrap();

        let mut ledger = ClearingHouse::new(TAX_SERVICE).with_external_accounts([FOREIGN_SECTOR]);
        ledger.register_account(FOREIGN_SECTOR, 0).unwrap();
        let mut firms = vec![firm(2_000, 3, 1), firm(2_001, 1, 10), firm(2_002, 3, 2)];
        let mut foreign = ForeignSector::new(FOREIGN_SECTOR);

        let paid = foreign.pay_exports(&mut ledger, &mut firms, &policy).unwrap();

        assert_eq!(paid, 6_000);
        // 2_000 and 4_000 gross, 20% embedded tax
        assert_eq!(firms[0].revenue, 1_667);
        assert_eq!(firms[1].revenue, 0);
        assert_eq!(firms[2].revenue, 3_333);
        assert_eq!(ledger.balance(TAX_SERVICE), 333 + 667);
        assert_eq!(ledger.balance(FOREIGN_SECTOR), -6_000);
    }

    #[test]
    fn no_exporters_no_payment() {
        let policy = Config::default().policy().unwrap();
        let mut ledger = ClearingHouse::new(TAX_SERVICE);
        let mut firms = vec![firm(2_000, 1, 4)];
        let mut foreign = ForeignSector::new(FOREIGN_SECTOR);
        assert_eq!(foreign.pay_exports(&mut ledger, &mut firms, &policy).unwrap(), 0);
        assert!(ledger.is_empty());
    }
}
