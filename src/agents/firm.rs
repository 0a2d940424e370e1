use crate::{
    allocation::Disbursement,
    error::SimulationError,
    ledger::{AccountId, Amount, ClearingHouse, TaxRate},
};

#[derive(Clone, Debug)]
pub struct Firm {
    pub id: AccountId,
    /// 1-based sector index.
    pub sector: u8,
    pub region: AccountId,
    pub size_dir: u32,
    pub size_men: u32,
    pub size_worker: u32,
    pub wage_per_dir: Amount,
    pub wage_per_men: Amount,
    pub wage_per_worker: Amount,
    pub balance: Amount,
    /// Net revenue booked this month.
    pub revenue: Amount,
    pub workers: Vec<AccountId>,
}

impl Firm {
    pub const EXPORT_SECTOR: u8 = 3;

    pub fn size(&self) -> u64 {
        u64::from(self.size_dir) + u64::from(self.size_men) + u64::from(self.size_worker)
    }

    pub fn payroll(&self) -> Amount {
        Amount::from(self.size_dir) * self.wage_per_dir
            + Amount::from(self.size_men) * self.wage_per_men
            + Amount::from(self.size_worker) * self.wage_per_worker
    }

    pub fn profit(&self) -> Amount {
        self.revenue - self.payroll()
    }

    pub fn is_exporter(&self) -> bool {
        self.sector == Self::EXPORT_SECTOR
    }

    pub fn start_month(&mut self) {
        self.revenue = 0;
    }

    pub fn book_revenue(&mut self, amount: Amount) {
        self.revenue += amount;
    }

    pub fn sync(&mut self, ledger: &ClearingHouse) {
        self.balance = ledger.balance(self.id);
    }

    /// Pays the monthly payroll in equal parts to the assigned workers. With
    /// `tax` set, each wage payment is taxed on top. A firm without workers
    /// pays nothing.
    pub fn pay_wages(
        &self,
        ledger: &mut ClearingHouse,
        tax: Option<TaxRate>,
    ) -> Result<Disbursement, SimulationError> {
        if self.workers.is_empty() {
            return Ok(Disbursement {
                from: self.id,
                transfers: Vec::new(),
            });
        }
        let recipients: Vec<(AccountId, u64)> = self.workers.iter().map(|id| (*id, 1)).collect();
        let plan = Disbursement::proportional(self.id, self.payroll(), &recipients)?;
        ledger.execute(&plan, tax)?;
        Ok(plan)
    }

    /// Books tax-inclusive export proceeds paid by `payer`: the embedded tax
    /// goes to the tax authority, the rest to the firm. Returns the net part.
    pub fn receive_export(
        &mut self,
        ledger: &mut ClearingHouse,
        payer: AccountId,
        gross: Amount,
        tax: TaxRate,
    ) -> Result<Amount, SimulationError> {
        let tax_part = tax.rate().inclusive_part(gross);
        let net = gross - tax_part;
        if net > 0 {
            ledger.transfer(payer, self.id, net, None)?;
        }
        if tax_part > 0 {
            let authority = ledger.tax_authority();
            ledger.transfer(payer, authority, tax_part, None)?;
        }
        self.revenue += net;
        Ok(net)
    }
}
