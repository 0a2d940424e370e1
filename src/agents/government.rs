use tracing::debug;

use crate::{
    allocation::{proportional_split, Disbursement},
    config::Policy,
    error::SimulationError,
    ledger::{AccountId, Amount, ClearingHouse, Rate, TaxRate},
};

use super::{Category, Household};

fn empty_plan(from: AccountId) -> Disbursement {
    Disbursement {
        from,
        transfers: Vec::new(),
    }
}

//==================== Tax service ====================//

#[derive(Clone, Debug)]
pub struct TaxService {
    pub id: AccountId,
    /// Amount handed to the treasury this month.
    pub forwarded: Amount,
}

impl TaxService {
    pub fn new(id: AccountId) -> Self {
        Self { id, forwarded: 0 }
    }

    /// Moves everything collected so far to the treasury.
    pub fn forward_to_treasury(
        &mut self,
        ledger: &mut ClearingHouse,
        treasury: AccountId,
    ) -> Result<Amount, SimulationError> {
        let collected = ledger.balance(self.id);
        self.forwarded = collected.max(0);
        if self.forwarded > 0 {
            ledger.transfer(self.id, treasury, self.forwarded, None)?;
        }
        Ok(self.forwarded)
    }
}

//==================== Ministry of finance ====================//

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BudgetSplit {
    pub regions: Disbursement,
    pub federal_procurement: Disbursement,
    pub reserve: Amount,
    pub tax: Amount,
}

#[derive(Clone, Debug)]
pub struct MinistryOfFinance {
    pub id: AccountId,
    /// Revenue waiting to be distributed.
    pub budget: Amount,
    pub reserve_fund: Amount,
}

impl MinistryOfFinance {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            budget: 0,
            reserve_fund: 0,
        }
    }

    pub fn receive_budget(&mut self, amount: Amount) {
        self.budget += amount;
    }

    /// Sends `round(B * X)` to the regions by population, spends
    /// `round(B * Y)` on taxed federal procurement by firm size and keeps the
    /// rest as reserve. Whatever cannot be placed stays in the reserve.
    pub fn distribute(
        &mut self,
        ledger: &mut ClearingHouse,
        regions: &[(AccountId, u64)],
        firms: &[(AccountId, u64)],
        policy: &Policy,
    ) -> Result<BudgetSplit, SimulationError> {
        let total = self.budget;
        self.budget = 0;
        let mut split = BudgetSplit {
            regions: empty_plan(self.id),
            federal_procurement: empty_plan(self.id),
            reserve: 0,
            tax: 0,
        };
        if total <= 0 {
            return Ok(split);
        }

        let to_regions = policy.to_regions.apply(total)?;
        let to_federal = policy.to_federal_procurement.apply(total)?.min(total - to_regions);

        if to_regions > 0 && !regions.is_empty() {
            split.regions = Disbursement::proportional(self.id, to_regions, regions)?;
            ledger.execute(&split.regions, None)?;
        }
        if to_federal > 0 && !firms.is_empty() {
            split.federal_procurement = Disbursement::proportional(self.id, to_federal, firms)?;
            split.tax = ledger.execute(&split.federal_procurement, Some(policy.tax))?;
        }

        split.reserve =
            total - split.regions.total_amount() - split.federal_procurement.total_amount();
        self.reserve_fund += split.reserve;
        debug!(
            budget = total,
            regions = split.regions.total_amount(),
            federal = split.federal_procurement.total_amount(),
            reserve = split.reserve,
            "federal budget distributed"
        );
        Ok(split)
    }
}

//==================== Regions ====================//

#[derive(Clone, Debug)]
pub struct Region {
    pub id: AccountId,
    pub social_budget: Amount,
    pub procurement_budget: Amount,
    pub poverty_line: Amount,
}

impl Region {
    pub fn new(id: AccountId, poverty_line: Amount) -> Self {
        Self {
            id,
            social_budget: 0,
            procurement_budget: 0,
            poverty_line,
        }
    }

    /// Earmarks a transfer from the treasury. Unspent budgets carry over.
    pub fn receive_transfer(
        &mut self,
        amount: Amount,
        social_share: Rate,
    ) -> Result<(), SimulationError> {
        let social = social_share.apply(amount)?;
        self.social_budget += social;
        self.procurement_budget += amount - social;
        Ok(())
    }

    /// Pays categorical allowances while the social budget lasts, then splits
    /// what remains among households below the poverty line by their deficit.
    /// Returns the total paid.
    pub fn distribute_social(
        &mut self,
        ledger: &mut ClearingHouse,
        residents: &mut [&mut Household],
        policy: &Policy,
    ) -> Result<Amount, SimulationError> {
        let mut paid = 0;
        for hh in residents.iter_mut() {
            let allowance = match hh.category {
                Category::Disabled => policy.disability_allowance,
                Category::Veteran => policy.veteran_allowance,
                _ => continue,
            };
            if allowance > 0 && self.social_budget >= allowance {
                ledger.transfer(self.id, hh.id, allowance, None)?;
                self.social_budget -= allowance;
                hh.receive_transfer(allowance);
                paid += allowance;
            }
        }

        if self.social_budget <= 0 {
            return Ok(paid);
        }
        let poor: Vec<usize> = (0..residents.len())
            .filter(|idx| residents[*idx].income() < self.poverty_line)
            .collect();
        if poor.is_empty() {
            return Ok(paid);
        }
        let deficits: Vec<u64> = poor
            .iter()
            .map(|idx| (self.poverty_line - residents[*idx].income()).unsigned_abs())
            .collect();
        let amounts = proportional_split(self.social_budget, &deficits)?;
        for (idx, amount) in poor.into_iter().zip(amounts) {
            if amount > 0 {
                let hh = &mut residents[idx];
                ledger.transfer(self.id, hh.id, amount, None)?;
                self.social_budget -= amount;
                hh.receive_transfer(amount);
                paid += amount;
            }
        }
        Ok(paid)
    }

    /// Spends the procurement budget on the region's firms by size, taxed.
    pub fn procure(
        &mut self,
        ledger: &mut ClearingHouse,
        firms: &[(AccountId, u64)],
        tax: TaxRate,
    ) -> Result<Disbursement, SimulationError> {
        if self.procurement_budget <= 0 || firms.is_empty() {
            return Ok(empty_plan(self.id));
        }
        let plan = Disbursement::proportional(self.id, self.procurement_budget, firms)?;
        ledger.execute(&plan, Some(tax))?;
        self.procurement_budget -= plan.total_amount();
        Ok(plan)
    }
}

//==================== Employment exchange ====================//

#[derive(Clone, Debug)]
pub struct EmploymentExchange {
    pub id: AccountId,
    pub benefit: Amount,
}

impl EmploymentExchange {
    pub fn new(id: AccountId, benefit: Amount) -> Self {
        Self { id, benefit }
    }

    /// Pays the benefit to every registered unemployed household.
    pub fn pay_benefits(
        &self,
        ledger: &mut ClearingHouse,
        households: &mut [Household],
    ) -> Result<Amount, SimulationError> {
        if self.benefit <= 0 {
            return Ok(0);
        }
        let mut paid = 0;
        for hh in households.iter_mut().filter(|hh| hh.employer == Some(self.id)) {
            ledger.transfer(self.id, hh.id, self.benefit, None)?;
            hh.receive_transfer(self.benefit);
            paid += self.benefit;
        }
        Ok(paid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agents::{EMPLOYMENT_EXCHANGE, MINISTRY_OF_FINANCE, TAX_SERVICE},
        config::Config,
    };

    fn household(id: AccountId, category: Category, income: Amount) -> Household {
        Household {
            id,
            region: 101,
            employer: None,
            category,
            age: 50,
            children: 0,
            savings: 0,
            consumption_rate: Rate::ZERO,
            income_labor: income,
            income_transfer: 0,
        }
    }

    fn policy() -> Policy {
        Config::default().policy().unwrap()
    }

    #[test]
    fn tax_service_forwards_its_balance() {
        let mut ledger = ClearingHouse::new(TAX_SERVICE);
        ledger.register_account(TAX_SERVICE, 700).unwrap();
        let mut service = TaxService::new(TAX_SERVICE);
        assert_eq!(service.forward_to_treasury(&mut ledger, MINISTRY_OF_FINANCE).unwrap(), 700);
        assert_eq!(ledger.balance(TAX_SERVICE), 0);
        assert_eq!(ledger.balance(MINISTRY_OF_FINANCE), 700);
        // nothing left to forward
        assert_eq!(service.forward_to_treasury(&mut ledger, MINISTRY_OF_FINANCE).unwrap(), 0);
    }

    #[test]
    fn budget_is_split_between_regions_procurement_and_reserve() {
        let mut ledger = ClearingHouse::new(TAX_SERVICE);
        ledger.register_account(MINISTRY_OF_FINANCE, 10_000).unwrap();
        let mut minfin = MinistryOfFinance::new(MINISTRY_OF_FINANCE);
        minfin.receive_budget(10_000);

        let split = minfin
            .distribute(
                &mut ledger,
                &[(101, 2), (102, 1), (103, 1)],
                &[(2_000, 10), (2_001, 20)],
                &policy(),
            )
            .unwrap();

        assert_eq!(split.regions.amount_for(101), 3_000);
        assert_eq!(split.regions.amount_for(102), 1_500);
        assert_eq!(split.federal_procurement.amount_for(2_000), 1_000);
        assert_eq!(split.federal_procurement.amount_for(2_001), 2_000);
        assert_eq!(split.reserve, 1_000);
        assert_eq!(split.tax, 600);
        assert_eq!(minfin.reserve_fund, 1_000);
        assert_eq!(minfin.budget, 0);
        // reserve stays on account, procurement tax comes on top
        assert_eq!(ledger.balance(MINISTRY_OF_FINANCE), 1_000 - 600);
    }

    #[test]
    fn without_recipients_the_budget_goes_to_reserve() {
        let mut ledger = ClearingHouse::new(TAX_SERVICE);
        let mut minfin = MinistryOfFinance::new(MINISTRY_OF_FINANCE);
        minfin.receive_budget(5_000);
        let split = minfin.distribute(&mut ledger, &[], &[], &policy()).unwrap();
        assert_eq!(split.reserve, 5_000);
        assert_eq!(ledger.stats().transfers, 0);
    }

    #[test]
    fn region_pays_allowances_then_poverty_aid() {
        let policy = policy();
        let mut ledger = ClearingHouse::new(TAX_SERVICE);
        let mut region = Region::new(101, 16_000);
        region
            .receive_transfer(50_000, policy.region_social_share)
            .unwrap();
        assert_eq!(region.social_budget, 25_000);
        assert_eq!(region.procurement_budget, 25_000);

        let mut disabled = household(1_000, Category::Disabled, 0);
        let mut poorer = household(1_001, Category::Worker, 10_000);
        let mut poor = household(1_002, Category::Pensioner, 13_000);
        let mut rich = household(1_003, Category::Worker, 90_000);
        let mut residents = vec![&mut disabled, &mut poorer, &mut poor, &mut rich];

        let paid = region
            .distribute_social(&mut ledger, &mut residents, &policy)
            .unwrap();

        assert_eq!(paid, 25_000);
        assert_eq!(region.social_budget, 0);
        // 15_000 allowance first; the disabled household still has 1_000 deficit
        // deficits 1_000, 6_000, 3_000 share the remaining 10_000
        assert_eq!(ledger.balance(1_000), 15_000 + 1_000);
        assert_eq!(ledger.balance(1_001), 6_000);
        assert_eq!(ledger.balance(1_002), 3_000);
        assert_eq!(ledger.balance(1_003), 0);
        assert_eq!(disabled.income_transfer, 16_000);
        assert_eq!(ledger.balance(101), -25_000);
    }

    #[test]
    fn allowance_is_skipped_when_budget_is_short() {
        let policy = policy();
        let mut ledger = ClearingHouse::new(TAX_SERVICE);
        let mut region = Region::new(101, 0);
        region.social_budget = 9_999;
        let mut veteran = household(1_000, Category::Veteran, 0);
        let mut residents = vec![&mut veteran];
        assert_eq!(
            region.distribute_social(&mut ledger, &mut residents, &policy).unwrap(),
            0
        );
        assert_eq!(region.social_budget, 9_999);
    }

    #[test]
    fn regional_procurement_spends_budget_by_firm_size() {
        let policy = policy();
        let mut ledger = ClearingHouse::new(TAX_SERVICE);
        let mut region = Region::new(101, 0);
        region.procurement_budget = 900;
        let plan = region
            .procure(&mut ledger, &[(2_000, 1), (2_001, 2)], policy.tax)
            .unwrap();
        assert_eq!(plan.amount_for(2_000), 300);
        assert_eq!(plan.amount_for(2_001), 600);
        assert_eq!(region.procurement_budget, 0);
        assert_eq!(ledger.balance(101), -900 - 180);
        assert_eq!(ledger.balance(TAX_SERVICE), 180);
    }

    #[test]
    fn exchange_pays_only_its_registered_unemployed() {
        let mut ledger = ClearingHouse::new(TAX_SERVICE);
        let exchange = EmploymentExchange::new(EMPLOYMENT_EXCHANGE, 12_000);
        let mut jobless = household(1_000, Category::Unemployed, 0);
        jobless.employer = Some(EMPLOYMENT_EXCHANGE);
        let employed = household(1_001, Category::Worker, 0);
        let mut households = vec![jobless, employed];

        let paid = exchange.pay_benefits(&mut ledger, &mut households).unwrap();

        assert_eq!(paid, 12_000);
        assert_eq!(households[0].income_transfer, 12_000);
        assert_eq!(households[1].income_transfer, 0);
        assert_eq!(ledger.balance(EMPLOYMENT_EXCHANGE), -12_000);
    }
}
