//! The monthly simulation driver.

use std::collections::BTreeMap;

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info};

use crate::{
    agents::{
        region_ids, CentralBank, EmploymentExchange, Firm, ForeignSector, Household, IdAllocator,
        MinistryOfFinance, Region, SelfEmployed, TaxService, CENTRAL_BANK, EMPLOYMENT_EXCHANGE,
        FOREIGN_SECTOR, MINISTRY_OF_FINANCE, TAX_SERVICE,
    },
    allocation::Disbursement,
    config::{Config, Policy},
    error::SimulationError,
    ledger::{AccountId, Amount, ClearingHouse, LedgerSnapshot, INVARIANT_TOLERANCE},
    metrics::{gini, MetricsLog, StepMetrics},
    population,
};

/// Steps per simulated year.
const MONTHS_PER_YEAR: u64 = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Wages,
    Exports,
    TaxesToTreasury,
    BudgetDistribution,
    RegionalSpending,
    Consumption,
}

impl Phase {
    /// The fixed order in which a month is played out.
    pub const MONTHLY: [Phase; 6] = [
        Phase::Wages,
        Phase::Exports,
        Phase::TaxesToTreasury,
        Phase::BudgetDistribution,
        Phase::RegionalSpending,
        Phase::Consumption,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Wages => "wages",
            Phase::Exports => "exports",
            Phase::TaxesToTreasury => "taxes-to-treasury",
            Phase::BudgetDistribution => "budget-distribution",
            Phase::RegionalSpending => "regional-spending",
            Phase::Consumption => "consumption",
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Seller {
    Firm(usize),
    SelfEmployed(usize),
}

pub struct EconomyModel {
    policy: Policy,
    ledger: ClearingHouse,
    central_bank: CentralBank,
    tax_service: TaxService,
    minfin: MinistryOfFinance,
    exchange: EmploymentExchange,
    foreign: ForeignSector,
    regions: Vec<Region>,
    households: Vec<Household>,
    firms: Vec<Firm>,
    self_employed: Vec<SelfEmployed>,
    household_index: BTreeMap<AccountId, usize>,
    sellers: BTreeMap<AccountId, Seller>,
    metrics: MetricsLog,
    steps: u64,
    /// Tax authority inflow recorded at the start of the current month.
    tax_baseline: i128,
}

impl EconomyModel {
    pub fn new(config: &Config) -> Result<Self, SimulationError> {
        config.validate()?;
        let policy = config.policy()?;
        let mut rng = StdRng::seed_from_u64(config.model.seed);

        let mut ledger = ClearingHouse::new(TAX_SERVICE).with_external_accounts([FOREIGN_SECTOR]);
        for id in [TAX_SERVICE, MINISTRY_OF_FINANCE, EMPLOYMENT_EXCHANGE] {
            ledger.register_account(id, 0)?;
        }
        ledger.register_account(CENTRAL_BANK, config.bank.initial_capital)?;
        ledger.register_account(FOREIGN_SECTOR, 0)?;
        let regions: Vec<Region> = region_ids()
            .map(|id| Region::new(id, policy.poverty_line))
            .collect();
        for region in &regions {
            ledger.register_account(region.id, 0)?;
        }

        let mut ids = IdAllocator::new();
        let mut households = population::generate_households(&config.households, &mut ids, &mut rng)?;
        let mut firms = population::generate_firms(&config.firms, &mut ids, &mut rng)?;
        let self_employed =
            population::generate_self_employed(&config.self_employed, &mut ids, &mut rng)?;
        population::assign_employment(&mut households, &mut firms, &mut rng)?;

        // opening balances are money issued by the central bank
        let mut central_bank = CentralBank::new(CENTRAL_BANK, config.bank.initial_capital);
        let openings = households
            .iter()
            .map(|hh| (hh.id, hh.savings))
            .chain(firms.iter().map(|f| (f.id, f.balance)))
            .chain(self_employed.iter().map(|se| (se.id, se.savings)));
        for (id, opening) in openings {
            ledger.register_account(id, opening)?;
            central_bank.record_issue(opening);
        }
        ledger.check_invariant(central_bank.capital(), INVARIANT_TOLERANCE);

        let household_index = households
            .iter()
            .enumerate()
            .map(|(idx, hh)| (hh.id, idx))
            .collect();
        let sellers = firms
            .iter()
            .enumerate()
            .map(|(idx, f)| (f.id, Seller::Firm(idx)))
            .chain(
                self_employed
                    .iter()
                    .enumerate()
                    .map(|(idx, se)| (se.id, Seller::SelfEmployed(idx))),
            )
            .collect();

        info!(
            households = households.len(),
            firms = firms.len(),
            self_employed = self_employed.len(),
            accounts = ledger.len(),
            capital = central_bank.capital(),
            "economy initialised"
        );

        Ok(Self {
            policy,
            ledger,
            central_bank,
            tax_service: TaxService::new(TAX_SERVICE),
            minfin: MinistryOfFinance::new(MINISTRY_OF_FINANCE),
            exchange: EmploymentExchange::new(EMPLOYMENT_EXCHANGE, policy.unemployment_benefit),
            foreign: ForeignSector::new(FOREIGN_SECTOR),
            regions,
            households,
            firms,
            self_employed,
            household_index,
            sellers,
            metrics: MetricsLog::new(),
            steps: 0,
            tax_baseline: 0,
        })
    }

    pub fn ledger(&self) -> &ClearingHouse {
        &self.ledger
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn central_bank(&self) -> &CentralBank {
        &self.central_bank
    }

    pub fn ministry_of_finance(&self) -> &MinistryOfFinance {
        &self.minfin
    }

    pub fn foreign_sector(&self) -> &ForeignSector {
        &self.foreign
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn households(&self) -> &[Household] {
        &self.households
    }

    pub fn firms(&self) -> &[Firm] {
        &self.firms
    }

    pub fn self_employed(&self) -> &[SelfEmployed] {
        &self.self_employed
    }

    pub fn metrics(&self) -> &MetricsLog {
        &self.metrics
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.snapshot(self.steps)
    }

    /// Runs `steps` months.
    pub fn run(&mut self, steps: u64) -> Result<(), SimulationError> {
        for _ in 0..steps {
            let row = self.step()?;
            if row.step % MONTHS_PER_YEAR == 0 || row.step == steps {
                info!(
                    step = row.step,
                    gdp = row.gdp,
                    unemployment = row.unemployment,
                    "step {}/{} complete",
                    row.step,
                    steps
                );
            }
        }
        Ok(())
    }

    /// Plays out one month, checks conservation and records a metrics row.
    pub fn step(&mut self) -> Result<StepMetrics, SimulationError> {
        self.start_month();
        for phase in Phase::MONTHLY {
            self.run_phase(phase)?;
            debug!(step = self.steps + 1, phase = phase.name(), "phase done");
        }
        self.ledger
            .check_invariant(self.central_bank.capital(), INVARIANT_TOLERANCE);

        self.steps += 1;
        self.sync_mirrors();
        self.central_bank.update_stats(&self.ledger);
        let row = self.observe();
        debug!(step = row.step, digest = %row.ledger_digest, "month cleared");
        self.metrics.push(row.clone());
        Ok(row)
    }

    pub fn run_phase(&mut self, phase: Phase) -> Result<(), SimulationError> {
        match phase {
            Phase::Wages => self.pay_wages(),
            Phase::Exports => self.pay_exports(),
            Phase::TaxesToTreasury => self.forward_taxes(),
            Phase::BudgetDistribution => self.distribute_budget(),
            Phase::RegionalSpending => self.regional_spending(),
            Phase::Consumption => self.consume(),
        }
    }

    fn start_month(&mut self) {
        self.households.iter_mut().for_each(Household::start_month);
        self.firms.iter_mut().for_each(Firm::start_month);
        self.self_employed.iter_mut().for_each(SelfEmployed::start_month);
        self.foreign.start_month();
        self.tax_baseline = self.ledger.stats().tax_received;
    }

    fn pay_wages(&mut self) -> Result<(), SimulationError> {
        let tax = self.policy.wage_tax();
        for firm in &self.firms {
            let plan = firm.pay_wages(&mut self.ledger, tax)?;
            for transfer in &plan.transfers {
                if let Some(idx) = self.household_index.get(&transfer.to) {
                    self.households[*idx].receive_wage(transfer.amount);
                }
            }
        }
        Ok(())
    }

    fn pay_exports(&mut self) -> Result<(), SimulationError> {
        let paid = self
            .foreign
            .pay_exports(&mut self.ledger, &mut self.firms, &self.policy)?;
        debug!(exports = paid, "exports paid");
        Ok(())
    }

    fn forward_taxes(&mut self) -> Result<(), SimulationError> {
        let amount = self
            .tax_service
            .forward_to_treasury(&mut self.ledger, self.minfin.id)?;
        self.minfin.receive_budget(amount);
        Ok(())
    }

    fn distribute_budget(&mut self) -> Result<(), SimulationError> {
        let mut population: BTreeMap<AccountId, u64> = BTreeMap::new();
        for hh in &self.households {
            *population.entry(hh.region).or_default() += 1;
        }
        let regions: Vec<(AccountId, u64)> = self
            .regions
            .iter()
            .map(|r| (r.id, population.get(&r.id).copied().unwrap_or(0)))
            .collect();
        let firms: Vec<(AccountId, u64)> = self.firms.iter().map(|f| (f.id, f.size())).collect();

        let split = self
            .minfin
            .distribute(&mut self.ledger, &regions, &firms, &self.policy)?;
        for region in &mut self.regions {
            region.receive_transfer(
                split.regions.amount_for(region.id),
                self.policy.region_social_share,
            )?;
        }
        self.book_sales(&split.federal_procurement);
        Ok(())
    }

    fn regional_spending(&mut self) -> Result<(), SimulationError> {
        let benefits = self
            .exchange
            .pay_benefits(&mut self.ledger, &mut self.households)?;

        let mut social = 0;
        let mut procurements = Vec::with_capacity(self.regions.len());
        for region in &mut self.regions {
            let mut residents: Vec<&mut Household> = self
                .households
                .iter_mut()
                .filter(|hh| hh.region == region.id)
                .collect();
            social += region.distribute_social(&mut self.ledger, &mut residents, &self.policy)?;

            let firms: Vec<(AccountId, u64)> = self
                .firms
                .iter()
                .filter(|f| f.region == region.id)
                .map(|f| (f.id, f.size()))
                .collect();
            procurements.push(region.procure(&mut self.ledger, &firms, self.policy.tax)?);
        }
        for plan in &procurements {
            self.book_sales(plan);
        }
        debug!(
            benefits,
            social,
            procurement = procurements.iter().map(Disbursement::total_amount).sum::<Amount>(),
            "regional spending done"
        );
        Ok(())
    }

    fn consume(&mut self) -> Result<(), SimulationError> {
        let sellers: Vec<(AccountId, u64)> = self
            .firms
            .iter()
            .map(|f| (f.id, f.size()))
            .chain(self.self_employed.iter().map(|se| (se.id, SelfEmployed::SIZE)))
            .collect();
        for idx in 0..self.households.len() {
            let spending = self.households[idx].consume(&mut self.ledger, &sellers, &self.policy)?;
            self.foreign.record_import(spending.imports);
            self.book_sales(&spending.domestic);
        }
        Ok(())
    }

    fn book_sales(&mut self, plan: &Disbursement) {
        for transfer in &plan.transfers {
            match self.sellers.get(&transfer.to) {
                Some(Seller::Firm(idx)) => self.firms[*idx].book_revenue(transfer.amount),
                Some(Seller::SelfEmployed(idx)) => {
                    self.self_employed[*idx].book_revenue(transfer.amount)
                }
                None => {}
            }
        }
    }

    fn sync_mirrors(&mut self) {
        for hh in &mut self.households {
            hh.sync(&self.ledger);
        }
        for firm in &mut self.firms {
            firm.sync(&self.ledger);
        }
        for se in &mut self.self_employed {
            se.sync(&self.ledger);
        }
        self.foreign.sync(&self.ledger);
    }

    fn observe(&self) -> StepMetrics {
        let total_tax = self.ledger.stats().tax_received - self.tax_baseline;

        let wages: Amount = self.households.iter().map(|hh| hh.income_labor).sum();
        let profits: Amount = self.firms.iter().map(Firm::profit).sum();
        let incomes: Vec<Amount> = self.households.iter().map(Household::income).collect();
        let savings: Vec<Amount> = self.households.iter().map(|hh| hh.savings).collect();

        let earners: Vec<Amount> = self
            .households
            .iter()
            .map(|hh| hh.income_labor)
            .filter(|w| *w > 0)
            .collect();
        let avg_wage = if earners.is_empty() {
            0.0
        } else {
            earners.iter().sum::<Amount>() as f64 / earners.len() as f64
        };
        let unemployment = if self.households.is_empty() {
            0.0
        } else {
            self.households.iter().filter(|hh| hh.is_unemployed()).count() as f64
                / self.households.len() as f64
        };

        StepMetrics {
            step: self.steps,
            gdp: wages + profits,
            total_tax: Amount::try_from(total_tax).unwrap_or(Amount::MAX),
            export: self.foreign.exports,
            import: self.foreign.imports,
            avg_wage,
            unemployment,
            gini_income: gini(&incomes),
            gini_wealth: gini(&savings),
            hh_debt: savings.iter().filter(|s| **s < 0).map(|s| -s).sum(),
            firm_debt: self
                .firms
                .iter()
                .filter(|f| f.balance < 0)
                .map(|f| -f.balance)
                .sum(),
            bank_capital: self.central_bank.capital(),
            bank_loans: self.central_bank.total_loans,
            bank_deposits: self.central_bank.total_deposits,
            capital_adequacy: self.central_bank.capital_adequacy(),
            ledger_digest: hex::encode(self.ledger.digest()),
        }
    }
}
