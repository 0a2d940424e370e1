//! Random generation of the initial agent population.

use std::collections::BTreeMap;

use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    Rng,
};
use rand_distr::{LogNormal, Normal, Poisson};

use crate::{
    agents::{
        region_ids, Category, Firm, Household, IdAllocator, SelfEmployed, EMPLOYMENT_EXCHANGE,
        REGION_COUNT,
    },
    config::{FirmConfig, HouseholdConfig, SelfEmployedConfig},
    error::SimulationError,
    ledger::{AccountId, Amount, Rate},
};

/// Base category mix; the unemployed share comes from the config.
const CATEGORY_WEIGHTS: [(Category, f64); 5] = [
    (Category::Worker, 0.5),
    (Category::Pensioner, 0.25),
    (Category::Disabled, 0.03),
    (Category::Veteran, 0.01),
    (Category::ChildFamily, 0.15),
];

const CONSUMPTION_RATE_RANGE: (f64, f64) = (0.1, 2.0);
const MEAN_CHILDREN: f64 = 0.5;
const MAX_SELF_EMPLOYED_SAVINGS: Amount = 50_000;

fn population_error(what: &str, err: impl std::fmt::Display) -> SimulationError {
    SimulationError::Population(format!("{what}: {err}"))
}

/// Counts of `n` draws over categories with probabilities `probs`.
pub fn multinomial(rng: &mut StdRng, n: usize, probs: &[f64]) -> Result<Vec<usize>, SimulationError> {
    let dist = WeightedIndex::new(probs).map_err(|e| population_error("category weights", e))?;
    let mut counts = vec![0; probs.len()];
    for _ in 0..n {
        counts[dist.sample(rng)] += 1;
    }
    Ok(counts)
}

fn uniform_regions(rng: &mut StdRng, n: usize) -> Result<Vec<(AccountId, usize)>, SimulationError> {
    let counts = multinomial(rng, n, &[1.0 / REGION_COUNT as f64; REGION_COUNT])?;
    Ok(region_ids().zip(counts).collect())
}

/// Log-normal with the given arithmetic mean and `sigma = std / mean`.
fn log_normal(mean: f64, std: f64) -> Result<LogNormal<f64>, SimulationError> {
    LogNormal::new(mean.ln(), std / mean).map_err(|e| population_error("log-normal", e))
}

pub fn generate_households(
    config: &HouseholdConfig,
    ids: &mut IdAllocator,
    rng: &mut StdRng,
) -> Result<Vec<Household>, SimulationError> {
    let employed_share = 1.0 - config.unemployment_rate;
    let base_sum: f64 = CATEGORY_WEIGHTS.iter().map(|(_, w)| w).sum();
    let mut categories: Vec<Category> = CATEGORY_WEIGHTS.iter().map(|(c, _)| *c).collect();
    let mut weights: Vec<f64> = CATEGORY_WEIGHTS
        .iter()
        .map(|(_, w)| w / base_sum * employed_share)
        .collect();
    categories.push(Category::Unemployed);
    weights.push(config.unemployment_rate);
    let category_dist = WeightedIndex::new(&weights).map_err(|e| population_error("categories", e))?;

    let savings_dist = log_normal(config.initial_savings_mean, config.initial_savings_std)?;
    let consumption_dist = Normal::new(config.consumption_rate_mean, config.consumption_rate_std)
        .map_err(|e| population_error("consumption rate", e))?;
    let children_dist =
        Poisson::new(MEAN_CHILDREN).map_err(|e| population_error("children", e))?;

    let mut households = Vec::with_capacity(config.count);
    for (region, count) in uniform_regions(rng, config.count)? {
        for _ in 0..count {
            let category = categories[category_dist.sample(rng)];
            let employer = (category == Category::Unemployed).then_some(EMPLOYMENT_EXCHANGE);
            let savings = (savings_dist.sample(rng) as Amount).max(0);
            let consumption_rate = consumption_dist
                .sample(rng)
                .clamp(CONSUMPTION_RATE_RANGE.0, CONSUMPTION_RATE_RANGE.1);
            let children = if matches!(category, Category::ChildFamily | Category::Worker) {
                children_dist.sample(rng) as u32
            } else {
                0
            };
            households.push(Household {
                id: ids.next_id(),
                region,
                employer,
                category,
                age: rng.gen_range(18..80),
                children,
                savings,
                consumption_rate: Rate::from_fraction(consumption_rate)
                    .map_err(|e| population_error("consumption rate", e))?,
                income_labor: 0,
                income_transfer: 0,
            });
        }
    }
    Ok(households)
}

pub fn generate_firms(
    config: &FirmConfig,
    ids: &mut IdAllocator,
    rng: &mut StdRng,
) -> Result<Vec<Firm>, SimulationError> {
    let size_dist = log_normal(config.size_mean, config.size_std)?;
    let director_ratio = Rate::from_fraction(config.wage_ratio_director)
        .map_err(|e| population_error("director wage ratio", e))?;
    let manager_ratio = Rate::from_fraction(config.wage_ratio_manager)
        .map_err(|e| population_error("manager wage ratio", e))?;

    let sector_counts = multinomial(rng, config.count, &config.sector_distribution)?;
    let mut firms = Vec::with_capacity(config.count);
    for (sector_idx, sector_count) in sector_counts.into_iter().enumerate() {
        if sector_count == 0 {
            continue;
        }
        let sector = (sector_idx + 1) as u8;
        let base_wage = config
            .wage_base_by_sector
            .get(sector_idx)
            .copied()
            .ok_or_else(|| population_error("wage base", format!("no wage for sector {sector}")))?;
        for (region, count) in uniform_regions(rng, sector_count)? {
            for _ in 0..count {
                let size = (size_dist.sample(rng) as u32).max(1);
                let mut size_dir = ((f64::from(size) * config.share_director) as u32).max(1);
                let mut size_men = ((f64::from(size) * config.share_manager) as u32).max(1);
                let mut size_worker = size.saturating_sub(size_dir + size_men);
                if size_worker < 1 {
                    size_dir = 1;
                    size_men = 1;
                    size_worker = 1;
                }

                let mut firm = Firm {
                    id: ids.next_id(),
                    sector,
                    region,
                    size_dir,
                    size_men,
                    size_worker,
                    wage_per_dir: director_ratio.apply(base_wage)?,
                    wage_per_men: manager_ratio.apply(base_wage)?,
                    wage_per_worker: base_wage,
                    balance: 0,
                    revenue: 0,
                    workers: Vec::new(),
                };
                firm.balance = firm.payroll() * config.initial_balance_months;
                firms.push(firm);
            }
        }
    }
    Ok(firms)
}

pub fn generate_self_employed(
    config: &SelfEmployedConfig,
    ids: &mut IdAllocator,
    rng: &mut StdRng,
) -> Result<Vec<SelfEmployed>, SimulationError> {
    let mut self_employed = Vec::with_capacity(config.count);
    for (region, count) in uniform_regions(rng, config.count)? {
        for _ in 0..count {
            self_employed.push(SelfEmployed {
                id: ids.next_id(),
                region,
                savings: rng.gen_range(0..MAX_SELF_EMPLOYED_SAVINGS),
                income: config.avg_income,
                revenue: 0,
            });
        }
    }
    Ok(self_employed)
}

/// Gives every labour-force household a job at a firm in its region, picked
/// by firm size (any firm when the region has none). Without firms they
/// register as unemployed.
pub fn assign_employment(
    households: &mut [Household],
    firms: &mut [Firm],
    rng: &mut StdRng,
) -> Result<(), SimulationError> {
    let mut by_region: BTreeMap<AccountId, Vec<usize>> = BTreeMap::new();
    for (idx, firm) in firms.iter().enumerate() {
        by_region.entry(firm.region).or_default().push(idx);
    }
    let everywhere: Vec<usize> = (0..firms.len()).collect();

    let mut pickers: BTreeMap<Option<AccountId>, WeightedIndex<u64>> = BTreeMap::new();
    for hh in households.iter_mut() {
        if !hh.category.in_labour_force() {
            continue;
        }
        if firms.is_empty() {
            hh.employer = Some(EMPLOYMENT_EXCHANGE);
            continue;
        }
        let key = by_region.contains_key(&hh.region).then_some(hh.region);
        let candidates = key.and_then(|r| by_region.get(&r)).unwrap_or(&everywhere);
        if !pickers.contains_key(&key) {
            let weights: Vec<u64> = candidates.iter().map(|idx| firms[*idx].size()).collect();
            let picker =
                WeightedIndex::new(weights).map_err(|e| population_error("firm sizes", e))?;
            pickers.insert(key, picker);
        }
        let Some(picker) = pickers.get(&key) else {
            continue;
        };
        let firm = &mut firms[candidates[picker.sample(rng)]];
        hh.employer = Some(firm.id);
        firm.workers.push(hh.id);
    }
    Ok(())
}
