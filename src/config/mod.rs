use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::ledger::{Amount, Rate, RateError, TaxRate};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid {field}: {source}")]
    Rate {
        field: &'static str,
        #[source]
        source: RateError,
    },
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn rate(field: &'static str, value: f64) -> Result<Rate, ConfigError> {
    Rate::from_fraction(value).map_err(|source| ConfigError::Rate { field, source })
}

fn share(field: &'static str, value: f64) -> Result<Rate, ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, format!("{value} is not within [0, 1]")));
    }
    rate(field, value)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub bank: BankConfig,
    pub tax: TaxConfig,
    pub government: GovernmentConfig,
    pub social: SocialConfig,
    pub foreign_trade: ForeignTradeConfig,
    pub households: HouseholdConfig,
    pub firms: FirmConfig,
    pub self_employed: SelfEmployedConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub steps: u64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankConfig {
    pub initial_capital: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxConfig {
    pub rate: f64,
    #[serde(default)]
    pub tax_wage: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernmentConfig {
    /// Share of the federal budget sent to regions.
    #[serde(rename = "X")]
    pub x: f64,
    /// Share of the federal budget spent on federal procurement.
    #[serde(rename = "Y")]
    pub y: f64,
    /// Reserve share; the reserve is whatever X and Y leave over.
    #[serde(rename = "Z", default)]
    pub z: f64,
    pub region_social_share: f64,
    #[serde(default = "default_poverty_line")]
    pub poverty_line: Amount,
}

fn default_poverty_line() -> Amount {
    16_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialConfig {
    pub disability_allowance: Amount,
    pub veteran_allowance: Amount,
    pub unemployment_benefit: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignTradeConfig {
    pub total_export_value: Amount,
    pub export_sector_3_share: f64,
    pub import_share_household: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseholdConfig {
    pub count: usize,
    pub unemployment_rate: f64,
    pub initial_savings_mean: f64,
    pub initial_savings_std: f64,
    pub consumption_rate_mean: f64,
    pub consumption_rate_std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmConfig {
    pub count: usize,
    pub sector_distribution: Vec<f64>,
    pub size_mean: f64,
    pub size_std: f64,
    pub share_director: f64,
    pub share_manager: f64,
    pub wage_base_by_sector: Vec<Amount>,
    pub wage_ratio_director: f64,
    pub wage_ratio_manager: f64,
    pub initial_balance_months: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfEmployedConfig {
    pub count: usize,
    pub avg_income: Amount,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                steps: 120,
                seed: default_seed(),
            },
            bank: BankConfig {
                initial_capital: 1_000_000_000,
            },
            tax: TaxConfig {
                rate: 0.2,
                tax_wage: true,
            },
            government: GovernmentConfig {
                x: 0.6,
                y: 0.3,
                z: 0.1,
                region_social_share: 0.5,
                poverty_line: default_poverty_line(),
            },
            social: SocialConfig {
                disability_allowance: 15_000,
                veteran_allowance: 10_000,
                unemployment_benefit: 12_000,
            },
            foreign_trade: ForeignTradeConfig {
                total_export_value: 50_000_000,
                export_sector_3_share: 0.8,
                import_share_household: 0.2,
            },
            households: HouseholdConfig {
                count: 2_000,
                unemployment_rate: 0.06,
                initial_savings_mean: 100_000.0,
                initial_savings_std: 50_000.0,
                consumption_rate_mean: 0.85,
                consumption_rate_std: 0.1,
            },
            firms: FirmConfig {
                count: 100,
                sector_distribution: vec![0.3, 0.3, 0.1, 0.3],
                size_mean: 20.0,
                size_std: 10.0,
                share_director: 0.05,
                share_manager: 0.15,
                wage_base_by_sector: vec![40_000, 50_000, 80_000, 45_000],
                wage_ratio_director: 3.0,
                wage_ratio_manager: 1.8,
                initial_balance_months: 3,
            },
            self_employed: SelfEmployedConfig {
                count: 200,
                avg_income: 40_000,
            },
        }
    }
}

/// Validated monetary policy parameters in ledger units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    pub tax: TaxRate,
    pub tax_wage: bool,
    pub to_regions: Rate,
    pub to_federal_procurement: Rate,
    pub region_social_share: Rate,
    pub poverty_line: Amount,
    pub disability_allowance: Amount,
    pub veteran_allowance: Amount,
    pub unemployment_benefit: Amount,
    pub total_export_value: Amount,
    pub export_share: Rate,
    pub import_share: Rate,
}

impl Policy {
    /// Tax applied to payroll transfers, if wages are taxed at all.
    pub fn wage_tax(&self) -> Option<TaxRate> {
        self.tax_wage.then_some(self.tax)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy()?;

        if self.bank.initial_capital < 0 {
            return Err(invalid("bank.initial_capital", "must not be negative"));
        }

        let hh = &self.households;
        share("households.unemployment_rate", hh.unemployment_rate)?;
        if !(hh.initial_savings_mean > 0.0) || !(hh.initial_savings_std >= 0.0) {
            return Err(invalid(
                "households.initial_savings",
                "mean must be positive and std non-negative",
            ));
        }
        if !hh.consumption_rate_mean.is_finite() || !(hh.consumption_rate_std >= 0.0) {
            return Err(invalid(
                "households.consumption_rate",
                "mean must be finite and std non-negative",
            ));
        }

        let firms = &self.firms;
        if firms.sector_distribution.is_empty() {
            return Err(invalid("firms.sector_distribution", "must not be empty"));
        }
        if firms.sector_distribution.len() != firms.wage_base_by_sector.len() {
            return Err(invalid(
                "firms.wage_base_by_sector",
                format!(
                    "has {} entries but sector_distribution has {}",
                    firms.wage_base_by_sector.len(),
                    firms.sector_distribution.len()
                ),
            ));
        }
        if firms
            .sector_distribution
            .iter()
            .any(|p| !p.is_finite() || *p < 0.0)
            || firms.sector_distribution.iter().sum::<f64>() <= 0.0
        {
            return Err(invalid(
                "firms.sector_distribution",
                "weights must be non-negative with a positive sum",
            ));
        }
        if firms.wage_base_by_sector.iter().any(|w| *w < 0) {
            return Err(invalid("firms.wage_base_by_sector", "wages must not be negative"));
        }
        if !(firms.size_mean >= 1.0) || !(firms.size_std >= 0.0) {
            return Err(invalid(
                "firms.size",
                "mean must be at least 1 and std non-negative",
            ));
        }
        share("firms.share_director", firms.share_director)?;
        share("firms.share_manager", firms.share_manager)?;
        rate("firms.wage_ratio_director", firms.wage_ratio_director)?;
        rate("firms.wage_ratio_manager", firms.wage_ratio_manager)?;
        if firms.initial_balance_months < 0 {
            return Err(invalid("firms.initial_balance_months", "must not be negative"));
        }

        if self.self_employed.avg_income < 0 {
            return Err(invalid("self_employed.avg_income", "must not be negative"));
        }
        Ok(())
    }

    pub fn policy(&self) -> Result<Policy, ConfigError> {
        let gov = &self.government;
        let tax = TaxRate::from_fraction(self.tax.rate)
            .map_err(|source| ConfigError::Rate { field: "tax.rate", source })?;
        let to_regions = share("government.X", gov.x)?;
        let to_federal_procurement = share("government.Y", gov.y)?;
        share("government.Z", gov.z)?;
        if to_regions.ppm() + to_federal_procurement.ppm() > Rate::ONE.ppm() {
            return Err(invalid("government", "X + Y must not exceed 1"));
        }

        let social = &self.social;
        for (field, value) in [
            ("government.poverty_line", gov.poverty_line),
            ("social.disability_allowance", social.disability_allowance),
            ("social.veteran_allowance", social.veteran_allowance),
            ("social.unemployment_benefit", social.unemployment_benefit),
            ("foreign_trade.total_export_value", self.foreign_trade.total_export_value),
        ] {
            if value < 0 {
                return Err(invalid(field, "must not be negative"));
            }
        }

        Ok(Policy {
            tax,
            tax_wage: self.tax.tax_wage,
            to_regions,
            to_federal_procurement,
            region_social_share: share("government.region_social_share", gov.region_social_share)?,
            poverty_line: gov.poverty_line,
            disability_allowance: social.disability_allowance,
            veteran_allowance: social.veteran_allowance,
            unemployment_benefit: social.unemployment_benefit,
            total_export_value: self.foreign_trade.total_export_value,
            export_share: share(
                "foreign_trade.export_sector_3_share",
                self.foreign_trade.export_sector_3_share,
            )?,
            import_share: share(
                "foreign_trade.import_share_household",
                self.foreign_trade.import_share_household,
            )?,
        })
    }
}
