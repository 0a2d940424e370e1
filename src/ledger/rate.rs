use std::fmt;

use serde::{Deserialize, Serialize};

use super::Amount;

/// Rates are stored as integer parts per million.
pub const RATE_SCALE: u64 = 1_000_000;

/// Upper bound for any configured multiplier (wage ratios, consumption rates).
const MAX_RATE_PPM: u64 = 1_000 * RATE_SCALE;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateError {
    #[error("rate {value} is not a finite number")]
    NotFinite { value: f64 },
    #[error("rate {value} is negative")]
    Negative { value: f64 },
    #[error("rate {value} is out of range")]
    OutOfRange { value: f64 },
    #[error("tax rate {value} must lie in [0, 1)")]
    TaxRateOutOfRange { value: f64 },
    #[error("{amount} scaled by {rate} does not fit in an amount")]
    Overflow { amount: Amount, rate: Rate },
}

/// Divides and rounds half away from zero.
///
/// This is the single rounding rule of the crate: every tax amount and every
/// share of an amount goes through here.
pub fn round_div(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0, "round_div needs a positive denominator");
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if 2 * remainder.abs() >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}

fn scale(amount: Amount, numerator: u64, denominator: u64) -> i128 {
    round_div(
        i128::from(amount) * i128::from(numerator),
        i128::from(denominator),
    )
}

/// Narrows a scaled amount whose ratio is below one. Rounding can reach at
/// most `|amount|`, so the value always fits.
fn narrow_fraction(value: i128) -> Amount {
    value as Amount
}

/// A non-negative fraction with fixed parts-per-million precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(u64);

impl Rate {
    pub const ZERO: Rate = Rate(0);
    pub const ONE: Rate = Rate(RATE_SCALE);

    pub const fn from_ppm(ppm: u64) -> Self {
        Rate(ppm)
    }

    /// Converts a decimal fraction, rounding to the nearest millionth.
    pub fn from_fraction(value: f64) -> Result<Self, RateError> {
        if !value.is_finite() {
            return Err(RateError::NotFinite { value });
        }
        if value < 0.0 {
            return Err(RateError::Negative { value });
        }
        let ppm = (value * RATE_SCALE as f64).round();
        if ppm > MAX_RATE_PPM as f64 {
            return Err(RateError::OutOfRange { value });
        }
        Ok(Rate(ppm as u64))
    }

    pub fn ppm(self) -> u64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / RATE_SCALE as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `round(amount * rate)`. Rates above one can push the result out of
    /// range.
    pub fn apply(self, amount: Amount) -> Result<Amount, RateError> {
        Amount::try_from(scale(amount, self.0, RATE_SCALE))
            .map_err(|_| RateError::Overflow { amount, rate: self })
    }

    /// The part of a rate-inclusive `gross` amount that the rate accounts for:
    /// `round(gross * r / (1 + r))`.
    pub fn inclusive_part(self, gross: Amount) -> Amount {
        narrow_fraction(scale(gross, self.0, RATE_SCALE + self.0))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.as_f64())
    }
}

/// A [`Rate`] known to lie in `[0, 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Rate", into = "Rate")]
pub struct TaxRate(Rate);

impl TaxRate {
    pub fn new(rate: Rate) -> Result<Self, RateError> {
        if rate.ppm() >= RATE_SCALE {
            return Err(RateError::TaxRateOutOfRange {
                value: rate.as_f64(),
            });
        }
        Ok(TaxRate(rate))
    }

    pub fn from_fraction(value: f64) -> Result<Self, RateError> {
        Self::new(Rate::from_fraction(value)?).map_err(|_| RateError::TaxRateOutOfRange { value })
    }

    pub fn rate(self) -> Rate {
        self.0
    }

    /// `round(amount * rate)`; never larger than `amount`.
    pub fn tax_on(self, amount: Amount) -> Amount {
        narrow_fraction(scale(amount, self.0.ppm(), RATE_SCALE))
    }
}

impl TryFrom<Rate> for TaxRate {
    type Error = RateError;

    fn try_from(rate: Rate) -> Result<Self, Self::Error> {
        TaxRate::new(rate)
    }
}

impl From<TaxRate> for Rate {
    fn from(tax: TaxRate) -> Self {
        tax.0
    }
}

impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
