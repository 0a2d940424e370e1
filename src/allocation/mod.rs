//! Proportional allocation of integer totals.
//!
//! Every pooled sum in the model (budgets, procurement, social aid, export
//! revenue, payrolls, household spending) is split with
//! [`proportional_split`], which uses the largest remainder method in exact
//! integer arithmetic so that the parts always add back up to the total.

use serde::{Deserialize, Serialize};

use crate::ledger::{AccountId, Amount};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("cannot allocate a negative total ({total})")]
    NegativeTotal { total: Amount },
    #[error("cannot allocate {total} across zero recipients")]
    NoRecipients { total: Amount },
}

/// Splits `total` into `weights.len()` non-negative parts proportional to
/// `weights` that sum exactly to `total`.
///
/// Each part is the floor of its ideal share; the leftover units go to the
/// largest fractional remainders, ties broken by input order. A zero total or
/// an all-zero weight vector yields zeros.
pub fn proportional_split(total: Amount, weights: &[u64]) -> Result<Vec<Amount>, AllocationError> {
    if total < 0 {
        return Err(AllocationError::NegativeTotal { total });
    }
    if weights.is_empty() {
        if total == 0 {
            return Ok(Vec::new());
        }
        return Err(AllocationError::NoRecipients { total });
    }

    let weight_sum: u128 = weights.iter().map(|w| u128::from(*w)).sum();
    if total == 0 || weight_sum == 0 {
        return Ok(vec![0; weights.len()]);
    }

    // total < 2^63 and each weight < 2^64, so every product fits in u128
    let total_units = total as u128;
    let mut shares = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for (idx, weight) in weights.iter().enumerate() {
        let scaled = total_units * u128::from(*weight);
        shares.push((scaled / weight_sum) as Amount);
        remainders.push((idx, scaled % weight_sum));
    }

    let allocated: Amount = shares.iter().sum();
    let shortfall = (total - allocated) as usize;

    // stable: equal remainders keep input order
    remainders.sort_by(|a, b| b.1.cmp(&a.1));
    for (idx, _) in remainders.into_iter().take(shortfall) {
        shares[idx] += 1;
    }
    Ok(shares)
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedTransfer {
    pub to: AccountId,
    pub amount: Amount,
}

/// A set of payments out of one account, applied by
/// [`ClearingHouse::execute`](crate::ledger::ClearingHouse::execute).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Disbursement {
    pub from: AccountId,
    pub transfers: Vec<PlannedTransfer>,
}

impl Disbursement {
    /// Splits `total` across `recipients` by weight. Recipients whose share
    /// rounds to zero get no transfer.
    pub fn proportional(
        from: AccountId,
        total: Amount,
        recipients: &[(AccountId, u64)],
    ) -> Result<Self, AllocationError> {
        let weights: Vec<u64> = recipients.iter().map(|(_, weight)| *weight).collect();
        let amounts = proportional_split(total, &weights)?;
        let transfers = recipients
            .iter()
            .zip(amounts)
            .filter(|(_, amount)| *amount > 0)
            .map(|((to, _), amount)| PlannedTransfer { to: *to, amount })
            .collect();
        Ok(Self { from, transfers })
    }

    pub fn total_amount(&self) -> Amount {
        self.transfers.iter().map(|t| t.amount).sum()
    }

    pub fn amount_for(&self, to: AccountId) -> Amount {
        self.transfers
            .iter()
            .filter(|t| t.to == to)
            .map(|t| t.amount)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ClearingHouse, TaxRate};
    use proptest::prelude::*;

    #[test]
    fn equal_weights_give_extra_unit_to_first() {
        assert_eq!(proportional_split(100, &[1, 1, 1]).unwrap(), vec![34, 33, 33]);
        assert_eq!(proportional_split(101, &[1, 1, 1]).unwrap(), vec![34, 34, 33]);
    }

    #[test]
    fn exact_division_has_no_remainder() {
        assert_eq!(proportional_split(10, &[5, 3, 2]).unwrap(), vec![5, 3, 2]);
        assert_eq!(proportional_split(1_000, &[50, 30, 20]).unwrap(), vec![500, 300, 200]);
    }

    #[test]
    fn largest_remainder_wins_over_input_order() {
        // ideal shares: 1.4, 2.8, 5.6 -> floors 1, 2, 5, shortfall 2
        assert_eq!(proportional_split(10, &[1, 2, 4]).unwrap(), vec![1, 3, 6]);
        // ideal shares: 3.33.., 6.66.. -> the larger remainder takes the unit
        assert_eq!(proportional_split(10, &[1, 2]).unwrap(), vec![3, 7]);
    }

    #[test]
    fn degenerate_inputs_yield_zeros() {
        assert_eq!(proportional_split(0, &[3, 4, 5]).unwrap(), vec![0, 0, 0]);
        assert_eq!(proportional_split(77, &[0, 0, 0]).unwrap(), vec![0, 0, 0]);
        assert_eq!(proportional_split(0, &[]).unwrap(), Vec::<Amount>::new());
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert_eq!(
            proportional_split(-1, &[1, 2]),
            Err(AllocationError::NegativeTotal { total: -1 })
        );
        assert_eq!(
            proportional_split(5, &[]),
            Err(AllocationError::NoRecipients { total: 5 })
        );
    }

    #[test]
    fn zero_weight_recipients_get_nothing() {
        assert_eq!(proportional_split(7, &[0, 1, 0, 1]).unwrap(), vec![0, 4, 0, 3]);
    }

    #[test]
    fn huge_weights_do_not_overflow() {
        let split = proportional_split(Amount::MAX, &[u64::MAX, u64::MAX, 1]).unwrap();
        assert_eq!(split.iter().map(|v| *v as i128).sum::<i128>(), Amount::MAX as i128);
    }

    #[test]
    fn disbursement_drops_zero_transfers() {
        let plan = Disbursement::proportional(2, 3, &[(10, 1), (11, 1), (12, 1), (13, 1)]).unwrap();
        assert_eq!(plan.transfers.len(), 3);
        assert_eq!(plan.total_amount(), 3);
        assert_eq!(plan.amount_for(13), 0);
        assert!(Disbursement::proportional(2, 0, &[(10, 1)]).unwrap().is_empty());
    }

    #[test]
    fn split_and_tax_share_one_rounding_rule() {
        // A budget split followed by taxed payments must round the same way
        // the rate helpers do, or conservation drifts across many payments.
        let tax = TaxRate::from_fraction(0.1).unwrap();
        let recipients: Vec<(AccountId, u64)> = (0..40).map(|i| (100 + i, 1 + u64::from(i % 3))).collect();
        let plan = Disbursement::proportional(2, 12_345, &recipients).unwrap();
        assert_eq!(plan.total_amount(), 12_345);

        let mut ledger = ClearingHouse::new(1);
        ledger.register_account(2, 12_345).unwrap();
        let charged = ledger.execute(&plan, Some(tax)).unwrap();
        let expected: Amount = plan.transfers.iter().map(|t| tax.rate().apply(t.amount).unwrap()).sum();
        assert_eq!(charged, expected);
        assert_eq!(ledger.balance(1), expected);
        assert_eq!(ledger.balance(2), -expected);
        ledger.check_invariant(12_345, 0);
    }

    proptest! {
        #[test]
        fn parts_always_sum_to_total(
            total in 0i64..10_000_000_000,
            weights in proptest::collection::vec(0u64..1_000_000, 1..64),
        ) {
            let parts = proportional_split(total, &weights).unwrap();
            prop_assert_eq!(parts.len(), weights.len());
            prop_assert!(parts.iter().all(|p| *p >= 0));
            if weights.iter().any(|w| *w > 0) {
                prop_assert_eq!(parts.iter().sum::<Amount>(), total);
            }
        }

        #[test]
        fn parts_stay_within_one_unit_of_ideal(
            total in 0i64..1_000_000,
            weights in proptest::collection::vec(0u64..10_000, 1..32),
        ) {
            let weight_sum: u64 = weights.iter().sum();
            prop_assume!(weight_sum > 0);
            let parts = proportional_split(total, &weights).unwrap();
            for (part, weight) in parts.iter().zip(&weights) {
                // |part - total*w/W| < 1  <=>  |part*W - total*w| < W
                let lhs = i128::from(*part) * i128::from(weight_sum)
                    - i128::from(total) * i128::from(*weight);
                prop_assert!(lhs.abs() < i128::from(weight_sum));
            }
        }

        #[test]
        fn split_is_deterministic(
            total in 0i64..1_000_000,
            weights in proptest::collection::vec(0u64..100, 0..32),
        ) {
            let total = if weights.is_empty() { 0 } else { total };
            prop_assert_eq!(
                proportional_split(total, &weights),
                proportional_split(total, &weights)
            );
        }
    }
}
