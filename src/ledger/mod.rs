use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::allocation::Disbursement;

mod rate;

pub use rate::{round_div, Rate, RateError, TaxRate, RATE_SCALE};

pub type AccountId = u32;
pub type Amount = i64;

/// Rounding slack allowed by the conservation check.
pub const INVARIANT_TOLERANCE: Amount = 1;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account {account} is already registered")]
    DuplicateAccount { account: AccountId },
    #[error("transfer amount {amount} from {from} to {to} is negative")]
    NegativeAmount {
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
    #[error("transfer of {amount} from {from} to {to} overflows the balance of {account}")]
    Overflow {
        account: AccountId,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "conservation violated: domestic={domestic} external={external} total={total} \
     expected={expected} tolerance={tolerance}"
)]
pub struct ConservationViolation {
    pub domestic: i128,
    pub external: i128,
    pub total: i128,
    pub expected: i128,
    pub tolerance: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConservationReport {
    pub domestic: i128,
    pub external: i128,
    pub drift: i128,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    pub transfers: u64,
    pub volume: i128,
    /// Everything credited to the tax authority, automatic tax included.
    pub tax_received: i128,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub step: u64,
    pub accounts: BTreeMap<AccountId, Amount>,
    pub stats: TransferStats,
    #[serde(with = "hex_digest")]
    pub digest: [u8; 32],
}

impl LedgerSnapshot {
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

/// Sole owner of every balance in a run.
#[derive(Debug)]
pub struct ClearingHouse {
    accounts: BTreeMap<AccountId, Amount>,
    tax_authority: AccountId,
    external: BTreeSet<AccountId>,
    stats: TransferStats,
}

impl ClearingHouse {
    pub fn new(tax_authority: AccountId) -> Self {
        Self {
            accounts: BTreeMap::new(),
            tax_authority,
            external: BTreeSet::new(),
            stats: TransferStats::default(),
        }
    }

    /// Marks accounts that sit outside the domestic economy (the foreign sector).
    pub fn with_external_accounts(mut self, ids: impl IntoIterator<Item = AccountId>) -> Self {
        self.external.extend(ids);
        self
    }

    pub fn tax_authority(&self) -> AccountId {
        self.tax_authority
    }

    pub fn is_external(&self, id: AccountId) -> bool {
        self.external.contains(&id)
    }

    pub fn register_account(
        &mut self,
        id: AccountId,
        opening_balance: Amount,
    ) -> Result<(), LedgerError> {
        if self.accounts.contains_key(&id) {
            return Err(LedgerError::DuplicateAccount { account: id });
        }
        self.accounts.insert(id, opening_balance);
        Ok(())
    }

    pub fn contains(&self, id: AccountId) -> bool {
        self.accounts.contains_key(&id)
    }

    pub fn balance(&self, id: AccountId) -> Amount {
        self.accounts.get(&id).copied().unwrap_or(0)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (AccountId, Amount)> + '_ {
        self.accounts.iter().map(|(id, balance)| (*id, *balance))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// Moves `amount` from `from` to `to`. A taxable transfer additionally
    /// charges the sender `round(amount * rate)` in favour of the tax
    /// authority. Returns the tax charged.
    ///
    /// Overdraft is allowed. Every new balance is computed before any is
    /// written, so a rejected transfer leaves the table untouched.
    pub fn transfer(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        tax: Option<TaxRate>,
    ) -> Result<Amount, LedgerError> {
        if amount < 0 {
            return Err(LedgerError::NegativeAmount { from, to, amount });
        }
        let tax_amount = tax.map_or(0, |rate| rate.tax_on(amount));

        let mut deltas: Vec<(AccountId, i128)> = Vec::with_capacity(3);
        add_delta(&mut deltas, from, -(i128::from(amount) + i128::from(tax_amount)));
        add_delta(&mut deltas, to, i128::from(amount));
        if tax_amount > 0 {
            add_delta(&mut deltas, self.tax_authority, i128::from(tax_amount));
        }

        let mut updates = Vec::with_capacity(deltas.len());
        for (account, delta) in deltas {
            let balance = Amount::try_from(i128::from(self.balance(account)) + delta).map_err(
                |_| LedgerError::Overflow {
                    account,
                    from,
                    to,
                    amount,
                },
            )?;
            updates.push((account, balance));
        }
        for (account, balance) in updates {
            self.accounts.insert(account, balance);
        }

        if to == self.tax_authority {
            self.stats.tax_received += i128::from(amount);
        }
        self.stats.tax_received += i128::from(tax_amount);
        self.stats.transfers += 1;
        self.stats.volume += i128::from(amount);
        Ok(tax_amount)
    }

    /// Applies a disbursement plan one transfer at a time, so tax is rounded
    /// per recipient. Returns the total tax charged.
    pub fn execute(
        &mut self,
        plan: &Disbursement,
        tax: Option<TaxRate>,
    ) -> Result<Amount, LedgerError> {
        let mut total_tax = 0;
        for transfer in &plan.transfers {
            total_tax += self.transfer(plan.from, transfer.to, transfer.amount, tax)?;
        }
        Ok(total_tax)
    }

    pub fn conservation(
        &self,
        expected_capital: Amount,
        tolerance: Amount,
    ) -> Result<ConservationReport, ConservationViolation> {
        let mut domestic: i128 = 0;
        let mut external: i128 = 0;
        for (id, balance) in &self.accounts {
            if self.external.contains(id) {
                external += i128::from(*balance);
            } else {
                domestic += i128::from(*balance);
            }
        }
        let total = domestic + external;
        let drift = total - i128::from(expected_capital);
        if drift.abs() > i128::from(tolerance) {
            return Err(ConservationViolation {
                domestic,
                external,
                total,
                expected: i128::from(expected_capital),
                tolerance,
            });
        }
        Ok(ConservationReport {
            domestic,
            external,
            drift,
        })
    }

    /// Aborts the run when money has been created or destroyed.
    pub fn check_invariant(&self, expected_capital: Amount, tolerance: Amount) {
        if let Err(violation) = self.conservation(expected_capital, tolerance) {
            panic!("{violation}");
        }
    }

    /// SHA-256 over the ordered account table.
    pub fn digest(&self) -> [u8; 32] {
        compute_digest(&self.accounts)
    }

    pub fn snapshot(&self, step: u64) -> LedgerSnapshot {
        LedgerSnapshot {
            step,
            accounts: self.accounts.clone(),
            stats: self.stats,
            digest: self.digest(),
        }
    }
}

/// Accumulates per-account changes; sender, recipient and tax authority may
/// coincide.
fn add_delta(deltas: &mut Vec<(AccountId, i128)>, account: AccountId, delta: i128) {
    match deltas.iter_mut().find(|(id, _)| *id == account) {
        Some((_, total)) => *total += delta,
        None => deltas.push((account, delta)),
    }
}

fn compute_digest(accounts: &BTreeMap<AccountId, Amount>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"econsim-ledger");
    for (id, balance) in accounts {
        hasher.update(id.to_le_bytes());
        hasher.update(balance.to_le_bytes());
    }
    hasher.finalize().into()
}

mod hex_digest {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(digest: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(digest))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(text.trim()).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("digest must be 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TAX: AccountId = 1;
    const FOREIGN: AccountId = 5;

    fn tax_rate(value: f64) -> TaxRate {
        TaxRate::from_fraction(value).unwrap()
    }

    #[test]
    fn taxable_transfer_moves_amount_and_tax() {
        let mut ledger = ClearingHouse::new(TAX);
        ledger.register_account(TAX, 0).unwrap();
        ledger.register_account(10, 1_000).unwrap();
        ledger.register_account(11, 0).unwrap();

        let tax = ledger.transfer(10, 11, 100, Some(tax_rate(0.2))).unwrap();

        assert_eq!(tax, 20);
        assert_eq!(ledger.balance(10), 880);
        assert_eq!(ledger.balance(11), 100);
        assert_eq!(ledger.balance(TAX), 20);
        assert_eq!(ledger.stats().tax_received, 20);
    }

    #[test]
    fn untaxed_transfer_leaves_tax_authority_alone() {
        let mut ledger = ClearingHouse::new(TAX);
        ledger.register_account(10, 50).unwrap();
        ledger.transfer(10, 11, 80, None).unwrap();
        assert_eq!(ledger.balance(10), -30);
        assert_eq!(ledger.balance(11), 80);
        assert!(!ledger.contains(TAX));
    }

    #[test]
    fn unknown_accounts_are_upserted_with_zero_balance() {
        let mut ledger = ClearingHouse::new(TAX);
        ledger.transfer(7, 8, 25, None).unwrap();
        assert!(ledger.contains(7));
        assert!(ledger.contains(8));
        assert_eq!(ledger.balance(7), -25);
        assert_eq!(ledger.balance(8), 25);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut ledger = ClearingHouse::new(TAX);
        ledger.register_account(42, 10).unwrap();
        assert_eq!(
            ledger.register_account(42, 99),
            Err(LedgerError::DuplicateAccount { account: 42 })
        );
        assert_eq!(ledger.balance(42), 10);
    }

    #[test]
    fn negative_amount_is_rejected_without_side_effects() {
        let mut ledger = ClearingHouse::new(TAX);
        ledger.register_account(1_000, 10).unwrap();
        let err = ledger.transfer(1_000, 1_001, -3, None).unwrap_err();
        assert!(matches!(err, LedgerError::NegativeAmount { amount: -3, .. }));
        assert_eq!(ledger.balance(1_000), 10);
        assert!(!ledger.contains(1_001));
        assert_eq!(ledger.stats().transfers, 0);
    }

    #[test]
    fn overflowing_debit_is_rejected_without_side_effects() {
        let mut ledger = ClearingHouse::new(TAX);
        let err = ledger
            .transfer(10, 11, Amount::MAX - 10, Some(tax_rate(0.5)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Overflow { account: 10, .. }));
        assert!(!ledger.contains(10));
        assert!(!ledger.contains(11));
        assert!(!ledger.contains(TAX));
        assert_eq!(ledger.stats(), TransferStats::default());
    }

    #[test]
    fn overflowing_credit_is_rejected_without_side_effects() {
        let mut ledger = ClearingHouse::new(TAX);
        ledger.register_account(11, Amount::MAX - 5).unwrap();
        let err = ledger.transfer(10, 11, 10, None).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Overflow {
                account: 11,
                from: 10,
                to: 11,
                amount: 10,
            }
        );
        assert_eq!(ledger.balance(11), Amount::MAX - 5);
        assert!(!ledger.contains(10));
        assert_eq!(ledger.stats().transfers, 0);
    }

    #[test]
    fn self_transfer_only_costs_the_tax() {
        let mut ledger = ClearingHouse::new(TAX);
        ledger.register_account(10, Amount::MAX).unwrap();
        // the amount nets out, so a full balance does not overflow
        let tax = ledger.transfer(10, 10, 100, Some(tax_rate(0.2))).unwrap();
        assert_eq!(tax, 20);
        assert_eq!(ledger.balance(10), Amount::MAX - 20);
        assert_eq!(ledger.balance(TAX), 20);
    }

    #[test]
    fn executing_a_plan_rounds_tax_per_transfer() {
        let mut ledger = ClearingHouse::new(TAX);
        ledger.register_account(2, 1_000).unwrap();
        let plan = Disbursement::proportional(2, 15, &[(20, 1), (21, 1), (22, 1)]).unwrap();
        // 5 units each, 10% tax: 0.5 rounds up per transfer
        let tax = ledger.execute(&plan, Some(tax_rate(0.1))).unwrap();
        assert_eq!(tax, 3);
        assert_eq!(ledger.balance(2), 1_000 - 15 - 3);
        assert_eq!(ledger.balance(TAX), 3);
    }

    #[test]
    fn invariant_counts_external_accounts() {
        let mut ledger = ClearingHouse::new(TAX).with_external_accounts([FOREIGN]);
        ledger.register_account(4, 1_000).unwrap();
        ledger.register_account(FOREIGN, 0).unwrap();
        ledger.transfer(4, FOREIGN, 300, Some(tax_rate(0.2))).unwrap();

        let report = ledger.conservation(1_000, INVARIANT_TOLERANCE).unwrap();
        assert_eq!(report.external, 300);
        assert_eq!(report.domestic, 700);
        assert_eq!(report.drift, 0);
        ledger.check_invariant(1_000, INVARIANT_TOLERANCE);
    }

    #[test]
    fn conservation_reports_drift_beyond_tolerance() {
        let mut ledger = ClearingHouse::new(TAX);
        ledger.register_account(4, 1_000).unwrap();
        assert!(ledger.conservation(1_001, 1).is_ok());
        let violation = ledger.conservation(1_002, 1).unwrap_err();
        assert_eq!(violation.total, 1_000);
        assert_eq!(violation.expected, 1_002);
    }

    #[test]
    #[should_panic(expected = "conservation violated")]
    fn invariant_violation_aborts() {
        let mut ledger = ClearingHouse::new(TAX);
        ledger.register_account(4, 1_000).unwrap();
        ledger.register_account(1_000, 5).unwrap();
        ledger.check_invariant(1_000, INVARIANT_TOLERANCE);
    }

    #[test]
    fn snapshot_digest_is_deterministic_and_tracks_balances() {
        let mut ledger = ClearingHouse::new(TAX);
        ledger.register_account(10, 1_000).unwrap();
        ledger.register_account(11, 2_000).unwrap();
        let first = ledger.snapshot(1);
        assert_eq!(first.digest, ledger.snapshot(1).digest);

        ledger.transfer(10, 11, 1, None).unwrap();
        let second = ledger.snapshot(2);
        assert_ne!(first.digest, second.digest);
        assert_eq!(second.digest_hex().len(), 64);

        let json = serde_json::to_string(&second).unwrap();
        let restored: LedgerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, second);
    }

    proptest! {
        #[test]
        fn transfers_never_break_conservation(
            openings in proptest::collection::vec(-10_000i64..100_000, 2..12),
            moves in proptest::collection::vec(
                (0usize..16, 0usize..16, 0i64..50_000, proptest::option::of(0u64..999_999)),
                0..64,
            ),
        ) {
            let mut ledger = ClearingHouse::new(TAX).with_external_accounts([FOREIGN]);
            ledger.register_account(TAX, 0).unwrap();
            ledger.register_account(FOREIGN, 0).unwrap();
            let mut capital: Amount = 0;
            for (idx, opening) in openings.iter().enumerate() {
                ledger.register_account(1_000 + idx as AccountId, *opening).unwrap();
                capital += opening;
            }
            let ids: Vec<AccountId> = ledger.accounts().map(|(id, _)| id).collect();
            for (from, to, amount, ppm) in moves {
                let from = ids[from % ids.len()];
                let to = ids[to % ids.len()];
                let tax = ppm.map(|ppm| TaxRate::new(Rate::from_ppm(ppm)).unwrap());
                ledger.transfer(from, to, amount, tax).unwrap();
            }
            prop_assert!(ledger.conservation(capital, INVARIANT_TOLERANCE).is_ok());
        }

        #[test]
        fn taxable_transfer_matches_rate_rounding(amount in 0i64..10_000_000, ppm in 0u64..999_999) {
            let rate = TaxRate::new(Rate::from_ppm(ppm)).unwrap();
            let mut ledger = ClearingHouse::new(TAX);
            ledger.transfer(10, 11, amount, Some(rate)).unwrap();
            let expected_tax = rate.rate().apply(amount).unwrap();
            prop_assert_eq!(ledger.balance(10), -(amount + expected_tax));
            prop_assert_eq!(ledger.balance(11), amount);
            prop_assert_eq!(ledger.balance(TAX), expected_tax);
        }
    }
}
