use std::collections::HashMap;

use hearth_core::{Account, AccountId, Transaction};

/// Detects the other leg of a money movement between two household
/// accounts: an opposite-signed transaction of (nearly) the same
/// magnitude on a different account, close in date.
pub struct TransferMatcher {
    pub date_window_days: i64,
    pub amount_tolerance_cents: i64,
}

impl Default for TransferMatcher {
    fn default() -> Self {
        Self {
            date_window_days: 3,
            amount_tolerance_cents: 1,
        }
    }
}

impl TransferMatcher {
    pub fn new(date_window_days: i64, amount_tolerance_cents: i64) -> Self {
        Self {
            date_window_days,
            amount_tolerance_cents,
        }
    }

    /// The best counterpart for `tx` among `candidates`, or `None`.
    ///
    /// When several candidates qualify, the closest by date wins, then
    /// the closest by absolute amount difference, then the lowest id;
    /// never an arbitrary pick.
    pub fn find_pair<'a, I>(
        &self,
        tx: &Transaction,
        candidates: I,
        accounts: &HashMap<AccountId, Account>,
    ) -> Option<&'a Transaction>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        candidates
            .into_iter()
            .filter(|cand| self.qualifies(tx, cand, accounts))
            .min_by_key(|cand| {
                (
                    (cand.date - tx.date).num_days().abs(),
                    (cand.amount.abs().to_cents() - tx.amount.abs().to_cents()).abs(),
                    cand.id.0,
                )
            })
    }

    fn qualifies(
        &self,
        tx: &Transaction,
        cand: &Transaction,
        accounts: &HashMap<AccountId, Account>,
    ) -> bool {
        if cand.id == tx.id || cand.account_id == tx.account_id {
            return false;
        }
        if cand.currency != tx.currency {
            return false;
        }
        // One leg outgoing, the other incoming.
        if !(tx.is_outgoing() && cand.is_incoming() || tx.is_incoming() && cand.is_outgoing()) {
            return false;
        }
        let diff_cents = (cand.amount.abs().to_cents() - tx.amount.abs().to_cents()).abs();
        if diff_cents > self.amount_tolerance_cents {
            return false;
        }
        if (cand.date - tx.date).num_days().abs() > self.date_window_days {
            return false;
        }
        in_same_scope(tx.account_id, cand.account_id, accounts)
    }
}

/// Accounts we know nothing about are treated as household-scoped.
fn in_same_scope(a: AccountId, b: AccountId, accounts: &HashMap<AccountId, Account>) -> bool {
    match (accounts.get(&a), accounts.get(&b)) {
        (Some(left), Some(right)) => left.same_scope(right),
        _ => true,
    }
}
