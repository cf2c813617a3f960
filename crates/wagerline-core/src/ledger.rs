use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::{BetId, CorrelationId, UserId};
use crate::store_trait::SettlementStore;

pub const REASON_BET_STAKE: &str = "BET_STAKE";
pub const REASON_BET_PAYOUT: &str = "BET_PAYOUT";
pub const REASON_BET_CANCELLED: &str = "BET_CANCELLED";
pub const REASON_BET_NO_WINNER: &str = "BET_NO_WINNER";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Credit = 0,
    Debit = 1,
    TransferIn = 2,
    TransferOut = 3,
}

impl TransactionKind {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Credit),
            1 => Some(Self::Debit),
            2 => Some(Self::TransferIn),
            3 => Some(Self::TransferOut),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_increase(self) -> bool {
        matches!(self, Self::Credit | Self::TransferIn)
    }

    /// Balance after applying `amount`, or `None` on underflow/overflow.
    pub fn apply(self, balance: u64, amount: u64) -> Option<u64> {
        if self.is_increase() {
            balance.checked_add(amount)
        } else {
            balance.checked_sub(amount)
        }
    }
}

/// A requested balance movement, before it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub user: UserId,
    pub kind: TransactionKind,
    pub amount: u64,
    pub reason: String,
    pub correlation_id: CorrelationId,
    pub bet_id: Option<BetId>,
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user: UserId,
    pub kind: TransactionKind,
    pub amount: u64,
    pub reason: String,
    pub balance_before: u64,
    pub balance_after: u64,
    pub correlation_id: CorrelationId,
    pub bet_id: Option<BetId>,
    pub created_at: DateTime<Utc>,
}

/// Immutable, append-only record of one balance movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: i64,
    pub user: UserId,
    pub kind: TransactionKind,
    pub amount: u64,
    pub reason: String,
    pub balance_before: u64,
    pub balance_after: u64,
    pub correlation_id: CorrelationId,
    pub bet_id: Option<BetId>,
    pub created_at: DateTime<Utc>,
}

/// Apply a posting to the user's balance and append the matching ledger entry.
///
/// Must run inside [`SettlementStore::atomically`] so the balance update and
/// the entry commit (or roll back) together. Nothing is written on error.
pub fn record_transaction<S: SettlementStore>(
    store: &mut S,
    posting: &Posting,
    now: DateTime<Utc>,
) -> Result<LedgerEntry> {
    if posting.amount == 0 {
        return Err(Error::InvalidAmount);
    }

    let before = store.balance(posting.user)?;
    let after = match posting.kind.apply(before, posting.amount) {
        Some(after) => after,
        None if posting.kind.is_increase() => return Err(Error::BalanceOverflow(posting.user)),
        None => {
            return Err(Error::InsufficientBalance {
                user: posting.user,
                balance: before,
                requested: posting.amount,
            });
        }
    };

    store.set_balance(posting.user, after, now)?;
    let entry = store.append_ledger_entry(&NewLedgerEntry {
        user: posting.user,
        kind: posting.kind,
        amount: posting.amount,
        reason: posting.reason.clone(),
        balance_before: before,
        balance_after: after,
        correlation_id: posting.correlation_id,
        bet_id: posting.bet_id,
        created_at: now,
    })?;

    log::debug!(
        "ledger: {} {:?} {} ({}) {} -> {} [{}]",
        entry.user,
        entry.kind,
        entry.amount,
        entry.reason,
        entry.balance_before,
        entry.balance_after,
        entry.correlation_id
    );

    Ok(entry)
}

/// Check that every user's entries chain: each entry applies its own amount,
/// and each `balance_after` equals the next entry's `balance_before`.
///
/// Entries are ordered by id per user; the first entry of a user may start
/// from any balance.
pub fn verify_continuity(entries: &[LedgerEntry]) -> bool {
    let mut sorted: Vec<&LedgerEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.id);

    let mut last_after: HashMap<UserId, u64> = HashMap::new();
    for entry in sorted {
        if entry.kind.apply(entry.balance_before, entry.amount) != Some(entry.balance_after) {
            return false;
        }
        if let Some(prev) = last_after.insert(entry.user, entry.balance_after)
            && prev != entry.balance_before
        {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestStore;

    fn posting(user: i64, kind: TransactionKind, amount: u64) -> Posting {
        Posting {
            user: UserId(user),
            kind,
            amount,
            reason: "TEST".into(),
            correlation_id: CorrelationId([7; 16]),
            bet_id: None,
        }
    }

    #[test]
    fn kinds_move_balance_in_the_right_direction() {
        assert_eq!(TransactionKind::Credit.apply(10, 5), Some(15));
        assert_eq!(TransactionKind::TransferIn.apply(10, 5), Some(15));
        assert_eq!(TransactionKind::Debit.apply(10, 5), Some(5));
        assert_eq!(TransactionKind::TransferOut.apply(10, 11), None);
        assert_eq!(TransactionKind::Credit.apply(u64::MAX, 1), None);
    }

    #[test]
    fn records_before_and_after() {
        let mut store = TestStore::default();
        let now = Utc::now();
        let e1 = record_transaction(&mut store, &posting(1, TransactionKind::Credit, 100), now)
            .unwrap();
        let e2 = record_transaction(&mut store, &posting(1, TransactionKind::Debit, 30), now)
            .unwrap();
        assert_eq!((e1.balance_before, e1.balance_after), (0, 100));
        assert_eq!((e2.balance_before, e2.balance_after), (100, 70));
        assert_eq!(store.balance(UserId(1)).unwrap(), 70);
        assert!(verify_continuity(&[e1, e2]));
    }

    #[test]
    fn overdraft_writes_nothing() {
        let mut store = TestStore::default();
        let now = Utc::now();
        record_transaction(&mut store, &posting(1, TransactionKind::Credit, 20), now).unwrap();
        let err = record_transaction(&mut store, &posting(1, TransactionKind::Debit, 21), now)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance {
                balance: 20,
                requested: 21,
                ..
            }
        ));
        assert_eq!(store.balance(UserId(1)).unwrap(), 20);
        assert_eq!(store.ledger_entries_for_user(UserId(1)).unwrap().len(), 1);
    }

    #[test]
    fn zero_amount_rejected() {
        let mut store = TestStore::default();
        let zero = posting(1, TransactionKind::Credit, 0);
        let err = record_transaction(&mut store, &zero, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount));
    }

    #[test]
    fn continuity_detects_gaps() {
        let mut store = TestStore::default();
        let now = Utc::now();
        let e1 = record_transaction(&mut store, &posting(1, TransactionKind::Credit, 50), now)
            .unwrap();
        let mut e2 = record_transaction(&mut store, &posting(1, TransactionKind::Debit, 10), now)
            .unwrap();
        e2.balance_before = 45;
        e2.balance_after = 35;
        assert!(!verify_continuity(&[e1, e2]));
    }
}
