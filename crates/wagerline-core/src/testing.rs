//! In-memory `SettlementStore` for tests.
//!
//! Enforces the same uniqueness rules as the SQLite store and gives
//! `atomically` real rollback by restoring a snapshot on error.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};

use crate::bet::{
    Bet, BetStatus, BetType, NewBet, NewParticipation, Participation, ParticipationOutcome, Stake,
};
use crate::error::{Error, Result};
use crate::fulfillment::{Fulfillment, NewFulfillment};
use crate::ids::{BetId, CorrelationId, UserId};
use crate::ledger::{LedgerEntry, NewLedgerEntry};
use crate::store_trait::SettlementStore;
use crate::vote::{NewVote, ResolutionVote};

#[derive(Debug, Clone, Default)]
struct TestData {
    next_id: i64,
    bets: BTreeMap<BetId, Bet>,
    participations: Vec<Participation>,
    votes: Vec<ResolutionVote>,
    fulfillments: Vec<Fulfillment>,
    balances: BTreeMap<UserId, u64>,
    ledger: Vec<LedgerEntry>,
}

impl TestData {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct TestStore {
    data: TestData,
    /// When set, every ledger append fails. Used to exercise rollback.
    pub fail_ledger_writes: bool,
}

impl TestStore {
    pub fn ledger_len(&self) -> usize {
        self.data.ledger.len()
    }
}

impl SettlementStore for TestStore {
    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let snapshot = self.data.clone();
        let result = f(self);
        if result.is_err() {
            self.data = snapshot;
        }
        result
    }

    fn insert_bet(&mut self, bet: &NewBet, created_at: DateTime<Utc>) -> Result<Bet> {
        let id = BetId(self.data.next_id());
        let row = Bet {
            id,
            creator: bet.creator,
            title: bet.title.clone(),
            bet_type: bet.bet_type,
            status: BetStatus::Open,
            stake: bet.stake.clone(),
            options: bet.options.clone(),
            resolvers: bet.resolvers.clone(),
            deadline: bet.deadline,
            max_participants: bet.max_participants,
            fulfillment_status: None,
            resolved_outcome: None,
            created_at,
            updated_at: created_at,
            resolved_at: None,
            cancelled_at: None,
        };
        self.data.bets.insert(id, row.clone());
        Ok(row)
    }

    fn get_bet(&mut self, id: BetId) -> Result<Option<Bet>> {
        Ok(self.data.bets.get(&id).cloned())
    }

    fn list_open_bets_due(&mut self, deadline: DateTime<Utc>) -> Result<Vec<Bet>> {
        Ok(self
            .data
            .bets
            .values()
            .filter(|b| b.status == BetStatus::Open && b.deadline <= deadline)
            .cloned()
            .collect())
    }

    fn update_bet_state(&mut self, bet: &Bet) -> Result<()> {
        let row = self
            .data
            .bets
            .get_mut(&bet.id)
            .ok_or(Error::BetNotFound(bet.id))?;
        row.status = bet.status;
        row.fulfillment_status = bet.fulfillment_status;
        row.resolved_outcome = bet.resolved_outcome.clone();
        row.updated_at = bet.updated_at;
        row.resolved_at = bet.resolved_at;
        row.cancelled_at = bet.cancelled_at;
        Ok(())
    }

    fn delete_bet(&mut self, id: BetId) -> Result<bool> {
        self.data.fulfillments.retain(|f| f.bet_id != id);
        self.data.votes.retain(|v| v.bet_id != id);
        self.data.participations.retain(|p| p.bet_id != id);
        Ok(self.data.bets.remove(&id).is_some())
    }

    fn insert_participation(&mut self, participation: &NewParticipation) -> Result<Participation> {
        if self
            .data
            .participations
            .iter()
            .any(|p| p.bet_id == participation.bet_id && p.user == participation.user)
        {
            return Err(Error::DuplicateParticipation {
                bet: participation.bet_id,
                user: participation.user,
            });
        }
        let row = Participation {
            id: self.data.next_id(),
            bet_id: participation.bet_id,
            user: participation.user,
            pick: participation.pick.clone(),
            stake_amount: participation.stake_amount,
            outcome: ParticipationOutcome::Pending,
            created_at: participation.created_at,
        };
        self.data.participations.push(row.clone());
        Ok(row)
    }

    fn participations(&mut self, bet: BetId) -> Result<Vec<Participation>> {
        Ok(self
            .data
            .participations
            .iter()
            .filter(|p| p.bet_id == bet)
            .cloned()
            .collect())
    }

    fn set_participation_outcome(
        &mut self,
        bet: BetId,
        user: UserId,
        outcome: ParticipationOutcome,
    ) -> Result<()> {
        for p in self
            .data
            .participations
            .iter_mut()
            .filter(|p| p.bet_id == bet && p.user == user)
        {
            p.outcome = outcome;
        }
        Ok(())
    }

    fn insert_vote(&mut self, vote: &NewVote) -> Result<ResolutionVote> {
        if self
            .data
            .votes
            .iter()
            .any(|v| v.bet_id == vote.bet_id && v.resolver == vote.resolver)
        {
            return Err(Error::DuplicateVote {
                bet: vote.bet_id,
                resolver: vote.resolver,
            });
        }
        let row = ResolutionVote {
            id: self.data.next_id(),
            bet_id: vote.bet_id,
            resolver: vote.resolver,
            selection: vote.selection.clone(),
            created_at: vote.created_at,
        };
        self.data.votes.push(row.clone());
        Ok(row)
    }

    fn delete_vote(&mut self, bet: BetId, resolver: UserId) -> Result<bool> {
        let before = self.data.votes.len();
        self.data
            .votes
            .retain(|v| !(v.bet_id == bet && v.resolver == resolver));
        Ok(self.data.votes.len() != before)
    }

    fn votes(&mut self, bet: BetId) -> Result<Vec<ResolutionVote>> {
        Ok(self
            .data
            .votes
            .iter()
            .filter(|v| v.bet_id == bet)
            .cloned()
            .collect())
    }

    fn insert_fulfillment(&mut self, fulfillment: &NewFulfillment) -> Result<Fulfillment> {
        if self
            .data
            .fulfillments
            .iter()
            .any(|f| f.bet_id == fulfillment.bet_id && f.winner == fulfillment.winner)
        {
            return Err(Error::DuplicateConfirmation {
                bet: fulfillment.bet_id,
                winner: fulfillment.winner,
            });
        }
        let row = Fulfillment {
            id: self.data.next_id(),
            bet_id: fulfillment.bet_id,
            winner: fulfillment.winner,
            notes: fulfillment.notes.clone(),
            confirmed_at: fulfillment.confirmed_at,
        };
        self.data.fulfillments.push(row.clone());
        Ok(row)
    }

    fn fulfillments(&mut self, bet: BetId) -> Result<Vec<Fulfillment>> {
        Ok(self
            .data
            .fulfillments
            .iter()
            .filter(|f| f.bet_id == bet)
            .cloned()
            .collect())
    }

    fn balance(&mut self, user: UserId) -> Result<u64> {
        Ok(self.data.balances.get(&user).copied().unwrap_or(0))
    }

    fn set_balance(
        &mut self,
        user: UserId,
        balance: u64,
        _updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.data.balances.insert(user, balance);
        Ok(())
    }

    fn append_ledger_entry(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry> {
        if self.fail_ledger_writes {
            return Err(Error::Store("injected ledger failure".into()));
        }
        let row = LedgerEntry {
            id: self.data.next_id(),
            user: entry.user,
            kind: entry.kind,
            amount: entry.amount,
            reason: entry.reason.clone(),
            balance_before: entry.balance_before,
            balance_after: entry.balance_after,
            correlation_id: entry.correlation_id,
            bet_id: entry.bet_id,
            created_at: entry.created_at,
        };
        self.data.ledger.push(row.clone());
        Ok(row)
    }

    fn ledger_entries_for_user(&mut self, user: UserId) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .data
            .ledger
            .iter()
            .filter(|e| e.user == user)
            .cloned()
            .collect())
    }

    fn ledger_entries_by_correlation(
        &mut self,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .data
            .ledger
            .iter()
            .filter(|e| e.correlation_id == *correlation_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Shared request builders
// ---------------------------------------------------------------------------

pub fn users(ids: &[i64]) -> BTreeSet<UserId> {
    ids.iter().map(|&i| UserId(i)).collect()
}

/// A binary credit bet due in one hour.
pub fn binary_bet(creator: i64, stake: u64, resolvers: &[i64]) -> NewBet {
    NewBet {
        creator: UserId(creator),
        title: "Will it rain on Saturday?".into(),
        bet_type: BetType::Binary,
        stake: Stake::Credit(stake),
        options: vec![],
        resolvers: users(resolvers),
        deadline: Utc::now() + Duration::hours(1),
        max_participants: None,
    }
}

/// A prediction bet due in one hour.
pub fn prediction_bet(creator: i64, stake: Stake, resolvers: &[i64]) -> NewBet {
    NewBet {
        creator: UserId(creator),
        title: "Final score of the cup final".into(),
        bet_type: BetType::Prediction,
        stake,
        options: vec![],
        resolvers: users(resolvers),
        deadline: Utc::now() + Duration::hours(1),
        max_participants: None,
    }
}

/// A multiple-choice credit bet due in one hour.
pub fn multiple_choice_bet(
    creator: i64,
    stake: u64,
    options: &[&str],
    resolvers: &[i64],
) -> NewBet {
    NewBet {
        creator: UserId(creator),
        title: "Which team tops the table?".into(),
        bet_type: BetType::MultipleChoice,
        stake: Stake::Credit(stake),
        options: options.iter().map(|s| s.to_string()).collect(),
        resolvers: users(resolvers),
        deadline: Utc::now() + Duration::hours(1),
        max_participants: None,
    }
}
