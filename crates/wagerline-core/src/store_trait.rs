use chrono::{DateTime, Utc};

use crate::bet::{Bet, NewBet, NewParticipation, Participation, ParticipationOutcome};
use crate::error::Result;
use crate::fulfillment::{Fulfillment, NewFulfillment};
use crate::ids::{BetId, CorrelationId, UserId};
use crate::ledger::{LedgerEntry, NewLedgerEntry};
use crate::vote::{NewVote, ResolutionVote};

/// Persistence operations needed by the `SettlementService`.
///
/// The `wagerline-store` crate implements this trait for `WagerStore`
/// (SQLite). Uniqueness must be enforced by the implementation itself:
/// inserting a second vote for a (bet, resolver) pair returns
/// `Error::DuplicateVote`, a second fulfillment for a (bet, winner) pair
/// returns `Error::DuplicateConfirmation`, and a second participation for a
/// (bet, user) pair returns `Error::DuplicateParticipation`.
pub trait SettlementStore: Send + 'static {
    /// Run `f` as one atomic unit: every write it makes commits together, or
    /// none do if it returns an error.
    fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
        Self: Sized;

    // --- Bets ---

    /// Persist a validated bet in the `Open` state and return it with its id.
    fn insert_bet(&mut self, bet: &NewBet, created_at: DateTime<Utc>) -> Result<Bet>;

    fn get_bet(&mut self, id: BetId) -> Result<Option<Bet>>;

    /// Open bets whose deadline is at or before `deadline`.
    fn list_open_bets_due(&mut self, deadline: DateTime<Utc>) -> Result<Vec<Bet>>;

    /// Write the mutable lifecycle fields of `bet` (status, fulfillment status,
    /// resolved outcome and timestamps).
    fn update_bet_state(&mut self, bet: &Bet) -> Result<()>;

    /// Delete a bet together with its participations, votes (and their winner
    /// rows) and fulfillments. Ledger entries are kept. Returns false if the
    /// bet did not exist.
    fn delete_bet(&mut self, id: BetId) -> Result<bool>;

    // --- Participations ---

    fn insert_participation(&mut self, participation: &NewParticipation) -> Result<Participation>;

    fn participations(&mut self, bet: BetId) -> Result<Vec<Participation>>;

    fn set_participation_outcome(
        &mut self,
        bet: BetId,
        user: UserId,
        outcome: ParticipationOutcome,
    ) -> Result<()>;

    // --- Resolution votes ---

    fn insert_vote(&mut self, vote: &NewVote) -> Result<ResolutionVote>;

    /// Remove a resolver's vote and its winner rows. Returns false if absent.
    fn delete_vote(&mut self, bet: BetId, resolver: UserId) -> Result<bool>;

    fn votes(&mut self, bet: BetId) -> Result<Vec<ResolutionVote>>;

    // --- Fulfillments ---

    fn insert_fulfillment(&mut self, fulfillment: &NewFulfillment) -> Result<Fulfillment>;

    fn fulfillments(&mut self, bet: BetId) -> Result<Vec<Fulfillment>>;

    // --- Ledger ---

    /// Current balance; users without a balance row have zero.
    fn balance(&mut self, user: UserId) -> Result<u64>;

    fn set_balance(&mut self, user: UserId, balance: u64, updated_at: DateTime<Utc>) -> Result<()>;

    fn append_ledger_entry(&mut self, entry: &NewLedgerEntry) -> Result<LedgerEntry>;

    /// A user's entries in insertion order.
    fn ledger_entries_for_user(&mut self, user: UserId) -> Result<Vec<LedgerEntry>>;

    /// All entries of one settlement event in insertion order.
    fn ledger_entries_by_correlation(
        &mut self,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<LedgerEntry>>;
}
