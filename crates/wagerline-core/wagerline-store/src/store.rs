use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use wagerline_core::{
    Bet, BetId, CorrelationId, Error, Fulfillment, LedgerEntry, NewBet, NewFulfillment,
    NewLedgerEntry, NewParticipation, NewVote, Participation, ParticipationOutcome,
    ResolutionVote, SettlementStore, UserId, VoteSelection,
};

use crate::conversions::{
    amount_from_db, amount_to_db, bet_from_row, new_bet_row, new_fulfillment_row,
    new_ledger_row, new_participation_row, new_vote_row, time_to_db, vote_from_row,
};
use crate::error::StoreError;
use crate::models::{
    BalanceRow, BetResolverRow, BetRow, FulfillmentRow, LedgerRow, ParticipationRow, VoteRow,
    VoteWinnerRow,
};
use crate::schema::{
    account_balances, bet_fulfillments, bet_participations, bet_resolution_vote_winners,
    bet_resolution_votes, bet_resolvers, bets, ledger_transactions,
};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// SQLite-backed persistence for bets, votes, fulfillments and the ledger.
pub struct WagerStore {
    conn: SqliteConnection,
}

impl WagerStore {
    /// Open (or create) a store at the given file path. Runs migrations automatically.
    pub fn open(path: &str) -> crate::Result<Self> {
        let mut conn = SqliteConnection::establish(path)?;
        diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(WagerStore { conn })
    }

    /// Open an in-memory store for tests.
    pub fn open_in_memory() -> crate::Result<Self> {
        let mut conn = SqliteConnection::establish(":memory:")?;
        diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(WagerStore { conn })
    }

    fn last_insert_rowid(&mut self) -> crate::Result<i64> {
        Ok(diesel::select(diesel::dsl::sql::<BigInt>("last_insert_rowid()"))
            .get_result(&mut self.conn)?)
    }

    // ==================== Bets ====================

    pub fn insert_bet(&mut self, bet: &NewBet, created_at: DateTime<Utc>) -> crate::Result<Bet> {
        let row = new_bet_row(bet, &created_at)?;
        diesel::insert_into(bets::table)
            .values(&row)
            .execute(&mut self.conn)?;
        let bet_id = self.last_insert_rowid()?;

        let resolvers: Vec<BetResolverRow> = bet
            .resolvers
            .iter()
            .map(|r| BetResolverRow {
                bet_id,
                user_id: r.0,
            })
            .collect();
        diesel::insert_into(bet_resolvers::table)
            .values(&resolvers)
            .execute(&mut self.conn)?;

        self.get_bet(BetId(bet_id))?
            .ok_or_else(|| StoreError::InvalidData(format!("bet {bet_id} vanished after insert")))
    }

    pub fn get_bet(&mut self, id: BetId) -> crate::Result<Option<Bet>> {
        let row: Option<BetRow> = bets::table
            .filter(bets::id.eq(id.0))
            .select(BetRow::as_select())
            .first(&mut self.conn)
            .optional()?;
        match row {
            Some(row) => {
                let resolvers = self.resolvers_of(id)?;
                Ok(Some(bet_from_row(row, resolvers)?))
            }
            None => Ok(None),
        }
    }

    fn resolvers_of(&mut self, id: BetId) -> crate::Result<BTreeSet<UserId>> {
        let ids: Vec<i64> = bet_resolvers::table
            .filter(bet_resolvers::bet_id.eq(id.0))
            .select(bet_resolvers::user_id)
            .load(&mut self.conn)?;
        Ok(ids.into_iter().map(UserId).collect())
    }

    pub fn list_open_bets_due(&mut self, deadline: DateTime<Utc>) -> crate::Result<Vec<Bet>> {
        let rows: Vec<BetRow> = bets::table
            .filter(bets::bet_status.eq(wagerline_core::BetStatus::Open.as_i32()))
            .filter(bets::deadline.le(time_to_db(&deadline)))
            .order(bets::id.asc())
            .select(BetRow::as_select())
            .load(&mut self.conn)?;
        rows.into_iter()
            .map(|row| {
                let resolvers = self.resolvers_of(BetId(row.id))?;
                bet_from_row(row, resolvers)
            })
            .collect()
    }

    /// Returns false if no row matched.
    pub fn update_bet_state(&mut self, bet: &Bet) -> crate::Result<bool> {
        let updated = diesel::update(bets::table.filter(bets::id.eq(bet.id.0)))
            .set((
                bets::bet_status.eq(bet.status.as_i32()),
                bets::fulfillment_status.eq(bet.fulfillment_status.map(|s| s.as_i32())),
                bets::resolved_outcome.eq(bet.resolved_outcome.clone()),
                bets::updated_at.eq(time_to_db(&bet.updated_at)),
                bets::resolved_at.eq(bet.resolved_at.as_ref().map(time_to_db)),
                bets::cancelled_at.eq(bet.cancelled_at.as_ref().map(time_to_db)),
            ))
            .execute(&mut self.conn)?;
        Ok(updated > 0)
    }

    /// Delete a bet and everything that hangs off it except ledger history.
    pub fn delete_bet(&mut self, id: BetId) -> crate::Result<bool> {
        let vote_ids = bet_resolution_votes::table
            .filter(bet_resolution_votes::bet_id.eq(id.0))
            .select(bet_resolution_votes::id);
        diesel::delete(
            bet_resolution_vote_winners::table
                .filter(bet_resolution_vote_winners::vote_id.eq_any(vote_ids)),
        )
        .execute(&mut self.conn)?;
        diesel::delete(bet_resolution_votes::table.filter(bet_resolution_votes::bet_id.eq(id.0)))
            .execute(&mut self.conn)?;
        diesel::delete(bet_fulfillments::table.filter(bet_fulfillments::bet_id.eq(id.0)))
            .execute(&mut self.conn)?;
        diesel::delete(bet_participations::table.filter(bet_participations::bet_id.eq(id.0)))
            .execute(&mut self.conn)?;
        diesel::delete(bet_resolvers::table.filter(bet_resolvers::bet_id.eq(id.0)))
            .execute(&mut self.conn)?;
        let deleted =
            diesel::delete(bets::table.filter(bets::id.eq(id.0))).execute(&mut self.conn)?;
        Ok(deleted > 0)
    }

    // ==================== Participations ====================

    pub fn insert_participation(&mut self, p: &NewParticipation) -> crate::Result<Participation> {
        let row = new_participation_row(p)?;
        diesel::insert_into(bet_participations::table)
            .values(&row)
            .execute(&mut self.conn)?;
        let id = self.last_insert_rowid()?;
        let row: ParticipationRow = bet_participations::table
            .filter(bet_participations::id.eq(id))
            .select(ParticipationRow::as_select())
            .first(&mut self.conn)?;
        Participation::try_from(row)
    }

    pub fn participations(&mut self, bet: BetId) -> crate::Result<Vec<Participation>> {
        let rows: Vec<ParticipationRow> = bet_participations::table
            .filter(bet_participations::bet_id.eq(bet.0))
            .order(bet_participations::id.asc())
            .select(ParticipationRow::as_select())
            .load(&mut self.conn)?;
        rows.into_iter().map(Participation::try_from).collect()
    }

    pub fn set_participation_outcome(
        &mut self,
        bet: BetId,
        user: UserId,
        outcome: ParticipationOutcome,
    ) -> crate::Result<()> {
        diesel::update(
            bet_participations::table
                .filter(bet_participations::bet_id.eq(bet.0))
                .filter(bet_participations::user_id.eq(user.0)),
        )
        .set(bet_participations::outcome.eq(outcome.as_i32()))
        .execute(&mut self.conn)?;
        Ok(())
    }

    // ==================== Votes ====================

    pub fn insert_vote(&mut self, vote: &NewVote) -> crate::Result<ResolutionVote> {
        diesel::insert_into(bet_resolution_votes::table)
            .values(&new_vote_row(vote))
            .execute(&mut self.conn)?;
        let vote_id = self.last_insert_rowid()?;

        if let VoteSelection::Winners(winners) = &vote.selection
            && !winners.is_empty()
        {
            let rows: Vec<VoteWinnerRow> = winners
                .iter()
                .map(|w| VoteWinnerRow {
                    vote_id,
                    winner_id: w.0,
                })
                .collect();
            diesel::insert_into(bet_resolution_vote_winners::table)
                .values(&rows)
                .execute(&mut self.conn)?;
        }

        let row: VoteRow = bet_resolution_votes::table
            .filter(bet_resolution_votes::id.eq(vote_id))
            .select(VoteRow::as_select())
            .first(&mut self.conn)?;
        let winners = match &vote.selection {
            VoteSelection::Winners(w) => w.clone(),
            VoteSelection::Outcome(_) => BTreeSet::new(),
        };
        vote_from_row(row, winners)
    }

    pub fn delete_vote(&mut self, bet: BetId, resolver: UserId) -> crate::Result<bool> {
        let vote_id: Option<i64> = bet_resolution_votes::table
            .filter(bet_resolution_votes::bet_id.eq(bet.0))
            .filter(bet_resolution_votes::resolver_id.eq(resolver.0))
            .select(bet_resolution_votes::id)
            .first(&mut self.conn)
            .optional()?;
        let Some(vote_id) = vote_id else {
            return Ok(false);
        };
        diesel::delete(
            bet_resolution_vote_winners::table
                .filter(bet_resolution_vote_winners::vote_id.eq(vote_id)),
        )
        .execute(&mut self.conn)?;
        diesel::delete(bet_resolution_votes::table.filter(bet_resolution_votes::id.eq(vote_id)))
            .execute(&mut self.conn)?;
        Ok(true)
    }

    pub fn votes(&mut self, bet: BetId) -> crate::Result<Vec<ResolutionVote>> {
        let rows: Vec<VoteRow> = bet_resolution_votes::table
            .filter(bet_resolution_votes::bet_id.eq(bet.0))
            .order(bet_resolution_votes::id.asc())
            .select(VoteRow::as_select())
            .load(&mut self.conn)?;

        let vote_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let winner_rows: Vec<VoteWinnerRow> = bet_resolution_vote_winners::table
            .filter(bet_resolution_vote_winners::vote_id.eq_any(&vote_ids))
            .select(VoteWinnerRow::as_select())
            .load(&mut self.conn)?;
        let mut winners: BTreeMap<i64, BTreeSet<UserId>> = BTreeMap::new();
        for w in winner_rows {
            winners.entry(w.vote_id).or_default().insert(UserId(w.winner_id));
        }

        rows.into_iter()
            .map(|row| {
                let set = winners.remove(&row.id).unwrap_or_default();
                vote_from_row(row, set)
            })
            .collect()
    }

    // ==================== Fulfillments ====================

    pub fn insert_fulfillment(&mut self, f: &NewFulfillment) -> crate::Result<Fulfillment> {
        diesel::insert_into(bet_fulfillments::table)
            .values(&new_fulfillment_row(f))
            .execute(&mut self.conn)?;
        let id = self.last_insert_rowid()?;
        let row: FulfillmentRow = bet_fulfillments::table
            .filter(bet_fulfillments::id.eq(id))
            .select(FulfillmentRow::as_select())
            .first(&mut self.conn)?;
        Fulfillment::try_from(row)
    }

    pub fn fulfillments(&mut self, bet: BetId) -> crate::Result<Vec<Fulfillment>> {
        let rows: Vec<FulfillmentRow> = bet_fulfillments::table
            .filter(bet_fulfillments::bet_id.eq(bet.0))
            .order(bet_fulfillments::id.asc())
            .select(FulfillmentRow::as_select())
            .load(&mut self.conn)?;
        rows.into_iter().map(Fulfillment::try_from).collect()
    }

    // ==================== Ledger ====================

    pub fn balance(&mut self, user: UserId) -> crate::Result<u64> {
        let balance: Option<i64> = account_balances::table
            .filter(account_balances::user_id.eq(user.0))
            .select(account_balances::balance)
            .first(&mut self.conn)
            .optional()?;
        amount_from_db(balance.unwrap_or(0), "balance")
    }

    pub fn set_balance(
        &mut self,
        user: UserId,
        balance: u64,
        updated_at: DateTime<Utc>,
    ) -> crate::Result<()> {
        let row = BalanceRow {
            user_id: user.0,
            balance: amount_to_db(balance, "balance")?,
            updated_at: time_to_db(&updated_at),
        };
        diesel::insert_into(account_balances::table)
            .values(&row)
            .on_conflict(account_balances::user_id)
            .do_update()
            .set((
                account_balances::balance.eq(row.balance),
                account_balances::updated_at.eq(&row.updated_at),
            ))
            .execute(&mut self.conn)?;
        Ok(())
    }

    pub fn append_ledger_entry(&mut self, entry: &NewLedgerEntry) -> crate::Result<LedgerEntry> {
        diesel::insert_into(ledger_transactions::table)
            .values(&new_ledger_row(entry)?)
            .execute(&mut self.conn)?;
        let id = self.last_insert_rowid()?;
        let row: LedgerRow = ledger_transactions::table
            .filter(ledger_transactions::id.eq(id))
            .select(LedgerRow::as_select())
            .first(&mut self.conn)?;
        LedgerEntry::try_from(row)
    }

    pub fn ledger_entries_for_user(&mut self, user: UserId) -> crate::Result<Vec<LedgerEntry>> {
        let rows: Vec<LedgerRow> = ledger_transactions::table
            .filter(ledger_transactions::user_id.eq(user.0))
            .order(ledger_transactions::id.asc())
            .select(LedgerRow::as_select())
            .load(&mut self.conn)?;
        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    pub fn ledger_entries_by_correlation(
        &mut self,
        correlation_id: &CorrelationId,
    ) -> crate::Result<Vec<LedgerEntry>> {
        let rows: Vec<LedgerRow> = ledger_transactions::table
            .filter(ledger_transactions::correlation_id.eq(correlation_id.as_bytes().to_vec()))
            .order(ledger_transactions::id.asc())
            .select(LedgerRow::as_select())
            .load(&mut self.conn)?;
        rows.into_iter().map(LedgerEntry::try_from).collect()
    }
}

// ==================== SettlementStore impl ====================

impl SettlementStore for WagerStore {
    fn atomically<T, F>(&mut self, f: F) -> wagerline_core::Result<T>
    where
        F: FnOnce(&mut Self) -> wagerline_core::Result<T>,
    {
        AnsiTransactionManager::begin_transaction(&mut self.conn).map_err(StoreError::from)?;
        match f(self) {
            Ok(value) => match AnsiTransactionManager::commit_transaction(&mut self.conn) {
                Ok(()) => Ok(value),
                Err(e) => {
                    if let Err(rb) = AnsiTransactionManager::rollback_transaction(&mut self.conn) {
                        log::error!("rollback after failed commit also failed: {rb}");
                    }
                    Err(StoreError::from(e).into())
                }
            },
            Err(e) => {
                if let Err(rb) = AnsiTransactionManager::rollback_transaction(&mut self.conn) {
                    log::error!("rollback failed: {rb}");
                }
                Err(e)
            }
        }
    }

    fn insert_bet(
        &mut self,
        bet: &NewBet,
        created_at: DateTime<Utc>,
    ) -> wagerline_core::Result<Bet> {
        Ok(self.insert_bet(bet, created_at)?)
    }

    fn get_bet(&mut self, id: BetId) -> wagerline_core::Result<Option<Bet>> {
        Ok(self.get_bet(id)?)
    }

    fn list_open_bets_due(&mut self, deadline: DateTime<Utc>) -> wagerline_core::Result<Vec<Bet>> {
        Ok(self.list_open_bets_due(deadline)?)
    }

    fn update_bet_state(&mut self, bet: &Bet) -> wagerline_core::Result<()> {
        if self.update_bet_state(bet)? {
            Ok(())
        } else {
            Err(Error::BetNotFound(bet.id))
        }
    }

    fn delete_bet(&mut self, id: BetId) -> wagerline_core::Result<bool> {
        Ok(self.delete_bet(id)?)
    }

    fn insert_participation(
        &mut self,
        participation: &NewParticipation,
    ) -> wagerline_core::Result<Participation> {
        self.insert_participation(participation).map_err(|e| {
            if e.is_unique_violation() {
                Error::DuplicateParticipation {
                    bet: participation.bet_id,
                    user: participation.user,
                }
            } else {
                e.into()
            }
        })
    }

    fn participations(&mut self, bet: BetId) -> wagerline_core::Result<Vec<Participation>> {
        Ok(self.participations(bet)?)
    }

    fn set_participation_outcome(
        &mut self,
        bet: BetId,
        user: UserId,
        outcome: ParticipationOutcome,
    ) -> wagerline_core::Result<()> {
        Ok(self.set_participation_outcome(bet, user, outcome)?)
    }

    fn insert_vote(&mut self, vote: &NewVote) -> wagerline_core::Result<ResolutionVote> {
        self.insert_vote(vote).map_err(|e| {
            if e.is_unique_violation() {
                Error::DuplicateVote {
                    bet: vote.bet_id,
                    resolver: vote.resolver,
                }
            } else {
                e.into()
            }
        })
    }

    fn delete_vote(&mut self, bet: BetId, resolver: UserId) -> wagerline_core::Result<bool> {
        Ok(self.delete_vote(bet, resolver)?)
    }

    fn votes(&mut self, bet: BetId) -> wagerline_core::Result<Vec<ResolutionVote>> {
        Ok(self.votes(bet)?)
    }

    fn insert_fulfillment(
        &mut self,
        fulfillment: &NewFulfillment,
    ) -> wagerline_core::Result<Fulfillment> {
        self.insert_fulfillment(fulfillment).map_err(|e| {
            if e.is_unique_violation() {
                Error::DuplicateConfirmation {
                    bet: fulfillment.bet_id,
                    winner: fulfillment.winner,
                }
            } else {
                e.into()
            }
        })
    }

    fn fulfillments(&mut self, bet: BetId) -> wagerline_core::Result<Vec<Fulfillment>> {
        Ok(self.fulfillments(bet)?)
    }

    fn balance(&mut self, user: UserId) -> wagerline_core::Result<u64> {
        Ok(self.balance(user)?)
    }

    fn set_balance(
        &mut self,
        user: UserId,
        balance: u64,
        updated_at: DateTime<Utc>,
    ) -> wagerline_core::Result<()> {
        Ok(self.set_balance(user, balance, updated_at)?)
    }

    fn append_ledger_entry(
        &mut self,
        entry: &NewLedgerEntry,
    ) -> wagerline_core::Result<LedgerEntry> {
        Ok(self.append_ledger_entry(entry)?)
    }

    fn ledger_entries_for_user(
        &mut self,
        user: UserId,
    ) -> wagerline_core::Result<Vec<LedgerEntry>> {
        Ok(self.ledger_entries_for_user(user)?)
    }

    fn ledger_entries_by_correlation(
        &mut self,
        correlation_id: &CorrelationId,
    ) -> wagerline_core::Result<Vec<LedgerEntry>> {
        Ok(self.ledger_entries_by_correlation(correlation_id)?)
    }
}
