use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, Utc};
use wagerline_core::{
    Bet, BetId, BetStatus, BetType, CorrelationId, Fulfillment, FulfillmentStatus, LedgerEntry,
    NewBet, NewFulfillment, NewLedgerEntry, NewParticipation, NewVote, Participation,
    ParticipationOutcome, Pick, ResolutionVote, Stake, StakeType, TransactionKind, UserId,
    VoteSelection,
};

use crate::error::StoreError;
use crate::models::vote::{SELECTION_OUTCOME, SELECTION_WINNERS};
use crate::models::{
    BetRow, FulfillmentRow, LedgerRow, NewBetRow, NewFulfillmentRow, NewLedgerRow,
    NewParticipationRow, NewVoteRow, ParticipationRow, VoteRow,
};

// --- Scalars ---

/// Timestamps are stored as fixed-width RFC 3339 text so that string
/// comparison in SQL matches chronological order.
pub fn time_to_db(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn time_from_db(s: &str, field: &str) -> std::result::Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("{field}: bad timestamp {s:?}: {e}")))
}

fn opt_time_from_db(
    s: Option<&str>,
    field: &str,
) -> std::result::Result<Option<DateTime<Utc>>, StoreError> {
    s.map(|s| time_from_db(s, field)).transpose()
}

pub fn amount_to_db(v: u64, field: &str) -> std::result::Result<i64, StoreError> {
    i64::try_from(v).map_err(|_| StoreError::InvalidData(format!("{field}: {v} out of range")))
}

pub fn amount_from_db(v: i64, field: &str) -> std::result::Result<u64, StoreError> {
    u64::try_from(v).map_err(|_| StoreError::InvalidData(format!("{field}: negative value {v}")))
}

fn enum_from_db<T>(
    v: i32,
    field: &str,
    f: fn(i32) -> Option<T>,
) -> std::result::Result<T, StoreError> {
    f(v).ok_or_else(|| StoreError::InvalidData(format!("invalid {field}: {v}")))
}

// --- Bets ---

pub fn new_bet_row(
    bet: &NewBet,
    created_at: &DateTime<Utc>,
) -> std::result::Result<NewBetRow, StoreError> {
    let (stake_amount, stake_description) = match &bet.stake {
        Stake::Credit(amount) => (Some(amount_to_db(*amount, "stake_amount")?), None),
        Stake::Social(description) => (None, Some(description.clone())),
    };
    let max_participants = bet
        .max_participants
        .map(|m| {
            i32::try_from(m)
                .map_err(|_| StoreError::InvalidData(format!("max_participants: {m} out of range")))
        })
        .transpose()?;
    let options_json = serde_json::to_string(&bet.options)
        .map_err(|e| StoreError::InvalidData(format!("options: {e}")))?;
    let now = time_to_db(created_at);

    Ok(NewBetRow {
        creator_id: bet.creator.0,
        title: bet.title.clone(),
        bet_type: bet.bet_type.as_i32(),
        bet_status: BetStatus::Open.as_i32(),
        stake_type: bet.stake.stake_type().as_i32(),
        stake_amount,
        stake_description,
        options_json,
        deadline: time_to_db(&bet.deadline),
        max_participants,
        created_at: now.clone(),
        updated_at: now,
    })
}

pub fn bet_from_row(
    row: BetRow,
    resolvers: BTreeSet<UserId>,
) -> std::result::Result<Bet, StoreError> {
    let stake = match enum_from_db(row.stake_type, "stake_type", StakeType::from_i32)? {
        StakeType::Credit => {
            let amount = row.stake_amount.ok_or_else(|| {
                StoreError::InvalidData(format!("bet {}: credit stake without amount", row.id))
            })?;
            Stake::Credit(amount_from_db(amount, "stake_amount")?)
        }
        StakeType::Social => Stake::Social(row.stake_description.unwrap_or_default()),
    };
    let options: Vec<String> = serde_json::from_str(&row.options_json)
        .map_err(|e| StoreError::InvalidData(format!("bet {}: options: {e}", row.id)))?;
    let max_participants = row
        .max_participants
        .map(|m| {
            u32::try_from(m)
                .map_err(|_| StoreError::InvalidData(format!("max_participants: {m} out of range")))
        })
        .transpose()?;
    let fulfillment_status = row
        .fulfillment_status
        .map(|v| enum_from_db(v, "fulfillment_status", FulfillmentStatus::from_i32))
        .transpose()?;

    Ok(Bet {
        id: BetId(row.id),
        creator: UserId(row.creator_id),
        title: row.title,
        bet_type: enum_from_db(row.bet_type, "bet_type", BetType::from_i32)?,
        status: enum_from_db(row.bet_status, "bet_status", BetStatus::from_i32)?,
        stake,
        options,
        resolvers,
        deadline: time_from_db(&row.deadline, "deadline")?,
        max_participants,
        fulfillment_status,
        resolved_outcome: row.resolved_outcome,
        created_at: time_from_db(&row.created_at, "created_at")?,
        updated_at: time_from_db(&row.updated_at, "updated_at")?,
        resolved_at: opt_time_from_db(row.resolved_at.as_deref(), "resolved_at")?,
        cancelled_at: opt_time_from_db(row.cancelled_at.as_deref(), "cancelled_at")?,
    })
}

// --- Participations ---

pub fn new_participation_row(
    p: &NewParticipation,
) -> std::result::Result<NewParticipationRow, StoreError> {
    let (chosen_option, predicted_value) = match &p.pick {
        Pick::Option(label) => (Some(label.clone()), None),
        Pick::Prediction(value) => (None, Some(value.clone())),
    };
    Ok(NewParticipationRow {
        bet_id: p.bet_id.0,
        user_id: p.user.0,
        chosen_option,
        predicted_value,
        stake_amount: amount_to_db(p.stake_amount, "stake_amount")?,
        outcome: ParticipationOutcome::Pending.as_i32(),
        created_at: time_to_db(&p.created_at),
    })
}

impl TryFrom<ParticipationRow> for Participation {
    type Error = StoreError;

    fn try_from(row: ParticipationRow) -> std::result::Result<Self, Self::Error> {
        let pick = match (row.chosen_option, row.predicted_value) {
            (Some(label), _) => Pick::Option(label),
            (None, Some(value)) => Pick::Prediction(value),
            (None, None) => {
                return Err(StoreError::InvalidData(format!(
                    "participation {}: no pick",
                    row.id
                )));
            }
        };
        Ok(Participation {
            id: row.id,
            bet_id: BetId(row.bet_id),
            user: UserId(row.user_id),
            pick,
            stake_amount: amount_from_db(row.stake_amount, "stake_amount")?,
            outcome: enum_from_db(row.outcome, "outcome", ParticipationOutcome::from_i32)?,
            created_at: time_from_db(&row.created_at, "created_at")?,
        })
    }
}

// --- Votes ---

pub fn new_vote_row(vote: &NewVote) -> NewVoteRow {
    let (selection_kind, chosen_outcome) = match &vote.selection {
        VoteSelection::Outcome(label) => (SELECTION_OUTCOME, Some(label.clone())),
        VoteSelection::Winners(_) => (SELECTION_WINNERS, None),
    };
    NewVoteRow {
        bet_id: vote.bet_id.0,
        resolver_id: vote.resolver.0,
        selection_kind,
        chosen_outcome,
        created_at: time_to_db(&vote.created_at),
    }
}

/// `winners` holds the vote's winner rows; ignored for outcome votes.
pub fn vote_from_row(
    row: VoteRow,
    winners: BTreeSet<UserId>,
) -> std::result::Result<ResolutionVote, StoreError> {
    let selection = match (row.selection_kind, row.chosen_outcome) {
        (SELECTION_OUTCOME, Some(label)) => VoteSelection::Outcome(label),
        (SELECTION_WINNERS, _) => VoteSelection::Winners(winners),
        (kind, _) => {
            return Err(StoreError::InvalidData(format!(
                "vote {}: invalid selection kind {kind}",
                row.id
            )));
        }
    };
    Ok(ResolutionVote {
        id: row.id,
        bet_id: BetId(row.bet_id),
        resolver: UserId(row.resolver_id),
        selection,
        created_at: time_from_db(&row.created_at, "created_at")?,
    })
}

// --- Fulfillments ---

pub fn new_fulfillment_row(f: &NewFulfillment) -> NewFulfillmentRow {
    NewFulfillmentRow {
        bet_id: f.bet_id.0,
        winner_id: f.winner.0,
        notes: f.notes.clone(),
        confirmed_at: time_to_db(&f.confirmed_at),
    }
}

impl TryFrom<FulfillmentRow> for Fulfillment {
    type Error = StoreError;

    fn try_from(row: FulfillmentRow) -> std::result::Result<Self, Self::Error> {
        Ok(Fulfillment {
            id: row.id,
            bet_id: BetId(row.bet_id),
            winner: UserId(row.winner_id),
            notes: row.notes,
            confirmed_at: time_from_db(&row.confirmed_at, "confirmed_at")?,
        })
    }
}

// --- Ledger ---

pub fn new_ledger_row(e: &NewLedgerEntry) -> std::result::Result<NewLedgerRow, StoreError> {
    Ok(NewLedgerRow {
        user_id: e.user.0,
        kind: e.kind.as_i32(),
        amount: amount_to_db(e.amount, "amount")?,
        reason: e.reason.clone(),
        balance_before: amount_to_db(e.balance_before, "balance_before")?,
        balance_after: amount_to_db(e.balance_after, "balance_after")?,
        correlation_id: e.correlation_id.as_bytes().to_vec(),
        bet_id: e.bet_id.map(|b| b.0),
        created_at: time_to_db(&e.created_at),
    })
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: LedgerRow) -> std::result::Result<Self, Self::Error> {
        Ok(LedgerEntry {
            id: row.id,
            user: UserId(row.user_id),
            kind: enum_from_db(row.kind, "kind", TransactionKind::from_i32)?,
            amount: amount_from_db(row.amount, "amount")?,
            reason: row.reason,
            balance_before: amount_from_db(row.balance_before, "balance_before")?,
            balance_after: amount_from_db(row.balance_after, "balance_after")?,
            correlation_id: CorrelationId::from_slice(&row.correlation_id)
                .map_err(|e| StoreError::InvalidData(format!("ledger {}: {e}", row.id)))?,
            bet_id: row.bet_id.map(BetId),
            created_at: time_from_db(&row.created_at, "created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_as_text() {
        let early = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert!(time_to_db(&early) < time_to_db(&late));
        assert_eq!(time_from_db(&time_to_db(&late), "t").unwrap(), late);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(matches!(amount_from_db(-1, "amount"), Err(StoreError::InvalidData(_))));
        assert!(matches!(amount_to_db(u64::MAX, "amount"), Err(StoreError::InvalidData(_))));
    }
}
