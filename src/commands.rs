//! Command functions for the embedding frontend.
//!
//! Each command takes plain serde request types, calls the settlement
//! service, and returns camelCase response types. Errors cross this boundary
//! as `"CODE: message"` strings.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wagerline_core::{
    Bet, BetId, BetStatus, BetType, CorrelationId, FulfillmentStatus, FulfillmentSummary,
    LedgerEntry, NewBet, Participation, ParticipationOutcome, Pick, Posting, ResolutionAttempt,
    ResolutionReceipt, ResolutionVote, SettlementService, SettlementStore, Stake, StakeType,
    TallyDecision, TransactionKind, UserId, VoteSelection,
};

const REASON_DEPOSIT: &str = "DEPOSIT";
const REASON_WITHDRAWAL: &str = "WITHDRAWAL";

fn command_error(e: wagerline_core::Error) -> String {
    format!("{}: {}", e.code(), e)
}

fn parse_time(value: &str, field: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("INVALID_REQUEST: {field} must be an RFC 3339 timestamp: {e}"))
}

fn user_ids(users: &BTreeSet<UserId>) -> Vec<i64> {
    users.iter().map(|u| u.0).collect()
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StakeRequest {
    Credit { amount: u64 },
    Social { description: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBetRequest {
    pub creator_id: i64,
    pub title: String,
    pub bet_type: BetType,
    pub stake: StakeRequest,
    #[serde(default)]
    pub options: Vec<String>,
    pub resolver_ids: Vec<i64>,
    pub deadline: String,
    #[serde(default)]
    pub max_participants: Option<u32>,
}

impl CreateBetRequest {
    fn into_new_bet(self) -> Result<NewBet, String> {
        Ok(NewBet {
            creator: UserId(self.creator_id),
            title: self.title,
            bet_type: self.bet_type,
            stake: match self.stake {
                StakeRequest::Credit { amount } => Stake::Credit(amount),
                StakeRequest::Social { description } => Stake::Social(description),
            },
            options: self.options,
            resolvers: self.resolver_ids.into_iter().map(UserId).collect(),
            deadline: parse_time(&self.deadline, "deadline")?,
            max_participants: self.max_participants,
        })
    }
}

/// Exactly one of `option` or `prediction` must be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBetRequest {
    pub bet_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub option: Option<String>,
    #[serde(default)]
    pub prediction: Option<String>,
}

/// Exactly one of `outcome` or `winner_ids` must be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub winner_ids: Option<Vec<i64>>,
}

impl SelectionRequest {
    fn into_selection(self) -> Result<VoteSelection, String> {
        match (self.outcome, self.winner_ids) {
            (Some(outcome), None) => Ok(VoteSelection::Outcome(outcome)),
            (None, Some(ids)) => Ok(VoteSelection::Winners(ids.into_iter().map(UserId).collect())),
            _ => Err("INVALID_REQUEST: set exactly one of outcome or winnerIds".to_string()),
        }
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BetResponse {
    pub id: i64,
    pub creator_id: i64,
    pub title: String,
    pub bet_type: BetType,
    pub status: BetStatus,
    pub stake_type: StakeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stake_amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stake_description: Option<String>,
    pub options: Vec<String>,
    pub resolver_ids: Vec<i64>,
    pub deadline: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_participants: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_status: Option<FulfillmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_outcome: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<String>,
}

impl From<&Bet> for BetResponse {
    fn from(bet: &Bet) -> Self {
        let (stake_amount, stake_description) = match &bet.stake {
            Stake::Credit(amount) => (Some(*amount), None),
            Stake::Social(description) => (None, Some(description.clone())),
        };
        Self {
            id: bet.id.0,
            creator_id: bet.creator.0,
            title: bet.title.clone(),
            bet_type: bet.bet_type,
            status: bet.status,
            stake_type: bet.stake.stake_type(),
            stake_amount,
            stake_description,
            options: bet.options.clone(),
            resolver_ids: user_ids(&bet.resolvers),
            deadline: bet.deadline.to_rfc3339(),
            max_participants: bet.max_participants,
            fulfillment_status: bet.fulfillment_status,
            resolved_outcome: bet.resolved_outcome.clone(),
            created_at: bet.created_at.to_rfc3339(),
            updated_at: bet.updated_at.to_rfc3339(),
            resolved_at: bet.resolved_at.map(|t| t.to_rfc3339()),
            cancelled_at: bet.cancelled_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationResponse {
    pub bet_id: i64,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    pub stake_amount: u64,
    pub outcome: ParticipationOutcome,
    pub created_at: String,
}

impl From<&Participation> for ParticipationResponse {
    fn from(p: &Participation) -> Self {
        Self {
            bet_id: p.bet_id.0,
            user_id: p.user.0,
            option: p.pick.chosen_option().map(str::to_string),
            prediction: p.pick.predicted_value().map(str::to_string),
            stake_amount: p.stake_amount,
            outcome: p.outcome,
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub bet_id: i64,
    pub resolver_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_ids: Option<Vec<i64>>,
    pub created_at: String,
}

impl From<&ResolutionVote> for VoteResponse {
    fn from(v: &ResolutionVote) -> Self {
        Self {
            bet_id: v.bet_id.0,
            resolver_id: v.resolver.0,
            outcome: v.selection.outcome().map(str::to_string),
            winner_ids: v.selection.winners().map(user_ids),
            created_at: v.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryResponse {
    pub id: i64,
    pub user_id: i64,
    pub kind: TransactionKind,
    pub amount: u64,
    pub reason: String,
    pub balance_before: u64,
    pub balance_after: u64,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bet_id: Option<i64>,
    pub created_at: String,
}

impl From<&LedgerEntry> for LedgerEntryResponse {
    fn from(e: &LedgerEntry) -> Self {
        Self {
            id: e.id,
            user_id: e.user.0,
            kind: e.kind,
            amount: e.amount,
            reason: e.reason.clone(),
            balance_before: e.balance_before,
            balance_after: e.balance_after,
            correlation_id: e.correlation_id.to_hex(),
            bet_id: e.bet_id.map(|b| b.0),
            created_at: e.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResponse {
    /// `RESOLVED` or `PENDING`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bet: Option<BetResponse>,
    pub winner_ids: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub ledger_entries: Vec<LedgerEntryResponse>,
    pub tied_outcomes: Vec<String>,
    pub pending_resolver_ids: Vec<i64>,
}

impl From<&ResolutionReceipt> for ResolutionResponse {
    fn from(receipt: &ResolutionReceipt) -> Self {
        Self {
            status: "RESOLVED".to_string(),
            bet: Some(BetResponse::from(&receipt.bet)),
            winner_ids: user_ids(&receipt.winners),
            outcome: receipt.outcome.clone(),
            correlation_id: Some(receipt.correlation_id.to_hex()),
            ledger_entries: receipt.ledger_entries.iter().map(Into::into).collect(),
            tied_outcomes: Vec::new(),
            pending_resolver_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationResponse {
    pub bet: BetResponse,
    pub previous_status: BetStatus,
    pub correlation_id: String,
    pub refunds: Vec<LedgerEntryResponse>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentSummaryResponse {
    pub bet_id: i64,
    pub status: FulfillmentStatus,
    pub winner_ids: Vec<i64>,
    pub confirmed_ids: Vec<i64>,
    pub outstanding_ids: Vec<i64>,
}

impl From<&FulfillmentSummary> for FulfillmentSummaryResponse {
    fn from(s: &FulfillmentSummary) -> Self {
        Self {
            bet_id: s.bet_id.0,
            status: s.status,
            winner_ids: user_ids(&s.winners),
            confirmed_ids: user_ids(&s.confirmed),
            outstanding_ids: user_ids(&s.outstanding()),
        }
    }
}

// ============================================================================
// Bet commands
// ============================================================================

pub fn create_bet<S: SettlementStore>(
    svc: &SettlementService<S>,
    request: CreateBetRequest,
) -> Result<BetResponse, String> {
    let bet = svc
        .create_bet(request.into_new_bet()?)
        .map_err(command_error)?;
    Ok(BetResponse::from(&bet))
}

pub fn get_bet<S: SettlementStore>(
    svc: &SettlementService<S>,
    bet_id: i64,
) -> Result<BetResponse, String> {
    let bet = svc.get_bet(BetId(bet_id)).map_err(command_error)?;
    Ok(BetResponse::from(&bet))
}

pub fn place_bet<S: SettlementStore>(
    svc: &SettlementService<S>,
    request: PlaceBetRequest,
) -> Result<ParticipationResponse, String> {
    let pick = match (request.option, request.prediction) {
        (Some(option), None) => Pick::Option(option),
        (None, Some(prediction)) => Pick::Prediction(prediction),
        _ => return Err("INVALID_REQUEST: set exactly one of option or prediction".to_string()),
    };
    let participation = svc
        .place_bet(BetId(request.bet_id), UserId(request.user_id), pick)
        .map_err(command_error)?;
    Ok(ParticipationResponse::from(&participation))
}

pub fn list_participations<S: SettlementStore>(
    svc: &SettlementService<S>,
    bet_id: i64,
) -> Result<Vec<ParticipationResponse>, String> {
    let participations = svc.participations(BetId(bet_id)).map_err(command_error)?;
    Ok(participations.iter().map(Into::into).collect())
}

pub fn close_bet<S: SettlementStore>(
    svc: &SettlementService<S>,
    bet_id: i64,
) -> Result<BetResponse, String> {
    let bet = svc
        .close_bet(BetId(bet_id), Utc::now())
        .map_err(command_error)?;
    Ok(BetResponse::from(&bet))
}

/// Close every open bet past its deadline; returns the closed bet ids.
pub fn close_expired_bets<S: SettlementStore>(
    svc: &SettlementService<S>,
) -> Result<Vec<i64>, String> {
    let closed = svc.close_expired(Utc::now()).map_err(command_error)?;
    Ok(closed.into_iter().map(|id| id.0).collect())
}

pub fn cancel_bet<S: SettlementStore>(
    svc: &SettlementService<S>,
    bet_id: i64,
    reason: String,
) -> Result<CancellationResponse, String> {
    let receipt = svc
        .cancel_bet(BetId(bet_id), &reason)
        .map_err(command_error)?;
    Ok(CancellationResponse {
        bet: BetResponse::from(&receipt.bet),
        previous_status: receipt.previous_status,
        correlation_id: receipt.correlation_id.to_hex(),
        refunds: receipt.refunds.iter().map(Into::into).collect(),
    })
}

pub fn delete_bet<S: SettlementStore>(
    svc: &SettlementService<S>,
    bet_id: i64,
) -> Result<(), String> {
    svc.delete_bet(BetId(bet_id)).map_err(command_error)
}

// ============================================================================
// Resolution commands
// ============================================================================

pub fn submit_vote<S: SettlementStore>(
    svc: &SettlementService<S>,
    bet_id: i64,
    resolver_id: i64,
    selection: SelectionRequest,
) -> Result<VoteResponse, String> {
    let vote = svc
        .submit_vote(BetId(bet_id), UserId(resolver_id), selection.into_selection()?)
        .map_err(command_error)?;
    Ok(VoteResponse::from(&vote))
}

pub fn list_votes<S: SettlementStore>(
    svc: &SettlementService<S>,
    bet_id: i64,
) -> Result<Vec<VoteResponse>, String> {
    let votes = svc.votes(BetId(bet_id)).map_err(command_error)?;
    Ok(votes.iter().map(Into::into).collect())
}

pub fn try_resolve<S: SettlementStore>(
    svc: &SettlementService<S>,
    bet_id: i64,
) -> Result<ResolutionResponse, String> {
    match svc.try_resolve(BetId(bet_id)).map_err(command_error)? {
        ResolutionAttempt::Resolved(receipt) => Ok(ResolutionResponse::from(&receipt)),
        ResolutionAttempt::Pending(tally) => Ok(ResolutionResponse {
            status: "PENDING".to_string(),
            bet: None,
            winner_ids: Vec::new(),
            outcome: None,
            correlation_id: None,
            ledger_entries: Vec::new(),
            tied_outcomes: match tally.decision {
                TallyDecision::Tied(labels) => labels,
                _ => Vec::new(),
            },
            pending_resolver_ids: user_ids(&tally.pending_resolvers),
        }),
    }
}

pub fn resolve_with_override<S: SettlementStore>(
    svc: &SettlementService<S>,
    bet_id: i64,
    selection: SelectionRequest,
) -> Result<ResolutionResponse, String> {
    let receipt = svc
        .resolve_with_override(BetId(bet_id), selection.into_selection()?)
        .map_err(command_error)?;
    Ok(ResolutionResponse::from(&receipt))
}

// ============================================================================
// Fulfillment commands
// ============================================================================

pub fn confirm_fulfillment<S: SettlementStore>(
    svc: &SettlementService<S>,
    bet_id: i64,
    winner_id: i64,
    notes: Option<String>,
) -> Result<FulfillmentSummaryResponse, String> {
    let summary = svc
        .confirm_fulfillment(BetId(bet_id), UserId(winner_id), notes)
        .map_err(command_error)?;
    Ok(FulfillmentSummaryResponse::from(&summary))
}

pub fn get_fulfillment_summary<S: SettlementStore>(
    svc: &SettlementService<S>,
    bet_id: i64,
) -> Result<FulfillmentSummaryResponse, String> {
    let summary = svc
        .fulfillment_summary(BetId(bet_id))
        .map_err(command_error)?;
    Ok(FulfillmentSummaryResponse::from(&summary))
}

// ============================================================================
// Ledger commands
// ============================================================================

fn manual_posting<S: SettlementStore>(
    svc: &SettlementService<S>,
    user_id: i64,
    kind: TransactionKind,
    amount: u64,
    reason: &str,
) -> Result<LedgerEntryResponse, String> {
    let entry = svc
        .record_transaction(&Posting {
            user: UserId(user_id),
            kind,
            amount,
            reason: reason.to_string(),
            correlation_id: CorrelationId::random(),
            bet_id: None,
        })
        .map_err(command_error)?;
    Ok(LedgerEntryResponse::from(&entry))
}

pub fn deposit<S: SettlementStore>(
    svc: &SettlementService<S>,
    user_id: i64,
    amount: u64,
) -> Result<LedgerEntryResponse, String> {
    manual_posting(svc, user_id, TransactionKind::Credit, amount, REASON_DEPOSIT)
}

pub fn withdraw<S: SettlementStore>(
    svc: &SettlementService<S>,
    user_id: i64,
    amount: u64,
) -> Result<LedgerEntryResponse, String> {
    manual_posting(svc, user_id, TransactionKind::Debit, amount, REASON_WITHDRAWAL)
}

pub fn get_balance<S: SettlementStore>(
    svc: &SettlementService<S>,
    user_id: i64,
) -> Result<u64, String> {
    svc.balance(UserId(user_id)).map_err(command_error)
}

pub fn get_transactions<S: SettlementStore>(
    svc: &SettlementService<S>,
    user_id: i64,
) -> Result<Vec<LedgerEntryResponse>, String> {
    let entries = svc
        .transactions_for_user(UserId(user_id))
        .map_err(command_error)?;
    Ok(entries.iter().map(Into::into).collect())
}

pub fn get_transactions_by_correlation<S: SettlementStore>(
    svc: &SettlementService<S>,
    correlation_id: &str,
) -> Result<Vec<LedgerEntryResponse>, String> {
    let cid = CorrelationId::from_hex(correlation_id).map_err(command_error)?;
    let entries = svc
        .transactions_by_correlation(&cid)
        .map_err(command_error)?;
    Ok(entries.iter().map(Into::into).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_requires_exactly_one_field() {
        let both = SelectionRequest {
            outcome: Some("YES".into()),
            winner_ids: Some(vec![1]),
        };
        assert!(both.into_selection().unwrap_err().starts_with("INVALID_REQUEST"));

        let winners = SelectionRequest {
            outcome: None,
            winner_ids: Some(vec![2, 1, 2]),
        };
        assert_eq!(
            winners.into_selection().unwrap(),
            VoteSelection::Winners([UserId(1), UserId(2)].into_iter().collect())
        );
    }

    #[test]
    fn create_request_parses_camel_case_json() {
        let request: CreateBetRequest = serde_json::from_str(
            r#"{
                "creatorId": 1,
                "title": "Rain on Saturday?",
                "betType": "BINARY",
                "stake": {"type": "CREDIT", "amount": 25},
                "resolverIds": [7, 8],
                "deadline": "2030-05-01T12:00:00Z"
            }"#,
        )
        .unwrap();
        let bet = request.into_new_bet().unwrap();
        assert_eq!(bet.stake, Stake::Credit(25));
        assert_eq!(bet.resolvers.len(), 2);
        assert!(bet.options.is_empty());
    }

    #[test]
    fn bad_deadline_is_rejected() {
        assert!(parse_time("tomorrow", "deadline").is_err());
    }
}
