use std::collections::BTreeSet;

use crate::bet::BetStatus;
use crate::fulfillment::FulfillmentStatus;
use crate::ids::{BetId, CorrelationId, UserId};

/// Domain events published by the `SettlementService` after each committed change.
///
/// Delivery is fire-and-forget: a missing or failing consumer never affects
/// the change that produced the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementEvent {
    BetCreated {
        bet_id: BetId,
        creator: UserId,
    },
    BetClosed {
        bet_id: BetId,
    },
    VoteSubmitted {
        bet_id: BetId,
        resolver: UserId,
        replaced: bool,
    },
    /// Every required vote is in but the tally did not settle on an outcome.
    ResolutionPending {
        bet_id: BetId,
        tied_outcomes: Vec<String>,
    },
    BetResolved {
        bet_id: BetId,
        outcome: Option<String>,
        winners: BTreeSet<UserId>,
        correlation_id: CorrelationId,
        overridden: bool,
    },
    BetCancelled {
        bet_id: BetId,
        previous_status: BetStatus,
        reason: String,
        correlation_id: CorrelationId,
    },
    FulfillmentSubmitted {
        bet_id: BetId,
        winner: UserId,
        status: FulfillmentStatus,
    },
    BetFulfilled {
        bet_id: BetId,
    },
}

impl SettlementEvent {
    pub fn bet_id(&self) -> BetId {
        match self {
            SettlementEvent::BetCreated { bet_id, .. }
            | SettlementEvent::BetClosed { bet_id }
            | SettlementEvent::VoteSubmitted { bet_id, .. }
            | SettlementEvent::ResolutionPending { bet_id, .. }
            | SettlementEvent::BetResolved { bet_id, .. }
            | SettlementEvent::BetCancelled { bet_id, .. }
            | SettlementEvent::FulfillmentSubmitted { bet_id, .. }
            | SettlementEvent::BetFulfilled { bet_id } => *bet_id,
        }
    }

    /// Short name used by notification consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            SettlementEvent::BetCreated { .. } => "bet_created",
            SettlementEvent::BetClosed { .. } => "bet_closed",
            SettlementEvent::VoteSubmitted { .. } => "vote_submitted",
            SettlementEvent::ResolutionPending { .. } => "resolution_pending",
            SettlementEvent::BetResolved { .. } => "bet_resolved",
            SettlementEvent::BetCancelled { .. } => "bet_cancelled",
            SettlementEvent::FulfillmentSubmitted { .. } => "fulfillment_submitted",
            SettlementEvent::BetFulfilled { .. } => "bet_fulfilled",
        }
    }
}
