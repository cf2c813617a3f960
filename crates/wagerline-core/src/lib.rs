pub mod bet;
pub mod config;
pub mod error;
pub mod events;
pub mod fulfillment;
pub mod ids;
pub mod ledger;
pub mod resolution;
pub mod service;
pub mod store_trait;
pub mod tally;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod vote;

// Core types
pub use bet::{
    Bet, BetStatus, BetType, NewBet, NewParticipation, Participation, ParticipationOutcome, Pick,
    Stake, StakeType,
};
pub use config::{SettlementConfig, WinnerRule};
pub use error::{Error, Result};
pub use events::SettlementEvent;
pub use ids::{BetId, CorrelationId, UserId};
pub use vote::{NewVote, ResolutionVote, VoteSelection};

// Workflow components
pub use fulfillment::{
    Fulfillment, FulfillmentStatus, FulfillmentSummary, NewFulfillment, fulfillment_status,
};
pub use ledger::{
    LedgerEntry, NewLedgerEntry, Posting, REASON_BET_CANCELLED, REASON_BET_NO_WINNER,
    REASON_BET_PAYOUT, REASON_BET_STAKE, TransactionKind, record_transaction, verify_continuity,
};
pub use resolution::{BetAction, SettlementPlan, ensure_action, plan_refunds, plan_settlement};
pub use service::{CancellationReceipt, ResolutionAttempt, ResolutionReceipt, SettlementService};
pub use store_trait::SettlementStore;
pub use tally::{TallyDecision, TallyResult, compute_tally};
