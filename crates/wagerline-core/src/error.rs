use thiserror::Error;

use crate::bet::BetStatus;
use crate::ids::{BetId, UserId};
use crate::resolution::BetAction;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{user} is not an assigned resolver of {bet}")]
    UnauthorizedResolver { bet: BetId, user: UserId },

    #[error("{resolver} already voted on {bet}")]
    DuplicateVote { bet: BetId, resolver: UserId },

    #[error("voting on {bet} is incomplete: {} resolver(s) pending", .pending.len())]
    IncompleteVoting { bet: BetId, pending: Vec<UserId> },

    #[error("{winner} already confirmed fulfillment of {bet}")]
    DuplicateConfirmation { bet: BetId, winner: UserId },

    #[error("insufficient balance for {user}: have {balance}, need {requested}")]
    InsufficientBalance {
        user: UserId,
        balance: u64,
        requested: u64,
    },

    #[error("cannot {action} {bet} while it is {from}")]
    InvalidStateTransition {
        bet: BetId,
        from: BetStatus,
        action: BetAction,
    },

    #[error("{0} not found")]
    BetNotFound(BetId),

    #[error("{user} is not a winner of {bet}")]
    NotAWinner { bet: BetId, user: UserId },

    #[error("{0} is settled automatically and takes no fulfillment confirmations")]
    FulfillmentNotRequired(BetId),

    #[error("{user} already placed a bet on {bet}")]
    DuplicateParticipation { bet: BetId, user: UserId },

    #[error("{0} has reached its participant limit")]
    BetFull(BetId),

    #[error("the deadline of {0} has passed")]
    DeadlinePassed(BetId),

    #[error("{0} cannot close before its deadline")]
    DeadlineNotReached(BetId),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("invalid bet: {0}")]
    InvalidBet(String),

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("balance overflow for {0}")]
    BalanceOverflow(UserId),

    #[error("invalid correlation id: {0}")]
    InvalidCorrelationId(String),

    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// Stable machine-readable code for the API layer.
    pub fn code(&self) -> &'static str {
        match self {
            Error::UnauthorizedResolver { .. } => "UNAUTHORIZED_RESOLVER",
            Error::DuplicateVote { .. } => "DUPLICATE_VOTE",
            Error::IncompleteVoting { .. } => "INCOMPLETE_VOTING",
            Error::DuplicateConfirmation { .. } => "DUPLICATE_CONFIRMATION",
            Error::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Error::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Error::BetNotFound(_) => "BET_NOT_FOUND",
            Error::NotAWinner { .. } => "NOT_A_WINNER",
            Error::FulfillmentNotRequired(_) => "FULFILLMENT_NOT_REQUIRED",
            Error::DuplicateParticipation { .. } => "DUPLICATE_PARTICIPATION",
            Error::BetFull(_) => "BET_FULL",
            Error::DeadlinePassed(_) => "DEADLINE_PASSED",
            Error::DeadlineNotReached(_) => "DEADLINE_NOT_REACHED",
            Error::InvalidSelection(_) => "INVALID_SELECTION",
            Error::InvalidBet(_) => "INVALID_BET",
            Error::InvalidAmount => "INVALID_AMOUNT",
            Error::BalanceOverflow(_) => "BALANCE_OVERFLOW",
            Error::InvalidCorrelationId(_) => "INVALID_CORRELATION_ID",
            Error::Store(_) => "STORE_ERROR",
        }
    }

    /// Conditions that may clear up on their own (more votes arriving).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::IncompleteVoting { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
