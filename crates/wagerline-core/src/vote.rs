use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::ids::{BetId, UserId};

/// What a resolver votes for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteSelection {
    /// Binary and multiple-choice bets: the winning option label.
    Outcome(String),
    /// Prediction bets: every participant the resolver considers a winner.
    Winners(BTreeSet<UserId>),
}

impl VoteSelection {
    pub fn outcome(&self) -> Option<&str> {
        match self {
            VoteSelection::Outcome(label) => Some(label),
            VoteSelection::Winners(_) => None,
        }
    }

    pub fn winners(&self) -> Option<&BTreeSet<UserId>> {
        match self {
            VoteSelection::Outcome(_) => None,
            VoteSelection::Winners(set) => Some(set),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionVote {
    pub id: i64,
    pub bet_id: BetId,
    pub resolver: UserId,
    pub selection: VoteSelection,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVote {
    pub bet_id: BetId,
    pub resolver: UserId,
    pub selection: VoteSelection,
    pub created_at: DateTime<Utc>,
}
