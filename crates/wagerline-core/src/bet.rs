use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fulfillment::FulfillmentStatus;
use crate::ids::{BetId, UserId};

pub const DEFAULT_BINARY_OPTIONS: [&str; 2] = ["YES", "NO"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetType {
    Binary = 0,
    MultipleChoice = 1,
    Prediction = 2,
}

impl BetType {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Binary),
            1 => Some(Self::MultipleChoice),
            2 => Some(Self::Prediction),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Binary and multiple-choice bets resolve to a single option label.
    pub fn resolves_to_option(self) -> bool {
        matches!(self, Self::Binary | Self::MultipleChoice)
    }
}

/// Lifecycle: Open -> Closed -> Resolved, or Open|Closed -> Cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BetStatus {
    /// Accepting participations.
    Open = 0,
    /// Participation closed, awaiting resolver votes.
    Closed = 1,
    /// Outcome decided and stakes settled. Terminal.
    Resolved = 2,
    /// Stakes refunded. Terminal.
    Cancelled = 3,
}

impl BetStatus {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Open),
            1 => Some(Self::Closed),
            2 => Some(Self::Resolved),
            3 => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Resolved => "RESOLVED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for BetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StakeType {
    /// In-app credits, escrowed through the ledger and paid out automatically.
    Credit = 0,
    /// Off-platform stake ("loser buys dinner"); winners confirm receipt by hand.
    Social = 1,
}

impl StakeType {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Credit),
            1 => Some(Self::Social),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn requires_manual_fulfillment(self) -> bool {
        matches!(self, Self::Social)
    }
}

/// What each participant puts at risk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stake {
    Credit(u64),
    Social(String),
}

impl Stake {
    pub fn stake_type(&self) -> StakeType {
        match self {
            Stake::Credit(_) => StakeType::Credit,
            Stake::Social(_) => StakeType::Social,
        }
    }

    /// Credits escrowed per participant; zero for social stakes.
    pub fn credit_amount(&self) -> u64 {
        match self {
            Stake::Credit(amount) => *amount,
            Stake::Social(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub id: BetId,
    pub creator: UserId,
    pub title: String,
    pub bet_type: BetType,
    pub status: BetStatus,
    pub stake: Stake,
    pub options: Vec<String>,
    pub resolvers: BTreeSet<UserId>,
    pub deadline: DateTime<Utc>,
    pub max_participants: Option<u32>,
    /// `Some` only once the bet is resolved; always rewritten from the
    /// confirmation count, never set directly.
    pub fulfillment_status: Option<FulfillmentStatus>,
    pub resolved_outcome: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Bet {
    pub fn is_resolver(&self, user: UserId) -> bool {
        self.resolvers.contains(&user)
    }

    pub fn has_option(&self, label: &str) -> bool {
        self.options.iter().any(|o| o == label)
    }
}

/// Request to create a bet. Validated and normalized by [`NewBet::validate`].
#[derive(Debug, Clone)]
pub struct NewBet {
    pub creator: UserId,
    pub title: String,
    pub bet_type: BetType,
    pub stake: Stake,
    pub options: Vec<String>,
    pub resolvers: BTreeSet<UserId>,
    pub deadline: DateTime<Utc>,
    pub max_participants: Option<u32>,
}

impl NewBet {
    /// Check the request against `now` and fill in default binary options.
    pub fn validate(mut self, now: DateTime<Utc>) -> Result<Self> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(Error::InvalidBet("title must not be empty".into()));
        }
        if self.resolvers.is_empty() {
            return Err(Error::InvalidBet("at least one resolver is required".into()));
        }
        if self.deadline <= now {
            return Err(Error::InvalidBet("deadline must be in the future".into()));
        }
        if self.max_participants == Some(0) {
            return Err(Error::InvalidBet("max_participants must be > 0".into()));
        }
        match &self.stake {
            Stake::Credit(0) => {
                return Err(Error::InvalidBet("credit stake must be > 0".into()));
            }
            Stake::Social(desc) if desc.trim().is_empty() => {
                return Err(Error::InvalidBet("social stake needs a description".into()));
            }
            _ => {}
        }

        self.options = self.options.iter().map(|o| o.trim().to_string()).collect();
        if self.options.iter().any(|o| o.is_empty()) {
            return Err(Error::InvalidBet("options must not be blank".into()));
        }
        let distinct: BTreeSet<&String> = self.options.iter().collect();
        if distinct.len() != self.options.len() {
            return Err(Error::InvalidBet("options must be distinct".into()));
        }

        match self.bet_type {
            BetType::Binary => {
                if self.options.is_empty() {
                    self.options = DEFAULT_BINARY_OPTIONS.iter().map(|s| s.to_string()).collect();
                } else if self.options.len() != 2 {
                    return Err(Error::InvalidBet(
                        "binary bets have exactly two options".into(),
                    ));
                }
            }
            BetType::MultipleChoice => {
                if self.options.len() < 2 {
                    return Err(Error::InvalidBet(
                        "multiple-choice bets need at least two options".into(),
                    ));
                }
            }
            BetType::Prediction => {
                if !self.options.is_empty() {
                    return Err(Error::InvalidBet("prediction bets take no options".into()));
                }
            }
        }

        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipationOutcome {
    Pending = 0,
    Won = 1,
    Lost = 2,
    Refunded = 3,
}

impl ParticipationOutcome {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Pending),
            1 => Some(Self::Won),
            2 => Some(Self::Lost),
            3 => Some(Self::Refunded),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// A participant's pick: an option label, or a free-form predicted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pick {
    Option(String),
    Prediction(String),
}

impl Pick {
    pub fn chosen_option(&self) -> Option<&str> {
        match self {
            Pick::Option(label) => Some(label),
            Pick::Prediction(_) => None,
        }
    }

    pub fn predicted_value(&self) -> Option<&str> {
        match self {
            Pick::Option(_) => None,
            Pick::Prediction(value) => Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participation {
    pub id: i64,
    pub bet_id: BetId,
    pub user: UserId,
    pub pick: Pick,
    pub stake_amount: u64,
    pub outcome: ParticipationOutcome,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewParticipation {
    pub bet_id: BetId,
    pub user: UserId,
    pub pick: Pick,
    pub stake_amount: u64,
    pub created_at: DateTime<Utc>,
}

/// Users whose participation was marked as won at resolution.
pub fn winners_of(participations: &[Participation]) -> BTreeSet<UserId> {
    participations
        .iter()
        .filter(|p| p.outcome == ParticipationOutcome::Won)
        .map(|p| p.user)
        .collect()
}
