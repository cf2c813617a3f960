use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BetId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    Pending = 0,
    PartiallyFulfilled = 1,
    Fulfilled = 2,
}

impl FulfillmentStatus {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Pending),
            1 => Some(Self::PartiallyFulfilled),
            2 => Some(Self::Fulfilled),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// A winner's confirmation that their stake was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfillment {
    pub id: i64,
    pub bet_id: BetId,
    pub winner: UserId,
    pub notes: Option<String>,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFulfillment {
    pub bet_id: BetId,
    pub winner: UserId,
    pub notes: Option<String>,
    pub confirmed_at: DateTime<Utc>,
}

/// Derive the aggregate status by counting confirmed winners.
///
/// Confirmations from users outside `winners` are ignored, and duplicates
/// count once. A bet with no winners has nothing outstanding.
pub fn fulfillment_status<'a>(
    winners: &BTreeSet<UserId>,
    confirmed: impl IntoIterator<Item = &'a UserId>,
) -> FulfillmentStatus {
    let confirmed: BTreeSet<&UserId> = confirmed
        .into_iter()
        .filter(|u| winners.contains(u))
        .collect();

    if confirmed.len() == winners.len() {
        FulfillmentStatus::Fulfilled
    } else if confirmed.is_empty() {
        FulfillmentStatus::Pending
    } else {
        FulfillmentStatus::PartiallyFulfilled
    }
}

/// Confirmation progress of a resolved bet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentSummary {
    pub bet_id: BetId,
    pub status: FulfillmentStatus,
    pub winners: BTreeSet<UserId>,
    pub confirmed: BTreeSet<UserId>,
}

impl FulfillmentSummary {
    pub fn new(bet_id: BetId, winners: BTreeSet<UserId>, fulfillments: &[Fulfillment]) -> Self {
        let confirmed: BTreeSet<UserId> = fulfillments
            .iter()
            .map(|f| f.winner)
            .filter(|w| winners.contains(w))
            .collect();
        let status = fulfillment_status(&winners, &confirmed);
        Self {
            bet_id,
            status,
            winners,
            confirmed,
        }
    }

    /// Summary for a bet whose winners were paid at settlement. Every winner
    /// counts as confirmed, so the derived status is always `Fulfilled`.
    pub fn settled(bet_id: BetId, winners: BTreeSet<UserId>) -> Self {
        let status = fulfillment_status(&winners, &winners);
        Self {
            bet_id,
            status,
            confirmed: winners.clone(),
            winners,
        }
    }

    pub fn outstanding(&self) -> BTreeSet<UserId> {
        self.winners.difference(&self.confirmed).copied().collect()
    }
}
