use serde::{Deserialize, Serialize};

/// How resolver winner sets on a prediction bet are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerRule {
    /// A participant wins only if every counted vote names them.
    #[default]
    Unanimous,
    /// A participant wins if strictly more than half of the counted votes name them.
    Majority,
    /// A participant wins if at least this many votes name them.
    AtLeast(usize),
}

/// Configuration for the `SettlementService`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettlementConfig {
    /// Aggregation rule for prediction bets.
    pub winner_rule: WinnerRule,
    /// Votes required before tallying. `None` waits for every assigned resolver.
    pub quorum: Option<usize>,
    /// Let a resolver replace their vote while the bet is still closed.
    pub allow_revote: bool,
    /// Buffer size of the settlement event channel.
    pub event_capacity: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            winner_rule: WinnerRule::Unanimous,
            quorum: None,
            allow_revote: false,
            event_capacity: 256,
        }
    }
}

impl SettlementConfig {
    /// Number of votes needed before a tally may be accepted.
    pub fn required_votes(&self, resolver_count: usize) -> usize {
        match self.quorum {
            Some(q) => q.clamp(1, resolver_count.max(1)),
            None => resolver_count,
        }
    }
}
