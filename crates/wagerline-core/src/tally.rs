//! Vote aggregation.
//!
//! Turns the resolution votes of a closed bet into a decision. Votes from
//! users who are no longer assigned resolvers are ignored.

use std::collections::{BTreeMap, BTreeSet};

use crate::bet::{Bet, BetType, Participation};
use crate::config::{SettlementConfig, WinnerRule};
use crate::error::{Error, Result};
use crate::ids::UserId;
use crate::vote::{ResolutionVote, VoteSelection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyDecision {
    /// Binary/multiple-choice: this option has a strict plurality.
    Outcome(String),
    /// Prediction: the participants confirmed as winners (possibly none).
    Winners(BTreeSet<UserId>),
    /// Binary/multiple-choice: these options share the top vote count.
    /// Needs more votes or an override; never picked automatically.
    Tied(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyResult {
    pub decision: TallyDecision,
    /// Assigned resolvers who have not voted yet.
    pub pending_resolvers: BTreeSet<UserId>,
    pub votes_cast: usize,
}

impl TallyResult {
    pub fn accepted(&self) -> bool {
        !matches!(self.decision, TallyDecision::Tied(_))
    }
}

/// Aggregate `votes` for `bet`.
///
/// Fails with `Error::IncompleteVoting` while fewer votes than
/// [`SettlementConfig::required_votes`] have been cast.
pub fn compute_tally(
    bet: &Bet,
    participations: &[Participation],
    votes: &[ResolutionVote],
    config: &SettlementConfig,
) -> Result<TallyResult> {
    let counted: Vec<&ResolutionVote> = votes
        .iter()
        .filter(|v| bet.is_resolver(v.resolver))
        .collect();
    let voted: BTreeSet<UserId> = counted.iter().map(|v| v.resolver).collect();
    let pending: BTreeSet<UserId> = bet.resolvers.difference(&voted).copied().collect();

    if voted.len() < config.required_votes(bet.resolvers.len()) {
        return Err(Error::IncompleteVoting {
            bet: bet.id,
            pending: pending.into_iter().collect(),
        });
    }

    let decision = match bet.bet_type {
        BetType::Binary | BetType::MultipleChoice => tally_outcomes(&counted)?,
        BetType::Prediction => {
            if let WinnerRule::AtLeast(n) = config.winner_rule
                && n > counted.len()
            {
                return Err(Error::IncompleteVoting {
                    bet: bet.id,
                    pending: pending.into_iter().collect(),
                });
            }
            let participants: BTreeSet<UserId> = participations.iter().map(|p| p.user).collect();
            TallyDecision::Winners(tally_winners(&counted, &participants, config.winner_rule)?)
        }
    };

    Ok(TallyResult {
        decision,
        pending_resolvers: pending,
        votes_cast: counted.len(),
    })
}

fn tally_outcomes(votes: &[&ResolutionVote]) -> Result<TallyDecision> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for vote in votes {
        let label = vote.selection.outcome().ok_or_else(|| {
            Error::InvalidSelection(format!("{} cast a winner set on an option bet", vote.resolver))
        })?;
        *counts.entry(label).or_default() += 1;
    }

    let top = counts.values().copied().max().unwrap_or(0);
    let leaders: Vec<String> = counts
        .iter()
        .filter(|(_, c)| **c == top)
        .map(|(label, _)| label.to_string())
        .collect();

    match leaders.as_slice() {
        [single] => Ok(TallyDecision::Outcome(single.clone())),
        _ => Ok(TallyDecision::Tied(leaders)),
    }
}

fn tally_winners(
    votes: &[&ResolutionVote],
    participants: &BTreeSet<UserId>,
    rule: WinnerRule,
) -> Result<BTreeSet<UserId>> {
    let mut mentions: BTreeMap<UserId, usize> = BTreeMap::new();
    for vote in votes {
        let set = match &vote.selection {
            VoteSelection::Winners(set) => set,
            VoteSelection::Outcome(_) => {
                return Err(Error::InvalidSelection(format!(
                    "{} cast an option on a prediction bet",
                    vote.resolver
                )));
            }
        };
        for user in set.iter().filter(|u| participants.contains(u)) {
            *mentions.entry(*user).or_default() += 1;
        }
    }

    let total = votes.len();
    Ok(mentions
        .into_iter()
        .filter(|(_, count)| match rule {
            WinnerRule::Unanimous => *count == total,
            WinnerRule::Majority => *count * 2 > total,
            WinnerRule::AtLeast(n) => *count >= n,
        })
        .map(|(user, _)| user)
        .collect())
}
