//! Bet lifecycle rules and settlement planning.
//!
//! Everything here is pure: the `SettlementService` loads state, asks these
//! functions what should happen, and applies the result in one atomic unit.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::bet::{Bet, BetStatus, BetType, Participation, ParticipationOutcome, Pick, StakeType};
use crate::error::{Error, Result};
use crate::fulfillment::{FulfillmentStatus, fulfillment_status};
use crate::ids::{CorrelationId, UserId};
use crate::ledger::{
    Posting, REASON_BET_CANCELLED, REASON_BET_NO_WINNER, REASON_BET_PAYOUT, TransactionKind,
};
use crate::tally::TallyDecision;
use crate::vote::VoteSelection;

/// Operations gated by the bet lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetAction {
    PlaceBet,
    Close,
    Vote,
    Resolve,
    Cancel,
    ConfirmFulfillment,
    Delete,
}

impl std::fmt::Display for BetAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BetAction::PlaceBet => "place a bet on",
            BetAction::Close => "close",
            BetAction::Vote => "vote on",
            BetAction::Resolve => "resolve",
            BetAction::Cancel => "cancel",
            BetAction::ConfirmFulfillment => "confirm fulfillment of",
            BetAction::Delete => "delete",
        })
    }
}

/// Fail with `InvalidStateTransition` unless `action` is allowed in the bet's status.
///
/// `Close` on an already-closed bet is allowed here; the caller treats it as a no-op.
pub fn ensure_action(bet: &Bet, action: BetAction) -> Result<()> {
    let allowed = match action {
        BetAction::PlaceBet => bet.status == BetStatus::Open,
        BetAction::Close => matches!(bet.status, BetStatus::Open | BetStatus::Closed),
        BetAction::Vote | BetAction::Resolve => bet.status == BetStatus::Closed,
        BetAction::Cancel => matches!(bet.status, BetStatus::Open | BetStatus::Closed),
        BetAction::ConfirmFulfillment => bet.status == BetStatus::Resolved,
        BetAction::Delete => bet.status.is_terminal(),
    };
    if allowed {
        Ok(())
    } else {
        Err(Error::InvalidStateTransition {
            bet: bet.id,
            from: bet.status,
            action,
        })
    }
}

/// Check that a vote selection fits the bet: an existing option for
/// binary/multiple-choice bets, a set of actual participants for predictions.
pub fn validate_selection(
    bet: &Bet,
    participations: &[Participation],
    selection: &VoteSelection,
) -> Result<()> {
    match (bet.bet_type, selection) {
        (BetType::Binary | BetType::MultipleChoice, VoteSelection::Outcome(label)) => {
            if bet.has_option(label) {
                Ok(())
            } else {
                Err(Error::InvalidSelection(format!("unknown option {label:?}")))
            }
        }
        (BetType::Prediction, VoteSelection::Winners(winners)) => {
            let participants: BTreeSet<UserId> = participations.iter().map(|p| p.user).collect();
            match winners.iter().find(|w| !participants.contains(w)) {
                Some(stranger) => Err(Error::InvalidSelection(format!(
                    "{stranger} did not participate"
                ))),
                None => Ok(()),
            }
        }
        (BetType::Prediction, VoteSelection::Outcome(_)) => Err(Error::InvalidSelection(
            "prediction bets are resolved with a winner set".into(),
        )),
        (_, VoteSelection::Winners(_)) => Err(Error::InvalidSelection(
            "option bets are resolved with a single outcome".into(),
        )),
    }
}

/// Check that a participant's pick fits the bet type and options.
pub fn validate_pick(bet: &Bet, pick: &Pick) -> Result<()> {
    match (bet.bet_type, pick) {
        (BetType::Binary | BetType::MultipleChoice, Pick::Option(label)) => {
            if bet.has_option(label) {
                Ok(())
            } else {
                Err(Error::InvalidSelection(format!("unknown option {label:?}")))
            }
        }
        (BetType::Prediction, Pick::Prediction(value)) => {
            if value.trim().is_empty() {
                Err(Error::InvalidSelection("prediction must not be empty".into()))
            } else {
                Ok(())
            }
        }
        (BetType::Prediction, Pick::Option(_)) => Err(Error::InvalidSelection(
            "prediction bets take a predicted value".into(),
        )),
        (_, Pick::Prediction(_)) => Err(Error::InvalidSelection(
            "option bets take one of the bet's options".into(),
        )),
    }
}

/// Convert an override selection into the decision it forces.
pub fn decision_from_selection(selection: VoteSelection) -> TallyDecision {
    match selection {
        VoteSelection::Outcome(label) => TallyDecision::Outcome(label),
        VoteSelection::Winners(set) => TallyDecision::Winners(set),
    }
}

/// Everything that changes when an accepted decision is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub outcome: Option<String>,
    pub winners: BTreeSet<UserId>,
    pub participation_outcomes: Vec<(UserId, ParticipationOutcome)>,
    pub postings: Vec<Posting>,
    pub fulfillment_status: FulfillmentStatus,
}

/// Plan the settlement of an accepted decision.
///
/// Credit bets pay the pot (all escrowed stakes) to the winners in proportion
/// to their stakes. Rounding leftovers go one credit at a time to winners in
/// ascending user order. With no winners every stake is refunded. Social bets
/// move no credits and wait for winners to confirm delivery.
pub fn plan_settlement(
    bet: &Bet,
    participations: &[Participation],
    decision: &TallyDecision,
    correlation_id: CorrelationId,
) -> Result<SettlementPlan> {
    let (outcome, winners): (Option<String>, BTreeSet<UserId>) = match decision {
        TallyDecision::Outcome(label) => {
            if !bet.bet_type.resolves_to_option() || !bet.has_option(label) {
                return Err(Error::InvalidSelection(format!(
                    "{label:?} is not an outcome of {}",
                    bet.id
                )));
            }
            let winners = participations
                .iter()
                .filter(|p| p.pick.chosen_option() == Some(label.as_str()))
                .map(|p| p.user)
                .collect();
            (Some(label.clone()), winners)
        }
        TallyDecision::Winners(set) => {
            if bet.bet_type != BetType::Prediction {
                return Err(Error::InvalidSelection(format!(
                    "{} is not a prediction bet",
                    bet.id
                )));
            }
            let winners = participations
                .iter()
                .map(|p| p.user)
                .filter(|u| set.contains(u))
                .collect();
            (None, winners)
        }
        TallyDecision::Tied(labels) => {
            return Err(Error::InvalidSelection(format!(
                "tied outcomes {labels:?} cannot be settled"
            )));
        }
    };

    let participation_outcomes = participations
        .iter()
        .map(|p| {
            let result = if winners.contains(&p.user) {
                ParticipationOutcome::Won
            } else {
                ParticipationOutcome::Lost
            };
            (p.user, result)
        })
        .collect();

    let stake_type = bet.stake.stake_type();
    let postings = match stake_type {
        StakeType::Credit if winners.is_empty() => {
            refund_postings(bet, participations, REASON_BET_NO_WINNER, correlation_id)
        }
        StakeType::Credit => payout_postings(bet, participations, &winners, correlation_id)?,
        StakeType::Social => Vec::new(),
    };
    // Manual stakes start with no confirmations; automatic payouts count as delivered.
    let status = if stake_type.requires_manual_fulfillment() {
        fulfillment_status(&winners, &BTreeSet::new())
    } else {
        FulfillmentStatus::Fulfilled
    };

    Ok(SettlementPlan {
        outcome,
        winners,
        participation_outcomes,
        postings,
        fulfillment_status: status,
    })
}

/// Refund postings for a cancelled bet; empty for social stakes.
pub fn plan_refunds(
    bet: &Bet,
    participations: &[Participation],
    correlation_id: CorrelationId,
) -> Vec<Posting> {
    match bet.stake.stake_type() {
        StakeType::Credit => {
            refund_postings(bet, participations, REASON_BET_CANCELLED, correlation_id)
        }
        StakeType::Social => Vec::new(),
    }
}

fn refund_postings(
    bet: &Bet,
    participations: &[Participation],
    reason: &str,
    correlation_id: CorrelationId,
) -> Vec<Posting> {
    participations
        .iter()
        .filter(|p| p.stake_amount > 0)
        .map(|p| Posting {
            user: p.user,
            kind: TransactionKind::Credit,
            amount: p.stake_amount,
            reason: reason.to_string(),
            correlation_id,
            bet_id: Some(bet.id),
        })
        .collect()
}

fn payout_postings(
    bet: &Bet,
    participations: &[Participation],
    winners: &BTreeSet<UserId>,
    correlation_id: CorrelationId,
) -> Result<Vec<Posting>> {
    let pot: u128 = participations.iter().map(|p| p.stake_amount as u128).sum();
    let winning: BTreeMap<UserId, u128> = participations
        .iter()
        .filter(|p| winners.contains(&p.user))
        .map(|p| (p.user, p.stake_amount as u128))
        .collect();
    let winning_total: u128 = winning.values().sum();
    if winning_total == 0 {
        return Ok(refund_postings(bet, participations, REASON_BET_NO_WINNER, correlation_id));
    }

    let mut shares: BTreeMap<UserId, u128> = winning
        .iter()
        .map(|(user, stake)| (*user, pot * stake / winning_total))
        .collect();
    let mut remainder = pot - shares.values().sum::<u128>();
    for share in shares.values_mut() {
        if remainder == 0 {
            break;
        }
        *share += 1;
        remainder -= 1;
    }

    shares
        .into_iter()
        .filter(|(_, share)| *share > 0)
        .map(|(user, share)| {
            let amount = u64::try_from(share).map_err(|_| Error::BalanceOverflow(user))?;
            Ok(Posting {
                user,
                kind: TransactionKind::TransferIn,
                amount,
                reason: REASON_BET_PAYOUT.to_string(),
                correlation_id,
                bet_id: Some(bet.id),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bet::Stake;
    use crate::ids::BetId;
    use chrono::Utc;

    const CID: CorrelationId = CorrelationId([1; 16]);

    fn bet(bet_type: BetType, status: BetStatus, stake: Stake) -> Bet {
        let now = Utc::now();
        Bet {
            id: BetId(3),
            creator: UserId(100),
            title: "t".into(),
            bet_type,
            status,
            stake,
            options: match bet_type {
                BetType::Prediction => vec![],
                _ => vec!["YES".into(), "NO".into()],
            },
            resolvers: [UserId(50)].into_iter().collect(),
            deadline: now,
            max_participants: None,
            fulfillment_status: None,
            resolved_outcome: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            cancelled_at: None,
        }
    }

    fn part(user: i64, pick: Pick, stake: u64) -> Participation {
        Participation {
            id: user,
            bet_id: BetId(3),
            user: UserId(user),
            pick,
            stake_amount: stake,
            outcome: ParticipationOutcome::Pending,
            created_at: Utc::now(),
        }
    }

    fn yes(user: i64, stake: u64) -> Participation {
        part(user, Pick::Option("YES".into()), stake)
    }

    fn no(user: i64, stake: u64) -> Participation {
        part(user, Pick::Option("NO".into()), stake)
    }

    #[test]
    fn lifecycle_gates() {
        let open = bet(BetType::Binary, BetStatus::Open, Stake::Credit(1));
        assert!(ensure_action(&open, BetAction::PlaceBet).is_ok());
        assert!(ensure_action(&open, BetAction::Vote).is_err());
        assert!(ensure_action(&open, BetAction::Cancel).is_ok());

        let resolved = bet(BetType::Binary, BetStatus::Resolved, Stake::Credit(1));
        assert!(ensure_action(&resolved, BetAction::Cancel).is_err());
        assert!(ensure_action(&resolved, BetAction::Vote).is_err());
        assert!(ensure_action(&resolved, BetAction::ConfirmFulfillment).is_ok());
        assert!(ensure_action(&resolved, BetAction::Delete).is_ok());
        assert!(ensure_action(&open, BetAction::Delete).is_err());

        let cancelled = bet(BetType::Binary, BetStatus::Cancelled, Stake::Credit(1));
        assert!(matches!(
            ensure_action(&cancelled, BetAction::Vote),
            Err(Error::InvalidStateTransition {
                from: BetStatus::Cancelled,
                action: BetAction::Vote,
                ..
            })
        ));
    }

    #[test]
    fn pot_is_split_by_stake() {
        let b = bet(BetType::Binary, BetStatus::Closed, Stake::Credit(10));
        let parts = vec![yes(1, 10), yes(2, 20), no(3, 10), no(4, 10)];
        let plan = plan_settlement(&b, &parts, &TallyDecision::Outcome("YES".into()), CID).unwrap();

        assert_eq!(plan.winners, [UserId(1), UserId(2)].into_iter().collect());
        assert_eq!(plan.outcome.as_deref(), Some("YES"));
        assert_eq!(plan.fulfillment_status, FulfillmentStatus::Fulfilled);
        let amounts: Vec<(UserId, u64)> =
            plan.postings.iter().map(|p| (p.user, p.amount)).collect();
        // pot 50: 50*10/30 = 16 (+1 remainder), 50*20/30 = 33
        assert_eq!(amounts, vec![(UserId(1), 17), (UserId(2), 33)]);
        assert!(plan.postings.iter().all(|p| p.kind == TransactionKind::TransferIn));
        assert!(plan.postings.iter().all(|p| p.correlation_id == CID));
        assert_eq!(
            plan.participation_outcomes,
            vec![
                (UserId(1), ParticipationOutcome::Won),
                (UserId(2), ParticipationOutcome::Won),
                (UserId(3), ParticipationOutcome::Lost),
                (UserId(4), ParticipationOutcome::Lost),
            ]
        );
    }

    #[test]
    fn outcome_nobody_picked_refunds_everyone() {
        let b = bet(BetType::Binary, BetStatus::Closed, Stake::Credit(10));
        let parts = vec![yes(1, 10), yes(2, 10)];
        let plan = plan_settlement(&b, &parts, &TallyDecision::Outcome("NO".into()), CID).unwrap();
        assert!(plan.winners.is_empty());
        assert_eq!(plan.postings.len(), 2);
        assert!(plan.postings.iter().all(|p| p.reason == REASON_BET_NO_WINNER
            && p.kind == TransactionKind::Credit
            && p.amount == 10));
    }

    #[test]
    fn social_stakes_wait_for_confirmation() {
        let b = bet(BetType::Prediction, BetStatus::Closed, Stake::Social("dinner".into()));
        let parts = vec![part(1, Pick::Prediction("3-1".into()), 0)];
        let decision = TallyDecision::Winners([UserId(1)].into_iter().collect());
        let plan = plan_settlement(&b, &parts, &decision, CID).unwrap();
        assert!(plan.postings.is_empty());
        assert_eq!(plan.fulfillment_status, FulfillmentStatus::Pending);

        let nobody = TallyDecision::Winners(BTreeSet::new());
        let plan = plan_settlement(&b, &parts, &nobody, CID).unwrap();
        assert_eq!(plan.fulfillment_status, FulfillmentStatus::Fulfilled);
    }

    #[test]
    fn decision_must_match_bet_type() {
        let b = bet(BetType::Binary, BetStatus::Closed, Stake::Credit(10));
        let decision = TallyDecision::Winners(BTreeSet::new());
        assert!(plan_settlement(&b, &[], &decision, CID).is_err());
        let unknown = TallyDecision::Outcome("MAYBE".into());
        assert!(plan_settlement(&b, &[], &unknown, CID).is_err());
        let tied = TallyDecision::Tied(vec!["YES".into(), "NO".into()]);
        assert!(plan_settlement(&b, &[], &tied, CID).is_err());
    }

    #[test]
    fn refunds_only_for_credit_stakes() {
        let b = bet(BetType::Binary, BetStatus::Closed, Stake::Credit(10));
        let parts = vec![yes(1, 10), no(2, 10), no(3, 10)];
        let refunds = plan_refunds(&b, &parts, CID);
        assert_eq!(refunds.len(), 3);
        assert!(refunds.iter().all(|p| p.reason == REASON_BET_CANCELLED && p.amount == 10));

        let social = bet(BetType::Binary, BetStatus::Closed, Stake::Social("beer".into()));
        assert!(plan_refunds(&social, &parts, CID).is_empty());
    }

    #[test]
    fn selection_validation() {
        let b = bet(BetType::Prediction, BetStatus::Closed, Stake::Credit(10));
        let parts = vec![part(1, Pick::Prediction("x".into()), 10)];
        let ok = VoteSelection::Winners([UserId(1)].into_iter().collect());
        let stranger = VoteSelection::Winners([UserId(9)].into_iter().collect());
        assert!(validate_selection(&b, &parts, &ok).is_ok());
        assert!(validate_selection(&b, &parts, &stranger).is_err());
        assert!(validate_selection(&b, &parts, &VoteSelection::Outcome("YES".into())).is_err());

        let binary = bet(BetType::Binary, BetStatus::Closed, Stake::Credit(10));
        assert!(validate_selection(&binary, &[], &VoteSelection::Outcome("NO".into())).is_ok());
        assert!(validate_selection(&binary, &[], &VoteSelection::Outcome("no".into())).is_err());
    }

    #[test]
    fn pick_validation() {
        let binary = bet(BetType::Binary, BetStatus::Open, Stake::Credit(10));
        assert!(validate_pick(&binary, &Pick::Option("YES".into())).is_ok());
        assert!(validate_pick(&binary, &Pick::Option("PERHAPS".into())).is_err());
        assert!(validate_pick(&binary, &Pick::Prediction("2".into())).is_err());

        let prediction = bet(BetType::Prediction, BetStatus::Open, Stake::Credit(10));
        assert!(validate_pick(&prediction, &Pick::Prediction(" ".into())).is_err());
        assert!(validate_pick(&prediction, &Pick::Prediction("2-0".into())).is_ok());
    }
}
