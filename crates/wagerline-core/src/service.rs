use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::bet::{
    Bet, BetStatus, NewBet, NewParticipation, Participation, ParticipationOutcome, Pick, winners_of,
};
use crate::config::SettlementConfig;
use crate::error::{Error, Result};
use crate::events::SettlementEvent;
use crate::fulfillment::{FulfillmentStatus, FulfillmentSummary, NewFulfillment};
use crate::ids::{BetId, CorrelationId, UserId};
use crate::ledger::{self, LedgerEntry, Posting, REASON_BET_STAKE, TransactionKind};
use crate::resolution::{
    BetAction, decision_from_selection, ensure_action, plan_refunds, plan_settlement,
    validate_pick, validate_selection,
};
use crate::store_trait::SettlementStore;
use crate::tally::{TallyDecision, TallyResult, compute_tally};
use crate::vote::{NewVote, ResolutionVote, VoteSelection};

/// Result of applying an accepted decision to a bet.
#[derive(Debug, Clone)]
pub struct ResolutionReceipt {
    pub bet: Bet,
    pub winners: BTreeSet<UserId>,
    pub outcome: Option<String>,
    pub correlation_id: CorrelationId,
    /// Payouts or no-winner refunds, in the order they were written.
    pub ledger_entries: Vec<LedgerEntry>,
}

#[derive(Debug, Clone)]
pub enum ResolutionAttempt {
    Resolved(ResolutionReceipt),
    /// All required votes are in but no outcome was accepted (a tie).
    /// The bet stays `Closed`.
    Pending(TallyResult),
}

#[derive(Debug, Clone)]
pub struct CancellationReceipt {
    pub bet: Bet,
    pub previous_status: BetStatus,
    pub refunds: Vec<LedgerEntry>,
    pub correlation_id: CorrelationId,
}

/// Coordinates the bet lifecycle from creation to fulfillment.
///
/// Every operation takes the store lock once and runs inside
/// [`SettlementStore::atomically`], so concurrent calls against the same bet
/// are serialized and a failure leaves no partial writes. Events are
/// published via `tokio::broadcast` only after the change is committed.
pub struct SettlementService<S: SettlementStore> {
    store: Arc<Mutex<S>>,
    config: SettlementConfig,
    tx: broadcast::Sender<SettlementEvent>,
}

impl<S: SettlementStore> SettlementService<S> {
    /// Create a service that owns `store`.
    ///
    /// Returns the service and a broadcast receiver for settlement events.
    pub fn new(store: S, config: SettlementConfig) -> (Self, broadcast::Receiver<SettlementEvent>) {
        Self::with_store(Arc::new(Mutex::new(store)), config)
    }

    /// Create a service over a store shared with other components.
    pub fn with_store(
        store: Arc<Mutex<S>>,
        config: SettlementConfig,
    ) -> (Self, broadcast::Receiver<SettlementEvent>) {
        let (tx, rx) = broadcast::channel(config.event_capacity.max(1));
        (Self { store, config, tx }, rx)
    }

    /// Get an additional broadcast receiver for settlement events.
    pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
        self.tx.subscribe()
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Mutex<S>> {
        &self.store
    }

    fn locked<T>(&self, f: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| Error::Store("store lock poisoned".into()))?;
        f(&mut *store)
    }

    fn atomic<T>(&self, f: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        self.locked(|store| store.atomically(f))
    }

    fn emit(&self, event: SettlementEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            log::trace!("no subscribers for {kind} event");
        }
    }

    // ---------------------------------------------------------------------
    // Bets
    // ---------------------------------------------------------------------

    pub fn create_bet(&self, request: NewBet) -> Result<Bet> {
        let now = Utc::now();
        let request = request.validate(now)?;
        let bet = self.atomic(|store| store.insert_bet(&request, now))?;

        log::info!(
            "created {} ({:?}, {} resolver(s), deadline {})",
            bet.id,
            bet.bet_type,
            bet.resolvers.len(),
            bet.deadline
        );
        self.emit(SettlementEvent::BetCreated {
            bet_id: bet.id,
            creator: bet.creator,
        });
        Ok(bet)
    }

    pub fn get_bet(&self, bet_id: BetId) -> Result<Bet> {
        self.locked(|store| load_bet(store, bet_id))
    }

    pub fn participations(&self, bet_id: BetId) -> Result<Vec<Participation>> {
        self.locked(|store| {
            load_bet(store, bet_id)?;
            store.participations(bet_id)
        })
    }

    pub fn votes(&self, bet_id: BetId) -> Result<Vec<ResolutionVote>> {
        self.locked(|store| {
            load_bet(store, bet_id)?;
            store.votes(bet_id)
        })
    }

    /// Join an open bet. Credit stakes are escrowed by debiting the
    /// participant with a `TRANSFER_OUT` / `BET_STAKE` entry.
    pub fn place_bet(&self, bet_id: BetId, user: UserId, pick: Pick) -> Result<Participation> {
        let now = Utc::now();
        let participation = self.atomic(|store| {
            let bet = load_bet(store, bet_id)?;
            ensure_action(&bet, BetAction::PlaceBet)?;
            if now >= bet.deadline {
                return Err(Error::DeadlinePassed(bet.id));
            }
            validate_pick(&bet, &pick)?;

            let existing = store.participations(bet.id)?;
            if existing.iter().any(|p| p.user == user) {
                return Err(Error::DuplicateParticipation { bet: bet.id, user });
            }
            if let Some(max) = bet.max_participants
                && existing.len() >= max as usize
            {
                return Err(Error::BetFull(bet.id));
            }

            let stake_amount = bet.stake.credit_amount();
            let participation = store.insert_participation(&NewParticipation {
                bet_id: bet.id,
                user,
                pick,
                stake_amount,
                created_at: now,
            })?;
            if stake_amount > 0 {
                ledger::record_transaction(
                    store,
                    &Posting {
                        user,
                        kind: TransactionKind::TransferOut,
                        amount: stake_amount,
                        reason: REASON_BET_STAKE.to_string(),
                        correlation_id: CorrelationId::random(),
                        bet_id: Some(bet.id),
                    },
                    now,
                )?;
            }
            Ok(participation)
        })?;

        log::info!(
            "{} joined {} (stake {})",
            participation.user,
            participation.bet_id,
            participation.stake_amount
        );
        Ok(participation)
    }

    /// Stop accepting participants.
    ///
    /// Allowed once the deadline has passed or the bet is full. Closing an
    /// already closed bet is a no-op.
    pub fn close_bet(&self, bet_id: BetId, now: DateTime<Utc>) -> Result<Bet> {
        let (bet, changed) = self.atomic(|store| {
            let mut bet = load_bet(store, bet_id)?;
            ensure_action(&bet, BetAction::Close)?;
            if bet.status == BetStatus::Closed {
                return Ok((bet, false));
            }
            let full = match bet.max_participants {
                Some(max) => store.participations(bet.id)?.len() >= max as usize,
                None => false,
            };
            if now < bet.deadline && !full {
                return Err(Error::DeadlineNotReached(bet.id));
            }
            bet.status = BetStatus::Closed;
            bet.updated_at = now;
            store.update_bet_state(&bet)?;
            Ok((bet, true))
        })?;

        if changed {
            log::info!("closed {}", bet.id);
            self.emit(SettlementEvent::BetClosed { bet_id: bet.id });
        }
        Ok(bet)
    }

    /// Close every open bet whose deadline is at or before `now`.
    pub fn close_expired(&self, now: DateTime<Utc>) -> Result<Vec<BetId>> {
        let closed = self.atomic(|store| {
            let due = store.list_open_bets_due(now)?;
            let mut ids = Vec::with_capacity(due.len());
            for mut bet in due {
                bet.status = BetStatus::Closed;
                bet.updated_at = now;
                store.update_bet_state(&bet)?;
                ids.push(bet.id);
            }
            Ok(ids)
        })?;

        if !closed.is_empty() {
            log::info!("closed {} expired bet(s)", closed.len());
        }
        for bet_id in &closed {
            self.emit(SettlementEvent::BetClosed { bet_id: *bet_id });
        }
        Ok(closed)
    }

    /// Remove a resolved or cancelled bet with its participations, votes and
    /// fulfillments. Ledger history is kept.
    pub fn delete_bet(&self, bet_id: BetId) -> Result<()> {
        self.atomic(|store| {
            let bet = load_bet(store, bet_id)?;
            ensure_action(&bet, BetAction::Delete)?;
            if store.delete_bet(bet_id)? {
                Ok(())
            } else {
                Err(Error::BetNotFound(bet_id))
            }
        })?;
        log::info!("deleted {bet_id}");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Resolution
    // ---------------------------------------------------------------------

    /// Record a resolver's vote on a closed bet.
    ///
    /// A second vote from the same resolver fails with `DuplicateVote` unless
    /// revoting is enabled, in which case it replaces the first.
    pub fn submit_vote(
        &self,
        bet_id: BetId,
        resolver: UserId,
        selection: VoteSelection,
    ) -> Result<ResolutionVote> {
        let now = Utc::now();
        let allow_revote = self.config.allow_revote;
        let (vote, replaced) = self.atomic(|store| {
            let bet = load_bet(store, bet_id)?;
            ensure_action(&bet, BetAction::Vote)?;
            if !bet.is_resolver(resolver) {
                return Err(Error::UnauthorizedResolver {
                    bet: bet.id,
                    user: resolver,
                });
            }
            let participations = store.participations(bet.id)?;
            validate_selection(&bet, &participations, &selection)?;

            let already_voted = store.votes(bet.id)?.iter().any(|v| v.resolver == resolver);
            if already_voted && !allow_revote {
                return Err(Error::DuplicateVote {
                    bet: bet.id,
                    resolver,
                });
            }
            let replaced = already_voted && store.delete_vote(bet.id, resolver)?;
            let vote = store.insert_vote(&NewVote {
                bet_id: bet.id,
                resolver,
                selection,
                created_at: now,
            })?;
            Ok((vote, replaced))
        })?;

        log::info!(
            "{} {} on {}",
            resolver,
            if replaced { "changed their vote" } else { "voted" },
            bet_id
        );
        self.emit(SettlementEvent::VoteSubmitted {
            bet_id,
            resolver,
            replaced,
        });
        Ok(vote)
    }

    /// Tally the votes of a closed bet and settle it if an outcome is accepted.
    ///
    /// Fails with the retryable `IncompleteVoting` while votes are missing.
    /// A tie returns `ResolutionAttempt::Pending` and leaves the bet closed.
    pub fn try_resolve(&self, bet_id: BetId) -> Result<ResolutionAttempt> {
        let now = Utc::now();
        let correlation_id = CorrelationId::random();
        let attempt = self.atomic(|store| {
            let bet = load_bet(store, bet_id)?;
            ensure_action(&bet, BetAction::Resolve)?;
            let participations = store.participations(bet.id)?;
            let votes = store.votes(bet.id)?;
            let tally = compute_tally(&bet, &participations, &votes, &self.config)?;
            if !tally.accepted() {
                return Ok(ResolutionAttempt::Pending(tally));
            }
            let receipt = settle(
                store,
                bet,
                &participations,
                &tally.decision,
                correlation_id,
                now,
            )?;
            Ok(ResolutionAttempt::Resolved(receipt))
        })?;

        match &attempt {
            ResolutionAttempt::Resolved(receipt) => self.announce_resolution(receipt, false),
            ResolutionAttempt::Pending(tally) => {
                let tied_outcomes = match &tally.decision {
                    TallyDecision::Tied(labels) => labels.clone(),
                    _ => Vec::new(),
                };
                log::warn!(
                    "{bet_id} is tied between {tied_outcomes:?}; awaiting more votes or an override"
                );
                self.emit(SettlementEvent::ResolutionPending {
                    bet_id,
                    tied_outcomes,
                });
            }
        }
        Ok(attempt)
    }

    /// Settle a closed bet with an explicit outcome, bypassing the tally.
    /// Used to break ties.
    pub fn resolve_with_override(
        &self,
        bet_id: BetId,
        selection: VoteSelection,
    ) -> Result<ResolutionReceipt> {
        let now = Utc::now();
        let correlation_id = CorrelationId::random();
        let receipt = self.atomic(|store| {
            let bet = load_bet(store, bet_id)?;
            ensure_action(&bet, BetAction::Resolve)?;
            let participations = store.participations(bet.id)?;
            validate_selection(&bet, &participations, &selection)?;
            let decision = decision_from_selection(selection);
            settle(store, bet, &participations, &decision, correlation_id, now)
        })?;

        log::warn!("{bet_id} resolved by override");
        self.announce_resolution(&receipt, true);
        Ok(receipt)
    }

    fn announce_resolution(&self, receipt: &ResolutionReceipt, overridden: bool) {
        log::info!(
            "resolved {} (outcome {:?}, {} winner(s), {} ledger entr(ies)) [{}]",
            receipt.bet.id,
            receipt.outcome,
            receipt.winners.len(),
            receipt.ledger_entries.len(),
            receipt.correlation_id
        );
        self.emit(SettlementEvent::BetResolved {
            bet_id: receipt.bet.id,
            outcome: receipt.outcome.clone(),
            winners: receipt.winners.clone(),
            correlation_id: receipt.correlation_id,
            overridden,
        });
        if receipt.bet.fulfillment_status == Some(FulfillmentStatus::Fulfilled) {
            self.emit(SettlementEvent::BetFulfilled {
                bet_id: receipt.bet.id,
            });
        }
    }

    /// Cancel an open or closed bet and refund every credit stake under one
    /// correlation id.
    pub fn cancel_bet(&self, bet_id: BetId, reason: &str) -> Result<CancellationReceipt> {
        let now = Utc::now();
        let correlation_id = CorrelationId::random();
        let receipt = self.atomic(|store| {
            let mut bet = load_bet(store, bet_id)?;
            ensure_action(&bet, BetAction::Cancel)?;
            let previous_status = bet.status;
            let participations = store.participations(bet.id)?;

            for p in &participations {
                store.set_participation_outcome(bet.id, p.user, ParticipationOutcome::Refunded)?;
            }
            let mut refunds = Vec::new();
            for posting in plan_refunds(&bet, &participations, correlation_id) {
                refunds.push(ledger::record_transaction(store, &posting, now)?);
            }

            bet.status = BetStatus::Cancelled;
            bet.cancelled_at = Some(now);
            bet.updated_at = now;
            store.update_bet_state(&bet)?;
            Ok(CancellationReceipt {
                bet,
                previous_status,
                refunds,
                correlation_id,
            })
        })?;

        log::info!(
            "cancelled {} ({}), refunded {} participant(s) [{}]",
            bet_id,
            reason,
            receipt.refunds.len(),
            correlation_id
        );
        self.emit(SettlementEvent::BetCancelled {
            bet_id,
            previous_status: receipt.previous_status,
            reason: reason.to_string(),
            correlation_id,
        });
        Ok(receipt)
    }

    // ---------------------------------------------------------------------
    // Fulfillment
    // ---------------------------------------------------------------------

    /// Record a winner's confirmation that their stake was delivered and
    /// recompute the bet's fulfillment status.
    pub fn confirm_fulfillment(
        &self,
        bet_id: BetId,
        winner: UserId,
        notes: Option<String>,
    ) -> Result<FulfillmentSummary> {
        let now = Utc::now();
        let notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let summary = self.atomic(|store| {
            let mut bet = load_bet(store, bet_id)?;
            ensure_action(&bet, BetAction::ConfirmFulfillment)?;
            if !bet.stake.stake_type().requires_manual_fulfillment() {
                return Err(Error::FulfillmentNotRequired(bet.id));
            }
            let winners = winners_of(&store.participations(bet.id)?);
            if !winners.contains(&winner) {
                return Err(Error::NotAWinner {
                    bet: bet.id,
                    user: winner,
                });
            }
            store.insert_fulfillment(&NewFulfillment {
                bet_id: bet.id,
                winner,
                notes,
                confirmed_at: now,
            })?;

            let summary = FulfillmentSummary::new(bet.id, winners, &store.fulfillments(bet.id)?);
            if bet.fulfillment_status != Some(summary.status) {
                bet.fulfillment_status = Some(summary.status);
                bet.updated_at = now;
                store.update_bet_state(&bet)?;
            }
            Ok(summary)
        })?;

        log::info!(
            "{} confirmed fulfillment of {} ({}/{} confirmed)",
            winner,
            bet_id,
            summary.confirmed.len(),
            summary.winners.len()
        );
        self.emit(SettlementEvent::FulfillmentSubmitted {
            bet_id,
            winner,
            status: summary.status,
        });
        if summary.status == FulfillmentStatus::Fulfilled {
            self.emit(SettlementEvent::BetFulfilled { bet_id });
        }
        Ok(summary)
    }

    pub fn fulfillment_summary(&self, bet_id: BetId) -> Result<FulfillmentSummary> {
        self.locked(|store| {
            let bet = load_bet(store, bet_id)?;
            ensure_action(&bet, BetAction::ConfirmFulfillment)?;
            let winners = winners_of(&store.participations(bet.id)?);
            if !bet.stake.stake_type().requires_manual_fulfillment() {
                return Ok(FulfillmentSummary::settled(bet.id, winners));
            }
            Ok(FulfillmentSummary::new(
                bet.id,
                winners,
                &store.fulfillments(bet.id)?,
            ))
        })
    }

    // ---------------------------------------------------------------------
    // Ledger
    // ---------------------------------------------------------------------

    /// Apply a single balance movement outside of any bet workflow, such as
    /// a deposit or withdrawal.
    pub fn record_transaction(&self, posting: &Posting) -> Result<LedgerEntry> {
        let now = Utc::now();
        let entry = self.atomic(|store| ledger::record_transaction(store, posting, now))?;
        log::info!(
            "{} {:?} {} ({}), balance now {}",
            entry.user,
            entry.kind,
            entry.amount,
            entry.reason,
            entry.balance_after
        );
        Ok(entry)
    }

    pub fn balance(&self, user: UserId) -> Result<u64> {
        self.locked(|store| store.balance(user))
    }

    pub fn transactions_for_user(&self, user: UserId) -> Result<Vec<LedgerEntry>> {
        self.locked(|store| store.ledger_entries_for_user(user))
    }

    pub fn transactions_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<LedgerEntry>> {
        self.locked(|store| store.ledger_entries_by_correlation(correlation_id))
    }
}

fn load_bet<S: SettlementStore>(store: &mut S, bet_id: BetId) -> Result<Bet> {
    store.get_bet(bet_id)?.ok_or(Error::BetNotFound(bet_id))
}

/// Apply an accepted decision: participation outcomes, ledger postings and
/// the terminal bet state. Runs inside the caller's atomic unit.
fn settle<S: SettlementStore>(
    store: &mut S,
    mut bet: Bet,
    participations: &[Participation],
    decision: &TallyDecision,
    correlation_id: CorrelationId,
    now: DateTime<Utc>,
) -> Result<ResolutionReceipt> {
    let plan = plan_settlement(&bet, participations, decision, correlation_id)?;

    for (user, outcome) in &plan.participation_outcomes {
        store.set_participation_outcome(bet.id, *user, *outcome)?;
    }
    let mut ledger_entries = Vec::with_capacity(plan.postings.len());
    for posting in &plan.postings {
        ledger_entries.push(ledger::record_transaction(store, posting, now)?);
    }

    bet.status = BetStatus::Resolved;
    bet.resolved_outcome = plan.outcome.clone();
    bet.fulfillment_status = Some(plan.fulfillment_status);
    bet.resolved_at = Some(now);
    bet.updated_at = now;
    store.update_bet_state(&bet)?;

    Ok(ResolutionReceipt {
        bet,
        winners: plan.winners,
        outcome: plan.outcome,
        correlation_id,
        ledger_entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bet::Stake;
    use crate::testing::{TestStore, binary_bet, prediction_bet, users};
    use chrono::Duration;

    fn service() -> (SettlementService<TestStore>, broadcast::Receiver<SettlementEvent>) {
        SettlementService::new(TestStore::default(), SettlementConfig::default())
    }

    fn fund(svc: &SettlementService<TestStore>, user: i64, amount: u64) {
        svc.record_transaction(&Posting {
            user: UserId(user),
            kind: TransactionKind::Credit,
            amount,
            reason: "DEPOSIT".into(),
            correlation_id: CorrelationId::random(),
            bet_id: None,
        })
        .unwrap();
    }

    fn drain(rx: &mut broadcast::Receiver<SettlementEvent>) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind());
        }
        kinds
    }

    fn later() -> DateTime<Utc> {
        Utc::now() + Duration::hours(2)
    }

    #[test]
    fn placing_a_credit_bet_escrows_the_stake() {
        let (svc, _rx) = service();
        fund(&svc, 1, 100);
        let bet = svc.create_bet(binary_bet(9, 25, &[50])).unwrap();

        let p = svc
            .place_bet(bet.id, UserId(1), Pick::Option("YES".into()))
            .unwrap();
        assert_eq!(p.stake_amount, 25);
        assert_eq!(svc.balance(UserId(1)).unwrap(), 75);

        let entries = svc.transactions_for_user(UserId(1)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].kind, TransactionKind::TransferOut);
        assert_eq!(entries[1].reason, REASON_BET_STAKE);
        assert_eq!(entries[1].bet_id, Some(bet.id));
    }

    #[test]
    fn placing_without_funds_leaves_no_participation() {
        let (svc, _rx) = service();
        let bet = svc.create_bet(binary_bet(9, 25, &[50])).unwrap();
        let err = svc
            .place_bet(bet.id, UserId(1), Pick::Option("YES".into()))
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert!(svc.participations(bet.id).unwrap().is_empty());
    }

    #[test]
    fn full_bet_rejects_participants_and_can_close_early() {
        let (svc, _rx) = service();
        fund(&svc, 1, 10);
        fund(&svc, 2, 10);
        let mut request = binary_bet(9, 10, &[50]);
        request.max_participants = Some(1);
        let bet = svc.create_bet(request).unwrap();

        svc.place_bet(bet.id, UserId(1), Pick::Option("NO".into()))
            .unwrap();
        let err = svc
            .place_bet(bet.id, UserId(2), Pick::Option("NO".into()))
            .unwrap_err();
        assert!(matches!(err, Error::BetFull(_)));

        let closed = svc.close_bet(bet.id, Utc::now()).unwrap();
        assert_eq!(closed.status, BetStatus::Closed);
    }

    #[test]
    fn close_before_deadline_is_rejected() {
        let (svc, _rx) = service();
        let bet = svc.create_bet(binary_bet(9, 10, &[50])).unwrap();
        let err = svc.close_bet(bet.id, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::DeadlineNotReached(_)));
    }

    #[test]
    fn closing_twice_is_a_no_op() {
        let (svc, mut rx) = service();
        let bet = svc.create_bet(binary_bet(9, 10, &[50])).unwrap();
        svc.close_bet(bet.id, later()).unwrap();
        svc.close_bet(bet.id, later()).unwrap();
        assert_eq!(drain(&mut rx), vec!["bet_created", "bet_closed"]);
    }

    #[test]
    fn close_expired_only_touches_due_bets() {
        let (svc, _rx) = service();
        let due = svc.create_bet(binary_bet(9, 10, &[50])).unwrap();
        let mut request = binary_bet(9, 10, &[50]);
        request.deadline = Utc::now() + Duration::days(3);
        let not_due = svc.create_bet(request).unwrap();

        let closed = svc.close_expired(later()).unwrap();
        assert_eq!(closed, vec![due.id]);
        assert_eq!(svc.get_bet(not_due.id).unwrap().status, BetStatus::Open);
    }

    #[test]
    fn votes_require_a_closed_bet_and_an_assigned_resolver() {
        let (svc, _rx) = service();
        let bet = svc.create_bet(binary_bet(9, 10, &[50])).unwrap();

        let err = svc
            .submit_vote(bet.id, UserId(50), VoteSelection::Outcome("YES".into()))
            .unwrap_err();
        assert_eq!(err.to_string(), format!("cannot vote on {} while it is OPEN", bet.id));

        svc.close_bet(bet.id, later()).unwrap();
        let err = svc
            .submit_vote(bet.id, UserId(51), VoteSelection::Outcome("YES".into()))
            .unwrap_err();
        assert!(matches!(err, Error::UnauthorizedResolver { .. }));
    }

    #[test]
    fn revote_replaces_when_enabled() {
        let cfg = SettlementConfig {
            allow_revote: true,
            ..Default::default()
        };
        let (svc, mut rx) = SettlementService::new(TestStore::default(), cfg);
        let bet = svc.create_bet(binary_bet(9, 10, &[50])).unwrap();
        svc.close_bet(bet.id, later()).unwrap();

        svc.submit_vote(bet.id, UserId(50), VoteSelection::Outcome("YES".into()))
            .unwrap();
        svc.submit_vote(bet.id, UserId(50), VoteSelection::Outcome("NO".into()))
            .unwrap();

        let votes = svc.votes(bet.id).unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].selection.outcome(), Some("NO"));

        let replaced: Vec<bool> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|ev| match ev {
                SettlementEvent::VoteSubmitted { replaced, .. } => Some(replaced),
                _ => None,
            })
            .collect();
        assert_eq!(replaced, vec![false, true]);
    }

    #[test]
    fn social_prediction_waits_for_fulfillment() {
        let (svc, mut rx) = service();
        let bet = svc
            .create_bet(prediction_bet(9, Stake::Social("a pizza".into()), &[50]))
            .unwrap();
        for (user, guess) in [(1, "2-1"), (2, "0-0")] {
            svc.place_bet(bet.id, UserId(user), Pick::Prediction(guess.into()))
                .unwrap();
        }
        svc.close_bet(bet.id, later()).unwrap();
        svc.submit_vote(bet.id, UserId(50), VoteSelection::Winners(users(&[1])))
            .unwrap();

        let receipt = match svc.try_resolve(bet.id).unwrap() {
            ResolutionAttempt::Resolved(receipt) => receipt,
            other => panic!("expected resolution, got {other:?}"),
        };
        assert!(receipt.ledger_entries.is_empty());
        assert_eq!(receipt.bet.fulfillment_status, Some(FulfillmentStatus::Pending));

        let err = svc.confirm_fulfillment(bet.id, UserId(2), None).unwrap_err();
        assert!(matches!(err, Error::NotAWinner { .. }));

        let summary = svc
            .confirm_fulfillment(bet.id, UserId(1), Some("  delivered  ".into()))
            .unwrap();
        assert_eq!(summary.status, FulfillmentStatus::Fulfilled);
        assert_eq!(
            svc.get_bet(bet.id).unwrap().fulfillment_status,
            Some(FulfillmentStatus::Fulfilled)
        );

        let kinds = drain(&mut rx);
        assert_eq!(kinds.last(), Some(&"bet_fulfilled"));
    }

    #[test]
    fn delete_requires_a_terminal_bet() {
        let (svc, _rx) = service();
        let bet = svc.create_bet(binary_bet(9, 10, &[50])).unwrap();
        assert!(matches!(
            svc.delete_bet(bet.id),
            Err(Error::InvalidStateTransition { .. })
        ));
        svc.cancel_bet(bet.id, "rained out").unwrap();
        svc.delete_bet(bet.id).unwrap();
        assert!(matches!(svc.get_bet(bet.id), Err(Error::BetNotFound(_))));
    }

    #[test]
    fn unknown_bet_is_not_found() {
        let (svc, _rx) = service();
        assert!(matches!(svc.try_resolve(BetId(404)), Err(Error::BetNotFound(BetId(404)))));
    }
}
