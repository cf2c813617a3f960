use std::collections::BTreeSet;

use chrono::{Duration, Utc};
use wagerline_core::testing::{binary_bet, multiple_choice_bet, prediction_bet, users};
use wagerline_core::{
    BetId, BetStatus, CorrelationId, Error, FulfillmentStatus, NewFulfillment, NewLedgerEntry,
    NewParticipation, NewVote, ParticipationOutcome, Pick, Posting, ResolutionAttempt,
    SettlementConfig, SettlementService, SettlementStore, Stake, TransactionKind, UserId,
    VoteSelection, verify_continuity,
};
use wagerline_store::WagerStore;

// ==================== Test Helpers ====================

fn store() -> WagerStore {
    WagerStore::open_in_memory().unwrap()
}

fn participation(bet_id: BetId, user: i64, pick: Pick) -> NewParticipation {
    NewParticipation {
        bet_id,
        user: UserId(user),
        pick,
        stake_amount: 10,
        created_at: Utc::now(),
    }
}

fn ledger_entry(user: i64, before: u64, after: u64, cid: CorrelationId) -> NewLedgerEntry {
    NewLedgerEntry {
        user: UserId(user),
        kind: TransactionKind::Credit,
        amount: after - before,
        reason: "DEPOSIT".into(),
        balance_before: before,
        balance_after: after,
        correlation_id: cid,
        bet_id: None,
        created_at: Utc::now(),
    }
}

// ==================== Bets ====================

#[test]
fn bet_round_trips_with_resolvers_and_options() {
    let mut store = store();
    let now = Utc::now();
    let request = multiple_choice_bet(7, 25, &["red", "green", "blue"], &[11, 12])
        .validate(now)
        .unwrap();

    let bet = store.insert_bet(&request, now).unwrap();
    assert_eq!(bet.status, BetStatus::Open);
    assert_eq!(bet.options, vec!["red", "green", "blue"]);
    assert_eq!(bet.resolvers, users(&[11, 12]));
    assert_eq!(bet.stake, Stake::Credit(25));

    let loaded = store.get_bet(bet.id).unwrap().unwrap();
    assert_eq!(loaded, bet);
    assert!(store.get_bet(BetId(999)).unwrap().is_none());
}

#[test]
fn social_stake_keeps_its_description() {
    let mut store = store();
    let now = Utc::now();
    let request = prediction_bet(7, Stake::Social("loser buys tacos".into()), &[11])
        .validate(now)
        .unwrap();
    let bet = store.insert_bet(&request, now).unwrap();
    assert_eq!(bet.stake, Stake::Social("loser buys tacos".into()));
    assert!(bet.options.is_empty());
}

#[test]
fn due_bets_are_listed_by_deadline() {
    let mut store = store();
    let now = Utc::now();
    let soon = store
        .insert_bet(&binary_bet(1, 5, &[11]).validate(now).unwrap(), now)
        .unwrap();
    let mut far = binary_bet(1, 5, &[11]);
    far.deadline = now + Duration::days(10);
    let far = store.insert_bet(&far.validate(now).unwrap(), now).unwrap();

    let due = store.list_open_bets_due(now + Duration::hours(2)).unwrap();
    assert_eq!(due.iter().map(|b| b.id).collect::<Vec<_>>(), vec![soon.id]);

    let mut closed = soon.clone();
    closed.status = BetStatus::Closed;
    assert!(store.update_bet_state(&closed).unwrap());
    let due = store.list_open_bets_due(now + Duration::days(30)).unwrap();
    assert!(due.iter().all(|b| b.id == far.id));
}

#[test]
fn lifecycle_fields_are_persisted() {
    let mut store = store();
    let now = Utc::now();
    let mut bet = store
        .insert_bet(&binary_bet(1, 5, &[11]).validate(now).unwrap(), now)
        .unwrap();
    bet.status = BetStatus::Resolved;
    bet.resolved_outcome = Some("YES".into());
    bet.fulfillment_status = Some(FulfillmentStatus::Fulfilled);
    bet.resolved_at = Some(now);
    store.update_bet_state(&bet).unwrap();

    let loaded = store.get_bet(bet.id).unwrap().unwrap();
    assert_eq!(loaded.status, BetStatus::Resolved);
    assert_eq!(loaded.resolved_outcome.as_deref(), Some("YES"));
    assert_eq!(loaded.fulfillment_status, Some(FulfillmentStatus::Fulfilled));
    assert!(loaded.resolved_at.is_some());
    assert!(loaded.cancelled_at.is_none());
}

// ==================== Uniqueness ====================

#[test]
fn duplicates_map_to_domain_errors() {
    let mut store = store();
    let now = Utc::now();
    let bet = store
        .insert_bet(&binary_bet(1, 10, &[11]).validate(now).unwrap(), now)
        .unwrap();

    let p = participation(bet.id, 2, Pick::Option("YES".into()));
    SettlementStore::insert_participation(&mut store, &p).unwrap();
    let err = SettlementStore::insert_participation(&mut store, &p).unwrap_err();
    assert!(matches!(err, Error::DuplicateParticipation { .. }));

    let vote = NewVote {
        bet_id: bet.id,
        resolver: UserId(11),
        selection: VoteSelection::Outcome("YES".into()),
        created_at: now,
    };
    SettlementStore::insert_vote(&mut store, &vote).unwrap();
    let err = SettlementStore::insert_vote(&mut store, &vote).unwrap_err();
    assert!(matches!(err, Error::DuplicateVote { .. }));

    let confirmation = NewFulfillment {
        bet_id: bet.id,
        winner: UserId(2),
        notes: None,
        confirmed_at: now,
    };
    SettlementStore::insert_fulfillment(&mut store, &confirmation).unwrap();
    let err = SettlementStore::insert_fulfillment(&mut store, &confirmation).unwrap_err();
    assert!(matches!(err, Error::DuplicateConfirmation { .. }));
}

#[test]
fn winner_set_votes_round_trip_and_can_be_replaced() {
    let mut store = store();
    let now = Utc::now();
    let bet = store
        .insert_bet(
            &prediction_bet(1, Stake::Credit(10), &[11, 12]).validate(now).unwrap(),
            now,
        )
        .unwrap();

    store
        .insert_vote(&NewVote {
            bet_id: bet.id,
            resolver: UserId(11),
            selection: VoteSelection::Winners(users(&[2, 3])),
            created_at: now,
        })
        .unwrap();
    store
        .insert_vote(&NewVote {
            bet_id: bet.id,
            resolver: UserId(12),
            selection: VoteSelection::Winners(BTreeSet::new()),
            created_at: now,
        })
        .unwrap();

    let votes = store.votes(bet.id).unwrap();
    assert_eq!(votes.len(), 2);
    assert_eq!(votes[0].selection, VoteSelection::Winners(users(&[2, 3])));
    assert_eq!(votes[1].selection, VoteSelection::Winners(BTreeSet::new()));

    assert!(store.delete_vote(bet.id, UserId(11)).unwrap());
    assert!(!store.delete_vote(bet.id, UserId(11)).unwrap());
    assert_eq!(store.votes(bet.id).unwrap().len(), 1);
}

// ==================== Atomicity ====================

#[test]
fn failed_unit_rolls_back_every_write() {
    let mut store = store();
    let now = Utc::now();
    let request = binary_bet(1, 10, &[11]).validate(now).unwrap();

    let result: wagerline_core::Result<()> = store.atomically(|s| {
        SettlementStore::insert_bet(s, &request, now)?;
        SettlementStore::set_balance(s, UserId(1), 500, now)?;
        Err(Error::InvalidAmount)
    });
    assert!(result.is_err());
    assert!(store.get_bet(BetId(1)).unwrap().is_none());
    assert_eq!(store.balance(UserId(1)).unwrap(), 0);

    let bet = store
        .atomically(|s| SettlementStore::insert_bet(s, &request, now))
        .unwrap();
    assert!(store.get_bet(bet.id).unwrap().is_some());
}

// ==================== Ledger ====================

#[test]
fn ledger_is_queryable_by_user_and_correlation() {
    let mut store = store();
    let cid = CorrelationId::random();
    store.append_ledger_entry(&ledger_entry(1, 0, 10, cid)).unwrap();
    store.append_ledger_entry(&ledger_entry(2, 0, 10, cid)).unwrap();
    store
        .append_ledger_entry(&ledger_entry(1, 10, 15, CorrelationId::random()))
        .unwrap();

    let by_cid = store.ledger_entries_by_correlation(&cid).unwrap();
    assert_eq!(by_cid.len(), 2);
    assert!(by_cid.iter().all(|e| e.correlation_id == cid));

    let user1 = store.ledger_entries_for_user(UserId(1)).unwrap();
    assert_eq!(user1.len(), 2);
    assert!(user1[0].id < user1[1].id);
    assert!(verify_continuity(&user1));
}

#[test]
fn balances_upsert() {
    let mut store = store();
    let now = Utc::now();
    assert_eq!(store.balance(UserId(4)).unwrap(), 0);
    store.set_balance(UserId(4), 40, now).unwrap();
    store.set_balance(UserId(4), 15, now).unwrap();
    assert_eq!(store.balance(UserId(4)).unwrap(), 15);
}

#[test]
fn deleting_a_bet_keeps_ledger_history() {
    let mut store = store();
    let now = Utc::now();
    let bet = store
        .insert_bet(&binary_bet(1, 10, &[11]).validate(now).unwrap(), now)
        .unwrap();
    store
        .insert_participation(&participation(bet.id, 2, Pick::Option("NO".into())))
        .unwrap();
    store
        .insert_vote(&NewVote {
            bet_id: bet.id,
            resolver: UserId(11),
            selection: VoteSelection::Outcome("NO".into()),
            created_at: now,
        })
        .unwrap();
    let mut entry = ledger_entry(2, 0, 10, CorrelationId::random());
    entry.bet_id = Some(bet.id);
    store.append_ledger_entry(&entry).unwrap();

    assert!(store.delete_bet(bet.id).unwrap());
    assert!(store.get_bet(bet.id).unwrap().is_none());
    assert!(store.participations(bet.id).unwrap().is_empty());
    assert!(store.votes(bet.id).unwrap().is_empty());
    assert_eq!(store.ledger_entries_for_user(UserId(2)).unwrap().len(), 1);
    assert!(!store.delete_bet(bet.id).unwrap());
}

// ==================== Service over SQLite ====================

#[test]
fn settlement_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wagerline.db");
    let path = path.to_str().unwrap();

    let bet_id = {
        let (svc, _rx) =
            SettlementService::new(WagerStore::open(path).unwrap(), SettlementConfig::default());
        for user in [1, 2, 3] {
            svc.record_transaction(&Posting {
                user: UserId(user),
                kind: TransactionKind::Credit,
                amount: 10,
                reason: "DEPOSIT".into(),
                correlation_id: CorrelationId::random(),
                bet_id: None,
            })
            .unwrap();
        }
        let bet = svc
            .create_bet(prediction_bet(9, Stake::Credit(10), &[11, 12]))
            .unwrap();
        for (user, guess) in [(1, "3-1"), (2, "1-1"), (3, "0-2")] {
            svc.place_bet(bet.id, UserId(user), Pick::Prediction(guess.into()))
                .unwrap();
        }
        svc.close_bet(bet.id, Utc::now() + Duration::hours(2)).unwrap();
        svc.submit_vote(bet.id, UserId(11), VoteSelection::Winners(users(&[1])))
            .unwrap();
        svc.submit_vote(bet.id, UserId(12), VoteSelection::Winners(users(&[1, 2])))
            .unwrap();
        let err = svc
            .submit_vote(bet.id, UserId(12), VoteSelection::Winners(users(&[2])))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateVote { .. }));

        match svc.try_resolve(bet.id).unwrap() {
            ResolutionAttempt::Resolved(receipt) => assert_eq!(receipt.winners, users(&[1])),
            other => panic!("expected resolution, got {other:?}"),
        }
        bet.id
    };

    let mut store = WagerStore::open(path).unwrap();
    let bet = store.get_bet(bet_id).unwrap().unwrap();
    assert_eq!(bet.status, BetStatus::Resolved);
    assert_eq!(bet.fulfillment_status, Some(FulfillmentStatus::Fulfilled));
    assert_eq!(store.balance(UserId(1)).unwrap(), 30);
    assert_eq!(store.balance(UserId(2)).unwrap(), 0);

    let outcomes: Vec<_> = store
        .participations(bet_id)
        .unwrap()
        .into_iter()
        .map(|p| p.outcome)
        .collect();
    assert_eq!(
        outcomes,
        vec![
            ParticipationOutcome::Won,
            ParticipationOutcome::Lost,
            ParticipationOutcome::Lost
        ]
    );

    let mut all = Vec::new();
    for user in [1, 2, 3] {
        all.extend(store.ledger_entries_for_user(UserId(user)).unwrap());
    }
    assert!(verify_continuity(&all));
}

#[test]
fn rolled_back_resolution_leaves_sqlite_untouched() {
    let (svc, _rx) = SettlementService::new(store(), SettlementConfig::default());
    for user in [1, 2] {
        svc.record_transaction(&Posting {
            user: UserId(user),
            kind: TransactionKind::Credit,
            amount: 10,
            reason: "DEPOSIT".into(),
            correlation_id: CorrelationId::random(),
            bet_id: None,
        })
        .unwrap();
    }
    let bet = svc.create_bet(binary_bet(9, 10, &[11])).unwrap();
    svc.place_bet(bet.id, UserId(1), Pick::Option("YES".into()))
        .unwrap();
    svc.place_bet(bet.id, UserId(2), Pick::Option("NO".into()))
        .unwrap();

    // An override naming an unknown option fails before anything is written.
    svc.close_bet(bet.id, Utc::now() + Duration::hours(2)).unwrap();
    let err = svc
        .resolve_with_override(bet.id, VoteSelection::Outcome("MAYBE".into()))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSelection(_)));
    assert_eq!(svc.get_bet(bet.id).unwrap().status, BetStatus::Closed);

    let receipt = svc.cancel_bet(bet.id, "resolver unavailable").unwrap();
    assert_eq!(receipt.refunds.len(), 2);
    assert_eq!(svc.balance(UserId(1)).unwrap(), 10);
    assert_eq!(svc.balance(UserId(2)).unwrap(), 10);
}
