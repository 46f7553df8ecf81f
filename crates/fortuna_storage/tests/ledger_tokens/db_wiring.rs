#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::thread;

use fortuna_contracts::account::UserId;
use fortuna_contracts::ledger::TokenId;
use fortuna_contracts::TimestampNs;
use fortuna_storage::repo::LedgerRepo;
use fortuna_storage::store::{StorageError, WheelStore};

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn token(id: &str) -> TokenId {
    TokenId::new(id).unwrap()
}

#[test]
fn at_ledger_db_01_issue_is_idempotent_for_same_owner() {
    let mut s = WheelStore::new_in_memory();
    let u = user("user_1");
    let t = token("spin:user_1:aa11");

    let first = s
        .issue_token_row(TimestampNs(100), t.clone(), u.clone())
        .unwrap();
    assert!(!first.paid);
    assert!(!first.consumed);
    assert_eq!(first.created_at, TimestampNs(100));

    // Retried issuance returns the existing row, not a fresh one.
    let second = s
        .issue_token_row(TimestampNs(999), t.clone(), u)
        .unwrap();
    assert_eq!(second, first);
}

#[test]
fn at_ledger_db_02_issue_rejects_foreign_owner() {
    let mut s = WheelStore::new_in_memory();
    let t = token("spin:user_1:aa11");

    s.issue_token_row(TimestampNs(100), t.clone(), user("user_1"))
        .unwrap();
    let out = s.issue_token_row(TimestampNs(101), t, user("user_2"));
    assert!(matches!(
        out,
        Err(StorageError::WrongOwner { table: "tokens", .. })
    ));
}

#[test]
fn at_ledger_db_03_mark_paid_reports_fresh_transition_once() {
    let mut s = WheelStore::new_in_memory();
    let u = user("user_1");
    let t = token("spin:user_1:aa11");
    s.issue_token_row(TimestampNs(100), t.clone(), u.clone())
        .unwrap();

    assert!(s.mark_paid_row(TimestampNs(200), &t, &u).unwrap());
    // Redelivered confirmation: no fresh transition.
    assert!(!s.mark_paid_row(TimestampNs(201), &t, &u).unwrap());
    assert!(!s.mark_paid_row(TimestampNs(202), &t, &u).unwrap());

    let row = s.token_row(&t).unwrap();
    assert!(row.paid);
    assert_eq!(row.paid_at, Some(TimestampNs(200)));
}

#[test]
fn at_ledger_db_04_mark_paid_creates_row_when_confirmation_arrives_first() {
    let mut s = WheelStore::new_in_memory();
    let u = user("user_1");
    let t = token("spin:user_1:bb22");

    assert!(s.mark_paid_row(TimestampNs(300), &t, &u).unwrap());
    let row = s.token_row(&t).unwrap();
    assert!(row.paid);
    assert!(!row.consumed);

    // A late issuance retry is a no-op against the paid row.
    let issued = s.issue_token_row(TimestampNs(301), t.clone(), u).unwrap();
    assert!(issued.paid);
}

#[test]
fn at_ledger_db_05_claim_requires_paid() {
    let mut s = WheelStore::new_in_memory();
    let u = user("user_1");
    let t = token("spin:user_1:aa11");
    s.issue_token_row(TimestampNs(100), t.clone(), u.clone())
        .unwrap();

    let out = s.claim_token_row(&t, &u);
    assert!(matches!(out, Err(StorageError::NotReady { .. })));

    // The failed claim left the token unconsumed.
    assert!(!s.token_row(&t).unwrap().consumed);
}

#[test]
fn at_ledger_db_06_claim_succeeds_once_then_already_consumed() {
    let mut s = WheelStore::new_in_memory();
    let u = user("user_1");
    let t = token("spin:user_1:aa11");
    s.issue_token_row(TimestampNs(100), t.clone(), u.clone())
        .unwrap();
    s.mark_paid_row(TimestampNs(101), &t, &u).unwrap();

    s.claim_token_row(&t, &u).unwrap();
    let out = s.claim_token_row(&t, &u);
    assert!(matches!(out, Err(StorageError::AlreadyConsumed { .. })));
}

#[test]
fn at_ledger_db_07_claim_rejects_wrong_owner_and_unknown_token() {
    let mut s = WheelStore::new_in_memory();
    let u = user("user_1");
    let t = token("spin:user_1:aa11");
    s.issue_token_row(TimestampNs(100), t.clone(), u.clone())
        .unwrap();
    s.mark_paid_row(TimestampNs(101), &t, &u).unwrap();

    let foreign = s.claim_token_row(&t, &user("user_2"));
    assert!(matches!(
        foreign,
        Err(StorageError::WrongOwner { table: "tokens", .. })
    ));
    // Ownership violations must not consume the token.
    assert!(!s.token_row(&t).unwrap().consumed);

    let unknown = s.claim_token_row(&token("spin:user_1:zz99"), &u);
    assert!(matches!(unknown, Err(StorageError::NotFound { .. })));
}

#[test]
fn at_ledger_db_08_parallel_claims_exactly_one_success() {
    let u = user("user_1");
    let t = token("spin:user_1:aa11");

    let mut seed = WheelStore::new_in_memory();
    seed.issue_token_row(TimestampNs(100), t.clone(), u.clone())
        .unwrap();
    seed.mark_paid_row(TimestampNs(101), &t, &u).unwrap();
    let store = Arc::new(Mutex::new(seed));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = Arc::clone(&store);
        let t = t.clone();
        let u = u.clone();
        handles.push(thread::spawn(move || {
            let mut guard = store.lock().unwrap();
            guard
                .transaction(|tx| tx.claim_token_row(&t, &u))
                .is_ok()
        }));
    }

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(successes, 1);
    assert!(store.lock().unwrap().token_row(&t).unwrap().consumed);
}
