#![forbid(unsafe_code)]

use std::env;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};

use fortuna_contracts::account::UserId;
use fortuna_contracts::inventory::{EntryId, InventoryEntryRecord};
use fortuna_contracts::ledger::TokenId;
use fortuna_contracts::prize::{PrizeCatalog, PrizeId};
use fortuna_contracts::TimestampNs;
use fortuna_storage::repo::{InventoryRepo, LedgerRepo, ProgressRepo};
use fortuna_storage::store::{GuaranteeMode, StorageError, WheelStore};

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn token(id: &str) -> TokenId {
    TokenId::new(id).unwrap()
}

fn paid_store(user_id: &str, token_id: &str) -> WheelStore {
    let mut s = WheelStore::new_in_memory();
    let u = user(user_id);
    let t = token(token_id);
    s.ensure_account_rows(TimestampNs(1), &u).unwrap();
    s.issue_token_row(TimestampNs(2), t.clone(), u.clone())
        .unwrap();
    s.mark_paid_row(TimestampNs(3), &t, &u).unwrap();
    s
}

fn held_entry(entry: &str, user_id: &str, token_id: &str) -> InventoryEntryRecord {
    InventoryEntryRecord::held_v1(
        EntryId::new(entry).unwrap(),
        user(user_id),
        PrizeId::new("prize_2").unwrap(),
        "Rose".to_string(),
        token(token_id),
        TimestampNs(20),
    )
}

#[test]
fn at_tx_db_01_commit_applies_every_row_mutation() {
    let mut s = paid_store("user_1", "spin:user_1:aa11");
    let u = user("user_1");
    let t = token("spin:user_1:aa11");
    let rules = PrizeCatalog::fixed_v1().threshold_rules();

    s.transaction(|tx| {
        tx.claim_token_row(&t, &u)?;
        tx.advance_on_spend_rows(&u, 100, &rules, GuaranteeMode::Enqueue)?;
        tx.append_inventory_row(held_entry("e1", "user_1", "spin:user_1:aa11"))?;
        Ok::<(), StorageError>(())
    })
    .unwrap();

    assert!(s.token_row(&t).unwrap().consumed);
    assert_eq!(s.account_row(&u).unwrap().total_spent, 100);
    assert!(s.inventory_row(&EntryId::new("e1").unwrap()).is_some());
}

#[test]
fn at_tx_db_02_error_rolls_back_every_row_mutation() {
    let mut s = paid_store("user_1", "spin:user_1:aa11");
    let u = user("user_1");
    let t = token("spin:user_1:aa11");
    let rules = PrizeCatalog::fixed_v1().threshold_rules();

    let out = s.transaction(|tx| {
        tx.claim_token_row(&t, &u)?;
        tx.advance_on_spend_rows(&u, 100, &rules, GuaranteeMode::Enqueue)?;
        // A late duplicate forces the whole transaction down.
        tx.append_inventory_row(held_entry("e1", "user_1", "spin:user_1:aa11"))?;
        tx.append_inventory_row(held_entry("e1", "user_1", "spin:user_1:aa11"))?;
        Ok::<(), StorageError>(())
    });
    assert!(matches!(out, Err(StorageError::DuplicateKey { .. })));

    // Token claim, spend advance, and inventory insert are all-or-nothing.
    assert!(!s.token_row(&t).unwrap().consumed);
    assert_eq!(s.account_row(&u).unwrap().total_spent, 0);
    assert!(s.inventory_row(&EntryId::new("e1").unwrap()).is_none());
}

#[test]
fn at_tx_db_03_panic_inside_transaction_leaves_store_untouched() {
    let mut s = paid_store("user_1", "spin:user_1:aa11");
    let u = user("user_1");
    let t = token("spin:user_1:aa11");

    let unwound = catch_unwind(AssertUnwindSafe(|| {
        let _ = s.transaction(|tx| -> Result<(), StorageError> {
            tx.claim_token_row(&t, &u)?;
            panic!("simulated crash between claim and append");
        });
    }));
    assert!(unwound.is_err());
    assert!(!s.token_row(&t).unwrap().consumed);
}

#[test]
fn at_tx_db_04_claim_retry_after_commit_sees_already_consumed_and_prior_entry() {
    let mut s = paid_store("user_1", "spin:user_1:aa11");
    let u = user("user_1");
    let t = token("spin:user_1:aa11");

    s.transaction(|tx| {
        tx.claim_token_row(&t, &u)?;
        tx.append_inventory_row(held_entry("e1", "user_1", "spin:user_1:aa11"))?;
        Ok::<(), StorageError>(())
    })
    .unwrap();

    let retry = s.transaction(|tx| tx.claim_token_row(&t, &u));
    assert!(matches!(retry, Err(StorageError::AlreadyConsumed { .. })));
    assert_eq!(
        s.inventory_row_for_token(&t).unwrap().entry_id.as_str(),
        "e1"
    );
}

#[test]
fn at_tx_db_05_snapshot_round_trips_all_tables() {
    let mut s = paid_store("user_1", "spin:user_1:aa11");
    let u = user("user_1");
    let t = token("spin:user_1:aa11");
    let rules = PrizeCatalog::fixed_v1().threshold_rules();
    s.advance_on_spend_rows(&u, 900, &rules, GuaranteeMode::Enqueue).unwrap();
    s.claim_token_row(&t, &u).unwrap();
    s.append_inventory_row(held_entry("e1", "user_1", "spin:user_1:aa11"))
        .unwrap();

    let raw = s.to_snapshot_json().unwrap();
    let restored = WheelStore::from_snapshot_json(&raw).unwrap();

    assert_eq!(restored.account_row(&u).unwrap().total_spent, 900);
    assert_eq!(
        restored.progress_row(&u).unwrap().guarantee_queue,
        vec![PrizeId::new("prize_3").unwrap()]
    );
    assert!(restored.token_row(&t).unwrap().consumed);
    assert_eq!(
        restored
            .inventory_rows_for_user(&u)
            .first()
            .unwrap()
            .entry_id
            .as_str(),
        "e1"
    );
}

#[test]
fn at_tx_db_06_persist_and_load_via_tmp_rename() {
    let path = env::temp_dir().join(format!(
        "fortuna_tx_db_06_{}.json",
        std::process::id()
    ));
    let _ = fs::remove_file(&path);

    assert!(WheelStore::load_from_path(&path).unwrap().is_none());

    let s = paid_store("user_1", "spin:user_1:aa11");
    s.persist_to_path(&path).unwrap();

    let restored = WheelStore::load_from_path(&path).unwrap().unwrap();
    assert!(restored
        .token_row(&token("spin:user_1:aa11"))
        .unwrap()
        .paid);

    fs::remove_file(&path).unwrap();
}
