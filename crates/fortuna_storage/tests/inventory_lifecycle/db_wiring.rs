#![forbid(unsafe_code)]

use fortuna_contracts::account::UserId;
use fortuna_contracts::inventory::{
    ClaimOutcome, ClaimStatus, EntryId, InventoryEntryRecord,
};
use fortuna_contracts::ledger::TokenId;
use fortuna_contracts::prize::PrizeId;
use fortuna_contracts::TimestampNs;
use fortuna_storage::repo::{InventoryRepo, LedgerRepo};
use fortuna_storage::store::{StorageError, WheelStore};

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn token(id: &str) -> TokenId {
    TokenId::new(id).unwrap()
}

fn entry_record(entry: &str, user_id: &str, token_id: &str, won_at: u64) -> InventoryEntryRecord {
    InventoryEntryRecord::held_v1(
        EntryId::new(entry).unwrap(),
        user(user_id),
        PrizeId::new("prize_2").unwrap(),
        "Rose".to_string(),
        token(token_id),
        TimestampNs(won_at),
    )
}

/// Issues, pays, and consumes a token so an inventory append is legal.
fn settle_token(s: &mut WheelStore, user_id: &str, token_id: &str) {
    let u = user(user_id);
    let t = token(token_id);
    s.issue_token_row(TimestampNs(10), t.clone(), u.clone())
        .unwrap();
    s.mark_paid_row(TimestampNs(11), &t, &u).unwrap();
    s.claim_token_row(&t, &u).unwrap();
}

#[test]
fn at_inv_db_01_append_requires_consumed_token() {
    let mut s = WheelStore::new_in_memory();
    let u = user("user_1");
    let t = token("spin:user_1:aa11");

    // No token row at all.
    let orphan = s.append_inventory_row(entry_record("e1", "user_1", "spin:user_1:aa11", 20));
    assert!(matches!(
        orphan,
        Err(StorageError::ForeignKeyViolation { table: "inventory", .. })
    ));

    // Paid but not consumed.
    s.issue_token_row(TimestampNs(10), t.clone(), u.clone())
        .unwrap();
    s.mark_paid_row(TimestampNs(11), &t, &u).unwrap();
    let unconsumed = s.append_inventory_row(entry_record("e1", "user_1", "spin:user_1:aa11", 20));
    assert!(matches!(unconsumed, Err(StorageError::NotReady { .. })));

    s.claim_token_row(&t, &u).unwrap();
    s.append_inventory_row(entry_record("e1", "user_1", "spin:user_1:aa11", 20))
        .unwrap();
}

#[test]
fn at_inv_db_02_one_entry_per_token_and_unique_entry_ids() {
    let mut s = WheelStore::new_in_memory();
    settle_token(&mut s, "user_1", "spin:user_1:aa11");
    settle_token(&mut s, "user_1", "spin:user_1:bb22");

    s.append_inventory_row(entry_record("e1", "user_1", "spin:user_1:aa11", 20))
        .unwrap();

    let dup_entry = s.append_inventory_row(entry_record("e1", "user_1", "spin:user_1:bb22", 21));
    assert!(matches!(
        dup_entry,
        Err(StorageError::DuplicateKey { table: "inventory", .. })
    ));

    let dup_token = s.append_inventory_row(entry_record("e2", "user_1", "spin:user_1:aa11", 22));
    assert!(matches!(
        dup_token,
        Err(StorageError::DuplicateKey { table: "inventory", .. })
    ));

    assert_eq!(
        s.inventory_row_for_token(&token("spin:user_1:aa11"))
            .unwrap()
            .entry_id
            .as_str(),
        "e1"
    );
}

#[test]
fn at_inv_db_03_listing_is_oldest_first_per_user() {
    let mut s = WheelStore::new_in_memory();
    settle_token(&mut s, "user_1", "spin:user_1:aa11");
    settle_token(&mut s, "user_2", "spin:user_2:cc33");
    settle_token(&mut s, "user_1", "spin:user_1:bb22");

    s.append_inventory_row(entry_record("e1", "user_1", "spin:user_1:aa11", 20))
        .unwrap();
    s.append_inventory_row(entry_record("e2", "user_2", "spin:user_2:cc33", 21))
        .unwrap();
    s.append_inventory_row(entry_record("e3", "user_1", "spin:user_1:bb22", 22))
        .unwrap();

    let mine: Vec<String> = s
        .inventory_rows_for_user(&user("user_1"))
        .iter()
        .map(|e| e.entry_id.as_str().to_string())
        .collect();
    assert_eq!(mine, vec!["e1".to_string(), "e3".to_string()]);
}

#[test]
fn at_inv_db_04_claim_happy_paths() {
    let mut s = WheelStore::new_in_memory();
    settle_token(&mut s, "user_1", "spin:user_1:aa11");
    settle_token(&mut s, "user_1", "spin:user_1:bb22");
    s.append_inventory_row(entry_record("e1", "user_1", "spin:user_1:aa11", 20))
        .unwrap();
    s.append_inventory_row(entry_record("e2", "user_1", "spin:user_1:bb22", 21))
        .unwrap();

    let u = user("user_1");
    let requested = s
        .request_claim_row(TimestampNs(30), &u, &EntryId::new("e1").unwrap(), "alice")
        .unwrap();
    assert_eq!(requested.status, ClaimStatus::Requested);
    assert_eq!(requested.claim_handle.as_deref(), Some("alice"));
    assert_eq!(requested.requested_at, Some(TimestampNs(30)));

    let approved = s
        .resolve_claim_row(
            TimestampNs(40),
            &EntryId::new("e1").unwrap(),
            ClaimOutcome::Approved,
        )
        .unwrap();
    assert_eq!(approved.status, ClaimStatus::Approved);
    assert_eq!(approved.approved_at, Some(TimestampNs(40)));

    s.request_claim_row(TimestampNs(31), &u, &EntryId::new("e2").unwrap(), "alice")
        .unwrap();
    let rejected = s
        .resolve_claim_row(
            TimestampNs(41),
            &EntryId::new("e2").unwrap(),
            ClaimOutcome::Rejected,
        )
        .unwrap();
    assert_eq!(rejected.status, ClaimStatus::Rejected);
    assert_eq!(rejected.rejected_at, Some(TimestampNs(41)));
}

#[test]
fn at_inv_db_05_double_request_and_double_resolve_are_already_processed() {
    let mut s = WheelStore::new_in_memory();
    settle_token(&mut s, "user_1", "spin:user_1:aa11");
    s.append_inventory_row(entry_record("e1", "user_1", "spin:user_1:aa11", 20))
        .unwrap();
    let u = user("user_1");
    let e = EntryId::new("e1").unwrap();

    // Resolving a held entry is rejected.
    assert!(matches!(
        s.resolve_claim_row(TimestampNs(29), &e, ClaimOutcome::Approved),
        Err(StorageError::AlreadyProcessed { .. })
    ));

    s.request_claim_row(TimestampNs(30), &u, &e, "alice").unwrap();

    // A second request never overwrites the submitted metadata.
    assert!(matches!(
        s.request_claim_row(TimestampNs(31), &u, &e, "mallory"),
        Err(StorageError::AlreadyProcessed { .. })
    ));
    assert_eq!(
        s.inventory_row(&e).unwrap().claim_handle.as_deref(),
        Some("alice")
    );

    s.resolve_claim_row(TimestampNs(40), &e, ClaimOutcome::Approved)
        .unwrap();
    assert!(matches!(
        s.resolve_claim_row(TimestampNs(41), &e, ClaimOutcome::Rejected),
        Err(StorageError::AlreadyProcessed { .. })
    ));
    assert_eq!(s.inventory_row(&e).unwrap().status, ClaimStatus::Approved);
}

#[test]
fn at_inv_db_06_request_rejects_foreign_owner_and_blank_handle() {
    let mut s = WheelStore::new_in_memory();
    settle_token(&mut s, "user_1", "spin:user_1:aa11");
    s.append_inventory_row(entry_record("e1", "user_1", "spin:user_1:aa11", 20))
        .unwrap();
    let e = EntryId::new("e1").unwrap();

    assert!(matches!(
        s.request_claim_row(TimestampNs(30), &user("user_2"), &e, "mallory"),
        Err(StorageError::WrongOwner { table: "inventory", .. })
    ));
    assert!(matches!(
        s.request_claim_row(TimestampNs(30), &user("user_1"), &e, "   "),
        Err(StorageError::ContractViolation(_))
    ));
    assert_eq!(s.inventory_row(&e).unwrap().status, ClaimStatus::Held);
}
