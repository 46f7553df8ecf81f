#![forbid(unsafe_code)]

use fortuna_contracts::account::UserId;
use fortuna_contracts::prize::{PrizeCatalog, PrizeId};
use fortuna_contracts::TimestampNs;
use fortuna_storage::repo::ProgressRepo;
use fortuna_storage::store::{GuaranteeMode, StorageError, WheelStore};

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn prize(id: &str) -> PrizeId {
    PrizeId::new(id).unwrap()
}

fn seeded(user_id: &UserId) -> WheelStore {
    let mut s = WheelStore::new_in_memory();
    s.ensure_account_rows(TimestampNs(1), user_id).unwrap();
    s
}

#[test]
fn at_progress_db_01_ensure_account_is_idempotent() {
    let u = user("user_1");
    let mut s = seeded(&u);
    let rules = PrizeCatalog::fixed_v1().threshold_rules();
    s.advance_on_spend_rows(&u, 250, &rules, GuaranteeMode::Enqueue).unwrap();

    // Re-running bootstrap must not reset counters or progress.
    s.ensure_account_rows(TimestampNs(2), &u).unwrap();
    assert_eq!(s.account_row(&u).unwrap().total_spent, 250);
    assert_eq!(s.account_row(&u).unwrap().award_count, 1);
}

#[test]
fn at_progress_db_02_advance_moves_spend_by_exactly_unit_price() {
    let u = user("user_1");
    let mut s = seeded(&u);
    let rules = PrizeCatalog::fixed_v1().threshold_rules();

    for _ in 0..5 {
        s.advance_on_spend_rows(&u, 100, &rules, GuaranteeMode::Enqueue).unwrap();
    }
    let account = s.account_row(&u).unwrap();
    assert_eq!(account.total_spent, 500);
    assert_eq!(account.award_count, 5);
}

#[test]
fn at_progress_db_03_single_purchase_crossing_many_thresholds_fires_all_in_priority_order() {
    let u = user("user_1");
    let mut s = seeded(&u);
    let rules = PrizeCatalog::fixed_v1().threshold_rules();

    s.advance_on_spend_rows(&u, 20_000, &rules, GuaranteeMode::Enqueue).unwrap();

    let progress = s.progress_row(&u).unwrap();
    assert_eq!(progress.fired_thresholds.len(), 4);
    assert_eq!(
        progress.guarantee_queue,
        vec![
            prize("prize_5"),
            prize("prize_4"),
            prize("prize_6"),
            prize("prize_3"),
        ]
    );
}

#[test]
fn at_progress_db_04_threshold_flags_never_refire() {
    let u = user("user_1");
    let mut s = seeded(&u);
    let rules = PrizeCatalog::fixed_v1().threshold_rules();

    s.advance_on_spend_rows(&u, 800, &rules, GuaranteeMode::Enqueue).unwrap();
    assert_eq!(s.progress_row(&u).unwrap().guarantee_queue, vec![prize("prize_3")]);

    // Spend stays above the threshold; the flag stays fired and the queue
    // does not grow for that rule.
    s.advance_on_spend_rows(&u, 100, &rules, GuaranteeMode::Enqueue).unwrap();
    s.advance_on_spend_rows(&u, 50, &rules, GuaranteeMode::Enqueue).unwrap();
    assert_eq!(
        s.progress_row(&u).unwrap().guarantee_queue,
        vec![prize("prize_3"), prize("prize_6")]
    );
    assert_eq!(s.account_row(&u).unwrap().total_spent, 950);
}

#[test]
fn at_progress_db_05_guarantee_queue_is_strictly_fifo() {
    let u = user("user_1");
    let mut s = seeded(&u);
    let rules = PrizeCatalog::fixed_v1().threshold_rules();

    s.advance_on_spend_rows(&u, 800, &rules, GuaranteeMode::Enqueue).unwrap();
    s.advance_on_spend_rows(&u, 200, &rules, GuaranteeMode::Enqueue).unwrap();
    assert_eq!(
        s.progress_row(&u).unwrap().guarantee_queue,
        vec![prize("prize_3"), prize("prize_6")]
    );

    assert_eq!(s.take_guaranteed_row(&u).unwrap(), Some(prize("prize_3")));
    assert_eq!(s.take_guaranteed_row(&u).unwrap(), Some(prize("prize_6")));
    assert_eq!(s.take_guaranteed_row(&u).unwrap(), None);
}

#[test]
fn at_progress_db_06_clear_guarantees_empties_queue_but_keeps_flags() {
    let u = user("user_1");
    let mut s = seeded(&u);
    let rules = PrizeCatalog::fixed_v1().threshold_rules();

    s.advance_on_spend_rows(&u, 1000, &rules, GuaranteeMode::Enqueue).unwrap();
    assert!(!s.progress_row(&u).unwrap().guarantee_queue.is_empty());

    s.clear_guarantees_row(&u).unwrap();
    let progress = s.progress_row(&u).unwrap();
    assert!(progress.guarantee_queue.is_empty());
    // Fired flags survive the clear: the thresholds must not re-fire and
    // re-fill the queue on later payments.
    assert_eq!(progress.fired_thresholds.len(), 2);

    s.advance_on_spend_rows(&u, 10, &rules, GuaranteeMode::Enqueue).unwrap();
    assert!(s.progress_row(&u).unwrap().guarantee_queue.is_empty());
}

#[test]
fn at_progress_db_07_suppress_mode_fires_flags_without_enqueueing() {
    let u = user("user_1");
    let mut s = seeded(&u);
    let rules = PrizeCatalog::fixed_v1().threshold_rules();

    s.advance_on_spend_rows(&u, 5000, &rules, GuaranteeMode::Suppress)
        .unwrap();
    let progress = s.progress_row(&u).unwrap();
    assert_eq!(progress.fired_thresholds.len(), 3);
    assert!(progress.guarantee_queue.is_empty());

    // Tier demotion: the suppressed thresholds stay consumed, so later
    // standard-tier payments owe nothing retroactively.
    s.advance_on_spend_rows(&u, 10, &rules, GuaranteeMode::Enqueue)
        .unwrap();
    assert!(s.progress_row(&u).unwrap().guarantee_queue.is_empty());
}

#[test]
fn at_progress_db_08_operations_require_bootstrapped_rows() {
    let mut s = WheelStore::new_in_memory();
    let u = user("user_1");
    let rules = PrizeCatalog::fixed_v1().threshold_rules();

    assert!(matches!(
        s.advance_on_spend_rows(&u, 100, &rules, GuaranteeMode::Enqueue),
        Err(StorageError::NotFound { table: "accounts", .. })
    ));
    assert!(matches!(
        s.take_guaranteed_row(&u),
        Err(StorageError::NotFound { table: "progress", .. })
    ));
    assert!(matches!(
        s.clear_guarantees_row(&u),
        Err(StorageError::NotFound { table: "progress", .. })
    ));
}
