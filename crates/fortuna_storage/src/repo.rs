#![forbid(unsafe_code)]

use fortuna_contracts::account::{ProgressRecord, UserAccountRecord, UserId};
use fortuna_contracts::inventory::{
    ClaimOutcome, EntryId, InventoryEntryRecord,
};
use fortuna_contracts::ledger::{PaymentTokenRecord, TokenId};
use fortuna_contracts::prize::{OverrideRecord, PrizeId, ThresholdRule};
use fortuna_contracts::TimestampNs;

use crate::store::{GuaranteeMode, StorageError, WheelStore};

/// Typed repository interface over the payment-token table.
pub trait LedgerRepo {
    fn issue_token_row(
        &mut self,
        now: TimestampNs,
        token_id: TokenId,
        user_id: UserId,
    ) -> Result<PaymentTokenRecord, StorageError>;
    fn mark_paid_row(
        &mut self,
        now: TimestampNs,
        token_id: &TokenId,
        user_id: &UserId,
    ) -> Result<bool, StorageError>;
    fn claim_token_row(
        &mut self,
        token_id: &TokenId,
        user_id: &UserId,
    ) -> Result<(), StorageError>;
    fn token_row(&self, token_id: &TokenId) -> Option<&PaymentTokenRecord>;
}

/// Typed repository interface over the account + progress tables.
pub trait ProgressRepo {
    fn ensure_account_rows(
        &mut self,
        now: TimestampNs,
        user_id: &UserId,
    ) -> Result<(), StorageError>;
    fn account_row(&self, user_id: &UserId) -> Option<&UserAccountRecord>;
    fn progress_row(&self, user_id: &UserId) -> Option<&ProgressRecord>;
    fn advance_on_spend_rows(
        &mut self,
        user_id: &UserId,
        unit_price: u64,
        rules: &[ThresholdRule],
        mode: GuaranteeMode,
    ) -> Result<(), StorageError>;
    fn take_guaranteed_row(&mut self, user_id: &UserId) -> Result<Option<PrizeId>, StorageError>;
    fn clear_guarantees_row(&mut self, user_id: &UserId) -> Result<(), StorageError>;
}

/// Typed repository interface over the inventory table.
pub trait InventoryRepo {
    fn append_inventory_row(&mut self, record: InventoryEntryRecord) -> Result<(), StorageError>;
    fn inventory_row(&self, entry_id: &EntryId) -> Option<&InventoryEntryRecord>;
    fn inventory_row_for_token(&self, token_id: &TokenId) -> Option<&InventoryEntryRecord>;
    fn inventory_rows_for_user(&self, user_id: &UserId) -> Vec<InventoryEntryRecord>;
    fn request_claim_row(
        &mut self,
        now: TimestampNs,
        user_id: &UserId,
        entry_id: &EntryId,
        handle: &str,
    ) -> Result<InventoryEntryRecord, StorageError>;
    fn resolve_claim_row(
        &mut self,
        now: TimestampNs,
        entry_id: &EntryId,
        outcome: ClaimOutcome,
    ) -> Result<InventoryEntryRecord, StorageError>;
}

/// Typed repository interface over the override table.
pub trait OverrideRepo {
    fn upsert_override_row(&mut self, record: OverrideRecord) -> Result<(), StorageError>;
    fn override_row(&self, user_id: &UserId) -> Option<&OverrideRecord>;
}

impl LedgerRepo for WheelStore {
    fn issue_token_row(
        &mut self,
        now: TimestampNs,
        token_id: TokenId,
        user_id: UserId,
    ) -> Result<PaymentTokenRecord, StorageError> {
        self.issue_token(now, token_id, user_id)
    }

    fn mark_paid_row(
        &mut self,
        now: TimestampNs,
        token_id: &TokenId,
        user_id: &UserId,
    ) -> Result<bool, StorageError> {
        self.mark_paid(now, token_id, user_id)
    }

    fn claim_token_row(
        &mut self,
        token_id: &TokenId,
        user_id: &UserId,
    ) -> Result<(), StorageError> {
        self.claim_token(token_id, user_id)
    }

    fn token_row(&self, token_id: &TokenId) -> Option<&PaymentTokenRecord> {
        self.token(token_id)
    }
}

impl ProgressRepo for WheelStore {
    fn ensure_account_rows(
        &mut self,
        now: TimestampNs,
        user_id: &UserId,
    ) -> Result<(), StorageError> {
        self.ensure_account(now, user_id)
    }

    fn account_row(&self, user_id: &UserId) -> Option<&UserAccountRecord> {
        self.account(user_id)
    }

    fn progress_row(&self, user_id: &UserId) -> Option<&ProgressRecord> {
        self.progress(user_id)
    }

    fn advance_on_spend_rows(
        &mut self,
        user_id: &UserId,
        unit_price: u64,
        rules: &[ThresholdRule],
        mode: GuaranteeMode,
    ) -> Result<(), StorageError> {
        self.advance_on_spend(user_id, unit_price, rules, mode)
    }

    fn take_guaranteed_row(&mut self, user_id: &UserId) -> Result<Option<PrizeId>, StorageError> {
        self.take_guaranteed(user_id)
    }

    fn clear_guarantees_row(&mut self, user_id: &UserId) -> Result<(), StorageError> {
        self.clear_guarantees(user_id)
    }
}

impl InventoryRepo for WheelStore {
    fn append_inventory_row(&mut self, record: InventoryEntryRecord) -> Result<(), StorageError> {
        self.append_entry(record)
    }

    fn inventory_row(&self, entry_id: &EntryId) -> Option<&InventoryEntryRecord> {
        self.entry(entry_id)
    }

    fn inventory_row_for_token(&self, token_id: &TokenId) -> Option<&InventoryEntryRecord> {
        self.entry_for_token(token_id)
    }

    fn inventory_rows_for_user(&self, user_id: &UserId) -> Vec<InventoryEntryRecord> {
        self.entries_for_user(user_id)
    }

    fn request_claim_row(
        &mut self,
        now: TimestampNs,
        user_id: &UserId,
        entry_id: &EntryId,
        handle: &str,
    ) -> Result<InventoryEntryRecord, StorageError> {
        self.request_claim(now, user_id, entry_id, handle)
    }

    fn resolve_claim_row(
        &mut self,
        now: TimestampNs,
        entry_id: &EntryId,
        outcome: ClaimOutcome,
    ) -> Result<InventoryEntryRecord, StorageError> {
        self.resolve_claim(now, entry_id, outcome)
    }
}

impl OverrideRepo for WheelStore {
    fn upsert_override_row(&mut self, record: OverrideRecord) -> Result<(), StorageError> {
        self.upsert_override(record)
    }

    fn override_row(&self, user_id: &UserId) -> Option<&OverrideRecord> {
        self.override_for(user_id)
    }
}
