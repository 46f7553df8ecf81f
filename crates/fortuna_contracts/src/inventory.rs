#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::account::UserId;
use crate::common::validate_ascii_id;
use crate::ledger::TokenId;
use crate::prize::PrizeId;
use crate::{ContractViolation, SchemaVersion, TimestampNs, Validate};

pub const INVENTORY_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for EntryId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_ascii_id("entry_id", &self.0, 64)
    }
}

/// Post-award lifecycle of an inventory entry.
///
/// `Held → Requested → Approved | Rejected`. Approved and Rejected are
/// terminal; every other transition attempt is rejected, and claim metadata
/// is never overwritten once submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Held,
    Requested,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Held => "held",
            ClaimStatus::Requested => "requested",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOutcome {
    Approved,
    Rejected,
}

/// One awarded prize. Created exactly once, by the allocation transaction
/// that consumed `source_token_id`; afterwards mutated only along the claim
/// state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntryRecord {
    pub schema_version: SchemaVersion,
    pub entry_id: EntryId,
    pub user_id: UserId,
    pub prize_id: PrizeId,
    pub prize_name: String,
    /// The payment token this entry settled. Backs idempotent spin retries:
    /// a replayed spin on a consumed token resolves to this entry.
    pub source_token_id: TokenId,
    pub won_at: TimestampNs,
    pub status: ClaimStatus,
    pub claim_handle: Option<String>,
    pub requested_at: Option<TimestampNs>,
    pub approved_at: Option<TimestampNs>,
    pub rejected_at: Option<TimestampNs>,
}

impl InventoryEntryRecord {
    pub fn held_v1(
        entry_id: EntryId,
        user_id: UserId,
        prize_id: PrizeId,
        prize_name: String,
        source_token_id: TokenId,
        won_at: TimestampNs,
    ) -> Self {
        Self {
            schema_version: INVENTORY_CONTRACT_VERSION,
            entry_id,
            user_id,
            prize_id,
            prize_name,
            source_token_id,
            won_at,
            status: ClaimStatus::Held,
            claim_handle: None,
            requested_at: None,
            approved_at: None,
            rejected_at: None,
        }
    }
}

impl Validate for InventoryEntryRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.entry_id.validate()?;
        self.user_id.validate()?;
        self.prize_id.validate()?;
        self.source_token_id.validate()?;
        if self.prize_name.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "inventory_entry.prize_name",
                reason: "must not be empty",
            });
        }
        if self.status == ClaimStatus::Held && self.claim_handle.is_some() {
            return Err(ContractViolation::InvalidValue {
                field: "inventory_entry.claim_handle",
                reason: "held entries carry no claim metadata",
            });
        }
        Ok(())
    }
}
