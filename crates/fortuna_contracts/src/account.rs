#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::common::validate_ascii_id;
use crate::prize::PrizeId;
use crate::{ContractViolation, SchemaVersion, TimestampNs, Validate};

pub const ACCOUNT_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for UserId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_ascii_id("user_id", &self.0, 64)
    }
}

/// Aggregate spend/award counters for one user.
///
/// `total_spent` is monotonically non-decreasing and moves only inside the
/// transaction that records a fresh payment confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccountRecord {
    pub schema_version: SchemaVersion,
    pub user_id: UserId,
    pub total_spent: u64,
    pub award_count: u64,
    pub created_at: TimestampNs,
}

impl UserAccountRecord {
    pub fn v1(user_id: UserId, created_at: TimestampNs) -> Self {
        Self {
            schema_version: ACCOUNT_CONTRACT_VERSION,
            user_id,
            total_spent: 0,
            award_count: 0,
            created_at,
        }
    }
}

impl Validate for UserAccountRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.user_id.validate()
    }
}

/// Per-user guarantee progression: one-shot threshold flags (keyed by the
/// rule's prize id) and the FIFO queue of owed prizes.
///
/// Privileged-tier users bypass this row's queue entirely; their payments
/// clear it and nothing re-enqueues on demotion (non-retroactive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub schema_version: SchemaVersion,
    pub user_id: UserId,
    pub fired_thresholds: BTreeSet<PrizeId>,
    pub guarantee_queue: Vec<PrizeId>,
}

impl ProgressRecord {
    pub fn v1(user_id: UserId) -> Self {
        Self {
            schema_version: ACCOUNT_CONTRACT_VERSION,
            user_id,
            fired_thresholds: BTreeSet::new(),
            guarantee_queue: Vec::new(),
        }
    }
}

impl Validate for ProgressRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.user_id.validate()?;
        for prize_id in &self.guarantee_queue {
            prize_id.validate()?;
        }
        Ok(())
    }
}
