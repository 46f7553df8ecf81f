#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::account::UserId;
use crate::common::validate_ascii_id;
use crate::{ContractViolation, SchemaVersion, TimestampNs, Validate};

pub const LEDGER_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Opaque identifier of one purchase attempt, issued with the payment link
/// (`spin:<user_id>:<nonce>`) and echoed back verbatim by the payment
/// platform's confirmation payload.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for TokenId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_ascii_id("token_id", &self.0, 128)
    }
}

/// Durable record of one payment token.
///
/// Lifecycle: issued unpaid, marked paid exactly once on confirmation,
/// marked consumed exactly once inside the allocation transaction. Never
/// consumed while unpaid, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTokenRecord {
    pub schema_version: SchemaVersion,
    pub token_id: TokenId,
    pub user_id: UserId,
    pub paid: bool,
    pub consumed: bool,
    pub created_at: TimestampNs,
    pub paid_at: Option<TimestampNs>,
}

impl PaymentTokenRecord {
    pub fn issued_v1(token_id: TokenId, user_id: UserId, created_at: TimestampNs) -> Self {
        Self {
            schema_version: LEDGER_CONTRACT_VERSION,
            token_id,
            user_id,
            paid: false,
            consumed: false,
            created_at,
            paid_at: None,
        }
    }
}

impl Validate for PaymentTokenRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.token_id.validate()?;
        self.user_id.validate()?;
        if self.consumed && !self.paid {
            return Err(ContractViolation::InvalidValue {
                field: "payment_token.consumed",
                reason: "token cannot be consumed while unpaid",
            });
        }
        Ok(())
    }
}
