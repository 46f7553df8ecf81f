#![forbid(unsafe_code)]

use rand::Rng;

use fortuna_contracts::account::UserId;
use fortuna_contracts::inventory::{
    ClaimOutcome, EntryId, InventoryEntryRecord,
};
use fortuna_contracts::ledger::TokenId;
use fortuna_contracts::prize::{
    OverrideRecord, PrizeCatalog, PrizeId, ThresholdRule, UserTier, WheelSector,
};
use fortuna_contracts::{ContractViolation, TimestampNs};
use fortuna_engines::ids;
use fortuna_engines::notify::MessagingCallError;
use fortuna_engines::selector::{self, SelectorInput};
use fortuna_storage::store::{GuaranteeMode, StorageError, WheelStore};

use crate::config::FortunaConfig;
use crate::ports::MessagingPort;

pub const INVOICE_TITLE: &str = "🎰 Lucky wheel spin";
pub const INVOICE_DESCRIPTION: &str = "One spin of the lucky wheel";
pub const INVOICE_PRICE_LABEL: &str = "Spin";

/// Caller-facing error taxonomy of the allocation engine.
///
/// `NotReady` is retryable after a delay; `AlreadyConsumed` and
/// `AlreadyProcessed` are terminal and the caller should fetch the existing
/// result; `WrongOwner` is an integrity violation and is never silently
/// absorbed. Every variant propagates only after the transaction rolled
/// back in full.
#[derive(Debug, Clone, PartialEq)]
pub enum AllocationError {
    NotReady,
    AlreadyConsumed,
    AlreadyProcessed,
    WrongOwner,
    NotFound,
    Contract(ContractViolation),
    Storage(StorageError),
    Messaging(MessagingCallError),
}

impl From<StorageError> for AllocationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotReady { .. } => AllocationError::NotReady,
            StorageError::AlreadyConsumed { .. } => AllocationError::AlreadyConsumed,
            StorageError::AlreadyProcessed { .. } => AllocationError::AlreadyProcessed,
            StorageError::WrongOwner { .. } => AllocationError::WrongOwner,
            StorageError::NotFound { .. } => AllocationError::NotFound,
            StorageError::ContractViolation(v) => AllocationError::Contract(v),
            other => AllocationError::Storage(other),
        }
    }
}

impl From<ContractViolation> for AllocationError {
    fn from(v: ContractViolation) -> Self {
        AllocationError::Contract(v)
    }
}

impl std::fmt::Display for AllocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotReady => write!(f, "payment not confirmed yet"),
            Self::AlreadyConsumed => write!(f, "token already consumed"),
            Self::AlreadyProcessed => write!(f, "entry already processed"),
            Self::WrongOwner => write!(f, "ownership mismatch"),
            Self::NotFound => write!(f, "not found"),
            Self::Contract(v) => write!(f, "contract violation: {v:?}"),
            Self::Storage(e) => write!(f, "storage error: {e:?}"),
            Self::Messaging(e) => write!(f, "messaging error: {e:?}"),
        }
    }
}

impl std::error::Error for AllocationError {}

#[derive(Debug, Clone, PartialEq)]
pub struct IssuedPaymentLink {
    pub token_id: TokenId,
    pub invoice_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentRecorded {
    /// Whether this confirmation caused the unpaid→paid transition. A
    /// redelivered confirmation reports `false` and had no side effects.
    pub fresh: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpinOutcome {
    pub entry: InventoryEntryRecord,
    /// Position of the awarded prize in the fixed wheel display order.
    pub segment_index: usize,
    /// True when the token was already consumed and this call returned the
    /// previously recorded outcome instead of drawing again.
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClaimRequested {
    pub entry: InventoryEntryRecord,
    /// Set when the operator notification failed after the commit. The
    /// lifecycle transition stands either way.
    pub notify_error: Option<MessagingCallError>,
}

/// Orchestrates the transactional spend-a-token → select-a-prize → record
/// flows over the store. Holds only immutable configuration; all state
/// lives in the store the caller passes in.
pub struct AllocationCoordinator {
    config: FortunaConfig,
    catalog: PrizeCatalog,
    rules: Vec<ThresholdRule>,
}

impl AllocationCoordinator {
    pub fn new(config: FortunaConfig) -> Self {
        let catalog = PrizeCatalog::fixed_v1();
        let rules = catalog.threshold_rules();
        Self {
            config,
            catalog,
            rules,
        }
    }

    pub fn config(&self) -> &FortunaConfig {
        &self.config
    }

    pub fn catalog(&self) -> &PrizeCatalog {
        &self.catalog
    }

    /// Issues an unpaid token and asks the platform for its invoice link.
    /// The token row commits before the network call; a failed platform
    /// call leaves a dangling unpaid token, which is harmless and
    /// unclaimable.
    pub fn issue_payment_link(
        &self,
        store: &mut WheelStore,
        messaging: &dyn MessagingPort,
        now: TimestampNs,
        user_id: &UserId,
    ) -> Result<IssuedPaymentLink, AllocationError> {
        let token_id = TokenId::new(format!(
            "spin:{}:{}",
            user_id.as_str(),
            ids::spin_nonce()
        ))?;
        store.transaction(|tx| {
            tx.ensure_account(now, user_id)?;
            tx.issue_token(now, token_id.clone(), user_id.clone())?;
            Ok::<(), AllocationError>(())
        })?;
        let invoice_url = messaging
            .create_invoice_link(&token_id, self.config.spin_price)
            .map_err(AllocationError::Messaging)?;
        Ok(IssuedPaymentLink {
            token_id,
            invoice_url,
        })
    }

    /// Applies one payment confirmation. Safe under redelivery: only the
    /// call that freshly marks the token paid advances spend and
    /// guarantees. Spend advances for every tier; the privileged tier
    /// suppresses guarantee enqueueing and clears anything already owed.
    pub fn record_payment(
        &self,
        store: &mut WheelStore,
        now: TimestampNs,
        token_id: &TokenId,
        user_id: &UserId,
        amount: u64,
    ) -> Result<PaymentRecorded, AllocationError> {
        let tier = self.config.tier_for(user_id);
        store.transaction(|tx| {
            tx.ensure_account(now, user_id)?;
            let fresh = tx.mark_paid(now, token_id, user_id)?;
            if fresh {
                match tier {
                    UserTier::Standard => {
                        tx.advance_on_spend(user_id, amount, &self.rules, GuaranteeMode::Enqueue)?;
                    }
                    UserTier::Privileged => {
                        tx.advance_on_spend(
                            user_id,
                            amount,
                            &self.rules,
                            GuaranteeMode::Suppress,
                        )?;
                        tx.clear_guarantees(user_id)?;
                    }
                }
            }
            Ok(PaymentRecorded { fresh })
        })
    }

    /// One atomic allocation: claim the token, select a prize under the
    /// same transaction, append the inventory entry, commit. A retried
    /// spin on a consumed token returns the previously recorded entry
    /// instead of creating a second one.
    pub fn spin(
        &self,
        store: &mut WheelStore,
        rng: &mut impl Rng,
        now: TimestampNs,
        user_id: &UserId,
        token_id: &TokenId,
    ) -> Result<SpinOutcome, AllocationError> {
        let tier = self.config.tier_for(user_id);
        store.transaction(|tx| {
            tx.ensure_account(now, user_id)?;
            match tx.claim_token(token_id, user_id) {
                Ok(()) => {}
                Err(StorageError::AlreadyConsumed { .. }) => {
                    let entry = tx
                        .entry_for_token(token_id)
                        .cloned()
                        .ok_or(AllocationError::AlreadyConsumed)?;
                    let segment_index = self.catalog.segment_index(&entry.prize_id);
                    return Ok(SpinOutcome {
                        entry,
                        segment_index,
                        replayed: true,
                    });
                }
                Err(err) => return Err(err.into()),
            }

            let guarantee_head = match tier {
                UserTier::Privileged => None,
                UserTier::Standard => tx.take_guaranteed(user_id)?,
            };
            let total_spent = tx
                .account(user_id)
                .map(|a| a.total_spent)
                .unwrap_or(0);
            let override_record = tx.override_for(user_id).cloned();
            let selection = selector::select_prize(
                &self.catalog,
                &SelectorInput {
                    tier,
                    total_spent,
                    guarantee_head,
                    override_config: override_record
                        .as_ref()
                        .and_then(OverrideRecord::active_config),
                },
                rng,
            );
            let sector = self.sector_or_common(selection.prize_id());

            let entry = InventoryEntryRecord::held_v1(
                EntryId::new(ids::entry_uid())?,
                user_id.clone(),
                sector.prize_id.clone(),
                sector.display_name.clone(),
                token_id.clone(),
                now,
            );
            tx.append_entry(entry.clone())?;
            Ok(SpinOutcome {
                segment_index: self.catalog.segment_index(&entry.prize_id),
                entry,
                replayed: false,
            })
        })
    }

    pub fn list_inventory(
        &self,
        store: &WheelStore,
        user_id: &UserId,
    ) -> Vec<InventoryEntryRecord> {
        store.entries_for_user(user_id)
    }

    /// `Held → Requested`, then the post-commit operator notification. A
    /// notification failure is reported alongside the committed entry, not
    /// rolled back.
    pub fn request_claim(
        &self,
        store: &mut WheelStore,
        messaging: &dyn MessagingPort,
        now: TimestampNs,
        user_id: &UserId,
        entry_id: &EntryId,
        handle: &str,
    ) -> Result<ClaimRequested, AllocationError> {
        let handle = normalize_handle(handle)?;
        let entry = store.transaction(|tx| {
            tx.request_claim(now, user_id, entry_id, &handle)
                .map_err(AllocationError::from)
        })?;
        let notify_error = messaging.notify_claim_requested(&entry, &handle).err();
        Ok(ClaimRequested {
            entry,
            notify_error,
        })
    }

    /// `Requested → Approved | Rejected`. The operator-channel edit happens
    /// at the adapter, after this commit.
    pub fn resolve_claim(
        &self,
        store: &mut WheelStore,
        now: TimestampNs,
        entry_id: &EntryId,
        outcome: ClaimOutcome,
    ) -> Result<InventoryEntryRecord, AllocationError> {
        store.transaction(|tx| {
            tx.resolve_claim(now, entry_id, outcome)
                .map_err(AllocationError::from)
        })
    }

    /// Admin surface: upsert the per-user weight override. Authentication
    /// happens at the adapter boundary.
    pub fn set_override(
        &self,
        store: &mut WheelStore,
        record: OverrideRecord,
    ) -> Result<(), AllocationError> {
        store.transaction(|tx| tx.upsert_override(record).map_err(AllocationError::from))
    }

    fn sector_or_common(&self, prize_id: &PrizeId) -> &WheelSector {
        self.catalog
            .sector(prize_id)
            .or_else(|| self.catalog.sector(self.catalog.common_prize_id()))
            .unwrap_or(&self.catalog.sectors()[0])
    }
}

fn normalize_handle(handle: &str) -> Result<String, ContractViolation> {
    let trimmed = handle.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(ContractViolation::InvalidValue {
            field: "claim.handle",
            reason: "must not be empty",
        });
    }
    Ok(trimmed.to_string())
}
