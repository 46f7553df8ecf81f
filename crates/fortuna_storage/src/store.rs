#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use fortuna_contracts::account::{ProgressRecord, UserAccountRecord, UserId};
use fortuna_contracts::inventory::{
    ClaimOutcome, ClaimStatus, EntryId, InventoryEntryRecord,
};
use fortuna_contracts::ledger::{PaymentTokenRecord, TokenId};
use fortuna_contracts::prize::{OverrideRecord, PrizeId, ThresholdRule};
use fortuna_contracts::{ContractViolation, TimestampNs, Validate};

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    NotFound { table: &'static str, key: String },
    DuplicateKey { table: &'static str, key: String },
    ForeignKeyViolation { table: &'static str, key: String },
    WrongOwner { table: &'static str, key: String },
    /// Token exists but is not paid yet; the caller may retry later.
    NotReady { token_id: String },
    /// Token was already consumed by a committed allocation.
    AlreadyConsumed { token_id: String },
    /// Inventory entry is past the state the transition requires.
    AlreadyProcessed { entry_id: String },
    ContractViolation(ContractViolation),
    SnapshotIo { detail: String },
    SnapshotCodec { detail: String },
}

impl From<ContractViolation> for StorageError {
    fn from(v: ContractViolation) -> Self {
        StorageError::ContractViolation(v)
    }
}

/// What a crossed threshold does to the guarantee queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuaranteeMode {
    /// Standard tier: a crossed threshold enqueues its prize.
    Enqueue,
    /// Privileged tier: a crossed threshold marks its one-shot flag fired
    /// without enqueueing. A later tier demotion therefore finds nothing
    /// owed (non-retroactive).
    Suppress,
}

/// The four logical tables of the allocation engine, plus the indexes the
/// hot paths need. All mutation goes through row-level methods that enforce
/// the ledger/progress/lifecycle invariants; multi-row atomicity comes from
/// [`WheelStore::transaction`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WheelStore {
    tokens: BTreeMap<TokenId, PaymentTokenRecord>,
    accounts: BTreeMap<UserId, UserAccountRecord>,
    progress: BTreeMap<UserId, ProgressRecord>,
    inventory: BTreeMap<EntryId, InventoryEntryRecord>,
    /// Append order of inventory entries; `list` surfaces oldest first.
    inventory_order: Vec<EntryId>,
    /// One entry per consumed token. Backs idempotent spin replays.
    entry_by_token: BTreeMap<TokenId, EntryId>,
    overrides: BTreeMap<UserId, OverrideRecord>,
}

impl WheelStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    /// Runs `f` against a scratch copy of the tables. The live tables
    /// change only when `f` returns `Ok`; an `Err` or a panic unwinding
    /// through the scope leaves the store exactly as it was.
    pub fn transaction<T, E>(
        &mut self,
        f: impl FnOnce(&mut WheelStore) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut scratch = self.clone();
        let out = f(&mut scratch)?;
        *self = scratch;
        Ok(out)
    }

    // ------------------------
    // Ledger (payment tokens).
    // ------------------------

    /// Creates an unpaid, unconsumed token. Re-issuing the same id for the
    /// same user is an idempotent no-op returning the existing row
    /// (at-least-once delivery upstream); the same id for another user is
    /// an ownership violation.
    pub fn issue_token(
        &mut self,
        now: TimestampNs,
        token_id: TokenId,
        user_id: UserId,
    ) -> Result<PaymentTokenRecord, StorageError> {
        token_id.validate()?;
        user_id.validate()?;
        if let Some(existing) = self.tokens.get(&token_id) {
            if existing.user_id != user_id {
                return Err(StorageError::WrongOwner {
                    table: "tokens",
                    key: token_id.as_str().to_string(),
                });
            }
            return Ok(existing.clone());
        }
        let record = PaymentTokenRecord::issued_v1(token_id.clone(), user_id, now);
        record.validate()?;
        self.tokens.insert(token_id, record.clone());
        Ok(record)
    }

    /// Marks a token paid. Returns whether THIS call caused the
    /// unpaid→paid transition, so the caller knows whether to run the
    /// spend/progress side effects. A confirmation for a token with no
    /// issuance row creates the row as paid: the platform is the source of
    /// truth for payment and may deliver before the issuance record lands.
    pub fn mark_paid(
        &mut self,
        now: TimestampNs,
        token_id: &TokenId,
        user_id: &UserId,
    ) -> Result<bool, StorageError> {
        token_id.validate()?;
        user_id.validate()?;
        match self.tokens.get_mut(token_id) {
            None => {
                let mut record =
                    PaymentTokenRecord::issued_v1(token_id.clone(), user_id.clone(), now);
                record.paid = true;
                record.paid_at = Some(now);
                self.tokens.insert(token_id.clone(), record);
                Ok(true)
            }
            Some(record) => {
                if &record.user_id != user_id {
                    return Err(StorageError::WrongOwner {
                        table: "tokens",
                        key: token_id.as_str().to_string(),
                    });
                }
                if record.paid {
                    return Ok(false);
                }
                record.paid = true;
                record.paid_at = Some(now);
                Ok(true)
            }
        }
    }

    /// Single conditional update: consumes the token iff it is paid and not
    /// yet consumed. Under concurrent callers exactly one claim succeeds;
    /// the rest observe `AlreadyConsumed`.
    pub fn claim_token(
        &mut self,
        token_id: &TokenId,
        user_id: &UserId,
    ) -> Result<(), StorageError> {
        let record = self
            .tokens
            .get_mut(token_id)
            .ok_or_else(|| StorageError::NotFound {
                table: "tokens",
                key: token_id.as_str().to_string(),
            })?;
        if &record.user_id != user_id {
            return Err(StorageError::WrongOwner {
                table: "tokens",
                key: token_id.as_str().to_string(),
            });
        }
        if record.consumed {
            return Err(StorageError::AlreadyConsumed {
                token_id: token_id.as_str().to_string(),
            });
        }
        if !record.paid {
            return Err(StorageError::NotReady {
                token_id: token_id.as_str().to_string(),
            });
        }
        record.consumed = true;
        Ok(())
    }

    pub fn token(&self, token_id: &TokenId) -> Option<&PaymentTokenRecord> {
        self.tokens.get(token_id)
    }

    // ------------------------
    // Accounts + progress.
    // ------------------------

    /// Idempotent row bootstrap for a user's account and progress rows.
    pub fn ensure_account(
        &mut self,
        now: TimestampNs,
        user_id: &UserId,
    ) -> Result<(), StorageError> {
        user_id.validate()?;
        self.accounts
            .entry(user_id.clone())
            .or_insert_with(|| UserAccountRecord::v1(user_id.clone(), now));
        self.progress
            .entry(user_id.clone())
            .or_insert_with(|| ProgressRecord::v1(user_id.clone()));
        Ok(())
    }

    pub fn account(&self, user_id: &UserId) -> Option<&UserAccountRecord> {
        self.accounts.get(user_id)
    }

    pub fn progress(&self, user_id: &UserId) -> Option<&ProgressRecord> {
        self.progress.get(user_id)
    }

    /// Advances spend and award counters, then evaluates the threshold
    /// rules in the given priority order against the new cumulative spend.
    /// Every unfired rule whose amount is now met fires its one-shot flag
    /// and, in `Enqueue` mode, appends its prize to the guarantee queue
    /// tail, all in this one update. A fired flag never re-fires.
    pub fn advance_on_spend(
        &mut self,
        user_id: &UserId,
        unit_price: u64,
        rules: &[ThresholdRule],
        mode: GuaranteeMode,
    ) -> Result<(), StorageError> {
        let account = self
            .accounts
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound {
                table: "accounts",
                key: user_id.as_str().to_string(),
            })?;
        account.total_spent = account.total_spent.saturating_add(unit_price);
        account.award_count = account.award_count.saturating_add(1);
        let total_spent = account.total_spent;

        let progress = self
            .progress
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound {
                table: "progress",
                key: user_id.as_str().to_string(),
            })?;
        for rule in rules {
            if total_spent >= rule.amount && !progress.fired_thresholds.contains(&rule.prize_id)
            {
                progress.fired_thresholds.insert(rule.prize_id.clone());
                if mode == GuaranteeMode::Enqueue {
                    progress.guarantee_queue.push(rule.prize_id.clone());
                }
            }
        }
        Ok(())
    }

    /// Pops the guarantee queue head (FIFO). `None` when the queue is
    /// empty.
    pub fn take_guaranteed(
        &mut self,
        user_id: &UserId,
    ) -> Result<Option<PrizeId>, StorageError> {
        let progress = self
            .progress
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound {
                table: "progress",
                key: user_id.as_str().to_string(),
            })?;
        if progress.guarantee_queue.is_empty() {
            return Ok(None);
        }
        Ok(Some(progress.guarantee_queue.remove(0)))
    }

    /// Empties the guarantee queue. Privileged-tier payments call this:
    /// tier privilege and guarantees are mutually exclusive, and the queue
    /// is not rebuilt if the tier is later revoked.
    pub fn clear_guarantees(&mut self, user_id: &UserId) -> Result<(), StorageError> {
        let progress = self
            .progress
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound {
                table: "progress",
                key: user_id.as_str().to_string(),
            })?;
        progress.guarantee_queue.clear();
        Ok(())
    }

    // ------------------------
    // Overrides.
    // ------------------------

    pub fn upsert_override(&mut self, record: OverrideRecord) -> Result<(), StorageError> {
        record.validate()?;
        self.overrides.insert(record.user_id.clone(), record);
        Ok(())
    }

    pub fn override_for(&self, user_id: &UserId) -> Option<&OverrideRecord> {
        self.overrides.get(user_id)
    }

    // ------------------------
    // Inventory (append + lifecycle).
    // ------------------------

    /// Appends a freshly awarded entry. The source token must exist and be
    /// consumed, and can settle at most one entry.
    pub fn append_entry(
        &mut self,
        record: InventoryEntryRecord,
    ) -> Result<(), StorageError> {
        record.validate()?;
        if self.inventory.contains_key(&record.entry_id) {
            return Err(StorageError::DuplicateKey {
                table: "inventory",
                key: record.entry_id.as_str().to_string(),
            });
        }
        match self.tokens.get(&record.source_token_id) {
            Some(token) if token.consumed => {}
            Some(_) => {
                return Err(StorageError::NotReady {
                    token_id: record.source_token_id.as_str().to_string(),
                })
            }
            None => {
                return Err(StorageError::ForeignKeyViolation {
                    table: "inventory",
                    key: record.source_token_id.as_str().to_string(),
                })
            }
        }
        if self.entry_by_token.contains_key(&record.source_token_id) {
            return Err(StorageError::DuplicateKey {
                table: "inventory",
                key: record.source_token_id.as_str().to_string(),
            });
        }
        self.entry_by_token
            .insert(record.source_token_id.clone(), record.entry_id.clone());
        self.inventory_order.push(record.entry_id.clone());
        self.inventory.insert(record.entry_id.clone(), record);
        Ok(())
    }

    pub fn entry(&self, entry_id: &EntryId) -> Option<&InventoryEntryRecord> {
        self.inventory.get(entry_id)
    }

    /// The entry settled by a token, if the allocation committed.
    pub fn entry_for_token(
        &self,
        token_id: &TokenId,
    ) -> Option<&InventoryEntryRecord> {
        self.entry_by_token
            .get(token_id)
            .and_then(|entry_id| self.inventory.get(entry_id))
    }

    /// All entries of one user, oldest first.
    pub fn entries_for_user(&self, user_id: &UserId) -> Vec<InventoryEntryRecord> {
        self.inventory_order
            .iter()
            .filter_map(|entry_id| self.inventory.get(entry_id))
            .filter(|entry| &entry.user_id == user_id)
            .cloned()
            .collect()
    }

    /// `Held → Requested`, recording the delivery handle. Claim metadata is
    /// written once; any entry past `Held` rejects the transition.
    pub fn request_claim(
        &mut self,
        now: TimestampNs,
        user_id: &UserId,
        entry_id: &EntryId,
        handle: &str,
    ) -> Result<InventoryEntryRecord, StorageError> {
        if handle.trim().is_empty() {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "claim.handle",
                    reason: "must not be empty",
                },
            ));
        }
        let entry = self
            .inventory
            .get_mut(entry_id)
            .ok_or_else(|| StorageError::NotFound {
                table: "inventory",
                key: entry_id.as_str().to_string(),
            })?;
        if &entry.user_id != user_id {
            return Err(StorageError::WrongOwner {
                table: "inventory",
                key: entry_id.as_str().to_string(),
            });
        }
        if entry.status != ClaimStatus::Held {
            return Err(StorageError::AlreadyProcessed {
                entry_id: entry_id.as_str().to_string(),
            });
        }
        entry.status = ClaimStatus::Requested;
        entry.claim_handle = Some(handle.trim().to_string());
        entry.requested_at = Some(now);
        Ok(entry.clone())
    }

    /// `Requested → Approved | Rejected`. Terminal states never move
    /// again; resolving a non-requested entry is `AlreadyProcessed`.
    pub fn resolve_claim(
        &mut self,
        now: TimestampNs,
        entry_id: &EntryId,
        outcome: ClaimOutcome,
    ) -> Result<InventoryEntryRecord, StorageError> {
        let entry = self
            .inventory
            .get_mut(entry_id)
            .ok_or_else(|| StorageError::NotFound {
                table: "inventory",
                key: entry_id.as_str().to_string(),
            })?;
        if entry.status != ClaimStatus::Requested {
            return Err(StorageError::AlreadyProcessed {
                entry_id: entry_id.as_str().to_string(),
            });
        }
        match outcome {
            ClaimOutcome::Approved => {
                entry.status = ClaimStatus::Approved;
                entry.approved_at = Some(now);
            }
            ClaimOutcome::Rejected => {
                entry.status = ClaimStatus::Rejected;
                entry.rejected_at = Some(now);
            }
        }
        Ok(entry.clone())
    }

    // ------------------------
    // Snapshot persistence.
    // ------------------------

    pub fn to_snapshot_json(&self) -> Result<String, StorageError> {
        serde_json::to_string_pretty(self).map_err(|err| StorageError::SnapshotCodec {
            detail: err.to_string(),
        })
    }

    pub fn from_snapshot_json(raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(|err| StorageError::SnapshotCodec {
            detail: err.to_string(),
        })
    }

    /// Writes the snapshot via tmp+rename so a crash mid-write never
    /// truncates the previous durable state.
    pub fn persist_to_path(&self, path: &Path) -> Result<(), StorageError> {
        let serialized = self.to_snapshot_json()?;
        let mut tmp = path.to_path_buf();
        tmp.set_extension("tmp");
        fs::write(&tmp, serialized.as_bytes()).map_err(|err| StorageError::SnapshotIo {
            detail: format!("{}: {err}", tmp.display()),
        })?;
        fs::rename(&tmp, path).map_err(|err| StorageError::SnapshotIo {
            detail: format!("{}: {err}", path.display()),
        })
    }

    /// Loads a snapshot if one exists; `Ok(None)` on first boot.
    pub fn load_from_path(path: &Path) -> Result<Option<Self>, StorageError> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Some(Self::from_snapshot_json(&raw)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::SnapshotIo {
                detail: format!("{}: {err}", path.display()),
            }),
        }
    }
}
