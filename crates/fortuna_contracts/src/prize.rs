#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::account::UserId;
use crate::common::validate_ascii_id;
use crate::{ContractViolation, SchemaVersion, Validate};

pub const PRIZE_CONTRACT_VERSION: SchemaVersion = SchemaVersion(1);

/// Stable identifier of one wheel sector.
///
/// Sector ids double as the fixed, deterministic key order for weighted
/// draws: `BTreeMap<PrizeId, _>` iterates them in catalog order.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PrizeId(String);

impl PrizeId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let v = Self(id.into());
        v.validate()?;
        Ok(v)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn known(id: &'static str) -> Self {
        Self(id.to_string())
    }
}

impl Validate for PrizeId {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_ascii_id("prize_id", &self.0, 32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserTier {
    Standard,
    Privileged,
}

/// One wheel sector: identity, operator-facing display name, base draw
/// weight, optional spend gate, and the privileged-table weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelSector {
    pub prize_id: PrizeId,
    pub display_name: String,
    /// Weight contributed to the base table once `spend_gate` is met.
    /// The common sector ignores this and takes the remainder instead.
    pub base_weight: u32,
    /// Minimum cumulative spend before `base_weight` applies. `None` means
    /// always open.
    pub spend_gate: Option<u64>,
    pub privileged_weight: u32,
}

/// A (prize, spend-amount) pair that enqueues a guaranteed prize the first
/// time cumulative spend reaches the amount. The one-shot flag is keyed by
/// the prize id in the owning progress row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub prize_id: PrizeId,
    pub amount: u64,
}

/// The fixed six-sector wheel, in display order. The display order is also
/// the `segment_index` contract with the rendering frontend.
#[derive(Debug, Clone, PartialEq)]
pub struct PrizeCatalog {
    sectors: Vec<WheelSector>,
    common_prize_id: PrizeId,
}

impl PrizeCatalog {
    pub fn fixed_v1() -> Self {
        let sector = |id: &'static str,
                      name: &str,
                      base_weight: u32,
                      spend_gate: Option<u64>,
                      privileged_weight: u32| WheelSector {
            prize_id: PrizeId::known(id),
            display_name: name.to_string(),
            base_weight,
            spend_gate,
            privileged_weight,
        };
        Self {
            sectors: vec![
                sector("prize_1", "Bear", 0, None, 8),
                sector("prize_2", "Rose", 15, None, 7),
                sector("prize_3", "Candy", 4, Some(800), 28),
                sector("prize_4", "Cigar", 1, Some(4500), 25),
                sector("prize_5", "Papakha", 0, Some(17_000), 5),
                sector("prize_6", "Button", 2, Some(1000), 27),
            ],
            common_prize_id: PrizeId::known("prize_1"),
        }
    }

    /// A catalog with operator-supplied sectors. The common prize must be
    /// one of the sectors; it takes the remainder weight in base tables.
    pub fn custom_v1(
        sectors: Vec<WheelSector>,
        common_prize_id: PrizeId,
    ) -> Result<Self, ContractViolation> {
        if sectors.is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "prize_catalog.sectors",
                reason: "must not be empty",
            });
        }
        for sector in &sectors {
            sector.prize_id.validate()?;
        }
        if !sectors.iter().any(|s| s.prize_id == common_prize_id) {
            return Err(ContractViolation::InvalidValue {
                field: "prize_catalog.common_prize_id",
                reason: "must name one of the sectors",
            });
        }
        Ok(Self {
            sectors,
            common_prize_id,
        })
    }

    pub fn sectors(&self) -> &[WheelSector] {
        &self.sectors
    }

    pub fn common_prize_id(&self) -> &PrizeId {
        &self.common_prize_id
    }

    pub fn sector(&self, prize_id: &PrizeId) -> Option<&WheelSector> {
        self.sectors.iter().find(|s| &s.prize_id == prize_id)
    }

    /// Display position of a prize on the wheel. Unknown ids map to the
    /// common sector's position, so a rendered outcome always lands on a
    /// real sector.
    pub fn segment_index(&self, prize_id: &PrizeId) -> usize {
        self.sectors
            .iter()
            .position(|s| &s.prize_id == prize_id)
            .unwrap_or(0)
    }

    /// Guarantee rules derived from the gated sectors, highest amount
    /// first. Rule priority only orders flag evaluation; every rule whose
    /// amount is met fires in the same update.
    pub fn threshold_rules(&self) -> Vec<ThresholdRule> {
        let mut rules: Vec<ThresholdRule> = self
            .sectors
            .iter()
            .filter_map(|s| {
                s.spend_gate.map(|amount| ThresholdRule {
                    prize_id: s.prize_id.clone(),
                    amount,
                })
            })
            .collect();
        rules.sort_by(|a, b| b.amount.cmp(&a.amount));
        rules
    }
}

/// Administrator-supplied weight tuning. Closed variant: the free-form
/// override payloads of the admin surface normalize into exactly one of
/// these shapes before they reach storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WeightOverride {
    NoOverride,
    /// Replaces the computed table entirely.
    FullWeights { table: BTreeMap<PrizeId, u32> },
    /// Scales individual computed entries by positive finite factors;
    /// `unlock_all` pre-opens spend-gated weights first, recomputing the
    /// common weight as the remainder.
    Multipliers {
        factors: BTreeMap<PrizeId, f64>,
        unlock_all: bool,
    },
}

impl Validate for WeightOverride {
    fn validate(&self) -> Result<(), ContractViolation> {
        match self {
            WeightOverride::NoOverride => Ok(()),
            WeightOverride::FullWeights { table } => {
                for prize_id in table.keys() {
                    prize_id.validate()?;
                }
                Ok(())
            }
            WeightOverride::Multipliers { factors, .. } => {
                for (prize_id, factor) in factors {
                    prize_id.validate()?;
                    if !factor.is_finite() {
                        return Err(ContractViolation::NotFinite {
                            field: "weight_override.factor",
                        });
                    }
                }
                Ok(())
            }
        }
    }
}

/// Per-user override row. Written only through the admin surface; the
/// allocation path reads it and never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub schema_version: SchemaVersion,
    pub user_id: UserId,
    pub enabled: bool,
    pub config: WeightOverride,
}

impl OverrideRecord {
    pub fn v1(user_id: UserId, enabled: bool, config: WeightOverride) -> Result<Self, ContractViolation> {
        let record = Self {
            schema_version: PRIZE_CONTRACT_VERSION,
            user_id,
            enabled,
            config,
        };
        record.validate()?;
        Ok(record)
    }

    /// The config the selector should apply, `None` when disabled or
    /// explicitly `NoOverride`.
    pub fn active_config(&self) -> Option<&WeightOverride> {
        if !self.enabled {
            return None;
        }
        match &self.config {
            WeightOverride::NoOverride => None,
            other => Some(other),
        }
    }
}

impl Validate for OverrideRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.user_id.validate()?;
        self.config.validate()
    }
}
