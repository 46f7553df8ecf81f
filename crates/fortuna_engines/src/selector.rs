#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use rand::Rng;

use fortuna_contracts::prize::{PrizeCatalog, PrizeId, UserTier, WeightOverride};

/// Snapshot the coordinator hands the selector. Everything is read under
/// the allocation transaction; the selector itself touches no storage.
#[derive(Debug, Clone)]
pub struct SelectorInput<'a> {
    pub tier: UserTier,
    pub total_spent: u64,
    /// Head of the guarantee queue, already popped by the caller for
    /// standard-tier users. Ignored entirely for the privileged tier.
    pub guarantee_head: Option<PrizeId>,
    pub override_config: Option<&'a WeightOverride>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Delivered from the guarantee queue; no randomness was consulted.
    Guaranteed(PrizeId),
    Drawn(PrizeId),
}

impl Selection {
    pub fn prize_id(&self) -> &PrizeId {
        match self {
            Selection::Guaranteed(id) | Selection::Drawn(id) => id,
        }
    }
}

/// The fixed privileged-tier table. Rare sectors sit well above the common
/// prize; guarantees and spend gates do not apply.
pub fn privileged_weights(catalog: &PrizeCatalog) -> BTreeMap<PrizeId, f64> {
    catalog
        .sectors()
        .iter()
        .map(|s| (s.prize_id.clone(), f64::from(s.privileged_weight)))
        .collect()
}

fn base_weights_with_gates(
    catalog: &PrizeCatalog,
    gate_open: impl Fn(Option<u64>) -> bool,
) -> BTreeMap<PrizeId, f64> {
    let common = catalog.common_prize_id();
    let mut weights: BTreeMap<PrizeId, f64> = BTreeMap::new();
    let mut others_total: u32 = 0;
    for sector in catalog.sectors() {
        if &sector.prize_id == common {
            continue;
        }
        let weight = if gate_open(sector.spend_gate) {
            sector.base_weight
        } else {
            0
        };
        others_total = others_total.saturating_add(weight);
        weights.insert(sector.prize_id.clone(), f64::from(weight));
    }
    // Remainder weight for the common prize, floored at zero. A table
    // configured past 100 starves the common prize rather than failing.
    let common_weight = 100u32.saturating_sub(others_total);
    weights.insert(common.clone(), f64::from(common_weight));
    weights
}

/// Derives the weight table for a standard-tier draw: fixed base weights,
/// spend-gated entries closed until `total_spent` reaches their gate, the
/// common prize taking the floored remainder, and an enabled override
/// applied on top.
pub fn resolve_weights(
    catalog: &PrizeCatalog,
    total_spent: u64,
    override_config: Option<&WeightOverride>,
) -> BTreeMap<PrizeId, f64> {
    match override_config {
        Some(WeightOverride::FullWeights { table }) => table
            .iter()
            .map(|(prize_id, weight)| (prize_id.clone(), f64::from(*weight)))
            .collect(),
        Some(WeightOverride::Multipliers { factors, unlock_all }) => {
            let mut weights = if *unlock_all {
                base_weights_with_gates(catalog, |_| true)
            } else {
                base_weights_with_gates(catalog, |gate| {
                    gate.map_or(true, |amount| total_spent >= amount)
                })
            };
            for (prize_id, factor) in factors {
                if !(factor.is_finite() && *factor > 0.0) {
                    continue;
                }
                if let Some(weight) = weights.get_mut(prize_id) {
                    *weight *= factor;
                }
            }
            weights
        }
        Some(WeightOverride::NoOverride) | None => base_weights_with_gates(catalog, |gate| {
            gate.map_or(true, |amount| total_spent >= amount)
        }),
    }
}

/// Deterministic walk over the table in catalog key order: subtract each
/// positive weight from `draw` until the remainder is non-positive. A
/// non-positive entry can never be selected; when every entry is
/// non-positive the common prize wins outright. Never fails.
pub fn pick_by_weights(
    weights: &BTreeMap<PrizeId, f64>,
    draw: f64,
    common_prize_id: &PrizeId,
) -> PrizeId {
    let total: f64 = weights.values().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return common_prize_id.clone();
    }
    let mut remaining = draw;
    for (prize_id, weight) in weights {
        if *weight <= 0.0 {
            continue;
        }
        remaining -= weight;
        if remaining <= 0.0 {
            return prize_id.clone();
        }
    }
    common_prize_id.clone()
}

fn draw_from(
    weights: &BTreeMap<PrizeId, f64>,
    common_prize_id: &PrizeId,
    rng: &mut impl Rng,
) -> PrizeId {
    let total: f64 = weights.values().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return common_prize_id.clone();
    }
    let draw = rng.gen_range(0.0..total);
    pick_by_weights(weights, draw, common_prize_id)
}

/// The full selection algorithm of the allocation engine.
///
/// Privileged tier samples its fixed table, guarantees and thresholds do
/// not apply. A standard-tier guarantee head is returned as-is. Otherwise
/// the derived table is drawn from.
pub fn select_prize(
    catalog: &PrizeCatalog,
    input: &SelectorInput<'_>,
    rng: &mut impl Rng,
) -> Selection {
    let common = catalog.common_prize_id();
    match input.tier {
        UserTier::Privileged => {
            let weights = privileged_weights(catalog);
            Selection::Drawn(draw_from(&weights, common, rng))
        }
        UserTier::Standard => {
            if let Some(head) = &input.guarantee_head {
                return Selection::Guaranteed(head.clone());
            }
            let weights = resolve_weights(catalog, input.total_spent, input.override_config);
            Selection::Drawn(draw_from(&weights, common, rng))
        }
    }
}
