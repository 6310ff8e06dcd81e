//! Usage ⟕ price list ⟕ unit factors.
//!
//! Every usage line survives the join. Reference relations are indexed once
//! into hash maps keyed by borrowed column values, so the join allocates only
//! the output rows.

use std::collections::HashMap;

use audit_core::models::{JoinedCostRecord, PriceListEntry, UnitConversionFactor, UsageRecord};
use audit_core::nullable::safe_divide;
use tracing::{debug, warn};

// ── Price index ───────────────────────────────────────────────────────────────

/// `(product_code, product_name, pricing_term, pricing_unit, instance_type)`.
///
/// The first four columns must be non-null to participate in a match; a null
/// `instance_type` matches only a null `instance_type`.
type PriceKey<'a> = (&'a str, &'a str, &'a str, &'a str, Option<&'a str>);

/// Hash index over the price list. Duplicate keys keep the first entry.
pub struct PriceIndex<'a> {
    prices: HashMap<PriceKey<'a>, Option<f64>>,
    duplicates: usize,
}

impl<'a> PriceIndex<'a> {
    pub fn build(entries: &'a [PriceListEntry]) -> Self {
        let mut prices = HashMap::with_capacity(entries.len());
        let mut duplicates = 0;
        for entry in entries {
            let Some(key) = price_key(
                entry.product_code.as_deref(),
                entry.product_name.as_deref(),
                entry.pricing_term.as_deref(),
                entry.pricing_unit.as_deref(),
                entry.instance_type.as_deref(),
            ) else {
                continue;
            };
            if prices.contains_key(&key) {
                duplicates += 1;
                continue;
            }
            prices.insert(key, entry.precio_lista);
        }
        Self { prices, duplicates }
    }

    /// List price for a usage line, `None` when no entry matches or the
    /// matching entry carries no price.
    pub fn lookup(&self, usage: &UsageRecord) -> Option<f64> {
        let key = price_key(
            usage.product_code.as_deref(),
            usage.product_name.as_deref(),
            usage.pricing_term.as_deref(),
            usage.pricing_unit.as_deref(),
            usage.instance_type.as_deref(),
        )?;
        self.prices.get(&key).copied().flatten()
    }

    /// Number of price entries shadowed by an earlier entry with the same key.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

fn price_key<'a>(
    product_code: Option<&'a str>,
    product_name: Option<&'a str>,
    pricing_term: Option<&'a str>,
    pricing_unit: Option<&'a str>,
    instance_type: Option<&'a str>,
) -> Option<PriceKey<'a>> {
    Some((
        product_code?,
        product_name?,
        pricing_term?,
        pricing_unit?,
        instance_type,
    ))
}

// ── Unit factor index ─────────────────────────────────────────────────────────

/// Hash index over unit factors keyed by `pricing_unit`. Duplicate units keep
/// the first entry; null units never match.
pub struct UnitFactorIndex<'a> {
    factors: HashMap<&'a str, Option<f64>>,
    duplicates: usize,
}

impl<'a> UnitFactorIndex<'a> {
    pub fn build(entries: &'a [UnitConversionFactor]) -> Self {
        let mut factors = HashMap::with_capacity(entries.len());
        let mut duplicates = 0;
        for entry in entries {
            let Some(unit) = entry.pricing_unit.as_deref() else {
                continue;
            };
            if factors.contains_key(unit) {
                duplicates += 1;
                continue;
            }
            factors.insert(unit, entry.unidad_factor);
        }
        Self {
            factors,
            duplicates,
        }
    }

    pub fn lookup(&self, pricing_unit: Option<&str>) -> Option<f64> {
        self.factors.get(pricing_unit?).copied().flatten()
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

// ── UsagePriceJoiner ──────────────────────────────────────────────────────────

/// Stateless left-outer join of usage lines onto reference pricing.
pub struct UsagePriceJoiner;

impl UsagePriceJoiner {
    /// Produce exactly one [`JoinedCostRecord`] per usage line, in input order.
    pub fn join(
        usage: &[UsageRecord],
        prices: &[PriceListEntry],
        unit_factors: &[UnitConversionFactor],
    ) -> Vec<JoinedCostRecord> {
        let price_index = PriceIndex::build(prices);
        let factor_index = UnitFactorIndex::build(unit_factors);

        if price_index.duplicates() > 0 || factor_index.duplicates() > 0 {
            debug!(
                duplicate_prices = price_index.duplicates(),
                duplicate_unit_factors = factor_index.duplicates(),
                "duplicate reference keys resolved to first entry"
            );
        }

        let joined: Vec<JoinedCostRecord> = usage
            .iter()
            .map(|record| {
                let precio_lista = price_index.lookup(record);
                let unidad_factor = factor_index.lookup(record.pricing_unit.as_deref());
                let gross_cost = gross_cost(record.usage_amount, unidad_factor, precio_lista);
                JoinedCostRecord::from_usage(record, precio_lista, unidad_factor, gross_cost)
            })
            .collect();

        let unmatched = joined.iter().filter(|r| !r.has_price_match).count();
        if unmatched > 0 {
            warn!(
                unmatched,
                total = joined.len(),
                "usage lines without a price or unit factor match"
            );
        }
        debug!("Joined {} usage lines", joined.len());

        joined
    }
}

/// `(usage_amount / unidad_factor) * precio_lista`, null-propagating.
pub fn gross_cost(usage_amount: f64, unidad_factor: Option<f64>, precio_lista: Option<f64>) -> Option<f64> {
    safe_divide(Some(usage_amount), unidad_factor)
        .zip(precio_lista)
        .map(|(units, price)| units * price)
        .filter(|g| g.is_finite())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
