//! Monthly per-product totals over price-matched usage lines.

use std::collections::BTreeMap;

use audit_core::models::{JoinedCostRecord, MonthlyProductAggregate};
use audit_core::nullable::NullableSum;
use audit_core::time_utils::month_start;
use chrono::NaiveDate;

// ── ProductTotals ─────────────────────────────────────────────────────────────

/// Running totals for one (month, product) group.
#[derive(Debug, Clone, Copy, Default)]
struct ProductTotals {
    usage_amount: f64,
    net_cost: f64,
    gross_cost: NullableSum,
}

impl ProductTotals {
    fn add(&mut self, record: &JoinedCostRecord) {
        self.usage_amount += record.usage_amount;
        self.net_cost += record.net_cost;
        self.gross_cost.add(record.gross_cost);
    }
}

// ── MonthlyProductAggregator ──────────────────────────────────────────────────

/// Stateless helper that groups joined records by calendar month and product.
pub struct MonthlyProductAggregator;

impl MonthlyProductAggregator {
    /// Aggregate every record that has a price match and a product code.
    ///
    /// Returns one row per (month, product_code), ordered by month then
    /// product code.
    pub fn aggregate(records: &[JoinedCostRecord]) -> Vec<MonthlyProductAggregate> {
        let mut groups: BTreeMap<(NaiveDate, &str), ProductTotals> = BTreeMap::new();

        for record in records.iter().filter(|r| r.has_price_match) {
            let Some(product_code) = record.product_code.as_deref() else {
                continue;
            };
            groups
                .entry((month_start(record.start_date), product_code))
                .or_default()
                .add(record);
        }

        groups
            .into_iter()
            .map(|((month, product_code), totals)| MonthlyProductAggregate {
                month,
                product_code: product_code.to_string(),
                usage_amount: totals.usage_amount,
                net_cost: totals.net_cost,
                gross_cost: totals.gross_cost.value(),
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
