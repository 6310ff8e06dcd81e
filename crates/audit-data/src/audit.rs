//! Variance between billed and expected cost.

use audit_core::models::CostAudit;
use audit_core::nullable::{checked_sub, safe_divide};

use crate::discount::DiscountedAggregate;

/// Computes `diff_abs`, `diff_pct` and the review flag.
pub struct AuditCalculator {
    review_threshold: f64,
}

impl AuditCalculator {
    /// `review_threshold` is the absolute relative deviation strictly above
    /// which a row is flagged.
    pub fn new(review_threshold: f64) -> Self {
        Self { review_threshold }
    }

    pub fn audit(&self, rows: Vec<DiscountedAggregate>) -> Vec<CostAudit> {
        rows.into_iter().map(|row| self.audit_row(row)).collect()
    }

    pub fn audit_row(&self, row: DiscountedAggregate) -> CostAudit {
        let DiscountedAggregate {
            aggregate,
            is_top5,
            discount_tier,
            expected_cost,
        } = row;

        let diff_abs = checked_sub(Some(aggregate.net_cost), expected_cost);
        let diff_pct = safe_divide(diff_abs, expected_cost);
        let needs_review = diff_pct.is_some_and(|pct| pct.abs() > self.review_threshold);

        CostAudit {
            month: aggregate.month,
            product_code: aggregate.product_code,
            usage_amount: aggregate.usage_amount,
            net_cost: aggregate.net_cost,
            gross_cost: aggregate.gross_cost,
            is_top5,
            discount_tier,
            expected_cost,
            diff_abs,
            diff_pct,
            needs_review,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
