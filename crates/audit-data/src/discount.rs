//! Contractual discount applied to monthly product aggregates.

use audit_core::models::MonthlyProductAggregate;
use audit_core::pricing::{DiscountPolicy, DiscountTier};

use crate::ranker::TopUsageCohort;

/// An aggregate with its cohort membership and the expected cost the
/// contract allows for it.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountedAggregate {
    pub aggregate: MonthlyProductAggregate,
    pub is_top5: bool,
    pub discount_tier: DiscountTier,
    pub expected_cost: Option<f64>,
}

/// Applies a [`DiscountPolicy`] to aggregates using a usage cohort.
pub struct DiscountEngine<'a> {
    policy: &'a DiscountPolicy,
}

impl<'a> DiscountEngine<'a> {
    pub fn new(policy: &'a DiscountPolicy) -> Self {
        Self { policy }
    }

    /// Price every aggregate, preserving input order.
    pub fn apply(
        &self,
        aggregates: Vec<MonthlyProductAggregate>,
        cohort: &TopUsageCohort,
    ) -> Vec<DiscountedAggregate> {
        aggregates
            .into_iter()
            .map(|aggregate| {
                let is_top5 = cohort.contains(aggregate.month, &aggregate.product_code);
                let (discount_tier, expected_cost) =
                    self.policy.expected_cost(is_top5, aggregate.gross_cost);
                DiscountedAggregate {
                    aggregate,
                    is_top5,
                    discount_tier,
                    expected_cost,
                }
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
