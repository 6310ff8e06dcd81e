//! Per-month usage ranking of products.
//!
//! Ranking runs over every joined line, matched or not, so the usage cohort
//! reflects total consumption rather than only the priced part of it.

use std::collections::{BTreeMap, HashMap, HashSet};

use audit_core::models::{JoinedCostRecord, ProductUsageRank};
use audit_core::time_utils::month_start;
use chrono::NaiveDate;
use tracing::debug;

// ── TopUsageCohort ────────────────────────────────────────────────────────────

/// The (month, product) pairs whose usage rank is within the cut-off.
///
/// A group with a null product code may hold a rank but is never a member,
/// since it cannot be looked up by product.
#[derive(Debug, Clone, Default)]
pub struct TopUsageCohort {
    members: HashMap<NaiveDate, HashSet<String>>,
}

impl TopUsageCohort {
    pub fn contains(&self, month: NaiveDate, product_code: &str) -> bool {
        self.members
            .get(&month)
            .is_some_and(|products| products.contains(product_code))
    }

    pub fn len(&self) -> usize {
        self.members.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// ── TopUsageRanker ────────────────────────────────────────────────────────────

pub struct TopUsageRanker;

impl TopUsageRanker {
    /// Dense-rank products by total usage within each month.
    ///
    /// Rank 1 is the highest usage; equal totals share a rank and the next
    /// distinct total takes the next integer. Rows come back ordered by month,
    /// rank, then product code (null first).
    pub fn rank(records: &[JoinedCostRecord]) -> Vec<ProductUsageRank> {
        let mut totals: BTreeMap<NaiveDate, BTreeMap<Option<&str>, f64>> = BTreeMap::new();
        for record in records {
            *totals
                .entry(month_start(record.start_date))
                .or_default()
                .entry(record.product_code.as_deref())
                .or_insert(0.0) += record.usage_amount;
        }

        let mut ranks = Vec::new();
        for (month, products) in totals {
            let mut by_usage: Vec<(Option<&str>, f64)> = products.into_iter().collect();
            // Stable sort keeps the product-code order among ties.
            by_usage.sort_by(|a, b| b.1.total_cmp(&a.1));

            let mut rank = 0u32;
            let mut previous: Option<f64> = None;
            for (product_code, total_usage) in by_usage {
                if previous != Some(total_usage) {
                    rank += 1;
                    previous = Some(total_usage);
                }
                ranks.push(ProductUsageRank {
                    month,
                    product_code: product_code.map(str::to_string),
                    total_usage,
                    usage_rank: rank,
                });
            }
        }
        ranks
    }

    /// Collect the groups with `usage_rank <= top_n` and a product code.
    pub fn cohort(ranks: &[ProductUsageRank], top_n: u32) -> TopUsageCohort {
        let mut members: HashMap<NaiveDate, HashSet<String>> = HashMap::new();
        for rank in ranks.iter().filter(|r| r.usage_rank <= top_n) {
            if let Some(code) = &rank.product_code {
                members.entry(rank.month).or_default().insert(code.clone());
            }
        }
        let cohort = TopUsageCohort { members };
        debug!(top_n, members = cohort.len(), "top usage cohort built");
        cohort
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
