//! The audit pipeline.
//!
//! Wires the stages together: join → aggregate → rank → discount → audit,
//! plus the independent service growth pipeline, and returns an
//! [`AuditResult`] ready to be written as a snapshot.

use std::time::Instant;

use audit_core::error::Result;
use audit_core::models::{
    CostAudit, JoinedCostRecord, PriceListEntry, ProductUsageRank, ServiceMonthlyCost,
    UnitConversionFactor, UsageRecord,
};
use audit_core::pricing::DiscountPolicy;
use chrono::Utc;
use tracing::{debug, info};

use crate::aggregator::MonthlyProductAggregator;
use crate::audit::AuditCalculator;
use crate::discount::DiscountEngine;
use crate::growth::ServiceGrowthAnalyzer;
use crate::joiner::UsagePriceJoiner;
use crate::ranker::TopUsageRanker;
use crate::reader::{load_snapshot, StagedInputs, StagedSnapshot};

// ── Public types ──────────────────────────────────────────────────────────────

/// Row counts of the three input relations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InputCounts {
    pub usage: usize,
    pub prices: usize,
    pub unit_factors: usize,
}

impl InputCounts {
    pub fn of(snapshot: &StagedSnapshot) -> Self {
        Self {
            usage: snapshot.usage.len(),
            prices: snapshot.prices.len(),
            unit_factors: snapshot.unit_factors.len(),
        }
    }
}

/// Wall-clock seconds spent in each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StageTimings {
    pub load_time_seconds: f64,
    pub audit_time_seconds: f64,
    pub growth_time_seconds: f64,
}

/// Metadata produced alongside the audit result.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuditMetadata {
    /// ISO-8601 timestamp when this result was generated.
    pub generated_at: String,
    pub inputs: InputCounts,
    pub joined_rows: usize,
    /// Joined rows without both a price and a unit factor.
    pub unmatched_rows: usize,
    /// (month, product) pairs in the top usage cohort.
    pub top_cohort_size: usize,
    pub cost_audit_rows: usize,
    pub needs_review_rows: usize,
    pub service_growth_rows: usize,
    #[serde(flatten)]
    pub timings: StageTimings,
}

/// Output of the audit chain.
#[derive(Debug, Clone, Default)]
pub struct AuditOutput {
    pub joined: Vec<JoinedCostRecord>,
    pub ranks: Vec<ProductUsageRank>,
    pub cost_audit: Vec<CostAudit>,
    pub top_cohort_size: usize,
}

/// The complete output of one audit run.
#[derive(Debug, Clone)]
pub struct AuditResult {
    pub inputs: StagedInputs,
    pub joined: Vec<JoinedCostRecord>,
    pub cost_audit: Vec<CostAudit>,
    pub service_growth: Vec<ServiceMonthlyCost>,
    pub metadata: AuditMetadata,
}

impl AuditResult {
    /// Combine the outputs of both pipelines.
    pub fn assemble(
        inputs: StagedInputs,
        counts: InputCounts,
        audit: AuditOutput,
        service_growth: Vec<ServiceMonthlyCost>,
        timings: StageTimings,
    ) -> Self {
        let metadata = AuditMetadata {
            generated_at: Utc::now().to_rfc3339(),
            inputs: counts,
            joined_rows: audit.joined.len(),
            unmatched_rows: audit.joined.iter().filter(|r| !r.has_price_match).count(),
            top_cohort_size: audit.top_cohort_size,
            cost_audit_rows: audit.cost_audit.len(),
            needs_review_rows: audit.cost_audit.iter().filter(|r| r.needs_review).count(),
            service_growth_rows: service_growth.len(),
            timings,
        };

        Self {
            inputs,
            joined: audit.joined,
            cost_audit: audit.cost_audit,
            service_growth,
            metadata,
        }
    }

    /// Rows flagged for review.
    pub fn flagged(&self) -> impl Iterator<Item = &CostAudit> {
        self.cost_audit.iter().filter(|r| r.needs_review)
    }
}

// ── Pipelines ─────────────────────────────────────────────────────────────────

/// Run the audit chain over loaded relations.
pub fn evaluate_audit(
    usage: &[UsageRecord],
    prices: &[PriceListEntry],
    unit_factors: &[UnitConversionFactor],
    policy: &DiscountPolicy,
) -> AuditOutput {
    let joined = UsagePriceJoiner::join(usage, prices, unit_factors);
    let aggregates = MonthlyProductAggregator::aggregate(&joined);
    debug!("Aggregated {} (month, product) groups", aggregates.len());

    let ranks = TopUsageRanker::rank(&joined);
    let cohort = TopUsageRanker::cohort(&ranks, policy.top_n);

    let discounted = DiscountEngine::new(policy).apply(aggregates, &cohort);
    let cost_audit = AuditCalculator::new(policy.review_threshold).audit(discounted);
    debug!("Audited {} rows", cost_audit.len());

    AuditOutput {
        joined,
        ranks,
        cost_audit,
        top_cohort_size: cohort.len(),
    }
}

/// Run the service growth pipeline.
pub fn evaluate_growth(usage: &[UsageRecord]) -> Vec<ServiceMonthlyCost> {
    let rows = ServiceGrowthAnalyzer::analyze(usage);
    debug!("Computed growth for {} (service, month) rows", rows.len());
    rows
}

/// Load `inputs` and run both pipelines one after the other.
///
/// Fails before any stage runs when an input is missing, malformed or empty.
pub fn run_audit(inputs: &StagedInputs, policy: &DiscountPolicy) -> Result<AuditResult> {
    // ── Step 1: Load ──────────────────────────────────────────────────────────
    let load_start = Instant::now();
    let snapshot = load_snapshot(inputs)?;
    let load_time = load_start.elapsed().as_secs_f64();
    let counts = InputCounts::of(&snapshot);

    // ── Step 2: Audit chain ───────────────────────────────────────────────────
    let audit_start = Instant::now();
    let audit = evaluate_audit(
        &snapshot.usage,
        &snapshot.prices,
        &snapshot.unit_factors,
        policy,
    );
    let audit_time = audit_start.elapsed().as_secs_f64();

    // ── Step 3: Service growth ────────────────────────────────────────────────
    let growth_start = Instant::now();
    let growth = evaluate_growth(&snapshot.usage);
    let growth_time = growth_start.elapsed().as_secs_f64();

    let result = AuditResult::assemble(
        inputs.clone(),
        counts,
        audit,
        growth,
        StageTimings {
            load_time_seconds: load_time,
            audit_time_seconds: audit_time,
            growth_time_seconds: growth_time,
        },
    );
    info!(
        cost_audit = result.metadata.cost_audit_rows,
        needs_review = result.metadata.needs_review_rows,
        service_growth = result.metadata.service_growth_rows,
        "audit complete"
    );
    Ok(result)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use audit_core::error::AuditError;
    use audit_core::pricing::DiscountTier;
    use chrono::NaiveDate;
    use std::path::Path;
    use tempfile::TempDir;

    const USAGE_HEADER: &str = "account_id,instance_type,net_cost,pricing_term,pricing_unit,\
product_code,product_name,region,service_code,start_date,tag_application,usage_amount,usage_type";

    fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn inputs(dir: &Path, usage_rows: &[&str]) -> StagedInputs {
        let mut usage = String::from(USAGE_HEADER);
        for row in usage_rows {
            usage.push('\n');
            usage.push_str(row);
        }
        StagedInputs {
            usage: write(dir, "usage.csv", &usage),
            prices: write(
                dir,
                "prices.json",
                r#"[
                    {"product_code": "EC2", "product_name": "Compute", "pricing_term": "OnDemand",
                     "pricing_unit": "Hrs", "instance_type": null, "precio_lista": 5.0},
                    {"product_code": "BIG", "product_name": "Big", "pricing_term": "OnDemand",
                     "pricing_unit": "Hrs", "instance_type": null, "precio_lista": 1.0}
                ]"#,
            ),
            unit_factors: write(dir, "unit_factors.csv", "pricing_unit,unidad_factor\nHrs,10\n"),
        }
    }

    // ── evaluate_audit ────────────────────────────────────────────────────────

    fn usage(product: &str, amount: f64, net: f64) -> UsageRecord {
        UsageRecord {
            account_id: None,
            instance_type: None,
            net_cost: net,
            pricing_term: Some("OnDemand".to_string()),
            pricing_unit: Some("Hrs".to_string()),
            product_code: Some(product.to_string()),
            product_name: Some("Compute".to_string()),
            region: None,
            service_code: Some(product.to_string()),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            tag_application: None,
            usage_amount: amount,
            usage_type: None,
        }
    }

    fn price(product: &str, value: f64) -> PriceListEntry {
        PriceListEntry {
            product_code: Some(product.to_string()),
            product_name: Some("Compute".to_string()),
            pricing_term: Some("OnDemand".to_string()),
            pricing_unit: Some("Hrs".to_string()),
            instance_type: None,
            precio_lista: Some(value),
        }
    }

    fn factors() -> Vec<UnitConversionFactor> {
        vec![UnitConversionFactor {
            pricing_unit: Some("Hrs".to_string()),
            unidad_factor: Some(10.0),
        }]
    }

    #[test]
    fn test_evaluate_audit_worked_example() {
        let out = evaluate_audit(
            &[usage("EC2", 100.0, 50.0)],
            &[price("EC2", 5.0)],
            &factors(),
            &DiscountPolicy::default(),
        );

        assert_eq!(out.joined.len(), 1);
        assert_eq!(out.joined[0].gross_cost, Some(50.0));
        assert_eq!(out.cost_audit.len(), 1);

        let row = &out.cost_audit[0];
        assert!(row.is_top5);
        assert_eq!(row.discount_tier, DiscountTier::TopVolume);
        assert!((row.expected_cost.unwrap() - 35.0).abs() < 1e-9);
        assert!((row.diff_abs.unwrap() - 15.0).abs() < 1e-9);
        assert!((row.diff_pct.unwrap() - 0.428_571).abs() < 1e-5);
        assert!(row.needs_review);
    }

    #[test]
    fn test_evaluate_audit_large_spend_outside_cohort() {
        // Six products out-use BIG, so it falls outside the top five.
        let mut usages: Vec<UsageRecord> = (1..=6)
            .map(|i| usage(&format!("P{i}"), 1_000_000.0 + i as f64, 0.0))
            .collect();
        usages.push(usage("BIG", 600_000.0, 48_000.0));

        let out = evaluate_audit(&usages, &[price("BIG", 1.0)], &factors(), &DiscountPolicy::default());

        assert_eq!(out.cost_audit.len(), 1);
        let row = &out.cost_audit[0];
        assert!(!row.is_top5);
        assert_eq!(row.gross_cost, Some(60_000.0));
        assert_eq!(row.discount_tier, DiscountTier::LargeSpend);
        assert!((row.expected_cost.unwrap() - 48_000.0).abs() < 1e-6);
        assert!(!row.needs_review);
        assert_eq!(out.top_cohort_size, 5);
    }

    #[test]
    fn test_evaluate_audit_is_idempotent() {
        let usages = vec![usage("EC2", 100.0, 50.0), usage("S3", 5.0, 1.0)];
        let prices = vec![price("EC2", 5.0)];
        let policy = DiscountPolicy::default();

        let first = evaluate_audit(&usages, &prices, &factors(), &policy);
        let second = evaluate_audit(&usages, &prices, &factors(), &policy);

        assert_eq!(first.cost_audit, second.cost_audit);
        assert_eq!(first.joined, second.joined);
        assert_eq!(evaluate_growth(&usages), evaluate_growth(&usages));
    }

    // ── run_audit ─────────────────────────────────────────────────────────────

    #[test]
    fn test_run_audit_from_files() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs(
            dir.path(),
            &[
                "1,,50,OnDemand,Hrs,EC2,Compute,us-east-1,AmazonEC2,2024-01-10,,100,Box",
                "1,,100,OnDemand,Hrs,UNPRICED,Other,us-east-1,AmazonEC2,2024-01-11,,5,Box",
                "1,,150,OnDemand,Hrs,EC2,Compute,us-east-1,AmazonEC2,2024-02-10,,10,Box",
            ],
        );

        let result = run_audit(&inputs, &DiscountPolicy::default()).unwrap();

        assert_eq!(result.metadata.inputs.usage, 3);
        assert_eq!(result.metadata.inputs.prices, 2);
        assert_eq!(result.metadata.joined_rows, 3);
        assert_eq!(result.metadata.unmatched_rows, 1);
        assert_eq!(result.cost_audit.len(), 2);
        assert_eq!(result.metadata.needs_review_rows, result.flagged().count());

        assert_eq!(result.service_growth.len(), 2);
        let feb = &result.service_growth[1];
        assert_eq!(feb.prev_net_cost, Some(150.0));
        assert_eq!(feb.growth_abs, Some(0.0));
        assert_eq!(feb.growth_pct, Some(0.0));
        assert!(result.metadata.timings.load_time_seconds >= 0.0);
        assert!(!result.metadata.generated_at.is_empty());
    }

    #[test]
    fn test_run_audit_rejects_empty_usage() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs(dir.path(), &[]);

        let err = run_audit(&inputs, &DiscountPolicy::default()).unwrap_err();
        assert!(matches!(err, AuditError::EmptyRelation(ref r) if r == "usage"));
    }

    #[test]
    fn test_run_audit_rejects_malformed_usage() {
        let dir = TempDir::new().unwrap();
        let inputs = inputs(
            dir.path(),
            &["1,,not-a-number,OnDemand,Hrs,EC2,Compute,us-east-1,AmazonEC2,2024-01-10,,100,Box"],
        );

        assert!(run_audit(&inputs, &DiscountPolicy::default()).is_err());
    }

    #[test]
    fn test_metadata_serialises_flat_timings() {
        let meta = AuditMetadata {
            generated_at: "2024-01-01T00:00:00+00:00".to_string(),
            inputs: InputCounts::default(),
            joined_rows: 0,
            unmatched_rows: 0,
            top_cohort_size: 0,
            cost_audit_rows: 0,
            needs_review_rows: 0,
            service_growth_rows: 0,
            timings: StageTimings::default(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("load_time_seconds").is_some());
        assert!(json.get("timings").is_none());
    }
}
