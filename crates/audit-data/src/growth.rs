//! Month-over-month net cost growth per service.
//!
//! Runs straight off the usage relation and shares nothing else with the
//! audit chain.

use std::collections::BTreeMap;

use audit_core::models::{ServiceMonthlyCost, UsageRecord};
use audit_core::nullable::{checked_sub, safe_divide, scale};
use audit_core::time_utils::month_start;
use chrono::NaiveDate;

pub struct ServiceGrowthAnalyzer;

impl ServiceGrowthAnalyzer {
    /// One row per (service_code, month) with a non-null service code, ordered
    /// by service then month.
    ///
    /// `prev_net_cost` is the previous *observed* month for the service, so a
    /// gap of several months still compares against the last month present.
    pub fn analyze(usage: &[UsageRecord]) -> Vec<ServiceMonthlyCost> {
        let mut totals: BTreeMap<(&str, NaiveDate), f64> = BTreeMap::new();
        for record in usage {
            let Some(service_code) = record.service_code.as_deref() else {
                continue;
            };
            *totals
                .entry((service_code, month_start(record.start_date)))
                .or_insert(0.0) += record.net_cost;
        }

        let mut rows = Vec::with_capacity(totals.len());
        let mut previous: Option<(&str, f64)> = None;
        for ((service_code, month), net_cost) in totals {
            let prev_net_cost = previous
                .filter(|(prev_service, _)| *prev_service == service_code)
                .map(|(_, cost)| cost);
            let growth_abs = checked_sub(Some(net_cost), prev_net_cost);
            let growth_pct = scale(safe_divide(growth_abs, prev_net_cost), 100.0);

            rows.push(ServiceMonthlyCost {
                month,
                service_code: service_code.to_string(),
                net_cost,
                prev_net_cost,
                growth_abs,
                growth_pct,
            });
            previous = Some((service_code, net_cost));
        }
        rows
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
