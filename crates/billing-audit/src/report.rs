//! Plain-text run summary printed after a snapshot is written.

use std::fmt::Write;

use audit_core::formatting::{
    format_currency, format_number, format_optional_currency, format_percent, format_ratio,
};
use audit_core::models::{CostAudit, ServiceMonthlyCost};
use audit_core::time_utils::month_label;
use audit_runtime::runner::RunOutcome;

/// Number of flagged rows listed in the summary.
pub const MAX_FLAGGED_ROWS: usize = 10;

/// Render the summary for a completed run.
pub fn render(outcome: &RunOutcome) -> String {
    let result = &outcome.result;
    let meta = &result.metadata;
    let mut out = String::new();

    let _ = writeln!(out, "Billing audit {}", outcome.run_id);
    let _ = writeln!(out, "Snapshot: {}", outcome.snapshot_dir.display());
    let _ = writeln!(
        out,
        "Inputs: {} usage, {} prices, {} unit factors",
        meta.inputs.usage, meta.inputs.prices, meta.inputs.unit_factors
    );
    let _ = writeln!(
        out,
        "Joined: {} rows ({} without price match)",
        meta.joined_rows, meta.unmatched_rows
    );
    let _ = writeln!(
        out,
        "Audited: {} (month, product) rows, {} need review",
        meta.cost_audit_rows, meta.needs_review_rows
    );

    let flagged = top_flagged(&result.cost_audit, MAX_FLAGGED_ROWS);
    if !flagged.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Largest deviations:");
        for row in flagged {
            let _ = writeln!(
                out,
                "  {}  {:<24} net {:>14}  expected {:>14}  diff {:>14} ({})",
                month_label(row.month),
                row.product_code,
                format_currency(row.net_cost),
                format_optional_currency(row.expected_cost),
                format_optional_currency(row.diff_abs),
                format_ratio(row.diff_pct, 1),
            );
        }
    }

    let latest = latest_growth(&result.service_growth);
    if let Some(first) = latest.first() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Service growth {}:", month_label(first.month));
        for row in latest {
            let _ = writeln!(
                out,
                "  {:<24} {:>14}  prev {:>14}  {}",
                row.service_code,
                format_currency(row.net_cost),
                format_optional_currency(row.prev_net_cost),
                format_percent(row.growth_pct, 1),
            );
        }
    }

    let timings = &meta.timings;
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Timings: load {}s, audit {}s, growth {}s",
        format_number(timings.load_time_seconds, 3),
        format_number(timings.audit_time_seconds, 3),
        format_number(timings.growth_time_seconds, 3),
    );
    out
}

/// Flagged rows ordered by absolute deviation, largest first.
pub fn top_flagged(rows: &[CostAudit], limit: usize) -> Vec<&CostAudit> {
    let mut flagged: Vec<&CostAudit> = rows.iter().filter(|r| r.needs_review).collect();
    flagged.sort_by(|a, b| {
        let key = |r: &CostAudit| r.diff_abs.map_or(0.0, f64::abs);
        key(b).total_cmp(&key(a))
    });
    flagged.truncate(limit);
    flagged
}

/// Rows of the most recent month present, in service order.
pub fn latest_growth(rows: &[ServiceMonthlyCost]) -> Vec<&ServiceMonthlyCost> {
    let Some(latest) = rows.iter().map(|r| r.month).max() else {
        return Vec::new();
    };
    rows.iter().filter(|r| r.month == latest).collect()
}

// ── Tests ──────────────────────────────────────────────────────────────────────
