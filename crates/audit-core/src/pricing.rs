use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};
use crate::nullable::scale;

// ── Contract constants ────────────────────────────────────────────────────────

/// Number of highest-usage products per month that earn the volume discount.
pub const DEFAULT_TOP_N: u32 = 5;

/// Monthly gross cost above which the size discount applies (strictly greater).
pub const DEFAULT_LARGE_SPEND_THRESHOLD: f64 = 50_000.0;

/// Expected-cost multiplier for a top-N product above the spend threshold.
pub const DEFAULT_TOP_LARGE_RATE: f64 = 0.56;

/// Expected-cost multiplier for a top-N product at or below the threshold.
pub const DEFAULT_TOP_RATE: f64 = 0.70;

/// Expected-cost multiplier for any other product above the threshold.
pub const DEFAULT_LARGE_RATE: f64 = 0.80;

/// Relative deviation beyond which a row is flagged for review.
pub const DEFAULT_REVIEW_THRESHOLD: f64 = 0.1;

// ── DiscountTier ──────────────────────────────────────────────────────────────

/// The discount bracket a (month, product) aggregate falls into.
///
/// Tiers are listed in evaluation order; the first that applies wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountTier {
    /// Top-N by usage and gross cost above the threshold.
    TopVolumeLargeSpend,
    /// Top-N by usage.
    TopVolume,
    /// Gross cost above the threshold.
    LargeSpend,
    /// No discount.
    ListPrice,
}

impl DiscountTier {
    /// The canonical snake_case identifier for this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountTier::TopVolumeLargeSpend => "top_volume_large_spend",
            DiscountTier::TopVolume => "top_volume",
            DiscountTier::LargeSpend => "large_spend",
            DiscountTier::ListPrice => "list_price",
        }
    }
}

impl std::fmt::Display for DiscountTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── DiscountPolicy ────────────────────────────────────────────────────────────

/// The contractual volume and size discount schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscountPolicy {
    /// Dense-rank cut-off for the usage cohort.
    pub top_n: u32,
    /// Gross cost strictly above which the size discount applies.
    pub large_spend_threshold: f64,
    pub top_large_rate: f64,
    pub top_rate: f64,
    pub large_rate: f64,
    /// Absolute relative deviation strictly above which a row needs review.
    pub review_threshold: f64,
}

impl Default for DiscountPolicy {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            large_spend_threshold: DEFAULT_LARGE_SPEND_THRESHOLD,
            top_large_rate: DEFAULT_TOP_LARGE_RATE,
            top_rate: DEFAULT_TOP_RATE,
            large_rate: DEFAULT_LARGE_RATE,
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
        }
    }
}

impl DiscountPolicy {
    /// Reject schedules that cannot describe a discount.
    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(AuditError::Config("top_n must be at least 1".to_string()));
        }
        let rates = [
            ("top_large_rate", self.top_large_rate),
            ("top_rate", self.top_rate),
            ("large_rate", self.large_rate),
        ];
        for (name, rate) in rates {
            if !rate.is_finite() || rate < 0.0 {
                return Err(AuditError::Config(format!(
                    "{name} must be a non-negative number, got {rate}"
                )));
            }
        }
        if !self.large_spend_threshold.is_finite() {
            return Err(AuditError::Config(
                "large_spend_threshold must be finite".to_string(),
            ));
        }
        if !self.review_threshold.is_finite() || self.review_threshold < 0.0 {
            return Err(AuditError::Config(format!(
                "review_threshold must be a non-negative number, got {}",
                self.review_threshold
            )));
        }
        Ok(())
    }

    /// Pick the tier for an aggregate.
    ///
    /// A missing gross cost never exceeds the threshold, so it can only land
    /// in [`DiscountTier::TopVolume`] or [`DiscountTier::ListPrice`].
    pub fn select_tier(&self, is_top: bool, gross_cost: Option<f64>) -> DiscountTier {
        let large = gross_cost.is_some_and(|g| g > self.large_spend_threshold);
        match (is_top, large) {
            (true, true) => DiscountTier::TopVolumeLargeSpend,
            (true, false) => DiscountTier::TopVolume,
            (false, true) => DiscountTier::LargeSpend,
            (false, false) => DiscountTier::ListPrice,
        }
    }

    /// Expected-cost multiplier for `tier`.
    pub fn rate(&self, tier: DiscountTier) -> f64 {
        match tier {
            DiscountTier::TopVolumeLargeSpend => self.top_large_rate,
            DiscountTier::TopVolume => self.top_rate,
            DiscountTier::LargeSpend => self.large_rate,
            DiscountTier::ListPrice => 1.0,
        }
    }

    /// Apply the schedule, returning the chosen tier and the expected cost.
    ///
    /// Zero or negative gross costs are multiplied as-is.
    pub fn expected_cost(&self, is_top: bool, gross_cost: Option<f64>) -> (DiscountTier, Option<f64>) {
        let tier = self.select_tier(is_top, gross_cost);
        let expected = match tier {
            DiscountTier::ListPrice => gross_cost,
            other => scale(gross_cost, self.rate(other)),
        };
        (tier, expected)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
