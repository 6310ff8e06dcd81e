use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::pricing::DiscountTier;

/// One billed usage line as staged from the provider's cost export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub instance_type: Option<String>,
    /// Actual billed cost. Negative values are credits.
    pub net_cost: f64,
    #[serde(default)]
    pub pricing_term: Option<String>,
    #[serde(default)]
    pub pricing_unit: Option<String>,
    #[serde(default)]
    pub product_code: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub service_code: Option<String>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub tag_application: Option<String>,
    /// Quantity consumed, in the provider's raw usage unit.
    pub usage_amount: f64,
    #[serde(default)]
    pub usage_type: Option<String>,
}

/// A contractual list price for one product/term/unit/instance combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceListEntry {
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub pricing_term: Option<String>,
    pub pricing_unit: Option<String>,
    pub instance_type: Option<String>,
    /// Unit list price in the price list's billing unit.
    pub precio_lista: Option<f64>,
}

/// Divisor that converts raw usage into the price list's billing unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConversionFactor {
    #[serde(default)]
    pub pricing_unit: Option<String>,
    #[serde(default)]
    pub unidad_factor: Option<f64>,
}

/// A usage line enriched with its reference price and unit factor.
///
/// Carries every [`UsageRecord`] column so the relation can be materialised
/// on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedCostRecord {
    pub account_id: Option<String>,
    pub instance_type: Option<String>,
    pub net_cost: f64,
    pub pricing_term: Option<String>,
    pub pricing_unit: Option<String>,
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub region: Option<String>,
    pub service_code: Option<String>,
    pub start_date: NaiveDate,
    pub tag_application: Option<String>,
    pub usage_amount: f64,
    pub usage_type: Option<String>,
    pub precio_lista: Option<f64>,
    pub unidad_factor: Option<f64>,
    /// `(usage_amount / unidad_factor) * precio_lista`, null when any input is
    /// missing or the factor is zero.
    pub gross_cost: Option<f64>,
    /// Both a price and a unit factor were found.
    pub has_price_match: bool,
}

impl JoinedCostRecord {
    /// Build a joined row from the usage line and whatever reference values
    /// were found for it.
    pub fn from_usage(
        usage: &UsageRecord,
        precio_lista: Option<f64>,
        unidad_factor: Option<f64>,
        gross_cost: Option<f64>,
    ) -> Self {
        Self {
            account_id: usage.account_id.clone(),
            instance_type: usage.instance_type.clone(),
            net_cost: usage.net_cost,
            pricing_term: usage.pricing_term.clone(),
            pricing_unit: usage.pricing_unit.clone(),
            product_code: usage.product_code.clone(),
            product_name: usage.product_name.clone(),
            region: usage.region.clone(),
            service_code: usage.service_code.clone(),
            start_date: usage.start_date,
            tag_application: usage.tag_application.clone(),
            usage_amount: usage.usage_amount,
            usage_type: usage.usage_type.clone(),
            precio_lista,
            unidad_factor,
            gross_cost,
            has_price_match: precio_lista.is_some() && unidad_factor.is_some(),
        }
    }
}

/// Per-month, per-product totals over price-matched usage lines only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyProductAggregate {
    /// First day of the calendar month.
    pub month: NaiveDate,
    pub product_code: String,
    pub usage_amount: f64,
    pub net_cost: f64,
    /// Sum of per-line gross costs; null when every line's gross cost was null.
    pub gross_cost: Option<f64>,
}

/// Usage rank of one product within one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductUsageRank {
    pub month: NaiveDate,
    pub product_code: Option<String>,
    pub total_usage: f64,
    /// Dense rank, 1 = highest usage. Equal usage shares a rank.
    pub usage_rank: u32,
}

/// Final audit row for one (month, product) with a valid price match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAudit {
    pub month: NaiveDate,
    pub product_code: String,
    pub usage_amount: f64,
    pub net_cost: f64,
    pub gross_cost: Option<f64>,
    pub is_top5: bool,
    pub discount_tier: DiscountTier,
    pub expected_cost: Option<f64>,
    pub diff_abs: Option<f64>,
    pub diff_pct: Option<f64>,
    pub needs_review: bool,
}

/// Net cost of one service in one month with its growth over the previous
/// observed month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMonthlyCost {
    pub month: NaiveDate,
    pub service_code: String,
    pub net_cost: f64,
    pub prev_net_cost: Option<f64>,
    pub growth_abs: Option<f64>,
    /// Growth in percent (50.0 means +50%).
    pub growth_pct: Option<f64>,
}
