/// Placeholder shown for a null value in reports.
pub const NULL_DISPLAY: &str = "n/a";

/// Format a floating-point number with thousands separators and a fixed number
/// of decimal places.
///
/// # Examples
///
/// ```
/// use audit_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5,  1), "1,234.5");
/// assert_eq!(format_number(1234567.0, 0), "1,234,567");
/// assert_eq!(format_number(0.0, 2), "0.00");
/// assert_eq!(format_number(-9876.5, 1), "-9,876.5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let abs_value = value.abs();

    // Nudge by a tiny epsilon so exact binary midpoints round away from zero.
    let factor = 10_f64.powi(decimals as i32);
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;

    let integer_part = rounded.trunc() as u64;
    let frac_part = rounded - rounded.trunc();

    let grouped = group_thousands(&integer_part.to_string());

    let result = if decimals == 0 {
        grouped
    } else {
        let frac_str = format!("{:.prec$}", frac_part, prec = decimals as usize);
        // `frac_str` looks like "0.50"; keep ".50".
        format!("{}{}", grouped, &frac_str[1..])
    };

    if negative && rounded != 0.0 {
        format!("-{}", result)
    } else {
        result
    }
}

/// Format a monetary amount as a USD string with two decimal places and
/// thousands separators.
///
/// # Examples
///
/// ```
/// use audit_core::formatting::format_currency;
///
/// assert_eq!(format_currency(1234.56),  "$1,234.56");
/// assert_eq!(format_currency(0.0),      "$0.00");
/// assert_eq!(format_currency(-9.99),    "$-9.99");
/// ```
pub fn format_currency(amount: f64) -> String {
    if amount < 0.0 {
        format!("$-{}", format_number(amount.abs(), 2))
    } else {
        format!("${}", format_number(amount, 2))
    }
}

/// [`format_currency`] for nullable amounts.
pub fn format_optional_currency(amount: Option<f64>) -> String {
    amount
        .map(format_currency)
        .unwrap_or_else(|| NULL_DISPLAY.to_string())
}

/// Format a ratio (`0.4286`) as a signed percentage (`+42.86%`).
///
/// # Examples
///
/// ```
/// use audit_core::formatting::format_ratio;
///
/// assert_eq!(format_ratio(Some(0.428571), 2), "+42.86%");
/// assert_eq!(format_ratio(Some(-0.5), 1), "-50.0%");
/// assert_eq!(format_ratio(None, 2), "n/a");
/// ```
pub fn format_ratio(ratio: Option<f64>, decimals: u32) -> String {
    format_percent(ratio.map(|r| r * 100.0), decimals)
}

/// Format a value that is already in percent (`50.0`) as `+50.00%`.
pub fn format_percent(percent: Option<f64>, decimals: u32) -> String {
    match percent {
        None => NULL_DISPLAY.to_string(),
        Some(p) if p > 0.0 => format!("+{}%", format_number(p, decimals)),
        Some(p) => format!("{}%", format_number(p, decimals)),
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────
