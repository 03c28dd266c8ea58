//! Display formatting for KPI values.
//!
//! Currency follows the Italian euro layout (`1.234,56 €`, non-breaking
//! space before the sign). Rounding is half away from zero throughout.

const NBSP: char = '\u{a0}';

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10_f64.powi(digits);
    (value * factor).round() / factor
}

/// `1234.56` → `"1.234,56 €"`. Non-finite input formats as zero.
pub fn format_currency(value: f64) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    let cents = (value.abs() * 100.0).round() as u128;
    let negative = value < 0.0 && cents > 0;

    let units = group_thousands(cents / 100, '.');
    let fraction = cents % 100;
    let sign = if negative { "-" } else { "" };
    format!("{sign}{units},{fraction:02}{NBSP}€")
}

fn group_thousands(mut units: u128, separator: char) -> String {
    let mut groups = Vec::new();
    loop {
        if units < 1000 {
            groups.push(units.to_string());
            break;
        }
        groups.push(format!("{:03}", units % 1000));
        units /= 1000;
    }
    groups.reverse();
    groups.join(&separator.to_string())
}

/// One decimal plus `%`: `66.666` → `"66.7%"`. Non-finite → `"0.0%"`.
pub fn format_percent(value: f64) -> String {
    if !value.is_finite() {
        return "0.0%".to_string();
    }
    format!("{:.1}%", round_to(value, 1))
}

/// Compact chart-axis label: `2_500_000` → `"2.5M"`, `1500` → `"2k"`,
/// `999` → `"999"`.
pub fn format_axis(value: f64) -> String {
    if value >= 1_000_000.0 {
        format!("{:.1}M", round_to(value / 1_000_000.0, 1))
    } else if value >= 1_000.0 {
        format!("{}k", (value / 1_000.0).round())
    } else {
        format_plain(value)
    }
}

/// Largest magnitude below which every integral `f64` fits in an `i64`.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

fn format_plain(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() <= EXACT_INTEGER_LIMIT {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
