//! Number and date formatting for table cells and the footer.

use chrono::DateTime;

/// Shown for cells holding no value.
pub const MISSING: &str = "∅";
/// Shown for values of kinds that have no text rendering.
pub const UNKNOWN: &str = "?";

/// Integer with thousands separators: `1234567` -> `"1,234,567"`.
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Three significant digits with a magnitude suffix:
/// `12` -> `"12"`, `1234` -> `"1.23K"`, `2500000` -> `"2.5M"`.
pub fn significant_digits(n: f64) -> String {
    if n == 0.0 || !n.is_finite() {
        return format!("{n}");
    }
    let abs = n.abs();
    if abs < 0.001 {
        return format!("{n:.2e}");
    }
    let (scaled, suffix) = if abs >= 1e12 {
        (n / 1e12, "T")
    } else if abs >= 1e9 {
        (n / 1e9, "B")
    } else if abs >= 1e6 {
        (n / 1e6, "M")
    } else if abs >= 1e3 {
        (n / 1e3, "K")
    } else {
        (n, "")
    };

    let int_digits = if scaled.abs() < 1.0 {
        0
    } else {
        scaled.abs().log10().floor() as usize + 1
    };
    let decimals = 3usize.saturating_sub(int_digits);
    let mut text = format!("{scaled:.decimals$}");
    if text.contains('.') {
        text = text.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    format!("{text}{suffix}")
}

/// Fraction in `[0, 1]` as a percentage with one decimal: `0.375` -> `"37.5%"`.
pub fn percent(fraction: f64) -> String {
    let rounded = (fraction * 1000.0).round() / 10.0;
    format!("{}%", significant_digits(rounded))
}

/// Calendar date for a timestamp in milliseconds since the unix epoch.
pub fn date_from_millis(millis: f64) -> Option<String> {
    if !millis.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis(millis as i64).map(|d| d.format("%a %b %d %Y").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_separators() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn significant_digits_with_suffix() {
        assert_eq!(significant_digits(0.0), "0");
        assert_eq!(significant_digits(3.0), "3");
        assert_eq!(significant_digits(150.0), "150");
        assert_eq!(significant_digits(1234.0), "1.23K");
        assert_eq!(significant_digits(2_500_000.0), "2.5M");
        assert_eq!(significant_digits(0.5), "0.5");
        assert_eq!(significant_digits(-4000.0), "-4K");
    }

    #[test]
    fn percent_rounds_to_one_decimal() {
        assert_eq!(percent(0.3), "30%");
        assert_eq!(percent(0.375), "37.5%");
        assert_eq!(percent(1.0), "100%");
    }

    #[test]
    fn dates_from_epoch_millis() {
        assert_eq!(date_from_millis(0.0).as_deref(), Some("Thu Jan 01 1970"));
        assert_eq!(
            date_from_millis(1_483_228_800_000.0).as_deref(),
            Some("Sun Jan 01 2017")
        );
        assert_eq!(date_from_millis(f64::NAN), None);
    }
}
