use crate::error::{Pcn874Error, Result};
use log::warn;

/// Returns the calendar month following `(year, month)`, rolling December into
/// January of the next year.
pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

pub fn months_between(start: (i32, u32), end: (i32, u32)) -> i32 {
    let year_diff = end.0 - start.0;
    let month_diff = end.1 as i32 - start.1 as i32;
    year_diff * 12 + month_diff
}

pub fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Israeli company ids are exactly nine ASCII digits.
pub fn is_company_id(value: &str) -> bool {
    value.len() == 9 && is_all_digits(value)
}

/// A percentage as whole hundredths of a point, so `18.05` becomes `1805`.
pub fn to_hundredths(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

/// Parses a minor-unit amount field such as `"+00001234500"`, `"-0000012345"` or
/// `"000012345"`.
///
/// Surrounding whitespace is ignored and a blank field is zero. Anything else
/// that is not an optional sign followed by ASCII digits is rejected.
pub fn parse_minor_units(raw: &str, field: &'static str) -> Result<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }

    let (negative, digits) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    if !is_all_digits(digits) {
        return Err(Pcn874Error::MalformedNumber {
            field,
            value: raw.to_string(),
        });
    }

    let magnitude: i64 = digits.parse().map_err(|_| Pcn874Error::MalformedNumber {
        field,
        value: raw.to_string(),
    })?;

    Ok(if negative { -magnitude } else { magnitude })
}

/// Lenient counterpart of [`parse_minor_units`]: unparsable content counts as zero.
pub fn lenient_minor_units(raw: &str, field: &'static str) -> i64 {
    match parse_minor_units(raw, field) {
        Ok(value) => value,
        Err(e) => {
            warn!("Treating unparsable amount as zero: {}", e);
            0
        }
    }
}

pub fn minor_to_currency(minor: i64) -> f64 {
    minor as f64 / 100.0
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Formats a minor-unit amount as whole shekels, e.g. `2500000` -> `"₪25,000"`.
pub fn format_nis(minor: i64) -> String {
    let shekels = (minor.unsigned_abs() + 50) / 100;
    let digits = shekels.to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if minor < 0 && shekels > 0 {
        format!("-₪{}", grouped)
    } else {
        format!("₪{}", grouped)
    }
}

/// Renders `YYYYMM` as `MM/YYYY` and `YYYYMMDD` as `DD/MM/YYYY`; anything else is
/// returned unchanged.
pub fn format_report_date(date: &str) -> String {
    if !date.is_ascii() {
        return date.to_string();
    }
    match date.len() {
        6 => format!("{}/{}", &date[4..6], &date[0..4]),
        8 => format!("{}/{}/{}", &date[6..8], &date[4..6], &date[0..4]),
        _ => date.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_month() {
        assert_eq!(next_month(2023, 1), (2023, 2));
        assert_eq!(next_month(2023, 12), (2024, 1));
    }

    #[test]
    fn test_months_between() {
        assert_eq!(months_between((2023, 1), (2023, 4)), 3);
        assert_eq!(months_between((2022, 11), (2023, 2)), 3);
        assert_eq!(months_between((2023, 5), (2023, 5)), 0);
    }

    #[test]
    fn test_parse_minor_units_signs() {
        assert_eq!(parse_minor_units("+00001234500", "x").unwrap(), 1_234_500);
        assert_eq!(parse_minor_units("-0000012345", "x").unwrap(), -12_345);
        assert_eq!(parse_minor_units("000012345", "x").unwrap(), 12_345);
        assert_eq!(parse_minor_units("   ", "x").unwrap(), 0);
    }

    #[test]
    fn test_parse_minor_units_rejects_garbage() {
        assert!(matches!(
            parse_minor_units("00012A45", "invoiceAmount"),
            Err(Pcn874Error::MalformedNumber { field: "invoiceAmount", .. })
        ));
        assert!(parse_minor_units("-", "x").is_err());
        assert!(parse_minor_units("12 34", "x").is_err());
        assert_eq!(lenient_minor_units("12 34", "x"), 0);
    }

    #[test]
    fn test_format_nis() {
        assert_eq!(format_nis(2_500_000), "₪25,000");
        assert_eq!(format_nis(10_000_000), "₪100,000");
        assert_eq!(format_nis(-123_456_789), "-₪1,234,568");
        assert_eq!(format_nis(0), "₪0");
        assert_eq!(format_nis(99_900), "₪999");
    }

    #[test]
    fn test_format_report_date() {
        assert_eq!(format_report_date("202302"), "02/2023");
        assert_eq!(format_report_date("20230215"), "15/02/2023");
        assert_eq!(format_report_date("2023"), "2023");
    }

    #[test]
    fn test_is_company_id() {
        assert!(is_company_id("514649871"));
        assert!(!is_company_id("51464987"));
        assert!(!is_company_id("51464987A"));
        assert!(!is_company_id("5146498710"));
    }

    #[test]
    fn test_to_hundredths() {
        assert_eq!(to_hundredths(18.05), 1805);
        assert_eq!(to_hundredths(17.95), 1795);
        assert_eq!(to_hundredths(0.05), 5);
        assert_eq!(to_hundredths(-18.0), -1800);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(18.056, 2), 18.06);
        assert_eq!(round_to(-17.994, 2), -17.99);
    }
}
