//! Gates run before a file is admitted into a batch: one company per batch, and
//! a file may only be filed under the period it embeds.

use crate::error::{Pcn874Error, Result};
use crate::schema::ParsedFile;
use crate::utils::is_company_id;
use log::debug;

/// Byte range of the two-digit year and month inside the `O` line.
const EMBEDDED_YEAR: std::ops::Range<usize> = 19..21;
const EMBEDDED_MONTH: std::ops::Range<usize> = 21..23;

fn header_line(raw: &str) -> Option<&str> {
    raw.split('\n').find(|line| line.starts_with('O'))
}

/// Ensures every decoded file belongs to the same company.
///
/// The first file's id is the reference; the first file reporting a different id
/// is returned as the offender.
pub fn check_company_ids(files: &[ParsedFile]) -> Result<()> {
    let mut expected: Option<&str> = None;

    for file in files {
        let id = file.header.company_id.as_str();
        if !is_company_id(id) {
            return Err(Pcn874Error::MalformedCompanyId {
                value: id.to_string(),
            });
        }
        match expected {
            None => expected = Some(id),
            Some(reference) if reference != id => {
                return Err(Pcn874Error::CompanyIdMismatch {
                    expected: reference.to_string(),
                    found: id.to_string(),
                });
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Reads the company id from the first `O`-prefixed line of an undecoded upload.
pub fn extract_company_id(raw: &str) -> Result<String> {
    let line = header_line(raw)
        .filter(|line| line.len() >= 10)
        .ok_or(Pcn874Error::MissingHeaderLine)?;

    let id = line.get(1..10).unwrap_or_default();
    if !is_company_id(id) {
        return Err(Pcn874Error::MalformedCompanyId {
            value: line.chars().skip(1).take(9).collect(),
        });
    }

    Ok(id.to_string())
}

/// The `YYYYMM` period embedded in the `O` line, reading its two-digit year as 20YY.
pub fn embedded_period(raw: &str) -> Option<String> {
    let line = header_line(raw)?;
    let year = line.get(EMBEDDED_YEAR)?;
    let month = line.get(EMBEDDED_MONTH)?;
    Some(format!("20{}{}", year, month))
}

fn normalize_period(declared: &str) -> String {
    declared.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// True when the file's embedded period equals the declared filing period.
///
/// Non-digit characters in the declared period are ignored, so `"2023-02"` and
/// `"202302"` are equivalent.
pub fn check_reporting_period(raw: &str, expected_period: &str) -> bool {
    let declared = normalize_period(expected_period);
    match embedded_period(raw) {
        Some(embedded) => {
            debug!(
                "Comparing embedded period {} against declared {}",
                embedded, declared
            );
            embedded == declared
        }
        None => false,
    }
}

/// Like [`check_reporting_period`] but reports why a file was rejected.
pub fn validate_reporting_period(raw: &str, expected_period: &str) -> Result<()> {
    let declared = normalize_period(expected_period);
    if declared.len() != 6 {
        return Err(Pcn874Error::InvalidPeriod(expected_period.to_string()));
    }

    let embedded = embedded_period(raw).ok_or(Pcn874Error::MissingHeaderLine)?;
    if embedded != declared {
        return Err(Pcn874Error::PeriodMismatch { declared, embedded });
    }
    Ok(())
}
