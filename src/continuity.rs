use crate::error::{Pcn874Error, Result};
use crate::schema::HeaderRecord;
use crate::utils::{format_report_date, is_all_digits, months_between, next_month};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// A calendar month as carried in a header's `reportDate` (`YYYYMM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub year: i32,
    pub month: u32,
}

impl ReportPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Pcn874Error::InvalidPeriod(format!("{}{:02}", year, month)));
        }
        Ok(Self { year, month })
    }

    pub fn parse(value: &str) -> Result<Self> {
        if value.len() != 6 || !is_all_digits(value) {
            return Err(Pcn874Error::InvalidPeriod(value.to_string()));
        }
        let year = value[0..4]
            .parse()
            .map_err(|_| Pcn874Error::InvalidPeriod(value.to_string()))?;
        let month = value[4..6]
            .parse()
            .map_err(|_| Pcn874Error::InvalidPeriod(value.to_string()))?;
        Self::new(year, month).map_err(|_| Pcn874Error::InvalidPeriod(value.to_string()))
    }

    pub fn next(self) -> Self {
        let (year, month) = next_month(self.year, self.month);
        Self { year, month }
    }

    pub fn months_until(self, later: ReportPeriod) -> i32 {
        months_between((self.year, self.month), (later.year, later.month))
    }
}

impl FromStr for ReportPeriod {
    type Err = Pcn874Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

/// Headers with a valid `reportDate`, stably ordered by period. Others are
/// skipped with a warning.
pub(crate) fn headers_by_period<'h, I>(headers: I) -> Vec<(ReportPeriod, &'h HeaderRecord)>
where
    I: IntoIterator<Item = &'h HeaderRecord>,
{
    let mut dated: Vec<(ReportPeriod, &HeaderRecord)> = headers
        .into_iter()
        .filter_map(|h| match ReportPeriod::parse(&h.report_date) {
            Ok(period) => Some((period, h)),
            Err(_) => {
                warn!(
                    "Skipping header with unparsable report date '{}'",
                    h.report_date
                );
                None
            }
        })
        .collect();
    dated.sort_by_key(|(period, _)| *period);
    dated
}

/// Months between the earliest and latest report that no file covers, ascending.
///
/// Fewer than two headers define no interval and yield nothing. Headers whose
/// `reportDate` is not a valid `YYYYMM` are skipped.
pub fn find_missing_months<'h, I>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = &'h HeaderRecord>,
{
    let headers: Vec<&HeaderRecord> = headers.into_iter().collect();
    if headers.len() < 2 {
        return Vec::new();
    }

    let observed: BTreeSet<ReportPeriod> = headers_by_period(headers)
        .into_iter()
        .map(|(period, _)| period)
        .collect();

    let (first, last) = match (observed.first(), observed.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Vec::new(),
    };

    let mut missing = Vec::new();
    let mut current = first;
    while current < last {
        if !observed.contains(&current) {
            missing.push(current.to_string());
        }
        current = current.next();
    }

    debug!(
        "Checked {} months from {} to {}: {} missing",
        first.months_until(last) + 1,
        first,
        last,
        missing.len()
    );

    missing
}

/// First and last reporting period of a batch, with the file creation dates of
/// those two reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRanges {
    pub first_report: ReportPeriod,
    pub last_report: ReportPeriod,
    /// Creation date (`YYYYMMDD`) of the earliest report, not the earliest
    /// creation date in the batch.
    pub first_file_created: String,
    pub last_file_created: String,
}

impl ReportRanges {
    /// `"01/2023 - 04/2023"`, or a single month when both ends agree.
    pub fn report_range(&self) -> String {
        span(&self.first_report.to_string(), &self.last_report.to_string())
    }

    /// `"10/02/2023 - 10/05/2023"`, or a single date when both ends agree.
    pub fn file_range(&self) -> String {
        span(&self.first_file_created, &self.last_file_created)
    }
}

fn span(first: &str, last: &str) -> String {
    let first = format_report_date(first);
    let last = format_report_date(last);
    if first == last {
        first
    } else {
        format!("{} - {}", first, last)
    }
}

/// `None` when no header carries a valid `reportDate`.
pub fn report_ranges<'h, I>(headers: I) -> Option<ReportRanges>
where
    I: IntoIterator<Item = &'h HeaderRecord>,
{
    let dated = headers_by_period(headers);
    let (first_report, first) = *dated.first()?;
    let (last_report, last) = *dated.last()?;

    Some(ReportRanges {
        first_report,
        last_report,
        first_file_created: first.file_creation_date.clone(),
        last_file_created: last.file_creation_date.clone(),
    })
}

/// One calendar month of a batch's reporting timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineMonth {
    pub period: ReportPeriod,
    /// Files reporting this month. Zero marks a gap.
    pub file_count: usize,
}

impl TimelineMonth {
    pub fn is_missing(&self) -> bool {
        self.file_count == 0
    }
}

/// Every month from the earliest to the latest report, ascending, covered
/// months and gaps alike.
pub fn report_timeline<'h, I>(headers: I) -> Vec<TimelineMonth>
where
    I: IntoIterator<Item = &'h HeaderRecord>,
{
    let mut counts: BTreeMap<ReportPeriod, usize> = BTreeMap::new();
    for (period, _) in headers_by_period(headers) {
        *counts.entry(period).or_default() += 1;
    }

    let (first, last) = match (counts.keys().next(), counts.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Vec::new(),
    };

    let mut timeline = Vec::new();
    let mut current = first;
    loop {
        timeline.push(TimelineMonth {
            period: current,
            file_count: counts.get(&current).copied().unwrap_or(0),
        });
        if current >= last {
            break;
        }
        current = current.next();
    }
    timeline
}
