//! # PCN874 Analyzer
//!
//! A library for decoding Israeli PCN874 periodic VAT report files and turning a
//! batch of monthly reports into breakdowns, gap reports and red flags.
//!
//! ## Core Concepts
//!
//! - **Fixed-width records**: A header line (`O`), transaction lines and a footer line (`X`), decoded by byte offset
//! - **Minor units**: All amounts are integers in agorot; divide by 100 for shekels
//! - **Batches**: Monthly files for a single company, checked for company and period consistency before merging
//! - **Aggregates**: Per record type and per counterparty VAT file number statistics
//! - **Timeline**: Monthly header figures, reporting ranges and gaps between reports
//! - **Red flags**: Fixed heuristics such as out-of-band tax rates and concentrated input tax
//!
//! ## Example
//!
//! ```rust,ignore
//! use pcn874_analyzer::*;
//!
//! let analyzer = Pcn874Analyzer::default();
//! let mut batch = FileBatch::new();
//!
//! for (bytes, period) in uploads {
//!     if let Err(rejected) = analyzer.admit_to_batch(&mut batch, &bytes, Some(period)) {
//!         eprintln!("{}", rejected);
//!     }
//! }
//!
//! let summary = analyzer.summarize(&batch, None);
//! for flag in summary.triggered_red_flags() {
//!     println!("[{:?}] {}", flag.severity, flag.description);
//! }
//! ```

pub mod aggregation;
pub mod batch;
pub mod continuity;
pub mod decoder;
pub mod error;
pub mod ingestion;
pub mod query;
pub mod record_types;
pub mod red_flags;
pub mod schema;
pub mod utils;
pub mod validation;

pub use aggregation::{
    aggregate_by_record_type, aggregate_by_vat_file, compute_turnover, period_series,
    sum_headers, AggregateStat, Aggregator, BatchTotals, HeaderTotals, PeriodTaxPoint, Turnover,
};
pub use batch::{admit_to_batch, FileBatch, RejectedFile};
pub use continuity::{
    find_missing_months, report_ranges, report_timeline, ReportPeriod, ReportRanges,
    TimelineMonth,
};
pub use decoder::{decode_header, decode_transaction, RecordDecoder};
pub use error::{Pcn874Error, Result};
pub use ingestion::*;
pub use query::{export_transactions_csv, Page, SearchColumn, TransactionField, TransactionQuery};
pub use record_types::{RecordType, TaxDirection};
pub use red_flags::{
    detect_all, detect_input_concentration, detect_tax_rate_out_of_band,
    detect_unidentified_high_value, RedFlagAnomaly, RedFlagCategory, RedFlagDetector, Severity,
};
pub use schema::*;
pub use utils::*;
pub use validation::{
    check_company_ids, check_reporting_period, extract_company_id, validate_reporting_period,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Everything the dashboard shows for one batch and record-type filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub company_id: Option<String>,
    pub record_type_stats: Vec<AggregateStat>,
    pub vat_file_stats: Vec<AggregateStat>,
    pub totals: BatchTotals,
    pub turnover: Turnover,
    pub header_totals: HeaderTotals,
    /// Monthly header figures ordered by report period.
    pub period_series: Vec<PeriodTaxPoint>,
    pub report_ranges: Option<ReportRanges>,
    pub timeline: Vec<TimelineMonth>,
    pub missing_months: Vec<String>,
    pub red_flags: Vec<RedFlagAnomaly>,
}

impl BatchSummary {
    pub fn triggered_red_flags(&self) -> impl Iterator<Item = &RedFlagAnomaly> {
        self.red_flags.iter().filter(|a| a.is_triggered())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pcn874Analyzer {
    config: AnalysisConfig,
}

impl Pcn874Analyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn decoder(&self) -> RecordDecoder {
        RecordDecoder::new(self.config.numeric_parsing)
    }

    pub fn decode_file(&self, bytes: &[u8]) -> Result<ParsedFile> {
        decode_file_bytes(&self.decoder(), bytes)
    }

    /// Decodes all uploads in parallel and builds a batch from them.
    pub fn decode_batch<T>(&self, inputs: &[T]) -> Result<FileBatch>
    where
        T: AsRef<[u8]> + Sync,
    {
        FileBatch::decode_all(&self.decoder(), inputs)
    }

    pub fn admit_to_batch<'b>(
        &self,
        batch: &'b mut FileBatch,
        raw: &[u8],
        declared_period: Option<&str>,
    ) -> std::result::Result<&'b ParsedFile, RejectedFile> {
        batch.admit(&self.decoder(), raw, declared_period)
    }

    /// Aggregates, flags and gap-checks a batch. `filter` restricts the
    /// breakdowns to a record-type subset; turnover and the missing-month report
    /// always cover the whole batch.
    pub fn summarize(&self, batch: &FileBatch, filter: Option<&[RecordType]>) -> BatchSummary {
        let aggregator = Aggregator::new(&self.config);
        let detector = RedFlagDetector::new(&self.config);

        info!(
            "Summarizing {} files with {} transactions",
            batch.len(),
            batch.transaction_count()
        );

        let summary = BatchSummary {
            company_id: batch.company_id().map(str::to_string),
            record_type_stats: aggregator
                .aggregate_by_record_type(batch.transactions(), filter.unwrap_or(&[])),
            vat_file_stats: aggregator.aggregate_by_vat_file(batch.transactions(), filter),
            totals: aggregator.compute_totals(batch.transactions(), filter),
            turnover: aggregator.compute_turnover(batch.transactions()),
            header_totals: sum_headers(batch.headers()),
            period_series: period_series(batch.headers()),
            report_ranges: report_ranges(batch.headers()),
            timeline: report_timeline(batch.headers()),
            missing_months: find_missing_months(batch.headers()),
            red_flags: detector.detect_all(batch.transactions(), filter),
        };

        debug!(
            "Summary has {} missing months and {} triggered red flags",
            summary.missing_months.len(),
            summary.triggered_red_flags().count()
        );

        summary
    }

    /// A search preconfigured with this analyzer's page size.
    pub fn query(&self, needle: &str) -> TransactionQuery {
        TransactionQuery::new(needle).page_size(self.config.page_size)
    }
}

pub fn summarize(batch: &FileBatch, filter: Option<&[RecordType]>) -> BatchSummary {
    Pcn874Analyzer::default().summarize(batch, filter)
}
