use crate::error::{Pcn874Error, Result};
use crate::record_types::RecordType;
use crate::utils::{is_company_id, round_to};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// How numeric fields that are not plain signed digit strings are treated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NumericParsing {
    #[schemars(
        description = "Unparsable amounts are kept verbatim at decode time and count as zero in every total and heuristic."
    )]
    Lenient,

    #[schemars(
        description = "Any non-digit content in a numeric column rejects the line with a MalformedNumber error."
    )]
    Strict,
}

impl Default for NumericParsing {
    fn default() -> Self {
        Self::Lenient
    }
}

/// Tunable constants used by the decoder, aggregation and red-flag heuristics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct AnalysisConfig {
    #[schemars(description = "Numeric field handling. Defaults to lenient.")]
    pub numeric_parsing: NumericParsing,

    #[schemars(
        description = "Invoice amount in minor units (agorot) above which an unidentified-customer sale (record type L) is flagged. Default 500000 (5,000 NIS)."
    )]
    pub unidentified_threshold_minor: i64,

    #[schemars(description = "Expected VAT rate in percent. Default 18.0.")]
    pub standard_vat_rate: f64,

    #[schemars(
        description = "Allowed deviation from the standard rate, in percentage points. Default 0.05."
    )]
    pub vat_rate_tolerance: f64,

    #[schemars(
        description = "Share of total input amount, in percent, that the largest input transactions may reach before being flagged. Exclusive. Default 20.0."
    )]
    pub concentration_threshold_pct: f64,

    #[schemars(description = "Number of largest input transactions considered. Default 3.")]
    pub concentration_top_n: usize,

    #[schemars(description = "Sample transactions kept per aggregate row. Default 3.")]
    pub sample_size: usize,

    #[schemars(description = "Transactions per page when browsing. Default 100.")]
    pub page_size: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            numeric_parsing: NumericParsing::Lenient,
            unidentified_threshold_minor: 500_000,
            standard_vat_rate: 18.0,
            vat_rate_tolerance: 0.05,
            concentration_threshold_pct: 20.0,
            concentration_top_n: 3,
            sample_size: 3,
            page_size: 100,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AnalysisConfig)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.standard_vat_rate.is_finite() {
            return Err(Pcn874Error::InvalidConfig(
                "standard_vat_rate must be finite".to_string(),
            ));
        }
        if !self.vat_rate_tolerance.is_finite() || self.vat_rate_tolerance < 0.0 {
            return Err(Pcn874Error::InvalidConfig(format!(
                "vat_rate_tolerance must be a non-negative number, got {}",
                self.vat_rate_tolerance
            )));
        }
        if !self.concentration_threshold_pct.is_finite() || self.concentration_threshold_pct < 0.0
        {
            return Err(Pcn874Error::InvalidConfig(format!(
                "concentration_threshold_pct must be a non-negative number, got {}",
                self.concentration_threshold_pct
            )));
        }
        if self.page_size == 0 {
            return Err(Pcn874Error::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The first line of a PCN874 file. All fields are the raw column text; monetary
/// fields keep their leading sign character and are still in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderRecord {
    pub constant_start: String,
    pub company_id: String,
    pub report_date: String,
    pub constant_one: String,
    pub file_creation_date: String,
    pub total_taxable_amount: String,
    pub vat_on_taxable: String,
    pub other_rate_deals_amount: String,
    pub other_rate_vat: String,
    pub total_transaction_records: String,
    pub vat_exempt_amount: String,
    pub other_input_vat: String,
    pub equipment_input_vat: String,
    pub other_and_equipment_record_count: String,
    pub total_amount_to_pay: String,
}

impl HeaderRecord {
    /// Re-encodes the header at its original column offsets.
    pub fn to_line(&self) -> String {
        [
            self.constant_start.as_str(),
            &self.company_id,
            &self.report_date,
            &self.constant_one,
            &self.file_creation_date,
            &self.total_taxable_amount,
            &self.vat_on_taxable,
            &self.other_rate_deals_amount,
            &self.other_rate_vat,
            &self.total_transaction_records,
            &self.vat_exempt_amount,
            &self.other_input_vat,
            &self.equipment_input_vat,
            &self.other_and_equipment_record_count,
            &self.total_amount_to_pay,
        ]
        .concat()
    }

    pub fn has_valid_company_id(&self) -> bool {
        is_company_id(&self.company_id)
    }

    pub fn file_creation_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.file_creation_date, "%Y%m%d").ok()
    }
}

/// VAT rate derived from a transaction's amounts, rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxRate {
    Percent(f64),
    NotApplicable,
}

impl TaxRate {
    pub fn from_amounts(vat_minor: i64, invoice_minor: i64) -> Self {
        if invoice_minor == 0 {
            TaxRate::NotApplicable
        } else {
            TaxRate::Percent(round_to(
                vat_minor as f64 / invoice_minor as f64 * 100.0,
                2,
            ))
        }
    }

    pub fn percent(self) -> Option<f64> {
        match self {
            TaxRate::Percent(p) => Some(p),
            TaxRate::NotApplicable => None,
        }
    }
}

impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxRate::Percent(p) => write!(f, "{:.2}%", p),
            TaxRate::NotApplicable => write!(f, "N/A"),
        }
    }
}

/// One transaction line of a PCN874 file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub record_type: RecordType,
    pub vat_file_number: String,
    pub invoice_date: String,
    pub reference_group: String,
    pub reference_number: String,
    pub vat_amount_in_invoice: String,
    pub cancel_or_credit_sign: char,
    /// Minor units. Carries the cancel/credit sign as a prefix only when that
    /// sign is literally `+` or `-`; otherwise it is the raw unsigned digits.
    pub invoice_amount: String,
    pub future_data_field: String,
    pub tax_rate: TaxRate,
    /// Signed invoice amount in minor units, parsed once at decode time.
    /// Unparsable text counts as zero.
    pub invoice_amount_minor: i64,
    /// VAT amount in minor units, parsed once at decode time.
    pub vat_amount_minor: i64,
}

impl TransactionRecord {
    pub fn has_explicit_sign(&self) -> bool {
        matches!(self.cancel_or_credit_sign, '+' | '-')
    }

    /// The invoice amount column as it appears on the line, without any sign prefix.
    pub fn invoice_amount_digits(&self) -> &str {
        if self.has_explicit_sign() {
            self.invoice_amount.get(1..).unwrap_or("")
        } else {
            &self.invoice_amount
        }
    }

    /// `vat / invoice * 100` without rounding, undefined for a zero invoice amount.
    pub fn exact_tax_rate(&self) -> Option<f64> {
        if self.invoice_amount_minor == 0 {
            None
        } else {
            Some(self.vat_amount_minor as f64 / self.invoice_amount_minor as f64 * 100.0)
        }
    }

    /// Blank or zero-filled VAT file numbers identify no counterparty.
    pub fn is_unidentified(&self) -> bool {
        self.vat_file_number.trim().chars().all(|c| c == '0')
    }

    pub fn invoice_date_parsed(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.invoice_date, "%Y%m%d").ok()
    }

    /// Re-encodes the transaction at its original column offsets.
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(60);
        line.push(self.record_type.code());
        line.push_str(&self.vat_file_number);
        line.push_str(&self.invoice_date);
        line.push_str(&self.reference_group);
        line.push_str(&self.reference_number);
        line.push_str(&self.vat_amount_in_invoice);
        line.push(self.cancel_or_credit_sign);
        line.push_str(self.invoice_amount_digits());
        line.push_str(&self.future_data_field);
        line
    }
}

/// A decoded PCN874 file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub header: HeaderRecord,
    /// In file line order.
    pub transactions: Vec<TransactionRecord>,
    pub footer: String,
}
