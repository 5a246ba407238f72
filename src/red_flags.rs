use crate::record_types::{RecordType, TaxDirection};
use crate::schema::{AnalysisConfig, TransactionRecord};
use crate::utils::{format_nis, to_hundredths};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RedFlagCategory {
    /// Sales to unidentified customers above the reporting threshold
    UnidentifiedHighValue,
    /// Standard-rated sales (`S`) outside the VAT band
    StandardRatedSalesRate,
    /// Domestic purchases (`T`) outside the VAT band
    DomesticPurchasesRate,
    /// Any other record type outside the VAT band
    TaxRateOutOfBand(RecordType),
    /// A handful of input transactions dominating total input
    InputTaxConcentration,
}

impl RedFlagCategory {
    pub fn severity(self) -> Severity {
        match self {
            RedFlagCategory::UnidentifiedHighValue => Severity::Medium,
            RedFlagCategory::StandardRatedSalesRate => Severity::High,
            RedFlagCategory::DomesticPurchasesRate => Severity::Medium,
            RedFlagCategory::TaxRateOutOfBand(_) => Severity::Low,
            RedFlagCategory::InputTaxConcentration => Severity::High,
        }
    }

    pub fn for_rate_check(record_type: RecordType) -> Self {
        match record_type {
            RecordType::S => RedFlagCategory::StandardRatedSalesRate,
            RecordType::T => RedFlagCategory::DomesticPurchasesRate,
            other => RedFlagCategory::TaxRateOutOfBand(other),
        }
    }
}

/// Result of one heuristic over a transaction set. A detector that matched
/// nothing still yields an anomaly with a zero count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedFlagAnomaly {
    pub category: RedFlagCategory,
    pub severity: Severity,
    pub count: usize,
    pub description: String,
    pub transactions: Vec<TransactionRecord>,
}

impl RedFlagAnomaly {
    fn new(
        category: RedFlagCategory,
        description: String,
        transactions: Vec<TransactionRecord>,
    ) -> Self {
        Self {
            category,
            severity: category.severity(),
            count: transactions.len(),
            description,
            transactions,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.count > 0
    }
}

pub struct RedFlagDetector<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> RedFlagDetector<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// `L` transactions whose signed amount exceeds the configured threshold.
    pub fn detect_unidentified_high_value<'t, I>(&self, txns: I) -> RedFlagAnomaly
    where
        I: IntoIterator<Item = &'t TransactionRecord>,
    {
        let threshold = self.config.unidentified_threshold_minor;
        let matched: Vec<TransactionRecord> = txns
            .into_iter()
            .filter(|t| t.record_type == RecordType::L && t.invoice_amount_minor > threshold)
            .cloned()
            .collect();

        RedFlagAnomaly::new(
            RedFlagCategory::UnidentifiedHighValue,
            format!(
                "Transactions exceeding {} with unidentified customers",
                format_nis(threshold)
            ),
            matched,
        )
    }

    /// Transactions of `record_type` whose rounded tax rate is further than the
    /// tolerance from the standard rate. Rates that are not applicable are skipped.
    pub fn detect_tax_rate_out_of_band<'t, I>(
        &self,
        txns: I,
        record_type: RecordType,
    ) -> RedFlagAnomaly
    where
        I: IntoIterator<Item = &'t TransactionRecord>,
    {
        let matched: Vec<TransactionRecord> = txns
            .into_iter()
            .filter(|t| t.record_type == record_type)
            .filter(|t| match t.tax_rate.percent() {
                Some(rate) => self.is_out_of_band(rate),
                None => false,
            })
            .cloned()
            .collect();

        RedFlagAnomaly::new(
            RedFlagCategory::for_rate_check(record_type),
            format!(
                "{} transactions with tax rates outside {}% (±{}%)",
                record_type.display_name(),
                self.config.standard_vat_rate,
                self.config.vat_rate_tolerance
            ),
            matched,
        )
    }

    /// Compared in whole hundredths of a point so a rate exactly on the
    /// tolerance edge is never flagged.
    fn is_out_of_band(&self, rate: f64) -> bool {
        let deviation = (to_hundredths(rate) - to_hundredths(self.config.standard_vat_rate)).abs();
        deviation > to_hundredths(self.config.vat_rate_tolerance)
    }

    /// Flags when the largest positive input transactions make up more than the
    /// configured share of the total signed input amount.
    pub fn detect_input_concentration<'t, I>(&self, txns: I) -> RedFlagAnomaly
    where
        I: IntoIterator<Item = &'t TransactionRecord>,
    {
        let inputs: Vec<&TransactionRecord> = txns
            .into_iter()
            .filter(|t| t.record_type.direction() == Some(TaxDirection::Input))
            .collect();

        let total: i64 = inputs.iter().map(|t| t.invoice_amount_minor).sum();

        let mut positive: Vec<(i64, &TransactionRecord)> = inputs
            .iter()
            .map(|t| (t.invoice_amount_minor, *t))
            .filter(|(amount, _)| *amount > 0)
            .collect();
        positive.sort_by(|a, b| b.0.cmp(&a.0));
        positive.truncate(self.config.concentration_top_n);

        let top: i64 = positive.iter().map(|(amount, _)| amount).sum();

        if total > 0 && top > 0 {
            let pct = top as f64 / total as f64 * 100.0;
            debug!(
                "Top {} input transactions hold {:.2}% of {} input transactions",
                positive.len(),
                pct,
                inputs.len()
            );
            if pct > self.config.concentration_threshold_pct {
                return RedFlagAnomaly::new(
                    RedFlagCategory::InputTaxConcentration,
                    format!(
                        "Top {} input tax transactions represent {:.1}% of total input tax ({} out of {})",
                        self.config.concentration_top_n,
                        pct,
                        format_nis(top),
                        format_nis(total)
                    ),
                    positive.into_iter().map(|(_, t)| t.clone()).collect(),
                );
            }
        }

        RedFlagAnomaly::new(
            RedFlagCategory::InputTaxConcentration,
            "No input tax concentration detected".to_string(),
            Vec::new(),
        )
    }

    /// Runs every detector in a fixed order. Concentration is only evaluated when
    /// the filter selects the input side or no side at all.
    pub fn detect_all<'t, I>(&self, txns: I, filter: Option<&[RecordType]>) -> Vec<RedFlagAnomaly>
    where
        I: IntoIterator<Item = &'t TransactionRecord>,
    {
        let txns: Vec<&TransactionRecord> = txns.into_iter().collect();

        let mut anomalies = vec![
            self.detect_unidentified_high_value(txns.iter().copied()),
            self.detect_tax_rate_out_of_band(txns.iter().copied(), RecordType::S),
            self.detect_tax_rate_out_of_band(txns.iter().copied(), RecordType::T),
        ];

        match TaxDirection::of_filter(filter) {
            Some(TaxDirection::Input) | None => {
                anomalies.push(self.detect_input_concentration(txns.iter().copied()));
            }
            Some(TaxDirection::Output) => {}
        }

        anomalies
    }
}

pub fn detect_unidentified_high_value<'t, I>(txns: I) -> RedFlagAnomaly
where
    I: IntoIterator<Item = &'t TransactionRecord>,
{
    RedFlagDetector::new(&AnalysisConfig::default()).detect_unidentified_high_value(txns)
}

pub fn detect_tax_rate_out_of_band<'t, I>(txns: I, record_type: RecordType) -> RedFlagAnomaly
where
    I: IntoIterator<Item = &'t TransactionRecord>,
{
    RedFlagDetector::new(&AnalysisConfig::default()).detect_tax_rate_out_of_band(txns, record_type)
}

pub fn detect_input_concentration<'t, I>(txns: I) -> RedFlagAnomaly
where
    I: IntoIterator<Item = &'t TransactionRecord>,
{
    RedFlagDetector::new(&AnalysisConfig::default()).detect_input_concentration(txns)
}

pub fn detect_all<'t, I>(txns: I, filter: Option<&[RecordType]>) -> Vec<RedFlagAnomaly>
where
    I: IntoIterator<Item = &'t TransactionRecord>,
{
    RedFlagDetector::new(&AnalysisConfig::default()).detect_all(txns, filter)
}
