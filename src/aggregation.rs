use crate::continuity::{headers_by_period, ReportPeriod};
use crate::record_types::{RecordType, TaxDirection, ALL_RECORD_TYPES};
use crate::schema::{AnalysisConfig, HeaderRecord, TransactionRecord};
use crate::utils::{lenient_minor_units, minor_to_currency};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key used for transactions whose VAT file number is blank.
pub const UNKNOWN_VAT_FILE: &str = "Unknown";

/// Per-key statistics for one grouping of transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStat {
    pub key: String,
    pub display_name: String,
    pub count: usize,
    /// Share of the grouping's filtered transaction count, in percent.
    pub percentage: f64,
    pub total_invoice_amount_minor: i64,
    /// `total_invoice_amount_minor` in shekels.
    pub total_invoice_amount: f64,
    /// Unrounded `vat / invoice * 100` for every member with a non-zero invoice amount.
    pub tax_rates: Vec<f64>,
    pub average_tax_rate: f64,
    /// The first few member transactions in file order.
    pub sample_transactions: Vec<TransactionRecord>,
}

impl AggregateStat {
    fn seeded(key: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            count: 0,
            percentage: 0.0,
            total_invoice_amount_minor: 0,
            total_invoice_amount: 0.0,
            tax_rates: Vec::new(),
            average_tax_rate: 0.0,
            sample_transactions: Vec::new(),
        }
    }
}

/// Input and output sums, each as a share of the unfiltered grand total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turnover {
    pub input_minor: i64,
    pub output_minor: i64,
    pub grand_total_minor: i64,
    pub input_share_pct: f64,
    pub output_share_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTotals {
    pub transaction_count: usize,
    pub filtered_count: usize,
    pub grand_total_minor: i64,
    pub filtered_total_minor: i64,
}

impl BatchTotals {
    pub fn grand_total(&self) -> f64 {
        minor_to_currency(self.grand_total_minor)
    }

    pub fn filtered_total(&self) -> f64 {
        minor_to_currency(self.filtered_total_minor)
    }
}

/// Header monetary fields and record counts summed across every file of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderTotals {
    pub file_count: usize,
    pub total_taxable_amount: i64,
    pub vat_on_taxable: i64,
    pub other_rate_deals_amount: i64,
    pub other_rate_vat: i64,
    pub total_transaction_records: i64,
    pub vat_exempt_amount: i64,
    pub other_input_vat: i64,
    pub equipment_input_vat: i64,
    pub other_and_equipment_record_count: i64,
    pub total_amount_to_pay: i64,
}

impl HeaderTotals {
    pub fn total_records(&self) -> i64 {
        self.total_transaction_records + self.other_and_equipment_record_count
    }
}

/// Header figures of one monthly report, in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTaxPoint {
    pub period: ReportPeriod,
    pub total_taxable_amount: i64,
    pub other_rate_deals_amount: i64,
    /// VAT on taxable deals plus VAT on other-rate deals.
    pub output_vat: i64,
    /// Other input VAT plus equipment input VAT.
    pub input_vat: i64,
    pub total_amount_to_pay: i64,
}

impl PeriodTaxPoint {
    pub fn net_vat(&self) -> i64 {
        self.output_vat - self.input_vat
    }
}

/// True when `record_type` passes a record-type filter. No filter, or an empty
/// one, passes everything.
pub fn matches_filter(record_type: RecordType, filter: Option<&[RecordType]>) -> bool {
    match filter {
        Some(types) if !types.is_empty() => types.contains(&record_type),
        _ => true,
    }
}

fn percentage_of(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn share_of(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub struct Aggregator<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> Aggregator<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Groups transactions by record type.
    ///
    /// One row is seeded per key in `keys` (all eleven known types when `keys` is
    /// empty), so types with no transactions still appear with zero values.
    /// Transactions of other types, including unknown codes, are left out of the
    /// grouping and of its percentage denominator.
    pub fn aggregate_by_record_type<'t, I>(&self, txns: I, keys: &[RecordType]) -> Vec<AggregateStat>
    where
        I: IntoIterator<Item = &'t TransactionRecord>,
    {
        let keys: Vec<RecordType> = if keys.is_empty() {
            ALL_RECORD_TYPES.to_vec()
        } else {
            let mut unique = Vec::with_capacity(keys.len());
            for key in keys.iter().copied().filter(|k| k.is_known()) {
                if !unique.contains(&key) {
                    unique.push(key);
                }
            }
            unique
        };

        let mut stats: Vec<AggregateStat> = keys
            .iter()
            .map(|t| AggregateStat::seeded(t.code().to_string(), t.display_name()))
            .collect();
        let index: HashMap<RecordType, usize> =
            keys.iter().enumerate().map(|(i, t)| (*t, i)).collect();

        let mut filtered = 0;
        for txn in txns {
            if let Some(&i) = index.get(&txn.record_type) {
                self.accumulate(&mut stats[i], txn);
                filtered += 1;
            }
        }

        debug!(
            "Aggregated {} transactions over {} record types",
            filtered,
            stats.len()
        );
        self.finish(stats, filtered)
    }

    /// Groups transactions by counterparty VAT file number, in first-seen order
    /// before sorting. Blank numbers share the [`UNKNOWN_VAT_FILE`] key.
    pub fn aggregate_by_vat_file<'t, I>(
        &self,
        txns: I,
        filter: Option<&[RecordType]>,
    ) -> Vec<AggregateStat>
    where
        I: IntoIterator<Item = &'t TransactionRecord>,
    {
        let mut stats: Vec<AggregateStat> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut filtered = 0;

        for txn in txns {
            if !matches_filter(txn.record_type, filter) {
                continue;
            }
            let key = match txn.vat_file_number.trim() {
                "" => UNKNOWN_VAT_FILE.to_string(),
                _ => txn.vat_file_number.clone(),
            };
            let i = *index.entry(key.clone()).or_insert_with(|| {
                stats.push(AggregateStat::seeded(key.clone(), key));
                stats.len() - 1
            });
            self.accumulate(&mut stats[i], txn);
            filtered += 1;
        }

        debug!(
            "Aggregated {} transactions over {} VAT file numbers",
            filtered,
            stats.len()
        );
        self.finish(stats, filtered)
    }

    fn accumulate(&self, stat: &mut AggregateStat, txn: &TransactionRecord) {
        stat.count += 1;
        stat.total_invoice_amount_minor += txn.invoice_amount_minor;
        if let Some(rate) = txn.exact_tax_rate() {
            stat.tax_rates.push(rate);
        }
        if stat.sample_transactions.len() < self.config.sample_size {
            stat.sample_transactions.push(txn.clone());
        }
    }

    fn finish(&self, mut stats: Vec<AggregateStat>, filtered: usize) -> Vec<AggregateStat> {
        for stat in &mut stats {
            stat.percentage = percentage_of(stat.count, filtered);
            stat.total_invoice_amount = minor_to_currency(stat.total_invoice_amount_minor);
            stat.average_tax_rate = if stat.tax_rates.is_empty() {
                0.0
            } else {
                stat.tax_rates.iter().sum::<f64>() / stat.tax_rates.len() as f64
            };
        }

        stats.sort_by(|a, b| {
            b.total_invoice_amount_minor
                .unsigned_abs()
                .cmp(&a.total_invoice_amount_minor.unsigned_abs())
        });
        stats
    }

    pub fn compute_turnover<'t, I>(&self, txns: I) -> Turnover
    where
        I: IntoIterator<Item = &'t TransactionRecord>,
    {
        let mut turnover = Turnover {
            input_minor: 0,
            output_minor: 0,
            grand_total_minor: 0,
            input_share_pct: 0.0,
            output_share_pct: 0.0,
        };

        for txn in txns {
            let amount = txn.invoice_amount_minor;
            turnover.grand_total_minor += amount;
            match txn.record_type.direction() {
                Some(TaxDirection::Input) => turnover.input_minor += amount,
                Some(TaxDirection::Output) => turnover.output_minor += amount,
                None => {}
            }
        }

        turnover.input_share_pct = share_of(turnover.input_minor, turnover.grand_total_minor);
        turnover.output_share_pct = share_of(turnover.output_minor, turnover.grand_total_minor);
        turnover
    }

    pub fn compute_totals<'t, I>(&self, txns: I, filter: Option<&[RecordType]>) -> BatchTotals
    where
        I: IntoIterator<Item = &'t TransactionRecord>,
    {
        let mut totals = BatchTotals {
            transaction_count: 0,
            filtered_count: 0,
            grand_total_minor: 0,
            filtered_total_minor: 0,
        };

        for txn in txns {
            let amount = txn.invoice_amount_minor;
            totals.transaction_count += 1;
            totals.grand_total_minor += amount;
            if matches_filter(txn.record_type, filter) {
                totals.filtered_count += 1;
                totals.filtered_total_minor += amount;
            }
        }

        totals
    }
}

pub fn aggregate_by_record_type<'t, I>(txns: I, keys: &[RecordType]) -> Vec<AggregateStat>
where
    I: IntoIterator<Item = &'t TransactionRecord>,
{
    Aggregator::new(&AnalysisConfig::default()).aggregate_by_record_type(txns, keys)
}

pub fn aggregate_by_vat_file<'t, I>(txns: I, filter: Option<&[RecordType]>) -> Vec<AggregateStat>
where
    I: IntoIterator<Item = &'t TransactionRecord>,
{
    Aggregator::new(&AnalysisConfig::default()).aggregate_by_vat_file(txns, filter)
}

pub fn compute_turnover<'t, I>(txns: I) -> Turnover
where
    I: IntoIterator<Item = &'t TransactionRecord>,
{
    Aggregator::new(&AnalysisConfig::default()).compute_turnover(txns)
}

/// Sums header fields across files. Unparsable fields contribute zero.
pub fn sum_headers<'h, I>(headers: I) -> HeaderTotals
where
    I: IntoIterator<Item = &'h HeaderRecord>,
{
    let mut totals = HeaderTotals::default();
    for h in headers {
        totals.file_count += 1;
        totals.total_taxable_amount +=
            lenient_minor_units(&h.total_taxable_amount, "totalTaxableAmount");
        totals.vat_on_taxable += lenient_minor_units(&h.vat_on_taxable, "vatOnTaxable");
        totals.other_rate_deals_amount +=
            lenient_minor_units(&h.other_rate_deals_amount, "otherRateDealsAmount");
        totals.other_rate_vat += lenient_minor_units(&h.other_rate_vat, "otherRateVat");
        totals.total_transaction_records +=
            lenient_minor_units(&h.total_transaction_records, "totalTransactionRecords");
        totals.vat_exempt_amount += lenient_minor_units(&h.vat_exempt_amount, "vatExemptAmount");
        totals.other_input_vat += lenient_minor_units(&h.other_input_vat, "otherInputVat");
        totals.equipment_input_vat +=
            lenient_minor_units(&h.equipment_input_vat, "equipmentInputVat");
        totals.other_and_equipment_record_count += lenient_minor_units(
            &h.other_and_equipment_record_count,
            "otherAndEquipmentRecordCount",
        );
        totals.total_amount_to_pay +=
            lenient_minor_units(&h.total_amount_to_pay, "totalAmountToPay");
    }
    totals
}

/// One point per report, ordered by period. Reports for the same month keep
/// their batch order; headers without a valid `reportDate` are left out.
pub fn period_series<'h, I>(headers: I) -> Vec<PeriodTaxPoint>
where
    I: IntoIterator<Item = &'h HeaderRecord>,
{
    let series: Vec<PeriodTaxPoint> = headers_by_period(headers)
        .into_iter()
        .map(|(period, h)| PeriodTaxPoint {
            period,
            total_taxable_amount: lenient_minor_units(
                &h.total_taxable_amount,
                "totalTaxableAmount",
            ),
            other_rate_deals_amount: lenient_minor_units(
                &h.other_rate_deals_amount,
                "otherRateDealsAmount",
            ),
            output_vat: lenient_minor_units(&h.vat_on_taxable, "vatOnTaxable")
                + lenient_minor_units(&h.other_rate_vat, "otherRateVat"),
            input_vat: lenient_minor_units(&h.other_input_vat, "otherInputVat")
                + lenient_minor_units(&h.equipment_input_vat, "equipmentInputVat"),
            total_amount_to_pay: lenient_minor_units(&h.total_amount_to_pay, "totalAmountToPay"),
        })
        .collect();

    debug!("Built tax series over {} reports", series.len());
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TaxRate;

    fn txn(record_type: RecordType, vat_file: &str, vat: &str, amount: &str) -> TransactionRecord {
        let sign = amount.chars().next().filter(|c| *c == '+' || *c == '-');
        TransactionRecord {
            record_type,
            vat_file_number: vat_file.to_string(),
            invoice_date: "20230115".to_string(),
            reference_group: "0000".to_string(),
            reference_number: "000000001".to_string(),
            vat_amount_in_invoice: vat.to_string(),
            cancel_or_credit_sign: sign.unwrap_or(' '),
            invoice_amount: amount.to_string(),
            future_data_field: "000000000".to_string(),
            tax_rate: TaxRate::NotApplicable,
            invoice_amount_minor: lenient_minor_units(amount, "invoiceAmount"),
            vat_amount_minor: lenient_minor_units(vat, "vatAmountInInvoice"),
        }
    }

    fn find<'s>(stats: &'s [AggregateStat], key: &str) -> &'s AggregateStat {
        stats.iter().find(|s| s.key == key).unwrap()
    }

    #[test]
    fn test_record_type_percentages_sum_to_hundred() {
        let mut txns = Vec::new();
        for _ in 0..40 {
            txns.push(txn(RecordType::S, "123456782", "000001800", "+0000010000"));
        }
        for _ in 0..60 {
            txns.push(txn(RecordType::T, "223456782", "000000900", "+0000005000"));
        }

        let stats = aggregate_by_record_type(&txns, &[]);
        assert_eq!(stats.len(), 11);
        assert_eq!(find(&stats, "S").percentage, 40.0);
        assert_eq!(find(&stats, "T").percentage, 60.0);
        for stat in stats.iter().filter(|s| s.key != "S" && s.key != "T") {
            assert_eq!(stat.percentage, 0.0);
            assert_eq!(stat.count, 0);
        }
        let sum: f64 = stats.iter().map(|s| s.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_record_type_totals_rates_and_samples() {
        let txns = vec![
            txn(RecordType::S, "123456782", "000001800", "+0000010000"),
            txn(RecordType::S, "123456782", "000000000", "+0000000000"),
            txn(RecordType::S, "123456782", "000003600", "-0000020000"),
            txn(RecordType::S, "123456782", "000001800", "+0000010000"),
            txn(RecordType::L, "000000000", "000001800", "0000010000"),
        ];
        let stats = aggregate_by_record_type(&txns, &[]);

        let s = find(&stats, "S");
        assert_eq!(s.display_name, "Standard Rated Sales");
        assert_eq!(s.count, 4);
        assert_eq!(s.total_invoice_amount_minor, 0);
        assert_eq!(s.total_invoice_amount, 0.0);
        assert_eq!(s.tax_rates.len(), 3);
        assert!((s.average_tax_rate - 6.0).abs() < 1e-9);
        assert_eq!(s.sample_transactions.len(), 3);
        assert_eq!(s.sample_transactions[2].invoice_amount, "-0000020000");

        let l = find(&stats, "L");
        assert_eq!(l.total_invoice_amount_minor, 10_000);
        assert_eq!(l.total_invoice_amount, 100.0);
        assert_eq!(stats[0].key, "L");
    }

    #[test]
    fn test_sort_is_descending_by_absolute_total_and_stable() {
        let txns = vec![
            txn(RecordType::T, "1", "000000000", "+0000001000"),
            txn(RecordType::S, "1", "000000000", "-0000050000"),
            txn(RecordType::M, "1", "000000000", "+0000001000"),
        ];
        let keys = [RecordType::T, RecordType::M, RecordType::S, RecordType::Y];
        let stats = aggregate_by_record_type(&txns, &keys);
        let order: Vec<&str> = stats.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(order, vec!["S", "T", "M", "Y"]);
    }

    #[test]
    fn test_filtered_keys_use_filtered_denominator() {
        let txns = vec![
            txn(RecordType::S, "1", "000000000", "+0000001000"),
            txn(RecordType::S, "1", "000000000", "+0000001000"),
            txn(RecordType::T, "1", "000000000", "+0000001000"),
            txn(RecordType::Unknown('Q'), "1", "000000000", "+0000001000"),
        ];
        let stats = aggregate_by_record_type(&txns, &[RecordType::S]);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].percentage, 100.0);

        let all = aggregate_by_record_type(&txns, &[]);
        assert!((find(&all, "S").percentage - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_vat_file_grouping_with_filter() {
        let txns = vec![
            txn(RecordType::T, "111111118", "000000900", "+0000005000"),
            txn(RecordType::S, "222222226", "000001800", "+0000010000"),
            txn(RecordType::T, "111111118", "000000900", "+0000005000"),
            txn(RecordType::T, "         ", "000000900", "+0000005000"),
        ];

        let all = aggregate_by_vat_file(&txns, None);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].total_invoice_amount_minor, 10_000);
        assert_eq!(all[0].key, "111111118");
        assert_eq!(all[1].key, "222222226");
        assert_eq!(find(&all, UNKNOWN_VAT_FILE).count, 1);

        let purchases = aggregate_by_vat_file(&txns, Some(&[RecordType::T]));
        assert_eq!(purchases.len(), 2);
        assert!((find(&purchases, "111111118").percentage - 200.0 / 3.0).abs() < 1e-9);
        let sum: f64 = purchases.iter().map(|s| s.percentage).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_grouping_has_zero_percentages() {
        let stats = aggregate_by_record_type(&Vec::<TransactionRecord>::new(), &[]);
        assert!(stats.iter().all(|s| s.percentage == 0.0 && s.average_tax_rate == 0.0));
        assert!(aggregate_by_vat_file(&Vec::<TransactionRecord>::new(), None).is_empty());
    }

    #[test]
    fn test_turnover_shares_use_unfiltered_total() {
        let txns = vec![
            txn(RecordType::S, "1", "000000000", "+0000030000"),
            txn(RecordType::T, "1", "000000000", "+0000010000"),
            txn(RecordType::Unknown('Q'), "1", "000000000", "+0000010000"),
        ];
        let turnover = compute_turnover(&txns);
        assert_eq!(turnover.output_minor, 30_000);
        assert_eq!(turnover.input_minor, 10_000);
        assert_eq!(turnover.grand_total_minor, 50_000);
        assert_eq!(turnover.output_share_pct, 60.0);
        assert_eq!(turnover.input_share_pct, 20.0);

        let empty = compute_turnover(&Vec::<TransactionRecord>::new());
        assert_eq!(empty.input_share_pct, 0.0);
    }

    #[test]
    fn test_batch_totals_respect_filter() {
        let config = AnalysisConfig::default();
        let txns = vec![
            txn(RecordType::S, "1", "000000000", "+0000030000"),
            txn(RecordType::T, "1", "000000000", "-0000010000"),
        ];
        let totals = Aggregator::new(&config).compute_totals(&txns, Some(&[RecordType::T]));
        assert_eq!(totals.transaction_count, 2);
        assert_eq!(totals.filtered_count, 1);
        assert_eq!(totals.grand_total_minor, 20_000);
        assert_eq!(totals.filtered_total(), -100.0);
    }

    #[test]
    fn test_sum_headers() {
        let header = HeaderRecord {
            constant_start: "O".to_string(),
            company_id: "514649871".to_string(),
            report_date: "202301".to_string(),
            constant_one: "1".to_string(),
            file_creation_date: "20230210".to_string(),
            total_taxable_amount: "+00000100000".to_string(),
            vat_on_taxable: "+000018000".to_string(),
            other_rate_deals_amount: "+00000000000".to_string(),
            other_rate_vat: "+000000000".to_string(),
            total_transaction_records: "000000004".to_string(),
            vat_exempt_amount: "-00000005000".to_string(),
            other_input_vat: "+0000A0000".to_string(),
            equipment_input_vat: "+000000000".to_string(),
            other_and_equipment_record_count: "000000001".to_string(),
            total_amount_to_pay: "+00000018000".to_string(),
        };
        let totals = sum_headers(&[header.clone(), header]);
        assert_eq!(totals.file_count, 2);
        assert_eq!(totals.total_taxable_amount, 200_000);
        assert_eq!(totals.vat_exempt_amount, -10_000);
        assert_eq!(totals.other_input_vat, 0);
        assert_eq!(totals.total_records(), 10);
    }

    fn report(period: &str, vat: &str, other_vat: &str, input_vat: &str) -> HeaderRecord {
        HeaderRecord {
            constant_start: "O".to_string(),
            company_id: "514649871".to_string(),
            report_date: period.to_string(),
            constant_one: "1".to_string(),
            file_creation_date: "20230210".to_string(),
            total_taxable_amount: "+00000100000".to_string(),
            vat_on_taxable: vat.to_string(),
            other_rate_deals_amount: "+00000000000".to_string(),
            other_rate_vat: other_vat.to_string(),
            total_transaction_records: "000000001".to_string(),
            vat_exempt_amount: "+00000000000".to_string(),
            other_input_vat: input_vat.to_string(),
            equipment_input_vat: "+000001000".to_string(),
            other_and_equipment_record_count: "000000000".to_string(),
            total_amount_to_pay: "+00000018000".to_string(),
        }
    }

    #[test]
    fn test_period_series_sorts_unordered_reports() {
        let headers = vec![
            report("202304", "+000030000", "+000000000", "+000002000"),
            report("202301", "+000018000", "+000000500", "+000004000"),
            report("2023-2", "+000099999", "+000000000", "+000000000"),
            report("202302", "+000020000", "+0000A0000", "+000000000"),
        ];
        let series = period_series(&headers);

        let months: Vec<String> = series.iter().map(|p| p.period.to_string()).collect();
        assert_eq!(months, vec!["202301", "202302", "202304"]);

        assert_eq!(series[0].output_vat, 18_500);
        assert_eq!(series[0].input_vat, 5_000);
        assert_eq!(series[0].net_vat(), 13_500);
        assert_eq!(series[1].output_vat, 20_000);
        assert_eq!(series[2].input_vat, 3_000);
        assert_eq!(series[2].total_taxable_amount, 100_000);
    }

    #[test]
    fn test_period_series_keeps_duplicate_months_in_batch_order() {
        let headers = vec![
            report("202302", "+000001000", "+000000000", "+000000000"),
            report("202301", "+000002000", "+000000000", "+000000000"),
            report("202302", "+000003000", "+000000000", "+000000000"),
        ];
        let outputs: Vec<i64> = period_series(&headers).iter().map(|p| p.output_vat).collect();
        assert_eq!(outputs, vec![2_000, 1_000, 3_000]);
        assert!(period_series(&Vec::<HeaderRecord>::new()).is_empty());
    }
}
