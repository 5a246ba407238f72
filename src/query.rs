use crate::error::{Pcn874Error, Result};
use crate::schema::TransactionRecord;
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Columns of a transaction as exposed to browsing and export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionField {
    RecordType,
    VatFileNumber,
    InvoiceDate,
    ReferenceGroup,
    ReferenceNumber,
    VatAmountInInvoice,
    CancelOrCreditSign,
    InvoiceAmount,
    FutureDataField,
    TaxRate,
}

/// Columns shown in listings, in display order.
pub const DISPLAY_FIELDS: [TransactionField; 8] = [
    TransactionField::RecordType,
    TransactionField::VatFileNumber,
    TransactionField::InvoiceDate,
    TransactionField::ReferenceNumber,
    TransactionField::VatAmountInInvoice,
    TransactionField::InvoiceAmount,
    TransactionField::FutureDataField,
    TransactionField::TaxRate,
];

impl TransactionField {
    pub fn name(self) -> &'static str {
        match self {
            TransactionField::RecordType => "recordType",
            TransactionField::VatFileNumber => "vatFileNumber",
            TransactionField::InvoiceDate => "invoiceDate",
            TransactionField::ReferenceGroup => "referenceGroup",
            TransactionField::ReferenceNumber => "referenceNumber",
            TransactionField::VatAmountInInvoice => "vatAmountInInvoice",
            TransactionField::CancelOrCreditSign => "cancelOrCreditSign",
            TransactionField::InvoiceAmount => "invoiceAmount",
            TransactionField::FutureDataField => "futureDataField",
            TransactionField::TaxRate => "taxRate",
        }
    }

    pub fn is_displayable(self) -> bool {
        !matches!(
            self,
            TransactionField::ReferenceGroup | TransactionField::CancelOrCreditSign
        )
    }

    pub fn value(self, txn: &TransactionRecord) -> String {
        match self {
            TransactionField::RecordType => txn.record_type.to_string(),
            TransactionField::VatFileNumber => txn.vat_file_number.clone(),
            TransactionField::InvoiceDate => txn.invoice_date.clone(),
            TransactionField::ReferenceGroup => txn.reference_group.clone(),
            TransactionField::ReferenceNumber => txn.reference_number.clone(),
            TransactionField::VatAmountInInvoice => txn.vat_amount_in_invoice.clone(),
            TransactionField::CancelOrCreditSign => txn.cancel_or_credit_sign.to_string(),
            TransactionField::InvoiceAmount => txn.invoice_amount.clone(),
            TransactionField::FutureDataField => txn.future_data_field.clone(),
            TransactionField::TaxRate => txn.tax_rate.to_string(),
        }
    }
}

impl FromStr for TransactionField {
    type Err = Pcn874Error;

    fn from_str(s: &str) -> Result<Self> {
        const ALL: [TransactionField; 10] = [
            TransactionField::RecordType,
            TransactionField::VatFileNumber,
            TransactionField::InvoiceDate,
            TransactionField::ReferenceGroup,
            TransactionField::ReferenceNumber,
            TransactionField::VatAmountInInvoice,
            TransactionField::CancelOrCreditSign,
            TransactionField::InvoiceAmount,
            TransactionField::FutureDataField,
            TransactionField::TaxRate,
        ];
        ALL.into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| Pcn874Error::InvalidConfig(format!("Unknown transaction column '{}'", s)))
    }
}

impl fmt::Display for TransactionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchColumn {
    /// Every displayable column
    #[default]
    All,
    Field(TransactionField),
}

/// A case-insensitive substring search over transactions, returning one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub needle: String,
    pub column: SearchColumn,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            needle: String::new(),
            column: SearchColumn::All,
            page: 1,
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<'a> {
    pub page: usize,
    pub total_pages: usize,
    pub total_matches: usize,
    pub items: Vec<&'a TransactionRecord>,
}

impl TransactionQuery {
    pub fn new(needle: impl Into<String>) -> Self {
        Self {
            needle: needle.into(),
            ..Self::default()
        }
    }

    pub fn column(mut self, column: SearchColumn) -> Self {
        self.column = column;
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn matches(&self, txn: &TransactionRecord) -> bool {
        if self.needle.is_empty() {
            return true;
        }
        let needle = self.needle.to_lowercase();
        match self.column {
            SearchColumn::All => DISPLAY_FIELDS
                .iter()
                .any(|f| f.value(txn).to_lowercase().contains(&needle)),
            SearchColumn::Field(field) => field.value(txn).to_lowercase().contains(&needle),
        }
    }

    /// Filters and paginates. Pages past the end clamp to the last page.
    pub fn run<'a, I>(&self, txns: I) -> Page<'a>
    where
        I: IntoIterator<Item = &'a TransactionRecord>,
    {
        let matched: Vec<&TransactionRecord> = txns.into_iter().filter(|t| self.matches(t)).collect();
        let page_size = self.page_size.max(1);
        let total_pages = matched.len().div_ceil(page_size);
        let page = self.page.clamp(1, total_pages.max(1));

        let items = matched
            .iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .copied()
            .collect();

        Page {
            page,
            total_pages,
            total_matches: matched.len(),
            items,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CsvOutRow<'a> {
    record_type: char,
    vat_file_number: &'a str,
    invoice_date: &'a str,
    reference_number: &'a str,
    vat_amount_in_invoice: &'a str,
    invoice_amount: &'a str,
    future_data_field: &'a str,
    tax_rate: String,
}

/// Writes the displayable columns of each transaction, plus its tax rate, as CSV
/// with a header row.
pub fn export_transactions_csv<'t, W, I>(writer: W, txns: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'t TransactionRecord>,
{
    let mut wrt = WriterBuilder::new().from_writer(writer);

    for t in txns {
        wrt.serialize(CsvOutRow {
            record_type: t.record_type.code(),
            vat_file_number: &t.vat_file_number,
            invoice_date: &t.invoice_date,
            reference_number: &t.reference_number,
            vat_amount_in_invoice: &t.vat_amount_in_invoice,
            invoice_amount: &t.invoice_amount,
            future_data_field: &t.future_data_field,
            tax_rate: t.tax_rate.to_string(),
        })?;
    }
    wrt.flush()?;
    Ok(())
}
