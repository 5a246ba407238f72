use crate::decoder::RecordDecoder;
use crate::error::{Pcn874Error, Result};
use crate::ingestion::{decode_file_with, decode_files};
use crate::schema::{HeaderRecord, ParsedFile, TransactionRecord};
use crate::utils::format_report_date;
use crate::validation::{check_company_ids, extract_company_id, validate_reporting_period};
use log::{debug, info, warn};
use thiserror::Error;

/// An upload that was refused admission. Files already in the batch are untouched.
#[derive(Error, Debug)]
#[error("File rejected: {reason}")]
pub struct RejectedFile {
    #[source]
    pub reason: Pcn874Error,
}

impl From<Pcn874Error> for RejectedFile {
    fn from(reason: Pcn874Error) -> Self {
        Self { reason }
    }
}

/// Monthly files for a single company, owned for the lifetime of one request.
#[derive(Debug, Clone, Default)]
pub struct FileBatch {
    company_id: Option<String>,
    files: Vec<ParsedFile>,
}

impl FileBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a batch from files that were already decoded, checking once that
    /// they all share a company id.
    pub fn from_decoded(files: Vec<ParsedFile>) -> Result<Self> {
        check_company_ids(&files)?;
        let company_id = files.first().map(|f| f.header.company_id.clone());
        Ok(Self { company_id, files })
    }

    /// Decodes every upload in parallel, then validates the joined header set and
    /// merges. The first file that fails to decode fails the whole batch.
    pub fn decode_all<T>(decoder: &RecordDecoder, inputs: &[T]) -> Result<Self>
    where
        T: AsRef<[u8]> + Sync,
    {
        let files = decode_files(decoder, inputs)
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        let batch = Self::from_decoded(files)?;
        info!(
            "Decoded batch of {} files with {} transactions",
            batch.len(),
            batch.transaction_count()
        );
        Ok(batch)
    }

    /// Gates a single raw upload on company id and, when given, the declared
    /// filing period, then decodes it into the batch.
    pub fn admit(
        &mut self,
        decoder: &RecordDecoder,
        raw: &[u8],
        declared_period: Option<&str>,
    ) -> std::result::Result<&ParsedFile, RejectedFile> {
        match self.try_admit(decoder, raw, declared_period) {
            Ok(index) => {
                let file = &self.files[index];
                info!(
                    "Admitted file for company {} period {} ({} transactions)",
                    file.header.company_id,
                    format_report_date(&file.header.report_date),
                    file.transactions.len()
                );
                Ok(file)
            }
            Err(reason) => {
                warn!("Rejected upload: {}", reason);
                Err(RejectedFile::from(reason))
            }
        }
    }

    fn try_admit(
        &mut self,
        decoder: &RecordDecoder,
        raw: &[u8],
        declared_period: Option<&str>,
    ) -> Result<usize> {
        let text = std::str::from_utf8(raw)?;

        let company_id = extract_company_id(text)?;
        if let Some(expected) = &self.company_id {
            if *expected != company_id {
                return Err(Pcn874Error::CompanyIdMismatch {
                    expected: expected.clone(),
                    found: company_id,
                });
            }
        }

        if let Some(period) = declared_period {
            validate_reporting_period(text, period)?;
        }

        let parsed = decode_file_with(decoder, text)?;
        if parsed.header.company_id != company_id {
            return Err(Pcn874Error::CompanyIdMismatch {
                expected: company_id,
                found: parsed.header.company_id,
            });
        }

        debug!(
            "File for period {} passed admission checks",
            parsed.header.report_date
        );

        self.company_id.get_or_insert(company_id);
        self.files.push(parsed);
        Ok(self.files.len() - 1)
    }

    pub fn company_id(&self) -> Option<&str> {
        self.company_id.as_deref()
    }

    pub fn files(&self) -> &[ParsedFile] {
        &self.files
    }

    pub fn headers(&self) -> impl Iterator<Item = &HeaderRecord> {
        self.files.iter().map(|f| &f.header)
    }

    /// All transactions merged in file order, then line order.
    pub fn transactions(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.files.iter().flat_map(|f| f.transactions.iter())
    }

    pub fn transaction_count(&self) -> usize {
        self.files.iter().map(|f| f.transactions.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Admits one raw upload into `batch` using lenient numeric parsing.
pub fn admit_to_batch<'b>(
    batch: &'b mut FileBatch,
    raw: &[u8],
    declared_period: Option<&str>,
) -> std::result::Result<&'b ParsedFile, RejectedFile> {
    batch.admit(&RecordDecoder::default(), raw, declared_period)
}
