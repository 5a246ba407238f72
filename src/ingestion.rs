use crate::decoder::RecordDecoder;
use crate::error::{Pcn874Error, Result};
use crate::schema::ParsedFile;
use log::debug;
use std::num::NonZeroUsize;
use std::thread;

/// Splits raw file text into header, transactions and footer and decodes each line.
///
/// Lines are trimmed and blank lines dropped. The first line is the header, the
/// first line starting with `X` is the footer, and everything strictly between
/// them is a transaction. Lines after the footer are ignored.
pub fn decode_file_with(decoder: &RecordDecoder, text: &str) -> Result<ParsedFile> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() < 2 {
        return Err(Pcn874Error::TooFewLines(lines.len()));
    }

    let footer_index = lines
        .iter()
        .position(|line| line.starts_with('X'))
        .ok_or(Pcn874Error::NoFooterFound)?;

    let header = decoder.decode_header(lines[0])?;

    let transactions = lines
        .get(1..footer_index)
        .unwrap_or(&[])
        .iter()
        .map(|line| decoder.decode_transaction(line))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "Decoded file for company {} period {}: {} transactions",
        header.company_id,
        header.report_date,
        transactions.len()
    );

    Ok(ParsedFile {
        header,
        transactions,
        footer: lines[footer_index].to_string(),
    })
}

pub fn decode_file(text: &str) -> Result<ParsedFile> {
    decode_file_with(&RecordDecoder::default(), text)
}

/// Decodes raw uploaded bytes, which must be UTF-8 text.
pub fn decode_file_bytes(decoder: &RecordDecoder, bytes: &[u8]) -> Result<ParsedFile> {
    let text = std::str::from_utf8(bytes)?;
    decode_file_with(decoder, text)
}

/// Number of decode workers for `inputs` uploads: one per available core, never
/// more than there are uploads.
pub fn worker_count(inputs: usize) -> usize {
    let cores = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    cores.min(inputs).max(1)
}

/// Decodes several uploads independently over a bounded pool of scoped workers,
/// each taking a contiguous chunk of the inputs.
///
/// Results are returned in input order; a failure in one file does not affect the
/// others.
pub fn decode_files<T>(decoder: &RecordDecoder, inputs: &[T]) -> Vec<Result<ParsedFile>>
where
    T: AsRef<[u8]> + Sync,
{
    let workers = worker_count(inputs.len());
    if workers <= 1 {
        return inputs
            .iter()
            .map(|bytes| decode_file_bytes(decoder, bytes.as_ref()))
            .collect();
    }

    let chunk_size = inputs.len().div_ceil(workers);
    debug!("Decoding {} files on {} workers", inputs.len(), workers);

    thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|bytes| decode_file_bytes(decoder, bytes.as_ref()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(results) => results,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}
