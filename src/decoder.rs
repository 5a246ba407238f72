//! Positional decoding of single PCN874 header and transaction lines.
//!
//! Every field is read by a cursor that advances by the field's fixed width.
//! Lines must be ASCII and at least as long as the layout they are decoded with;
//! anything past the last field is ignored.

use crate::error::{Pcn874Error, Result};
use crate::record_types::RecordType;
use crate::schema::{HeaderRecord, NumericParsing, TaxRate, TransactionRecord};
use crate::utils::{is_all_digits, lenient_minor_units, parse_minor_units};

/// constant(1) + company id(9) + report date(6) + constant(1) + creation date(8),
/// eight signed monetary fields and two 9-digit counts.
pub const HEADER_WIDTH: usize = 131;

/// type(1) + VAT file(9) + date(8) + group(4) + reference(9) + VAT(9) + sign(1)
/// + amount(10) + reserved(9).
pub const TRANSACTION_WIDTH: usize = 60;

struct FieldCursor<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    fn new(line: &'a str) -> Self {
        Self { line, pos: 0 }
    }

    fn take(&mut self, width: usize) -> &'a str {
        let field = &self.line[self.pos..self.pos + width];
        self.pos += width;
        field
    }

    fn take_owned(&mut self, width: usize) -> String {
        self.take(width).to_string()
    }

    /// A sign character followed by `width` digits, kept together verbatim.
    fn take_signed(&mut self, width: usize) -> String {
        self.take(1 + width).to_string()
    }
}

fn check_line(line: &str, kind: &'static str, required: usize) -> Result<()> {
    if !line.is_ascii() {
        return Err(Pcn874Error::NonAsciiLine { kind });
    }
    if line.len() < required {
        return Err(Pcn874Error::DecodeTooShort {
            kind,
            required,
            actual: line.len(),
        });
    }
    Ok(())
}

fn require_digits(value: &str, field: &'static str) -> Result<()> {
    if is_all_digits(value) {
        Ok(())
    } else {
        Err(Pcn874Error::MalformedNumber {
            field,
            value: value.to_string(),
        })
    }
}

fn require_signed(value: &str, field: &'static str) -> Result<()> {
    match value.as_bytes().first() {
        Some(b'+') | Some(b'-') => require_digits(&value[1..], field),
        _ => Err(Pcn874Error::MalformedNumber {
            field,
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordDecoder {
    numeric: NumericParsing,
}

impl RecordDecoder {
    pub fn new(numeric: NumericParsing) -> Self {
        Self { numeric }
    }

    pub fn numeric_parsing(&self) -> NumericParsing {
        self.numeric
    }

    pub fn decode_header(&self, line: &str) -> Result<HeaderRecord> {
        check_line(line, "Header", HEADER_WIDTH)?;

        let mut cursor = FieldCursor::new(line);
        let header = HeaderRecord {
            constant_start: cursor.take_owned(1),
            company_id: cursor.take_owned(9),
            report_date: cursor.take_owned(6),
            constant_one: cursor.take_owned(1),
            file_creation_date: cursor.take_owned(8),
            total_taxable_amount: cursor.take_signed(11),
            vat_on_taxable: cursor.take_signed(9),
            other_rate_deals_amount: cursor.take_signed(11),
            other_rate_vat: cursor.take_signed(9),
            total_transaction_records: cursor.take_owned(9),
            vat_exempt_amount: cursor.take_signed(11),
            other_input_vat: cursor.take_signed(9),
            equipment_input_vat: cursor.take_signed(9),
            other_and_equipment_record_count: cursor.take_owned(9),
            total_amount_to_pay: cursor.take_signed(11),
        };

        if self.numeric == NumericParsing::Strict {
            validate_header_strict(&header)?;
        }

        Ok(header)
    }

    pub fn decode_transaction(&self, line: &str) -> Result<TransactionRecord> {
        check_line(line, "Transaction", TRANSACTION_WIDTH)?;

        let mut cursor = FieldCursor::new(line);
        let record_type = RecordType::from(line.as_bytes()[0] as char);
        cursor.take(1);
        let vat_file_number = cursor.take_owned(9);
        let invoice_date = cursor.take_owned(8);
        let reference_group = cursor.take_owned(4);
        let reference_number = cursor.take_owned(9);
        let vat_amount_in_invoice = cursor.take_owned(9);
        let cancel_or_credit_sign = cursor.take(1).as_bytes()[0] as char;
        let invoice_amount_raw = cursor.take(10);
        let future_data_field = cursor.take_owned(9);

        if self.numeric == NumericParsing::Strict {
            require_digits(&invoice_date, "invoiceDate")?;
            require_digits(&vat_amount_in_invoice, "vatAmountInInvoice")?;
            require_digits(invoice_amount_raw, "invoiceAmount")?;
        }

        // Only a literal '+' or '-' signs the amount; any other character,
        // including a blank, leaves the digits unsigned.
        let invoice_amount = match cancel_or_credit_sign {
            '+' | '-' => format!("{}{}", cancel_or_credit_sign, invoice_amount_raw),
            _ => invoice_amount_raw.to_string(),
        };

        let vat_amount_minor = lenient_minor_units(&vat_amount_in_invoice, "vatAmountInInvoice");
        let invoice_amount_minor = lenient_minor_units(&invoice_amount, "invoiceAmount");
        let tax_rate = TaxRate::from_amounts(vat_amount_minor, invoice_amount_minor);

        let record = TransactionRecord {
            record_type,
            vat_file_number,
            invoice_date,
            reference_group,
            reference_number,
            vat_amount_in_invoice,
            cancel_or_credit_sign,
            invoice_amount,
            future_data_field,
            tax_rate,
            invoice_amount_minor,
            vat_amount_minor,
        };

        if self.numeric == NumericParsing::Strict && record.invoice_date_parsed().is_none() {
            return Err(Pcn874Error::InvalidDate {
                field: "invoiceDate",
                value: record.invoice_date,
            });
        }

        Ok(record)
    }
}

fn validate_header_strict(header: &HeaderRecord) -> Result<()> {
    if !header.has_valid_company_id() {
        return Err(Pcn874Error::MalformedCompanyId {
            value: header.company_id.clone(),
        });
    }
    require_digits(&header.report_date, "reportDate")?;
    require_digits(&header.file_creation_date, "fileCreationDate")?;
    if header.file_creation_date().is_none() {
        return Err(Pcn874Error::InvalidDate {
            field: "fileCreationDate",
            value: header.file_creation_date.clone(),
        });
    }
    require_digits(&header.total_transaction_records, "totalTransactionRecords")?;
    require_digits(
        &header.other_and_equipment_record_count,
        "otherAndEquipmentRecordCount",
    )?;

    let signed = [
        (&header.total_taxable_amount, "totalTaxableAmount"),
        (&header.vat_on_taxable, "vatOnTaxable"),
        (&header.other_rate_deals_amount, "otherRateDealsAmount"),
        (&header.other_rate_vat, "otherRateVat"),
        (&header.vat_exempt_amount, "vatExemptAmount"),
        (&header.other_input_vat, "otherInputVat"),
        (&header.equipment_input_vat, "equipmentInputVat"),
        (&header.total_amount_to_pay, "totalAmountToPay"),
    ];
    for (value, field) in signed {
        require_signed(value, field)?;
        parse_minor_units(value, field)?;
    }
    Ok(())
}

/// Decodes a header line with lenient numeric handling.
pub fn decode_header(line: &str) -> Result<HeaderRecord> {
    RecordDecoder::default().decode_header(line)
}

/// Decodes a transaction line with lenient numeric handling.
pub fn decode_transaction(line: &str) -> Result<TransactionRecord> {
    RecordDecoder::default().decode_transaction(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = concat!(
        "O",
        "514649871",
        "202301",
        "1",
        "20230210",
        "+00000100000",
        "+000018000",
        "+00000000000",
        "+000000000",
        "000000004",
        "+00000000000",
        "+000000000",
        "+000000000",
        "000000000",
        "+00000018000",
    );

    fn transaction(sign: char, amount: &str) -> String {
        format!(
            "{}{}{}{}{}{}{}{}{}",
            "S", "123456782", "20230115", "0000", "123456789", "000001800", sign, amount, "000000000"
        )
    }

    #[test]
    fn test_header_width_matches_layout() {
        assert_eq!(HEADER.len(), HEADER_WIDTH);
        assert_eq!(transaction('+', "0000010000").len(), TRANSACTION_WIDTH);
    }

    #[test]
    fn test_decode_header_fields() {
        let header = decode_header(HEADER).unwrap();
        assert_eq!(header.constant_start, "O");
        assert_eq!(header.company_id, "514649871");
        assert_eq!(header.report_date, "202301");
        assert_eq!(header.constant_one, "1");
        assert_eq!(header.file_creation_date, "20230210");
        assert_eq!(header.total_taxable_amount, "+00000100000");
        assert_eq!(header.vat_on_taxable, "+000018000");
        assert_eq!(header.total_transaction_records, "000000004");
        assert_eq!(header.total_amount_to_pay, "+00000018000");
        assert!(header.has_valid_company_id());
    }

    #[test]
    fn test_header_round_trip_reproduces_raw_text() {
        let header = decode_header(HEADER).unwrap();
        assert_eq!(header.to_line(), HEADER);

        let with_trailer = format!("{}   trailing", HEADER);
        assert_eq!(decode_header(&with_trailer).unwrap().to_line(), HEADER);
    }

    #[test]
    fn test_short_header_is_rejected() {
        let err = decode_header(&HEADER[..75]).unwrap_err();
        assert!(matches!(
            err,
            Pcn874Error::DecodeTooShort {
                required: HEADER_WIDTH,
                actual: 75,
                ..
            }
        ));
    }

    #[test]
    fn test_non_ascii_line_is_rejected() {
        let line = format!("{}ש", &HEADER[..HEADER_WIDTH - 1]);
        assert!(matches!(
            decode_header(&line),
            Err(Pcn874Error::NonAsciiLine { kind: "Header" })
        ));
    }

    #[test]
    fn test_explicit_signs_prefix_invoice_amount() {
        let credit = decode_transaction(&transaction('-', "0000010000")).unwrap();
        assert_eq!(credit.invoice_amount, "-0000010000");
        assert_eq!(credit.invoice_amount_minor, -10_000);
        assert_eq!(credit.tax_rate, TaxRate::Percent(-18.0));

        let debit = decode_transaction(&transaction('+', "0000010000")).unwrap();
        assert_eq!(debit.invoice_amount, "+0000010000");
        assert_eq!(debit.invoice_amount_minor, 10_000);
        assert_eq!(debit.tax_rate, TaxRate::Percent(18.0));
    }

    #[test]
    fn test_blank_sign_leaves_amount_unsigned() {
        // Pins current behaviour: a blank sign never makes the amount negative.
        let txn = decode_transaction(&transaction(' ', "0000010000")).unwrap();
        assert_eq!(txn.cancel_or_credit_sign, ' ');
        assert_eq!(txn.invoice_amount, "0000010000");
        assert_eq!(txn.invoice_amount_minor, 10_000);

        let other = decode_transaction(&transaction('0', "0000010000")).unwrap();
        assert_eq!(other.invoice_amount, "0000010000");
    }

    #[test]
    fn test_transaction_fields_and_round_trip() {
        let line = transaction('+', "0000010000");
        let txn = decode_transaction(&line).unwrap();
        assert_eq!(txn.record_type, RecordType::S);
        assert_eq!(txn.vat_file_number, "123456782");
        assert_eq!(txn.invoice_date, "20230115");
        assert_eq!(txn.reference_group, "0000");
        assert_eq!(txn.reference_number, "123456789");
        assert_eq!(txn.vat_amount_in_invoice, "000001800");
        assert_eq!(txn.future_data_field, "000000000");
        assert_eq!(txn.to_line(), line);
    }

    #[test]
    fn test_zero_amount_has_no_tax_rate() {
        let txn = decode_transaction(&transaction('+', "0000000000")).unwrap();
        assert_eq!(txn.tax_rate, TaxRate::NotApplicable);
    }

    #[test]
    fn test_short_transaction_is_rejected() {
        let line = transaction('+', "0000010000");
        assert!(matches!(
            decode_transaction(&line[..59]),
            Err(Pcn874Error::DecodeTooShort {
                kind: "Transaction",
                required: TRANSACTION_WIDTH,
                actual: 59
            })
        ));
    }

    #[test]
    fn test_lenient_mode_keeps_garbage_amounts() {
        let txn = decode_transaction(&transaction('+', "00000A0000")).unwrap();
        assert_eq!(txn.invoice_amount, "+00000A0000");
        assert_eq!(txn.invoice_amount_minor, 0);
        assert_eq!(txn.tax_rate, TaxRate::NotApplicable);
    }

    #[test]
    fn test_amounts_are_parsed_once_at_decode() {
        let mut txn = decode_transaction(&transaction('-', "0000010000")).unwrap();
        assert_eq!(txn.invoice_amount_minor, -10_000);
        assert_eq!(txn.vat_amount_minor, 1_800);

        // Later reads use the decoded values, not the raw column text.
        txn.invoice_amount = "-00000A0000".to_string();
        assert_eq!(txn.invoice_amount_minor, -10_000);
        assert_eq!(txn.exact_tax_rate(), Some(-18.0));
    }

    #[test]
    fn test_strict_mode_rejects_garbage_amounts() {
        let decoder = RecordDecoder::new(NumericParsing::Strict);
        assert!(matches!(
            decoder.decode_transaction(&transaction('+', "00000A0000")),
            Err(Pcn874Error::MalformedNumber {
                field: "invoiceAmount",
                ..
            })
        ));
        assert!(decoder
            .decode_transaction(&transaction('+', "0000010000"))
            .is_ok());
    }

    #[test]
    fn test_strict_mode_validates_header() {
        let decoder = RecordDecoder::new(NumericParsing::Strict);
        assert!(decoder.decode_header(HEADER).is_ok());

        let bad_id = format!("O51464A871{}", &HEADER[10..]);
        assert!(matches!(
            decoder.decode_header(&bad_id),
            Err(Pcn874Error::MalformedCompanyId { .. })
        ));
        assert!(decode_header(&bad_id).is_ok());
    }

    #[test]
    fn test_strict_mode_rejects_impossible_dates() {
        let decoder = RecordDecoder::new(NumericParsing::Strict);

        let header = format!("{}20230230{}", &HEADER[..17], &HEADER[25..]);
        assert!(matches!(
            decoder.decode_header(&header),
            Err(Pcn874Error::InvalidDate {
                field: "fileCreationDate",
                ..
            })
        ));

        let line = transaction('+', "0000010000").replace("20230115", "20231315");
        assert!(matches!(
            decoder.decode_transaction(&line),
            Err(Pcn874Error::InvalidDate {
                field: "invoiceDate",
                ..
            })
        ));
        assert!(decode_transaction(&line).is_ok());
    }
}
