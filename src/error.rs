use thiserror::Error;

#[derive(Error, Debug)]
pub enum Pcn874Error {
    #[error("PCN file must contain at least a header and footer (found {0} non-blank lines)")]
    TooFewLines(usize),

    #[error("No footer line found starting with 'X'")]
    NoFooterFound,

    #[error("Malformed company id '{value}': expected exactly 9 digits")]
    MalformedCompanyId { value: String },

    #[error("Company id mismatch: batch belongs to {expected}, file reports {found}")]
    CompanyIdMismatch { expected: String, found: String },

    #[error("Reporting period mismatch: file was declared for {declared} but embeds {embedded}")]
    PeriodMismatch { declared: String, embedded: String },

    #[error("{kind} line is too short: {required} characters required, found {actual}")]
    DecodeTooShort {
        kind: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("{kind} line contains non-ASCII characters")]
    NonAsciiLine { kind: &'static str },

    #[error("Malformed numeric field {field}: '{value}'")]
    MalformedNumber { field: &'static str, value: String },

    #[error("Invalid date in {field}: '{value}'")]
    InvalidDate { field: &'static str, value: String },

    #[error("No header line starting with 'O' found")]
    MissingHeaderLine,

    #[error("Invalid reporting period '{0}': expected YYYYMM")]
    InvalidPeriod(String),

    #[error("Invalid analysis configuration: {0}")]
    InvalidConfig(String),

    #[error("File is not valid UTF-8 text: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Pcn874Error>;
