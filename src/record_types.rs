use serde::{Deserialize, Serialize};
use std::fmt;

/// Single-character transaction classification from column 0 of a transaction line.
///
/// Codes outside the fixed set are preserved as [`RecordType::Unknown`] so that
/// they still count towards batch-wide totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "char", into = "char")]
pub enum RecordType {
    /// Standard rated sales
    S,
    /// Sales to unidentified customers
    L,
    /// Reverse charge sales
    M,
    /// Zero-rated exports
    Y,
    /// Palestinian Authority sales
    I,
    /// Domestic purchases
    T,
    /// Self-charge purchases
    C,
    /// Petty cash
    K,
    /// Import declarations
    R,
    /// Palestinian Authority purchases
    P,
    /// Other input documents
    H,
    Unknown(char),
}

/// Which side of the VAT return a record type lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxDirection {
    Output,
    Input,
}

pub const ALL_RECORD_TYPES: [RecordType; 11] = [
    RecordType::S,
    RecordType::L,
    RecordType::M,
    RecordType::Y,
    RecordType::I,
    RecordType::C,
    RecordType::R,
    RecordType::P,
    RecordType::H,
    RecordType::T,
    RecordType::K,
];

pub const OUTPUT_RECORD_TYPES: [RecordType; 5] = [
    RecordType::S,
    RecordType::L,
    RecordType::M,
    RecordType::Y,
    RecordType::I,
];

pub const INPUT_RECORD_TYPES: [RecordType; 6] = [
    RecordType::T,
    RecordType::C,
    RecordType::K,
    RecordType::R,
    RecordType::P,
    RecordType::H,
];

impl RecordType {
    pub fn code(self) -> char {
        match self {
            RecordType::S => 'S',
            RecordType::L => 'L',
            RecordType::M => 'M',
            RecordType::Y => 'Y',
            RecordType::I => 'I',
            RecordType::T => 'T',
            RecordType::C => 'C',
            RecordType::K => 'K',
            RecordType::R => 'R',
            RecordType::P => 'P',
            RecordType::H => 'H',
            RecordType::Unknown(c) => c,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            RecordType::S => "Standard Rated Sales",
            RecordType::L => "Unidentified Customers",
            RecordType::M => "Reverse Charge Sales",
            RecordType::Y => "Zero-Rated Exports",
            RecordType::I => "P.A Sales",
            RecordType::T => "Domestic Purchases",
            RecordType::C => "Self-Charge Purchases",
            RecordType::K => "Petty Cash",
            RecordType::R => "Import Declarations",
            RecordType::P => "P.A Purchases",
            RecordType::H => "Other",
            RecordType::Unknown(_) => "Unknown",
        }
    }

    pub fn direction(self) -> Option<TaxDirection> {
        match self {
            RecordType::S | RecordType::L | RecordType::M | RecordType::Y | RecordType::I => {
                Some(TaxDirection::Output)
            }
            RecordType::T
            | RecordType::C
            | RecordType::K
            | RecordType::R
            | RecordType::P
            | RecordType::H => Some(TaxDirection::Input),
            RecordType::Unknown(_) => None,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, RecordType::Unknown(_))
    }
}

impl TaxDirection {
    /// Classifies a record-type filter the way the breakdown views do: any input
    /// type makes it an input view, otherwise any output type makes it an output
    /// view. An empty or missing filter has no side.
    pub fn of_filter(filter: Option<&[RecordType]>) -> Option<TaxDirection> {
        let filter = filter?;
        if filter
            .iter()
            .any(|t| t.direction() == Some(TaxDirection::Input))
        {
            Some(TaxDirection::Input)
        } else if filter
            .iter()
            .any(|t| t.direction() == Some(TaxDirection::Output))
        {
            Some(TaxDirection::Output)
        } else {
            None
        }
    }

    pub fn record_types(self) -> &'static [RecordType] {
        match self {
            TaxDirection::Output => &OUTPUT_RECORD_TYPES,
            TaxDirection::Input => &INPUT_RECORD_TYPES,
        }
    }
}

impl From<char> for RecordType {
    fn from(c: char) -> Self {
        match c {
            'S' => RecordType::S,
            'L' => RecordType::L,
            'M' => RecordType::M,
            'Y' => RecordType::Y,
            'I' => RecordType::I,
            'T' => RecordType::T,
            'C' => RecordType::C,
            'K' => RecordType::K,
            'R' => RecordType::R,
            'P' => RecordType::P,
            'H' => RecordType::H,
            other => RecordType::Unknown(other),
        }
    }
}

impl From<RecordType> for char {
    fn from(t: RecordType) -> Self {
        t.code()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
