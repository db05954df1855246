use std::fmt;

/// Errors produced reading or writing the ledger and the candidate list.
///
/// Every variant is a setup-level failure: the caller aborts before dispatch.
#[derive(Debug)]
pub enum StateFileError {
    /// An I/O or CSV-library error.
    Io(String),
    /// The header row is missing a required column.
    MissingColumn(String),
    /// A record field could not be parsed into the expected type.
    ParseField {
        row: usize,
        field: String,
        raw: String,
    },
    /// A `field=value` selector was malformed.
    BadFilter(String),
}

impl fmt::Display for StateFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateFileError::Io(msg) => write!(f, "state file io error: {msg}"),
            StateFileError::MissingColumn(col) => {
                write!(f, "missing required column: '{col}'")
            }
            StateFileError::ParseField { row, field, raw } => {
                write!(f, "row {row}: cannot parse field '{field}' from value '{raw}'")
            }
            StateFileError::BadFilter(raw) => {
                write!(f, "invalid selector '{raw}': expected field=value")
            }
        }
    }
}

impl std::error::Error for StateFileError {}
