//! NACHA file codec.
//!
//! Fixed-width reader/writer for ACH files plus the merge primitives the
//! cutoff pipeline relies on:
//! - [`read_file`] / [`write_file`] - parse and serialize 94-character records
//! - [`merge_files`] / [`merge_files_with`] - combine files, renumbering
//!   trace numbers in ascending order starting from the first entry detail
//! - [`flatten_batches`] - collapse batches that share an equivalent header
//!
//! Validation is limited to what the pipeline needs (record structure,
//! routing check digits, control totals); [`ValidateOpts`] relaxes it.

pub mod file;
pub mod merge;
pub mod reader;
pub mod writer;

pub use file::{Batch, BatchHeader, EntryDetail, FileHeader, NachaFile, routing_check_digit};
pub use merge::{flatten_batches, merge_files, merge_files_with};
pub use reader::read_file;
pub use writer::write_file;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const RECORD_LENGTH: usize = 94;
pub const BLOCKING_FACTOR: usize = 10;

#[derive(Debug, Error)]
pub enum NachaError {
    #[error("record on line {line} has length {len}, expected {RECORD_LENGTH}")]
    InvalidRecordLength { line: usize, len: usize },

    #[error("unknown record type '{code}' on line {line}")]
    UnknownRecordType { line: usize, code: char },

    #[error("invalid {field} on line {line}: {value}")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("entry detail on line {line} appears outside a batch")]
    EntryOutsideBatch { line: usize },

    #[error("addenda on line {line} has no preceding entry detail")]
    AddendaWithoutEntry { line: usize },

    #[error("invalid check digit for routing {routing} on line {line}")]
    InvalidCheckDigit { line: usize, routing: String },

    #[error("{field} mismatch on line {line}: control says {control}, computed {computed}")]
    ControlMismatch {
        line: usize,
        field: &'static str,
        control: u64,
        computed: u64,
    },

    #[error("missing file header record")]
    MissingFileHeader,

    #[error("missing file control record")]
    MissingFileControl,

    #[error("file contains no batches")]
    NoBatches,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validation flags, persisted as a JSON sidecar next to a pending file.
///
/// Field names match the upstream producers' JSON contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidateOpts {
    /// Bypass all structural validation
    pub skip_all: bool,
    pub allow_missing_file_header: bool,
    pub allow_missing_file_control: bool,
    pub allow_zero_batches: bool,
    pub allow_invalid_check_digit: bool,
}

/// Per-file caps applied while merging.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeConditions {
    /// Maximum entry details per merged file
    pub max_entries: Option<usize>,
    /// Maximum total dollar amount (debits + credits, in cents) per merged file
    pub max_dollar_amount: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_opts_json_round_trip() {
        let json = r#"{"skipAll":false,"allowMissingFileHeader":true}"#;
        let opts: ValidateOpts = serde_json::from_str(json).unwrap();
        assert!(opts.allow_missing_file_header);
        assert!(!opts.skip_all);
        assert!(!opts.allow_zero_batches);
    }

    #[test]
    fn test_merge_conditions_defaults() {
        let cond = MergeConditions::default();
        assert!(cond.max_entries.is_none());
        assert!(cond.max_dollar_amount.is_none());
    }
}
