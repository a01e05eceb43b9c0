//! Fixed-width NACHA writer.
//!
//! Batch and file control records are recomputed from the data records,
//! and the output is padded with 9-fill lines to a multiple of the
//! blocking factor. Serialization is deterministic for a given file.

use super::file::{Batch, EntryDetail, FileHeader, NachaFile};
use super::{BLOCKING_FACTOR, NachaError, RECORD_LENGTH};

/// Serialize a NACHA file to its canonical text form.
pub fn write_file(file: &NachaFile) -> Result<String, NachaError> {
    let mut lines: Vec<String> = Vec::new();

    lines.push(file_header_line(&file.header));
    for batch in &file.batches {
        lines.push(batch_header_line(batch));
        for entry in &batch.entries {
            lines.push(entry_line(entry));
            for addenda in &entry.addenda {
                lines.push(addenda.clone());
            }
        }
        lines.push(batch_control_line(batch));
    }

    let record_count = lines.len() as u64 + 1; // plus file control
    let block_count = record_count.div_ceil(BLOCKING_FACTOR as u64);
    lines.push(file_control_line(file, block_count));

    while lines.len() % BLOCKING_FACTOR != 0 {
        lines.push("9".repeat(RECORD_LENGTH));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Ok(out)
}

fn file_header_line(h: &FileHeader) -> String {
    format!(
        "1{:>2}{:>10}{:>10}{:>6}{:>4}{}094101{}{}{}",
        h.priority_code,
        h.immediate_destination,
        h.immediate_origin,
        h.file_creation_date,
        h.file_creation_time,
        h.file_id_modifier,
        alpha(&h.immediate_destination_name, 23),
        alpha(&h.immediate_origin_name, 23),
        alpha(&h.reference_code, 8),
    )
}

fn batch_header_line(batch: &Batch) -> String {
    let h = &batch.header;
    format!(
        "5{:03}{}{}{}{}{}{}{:>6}{:>3}{}{}{:07}",
        h.service_class_code,
        alpha(&h.company_name, 16),
        alpha(&h.company_discretionary_data, 20),
        alpha(&h.company_identification, 10),
        alpha(&h.standard_entry_class, 3),
        alpha(&h.company_entry_description, 10),
        alpha(&h.company_descriptive_date, 6),
        h.effective_entry_date,
        h.settlement_date,
        h.originator_status_code,
        alpha(&h.odfi_identification, 8),
        h.batch_number,
    )
}

fn entry_line(e: &EntryDetail) -> String {
    format!(
        "6{:02}{}{}{}{:010}{}{}{}{}{:015}",
        e.transaction_code,
        alpha(&e.rdfi_identification, 8),
        e.check_digit,
        alpha(&e.dfi_account_number, 17),
        e.amount,
        alpha(&e.individual_identification, 15),
        alpha(&e.individual_name, 22),
        alpha(&e.discretionary_data, 2),
        e.addenda_indicator,
        e.trace_number,
    )
}

fn batch_control_line(batch: &Batch) -> String {
    let h = &batch.header;
    format!(
        "8{:03}{:06}{:010}{:012}{:012}{}{}{}{:07}",
        h.service_class_code,
        batch.entry_addenda_count(),
        batch.entry_hash(),
        batch.debit_total(),
        batch.credit_total(),
        alpha(&h.company_identification, 10),
        " ".repeat(25),
        alpha(&h.odfi_identification, 8),
        h.batch_number,
    )
}

fn file_control_line(file: &NachaFile, block_count: u64) -> String {
    format!(
        "9{:06}{:06}{:08}{:010}{:012}{:012}{}",
        file.batches.len(),
        block_count,
        file.entry_addenda_count(),
        file.entry_hash(),
        file.debit_total(),
        file.credit_total(),
        " ".repeat(39),
    )
}

/// Left-justified, space-padded, truncated to width.
fn alpha(s: &str, width: usize) -> String {
    let truncated: String = s.chars().take(width).collect();
    format!("{:<width$}", truncated)
}

#[cfg(test)]
mod tests {
    use super::super::reader::read_file;
    use super::*;
    use crate::nacha::file::BatchHeader;

    fn sample_file() -> NachaFile {
        NachaFile {
            header: FileHeader {
                priority_code: "01".to_string(),
                immediate_destination: "231380104".to_string(),
                immediate_origin: "121042882".to_string(),
                file_creation_date: "190816".to_string(),
                file_creation_time: "1055".to_string(),
                file_id_modifier: 'A',
                immediate_destination_name: "Federal Reserve Bank".to_string(),
                immediate_origin_name: "My Bank Name".to_string(),
                reference_code: String::new(),
            },
            batches: vec![Batch {
                header: BatchHeader {
                    service_class_code: 200,
                    company_name: "Name on Account".to_string(),
                    company_discretionary_data: String::new(),
                    company_identification: "121042882".to_string(),
                    standard_entry_class: "PPD".to_string(),
                    company_entry_description: "REG.SALARY".to_string(),
                    company_descriptive_date: String::new(),
                    effective_entry_date: "190816".to_string(),
                    settlement_date: String::new(),
                    originator_status_code: '1',
                    odfi_identification: "12104288".to_string(),
                    batch_number: 1,
                },
                entries: vec![EntryDetail {
                    transaction_code: 22,
                    rdfi_identification: "23138010".to_string(),
                    check_digit: '4',
                    dfi_account_number: "81967038518".to_string(),
                    amount: 100_000_000,
                    individual_identification: String::new(),
                    individual_name: "Credit Account 1".to_string(),
                    discretionary_data: String::new(),
                    addenda_indicator: 0,
                    trace_number: 121042880000001,
                    addenda: Vec::new(),
                }],
            }],
        }
    }

    #[test]
    fn test_all_records_are_94_chars() {
        let text = write_file(&sample_file()).unwrap();
        for line in text.lines() {
            assert_eq!(line.len(), RECORD_LENGTH, "line: {:?}", line);
        }
    }

    #[test]
    fn test_output_is_blocked() {
        let text = write_file(&sample_file()).unwrap();
        assert_eq!(text.lines().count() % BLOCKING_FACTOR, 0);
        assert!(text.lines().last().unwrap().bytes().all(|b| b == b'9'));
    }

    #[test]
    fn test_write_read_round_trip() {
        let file = sample_file();
        let text = write_file(&file).unwrap();
        let parsed = read_file(text.as_bytes(), None).unwrap();
        assert_eq!(parsed, file);
    }

    #[test]
    fn test_write_is_deterministic() {
        let file = sample_file();
        assert_eq!(write_file(&file).unwrap(), write_file(&file).unwrap());
    }
}
