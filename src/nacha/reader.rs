//! Fixed-width NACHA reader.

use std::io::{BufRead, BufReader, Read};

use super::file::{Batch, BatchHeader, EntryDetail, FileHeader, NachaFile, routing_check_digit};
use super::{NachaError, RECORD_LENGTH, ValidateOpts};

/// Parse a NACHA-formatted file.
///
/// Block-padding lines (all 9s) are skipped. Structural validation
/// (check digits, control totals) is relaxed per `opts`.
pub fn read_file(r: impl Read, opts: Option<&ValidateOpts>) -> Result<NachaFile, NachaError> {
    let default_opts = ValidateOpts::default();
    let opts = opts.unwrap_or(&default_opts);

    let mut header: Option<FileHeader> = None;
    let mut batches: Vec<Batch> = Vec::new();
    let mut current: Option<Batch> = None;
    let mut saw_file_control = false;

    let reader = BufReader::new(r);
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        if line.is_empty() {
            continue;
        }
        if !line.is_ascii() || line.len() != RECORD_LENGTH {
            return Err(NachaError::InvalidRecordLength {
                line: line_no,
                len: line.chars().count(),
            });
        }

        match line.as_bytes()[0] {
            b'1' => {
                header = Some(parse_file_header(&line));
            }
            b'5' => {
                if let Some(batch) = current.take() {
                    batches.push(batch);
                }
                current = Some(Batch {
                    header: parse_batch_header(&line, line_no)?,
                    entries: Vec::new(),
                });
            }
            b'6' => {
                let batch = current
                    .as_mut()
                    .ok_or(NachaError::EntryOutsideBatch { line: line_no })?;
                batch.entries.push(parse_entry(&line, line_no, opts)?);
            }
            b'7' => {
                let entry = current
                    .as_mut()
                    .and_then(|b| b.entries.last_mut())
                    .ok_or(NachaError::AddendaWithoutEntry { line: line_no })?;
                entry.addenda.push(line.clone());
            }
            b'8' => {
                let batch = current
                    .take()
                    .ok_or(NachaError::EntryOutsideBatch { line: line_no })?;
                if !opts.skip_all {
                    verify_batch_control(&line, line_no, &batch)?;
                }
                batches.push(batch);
            }
            b'9' => {
                if line.bytes().all(|b| b == b'9') {
                    // block padding
                    continue;
                }
                if let Some(batch) = current.take() {
                    batches.push(batch);
                }
                if !opts.skip_all {
                    verify_file_control(&line, line_no, &batches)?;
                }
                saw_file_control = true;
            }
            other => {
                return Err(NachaError::UnknownRecordType {
                    line: line_no,
                    code: other as char,
                });
            }
        }
    }

    if let Some(batch) = current.take() {
        batches.push(batch);
    }

    let header = match header {
        Some(h) => h,
        None if opts.skip_all || opts.allow_missing_file_header => FileHeader::default(),
        None => return Err(NachaError::MissingFileHeader),
    };
    if !saw_file_control && !(opts.skip_all || opts.allow_missing_file_control) {
        return Err(NachaError::MissingFileControl);
    }
    if batches.is_empty() && !(opts.skip_all || opts.allow_zero_batches) {
        return Err(NachaError::NoBatches);
    }

    Ok(NachaFile { header, batches })
}

fn parse_file_header(line: &str) -> FileHeader {
    FileHeader {
        priority_code: line[1..3].to_string(),
        immediate_destination: line[3..13].trim().to_string(),
        immediate_origin: line[13..23].trim().to_string(),
        file_creation_date: line[23..29].to_string(),
        file_creation_time: line[29..33].to_string(),
        file_id_modifier: line.as_bytes()[33] as char,
        immediate_destination_name: line[40..63].trim_end().to_string(),
        immediate_origin_name: line[63..86].trim_end().to_string(),
        reference_code: line[86..94].trim().to_string(),
    }
}

fn parse_batch_header(line: &str, line_no: usize) -> Result<BatchHeader, NachaError> {
    Ok(BatchHeader {
        service_class_code: parse_num(&line[1..4], line_no, "service class code")? as u16,
        company_name: line[4..20].trim_end().to_string(),
        company_discretionary_data: line[20..40].trim_end().to_string(),
        company_identification: line[40..50].trim().to_string(),
        standard_entry_class: line[50..53].to_string(),
        company_entry_description: line[53..63].trim_end().to_string(),
        company_descriptive_date: line[63..69].trim().to_string(),
        effective_entry_date: line[69..75].trim().to_string(),
        settlement_date: line[75..78].trim().to_string(),
        originator_status_code: line.as_bytes()[78] as char,
        odfi_identification: line[79..87].to_string(),
        batch_number: parse_num(&line[87..94], line_no, "batch number")? as u32,
    })
}

fn parse_entry(line: &str, line_no: usize, opts: &ValidateOpts) -> Result<EntryDetail, NachaError> {
    let rdfi = line[3..11].to_string();
    let check_digit = line.as_bytes()[11] as char;

    if !(opts.skip_all || opts.allow_invalid_check_digit) {
        let expected = routing_check_digit(&rdfi);
        let actual = check_digit.to_digit(10).map(|d| d as u8);
        if expected.is_none() || expected != actual {
            return Err(NachaError::InvalidCheckDigit {
                line: line_no,
                routing: format!("{}{}", rdfi, check_digit),
            });
        }
    }

    Ok(EntryDetail {
        transaction_code: parse_num(&line[1..3], line_no, "transaction code")? as u8,
        rdfi_identification: rdfi,
        check_digit,
        dfi_account_number: line[12..29].trim_end().to_string(),
        amount: parse_num(&line[29..39], line_no, "amount")?,
        individual_identification: line[39..54].trim_end().to_string(),
        individual_name: line[54..76].trim_end().to_string(),
        discretionary_data: line[76..78].trim_end().to_string(),
        addenda_indicator: parse_num(&line[78..79], line_no, "addenda indicator")? as u8,
        trace_number: parse_num(&line[79..94], line_no, "trace number")?,
        addenda: Vec::new(),
    })
}

fn verify_batch_control(line: &str, line_no: usize, batch: &Batch) -> Result<(), NachaError> {
    let checks: [(&'static str, u64, u64); 4] = [
        (
            "entry/addenda count",
            parse_num(&line[4..10], line_no, "entry/addenda count")?,
            batch.entry_addenda_count(),
        ),
        (
            "entry hash",
            parse_num(&line[10..20], line_no, "entry hash")?,
            batch.entry_hash(),
        ),
        (
            "debit total",
            parse_num(&line[20..32], line_no, "debit total")?,
            batch.debit_total(),
        ),
        (
            "credit total",
            parse_num(&line[32..44], line_no, "credit total")?,
            batch.credit_total(),
        ),
    ];
    for (field, control, computed) in checks {
        if control != computed {
            return Err(NachaError::ControlMismatch {
                line: line_no,
                field,
                control,
                computed,
            });
        }
    }
    Ok(())
}

fn verify_file_control(line: &str, line_no: usize, batches: &[Batch]) -> Result<(), NachaError> {
    let entry_addenda: u64 = batches.iter().map(|b| b.entry_addenda_count()).sum();
    let hash: u64 = batches.iter().map(|b| b.entry_hash()).sum::<u64>() % 10_000_000_000;
    let debit: u64 = batches.iter().map(|b| b.debit_total()).sum();
    let credit: u64 = batches.iter().map(|b| b.credit_total()).sum();

    let checks: [(&'static str, u64, u64); 4] = [
        (
            "batch count",
            parse_num(&line[1..7], line_no, "batch count")?,
            batches.len() as u64,
        ),
        (
            "entry/addenda count",
            parse_num(&line[13..21], line_no, "entry/addenda count")?,
            entry_addenda,
        ),
        (
            "entry hash",
            parse_num(&line[21..31], line_no, "entry hash")?,
            hash,
        ),
        (
            "debit total",
            parse_num(&line[31..43], line_no, "debit total")?,
            debit,
        ),
    ];
    for (field, control, computed) in checks {
        if control != computed {
            return Err(NachaError::ControlMismatch {
                line: line_no,
                field,
                control,
                computed,
            });
        }
    }
    let control_credit = parse_num(&line[43..55], line_no, "credit total")?;
    if control_credit != credit {
        return Err(NachaError::ControlMismatch {
            line: line_no,
            field: "credit total",
            control: control_credit,
            computed: credit,
        });
    }
    Ok(())
}

fn parse_num(s: &str, line: usize, field: &'static str) -> Result<u64, NachaError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed.parse().map_err(|_| NachaError::InvalidField {
        line,
        field,
        value: s.to_string(),
    })
}
