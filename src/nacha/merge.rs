//! Merge primitives for the cutoff pipeline.

use super::file::{Batch, EntryDetail, NachaFile};
use super::{MergeConditions, NachaError};

/// Merge files with default conditions (no per-file caps).
pub fn merge_files(files: &[NachaFile]) -> Result<Vec<NachaFile>, NachaError> {
    merge_files_with(files, &MergeConditions::default())
}

/// Combine the batches of `files` into as few files as the conditions
/// allow, in input order.
///
/// Trace numbers are renumbered in ascending order starting from the
/// first entry detail's trace number. Batches whose headers are
/// equivalent (same company, SEC code, service class, effective date,
/// and ODFI) are combined; batch numbers are reassigned per output file.
pub fn merge_files_with(
    files: &[NachaFile],
    conditions: &MergeConditions,
) -> Result<Vec<NachaFile>, NachaError> {
    let Some(first) = files.first() else {
        return Ok(Vec::new());
    };

    let Some(mut next_trace) = files
        .iter()
        .flat_map(|f| &f.batches)
        .flat_map(|b| &b.entries)
        .next()
        .map(|e| e.trace_number)
    else {
        // no entry details anywhere, nothing to merge
        return Ok(Vec::new());
    };

    let mut outputs: Vec<NachaFile> = Vec::new();
    let mut current = NachaFile {
        header: first.header.clone(),
        batches: Vec::new(),
    };
    let mut current_entries = 0usize;
    let mut current_amount = 0u64;

    for file in files {
        for batch in &file.batches {
            for entry in &batch.entries {
                let over_entries = conditions
                    .max_entries
                    .is_some_and(|max| current_entries + 1 > max);
                let over_amount = conditions
                    .max_dollar_amount
                    .is_some_and(|max| current_amount + entry.amount > max);
                if current_entries > 0 && (over_entries || over_amount) {
                    outputs.push(std::mem::replace(
                        &mut current,
                        NachaFile {
                            header: first.header.clone(),
                            batches: Vec::new(),
                        },
                    ));
                    current_entries = 0;
                    current_amount = 0;
                }

                let mut entry = entry.clone();
                entry.trace_number = next_trace;
                next_trace += 1;

                current_amount += entry.amount;
                current_entries += 1;
                push_entry(&mut current, batch, entry);
            }
        }
    }

    if current_entries > 0 {
        outputs.push(current);
    }

    for out in &mut outputs {
        renumber_batches(out);
    }

    Ok(outputs)
}

/// Collapse batches that share an equivalent header into a single batch,
/// preserving entry order. Batch numbers are reassigned.
pub fn flatten_batches(file: &NachaFile) -> NachaFile {
    let mut out = NachaFile {
        header: file.header.clone(),
        batches: Vec::new(),
    };
    for batch in &file.batches {
        for entry in &batch.entries {
            push_entry(&mut out, batch, entry.clone());
        }
    }
    renumber_batches(&mut out);
    out
}

/// Append `entry` to the batch of `file` equivalent to `source`'s header,
/// creating the batch if none matches.
fn push_entry(file: &mut NachaFile, source: &Batch, entry: EntryDetail) {
    let key = source.header.merge_key();
    if let Some(batch) = file.batches.iter_mut().find(|b| b.header.merge_key() == key) {
        batch.entries.push(entry);
    } else {
        file.batches.push(Batch {
            header: source.header.clone(),
            entries: vec![entry],
        });
    }
}

fn renumber_batches(file: &mut NachaFile) {
    for (i, batch) in file.batches.iter_mut().enumerate() {
        batch.header.batch_number = (i + 1) as u32;
    }
}
