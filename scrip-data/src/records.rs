use anyhow::{Context, Result};
use scrip_core::{RawRecord, RawValue};

/// Decode a headed CSV payload into raw records.
///
/// Short rows are accepted; absent trailing cells are simply missing from the
/// record. Cells beyond the header are ignored.
pub fn read_raw_records(payload: &[u8]) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(payload);
    let headers: Vec<String> = reader
        .headers()
        .context("failed to read CSV header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("malformed CSV row {}", index + 2))?;
        let record: RawRecord = headers
            .iter()
            .zip(row.iter())
            .map(|(header, cell)| (header.clone(), RawValue::Text(cell.to_string())))
            .collect();
        records.push(record);
    }
    Ok(records)
}

/// Header names of a CSV payload, for diagnostics.
pub fn read_headers(payload: &[u8]) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new().from_reader(payload);
    Ok(reader
        .headers()
        .context("failed to read CSV header")?
        .iter()
        .map(str::to_string)
        .collect())
}
