//! CSV text → `Dataset`.

use crate::error::MergeError;
use crate::model::{Dataset, Record, Value};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Rows read past the header when sniffing.
const SNIFF_ROWS: usize = 20;

/// Pick the delimiter (tab, `;`, `,` or `|`) that splits the header into the
/// most columns while every sampled row has exactly as many fields as the
/// header, which is what [`load_csv_dataset`] will demand. Quoted fields,
/// including ones spanning lines, are parsed as such. Falls back to `,`.
pub fn sniff_delimiter(content: &str) -> u8 {
    let mut best = b',';
    let mut best_width = 1;

    for delimiter in [b'\t', b';', b',', b'|'] {
        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(content.as_bytes());
        let width = match reader.headers() {
            Ok(header) => header.len(),
            Err(_) => continue,
        };
        if width <= best_width {
            continue;
        }
        let rectangular = reader
            .records()
            .take(SNIFF_ROWS)
            .all(|row| row.is_ok_and(|r| r.len() == width));
        if rectangular {
            best = delimiter;
            best_width = width;
        }
    }

    best
}

/// CSV bytes as text. Anything that is not valid UTF-8 is read as
/// Windows-1252, which is what spreadsheet exports usually are.
pub fn decode_csv_bytes(mut bytes: Vec<u8>) -> String {
    if bytes.starts_with(UTF8_BOM) {
        bytes.drain(..UTF8_BOM.len());
    }
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
            log::debug!("input is not UTF-8, decoded as Windows-1252");
            decoded.into_owned()
        }
    }
}

/// Parse CSV text with a header row. Empty cells become `Null`, everything
/// else `Text`; every record carries every column.
pub fn load_csv_dataset(csv_data: &str, delimiter: u8) -> Result<Dataset, MergeError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(csv_data.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| MergeError::Csv(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| MergeError::Csv(e.to_string()))?;
        let record: Record = columns
            .iter()
            .zip(row.iter())
            .map(|(column, cell)| {
                let value = if cell.is_empty() { Value::Null } else { Value::from(cell) };
                (column.clone(), value)
            })
            .collect();
        records.push(record);
    }

    Dataset::new(columns, records)
}

/// Header row only, for validating a job without loading every row.
pub fn read_csv_columns(csv_data: &str, delimiter: u8) -> Result<Vec<String>, MergeError> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(csv_data.as_bytes());
    let headers = reader.headers().map_err(|e| MergeError::Csv(e.to_string()))?;
    Ok(headers.iter().map(|h| h.trim().to_string()).collect())
}
