//! Address input parsing
//!
//! Input is a CSV file with a header row followed by rows whose first five
//! columns are, in order: object id, street, city, state, zip. Additional
//! columns are ignored. Any malformed row fails the whole read; nothing is
//! partially ingested.

use crate::error::{GeobatchError, Result};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Minimum number of positional columns an input row must have
pub const REQUIRED_COLUMNS: usize = 5;

/// One address to geocode.
///
/// Field names in the serialized form match the `attributes` object the
/// geocoding service expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressRecord {
    #[serde(rename = "OBJECTID")]
    pub object_id: i64,
    #[serde(rename = "Street")]
    pub street: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "ZIP")]
    pub zip: String,
}

/// Read every address from a CSV file.
pub fn read_addresses(path: &Path) -> Result<Vec<AddressRecord>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| GeobatchError::InputRead {
            path: path.to_path_buf(),
            source,
        })?;

    let records = collect(reader, path)?;
    info!(path = %path.display(), records = records.len(), "Read address input");
    Ok(records)
}

/// Read every address from an in-memory or streamed CSV source.
pub fn read_addresses_from<R: Read>(input: R) -> Result<Vec<AddressRecord>> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input);
    collect(reader, Path::new("<reader>"))
}

fn collect<R: Read>(mut reader: csv::Reader<R>, source: &Path) -> Result<Vec<AddressRecord>> {
    // The header is consumed here so an empty source fails loudly instead of
    // looking like a file with zero addresses.
    let header_len = reader
        .headers()
        .map_err(|e| GeobatchError::InputRead {
            path: source.to_path_buf(),
            source: e,
        })?
        .len();
    if header_len == 0 {
        return Err(GeobatchError::malformed_row(1, "missing header row"));
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| GeobatchError::InputRead {
            path: source.to_path_buf(),
            source: e,
        })?;
        records.push(parse_row(&row)?);
    }

    debug!(records = records.len(), columns = header_len, "Parsed address rows");
    Ok(records)
}

fn parse_row(row: &csv::StringRecord) -> Result<AddressRecord> {
    let line = row.position().map(|p| p.line()).unwrap_or_default();

    if row.len() < REQUIRED_COLUMNS {
        return Err(GeobatchError::malformed_row(
            line,
            format!(
                "expected at least {REQUIRED_COLUMNS} columns (object id, street, city, state, zip), found {}",
                row.len()
            ),
        ));
    }

    let raw_id = &row[0];
    let object_id = raw_id.trim().parse::<i64>().map_err(|_| {
        GeobatchError::malformed_row(line, format!("object id '{raw_id}' is not an integer"))
    })?;

    Ok(AddressRecord {
        object_id,
        street: row[1].to_string(),
        city: row[2].to_string(),
        state: row[3].to_string(),
        zip: row[4].to_string(),
    })
}
