//! CSV input and output.
//!
//! Input rows keep every original column so the result file can repeat
//! them verbatim, followed by the match columns.

use std::path::Path;

use geomatch_matcher_models::{AddressRecord, MatchResult, ReferenceRecord};
use serde::Deserialize;

use crate::DbError;

/// Columns appended to every result row.
pub const RESULT_COLUMNS: [&str; 4] = ["geocode", "matched_key", "score", "tier"];

const ADDRESS_HEADERS: &[&str] = &["full_address"];
const POSTAL_CODE_HEADERS: &[&str] = &["postcode", "postal_code"];

/// An input CSV: the raw cells plus the records extracted from them.
#[derive(Debug, Clone, Default)]
pub struct AddressTable {
    /// Original header row.
    pub headers: Vec<String>,
    /// Original cells, one vector per row, padded to the header width.
    pub rows: Vec<Vec<String>>,
    /// Address and postal code of each row, aligned with `rows`.
    pub records: Vec<AddressRecord>,
}

fn find_column(headers: &[String], names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|name| h.trim().eq_ignore_ascii_case(name)))
}

/// Reads input addresses.
///
/// Requires a `full_address` column; the postal code is read from
/// `postcode` or `postal_code`. Blank cells become empty strings, which
/// the matcher treats as malformed rows.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be read or has no address column.
pub fn read_address_records(path: &Path) -> Result<AddressTable, DbError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let address_col = find_column(&headers, ADDRESS_HEADERS).ok_or_else(|| DbError::Conversion {
        message: format!("{} has no full_address column", path.display()),
    })?;
    let postal_col = find_column(&headers, POSTAL_CODE_HEADERS);
    if postal_col.is_none() {
        log::warn!(
            "{} has no postcode column; every row will be unmatched",
            path.display()
        );
    }

    let mut table = AddressTable {
        headers,
        ..AddressTable::default()
    };

    for result in reader.records() {
        let record = result?;
        let mut cells: Vec<String> = record.iter().map(str::to_string).collect();
        cells.resize(table.headers.len(), String::new());

        let cell = |col: Option<usize>| col.and_then(|i| cells.get(i)).cloned().unwrap_or_default();
        let address = cell(Some(address_col));
        let postal_code = cell(postal_col);

        table.records.push(AddressRecord::new(address.trim(), postal_code.trim()));
        table.rows.push(cells);
    }

    log::info!("Read {} input rows from {}", table.records.len(), path.display());
    Ok(table)
}

#[derive(Debug, Deserialize)]
struct ReferenceRow {
    #[serde(alias = "address", alias = "key", alias = "split")]
    canonical_text: String,
    #[serde(default, alias = "postal_code")]
    postcode: String,
    #[serde(default, alias = "ll")]
    geocode: String,
    #[serde(default)]
    area: Option<String>,
}

/// Decodes canonical text that may be stored as a JSON array of tokens
/// (`["jalan","ss2"]`), joining the tokens with spaces. Plain text is
/// returned unchanged.
///
/// # Errors
///
/// Returns [`DbError::Json`] if the text looks like an array but is not a
/// JSON list of strings.
pub fn decode_canonical_text(raw: &str) -> Result<String, DbError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        let tokens: Vec<String> = serde_json::from_str(trimmed)?;
        return Ok(tokens.join(" "));
    }
    Ok(trimmed.to_string())
}

/// Reads reference records.
///
/// Columns: `canonical_text` (or `address`, `key`, `split`), `postcode`
/// (or `postal_code`), `geocode` (or `ll`), and an optional `area` that is
/// appended to the canonical text. Rows without text or geocode, and rows
/// that fail to parse, are skipped.
///
/// # Errors
///
/// Returns [`DbError`] if the file cannot be opened.
pub fn read_reference_records(path: &Path) -> Result<Vec<ReferenceRecord>, DbError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let mut records = Vec::new();
    let mut skipped = 0u64;

    for result in reader.deserialize::<ReferenceRow>() {
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                log::trace!("  skipping malformed row: {e}");
                skipped += 1;
                continue;
            }
        };

        let mut text = match decode_canonical_text(&row.canonical_text) {
            Ok(text) => text,
            Err(e) => {
                log::trace!("  skipping row with bad token list: {e}");
                skipped += 1;
                continue;
            }
        };

        if let Some(area) = row.area.as_deref().map(str::trim)
            && !area.is_empty()
        {
            text = format!("{text} {area}");
        }

        if text.is_empty() || row.geocode.trim().is_empty() {
            skipped += 1;
            continue;
        }

        records.push(ReferenceRecord::new(text, row.postcode.trim(), row.geocode.trim()));
    }

    log::info!(
        "Read {} reference rows from {} ({skipped} skipped)",
        records.len(),
        path.display()
    );
    Ok(records)
}

/// Writes the input rows followed by their match columns.
///
/// # Errors
///
/// Returns [`DbError`] if `results` does not line up with the input rows or
/// the file cannot be written.
pub fn write_results(path: &Path, table: &AddressTable, results: &[MatchResult]) -> Result<(), DbError> {
    if results.len() != table.rows.len() {
        return Err(DbError::Conversion {
            message: format!(
                "{} results for {} input rows",
                results.len(),
                table.rows.len()
            ),
        });
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        crate::paths::ensure_dir(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.headers.iter().map(String::as_str).chain(RESULT_COLUMNS))?;

    for (cells, result) in table.rows.iter().zip(results) {
        let score = result.score.to_string();
        let extra = [
            result.geocode.as_ref().map_or("", |g| g.as_str()),
            result.matched_key.as_deref().unwrap_or(""),
            score.as_str(),
            result.tier.as_deref().unwrap_or(""),
        ];
        writer.write_record(cells.iter().map(String::as_str).chain(extra))?;
    }

    writer.flush()?;
    log::info!("Wrote {} result rows to {}", results.len(), path.display());
    Ok(())
}
