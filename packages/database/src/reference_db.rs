//! Reference records stored in `DuckDB`.
//!
//! A single `reference_records` table holds every collection. Rows carry an
//! optional partition key (e.g. a `YYYYMM` extraction month) so the corpus
//! can be scanned most-recent-first, and a monotonically increasing
//! `row_id` that fixes the retrieval order.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use duckdb::Connection;
use geomatch_matcher::{FetchRequest, ReferenceSource, ReferenceStore, RetrievalError};
use geomatch_matcher_models::ReferenceRecord;

use crate::DbError;

/// Row count and key of one partition of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Collection name.
    pub collection: String,
    /// Partition key, `None` for unpartitioned rows.
    pub partition_key: Option<String>,
    /// Number of rows.
    pub rows: u64,
}

/// Opens (or creates) the reference `DuckDB` and ensures the schema
/// exists.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let conn = Connection::open(path)?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Opens the reference DB at the default path.
///
/// # Errors
///
/// Returns [`DbError`] if the connection or schema creation fails.
pub fn open_default() -> Result<Connection, DbError> {
    open(&crate::paths::reference_db_path())
}

/// Opens an existing reference DB read-only.
///
/// # Errors
///
/// Returns [`DbError`] if the file does not exist or cannot be opened.
pub fn open_read_only(path: &Path) -> Result<Connection, DbError> {
    if !path.exists() {
        return Err(DbError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("reference database not found: {}", path.display()),
        )));
    }

    let conn = Connection::open_with_flags(
        path,
        duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?,
    )?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE SEQUENCE IF NOT EXISTS reference_row_id;

        CREATE TABLE IF NOT EXISTS reference_records (
            row_id BIGINT PRIMARY KEY DEFAULT nextval('reference_row_id'),
            collection TEXT NOT NULL,
            partition_key TEXT,
            postal_code TEXT NOT NULL,
            canonical_text TEXT NOT NULL,
            geocode TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reference_lookup
            ON reference_records (collection, postal_code);",
    )?;
    Ok(())
}

/// Appends records to a collection, optionally tagged with a partition.
///
/// The whole batch is written in one transaction. Returns the number of
/// rows inserted.
///
/// # Errors
///
/// Returns [`DbError`] if any insert fails; nothing is written in that
/// case.
pub fn insert_records(
    conn: &Connection,
    collection: &str,
    partition: Option<&str>,
    records: &[ReferenceRecord],
) -> Result<u64, DbError> {
    if records.is_empty() {
        return Ok(0);
    }

    conn.execute_batch("BEGIN TRANSACTION;")?;

    match insert_rows(conn, collection, partition, records) {
        Ok(inserted) => {
            conn.execute_batch("COMMIT;")?;
            log::info!(
                "Inserted {inserted} rows into {collection} (partition {})",
                partition.unwrap_or("-")
            );
            Ok(inserted)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK;") {
                log::warn!("Rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}

fn insert_rows(
    conn: &Connection,
    collection: &str,
    partition: Option<&str>,
    records: &[ReferenceRecord],
) -> Result<u64, DbError> {
    let mut stmt = conn.prepare(
        "INSERT INTO reference_records (collection, partition_key, postal_code, canonical_text, geocode)
         VALUES (?, ?, ?, ?, ?)",
    )?;

    let mut inserted = 0u64;
    for record in records {
        inserted += stmt.execute(duckdb::params![
            collection,
            partition,
            record.postal_code.trim(),
            record.canonical_text,
            record.geocode.as_str(),
        ])? as u64;
    }
    Ok(inserted)
}

/// Lists partitions with their row counts, most recent key first within
/// each collection.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn list_partitions(
    conn: &Connection,
    collection: Option<&str>,
) -> Result<Vec<PartitionInfo>, DbError> {
    let filter = if collection.is_some() {
        "WHERE collection = ?"
    } else {
        ""
    };
    let sql = format!(
        "SELECT collection, partition_key, COUNT(*)
         FROM reference_records
         {filter}
         GROUP BY collection, partition_key
         ORDER BY collection, partition_key DESC NULLS LAST"
    );

    let mut stmt = conn.prepare(&sql)?;
    if let Some(collection) = collection {
        stmt.raw_bind_parameter(1, collection)?;
    }
    stmt.raw_execute()?;

    let mut partitions = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let collection: String = row.get(0)?;
        let partition_key: Option<String> = row.get(1)?;
        let count: i64 = row.get(2)?;
        let row_count = u64::try_from(count).map_err(|e| DbError::Conversion {
            message: format!("negative row count {count}: {e}"),
        })?;
        partitions.push(PartitionInfo {
            collection,
            partition_key,
            rows: row_count,
        });
    }

    Ok(partitions)
}

/// Reads up to `request.limit` records in insertion order.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn fetch(conn: &Connection, request: &FetchRequest<'_>) -> Result<Vec<ReferenceRecord>, DbError> {
    let mut sql = String::from(
        "SELECT canonical_text, postal_code, geocode
         FROM reference_records
         WHERE collection = ?",
    );
    let mut params: Vec<&str> = vec![request.collection];

    if let Some(postal_code) = request.postal_code {
        sql.push_str(" AND postal_code = ?");
        params.push(postal_code);
    }
    if let Some(partition) = request.partition {
        sql.push_str(" AND partition_key = ?");
        params.push(partition);
    }
    let _ = write!(sql, " ORDER BY row_id LIMIT {}", request.limit);

    let mut stmt = conn.prepare(&sql)?;
    for (i, param) in params.iter().enumerate() {
        stmt.raw_bind_parameter(i + 1, param)?;
    }
    stmt.raw_execute()?;

    let mut records = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let canonical_text: String = row.get(0)?;
        let postal_code: String = row.get(1)?;
        let geocode: String = row.get(2)?;
        records.push(ReferenceRecord::new(canonical_text, postal_code, geocode));
    }

    Ok(records)
}

/// Returns the first `limit` records of a collection for one postal code,
/// across all partitions.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn sample_postal_code(
    conn: &Connection,
    collection: &str,
    postal_code: &str,
    limit: usize,
) -> Result<Vec<ReferenceRecord>, DbError> {
    fetch(
        conn,
        &FetchRequest {
            collection,
            postal_code: Some(postal_code.trim()),
            partition: None,
            limit,
        },
    )
}

/// Opens one read-only connection per worker to a reference `DuckDB` file.
#[derive(Debug, Clone)]
pub struct DuckDbSource {
    path: PathBuf,
}

impl DuckDbSource {
    /// Creates a source for the DB at `path`. Nothing is opened yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the DB file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReferenceSource for DuckDbSource {
    fn open(&self) -> Result<Box<dyn ReferenceStore>, RetrievalError> {
        let conn = open_read_only(&self.path)
            .map_err(|e| RetrievalError::Open(format!("{}: {e}", self.path.display())))?;
        Ok(Box::new(DuckDbStore { conn }))
    }
}

struct DuckDbStore {
    conn: Connection,
}

impl ReferenceStore for DuckDbStore {
    fn fetch(&mut self, request: &FetchRequest<'_>) -> Result<Vec<ReferenceRecord>, RetrievalError> {
        fetch(&self.conn, request).map_err(|e| RetrievalError::Query(e.to_string()))
    }
}
