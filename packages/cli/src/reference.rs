//! Reference data selection for a run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use geomatch_database::{DuckDbSource, paths, tabular};
use geomatch_matcher::{MemorySource, ReferenceSource};

/// A reference CSV loaded into memory for one run.
///
/// Written as `collection=path.csv` or `collection:partition=path.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpec {
    pub collection: String,
    pub partition: Option<String>,
    pub path: PathBuf,
}

impl FromStr for ReferenceSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, path) = s
            .split_once('=')
            .ok_or_else(|| format!("expected collection=path, got '{s}'"))?;

        let (collection, partition) = match target.split_once(':') {
            Some((collection, partition)) => (collection.trim(), Some(partition.trim())),
            None => (target.trim(), None),
        };

        if collection.is_empty() {
            return Err(format!("missing collection name in '{s}'"));
        }
        if partition.is_some_and(str::is_empty) {
            return Err(format!("empty partition in '{s}'"));
        }
        if path.trim().is_empty() {
            return Err(format!("missing path in '{s}'"));
        }

        Ok(Self {
            collection: collection.to_string(),
            partition: partition.map(str::to_string),
            path: PathBuf::from(path.trim()),
        })
    }
}

/// Picks the reference source: in-memory CSVs when any are given,
/// otherwise the `DuckDB` file (`db` or the default data path).
///
/// # Errors
///
/// Returns an error if a CSV cannot be read or the DB file does not exist.
pub fn source(
    db: Option<&Path>,
    references: &[ReferenceSpec],
) -> Result<Arc<dyn ReferenceSource>, Box<dyn std::error::Error>> {
    if references.is_empty() {
        let path = db.map_or_else(paths::reference_db_path, Path::to_path_buf);
        if !path.exists() {
            return Err(format!(
                "reference database {} not found; run `geomatch import` first",
                path.display()
            )
            .into());
        }
        let source = DuckDbSource::new(path);
        log::info!("Using reference database {}", source.path().display());
        return Ok(Arc::new(source));
    }

    let mut builder = MemorySource::builder();
    for spec in references {
        let records = tabular::read_reference_records(&spec.path)?;
        log::debug!(
            "Read {} records for '{}'{}",
            records.len(),
            spec.collection,
            spec.partition
                .as_deref()
                .map_or_else(String::new, |p| format!(" partition {p}")),
        );
        builder = builder.add(&spec.collection, spec.partition.as_deref(), records);
    }

    let memory = builder.build();
    let collections: BTreeSet<&str> = references.iter().map(|s| s.collection.as_str()).collect();
    for collection in collections {
        log::info!("Loaded {} '{collection}' records", memory.len(collection));
    }
    Ok(Arc::new(memory))
}
