//! Operations shared by the subcommands and the interactive menu.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use geomatch_cli_utils::{IndicatifProgress, MultiProgress};
use geomatch_database::{paths, reference_db, tabular};
use geomatch_matcher::config::{self, Overrides};
use geomatch_matcher::presets::{self, DEFAULT_PRESET};
use geomatch_matcher::progress::ProgressCallback as _;
use geomatch_matcher::index::Candidate;
use geomatch_matcher::scorer::{self, PreparedText};
use geomatch_matcher::{CancelFlag, ConfigError, Matcher, run_batch};
use geomatch_matcher_models::{BatchSummary, MatcherConfig, TierConfig, TierKind};

use crate::reference::{self, ReferenceSpec};

/// Everything a matching run needs.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub preset: Option<String>,
    pub config: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub references: Vec<ReferenceSpec>,
    pub overrides: Overrides,
}

/// Loads a config file if given, otherwise a built-in preset, then layers
/// the overrides on top.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file or preset cannot be loaded.
pub fn load_config(
    preset: Option<&str>,
    config_path: Option<&Path>,
    overrides: Overrides,
) -> Result<MatcherConfig, ConfigError> {
    let mut config = match config_path {
        Some(path) => config::load_file(path)?,
        None => presets::preset(preset.unwrap_or(DEFAULT_PRESET))?,
    };
    overrides.apply(&mut config);
    Ok(config)
}

/// Default result path: `data/output/<input stem>_matched.csv`.
#[must_use]
pub fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "addresses".into(), |s| s.to_string_lossy());
    paths::output_dir().join(format!("{stem}_matched.csv"))
}

/// Resolves every row of the input CSV and writes the result CSV.
///
/// Ctrl-C stops the batch early; rows not yet processed are written with
/// empty match columns.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, a file cannot be read
/// or written, or the reference store cannot be opened.
pub async fn run(
    multi: &MultiProgress,
    options: RunOptions,
) -> Result<BatchSummary, Box<dyn std::error::Error>> {
    let config = load_config(
        options.preset.as_deref(),
        options.config.as_deref(),
        options.overrides,
    )?;
    log::info!("Using preset '{}' ({})", config.id, config.name);
    let matcher = Arc::new(Matcher::new(config)?);

    let table = tabular::read_address_records(&options.input)?;
    let source = reference::source(options.db.as_deref(), &options.references)?;

    let cancel = CancelFlag::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, finishing rows in flight");
                cancel.cancel();
            }
        })
    };

    let progress = IndicatifProgress::rows_bar(multi, "Resolving addresses");
    let outcome = run_batch(matcher, source, table.records.clone(), progress, cancel).await;
    interrupt.abort();
    let outcome = outcome?;

    let output = options
        .output
        .unwrap_or_else(|| default_output(&options.input));
    tabular::write_results(&output, &table, &outcome.results)?;

    if !outcome.unprocessed.is_empty() {
        log::warn!(
            "{} rows were not processed and have empty results",
            outcome.unprocessed.len()
        );
    }

    print_summary(&outcome.summary, &output);
    Ok(outcome.summary)
}

fn print_summary(summary: &BatchSummary, output: &Path) {
    println!();
    println!(
        "Matched {}/{} rows ({:.1}%) in {:.1}s",
        summary.matched,
        summary.total,
        summary.match_rate(),
        summary.elapsed_secs
    );
    for (tier, count) in &summary.per_tier {
        println!("  {tier:<16} {count}");
    }
    println!("  {:<16} {}", "unmatched", summary.unmatched);
    println!("Results written to {}", output.display());
}

/// Imports reference CSVs into a collection of the `DuckDB` file.
///
/// # Errors
///
/// Returns an error if a CSV cannot be read or the insert fails.
pub fn import(
    multi: &MultiProgress,
    db: Option<&Path>,
    collection: &str,
    partition: Option<&str>,
    files: &[PathBuf],
) -> Result<u64, Box<dyn std::error::Error>> {
    let conn = match db {
        Some(path) => reference_db::open(path)?,
        None => reference_db::open_default()?,
    };

    let progress = IndicatifProgress::steps_bar(multi, "Importing", files.len() as u64);
    let mut total = 0;

    for (i, file) in files.iter().enumerate() {
        progress.set_message(format!("Importing {}", file.display()));
        let records = tabular::read_reference_records(file)?;
        total += reference_db::insert_records(&conn, collection, partition, &records)?;
        progress.set_position(i as u64 + 1);
    }

    progress.finish(format!("Imported {total} rows into '{collection}'"));
    log::info!(
        "Reference database: {}",
        db.map_or_else(paths::reference_db_path, Path::to_path_buf).display()
    );
    Ok(total)
}

/// Prints row counts per collection and partition.
///
/// # Errors
///
/// Returns an error if the DB cannot be opened or queried.
pub fn partitions(
    db: Option<&Path>,
    collection: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = db.map_or_else(paths::reference_db_path, Path::to_path_buf);
    let conn = reference_db::open_read_only(&path)?;
    let partitions = reference_db::list_partitions(&conn, collection)?;

    if partitions.is_empty() {
        println!("No reference rows in {}", path.display());
        return Ok(());
    }

    println!("{:<16} {:<12} ROWS", "COLLECTION", "PARTITION");
    println!("{}", "-".repeat(40));
    for info in &partitions {
        println!(
            "{:<16} {:<12} {}",
            info.collection,
            info.partition_key.as_deref().unwrap_or("-"),
            info.rows
        );
    }
    Ok(())
}

/// Prints stored records for a postal code. With an address, each record
/// is also scored against it using the first tier reading `collection`.
///
/// # Errors
///
/// Returns an error if the DB cannot be read or the preset is invalid.
pub fn inspect(
    db: Option<&Path>,
    collection: &str,
    postal_code: &str,
    limit: usize,
    address: Option<&str>,
    preset: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = db.map_or_else(paths::reference_db_path, Path::to_path_buf);
    let conn = reference_db::open_read_only(&path)?;
    let records = reference_db::sample_postal_code(&conn, collection, postal_code, limit)?;

    if records.is_empty() {
        println!("No '{collection}' records for postal code {postal_code}");
        return Ok(());
    }

    let Some(address) = address else {
        for record in &records {
            println!("{}  [{}]", record.canonical_text, record.geocode);
        }
        return Ok(());
    };

    let matcher = Matcher::new(load_config(preset, None, Overrides::default())?)?;
    let tier = matcher
        .config()
        .tiers
        .iter()
        .find(|t| t.collection == collection && t.kind == TierKind::Fuzzy)
        .cloned()
        .ok_or_else(|| format!("no fuzzy tier reads collection '{collection}'"))?;
    let input = matcher.prepare(address);
    println!("Input: {}", input.form.cleaned_text);
    println!();

    for record in records {
        let candidate = matcher.prepare_candidate(record);
        println!(
            "{:<16} {}  [{}]",
            verdict(&matcher, &input, &candidate, &tier),
            candidate.record.canonical_text,
            candidate.record.geocode
        );
    }
    Ok(())
}

/// The score a fuzzy tier gives a candidate, or the name of the filter
/// that rejected it.
fn verdict(
    matcher: &Matcher,
    input: &PreparedText,
    candidate: &Candidate,
    tier: &TierConfig,
) -> String {
    match scorer::prefilter(input, &candidate.text, &tier.filters, matcher.keywords()) {
        Ok(similarity) => {
            let score = scorer::score_with(input, &candidate.text, &similarity, &tier.scoring);
            format!("{score:>3}")
        }
        Err(rejection) => rejection.name().to_string(),
    }
}

/// Prints the built-in presets and their tiers.
pub fn list_presets() {
    for preset in presets::all_presets() {
        let marker = if preset.id == DEFAULT_PRESET { " (default)" } else { "" };
        println!("{}{marker}: {}", preset.id, preset.name);
        if !preset.description.is_empty() {
            println!("  {}", preset.description);
        }
        for tier in &preset.tiers {
            println!(
                "  - {:<10} {:<10} {:<9} threshold {}",
                tier.name,
                tier.collection,
                tier.kind.as_ref(),
                tier.accept_threshold
            );
        }
    }
}

/// Validates a config file and prints its tiers.
///
/// # Errors
///
/// Returns [`ConfigError`] describing the first problem found.
pub fn validate(path: &Path) -> Result<(), ConfigError> {
    let config = config::load_file(path)?;
    config::validate(&config)?;
    println!("{} is valid: {} tiers", path.display(), config.tiers.len());
    Ok(())
}
