//! Menu-driven front end using `dialoguer`, for running the matcher
//! without memorizing flags.

use std::path::PathBuf;

use dialoguer::{Confirm, Input, Select};
use geomatch_cli_utils::MultiProgress;
use geomatch_database::paths;
use geomatch_matcher::config::Overrides;
use geomatch_matcher::presets::{self, DEFAULT_PRESET};

use crate::commands::{self, RunOptions};

/// Top-level actions available in the interactive menu.
enum Action {
    Resolve,
    Import,
    Partitions,
    Inspect,
    Presets,
}

impl Action {
    const ALL: &[Self] = &[
        Self::Resolve,
        Self::Import,
        Self::Partitions,
        Self::Inspect,
        Self::Presets,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Resolve => "Resolve an address CSV",
            Self::Import => "Import reference CSVs",
            Self::Partitions => "List reference partitions",
            Self::Inspect => "Inspect a postal code",
            Self::Presets => "List presets",
        }
    }
}

/// Prompts for an action and its parameters, then runs it.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected operation fails.
pub async fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Geomatch");
    println!();

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Action::ALL[idx] {
        Action::Resolve => resolve(multi).await?,
        Action::Import => import(multi)?,
        Action::Partitions => commands::partitions(None, None)?,
        Action::Inspect => inspect()?,
        Action::Presets => commands::list_presets(),
    }

    Ok(())
}

async fn resolve(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let input: String = Input::new()
        .with_prompt("Input CSV")
        .interact_text()?;
    let input = PathBuf::from(input.trim());

    let ids = presets::preset_ids();
    let default_idx = ids.iter().position(|id| *id == DEFAULT_PRESET).unwrap_or(0);
    let preset_idx = Select::new()
        .with_prompt("Preset")
        .items(&ids)
        .default(default_idx)
        .interact()?;

    let mut overrides = Overrides::default();
    let advanced = Confirm::new()
        .with_prompt("Configure advanced options?")
        .default(false)
        .interact()?;
    if advanced {
        overrides.worker_count = prompt_optional_usize("Workers (empty for preset default)")?;
        overrides.candidate_row_budget =
            prompt_optional_usize("Candidate row budget (empty for preset default)")?;
    }

    let output: String = Input::new()
        .with_prompt("Result CSV")
        .default(commands::default_output(&input).display().to_string())
        .interact_text()?;

    commands::run(
        multi,
        RunOptions {
            input,
            output: Some(PathBuf::from(output.trim())),
            preset: Some(ids[preset_idx].to_string()),
            overrides,
            ..RunOptions::default()
        },
    )
    .await?;
    Ok(())
}

fn import(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let collection: String = Input::new()
        .with_prompt("Collection")
        .default("nodes".to_string())
        .interact_text()?;
    let partition: String = Input::new()
        .with_prompt("Partition (empty for none)")
        .allow_empty(true)
        .interact_text()?;
    let files: String = Input::new()
        .with_prompt("CSV files (comma-separated)")
        .interact_text()?;

    let files: Vec<PathBuf> = files
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(PathBuf::from)
        .collect();
    if files.is_empty() {
        println!("No files given.");
        return Ok(());
    }

    let partition = partition.trim();
    commands::import(
        multi,
        Some(&paths::reference_db_path()),
        collection.trim(),
        (!partition.is_empty()).then_some(partition),
        &files,
    )?;
    Ok(())
}

fn inspect() -> Result<(), Box<dyn std::error::Error>> {
    let postal_code: String = Input::new().with_prompt("Postal code").interact_text()?;
    let collection: String = Input::new()
        .with_prompt("Collection")
        .default("nodes".to_string())
        .interact_text()?;
    let address: String = Input::new()
        .with_prompt("Address to score (empty to just list)")
        .allow_empty(true)
        .interact_text()?;

    let address = address.trim();
    commands::inspect(
        None,
        collection.trim(),
        postal_code.trim(),
        20,
        (!address.is_empty()).then_some(address),
        None,
    )?;
    Ok(())
}

fn prompt_optional_usize(prompt: &str) -> Result<Option<usize>, Box<dyn std::error::Error>> {
    let input: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    let trimmed = input.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.parse()?))
    }
}
