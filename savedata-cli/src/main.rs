/*!
Savedata CLI - Command-line interface for inspecting savedata save slots.

This CLI provides utilities for inspecting, verifying, and debugging save files
written by the save data manager's file slot.
*/

use clap::{Parser, Subcommand};
use savedata_core::{FileSlot, JsonCodec, SaveDataError, SaveMetadata, SaveSlot, Scope, Table as SaveTable};
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "savedata")]
#[command(about = "CLI for inspecting savedata save slots")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List save files in a directory
    List {
        /// Directory holding `<mod>.dat` save files
        #[arg(default_value = "./saves")]
        dir: PathBuf,
    },
    /// Show envelope details of a save file
    Show {
        /// Path of the save file
        file: PathBuf,
    },
    /// Verify integrity of a save file
    Verify {
        /// Path of the save file
        file: PathBuf,
    },
    /// List the features stored in a save file
    Features {
        /// Path of the save file
        file: PathBuf,
    },
    /// Print the stored data as JSON
    Dump {
        /// Path of the save file
        file: PathBuf,
        /// Only print this feature
        #[arg(short, long)]
        feature: Option<String>,
        /// Only print this scope (persistent, run or level)
        #[arg(short, long, requires = "feature")]
        scope: Option<String>,
    },
    /// Delete a save file
    Delete {
        /// Path of the save file
        file: PathBuf,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Tabled)]
struct SaveFileInfo {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Features")]
    features: usize,
    #[tabled(rename = "Codec")]
    codec: String,
    #[tabled(rename = "Saved")]
    saved_at: String,
    #[tabled(rename = "Size")]
    size: String,
}

#[derive(Tabled)]
struct FeatureInfo {
    #[tabled(rename = "Feature")]
    name: String,
    #[tabled(rename = "Scopes")]
    scopes: String,
    #[tabled(rename = "Fields")]
    fields: usize,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Execute command
    match cli.command {
        Commands::List { dir } => list_saves(&dir)?,
        Commands::Show { file } => show_save(&file)?,
        Commands::Verify { file } => verify_save(&file)?,
        Commands::Features { file } => list_features(&file)?,
        Commands::Dump { file, feature, scope } => dump_save(&file, feature.as_deref(), scope.as_deref())?,
        Commands::Delete { file, force } => delete_save(&file, force)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn inspect_save(file: &Path) -> Result<(SaveMetadata, SaveTable), SaveDataError> {
    let text = FileSlot::new(file)
        .read()?
        .ok_or_else(|| SaveDataError::slot(format!("no save file at {}", file.display())))?;
    JsonCodec::new().inspect(&text)
}

fn list_saves(dir: &Path) -> Result<(), anyhow::Error> {
    info!("Listing save files in {}", dir.display());

    if !dir.exists() {
        println!("No save directory found at: {}", dir.display());
        return Ok(());
    }

    let mut saves = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let file_path = entry?.path();
        if !file_path.is_file() || file_path.extension() != Some(std::ffi::OsStr::new(FileSlot::EXTENSION)) {
            continue;
        }

        match inspect_save(&file_path) {
            Ok((metadata, _)) => {
                let size = match std::fs::metadata(&file_path) {
                    Ok(meta) => format_size(meta.len()),
                    Err(_) => "Unknown".to_string(),
                };

                saves.push(SaveFileInfo {
                    file: file_path
                        .file_name()
                        .unwrap_or_default()
                        .to_string_lossy()
                        .to_string(),
                    features: metadata.feature_count,
                    codec: metadata.codec.clone(),
                    saved_at: format_timestamp(metadata.saved_at.timestamp()),
                    size,
                });
            }
            Err(e) => {
                warn!("Failed to read {}: {}", file_path.display(), e);
            }
        }
    }

    if saves.is_empty() {
        println!("No save files found");
    } else {
        saves.sort_by(|a, b| a.file.cmp(&b.file));
        println!("{}", Table::new(saves));
    }

    Ok(())
}

fn show_save(file: &Path) -> Result<(), anyhow::Error> {
    info!("Showing save file: {}", file.display());

    match inspect_save(file) {
        Ok((metadata, data)) => {
            println!("Save Details:");
            println!("  File: {}", file.display());
            println!("  Summary: {}", metadata.summary());
            println!("  Saved: {}", format_timestamp(metadata.saved_at.timestamp()));
            println!("  Format Version: {}", metadata.format_version);
            println!("  Codec: {}", metadata.codec);
            println!("  Content Hash: {}", metadata.content_hash);
            println!("  Payload Size: {}", format_size(metadata.payload_size as u64));
            println!("  Features: {}", feature_names(&data).join(", "));
        }
        Err(e) => {
            error!("Failed to read save file: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

fn verify_save(file: &Path) -> Result<(), anyhow::Error> {
    info!("Verifying save file: {}", file.display());

    match inspect_save(file) {
        Ok((metadata, _data)) => {
            println!("✓ Save file is valid and integrity check passed");
            if metadata.codec == "legacy-json" {
                println!("  (legacy file without an envelope; nothing to verify against)");
            }
        }
        Err(SaveDataError::IntegrityCheckFailed { expected, actual }) => {
            error!("✗ Integrity check failed:");
            error!("  Expected hash: {}", expected);
            error!("  Actual hash: {}", actual);
            return Err(anyhow::anyhow!("Integrity check failed"));
        }
        Err(e) => {
            error!("✗ Failed to verify save file: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

fn list_features(file: &Path) -> Result<(), anyhow::Error> {
    let (_, data) = inspect_save(file)?;
    let features = feature_rows(&data);

    if features.is_empty() {
        println!("No features stored");
    } else {
        println!("{}", Table::new(features));
    }
    Ok(())
}

fn dump_save(file: &Path, feature: Option<&str>, scope: Option<&str>) -> Result<(), anyhow::Error> {
    let (_, data) = inspect_save(file)?;
    let selected = select(data, feature, scope)?;
    let json = JsonCodec::new().to_json(&selected)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn delete_save(file: &Path, force: bool) -> Result<(), anyhow::Error> {
    if !force {
        print!("Are you sure you want to delete save file '{}'? (y/N): ", file.display());
        use std::io::{self, Write};
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().to_lowercase().starts_with('y') {
            println!("Deletion cancelled");
            return Ok(());
        }
    }

    FileSlot::new(file).delete()?;
    println!("✓ Save file deleted successfully");
    Ok(())
}

fn feature_names(data: &SaveTable) -> Vec<String> {
    data.keys().map(ToString::to_string).collect()
}

fn feature_rows(data: &SaveTable) -> Vec<FeatureInfo> {
    data.iter()
        .map(|(name, value)| {
            let scopes = value.as_table();
            FeatureInfo {
                name: name.to_string(),
                scopes: scopes
                    .map(|scopes| scopes.keys().map(ToString::to_string).collect::<Vec<_>>().join(", "))
                    .unwrap_or_default(),
                fields: scopes.map_or(0, |scopes| {
                    scopes
                        .iter()
                        .filter_map(|(_, scope)| scope.as_table())
                        .map(SaveTable::data_len)
                        .sum()
                }),
            }
        })
        .collect()
}

/// Narrow the stored data to one feature, or one scope of one feature.
fn select(mut data: SaveTable, feature: Option<&str>, scope: Option<&str>) -> Result<SaveTable, anyhow::Error> {
    let Some(feature) = feature else {
        return Ok(data);
    };
    let Some(savedata_core::Value::Table(mut slice)) = data.remove(feature) else {
        return Err(anyhow::anyhow!("Feature '{feature}' is not stored in this save file"));
    };
    let Some(scope) = scope else {
        return Ok(slice);
    };
    let scope = Scope::from_name(scope).ok_or_else(|| anyhow::anyhow!("Unknown scope '{scope}'"))?;
    match slice.remove(scope.name()) {
        Some(savedata_core::Value::Table(table)) => Ok(table),
        _ => Err(anyhow::anyhow!("Feature '{feature}' has no stored {scope} scope")),
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp.to_string(),
    }
}
