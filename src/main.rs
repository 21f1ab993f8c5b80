//! portal-map: maintain local/remote id mappings across theme files.
//!
//! This tool scans a directory of `theme*.json` files for mapping entries,
//! reports duplicates and cross-file inconsistencies, and performs
//! backed-up, logged, format-preserving edits.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dialoguer::Confirm;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Args, Commands};
use portal_map::{
    Analysis, Config, DeleteRequest, Engine, EntryStatus, FileOutcome, ImportMode, MappingInput,
    OperationRecord, ScanReport,
};

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if args.bump_version {
        config.bump_version = true;
    }
    let engine = Engine::new(config).context("Invalid configuration")?;
    let json = args.json;

    match args.command {
        Commands::Scan { dir } => cmd_scan(&engine, &dir, json),
        Commands::Groups { dir, inconsistent } => cmd_groups(&engine, &dir, inconsistent, json),
        Commands::Insert { dir, entries } => {
            let entries: Vec<MappingInput> = entries
                .into_iter()
                .map(|(local_id, remote_id)| MappingInput {
                    local_id,
                    remote_id,
                })
                .collect();
            let record = engine.bulk_insert(&dir, &entries)?;
            print_output(&record, json, print_record)
        }
        Commands::Delete { file, local_id } => {
            let record = engine.delete_one(&file, &local_id)?;
            print_output(&record, json, print_record)
        }
        Commands::BatchDelete { requests } => {
            let requests: Vec<DeleteRequest> = requests
                .into_iter()
                .map(|(file_path, local_id)| DeleteRequest {
                    file_path,
                    local_id,
                })
                .collect();
            let record = engine.batch_delete(&requests)?;
            print_output(&record, json, print_record)
        }
        Commands::Export { dir, output } => cmd_export(&engine, &dir, output),
        Commands::Import {
            dir,
            document,
            prune,
            yes,
        } => cmd_import(&engine, &dir, &document, prune, yes, json),
        Commands::Backup { dir } => {
            let set = engine.backup(&dir)?;
            println!(
                "{} Backed up {} file(s) to {}",
                "ok:".green().bold(),
                set.original_paths.len(),
                set.backup_dir.display()
            );
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn print_output<T: Serialize>(value: &T, json: bool, human: fn(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn cmd_scan(engine: &Engine, dir: &Path, json: bool) -> Result<()> {
    let report = engine.scan(dir)?;
    print_output(&report, json, print_scan)
}

fn cmd_groups(engine: &Engine, dir: &Path, only_inconsistent: bool, json: bool) -> Result<()> {
    let mut analysis = engine.analyze(dir)?;
    if only_inconsistent {
        analysis.groups.retain(|g| !g.consistent);
    }
    print_output(&analysis, json, print_analysis)
}

fn cmd_export(engine: &Engine, dir: &Path, output: Option<PathBuf>) -> Result<()> {
    let document = engine.export(dir)?;
    match output {
        Some(path) => {
            std::fs::write(&path, &document)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Exported to {}", "ok:".green().bold(), path.display());
        }
        None => print!("{}", document),
    }
    Ok(())
}

fn cmd_import(
    engine: &Engine,
    dir: &Path,
    document: &Path,
    prune: bool,
    yes: bool,
    json: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(document)
        .with_context(|| format!("Failed to read {}", document.display()))?;
    let mappings = engine.read_export(&text)?;
    let mode = if prune {
        ImportMode::Prune
    } else {
        ImportMode::Merge
    };

    if !yes {
        let prompt = format!(
            "Apply {} mapping(s) to every theme file in {} ({})?",
            mappings.len(),
            dir.display(),
            mode
        );
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("{} Import cancelled", "info:".blue().bold());
            return Ok(());
        }
    }

    let record = engine.import_replace(dir, &mappings, mode)?;
    print_output(&record, json, print_record)
}

fn print_scan(report: &ScanReport) {
    for file in &report.files {
        println!("{}", file.file_path.display().to_string().bold());
        if file.mappings.is_empty() {
            println!("  {}", "(no mappings)".dimmed());
        }
        for entry in &file.mappings {
            let remote = entry.remote_id.as_deref().unwrap_or("(none)");
            let line = format!("  {} -> {}", entry.local_id, remote);
            match entry.status {
                EntryStatus::Normal if entry.same_id => println!("{} {}", line, "(same id)".dimmed()),
                EntryStatus::Normal => println!("{}", line),
                EntryStatus::DuplicateLocal => {
                    println!("{} {}", line.red(), "(duplicate local id)".red())
                }
                EntryStatus::DuplicateRemote => {
                    println!("{} {}", line.yellow(), "(duplicate remote id)".yellow())
                }
            }
        }
    }
    for skipped in &report.skipped {
        println!(
            "{} {}: {}",
            "warn:".yellow().bold(),
            skipped.file_path.display(),
            skipped.reason
        );
    }
}

fn print_analysis(analysis: &Analysis) {
    let d = &analysis.diagnostics;
    println!(
        "{} Files: {} ({} skipped), Entries: {}, Groups: {} ({} inconsistent)",
        "Diagnostics:".bold(),
        d.files_scanned,
        d.files_skipped,
        d.total_entries,
        d.groups,
        d.inconsistent_groups
    );
    println!(
        "             Duplicate local: {}, Duplicate remote: {}, Same id: {}",
        d.duplicate_local, d.duplicate_remote, d.same_id
    );

    for group in &analysis.groups {
        let marker = if group.consistent {
            "ok".green()
        } else {
            "mismatch".red()
        };
        println!("\n  {} [{}]", group.local_id.bold(), marker);
        for grouped in &group.entries {
            println!(
                "    {} {}",
                grouped.file_path.display().to_string().dimmed(),
                grouped.entry.remote_id.as_deref().unwrap_or("(none)")
            );
        }
    }

    if !analysis.shared_remotes.is_empty() {
        println!("\n{}", "Remote ids shared by several local ids:".yellow().bold());
        for shared in &analysis.shared_remotes {
            println!("  {} <- {}", shared.remote_id, shared.local_ids.join(", "));
        }
    }
}

fn print_record(record: &OperationRecord) {
    println!("{} {}", "info:".blue().bold(), record.summary);
    match &record.backup_dir {
        Some(dir) => println!("{} Backup: {}", "info:".blue().bold(), dir.display()),
        None => println!("{} No backup (nothing was written)", "info:".blue().bold()),
    }

    for file in &record.files {
        match &file.outcome {
            FileOutcome::Updated => {
                let version = match (file.version_before, file.version_after) {
                    (Some(before), Some(after)) if before != after => {
                        format!(" (version {} -> {})", before, after)
                    }
                    _ => String::new(),
                };
                println!(
                    "{} {}{}",
                    "ok:".green().bold(),
                    file.file_path.display(),
                    version.dimmed()
                );
            }
            FileOutcome::Skipped(reason) => println!(
                "{} {}: {}",
                "skip:".yellow().bold(),
                file.file_path.display(),
                reason
            ),
        }
        for skip in &file.skipped_entries {
            println!(
                "    {} {}: {}",
                "-".dimmed(),
                skip.local_id,
                skip.reason.to_string().dimmed()
            );
        }
    }

    match &record.log_path {
        Some(path) => println!("{} Log: {}", "info:".blue().bold(), path.display()),
        None => println!("{} Operation log could not be written", "warn:".yellow().bold()),
    }
}
