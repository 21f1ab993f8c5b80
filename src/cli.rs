//! Command-line interface definitions.
//!
//! Defines the argument parser and subcommands using clap's derive API.
//! Each subcommand corresponds to one engine operation: scanning, grouping,
//! the mutating batches, export/import, or a standalone backup.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Maintain local/remote id mappings across theme files.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// JSON config file; missing settings use their defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increment each updated file's version field.
    #[arg(long, global = true)]
    pub bump_version: bool,

    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    pub json: bool,

    /// Print progress information to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the mapping entries of every theme file in a directory.
    Scan {
        /// Directory holding the theme files.
        dir: PathBuf,
    },

    /// Group entries by local id across files and report inconsistencies.
    Groups {
        dir: PathBuf,

        /// Only show groups whose remote ids differ between files.
        #[arg(long)]
        inconsistent: bool,
    },

    /// Insert mappings into every theme file of a directory.
    Insert {
        dir: PathBuf,

        /// Mapping in `local=remote` format. Repeat for several entries.
        #[arg(short, long = "entry", value_parser = parse_entry, required = true)]
        entries: Vec<(String, String)>,
    },

    /// Delete one local id from one file.
    Delete {
        file: PathBuf,
        local_id: String,
    },

    /// Delete several local ids, possibly from several files.
    BatchDelete {
        /// Request in `file=local` format. Repeat for several requests.
        #[arg(short, long = "request", value_parser = parse_request, required = true)]
        requests: Vec<(PathBuf, String)>,
    },

    /// Write the merged mapping set of a directory as one document.
    Export {
        dir: PathBuf,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Apply an exported document to every theme file of a directory.
    Import {
        dir: PathBuf,

        /// Document produced by `export`.
        document: PathBuf,

        /// Also remove entries whose local id is not in the document.
        #[arg(long)]
        prune: bool,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Back up every theme file of a directory without changing anything.
    Backup { dir: PathBuf },
}

fn parse_entry(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((local, remote)) => Ok((local.to_string(), remote.to_string())),
        None => Err(format!("Invalid entry format '{}', expected 'local=remote'", s)),
    }
}

fn parse_request(s: &str) -> Result<(PathBuf, String), String> {
    match s.rsplit_once('=') {
        Some((file, local)) if !file.is_empty() => Ok((PathBuf::from(file), local.to_string())),
        _ => Err(format!("Invalid request format '{}', expected 'file=local'", s)),
    }
}
