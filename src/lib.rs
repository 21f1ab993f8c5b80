//! portal-map library for maintaining local/remote id mappings in theme files.
//!
//! Theme files (`theme*.json`) carry a settings section in a loose JSON dialect
//! with comments and trailing commas. Entries of the form
//! `"portal_frag_<local>": "...es_tabId=<remote>&..."` map a local id to a
//! remote id. The workflow has four phases:
//!
//! 1. **Scanning**: parse each file and extract its mapping entries with byte spans
//! 2. **Analysis**: group entries across files and flag inconsistencies
//! 3. **Patching**: edit only the bytes of the affected entries, keeping comments
//!    and formatting intact
//! 4. **Batching**: back up, write, and log every mutating operation
//!
//! # Example
//!
//! ```no_run
//! use portal_map::{Config, Engine, MappingInput};
//! use std::path::Path;
//!
//! let engine = Engine::new(Config::default()).unwrap();
//! let dir = Path::new("./themes");
//!
//! let analysis = engine.analyze(dir).unwrap();
//! println!("{} inconsistent group(s)", analysis.diagnostics.inconsistent_groups);
//!
//! let record = engine
//!     .bulk_insert(dir, &[MappingInput { local_id: "200".into(), remote_id: "99".into() }])
//!     .unwrap();
//! println!("backup: {:?}", record.backup_dir);
//! ```

pub mod analyzer;
pub mod backup;
pub mod batch;
pub mod codec;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod report;
pub mod rewriter;
pub mod scanner;

// Re-export commonly used types at crate root
pub use analyzer::{Analysis, Diagnostics, MappingGroup, SharedRemote};
pub use backup::BackupSet;
pub use batch::{DeleteRequest, ImportMode, MappingInput};
pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
pub use exchange::ImportedMapping;
pub use report::{FileOutcome, FileReport, OperationKind, OperationRecord, SkipReason};
pub use scanner::{EntryStatus, FileMapping, MappingEntry, ScanReport};
