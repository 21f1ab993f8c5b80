//! Error types for request-level and fatal failures.
//!
//! Problems that only affect a single file or entry (unparsable file,
//! duplicate id, write failure) are not errors; they are reported as
//! [`SkipReason`](crate::report::SkipReason) values inside the operation record.

use std::path::PathBuf;
use thiserror::Error;

use crate::dialect::ParseError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("target directory {} does not exist", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("failed to read directory {}", path.display())]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to create backup in {}: {message}", dir.display())]
    Backup { dir: PathBuf, message: String },

    #[error("request contains no entries")]
    EmptyRequest,

    #[error("local id `{0}` appears more than once in the request")]
    DuplicateRequest(String),

    #[error("invalid id `{id}`: {reason}")]
    InvalidId { id: String, reason: &'static str },

    #[error("invalid value for `{local_id}`: {reason}")]
    InvalidValue {
        local_id: String,
        reason: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("export document has no `{0}` section")]
    MissingSection(String),

    #[error("failed to parse {what}")]
    Parse {
        what: String,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
