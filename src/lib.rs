//! unreal-pkg: load, edit, relink and save Unreal Engine 3 style packages
//!
//! A package is a name table plus two flat object tables: exports (objects
//! the package owns, each with a serialized payload) and imports
//! (references into other packages). This library rebuilds the object tree
//! from those tables, mutates it safely and copies subtrees between
//! packages while keeping every embedded reference valid.
//!
//! # Architecture
//!
//! - **Format**: Header, table records and zlib chunks on the wire
//! - **Package**: In-memory tables, paths, change notification, load/save
//! - **Tree**: Sorted parent/child view with incremental maintenance
//! - **Properties**: Tagged payloads, decoded so references can be rewritten
//! - **Ops**: Clone, trash, reindex and reference search inside one package
//! - **Resolver**: Finds the export behind an import across package files
//! - **Porting**: Copies subtrees between packages and relinks them

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod changes;
pub mod config;
pub mod entries;
pub mod format;
pub mod issues;
pub mod names;
pub mod ops;
pub mod package;
pub mod porting;
pub mod properties;
pub mod resolver;
pub mod tree;
pub mod utils;

#[cfg(test)]
pub mod fixtures;

// Re-export commonly used types
pub use changes::{PackageChange, PackageObserver, PackageUpdate, UpdateTarget};
pub use config::EngineConfig;
pub use entries::{EntryRef, ExportEntry, ImportEntry, ObjectName};
pub use issues::{IssueKind, RelinkIssue};
pub use package::{Package, SaveOptions};
pub use porting::{port, port_batch, ObjectMap, PortOutcome, PortReport, PortRequest, PortingPolicy};
pub use resolver::{resolve_import, ArchiveSource, PackageCache};
pub use tree::EntryTree;
pub use utils::CancellationToken;

/// Result type used throughout the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for unreal-pkg
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file is not a well-formed package; nothing was loaded
    #[error("Structural corruption: {reason}")]
    StructuralCorruption {
        /// What was wrong
        reason: String,
    },

    /// Name index outside the name table
    #[error("Name index {index} out of range (table has {count} names)")]
    NameIndexOutOfRange {
        /// The requested index
        index: usize,
        /// Names in the table
        count: usize,
    },

    /// The reference names no existing entry
    #[error("No entry {0}")]
    EntryNotFound(EntryRef),

    /// The entry already sits in the trash
    #[error("Entry {0} is already in the trash")]
    AlreadyTrashed(EntryRef),

    /// A payload could not be decoded as a property list
    #[error("Payload of {entry} could not be parsed: {reason}")]
    UnparsedPayload {
        /// Export owning the payload
        entry: EntryRef,
        /// Why decoding stopped
        reason: String,
    },

    /// The request cannot be carried out on these entries
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Compressed data could not be inflated
    #[error("Decompression failed: {0}")]
    Decompression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging for the library
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("unreal_pkg=info"))
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}
