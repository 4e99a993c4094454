//! Error types for archive operations

use std::path::PathBuf;
use thiserror::Error;

/// Archive operation errors
#[derive(Error, Debug)]
pub enum GmadError {
    /// Stream does not start with the archive magic
    #[error("Invalid magic tag in header")]
    BadMagic,

    /// Format version is newer than this crate writes
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),

    /// Stream holds zero bytes
    #[error("Archive stream is empty")]
    EmptyStream,

    /// Stream ended inside a field
    #[error("Archive stream ended early: {0}")]
    TruncatedStream(std::io::Error),

    /// Index entry carries a negative size or a non-UTF-8 path
    #[error("Malformed file index: {0}")]
    MalformedIndex(String),

    /// Path is the empty string
    #[error("Path is empty")]
    EmptyPath,

    /// Path contains a `..` segment
    #[error("{0}: contains upwards traversal")]
    PathTraversal(String),

    /// Path collides with the reserved metadata name
    #[error("{0}: is a reserved name")]
    ReservedName(String),

    /// Path matches one of the addon's own ignore patterns
    #[error("{0}: matches an ignore pattern")]
    Ignored(String),

    /// Path matches no whitelist pattern
    #[error("{0}: not allowed by whitelist")]
    NotWhitelisted(String),

    /// Addon already holds an entry at this path
    #[error("{0}: a file with the same path is already added")]
    DuplicatePath(String),

    /// Addon type is not in the supported vocabulary
    #[error("Invalid addon type: {0:?} (must be one of the supported types)")]
    InvalidType(String),

    /// Addon tag is not in the supported vocabulary
    #[error("Invalid addon tag: {0:?} (must be one of the supported tags)")]
    InvalidTag(String),

    /// More tags than the format allows
    #[error("Too many tags: {0} given, at most 2 allowed")]
    TooManyTags(usize),

    /// Project metadata carries no title
    #[error("Addon title is empty")]
    EmptyTitle,

    /// No entry, archive or watch at the given path
    #[error("{0}: not found in archive")]
    NotFound(String),

    /// Refusing to overwrite an existing file
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),

    /// Entry is already linked to an exported copy
    #[error("{0}: is already exported")]
    AlreadyExported(String),

    /// Mutation attempted through a read-only session
    #[error("Cannot modify a read-only session")]
    ReadOnly,

    /// Saved archive index does not cover every in-memory entry
    #[error("{0}: entry lost its backing during rebind")]
    RebindMismatch(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedded metadata could not be serialized
    #[error("Metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Archive operation result type
pub type Result<T> = std::result::Result<T, GmadError>;
