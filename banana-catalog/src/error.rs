use thiserror::Error;

/// Error types for catalog loading, extraction and persistence
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Filesystem failure while reading sources or catalogs
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted catalog exists but cannot be parsed
    #[error("Corrupt catalog '{location}' at line {line}: {message}")]
    CorruptCatalog {
        location: String,
        line: usize,
        message: String,
    },

    /// The storage backend refused an operation
    #[error("Storage error for '{location}': {message}")]
    Storage { location: String, message: String },

    /// Two agents share a storage location but disagree on the source locale
    #[error(
        "Catalog '{storage}' is already registered with source locale '{existing}', cannot attach with '{requested}'"
    )]
    SourceLocaleConflict {
        storage: String,
        existing: String,
        requested: String,
    },

    /// A source transformer failed on a file
    #[error("Transform failed for '{file}': {message}")]
    Transform { file: String, message: String },

    /// An include or ignore pattern is not a valid glob
    #[error("Invalid glob pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// A URL pattern cannot be turned into a matcher
    #[error("Invalid URL pattern '{0}'")]
    UrlPattern(String),

    #[error("Invalid locale '{0}'")]
    InvalidLocale(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Status was requested before the agent attached to its shared state
    #[error("Catalog '{0}' has not been loaded")]
    UnknownCatalog(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Failure to parse the tag and placeholder grammar of a translation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// `</n>` found where `n` is not the innermost open tag
    #[error("unexpected closing tag </{tag}> at offset {offset}")]
    MismatchedClose { tag: u32, offset: usize },

    /// Input ended while `<n>` was still open
    #[error("tag <{tag}> is never closed")]
    Unclosed { tag: u32 },

    /// A tag or placeholder number does not fit in `u32`
    #[error("index out of range at offset {offset}")]
    IndexOverflow { offset: usize },
}
