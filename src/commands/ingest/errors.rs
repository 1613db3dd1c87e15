use std::path::PathBuf;

/// The document's text could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("cannot read {path:?}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("pdftotext failed for {path:?}: {message}")]
    Converter { path: PathBuf, message: String },

    #[error("pdftotext timed out after {seconds}s for {path:?}")]
    Timeout { path: PathBuf, seconds: u64 },

    #[error("no text available for {path:?}")]
    Missing { path: PathBuf },
}

/// A mandatory header field was absent or unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("document has no text layer")]
    EmptyText,

    #[error("missing mandatory header field: {field}")]
    MissingField { field: &'static str },

    #[error("malformed header field {field}: {value:?}")]
    MalformedField { field: &'static str, value: String },
}

/// The atomic unit for one document was not committed; any partial writes were rolled back.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("store rejected unit for {path}: {source}")]
    Store {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("inspection on {inspection_date} for {path} is already imported from {bound_path}")]
    Conflict {
        path: String,
        inspection_date: String,
        bound_path: String,
    },
}

/// Stops the whole run; no further documents are attempted.
#[derive(Debug, thiserror::Error)]
pub enum FatalConfigError {
    #[error("corpus unavailable: {0}")]
    Corpus(String),

    #[error("store schema incompatible: {0}")]
    Schema(String),

    #[error("store unavailable: {0}")]
    Store(String),
}
