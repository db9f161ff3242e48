/// Failures while opening, extracting or parsing an EPUB container.
#[derive(Debug, thiserror::Error)]
pub enum EpubError {
    #[error("`{path}' is not a valid EPUB archive: {detail}")]
    InvalidArchive { path: String, detail: String },

    #[error("Archive entry `{entry}' is corrupted: {detail}")]
    CorruptArchive { entry: String, detail: String },

    #[error("No metadata: {0}")]
    NoMetadata(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("ZIP bomb detected: decompression ratio {ratio}:1 exceeds limit {limit}:1")]
    ZipBomb { ratio: u64, limit: u64 },

    #[error("Path traversal detected in archive entry: {path}")]
    PathTraversal { path: String },

    #[error("Archive contains {count} files, exceeding limit of {limit}")]
    TooManyFiles { count: u64, limit: u64 },

    #[error("Resource {name} is {size_mb}MB, exceeding limit of {limit_mb}MB")]
    OversizedResource {
        name: String,
        size_mb: u64,
        limit_mb: u64,
    },
}

/// Failures of the collection's backing table.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Malformed collection table {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
