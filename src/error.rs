use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `memoria`.
///
/// Config loading reports [`ConfigError`] and the engine [`MemoryError`];
/// the binary folds both into `anyhow` for its context chains.
#[derive(Debug, Error)]
pub enum MemoriaError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Memory ──────────────────────────────────────────────────────────
    #[error("memory: {0}")]
    Memory(#[from] MemoryError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Memory errors ──────────────────────────────────────────────────────────

/// Failure taxonomy shared by every vector store backend and the engine.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory {id} not found")]
    NotFound { id: i64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("memory id {id} already exists")]
    ConflictingId { id: i64 },

    #[error("backend not available: {0}")]
    BackendUnavailable(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("{operation} [{scope}]: {source}")]
    Context {
        operation: &'static str,
        scope: String,
        #[source]
        source: Box<MemoryError>,
    },
}

/// Flat view of [`MemoryError`] that looks through [`MemoryError::Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    ConflictingId,
    BackendUnavailable,
    Serialization,
    Cancelled,
}

impl MemoryError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::BackendUnavailable(err.to_string())
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }

    /// Wrap with the failing operation and scope. Already-wrapped errors are
    /// left alone so the innermost operation name wins.
    #[must_use]
    pub fn during(self, operation: &'static str, scope: impl Into<String>) -> Self {
        match self {
            wrapped @ Self::Context { .. } => wrapped,
            other => Self::Context {
                operation,
                scope: scope.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::ConflictingId { .. } => ErrorKind::ConflictingId,
            Self::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Context { source, .. } => source.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Operation name recorded by [`MemoryError::during`], if any.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Context { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for MemoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Decode(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::TypeNotFound { .. } => Self::Serialization(err.to_string()),
            other => Self::BackendUnavailable(other.to_string()),
        }
    }
}

#[cfg(feature = "vector-search")]
impl From<lancedb::Error> for MemoryError {
    fn from(err: lancedb::Error) -> Self {
        Self::BackendUnavailable(err.to_string())
    }
}

#[cfg(feature = "vector-search")]
impl From<arrow_schema::ArrowError> for MemoryError {
    fn from(err: arrow_schema::ArrowError) -> Self {
        Self::Serialization(err.to_string())
    }
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, MemoriaError>;

/// Result type used by the memory subsystem.
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;
