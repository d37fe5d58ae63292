use thiserror::Error;

/// Result alias for session service operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result alias for store backend operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed error used to carry a backend's own failure type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The entropy source failed while drawing a new session id.
///
/// Unrecoverable for the current operation; session creation must abort.
#[derive(Error, Debug)]
#[error("error generating session id: {source}")]
pub struct GenerationError {
    #[source]
    source: rand::Error,
}

impl From<rand::Error> for GenerationError {
    fn from(source: rand::Error) -> Self {
        Self { source }
    }
}

/// An externally supplied session id is not a well-formed identifier.
#[derive(Error, Debug)]
pub enum FormatError {
    /// The encoded id does not have the fixed encoded length.
    #[error("error validating session: wrong session id length (expected {expected}, got {actual})")]
    WrongLength {
        /// Required number of characters.
        expected: usize,
        /// Number of characters received.
        actual: usize,
    },

    /// The id contains characters outside the base-32 alphabet.
    #[error("error validating session: {0}")]
    InvalidEncoding(#[source] data_encoding::DecodeError),
}

/// A flat key/value attribute list could not be turned into a map.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Keys and values must come in pairs.
    #[error("expected even count of key and values, got: {count}")]
    OddArgumentCount {
        /// Total number of elements received.
        count: usize,
    },

    /// A key position held something other than a string.
    #[error("can't convert key of type: {found} to string (position {position})")]
    KeyType {
        /// Index of the offending element in the flat list.
        position: usize,
        /// Kind name of the value found there.
        found: &'static str,
    },
}

/// Failure reported by a session store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record matches the requested session id.
    #[error("session not found")]
    NotFound,

    /// The backend failed; the cause is preserved.
    #[error("{operation} failed: {source}")]
    Backend {
        /// Store operation that failed.
        operation: &'static str,
        /// Underlying backend error.
        #[source]
        source: BoxError,
    },

    /// A record could not be encoded or decoded.
    #[error("{operation} failed to (de)serialize session: {source}")]
    Serialization {
        /// Store operation that failed.
        operation: &'static str,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The request context was cancelled while the call was in flight.
    #[error("{operation} cancelled")]
    Cancelled {
        /// Store operation that was aborted.
        operation: &'static str,
    },

    /// The request deadline elapsed while the call was in flight.
    #[error("{operation} exceeded its deadline")]
    DeadlineExceeded {
        /// Store operation that was aborted.
        operation: &'static str,
    },
}

impl StoreError {
    /// Wraps an arbitrary backend error with the name of the failing operation.
    pub fn backend<E>(operation: &'static str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        StoreError::Backend {
            operation,
            source: source.into(),
        }
    }

    /// Wraps a serde failure with the name of the failing operation.
    pub fn serialization(operation: &'static str, source: serde_json::Error) -> Self {
        StoreError::Serialization { operation, source }
    }

    /// Returns `true` for the canonical "no such session" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Error returned by the session service.
///
/// `NotFound` is kept distinct from every other store failure so callers can
/// map it without unwrapping a chain.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A new session id could not be generated.
    #[error("{operation}: {source}")]
    Generation {
        /// Service operation that failed.
        operation: &'static str,
        /// Entropy failure.
        #[source]
        source: GenerationError,
    },

    /// An externally supplied id failed validation.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The key/value attribute list was malformed.
    #[error("{operation} error: {source}")]
    Parse {
        /// Service operation that failed.
        operation: &'static str,
        /// Parsing failure.
        #[source]
        source: ParseError,
    },

    /// An attribute mutation was requested with nothing to apply.
    #[error("{operation}: no attributes to {action}")]
    EmptyAttributes {
        /// Service operation that failed.
        operation: &'static str,
        /// Either `add` or `remove`.
        action: &'static str,
    },

    /// The session does not exist.
    #[error("session not found")]
    NotFound,

    /// Any other store failure, with the originating operation.
    #[error("{operation} store error: {source}")]
    Store {
        /// Service operation that failed.
        operation: &'static str,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
}

impl SessionError {
    /// Translates a store error, passing `NotFound` through unwrapped.
    pub fn from_store(operation: &'static str, source: StoreError) -> Self {
        match source {
            StoreError::NotFound => SessionError::NotFound,
            source => SessionError::Store { operation, source },
        }
    }

    /// Returns `true` when the session does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound)
    }

    /// Returns `true` for caller input errors that never reached the store.
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            SessionError::Format(_) | SessionError::Parse { .. } | SessionError::EmptyAttributes { .. }
        )
    }

    /// Returns `true` for backend failures a caller may choose to retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SessionError::Store {
                source: StoreError::Backend { .. }
                    | StoreError::Cancelled { .. }
                    | StoreError::DeadlineExceeded { .. },
                ..
            }
        )
    }
}
