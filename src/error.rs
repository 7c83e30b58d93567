//! Error types for entitlement resolution
//!
//! Every failure the crate can surface is an [`AccessError`]. Variants carry the
//! offending raw string or resource id so callers can log or report them without
//! re-deriving context. Nothing here is retried internally.

use tokio_postgres::error::SqlState;

/// Result type for entitlement operations
pub type AccessResult<T> = Result<T, AccessError>;

/// Error types for entitlement resolution, identity decoding and provisioning
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// A native ACL string could not be parsed
    #[error("malformed acl: {0}")]
    MalformedAcl(String),

    /// A resource, entitlement or grant identifier does not match its grammar
    #[error("invalid identity {value:?}: {reason}")]
    InvalidIdentity { value: String, reason: String },

    /// A pagination token is corrupt or from an incompatible encoding
    #[error("invalid cursor: {0:?}")]
    InvalidCursor(String),

    /// A database tag does not resolve to a known database
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    /// Establishing or re-establishing a connection failed
    #[error("connection to database {database:?} failed: {source}")]
    Connection {
        database: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The operation is not supported for this resource kind or principal
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A catalog lookup returned no row
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// No connection could be checked out of a database's pool
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A query or statement failed on an established connection
    #[error("query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Configuration is missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// IO errors while reading configuration
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AccessError {
    /// Create an invalid identity error for `value`
    pub fn invalid_identity<V: Into<String>, R: Into<String>>(value: V, reason: R) -> Self {
        Self::InvalidIdentity {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection error wrapping the underlying transport error
    pub fn connection<D, E>(database: D, source: E) -> Self
    where
        D: Into<String>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Connection {
            database: database.into(),
            source: source.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: ToString>(kind: &'static str, id: S) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// The SQLSTATE reported by the server, if this error came from one
    pub fn sql_state(&self) -> Option<&SqlState> {
        match self {
            AccessError::Query(err) => err.code(),
            AccessError::Pool(deadpool_postgres::PoolError::Backend(err)) => err.code(),
            AccessError::Connection { source, .. } => source
                .downcast_ref::<tokio_postgres::Error>()
                .and_then(|err| err.code()),
            _ => None,
        }
    }

    /// Whether an outer orchestrator may reasonably retry the operation.
    ///
    /// Only infrastructure failures qualify; semantic errors (bad identities,
    /// malformed ACLs, unsupported operations) never succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            AccessError::Connection { .. } | AccessError::Pool(_) => true,
            AccessError::Query(err) => err.is_closed(),
            AccessError::MalformedAcl(_)
            | AccessError::InvalidIdentity { .. }
            | AccessError::InvalidCursor(_)
            | AccessError::DatabaseNotFound(_)
            | AccessError::UnsupportedOperation(_)
            | AccessError::NotFound { .. }
            | AccessError::Config(_)
            | AccessError::Io(_)
            | AccessError::Toml(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_identity_carries_value() {
        let err = AccessError::invalid_identity("table:oops", "expected 3 segments");
        let msg = err.to_string();
        assert!(msg.contains("table:oops"));
        assert!(msg.contains("expected 3 segments"));
    }

    #[test]
    fn test_retry_classification() {
        let conn = AccessError::connection("app", std::io::Error::other("reset"));
        assert!(conn.is_retryable());
        assert!(conn.sql_state().is_none());

        assert!(!AccessError::MalformedAcl("x".into()).is_retryable());
        assert!(!AccessError::unsupported("revoke superuser").is_retryable());
        assert!(!AccessError::InvalidCursor("abc".into()).is_retryable());
    }
}
