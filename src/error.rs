//! Error types for the PostgreSQL MCP server.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each variant carries an actionable message so callers (including AI assistants on
//! the other side of the MCP connection) can decide whether to retry.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// A connection could not be established or leased.
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    /// The engine rejected or failed the SQL itself.
    #[error("Statement failed: {message}")]
    Statement {
        message: String,
        /// e.g., "25006" for a write inside a read-only transaction
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Pool exhausted: no connection to '{database}' became available within {waited_secs}s")]
    PoolExhausted { database: String, waited_secs: u64 },

    #[error("Pool registry is closed: the server is shutting down")]
    RegistryClosed,

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a statement error with optional SQL state.
    pub fn statement(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Statement {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn pool_exhausted(database: impl Into<String>, waited_secs: u64) -> Self {
        Self::PoolExhausted {
            database: database.into(),
            waited_secs,
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable tag identifying the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "ConnectionError",
            Self::Statement { .. } => "StatementError",
            Self::PoolExhausted { .. } => "PoolExhausted",
            Self::RegistryClosed => "RegistryClosed",
            Self::Timeout { .. } => "Timeout",
            Self::InvalidInput { .. } => "InvalidInput",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Statement { suggestion, .. } => Some(suggestion),
            Self::PoolExhausted { .. } => {
                Some("Retry shortly or raise the pool's max connections")
            }
            Self::Timeout { .. } => {
                Some("Consider increasing the statement timeout or optimizing the query")
            }
            _ => None,
        }
    }

    /// Check if the caller may retry the same request.
    ///
    /// Statement errors are never retryable: re-running a failed write could apply
    /// its side effects twice.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::PoolExhausted { .. } | Self::Timeout { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection settings and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                let suggestion = match code.as_deref() {
                    Some("25006") => {
                        "The statement modifies data; use the write query tool instead"
                    }
                    Some("42P01") => "Check that the table exists in the configured schema",
                    Some("42601") if db_err.message().contains("multiple commands") => {
                        "Send a single SQL statement per call"
                    }
                    _ => "Check the SQL syntax and referenced objects",
                };
                DbError::statement(db_err.message(), code, suggestion)
            }
            sqlx::Error::RowNotFound => DbError::statement(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "Retry shortly or raise the pool's max connections",
            ),
            sqlx::Error::PoolClosed => DbError::RegistryClosed,
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build the structured `data` payload attached to MCP errors.
fn error_data(err: &DbError) -> serde_json::Value {
    let mut data = serde_json::json!({
        "kind": err.kind(),
        "retryable": err.is_retryable(),
    });
    if let Some(suggestion) = err.suggestion() {
        data["suggestion"] = serde_json::Value::String(suggestion.to_string());
    }
    if let DbError::Statement {
        sql_state: Some(code),
        ..
    } = err
    {
        data["sql_state"] = serde_json::Value::String(code.clone());
    }
    data
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = Some(error_data(&err));
        match &err {
            // The caller sent something the engine or the boundary rejected
            DbError::InvalidInput { .. } => rmcp::ErrorData::invalid_params(err.to_string(), data),
            DbError::Statement {
                message, sql_state, ..
            } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            DbError::Connection { .. }
            | DbError::PoolExhausted { .. }
            | DbError::RegistryClosed
            | DbError::Timeout { .. }
            | DbError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}
