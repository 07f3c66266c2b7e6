//! Error types for jisaku.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=database, 3=migration, 4=validation, etc.)
//! - Fatal vs. non-fatal classification for the session layer
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for jisaku operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    DatabaseError,

    // Migration (exit 3)
    MigrationFailed,

    // Validation (exit 4)
    InvalidImage,
    InvalidArgument,

    // Persistence (exit 5)
    PersistFailed,
    StoreUnavailable,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::MigrationFailed => "MIGRATION_FAILED",
            Self::InvalidImage => "INVALID_IMAGE",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::PersistFailed => "PERSIST_FAILED",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::DatabaseError => 2,
            Self::MigrationFailed => 3,
            Self::InvalidImage | Self::InvalidArgument => 4,
            Self::PersistFailed | Self::StoreUnavailable => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether the failure leaves the in-memory state intact.
    ///
    /// A failed persist only puts durability at risk: the mutation that
    /// triggered it already succeeded in memory. Callers surface these as
    /// warnings instead of blocking errors.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::PersistFailed)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in jisaku operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database not initialized")]
    NotInitialized,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration to schema version {version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invalid database image: {0}")]
    InvalidImage(String),

    #[error("Durable store unavailable at {path}: {source}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to persist database: {0}")]
    Persist(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Migration { .. } => ErrorCode::MigrationFailed,
            Self::InvalidImage(_) => ErrorCode::InvalidImage,
            Self::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            Self::Persist(_) => ErrorCode::PersistFailed,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `jisaku init` to create the database".to_string())
            }

            Self::Migration { version, .. } => Some(format!(
                "The stored database could not be upgraded past schema version {}. \
                 Nothing was overwritten; export a copy with `jisaku export` before retrying.",
                version.saturating_sub(1)
            )),

            Self::InvalidImage(_) => Some(
                "Expected a SQLite database (.db, .sqlite, .sqlite3) exported from jisaku"
                    .to_string(),
            ),

            Self::StoreUnavailable { path, .. } => Some(format!(
                "Check that {} exists and is writable, or pass --data-dir",
                path.display()
            )),

            Self::Persist(_) => Some(
                "Your changes are still in memory. Free disk space and run `jisaku init` \
                 or retry the command to write them out."
                    .to_string(),
            ),

            Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "fatal": code.is_fatal(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
