//! SQLite storage layer for jisaku.
//!
//! The live database is an in-memory SQLite connection. Its durable form is
//! the raw file image, written out by the [`crate::store`] layer.
//!
//! # Submodules
//!
//! - [`migrations`] - Versioned, re-runnable schema migrations
//! - [`schema`] - Schema constants and introspection helpers
//! - [`snapshot`] - Conversion between a connection and its file image

pub mod migrations;
pub mod schema;
pub mod snapshot;

pub use migrations::{LATEST_SCHEMA_VERSION, MigrationReport, run_migrations};
pub use snapshot::{export_image, open_empty, open_image, validate_image};

use sha2::{Digest, Sha256};

/// SHA256 digest of a database image, hex encoded.
///
/// Used to tell two exported images apart without comparing them byte by
/// byte.
#[must_use]
pub fn image_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
