//! jisaku - Personal kanji reference database
//!
//! The database lives in memory as SQLite and is saved as a whole file image
//! to a local store. This crate holds that persistence layer and the `jisaku`
//! command-line front end.
//!
//! # Architecture
//!
//! - [`storage`] - Schema migrations and the database image codec
//! - [`store`] - Blob stores and the debounced image writer
//! - [`lifecycle`] - Signals that force a save
//! - [`session`] - The database session every caller goes through
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Data directory and settings
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod session;
pub mod storage;
pub mod store;

pub use error::{Error, Result};
pub use session::{DatabaseSession, QueryResult, SessionOptions, SessionState};
