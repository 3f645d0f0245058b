#![forbid(unsafe_code)]

//! Core domain model and session logic for Mindful guided practices.
//!
//! This crate provides:
//! - Exercise definitions and the built-in catalog
//! - The session reducer and the async wizard controller
//! - The practice API boundary (HTTP client and local store)
//! - Persistence of completed practices (WAL, CSV, history)

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod session;
pub mod api;
pub mod controller;
pub mod http;
pub mod store;
pub mod wal;
pub mod rollup;
pub mod history;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog};
pub use config::Config;
pub use session::{reduce, BackOutcome, Phase, SessionAction, SessionState, SkipReason};
pub use api::{PracticeApi, StartedSession};
pub use controller::{
    Cadence, CompletionError, CompletionReceipt, ExitRoute, InitOutcome, PracticeSession,
    SaveOutcome,
};
pub use http::HttpPracticeApi;
pub use store::LocalPracticeStore;
pub use wal::{CompletionSink, JsonlSink};
pub use history::load_recent_completions;
