//! Desktop chat client for asking a locally hosted model about attached source files.
//!
//! Each conversation is stored as `<sessions_dir>/<session_id>.json`.

pub mod app;
pub mod attachment;
pub mod chat;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod session;
pub mod theme;
pub mod transcript;

pub use error::{Error, RenameError, Result};
