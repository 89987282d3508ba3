//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with the record store.
    Store(String),
    /// Requested record does not exist.
    NotFound(String),
    /// Conference provider (Zoom) API failure.
    Zoom(String),
    /// Email provider (Brevo) API failure.
    Email(String),
    /// Scheduled-job handler failure (missing params, bad template, ...).
    Handler(String),
    /// Worker-pool submission failure (detached-enqueue cap exhausted).
    Enqueue(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Store(msg) => write!(f, "store: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Zoom(msg) => write!(f, "zoom: {msg}"),
            Self::Email(msg) => write!(f, "email: {msg}"),
            Self::Handler(msg) => write!(f, "handler: {msg}"),
            Self::Enqueue(msg) => write!(f, "enqueue: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<surrealdb::Error> for AppError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Store(err.to_string())
    }
}
