//! Error type definitions for the lineup manager.
//!
//! Typed domain errors live here; orchestration code (main, coordinator
//! internals) uses `anyhow::Result` and converts at the boundary.

use thiserror::Error;

/// Errors raised while retrieving or decoding upstream documents.
///
/// The two variants matter downstream: both mark the fetch run as failed,
/// but `ParseFailed` means bytes were retrieved and the upstream is
/// reachable, which is worth distinguishing in operator-facing summaries.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network failure, timeout, non-2xx status, local-file I/O, or an
    /// unresolved `${VAR}` placeholder in the source URL.
    #[error("fetch failed: {url}: {message}")]
    FetchFailed { url: String, message: String },

    /// Bytes were retrieved but the document is malformed.
    #[error("parse failed: {url}: {message}")]
    ParseFailed { url: String, message: String },
}

impl FetchError {
    pub fn fetch<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::FetchFailed {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn parse<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::ParseFailed {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Constraint violation surfaced to the admin boundary as a conflict.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// A refresh trigger arrived while a run was already in flight.
    #[error("refresh already running")]
    RefreshBusy,

    #[error("not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
