//! Error handling for template compilation and rendering
//!
//! All compile-time failures are fail-fast: there is no partial-compile
//! fallback. Render-time failures come from the script evaluator and are
//! propagated unchanged.

use std::io;

use thiserror::Error;

/// A failure raised by the script evaluator while rendering.
///
/// The compiler core never interprets script text, so anything the evaluator
/// rejects (syntax errors, unknown variables, type errors) surfaces through
/// this type at render time.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct EvaluationError {
    message: String,
}

impl EvaluationError {
    /// Creates an evaluation error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The evaluator-supplied message
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error type for template compilation and rendering failures
#[derive(Debug, Error)]
pub enum Error {
    /// An open tag was never matched by a close tag.
    #[error("could not find matching close tag for {tag}")]
    Parse { tag: &'static str },

    /// An include directive was found but no read function was supplied.
    #[error("found an include but no read function was supplied: {path}")]
    Configuration { path: String },

    /// The read function failed for an included template.
    #[error("could not read included template {path}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A template includes itself, directly or through other includes.
    #[error("cyclic include of {path}")]
    CyclicInclude { path: String },

    /// Suspend-capable mode was requested but is not available.
    #[error("{detail}")]
    Environment { detail: String },

    /// The evaluator failed while rendering.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// Result type for template compilation and rendering operations
pub type Result<T> = std::result::Result<T, Error>;
