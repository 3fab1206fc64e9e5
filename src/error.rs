//! Error taxonomy for the probing harness
//!
//! Three test-domain failure classes plus one programming-error class:
//! - [`SondearError::Fetch`]: corpus unreachable or unreadable. Fatal only to
//!   the corpus-dependent test, never to independent probes.
//! - [`SondearError::Transport`]: the single-shot chat call failed. The
//!   scaling probe further classifies these by the context-limit signature.
//! - [`SondearError::Format`]: the endpoint answered with a body the harness
//!   cannot parse.
//! - [`SondearError::InvalidInput`]: caller misuse (bad fraction, non-ascending
//!   size sequence). These propagate and abort the run.
//!
//! A needle that is not found is a recorded outcome
//! ([`crate::probe::ProbeOutcome::Mismatch`]), never an error.

use thiserror::Error;

/// Result type alias for sondear operations
pub type Result<T> = std::result::Result<T, SondearError>;

/// Errors produced by the probing harness
#[derive(Debug, Error)]
pub enum SondearError {
    /// Corpus download or file read failed
    #[error("corpus fetch failed: {0}")]
    Fetch(String),

    /// Transport-level failure from the chat-completion call
    #[error("transport error: {0}")]
    Transport(String),

    /// Endpoint responded but the body was not a valid completion
    #[error("malformed response: {reason}")]
    Format {
        /// Human-readable description of the parse failure
        reason: String,
    },

    /// Invalid caller-supplied configuration or arguments
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
