//! # Sondear
//!
//! Long-context probing harness for OpenAI-compatible inference endpoints.
//!
//! Sondear (Spanish: "to probe, to sound out") characterizes a deployed
//! chat-completion endpoint as effective context length grows:
//!
//! - **Needle-in-a-Haystack (NIAH)**: hide a short fact deep inside a long
//!   public-domain document and check whether the model can retrieve it.
//! - **Context scaling**: synthesize filler text at escalating target sizes
//!   and measure latency/throughput until the endpoint signals its limit.
//!
//! ## Design
//!
//! The transport is an injected [`transport::TransportClient`] trait object,
//! so every probe runs identically against a live endpoint or a deterministic
//! mock. Needle selection takes a caller-seeded RNG for reproducible runs.
//! Token counts are approximations (fixed chars-per-token ratio); exact
//! tokenization is explicitly out of scope.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sondear::probe::{ScalingConfig, ScalingProbe};
//! use sondear::transport::HttpTransport;
//!
//! let transport = HttpTransport::new("http://localhost:8000");
//! let probe = ScalingProbe::new(&transport, ScalingConfig::default()).unwrap();
//! let run = probe.run();
//! for step in run.steps() {
//!     println!("{} tokens -> {:?}", step.target_tokens, step.outcome);
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // usize -> f64 for throughput is safe
#![allow(clippy::cast_possible_truncation)] // f64 -> usize offsets are bounded
#![allow(clippy::cast_sign_loss)] // fractions are validated non-negative
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::float_cmp)] // exact float comparisons in tests

/// CLI command implementations (extracted from main.rs for testability)
pub mod cli;
/// Corpus acquisition and boilerplate normalization
pub mod corpus;
/// Error taxonomy shared across the harness
pub mod error;
/// Approximate token counting
pub mod estimate;
/// NIAH orchestration and the document survey battery
pub mod harness;
/// Needle-in-a-haystack fixture construction and verification
pub mod needle;
/// Context scaling probe state machine
pub mod probe;
/// Chat-completion transport boundary
pub mod transport;

pub use error::{Result, SondearError};
pub use estimate::TokenEstimator;
pub use probe::{ProbeOutcome, ScalingProbe, ScalingRun};
pub use transport::TransportClient;
