//! Needle-in-a-haystack fixture construction and verification
//!
//! A needle is a short self-describing fact (`"The secret code is:
//! RAINBOW-UNICORN-42"`) inserted into a long document at a controlled
//! relative position. Verification checks whether the model's response
//! contains the needle's payload, the portion after the labeled `": "`
//! delimiter, case-insensitively.
//!
//! Needles are drawn uniformly from a fixed pool with a caller-seeded RNG so
//! that retrieval is not overfit to one lexical pattern while runs stay
//! reproducible.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Result, SondearError};

/// Fixed pool of needle phrases
pub const NEEDLE_POOL: &[&str] = &[
    "The secret code is: RAINBOW-UNICORN-42",
    "The magic number for this document is 8675309",
    "Remember this phrase: THE QUICK BROWN FOX JUMPS OVER THE LAZY DOG",
];

/// Delimiter wrapped around the needle so it stands apart from the prose
pub const NEEDLE_DELIMITER: &str = "\n\n";

/// Label separating a needle's description from its payload
const PAYLOAD_LABEL: &str = ": ";

/// A constructed needle-in-a-haystack fixture
///
/// Invariants: the fixture is at least as long as the haystack, and the
/// needle is inserted as one contiguous block, never split.
#[derive(Debug, Clone)]
pub struct NeedleCase {
    needle: String,
    payload: String,
    fraction: f64,
    offset: usize,
    fixture: String,
}

impl NeedleCase {
    /// The full needle phrase
    #[must_use]
    pub fn needle(&self) -> &str {
        &self.needle
    }

    /// The ground-truth payload the response must contain
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Relative insertion position in [0, 1]
    #[must_use]
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Byte offset at which the haystack was split
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The assembled haystack-plus-needle text
    #[must_use]
    pub fn fixture(&self) -> &str {
        &self.fixture
    }
}

/// Extract a needle's canonical payload
///
/// The payload is the portion after the first `": "` label. A needle without
/// the label yields itself, so verification never fails on a malformed
/// needle.
#[must_use]
pub fn payload_of(needle: &str) -> &str {
    needle.split_once(PAYLOAD_LABEL).map_or(needle, |(_, p)| p)
}

/// Pick a needle uniformly at random from the fixed pool
#[must_use]
pub fn pick_needle<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    NEEDLE_POOL.choose(rng).copied().unwrap_or(NEEDLE_POOL[0])
}

/// Build a fixture with `needle` inserted at `fraction` through `haystack`
///
/// The insertion offset is `floor(len(haystack) * fraction)`, nudged down to
/// the nearest char boundary. The needle lands between two delimiter blocks
/// and is never itself split.
///
/// # Errors
/// Returns [`SondearError::InvalidInput`] when `fraction` is outside [0, 1]
/// or not finite.
pub fn build(haystack: &str, needle: &str, fraction: f64) -> Result<NeedleCase> {
    if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
        return Err(SondearError::InvalidInput(format!(
            "insertion fraction {} outside [0, 1]",
            fraction
        )));
    }

    let mut offset = (haystack.len() as f64 * fraction).floor() as usize;
    offset = offset.min(haystack.len());
    while !haystack.is_char_boundary(offset) {
        offset -= 1;
    }

    let (left, right) = haystack.split_at(offset);
    let fixture = format!(
        "{left}{NEEDLE_DELIMITER}{needle}{NEEDLE_DELIMITER}{right}"
    );

    Ok(NeedleCase {
        needle: needle.to_string(),
        payload: payload_of(needle).to_string(),
        fraction,
        offset,
        fixture,
    })
}

/// Whether `response` contains the needle's payload, case-insensitively
#[must_use]
pub fn evaluate(response: &str, needle: &str) -> bool {
    response
        .to_uppercase()
        .contains(&payload_of(needle).to_uppercase())
}

/// The retrieval question submitted together with a fixture
#[must_use]
pub fn retrieval_prompt(fixture: &str) -> String {
    format!(
        "Read the following text carefully and find the secret code, \
         magic number, or special phrase that stands out. What is it?\n\n{fixture}"
    )
}
