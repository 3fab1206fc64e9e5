//! Approximate token counting
//!
//! A fixed characters-per-token ratio (default 4, the common figure for
//! English prose under BPE vocabularies). This is deliberately an
//! approximation: prompt sizing stays reproducible without depending on the
//! endpoint's real tokenizer, and exact token counting is out of scope.

/// Default characters-per-token ratio (1 token ~= 4 characters)
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Stateless token-count estimator with a fixed chars-per-token ratio
///
/// `estimate` is monotonic non-decreasing in input length and returns 0 for
/// the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimator {
    chars_per_token: usize,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEstimator {
    /// Create an estimator with the default 4 chars/token ratio
    #[must_use]
    pub fn new() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }

    /// Create an estimator with a custom ratio (clamped to at least 1)
    #[must_use]
    pub fn with_ratio(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    /// The configured chars-per-token ratio
    #[must_use]
    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }

    /// Approximate token count of `text`
    #[must_use]
    pub fn estimate(&self, text: &str) -> usize {
        text.len() / self.chars_per_token
    }

    /// Character budget needed to reach `tokens` estimated tokens
    ///
    /// Inverse of [`estimate`](Self::estimate); used to size synthesized
    /// filler text and corpus truncation slices.
    #[must_use]
    pub fn chars_for(&self, tokens: usize) -> usize {
        tokens * self.chars_per_token
    }
}
