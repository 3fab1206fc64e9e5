//! Corpus acquisition and boilerplate normalization
//!
//! Long-context fixtures need realistic prose, so the haystack corpus comes
//! from public-domain Project Gutenberg books. Downloaded text carries a
//! licensing header and footer delimited by `*** START OF` / `*** END OF`
//! sentinel lines; [`normalize`] strips everything outside that pair.
//!
//! Sentinel stripping is best-effort: a missing or malformed sentinel never
//! fails, the full text is retained instead. `normalize` is idempotent and
//! never grows its input.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, SondearError};
use crate::estimate::TokenEstimator;

/// Start-of-content sentinel emitted by Project Gutenberg
pub const START_SENTINEL: &str = "*** START OF";
/// End-of-content sentinel emitted by Project Gutenberg
pub const END_SENTINEL: &str = "*** END OF";

/// Fetch timeout for corpus downloads
const FETCH_TIMEOUT_SECS: u64 = 60;

/// A known public-domain book usable as haystack material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookSource {
    /// Short registry key (e.g. `"moby_dick"`)
    pub key: &'static str,
    /// Download URL
    pub url: &'static str,
    /// Human-readable title
    pub title: &'static str,
    /// Approximate token count of the full text
    pub approx_tokens: usize,
}

/// Registry of public-domain books from Project Gutenberg
pub const BOOKS: &[BookSource] = &[
    BookSource {
        key: "odyssey",
        url: "https://www.gutenberg.org/files/1727/1727-0.txt",
        title: "The Odyssey by Homer",
        approx_tokens: 120_000,
    },
    BookSource {
        key: "ulysses",
        url: "https://www.gutenberg.org/files/4300/4300-0.txt",
        title: "Ulysses by James Joyce",
        approx_tokens: 265_000,
    },
    BookSource {
        key: "war_and_peace",
        url: "https://www.gutenberg.org/files/2600/2600-0.txt",
        title: "War and Peace by Leo Tolstoy",
        approx_tokens: 560_000,
    },
    BookSource {
        key: "moby_dick",
        url: "https://www.gutenberg.org/files/2701/2701-0.txt",
        title: "Moby Dick by Herman Melville",
        approx_tokens: 215_000,
    },
];

impl BookSource {
    /// Look up a book by registry key
    #[must_use]
    pub fn by_key(key: &str) -> Option<&'static BookSource> {
        BOOKS.iter().find(|b| b.key == key)
    }
}

/// A text corpus, immutable once loaded
#[derive(Debug, Clone)]
pub struct Corpus {
    title: String,
    raw: String,
    text: String,
    estimated_tokens: usize,
}

impl Corpus {
    /// Build a corpus from already-acquired raw text
    ///
    /// Normalizes the raw text and records its estimated token count.
    #[must_use]
    pub fn from_text(title: impl Into<String>, raw: impl Into<String>, estimator: TokenEstimator) -> Self {
        let raw = raw.into();
        let text = normalize(&raw);
        let estimated_tokens = estimator.estimate(&text);
        Self {
            title: title.into(),
            raw,
            text,
            estimated_tokens,
        }
    }

    /// Human-readable title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Raw text as acquired, before normalization
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Cleaned text with boilerplate stripped
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Approximate token count of the cleaned text
    #[must_use]
    pub fn estimated_tokens(&self) -> usize {
        self.estimated_tokens
    }
}

/// Acquires corpora over HTTP or from the local filesystem
#[derive(Debug)]
pub struct CorpusProvider {
    client: reqwest::blocking::Client,
    estimator: TokenEstimator,
}

impl Default for CorpusProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CorpusProvider {
    /// Create a provider with the default fetch timeout and estimator
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
                .build()
                .expect("failed to build HTTP client"),
            estimator: TokenEstimator::new(),
        }
    }

    /// Download a registered book and normalize it
    ///
    /// # Errors
    /// Returns [`SondearError::Fetch`] when the download fails. A fetch
    /// failure is fatal only to corpus-dependent tests.
    pub fn fetch_book(&self, book: &BookSource) -> Result<Corpus> {
        info!(key = book.key, url = book.url, "downloading corpus");
        let corpus = self.fetch_url(book.url, book.title)?;
        debug!(
            chars = corpus.text().len(),
            tokens = corpus.estimated_tokens(),
            "corpus ready"
        );
        Ok(corpus)
    }

    /// Download arbitrary text from `url` and normalize it
    ///
    /// The body is decoded best-effort: invalid UTF-8 sequences are replaced
    /// rather than failing the fetch.
    ///
    /// # Errors
    /// Returns [`SondearError::Fetch`] on network failure or non-2xx status.
    pub fn fetch_url(&self, url: &str, title: &str) -> Result<Corpus> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SondearError::Fetch(format!("GET {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(SondearError::Fetch(format!(
                "GET {} returned HTTP {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| SondearError::Fetch(format!("reading body of {} failed: {}", url, e)))?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();

        Ok(Corpus::from_text(title, raw, self.estimator))
    }

    /// Read a corpus from a local file, decoded best-effort
    ///
    /// # Errors
    /// Returns [`SondearError::Fetch`] when the file cannot be read.
    pub fn fetch_path(&self, path: &Path) -> Result<Corpus> {
        let bytes = std::fs::read(path)
            .map_err(|e| SondearError::Fetch(format!("reading {} failed: {}", path.display(), e)))?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();
        let title = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        Ok(Corpus::from_text(title, raw, self.estimator))
    }
}

/// Strip Project Gutenberg boilerplate outside the sentinel pair
///
/// Keeps the text between the end of the `*** START OF` line and the first
/// `*** END OF` marker, then trims surrounding whitespace. A missing start
/// sentinel keeps from offset 0; a missing end sentinel keeps to the end.
/// Idempotent (`normalize(normalize(x)) == normalize(x)`) and non-expanding
/// (`normalize(x).len() <= x.len()`).
#[must_use]
pub fn normalize(raw: &str) -> String {
    let end = raw.find(END_SENTINEL).unwrap_or(raw.len());
    // Only a start sentinel before the end sentinel forms a pair; the cut
    // lands after the sentinel's own line.
    let start = raw[..end]
        .rfind(START_SENTINEL)
        .and_then(|idx| raw[idx..end].find('\n').map(|nl| idx + nl + 1))
        .unwrap_or(0);
    raw[start..end].trim().to_string()
}
