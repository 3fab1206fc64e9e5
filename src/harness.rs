//! NIAH orchestration and the document survey battery
//!
//! Ties the corpus, needle injector, and transport together. Each trial is
//! independent: a needle that is not retrieved is a recorded
//! [`ProbeOutcome::Mismatch`], and a transport failure on one fraction never
//! stops the remaining trials. Everything runs sequentially over one blocking
//! call at a time so latency numbers stay uncontended.

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::corpus::Corpus;
use crate::error::Result;
use crate::estimate::TokenEstimator;
use crate::needle::{self, NeedleCase};
use crate::probe::{is_context_limit_signature, ProbeOutcome};
use crate::transport::{ChatMessage, ChatRequest, TokenUsage, TransportClient};

/// Default relative insertion positions for NIAH trials
pub const DEFAULT_FRACTIONS: &[f64] = &[0.1, 0.5, 0.9];

/// Configuration for a NIAH run
#[derive(Debug, Clone)]
pub struct NiahConfig {
    /// Relative insertion positions, one trial each
    pub fractions: Vec<f64>,
    /// Model identifier sent to the endpoint
    pub model: String,
    /// Output token ceiling per trial
    pub max_output_tokens: usize,
    /// Sampling temperature (low for factual retrieval)
    pub temperature: f32,
    /// Optional haystack budget in estimated tokens; the corpus is truncated
    /// to this size before injection
    pub haystack_budget_tokens: Option<usize>,
}

impl Default for NiahConfig {
    fn default() -> Self {
        Self {
            fractions: DEFAULT_FRACTIONS.to_vec(),
            model: "default".to_string(),
            max_output_tokens: 100,
            temperature: 0.1,
            haystack_budget_tokens: None,
        }
    }
}

/// Record of one needle-retrieval trial
#[derive(Debug, Clone, Serialize)]
pub struct NeedleTrial {
    /// Relative insertion position
    pub fraction: f64,
    /// The hidden needle phrase
    pub needle: String,
    /// Ground-truth payload expected in the response
    pub payload: String,
    /// Estimated token count of the submitted fixture
    pub context_tokens: usize,
    /// Outcome classification
    pub outcome: ProbeOutcome,
    /// Wall-clock latency in milliseconds
    pub latency_ms: f64,
    /// Token usage, when reported
    pub usage: Option<TokenUsage>,
    /// Model response for completed calls
    pub response: Option<String>,
    /// Error message for error outcomes
    pub message: Option<String>,
}

/// Run one NIAH trial per configured fraction
///
/// Needle choice is uniform-random from the fixed pool via the caller-seeded
/// `rng`, independent across trials.
///
/// # Errors
/// Returns [`crate::SondearError::InvalidInput`] when a configured fraction
/// is outside [0, 1]; transport failures are recorded per trial, never
/// propagated.
pub fn run_niah<R: Rng + ?Sized>(
    transport: &dyn TransportClient,
    corpus: &Corpus,
    config: &NiahConfig,
    rng: &mut R,
) -> Result<Vec<NeedleTrial>> {
    let estimator = TokenEstimator::new();
    let haystack = match config.haystack_budget_tokens {
        Some(budget) => slice_to_chars(corpus.text(), estimator.chars_for(budget)),
        None => corpus.text(),
    };

    info!(
        corpus = corpus.title(),
        chars = haystack.len(),
        trials = config.fractions.len(),
        "starting NIAH run"
    );

    let mut trials = Vec::with_capacity(config.fractions.len());
    for &fraction in &config.fractions {
        let chosen = needle::pick_needle(rng);
        let case = needle::build(haystack, chosen, fraction)?;
        trials.push(run_trial(transport, config, &estimator, &case));
    }
    Ok(trials)
}

fn run_trial(
    transport: &dyn TransportClient,
    config: &NiahConfig,
    estimator: &TokenEstimator,
    case: &NeedleCase,
) -> NeedleTrial {
    let prompt = needle::retrieval_prompt(case.fixture());
    let context_tokens = estimator.estimate(&prompt);
    debug!(
        fraction = case.fraction(),
        context_tokens, "submitting needle trial"
    );

    let request = ChatRequest {
        model: config.model.clone(),
        messages: vec![ChatMessage::user(prompt)],
        max_tokens: config.max_output_tokens,
        temperature: config.temperature,
    };

    let start = std::time::Instant::now();
    let result = transport.submit(&request);
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(outcome) => {
            let found = needle::evaluate(&outcome.content, case.needle());
            if !found {
                warn!(fraction = case.fraction(), "needle not retrieved");
            }
            NeedleTrial {
                fraction: case.fraction(),
                needle: case.needle().to_string(),
                payload: case.payload().to_string(),
                context_tokens,
                outcome: if found {
                    ProbeOutcome::Success
                } else {
                    ProbeOutcome::Mismatch
                },
                latency_ms,
                usage: outcome.usage,
                response: Some(outcome.content),
                message: None,
            }
        },
        Err(err) => {
            let message = err.to_string();
            let outcome = if is_context_limit_signature(&message) {
                ProbeOutcome::ContextExceeded
            } else {
                ProbeOutcome::TransportError
            };
            warn!(fraction = case.fraction(), error = %message, "trial failed");
            NeedleTrial {
                fraction: case.fraction(),
                needle: case.needle().to_string(),
                payload: case.payload().to_string(),
                context_tokens,
                outcome,
                latency_ms,
                usage: None,
                response: None,
                message: Some(message),
            }
        },
    }
}

// ============================================================================
// Document survey battery (summarization / themes / comprehension)
// ============================================================================

/// One prompt template of the survey battery
struct SurveyCase {
    name: &'static str,
    instruction: &'static str,
    max_output_tokens: usize,
    /// Whether the corpus slice is introduced with a "Text:" header
    labeled: bool,
}

const SURVEY_CASES: &[SurveyCase] = &[
    SurveyCase {
        name: "brief_summary",
        instruction: "Summarize the following text in 2-3 sentences:",
        max_output_tokens: 150,
        labeled: false,
    },
    SurveyCase {
        name: "key_themes",
        instruction: "What are the main themes in this text? List 3-5 key themes:",
        max_output_tokens: 200,
        labeled: false,
    },
    SurveyCase {
        name: "characters",
        instruction: "Who are the main characters or subjects in this text? Name them:",
        max_output_tokens: 150,
        labeled: false,
    },
    SurveyCase {
        name: "opening",
        instruction: "What happens in the first chapter or section?",
        max_output_tokens: 200,
        labeled: true,
    },
    SurveyCase {
        name: "setting",
        instruction: "Describe the setting or location where the story takes place.",
        max_output_tokens: 200,
        labeled: true,
    },
];

/// Configuration for a document survey run
#[derive(Debug, Clone)]
pub struct SurveyConfig {
    /// Corpus slice budget in estimated tokens
    pub budget_tokens: usize,
    /// Model identifier sent to the endpoint
    pub model: String,
    /// Sampling temperature (higher; these are open-ended prompts)
    pub temperature: f32,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            budget_tokens: 30_000,
            model: "default".to_string(),
            temperature: 0.7,
        }
    }
}

/// Record of one survey probe
///
/// Only transport-level outcomes are recorded; answer quality is not scored.
#[derive(Debug, Clone, Serialize)]
pub struct SurveyProbe {
    /// Case name (e.g. `"brief_summary"`)
    pub name: String,
    /// Outcome classification
    pub outcome: ProbeOutcome,
    /// Wall-clock latency in milliseconds
    pub latency_ms: f64,
    /// Token usage, when reported
    pub usage: Option<TokenUsage>,
    /// Model response for completed calls
    pub response: Option<String>,
    /// Error message for error outcomes
    pub message: Option<String>,
}

/// Run the summarization / comprehension battery over a corpus slice
///
/// The corpus is truncated to `budget_tokens` before prompting. Failures are
/// recorded per probe; the battery always runs to the end.
#[must_use]
pub fn run_survey(
    transport: &dyn TransportClient,
    corpus: &Corpus,
    config: &SurveyConfig,
) -> Vec<SurveyProbe> {
    let estimator = TokenEstimator::new();
    let slice = slice_to_chars(corpus.text(), estimator.chars_for(config.budget_tokens));
    info!(
        corpus = corpus.title(),
        chars = slice.len(),
        probes = SURVEY_CASES.len(),
        "starting document survey"
    );

    SURVEY_CASES
        .iter()
        .map(|case| {
            let prompt = if case.labeled {
                format!("{}\n\nText:\n{}", case.instruction, slice)
            } else {
                format!("{}\n\n{}", case.instruction, slice)
            };
            let request = ChatRequest {
                model: config.model.clone(),
                messages: vec![ChatMessage::user(prompt)],
                max_tokens: case.max_output_tokens,
                temperature: config.temperature,
            };

            let start = std::time::Instant::now();
            let result = transport.submit(&request);
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            match result {
                Ok(outcome) => SurveyProbe {
                    name: case.name.to_string(),
                    outcome: ProbeOutcome::Success,
                    latency_ms,
                    usage: outcome.usage,
                    response: Some(outcome.content),
                    message: None,
                },
                Err(err) => {
                    let message = err.to_string();
                    let outcome = if is_context_limit_signature(&message) {
                        ProbeOutcome::ContextExceeded
                    } else {
                        ProbeOutcome::TransportError
                    };
                    warn!(case = case.name, error = %message, "survey probe failed");
                    SurveyProbe {
                        name: case.name.to_string(),
                        outcome,
                        latency_ms,
                        usage: None,
                        response: None,
                        message: Some(message),
                    }
                },
            }
        })
        .collect()
}

/// Truncate `text` to at most `max_chars` bytes on a char boundary
fn slice_to_chars(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut cut = max_chars;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_to_chars_short_text_untouched() {
        assert_eq!(slice_to_chars("abc", 10), "abc");
    }

    #[test]
    fn test_slice_to_chars_cuts_on_boundary() {
        let text = "ééééé"; // 10 bytes, 5 chars
        let cut = slice_to_chars(text, 5);
        assert_eq!(cut, "éé");
        assert!(cut.len() <= 5);
    }

    #[test]
    fn test_default_fractions_cover_depths() {
        assert_eq!(DEFAULT_FRACTIONS, &[0.1, 0.5, 0.9]);
        assert!(DEFAULT_FRACTIONS.iter().all(|f| (0.0..=1.0).contains(f)));
    }
}
