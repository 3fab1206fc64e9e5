//! Context scaling probe state machine
//!
//! Escalates synthesized input size against the endpoint until it signals a
//! context limit: `Idle -> Probing(step) -> {Continue, StopSuccess,
//! StopLimit, StopError}`. One blocking transport call per step, latency
//! measured around the call, outcomes appended in order to an append-only
//! run log that is sealed when the run ends.
//!
//! A transport failure whose message matches the context-limit signature
//! (case-insensitive "context" or "length") terminates the run as
//! [`RunVerdict::ContextLimit`]; later sizes are never attempted. Generic
//! failures stop the run under the default [`ErrorPolicy::FailFast`] and are
//! merely recorded under [`ErrorPolicy::ContinueOnError`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, SondearError};
use crate::estimate::TokenEstimator;
use crate::transport::{ChatMessage, ChatOutcome, ChatRequest, TokenUsage, TransportClient};

/// Seed phrase repeated to synthesize filler text
pub const DEFAULT_SEED_PHRASE: &str = "This is a test sentence. ";

/// Probe question appended after the synthesized filler
pub const DEFAULT_QUESTION: &str = "Question: How many times does the word 'test' \
     appear in the text above? Just give a rough estimate.";

/// Default ascending target sizes, in estimated tokens
pub const DEFAULT_TARGET_SIZES: &[usize] = &[
    1_000, 5_000, 10_000, 20_000, 50_000, 100_000, 150_000, 200_000,
];

/// Substrings that mark a transport failure as a context-limit signal
const CONTEXT_LIMIT_KEYWORDS: &[&str] = &["context", "length"];

/// Whether an error message matches the context-limit signature
///
/// Case-insensitive keyword match, distinguishing "too long for this
/// endpoint" failures from other transport errors.
#[must_use]
pub fn is_context_limit_signature(message: &str) -> bool {
    let lower = message.to_lowercase();
    CONTEXT_LIMIT_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Classification of a single probe or trial result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProbeOutcome {
    /// Well-formed response (for NIAH trials: payload found)
    Success,
    /// Well-formed response that does not contain the expected payload
    Mismatch,
    /// Generic transport failure
    TransportError,
    /// Transport failure matching the context-limit signature
    ContextExceeded,
}

/// What the state machine does after recording a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    /// Proceed to the next target size
    Continue,
    /// Context-limit signal observed; terminate the run
    StopLimit,
    /// Generic error under fail-fast policy; terminate the run
    StopError,
}

/// Policy for generic (non-context-limit) transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Stop the run on the first generic transport error (conservative default)
    #[default]
    FailFast,
    /// Record the error outcome and keep probing later sizes
    ContinueOnError,
}

/// Configuration for a scaling run
#[derive(Debug, Clone)]
pub struct ScalingConfig {
    /// Ascending target sizes in estimated tokens; must be strictly increasing
    pub target_sizes: Vec<usize>,
    /// Phrase repeated to synthesize filler text
    pub seed_phrase: String,
    /// Question appended after the filler
    pub question: String,
    /// Model identifier sent to the endpoint
    pub model: String,
    /// Output token ceiling per probe
    pub max_output_tokens: usize,
    /// Sampling temperature (low for deterministic answers)
    pub temperature: f32,
    /// Handling of generic transport errors
    pub error_policy: ErrorPolicy,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            target_sizes: DEFAULT_TARGET_SIZES.to_vec(),
            seed_phrase: DEFAULT_SEED_PHRASE.to_string(),
            question: DEFAULT_QUESTION.to_string(),
            model: "default".to_string(),
            max_output_tokens: 50,
            temperature: 0.1,
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl ScalingConfig {
    /// Validate the size sequence
    ///
    /// # Errors
    /// Returns [`SondearError::InvalidInput`] when the sequence is empty, not
    /// strictly increasing, or the seed phrase is empty.
    pub fn validate(&self) -> Result<()> {
        if self.target_sizes.is_empty() {
            return Err(SondearError::InvalidInput(
                "target size sequence is empty".to_string(),
            ));
        }
        if self.target_sizes.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SondearError::InvalidInput(
                "target sizes must be strictly increasing".to_string(),
            ));
        }
        if self.seed_phrase.is_empty() {
            return Err(SondearError::InvalidInput(
                "seed phrase must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One completed probe iteration
#[derive(Debug, Clone, Serialize)]
pub struct ScalingStep {
    /// Target size in estimated tokens
    pub target_tokens: usize,
    /// Character length of the synthesized filler
    pub synthesized_chars: usize,
    /// Outcome classification
    pub outcome: ProbeOutcome,
    /// Wall-clock latency of the transport call in milliseconds
    pub latency_ms: f64,
    /// Token usage, when the endpoint reported it
    pub usage: Option<TokenUsage>,
    /// Derived throughput in total tokens per second
    pub throughput_tps: Option<f64>,
    /// Error message for error outcomes
    pub message: Option<String>,
}

/// How a scaling run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunVerdict {
    /// Every configured size succeeded
    ExhaustedSizes,
    /// The endpoint signaled its context limit
    ContextLimit,
    /// A generic transport error stopped the run (fail-fast policy)
    Errored,
    /// An external interrupt stopped the run between steps
    Cancelled,
}

/// Ordered, append-only log of completed steps
///
/// Only the run that created the log writes to it; once sealed it is
/// immutable and only fully completed steps are retained.
#[derive(Debug, Default)]
pub struct RunLog {
    steps: Vec<ScalingStep>,
    sealed: bool,
}

impl RunLog {
    fn push(&mut self, step: ScalingStep) {
        debug_assert!(!self.sealed, "run log sealed");
        if !self.sealed {
            self.steps.push(step);
        }
    }

    fn seal(&mut self) {
        self.sealed = true;
    }

    /// Completed steps in sequence order
    #[must_use]
    pub fn steps(&self) -> &[ScalingStep] {
        &self.steps
    }

    /// Whether the run that owns this log has ended
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

/// The immutable result of a finished scaling run
#[derive(Debug)]
pub struct ScalingRun {
    log: RunLog,
    verdict: RunVerdict,
}

impl ScalingRun {
    /// Completed steps in sequence order
    #[must_use]
    pub fn steps(&self) -> &[ScalingStep] {
        self.log.steps()
    }

    /// How the run ended
    #[must_use]
    pub fn verdict(&self) -> RunVerdict {
        self.verdict
    }
}

/// Cooperative cancellation handle checked between probe steps
///
/// Cancelling aborts the run after the current in-flight call resolves; the
/// log keeps only fully completed steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a fresh, uncancelled token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Escalating context-size probe against a single endpoint
///
/// Strictly sequential: one blocking transport call at a time, so latency and
/// tokens/sec are measured without contention from overlapping requests.
pub struct ScalingProbe<'a> {
    transport: &'a dyn TransportClient,
    config: ScalingConfig,
    estimator: TokenEstimator,
}

impl<'a> ScalingProbe<'a> {
    /// Create a probe over an injected transport
    ///
    /// # Errors
    /// Returns [`SondearError::InvalidInput`] when the configuration is
    /// invalid (see [`ScalingConfig::validate`]).
    pub fn new(transport: &'a dyn TransportClient, config: ScalingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            config,
            estimator: TokenEstimator::new(),
        })
    }

    /// The configuration this probe runs with
    #[must_use]
    pub fn config(&self) -> &ScalingConfig {
        &self.config
    }

    /// Run the full size sequence without external cancellation
    #[must_use]
    pub fn run(&self) -> ScalingRun {
        self.run_with_cancel(&CancelToken::new())
    }

    /// Run the size sequence, checking `cancel` between steps
    #[must_use]
    pub fn run_with_cancel(&self, cancel: &CancelToken) -> ScalingRun {
        let mut log = RunLog::default();
        let mut verdict = RunVerdict::ExhaustedSizes;

        for &target in &self.config.target_sizes {
            if cancel.is_cancelled() {
                info!("scaling run cancelled before {} tokens", target);
                verdict = RunVerdict::Cancelled;
                break;
            }

            debug!(target_tokens = target, "probing context size");
            let filler = self.synthesize(target);
            let synthesized_chars = filler.len();
            let prompt = format!("{filler}\n\n{}", self.config.question);

            let request = ChatRequest {
                model: self.config.model.clone(),
                messages: vec![ChatMessage::user(prompt)],
                max_tokens: self.config.max_output_tokens,
                temperature: self.config.temperature,
            };

            let start = Instant::now();
            let result = self.transport.submit(&request);
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            let (step, decision) = self.classify(target, synthesized_chars, result, latency_ms);
            log.push(step);

            match decision {
                StepDecision::Continue => {},
                StepDecision::StopLimit => {
                    info!(target_tokens = target, "context limit reached");
                    verdict = RunVerdict::ContextLimit;
                    break;
                },
                StepDecision::StopError => {
                    warn!(target_tokens = target, "transport error stopped the run");
                    verdict = RunVerdict::Errored;
                    break;
                },
            }
        }

        log.seal();
        ScalingRun { log, verdict }
    }

    /// Synthesize filler text sized exactly to `target_tokens`
    ///
    /// Repeats the seed phrase and truncates to the estimator's character
    /// budget; the estimated size of the result is within one estimator unit
    /// of the target.
    #[must_use]
    pub fn synthesize(&self, target_tokens: usize) -> String {
        let target_chars = self.estimator.chars_for(target_tokens);
        let mut text = String::with_capacity(target_chars + self.config.seed_phrase.len());
        while text.len() < target_chars {
            text.push_str(&self.config.seed_phrase);
        }
        let mut cut = target_chars;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);

        let estimated = self.estimator.estimate(&text);
        debug_assert!(
            estimated.abs_diff(target_tokens) <= 1,
            "synthesized {} estimated tokens for target {}",
            estimated,
            target_tokens
        );
        text
    }

    /// Classify one transport result into a recorded step and a decision
    fn classify(
        &self,
        target_tokens: usize,
        synthesized_chars: usize,
        result: Result<ChatOutcome>,
        latency_ms: f64,
    ) -> (ScalingStep, StepDecision) {
        match result {
            Ok(outcome) => {
                let elapsed_secs = latency_ms / 1000.0;
                // Guard against zero elapsed time before dividing
                let throughput_tps = outcome.usage.and_then(|u| {
                    (elapsed_secs > f64::EPSILON && u.total_tokens > 0)
                        .then(|| u.total_tokens as f64 / elapsed_secs)
                });
                let step = ScalingStep {
                    target_tokens,
                    synthesized_chars,
                    outcome: ProbeOutcome::Success,
                    latency_ms,
                    usage: outcome.usage,
                    throughput_tps,
                    message: None,
                };
                (step, StepDecision::Continue)
            },
            Err(err) => {
                let message = err.to_string();
                if is_context_limit_signature(&message) {
                    let step = ScalingStep {
                        target_tokens,
                        synthesized_chars,
                        outcome: ProbeOutcome::ContextExceeded,
                        latency_ms,
                        usage: None,
                        throughput_tps: None,
                        message: Some(message),
                    };
                    (step, StepDecision::StopLimit)
                } else {
                    let step = ScalingStep {
                        target_tokens,
                        synthesized_chars,
                        outcome: ProbeOutcome::TransportError,
                        latency_ms,
                        usage: None,
                        throughput_tps: None,
                        message: Some(message),
                    };
                    let decision = match self.config.error_policy {
                        ErrorPolicy::FailFast => StepDecision::StopError,
                        ErrorPolicy::ContinueOnError => StepDecision::Continue,
                    };
                    (step, decision)
                }
            },
        }
    }
}
