//! Scaling probe integration tests with scripted mock transports
//!
//! Verifies the state machine against the transport boundary: run-log
//! ordering, context-limit termination, generic-error policies, and
//! cancellation, all without a live endpoint.

use std::cell::RefCell;

use sondear::error::{Result, SondearError};
use sondear::probe::{
    CancelToken, ErrorPolicy, ProbeOutcome, RunVerdict, ScalingConfig, ScalingProbe,
};
use sondear::transport::{ChatOutcome, ChatRequest, TokenUsage, TransportClient};

/// Mock transport that succeeds except at one scripted call number
struct ScriptedTransport {
    /// 1-based call number that fails; `None` always succeeds
    fail_at: Option<usize>,
    /// Error message for the failing call
    error_message: String,
    /// Prompts received, in call order
    prompts: RefCell<Vec<String>>,
}

impl ScriptedTransport {
    fn always_ok() -> Self {
        Self {
            fail_at: None,
            error_message: String::new(),
            prompts: RefCell::new(Vec::new()),
        }
    }

    fn failing_at(call: usize, message: &str) -> Self {
        Self {
            fail_at: Some(call),
            error_message: message.to_string(),
            prompts: RefCell::new(Vec::new()),
        }
    }

    fn call_count(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl TransportClient for ScriptedTransport {
    fn submit(&self, request: &ChatRequest) -> Result<ChatOutcome> {
        let prompt = request.messages[0].content.clone();
        let prompt_len = prompt.len();
        self.prompts.borrow_mut().push(prompt);
        let call = self.prompts.borrow().len();

        if self.fail_at == Some(call) {
            return Err(SondearError::Transport(self.error_message.clone()));
        }

        let prompt_tokens = prompt_len / 4;
        Ok(ChatOutcome {
            content: "Roughly 250 times.".to_string(),
            usage: Some(TokenUsage {
                prompt_tokens,
                completion_tokens: 10,
                total_tokens: prompt_tokens + 10,
            }),
            finish_reason: Some("stop".to_string()),
        })
    }
}

fn config_with(sizes: Vec<usize>, policy: ErrorPolicy) -> ScalingConfig {
    ScalingConfig {
        target_sizes: sizes,
        error_policy: policy,
        ..ScalingConfig::default()
    }
}

#[test]
fn test_all_sizes_succeed_in_order() {
    let transport = ScriptedTransport::always_ok();
    let config = config_with(vec![1000, 5000, 10000], ErrorPolicy::FailFast);
    let probe = ScalingProbe::new(&transport, config).expect("valid config");

    let run = probe.run();

    assert_eq!(run.verdict(), RunVerdict::ExhaustedSizes);
    assert_eq!(run.steps().len(), 3);
    assert!(run.steps().iter().all(|s| s.outcome == ProbeOutcome::Success));

    let targets: Vec<usize> = run.steps().iter().map(|s| s.target_tokens).collect();
    assert_eq!(targets, vec![1000, 5000, 10000]);
    assert!(targets.windows(2).all(|w| w[0] < w[1]));

    for step in run.steps() {
        assert_eq!(step.synthesized_chars, step.target_tokens * 4);
        assert!(step.usage.is_some());
        assert!(step.latency_ms >= 0.0);
    }
}

#[test]
fn test_prompt_carries_filler_and_question() {
    let transport = ScriptedTransport::always_ok();
    let config = config_with(vec![100], ErrorPolicy::FailFast);
    let probe = ScalingProbe::new(&transport, config).expect("valid config");

    let _ = probe.run();

    let prompts = transport.prompts.borrow();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("This is a test sentence. "));
    assert!(prompts[0].contains("Question: How many times does the word 'test'"));
}

#[test]
fn test_context_limit_at_third_size_stops_run() {
    let transport = ScriptedTransport::failing_at(
        3,
        "HTTP 400: This model's maximum context length is 262144 tokens",
    );
    let config = config_with(
        vec![1000, 5000, 10000, 20000, 50000],
        ErrorPolicy::FailFast,
    );
    let probe = ScalingProbe::new(&transport, config).expect("valid config");

    let run = probe.run();

    assert_eq!(run.verdict(), RunVerdict::ContextLimit);
    assert_eq!(run.steps().len(), 3, "sizes 4-5 must never be attempted");
    assert_eq!(transport.call_count(), 3);
    assert_eq!(run.steps()[0].outcome, ProbeOutcome::Success);
    assert_eq!(run.steps()[1].outcome, ProbeOutcome::Success);
    assert_eq!(run.steps()[2].outcome, ProbeOutcome::ContextExceeded);
    assert!(run.steps()[2]
        .message
        .as_deref()
        .expect("error recorded")
        .contains("maximum context length"));
}

#[test]
fn test_generic_error_fail_fast_stops_run() {
    let transport = ScriptedTransport::failing_at(2, "connection reset by peer");
    let config = config_with(vec![1000, 5000, 10000], ErrorPolicy::FailFast);
    let probe = ScalingProbe::new(&transport, config).expect("valid config");

    let run = probe.run();

    assert_eq!(run.verdict(), RunVerdict::Errored);
    assert_eq!(run.steps().len(), 2);
    assert_eq!(run.steps()[1].outcome, ProbeOutcome::TransportError);
    assert_eq!(transport.call_count(), 2);
}

#[test]
fn test_generic_error_continue_policy_records_and_proceeds() {
    let transport = ScriptedTransport::failing_at(2, "connection reset by peer");
    let config = config_with(
        vec![1000, 2000, 3000, 4000, 5000],
        ErrorPolicy::ContinueOnError,
    );
    let probe = ScalingProbe::new(&transport, config).expect("valid config");

    let run = probe.run();

    assert_eq!(run.verdict(), RunVerdict::ExhaustedSizes);
    assert_eq!(run.steps().len(), 5);
    let outcomes: Vec<ProbeOutcome> = run.steps().iter().map(|s| s.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            ProbeOutcome::Success,
            ProbeOutcome::TransportError,
            ProbeOutcome::Success,
            ProbeOutcome::Success,
            ProbeOutcome::Success,
        ]
    );
}

/// Transport that requests cancellation while handling a given call
struct CancellingTransport {
    token: CancelToken,
    cancel_on: usize,
    calls: RefCell<usize>,
}

impl TransportClient for CancellingTransport {
    fn submit(&self, _request: &ChatRequest) -> Result<ChatOutcome> {
        *self.calls.borrow_mut() += 1;
        if *self.calls.borrow() == self.cancel_on {
            self.token.cancel();
        }
        Ok(ChatOutcome {
            content: String::new(),
            usage: None,
            finish_reason: None,
        })
    }
}

#[test]
fn test_cancellation_keeps_only_completed_steps() {
    let token = CancelToken::new();
    let transport = CancellingTransport {
        token: token.clone(),
        cancel_on: 2,
        calls: RefCell::new(0),
    };
    let config = config_with(vec![1000, 2000, 3000, 4000], ErrorPolicy::FailFast);
    let probe = ScalingProbe::new(&transport, config).expect("valid config");

    let run = probe.run_with_cancel(&token);

    assert_eq!(run.verdict(), RunVerdict::Cancelled);
    assert_eq!(run.steps().len(), 2, "in-flight step completes, no partials");
    assert_eq!(*transport.calls.borrow(), 2);
}

#[test]
fn test_invalid_size_sequence_rejected_up_front() {
    let transport = ScriptedTransport::always_ok();
    let config = config_with(vec![5000, 1000], ErrorPolicy::FailFast);
    assert!(ScalingProbe::new(&transport, config).is_err());
    assert_eq!(transport.call_count(), 0);
}
