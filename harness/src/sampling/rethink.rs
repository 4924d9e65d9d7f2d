//! Rethink sampling: sequential attempts, each re-prompted with feedback.
//!
//! ```text
//! Attempting ──Matched────────────────────────► LegalFound
//!     │ Unmatched
//!     ▼
//! IllegalFeedback ──attempt < max──► Attempting
//!                 ──attempt = max──► AttemptsExhausted
//! ```
//!
//! A transient model failure consumes an attempt and keeps the previous
//! feedback. A non-transient failure ends the run with [`SamplingError`].
//! At the deadline the in-flight attempt is dropped and the run ends in
//! `TimedOut`; no attempt is started after it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    deadline_after, Feedback, PromptFn, Sampler, SamplerKind, SamplingError, SamplingOutcome,
};
use crate::legal_moves::LegalMoveSet;
use crate::model::RetryingModelCaller;
use crate::parsing::{MoveParser, ParseResult, UnmatchedReason};

// ── RethinkPhase ─────────────────────────────────────────────────────────────

#[derive(Debug)]
enum RethinkPhase {
    /// About to issue attempt number `attempt` (1-based).
    Attempting {
        attempt: u32,
        feedback: Option<Feedback>,
    },
    /// The response for `attempt` did not parse to a legal move.
    IllegalFeedback { attempt: u32, feedback: Feedback },
    LegalFound(ParseResult),
    AttemptsExhausted,
    TimedOut,
}

pub struct RethinkSampler {
    caller: Arc<RetryingModelCaller>,
    parser: Arc<dyn MoveParser>,
    max_attempts: u32,
    total_timeout: Option<Duration>,
}

impl RethinkSampler {
    pub fn new(
        caller: Arc<RetryingModelCaller>,
        parser: Arc<dyn MoveParser>,
        max_attempts: u32,
    ) -> Self {
        Self {
            caller,
            parser,
            max_attempts,
            total_timeout: None,
        }
    }

    pub fn with_total_timeout(mut self, total_timeout: Option<Duration>) -> Self {
        self.total_timeout = total_timeout;
        self
    }
}

#[async_trait]
impl Sampler for RethinkSampler {
    fn kind(&self) -> SamplerKind {
        SamplerKind::Rethink
    }

    fn budget(&self) -> u32 {
        self.max_attempts
    }

    async fn sample(
        &self,
        prompt: &PromptFn<'_>,
        legal_moves: &LegalMoveSet,
    ) -> Result<SamplingOutcome, SamplingError> {
        let deadline = deadline_after(self.total_timeout);
        let mut raw_responses = Vec::new();
        let mut attempts_used = 0;

        let mut phase = if self.max_attempts == 0 {
            RethinkPhase::AttemptsExhausted
        } else {
            RethinkPhase::Attempting {
                attempt: 1,
                feedback: None,
            }
        };

        let result = loop {
            phase = match phase {
                RethinkPhase::Attempting { attempt, feedback } => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        warn!(attempt, "rethink deadline reached before attempt");
                        phase = RethinkPhase::TimedOut;
                        continue;
                    }
                    attempts_used = attempt;
                    let rendered = prompt(feedback.as_ref());
                    let call = self.caller.call(&rendered);
                    let response = match deadline {
                        Some(deadline) => match tokio::time::timeout_at(deadline, call).await {
                            Ok(response) => response,
                            Err(_) => {
                                warn!(attempt, "rethink deadline reached");
                                phase = RethinkPhase::TimedOut;
                                continue;
                            }
                        },
                        None => call.await,
                    };

                    match response {
                        Ok(response) => {
                            let parsed = self.parser.parse(&response.text, legal_moves);
                            debug!(attempt, result = ?parsed, "rethink attempt parsed");
                            let text = response.text.clone();
                            raw_responses.push(response);
                            match parsed.unmatched_reason() {
                                None => RethinkPhase::LegalFound(parsed),
                                Some(reason) => RethinkPhase::IllegalFeedback {
                                    attempt,
                                    feedback: Feedback::new(text, reason, legal_moves),
                                },
                            }
                        }
                        Err(err) if err.is_transient() => {
                            warn!(attempt, error = %err, "rethink attempt lost to transient model error");
                            if attempt >= self.max_attempts {
                                RethinkPhase::AttemptsExhausted
                            } else {
                                RethinkPhase::Attempting {
                                    attempt: attempt + 1,
                                    feedback,
                                }
                            }
                        }
                        Err(err) => {
                            warn!(attempt, error = %err, "rethink aborted by model error");
                            return Err(SamplingError::ModelUnavailable {
                                error: err,
                                attempts_used,
                            });
                        }
                    }
                }
                RethinkPhase::IllegalFeedback { attempt, feedback } => {
                    if attempt >= self.max_attempts {
                        RethinkPhase::AttemptsExhausted
                    } else {
                        RethinkPhase::Attempting {
                            attempt: attempt + 1,
                            feedback: Some(feedback),
                        }
                    }
                }
                RethinkPhase::LegalFound(result) => break result,
                RethinkPhase::AttemptsExhausted => {
                    break ParseResult::unmatched(UnmatchedReason::AttemptsExhausted)
                }
                RethinkPhase::TimedOut => break ParseResult::unmatched(UnmatchedReason::Timeout),
            };
        };

        info!(
            attempts_used,
            max_attempts = self.max_attempts,
            result = ?result,
            "rethink complete"
        );

        Ok(SamplingOutcome {
            result,
            attempts_used,
            raw_responses,
            votes: Vec::new(),
            kind: SamplerKind::Rethink,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MockModel, Model, ModelCallError, ModelReply, RetryPolicy};
    use crate::parsing::ChainedMoveParser;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers every call with the same illegal move after a fixed delay.
    struct SlowModel {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Model for SlowModel {
        async fn generate(&self, _prompt: &str) -> Result<ModelReply, ModelCallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(ModelReply::new("Qh7"))
        }
    }

    fn slow_sampler(
        delay_ms: u64,
        max_attempts: u32,
        timeout_ms: u64,
    ) -> (Arc<SlowModel>, RethinkSampler) {
        let model = Arc::new(SlowModel {
            delay: Duration::from_millis(delay_ms),
            calls: AtomicUsize::new(0),
        });
        let caller = RetryingModelCaller::new(model.clone(), RetryPolicy::none());
        let sampler = RethinkSampler::new(
            Arc::new(caller),
            Arc::new(ChainedMoveParser::standard(0.7, 0.05)),
            max_attempts,
        )
        .with_total_timeout(Some(Duration::from_millis(timeout_ms)));
        (model, sampler)
    }

    fn sampler(model: MockModel, max_attempts: u32) -> RethinkSampler {
        let caller = RetryingModelCaller::new(Arc::new(model), RetryPolicy::none());
        RethinkSampler::new(
            Arc::new(caller),
            Arc::new(ChainedMoveParser::standard(0.7, 0.05)),
            max_attempts,
        )
    }

    fn legal() -> LegalMoveSet {
        LegalMoveSet::from_pairs([(1, "e4"), (2, "e5")]).unwrap()
    }

    fn render(feedback: Option<&Feedback>) -> String {
        match feedback {
            None => "Your move?".to_string(),
            Some(fb) => format!(
                "'{}' was not legal. Choose one of: {}",
                fb.previous_text,
                fb.legal_moves.join(", ")
            ),
        }
    }

    #[tokio::test]
    async fn test_first_attempt_legal() {
        let mut model = MockModel::new();
        model
            .expect_generate()
            .times(1)
            .returning(|_| Ok(ModelReply::new("I will play e4.")));

        let outcome = sampler(model, 3).sample(&render, &legal()).await.unwrap();
        assert_eq!(outcome.result.formal_id(), Some(1));
        assert_eq!(outcome.attempts_used, 1);
        assert_eq!(outcome.kind, SamplerKind::Rethink);
    }

    #[tokio::test]
    async fn test_exhausts_without_fourth_call() {
        let mut model = MockModel::new();
        model
            .expect_generate()
            .times(3)
            .returning(|_| Ok(ModelReply::new("Qh7 wins")));

        let outcome = sampler(model, 3).sample(&render, &legal()).await.unwrap();
        assert_eq!(
            outcome.result,
            ParseResult::unmatched(UnmatchedReason::AttemptsExhausted)
        );
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(outcome.raw_responses.len(), 3);
    }

    #[tokio::test]
    async fn test_feedback_reaches_next_prompt() {
        let prompts = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen = prompts.clone();

        let mut model = MockModel::new();
        let mut seq = mockall::Sequence::new();
        let first = seen.clone();
        model
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |p| {
                first.lock().unwrap().push(p.to_string());
                Ok(ModelReply::new("Ke9"))
            });
        let second = seen.clone();
        model
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |p| {
                second.lock().unwrap().push(p.to_string());
                Ok(ModelReply::new("Fine, e5"))
            });

        let outcome = sampler(model, 3).sample(&render, &legal()).await.unwrap();
        assert_eq!(outcome.result.formal_id(), Some(2));
        assert_eq!(outcome.attempts_used, 2);

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts[0], "Your move?");
        assert_eq!(prompts[1], "'Ke9' was not legal. Choose one of: e4, e5");
    }

    #[tokio::test]
    async fn test_transient_error_consumes_attempt() {
        let mut model = MockModel::new();
        let mut seq = mockall::Sequence::new();
        model
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ModelCallError::timeout("slow")));
        model
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ModelReply::new("e4")));

        let outcome = sampler(model, 2).sample(&render, &legal()).await.unwrap();
        assert_eq!(outcome.result.formal_id(), Some(1));
        assert_eq!(outcome.attempts_used, 2);
        assert_eq!(outcome.raw_responses.len(), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_surfaces() {
        let mut model = MockModel::new();
        model
            .expect_generate()
            .times(1)
            .returning(|_| Err(ModelCallError::auth("no key")));

        let err = sampler(model, 3).sample(&render, &legal()).await.unwrap_err();
        assert!(matches!(err, SamplingError::ModelUnavailable { .. }));
        assert_eq!(err.attempts_used(), 1);
    }

    #[tokio::test]
    async fn test_zero_budget_issues_nothing() {
        let mut model = MockModel::new();
        model.expect_generate().never();

        let outcome = sampler(model, 0).sample(&render, &legal()).await.unwrap();
        assert_eq!(outcome.attempts_used, 0);
        assert_eq!(
            outcome.result,
            ParseResult::unmatched(UnmatchedReason::AttemptsExhausted)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_in_flight_attempt() {
        // Attempts end at 100ms and 200ms; the third is cut off at 250ms.
        let (model, sampler) = slow_sampler(100, 5, 250);

        let outcome = sampler.sample(&render, &legal()).await.unwrap();
        assert_eq!(
            outcome.result,
            ParseResult::unmatched(UnmatchedReason::Timeout)
        );
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(outcome.raw_responses.len(), 2);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_attempt_issued_after_deadline() {
        // The first attempt alone outlasts the deadline.
        let (model, sampler) = slow_sampler(1_000, 5, 300);

        let outcome = sampler.sample(&render, &legal()).await.unwrap();
        assert_eq!(
            outcome.result,
            ParseResult::unmatched(UnmatchedReason::Timeout)
        );
        assert_eq!(outcome.attempts_used, 1);
        assert!(outcome.raw_responses.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_means_no_deadline() {
        let mut model = MockModel::new();
        model
            .expect_generate()
            .times(1)
            .returning(|_| Ok(ModelReply::new("e4")));

        let outcome = sampler(model, 3)
            .with_total_timeout(Some(Duration::MAX))
            .sample(&render, &legal())
            .await
            .unwrap();
        assert_eq!(outcome.result.formal_id(), Some(1));
    }
}
