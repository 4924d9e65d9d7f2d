//! Majority-vote sampling: `n` concurrent calls, one vote per parsed response.
//!
//! ```text
//! prompt(None) ──► JoinSet::spawn(call #0) ┐
//!              ──► JoinSet::spawn(call #1) ├─► collect until done or deadline
//!              ──► …                       ┘
//!                     │ slots indexed by issue order
//!                     ▼
//!          parse each response ─► tally by formal_id ─► winner
//! ```
//!
//! Tasks only perform the model call. Parsing and tallying happen on the
//! collecting task after the fan-in, so the tally has a single writer.
//! Ties go to the move whose first supporting response was issued earliest.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{
    deadline_after, PromptFn, Sampler, SamplerKind, SamplingError, SamplingOutcome, Vote,
};
use crate::legal_moves::{ActionId, LegalMoveSet};
use crate::model::{ModelCallError, RawModelResponse, RetryingModelCaller};
use crate::parsing::{MoveParser, ParseResult, UnmatchedReason};

type CallSlot = Option<Result<RawModelResponse, ModelCallError>>;

pub struct MajorityVoteSampler {
    caller: Arc<RetryingModelCaller>,
    parser: Arc<dyn MoveParser>,
    n: u32,
    total_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
struct TallyEntry {
    count: u32,
    first_index: usize,
}

impl MajorityVoteSampler {
    pub fn new(caller: Arc<RetryingModelCaller>, parser: Arc<dyn MoveParser>, n: u32) -> Self {
        Self {
            caller,
            parser,
            n,
            total_timeout: None,
        }
    }

    pub fn with_total_timeout(mut self, total_timeout: Option<Duration>) -> Self {
        self.total_timeout = total_timeout;
        self
    }

    /// Issue all calls and wait for them, or for the deadline.
    ///
    /// Returns one slot per issued call (index = issue order) and whether the
    /// deadline cut collection short.
    async fn fan_out(&self, prompt: String) -> (Vec<CallSlot>, bool) {
        let deadline = deadline_after(self.total_timeout);
        let prompt = Arc::new(prompt);
        let mut join_set: JoinSet<(usize, Result<RawModelResponse, ModelCallError>)> =
            JoinSet::new();

        for index in 0..self.n as usize {
            let caller = self.caller.clone();
            let prompt = prompt.clone();
            join_set.spawn(async move { (index, caller.call(&prompt).await) });
        }

        let mut slots: Vec<CallSlot> = vec![None; self.n as usize];
        let mut timed_out = false;
        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                },
                None => join_set.join_next().await,
            };
            match next {
                Some(Ok((index, result))) => slots[index] = Some(result),
                Some(Err(e)) => warn!(error = %e, "majority vote call task failed"),
                None => break,
            }
        }

        if timed_out {
            warn!(
                pending = join_set.len(),
                "majority vote deadline reached, abandoning in-flight calls"
            );
            join_set.abort_all();
        }
        (slots, timed_out)
    }
}

/// Tally matched results. `results` must be in issue order.
fn tally(results: &[(usize, ParseResult)]) -> Vec<(ActionId, TallyEntry)> {
    let mut counts: BTreeMap<ActionId, TallyEntry> = BTreeMap::new();
    for (index, result) in results {
        if let Some(id) = result.formal_id() {
            counts
                .entry(id)
                .and_modify(|e| {
                    e.count += 1;
                    e.first_index = e.first_index.min(*index);
                })
                .or_insert(TallyEntry {
                    count: 1,
                    first_index: *index,
                });
        }
    }

    let mut ranked: Vec<(ActionId, TallyEntry)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.count
            .cmp(&a.1.count)
            .then(a.1.first_index.cmp(&b.1.first_index))
    });
    ranked
}

#[async_trait]
impl Sampler for MajorityVoteSampler {
    fn kind(&self) -> SamplerKind {
        SamplerKind::Majority
    }

    fn budget(&self) -> u32 {
        self.n
    }

    async fn sample(
        &self,
        prompt: &PromptFn<'_>,
        legal_moves: &LegalMoveSet,
    ) -> Result<SamplingOutcome, SamplingError> {
        let (slots, timed_out) = self.fan_out(prompt(None)).await;

        let mut raw_responses = Vec::new();
        let mut parsed: Vec<(usize, ParseResult)> = Vec::new();
        let mut fatal_errors: Vec<ModelCallError> = Vec::new();

        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(response)) => {
                    let result = self.parser.parse(&response.text, legal_moves);
                    debug!(call = index, result = ?result, "majority vote parsed");
                    parsed.push((index, result));
                    raw_responses.push(response);
                }
                Some(Err(err)) => {
                    debug!(call = index, error = %err, "majority vote call failed");
                    if !err.is_transient() {
                        fatal_errors.push(err);
                    }
                }
                None => {}
            }
        }

        if self.n > 0 && fatal_errors.len() == self.n as usize {
            return Err(SamplingError::ModelUnavailable {
                error: fatal_errors.remove(0),
                attempts_used: self.n,
            });
        }

        let ranked = tally(&parsed);
        let votes: Vec<Vote> = ranked
            .iter()
            .map(|(id, e)| Vote {
                formal_id: *id,
                count: e.count,
            })
            .collect();

        let result = match ranked.first() {
            // The first supporting parse keeps its matched_by.
            Some((_, entry)) => parsed
                .iter()
                .find(|(index, _)| *index == entry.first_index)
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| ParseResult::unmatched(UnmatchedReason::NoVotes)),
            None if timed_out => ParseResult::unmatched(UnmatchedReason::Timeout),
            None => ParseResult::unmatched(UnmatchedReason::NoVotes),
        };

        info!(
            n = self.n,
            responses = raw_responses.len(),
            votes = ?votes,
            timed_out,
            result = ?result,
            "majority vote complete"
        );

        Ok(SamplingOutcome {
            result,
            attempts_used: self.n,
            raw_responses,
            votes,
            kind: SamplerKind::Majority,
        })
    }
}
