//! Bounded re-extraction.
//!
//! SaaS form builders often tear the DOM down or swap in a confirmation page
//! right as the submit click lands, so the first read can come back empty.
//! A chain re-runs extraction a bounded number of times with growing delays,
//! then optionally tries a salvage pass, then gives up without a trace.

use crate::dom::NodeId;
use formwatch_common::TriggerSource;
use formwatch_common::config::RetryConfig;
use std::collections::HashMap;

pub type ChainId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delays_ms: Vec<u64>,
    pub salvage: bool,
}

/// What to do once an attempt has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Data found; the chain is finished.
    Done,
    /// Run attempt `attempt` after `delay_ms`.
    Retry { attempt: u32, delay_ms: u64 },
    /// Attempts exhausted; run the salvage pass once.
    Salvage,
    /// Attempts exhausted and salvage disabled.
    Abandon,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig, trigger: TriggerSource) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delays_ms: config.delays_for(trigger).to_vec(),
            salvage: config.salvage,
        }
    }

    /// Delay before attempt `attempt` (1-based). The first attempt runs
    /// immediately; the last configured delay repeats.
    pub fn delay_before(&self, attempt: u32) -> u64 {
        if attempt <= 1 {
            return 0;
        }
        let index = (attempt as usize - 2).min(self.delays_ms.len().saturating_sub(1));
        self.delays_ms.get(index).copied().unwrap_or(0)
    }

    pub fn after_attempt(&self, attempt: u32, found: bool) -> RetryStep {
        if found {
            RetryStep::Done
        } else if attempt < self.max_attempts {
            let next = attempt + 1;
            RetryStep::Retry {
                attempt: next,
                delay_ms: self.delay_before(next),
            }
        } else if self.salvage {
            RetryStep::Salvage
        } else {
            RetryStep::Abandon
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default(), TriggerSource::WatchedClick)
    }
}

/// One in-flight extraction chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryChain {
    pub id: ChainId,
    pub trigger: TriggerSource,
    /// The control that started the chain, when there is one.
    pub origin: Option<NodeId>,
    /// Attempts started so far.
    pub attempt: u32,
    pub policy: RetryPolicy,
}

/// Tracks every chain between its first attempt and its terminal step.
#[derive(Debug, Default)]
pub struct RetryScheduler {
    chains: HashMap<ChainId, RetryChain>,
    next_id: ChainId,
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(
        &mut self,
        trigger: TriggerSource,
        origin: Option<NodeId>,
        policy: RetryPolicy,
    ) -> ChainId {
        let id = self.next_id;
        self.next_id += 1;
        self.chains.insert(
            id,
            RetryChain {
                id,
                trigger,
                origin,
                attempt: 0,
                policy,
            },
        );
        id
    }

    /// Mark the next attempt of `id` as running. `None` if the chain already
    /// settled.
    pub fn begin_attempt(&mut self, id: ChainId) -> Option<&RetryChain> {
        let chain = self.chains.get_mut(&id)?;
        chain.attempt += 1;
        Some(chain)
    }

    /// Record the outcome of the running attempt. Terminal steps drop the
    /// chain.
    pub fn settle(&mut self, id: ChainId, found: bool) -> Option<RetryStep> {
        let chain = self.chains.get(&id)?;
        let step = chain.policy.after_attempt(chain.attempt, found);
        if !matches!(step, RetryStep::Retry { .. }) {
            self.chains.remove(&id);
        }
        Some(step)
    }

    pub fn get(&self, id: ChainId) -> Option<&RetryChain> {
        self.chains.get(&id)
    }

    pub fn in_flight(&self) -> usize {
        self.chains.len()
    }
}
