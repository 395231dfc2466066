//! Scheduling strategy - how many job runs execute at once

use std::fmt;

/// Strategy for scheduling job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// One job run at a time, in plan order
    Sequential,

    /// Every job run at once
    Parallel,

    /// At most N concurrent job runs
    LimitedParallel(usize),
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        SchedulingStrategy::Parallel
    }
}

impl SchedulingStrategy {
    /// Concurrency bound for `job_runs` plans; never zero
    pub fn concurrency(&self, job_runs: usize) -> usize {
        let bound = match self {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => job_runs,
            SchedulingStrategy::LimitedParallel(max) => (*max).min(job_runs),
        };
        bound.max(1)
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, SchedulingStrategy::Sequential)
    }
}

impl fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingStrategy::Sequential => f.write_str("sequential"),
            SchedulingStrategy::Parallel => f.write_str("parallel"),
            SchedulingStrategy::LimitedParallel(max) => write!(f, "parallel-limited({})", max),
        }
    }
}
