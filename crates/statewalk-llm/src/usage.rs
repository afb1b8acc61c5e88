//! Token accounting across runs.

use crate::service::RunInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

/// Sum usage of the runs that were both created and completed inside
/// `[tmin, tmax)`. Runs lacking either timestamp or usage are skipped.
pub fn usage_within(runs: &[RunInfo], tmin: DateTime<Utc>, tmax: DateTime<Utc>) -> TokenUsage {
    let (lo, hi) = (tmin.timestamp(), tmax.timestamp());
    let inside = |t: Option<i64>| t.is_some_and(|t| lo <= t && t < hi);

    runs.iter()
        .filter(|run| inside(run.created_at) && inside(run.completed_at))
        .filter_map(|run| run.usage)
        .fold(TokenUsage::default(), |acc, u| acc + u)
}
