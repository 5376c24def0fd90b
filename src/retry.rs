// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Retry scheduling for failed dispatches.
//!
//! On `FailureNeedRetry` the worker asks the policy for the next step:
//! a deadline to re-attempt the same file, or a give-up action once
//! `max_attempts` is exhausted. Delays double from `base_delay` up to
//! `max_delay`, so inter-attempt gaps are non-decreasing.

use crate::clock::{TimeSpan, Timestamp};

/// What to do with the front file when retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpAction {
    /// Discard the file (unlink, or quarantine when configured).
    Drop,
    /// Keep the file at the front and suspend dispatch until an
    /// external resume.
    KeepAndSuspend,
}

/// Outcome of consulting the retry policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAt(Timestamp),
    GiveUpDrop,
    GiveUpKeep,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the second attempt, in milliseconds.
    pub base_delay:   TimeSpan,
    /// Cap on the doubling delay, in milliseconds.
    pub max_delay:    TimeSpan,
    /// Attempts before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
    pub give_up:      GiveUpAction,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay:   60 * 1000,
            max_delay:    24 * 60 * 60 * 1000,
            max_attempts: None,
            give_up:      GiveUpAction::KeepAndSuspend,
        }
    }
}

impl RetryPolicy {
    /// Schedule the next step after `attempts` consecutive failures of
    /// the front file. `attempts` is at least 1.
    pub fn schedule(&self, attempts: u32, now: Timestamp) -> RetryDecision {
        if let Some(max) = self.max_attempts
            && attempts >= max
        {
            return match self.give_up {
                GiveUpAction::Drop => RetryDecision::GiveUpDrop,
                GiveUpAction::KeepAndSuspend => RetryDecision::GiveUpKeep,
            };
        }
        RetryDecision::RetryAt(now + self.delay_for(attempts))
    }

    fn delay_for(&self, attempts: u32) -> TimeSpan {
        let doublings = attempts.saturating_sub(1).min(32);
        self.base_delay
            .saturating_mul(1u64 << doublings)
            .min(self.max_delay)
    }
}
