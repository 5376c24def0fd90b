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

//! Time source abstraction.
//!
//! All queue decisions (file naming, age-based sealing, retry deadlines)
//! read time through the [`Clock`] trait so tests can drive a
//! [`ManualClock`] instead of the wall clock. Timestamps are epoch
//! milliseconds and are assumed non-decreasing during normal operation;
//! the seal path tolerates backward jumps by bumping sealed names until
//! they stay strictly increasing.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Epoch milliseconds.
pub type Timestamp = u64;

/// A span between two [`Timestamp`]s, in milliseconds.
pub type TimeSpan = u64;

/// Source of the queue's notion of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production clock: wall-clock UTC epoch milliseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp { Utc::now().timestamp_millis().max(0) as u64 }
}

/// A settable clock for tests and simulations.
///
/// Shared via `Arc`; setting the time does not wake queue waiters by
/// itself, so tests advance the clock before triggering the next queue
/// operation.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) { self.now.store(now, Ordering::SeqCst); }

    pub fn advance(&self, span: TimeSpan) { self.now.fetch_add(span, Ordering::SeqCst); }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp { self.now.load(Ordering::SeqCst) }
}
