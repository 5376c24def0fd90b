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

//! Queue status and the shared worker/producer state.
//!
//! [`QueueStatus`] is the observable snapshot: the appended (current)
//! file's counters plus the FIFO of sealed files. Internally the same
//! structure lives inside [`StatusCell`] under one mutex with one
//! condition variable; every mutation that could unblock a waiter
//! signals the condition.
//!
//! Mutation discipline:
//! - the appender bumps `appended_file_size` and sets the timestamp;
//! - seal pushes a [`SealedFile`] and clears the appended counters;
//! - only the worker pops; only the purge sweep removes mid-queue;
//! - all of the above happen with the cell locked.

use std::{collections::VecDeque, path::PathBuf, time::Duration};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::clock::Timestamp;

/// An immutable sealed file awaiting dispatch.
///
/// Ordered by `(created_at, base_name)`; `created_at` is the opening
/// timestamp of the current file it came from, as embedded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedFile {
    pub base_name:  String,
    pub path:       PathBuf,
    pub created_at: Timestamp,
    pub size:       u64,
}

impl PartialOrd for SealedFile {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> { Some(self.cmp(other)) }
}

impl Ord for SealedFile {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.created_at, &self.base_name).cmp(&(other.created_at, &other.base_name))
    }
}

/// The FIFO of sealed files plus its running byte total.
#[derive(Debug, Clone, Default)]
pub struct FinalizedStatus {
    /// Sorted from oldest to newest.
    pub files:      VecDeque<SealedFile>,
    /// Sum of the sizes of `files`.
    pub total_size: u64,
}

impl FinalizedStatus {
    pub(crate) fn push_back(&mut self, file: SealedFile) {
        self.total_size += file.size;
        self.files.push_back(file);
    }

    /// Remove the entry at `index`, keeping `total_size` in step.
    pub(crate) fn remove(&mut self, index: usize) -> Option<SealedFile> {
        let file = self.files.remove(index)?;
        self.total_size -= file.size;
        Some(file)
    }

    pub fn len(&self) -> usize { self.files.len() }

    pub fn is_empty(&self) -> bool { self.files.is_empty() }

    pub fn oldest(&self) -> Option<&SealedFile> { self.files.front() }
}

/// Observable queue state.
#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    /// Bytes appended to the current file; zero when none is open.
    pub appended_file_size:      u64,
    /// Opening timestamp of the current file; `None` when none is open.
    pub appended_file_timestamp: Option<Timestamp>,
    /// The sealed-file FIFO.
    pub finalized:               FinalizedStatus,
}

impl QueueStatus {
    /// Sealed plus appended bytes currently on disk.
    pub fn total_size(&self) -> u64 { self.finalized.total_size + self.appended_file_size }

    pub fn oldest_sealed_at(&self) -> Option<Timestamp> {
        self.finalized.oldest().map(|f| f.created_at)
    }
}

/// Everything guarded by the status mutex.
#[derive(Debug, Default)]
pub(crate) struct StatusInner {
    pub status:           QueueStatus,
    /// True once the initial recovery scan has completed.
    pub status_ready:     bool,
    /// External resume request; consumed by the worker on wake-up.
    pub force_processing: bool,
    pub shutdown:         bool,
    /// Set on `Unavailable` or a keep-and-suspend give-up; cleared by
    /// force processing.
    pub suspended:        bool,
    /// Failed dispatch attempts for the file at the front.
    pub attempts:         u32,
    /// Deadline of the pending retry, if one is armed.
    pub retry_at:         Option<Timestamp>,
    /// Path of the file currently handed to the processor; purge must
    /// not select it.
    pub in_flight:        Option<PathBuf>,
    /// Base name of the live current file, if any.
    pub current_name:     Option<String>,
}

/// The shared mutex + condition pair.
#[derive(Debug, Default)]
pub(crate) struct StatusCell {
    inner: Mutex<StatusInner>,
    cond:  Condvar,
}

impl StatusCell {
    pub fn lock(&self) -> MutexGuard<'_, StatusInner> { self.inner.lock() }

    pub fn notify_all(&self) { self.cond.notify_all(); }

    pub fn wait(&self, guard: &mut MutexGuard<'_, StatusInner>) { self.cond.wait(guard); }

    pub fn wait_for(&self, guard: &mut MutexGuard<'_, StatusInner>, timeout: Duration) {
        self.cond.wait_for(guard, timeout);
    }

    /// Block until the initial recovery scan has completed (or shutdown
    /// was requested), then return a snapshot.
    pub fn snapshot_when_ready(&self) -> QueueStatus {
        let mut guard = self.inner.lock();
        while !guard.status_ready && !guard.shutdown {
            self.cond.wait(&mut guard);
        }
        guard.status.clone()
    }
}
