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

//! Pure decision policies: when to seal, when to purge, how to append.
//!
//! Policies are plain data with decision methods and no shared state.
//! The finalize policy runs around every push; the purge policy runs
//! after every FIFO change.

use bytes::Bytes;

use crate::{
    clock::{TimeSpan, Timestamp},
    status::QueueStatus,
};

/// Decides when the current file is sealed.
///
/// `max_file_size`/`max_file_age` apply when the sealed-file FIFO is
/// empty (the processor is keeping up, so seal often and keep latency
/// low). The optional `backlog_*` thresholds apply unconditionally and
/// are meant to be larger: while a backlog exists there is no point
/// producing many small files, only a bound on how big or old the
/// current file may grow.
#[derive(Debug, Clone)]
pub struct FinalizePolicy {
    /// Size bound with no backlog, in bytes.
    pub max_file_size:         u64,
    /// Age bound with no backlog, in milliseconds.
    pub max_file_age:          TimeSpan,
    /// Size bound while a backlog exists; defaults to `max_file_size`.
    pub backlog_max_file_size: Option<u64>,
    /// Age bound while a backlog exists; defaults to `max_file_age`.
    pub backlog_max_file_age:  Option<TimeSpan>,
}

impl Default for FinalizePolicy {
    fn default() -> Self {
        Self {
            max_file_size:         10 * 1024,
            max_file_age:          10 * 60 * 1000,
            backlog_max_file_size: Some(100 * 1024),
            backlog_max_file_age:  Some(24 * 60 * 60 * 1000),
        }
    }
}

impl FinalizePolicy {
    pub fn should_finalize(&self, status: &QueueStatus, now: Timestamp) -> bool {
        let Some(opened_at) = status.appended_file_timestamp else {
            return false;
        };
        let age = now.saturating_sub(opened_at);

        let backlog_size = self.backlog_max_file_size.unwrap_or(self.max_file_size);
        let backlog_age = self.backlog_max_file_age.unwrap_or(self.max_file_age);
        if status.appended_file_size >= backlog_size || age > backlog_age {
            return true;
        }

        if !status.finalized.is_empty() {
            // Backlogged: the bounds above are the only trigger.
            return false;
        }

        status.appended_file_size >= self.max_file_size || age > self.max_file_age
    }
}

/// Bounds total disk usage of sealed files.
#[derive(Debug, Clone)]
pub struct PurgePolicy {
    /// Sealed plus appended bytes allowed on disk.
    pub max_total_size: u64,
    /// Sealed files allowed in the FIFO.
    pub max_file_count: usize,
}

impl Default for PurgePolicy {
    fn default() -> Self {
        Self {
            max_total_size: 1024 * 1024 * 1024,
            max_file_count: 1000,
        }
    }
}

impl PurgePolicy {
    pub fn should_purge(&self, status: &QueueStatus) -> bool {
        status.total_size() > self.max_total_size
            || status.finalized.len() > self.max_file_count
    }
}

/// Appends each message followed by a configurable separator.
///
/// The separator may be empty, which degenerates to raw concatenation.
/// Message size accounting always includes the separator so finalize
/// thresholds see the true file size.
#[derive(Debug, Clone, Default)]
pub struct AppendFormat {
    pub separator: Bytes,
}

impl AppendFormat {
    pub fn message_size_in_bytes(&self, message: &Bytes) -> u64 {
        (message.len() + self.separator.len()) as u64
    }

    pub fn append_to_file(
        &self,
        file: &mut dyn crate::fs::AppendFile,
        message: &Bytes,
    ) -> crate::error::Result<()> {
        file.append(message)?;
        if !self.separator.is_empty() {
            file.append(&self.separator)?;
        }
        Ok(())
    }
}
