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

use std::path::PathBuf;

use bytes::Bytes;

use crate::{policy::{FinalizePolicy, PurgePolicy}, retry::RetryPolicy};

/// Queue configuration. Assembled via [`QueueBuilder`](crate::QueueBuilder).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Working directory holding current and sealed files.
    pub dir: PathBuf,
    pub finalize: FinalizePolicy,
    pub purge: PurgePolicy,
    pub retry: RetryPolicy,
    /// Bytes appended after every message; may be empty.
    pub separator: Bytes,
    /// Detach the worker thread on shutdown instead of joining it.
    /// Joining is the default: a detached worker may still be inside a
    /// processor call when the process exits.
    pub detach_worker_on_shutdown: bool,
    /// Move dropped poison files to `quarantine/` instead of unlinking.
    pub quarantine_poisoned: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./queue_data"),
            finalize: FinalizePolicy::default(),
            purge: PurgePolicy::default(),
            retry: RetryPolicy::default(),
            separator: Bytes::new(),
            detach_worker_on_shutdown: false,
            quarantine_poisoned: false,
        }
    }
}

impl QueueConfig {
    /// Subdirectory receiving quarantined poison files.
    pub(crate) fn quarantine_dir(&self) -> PathBuf { self.dir.join("quarantine") }
}
