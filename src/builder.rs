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

use std::{path::PathBuf, sync::Arc};

use bytes::Bytes;

use crate::{
    clock::{Clock, SystemClock},
    config::QueueConfig,
    error::Result,
    fs::{FileSystem, StdFileSystem},
    policy::{FinalizePolicy, PurgePolicy},
    processor::Processor,
    queue::Queue,
    retry::RetryPolicy,
};

pub struct QueueBuilder {
    config: QueueConfig,
    clock:  Option<Arc<dyn Clock>>,
    fs:     Option<Arc<dyn FileSystem>>,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            config: QueueConfig {
                dir: dir.into(),
                ..Default::default()
            },
            clock:  None,
            fs:     None,
        }
    }

    pub fn finalize(mut self, policy: FinalizePolicy) -> Self {
        self.config.finalize = policy;
        self
    }

    pub fn purge(mut self, policy: PurgePolicy) -> Self {
        self.config.purge = policy;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn separator(mut self, separator: impl Into<Bytes>) -> Self {
        self.config.separator = separator.into();
        self
    }

    pub fn detach_worker_on_shutdown(mut self, detach: bool) -> Self {
        self.config.detach_worker_on_shutdown = detach;
        self
    }

    pub fn quarantine_poisoned(mut self, quarantine: bool) -> Self {
        self.config.quarantine_poisoned = quarantine;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Create the working directory if needed, spawn the worker, and
    /// start recovery.
    pub fn build<P: Processor + 'static>(self, processor: P) -> Result<Queue> {
        Queue::new(
            self.config,
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            self.fs.unwrap_or_else(|| Arc::new(StdFileSystem)),
            Box::new(processor),
        )
    }
}
