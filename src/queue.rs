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

//! Main queue struct and lifecycle management.
//!
//! The [`Queue`] is the public entry point. Construction creates the
//! working directory if needed and spawns the dedicated worker thread,
//! which recovers any files left by a previous run and then dispatches
//! sealed files to the processor in FIFO order.
//!
//! ## Usage
//!
//! ```ignore
//! let queue = QueueBuilder::new("/var/spool/uploads")
//!     .separator("\n")
//!     .build(uploader)?;
//!
//! queue.push("record")?;
//!
//! // Flush everything to the processor right now.
//! queue.force_processing(true)?;
//!
//! // Clean shutdown; joins the worker.
//! queue.shutdown()?;
//! ```

use std::{
    path::Path,
    sync::Arc,
    thread::{self, JoinHandle},
};

use bytes::Bytes;
use parking_lot::Mutex;
use snafu::ensure;
use tracing::{info, warn};

use crate::{
    appender::{self, CurrentFile},
    clock::Clock,
    config::QueueConfig,
    error::{InternalSnafu, Result, ShutdownSnafu},
    fs::FileSystem,
    naming,
    processor::Processor,
    status::{QueueStatus, StatusCell},
    worker,
};

/// State shared between the public surface, the appender, and the
/// worker thread.
pub(crate) struct Inner {
    pub config:  QueueConfig,
    pub clock:   Arc<dyn Clock>,
    pub fs:      Arc<dyn FileSystem>,
    pub cell:    StatusCell,
    /// The live current file. Locked before `cell`, always.
    pub current: Mutex<Option<CurrentFile>>,
}

impl Inner {
    pub(crate) fn new(config: QueueConfig, clock: Arc<dyn Clock>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            config,
            clock,
            fs,
            cell: StatusCell::default(),
            current: Mutex::new(None),
        }
    }
}

/// A durable, local, filesystem-backed message queue.
///
/// Messages are appended to a current file; policy triggers seal it
/// (atomic rename) and hand it to the processor on the worker thread.
/// Sealed files survive restarts and are replayed in arrival order.
///
/// `push` is single-producer per instance; callers with multiple
/// producer threads serialize pushes externally.
pub struct Queue {
    inner:  Arc<Inner>,
    worker: Option<JoinHandle<()>>,
}

impl Queue {
    pub(crate) fn new(
        config: QueueConfig,
        clock: Arc<dyn Clock>,
        fs: Arc<dyn FileSystem>,
        processor: Box<dyn Processor>,
    ) -> Result<Self> {
        fs.create_dir_all(&config.dir)?;

        let inner = Arc::new(Inner::new(config, clock, fs));
        let worker = thread::Builder::new().name("spoolq-worker".into()).spawn({
            let inner = inner.clone();
            move || worker::run(inner, processor)
        })?;

        info!(dir = ?inner.config.dir, "Queue initialized");
        Ok(Self {
            inner,
            worker: Some(worker),
        })
    }

    /// Append a message to the queue.
    ///
    /// Opens a current file if none exists, appends the message (plus
    /// the configured separator), and seals the file when the finalize
    /// policy fires. A sealed file becomes visible to the worker before
    /// this call returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`](crate::Error) after shutdown, or the
    /// underlying IO error; a failed write is not counted in the status.
    pub fn push(&self, message: impl Into<Bytes>) -> Result<()> {
        appender::push(&self.inner, message.into())
    }

    /// Kick the worker, optionally sealing the current file first.
    ///
    /// The current file is sealed when `force_seal_current` is set or
    /// when the sealed-file FIFO is empty (otherwise there would be
    /// nothing to dispatch). This is the resume entry point after the
    /// processor reported `Unavailable`.
    pub fn force_processing(&self, force_seal_current: bool) -> Result<()> {
        let mut current = self.inner.current.lock();

        let seal_current = {
            let st = self.inner.cell.lock();
            ensure!(!st.shutdown, ShutdownSnafu);
            (force_seal_current || st.status.finalized.is_empty()) && current.is_some()
        };
        if seal_current {
            appender::seal(&self.inner, &mut current)?;
        }

        let mut st = self.inner.cell.lock();
        st.force_processing = true;
        drop(st);
        self.inner.cell.notify_all();
        Ok(())
    }

    /// Snapshot of the queue state; blocks until the initial recovery
    /// scan has completed.
    pub fn queue_status(&self) -> QueueStatus { self.inner.cell.snapshot_when_ready() }

    pub fn working_directory(&self) -> &Path { &self.inner.config.dir }

    pub fn config(&self) -> &QueueConfig { &self.inner.config }

    /// Remove every recognized queue file, current and sealed, from
    /// disk and from the status.
    ///
    /// Test and tear-down helper; must not be called while the worker
    /// is inside a processor call.
    pub fn remove_all_files(&self) -> Result<()> {
        let mut current = self.inner.current.lock();
        // Close the handle before unlinking the file it points at.
        *current = None;

        let mut st = self.inner.cell.lock();
        st.status.finalized = Default::default();
        st.status.appended_file_size = 0;
        st.status.appended_file_timestamp = None;
        st.current_name = None;
        st.attempts = 0;
        st.retry_at = None;
        drop(st);

        let dir = &self.inner.config.dir;
        let mut names = Vec::new();
        self.inner.fs.scan_dir(dir, &mut |name| {
            if naming::parse_finalized_file_name(name).is_some()
                || naming::parse_current_file_name(name).is_some()
            {
                names.push(name.to_string());
            }
        })?;
        for name in names {
            self.inner.fs.remove(&dir.join(&name))?;
        }

        self.inner.cell.notify_all();
        Ok(())
    }

    /// Shut down the queue gracefully.
    ///
    /// Signals the worker, closes the current file (its contents stay
    /// on disk under the current name and are recovered on the next
    /// start), and joins the worker thread unless the configuration
    /// asks for a detached shutdown. An in-flight processor call is
    /// never interrupted; in the joined case this blocks until it
    /// returns.
    pub fn shutdown(mut self) -> Result<()> { self.shutdown_inner() }

    fn shutdown_inner(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        info!("Shutting down queue");

        {
            let mut st = self.inner.cell.lock();
            st.shutdown = true;
        }
        self.inner.cell.notify_all();

        {
            let mut current = self.inner.current.lock();
            if let Some(mut open) = current.take() {
                if let Err(e) = open.file.flush() {
                    warn!(file = %open.base_name, error = %e, "Failed to flush current file");
                }
            }
        }

        if self.inner.config.detach_worker_on_shutdown {
            info!("Worker detached");
            drop(handle);
        } else {
            handle.join().map_err(|_| {
                InternalSnafu {
                    message: "worker thread panicked".to_string(),
                }
                .build()
            })?;
            info!("Queue shutdown complete");
        }
        Ok(())
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        if self.worker.is_some()
            && let Err(e) = self.shutdown_inner()
        {
            warn!(error = %e, "Shutdown during drop failed");
        }
    }
}
