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

//! The dedicated worker thread.
//!
//! Startup runs four phases:
//!
//! 1. Scan the working directory for sealed files, sort them by
//!    `(created_at, base_name)`, and rebuild the FIFO.
//! 2. Scan for leftover current files. The newest becomes the adoption
//!    candidate; every other one is sealed in ascending order (several
//!    current files mean an unclean shutdown, and none may be lost).
//!    The candidate itself is sealed instead of adopted when the
//!    finalize policy already fires for its size and age.
//! 3. Signal `status_ready`, releasing blocked observers.
//! 4. Enter the dispatch loop: wait until shutdown, a force-processing
//!    request, or a dispatchable front file (queue non-empty, not
//!    suspended, no pending retry deadline), hand the front file to the
//!    processor outside the lock, then apply its verdict.
//!
//! The worker is the only popper. The processor runs with no locks
//! held, so pushes and seals proceed while it works.

use std::{panic, sync::Arc, time::Duration};

use tracing::{debug, error, info, warn};

use crate::{
    appender::CurrentFile,
    clock::Timestamp,
    error::Result,
    naming, purge,
    processor::{FileProcessingResult, Processor},
    queue::Inner,
    retry::RetryDecision,
    status::{FinalizedStatus, QueueStatus, SealedFile, StatusInner},
};

pub(crate) fn run(inner: Arc<Inner>, mut processor: Box<dyn Processor>) {
    info!(dir = ?inner.config.dir, "Queue worker starting");

    if let Err(e) = recover(&inner) {
        error!(error = %e, "Recovery scan failed; starting with an empty queue");
    }

    {
        let mut st = inner.cell.lock();
        st.status_ready = true;
    }
    inner.cell.notify_all();

    dispatch_loop(&inner, processor.as_mut());

    info!("Queue worker stopped");
}

/// Phases 1 and 2: rebuild the FIFO from disk and resolve leftover
/// current files.
fn recover(inner: &Inner) -> Result<()> {
    let mut sealed = scan_family(inner, naming::parse_finalized_file_name)?;
    let mut currents = scan_family(inner, naming::parse_current_file_name)?;
    currents.sort();

    let mut current_guard = inner.current.lock();

    // A producer may already have opened a fresh current file before
    // the scan finished; that one is live, not leftover.
    if let Some(live) = current_guard.as_ref() {
        let live_name = live.base_name.clone();
        currents.retain(|f| f.base_name != live_name);
    }
    let candidate = if current_guard.is_some() {
        None
    } else {
        currents.pop()
    };

    for stale in currents.drain(..) {
        match seal_on_disk(inner, &sealed, &stale) {
            Ok(file) => sealed.push(file),
            Err(e) => {
                warn!(file = %stale.base_name, error = %e, "Failed to seal leftover current file")
            }
        }
    }

    let mut adopted = None;
    if let Some(cand) = candidate
        && inner.fs.exists(&cand.path)
    {
        let now = inner.clock.now();
        let mut synth = FinalizedStatus::default();
        for file in &sealed {
            synth.push_back(file.clone());
        }
        let synth_status = QueueStatus {
            appended_file_size:      cand.size,
            appended_file_timestamp: Some(cand.created_at),
            finalized:               synth,
        };

        if inner.config.finalize.should_finalize(&synth_status, now) {
            match seal_on_disk(inner, &sealed, &cand) {
                Ok(file) => sealed.push(file),
                Err(e) => {
                    warn!(file = %cand.base_name, error = %e, "Failed to seal leftover current file")
                }
            }
        } else {
            match inner.fs.open_append(&cand.path) {
                Ok(file) => {
                    info!(file = %cand.base_name, size = cand.size, "Adopted current file");
                    *current_guard = Some(CurrentFile {
                        base_name: cand.base_name.clone(),
                        path:      cand.path.clone(),
                        opened_at: cand.created_at,
                        file,
                    });
                    adopted = Some(cand);
                }
                Err(e) => {
                    // Unopenable for appending; seal it so it is not lost.
                    warn!(file = %cand.base_name, error = %e, "Cannot reopen current file, sealing it");
                    match seal_on_disk(inner, &sealed, &cand) {
                        Ok(file) => sealed.push(file),
                        Err(e) => {
                            warn!(file = %cand.base_name, error = %e, "Failed to seal leftover current file")
                        }
                    }
                }
            }
        }
    }

    let mut st = inner.cell.lock();

    // A producer may have sealed a file while the scan ran; merge those
    // FIFO entries with the scanned set instead of clobbering them.
    let mut merged: Vec<SealedFile> = st.status.finalized.files.drain(..).collect();
    merged.extend(sealed);
    merged.sort();
    merged.dedup_by(|a, b| a.path == b.path);

    let mut finalized = FinalizedStatus::default();
    for file in merged {
        finalized.push_back(file);
    }
    st.status.finalized = finalized;
    if let Some(adopted) = adopted {
        st.status.appended_file_size = adopted.size;
        st.status.appended_file_timestamp = Some(adopted.created_at);
        st.current_name = Some(adopted.base_name);
    }
    info!(
        files = st.status.finalized.len(),
        total_size = st.status.finalized.total_size,
        "Recovery scan complete"
    );
    Ok(())
}

/// Collect every recognized file of one name family, with sizes.
/// Individually unreadable files are skipped, not fatal.
fn scan_family(
    inner: &Inner,
    parse: fn(&str) -> Option<Timestamp>,
) -> Result<Vec<SealedFile>> {
    let dir = &inner.config.dir;
    let mut names = Vec::new();
    inner.fs.scan_dir(dir, &mut |name| {
        if let Some(timestamp) = parse(name) {
            names.push((name.to_string(), timestamp));
        }
    })?;

    let mut files = Vec::with_capacity(names.len());
    for (name, created_at) in names {
        let path = dir.join(&name);
        match inner.fs.file_size(&path) {
            Ok(size) => files.push(SealedFile {
                base_name: name,
                path,
                created_at,
                size,
            }),
            Err(e) => warn!(file = %name, error = %e, "Skipping unreadable queue file"),
        }
    }
    files.sort();
    Ok(files)
}

/// Rename a leftover current file to a free sealed name, bumping the
/// embedded timestamp past collisions.
fn seal_on_disk(inner: &Inner, existing: &[SealedFile], stale: &SealedFile) -> Result<SealedFile> {
    let mut created_at = stale.created_at;
    loop {
        let base_name = naming::finalized_file_name(created_at);
        let path = inner.config.dir.join(&base_name);
        if !inner.fs.exists(&path) && !existing.iter().any(|f| f.base_name == base_name) {
            inner.fs.rename(&stale.path, &path)?;
            info!(from = %stale.base_name, to = %base_name, "Sealed leftover current file");
            return Ok(SealedFile {
                base_name,
                path,
                created_at,
                size: stale.size,
            });
        }
        created_at += 1;
    }
}

/// Phase 4.
fn dispatch_loop(inner: &Inner, processor: &mut dyn Processor) {
    loop {
        let next = {
            let mut st = inner.cell.lock();
            loop {
                if st.shutdown {
                    return;
                }
                if st.force_processing {
                    // Resume is a fresh start: drop the suspension, any
                    // pending deadline, and the attempt counter.
                    st.force_processing = false;
                    st.suspended = false;
                    st.retry_at = None;
                    st.attempts = 0;
                    break;
                }
                if !st.status.finalized.is_empty() && !st.suspended {
                    match st.retry_at {
                        None => break,
                        Some(deadline) => {
                            let now = inner.clock.now();
                            if now >= deadline {
                                st.retry_at = None;
                                break;
                            }
                            let wait = Duration::from_millis(deadline - now);
                            inner.cell.wait_for(&mut st, wait);
                            continue;
                        }
                    }
                }
                inner.cell.wait(&mut st);
            }
            let next = st.status.finalized.oldest().cloned();
            st.in_flight = next.as_ref().map(|f| f.path.clone());
            next
        };

        let Some(file) = next else {
            continue;
        };

        let now = inner.clock.now();
        debug!(file = %file.base_name, size = file.size, "Dispatching sealed file");
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            processor.on_file_ready(&file, now)
        }))
        .unwrap_or_else(|_| {
            warn!(file = %file.base_name, "Processor panicked, treating as retryable failure");
            FileProcessingResult::FailureNeedRetry
        });

        let mut st = inner.cell.lock();
        st.in_flight = None;
        match result {
            FileProcessingResult::Success => {
                debug!(file = %file.base_name, "Processed");
                if let Err(e) = inner.fs.remove(&file.path)
                    && !e.is_not_found()
                {
                    error!(file = %file.base_name, error = %e, "Failed to remove processed file");
                }
                advance(&mut st, &file);
            }
            FileProcessingResult::SuccessAndMoved => {
                debug!(file = %file.base_name, "Processed and moved by the processor");
                advance(&mut st, &file);
            }
            FileProcessingResult::Unavailable => {
                info!(file = %file.base_name, "Processor unavailable, dispatch suspended");
                st.suspended = true;
            }
            FileProcessingResult::FailureNeedRetry => {
                st.attempts += 1;
                match inner.config.retry.schedule(st.attempts, inner.clock.now()) {
                    RetryDecision::RetryAt(deadline) => {
                        debug!(
                            file = %file.base_name,
                            attempts = st.attempts,
                            deadline,
                            "Retry scheduled"
                        );
                        st.retry_at = Some(deadline);
                    }
                    RetryDecision::GiveUpDrop => {
                        warn!(file = %file.base_name, attempts = st.attempts, "Dropping poison file");
                        discard_poison(inner, &file);
                        advance(&mut st, &file);
                    }
                    RetryDecision::GiveUpKeep => {
                        warn!(
                            file = %file.base_name,
                            attempts = st.attempts,
                            "Giving up, dispatch suspended with the file kept"
                        );
                        st.suspended = true;
                        st.retry_at = None;
                    }
                }
            }
        }
        purge::run(inner, &mut st);
        inner.cell.notify_all();
    }
}

/// Pop the dispatched file off the FIFO and reset the retry state.
fn advance(st: &mut StatusInner, file: &SealedFile) {
    if let Some(pos) = st
        .status
        .finalized
        .files
        .iter()
        .position(|f| f.path == file.path)
    {
        st.status.finalized.remove(pos);
    } else {
        warn!(file = %file.base_name, "Dispatched file vanished from the queue");
    }
    st.attempts = 0;
    st.retry_at = None;
}

fn discard_poison(inner: &Inner, file: &SealedFile) {
    if inner.config.quarantine_poisoned {
        let quarantine = inner.config.quarantine_dir();
        let target = quarantine.join(&file.base_name);
        let moved = inner
            .fs
            .create_dir_all(&quarantine)
            .and_then(|()| inner.fs.rename(&file.path, &target));
        match moved {
            Ok(()) => info!(file = %file.base_name, "Quarantined poison file"),
            Err(e) => error!(file = %file.base_name, error = %e, "Failed to quarantine poison file"),
        }
    } else if let Err(e) = inner.fs.remove(&file.path)
        && !e.is_not_found()
    {
        error!(file = %file.base_name, error = %e, "Failed to remove poison file");
    }
}
