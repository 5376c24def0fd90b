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

//! Single-writer current-file lifecycle: open, append, seal.
//!
//! At most one current file exists per queue instance. Pushes append to
//! it; the finalize policy is consulted before the append (so an aged
//! file is sealed rather than receiving the new message) and after (so
//! a size trigger seals the file the message just landed in).
//!
//! Sealing is the atomic handoff: flush and close the handle, rename
//! `current-X.bin` to `finalized-X.bin` within the directory, then push
//! the sealed entry onto the FIFO under the status lock. The sealed
//! timestamp is bumped past any FIFO tail or on-disk collision so
//! sealed names stay unique and strictly increasing even across clock
//! skew.
//!
//! Lock order is always the current-file mutex first, the status cell
//! second.

use std::path::PathBuf;

use bytes::Bytes;
use parking_lot::MutexGuard;
use snafu::ensure;
use tracing::{debug, info, warn};

use crate::{
    clock::Timestamp,
    error::{InternalSnafu, Result, ShutdownSnafu},
    fs::AppendFile,
    naming,
    policy::AppendFormat,
    purge,
    queue::Inner,
    status::{SealedFile, StatusInner},
};

/// The in-progress append-only file. Owned behind `Inner::current`.
pub(crate) struct CurrentFile {
    pub base_name: String,
    pub path:      PathBuf,
    pub opened_at: Timestamp,
    pub file:      Box<dyn AppendFile>,
}

pub(crate) fn push(inner: &Inner, message: Bytes) -> Result<()> {
    let mut current = inner.current.lock();

    let now = inner.clock.now();

    // An aged-out current file is sealed before the new message, not
    // after it has already landed in the wrong file.
    let seal_before_append = {
        let st = inner.cell.lock();
        ensure!(!st.shutdown, ShutdownSnafu);
        current.is_some() && inner.config.finalize.should_finalize(&st.status, now)
    };
    if seal_before_append {
        seal(inner, &mut current)?;
    }

    ensure_open(inner, &mut current, now)?;
    let Some(open) = current.as_mut() else {
        return InternalSnafu {
            message: "current file missing after open".to_string(),
        }
        .fail();
    };

    let format = AppendFormat {
        separator: inner.config.separator.clone(),
    };
    let size = format.message_size_in_bytes(&message);

    // Status is only updated after the write succeeds, so a failed
    // write never counts its bytes.
    format.append_to_file(open.file.as_mut(), &message)?;

    let should_seal = {
        let mut st = inner.cell.lock();
        st.status.appended_file_size += size;
        inner.config.finalize.should_finalize(&st.status, now)
    };
    if should_seal {
        seal(inner, &mut current)?;
    }

    Ok(())
}

fn ensure_open(
    inner: &Inner,
    current: &mut MutexGuard<'_, Option<CurrentFile>>,
    now: Timestamp,
) -> Result<()> {
    if current.is_some() {
        return Ok(());
    }

    let base_name = naming::current_file_name(now);
    let path = inner.config.dir.join(&base_name);
    let file = inner.fs.open_append(&path)?;
    debug!(file = %base_name, "Opened current file");

    **current = Some(CurrentFile {
        base_name: base_name.clone(),
        path,
        opened_at: now,
        file,
    });

    let mut st = inner.cell.lock();
    st.status.appended_file_size = 0;
    st.status.appended_file_timestamp = Some(now);
    st.current_name = Some(base_name);
    Ok(())
}

/// Seal the current file, if one is open.
///
/// On a rename failure the embedded timestamp is bumped and the rename
/// retried once; after a second failure the error surfaces and the file
/// stays under its current name for the next recovery scan.
pub(crate) fn seal(
    inner: &Inner,
    current: &mut MutexGuard<'_, Option<CurrentFile>>,
) -> Result<()> {
    let Some(mut open) = current.take() else {
        return Ok(());
    };

    let flushed = open.file.flush();
    drop(open.file);

    let mut st = inner.cell.lock();
    if let Err(e) = flushed {
        clear_appended(&mut st);
        inner.cell.notify_all();
        return Err(e);
    }

    let size = st.status.appended_file_size;
    let mut created_at = open.opened_at;

    // Sealed names must stay strictly increasing; a backwards clock
    // jump or a same-millisecond seal bumps until they do.
    if let Some(tail) = st.status.finalized.files.back()
        && created_at <= tail.created_at
    {
        created_at = tail.created_at + 1;
    }
    while inner
        .fs
        .exists(&inner.config.dir.join(naming::finalized_file_name(created_at)))
    {
        created_at += 1;
    }

    let mut sealed_name = naming::finalized_file_name(created_at);
    let mut sealed_path = inner.config.dir.join(&sealed_name);
    if let Err(first) = inner.fs.rename(&open.path, &sealed_path) {
        created_at += 1;
        sealed_name = naming::finalized_file_name(created_at);
        sealed_path = inner.config.dir.join(&sealed_name);
        if inner.fs.rename(&open.path, &sealed_path).is_err() {
            clear_appended(&mut st);
            inner.cell.notify_all();
            return Err(first);
        }
        warn!(file = %sealed_name, "Sealed under a bumped name after rename failure");
    }

    info!(file = %sealed_name, size, "Sealed current file");
    st.status.finalized.push_back(SealedFile {
        base_name: sealed_name,
        path: sealed_path,
        created_at,
        size,
    });
    clear_appended(&mut st);
    purge::run(inner, &mut st);
    inner.cell.notify_all();
    Ok(())
}

fn clear_appended(st: &mut StatusInner) {
    st.status.appended_file_size = 0;
    st.status.appended_file_timestamp = None;
    st.current_name = None;
}
