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

//! Filesystem adapter.
//!
//! The queue touches disk only through [`FileSystem`], which keeps the
//! directory primitives injectable. The production implementation is a
//! thin wrapper over `std::fs`; renames are atomic within a directory,
//! which is the durability point the seal algorithm relies on.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
};

use snafu::ResultExt;

use crate::error::{IoAtSnafu, Result};

/// An open append-only file handle.
///
/// `flush` durably syncs written data; it is called once at seal time,
/// not per record.
pub trait AppendFile: Send {
    fn append(&mut self, data: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Directory and file primitives required by the queue.
pub trait FileSystem: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Invoke `on_entry` with the base name of every plain file directly
    /// inside `path`. Subdirectories are skipped.
    fn scan_dir(&self, path: &Path, on_entry: &mut dyn FnMut(&str)) -> Result<()>;

    fn file_size(&self, path: &Path) -> Result<u64>;

    /// Atomic within a directory.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn remove(&self, path: &Path) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn open_append(&self, path: &Path) -> Result<Box<dyn AppendFile>>;
}

/// Production adapter over `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileSystem;

struct StdAppendFile {
    file: File,
    path: std::path::PathBuf,
}

impl AppendFile for StdAppendFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data).context(IoAtSnafu {
            path: self.path.clone(),
        })
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_data().context(IoAtSnafu {
            path: self.path.clone(),
        })
    }
}

impl FileSystem for StdFileSystem {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).context(IoAtSnafu { path })
    }

    fn scan_dir(&self, path: &Path, on_entry: &mut dyn FnMut(&str)) -> Result<()> {
        for entry in std::fs::read_dir(path).context(IoAtSnafu { path })? {
            let entry = entry.context(IoAtSnafu { path })?;
            let file_type = entry.file_type().context(IoAtSnafu { path })?;
            if !file_type.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                on_entry(name);
            }
        }
        Ok(())
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        Ok(std::fs::metadata(path).context(IoAtSnafu { path })?.len())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        std::fs::rename(from, to).context(IoAtSnafu { path: from })
    }

    fn remove(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path).context(IoAtSnafu { path })
    }

    fn exists(&self, path: &Path) -> bool { path.exists() }

    fn open_append(&self, path: &Path) -> Result<Box<dyn AppendFile>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context(IoAtSnafu { path })?;
        Ok(Box::new(StdAppendFile {
            file,
            path: path.to_path_buf(),
        }))
    }
}
