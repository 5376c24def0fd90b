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

//! The consumer callback protocol.

use crate::{clock::Timestamp, status::SealedFile};

/// What the processor did with a sealed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileProcessingResult {
    /// Fully consumed; the queue deletes the file and advances.
    Success,
    /// Fully consumed and the file was deleted or moved by the
    /// processor itself; the queue only advances.
    SuccessAndMoved,
    /// The downstream is gone (e.g. the device went offline). Dispatch
    /// suspends, with no retry armed, until force processing resumes it.
    Unavailable,
    /// Transient failure; re-attempt the same file per the retry policy.
    FailureNeedRetry,
}

/// User-supplied consumer of sealed files.
///
/// Called on the queue's worker thread, one file at a time, in FIFO
/// order. The call may take as long as it needs; the queue holds no
/// locks while it runs. Delivery is at-least-once: a file that failed
/// mid-processing is offered again, so processors must be idempotent
/// per file.
///
/// A panic escaping `on_file_ready` is treated as `FailureNeedRetry`.
pub trait Processor: Send {
    fn on_file_ready(&mut self, file: &SealedFile, now: Timestamp) -> FileProcessingResult;
}

impl<F> Processor for F
where
    F: FnMut(&SealedFile, Timestamp) -> FileProcessingResult + Send,
{
    fn on_file_ready(&mut self, file: &SealedFile, now: Timestamp) -> FileProcessingResult {
        self(file, now)
    }
}
