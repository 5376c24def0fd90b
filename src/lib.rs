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

//! Durable, local, filesystem-backed message queue.
//!
//! Buffers outbound records between a fast producer and a slow,
//! possibly-unavailable consumer (an uploader, typically). Messages are
//! appended to a current file; policy triggers seal it with an atomic
//! rename and hand it to a user-supplied [`Processor`] on a dedicated
//! worker thread. Sealed files survive restarts and replay in arrival
//! order.
//!
//! Features:
//! - At-least-once, FIFO delivery with one sealed file as the unit
//! - Size- and age-based sealing, with relaxed thresholds under backlog
//! - Crash recovery: sealed files re-queued, leftover current files
//!   adopted or sealed, never dropped
//! - Exponential retry backoff, suspension on downstream unavailability
//! - Quota-driven purge of the oldest sealed files
//!
//! ## Usage
//!
//! ```ignore
//! use spoolq::{FileProcessingResult, QueueBuilder};
//!
//! let queue = QueueBuilder::new("/var/spool/uploads")
//!     .separator("\n")
//!     .build(|file: &spoolq::SealedFile, _now| {
//!         match upload(&file.path) {
//!             Ok(()) => FileProcessingResult::Success,
//!             Err(_) => FileProcessingResult::FailureNeedRetry,
//!         }
//!     })?;
//!
//! queue.push("record")?;
//! ```

mod appender;
mod purge;
mod worker;

pub mod builder;
pub mod clock;
pub mod config;
pub mod error;
pub mod fs;
pub mod naming;
pub mod policy;
pub mod processor;
pub mod queue;
pub mod retry;
pub mod status;

pub use builder::QueueBuilder;
pub use clock::{Clock, ManualClock, SystemClock, TimeSpan, Timestamp};
pub use config::QueueConfig;
pub use error::{Error, Result};
pub use fs::{AppendFile, FileSystem, StdFileSystem};
pub use policy::{AppendFormat, FinalizePolicy, PurgePolicy};
pub use processor::{FileProcessingResult, Processor};
pub use queue::Queue;
pub use retry::{GiveUpAction, RetryDecision, RetryPolicy};
pub use status::{FinalizedStatus, QueueStatus, SealedFile};
