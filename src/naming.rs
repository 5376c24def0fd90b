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

//! File naming scheme.
//!
//! Two disjoint name families distinguish in-progress from sealed files:
//!
//! - `current-<timestamp>.bin` — the file being appended to.
//! - `finalized-<timestamp>.bin` — sealed, immutable, awaiting dispatch.
//!
//! The timestamp is the opening time of the underlying current file,
//! zero-padded to 20 decimal digits so lexicographic order equals numeric
//! order for the full `u64` range. Parsing is strict: wrong prefix, wrong
//! width, non-digit characters, or a wrong suffix all reject the name, so
//! unrelated files in the working directory are left alone.

use crate::clock::Timestamp;

const CURRENT_PREFIX: &str = "current-";
const FINALIZED_PREFIX: &str = "finalized-";
const SUFFIX: &str = ".bin";

/// Digits in the zero-padded timestamp; fits every `u64`.
const TIMESTAMP_WIDTH: usize = 20;

pub fn current_file_name(timestamp: Timestamp) -> String {
    format!("{CURRENT_PREFIX}{timestamp:020}{SUFFIX}")
}

pub fn finalized_file_name(timestamp: Timestamp) -> String {
    format!("{FINALIZED_PREFIX}{timestamp:020}{SUFFIX}")
}

pub fn parse_current_file_name(name: &str) -> Option<Timestamp> {
    parse_with_prefix(CURRENT_PREFIX, name)
}

pub fn parse_finalized_file_name(name: &str) -> Option<Timestamp> {
    parse_with_prefix(FINALIZED_PREFIX, name)
}

fn parse_with_prefix(prefix: &str, name: &str) -> Option<Timestamp> {
    let digits = name.strip_prefix(prefix)?.strip_suffix(SUFFIX)?;
    if digits.len() != TIMESTAMP_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
