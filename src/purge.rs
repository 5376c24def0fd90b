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

//! Quota-driven purge of the oldest sealed files.
//!
//! Runs after every FIFO change, with the status cell locked. Victims
//! are taken from the oldest end until the quota predicate clears. The
//! file currently handed to the processor is never a victim, and the
//! live current file is outside the FIFO entirely.

use tracing::{error, warn};

use crate::{queue::Inner, status::StatusInner};

pub(crate) fn run(inner: &Inner, st: &mut StatusInner) {
    if !inner.config.purge.should_purge(&st.status) {
        return;
    }

    let mut index = 0;
    let mut front_removed = false;
    while inner.config.purge.should_purge(&st.status) {
        let Some(candidate) = st.status.finalized.files.get(index) else {
            break;
        };
        if st.in_flight.as_deref() == Some(candidate.path.as_path()) {
            index += 1;
            continue;
        }

        let Some(victim) = st.status.finalized.remove(index) else {
            break;
        };
        front_removed |= index == 0;
        warn!(file = %victim.base_name, size = victim.size, "Purging sealed file");
        if let Err(e) = inner.fs.remove(&victim.path)
            && !e.is_not_found()
        {
            // The entry is already off the queue; the leftover file is
            // picked up again by the next recovery scan.
            error!(file = %victim.base_name, error = %e, "Failed to remove purged file");
        }
    }

    if front_removed && st.in_flight.is_none() {
        // The pending retry belonged to the old front file.
        st.attempts = 0;
        st.retry_at = None;
    }
}
