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

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use spoolq::{
    FileProcessingResult, FinalizePolicy, GiveUpAction, ManualClock, PurgePolicy, QueueBuilder,
    RetryPolicy, SealedFile,
};
use tempfile::TempDir;

/// One processor invocation, with the file contents read at dispatch
/// time (before the queue may delete the file).
#[derive(Debug, Clone)]
struct Call {
    base_name:  String,
    created_at: u64,
    contents:   Vec<u8>,
    at:         Instant,
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    fn record(&self, file: &SealedFile) {
        self.calls.lock().push(Call {
            base_name:  file.base_name.clone(),
            created_at: file.created_at,
            contents:   std::fs::read(&file.path).unwrap_or_default(),
            at:         Instant::now(),
        });
    }

    fn len(&self) -> usize { self.calls.lock().len() }

    fn calls(&self) -> Vec<Call> { self.calls.lock().clone() }
}

/// A finalize policy that never fires on its own.
fn never_finalize() -> FinalizePolicy {
    FinalizePolicy {
        max_file_size:         u64::MAX,
        max_file_age:          u64::MAX,
        backlog_max_file_size: None,
        backlog_max_file_age:  None,
    }
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn queue_file_count(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_type().unwrap().is_file())
        .count()
}

#[test]
fn test_smoke() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1000));
    let recorder = Arc::new(Recorder::default());

    let queue = {
        let recorder = recorder.clone();
        QueueBuilder::new(temp_dir.path())
            .separator("\n")
            .finalize(never_finalize())
            .clock(clock.clone())
            .build(move |file: &SealedFile, _now: u64| {
                recorder.record(file);
                FileProcessingResult::Success
            })
            .unwrap()
    };

    let status = queue.queue_status();
    assert_eq!(status.appended_file_size, 0);
    assert_eq!(status.finalized.len(), 0);
    assert_eq!(status.finalized.total_size, 0);

    clock.set(1001);
    queue.push("foo").unwrap();
    clock.set(1002);
    queue.push("bar").unwrap();
    clock.set(1003);
    queue.push("baz").unwrap();

    let status = queue.queue_status();
    assert_eq!(status.appended_file_size, 12);
    assert_eq!(status.appended_file_timestamp, Some(1001));
    assert_eq!(status.finalized.len(), 0);

    clock.set(1010);
    queue.force_processing(true).unwrap();

    wait_until("the sealed file to be processed", || recorder.len() == 1);
    let call = &recorder.calls()[0];
    assert_eq!(call.base_name, "finalized-00000000000000001001.bin");
    assert_eq!(call.contents, b"foo\nbar\nbaz\n");

    wait_until("the queue to drain", || {
        let status = queue.queue_status();
        status.finalized.is_empty() && status.appended_file_size == 0
    });
    assert_eq!(queue_file_count(&temp_dir), 0);

    queue.shutdown().unwrap();
}

#[test]
fn test_size_triggered_seal() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(1000));
    let recorder = Arc::new(Recorder::default());

    let queue = {
        let recorder = recorder.clone();
        QueueBuilder::new(temp_dir.path())
            .separator("\n")
            .finalize(FinalizePolicy {
                max_file_size: 20,
                ..never_finalize()
            })
            .clock(clock.clone())
            .build(move |file: &SealedFile, _now: u64| {
                recorder.record(file);
                FileProcessingResult::Success
            })
            .unwrap()
    };

    for i in 0..10 {
        clock.set(1000 + i);
        queue.push(format!("m{:02}", i)).unwrap();
    }
    queue.force_processing(true).unwrap();

    wait_until("all bytes to reach the processor", || {
        recorder
            .calls()
            .iter()
            .map(|c| c.contents.len())
            .sum::<usize>()
            == 40
    });

    let calls = recorder.calls();
    assert!(calls.len() >= 2, "expected at least one mid-stream seal");

    // Messages arrive in push order across file boundaries.
    let replayed: Vec<u8> = calls.iter().flat_map(|c| c.contents.clone()).collect();
    let expected: Vec<u8> = (0..10).flat_map(|i| format!("m{:02}\n", i).into_bytes()).collect();
    assert_eq!(replayed, expected);

    // FIFO order equals creation order.
    let order: Vec<(u64, String)> = calls
        .iter()
        .map(|c| (c.created_at, c.base_name.clone()))
        .collect();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);

    queue.shutdown().unwrap();
}

#[test]
fn test_age_triggered_seal() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let recorder = Arc::new(Recorder::default());

    let queue = {
        let recorder = recorder.clone();
        QueueBuilder::new(temp_dir.path())
            .separator("\n")
            .finalize(FinalizePolicy {
                max_file_age: 10_000,
                ..never_finalize()
            })
            .clock(clock.clone())
            .build(move |file: &SealedFile, _now: u64| {
                recorder.record(file);
                FileProcessingResult::Success
            })
            .unwrap()
    };
    queue.queue_status();

    queue.push("first").unwrap();
    clock.set(11_000);
    queue.push("second").unwrap();

    // The aged file was sealed before the new push appended, so the new
    // message lives in a fresh current file.
    wait_until("the aged file to be processed", || recorder.len() == 1);
    let call = &recorder.calls()[0];
    assert_eq!(call.created_at, 0);
    assert_eq!(call.contents, b"first\n");

    let status = queue.queue_status();
    assert_eq!(status.appended_file_timestamp, Some(11_000));
    assert_eq!(status.appended_file_size, 7);

    queue.shutdown().unwrap();
}

#[test]
fn test_recovery_replays_in_order() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("finalized-00000000000000000500.bin"),
        b"z\n",
    )
    .unwrap();
    std::fs::write(
        temp_dir.path().join("current-00000000000000001000.bin"),
        b"a\n",
    )
    .unwrap();

    let clock = Arc::new(ManualClock::new(2000));
    let recorder = Arc::new(Recorder::default());
    let queue = {
        let recorder = recorder.clone();
        QueueBuilder::new(temp_dir.path())
            .finalize(never_finalize())
            .clock(clock.clone())
            .build(move |file: &SealedFile, _now: u64| {
                recorder.record(file);
                FileProcessingResult::Success
            })
            .unwrap()
    };

    // The pre-existing sealed file replays on its own.
    wait_until("the recovered sealed file to be processed", || {
        recorder.len() == 1
    });

    // The leftover current file was adopted, then sealed on demand.
    let status = queue.queue_status();
    assert_eq!(status.appended_file_size, 2);
    assert_eq!(status.appended_file_timestamp, Some(1000));

    queue.force_processing(true).unwrap();
    wait_until("the adopted file to be processed", || recorder.len() == 2);

    let calls = recorder.calls();
    assert_eq!(calls[0].created_at, 500);
    assert_eq!(calls[0].contents, b"z\n");
    assert_eq!(calls[1].created_at, 1000);
    assert_eq!(calls[1].contents, b"a\n");

    queue.shutdown().unwrap();
}

#[test]
fn test_unavailable_suspends_until_forced() {
    let temp_dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());

    let queue = {
        let recorder = recorder.clone();
        QueueBuilder::new(temp_dir.path())
            .finalize(FinalizePolicy {
                max_file_size: 4,
                ..never_finalize()
            })
            .build(move |file: &SealedFile, _now: u64| {
                recorder.record(file);
                if recorder.len() == 1 {
                    FileProcessingResult::Unavailable
                } else {
                    FileProcessingResult::Success
                }
            })
            .unwrap()
    };

    queue.push("aaaa").unwrap();
    queue.push("bbbb").unwrap();

    wait_until("the first dispatch", || recorder.len() == 1);

    // Suspended: nothing further is dispatched and nothing is popped.
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(recorder.len(), 1);
    let status = queue.queue_status();
    assert_eq!(status.finalized.len(), 2);

    queue.force_processing(false).unwrap();
    wait_until("the queue to drain after resume", || {
        queue.queue_status().finalized.is_empty()
    });

    // The same front file was re-dispatched after the resume.
    let calls = recorder.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].base_name, calls[1].base_name);
    assert_ne!(calls[1].base_name, calls[2].base_name);

    queue.shutdown().unwrap();
}

#[test]
fn test_retry_with_backoff() {
    let temp_dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());

    let queue = {
        let recorder = recorder.clone();
        QueueBuilder::new(temp_dir.path())
            .finalize(never_finalize())
            .retry(RetryPolicy {
                base_delay:   50,
                max_delay:    1000,
                max_attempts: None,
                give_up:      GiveUpAction::KeepAndSuspend,
            })
            .build(move |file: &SealedFile, _now: u64| {
                recorder.record(file);
                if recorder.len() <= 3 {
                    FileProcessingResult::FailureNeedRetry
                } else {
                    FileProcessingResult::Success
                }
            })
            .unwrap()
    };

    queue.push("payload").unwrap();
    queue.force_processing(true).unwrap();

    wait_until("three failures and a success", || recorder.len() == 4);

    let calls = recorder.calls();
    assert!(calls.iter().all(|c| c.base_name == calls[0].base_name));

    // Gaps honor the doubling schedule: 50ms, 100ms, 200ms.
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1].at - w[0].at).collect();
    assert!(gaps[0] >= Duration::from_millis(50), "gap {:?}", gaps[0]);
    assert!(gaps[1] >= Duration::from_millis(100), "gap {:?}", gaps[1]);
    assert!(gaps[2] >= Duration::from_millis(200), "gap {:?}", gaps[2]);

    // Exactly one file left the queue.
    wait_until("the queue to drain", || {
        queue.queue_status().finalized.is_empty()
    });
    assert_eq!(queue_file_count(&temp_dir), 0);

    queue.shutdown().unwrap();
}

#[test]
fn test_give_up_drop_quarantines_poison_file() {
    let temp_dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());

    let queue = {
        let recorder = recorder.clone();
        QueueBuilder::new(temp_dir.path())
            .finalize(never_finalize())
            .quarantine_poisoned(true)
            .retry(RetryPolicy {
                base_delay:   10,
                max_delay:    50,
                max_attempts: Some(2),
                give_up:      GiveUpAction::Drop,
            })
            .build(move |file: &SealedFile, _now: u64| {
                recorder.record(file);
                FileProcessingResult::FailureNeedRetry
            })
            .unwrap()
    };

    queue.push("poison").unwrap();
    queue.force_processing(true).unwrap();

    wait_until("the poison file to be dropped", || {
        queue.queue_status().finalized.is_empty()
    });
    assert_eq!(recorder.len(), 2);

    let call = &recorder.calls()[0];
    let quarantined = temp_dir.path().join("quarantine").join(&call.base_name);
    assert!(quarantined.exists());
    assert_eq!(std::fs::read(&quarantined).unwrap(), b"poison");

    // Quarantined files are invisible to a fresh scan.
    queue.shutdown().unwrap();
    let recorder2 = Arc::new(Recorder::default());
    let queue = {
        let recorder2 = recorder2.clone();
        QueueBuilder::new(temp_dir.path())
            .finalize(never_finalize())
            .build(move |file: &SealedFile, _now: u64| {
                recorder2.record(file);
                FileProcessingResult::Success
            })
            .unwrap()
    };
    assert!(queue.queue_status().finalized.is_empty());
    queue.shutdown().unwrap();
    assert_eq!(recorder2.len(), 0);
}

#[test]
fn test_purge_trims_oldest() {
    let temp_dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());

    let queue = {
        let recorder = recorder.clone();
        QueueBuilder::new(temp_dir.path())
            .finalize(FinalizePolicy {
                max_file_size: 4,
                ..never_finalize()
            })
            .purge(PurgePolicy {
                max_total_size: u64::MAX,
                max_file_count: 2,
            })
            .build(move |file: &SealedFile, _now: u64| {
                recorder.record(file);
                FileProcessingResult::Unavailable
            })
            .unwrap()
    };

    // The first dispatch suspends the worker; later seals overflow the
    // count quota and purge the oldest entries.
    queue.push("mm00").unwrap();
    wait_until("the worker to suspend", || recorder.len() == 1);
    std::thread::sleep(Duration::from_millis(50));

    for i in 1..4 {
        queue.push(format!("mm{}{}", i, i)).unwrap();
    }

    wait_until("purge to trim the backlog", || {
        queue.queue_status().finalized.len() == 2
    });

    let status = queue.queue_status();
    assert_eq!(status.finalized.total_size, 8);

    // The survivors are the newest two.
    let first_seen = recorder.calls()[0].base_name.clone();
    assert!(
        status
            .finalized
            .files
            .iter()
            .all(|f| f.base_name != first_seen)
    );

    queue.shutdown().unwrap();
}

#[test]
fn test_restart_preserves_unsealed_data() {
    let temp_dir = TempDir::new().unwrap();

    {
        let queue = QueueBuilder::new(temp_dir.path())
            .separator("\n")
            .finalize(never_finalize())
            .build(|_file: &SealedFile, _now: u64| FileProcessingResult::Success)
            .unwrap();
        queue.queue_status();
        queue.push("one").unwrap();
        queue.push("two").unwrap();
        queue.shutdown().unwrap();
    }

    // The unsealed current file survived the restart and is adopted.
    let recorder = Arc::new(Recorder::default());
    let queue = {
        let recorder = recorder.clone();
        QueueBuilder::new(temp_dir.path())
            .separator("\n")
            .finalize(never_finalize())
            .build(move |file: &SealedFile, _now: u64| {
                recorder.record(file);
                FileProcessingResult::Success
            })
            .unwrap()
    };

    let status = queue.queue_status();
    assert_eq!(status.appended_file_size, 8);

    queue.push("three").unwrap();
    queue.force_processing(true).unwrap();

    wait_until("all messages to replay", || recorder.len() == 1);
    assert_eq!(recorder.calls()[0].contents, b"one\ntwo\nthree\n");

    queue.shutdown().unwrap();
}

#[test]
fn test_success_and_moved_leaves_file_alone() {
    let temp_dir = TempDir::new().unwrap();
    let moved_dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());

    let queue = {
        let recorder = recorder.clone();
        let moved = moved_dir.path().to_path_buf();
        QueueBuilder::new(temp_dir.path())
            .finalize(never_finalize())
            .build(move |file: &SealedFile, _now: u64| {
                recorder.record(file);
                std::fs::rename(&file.path, moved.join(&file.base_name)).unwrap();
                FileProcessingResult::SuccessAndMoved
            })
            .unwrap()
    };

    queue.push("keep me").unwrap();
    queue.force_processing(true).unwrap();

    wait_until("the file to be processed", || recorder.len() == 1);
    wait_until("the queue to drain", || {
        queue.queue_status().finalized.is_empty()
    });

    let moved_name = recorder.calls()[0].base_name.clone();
    assert!(moved_dir.path().join(&moved_name).exists());
    assert_eq!(queue_file_count(&temp_dir), 0);

    queue.shutdown().unwrap();
}

#[test]
fn test_remove_all_files() {
    let temp_dir = TempDir::new().unwrap();

    let queue = QueueBuilder::new(temp_dir.path())
        .finalize(FinalizePolicy {
            max_file_size: 4,
            ..never_finalize()
        })
        .build(|_file: &SealedFile, _now: u64| FileProcessingResult::Unavailable)
        .unwrap();

    queue.push("aaaa").unwrap();
    queue.push("bb").unwrap();
    queue.queue_status();

    queue.remove_all_files().unwrap();

    assert_eq!(queue_file_count(&temp_dir), 0);
    let status = queue.queue_status();
    assert_eq!(status.finalized.len(), 0);
    assert_eq!(status.appended_file_size, 0);

    queue.shutdown().unwrap();
}

#[test]
fn test_processor_panic_is_retried() {
    let temp_dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());

    let queue = {
        let recorder = recorder.clone();
        QueueBuilder::new(temp_dir.path())
            .finalize(never_finalize())
            .retry(RetryPolicy {
                base_delay:   10,
                max_delay:    50,
                max_attempts: None,
                give_up:      GiveUpAction::KeepAndSuspend,
            })
            .build(move |file: &SealedFile, _now: u64| {
                recorder.record(file);
                if recorder.len() == 1 {
                    panic!("processor bug");
                }
                FileProcessingResult::Success
            })
            .unwrap()
    };

    queue.push("payload").unwrap();
    queue.force_processing(true).unwrap();

    wait_until("the panicked dispatch to be retried", || recorder.len() == 2);
    wait_until("the queue to drain", || {
        queue.queue_status().finalized.is_empty()
    });

    queue.shutdown().unwrap();
}
