//! In-memory stand-ins for the four collaborators of a capture cycle.
//!
//! All fakes append to a shared [`Journal`] so tests can assert the order of
//! side effects across stores.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::cycle::{CaptureCycle, CycleSettings, CycleTimeouts};
use crate::command_channel::channel::{CommandChannel, Subscription};
use crate::command_channel::types::{ChangeKind, CommandRecord, CommandUpdate, Snapshot};
use crate::configuration::types::FailurePolicy;
use crate::data_capture::CaptureProvider;
use crate::error_handling::types::{DeviceError, PersistenceError, TransferError};
use crate::storage::storage_trait::{ArtifactStore, ResultLedger};
use crate::storage::types::{NewResult, ResultRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Captured,
    Uploaded(String),
    Recorded(String),
    Updated(CommandUpdate),
}

pub type Journal = Arc<Mutex<Vec<Event>>>;

fn push(journal: &Journal, event: Event) {
    journal.lock().unwrap().push(event);
}

pub struct FakeCamera {
    journal: Journal,
    fail_next: AtomicU32,
    hang: AtomicBool,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeCamera {
    fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail_next: AtomicU32::new(0),
            hang: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureProvider for FakeCamera {
    async fn capture(&self) -> Result<Vec<u8>, DeviceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        } else if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DeviceError::Busy(String::from("fake camera busy")));
        }
        push(&self.journal, Event::Captured);
        Ok(b"\xFF\xD8fake-jpeg\xFF\xD9".to_vec())
    }
}

pub struct FakeStore {
    journal: Journal,
    fail: AtomicBool,
    hang: AtomicBool,
}

impl FakeStore {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArtifactStore for FakeStore {
    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String, TransferError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransferError::WriteFailed(std::io::Error::other("fake store down")));
        }
        assert!(!bytes.is_empty());
        push(&self.journal, Event::Uploaded(path.to_string()));
        Ok(format!("https://cdn.example.com/bucket/{}", path))
    }
}

pub struct FakeLedger {
    journal: Journal,
    fail: AtomicBool,
    hang: AtomicBool,
    records: Mutex<Vec<ResultRecord>>,
}

impl FakeLedger {
    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<ResultRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultLedger for FakeLedger {
    async fn add(&self, result: &NewResult) -> Result<String, PersistenceError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(PersistenceError::WriteFailed(String::from("fake ledger down")));
        }
        let mut records = self.records.lock().unwrap();
        records.push(ResultRecord::stamped(result, Utc::now()));
        let id = format!("result-{}", records.len());
        push(&self.journal, Event::Recorded(id.clone()));
        Ok(id)
    }
}

/// Command channel whose subscription is fed by the test. Every applied
/// update is echoed back as a `Modified` snapshot, like a real document store.
pub struct FakeChannel {
    journal: Journal,
    state: Mutex<CommandRecord>,
    fail_updates: AtomicBool,
    hang_updates: AtomicBool,
    echo: mpsc::Sender<Snapshot>,
    receiver: Mutex<Option<mpsc::Receiver<Snapshot>>>,
}

impl FakeChannel {
    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    pub fn hang_updates(&self) {
        self.hang_updates.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> CommandRecord {
        self.state.lock().unwrap().clone()
    }

    pub fn set_requested(&self, requested: bool) {
        self.state.lock().unwrap().is_requested = requested;
    }

    pub fn updates(&self) -> Vec<CommandUpdate> {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Updated(u) => Some(u.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl CommandChannel for FakeChannel {
    async fn watch(&self) -> Result<Subscription, PersistenceError> {
        let receiver = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| PersistenceError::SubscriptionFailed(String::from("already watched")))?;
        Ok(Subscription::new(receiver, CancellationToken::new(), None))
    }

    async fn read(&self) -> Result<Option<CommandRecord>, PersistenceError> {
        Ok(Some(self.state()))
    }

    async fn update(&self, update: &CommandUpdate) -> Result<(), PersistenceError> {
        if self.hang_updates.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(PersistenceError::WriteFailed(String::from("fake channel down")));
        }
        let now = Utc::now();
        let record = {
            let mut state = self.state.lock().unwrap();
            update.apply_to(&mut state, now);
            state.clone()
        };
        push(&self.journal, Event::Updated(update.clone()));
        let _ = self.echo.try_send(Snapshot {
            kind: ChangeKind::Modified,
            record: Some(record),
            update_time: now,
            read_time: now,
        });
        Ok(())
    }
}

pub fn request_at(update_time: DateTime<Utc>) -> Snapshot {
    Snapshot {
        kind: ChangeKind::Modified,
        record: Some(CommandRecord {
            is_requested: true,
            last_processed: None,
        }),
        update_time,
        read_time: update_time,
    }
}

pub struct Harness {
    pub journal: Journal,
    pub camera: Arc<FakeCamera>,
    pub store: Arc<FakeStore>,
    pub ledger: Arc<FakeLedger>,
    pub channel: Arc<FakeChannel>,
    /// Feeds the channel's subscription.
    pub tx: mpsc::Sender<Snapshot>,
    pub work_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(64);
        let channel = FakeChannel {
            journal: Arc::clone(&journal),
            state: Mutex::new(CommandRecord {
                is_requested: true,
                last_processed: None,
            }),
            fail_updates: AtomicBool::new(false),
            hang_updates: AtomicBool::new(false),
            echo: tx.clone(),
            receiver: Mutex::new(Some(rx)),
        };

        Self {
            camera: Arc::new(FakeCamera::new(Arc::clone(&journal))),
            store: Arc::new(FakeStore {
                journal: Arc::clone(&journal),
                fail: AtomicBool::new(false),
                hang: AtomicBool::new(false),
            }),
            ledger: Arc::new(FakeLedger {
                journal: Arc::clone(&journal),
                fail: AtomicBool::new(false),
                hang: AtomicBool::new(false),
                records: Mutex::new(Vec::new()),
            }),
            channel: Arc::new(channel),
            journal,
            tx,
            work_dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn settings(&self, policy: FailurePolicy) -> CycleSettings {
        CycleSettings {
            work_dir: self.work_dir.path().to_path_buf(),
            prefix: String::from("camera_uploads"),
            extension: String::from("jpg"),
            message: String::from("Photo captured"),
            policy,
            timeouts: CycleTimeouts {
                capture: Duration::from_secs(5),
                upload: Duration::from_secs(5),
                write: Duration::from_secs(5),
            },
        }
    }

    /// Settings whose every external call gives up after `limit`.
    pub fn impatient(&self, policy: FailurePolicy, limit: Duration) -> CycleSettings {
        let mut settings = self.settings(policy);
        settings.timeouts = CycleTimeouts {
            capture: limit,
            upload: limit,
            write: limit,
        };
        settings
    }

    pub fn cycle_with(&self, settings: CycleSettings) -> Arc<CaptureCycle> {
        Arc::new(CaptureCycle::new(
            self.camera.clone(),
            self.store.clone(),
            self.ledger.clone(),
            self.channel.clone(),
            settings,
        ))
    }

    pub fn cycle(&self, policy: FailurePolicy) -> Arc<CaptureCycle> {
        self.cycle_with(self.settings(policy))
    }

    pub fn events(&self) -> Vec<Event> {
        self.journal.lock().unwrap().clone()
    }

    pub fn local_files(&self) -> usize {
        count_files(self.work_dir.path())
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Polls `condition` until it holds or `limit` elapses.
pub async fn wait_until<F: Fn() -> bool>(limit: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
