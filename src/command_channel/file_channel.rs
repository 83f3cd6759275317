//! File-backed command channel.
//!
//! The command record is a small JSON document on local (or network-mounted)
//! storage:
//!
//! ```json
//! { "is_requested": true, "last_processed": "2026-10-18T08:00:00Z" }
//! ```
//!
//! Subscriptions poll the file and turn observed differences into snapshots;
//! the file's modification time is the document revision. Updates are
//! read-modify-write cycles persisted through an atomic rename so a watcher
//! never observes a half-written document.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, trace, warn};
use tempfile::NamedTempFile;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::channel::{CommandChannel, Subscription};
use super::types::{ChangeKind, CommandRecord, CommandUpdate, Snapshot};
use crate::configuration::types::CommandConfig;
use crate::error_handling::types::PersistenceError;

pub struct FileCommandChannel {
    path: PathBuf,
    poll_interval: Duration,
    buffer: usize,
    write_lock: Mutex<()>,
}

/// Document contents paired with its revision.
type Versioned = (CommandRecord, DateTime<Utc>);

impl FileCommandChannel {
    pub fn new<P: AsRef<Path>>(path: P, poll_interval: Duration, buffer: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            poll_interval,
            buffer: buffer.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &CommandConfig) -> Self {
        Self::new(
            &config.document,
            Duration::from_millis(config.poll_interval_ms),
            config.buffer,
        )
    }
}

async fn load(path: &Path) -> Result<Option<Versioned>, PersistenceError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PersistenceError::ReadFailed(format!(
                "{}: {}",
                path.display(),
                e
            )))
        }
    };
    let modified = tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .map_err(|e| PersistenceError::ReadFailed(format!("{}: {}", path.display(), e)))?;

    let record: CommandRecord = serde_json::from_slice(&bytes)
        .map_err(|e| PersistenceError::Malformed(format!("{}: {}", path.display(), e)))?;
    Ok(Some((record, DateTime::<Utc>::from(modified))))
}

fn store(path: &Path, record: &CommandRecord) -> Result<(), PersistenceError> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let body = serde_json::to_vec_pretty(record)
        .map_err(|e| PersistenceError::WriteFailed(e.to_string()))?;

    let mut tmp = NamedTempFile::new_in(&dir)
        .map_err(|e| PersistenceError::WriteFailed(format!("{}: {}", dir.display(), e)))?;
    tmp.write_all(&body)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| PersistenceError::WriteFailed(format!("{}: {}", path.display(), e)))?;
    tmp.persist(path)
        .map_err(|e| PersistenceError::WriteFailed(format!("{}: {}", path.display(), e.error)))?;
    Ok(())
}

/// Compares the previous and current document state and returns the
/// snapshot describing the transition, if any.
fn diff(
    previous: &Option<Versioned>,
    current: &Option<Versioned>,
    read_time: DateTime<Utc>,
) -> Option<Snapshot> {
    match (previous, current) {
        (None, Some((record, rev))) => Some(Snapshot {
            kind: ChangeKind::Added,
            record: Some(record.clone()),
            update_time: *rev,
            read_time,
        }),
        (Some((old, old_rev)), Some((record, rev))) if old != record || old_rev != rev => {
            Some(Snapshot {
                kind: ChangeKind::Modified,
                record: Some(record.clone()),
                update_time: *rev,
                read_time,
            })
        }
        (Some(_), None) => Some(Snapshot {
            kind: ChangeKind::Removed,
            record: None,
            update_time: read_time,
            read_time,
        }),
        _ => None,
    }
}

#[async_trait]
impl CommandChannel for FileCommandChannel {
    async fn watch(&self) -> Result<Subscription, PersistenceError> {
        // Surface unreadable documents before handing out a subscription.
        match load(&self.path).await {
            Ok(_) | Err(PersistenceError::Malformed(_)) => {}
            Err(e) => return Err(PersistenceError::SubscriptionFailed(e.to_string())),
        }

        let (tx, rx) = mpsc::channel(self.buffer);
        let cancel = CancellationToken::new();
        let path = self.path.clone();
        let poll_interval = self.poll_interval;
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last: Option<Versioned> = None;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let current = match load(&path).await {
                    Ok(c) => c,
                    Err(e) => {
                        // Usually an operator caught mid-edit; the next tick retries.
                        warn!("Skipping unreadable command document: {}", e);
                        continue;
                    }
                };

                if let Some(snapshot) = diff(&last, &current, Utc::now()) {
                    trace!(
                        "Command document {:?} (rev {})",
                        snapshot.kind,
                        snapshot.update_time
                    );
                    tokio::select! {
                        _ = token.cancelled() => break,
                        sent = tx.send(snapshot) => {
                            if sent.is_err() {
                                debug!("Snapshot receiver dropped, stopping watcher");
                                break;
                            }
                        }
                    }
                }
                last = current;
            }
            debug!("Watcher for {} stopped", path.display());
        });

        info!(
            "Watching command document {} every {:?}",
            self.path.display(),
            self.poll_interval
        );
        Ok(Subscription::new(rx, cancel, Some(task)))
    }

    async fn read(&self) -> Result<Option<CommandRecord>, PersistenceError> {
        Ok(load(&self.path).await?.map(|(record, _)| record))
    }

    async fn update(&self, update: &CommandUpdate) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;

        let mut record = match load(&self.path).await? {
            Some((record, _)) => record,
            None => {
                return Err(PersistenceError::WriteFailed(format!(
                    "command document {} does not exist",
                    self.path.display()
                )))
            }
        };
        update.apply_to(&mut record, Utc::now());

        let path = self.path.clone();
        let written = record.clone();
        tokio::task::spawn_blocking(move || store(&path, &written))
            .await
            .map_err(|e| PersistenceError::WriteFailed(e.to_string()))??;

        debug!(
            "Command document {} updated: is_requested={}",
            self.path.display(),
            record.is_requested
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok};

    fn write_doc(path: &Path, body: &str) {
        std::fs::write(path, body).unwrap();
    }

    async fn next(sub: &mut Subscription) -> Snapshot {
        timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("snapshot within deadline")
            .expect("subscription open")
    }

    #[tokio::test]
    async fn read_missing_document_is_none() {
        let dir = tempdir().unwrap();
        let channel =
            FileCommandChannel::new(dir.path().join("doc.json"), Duration::from_millis(10), 4);
        assert_eq!(assert_ok!(channel.read().await), None);
    }

    #[tokio::test]
    async fn update_missing_document_fails() {
        let dir = tempdir().unwrap();
        let channel =
            FileCommandChannel::new(dir.path().join("doc.json"), Duration::from_millis(10), 4);
        assert_err!(channel.update(&CommandUpdate::acknowledge()).await);
    }

    #[tokio::test]
    async fn acknowledge_clears_flag_and_stamps_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_doc(&path, r#"{"is_requested": true}"#);
        let channel = FileCommandChannel::new(&path, Duration::from_millis(10), 4);

        let before = Utc::now();
        assert_ok!(channel.update(&CommandUpdate::acknowledge()).await);
        let record = channel.read().await.unwrap().unwrap();

        assert!(!record.is_requested);
        assert!(record.last_processed.unwrap() >= before);
    }

    #[tokio::test]
    async fn malformed_document_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_doc(&path, "{not json");
        let channel = FileCommandChannel::new(&path, Duration::from_millis(10), 4);

        assert!(matches!(
            channel.read().await,
            Err(PersistenceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn watch_reports_added_modified_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_doc(&path, r#"{"is_requested": false}"#);
        let channel = FileCommandChannel::new(&path, Duration::from_millis(10), 4);

        let mut sub = channel.watch().await.unwrap();

        let added = next(&mut sub).await;
        assert_eq!(added.kind, ChangeKind::Added);
        assert!(!added.is_actionable());

        tokio::time::sleep(Duration::from_millis(20)).await;
        write_doc(&path, r#"{"is_requested": true}"#);
        let modified = next(&mut sub).await;
        assert_eq!(modified.kind, ChangeKind::Modified);
        assert!(modified.is_actionable());

        std::fs::remove_file(&path).unwrap();
        let removed = next(&mut sub).await;
        assert_eq!(removed.kind, ChangeKind::Removed);
        assert!(removed.record.is_none());

        sub.close().await;
    }

    #[tokio::test]
    async fn own_acknowledgment_echo_is_not_actionable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_doc(&path, r#"{"is_requested": true}"#);
        let channel = FileCommandChannel::new(&path, Duration::from_millis(10), 4);

        let mut sub = channel.watch().await.unwrap();
        assert!(next(&mut sub).await.is_actionable());

        channel.update(&CommandUpdate::acknowledge()).await.unwrap();
        let echo = next(&mut sub).await;
        assert_eq!(echo.kind, ChangeKind::Modified);
        assert!(!echo.is_actionable());

        sub.close().await;
    }

    #[test]
    fn diff_ignores_identical_state() {
        let now = Utc::now();
        let state = Some((CommandRecord::default(), now));
        assert!(diff(&state, &state.clone(), now).is_none());
        assert!(diff(&None, &None, now).is_none());
    }
}
