//! Data types exchanged with the command channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The well-known command record toggled by the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    #[serde(default)]
    pub is_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed: Option<DateTime<Utc>>,
}

/// Kind of change carried by a [`Snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
    Unchanged,
}

/// One notification delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub kind: ChangeKind,
    /// Document state; `None` once the document is removed.
    pub record: Option<CommandRecord>,
    /// Revision stamp of the document version this snapshot reflects.
    pub update_time: DateTime<Utc>,
    /// When the channel observed the change.
    pub read_time: DateTime<Utc>,
}

impl Snapshot {
    /// A snapshot starts a cycle only when it reports an added or modified
    /// document whose request flag is set.
    pub fn is_actionable(&self) -> bool {
        matches!(self.kind, ChangeKind::Added | ChangeKind::Modified)
            && self.record.as_ref().map_or(false, |r| r.is_requested)
    }
}

/// Value of a timestamp field in a partial update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampValue {
    /// Replaced with the channel's clock when the write is applied.
    ServerTimestamp,
}

/// Partial update of the command record; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandUpdate {
    pub is_requested: Option<bool>,
    pub last_processed: Option<TimestampValue>,
}

impl CommandUpdate {
    /// The acknowledgment written at the end of a successful cycle.
    pub fn acknowledge() -> Self {
        Self {
            is_requested: Some(false),
            last_processed: Some(TimestampValue::ServerTimestamp),
        }
    }

    /// Clears the request without claiming it was processed.
    pub fn clear_request() -> Self {
        Self {
            is_requested: Some(false),
            last_processed: None,
        }
    }

    /// Applies the update to `record`, substituting `server_time` for
    /// server-assigned timestamps.
    pub fn apply_to(&self, record: &mut CommandRecord, server_time: DateTime<Utc>) {
        if let Some(flag) = self.is_requested {
            record.is_requested = flag;
        }
        if let Some(TimestampValue::ServerTimestamp) = self.last_processed {
            record.last_processed = Some(server_time);
        }
    }
}
