use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result entry as submitted by a cycle; the ledger assigns the timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResult {
    pub image_url: String,
    pub message: String,
    pub missing_items: Vec<String>,
}

impl NewResult {
    /// A fresh capture result: nothing has annotated it yet.
    pub fn captured(image_url: String, message: String) -> Self {
        Self {
            image_url,
            message,
            missing_items: Vec::new(),
        }
    }
}

/// Result entry as stored in the ledger. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub image_url: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub missing_items: Vec<String>,
}

impl ResultRecord {
    pub fn stamped(result: &NewResult, timestamp: DateTime<Utc>) -> Self {
        Self {
            image_url: result.image_url.clone(),
            timestamp,
            message: result.message.clone(),
            missing_items: result.missing_items.clone(),
        }
    }
}
