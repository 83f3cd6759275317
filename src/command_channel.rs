//! Command channel: the shared record an operator flips to request a capture.
//!
//! Components:
//! - `channel`: the [`CommandChannel`] trait and the [`Subscription`] stream.
//! - `types`: the record, snapshots and partial updates.
//! - `file_channel`: a JSON-document implementation polled on the local filesystem.

pub mod channel;
pub mod file_channel;
pub mod types;

pub use channel::{CommandChannel, Subscription};
pub use file_channel::FileCommandChannel;
pub use types::{ChangeKind, CommandRecord, CommandUpdate, Snapshot};
