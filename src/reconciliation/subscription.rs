//! Snapshot filtering and cycle admission.
//!
//! [`SubscriptionHandler`] decides, for every snapshot delivered by the
//! command channel, whether it starts a cycle. It never admits two cycles at
//! once:
//! - a request seen while a cycle runs is held as the single pending request
//!   and started once the running cycle finishes (later requests replace it);
//! - a snapshot whose revision is not newer than the latest admitted request is
//!   a re-delivery and is dropped.

use chrono::{DateTime, Utc};
use log::{debug, trace};

use crate::command_channel::types::Snapshot;

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Start a cycle for this snapshot now.
    Start(Snapshot),
    /// A cycle is running; the snapshot will trigger exactly one more.
    Coalesced,
    /// Already admitted under the same or a newer revision.
    Duplicate,
    /// Not a request (wrong kind, flag cleared, document removed).
    Ignored,
}

#[derive(Debug, Default)]
pub struct SubscriptionHandler {
    in_flight: bool,
    pending: Option<Snapshot>,
    latest_revision: Option<DateTime<Utc>>,
}

impl SubscriptionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, snapshot: Snapshot) -> Verdict {
        if !snapshot.is_actionable() {
            trace!(
                "Ignoring {:?} snapshot (rev {})",
                snapshot.kind,
                snapshot.update_time
            );
            return Verdict::Ignored;
        }

        if self
            .latest_revision
            .map_or(false, |latest| snapshot.update_time <= latest)
        {
            debug!("Duplicate request (rev {}) dropped", snapshot.update_time);
            return Verdict::Duplicate;
        }
        self.latest_revision = Some(snapshot.update_time);

        if self.in_flight {
            debug!(
                "Request (rev {}) arrived during a cycle, queued as follow-up",
                snapshot.update_time
            );
            self.pending = Some(snapshot);
            Verdict::Coalesced
        } else {
            self.in_flight = true;
            Verdict::Start(snapshot)
        }
    }

    /// Marks the running cycle finished and hands out the pending request,
    /// if any, which is then considered in flight.
    pub fn finish(&mut self) -> Option<Snapshot> {
        self.in_flight = false;
        let next = self.pending.take();
        if next.is_some() {
            self.in_flight = true;
        }
        next
    }

    /// Marks a cycle in flight without a new snapshot (retry of the last one).
    pub fn resume(&mut self) {
        self.in_flight = true;
    }

    pub fn drop_pending(&mut self) -> Option<Snapshot> {
        self.pending.take()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}
