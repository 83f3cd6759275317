//! Reconciliation subsystem.
//!
//! Turns a stream of command snapshots into capture cycles:
//! - [`SubscriptionHandler`]: filters snapshots and decides when a cycle starts.
//! - [`CaptureCycle`]: capture, upload, record, acknowledge for one request.
//! - [`Reconciler`]: the long-running loop tying the two together.
//! - `artifact`: the short-lived local file a cycle captures into.

pub mod artifact;
pub mod cycle;
pub mod reconciler;
pub mod subscription;
#[cfg(test)]
pub mod test_support;

pub use cycle::{CaptureCycle, CycleOutcome, CycleReport, CycleSettings, CycleState};
pub use reconciler::{Reconciler, RunSummary};
pub use subscription::{SubscriptionHandler, Verdict};
