//! The reconciliation loop.
//!
//! A single consumer drains the subscription, asks the
//! [`SubscriptionHandler`] what each snapshot means and runs admitted cycles
//! one at a time on a worker task. The loop keeps receiving while a cycle is
//! in flight so follow-up requests are coalesced instead of piling up in the
//! channel.
//!
//! ```text
//! ┌──────────────┐  snapshots  ┌──────────────┐  Start  ┌──────────────┐
//! │ Subscription │────────────▶│  Reconciler  │────────▶│ CaptureCycle │
//! └──────────────┘  (bounded)  │  + Handler   │◀────────│  (one task)  │
//!                              └──────────────┘  report └──────────────┘
//! ```
//!
//! Cancelling the shutdown token stops intake, discards any pending follow-up
//! and waits for the running cycle before the subscription is released.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::cycle::{CaptureCycle, CycleOutcome, CycleReport};
use super::subscription::{SubscriptionHandler, Verdict};
use crate::command_channel::channel::Subscription;
use crate::command_channel::types::Snapshot;
use crate::configuration::types::FailureAction;

/// Counters accumulated over one run of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles_started: u64,
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    pub retries: u64,
    pub snapshots_ignored: u64,
    pub snapshots_duplicate: u64,
    pub snapshots_coalesced: u64,
    pub requests_dropped: u64,
}

struct InFlight {
    trigger: Snapshot,
    attempt: u32,
    handle: JoinHandle<CycleReport>,
}

struct ScheduledRetry {
    trigger: Snapshot,
    attempt: u32,
    at: Instant,
}

async fn join_in_flight(in_flight: &mut Option<InFlight>) -> Result<CycleReport, JoinError> {
    match in_flight {
        Some(running) => (&mut running.handle).await,
        None => std::future::pending().await,
    }
}

async fn wait_for_retry(retry: &Option<ScheduledRetry>) {
    match retry {
        Some(scheduled) => tokio::time::sleep_until(scheduled.at).await,
        None => std::future::pending().await,
    }
}

pub struct Reconciler {
    cycle: Arc<CaptureCycle>,
    handler: SubscriptionHandler,
    summary: RunSummary,
}

impl Reconciler {
    pub fn new(cycle: Arc<CaptureCycle>) -> Self {
        Self {
            cycle,
            handler: SubscriptionHandler::new(),
            summary: RunSummary::default(),
        }
    }

    fn start(&mut self, trigger: Snapshot, attempt: u32) -> InFlight {
        self.summary.cycles_started += 1;
        if attempt > 1 {
            self.summary.retries += 1;
        }
        let cycle = Arc::clone(&self.cycle);
        let snapshot = trigger.clone();
        let handle = tokio::spawn(async move { cycle.run(&snapshot, attempt).await });
        InFlight {
            trigger,
            attempt,
            handle,
        }
    }

    fn stop_intake(&mut self, retry: &mut Option<ScheduledRetry>) {
        if let Some(pending) = self.handler.drop_pending() {
            warn!(
                "Dropping follow-up request (rev {}) on shutdown",
                pending.update_time
            );
            self.summary.requests_dropped += 1;
        }
        if let Some(scheduled) = retry.take() {
            warn!(
                "Dropping retry {} of request (rev {}) on shutdown",
                scheduled.attempt, scheduled.trigger.update_time
            );
            self.summary.requests_dropped += 1;
        }
    }

    fn record(&mut self, report: &CycleReport) {
        if report.succeeded() {
            self.summary.cycles_succeeded += 1;
        } else {
            self.summary.cycles_failed += 1;
        }
    }

    /// Consumes snapshots until `shutdown` is cancelled or the subscription
    /// ends, then drains the in-flight cycle and releases the subscription.
    pub async fn run(
        mut self,
        mut subscription: Subscription,
        shutdown: CancellationToken,
    ) -> RunSummary {
        let mut in_flight: Option<InFlight> = None;
        let mut retry: Option<ScheduledRetry> = None;
        let mut accepting = true;

        info!("Reconciliation loop started");
        loop {
            if !accepting && in_flight.is_none() {
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled(), if accepting => {
                    info!("Shutdown requested, no longer accepting requests");
                    accepting = false;
                    self.stop_intake(&mut retry);
                }

                joined = join_in_flight(&mut in_flight) => {
                    let finished = in_flight.take();
                    match joined {
                        Ok(report) => {
                            self.record(&report);
                            let backoff = match report.outcome {
                                CycleOutcome::Failed {
                                    action: FailureAction::Retry(backoff),
                                    ..
                                } => Some(backoff),
                                _ => None,
                            };
                            if let (Some(backoff), Some(finished)) = (backoff, finished) {
                                retry = Some(ScheduledRetry {
                                    trigger: finished.trigger,
                                    attempt: finished.attempt + 1,
                                    at: Instant::now() + backoff,
                                });
                            }
                        }
                        Err(e) => {
                            error!("Capture cycle task ended abnormally: {}", e);
                            self.summary.cycles_failed += 1;
                        }
                    }

                    if let Some(next) = self.handler.finish() {
                        if retry.take().is_some() {
                            info!("Newer request supersedes scheduled retry");
                        }
                        info!("Starting follow-up cycle (rev {})", next.update_time);
                        in_flight = Some(self.start(next, 1));
                    } else if !accepting {
                        self.stop_intake(&mut retry);
                    }
                }

                _ = wait_for_retry(&retry), if in_flight.is_none() && accepting => {
                    if let Some(scheduled) = retry.take() {
                        self.handler.resume();
                        in_flight = Some(self.start(scheduled.trigger, scheduled.attempt));
                    }
                }

                received = subscription.recv(), if accepting => {
                    match received {
                        None => {
                            warn!("Command subscription closed");
                            accepting = false;
                            self.stop_intake(&mut retry);
                        }
                        Some(snapshot) => match self.handler.observe(snapshot) {
                            Verdict::Start(trigger) => {
                                if retry.take().is_some() {
                                    info!("Newer request supersedes scheduled retry");
                                }
                                in_flight = Some(self.start(trigger, 1));
                            }
                            Verdict::Coalesced => self.summary.snapshots_coalesced += 1,
                            Verdict::Duplicate => self.summary.snapshots_duplicate += 1,
                            Verdict::Ignored => self.summary.snapshots_ignored += 1,
                        },
                    }
                }
            }
        }

        subscription.close().await;
        info!("Reconciliation loop stopped: {:?}", self.summary);
        self.summary
    }
}
