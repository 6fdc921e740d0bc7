//! Response-timeout worker.
//!
//! Periodically scans for shipments whose offer or broadcast sat unanswered
//! for `T_resp` and escalates them:
//!
//! 1. `02` (waiting on a grade) → `BC`: the blamed vendor joins the
//!    rejected set and every vendor *outside* the timed-out grade is told
//!    the shipment is open.
//! 2. `BC` (open broadcast) → `HD`: parked for dispatcher attention;
//!    dispatchers are notified.
//!
//! Each shipment transitions in its own store transaction; a failure is
//! logged and the tick moves on. Missed or repeated ticks are harmless —
//! the lifecycle guard re-checks state under the row lock, so an already
//! escalated or freshly confirmed shipment simply refuses the event.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fdk_db::DispatchStore;
use fdk_lifecycle::Event;
use fdk_notify::{push_all, Notification, Notifier};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// `T_resp`: a shipment with `assigned_at ≤ now − response_timeout` is
    /// expired (boundary inclusive).
    pub response_timeout: chrono::Duration,
    /// Scan period.
    pub tick: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            response_timeout: chrono::Duration::minutes(30),
            tick: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// TickReport
// ---------------------------------------------------------------------------

/// What one scan did; returned by [`TimeoutWorker::run_tick`] for tests and
/// logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// `02` shipments escalated to broadcast.
    pub escalated: usize,
    /// Broadcasts parked for dispatcher attention.
    pub parked: usize,
    /// Shipments skipped because their transition failed; they will be
    /// re-examined next tick if still eligible.
    pub failures: usize,
}

// ---------------------------------------------------------------------------
// TimeoutWorker
// ---------------------------------------------------------------------------

pub struct TimeoutWorker<S> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
    config: WorkerConfig,
}

impl<S: DispatchStore + 'static> TimeoutWorker<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>, config: WorkerConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Run one scan at `now`. Public so tests drive ticks with a
    /// deterministic clock.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let cutoff = now - self.config.response_timeout;
        let mut report = TickReport::default();

        // ── Expired grade offers: 02 → BC ────────────────────────────────
        let expired = match self.store.list_expired_waiting(cutoff).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "expired-offer scan failed; retrying next tick");
                return report;
            }
        };
        for shipment in expired {
            let Some(grade) = shipment.current_grade_to_assign else {
                warn!(shipid = %shipment.shipid, "expired offer has no grade; skipping");
                report.failures += 1;
                continue;
            };
            // Blame the vendor that held the slot when known, otherwise the
            // grade's deterministic representative.
            let blamed = match &shipment.vencode {
                Some(v) => Some(v.clone()),
                None => match self.store.first_vendor_by_grade(grade).await {
                    Ok(v) => v.map(|v| v.vencode),
                    Err(e) => {
                        warn!(shipid = %shipment.shipid, error = %e, "blame lookup failed");
                        report.failures += 1;
                        continue;
                    }
                },
            };
            let Some(blamed_vencode) = blamed else {
                warn!(shipid = %shipment.shipid, grade = %grade, "no vendor to blame; skipping");
                report.failures += 1;
                continue;
            };

            match self
                .store
                .apply_event(
                    &shipment.shipid,
                    &Event::Timeout02 { blamed_vencode },
                    now,
                )
                .await
            {
                Ok(_) => {
                    report.escalated += 1;
                    info!(shipid = %shipment.shipid, grade = %grade, "offer expired, broadcasting");
                    if let Ok(tokens) = self.store.vendor_tokens_not_of_grade(grade).await {
                        push_all(
                            self.notifier.as_ref(),
                            &tokens,
                            &Notification::new(
                                "Shipment open for booking",
                                format!("Shipment {} is open for any vendor", shipment.shipid),
                            )
                            .with_data("shipid", shipment.shipid.as_str()),
                        )
                        .await;
                    }
                }
                Err(e) => {
                    // Typically a race: the vendor confirmed between scan
                    // and lock. The guard already protected the row.
                    debug!(shipid = %shipment.shipid, error = %e, "escalation skipped");
                    report.failures += 1;
                }
            }
        }

        // ── Expired broadcasts: BC → HD ──────────────────────────────────
        let expired_bc = match self.store.list_expired_broadcast(cutoff).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "expired-broadcast scan failed; retrying next tick");
                return report;
            }
        };
        for shipment in expired_bc {
            match self
                .store
                .apply_event(&shipment.shipid, &Event::TimeoutBroadcast, now)
                .await
            {
                Ok(_) => {
                    report.parked += 1;
                    info!(shipid = %shipment.shipid, "broadcast expired, parked");
                    if let Ok(tokens) = self.store.dispatcher_tokens().await {
                        push_all(
                            self.notifier.as_ref(),
                            &tokens,
                            &Notification::new(
                                "Shipment needs attention",
                                format!(
                                    "Shipment {} received no response and was parked",
                                    shipment.shipid
                                ),
                            )
                            .with_data("shipid", shipment.shipid.as_str()),
                        )
                        .await;
                    }
                }
                Err(e) => {
                    debug!(shipid = %shipment.shipid, error = %e, "parking skipped");
                    report.failures += 1;
                }
            }
        }

        report
    }

    /// Start the periodic scan loop; the returned handle stops it.
    pub fn spawn(self) -> WorkerHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.run_tick(Utc::now()).await;
                        if report != TickReport::default() {
                            info!(
                                escalated = report.escalated,
                                parked = report.parked,
                                failures = report.failures,
                                "timeout scan"
                            );
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        });
        WorkerHandle { stop_tx, join }
    }
}

// ---------------------------------------------------------------------------
// WorkerHandle
// ---------------------------------------------------------------------------

pub struct WorkerHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the loop to stop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.join.await;
    }
}
