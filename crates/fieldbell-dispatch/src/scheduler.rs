//! Dispatch scheduler — fixed-interval tick loop with a single-flight
//! guard. Ticks never overlap; a tick that would start while the previous
//! one is in flight is skipped outright, not queued.

use fieldbell_core::config::DispatchConfig;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::dispatcher::NotificationDispatcher;
use crate::liveness::GroupLivenessChecker;

/// Drives the dispatcher every tick and the liveness checker on a coarse
/// wall-clock window.
pub struct DispatchScheduler {
    dispatcher: Arc<NotificationDispatcher>,
    liveness: Arc<GroupLivenessChecker>,
    config: DispatchConfig,
    /// Compare-and-set single-flight flag, not a bare boolean: safe even
    /// if the runtime schedules ticks on different threads.
    in_flight: AtomicBool,
    last_liveness: Mutex<Option<Instant>>,
}

impl DispatchScheduler {
    pub fn new(
        dispatcher: Arc<NotificationDispatcher>,
        liveness: Arc<GroupLivenessChecker>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            dispatcher,
            liveness,
            config,
            in_flight: AtomicBool::new(false),
            last_liveness: Mutex::new(None),
        }
    }

    /// Run one tick. Returns false when a previous tick was still in
    /// flight and this one was skipped.
    pub async fn tick(&self) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("⚠️ Previous tick still running, skipping");
            return false;
        }

        // Errors stay inside the tick; the cadence never changes because
        // of a failed pass. Per-message retry is simply the next tick.
        if self.liveness_due() {
            if let Err(e) = self.liveness.verify_all().await {
                tracing::error!("❌ Group liveness sweep failed: {e}");
            }
        }
        match self.dispatcher.run_once().await {
            Ok(report) if report.sent > 0 || report.failed > 0 => {
                tracing::info!(
                    "📣 Tick done: {} sent, {} failed, {} skipped",
                    report.sent,
                    report.failed,
                    report.skipped
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("❌ Dispatch pass failed: {e}");
            }
        }

        self.in_flight.store(false, Ordering::Release);
        true
    }

    /// Coarse liveness gate: at most one sweep per configured window.
    fn liveness_due(&self) -> bool {
        let mut last = self.last_liveness.lock().unwrap();
        let window = std::time::Duration::from_secs(self.config.liveness_window_secs);
        match *last {
            Some(at) if at.elapsed() < window => false,
            _ => {
                *last = Some(Instant::now());
                true
            }
        }
    }

    /// Tick until the shutdown signal flips. The in-flight tick always
    /// finishes; only future ticks are cancelled.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let period = std::time::Duration::from_secs(self.config.tick_secs.max(1));
        let mut interval = tokio::time::interval(period);
        tracing::info!("⏰ Dispatch scheduler started (tick every {}s)", period.as_secs());

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("⏹️ Dispatch scheduler stopped");
                        return;
                    }
                }
            }
        }
    }
}
