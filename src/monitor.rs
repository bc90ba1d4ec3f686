//! The polling loop.
//!
//! Each tick samples idle time, advances the episode state and, when an
//! alert is due, sends it before the next tick is allowed to run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::episode::{EpisodeState, Step};
use crate::idle::IdleSampler;
use crate::lifecycle::{self, LifecycleEvent};
use crate::notify::{self, NotificationMessage, Notifier, NotifyError};

/// Idle monitor owning the episode state.
pub struct IdleMonitor<S> {
    sampler: S,
    notifier: Arc<dyn Notifier>,
    machine: String,
    threshold_secs: u64,
    interval: Duration,
    state: EpisodeState,
}

impl<S: IdleSampler> IdleMonitor<S> {
    /// Create a monitor in the active state.
    pub fn new(sampler: S, notifier: Arc<dyn Notifier>, machine: String, config: &Config) -> Self {
        Self {
            sampler,
            notifier,
            machine,
            threshold_secs: config.threshold_seconds,
            interval: config.check_interval(),
            state: EpisodeState::default(),
        }
    }

    /// Current episode state.
    pub fn state(&self) -> EpisodeState {
        self.state
    }

    /// Run one sample/transition/notify cycle.
    pub async fn tick(&mut self) -> Step {
        let sample = self.sampler.sample().await;
        let now = Local::now();
        trace!("Idle for {}s", sample.as_secs());

        let (next, step) = self.state.advance(sample, self.threshold_secs, now);
        self.state = next;

        match step {
            Step::AlertDue { began } => {
                if began {
                    info!(
                        "Idle episode began (no input for {}s, idle since {})",
                        sample.as_secs(),
                        self.state
                            .idle_since()
                            .map(|since| notify::format_timestamp(&since))
                            .unwrap_or_default()
                    );
                }
                self.send_alert(now).await;
            }
            Step::Resumed => info!("User active"),
            Step::AlertAlreadySent | Step::Unchanged => {}
        }

        step
    }

    async fn send_alert(&mut self, now: DateTime<Local>) {
        let Some(idle_since) = self.state.idle_since() else {
            return;
        };
        let message = notify::idle_alert(&self.machine, self.threshold_secs, idle_since, now);

        match deliver(&self.notifier, message).await {
            Ok(()) => {
                self.state = self.state.alert_delivered();
                info!("Idle alert sent");
            }
            Err(e) => warn!("Failed to send idle alert, retrying next tick: {}", e),
        }
    }

    /// Poll until `cancel` fires, then send the stop notification.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            "Idle monitor started (threshold {}s, polling every {:?})",
            self.threshold_secs, self.interval
        );

        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!("Cancellation received");
                    break;
                }

                _ = timer.tick() => {
                    self.tick().await;
                }
            }
        }

        let notifier = Arc::clone(&self.notifier);
        let machine = self.machine.clone();
        let stopped = tokio::task::spawn_blocking(move || {
            lifecycle::notify(notifier.as_ref(), &machine, &LifecycleEvent::Stopping);
        })
        .await;
        if let Err(e) = stopped {
            warn!("Stop notification task failed: {}", e);
        }
    }
}

/// Send on the blocking pool and wait for the outcome.
async fn deliver(
    notifier: &Arc<dyn Notifier>,
    message: NotificationMessage,
) -> Result<(), NotifyError> {
    let notifier = Arc::clone(notifier);
    tokio::task::spawn_blocking(move || notifier.send(&message))
        .await
        .unwrap_or_else(|e| Err(NotifyError::Task(e.to_string())))
}
