//! Service lifecycle notifications.
//!
//! Start, stop, unexpected exit and crash each produce one best-effort
//! notification. These paths only need the machine name and the clock, so
//! they can run alongside the monitor loop without touching its state.

use std::panic;
use std::sync::Arc;
use std::thread;

use chrono::Local;
use tracing::{error, info};

use crate::notify::{self, NotificationMessage, Notifier};

/// A process-level event worth reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The monitor started.
    Started,
    /// Graceful stop was requested.
    Stopping,
    /// The process is exiting without a graceful stop.
    Exited,
    /// An unhandled panic, with its description.
    Crashed(String),
}

impl LifecycleEvent {
    fn subject(&self) -> &'static str {
        match self {
            Self::Started => "idlewatchd started",
            Self::Stopping => "idlewatchd stopping",
            Self::Exited => "idlewatchd exited unexpectedly",
            Self::Crashed(_) => "idlewatchd crashed",
        }
    }

    /// Build the notification for this event.
    pub fn message(&self, machine: &str) -> NotificationMessage {
        let now = notify::format_timestamp(&Local::now());
        let mut body = format!("Machine: {machine}\nEvent: {}\nTime: {now}\n", self.subject());
        if let Self::Crashed(detail) = self {
            body.push_str("Details: ");
            body.push_str(detail);
            body.push('\n');
        }
        NotificationMessage::new(self.subject(), body)
    }
}

/// Log the event and attempt one notification. Never fails.
pub fn notify(notifier: &dyn Notifier, machine: &str, event: &LifecycleEvent) -> bool {
    info!("{}", event.subject());
    notify::send_best_effort(notifier, &event.message(machine))
}

/// Report panics before the default handling runs.
///
/// The previous hook still runs afterwards, so the panic is reported and
/// then handled exactly as it would have been.
pub fn install_panic_hook(notifier: Arc<dyn Notifier>, machine: String) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let detail = panic_info.to_string();
        error!("Unhandled panic: {}", detail);
        notify(notifier.as_ref(), &machine, &LifecycleEvent::Crashed(detail));
        previous(panic_info);
    }));
}

/// Sends an [`LifecycleEvent::Exited`] notification when dropped while armed.
///
/// Hold it for the lifetime of `main` and disarm it after a graceful stop;
/// an error return reports the exit. An unwind stays silent since the panic
/// hook has already reported the crash.
pub struct ExitGuard {
    notifier: Arc<dyn Notifier>,
    machine: String,
    armed: bool,
}

impl ExitGuard {
    /// Create an armed guard.
    pub fn new(notifier: Arc<dyn Notifier>, machine: String) -> Self {
        Self {
            notifier,
            machine,
            armed: true,
        }
    }

    /// Stop the guard from reporting on drop.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.armed && !thread::panicking() {
            notify(self.notifier.as_ref(), &self.machine, &LifecycleEvent::Exited);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_message_names_machine_and_event() {
        let message = LifecycleEvent::Stopping.message("desk-01");
        assert_eq!(message.subject, "idlewatchd stopping");
        assert!(message.body.contains("Machine: desk-01"));
        assert!(message.body.contains("Time: "));
        assert!(!message.body.contains("Details:"));
    }

    #[test]
    fn test_crash_message_carries_details() {
        let event = LifecycleEvent::Crashed("boom at src/main.rs:1".to_string());
        let message = event.message("desk-01");
        assert_eq!(message.subject, "idlewatchd crashed");
        assert!(message.body.contains("Details: boom at src/main.rs:1"));
    }

    #[test]
    fn test_notify_swallows_failure() {
        let notifier = RecordingNotifier::failing();
        assert!(!notify(&notifier, "desk-01", &LifecycleEvent::Started));
        assert_eq!(notifier.attempts().len(), 1);
    }

    #[test]
    fn test_exit_guard_reports_when_armed() {
        let notifier = Arc::new(RecordingNotifier::default());
        {
            let _guard = ExitGuard::new(notifier.clone(), "desk-01".to_string());
        }
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "idlewatchd exited unexpectedly");
    }

    #[test]
    fn test_panic_reports_once_and_keeps_previous_hook() {
        static PREVIOUS_HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

        // Hooks are process-wide; only count this test's own panic.
        panic::set_hook(Box::new(|info| {
            if info.payload().downcast_ref::<&str>() == Some(&"boom") {
                PREVIOUS_HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
            }
        }));
        let notifier = Arc::new(RecordingNotifier::default());
        install_panic_hook(notifier.clone(), "desk-01".to_string());

        let result: thread::Result<()> = panic::catch_unwind(AssertUnwindSafe(|| {
            let _guard = ExitGuard::new(notifier.clone(), "desk-01".to_string());
            panic!("boom");
        }));

        // Back to the default hook for the rest of the test binary.
        drop(panic::take_hook());

        assert!(result.is_err());
        assert_eq!(PREVIOUS_HOOK_CALLS.load(Ordering::SeqCst), 1);

        let sent: Vec<_> = notifier
            .sent()
            .into_iter()
            .filter(|message| message.body.contains("boom"))
            .collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "idlewatchd crashed");
        assert!(
            !notifier
                .sent()
                .iter()
                .any(|message| message.subject == "idlewatchd exited unexpectedly")
        );
    }

    #[test]
    fn test_exit_guard_silent_when_disarmed() {
        let notifier = Arc::new(RecordingNotifier::default());
        {
            let mut guard = ExitGuard::new(notifier.clone(), "desk-01".to_string());
            guard.disarm();
        }
        assert!(notifier.sent().is_empty());
    }
}
