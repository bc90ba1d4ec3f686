//! Idle episode state machine.
//!
//! Turns a stream of idle samples into at most one alert per idle episode:
//! - An episode starts on the first sample at or above the threshold
//! - The alert is attempted on every tick of the episode until it is delivered
//! - The episode ends on the first sample below the threshold, dropping any
//!   undelivered alert

use chrono::{DateTime, Local, TimeDelta};

/// Seconds since the last keyboard or mouse input, as reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct IdleSample(u64);

impl IdleSample {
    /// A sample meaning "input just happened".
    pub const ZERO: Self = Self(0);

    /// Create a sample from whole seconds.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Create a sample from milliseconds, truncating to whole seconds.
    pub fn from_millis(millis: u64) -> Self {
        Self(millis / 1000)
    }

    /// Idle duration in seconds.
    pub fn as_secs(self) -> u64 {
        self.0
    }
}

/// What the caller has to do after feeding a sample to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Still active, nothing to do.
    Unchanged,
    /// The alert for this episode is due. `began` is set on the tick that
    /// opened the episode.
    AlertDue { began: bool },
    /// Still idle and the alert already went out.
    AlertAlreadySent,
    /// The user came back; the episode is over.
    Resumed,
}

/// Episode state carried between ticks.
///
/// `alert_sent` is only ever set while idle, and `idle_since` is present
/// exactly while idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EpisodeState {
    is_idle: bool,
    alert_sent: bool,
    idle_since: Option<DateTime<Local>>,
}

impl EpisodeState {
    /// Whether the user is currently considered idle.
    pub fn is_idle(&self) -> bool {
        self.is_idle
    }

    /// Whether the alert for the current episode has been delivered.
    pub fn alert_sent(&self) -> bool {
        self.alert_sent
    }

    /// Estimated start of the current episode.
    pub fn idle_since(&self) -> Option<DateTime<Local>> {
        self.idle_since
    }

    /// Feed one sample taken at `now` and return the next state.
    ///
    /// `idle_since` is estimated once, as `now - sample`, on the tick that
    /// opens the episode.
    #[must_use]
    pub fn advance(
        self,
        sample: IdleSample,
        threshold_secs: u64,
        now: DateTime<Local>,
    ) -> (Self, Step) {
        if sample.as_secs() < threshold_secs {
            if self.is_idle {
                return (Self::default(), Step::Resumed);
            }
            return (self, Step::Unchanged);
        }

        if !self.is_idle {
            let idle_since = i64::try_from(sample.as_secs())
                .ok()
                .and_then(TimeDelta::try_seconds)
                .and_then(|idle| now.checked_sub_signed(idle))
                .unwrap_or(now);
            let next = Self {
                is_idle: true,
                alert_sent: false,
                idle_since: Some(idle_since),
            };
            return (next, Step::AlertDue { began: true });
        }

        if self.alert_sent {
            (self, Step::AlertAlreadySent)
        } else {
            (self, Step::AlertDue { began: false })
        }
    }

    /// Record that the alert for the current episode was delivered.
    ///
    /// Ignored while active, so a late confirmation can never mark an
    /// episode that already ended.
    #[must_use]
    pub fn alert_delivered(self) -> Self {
        if !self.is_idle {
            return self;
        }
        Self {
            alert_sent: true,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const THRESHOLD: u64 = 300;

    fn at(secs: i64) -> DateTime<Local> {
        Local.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn feed(state: EpisodeState, secs: u64, t: i64) -> (EpisodeState, Step) {
        state.advance(IdleSample::from_secs(secs), THRESHOLD, at(t))
    }

    fn assert_invariants(state: &EpisodeState) {
        assert!(!state.alert_sent() || state.is_idle());
        assert_eq!(state.idle_since().is_some(), state.is_idle());
    }

    #[test]
    fn test_initial_state_is_active() {
        let state = EpisodeState::default();
        assert!(!state.is_idle());
        assert!(!state.alert_sent());
        assert!(state.idle_since().is_none());
    }

    #[test]
    fn test_below_threshold_stays_active() {
        let (state, step) = feed(EpisodeState::default(), 299, 0);
        assert_eq!(step, Step::Unchanged);
        assert_eq!(state, EpisodeState::default());
    }

    #[test]
    fn test_threshold_opens_episode() {
        let (state, step) = feed(EpisodeState::default(), 300, 0);
        assert_eq!(step, Step::AlertDue { began: true });
        assert!(state.is_idle());
        assert!(!state.alert_sent());
        assert_eq!(state.idle_since(), Some(at(-300)));
    }

    #[test]
    fn test_idle_since_uses_sample_at_transition() {
        // Sample overshoots the threshold; the estimate follows the sample.
        let (state, _) = feed(EpisodeState::default(), 420, 0);
        assert_eq!(state.idle_since(), Some(at(-420)));

        // Later ticks never move the estimate.
        let (state, _) = feed(state, 900, 480);
        assert_eq!(state.idle_since(), Some(at(-420)));
    }

    #[test]
    fn test_undelivered_alert_is_retried() {
        let (state, _) = feed(EpisodeState::default(), 300, 0);
        let (state, step) = feed(state, 301, 1);
        assert_eq!(step, Step::AlertDue { began: false });
        let (_, step) = feed(state, 302, 2);
        assert_eq!(step, Step::AlertDue { began: false });
    }

    #[test]
    fn test_delivered_alert_is_not_repeated() {
        let (state, _) = feed(EpisodeState::default(), 300, 0);
        let state = state.alert_delivered();
        assert!(state.alert_sent());

        for tick in 1..10 {
            let (next, step) = feed(state, 300 + tick, tick as i64);
            assert_eq!(step, Step::AlertAlreadySent);
            assert_eq!(next, state);
        }
    }

    #[test]
    fn test_activity_ends_episode() {
        let (state, _) = feed(EpisodeState::default(), 300, 0);
        let state = state.alert_delivered();
        let (state, step) = feed(state, 3, 10);
        assert_eq!(step, Step::Resumed);
        assert_eq!(state, EpisodeState::default());
    }

    #[test]
    fn test_new_episode_resets_alert() {
        let (state, _) = feed(EpisodeState::default(), 300, 0);
        let state = state.alert_delivered();
        let (state, _) = feed(state, 0, 10);
        let (state, step) = feed(state, 300, 400);
        assert_eq!(step, Step::AlertDue { began: true });
        assert!(!state.alert_sent());
        assert_eq!(state.idle_since(), Some(at(100)));
    }

    #[test]
    fn test_delivery_ignored_while_active() {
        let state = EpisodeState::default().alert_delivered();
        assert_eq!(state, EpisodeState::default());
    }

    #[test]
    fn test_invariants_hold_over_mixed_sequence() {
        let samples = [0, 10, 300, 301, 302, 5, 0, 600, 601, 100, 300, 299, 300];
        let mut state = EpisodeState::default();
        let mut alerts_per_episode = Vec::new();

        for (tick, secs) in samples.into_iter().enumerate() {
            let (next, step) = feed(state, secs, tick as i64);
            state = next;
            match step {
                Step::AlertDue { began: true } => {
                    alerts_per_episode.push(1);
                    state = state.alert_delivered();
                }
                Step::AlertDue { began: false } => {
                    *alerts_per_episode.last_mut().unwrap() += 1;
                    state = state.alert_delivered();
                }
                Step::Unchanged | Step::AlertAlreadySent | Step::Resumed => {}
            }
            assert_invariants(&state);
        }

        // Four episodes, one alert each.
        assert_eq!(alerts_per_episode, vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_sample_from_millis_truncates() {
        assert_eq!(IdleSample::from_millis(299_999).as_secs(), 299);
        assert_eq!(IdleSample::from_millis(300_000).as_secs(), 300);
    }
}
