use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::outreach::{AttemptStatus, OutreachAttempt};

/// Position in the outreach cadence for one website.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Initial,
    Followup1,
    Followup2,
    /// Catch-all for unrecognized wire values; content generation degrades to
    /// its generic template and the sequencer never schedules it.
    #[serde(other)]
    Other,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::Followup1 => "followup1",
            Stage::Followup2 => "followup2",
            Stage::Other => "other",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutreachState {
    pub last_stage_sent: Option<Stage>,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub follow_ups_sent: u32,
}

/// Per-website follow-up cadence, keyed by domain. Eligibility checks are
/// pure; state only advances when a successful attempt is recorded, so a
/// failed send stays retryable at the same stage.
pub struct Sequencer {
    email_delay: Duration,
    max_follow_ups: u32,
    states: HashMap<String, OutreachState>,
}

impl Sequencer {
    pub fn new(email_delay: Duration, max_follow_ups: u32) -> Self {
        Sequencer {
            email_delay,
            max_follow_ups,
            states: HashMap::new(),
        }
    }

    /// The stage this domain is due for at `now`, if any.
    pub fn eligible_stage(&self, domain: &str, now: DateTime<Utc>) -> Option<Stage> {
        let state = self.states.get(domain);
        match state.and_then(|s| s.last_stage_sent) {
            None => Some(Stage::Initial),
            Some(Stage::Initial) if self.delay_elapsed(state, now) => Some(Stage::Followup1),
            Some(Stage::Followup1)
                if self.delay_elapsed(state, now)
                    && state.is_some_and(|s| s.follow_ups_sent < self.max_follow_ups) =>
            {
                Some(Stage::Followup2)
            }
            _ => None,
        }
    }

    fn delay_elapsed(&self, state: Option<&OutreachState>, now: DateTime<Utc>) -> bool {
        state
            .and_then(|s| s.last_sent_at)
            .is_none_or(|sent| now - sent >= self.email_delay)
    }

    /// Record an attempt outcome. Only sent/simulated attempts advance the
    /// cadence; recording is idempotent per (domain, stage).
    pub fn record(&mut self, domain: &str, attempt: &OutreachAttempt) {
        if attempt.status == AttemptStatus::Failed {
            return;
        }
        if attempt.stage == Stage::Other {
            return;
        }

        let state = self.states.entry(domain.to_string()).or_default();
        if state.last_stage_sent == Some(attempt.stage) {
            return;
        }

        state.last_stage_sent = Some(attempt.stage);
        state.last_sent_at = Some(attempt.sent_at);
        if matches!(attempt.stage, Stage::Followup1 | Stage::Followup2) {
            state.follow_ups_sent += 1;
        }
    }

    pub fn state(&self, domain: &str) -> Option<&OutreachState> {
        self.states.get(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(stage: Stage, status: AttemptStatus, sent_at: DateTime<Utc>) -> OutreachAttempt {
        OutreachAttempt {
            website_id: "x.com".to_string(),
            stage,
            subject: "s".to_string(),
            body: "b".to_string(),
            text: "t".to_string(),
            status,
            sent_at,
            error: None,
        }
    }

    fn sequencer() -> Sequencer {
        Sequencer::new(Duration::hours(24), 2)
    }

    #[test]
    fn fresh_domain_is_due_for_initial() {
        let seq = sequencer();
        let now = Utc::now();
        assert_eq!(seq.eligible_stage("x.com", now), Some(Stage::Initial));
    }

    #[test]
    fn eligibility_check_is_idempotent() {
        let seq = sequencer();
        let now = Utc::now();
        let first = seq.eligible_stage("x.com", now);
        let second = seq.eligible_stage("x.com", now);
        assert_eq!(first, second);
    }

    #[test]
    fn followup1_waits_for_email_delay() {
        let mut seq = sequencer();
        let sent = Utc::now();
        seq.record("x.com", &attempt(Stage::Initial, AttemptStatus::Sent, sent));

        assert_eq!(seq.eligible_stage("x.com", sent + Duration::hours(1)), None);
        assert_eq!(
            seq.eligible_stage("x.com", sent + Duration::hours(24)),
            Some(Stage::Followup1)
        );
    }

    #[test]
    fn cadence_runs_initial_then_two_followups_then_stops() {
        let mut seq = sequencer();
        let mut now = Utc::now();

        for expected in [Stage::Initial, Stage::Followup1, Stage::Followup2] {
            assert_eq!(seq.eligible_stage("x.com", now), Some(expected));
            seq.record("x.com", &attempt(expected, AttemptStatus::Sent, now));
            now += Duration::hours(25);
        }
        assert_eq!(seq.eligible_stage("x.com", now), None);
    }

    #[test]
    fn max_follow_ups_caps_followup2() {
        let mut seq = Sequencer::new(Duration::hours(24), 1);
        let mut now = Utc::now();

        seq.record("x.com", &attempt(Stage::Initial, AttemptStatus::Sent, now));
        now += Duration::hours(25);
        seq.record("x.com", &attempt(Stage::Followup1, AttemptStatus::Sent, now));
        now += Duration::hours(25);

        assert_eq!(seq.eligible_stage("x.com", now), None);
    }

    #[test]
    fn failed_attempt_does_not_advance_state() {
        let mut seq = sequencer();
        let now = Utc::now();
        seq.record("x.com", &attempt(Stage::Initial, AttemptStatus::Failed, now));
        assert_eq!(seq.eligible_stage("x.com", now), Some(Stage::Initial));
    }

    #[test]
    fn simulated_sends_advance_like_real_ones() {
        let mut seq = sequencer();
        let now = Utc::now();
        seq.record("x.com", &attempt(Stage::Initial, AttemptStatus::Simulated, now));
        assert_eq!(seq.eligible_stage("x.com", now), None);
        assert_eq!(
            seq.eligible_stage("x.com", now + Duration::hours(24)),
            Some(Stage::Followup1)
        );
    }

    #[test]
    fn domains_are_tracked_independently() {
        let mut seq = sequencer();
        let now = Utc::now();
        seq.record("x.com", &attempt(Stage::Initial, AttemptStatus::Sent, now));

        assert_eq!(seq.eligible_stage("y.com", now), Some(Stage::Initial));
        assert_eq!(seq.eligible_stage("x.com", now), None);
    }
}
