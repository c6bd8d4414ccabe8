/// Peer presence: how recently a user touched the canvas.
/// Timers are driven by explicit instants so the client loop owns the clock.
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Active,
    Idle,
    Away,
    /// Browser viewer; never escalates.
    Web,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceConfig {
    /// Quiet period before an active user becomes idle.
    pub idle_after: Duration,
    /// Further quiet period before an idle user becomes away.
    pub away_after: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            idle_after: Duration::from_secs(60),
            away_after: Duration::from_secs(4 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    Idle(Instant),
    Away(Instant),
}

/// Active -> Idle -> Away escalation, reset by local activity.
#[derive(Debug, Clone)]
pub struct PresenceTimer {
    config: PresenceConfig,
    status: Status,
    deadline: Option<Deadline>,
}

impl PresenceTimer {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            config,
            status: Status::Active,
            deadline: None,
        }
    }

    /// Last status reported to peers.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Starts the idle countdown without reporting anything.
    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(Deadline::Idle(now + self.config.idle_after));
    }

    /// Records local activity. Returns the new status when it changed.
    pub fn on_activity(&mut self, now: Instant) -> Option<Status> {
        self.arm(now);
        self.transition(Status::Active)
    }

    /// Fires at most one expired deadline. Call repeatedly to catch up after
    /// a long sleep.
    pub fn poll(&mut self, now: Instant) -> Option<Status> {
        match self.deadline {
            Some(Deadline::Idle(at)) if now >= at => {
                self.deadline = Some(Deadline::Away(at + self.config.away_after));
                self.transition(Status::Idle)
            }
            Some(Deadline::Away(at)) if now >= at => {
                self.deadline = None;
                self.transition(Status::Away)
            }
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.deadline {
            Some(Deadline::Idle(at)) | Some(Deadline::Away(at)) => Some(at),
            None => None,
        }
    }

    fn transition(&mut self, status: Status) -> Option<Status> {
        if self.status == status {
            None
        } else {
            self.status = status;
            Some(status)
        }
    }
}
