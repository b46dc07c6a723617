use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::models::{Rating, VisitDetails, VisitError, VisitRecord};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    AwaitingRating,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Abandoned)
    }
}

/// Timing rules for a session. All values are in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionThresholds {
    /// Stopping earlier than this is rejected as accidental.
    pub minimum_duration_secs: u64,
    /// Elapsed value at which the long-wait advisory fires (19:59).
    pub long_wait_secs: u64,
    /// Idle time after which the user is asked whether they are still there.
    pub inactivity_warning_secs: u64,
    /// Idle time after which the session is abandoned.
    pub inactivity_abandon_secs: u64,
}

impl Default for SessionThresholds {
    fn default() -> Self {
        Self {
            minimum_duration_secs: 30,
            long_wait_secs: 1199,
            inactivity_warning_secs: 270,
            inactivity_abandon_secs: 300,
        }
    }
}

impl SessionThresholds {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.minimum_duration_secs == 0 {
            anyhow::bail!("minimum duration must be greater than zero");
        }
        if self.inactivity_warning_secs >= self.inactivity_abandon_secs {
            anyhow::bail!(
                "inactivity warning ({}s) must come before abandonment ({}s)",
                self.inactivity_warning_secs,
                self.inactivity_abandon_secs
            );
        }
        Ok(())
    }
}

/// Why a session refused a request. The session is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionRejection {
    #[error("Too early to stop: wait at least {minimum_secs} seconds ({elapsed_secs}s so far)")]
    TooEarly { elapsed_secs: u64, minimum_secs: u64 },
    #[error("Please rate the service before submitting")]
    MissingRating,
    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i64),
    #[error("A wait is already being timed")]
    AlreadyActive,
    #[error("The timer is not running")]
    NotRunning,
    #[error("Stop the timer before rating or submitting")]
    NotAwaitingRating,
    #[error("This session has ended; start a new one")]
    Finished,
    #[error("Invalid visit details: {0}")]
    InvalidDetails(VisitError),
}

/// Notices produced while a session runs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SessionEvent {
    LongWait { elapsed_secs: u64 },
    PresenceCheck { idle_secs: u64 },
    Abandoned { elapsed_secs: u64 },
}

impl SessionEvent {
    pub fn message(&self) -> String {
        match self {
            SessionEvent::LongWait { elapsed_secs } => format!(
                "Still waiting after {}:{:02}? That's a long wait.",
                elapsed_secs / 60,
                elapsed_secs % 60
            ),
            SessionEvent::PresenceCheck { idle_secs } => format!(
                "No activity for {}:{:02}. Are you still waiting?",
                idle_secs / 60,
                idle_secs % 60
            ),
            SessionEvent::Abandoned { .. } => {
                "Timer stopped due to inactivity. Nothing was saved.".to_string()
            }
        }
    }
}

/// One in-progress wait-time measurement.
///
/// All transitions go through methods on this type; each guard failure returns a
/// `SessionRejection` and leaves the state as it was.
#[derive(Debug, Clone)]
pub struct TimedSession {
    status: SessionStatus,
    thresholds: SessionThresholds,
    details: Option<VisitDetails>,
    elapsed_secs: u64,
    last_interaction_at: Option<Instant>,
    warning_pending: bool,
    rating: Option<Rating>,
}

impl TimedSession {
    pub fn new(thresholds: SessionThresholds) -> Self {
        Self {
            status: SessionStatus::Idle,
            thresholds,
            details: None,
            elapsed_secs: 0,
            last_interaction_at: None,
            warning_pending: false,
            rating: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn warning_pending(&self) -> bool {
        self.warning_pending
    }

    pub fn rating(&self) -> Option<Rating> {
        self.rating
    }

    pub fn details(&self) -> Option<&VisitDetails> {
        self.details.as_ref()
    }

    pub fn start(&mut self, details: VisitDetails, now: Instant) -> Result<(), SessionRejection> {
        match self.status {
            SessionStatus::Idle => {}
            SessionStatus::Running | SessionStatus::AwaitingRating => {
                return Err(SessionRejection::AlreadyActive)
            }
            SessionStatus::Completed | SessionStatus::Abandoned => {
                return Err(SessionRejection::Finished)
            }
        }
        details.validate().map_err(SessionRejection::InvalidDetails)?;

        self.status = SessionStatus::Running;
        self.details = Some(details);
        self.elapsed_secs = 0;
        self.last_interaction_at = Some(now);
        self.warning_pending = false;
        self.rating = None;
        Ok(())
    }

    /// Advance one second. Inactivity is measured from the last interaction to `now`.
    pub fn tick(&mut self, now: Instant) -> Result<Vec<SessionEvent>, SessionRejection> {
        self.ensure_running()?;

        let idle = self.idle_for(now);
        if idle > Duration::from_secs(self.thresholds.inactivity_abandon_secs) {
            self.status = SessionStatus::Abandoned;
            self.warning_pending = false;
            return Ok(vec![SessionEvent::Abandoned {
                elapsed_secs: self.elapsed_secs,
            }]);
        }

        let mut events = Vec::new();
        self.elapsed_secs += 1;

        if self.elapsed_secs == self.thresholds.long_wait_secs {
            events.push(SessionEvent::LongWait {
                elapsed_secs: self.elapsed_secs,
            });
        }

        if !self.warning_pending
            && idle > Duration::from_secs(self.thresholds.inactivity_warning_secs)
        {
            self.warning_pending = true;
            events.push(SessionEvent::PresenceCheck {
                idle_secs: idle.as_secs(),
            });
        }

        Ok(events)
    }

    /// "Still here" signal. Clears a pending presence check and restarts the
    /// inactivity window.
    pub fn record_interaction(&mut self, now: Instant) -> Result<(), SessionRejection> {
        self.ensure_running()?;
        self.warning_pending = false;
        self.last_interaction_at = Some(now);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), SessionRejection> {
        self.ensure_running()?;
        if self.elapsed_secs < self.thresholds.minimum_duration_secs {
            return Err(SessionRejection::TooEarly {
                elapsed_secs: self.elapsed_secs,
                minimum_secs: self.thresholds.minimum_duration_secs,
            });
        }
        self.status = SessionStatus::AwaitingRating;
        self.warning_pending = false;
        Ok(())
    }

    pub fn set_rating(&mut self, value: i64) -> Result<(), SessionRejection> {
        self.ensure_awaiting_rating()?;
        let rating = Rating::new(value).map_err(|_| SessionRejection::InvalidRating(value))?;
        self.rating = Some(rating);
        Ok(())
    }

    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<VisitRecord, SessionRejection> {
        self.ensure_awaiting_rating()?;
        let rating = self.rating.ok_or(SessionRejection::MissingRating)?;
        let details = self.details.clone().ok_or(SessionRejection::NotAwaitingRating)?;

        self.status = SessionStatus::Completed;
        Ok(VisitRecord {
            id: Uuid::new_v4().to_string(),
            details,
            wait_time_secs: self.elapsed_secs,
            rating,
            created_at: now,
        })
    }

    /// Back out before committing. Allowed from `Idle`, `Running` and `AwaitingRating`.
    pub fn cancel(&mut self) -> Result<(), SessionRejection> {
        if self.status.is_finished() {
            return Err(SessionRejection::Finished);
        }
        *self = Self::new(self.thresholds);
        Ok(())
    }

    fn idle_for(&self, now: Instant) -> Duration {
        self.last_interaction_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default()
    }

    fn ensure_running(&self) -> Result<(), SessionRejection> {
        match self.status {
            SessionStatus::Running => Ok(()),
            SessionStatus::Completed | SessionStatus::Abandoned => Err(SessionRejection::Finished),
            _ => Err(SessionRejection::NotRunning),
        }
    }

    fn ensure_awaiting_rating(&self) -> Result<(), SessionRejection> {
        match self.status {
            SessionStatus::AwaitingRating => Ok(()),
            SessionStatus::Completed | SessionStatus::Abandoned => Err(SessionRejection::Finished),
            _ => Err(SessionRejection::NotAwaitingRating),
        }
    }
}
