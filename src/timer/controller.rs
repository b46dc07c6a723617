use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    db::models::{Rating, VisitDetails, VisitRecord},
    store::{StoreError, VisitStore},
};

use super::{SessionEvent, SessionRejection, SessionStatus, SessionThresholds, TimedSession};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error(transparent)]
    Rejected(#[from] SessionRejection),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub elapsed_secs: u64,
    pub warning_pending: bool,
    pub details: Option<VisitDetails>,
    pub rating: Option<Rating>,
}

impl From<&TimedSession> for SessionSnapshot {
    fn from(session: &TimedSession) -> Self {
        Self {
            status: session.status(),
            elapsed_secs: session.elapsed_secs(),
            warning_pending: session.warning_pending(),
            details: session.details().cloned(),
            rating: session.rating(),
        }
    }
}

/// Notifications for whoever renders the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "payload")]
pub enum TimerEvent {
    StateChanged(SessionSnapshot),
    Tick { elapsed_secs: u64 },
    Notice(SessionEvent),
    VisitSaved(VisitRecord),
}

struct Ticker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Drives the single active `TimedSession`: owns the one-second tick source,
/// forwards interaction signals, and hands finished visits to the record store.
#[derive(Clone)]
pub struct TimerController {
    session: Arc<Mutex<TimedSession>>,
    store: Arc<dyn VisitStore>,
    events: broadcast::Sender<TimerEvent>,
    ticker: Arc<Mutex<Option<Ticker>>>,
    last_created_at: Arc<Mutex<Option<DateTime<Utc>>>>,
    thresholds: SessionThresholds,
    tick_interval: Duration,
}

impl TimerController {
    pub fn new(store: Arc<dyn VisitStore>, thresholds: SessionThresholds) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            session: Arc::new(Mutex::new(TimedSession::new(thresholds))),
            store,
            events,
            ticker: Arc::new(Mutex::new(None)),
            last_created_at: Arc::new(Mutex::new(None)),
            thresholds,
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(&*self.session.lock().await)
    }

    pub async fn start(&self, details: VisitDetails) -> Result<SessionSnapshot, TimerError> {
        let snapshot = {
            let mut session = self.session.lock().await;
            if session.status().is_finished() {
                *session = TimedSession::new(self.thresholds);
            }
            session.start(details, now())?;
            SessionSnapshot::from(&*session)
        };

        self.spawn_ticker().await;
        log_info!(
            "Started timing at {}",
            snapshot
                .details
                .as_ref()
                .map(|d| d.establishment_name.as_str())
                .unwrap_or_default()
        );
        self.emit(TimerEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// "Still here" signal from the user.
    pub async fn record_interaction(&self) -> Result<(), TimerError> {
        let snapshot = {
            let mut session = self.session.lock().await;
            let was_pending = session.warning_pending();
            session.record_interaction(now())?;
            log_debug!("Interaction recorded at {}s", session.elapsed_secs());
            was_pending.then(|| SessionSnapshot::from(&*session))
        };
        if let Some(snapshot) = snapshot {
            self.emit(TimerEvent::StateChanged(snapshot));
        }
        Ok(())
    }

    pub async fn stop(&self) -> Result<SessionSnapshot, TimerError> {
        let snapshot = {
            let mut session = self.session.lock().await;
            session.stop()?;
            SessionSnapshot::from(&*session)
        };
        self.cancel_ticker().await;
        log_info!("Timer stopped at {}s", snapshot.elapsed_secs);
        self.emit(TimerEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    pub async fn set_rating(&self, rating: i64) -> Result<SessionSnapshot, TimerError> {
        let mut session = self.session.lock().await;
        session.set_rating(rating)?;
        Ok(SessionSnapshot::from(&*session))
    }

    /// Complete the session and save the visit. When the store fails the session
    /// stays in `AwaitingRating`, so the caller can try again.
    pub async fn submit(&self) -> Result<VisitRecord, TimerError> {
        let mut session = self.session.lock().await;
        let mut last_created_at = self.last_created_at.lock().await;

        let created_at = match *last_created_at {
            Some(previous) => Utc::now().max(previous),
            None => Utc::now(),
        };

        let mut completed = session.clone();
        let record = completed.submit(created_at)?;

        if let Err(err) = self.store.insert_visit(&record).await {
            log_error!("Failed to save visit {}: {}", record.id, err);
            return Err(err.into());
        }

        *last_created_at = Some(record.created_at);
        *session = TimedSession::new(self.thresholds);
        let snapshot = SessionSnapshot::from(&*session);
        drop(last_created_at);
        drop(session);

        log_info!(
            "Saved visit {} ({}s at {})",
            record.id,
            record.wait_time_secs,
            record.establishment_name()
        );
        self.emit(TimerEvent::VisitSaved(record.clone()));
        self.emit(TimerEvent::StateChanged(snapshot));
        Ok(record)
    }

    pub async fn cancel(&self) -> Result<SessionSnapshot, TimerError> {
        let snapshot = {
            let mut session = self.session.lock().await;
            if session.status().is_finished() {
                // A finished session is discarded rather than cancelled.
                *session = TimedSession::new(self.thresholds);
            } else {
                session.cancel()?;
            }
            SessionSnapshot::from(&*session)
        };
        self.cancel_ticker().await;
        self.emit(TimerEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(ticker) = ticker_guard.take() {
            ticker.cancel_token.cancel();
            ticker.handle.abort();
        }

        let session = self.session.clone();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + tick_interval, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let (outcome, snapshot) = {
                    let mut guard = session.lock().await;
                    if guard.status() != SessionStatus::Running {
                        break;
                    }
                    let outcome = guard.tick(now());
                    (outcome, SessionSnapshot::from(&*guard))
                };

                let notices = match outcome {
                    Ok(notices) => notices,
                    Err(err) => {
                        log_warn!("Tick rejected: {}", err);
                        break;
                    }
                };

                let _ = events.send(TimerEvent::Tick {
                    elapsed_secs: snapshot.elapsed_secs,
                });

                let mut abandoned = false;
                for notice in notices {
                    match &notice {
                        SessionEvent::Abandoned { elapsed_secs } => {
                            log_warn!("Session abandoned after {}s without activity", elapsed_secs);
                            abandoned = true;
                        }
                        SessionEvent::PresenceCheck { idle_secs } => {
                            log_info!("Presence check after {}s idle", idle_secs);
                        }
                        SessionEvent::LongWait { elapsed_secs } => {
                            log_info!("Long wait advisory at {}s", elapsed_secs);
                        }
                    }
                    let _ = events.send(TimerEvent::Notice(notice));
                }

                if abandoned {
                    let _ = events.send(TimerEvent::StateChanged(snapshot));
                    break;
                }
            }
        });

        *ticker_guard = Some(Ticker {
            handle,
            cancel_token,
        });
    }

    async fn cancel_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.cancel_token.cancel();
            ticker.handle.abort();
        }
    }

    fn emit(&self, event: TimerEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

/// Current instant on the tokio clock, so a paused test runtime drives inactivity too.
fn now() -> std::time::Instant {
    time::Instant::now().into_std()
}
