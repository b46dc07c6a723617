pub mod commands;
pub mod controller;
pub mod state;

pub use controller::{SessionSnapshot, TimerController, TimerError, TimerEvent};
pub use state::{SessionEvent, SessionRejection, SessionStatus, SessionThresholds, TimedSession};
