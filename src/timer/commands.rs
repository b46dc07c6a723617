use crate::{
    db::models::{VisitDetails, VisitRecord},
    timer::{SessionSnapshot, TimerController},
    AppState,
};

fn controller_from_state(state: &AppState) -> &TimerController {
    &state.timer
}

pub async fn get_session_state(state: &AppState) -> Result<SessionSnapshot, String> {
    Ok(controller_from_state(state).snapshot().await)
}

pub async fn start_session(
    state: &AppState,
    details: VisitDetails,
) -> Result<SessionSnapshot, String> {
    controller_from_state(state)
        .start(details)
        .await
        .map_err(|e| e.to_string())
}

pub async fn still_here(state: &AppState) -> Result<(), String> {
    controller_from_state(state)
        .record_interaction()
        .await
        .map_err(|e| e.to_string())
}

pub async fn stop_session(state: &AppState) -> Result<SessionSnapshot, String> {
    controller_from_state(state)
        .stop()
        .await
        .map_err(|e| e.to_string())
}

pub async fn rate_service(state: &AppState, rating: i64) -> Result<SessionSnapshot, String> {
    controller_from_state(state)
        .set_rating(rating)
        .await
        .map_err(|e| e.to_string())
}

pub async fn submit_visit(state: &AppState) -> Result<VisitRecord, String> {
    controller_from_state(state)
        .submit()
        .await
        .map_err(|e| e.to_string())
}

pub async fn cancel_session(state: &AppState) -> Result<SessionSnapshot, String> {
    controller_from_state(state)
        .cancel()
        .await
        .map_err(|e| e.to_string())
}
