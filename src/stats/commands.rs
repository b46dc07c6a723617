use log::debug;

use crate::{
    db::models::VisitRecord,
    places::{nearby_establishments, GeoPoint, NearbyEstablishment},
    stats::{aggregate_visits, summarize_establishments, AggregateStats, EstablishmentStats},
    AppState,
};

/// The home screen lists this many of the latest visits.
pub const RECENT_VISIT_LIMIT: usize = 3;

pub async fn list_history(state: &AppState) -> Result<Vec<VisitRecord>, String> {
    state.store.list_visits().await.map_err(|e| e.to_string())
}

pub async fn recent_visits(state: &AppState) -> Result<Vec<VisitRecord>, String> {
    state
        .store
        .recent_visits(RECENT_VISIT_LIMIT)
        .await
        .map_err(|e| e.to_string())
}

/// Statistics for visits to exactly `establishment_name`.
pub async fn establishment_stats(
    state: &AppState,
    establishment_name: &str,
) -> Result<AggregateStats, String> {
    let visits = state
        .store
        .visits_for_establishment(establishment_name)
        .await
        .map_err(|e| e.to_string())?;
    Ok(aggregate_visits(&visits))
}

/// Per-establishment statistics for every name containing `term`.
pub async fn search_establishments(
    state: &AppState,
    term: &str,
) -> Result<Vec<EstablishmentStats>, String> {
    let term = term.trim();
    if term.is_empty() {
        return Ok(Vec::new());
    }

    let visits = state
        .store
        .search_visits(term)
        .await
        .map_err(|e| e.to_string())?;
    debug!("Search '{}' matched {} visits", term, visits.len());
    Ok(summarize_establishments(&visits))
}

/// Logged establishments near `origin`, or near the configured location when
/// no origin is given.
pub async fn nearby_places(
    state: &AppState,
    origin: Option<GeoPoint>,
) -> Result<Vec<NearbyEstablishment>, String> {
    let origin = match origin {
        Some(origin) => origin,
        None => state
            .location
            .current_position()
            .await
            .map_err(|e| format!("Could not determine your location: {e}"))?,
    };

    let visits = state.store.list_visits().await.map_err(|e| e.to_string())?;
    let radius = state.settings.nearby().radius_meters;
    Ok(nearby_establishments(&origin, &visits, radius))
}
