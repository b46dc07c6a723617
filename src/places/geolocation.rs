use async_trait::async_trait;
use thiserror::Error;

use super::types::GeoPoint;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("location permission was denied")]
    PermissionDenied,
    #[error("location is unavailable")]
    Unavailable,
    #[error("timed out waiting for a location fix")]
    Timeout,
}

#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<GeoPoint, GeolocationError>;
}

/// Reports a configured position, or `Unavailable` when none is set.
#[derive(Debug, Clone, Default)]
pub struct FixedPosition {
    position: Option<GeoPoint>,
}

impl FixedPosition {
    pub fn new(position: Option<GeoPoint>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl GeolocationProvider for FixedPosition {
    async fn current_position(&self) -> Result<GeoPoint, GeolocationError> {
        self.position.ok_or(GeolocationError::Unavailable)
    }
}
