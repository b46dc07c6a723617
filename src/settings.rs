use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use crate::{places::GeoPoint, timer::SessionThresholds};

/// Default search radius for nearby establishments.
pub const DEFAULT_NEARBY_RADIUS_METERS: f64 = 10_000.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NearbySettings {
    pub radius_meters: f64,
    /// Position reported when no live location source is available.
    pub home: Option<GeoPoint>,
}

impl Default for NearbySettings {
    fn default() -> Self {
        Self {
            radius_meters: DEFAULT_NEARBY_RADIUS_METERS,
            home: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
struct UserSettings {
    session: SessionThresholds,
    nearby: NearbySettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str::<UserSettings>(&contents) {
                Ok(mut settings) => {
                    if let Err(err) = settings.session.validate() {
                        warn!("Ignoring session thresholds in {}: {err}", path.display());
                        settings.session = SessionThresholds::default();
                    }
                    settings
                }
                Err(err) => {
                    warn!("Unreadable settings in {}, using defaults: {err}", path.display());
                    UserSettings::default()
                }
            }
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn session_thresholds(&self) -> SessionThresholds {
        self.read().session
    }

    pub fn nearby(&self) -> NearbySettings {
        self.read().nearby.clone()
    }

    pub fn update_session_thresholds(&self, thresholds: SessionThresholds) -> Result<()> {
        thresholds.validate()?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.session = thresholds;
        self.persist(&guard)
    }

    pub fn update_nearby(&self, nearby: NearbySettings) -> Result<()> {
        if !(nearby.radius_meters.is_finite() && nearby.radius_meters > 0.0) {
            anyhow::bail!("nearby radius must be a positive number of meters");
        }
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.nearby = nearby;
        self.persist(&guard)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.session_thresholds(), SessionThresholds::default());
        assert_eq!(store.nearby().radius_meters, DEFAULT_NEARBY_RADIUS_METERS);
    }

    #[test]
    fn updates_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let thresholds = SessionThresholds {
            minimum_duration_secs: 15,
            ..SessionThresholds::default()
        };
        store.update_session_thresholds(thresholds).unwrap();
        store
            .update_nearby(NearbySettings {
                radius_meters: 2_500.0,
                home: Some(GeoPoint::new(51.5, -0.12)),
            })
            .unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.session_thresholds().minimum_duration_secs, 15);
        assert_eq!(reloaded.nearby().radius_meters, 2_500.0);
        assert!(reloaded.nearby().home.is_some());
    }

    #[test]
    fn partial_and_invalid_files_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        fs::write(&path, r#"{"session": {"minimumDurationSecs": 45}}"#).unwrap();
        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.session_thresholds().minimum_duration_secs, 45);
        assert_eq!(store.session_thresholds().inactivity_abandon_secs, 300);

        fs::write(
            &path,
            r#"{"session": {"inactivityWarningSecs": 400}, "nearby": {"radiusMeters": 500.0}}"#,
        )
        .unwrap();
        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.session_thresholds(), SessionThresholds::default());
        assert_eq!(store.nearby().radius_meters, 500.0);

        fs::write(&path, "not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.session_thresholds(), SessionThresholds::default());
    }

    #[test]
    fn invalid_updates_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let inverted = SessionThresholds {
            inactivity_warning_secs: 600,
            ..SessionThresholds::default()
        };
        assert!(store.update_session_thresholds(inverted).is_err());
        assert!(store
            .update_nearby(NearbySettings {
                radius_meters: -1.0,
                home: None,
            })
            .is_err());
    }
}
