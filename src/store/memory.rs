use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::models::VisitRecord;

use super::{StoreError, VisitStore};

#[derive(Default)]
pub struct MemoryStore {
    visits: RwLock<Vec<VisitRecord>>,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visits(visits: Vec<VisitRecord>) -> Self {
        Self {
            visits: RwLock::new(visits),
            reject_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent inserts fail, to simulate an unavailable backend.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.visits.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.visits.read().await.is_empty()
    }

    fn newest_first<'a>(visits: impl DoubleEndedIterator<Item = &'a VisitRecord>) -> Vec<VisitRecord> {
        // Reversed insertion order first so equal timestamps list the latest insert first.
        let mut sorted: Vec<VisitRecord> = visits.rev().cloned().collect();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sorted
    }
}

#[async_trait]
impl VisitStore for MemoryStore {
    async fn insert_visit(&self, visit: &VisitRecord) -> Result<(), StoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Insert(anyhow!("store is read-only")));
        }
        visit
            .validate()
            .map_err(|err| StoreError::Insert(anyhow!(err)))?;
        self.visits.write().await.push(visit.clone());
        Ok(())
    }

    async fn list_visits(&self) -> Result<Vec<VisitRecord>, StoreError> {
        let visits = self.visits.read().await;
        Ok(Self::newest_first(visits.iter()))
    }

    async fn search_visits(&self, pattern: &str) -> Result<Vec<VisitRecord>, StoreError> {
        let needle = pattern.to_ascii_lowercase();
        let visits = self.visits.read().await;
        Ok(Self::newest_first(visits.iter().filter(|visit| {
            visit
                .establishment_name()
                .to_ascii_lowercase()
                .contains(&needle)
        })))
    }

    async fn visits_for_establishment(&self, name: &str) -> Result<Vec<VisitRecord>, StoreError> {
        let visits = self.visits.read().await;
        Ok(Self::newest_first(
            visits
                .iter()
                .filter(|visit| visit.establishment_name() == name),
        ))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::db::models::{OrderType, Rating, VisitDetails};

    fn visit(name: &str, minutes: i64) -> VisitRecord {
        VisitRecord {
            id: format!("{name}-{minutes}"),
            details: VisitDetails::new(name, OrderType::Beer, "Lager"),
            wait_time_secs: 60,
            rating: Rating::new(3).unwrap(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()
                + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn lists_newest_first() {
        let store = MemoryStore::new();
        store.insert_visit(&visit("The Crown", 5)).await.unwrap();
        store.insert_visit(&visit("The Anchor", 10)).await.unwrap();
        store.insert_visit(&visit("The Crown", 1)).await.unwrap();

        let ids: Vec<String> = store
            .list_visits()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, vec!["The Anchor-10", "The Crown-5", "The Crown-1"]);

        let recent = store.recent_visits(2).await.unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_substring() {
        let store = MemoryStore::with_visits(vec![
            visit("The Crown", 1),
            visit("Rose and Crown", 2),
            visit("The Anchor", 3),
        ]);
        let found = store.search_visits("crown").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].establishment_name(), "Rose and Crown");
    }

    #[tokio::test]
    async fn establishment_lookup_is_exact() {
        let store = MemoryStore::with_visits(vec![
            visit("The Crown", 1),
            visit("The Crown Inn", 2),
            visit("The Crown", 3),
        ]);
        let ids: Vec<String> = store
            .visits_for_establishment("The Crown")
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, vec!["The Crown-3", "The Crown-1"]);
        assert!(store.visits_for_establishment("the crown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_writes_are_reported() {
        let store = MemoryStore::new();
        store.set_reject_writes(true);
        let err = store.insert_visit(&visit("The Crown", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Insert(_)));
        assert!(store.is_empty().await);
    }
}
