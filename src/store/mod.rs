//! Record store seam used by the timer controller and the statistics commands.
//!
//! `Database` is the persistent implementation; `MemoryStore` keeps everything in
//! process and backs the unit tests.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::VisitRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to save visit: {0:#}")]
    Insert(anyhow::Error),
    #[error("failed to load visits: {0:#}")]
    Query(anyhow::Error),
    #[error("stored visit is invalid: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait VisitStore: Send + Sync {
    async fn insert_visit(&self, visit: &VisitRecord) -> Result<(), StoreError>;

    /// Every visit, newest first.
    async fn list_visits(&self) -> Result<Vec<VisitRecord>, StoreError>;

    /// Visits whose establishment name contains `pattern`, ignoring ASCII case.
    /// Newest first.
    async fn search_visits(&self, pattern: &str) -> Result<Vec<VisitRecord>, StoreError>;

    /// Visits to exactly `name` (case-sensitive), newest first.
    async fn visits_for_establishment(&self, name: &str) -> Result<Vec<VisitRecord>, StoreError>;

    async fn recent_visits(&self, limit: usize) -> Result<Vec<VisitRecord>, StoreError> {
        let mut visits = self.list_visits().await?;
        visits.truncate(limit);
        Ok(visits)
    }
}
