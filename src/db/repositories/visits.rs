use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Row};
use thiserror::Error;

use crate::{
    db::{
        helpers::{escape_like, format_datetime, parse_datetime, to_i64, to_u64},
        models::{OrderType, Rating, VisitDetails, VisitRecord},
        Database,
    },
    store::{StoreError, VisitStore},
};

const VISIT_COLUMNS: &str = "id, establishment_name, location, formatted_address, place_id, \
     latitude, longitude, order_type, drink_details, wait_time_secs, rating, created_at";

/// A stored row that cannot be turned back into a valid visit.
#[derive(Debug, Error)]
#[error("{0}")]
struct CorruptRow(String);

fn corrupt(err: impl Into<anyhow::Error>) -> anyhow::Error {
    anyhow::Error::new(CorruptRow(format!("{:#}", err.into())))
}

fn row_to_visit(row: &Row) -> Result<VisitRecord> {
    let order_type: String = row.get("order_type")?;
    let wait_time_secs: i64 = row.get("wait_time_secs")?;
    let rating: i64 = row.get("rating")?;
    let created_at: String = row.get("created_at")?;

    let record = VisitRecord {
        id: row.get("id")?,
        details: VisitDetails {
            establishment_name: row.get("establishment_name")?,
            location: row.get("location")?,
            formatted_address: row.get("formatted_address")?,
            place_id: row.get("place_id")?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            order_type: order_type.parse::<OrderType>().map_err(corrupt)?,
            drink_details: row.get("drink_details")?,
        },
        wait_time_secs: to_u64(wait_time_secs, "wait_time_secs").map_err(corrupt)?,
        rating: Rating::new(rating).map_err(corrupt)?,
        created_at: parse_datetime(&created_at, "created_at").map_err(corrupt)?,
    };
    record.validate().map_err(corrupt)?;
    Ok(record)
}

fn query_visits(
    conn: &rusqlite::Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<VisitRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut visits = Vec::new();
    while let Some(row) = rows.next()? {
        visits.push(row_to_visit(row)?);
    }
    Ok(visits)
}

fn classify_read_error(err: anyhow::Error) -> StoreError {
    match err.downcast_ref::<CorruptRow>() {
        Some(corrupt) => StoreError::Invalid(corrupt.0.clone()),
        None => StoreError::Query(err),
    }
}

impl Database {
    pub async fn insert_visit_record(&self, visit: &VisitRecord) -> Result<()> {
        visit.validate()?;
        let record = visit.clone();
        self.execute(move |conn| {
            let details = &record.details;
            conn.execute(
                "INSERT INTO visits (id, establishment_name, location, formatted_address, place_id,
                                     latitude, longitude, order_type, drink_details, wait_time_secs,
                                     rating, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.id,
                    details.establishment_name,
                    details.location,
                    details.formatted_address,
                    details.place_id,
                    details.latitude,
                    details.longitude,
                    details.order_type.as_str(),
                    details.drink_details,
                    to_i64(record.wait_time_secs)?,
                    record.rating.value(),
                    format_datetime(&record.created_at),
                ],
            )
            .with_context(|| "failed to insert visit")?;
            Ok(())
        })
        .await
    }

    pub async fn list_visit_records(&self, limit: Option<usize>) -> Result<Vec<VisitRecord>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        self.execute(move |conn| {
            query_visits(
                conn,
                &format!(
                    "SELECT {VISIT_COLUMNS} FROM visits
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?1"
                ),
                params![limit],
            )
        })
        .await
    }

    pub async fn search_visit_records(&self, pattern: &str) -> Result<Vec<VisitRecord>> {
        let like = format!("%{}%", escape_like(pattern));
        self.execute(move |conn| {
            query_visits(
                conn,
                &format!(
                    "SELECT {VISIT_COLUMNS} FROM visits
                     WHERE establishment_name LIKE ?1 ESCAPE '\\'
                     ORDER BY created_at DESC, rowid DESC"
                ),
                params![like],
            )
        })
        .await
    }

    /// Visits to exactly this establishment name, newest first.
    pub async fn visit_records_for_establishment(&self, name: &str) -> Result<Vec<VisitRecord>> {
        let name = name.to_string();
        self.execute(move |conn| {
            query_visits(
                conn,
                &format!(
                    "SELECT {VISIT_COLUMNS} FROM visits
                     WHERE establishment_name = ?1
                     ORDER BY created_at DESC, rowid DESC"
                ),
                params![name],
            )
        })
        .await
    }
}

#[async_trait]
impl VisitStore for Database {
    async fn insert_visit(&self, visit: &VisitRecord) -> Result<(), StoreError> {
        self.insert_visit_record(visit)
            .await
            .map_err(StoreError::Insert)
    }

    async fn list_visits(&self) -> Result<Vec<VisitRecord>, StoreError> {
        self.list_visit_records(None)
            .await
            .map_err(classify_read_error)
    }

    async fn search_visits(&self, pattern: &str) -> Result<Vec<VisitRecord>, StoreError> {
        self.search_visit_records(pattern)
            .await
            .map_err(classify_read_error)
    }

    async fn recent_visits(&self, limit: usize) -> Result<Vec<VisitRecord>, StoreError> {
        self.list_visit_records(Some(limit))
            .await
            .map_err(classify_read_error)
    }

    async fn visits_for_establishment(&self, name: &str) -> Result<Vec<VisitRecord>, StoreError> {
        self.visit_records_for_establishment(name)
            .await
            .map_err(classify_read_error)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    use super::*;

    fn open() -> (TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("visits.sqlite3")).unwrap();
        (dir, db)
    }

    fn visit(name: &str, wait: u64, minutes_after: i64) -> VisitRecord {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap();
        VisitRecord {
            id: uuid::Uuid::new_v4().to_string(),
            details: VisitDetails::new(name, OrderType::Beer, "Lager"),
            wait_time_secs: wait,
            rating: Rating::new(4).unwrap(),
            created_at: base + Duration::minutes(minutes_after),
        }
    }

    #[tokio::test]
    async fn insert_and_list_newest_first() {
        let (_dir, db) = open();
        let first = visit("The Crown", 60, 0);
        let second = visit("The Anchor", 120, 5);
        db.insert_visit(&first).await.unwrap();
        db.insert_visit(&second).await.unwrap();

        let visits = db.list_visits().await.unwrap();
        assert_eq!(visits, vec![second.clone(), first]);

        let recent = db.recent_visits(1).await.unwrap();
        assert_eq!(recent, vec![second]);
    }

    #[tokio::test]
    async fn place_details_survive_storage() {
        let (_dir, db) = open();
        let mut record = visit("The Crown", 95, 0);
        record.details = record
            .details
            .with_place("place-1", "1 High St, London SW1A 1AA", 51.5, -0.12);
        record.created_at += Duration::nanoseconds(123_456_789);
        db.insert_visit(&record).await.unwrap();

        let stored = db.list_visits().await.unwrap();
        assert_eq!(stored, vec![record]);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_substring() {
        let (_dir, db) = open();
        db.insert_visit(&visit("The Crown", 60, 0)).await.unwrap();
        db.insert_visit(&visit("Crown & Anchor", 90, 1)).await.unwrap();
        db.insert_visit(&visit("The Swan", 30, 2)).await.unwrap();

        let hits = db.search_visits("crown").await.unwrap();
        let names: Vec<&str> = hits.iter().map(|v| v.establishment_name()).collect();
        assert_eq!(names, vec!["Crown & Anchor", "The Crown"]);
        assert!(db.search_visits("lion").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wildcards_in_search_are_literal() {
        let (_dir, db) = open();
        db.insert_visit(&visit("100% Ale", 60, 0)).await.unwrap();
        db.insert_visit(&visit("1000 Ales", 60, 1)).await.unwrap();
        db.insert_visit(&visit("Bar_One", 60, 2)).await.unwrap();
        db.insert_visit(&visit("BarXOne", 60, 3)).await.unwrap();

        let percent = db.search_visits("0%").await.unwrap();
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].establishment_name(), "100% Ale");

        let underscore = db.search_visits("r_o").await.unwrap();
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].establishment_name(), "Bar_One");
    }

    #[tokio::test]
    async fn invalid_visits_are_rejected() {
        let (_dir, db) = open();
        let mut record = visit("The Crown", 60, 0);
        record.details.drink_details = "  ".into();

        let err = db.insert_visit(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::Insert(_)));
        assert!(db.list_visits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exact_name_lookup() {
        let (_dir, db) = open();
        let crown = visit("The Crown", 60, 0);
        db.insert_visit(&crown).await.unwrap();
        db.insert_visit(&visit("The Crown Inn", 60, 1)).await.unwrap();

        let exact = db.visits_for_establishment("The Crown").await.unwrap();
        assert_eq!(exact, vec![crown]);
        assert!(db.visits_for_establishment("the crown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupted_rows_are_reported_as_invalid() {
        let (_dir, db) = open();
        db.insert_visit(&visit("The Crown", 60, 0)).await.unwrap();

        db.execute(|conn| {
            conn.execute("UPDATE visits SET created_at = 'last tuesday'", [])?;
            Ok(())
        })
        .await
        .unwrap();
        assert!(matches!(db.list_visits().await, Err(StoreError::Invalid(_))));

        db.execute(|conn| {
            conn.execute("DELETE FROM visits", [])?;
            conn.execute(
                "INSERT INTO visits (id, establishment_name, location, order_type, drink_details,
                                     wait_time_secs, rating, created_at)
                 VALUES ('second', 'The Crown', 'The Crown', 'mead', 'Lager', 60, 4,
                         '2024-05-01T18:00:00.000000000Z')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();
        assert!(matches!(
            db.search_visits("crown").await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn data_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visits.sqlite3");
        let record = visit("The Crown", 60, 0);
        {
            let db = Database::new(path.clone()).unwrap();
            db.insert_visit(&record).await.unwrap();
        }
        let db = Database::new(path).unwrap();
        assert_eq!(db.list_visits().await.unwrap(), vec![record]);
    }
}
