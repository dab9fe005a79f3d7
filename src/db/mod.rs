//! Database module

mod schema;

use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::models::{
    IngestOutcome, LatestReport, Mmsi, Status, VesselReport, VesselReportInput,
};

const REPORT_COLUMNS: &str = "id, mmsi, name, status_id, length, width, draft, \
     latitude, longitude, sog, cog, heading, timestamp";

#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: i64,
    mmsi: String,
    name: String,
    status_id: i64,
    length: f64,
    width: f64,
    draft: f64,
    latitude: f64,
    longitude: f64,
    sog: f64,
    cog: f64,
    heading: f64,
    timestamp: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct LatestRow {
    #[sqlx(flatten)]
    report: ReportRow,
    position_count: i64,
}

impl From<ReportRow> for VesselReport {
    fn from(row: ReportRow) -> Self {
        Self {
            id: row.id,
            mmsi: Mmsi::from_stored(row.mmsi),
            name: row.name,
            status_id: row.status_id,
            length: row.length,
            width: row.width,
            draft: row.draft,
            latitude: row.latitude,
            longitude: row.longitude,
            sog: row.sog,
            cog: row.cog,
            heading: row.heading,
            timestamp: DateTime::from_timestamp_millis(row.timestamp).unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> AnyResult<Self> {
        if let Some(dir) = Path::new(&config.url).parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                warn!("Database directory does not exist, attempting to create it");
                std::fs::create_dir_all(dir).with_context(|| {
                    format!("Could not create database directory {}", dir.display())
                })?;
            }
        }

        info!("Opening database at {}", config.url);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&format!("sqlite:{}?mode=rwc", config.url))
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> AnyResult<()> {
        // Enable WAL mode for better concurrency
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(schema::CREATE_STATUS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_REPORTS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_MMSI_TIMESTAMP)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_TIMESTAMP)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::SEED_STATUSES)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Append a new report to the vessel's history
    pub async fn insert_report(&self, report: &VesselReportInput) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = insert_row(&mut *tx, report).await?;
        tx.commit().await?;

        debug!(mmsi = %report.mmsi, id, "Inserted vessel report");
        Ok(id)
    }

    /// Insert a first report for an unknown vessel, or move a known vessel.
    ///
    /// A known vessel keeps its name and dimensions; only the position, motion,
    /// status and timestamp of its latest row are overwritten. The lookup and
    /// the write share one transaction, which takes the write lock up front so
    /// concurrent submissions for one vessel queue instead of failing.
    pub async fn upsert_report(&self, report: &VesselReportInput) -> Result<(IngestOutcome, i64)> {
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let existing: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM vessel_reports
            WHERE mmsi = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(report.mmsi.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let result = match existing {
            Some((id,)) => {
                sqlx::query(
                    r#"
                    UPDATE vessel_reports
                    SET latitude = ?, longitude = ?, sog = ?, cog = ?, heading = ?, status_id = ?, timestamp = ?
                    WHERE id = ?
                    "#,
                )
                .bind(report.latitude)
                .bind(report.longitude)
                .bind(report.sog)
                .bind(report.cog)
                .bind(report.heading)
                .bind(report.status_id)
                .bind(report.timestamp.timestamp_millis())
                .bind(id)
                .execute(&mut *tx)
                .await?;
                (IngestOutcome::Updated, id)
            }
            None => (IngestOutcome::Inserted, insert_row(&mut *tx, report).await?),
        };

        tx.commit().await?;

        debug!(mmsi = %report.mmsi, outcome = ?result.0, id = result.1, "Upserted vessel report");
        Ok(result)
    }

    pub async fn list_statuses(&self) -> Result<Vec<Status>> {
        let statuses = sqlx::query_as::<_, Status>("SELECT id, name FROM statuses ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(statuses)
    }

    /// Latest report of every vessel, ordered by MMSI.
    ///
    /// The latest report is the one with the greatest timestamp; equal
    /// timestamps are resolved in favour of the most recently inserted row.
    pub async fn find_latest_per_vessel(&self) -> Result<Vec<LatestReport>> {
        let rows: Vec<LatestRow> = sqlx::query_as(
            r#"
            SELECT r.id, r.mmsi, r.name, r.status_id, r.length, r.width, r.draft,
                   r.latitude, r.longitude, r.sog, r.cog, r.heading, r.timestamp,
                   (SELECT COUNT(*) FROM vessel_reports c WHERE c.mmsi = r.mmsi) AS position_count
            FROM vessel_reports r
            WHERE r.id = (
                SELECT l.id FROM vessel_reports l
                WHERE l.mmsi = r.mmsi
                ORDER BY l.timestamp DESC, l.id DESC
                LIMIT 1
            )
            ORDER BY r.mmsi ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LatestReport {
                report: row.report.into(),
                position_count: row.position_count,
            })
            .collect())
    }

    /// Full trajectory of one vessel, oldest first. Empty when the vessel is unknown.
    pub async fn find_history(&self, mmsi: &Mmsi) -> Result<Vec<VesselReport>> {
        let rows: Vec<ReportRow> = sqlx::query_as(&format!(
            "SELECT {REPORT_COLUMNS} FROM vessel_reports WHERE mmsi = ? ORDER BY timestamp ASC, id ASC"
        ))
        .bind(mmsi.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(VesselReport::from).collect())
    }

    pub async fn find_latest(&self, mmsi: &Mmsi) -> Result<Option<VesselReport>> {
        let row: Option<ReportRow> = sqlx::query_as(&format!(
            "SELECT {REPORT_COLUMNS} FROM vessel_reports WHERE mmsi = ? ORDER BY timestamp DESC, id DESC LIMIT 1"
        ))
        .bind(mmsi.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(VesselReport::from))
    }

    pub async fn count_reports(&self, mmsi: &Mmsi) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vessel_reports WHERE mmsi = ?")
            .bind(mmsi.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Every stored report, newest first
    pub async fn find_all(&self) -> Result<Vec<VesselReport>> {
        let rows: Vec<ReportRow> = sqlx::query_as(&format!(
            "SELECT {REPORT_COLUMNS} FROM vessel_reports ORDER BY timestamp DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(VesselReport::from).collect())
    }
}

async fn insert_row(conn: &mut SqliteConnection, report: &VesselReportInput) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO vessel_reports (mmsi, name, status_id, length, width, draft, latitude, longitude, sog, cog, heading, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(report.mmsi.as_str())
    .bind(&report.name)
    .bind(report.status_id)
    .bind(report.length)
    .bind(report.width)
    .bind(report.draft)
    .bind(report.latitude)
    .bind(report.longitude)
    .bind(report.sog)
    .bind(report.cog)
    .bind(report.heading)
    .bind(report.timestamp.timestamp_millis())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::error::VesselError;

    #[tokio::test]
    async fn test_insert_then_history_round_trip() {
        let (_dir, db) = test_database().await;
        let input = report("123456789", at(0, 0));

        let id = db.insert_report(&input).await.unwrap();
        let history = db.find_history(&input.mmsi).await.unwrap();

        assert_eq!(history.len(), 1);
        let stored = &history[0];
        assert_eq!(stored.id, id);
        assert_eq!(stored.mmsi, input.mmsi);
        assert_eq!(stored.name, "Alpha");
        assert_eq!(stored.status_id, 1);
        assert_eq!(stored.latitude, input.latitude);
        assert_eq!(stored.longitude, input.longitude);
        assert_eq!(stored.sog, input.sog);
        assert_eq!(stored.cog, input.cog);
        assert_eq!(stored.timestamp, input.timestamp);
    }

    #[tokio::test]
    async fn test_history_is_ordered_by_timestamp() {
        let (_dir, db) = test_database().await;
        for minute in [30, 10, 50, 20] {
            db.insert_report(&report("123456789", at(1, minute)))
                .await
                .unwrap();
        }
        db.insert_report(&report("987654321", at(0, 0))).await.unwrap();

        let mmsi = Mmsi::try_from("123456789").unwrap();
        let history = db.find_history(&mmsi).await.unwrap();

        assert_eq!(history.len(), 4);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(history[0].timestamp, at(1, 10));
        assert_eq!(history[3].timestamp, at(1, 50));
    }

    #[tokio::test]
    async fn test_history_of_unknown_vessel_is_empty() {
        let (_dir, db) = test_database().await;
        let mmsi = Mmsi::try_from("111111111").unwrap();
        assert!(db.find_history(&mmsi).await.unwrap().is_empty());
        assert!(db.find_latest(&mmsi).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_per_vessel_picks_max_timestamp() {
        let (_dir, db) = test_database().await;

        let mut late = report("200000000", at(12, 0));
        late.latitude = 42.0;
        db.insert_report(&late).await.unwrap();
        db.insert_report(&report("200000000", at(8, 0))).await.unwrap();
        db.insert_report(&report("100000000", at(9, 0))).await.unwrap();

        let latest = db.find_latest_per_vessel().await.unwrap();

        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].report.mmsi.as_str(), "100000000");
        assert_eq!(latest[0].position_count, 1);
        assert_eq!(latest[1].report.mmsi.as_str(), "200000000");
        assert_eq!(latest[1].report.timestamp, at(12, 0));
        assert_eq!(latest[1].report.latitude, 42.0);
        assert_eq!(latest[1].position_count, 2);
    }

    #[tokio::test]
    async fn test_latest_tie_goes_to_highest_row_id() {
        let (_dir, db) = test_database().await;

        db.insert_report(&report("123456789", at(6, 0))).await.unwrap();
        let mut second = report("123456789", at(6, 0));
        second.latitude = -1.5;
        let second_id = db.insert_report(&second).await.unwrap();

        let latest = db.find_latest_per_vessel().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].report.id, second_id);
        assert_eq!(latest[0].report.latitude, -1.5);

        let single = db.find_latest(&second.mmsi).await.unwrap().unwrap();
        assert_eq!(single.id, second_id);
    }

    #[tokio::test]
    async fn test_find_all_is_newest_first() {
        let (_dir, db) = test_database().await;
        db.insert_report(&report("100000000", at(1, 0))).await.unwrap();
        db.insert_report(&report("200000000", at(3, 0))).await.unwrap();
        db.insert_report(&report("300000000", at(2, 0))).await.unwrap();

        let all = db.find_all().await.unwrap();
        let order: Vec<&str> = all.iter().map(|r| r.mmsi.as_str()).collect();
        assert_eq!(order, vec!["200000000", "300000000", "100000000"]);
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates_mutable_fields() {
        let (_dir, db) = test_database().await;
        let first = report("123456789", at(0, 0));

        let (outcome, id) = db.upsert_report(&first).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Inserted);

        let mut second = report("123456789", at(0, 30));
        second.name = "Renamed".to_string();
        second.length = 99.0;
        second.latitude = 11.5;
        second.status_id = 6;
        let (outcome, updated_id) = db.upsert_report(&second).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Updated);
        assert_eq!(updated_id, id);

        let history = db.find_history(&first.mmsi).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].latitude, 11.5);
        assert_eq!(history[0].status_id, 6);
        assert_eq!(history[0].timestamp, at(0, 30));
        assert_eq!(history[0].name, "Alpha");
        assert_eq!(history[0].length, 10.0);
    }

    #[tokio::test]
    async fn test_unknown_status_is_a_storage_error_and_writes_nothing() {
        let (_dir, db) = test_database().await;
        let mut input = report("123456789", at(0, 0));
        input.status_id = 99;

        let err = db.insert_report(&input).await.unwrap_err();
        assert!(matches!(err, VesselError::Storage(_)));

        let err = db.upsert_report(&input).await.unwrap_err();
        assert!(matches!(err, VesselError::Storage(_)));

        assert!(db.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_statuses_are_seeded_in_order() {
        let (_dir, db) = test_database().await;
        // Migrations must be repeatable
        db.run_migrations().await.unwrap();

        let statuses = db.list_statuses().await.unwrap();
        assert_eq!(statuses.len(), 15);
        assert!(statuses.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(statuses[0].id, 1);
        assert_eq!(statuses[0].name, "Under way using engine");
        assert_eq!(statuses[14].id, 15);
    }
}
