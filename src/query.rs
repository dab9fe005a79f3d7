//! Map and table views derived from the vessel store

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::db::Database;
use crate::error::{Result, VesselError};
use crate::models::{Mmsi, VesselReport};

const COORDINATE_DECIMALS: usize = 6;
const MOTION_DECIMALS: usize = 1;

/// Fixed-point rendering of `value` with `decimals` digits, rounding half
/// away from zero.
///
/// Binary floats such as `90.05` sit just below the decimal midpoint, so a
/// scaled value within a small tolerance of `.5` is treated as the midpoint.
pub fn fixed(value: f64, decimals: usize) -> String {
    let factor = 10f64.powi(decimals as i32);
    let scaled = value * factor;
    let rounded = if (scaled.fract().abs() - 0.5).abs() < 1e-9 {
        scaled.trunc() + scaled.signum()
    } else {
        scaled.round()
    };
    // Avoid "-0.0"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{:.*}", decimals, rounded / factor)
}

/// A report as served to map and table views
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionView {
    pub mmsi: Mmsi,
    pub name: String,
    pub status_id: i64,
    pub length: f64,
    pub width: f64,
    pub draft: f64,
    pub latitude: String,
    pub longitude: String,
    pub sog: String,
    pub cog: String,
    pub heading: String,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub timestamp: DateTime<Utc>,
    pub position_count: i64,
}

fn serialize_rfc3339<S: serde::Serializer>(
    ts: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

impl PositionView {
    pub fn new(report: VesselReport, position_count: i64) -> Self {
        Self {
            latitude: fixed(report.latitude, COORDINATE_DECIMALS),
            longitude: fixed(report.longitude, COORDINATE_DECIMALS),
            sog: fixed(report.sog, MOTION_DECIMALS),
            cog: fixed(report.cog, MOTION_DECIMALS),
            heading: fixed(report.heading, MOTION_DECIMALS),
            mmsi: report.mmsi,
            name: report.name,
            status_id: report.status_id,
            length: report.length,
            width: report.width,
            draft: report.draft,
            timestamp: report.timestamp,
            position_count,
        }
    }
}

/// One vessel as listed in pickers: identity, dimensions and current speed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VesselSummary {
    pub mmsi: Mmsi,
    pub name: String,
    pub sog: f64,
    pub length: f64,
    pub width: f64,
    pub draft: f64,
}

impl From<VesselReport> for VesselSummary {
    fn from(report: VesselReport) -> Self {
        Self {
            mmsi: report.mmsi,
            name: report.name,
            sog: report.sog,
            length: report.length,
            width: report.width,
            draft: report.draft,
        }
    }
}

/// Shapes store results for map and table views. Holds no state of its own.
#[derive(Clone)]
pub struct QueryService {
    db: Database,
}

impl QueryService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Latest position of every vessel, ordered by MMSI
    pub async fn latest_positions(&self) -> Result<Vec<PositionView>> {
        let latest = self.db.find_latest_per_vessel().await?;
        Ok(latest
            .into_iter()
            .map(|l| PositionView::new(l.report, l.position_count))
            .collect())
    }

    /// Trajectory of one vessel, oldest first.
    ///
    /// Fails with [`VesselError::NotFound`] when the vessel has no reports.
    pub async fn trajectory_for(&self, mmsi: &Mmsi) -> Result<Vec<PositionView>> {
        let history = self.db.find_history(mmsi).await?;
        if history.is_empty() {
            return Err(VesselError::NotFound(mmsi.to_string()));
        }

        let count = history.len() as i64;
        Ok(history
            .into_iter()
            .map(|report| PositionView::new(report, count))
            .collect())
    }

    /// Current position of one vessel
    pub async fn latest_for(&self, mmsi: &Mmsi) -> Result<PositionView> {
        let report = self
            .db
            .find_latest(mmsi)
            .await?
            .ok_or_else(|| VesselError::NotFound(mmsi.to_string()))?;
        let count = self.db.count_reports(mmsi).await?;
        Ok(PositionView::new(report, count))
    }

    /// Every known vessel once, ordered by name then MMSI
    pub async fn vessel_catalog(&self) -> Result<Vec<VesselSummary>> {
        let mut vessels: Vec<VesselSummary> = self
            .db
            .find_latest_per_vessel()
            .await?
            .into_iter()
            .map(|latest| latest.report.into())
            .collect();
        vessels.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.mmsi.cmp(&b.mmsi)));
        Ok(vessels)
    }

    /// Every report, newest first
    pub async fn list_reports(&self) -> Result<Vec<PositionView>> {
        let reports = self.db.find_all().await?;

        let mut counts = std::collections::HashMap::<Mmsi, i64>::new();
        for report in &reports {
            *counts.entry(report.mmsi.clone()).or_default() += 1;
        }

        Ok(reports
            .into_iter()
            .map(|report| {
                let count = counts.get(&report.mmsi).copied().unwrap_or(1);
                PositionView::new(report, count)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{at, report, test_database};

    #[test]
    fn test_fixed_rounds_half_away_from_zero() {
        assert_eq!(fixed(5.25, 1), "5.3");
        assert_eq!(fixed(90.05, 1), "90.1");
        assert_eq!(fixed(-5.25, 1), "-5.3");
        assert_eq!(fixed(0.15, 1), "0.2");
        assert_eq!(fixed(90.0, 1), "90.0");
        assert_eq!(fixed(5.24, 1), "5.2");
    }

    #[test]
    fn test_fixed_coordinates() {
        assert_eq!(fixed(10.123456, 6), "10.123456");
        assert_eq!(fixed(-20.654321, 6), "-20.654321");
        assert_eq!(fixed(1.0, 6), "1.000000");
        assert_eq!(fixed(59.4370005, 6), "59.437001");
    }

    #[test]
    fn test_fixed_never_prints_negative_zero() {
        assert_eq!(fixed(-0.04, 1), "0.0");
        assert_eq!(fixed(-0.0, 6), "0.000000");
    }

    #[tokio::test]
    async fn test_latest_positions_are_formatted() {
        let (_dir, db) = test_database().await;
        db.insert_report(&report("123456789", at(0, 0))).await.unwrap();
        let service = QueryService::new(db);

        let latest = service.latest_positions().await.unwrap();

        assert_eq!(latest.len(), 1);
        let alpha = &latest[0];
        assert_eq!(alpha.mmsi.as_str(), "123456789");
        assert_eq!(alpha.latitude, "10.123456");
        assert_eq!(alpha.longitude, "-20.654321");
        assert_eq!(alpha.sog, "5.3");
        assert_eq!(alpha.cog, "90.1");
        assert_eq!(alpha.heading, "90.0");
        assert_eq!(alpha.position_count, 1);
    }

    #[tokio::test]
    async fn test_trajectory_is_time_ordered() {
        let (_dir, db) = test_database().await;
        for minute in [45, 5, 25] {
            db.insert_report(&report("123456789", at(2, minute)))
                .await
                .unwrap();
        }
        let service = QueryService::new(db);
        let mmsi = Mmsi::try_from("123456789").unwrap();

        let trajectory = service.trajectory_for(&mmsi).await.unwrap();

        assert_eq!(trajectory.len(), 3);
        assert!(trajectory.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(trajectory.iter().all(|p| p.position_count == 3));
    }

    #[tokio::test]
    async fn test_trajectory_of_unknown_vessel_is_not_found() {
        let (_dir, db) = test_database().await;
        let service = QueryService::new(db);
        let mmsi = Mmsi::try_from("555555555").unwrap();

        let err = service.trajectory_for(&mmsi).await.unwrap_err();
        assert!(matches!(err, VesselError::NotFound(ref m) if m == "555555555"));
    }

    #[tokio::test]
    async fn test_latest_for_one_vessel() {
        let (_dir, db) = test_database().await;
        db.insert_report(&report("123456789", at(3, 0))).await.unwrap();
        let mut moved = report("123456789", at(4, 0));
        moved.latitude = 11.0;
        db.insert_report(&moved).await.unwrap();
        db.insert_report(&report("987654321", at(5, 0))).await.unwrap();
        let service = QueryService::new(db);

        let mmsi = Mmsi::try_from("123456789").unwrap();
        let latest = service.latest_for(&mmsi).await.unwrap();
        assert_eq!(latest.latitude, "11.000000");
        assert_eq!(latest.position_count, 2);

        let unknown = Mmsi::try_from("555555555").unwrap();
        assert!(matches!(
            service.latest_for(&unknown).await,
            Err(VesselError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_vessel_catalog_is_ordered_by_name() {
        let (_dir, db) = test_database().await;
        let mut zulu = report("100000000", at(1, 0));
        zulu.name = "Zulu".to_string();
        db.insert_report(&zulu).await.unwrap();
        let mut zulu_later = report("100000000", at(2, 0));
        zulu_later.name = "Zulu".to_string();
        zulu_later.sog = 12.0;
        db.insert_report(&zulu_later).await.unwrap();
        db.insert_report(&report("200000000", at(3, 0))).await.unwrap();
        let service = QueryService::new(db);

        let catalog = service.vessel_catalog().await.unwrap();
        let names: Vec<&str> = catalog.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zulu"]);
        assert_eq!(catalog[1].sog, 12.0);
        assert_eq!(catalog[1].mmsi.as_str(), "100000000");
    }

    #[tokio::test]
    async fn test_list_reports_counts_per_vessel() {
        let (_dir, db) = test_database().await;
        db.insert_report(&report("100000000", at(1, 0))).await.unwrap();
        db.insert_report(&report("100000000", at(2, 0))).await.unwrap();
        db.insert_report(&report("200000000", at(3, 0))).await.unwrap();
        let service = QueryService::new(db);

        let all = service.list_reports().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].mmsi.as_str(), "200000000");
        assert_eq!(all[0].position_count, 1);
        assert_eq!(all[1].position_count, 2);
    }

    #[test]
    fn test_position_view_json_shape() {
        let view = PositionView::new(
            VesselReport {
                id: 7,
                mmsi: Mmsi::try_from("123456789").unwrap(),
                name: "Alpha".to_string(),
                status_id: 1,
                length: 10.0,
                width: 3.0,
                draft: 1.5,
                latitude: 10.123456,
                longitude: -20.654321,
                sog: 5.25,
                cog: 90.05,
                heading: 90.0,
                timestamp: at(0, 0),
            },
            1,
        );
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["mmsi"], "123456789");
        assert_eq!(json["statusId"], 1);
        assert_eq!(json["latitude"], "10.123456");
        assert_eq!(json["sog"], "5.3");
        assert_eq!(json["timestamp"], "2024-01-01T00:00:00Z");
        assert_eq!(json["positionCount"], 1);
    }
}
