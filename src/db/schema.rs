//! Database schema definitions

pub const CREATE_STATUS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS statuses (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
)
"#;

pub const CREATE_REPORTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS vessel_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mmsi TEXT NOT NULL,
    name TEXT NOT NULL,
    status_id INTEGER NOT NULL REFERENCES statuses(id),
    length REAL NOT NULL,
    width REAL NOT NULL,
    draft REAL NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    sog REAL NOT NULL,
    cog REAL NOT NULL,
    heading REAL NOT NULL,
    timestamp BIGINT NOT NULL  -- Unix epoch milliseconds, UTC
)
"#;

// Latest-position and history lookups
pub const CREATE_INDEX_MMSI_TIMESTAMP: &str =
    "CREATE INDEX IF NOT EXISTS idx_reports_mmsi_ts ON vessel_reports(mmsi, timestamp, id)";

// General listing, newest first
pub const CREATE_INDEX_TIMESTAMP: &str =
    "CREATE INDEX IF NOT EXISTS idx_reports_ts ON vessel_reports(timestamp)";

/// AIS navigational statuses, ids shifted by one from the AIS codes 0-14
pub const SEED_STATUSES: &str = r#"
INSERT OR IGNORE INTO statuses (id, name) VALUES
    (1, 'Under way using engine'),
    (2, 'At anchor'),
    (3, 'Not under command'),
    (4, 'Restricted manoeuverability'),
    (5, 'Constrained by her draught'),
    (6, 'Moored'),
    (7, 'Aground'),
    (8, 'Engaged in fishing'),
    (9, 'Under way sailing'),
    (10, 'Reserved for high speed craft'),
    (11, 'Reserved for wing in ground'),
    (12, 'Power-driven vessel towing astern'),
    (13, 'Power-driven vessel pushing ahead or towing alongside'),
    (14, 'Reserved for future use'),
    (15, 'AIS-SART active')
"#;
