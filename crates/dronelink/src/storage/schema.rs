//! `SQLite` schema for persisted telemetry points.

/// SQL statement to create the points table.
pub const CREATE_POINTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS points (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at TEXT NOT NULL,
    drone_index INTEGER NOT NULL,
    x REAL NOT NULL,
    y REAL NOT NULL,
    z REAL NOT NULL,
    w REAL
)
";

/// Index for reading one drone's track in insertion order.
pub const CREATE_DRONE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_points_drone ON points(drone_index, id)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// Statement used to persist one point.
pub const INSERT_POINT: &str = r"
INSERT INTO points (recorded_at, drone_index, x, y, z, w)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_POINTS_TABLE,
    CREATE_DRONE_INDEX,
    CREATE_METADATA_TABLE,
];
