//! Append-only prediction log backed by SQLite.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StoreError;
use crate::types::{ListQuery, NewPrediction, RiskLevel, StoredPrediction};

/// Persistence seam for prediction records. Records are never updated or
/// deleted once saved.
pub trait PredictionStore: Send + Sync {
    /// Persists `record` and returns it with its assigned id.
    fn save(&self, record: &NewPrediction) -> Result<StoredPrediction, StoreError>;

    /// Newest first, filtered to `[start_time, end_time]` at microsecond
    /// resolution, then paged.
    fn list(&self, query: &ListQuery) -> Result<Vec<StoredPrediction>, StoreError>;

    fn get(&self, id: i64) -> Result<StoredPrediction, StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS predictions (
    id                            INTEGER PRIMARY KEY AUTOINCREMENT,
    lat_a                         REAL,
    lon_a                         REAL,
    lat_b                         REAL,
    lon_b                         REAL,
    distance_km                   REAL    NOT NULL,
    hour                          INTEGER NOT NULL,
    weekday                       INTEGER NOT NULL,
    weather                       INTEGER NOT NULL,
    incident                      INTEGER NOT NULL,
    average_speed                 REAL    NOT NULL,
    vehicle_flow                  REAL    NOT NULL,
    risk                          TEXT    NOT NULL,
    probability                   REAL    NOT NULL,
    predicted_speed               REAL    NOT NULL,
    predicted_travel_time_minutes REAL    NOT NULL,
    created_at                    INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_predictions_created_at ON predictions (created_at);
";

const COLUMNS: &str = "id, lat_a, lon_a, lat_b, lon_b, distance_km, hour, weekday, weather,
     incident, average_speed, vehicle_flow, risk, probability, predicted_speed,
     predicted_travel_time_minutes, created_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database file and makes sure the schema exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// `":memory:"` selects an in-memory database, anything else is a file path.
    pub fn open_location(location: &str) -> Result<Self, StoreError> {
        if location == ":memory:" {
            Self::open_in_memory()
        } else {
            Self::open(Path::new(location))
        }
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        tracing::info!("prediction store ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl PredictionStore for SqliteStore {
    fn save(&self, record: &NewPrediction) -> Result<StoredPrediction, StoreError> {
        let conn = self.conn.lock();
        let input = &record.input;
        conn.execute(
            "INSERT INTO predictions (lat_a, lon_a, lat_b, lon_b, distance_km, hour, weekday,
                weather, incident, average_speed, vehicle_flow, risk, probability,
                predicted_speed, predicted_travel_time_minutes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                input.lat_a,
                input.lon_a,
                input.lat_b,
                input.lon_b,
                record.distance_km,
                input.hour,
                input.weekday,
                input.weather,
                input.incident,
                input.average_speed,
                input.vehicle_flow,
                record.risk.as_str(),
                record.probability,
                record.predicted_speed,
                record.predicted_travel_time_minutes,
                record.created_at.timestamp_micros(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        fetch(&conn, id)
    }

    fn list(&self, query: &ListQuery) -> Result<Vec<StoredPrediction>, StoreError> {
        let mut clauses = Vec::new();
        let mut dyn_params: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(start) = query.start_time {
            dyn_params.push(Box::new(start.timestamp_micros()));
            clauses.push(format!("created_at >= ?{}", dyn_params.len()));
        }
        if let Some(end) = query.end_time {
            dyn_params.push(Box::new(end.timestamp_micros()));
            clauses.push(format!("created_at <= ?{}", dyn_params.len()));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        dyn_params.push(Box::new(i64::from(query.limit)));
        let limit_idx = dyn_params.len();
        dyn_params.push(Box::new(i64::from(query.skip)));
        let offset_idx = dyn_params.len();

        let sql = format!(
            "SELECT {COLUMNS} FROM predictions{where_clause}
             ORDER BY created_at DESC, id DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = dyn_params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), parse_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn get(&self, id: i64) -> Result<StoredPrediction, StoreError> {
        let conn = self.conn.lock();
        fetch(&conn, id)
    }
}

fn fetch(conn: &Connection, id: i64) -> Result<StoredPrediction, StoreError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM predictions WHERE id = ?1"),
        params![id],
        parse_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound(id))
}

fn parse_row(row: &Row<'_>) -> rusqlite::Result<StoredPrediction> {
    let risk = match row.get::<_, String>(12)?.as_str() {
        "high" => RiskLevel::High,
        "low" => RiskLevel::Low,
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                12,
                Type::Text,
                format!("unknown risk level {other:?}").into(),
            ))
        }
    };
    let micros: i64 = row.get(16)?;
    let created_at = DateTime::<Utc>::from_timestamp_micros(micros).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            16,
            Type::Integer,
            format!("timestamp {micros} out of range").into(),
        )
    })?;

    Ok(StoredPrediction {
        id: row.get(0)?,
        lat_a: row.get(1)?,
        lon_a: row.get(2)?,
        lat_b: row.get(3)?,
        lon_b: row.get(4)?,
        distance_km: row.get(5)?,
        hour: row.get(6)?,
        weekday: row.get(7)?,
        weather: row.get(8)?,
        incident: row.get(9)?,
        average_speed: row.get(10)?,
        vehicle_flow: row.get(11)?,
        risk,
        probability: row.get(13)?,
        predicted_speed: row.get(14)?,
        predicted_travel_time_minutes: row.get(15)?,
        created_at,
    })
}
