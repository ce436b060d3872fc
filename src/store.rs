//! Append-only SQLite storage for prediction records.
//!
//! One connection guarded by a mutex; the lock is held across each insert
//! and its `last_insert_rowid` read, so concurrent inserts never observe each
//! other's ids.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::types::{PredictionRecord, PredictionRequest};

pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS predictions (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    longitude             REAL NOT NULL,
    latitude              REAL NOT NULL,
    housing_median_age    REAL NOT NULL,
    total_rooms           REAL NOT NULL,
    total_bedrooms        REAL NOT NULL,
    population            REAL NOT NULL,
    households            REAL NOT NULL,
    median_income         REAL NOT NULL,
    ocean_proximity       TEXT NOT NULL,
    predicted_house_value REAL,
    timestamp             TEXT NOT NULL
);
";

const SELECT_COLUMNS: &str = "id, longitude, latitude, housing_median_age, total_rooms, \
     total_bedrooms, population, households, median_income, ocean_proximity, \
     predicted_house_value, timestamp";

pub struct PredictionStore {
    conn: Mutex<Connection>,
}

impl PredictionStore {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Store one prediction, returning it with its generated id and timestamp.
    pub fn insert(
        &self,
        inputs: &PredictionRequest,
        predicted_house_value: Option<f64>,
    ) -> rusqlite::Result<PredictionRecord> {
        let timestamp = Utc::now();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO predictions (longitude, latitude, housing_median_age, total_rooms, \
             total_bedrooms, population, households, median_income, ocean_proximity, \
             predicted_house_value, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                inputs.longitude,
                inputs.latitude,
                inputs.housing_median_age,
                inputs.total_rooms,
                inputs.total_bedrooms,
                inputs.population,
                inputs.households,
                inputs.median_income,
                inputs.ocean_proximity,
                predicted_house_value,
                timestamp,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        Ok(PredictionRecord {
            id,
            inputs: inputs.clone(),
            predicted_house_value,
            timestamp,
        })
    }

    /// Every stored record, in insertion order.
    pub fn get_all(&self) -> rusqlite::Result<Vec<PredictionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM predictions ORDER BY id ASC",
            SELECT_COLUMNS
        ))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn get_by_id(&self, id: i64) -> rusqlite::Result<Option<PredictionRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM predictions WHERE id = ?1", SELECT_COLUMNS),
            params![id],
            row_to_record,
        )
        .optional()
    }

    pub fn count(&self) -> rusqlite::Result<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM predictions", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<PredictionRecord> {
    let timestamp: DateTime<Utc> = row.get(11)?;
    Ok(PredictionRecord {
        id: row.get(0)?,
        inputs: PredictionRequest {
            longitude: row.get(1)?,
            latitude: row.get(2)?,
            housing_median_age: row.get(3)?,
            total_rooms: row.get(4)?,
            total_bedrooms: row.get(5)?,
            population: row.get(6)?,
            households: row.get(7)?,
            median_income: row.get(8)?,
            ocean_proximity: row.get(9)?,
        },
        predicted_house_value: row.get(10)?,
        timestamp,
    })
}
