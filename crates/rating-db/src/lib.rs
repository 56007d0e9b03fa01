//! SQLite persistence for user metadata keyed by content identity.
//!
//! The viewer keeps one database per scan root at:
//!   {root}/_metadata/ratings.sqlite3
//!
//! Stores: rating score and play count per content hash, plus the time of
//! the last change. Rows are keyed by hash rather than path so a rating
//! follows the bytes across renames, moves and duplicate copies.
//!
//! Both mutations are single `INSERT .. ON CONFLICT DO UPDATE .. RETURNING`
//! statements, so a read-modify-write for one key can never lose a
//! concurrent update. Uses WAL mode so reindex reads do not block writers.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// File name of the ratings database inside the metadata directory.
pub const DB_FILE_NAME: &str = "ratings.sqlite3";

/// Persisted user metadata for one content hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub score: i64,
    pub play_count: i64,
    /// `None` for hashes that have never been written.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Ratings database handle. Safe to share between request threads.
pub struct RatingStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl RatingStore {
    /// Open or create the ratings database inside `metadata_dir`.
    pub fn open(metadata_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(metadata_dir).with_context(|| {
            format!("Failed to create metadata dir: {}", metadata_dir.display())
        })?;
        Self::open_at(&metadata_dir.join(DB_FILE_NAME))
    }

    /// Open a database at a specific path.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        create_tables(&conn)?;
        migrate_play_count(&conn)?;

        debug!(path = %db_path.display(), "ratings database ready");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_path_buf(),
        })
    }

    /// Get the database file path.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    // -- Reads --

    /// Current record for `hash`, or the zero record if it was never rated or played.
    pub fn get(&self, hash: &str) -> Result<RatingRecord> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT score, play_count, updated_at FROM ratings WHERE hash = ?1",
                params![hash],
                |row| {
                    Ok(RatingRecord {
                        score: row.get(0)?,
                        play_count: row.get(1)?,
                        updated_at: seconds_to_datetime(row.get(2)?),
                    })
                },
            )
            .optional()?;
        Ok(record.unwrap_or_default())
    }

    /// Load every record, keyed by hash. Used once per reindex for the join.
    pub fn load_all(&self) -> Result<HashMap<String, RatingRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT hash, score, play_count, updated_at FROM ratings")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                RatingRecord {
                    score: row.get(1)?,
                    play_count: row.get(2)?,
                    updated_at: seconds_to_datetime(row.get(3)?),
                },
            ))
        })?;

        let mut records = HashMap::new();
        for row in rows {
            let (hash, record) = row?;
            records.insert(hash, record);
        }
        Ok(records)
    }

    /// Number of hashes with a stored record.
    pub fn record_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM ratings", [], |row| row.get(0))?;
        Ok(count)
    }

    // -- Mutations --

    /// Add `delta` to the score for `hash`, creating the row at zero first if
    /// needed. Returns the new score. Scores are unbounded in both directions.
    pub fn apply_rating_delta(&self, hash: &str, delta: i64) -> Result<i64> {
        let score: i64 = self
            .conn
            .lock()
            .query_row(
                "INSERT INTO ratings (hash, score, play_count, updated_at)
                 VALUES (?1, ?2, 0, ?3)
                 ON CONFLICT(hash) DO UPDATE SET
                     score = score + excluded.score,
                     updated_at = excluded.updated_at
                 RETURNING score",
                params![hash, delta, now_seconds()],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to update rating for {}", hash))?;
        Ok(score)
    }

    /// Increment the play count for `hash`. Returns the new count.
    pub fn increment_play_count(&self, hash: &str) -> Result<i64> {
        let count: i64 = self
            .conn
            .lock()
            .query_row(
                "INSERT INTO ratings (hash, score, play_count, updated_at)
                 VALUES (?1, 0, 1, ?2)
                 ON CONFLICT(hash) DO UPDATE SET
                     play_count = play_count + 1,
                     updated_at = excluded.updated_at
                 RETURNING play_count",
                params![hash, now_seconds()],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to update play count for {}", hash))?;
        Ok(count)
    }
}

// -- Schema --

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS ratings (
            hash TEXT PRIMARY KEY,
            score INTEGER NOT NULL DEFAULT 0,
            play_count INTEGER NOT NULL DEFAULT 0,
            updated_at REAL NOT NULL DEFAULT (strftime('%s','now'))
        );

        CREATE INDEX IF NOT EXISTS idx_ratings_score ON ratings(score);
        ",
    )?;
    Ok(())
}

/// Databases created before play counts existed lack the column.
fn migrate_play_count(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(ratings)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;

    if !columns.iter().any(|name| name == "play_count") {
        info!("adding play_count column to existing ratings table");
        conn.execute_batch(
            "ALTER TABLE ratings ADD COLUMN play_count INTEGER NOT NULL DEFAULT 0;",
        )?;
    }
    Ok(())
}

// -- Utility --

fn now_seconds() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn seconds_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64)
}
