use super::SamplePoint;
use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// SQLite's default SQLITE_MAX_VARIABLE_NUMBER.
pub const MAX_PARAMS_PER_STATEMENT: usize = 999;

const COLUMNS: [&str; 9] = [
    "utc",
    "tag",
    "tag_id",
    "data_type",
    "value_numeric",
    "value_text",
    "value_bool",
    "quality",
    "source",
];

/// Rows per multi-row INSERT.
pub const ROWS_PER_STATEMENT: usize = MAX_PARAMS_PER_STATEMENT / COLUMNS.len();

/// Destination of flushed sample batches.
///
/// Calls are blocking; the writer runs them on the blocking thread pool.
pub trait HistoryStore: Send + Sync {
    /// Create the sample table and indexes if absent. Idempotent.
    fn ensure_schema(&self) -> GatewayResult<()>;

    /// Persist a batch in one transaction. Returns the number of rows written.
    fn write_batch(&self, batch: &[SamplePoint], source: u8) -> GatewayResult<usize>;
}

/// A persisted sample as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSample {
    pub utc: DateTime<Utc>,
    pub tag: String,
    pub tag_id: Option<i64>,
    pub data_type: u8,
    pub value_numeric: Option<f64>,
    pub value_text: Option<String>,
    pub value_bool: Option<bool>,
    pub quality: String,
    pub source: Option<u8>,
}

/// Format timestamps so that text order equals time order.
fn utc_text(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// SQLite historian.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE samples (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     utc TEXT NOT NULL,
///     tag TEXT NOT NULL,
///     tag_id INTEGER,
///     data_type INTEGER NOT NULL,
///     value_numeric REAL,
///     value_text TEXT,
///     value_bool INTEGER,
///     quality TEXT NOT NULL,
///     source INTEGER
/// );
/// CREATE INDEX idx_samples_tag_utc ON samples(tag, utc);
/// ```
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    pub fn open(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            GatewayError::Persistence(format!("failed to open {}: {}", path.display(), e))
        })?;
        info!("Historian database opened at {}", path.display());
        Ok(SqliteHistoryStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> GatewayResult<Self> {
        Ok(SqliteHistoryStore {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Samples of one tag within `[from, to]`, oldest first.
    pub fn samples_for_tag(
        &self,
        tag: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> GatewayResult<Vec<StoredSample>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT utc, tag, tag_id, data_type, value_numeric, value_text, value_bool, quality, source
             FROM samples
             WHERE tag = ?1 AND utc BETWEEN ?2 AND ?3
             ORDER BY utc ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![tag, utc_text(&from), utc_text(&to)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    StoredSample {
                        utc: DateTime::<Utc>::default(),
                        tag: row.get(1)?,
                        tag_id: row.get(2)?,
                        data_type: row.get(3)?,
                        value_numeric: row.get(4)?,
                        value_text: row.get(5)?,
                        value_bool: row.get(6)?,
                        quality: row.get(7)?,
                        source: row.get(8)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(utc, mut sample)| {
                sample.utc = DateTime::parse_from_rfc3339(&utc)
                    .map_err(|e| GatewayError::Persistence(format!("bad utc '{}': {}", utc, e)))?
                    .with_timezone(&Utc);
                Ok(sample)
            })
            .collect()
    }

    pub fn row_count(&self) -> GatewayResult<usize> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn ensure_schema(&self) -> GatewayResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                utc TEXT NOT NULL,
                tag TEXT NOT NULL,
                tag_id INTEGER,
                data_type INTEGER NOT NULL,
                value_numeric REAL,
                value_text TEXT,
                value_bool INTEGER,
                quality TEXT NOT NULL,
                source INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_samples_tag_utc ON samples(tag, utc);",
        )?;
        Ok(())
    }

    fn write_batch(&self, batch: &[SamplePoint], source: u8) -> GatewayResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut written = 0;

        for chunk in batch.chunks(ROWS_PER_STATEMENT) {
            let row = format!("({})", vec!["?"; COLUMNS.len()].join(","));
            let sql = format!(
                "INSERT INTO samples ({}) VALUES {}",
                COLUMNS.join(","),
                vec![row.as_str(); chunk.len()].join(",")
            );
            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * COLUMNS.len());
            for p in chunk {
                values.push(Value::Text(utc_text(&p.utc)));
                values.push(Value::Text(p.tag.clone()));
                values.push(p.tag_id.map(Value::Integer).unwrap_or(Value::Null));
                values.push(Value::Integer(p.data_type.code() as i64));
                values.push(p.value_numeric.map(Value::Real).unwrap_or(Value::Null));
                values.push(p.value_text.clone().map(Value::Text).unwrap_or(Value::Null));
                values.push(p.value_bool.map(|b| Value::Integer(b as i64)).unwrap_or(Value::Null));
                values.push(Value::Text(p.quality.as_str().to_string()));
                values.push(Value::Integer(source as i64));
            }
            written += tx.execute(&sql, params_from_iter(values.iter()))?;
        }

        tx.commit()?;
        debug!("Inserted {} rows into samples", written);
        Ok(written)
    }
}

/// Store used when history is disabled: accepts and discards everything.
#[derive(Debug, Default)]
pub struct NullHistoryStore {
    warned: AtomicBool,
}

impl HistoryStore for NullHistoryStore {
    fn ensure_schema(&self) -> GatewayResult<()> {
        Ok(())
    }

    fn write_batch(&self, batch: &[SamplePoint], _source: u8) -> GatewayResult<usize> {
        if !self.warned.swap(true, Ordering::Relaxed) {
            info!("History is disabled; discarding samples");
        }
        Ok(batch.len())
    }
}
