use crate::error::StoreError;
use crate::models::{ExtractedValue, ExtractionRecord};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Row};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CSV_HEADER: [&str; 8] = [
    "company",
    "year",
    "indicator_name",
    "value",
    "unit",
    "confidence",
    "source_page",
    "notes",
];

// `value` has no declared type so SQLite keeps text as text and numbers as numbers.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS extractions (
    company TEXT NOT NULL,
    year INTEGER NOT NULL,
    indicator_name TEXT NOT NULL,
    value,
    unit TEXT NOT NULL,
    confidence REAL NOT NULL,
    source_page INTEGER NOT NULL,
    notes TEXT NOT NULL,
    UNIQUE(company, year, indicator_name)
);
";

/// Persistence engine seam: keyed upsert plus an ordered full read.
pub trait RecordStore {
    fn upsert(&self, record: &ExtractionRecord) -> Result<(), StoreError>;

    /// All records ordered by company, then indicator name.
    fn load_all(&self) -> Result<Vec<ExtractionRecord>, StoreError>;
}

impl ToSql for ExtractedValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Number(number) => ToSqlOutput::from(*number),
            Self::Text(text) => ToSqlOutput::from(text.as_str()),
        })
    }
}

impl FromSql for ExtractedValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(number) => Ok(Self::Number(number as f64)),
            ValueRef::Real(number) => Ok(Self::Number(number)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|text| Self::Text(text.to_string()))
                .map_err(|error| FromSqlError::Other(Box::new(error))),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

fn row_to_record(row: &Row) -> Result<ExtractionRecord, rusqlite::Error> {
    Ok(ExtractionRecord {
        company: row.get("company")?,
        year: row.get("year")?,
        indicator_name: row.get("indicator_name")?,
        value: row.get("value")?,
        unit: row.get("unit")?,
        confidence: row.get("confidence")?,
        source_page: row.get("source_page")?,
        notes: row.get("notes")?,
    })
}

/// SQLite-backed record store.
///
/// The connection is not shared across threads; the batch runs on one logical thread.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and its parent directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|error| {
                StoreError::Init(format!("cannot create {}: {error}", parent.display()))
            })?;
        }

        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

impl RecordStore for SqliteStore {
    fn upsert(&self, record: &ExtractionRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO extractions
                 (company, year, indicator_name, value, unit, confidence, source_page, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(company, year, indicator_name) DO UPDATE SET
                 value = excluded.value,
                 unit = excluded.unit,
                 confidence = excluded.confidence,
                 source_page = excluded.source_page,
                 notes = excluded.notes",
            params![
                &record.company,
                record.year,
                &record.indicator_name,
                &record.value,
                &record.unit,
                record.confidence,
                record.source_page,
                &record.notes,
            ],
        )?;

        Ok(())
    }

    fn load_all(&self) -> Result<Vec<ExtractionRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT company, year, indicator_name, value, unit, confidence, source_page, notes
             FROM extractions
             ORDER BY company, indicator_name, year",
        )?;

        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

/// Writes records as CSV with a header row; null values become empty cells.
pub fn write_csv(path: &Path, records: &[ExtractionRecord]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;

    for record in records {
        let value = record
            .value
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let year = record.year.to_string();
        let confidence = record.confidence.to_string();
        let source_page = record.source_page.to_string();

        writer.write_record([
            record.company.as_str(),
            year.as_str(),
            record.indicator_name.as_str(),
            value.as_str(),
            record.unit.as_str(),
            confidence.as_str(),
            source_page.as_str(),
            record.notes.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Wraps a backend so that single-record failures never reach the batch loop.
pub struct ExtractionStore<S> {
    backend: S,
    export_path: PathBuf,
}

impl<S: RecordStore> ExtractionStore<S> {
    pub fn new(backend: S, export_path: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            export_path: export_path.into(),
        }
    }

    pub fn export_path(&self) -> &Path {
        &self.export_path
    }

    /// Upserts one record. A persistence error is logged and the record dropped.
    pub fn save(&self, record: &ExtractionRecord) -> Result<(), StoreError> {
        self.backend.upsert(record).map_err(|error| {
            warn!(
                company = %record.company,
                year = record.year,
                indicator = %record.indicator_name,
                error = %error,
                "save failed, record dropped"
            );
            error
        })
    }

    pub fn try_export(&self) -> Result<Vec<ExtractionRecord>, StoreError> {
        let records = self.backend.load_all()?;
        write_csv(&self.export_path, &records)?;
        Ok(records)
    }

    /// Exports every record to the CSV file. On failure, logs and returns an empty table.
    pub fn export(&self) -> Vec<ExtractionRecord> {
        match self.try_export() {
            Ok(records) => {
                info!(
                    path = %self.export_path.display(),
                    rows = records.len(),
                    "results exported"
                );
                records
            }
            Err(error) => {
                warn!(path = %self.export_path.display(), error = %error, "export failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(
        company: &str,
        indicator: &str,
        value: Option<ExtractedValue>,
        notes: &str,
    ) -> ExtractionRecord {
        ExtractionRecord {
            company: company.to_string(),
            year: 2024,
            indicator_name: indicator.to_string(),
            value,
            unit: "tCO2e".to_string(),
            confidence: 1.0,
            source_page: 7,
            notes: notes.to_string(),
        }
    }

    struct FailingStore;

    impl RecordStore for FailingStore {
        fn upsert(&self, _record: &ExtractionRecord) -> Result<(), StoreError> {
            Err(StoreError::Init("disk full".to_string()))
        }

        fn load_all(&self) -> Result<Vec<ExtractionRecord>, StoreError> {
            Err(StoreError::Init("disk full".to_string()))
        }
    }

    #[test]
    fn second_save_with_same_key_replaces_the_first() -> Result<(), Box<dyn std::error::Error>> {
        let store = SqliteStore::in_memory()?;
        let first = Some(ExtractedValue::Number(10.0));
        let second = Some(ExtractedValue::Number(12.0));
        store.upsert(&record("AIB", "Total Employees", first, "first"))?;
        store.upsert(&record("AIB", "Total Employees", second, "second"))?;

        let all = store.load_all()?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, Some(ExtractedValue::Number(12.0)));
        assert_eq!(all[0].notes, "second");
        Ok(())
    }

    #[test]
    fn different_years_are_different_keys() -> Result<(), Box<dyn std::error::Error>> {
        let store = SqliteStore::in_memory()?;
        let mut older = record("AIB", "Total Employees", None, "");
        older.year = 2023;
        store.upsert(&older)?;
        store.upsert(&record("AIB", "Total Employees", None, ""))?;

        assert_eq!(store.load_all()?.len(), 2);
        Ok(())
    }

    #[test]
    fn values_keep_their_type_through_storage() -> Result<(), Box<dyn std::error::Error>> {
        let store = SqliteStore::in_memory()?;
        store.upsert(&record("AIB", "A", Some(ExtractedValue::Text("500".to_string())), ""))?;
        store.upsert(&record("AIB", "B", Some(ExtractedValue::Number(42.5)), ""))?;
        store.upsert(&record("AIB", "C", None, ""))?;

        let all = store.load_all()?;
        assert_eq!(all[0].value, Some(ExtractedValue::Text("500".to_string())));
        assert_eq!(all[1].value, Some(ExtractedValue::Number(42.5)));
        assert_eq!(all[2].value, None);
        Ok(())
    }

    #[test]
    fn records_are_ordered_by_company_then_indicator() -> Result<(), Box<dyn std::error::Error>> {
        let store = SqliteStore::in_memory()?;
        store.upsert(&record("BBVA", "Board Meetings", None, ""))?;
        store.upsert(&record("AIB", "Total Employees", None, ""))?;
        store.upsert(&record("AIB", "Board Meetings", None, ""))?;

        let keys = store
            .load_all()?
            .into_iter()
            .map(|record| (record.company, record.indicator_name))
            .collect::<Vec<_>>();

        assert_eq!(
            keys,
            vec![
                ("AIB".to_string(), "Board Meetings".to_string()),
                ("AIB".to_string(), "Total Employees".to_string()),
                ("BBVA".to_string(), "Board Meetings".to_string()),
            ]
        );
        Ok(())
    }

    #[test]
    fn open_creates_missing_parent_directory() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("data.db");

        let store = SqliteStore::open(&path)?;
        store.upsert(&record("AIB", "Total Employees", None, ""))?;

        assert!(path.is_file());
        Ok(())
    }

    #[test]
    fn open_fails_when_parent_is_a_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory")?;

        let result = SqliteStore::open(blocker.join("data.db"));
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn export_writes_header_and_rows() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let csv_path = dir.path().join("out").join("results.csv");
        let store = ExtractionStore::new(SqliteStore::in_memory()?, &csv_path);

        store.save(&record("AIB", "Scope 1", Some(ExtractedValue::Number(500.0)), "page, 7"))?;
        store.save(&record("AIB", "Scope 2", None, "not disclosed"))?;

        let exported = store.export();
        assert_eq!(exported.len(), 2);

        let written = fs::read_to_string(&csv_path)?;
        let lines = written.lines().collect::<Vec<_>>();
        assert_eq!(
            lines[0],
            "company,year,indicator_name,value,unit,confidence,source_page,notes"
        );
        assert_eq!(lines[1], "AIB,2024,Scope 1,500,tCO2e,1,7,\"page, 7\"");
        assert_eq!(lines[2], "AIB,2024,Scope 2,,tCO2e,1,7,not disclosed");
        Ok(())
    }

    #[test]
    fn save_failure_is_returned_without_panicking() {
        let store = ExtractionStore::new(FailingStore, "unused.csv");
        assert!(store.save(&record("AIB", "Scope 1", None, "")).is_err());
    }

    #[test]
    fn export_failure_yields_an_empty_table() {
        let store = ExtractionStore::new(FailingStore, "unused.csv");
        assert!(store.export().is_empty());
    }
}
