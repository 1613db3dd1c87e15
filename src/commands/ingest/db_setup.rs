use std::time::Duration;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension};

use super::DB_SCHEMA_VERSION;
use super::errors::FatalConfigError;
use crate::util::now_utc_string;

/// Columns the importer adds to the crawler's `inspections` table.
const INSPECTION_COLUMNS: &[&str] = &[
    "inspector_name TEXT",
    "person_interviewed TEXT",
    "person_title TEXT",
    "inspection_action TEXT",
    "license_year_class TEXT",
    "remarks_text TEXT",
    "reinspection_required INTEGER DEFAULT 0",
    "report_kennel_name TEXT",
    "report_owner_name TEXT",
    "report_license_number TEXT",
    "report_county TEXT",
    "report_township TEXT",
    "imported_at TEXT",
];

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("kennels", &["kennel_id", "license_number"]),
    (
        "inspections",
        &[
            "id",
            "kennel_id",
            "inspection_date",
            "pdf_path",
            "inspector_name",
            "remarks_text",
            "reinspection_required",
            "imported_at",
        ],
    ),
    (
        "dog_counts",
        &[
            "inspection_id",
            "year_type",
            "boarding",
            "breeding",
            "other_count",
            "transfer",
            "on_prem",
            "off_site",
        ],
    ),
    (
        "inspection_items",
        &[
            "inspection_id",
            "category_section",
            "category_code",
            "category_name",
            "result",
            "result_raw",
        ],
    ),
];

pub(crate) fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys")?;
    connection
        .busy_timeout(Duration::from_secs(5))
        .context("failed to set busy timeout")?;
    Ok(())
}

pub(crate) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS kennels (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          kennel_id INTEGER UNIQUE,
          name TEXT,
          address TEXT,
          city TEXT,
          state TEXT,
          zip_code TEXT,
          county TEXT,
          township TEXT,
          license_number TEXT,
          last_status TEXT,
          last_issued_license_year TEXT,
          last_license_class TEXT,
          details_url TEXT,
          created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS inspections (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          kennel_id INTEGER,
          inspection_date TEXT,
          pdf_url TEXT,
          pdf_path TEXT,
          downloaded INTEGER DEFAULT 0,
          created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
          FOREIGN KEY (kennel_id) REFERENCES kennels(kennel_id),
          UNIQUE(kennel_id, inspection_date)
        );

        CREATE TABLE IF NOT EXISTS dog_counts (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          inspection_id INTEGER NOT NULL,
          year_type TEXT NOT NULL,
          boarding INTEGER,
          breeding INTEGER,
          other_count INTEGER,
          transfer INTEGER,
          on_prem INTEGER,
          off_site INTEGER,
          FOREIGN KEY (inspection_id) REFERENCES inspections(id) ON DELETE CASCADE,
          UNIQUE(inspection_id, year_type)
        );

        CREATE TABLE IF NOT EXISTS inspection_items (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          inspection_id INTEGER NOT NULL,
          category_section TEXT,
          category_code TEXT,
          category_name TEXT,
          result TEXT,
          result_raw TEXT,
          FOREIGN KEY (inspection_id) REFERENCES inspections(id) ON DELETE CASCADE
        );
        ",
    )?;

    for column in INSPECTION_COLUMNS {
        ensure_column_exists(connection, "inspections", column)?;
    }
    ensure_column_exists(connection, "inspection_items", "result_raw TEXT")?;

    connection.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_kennels_license ON kennels(license_number);
        CREATE INDEX IF NOT EXISTS idx_inspections_pdf_path ON inspections(pdf_path);
        CREATE INDEX IF NOT EXISTS idx_dog_counts_inspection ON dog_counts(inspection_id);
        CREATE INDEX IF NOT EXISTS idx_inspection_items_inspection ON inspection_items(inspection_id);
        CREATE INDEX IF NOT EXISTS idx_inspection_items_result ON inspection_items(result);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

/// Checks an existing store without modifying it; used when schema initialization is off.
pub(crate) fn verify_schema(connection: &Connection) -> Result<(), FatalConfigError> {
    let store_error = |error: rusqlite::Error| FatalConfigError::Store(error.to_string());

    for (table_name, columns) in REQUIRED_COLUMNS {
        let existing = table_columns(connection, table_name).map_err(store_error)?;
        if existing.is_empty() {
            return Err(FatalConfigError::Schema(format!(
                "table {table_name} is missing"
            )));
        }

        for column in *columns {
            if !existing.iter().any(|name| name == column) {
                return Err(FatalConfigError::Schema(format!(
                    "column {table_name}.{column} is missing"
                )));
            }
        }
    }

    let recorded_version = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'db_schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|error| FatalConfigError::Schema(format!("metadata unreadable: {error}")))?;

    if let Some(version) = recorded_version {
        if major_version(&version) != major_version(DB_SCHEMA_VERSION) {
            return Err(FatalConfigError::Schema(format!(
                "store schema version {version} is incompatible with {DB_SCHEMA_VERSION}"
            )));
        }
    }

    Ok(())
}

fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

fn table_columns(connection: &Connection, table_name: &str) -> rusqlite::Result<Vec<String>> {
    let pragma_sql = format!("PRAGMA table_info({table_name})");
    let mut statement = connection.prepare(&pragma_sql)?;
    let columns = statement
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(columns)
}

fn ensure_column_exists(
    connection: &Connection,
    table_name: &str,
    column_definition: &str,
) -> Result<()> {
    let Some(column_name) = column_definition.split_whitespace().next() else {
        bail!("invalid column definition: {column_definition}");
    };

    let existing = table_columns(connection, table_name)
        .with_context(|| format!("failed to inspect schema for table {table_name}"))?;
    if existing.iter().any(|name| name == column_name) {
        return Ok(());
    }

    let alter_sql = format!("ALTER TABLE {table_name} ADD COLUMN {column_definition}");
    connection
        .execute(&alter_sql, [])
        .with_context(|| format!("failed to add column {column_name} on {table_name}"))?;

    Ok(())
}
