use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::debug;

use super::errors::{FatalConfigError, PersistError};
use super::types::{DocumentRef, ImportOutcome, InspectionRecord, ParsedRecord, WorkResult};
use crate::util::now_utc_string;

enum UnitWrite {
    Written(i64),
    Conflict { bound_path: String },
}

/// Applies one worker result to the store and classifies it.
///
/// Only store-level lookup failures are returned as errors; everything that concerns the
/// single document becomes an [`ImportOutcome`].
pub(crate) fn apply_result(
    connection: &mut Connection,
    result: &WorkResult,
) -> Result<ImportOutcome, FatalConfigError> {
    let record = match &result.record {
        ParsedRecord::Failed(failure) => {
            return Ok(ImportOutcome::ParseFailed {
                reason: failure.to_string(),
            });
        }
        ParsedRecord::Parsed(record) => record,
    };

    let kennel_id = resolve_owner(connection, &result.document, record)
        .map_err(|error| FatalConfigError::Store(format!("kennel lookup failed: {error}")))?;
    let Some(kennel_id) = kennel_id else {
        return Ok(ImportOutcome::SkippedUnresolvedOwner {
            owner_key: result.document.owner_key.clone(),
        });
    };

    match persist_inspection(connection, &result.document, kennel_id, record) {
        Ok(inspection_id) => {
            debug!(
                path = %result.document.path.display(),
                inspection_id,
                findings = record.findings.len(),
                "committed inspection"
            );
            Ok(ImportOutcome::Imported {
                inspection_id,
                violations: record.violation_count(),
            })
        }
        Err(error) => Ok(ImportOutcome::PersistFailed {
            reason: error.to_string(),
        }),
    }
}

/// Looks up the kennel by the document's owner key, then by the license printed in the report.
pub(crate) fn resolve_owner(
    connection: &Connection,
    document: &DocumentRef,
    record: &InspectionRecord,
) -> rusqlite::Result<Option<i64>> {
    let mut keys = Vec::new();
    if !document.owner_key.trim().is_empty() {
        keys.push(document.owner_key.trim());
    }
    if let Some(license) = record.header.license_number.as_deref() {
        if !keys.contains(&license) {
            keys.push(license);
        }
    }

    let mut statement = connection.prepare_cached(
        "SELECT kennel_id FROM kennels
         WHERE license_number = ?1 AND kennel_id IS NOT NULL
         ORDER BY id LIMIT 1",
    )?;
    for key in keys {
        let found = statement
            .query_row([key], |row| row.get::<_, i64>(0))
            .optional()?;
        if found.is_some() {
            return Ok(found);
        }
    }

    Ok(None)
}

/// Writes header, counts and findings as one transaction; nothing survives a failure.
pub(crate) fn persist_inspection(
    connection: &mut Connection,
    document: &DocumentRef,
    kennel_id: i64,
    record: &InspectionRecord,
) -> Result<i64, PersistError> {
    let path = document.path_key();
    let store_error = |source: rusqlite::Error| PersistError::Store {
        path: path.clone(),
        source,
    };

    let tx = connection.transaction().map_err(store_error)?;
    match write_unit(&tx, &path, kennel_id, record).map_err(store_error)? {
        UnitWrite::Written(inspection_id) => {
            tx.commit().map_err(store_error)?;
            Ok(inspection_id)
        }
        UnitWrite::Conflict { bound_path } => Err(PersistError::Conflict {
            path: path.clone(),
            inspection_date: record.header.inspection_date.clone(),
            bound_path,
        }),
    }
}

fn write_unit(
    tx: &Transaction<'_>,
    path: &str,
    kennel_id: i64,
    record: &InspectionRecord,
) -> rusqlite::Result<UnitWrite> {
    let header = &record.header;

    let inspection_id = match locate_inspection(tx, path, kennel_id, &header.inspection_date)? {
        Located::Found(id) => id,
        Located::BoundElsewhere(bound_path) => return Ok(UnitWrite::Conflict { bound_path }),
        Located::Missing => {
            tx.execute(
                "INSERT INTO inspections(kennel_id, inspection_date, pdf_path, downloaded)
                 VALUES(?1, ?2, ?3, 1)",
                params![kennel_id, header.inspection_date, path],
            )?;
            tx.last_insert_rowid()
        }
    };

    tx.execute(
        "
        UPDATE inspections SET
          pdf_path = ?2,
          inspector_name = ?3,
          person_interviewed = ?4,
          person_title = ?5,
          inspection_action = ?6,
          license_year_class = ?7,
          remarks_text = ?8,
          reinspection_required = ?9,
          report_kennel_name = ?10,
          report_owner_name = ?11,
          report_license_number = ?12,
          report_county = ?13,
          report_township = ?14,
          imported_at = NULL
        WHERE id = ?1
        ",
        params![
            inspection_id,
            path,
            header.inspector_name,
            header.person_interviewed,
            header.person_title,
            header.inspection_action,
            header.license_year_class,
            header.remarks,
            header.reinspection_required,
            header.kennel_name,
            header.owner_name,
            header.license_number,
            header.county,
            header.township,
        ],
    )?;

    tx.execute(
        "DELETE FROM dog_counts WHERE inspection_id = ?1",
        [inspection_id],
    )?;
    tx.execute(
        "DELETE FROM inspection_items WHERE inspection_id = ?1",
        [inspection_id],
    )?;

    {
        let mut count_statement = tx.prepare_cached(
            "
            INSERT INTO dog_counts(
              inspection_id, year_type, boarding, breeding, other_count, transfer, on_prem, off_site
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )?;
        for group in &record.count_groups {
            let counts = &group.counts;
            count_statement.execute(params![
                inspection_id,
                group.period.as_str(),
                counts.boarding,
                counts.breeding,
                counts.other,
                counts.transfer,
                counts.on_prem,
                counts.off_site,
            ])?;
        }

        let mut item_statement = tx.prepare_cached(
            "
            INSERT INTO inspection_items(
              inspection_id, category_section, category_code, category_name, result, result_raw
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )?;
        for item in &record.findings {
            item_statement.execute(params![
                inspection_id,
                item.section,
                item.code,
                item.name,
                item.result.as_str(),
                item.raw_result,
            ])?;
        }
    }

    tx.execute(
        "UPDATE inspections SET imported_at = ?2 WHERE id = ?1",
        params![inspection_id, now_utc_string()],
    )?;

    Ok(UnitWrite::Written(inspection_id))
}

enum Located {
    Found(i64),
    BoundElsewhere(String),
    Missing,
}

/// Finds the header row by path first, then by the crawler's `(kennel_id, inspection_date)` key.
fn locate_inspection(
    tx: &Transaction<'_>,
    path: &str,
    kennel_id: i64,
    inspection_date: &str,
) -> rusqlite::Result<Located> {
    let by_path = tx
        .query_row(
            "SELECT id FROM inspections WHERE pdf_path = ?1 ORDER BY id LIMIT 1",
            [path],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    if let Some(id) = by_path {
        return Ok(Located::Found(id));
    }

    let by_key = tx
        .query_row(
            "SELECT id, pdf_path, imported_at FROM inspections
             WHERE kennel_id = ?1 AND inspection_date = ?2",
            params![kennel_id, inspection_date],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    Ok(match by_key {
        None => Located::Missing,
        // Another imported document already owns this inspection.
        Some((_, Some(bound_path), Some(_))) if bound_path != path => {
            Located::BoundElsewhere(bound_path)
        }
        Some((id, _, _)) => Located::Found(id),
    })
}
