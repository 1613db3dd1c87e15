use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::inventory;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct StoreStats {
    imported: i64,
    with_dog_counts: i64,
    with_items: i64,
    total_items: i64,
    violations: i64,
    unknown_results: i64,
    reinspections: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct KennelViolations {
    name: String,
    county: String,
    violations: i64,
}

pub fn run(args: StatusArgs) -> Result<()> {
    info!(
        corpus_root = %args.corpus_root.display(),
        db_path = %args.db_path.display(),
        "status requested"
    );

    let pdf_count = if args.corpus_root.is_dir() {
        inventory::discover_inspection_pdfs(&args.corpus_root)?.len()
    } else {
        warn!(path = %args.corpus_root.display(), "corpus root missing");
        0
    };

    if !args.db_path.exists() {
        warn!(path = %args.db_path.display(), "database file missing");
        info!(pdf_count, "corpus status");
        return Ok(());
    }

    let conn = Connection::open_with_flags(&args.db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("failed to open {}", args.db_path.display()))?;
    let stats = collect_store_stats(&conn)?;
    let remaining = (pdf_count as i64 - stats.imported).max(0);
    let percent_complete = if pdf_count > 0 {
        stats.imported as f64 * 100.0 / pdf_count as f64
    } else {
        0.0
    };

    info!(
        pdf_count,
        imported = stats.imported,
        remaining,
        percent_complete = %format!("{percent_complete:.1}"),
        "import progress"
    );
    info!(
        with_dog_counts = stats.with_dog_counts,
        with_items = stats.with_items,
        total_items = stats.total_items,
        violations = stats.violations,
        unknown_results = stats.unknown_results,
        reinspections = stats.reinspections,
        "database status"
    );

    for (rank, kennel) in top_violators(&conn, 10)?.iter().enumerate() {
        info!(
            rank = rank + 1,
            kennel = %kennel.name,
            county = %kennel.county,
            violations = kennel.violations,
            "top violator"
        );
    }
    for (category, count) in common_violations(&conn, 10)? {
        info!(category = %category, count, "common violation");
    }

    if remaining > 0 {
        info!(remaining, "import incomplete; rerun `kennel-ingest ingest --resume` to continue");
    }

    Ok(())
}

fn collect_store_stats(conn: &Connection) -> Result<StoreStats> {
    Ok(StoreStats {
        imported: query_count(
            conn,
            "SELECT COUNT(*) FROM inspections WHERE imported_at IS NOT NULL",
        )?,
        with_dog_counts: query_count(conn, "SELECT COUNT(DISTINCT inspection_id) FROM dog_counts")?,
        with_items: query_count(
            conn,
            "SELECT COUNT(DISTINCT inspection_id) FROM inspection_items",
        )?,
        total_items: query_count(conn, "SELECT COUNT(*) FROM inspection_items")?,
        violations: query_count(
            conn,
            "SELECT COUNT(*) FROM inspection_items WHERE result = 'Unsatisfactory'",
        )?,
        unknown_results: query_count(
            conn,
            "SELECT COUNT(*) FROM inspection_items WHERE result = 'Unknown'",
        )?,
        reinspections: query_count(
            conn,
            "SELECT COUNT(*) FROM inspections WHERE reinspection_required = 1",
        )?,
    })
}

fn top_violators(conn: &Connection, limit: i64) -> Result<Vec<KennelViolations>> {
    let mut statement = conn.prepare(
        "
        SELECT COALESCE(k.name, k.license_number, ''), COALESCE(k.county, ''), COUNT(*) AS violation_count
        FROM kennels k
        JOIN inspections i ON k.kennel_id = i.kennel_id
        JOIN inspection_items ii ON i.id = ii.inspection_id
        WHERE ii.result = 'Unsatisfactory'
        GROUP BY k.kennel_id
        ORDER BY violation_count DESC, k.kennel_id
        LIMIT ?1
        ",
    )?;
    let rows = statement
        .query_map([limit], |row| {
            Ok(KennelViolations {
                name: row.get(0)?,
                county: row.get(1)?,
                violations: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to query top violators")?;
    Ok(rows)
}

fn common_violations(conn: &Connection, limit: i64) -> Result<Vec<(String, i64)>> {
    let mut statement = conn.prepare(
        "
        SELECT COALESCE(category_name, ''), COUNT(*) AS violation_count
        FROM inspection_items
        WHERE result = 'Unsatisfactory'
        GROUP BY category_name
        ORDER BY violation_count DESC, category_name
        LIMIT ?1
        ",
    )?;
    let rows = statement
        .query_map([limit], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to query common violations")?;
    Ok(rows)
}

fn query_count(conn: &Connection, sql: &str) -> Result<i64> {
    let count = conn
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed to run {sql}"))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory store");
        conn.execute_batch(
            "
            CREATE TABLE kennels (id INTEGER PRIMARY KEY, kennel_id INTEGER UNIQUE, name TEXT,
                                  county TEXT, license_number TEXT);
            CREATE TABLE inspections (id INTEGER PRIMARY KEY, kennel_id INTEGER, pdf_path TEXT,
                                      reinspection_required INTEGER DEFAULT 0, imported_at TEXT);
            CREATE TABLE dog_counts (id INTEGER PRIMARY KEY, inspection_id INTEGER, year_type TEXT);
            CREATE TABLE inspection_items (id INTEGER PRIMARY KEY, inspection_id INTEGER,
                                           category_name TEXT, result TEXT);

            INSERT INTO kennels(kennel_id, name, county, license_number)
              VALUES (1, 'Happy Tails', 'Berks', '12345'), (2, 'Muddy Paws', 'Lancaster', '777');
            INSERT INTO inspections(id, kennel_id, pdf_path, reinspection_required, imported_at)
              VALUES (10, 1, 'a.pdf', 1, '2024-01-15T00:00:00Z'),
                     (11, 2, 'b.pdf', 0, '2024-01-16T00:00:00Z'),
                     (12, 2, 'c.pdf', 0, NULL);
            INSERT INTO dog_counts(inspection_id, year_type)
              VALUES (10, 'current'), (10, 'previous'), (11, 'current');
            INSERT INTO inspection_items(inspection_id, category_name, result)
              VALUES (10, 'Sanitation', 'Unsatisfactory'),
                     (10, 'Records', 'Satisfactory'),
                     (11, 'Sanitation', 'Unsatisfactory'),
                     (11, 'Housing', 'Unsatisfactory'),
                     (11, 'Lighting', 'Unknown');
            ",
        )
        .expect("seed store");
        conn
    }

    #[test]
    fn store_stats_count_only_committed_imports() {
        let conn = seeded_store();
        let stats = collect_store_stats(&conn).expect("collect stats");

        assert_eq!(
            stats,
            StoreStats {
                imported: 2,
                with_dog_counts: 2,
                with_items: 2,
                total_items: 5,
                violations: 3,
                unknown_results: 1,
                reinspections: 1,
            }
        );
    }

    #[test]
    fn top_violators_are_ranked_by_violation_count() {
        let conn = seeded_store();
        let ranked = top_violators(&conn, 10).expect("query top violators");

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].name, "Muddy Paws");
        assert_eq!(ranked[0].violations, 2);
        assert_eq!(ranked[1].name, "Happy Tails");

        let common = common_violations(&conn, 1).expect("query common violations");
        assert_eq!(common, vec![("Sanitation".to_string(), 2)]);
    }
}
