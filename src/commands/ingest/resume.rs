use rusqlite::Connection;

use super::types::{DocumentRef, ResumeState};

/// A document is complete once its header row carries `imported_at`, which the gateway only
/// writes in the same transaction as the counts and findings.
pub(crate) fn resume_state(
    connection: &Connection,
    document: &DocumentRef,
) -> rusqlite::Result<ResumeState> {
    let mut statement = connection.prepare_cached(
        "SELECT EXISTS(
           SELECT 1 FROM inspections WHERE pdf_path = ?1 AND imported_at IS NOT NULL
         )",
    )?;
    let complete = statement.query_row([document.path_key()], |row| row.get::<_, bool>(0))?;

    Ok(if complete {
        ResumeState::AlreadyComplete
    } else {
        ResumeState::NeedsProcessing
    })
}

/// Splits a batch into the documents that still need work and a count of completed ones.
pub(crate) fn prune_completed(
    connection: &Connection,
    documents: &[DocumentRef],
) -> rusqlite::Result<(Vec<DocumentRef>, usize)> {
    let mut pending = Vec::with_capacity(documents.len());
    let mut completed = 0usize;

    for document in documents {
        match resume_state(connection, document)? {
            ResumeState::AlreadyComplete => completed += 1,
            ResumeState::NeedsProcessing => pending.push(document.clone()),
        }
    }

    Ok((pending, completed))
}
