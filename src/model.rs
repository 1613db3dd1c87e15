use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub path: String,
    pub owner_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub corpus_root: String,
    pub document_count: usize,
    pub documents: Vec<CorpusEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub seen: usize,
    pub imported: usize,
    pub skipped_already_done: usize,
    pub skipped_unresolved_owner: usize,
    pub parse_failed: usize,
    pub persist_failed: usize,
    pub not_attempted: usize,
}

impl OutcomeCounts {
    pub fn skipped(&self) -> usize {
        self.skipped_already_done + self.skipped_unresolved_owner
    }

    pub fn failed(&self) -> usize {
        self.parse_failed + self.persist_failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub path: String,
    pub owner_key: String,
    pub outcome: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltedBoundary {
    pub batch_index: usize,
    pub corpus_offset: usize,
    pub not_attempted: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPaths {
    pub corpus_root: String,
    pub corpus_manifest_path: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    pub workers: usize,
    pub batch_size: usize,
    pub channel_capacity: usize,
    pub start: usize,
    pub end: usize,
    pub resume: bool,
    pub schema_init: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub paths: IngestPaths,
    pub settings: IngestSettings,
    pub batches_completed: usize,
    pub counts: OutcomeCounts,
    pub halted_at: Option<HaltedBoundary>,
    pub failures: Vec<RunFailure>,
}
