use std::fmt;
use std::path::{Path, PathBuf};

use crate::model::{CorpusEntry, OutcomeCounts};

use super::errors::{ExtractionError, ParseError};

/// One source document and the license number of the kennel it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub path: PathBuf,
    pub owner_key: String,
}

impl DocumentRef {
    pub fn new(path: impl Into<PathBuf>, owner_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            owner_key: owner_key.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key stored in `inspections.pdf_path`.
    pub fn path_key(&self) -> String {
        self.path.display().to_string()
    }
}

impl From<&CorpusEntry> for DocumentRef {
    fn from(entry: &CorpusEntry) -> Self {
        Self::new(&entry.path, entry.owner_key.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectionHeader {
    pub kennel_name: Option<String>,
    pub owner_name: Option<String>,
    pub license_number: Option<String>,
    pub license_year_class: Option<String>,
    pub county: Option<String>,
    pub township: Option<String>,
    pub inspection_date: String,
    pub inspector_name: String,
    pub person_interviewed: Option<String>,
    pub person_title: Option<String>,
    pub inspection_action: Option<String>,
    pub remarks: Option<String>,
    pub reinspection_required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CountPeriod {
    Current,
    Previous,
}

impl CountPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Previous => "previous",
        }
    }
}

/// Dog counters for one period. `None` means the field was not found in the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DogCounts {
    pub boarding: Option<i64>,
    pub breeding: Option<i64>,
    pub other: Option<i64>,
    pub transfer: Option<i64>,
    pub on_prem: Option<i64>,
    pub off_site: Option<i64>,
}

impl DogCounts {
    pub fn slot_mut(&mut self, field: &str) -> Option<&mut Option<i64>> {
        match field {
            "Boarding" => Some(&mut self.boarding),
            "Breeding" => Some(&mut self.breeding),
            "Other" => Some(&mut self.other),
            "Transfer" => Some(&mut self.transfer),
            "On Prem" => Some(&mut self.on_prem),
            "Off Site" => Some(&mut self.off_site),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountGroup {
    pub period: CountPeriod,
    pub counts: DogCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FindingResult {
    Satisfactory,
    Unsatisfactory,
    NotApplicable,
    Yes,
    No,
    Unknown(String),
}

impl FindingResult {
    pub fn from_raw(raw: &str) -> Self {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_lowercase().as_str() {
            "satisfactory" => Self::Satisfactory,
            "unsatisfactory" => Self::Unsatisfactory,
            "not applicable" | "n/a" => Self::NotApplicable,
            "yes" => Self::Yes,
            "no" => Self::No,
            _ => Self::Unknown(normalized),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Satisfactory => "Satisfactory",
            Self::Unsatisfactory => "Unsatisfactory",
            Self::NotApplicable => "Not Applicable",
            Self::Yes => "Yes",
            Self::No => "No",
            Self::Unknown(_) => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingItem {
    pub section: String,
    pub code: String,
    pub name: String,
    pub result: FindingResult,
    pub raw_result: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectionRecord {
    pub header: InspectionHeader,
    pub count_groups: Vec<CountGroup>,
    pub findings: Vec<FindingItem>,
}

impl InspectionRecord {
    pub fn violation_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|item| item.result == FindingResult::Unsatisfactory)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    Extraction(ExtractionError),
    Parse(ParseError),
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extraction(error) => write!(f, "{error}"),
            Self::Parse(error) => write!(f, "{error}"),
        }
    }
}

/// Worker output for one document. A failure is never mistaken for data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRecord {
    Parsed(Box<InspectionRecord>),
    Failed(ParseFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkResult {
    pub document: DocumentRef,
    pub record: ParsedRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported { inspection_id: i64, violations: usize },
    SkippedAlreadyDone,
    SkippedUnresolvedOwner { owner_key: String },
    ParseFailed { reason: String },
    PersistFailed { reason: String },
}

impl ImportOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Imported { .. } => "imported",
            Self::SkippedAlreadyDone => "skipped_already_done",
            Self::SkippedUnresolvedOwner { .. } => "skipped_unresolved_owner",
            Self::ParseFailed { .. } => "parse_failed",
            Self::PersistFailed { .. } => "persist_failed",
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::ParseFailed { reason } | Self::PersistFailed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn tally(&self, counts: &mut OutcomeCounts) {
        counts.seen += 1;
        match self {
            Self::Imported { .. } => counts.imported += 1,
            Self::SkippedAlreadyDone => counts.skipped_already_done += 1,
            Self::SkippedUnresolvedOwner { .. } => counts.skipped_unresolved_owner += 1,
            Self::ParseFailed { .. } => counts.parse_failed += 1,
            Self::PersistFailed { .. } => counts.persist_failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    AlreadyComplete,
    NeedsProcessing,
}
