use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;

use super::errors::ParseError;
use super::types::{
    CountGroup, CountPeriod, DogCounts, FindingItem, FindingResult, InspectionHeader,
    InspectionRecord,
};

/// Labels that can share a layout line with another header field's value.
const HEADER_LABELS: &[&str] = &[
    "Owner(s)",
    "License Number",
    "License Year/Class",
    "Kennel County",
    "Kennel Township",
    "Inspection Date",
    "Inspected By",
    "Person Interviewed",
    "Title",
    "Inspection Action",
];

const SECTION_REGULATIONS: &str = "Kennel Regulations";
const SECTION_ACTS: &str = "Kennel Acts";
const SECTION_MISC: &str = "Miscellaneous";

/// Parses `pdftotext -layout` output of a kennel inspection report.
///
/// Holds only compiled patterns, so one instance can be shared by every worker.
#[derive(Debug)]
pub struct InspectionParser {
    date_regex: Regex,
    count_regex: Regex,
    site_count_regex: Regex,
    column_split_regex: Regex,
    code_regex: Regex,
}

impl InspectionParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            date_regex: Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b")
                .context("failed to compile inspection date regex")?,
            count_regex: Regex::new(
                r"(?P<period>CurrYr|PrevYr)\s*:\s*(?P<field>Boarding|Breeding|Other|Transfer)[ \t:]*(?P<value>\d+)?",
            )
            .context("failed to compile dog count regex")?,
            site_count_regex: Regex::new(r"(?P<field>On Prem|Off Site)[ \t:]*(?P<value>\d+)?")
                .context("failed to compile site count regex")?,
            column_split_regex: Regex::new(r"\t+|\s{2,}")
                .context("failed to compile column split regex")?,
            code_regex: Regex::new(r"^(?P<code>\d+\.?\d*[a-z]?\.?\d*)\s+(?P<name>.+)$")
                .context("failed to compile regulation code regex")?,
        })
    }

    pub fn parse(&self, text: &str) -> Result<InspectionRecord, ParseError> {
        if text.trim().is_empty() {
            return Err(ParseError::EmptyText);
        }

        let lines = text.lines().collect::<Vec<&str>>();
        let mut header = self.parse_header(&lines)?;
        let count_groups = self.parse_counts(&lines);
        let findings = self.parse_findings(&lines);

        let (remarks, remarks_require_reinspection) = parse_remarks(&lines);
        let findings_require_reinspection = findings.iter().any(|item| {
            mentions_reinspection(&item.name.to_ascii_lowercase())
                && item.result == FindingResult::Yes
        });
        header.remarks = remarks;
        header.reinspection_required =
            remarks_require_reinspection || findings_require_reinspection;

        Ok(InspectionRecord {
            header,
            count_groups,
            findings,
        })
    }

    fn parse_header(&self, lines: &[&str]) -> Result<InspectionHeader, ParseError> {
        let inspection_date = self.parse_inspection_date(lines)?;
        let inspector_name =
            parse_inspector(lines).ok_or(ParseError::MissingField {
                field: "inspector_name",
            })?;

        Ok(InspectionHeader {
            kennel_name: parse_kennel_name(lines),
            owner_name: parse_owner(lines),
            license_number: labelled_value(lines, "License Number"),
            license_year_class: parse_license_year_class(lines),
            county: labelled_value(lines, "Kennel County"),
            township: labelled_value(lines, "Kennel Township"),
            inspection_date,
            inspector_name,
            person_interviewed: labelled_value(lines, "Person Interviewed"),
            person_title: parse_title(lines),
            inspection_action: labelled_value(lines, "Inspection Action"),
            remarks: None,
            reinspection_required: false,
        })
    }

    fn parse_inspection_date(&self, lines: &[&str]) -> Result<String, ParseError> {
        let field = "inspection_date";
        let value =
            labelled_value(lines, "Inspection Date").ok_or(ParseError::MissingField { field })?;

        let captures = self
            .date_regex
            .captures(&value)
            .ok_or_else(|| ParseError::MalformedField {
                field,
                value: value.clone(),
            })?;

        let month = captures[1].parse::<u32>().unwrap_or(0);
        let day = captures[2].parse::<u32>().unwrap_or(0);
        let year = captures[3].parse::<i32>().unwrap_or(0);
        if NaiveDate::from_ymd_opt(year, month, day).is_none() {
            return Err(ParseError::MalformedField {
                field,
                value: captures[0].to_string(),
            });
        }

        Ok(captures[0].to_string())
    }

    fn parse_counts(&self, lines: &[&str]) -> Vec<CountGroup> {
        let Some(start) = lines.iter().position(|line| line.contains("Dog Counts")) else {
            return Vec::new();
        };

        let mut current = DogCounts::default();
        let mut previous = DogCounts::default();

        for line in &lines[start + 1..] {
            if line.contains(SECTION_REGULATIONS) || line.contains("Inspection Category") {
                break;
            }

            for captures in self.count_regex.captures_iter(line) {
                let counts = if &captures["period"] == "CurrYr" {
                    &mut current
                } else {
                    &mut previous
                };
                if let (Some(slot), Some(value)) =
                    (counts.slot_mut(&captures["field"]), captures.name("value"))
                {
                    if slot.is_none() {
                        *slot = value.as_str().parse().ok();
                    }
                }
            }

            for captures in self.site_count_regex.captures_iter(line) {
                if let (Some(slot), Some(value)) =
                    (current.slot_mut(&captures["field"]), captures.name("value"))
                {
                    if slot.is_none() {
                        *slot = value.as_str().parse().ok();
                    }
                }
            }
        }

        vec![
            CountGroup {
                period: CountPeriod::Current,
                counts: current,
            },
            CountGroup {
                period: CountPeriod::Previous,
                counts: previous,
            },
        ]
    }

    fn parse_findings(&self, lines: &[&str]) -> Vec<FindingItem> {
        let mut items = Vec::new();
        let mut section: Option<&'static str> = None;
        let mut previous_nonempty = "";

        for (index, line) in lines.iter().enumerate() {
            let after_category_header = previous_nonempty.contains("Inspection Category");
            if !line.trim().is_empty() {
                previous_nonempty = *line;
            }

            if line.contains(SECTION_REGULATIONS) {
                section = Some(SECTION_REGULATIONS);
                continue;
            }
            if line.contains(SECTION_ACTS) {
                section = Some(SECTION_ACTS);
                continue;
            }
            if line.contains(SECTION_MISC) && after_category_header {
                section = Some(SECTION_MISC);
                continue;
            }

            let Some(current_section) = section else {
                continue;
            };

            if is_remarks_anchor(line) {
                break;
            }

            let next = lines.get(index + 1).map(|next| next.trim()).unwrap_or("");
            if let Some(item) = self.parse_finding_line(current_section, line, next) {
                items.push(item);
            }
        }

        items
    }

    fn parse_finding_line(&self, section: &str, line: &str, next: &str) -> Option<FindingItem> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let columns = self
            .column_split_regex
            .split(trimmed)
            .map(str::trim)
            .filter(|column| !column.is_empty())
            .collect::<Vec<&str>>();
        let (label, raw_result) = split_label_and_result(&columns, next)?;

        let (code, name) = match self.code_regex.captures(&label) {
            Some(captures) => (
                captures["code"].to_string(),
                captures["name"].trim().to_string(),
            ),
            None => (String::new(), label.trim().to_string()),
        };
        if name.is_empty() {
            return None;
        }

        let result = FindingResult::from_raw(&raw_result);
        // Uncoded rows need a recognized result, or every stray text line would count.
        if !result.is_known() && code.is_empty() {
            return None;
        }

        Some(FindingItem {
            section: section.to_string(),
            code,
            name,
            result,
            raw_result,
        })
    }
}

fn split_label_and_result(columns: &[&str], next: &str) -> Option<(String, String)> {
    let (last, rest) = columns.split_last()?;

    if !rest.is_empty() {
        if *last == "Not" && next.starts_with("Applicable") {
            return Some((rest.join(" "), "Not Applicable".to_string()));
        }
        if FindingResult::from_raw(last).is_known() {
            return Some((rest.join(" "), last.to_string()));
        }
    }

    let joined = columns.join(" ");
    if let Some(found) = trailing_result_words(&joined, next) {
        return Some(found);
    }

    if FindingResult::from_raw(next).is_known() {
        return Some((joined, next.to_string()));
    }

    if !rest.is_empty() {
        return Some((rest.join(" "), last.to_string()));
    }

    None
}

fn trailing_result_words(text: &str, next: &str) -> Option<(String, String)> {
    let words = text.split_whitespace().collect::<Vec<&str>>();
    let count = words.len();

    if count >= 3 && words[count - 2] == "Not" && words[count - 1] == "Applicable" {
        return Some((words[..count - 2].join(" "), "Not Applicable".to_string()));
    }
    if count >= 2 && words[count - 1] == "Not" && next.starts_with("Applicable") {
        return Some((words[..count - 1].join(" "), "Not Applicable".to_string()));
    }
    if count >= 2
        && matches!(
            words[count - 1],
            "Satisfactory" | "Unsatisfactory" | "Yes" | "No"
        )
    {
        return Some((words[..count - 1].join(" "), words[count - 1].to_string()));
    }

    None
}

fn is_remarks_anchor(line: &str) -> bool {
    line.contains("Remarks") && !line.contains("Inspection Category")
}

fn parse_remarks(lines: &[&str]) -> (Option<String>, bool) {
    let Some(start) = lines.iter().position(|line| is_remarks_anchor(line)) else {
        return (None, false);
    };

    let body = &lines[start + 1..];
    let requires_reinspection = body.iter().any(|line| {
        let lower = line.to_ascii_lowercase();
        mentions_reinspection(&lower)
            && (lower.contains("required") || lower.contains("will take place"))
    });

    let text = body.join("\n").trim().to_string();
    let remarks = if text.is_empty() { None } else { Some(text) };
    (remarks, requires_reinspection)
}

fn mentions_reinspection(lower: &str) -> bool {
    lower.contains("reinspection") || lower.contains("re-inspection")
}

/// Value after `label` on its own line, else the following line.
fn labelled_value(lines: &[&str], label: &str) -> Option<String> {
    let index = lines.iter().position(|line| line.contains(label))?;

    let same_line = lines[index]
        .split_once(label)
        .map(|(_, rest)| cut_at_other_labels(rest, label))
        .unwrap_or_default();
    if !same_line.is_empty() {
        return Some(same_line);
    }

    lines
        .get(index + 1)
        .map(|next| cut_at_other_labels(next, label))
        .filter(|value| !value.is_empty())
}

fn cut_at_other_labels(value: &str, own_label: &str) -> String {
    let end = HEADER_LABELS
        .iter()
        .filter(|label| **label != own_label)
        .filter_map(|label| value.find(label))
        .min()
        .unwrap_or(value.len());

    value[..end].trim().to_string()
}

fn parse_kennel_name(lines: &[&str]) -> Option<String> {
    let start = lines.iter().position(|line| line.trim() == "Kennel")?;
    let window_end = (start + 10).min(lines.len());
    let owner_index = (start + 1..window_end).find(|index| lines[*index].contains("Owner(s)"))?;

    let name = lines[start + 1..owner_index]
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join(" ");

    if name.is_empty() { None } else { Some(name) }
}

fn parse_owner(lines: &[&str]) -> Option<String> {
    let start = lines.iter().position(|line| line.contains("Owner(s)"))?;
    let window_end = (start + 5).min(lines.len());

    lines[start + 1..window_end]
        .iter()
        .map(|line| line.trim())
        .find(|line| {
            !line.is_empty()
                && !line.contains("Business")
                && !line.split_whitespace().any(|word| word == "PA")
        })
        .map(|line| cut_at_other_labels(line, "Owner(s)"))
        .filter(|line| !line.is_empty())
}

fn parse_license_year_class(lines: &[&str]) -> Option<String> {
    let start = lines
        .iter()
        .position(|line| line.contains("License Year/Class"))?;
    let window_end = (start + 5).min(lines.len());

    lines[start + 1..window_end]
        .iter()
        .map(|line| line.trim())
        .find(|line| !line.is_empty() && line.contains(':'))
        .map(|line| cut_at_other_labels(line, "License Year/Class"))
}

fn parse_inspector(lines: &[&str]) -> Option<String> {
    let label = "Inspected By";
    let start = lines.iter().position(|line| line.contains(label))?;

    if let Some((_, rest)) = lines[start].split_once(label) {
        let value = cut_at_other_labels(rest, label);
        if value.contains(',') {
            return Some(value);
        }
    }

    let window_end = (start + 5).min(lines.len());
    lines[start + 1..window_end]
        .iter()
        .find(|line| line.contains(','))
        .map(|line| cut_at_other_labels(line, label))
        .filter(|value| !value.is_empty())
}

fn parse_title(lines: &[&str]) -> Option<String> {
    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed == "Title" {
            return lines
                .get(index + 1)
                .map(|next| next.trim().to_string())
                .filter(|value| !value.is_empty());
        }
        if let Some(rest) = trimmed.strip_prefix("Title ") {
            let value = cut_at_other_labels(rest, "Title");
            if !value.is_empty() {
                return Some(value);
            }
        }
    }

    None
}
