use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::errors::ExtractionError;
use super::types::DocumentRef;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

static OUTPUT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Turns one source document into its linear text.
pub trait TextExtractor: Sync {
    fn extract(&self, document: &DocumentRef) -> Result<String, ExtractionError>;
}

/// Runs `pdftotext -layout`, killing the converter when it exceeds `timeout`.
#[derive(Debug, Clone)]
pub struct PdfToText {
    program: PathBuf,
    timeout: Duration,
}

impl PdfToText {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("pdftotext"),
            timeout,
        }
    }

    /// Uses `program` instead of the `pdftotext` found on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl TextExtractor for PdfToText {
    fn extract(&self, document: &DocumentRef) -> Result<String, ExtractionError> {
        let pdf_path = document.path();
        if !pdf_path.is_file() {
            return Err(ExtractionError::Unreadable {
                path: pdf_path.to_path_buf(),
                message: "file not found".to_string(),
            });
        }

        let output_path = temp_output_path(pdf_path);
        let result = run_pdftotext(&self.program, pdf_path, &output_path, self.timeout);
        let _ = fs::remove_file(&output_path);
        result
    }
}

fn run_pdftotext(
    program: &Path,
    pdf_path: &Path,
    output_path: &Path,
    timeout: Duration,
) -> Result<String, ExtractionError> {
    let converter_error = |message: String| ExtractionError::Converter {
        path: pdf_path.to_path_buf(),
        message,
    };

    let mut child = Command::new(program)
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(pdf_path)
        .arg(output_path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| converter_error(format!("failed to execute pdftotext: {error}")))?;

    // Warnings can exceed the pipe buffer; drain them while the converter runs.
    let stderr_reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut captured = Vec::new();
            let _ = pipe.read_to_end(&mut captured);
            captured
        })
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExtractionError::Timeout {
                    path: pdf_path.to_path_buf(),
                    seconds: timeout.as_secs(),
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(converter_error(format!("failed to wait on pdftotext: {error}")));
            }
        }
    };

    let stderr = collect_stderr(stderr_reader);
    if !status.success() {
        return Err(converter_error(format!(
            "non-zero exit status {}: {}",
            status,
            stderr.trim()
        )));
    }

    if !output_path.is_file() {
        return Err(ExtractionError::Missing {
            path: pdf_path.to_path_buf(),
        });
    }

    let raw = fs::read(output_path).map_err(|error| ExtractionError::Unreadable {
        path: output_path.to_path_buf(),
        message: error.to_string(),
    })?;

    Ok(String::from_utf8_lossy(&raw).replace('\u{0000}', ""))
}

fn collect_stderr(reader: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|captured| String::from_utf8_lossy(&captured).into_owned())
        .unwrap_or_default()
}

fn temp_output_path(pdf_path: &Path) -> PathBuf {
    let stem = pdf_path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("pdf");
    let safe_stem = stem
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character
            } else {
                '_'
            }
        })
        .collect::<String>();

    let sequence = OUTPUT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    std::env::temp_dir().join(format!(
        "kennel_ingest_{}_{}_{}_{}.txt",
        safe_stem,
        std::process::id(),
        sequence,
        stamp
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_output_paths_are_unique_and_sanitized() {
        let first = temp_output_path(Path::new("dir/inspection_01-15-2024.pdf"));
        let second = temp_output_path(Path::new("dir/inspection_01-15-2024.pdf"));

        assert_ne!(first, second);
        let name = first.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        assert!(name.starts_with("kennel_ingest_inspection_01_15_2024_"));
    }

    #[test]
    fn missing_file_is_reported_as_unreadable() {
        let extractor = PdfToText::new(Duration::from_secs(1));
        let document = DocumentRef::new("does/not/exist/inspection_01-01-2020.pdf", "1");

        match extractor.extract(&document) {
            Err(ExtractionError::Unreadable { path, .. }) => {
                assert_eq!(path, document.path);
            }
            other => panic!("expected unreadable error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    fn fake_converter(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-pdftotext");
        fs::write(&script, format!("#!/bin/sh\n{body}\n")).expect("write converter script");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))
            .expect("make converter executable");
        script
    }

    #[cfg(unix)]
    #[test]
    fn noisy_converter_output_does_not_stall_extraction() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = dir.path().join("inspection_01-01-2024.pdf");
        fs::write(&pdf, b"%PDF-1.4").expect("write pdf");
        // Arguments: -layout -enc UTF-8 <pdf> <out>
        let converter = fake_converter(
            dir.path(),
            "i=0\n\
             while [ $i -lt 4000 ]; do\n\
               echo \"Syntax Warning: Invalid Font Weight in object $i of the xref table\" >&2\n\
               i=$((i+1))\n\
             done\n\
             printf 'Inspection Date 01/01/2024' > \"$5\"\n\
             exit 0",
        );

        let extractor = PdfToText::new(Duration::from_secs(20)).with_program(converter);
        let started = Instant::now();
        let text = extractor
            .extract(&DocumentRef::new(&pdf, "1"))
            .expect("noisy but successful conversion");

        assert_eq!(text, "Inspection Date 01/01/2024");
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[cfg(unix)]
    #[test]
    fn failing_converter_reports_its_stderr() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = dir.path().join("inspection_01-01-2024.pdf");
        fs::write(&pdf, b"%PDF-1.4").expect("write pdf");
        let converter = fake_converter(dir.path(), "echo 'Syntax Error: broken xref' >&2\nexit 1");

        let extractor = PdfToText::new(Duration::from_secs(20)).with_program(converter);
        match extractor.extract(&DocumentRef::new(&pdf, "1")) {
            Err(ExtractionError::Converter { message, .. }) => {
                assert!(message.contains("Syntax Error: broken xref"));
            }
            other => panic!("expected converter error, got {other:?}"),
        }
    }
}
