//! Chunked analysis runner.
//!
//! Reads each requested file, slices it into blocks, sends every block to
//! the completion backend and accumulates the replies into one output
//! buffer. Every failure is reported and skipped; a run always ends with
//! exactly one [`AnalysisEvent::Completed`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use jwalk::WalkDir;
use thiserror::Error;

use crate::api::{ApiError, Completion};
use crate::chunk;

/// Reply phrase that classifies the aggregated output as safe. Matched
/// case-sensitively against the whole buffer, not per file or per block.
pub const SAFE_PHRASE: &str =
    "The code itself does not directly contain malicious functionality";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisMode {
    #[default]
    Summary,
    Malicious,
}

impl AnalysisMode {
    /// Fragment interpolated into the per-block prompt.
    pub fn prompt_fragment(&self) -> &'static str {
        match self {
            AnalysisMode::Summary => "summary",
            AnalysisMode::Malicious => "malicious",
        }
    }
}

/// One user-initiated run. Immutable for the run's duration.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub paths: Vec<PathBuf>,
    pub mode: AnalysisMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Suspicious,
}

impl Verdict {
    /// Classify the full aggregated output buffer.
    pub fn from_output(output: &str) -> Self {
        if output.contains(SAFE_PHRASE) {
            Verdict::Safe
        } else {
            Verdict::Suspicious
        }
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, Verdict::Safe)
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub output: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone)]
pub struct AnalysisProgress {
    pub files_done: usize,
    pub files_total: usize,
    pub current_file: Option<PathBuf>,
    pub blocks_done: usize,
    pub blocks_total: usize,
}

impl AnalysisProgress {
    pub fn fraction(&self) -> Option<f32> {
        if self.files_total == 0 {
            return Some(1.0);
        }
        let block_part = if self.blocks_total == 0 {
            0.0
        } else {
            (self.blocks_done as f32 / self.blocks_total as f32).clamp(0.0, 1.0)
        };
        let done = self.files_done as f32 + block_part;
        Some((done / self.files_total as f32).clamp(0.0, 1.0))
    }
}

/// Non-fatal failures surfaced during a run. Processing always continues
/// with the next block or file.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("not a readable file: {path}")]
    NotAFile { path: PathBuf },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("block {block} of {path}: {source}")]
    Api {
        path: PathBuf,
        block: usize,
        source: ApiError,
    },
}

pub enum AnalysisEvent {
    Progress(AnalysisProgress),
    Error(AnalysisError),
    Completed(AnalysisReport),
}

/// Direct children of `dir`, sorted for determinism. No recursion, no
/// extension filtering; non-file entries are reported by the runner.
pub fn list_entries(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .skip_hidden(false)
        .min_depth(1)
        .max_depth(1)
        .parallelism(jwalk::Parallelism::Serial)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    paths.sort();
    paths
}

/// Execute one run against `backend`, emitting events on `tx`.
///
/// `cancel` is checked between blocks and between files; a cancelled run
/// stops issuing requests but still emits its `Completed` event with the
/// partial buffer.
pub fn run_analysis(
    request: &AnalysisRequest,
    backend: &dyn Completion,
    tx: &Sender<AnalysisEvent>,
    cancel: &AtomicBool,
) {
    let files_total = request.paths.len();
    let mut output = String::new();

    'files: for (file_index, path) in request.paths.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        if !path.is_file() {
            let _ = tx.send(AnalysisEvent::Error(AnalysisError::NotAFile {
                path: path.clone(),
            }));
            continue;
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(source) => {
                let _ = tx.send(AnalysisEvent::Error(AnalysisError::Read {
                    path: path.clone(),
                    source,
                }));
                continue;
            }
        };

        let blocks = chunk::blocks(&content);
        if blocks.is_empty() {
            log::debug!("skipping empty file {}", path.display());
            continue;
        }

        let blocks_total = blocks.len();
        for (block_index, block) in blocks.into_iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                break 'files;
            }

            let _ = tx.send(AnalysisEvent::Progress(AnalysisProgress {
                files_done: file_index,
                files_total,
                current_file: Some(path.clone()),
                blocks_done: block_index,
                blocks_total,
            }));

            let prompt = format!(
                "Explain code for {}:\n\n{}",
                request.mode.prompt_fragment(),
                block
            );

            match backend.complete(&prompt) {
                Ok(text) => {
                    output.push_str(&text);
                    output.push_str("\n\n");
                }
                Err(source) => {
                    let _ = tx.send(AnalysisEvent::Error(AnalysisError::Api {
                        path: path.clone(),
                        block: block_index,
                        source,
                    }));
                }
            }
        }
    }

    let verdict = Verdict::from_output(&output);
    log::info!(
        "analysis finished: {} files requested, {} output chars, verdict {:?}",
        files_total,
        output.len(),
        verdict
    );

    let _ = tx.send(AnalysisEvent::Completed(AnalysisReport { output, verdict }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::mpsc;
    use std::sync::Mutex;

    /// Backend that pops scripted replies in order.
    struct ScriptedBackend {
        replies: Mutex<Vec<Result<String, ApiError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String, ApiError>>) -> Self {
            let mut replies = replies;
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl Completion for ScriptedBackend {
        fn complete(&self, _prompt: &str) -> Result<String, ApiError> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("stub reply".to_string()))
        }
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn collect_run(
        request: &AnalysisRequest,
        backend: &dyn Completion,
    ) -> (Vec<AnalysisError>, AnalysisReport) {
        let (tx, rx) = mpsc::channel();
        let cancel = AtomicBool::new(false);
        run_analysis(request, backend, &tx, &cancel);
        drop(tx);

        let mut errors = Vec::new();
        let mut report = None;
        for event in rx {
            match event {
                AnalysisEvent::Error(err) => errors.push(err),
                AnalysisEvent::Completed(r) => {
                    assert!(report.is_none(), "completed must be emitted exactly once");
                    report = Some(r);
                }
                AnalysisEvent::Progress(_) => {}
            }
        }
        (errors, report.expect("run must emit a completed event"))
    }

    #[test]
    fn test_missing_file_is_reported_and_run_completes() {
        let dir = tempfile::tempdir().unwrap();
        let valid = write_file(&dir, "ok.py", "print('hello')");
        let missing = dir.path().join("gone.py");

        let backend = ScriptedBackend::new(vec![Ok("explanation".to_string())]);
        let request = AnalysisRequest {
            paths: vec![missing, valid],
            mode: AnalysisMode::Summary,
        };

        let (errors, report) = collect_run(&request, &backend);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], AnalysisError::NotAFile { .. }));
        assert_eq!(report.output, "explanation\n\n");
    }

    #[test]
    fn test_verdict_safe_when_phrase_inside_longer_sentence() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "code.rs", "fn main() {}");

        let reply = format!("After review: {} beyond some imports.", SAFE_PHRASE);
        let backend = ScriptedBackend::new(vec![Ok(reply)]);
        let request = AnalysisRequest {
            paths: vec![path],
            mode: AnalysisMode::Malicious,
        };

        let (_, report) = collect_run(&request, &backend);
        assert_eq!(report.verdict, Verdict::Safe);
        assert!(report.verdict.is_safe());
    }

    #[test]
    fn test_verdict_not_safe_when_phrase_split_across_block_replies() {
        let dir = tempfile::tempdir().unwrap();
        // Two blocks: 3000 chars + 1 char.
        let path = write_file(&dir, "big.py", &"x".repeat(chunk::MAX_BLOCK_CHARS + 1));

        let (head, tail) = SAFE_PHRASE.split_at(SAFE_PHRASE.len() / 2);
        let backend =
            ScriptedBackend::new(vec![Ok(head.to_string()), Ok(tail.to_string())]);
        let request = AnalysisRequest {
            paths: vec![path],
            mode: AnalysisMode::Malicious,
        };

        let (errors, report) = collect_run(&request, &backend);
        assert!(errors.is_empty());
        assert_eq!(backend.call_count(), 2);
        // The block separator sits between the halves, so no match.
        assert_eq!(report.verdict, Verdict::Suspicious);
    }

    #[test]
    fn test_failed_block_is_skipped_and_later_blocks_still_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "big.py", &"y".repeat(chunk::MAX_BLOCK_CHARS + 1));

        let backend = ScriptedBackend::new(vec![
            Err(ApiError::UnexpectedShape("no choices".to_string())),
            Ok("second block explained".to_string()),
        ]);
        let request = AnalysisRequest {
            paths: vec![path],
            mode: AnalysisMode::Summary,
        };

        let (errors, report) = collect_run(&request, &backend);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], AnalysisError::Api { block: 0, .. }));
        assert_eq!(report.output, "second block explained\n\n");
    }

    #[test]
    fn test_empty_file_is_skipped_without_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "empty.py", "");

        let backend = ScriptedBackend::new(vec![]);
        let request = AnalysisRequest {
            paths: vec![path],
            mode: AnalysisMode::Summary,
        };

        let (errors, report) = collect_run(&request, &backend);
        assert!(errors.is_empty());
        assert_eq!(backend.call_count(), 0);
        assert_eq!(report.output, "");
        assert_eq!(report.verdict, Verdict::Suspicious);
    }

    #[test]
    fn test_cancelled_run_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "code.py", "print('x')");

        let backend = ScriptedBackend::new(vec![]);
        let request = AnalysisRequest {
            paths: vec![path],
            mode: AnalysisMode::Summary,
        };

        let (tx, rx) = mpsc::channel();
        let cancel = AtomicBool::new(true);
        run_analysis(&request, &backend, &tx, &cancel);
        drop(tx);

        let events: Vec<_> = rx.into_iter().collect();
        assert_eq!(backend.call_count(), 0);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AnalysisEvent::Completed(_)));
    }

    #[test]
    fn test_list_entries_is_direct_children_only() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir, "b.py", "b");
        write_file(&dir, "a.py", "a");
        let sub = dir.path().join("nested");
        fs::create_dir(&sub).unwrap();
        let mut inner = File::create(sub.join("deep.py")).unwrap();
        inner.write_all(b"deep").unwrap();

        let entries = list_entries(dir.path());
        let names: Vec<_> = entries
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["a.py", "b.py", "nested"]);
    }

    #[test]
    fn test_progress_fraction_bounds() {
        let progress = AnalysisProgress {
            files_done: 1,
            files_total: 2,
            current_file: None,
            blocks_done: 1,
            blocks_total: 2,
        };
        assert_eq!(progress.fraction(), Some(0.75));

        let empty = AnalysisProgress {
            files_done: 0,
            files_total: 0,
            current_file: None,
            blocks_done: 0,
            blocks_total: 0,
        };
        assert_eq!(empty.fraction(), Some(1.0));
    }
}
