//! Record Emitter - serializes validated tasks into addressable files
//!
//! Each task becomes one file named `<id> - <sanitized title>.<ext>` inside
//! the configured output directory. Sanitization is allow-list based, so no
//! title content can steer a write outside that directory; a containment
//! check backs the allow-list up before every write.
//!
//! Writes happen sequentially in execution order, which keeps collision
//! suffixes (`-2`, `-3`, ...) deterministic across runs.

use crate::error::{EmitError, Result, Warning};
use crate::task::{Task, TaskId};
use chrono::SecondsFormat;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Longest sanitized title carried into a filename.
const MAX_TITLE_LEN: usize = 64;

/// Emitter mode flags
#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// Replace existing records instead of skipping them
    pub overwrite: bool,

    /// Compute the full write plan without touching the filesystem
    pub dry_run: bool,

    /// Abort on the first failed write instead of isolating it
    pub fail_fast: bool,

    /// Record file extension
    pub extension: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            dry_run: false,
            fail_fast: false,
            extension: "md".to_string(),
        }
    }
}

/// What happened (or would happen) to one record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Written,
    WouldWrite,
    SkippedExisting,
    Unchanged,
    Failed,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileAction::Written => "written",
            FileAction::WouldWrite => "would write",
            FileAction::SkippedExisting => "skipped (exists)",
            FileAction::Unchanged => "unchanged",
            FileAction::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One entry of the write plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedFile {
    pub task_id: TaskId,
    pub path: PathBuf,
    pub action: FileAction,
}

/// Emitter output: the write plan plus per-file warnings.
#[derive(Debug, Clone)]
pub struct EmitOutcome {
    pub files: Vec<PlannedFile>,
    pub warnings: Vec<Warning>,
}

/// Record Emitter
#[derive(Debug)]
pub struct RecordEmitter {
    options: EmitOptions,
}

impl RecordEmitter {
    pub fn new(options: EmitOptions) -> Self {
        Self { options }
    }

    /// Emit one record per task into `out_dir`
    ///
    /// Tasks must arrive in execution order. A single failed write is
    /// reported and skipped unless `fail_fast` is set; everything else
    /// continues.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the output directory cannot be created, when a
    /// write fails under `fail_fast`, or if a candidate path escapes the
    /// output directory (unreachable for sanitized names).
    pub fn emit(&self, tasks: &[Task], out_dir: &Path) -> Result<EmitOutcome> {
        if !self.options.dry_run {
            fs::create_dir_all(out_dir).map_err(|source| EmitError::CreateDir {
                path: out_dir.display().to_string(),
                source,
            })?;
        }

        let mut used: HashMap<String, u32> = HashMap::new();
        let mut files = Vec::with_capacity(tasks.len());
        let mut warnings = Vec::new();

        for task in tasks {
            // The id is regex-constrained by the parser, but the emitter does
            // not trust its callers: both filename halves pass the allow-list.
            let base = format!(
                "{} - {}",
                sanitize_title(task.id.as_str()),
                sanitize_title(&task.title)
            );
            let count = used.entry(base.clone()).and_modify(|c| *c += 1).or_insert(1);
            let file_name = if *count > 1 {
                format!("{}-{}.{}", base, count, self.options.extension)
            } else {
                format!("{}.{}", base, self.options.extension)
            };
            let path = out_dir.join(&file_name);
            ensure_contained(out_dir, &path)?;

            let content = render_record(task);
            let action = self.emit_one(task, &path, &content, &mut warnings)?;
            files.push(PlannedFile {
                task_id: task.id.clone(),
                path,
                action,
            });
        }

        Ok(EmitOutcome { files, warnings })
    }

    fn emit_one(
        &self,
        task: &Task,
        path: &Path,
        content: &str,
        warnings: &mut Vec<Warning>,
    ) -> Result<FileAction> {
        // Probing existing content is read-only and allowed in dry runs so
        // the reported actions stay accurate.
        let existing = fs::read(path).ok();

        if let Some(bytes) = &existing {
            if bytes == content.as_bytes() {
                return Ok(FileAction::Unchanged);
            }
            if !self.options.overwrite {
                warnings.push(Warning::SkippedExisting {
                    id: task.id.clone(),
                    path: path.display().to_string(),
                });
                return Ok(FileAction::SkippedExisting);
            }
        }

        if self.options.dry_run {
            return Ok(FileAction::WouldWrite);
        }

        match fs::write(path, content) {
            Ok(()) => Ok(FileAction::Written),
            Err(source) if self.options.fail_fast => Err(EmitError::Write {
                path: path.display().to_string(),
                source,
            }
            .into()),
            Err(source) => {
                warnings.push(Warning::WriteFailed {
                    id: task.id.clone(),
                    path: path.display().to_string(),
                    reason: source.to_string(),
                });
                Ok(FileAction::Failed)
            }
        }
    }
}

/// Reduce a title to filename-safe form.
///
/// Keeps only `[A-Za-z0-9 _-]`, collapses whitespace runs, truncates to
/// [`MAX_TITLE_LEN`]. Path separators, `..`, and NUL bytes cannot survive
/// the allow-list.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect();
    let mut collapsed = cleaned.split_whitespace().join(" ");
    collapsed.truncate(MAX_TITLE_LEN);
    let trimmed = collapsed.trim_end();
    if trimmed.is_empty() {
        "task".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Backstop for the allow-list: the candidate must resolve to exactly one
/// normal component under the output directory.
fn ensure_contained(out_dir: &Path, candidate: &Path) -> Result<()> {
    let contained = candidate
        .strip_prefix(out_dir)
        .map(|rest| {
            let mut components = rest.components();
            matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            )
        })
        .unwrap_or(false);
    if contained {
        Ok(())
    } else {
        Err(EmitError::OutsideOutputDir {
            path: candidate.display().to_string(),
        }
        .into())
    }
}

/// Serialize one task record: metadata block, then body sections.
fn render_record(task: &Task) -> String {
    let mut labels = vec![format!("phase:{}", task.phase.kind)];
    if let Some(story) = &task.story {
        labels.push(format!("story:{}", story));
    }
    if task.parallelizable {
        labels.push("parallelizable".to_string());
    }
    labels.push(format!("P{}", task.priority));

    let dependencies = task.dependencies.iter().map(TaskId::as_str).join(", ");

    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("id: {}\n", task.id));
    out.push_str(&format!("title: {}\n", task.title));
    out.push_str(&format!("status: {}\n", task.status));
    out.push_str("assignees: []\n");
    out.push_str(&format!(
        "created_at: {}\n",
        task.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str(&format!("labels: [{}]\n", labels.join(", ")));
    out.push_str(&format!("dependencies: [{}]\n", dependencies));
    out.push_str("---\n\n");

    out.push_str("## Description\n\n");
    out.push_str(&task.description);
    out.push_str("\n\n");

    if !task.file_refs.is_empty() {
        out.push_str("## Files\n\n");
        for file in &task.file_refs {
            out.push_str(&format!("- {}\n", file));
        }
        out.push('\n');
    }

    out.push_str("## Phase\n\n");
    out.push_str(&format!(
        "Phase {}: {}\n\n",
        task.phase.ordinal, task.phase.label
    ));

    if task.parallelizable {
        out.push_str(&format!(
            "May run in parallel with the other tasks of batch {}.\n",
            task.batch.map(|b| b + 1).unwrap_or(1)
        ));
    } else {
        out.push_str("Runs sequentially after its dependencies.\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Phase;
    use crate::types::Timestamp;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn fixed_ts() -> Timestamp {
        chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn task(id: &str, title: &str) -> Task {
        Task::builder(id)
            .title(title)
            .description(title)
            .phase(Phase::new(1, "Setup"))
            .created_at(fixed_ts())
            .build()
    }

    #[test]
    fn test_sanitize_strips_outside_allow_list() {
        assert_eq!(sanitize_title("Fix the auth/login flow!"), "Fix the authlogin flow");
        assert_eq!(sanitize_title("a  b\t c"), "a b c");
    }

    #[test]
    fn test_sanitize_neutralizes_traversal() {
        assert_eq!(sanitize_title("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_title("/absolute/path"), "absolutepath");
        assert_eq!(sanitize_title("nul\0byte"), "nulbyte");
    }

    #[test]
    fn test_sanitize_truncates_and_falls_back() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_title(&long).len(), MAX_TITLE_LEN);
        assert_eq!(sanitize_title("!!!"), "task");
    }

    #[test]
    fn test_emit_writes_one_file_per_task() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![task("T001", "First"), task("T002", "Second")];
        let outcome = RecordEmitter::new(EmitOptions::default())
            .emit(&tasks, dir.path())
            .unwrap();

        assert_eq!(outcome.files.len(), 2);
        assert!(outcome.warnings.is_empty());
        for file in &outcome.files {
            assert_eq!(file.action, FileAction::Written);
            assert!(file.path.exists());
        }
        assert!(dir.path().join("T001 - First.md").exists());
    }

    #[test]
    fn test_collision_gets_numeric_suffix_in_order() {
        let dir = TempDir::new().unwrap();
        // Distinct ids whose sanitized forms coincide, titles likewise.
        let mut a = task("US.1", "Same / Title");
        let mut b = task("US/1", "Same * Title");
        a.sequence = 0;
        b.sequence = 1;
        let outcome = RecordEmitter::new(EmitOptions::default())
            .emit(&[a, b], dir.path())
            .unwrap();

        assert_eq!(
            outcome.files[0].path.file_name().unwrap().to_str().unwrap(),
            "US1 - Same Title.md"
        );
        assert_eq!(
            outcome.files[1].path.file_name().unwrap().to_str().unwrap(),
            "US1 - Same Title-2.md"
        );
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("records");
        let tasks = vec![task("T001", "First")];
        let outcome = RecordEmitter::new(EmitOptions {
            dry_run: true,
            ..Default::default()
        })
        .emit(&tasks, &out)
        .unwrap();

        assert_eq!(outcome.files[0].action, FileAction::WouldWrite);
        assert!(!out.exists());
    }

    #[test]
    fn test_existing_file_skipped_without_overwrite() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![task("T001", "First")];
        let emitter = RecordEmitter::new(EmitOptions::default());
        emitter.emit(&tasks, dir.path()).unwrap();

        // Divergent content: skip plus warning.
        let path = dir.path().join("T001 - First.md");
        fs::write(&path, "edited downstream").unwrap();
        let outcome = emitter.emit(&tasks, dir.path()).unwrap();
        assert_eq!(outcome.files[0].action, FileAction::SkippedExisting);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "edited downstream");

        // Overwrite replaces it.
        let outcome = RecordEmitter::new(EmitOptions {
            overwrite: true,
            ..Default::default()
        })
        .emit(&tasks, dir.path())
        .unwrap();
        assert_eq!(outcome.files[0].action, FileAction::Written);
        assert!(fs::read_to_string(&path).unwrap().starts_with("---\n"));
    }

    #[test]
    fn test_identical_existing_file_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let tasks = vec![task("T001", "First")];
        let emitter = RecordEmitter::new(EmitOptions::default());
        emitter.emit(&tasks, dir.path()).unwrap();

        let outcome = emitter.emit(&tasks, dir.path()).unwrap();
        assert_eq!(outcome.files[0].action, FileAction::Unchanged);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_record_contains_metadata_and_sections() {
        let mut t = task("T001", "Build parser");
        t.story = Some("US1".to_string());
        t.add_dependency(TaskId::from("T000")).unwrap();
        let content = render_record(&t);

        assert!(content.starts_with("---\n"));
        assert!(content.contains("id: T001\n"));
        assert!(content.contains("status: pending\n"));
        assert!(content.contains("assignees: []\n"));
        assert!(content.contains("labels: [phase:setup, story:US1, P1]\n"));
        assert!(content.contains("dependencies: [T000]\n"));
        assert!(content.contains("## Description"));
        assert!(content.contains("## Phase"));
        assert!(content.contains("created_at: 2024-05-01T12:00:00Z\n"));
    }

    #[test]
    fn test_write_failure_is_isolated() {
        let dir = TempDir::new().unwrap();
        // Occupy the first task's target path with a directory so the write
        // fails regardless of process privileges.
        fs::create_dir(dir.path().join("T001 - First.md")).unwrap();
        let tasks = vec![task("T001", "First"), task("T002", "Second")];

        let outcome = RecordEmitter::new(EmitOptions::default())
            .emit(&tasks, dir.path())
            .unwrap();

        assert_eq!(outcome.files[0].action, FileAction::Failed);
        assert_eq!(outcome.files[1].action, FileAction::Written);
        assert!(matches!(
            outcome.warnings[0],
            Warning::WriteFailed { .. }
        ));
    }

    #[test]
    fn test_fail_fast_aborts_on_write_failure() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("T001 - First.md")).unwrap();
        let tasks = vec![task("T001", "First"), task("T002", "Second")];

        let err = RecordEmitter::new(EmitOptions {
            fail_fast: true,
            ..Default::default()
        })
        .emit(&tasks, dir.path())
        .unwrap_err();

        assert!(matches!(
            err,
            crate::error::CompilerError::Emit(EmitError::Write { .. })
        ));
        assert!(!dir.path().join("T002 - Second.md").exists());
    }

    #[test]
    fn test_containment_rejects_escapes() {
        let dir = TempDir::new().unwrap();
        assert!(ensure_contained(dir.path(), &dir.path().join("fine.md")).is_ok());
        assert!(ensure_contained(dir.path(), &dir.path().join("a/b.md")).is_err());
        assert!(ensure_contained(dir.path(), Path::new("/etc/passwd")).is_err());
        assert!(ensure_contained(dir.path(), &dir.path().join("../escape.md")).is_err());
    }
}
