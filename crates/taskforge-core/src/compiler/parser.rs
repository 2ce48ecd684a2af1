//! Checklist Parser - raw plan text into ordered task records
//!
//! The parser recognizes a small line grammar (phase headers and checkbox
//! lines) and is tolerant of everything else: blank lines and prose are
//! skipped, a checkbox line that does not parse becomes a collected warning.
//! Only a duplicate task id aborts the parse, because ids anchor the
//! dependency graph.
//!
//! Parsing is a pure function of the input text: all per-run state lives in
//! an explicit [`ParseContext`], and the record timestamp can be injected so
//! identical input yields identical output.

use crate::error::{ParseError, Result, Warning};
use crate::task::{Phase, Task, TaskId};
use crate::types::{now, Timestamp};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};

lazy_static! {
    /// `Phase <n>: <label>`, optionally behind markdown heading markers.
    static ref PHASE_HEADER: Regex =
        Regex::new(r"(?i)^\s*#*\s*phase\s+(?P<ordinal>\d+)\s*:\s*(?P<label>.+?)\s*$").unwrap();

    /// Reserved `Final Phase` header, optional trailing label.
    static ref FINAL_HEADER: Regex =
        Regex::new(r"(?i)^\s*#*\s*final\s+phase\s*(?::\s*(?P<label>.+?))?\s*$").unwrap();

    /// `- [ ] <rest>` (completed boxes tolerated).
    static ref CHECKBOX: Regex =
        Regex::new(r"^\s*-\s*\[[ xX]\]\s+(?P<rest>.+?)\s*$").unwrap();

    /// Id token: letters then an alphanumeric tail containing at least one
    /// digit (`T001`, `AUTH-12`).
    static ref ID_TOKEN: Regex =
        Regex::new(r"^(?P<id>[A-Za-z][A-Za-z0-9_-]*\d[A-Za-z0-9_-]*)\b").unwrap();

    /// Trailing `[STORY]` tag.
    static ref STORY_TAG: Regex =
        Regex::new(r"\[(?P<story>[A-Za-z][A-Za-z0-9_-]*)\]\s*$").unwrap();

    /// Inline `(P<n>)` priority marker.
    static ref PRIORITY_MARK: Regex = Regex::new(r"\(P(?P<prio>\d+)\)").unwrap();

    /// Path-like tokens: anything with a directory separator, or a bare
    /// `name.ext` filename.
    static ref FILE_REF: Regex = Regex::new(
        r"[A-Za-z0-9_.-]+(?:/[A-Za-z0-9_.-]+)+|\b[A-Za-z0-9_-]+\.[A-Za-z][A-Za-z0-9]{0,4}\b"
    )
    .unwrap();
}

/// Parser output: ordered tasks plus the non-fatal diagnostics collected
/// along the way.
#[derive(Debug, Clone)]
pub struct ParsedChecklist {
    pub tasks: Vec<Task>,
    pub warnings: Vec<Warning>,
}

/// Mutable state threaded through a single parse run.
///
/// Holding this in an explicit context (instead of parser fields or
/// module-level statics) keeps `parse` a pure function.
#[derive(Debug)]
struct ParseContext {
    phase: Option<Phase>,
    next_ordinal: u32,
    seen: HashMap<TaskId, usize>,
    sequence: usize,
    warnings: Vec<Warning>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            phase: None,
            next_ordinal: 1,
            seen: HashMap::new(),
            sequence: 0,
            warnings: Vec::new(),
        }
    }

    fn enter_phase(&mut self, phase: Phase) {
        self.next_ordinal = self.next_ordinal.max(phase.ordinal + 1);
        self.phase = Some(phase);
    }

    fn next_sequence(&mut self) -> usize {
        let seq = self.sequence;
        self.sequence += 1;
        seq
    }
}

/// Checklist Parser
///
/// # Examples
///
/// ```
/// use taskforge_core::compiler::ChecklistParser;
///
/// let input = "\
/// Phase 1: Setup
/// - [ ] T001 Create the project scaffold
/// - [ ] T002 [P] Configure linting [US1]
/// ";
/// let parsed = ChecklistParser::new().parse(input).unwrap();
/// assert_eq!(parsed.tasks.len(), 2);
/// assert!(parsed.tasks[1].parallelizable);
/// ```
#[derive(Debug)]
pub struct ChecklistParser {
    timestamp: Timestamp,
}

impl ChecklistParser {
    /// Create a parser stamping records with the current time
    pub fn new() -> Self {
        Self { timestamp: now() }
    }

    /// Create a parser with a pinned record timestamp
    ///
    /// Reproducibility tests fix the clock here; `created_at` is the only
    /// non-deterministic field a default parser produces.
    pub fn with_timestamp(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }

    /// Parse a checklist into ordered tasks plus warnings
    ///
    /// # Errors
    ///
    /// Returns `Err` only for a duplicate task id. Malformed lines are
    /// collected as warnings and skipped.
    pub fn parse(&self, input: &str) -> Result<ParsedChecklist> {
        let mut ctx = ParseContext::new();
        let mut tasks = Vec::new();

        for (idx, raw_line) in input.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim_end();
            if line.trim().is_empty() {
                continue;
            }

            if let Some(caps) = PHASE_HEADER.captures(line) {
                // Ordinal fits u32 for any sane checklist; clamp overflow to
                // the running counter instead of failing the line.
                let ordinal = caps["ordinal"].parse().unwrap_or(ctx.next_ordinal);
                ctx.enter_phase(Phase::new(ordinal, &caps["label"]));
                continue;
            }

            if let Some(caps) = FINAL_HEADER.captures(line) {
                let label = caps
                    .name("label")
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| "Final".to_string());
                let ordinal = ctx.next_ordinal;
                ctx.enter_phase(Phase::final_phase(ordinal, label));
                continue;
            }

            if let Some(caps) = CHECKBOX.captures(line) {
                if let Some(task) = self.parse_checkbox(&caps["rest"], line_no, &mut ctx)? {
                    tasks.push(task);
                }
                continue;
            }

            // A bullet that is not a checkbox looks like an attempted task
            // line; anything else is surrounding prose and is ignored.
            if line.trim_start().starts_with('-') || line.trim_start().starts_with('*') {
                ctx.warnings.push(Warning::MalformedLine {
                    line: line_no,
                    reason: "expected checkbox syntax `- [ ] <ID> <description>`".to_string(),
                });
            }
        }

        Ok(ParsedChecklist {
            tasks,
            warnings: ctx.warnings,
        })
    }

    /// Parse the remainder of a checkbox line into a task.
    ///
    /// Returns `Ok(None)` when the line is malformed (warning collected);
    /// `Err` only on a duplicate id.
    fn parse_checkbox(
        &self,
        rest: &str,
        line_no: usize,
        ctx: &mut ParseContext,
    ) -> Result<Option<Task>> {
        let mut rest = rest.trim();
        let mut parallelizable = false;

        if let Some(stripped) = rest.strip_prefix("[P]") {
            parallelizable = true;
            rest = stripped.trim_start();
        }

        let caps = match ID_TOKEN.captures(rest) {
            Some(caps) => caps,
            None => {
                ctx.warnings.push(Warning::MalformedLine {
                    line: line_no,
                    reason: "missing task id token".to_string(),
                });
                return Ok(None);
            }
        };
        let id = TaskId::new(&caps["id"]);
        let mut desc = rest[caps.get(0).expect("match exists").end()..]
            .trim_start()
            .to_string();

        // `[P]` is also accepted directly after the id token.
        if let Some(stripped) = desc.strip_prefix("[P]") {
            parallelizable = true;
            desc = stripped.trim_start().to_string();
        }

        if let Some(&first_line) = ctx.seen.get(&id) {
            return Err(ParseError::DuplicateId {
                id,
                first_line,
                line: line_no,
            }
            .into());
        }
        ctx.seen.insert(id.clone(), line_no);

        let mut story = None;
        if let Some(caps) = STORY_TAG.captures(&desc) {
            let tag = caps["story"].to_string();
            let start = caps.get(0).expect("match exists").start();
            desc.truncate(start);
            if tag == "P" {
                // A trailing parallel marker, tolerated outside its
                // documented prefix position.
                parallelizable = true;
            } else {
                story = Some(tag);
            }
        }

        let mut priority = None;
        if let Some(caps) = PRIORITY_MARK.captures(&desc) {
            priority = caps["prio"].parse().ok();
            desc = PRIORITY_MARK.replace(&desc, "").into_owned();
        }

        // Normalize runs of whitespace left behind by marker stripping.
        let desc = desc.split_whitespace().collect::<Vec<_>>().join(" ");
        if desc.is_empty() {
            ctx.warnings.push(Warning::MalformedLine {
                line: line_no,
                reason: format!("task {} has an empty description", id),
            });
            return Ok(None);
        }

        let phase = match &ctx.phase {
            Some(phase) => phase.clone(),
            None => {
                ctx.warnings.push(Warning::UnphasedTask {
                    id: id.clone(),
                    line: line_no,
                });
                Phase::unphased()
            }
        };

        let mut builder = Task::builder(id)
            .title(derive_title(&desc))
            .file_refs(extract_file_refs(&desc))
            .description(desc)
            .phase(phase)
            .story(story)
            .parallelizable(parallelizable)
            .sequence(ctx.next_sequence())
            .created_at(self.timestamp);
        if let Some(priority) = priority {
            builder = builder.priority(priority);
        }

        Ok(Some(builder.build()))
    }
}

impl Default for ChecklistParser {
    fn default() -> Self {
        Self::new()
    }
}

/// First sentence of the description.
fn derive_title(desc: &str) -> String {
    match desc.find(". ") {
        Some(pos) => desc[..pos + 1].trim().to_string(),
        None => desc.trim().to_string(),
    }
}

/// Path strings mentioned in a description.
fn extract_file_refs(desc: &str) -> BTreeSet<String> {
    FILE_REF
        .find_iter(desc)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
