//! Task data structure and operations
//!
//! This module implements the Task record, the fundamental unit the compiler
//! produces. A Task is created by the parser, gains dependency edges during
//! inference, is annotated by the scheduler, and becomes immutable once it
//! reaches the emitter.

use crate::error::{InferenceError, Result};
use crate::types::{TaskStatus, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier token for a task, taken verbatim from the checklist (`T001`,
/// `AUTH-12`). Unique within a run; anchors the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Coarse phase classification driving the dependency barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Setup,
    Foundational,
    Story,
    Final,
}

impl PhaseKind {
    /// Classify a phase header label.
    ///
    /// Labels containing "setup" are Setup, "foundation" Foundational,
    /// "final" or "polish" Final; everything else is treated as a story
    /// phase.
    pub fn classify(label: &str) -> Self {
        let label = label.to_lowercase();
        if label.contains("setup") {
            PhaseKind::Setup
        } else if label.contains("foundation") {
            PhaseKind::Foundational
        } else if label.contains("final") || label.contains("polish") {
            PhaseKind::Final
        } else {
            PhaseKind::Story
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PhaseKind::Setup => "setup",
            PhaseKind::Foundational => "foundational",
            PhaseKind::Story => "story",
            PhaseKind::Final => "final",
        };
        write!(f, "{}", s)
    }
}

/// An ordered phase section of the checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub ordinal: u32,
    pub label: String,
    pub kind: PhaseKind,
}

impl Phase {
    /// Build a phase from a numbered header, classifying the kind from the
    /// label.
    pub fn new(ordinal: u32, label: impl Into<String>) -> Self {
        let label = label.into();
        let kind = PhaseKind::classify(&label);
        Self {
            ordinal,
            label,
            kind,
        }
    }

    /// The reserved `Final Phase` header.
    pub fn final_phase(ordinal: u32, label: impl Into<String>) -> Self {
        Self {
            ordinal,
            label: label.into(),
            kind: PhaseKind::Final,
        }
    }

    /// Implicit phase for tasks parsed before the first header.
    pub fn unphased() -> Self {
        Self {
            ordinal: 0,
            label: "Unphased".to_string(),
            kind: PhaseKind::Setup,
        }
    }
}

/// A single task record
///
/// # Invariants
///
/// - `id` is unique within a run
/// - `dependencies` never contains the task's own id
/// - once inference completes, the dependency relation over all tasks is a DAG
///
/// `created_at` is non-semantic: two tasks differing only in `created_at`
/// compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Identifier token from the checklist
    pub id: TaskId,

    /// First sentence of the description
    pub title: String,

    /// Full free text after the id token, inline markers stripped
    pub description: String,

    /// Phase section this task belongs to
    pub phase: Phase,

    /// Optional story grouping tag (`[US1]`)
    pub story: Option<String>,

    /// Priority ordinal; defaults to the phase ordinal
    pub priority: u32,

    /// Path strings mentioned in the description
    pub file_refs: BTreeSet<String>,

    /// `[P]` marker: exempt from intra-story sequencing
    pub parallelizable: bool,

    /// Ids of tasks that must complete before this one
    pub dependencies: BTreeSet<TaskId>,

    /// Always the initial status when emitted
    pub status: TaskStatus,

    /// Original parse order; tie-break key for scheduling
    pub sequence: usize,

    /// Creation timestamp (non-semantic for equality)
    pub created_at: Timestamp,

    /// Position in the computed execution order (set by the scheduler)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_index: Option<usize>,

    /// Parallel batch this task belongs to (set by the scheduler)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<usize>,

    /// Whether this task lies on the critical path (set by the scheduler)
    #[serde(default)]
    pub on_critical_path: bool,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.description == other.description
            && self.phase == other.phase
            && self.story == other.story
            && self.priority == other.priority
            && self.file_refs == other.file_refs
            && self.parallelizable == other.parallelizable
            && self.dependencies == other.dependencies
            && self.status == other.status
            && self.sequence == other.sequence
            && self.execution_index == other.execution_index
            && self.batch == other.batch
            && self.on_critical_path == other.on_critical_path
    }
}

impl Eq for Task {}

impl Task {
    /// Create a builder for fluent task construction
    pub fn builder(id: impl Into<TaskId>) -> TaskBuilder {
        TaskBuilder::new(id)
    }

    /// Add a dependency edge onto this task
    ///
    /// # Errors
    ///
    /// Returns `Err` if `dep` is this task's own id.
    pub fn add_dependency(&mut self, dep: TaskId) -> std::result::Result<(), InferenceError> {
        if dep == self.id {
            return Err(InferenceError::SelfDependency { id: dep });
        }
        self.dependencies.insert(dep);
        Ok(())
    }

    /// Check whether this task depends on `id` directly
    pub fn depends_on(&self, id: &TaskId) -> bool {
        self.dependencies.contains(id)
    }

    /// Validate the task's invariants
    pub fn validate(&self) -> Result<()> {
        if self.dependencies.contains(&self.id) {
            return Err(InferenceError::SelfDependency {
                id: self.id.clone(),
            }
            .into());
        }
        Ok(())
    }
}

impl From<String> for TaskId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Builder for constructing tasks fluently
#[derive(Debug)]
pub struct TaskBuilder {
    id: TaskId,
    title: Option<String>,
    description: String,
    phase: Phase,
    story: Option<String>,
    priority: Option<u32>,
    file_refs: BTreeSet<String>,
    parallelizable: bool,
    sequence: usize,
    created_at: Option<Timestamp>,
}

impl TaskBuilder {
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: String::new(),
            phase: Phase::unphased(),
            story: None,
            priority: None,
            file_refs: BTreeSet::new(),
            parallelizable: false,
            sequence: 0,
            created_at: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn story(mut self, story: Option<String>) -> Self {
        self.story = story;
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn file_refs(mut self, refs: BTreeSet<String>) -> Self {
        self.file_refs = refs;
        self
    }

    pub fn parallelizable(mut self, flag: bool) -> Self {
        self.parallelizable = flag;
        self
    }

    pub fn sequence(mut self, sequence: usize) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn created_at(mut self, ts: Timestamp) -> Self {
        self.created_at = Some(ts);
        self
    }

    /// Build the task
    ///
    /// The title falls back to the description when not set explicitly;
    /// priority falls back to the phase ordinal.
    pub fn build(self) -> Task {
        let priority = self.priority.unwrap_or(self.phase.ordinal);
        Task {
            id: self.id,
            title: self.title.unwrap_or_else(|| self.description.clone()),
            description: self.description,
            phase: self.phase,
            story: self.story,
            priority,
            file_refs: self.file_refs,
            parallelizable: self.parallelizable,
            dependencies: BTreeSet::new(),
            status: TaskStatus::Pending,
            sequence: self.sequence,
            created_at: self.created_at.unwrap_or_else(crate::types::now),
            execution_index: None,
            batch: None,
            on_critical_path: false,
        }
    }
}
