//! Error types for Taskforge Core
//!
//! This module defines all error types used throughout the compiler.
//! We use `thiserror` for ergonomic error definitions with automatic
//! Display/Error implementations. Each pipeline stage has its own error
//! enum so callers can branch on kind without string matching.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::task::TaskId;

/// Result type alias for compiler operations
pub type Result<T> = std::result::Result<T, CompilerError>;

/// Main error type for compiler operations
#[derive(Error, Debug)]
pub enum CompilerError {
    /// Checklist parsing errors (fatal kinds only; malformed lines are warnings)
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Dependency inference errors
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),

    /// Dependency cycle in the task graph
    #[error("{0}")]
    Cycle(#[from] CycleError),

    /// Record emission errors
    #[error("emit error: {0}")]
    Emit(#[from] EmitError),

    /// IO errors while reading the source checklist
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal errors raised by the Checklist Parser
///
/// A malformed line is never fatal; it is collected as a [`Warning`] and
/// parsing continues. Only conditions that would leave the dependency graph
/// without an anchor abort the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error(
        "duplicate task id {id} on line {line} (first defined on line {first_line}); \
         ids must be unique within a checklist"
    )]
    DuplicateId {
        id: TaskId,
        first_line: usize,
        line: usize,
    },

    #[error("checklist contains no tasks")]
    EmptyChecklist,
}

/// Errors raised by the Dependency Inference Engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// Defensive guard; unreachable through the documented inference rules.
    #[error("task {id} cannot depend on itself")]
    SelfDependency { id: TaskId },
}

/// A dependency cycle in the task graph
///
/// `cycle` names the full cycle in edge order, with the entry task repeated
/// at the end (`[A, B, A]`). Always fatal; reported before any file is
/// written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("dependency cycle detected: {}", format_cycle(.cycle))]
pub struct CycleError {
    pub cycle: Vec<TaskId>,
}

fn format_cycle(cycle: &[TaskId]) -> String {
    cycle
        .iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors raised by the Record Emitter
#[derive(Error, Debug)]
pub enum EmitError {
    /// Containment guard; unreachable for filenames produced by sanitization.
    #[error("refusing to write outside the output directory: {path}")]
    OutsideOutputDir { path: String },

    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A single file write failed while fail-fast mode was requested.
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Non-fatal diagnostics accumulated across a run
///
/// Warnings never abort the pipeline; they ride along into the final
/// [`RunReport`](crate::compiler::RunReport) and map to exit code 2 at the
/// CLI boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A line that looked like a checkbox entry but did not parse.
    MalformedLine { line: usize, reason: String },

    /// A checkbox line appeared before the first phase header.
    UnphasedTask { id: TaskId, line: usize },

    /// An existing record differed and `overwrite` was not set.
    SkippedExisting { id: TaskId, path: String },

    /// A single record write failed; the run continued.
    WriteFailed {
        id: TaskId,
        path: String,
        reason: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MalformedLine { line, reason } => {
                write!(f, "line {}: {}", line, reason)
            }
            Warning::UnphasedTask { id, line } => {
                write!(
                    f,
                    "line {}: task {} appears before any phase header; attached to Phase 0",
                    line, id
                )
            }
            Warning::SkippedExisting { id, path } => {
                write!(
                    f,
                    "task {}: {} already exists with different content; skipped (use overwrite to replace)",
                    id, path
                )
            }
            Warning::WriteFailed { id, path, reason } => {
                write!(f, "task {}: failed to write {}: {}", id, path, reason)
            }
        }
    }
}
