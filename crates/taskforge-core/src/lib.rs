//! Taskforge Core - the task specification compiler
//!
//! Taskforge turns a loosely structured, checklist-style task plan into a
//! validated, dependency-ordered set of individually addressable task
//! records.
//!
//! # Architecture
//!
//! The compiler is a straight pipeline of four components:
//!
//! 1. **Checklist Parser** (`compiler::parser`): tolerant line grammar over
//!    the plan text
//! 2. **Dependency Inference** (`compiler::infer`): explicit references plus
//!    phase/story barriers
//! 3. **Graph Validator / Scheduler** (`compiler::graph`): cycle detection,
//!    deterministic topological order, parallel batches, critical path
//! 4. **Record Emitter** (`compiler::emit`): safe, idempotent file
//!    generation
//!
//! # Quick Start
//!
//! ```
//! use taskforge_core::compiler::{ChecklistParser, DependencyEngine, TaskGraph};
//!
//! let input = "\
//! Phase 1: Setup
//! - [ ] T001 Create the project scaffold
//! Phase 2: Foundational
//! - [ ] T002 Define the task model
//! ";
//!
//! let parsed = ChecklistParser::new().parse(input).unwrap();
//! let mut tasks = parsed.tasks;
//! DependencyEngine::new().infer(&mut tasks).unwrap();
//!
//! let plan = TaskGraph::from_tasks(&tasks).plan().unwrap();
//! assert_eq!(plan.order.len(), 2);
//! assert_eq!(plan.critical_path_len, 1);
//! ```
//!
//! # Design Principles
//!
//! 1. **Determinism**: identical input always yields identical output; every
//!    tie-break is explicit
//! 2. **All or nothing**: fatal errors abort before a single file is written
//! 3. **Typed failures**: callers branch on error kind, never on message
//!    text
//! 4. **Containment**: no title content can steer a write outside the output
//!    directory

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod compiler;
pub mod error;
pub mod task;
pub mod types;

// Re-export commonly used types for convenience
pub use compiler::{
    ChecklistParser, CompileOptions, DependencyEngine, EmitOptions, RecordEmitter, RunReport,
    TaskGraph, TaskSpecCompiler,
};
pub use error::{
    CompilerError, CycleError, EmitError, InferenceError, ParseError, Result, Warning,
};
pub use task::{Phase, PhaseKind, Task, TaskId};
pub use types::{TaskStatus, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
