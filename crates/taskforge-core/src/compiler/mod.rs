//! Task Specification Compiler - checklist text into validated task records
//!
//! The pipeline runs in four stages, each its own component:
//!
//! - **Parser**: raw checklist text -> ordered tasks plus warnings
//! - **Inference**: phase/story/reference signals -> dependency edges
//! - **Graph**: cycle validation, execution order, batches, critical path
//! - **Emitter**: one addressable record file per task
//!
//! The [`TaskSpecCompiler`] orchestrates the stages and produces the final
//! [`RunReport`].
//!
//! # Examples
//!
//! ```no_run
//! use taskforge_core::compiler::{CompileOptions, TaskSpecCompiler};
//! use std::path::Path;
//!
//! let checklist = std::fs::read_to_string("tasks.md")?;
//! let compiler = TaskSpecCompiler::new(CompileOptions::default());
//! let report = compiler.compile(&checklist, Path::new("records"))?;
//!
//! for id in &report.execution_order {
//!     println!("{}", id);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod emit;
pub mod graph;
pub mod infer;
pub mod orchestrator;
pub mod parser;

pub use emit::{sanitize_title, EmitOptions, EmitOutcome, FileAction, PlannedFile, RecordEmitter};
pub use graph::{ExecutionPlan, TaskGraph};
pub use infer::DependencyEngine;
pub use orchestrator::{CompileOptions, PhaseCount, RunReport, TaskSpecCompiler};
pub use parser::{ChecklistParser, ParsedChecklist};

// Re-export for convenience
pub use crate::error::Result;
