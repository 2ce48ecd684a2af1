//! Mapping Orchestrator - sequences the compiler pipeline
//!
//! Parse -> infer -> validate/schedule -> emit, producing the final
//! [`RunReport`]. Fatal errors (duplicate id, empty checklist, dependency
//! cycle) abort before the emitter runs, so a failed run never writes a
//! single file.

use crate::compiler::emit::{EmitOptions, PlannedFile, RecordEmitter};
use crate::compiler::graph::{ExecutionPlan, TaskGraph};
use crate::compiler::infer::DependencyEngine;
use crate::compiler::parser::ChecklistParser;
use crate::error::{ParseError, Result, Warning};
use crate::task::{Task, TaskId};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use uuid::Uuid;

/// Options for one compiler invocation.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Emitter mode flags
    pub emit: EmitOptions,

    /// Pin `created_at` on every record; `None` uses the wall clock
    pub timestamp: Option<Timestamp>,
}

/// Task count for one phase section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCount {
    pub ordinal: u32,
    pub label: String,
    pub count: usize,
}

/// The structured run report handed back to the surrounding orchestration
/// layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub total_tasks: usize,
    pub tasks_per_phase: Vec<PhaseCount>,
    /// Counts for explicitly tagged stories
    pub tasks_per_story: BTreeMap<String, usize>,
    pub execution_order: Vec<TaskId>,
    pub batch_count: usize,
    pub batches: Vec<Vec<TaskId>>,
    pub critical_path_len: usize,
    pub critical_path: Vec<TaskId>,
    /// Files written, or planned in dry-run mode
    pub files: Vec<PlannedFile>,
    pub warnings: Vec<Warning>,
    pub dry_run: bool,
}

impl RunReport {
    /// Whether the run completed with non-fatal diagnostics (exit code 2 at
    /// the CLI boundary).
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Task Specification Compiler
///
/// # Examples
///
/// ```no_run
/// use taskforge_core::compiler::{CompileOptions, TaskSpecCompiler};
/// use std::path::Path;
///
/// let input = "Phase 1: Setup\n- [ ] T001 Create the repo\n";
/// let compiler = TaskSpecCompiler::new(CompileOptions::default());
/// let report = compiler.compile(input, Path::new("records"))?;
/// println!("{} tasks in {} batches", report.total_tasks, report.batch_count);
/// # Ok::<(), taskforge_core::CompilerError>(())
/// ```
#[derive(Debug, Default)]
pub struct TaskSpecCompiler {
    options: CompileOptions,
}

impl TaskSpecCompiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Run the full pipeline and emit task records into `out_dir`
    ///
    /// # Errors
    ///
    /// Returns `Err` for a duplicate id, an empty checklist, a dependency
    /// cycle, or an emitter failure. No file is written when the error
    /// arises before emission.
    pub fn compile(&self, input: &str, out_dir: &Path) -> Result<RunReport> {
        let (tasks, plan, mut warnings) = self.analyze(input)?;

        let ordered = order_tasks(&tasks, &plan.order);
        let emitter = RecordEmitter::new(self.options.emit.clone());
        let outcome = emitter.emit(&ordered, out_dir)?;
        warnings.extend(outcome.warnings);

        Ok(self.report(&tasks, plan, outcome.files, warnings, self.options.emit.dry_run))
    }

    /// Run the pipeline without emitting anything
    ///
    /// Validation-only entry point for `check`-style callers; the report's
    /// file list is empty and `dry_run` is set.
    pub fn check(&self, input: &str) -> Result<RunReport> {
        let (tasks, plan, warnings) = self.analyze(input)?;
        Ok(self.report(&tasks, plan, Vec::new(), warnings, true))
    }

    /// Shared front half of the pipeline: parse, infer, validate, schedule,
    /// annotate.
    fn analyze(&self, input: &str) -> Result<(Vec<Task>, ExecutionPlan, Vec<Warning>)> {
        let parser = match self.options.timestamp {
            Some(ts) => ChecklistParser::with_timestamp(ts),
            None => ChecklistParser::new(),
        };
        let parsed = parser.parse(input)?;
        let mut tasks = parsed.tasks;
        let warnings = parsed.warnings;

        if tasks.is_empty() {
            return Err(ParseError::EmptyChecklist.into());
        }

        DependencyEngine::new().infer(&mut tasks)?;

        let graph = TaskGraph::from_tasks(&tasks);
        let plan = graph.plan()?;
        annotate(&mut tasks, &plan);

        Ok((tasks, plan, warnings))
    }

    fn report(
        &self,
        tasks: &[Task],
        plan: ExecutionPlan,
        files: Vec<PlannedFile>,
        warnings: Vec<Warning>,
        dry_run: bool,
    ) -> RunReport {
        RunReport {
            run_id: Uuid::new_v4(),
            total_tasks: tasks.len(),
            tasks_per_phase: phase_counts(tasks),
            tasks_per_story: story_counts(tasks),
            execution_order: plan.order,
            batch_count: plan.batches.len(),
            batches: plan.batches,
            critical_path_len: plan.critical_path_len,
            critical_path: plan.critical_path,
            files,
            warnings,
            dry_run,
        }
    }
}

/// Write the scheduler's results back onto the tasks; they are immutable
/// from here on.
fn annotate(tasks: &mut [Task], plan: &ExecutionPlan) {
    let position: HashMap<&TaskId, usize> = plan
        .order
        .iter()
        .enumerate()
        .map(|(i, id)| (id, i))
        .collect();
    let batch_of: HashMap<&TaskId, usize> = plan
        .batches
        .iter()
        .enumerate()
        .flat_map(|(b, ids)| ids.iter().map(move |id| (id, b)))
        .collect();
    let critical: HashSet<&TaskId> = plan.critical_path.iter().collect();

    for task in tasks.iter_mut() {
        task.execution_index = position.get(&task.id).copied();
        task.batch = batch_of.get(&task.id).copied();
        task.on_critical_path = critical.contains(&task.id);
    }
}

/// Clone tasks into execution order for the emitter.
fn order_tasks(tasks: &[Task], order: &[TaskId]) -> Vec<Task> {
    let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();
    order
        .iter()
        .filter_map(|id| by_id.get(id).copied().cloned())
        .collect()
}

fn phase_counts(tasks: &[Task]) -> Vec<PhaseCount> {
    let mut counts: BTreeMap<(u32, &str), usize> = BTreeMap::new();
    for task in tasks {
        *counts
            .entry((task.phase.ordinal, task.phase.label.as_str()))
            .or_default() += 1;
    }
    counts
        .into_iter()
        .map(|((ordinal, label), count)| PhaseCount {
            ordinal,
            label: label.to_string(),
            count,
        })
        .collect()
}

fn story_counts(tasks: &[Task]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for task in tasks {
        if let Some(story) = &task.story {
            *counts.entry(story.clone()).or_default() += 1;
        }
    }
    counts
}
