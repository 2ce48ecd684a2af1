//! Dependency Inference Engine - derives edges from explicit references and
//! phase structure
//!
//! Rules apply in a fixed precedence and their edges are merged (set union):
//!
//! 1. **Explicit reference** - a description or file reference literally
//!    mentioning another task's id depends on that task.
//! 2. **Phase barrier** - Setup tasks have no inferred dependencies;
//!    Foundational tasks depend on all Setup tasks; story-phase tasks depend
//!    on all Foundational tasks plus earlier tasks of the same story; Final
//!    tasks depend on all story-phase tasks.
//! 3. The `[P]` flag exempts a task from intra-story sequencing only; it
//!    never removes a phase barrier or an explicit reference.
//!
//! The engine is deterministic: the same annotated tasks always produce the
//! same dependency sets.

use crate::error::Result;
use crate::task::{PhaseKind, Task, TaskId};
use itertools::Itertools;
use std::collections::HashMap;

/// Dependency Inference Engine
#[derive(Debug, Default)]
pub struct DependencyEngine;

impl DependencyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Infer dependency edges for every task, in place
    ///
    /// # Errors
    ///
    /// Returns `Err` if a rule would add a self-edge. The documented rules
    /// cannot produce one; the guard protects against regressions.
    pub fn infer(&self, tasks: &mut [Task]) -> Result<()> {
        self.infer_explicit_references(tasks)?;
        self.infer_phase_barriers(tasks)?;
        Ok(())
    }

    /// Rule 1: explicit id references in descriptions and file references.
    fn infer_explicit_references(&self, tasks: &mut [Task]) -> Result<()> {
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();

        for i in 0..tasks.len() {
            let referenced: Vec<TaskId> = ids
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .filter(|(_, id)| {
                    mentions(&tasks[i].description, id.as_str())
                        || tasks[i]
                            .file_refs
                            .iter()
                            .any(|r| mentions(r, id.as_str()))
                })
                .map(|(_, id)| id.clone())
                .collect();

            for dep in referenced {
                tasks[i].add_dependency(dep)?;
            }
        }
        Ok(())
    }

    /// Rule 2 and 3: phase barriers and intra-story ordering.
    fn infer_phase_barriers(&self, tasks: &mut [Task]) -> Result<()> {
        let ids_of = |kind: PhaseKind, tasks: &[Task]| -> Vec<TaskId> {
            tasks
                .iter()
                .filter(|t| t.phase.kind == kind)
                .map(|t| t.id.clone())
                .collect()
        };
        let setup = ids_of(PhaseKind::Setup, tasks);
        let foundational = ids_of(PhaseKind::Foundational, tasks);
        let story_phase = ids_of(PhaseKind::Story, tasks);

        for i in 0..tasks.len() {
            let barrier: &[TaskId] = match tasks[i].phase.kind {
                PhaseKind::Setup => &[],
                PhaseKind::Foundational => &setup,
                PhaseKind::Story => &foundational,
                PhaseKind::Final => &story_phase,
            };
            for dep in barrier.to_vec() {
                tasks[i].add_dependency(dep)?;
            }
        }

        self.infer_intra_story_order(tasks)
    }

    /// Chain story-phase tasks within each story by parse order. Tasks
    /// without a story tag form one implicit story per phase, so plain
    /// checklist order stays meaningful.
    fn infer_intra_story_order(&self, tasks: &mut [Task]) -> Result<()> {
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, task) in tasks.iter().enumerate() {
            if task.phase.kind != PhaseKind::Story {
                continue;
            }
            let key = match &task.story {
                Some(story) => format!("story:{}", story),
                None => format!("phase:{}", task.phase.ordinal),
            };
            groups.entry(key).or_default().push(i);
        }

        for indices in groups.into_values() {
            let ordered: Vec<usize> = indices
                .into_iter()
                .sorted_by_key(|&i| tasks[i].sequence)
                .collect();
            for (pos, &i) in ordered.iter().enumerate() {
                if tasks[i].parallelizable {
                    continue;
                }
                for &earlier in &ordered[..pos] {
                    let dep = tasks[earlier].id.clone();
                    tasks[i].add_dependency(dep)?;
                }
            }
        }
        Ok(())
    }
}

/// Word-boundary containment check for an id token.
///
/// `T1` must not match inside `T10`, so the characters around the match must
/// fall outside the id alphabet.
fn mentions(text: &str, id: &str) -> bool {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(pos) = text[start..].find(id) {
        let begin = start + pos;
        let end = begin + id.len();
        let before_ok = begin == 0 || !is_id_char(bytes[begin - 1]);
        let after_ok = end == text.len() || !is_id_char(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        start = begin + 1;
    }
    false
}

fn is_id_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}
