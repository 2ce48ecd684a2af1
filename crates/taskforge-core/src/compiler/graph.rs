//! Graph Validator / Scheduler - cycle detection and deterministic scheduling
//!
//! Builds the dependency DAG over parsed tasks and computes the execution
//! plan: a topologically sorted execution order with a deterministic
//! tie-break, parallel batches grouped by dependency depth, and the critical
//! path by edge count.
//!
//! # Invariants
//!
//! - A cycle is fatal and reported with the full cycle in edge order
//! - For every edge u -> v, u precedes v in the execution order
//! - No batch contains two tasks connected by a direct or transitive
//!   dependency

use crate::error::{CycleError, Result};
use crate::task::{Task, TaskId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// The computed schedule for one compiler run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Deterministic topological order over all tasks
    pub order: Vec<TaskId>,

    /// Tasks grouped by dependency depth; tasks in one batch are mutually
    /// unreachable and could be worked on concurrently downstream
    pub batches: Vec<Vec<TaskId>>,

    /// Longest dependency chain, in dependency order
    pub critical_path: Vec<TaskId>,

    /// Length of the critical path in edge count
    pub critical_path_len: usize,
}

/// Dependency DAG over a run's tasks
///
/// Edges point from dependency to dependent: `u -> v` means `u` must
/// complete before `v`. Ties in every computation are broken by
/// `(phase ordinal, parse sequence)` so identical input yields identical
/// output.
#[derive(Debug)]
pub struct TaskGraph {
    graph: DiGraph<TaskId, ()>,
    node_map: HashMap<TaskId, NodeIndex>,
    /// Tie-break key per node: (phase ordinal, parse sequence)
    keys: HashMap<NodeIndex, (u32, usize)>,
}

impl TaskGraph {
    /// Build the adjacency structure from inferred tasks.
    ///
    /// Dependencies always name parsed tasks (the inference engine only ever
    /// adds known ids), so unknown ids are ignored rather than failed.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();
        let mut keys = HashMap::new();

        for task in tasks {
            let idx = graph.add_node(task.id.clone());
            node_map.insert(task.id.clone(), idx);
            keys.insert(idx, (task.phase.ordinal, task.sequence));
        }
        for task in tasks {
            let to = node_map[&task.id];
            for dep in &task.dependencies {
                if let Some(&from) = node_map.get(dep) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Self {
            graph,
            node_map,
            keys,
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Compute the full execution plan
    ///
    /// # Errors
    ///
    /// Returns `CycleError` before computing anything else if the graph is
    /// not a DAG.
    pub fn plan(&self) -> Result<ExecutionPlan> {
        self.validate()?;
        let order = self.execution_order();
        let batches = self.parallel_batches(&order);
        let (critical_path_len, critical_path) = self.critical_path(&order);
        Ok(ExecutionPlan {
            order,
            batches,
            critical_path,
            critical_path_len,
        })
    }

    /// Detect cycles, naming the full cycle in edge order
    ///
    /// # Errors
    ///
    /// Returns `CycleError` with the entry task repeated at the end
    /// (`[A, B, A]`).
    pub fn validate(&self) -> Result<()> {
        for edge in self.graph.edge_indices() {
            if let Some((a, b)) = self.graph.edge_endpoints(edge) {
                if a == b {
                    let id = self.graph[a].clone();
                    return Err(CycleError {
                        cycle: vec![id.clone(), id],
                    }
                    .into());
                }
            }
        }

        for scc in tarjan_scc(&self.graph) {
            if scc.len() > 1 {
                return Err(CycleError {
                    cycle: self.extract_cycle(&scc),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Walk a strongly connected component into a concrete cycle path.
    ///
    /// Every node in a non-trivial SCC has an out-edge inside the component,
    /// so following smallest-key successors must revisit a node.
    fn extract_cycle(&self, scc: &[NodeIndex]) -> Vec<TaskId> {
        let members: HashSet<NodeIndex> = scc.iter().copied().collect();
        let start = scc
            .iter()
            .copied()
            .min_by_key(|n| self.keys[n])
            .expect("scc is non-empty");

        let mut path = vec![start];
        let mut seen_at: HashMap<NodeIndex, usize> = HashMap::new();
        seen_at.insert(start, 0);
        let mut current = start;
        loop {
            let next = self
                .graph
                .neighbors(current)
                .filter(|n| members.contains(n))
                .min_by_key(|n| self.keys[n])
                .expect("scc node has an out-edge within its component");
            if let Some(&pos) = seen_at.get(&next) {
                let mut cycle: Vec<TaskId> =
                    path[pos..].iter().map(|&n| self.graph[n].clone()).collect();
                cycle.push(self.graph[next].clone());
                return cycle;
            }
            seen_at.insert(next, path.len());
            path.push(next);
            current = next;
        }
    }

    /// Kahn's algorithm with an ascending `(phase ordinal, sequence)`
    /// tie-break over the ready set. Assumes `validate` has passed.
    fn execution_order(&self) -> Vec<TaskId> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| {
                (
                    n,
                    self.graph.neighbors_directed(n, Direction::Incoming).count(),
                )
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<((u32, usize), NodeIndex)>> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n] == 0)
            .map(|n| Reverse((self.keys[&n], n)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((_, node))) = ready.pop() {
            order.push(self.graph[node].clone());
            for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let degree = in_degree.get_mut(&succ).expect("node is known");
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse((self.keys[&succ], succ)));
                }
            }
        }
        order
    }

    /// Group tasks by longest-path depth from the roots.
    ///
    /// Any dependency path strictly increases depth, so two tasks sharing a
    /// batch can never reach one another.
    fn parallel_batches(&self, order: &[TaskId]) -> Vec<Vec<TaskId>> {
        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        for id in order {
            let node = self.node_map[id];
            let d = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .map(|pred| depth[&pred] + 1)
                .max()
                .unwrap_or(0);
            depth.insert(node, d);
        }

        let batch_count = depth.values().map(|d| d + 1).max().unwrap_or(0);
        let mut batches = vec![Vec::new(); batch_count];
        // Execution order is already sorted by the tie-break key within each
        // depth, so batches come out deterministic.
        for id in order {
            let node = self.node_map[id];
            batches[depth[&node]].push(id.clone());
        }
        batches
    }

    /// Longest dependency chain by edge count.
    ///
    /// Returns the edge count and the chain itself in dependency order.
    fn critical_path(&self, order: &[TaskId]) -> (usize, Vec<TaskId>) {
        let mut longest: HashMap<NodeIndex, usize> = HashMap::new();
        let mut best_pred: HashMap<NodeIndex, NodeIndex> = HashMap::new();

        for id in order {
            let node = self.node_map[id];
            let pred = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                // Longest chain wins; equal chains resolve to the smallest
                // key so the reported path is stable.
                .min_by_key(|p| (Reverse(longest[p]), self.keys[p]));
            match pred {
                Some(p) => {
                    longest.insert(node, longest[&p] + 1);
                    best_pred.insert(node, p);
                }
                None => {
                    longest.insert(node, 0);
                }
            }
        }

        let Some(end) = self
            .graph
            .node_indices()
            .min_by_key(|n| (Reverse(longest[n]), self.keys[n]))
        else {
            return (0, Vec::new());
        };

        let mut chain = vec![end];
        let mut current = end;
        while let Some(&pred) = best_pred.get(&current) {
            chain.push(pred);
            current = pred;
        }
        chain.reverse();
        (
            longest[&end],
            chain.into_iter().map(|n| self.graph[n].clone()).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompilerError;
    use crate::task::Phase;

    fn task(id: &str, phase_ordinal: u32, seq: usize, deps: &[&str]) -> Task {
        let mut task = Task::builder(id)
            .description(format!("Task {}", id))
            .phase(Phase::new(phase_ordinal, format!("Phase {}", phase_ordinal)))
            .sequence(seq)
            .build();
        for dep in deps {
            task.add_dependency(TaskId::from(*dep)).unwrap();
        }
        task
    }

    fn ids(ids: &[&str]) -> Vec<TaskId> {
        ids.iter().map(|id| TaskId::from(*id)).collect()
    }

    #[test]
    fn test_execution_order_respects_edges() {
        let tasks = vec![
            task("A", 1, 0, &[]),
            task("B", 2, 1, &["A"]),
            task("C", 3, 2, &["B"]),
        ];
        let plan = TaskGraph::from_tasks(&tasks).plan().unwrap();
        assert_eq!(plan.order, ids(&["A", "B", "C"]));
    }

    #[test]
    fn test_tie_break_is_phase_then_sequence() {
        // Both roots: the lower phase ordinal goes first even though it was
        // parsed later.
        let tasks = vec![task("LATE", 2, 0, &[]), task("EARLY", 1, 1, &[])];
        let plan = TaskGraph::from_tasks(&tasks).plan().unwrap();
        assert_eq!(plan.order, ids(&["EARLY", "LATE"]));
    }

    #[test]
    fn test_cycle_reported_in_edge_order() {
        let tasks = vec![
            task("A", 1, 0, &["B"]),
            task("B", 1, 1, &["A"]),
        ];
        let err = TaskGraph::from_tasks(&tasks).plan().unwrap_err();
        match err {
            CompilerError::Cycle(CycleError { cycle }) => {
                assert_eq!(cycle, ids(&["A", "B", "A"]));
            }
            other => panic!("expected CycleError, got {}", other),
        }
    }

    #[test]
    fn test_three_node_cycle_named_in_full() {
        let tasks = vec![
            task("A", 1, 0, &["C"]),
            task("B", 1, 1, &["A"]),
            task("C", 1, 2, &["B"]),
        ];
        let err = TaskGraph::from_tasks(&tasks).plan().unwrap_err();
        match err {
            CompilerError::Cycle(CycleError { cycle }) => {
                assert_eq!(cycle.len(), 4);
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle[0], TaskId::from("A"));
            }
            other => panic!("expected CycleError, got {}", other),
        }
    }

    #[test]
    fn test_diamond_batches() {
        let tasks = vec![
            task("A", 1, 0, &[]),
            task("B", 2, 1, &["A"]),
            task("C", 2, 2, &["A"]),
            task("D", 3, 3, &["B", "C"]),
        ];
        let plan = TaskGraph::from_tasks(&tasks).plan().unwrap();
        assert_eq!(
            plan.batches,
            vec![ids(&["A"]), ids(&["B", "C"]), ids(&["D"])]
        );
    }

    #[test]
    fn test_no_batch_contains_dependent_pair() {
        let tasks = vec![
            task("A", 1, 0, &[]),
            task("B", 1, 1, &[]),
            task("C", 2, 2, &["A"]),
            task("D", 3, 3, &["C", "B"]),
        ];
        let plan = TaskGraph::from_tasks(&tasks).plan().unwrap();
        let by_id: HashMap<&TaskId, &Task> =
            tasks.iter().map(|t| (&t.id, t)).collect();
        for batch in &plan.batches {
            for a in batch {
                for b in batch {
                    assert!(!by_id[a].depends_on(b), "{} depends on {}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_critical_path_by_edge_count() {
        let tasks = vec![
            task("A", 1, 0, &[]),
            task("B", 2, 1, &["A"]),
            task("C", 3, 2, &["B"]),
            task("X", 1, 3, &[]),
            task("Y", 2, 4, &["X"]),
        ];
        let plan = TaskGraph::from_tasks(&tasks).plan().unwrap();
        assert_eq!(plan.critical_path_len, 2);
        assert_eq!(plan.critical_path, ids(&["A", "B", "C"]));
    }

    #[test]
    fn test_empty_graph_plans_empty() {
        let plan = TaskGraph::from_tasks(&[]).plan().unwrap();
        assert!(plan.order.is_empty());
        assert!(plan.batches.is_empty());
        assert_eq!(plan.critical_path_len, 0);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let tasks = vec![
            task("A", 1, 0, &[]),
            task("B", 1, 1, &[]),
            task("C", 2, 2, &["A", "B"]),
            task("D", 2, 3, &["A"]),
        ];
        let first = TaskGraph::from_tasks(&tasks).plan().unwrap();
        let second = TaskGraph::from_tasks(&tasks).plan().unwrap();
        assert_eq!(first, second);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Small random DAGs: each task may depend on any earlier task, so
        /// the graph is acyclic by construction.
        fn arb_dag() -> impl Strategy<Value = Vec<Task>> {
            proptest::collection::vec(proptest::collection::vec(any::<bool>(), 8), 1..8)
                .prop_map(|rows| {
                    rows.into_iter()
                        .enumerate()
                        .map(|(i, row)| {
                            let deps: Vec<String> = row
                                .into_iter()
                                .take(i)
                                .enumerate()
                                .filter(|(_, on)| *on)
                                .map(|(j, _)| format!("T{}", j))
                                .collect();
                            let dep_refs: Vec<&str> =
                                deps.iter().map(String::as_str).collect();
                            task(&format!("T{}", i), 1, i, &dep_refs)
                        })
                        .collect()
                })
        }

        /// Exhaustive longest-chain search for cross-checking.
        fn brute_force_longest(tasks: &[Task]) -> usize {
            fn chain(tasks: &[Task], idx: usize) -> usize {
                tasks[idx]
                    .dependencies
                    .iter()
                    .map(|dep| {
                        let i = tasks.iter().position(|t| &t.id == dep).unwrap();
                        chain(tasks, i) + 1
                    })
                    .max()
                    .unwrap_or(0)
            }
            (0..tasks.len()).map(|i| chain(tasks, i)).max().unwrap_or(0)
        }

        fn reachable(tasks: &[Task], from: &TaskId, to: &TaskId) -> bool {
            if from == to {
                return true;
            }
            let task = tasks.iter().find(|t| &t.id == to).unwrap();
            task.dependencies
                .iter()
                .any(|dep| reachable(tasks, from, dep))
        }

        proptest! {
            #[test]
            fn prop_topological_order(tasks in arb_dag()) {
                let plan = TaskGraph::from_tasks(&tasks).plan().unwrap();
                let position: HashMap<&TaskId, usize> =
                    plan.order.iter().enumerate().map(|(i, id)| (id, i)).collect();
                for task in &tasks {
                    for dep in &task.dependencies {
                        prop_assert!(position[dep] < position[&task.id]);
                    }
                }
            }

            #[test]
            fn prop_critical_path_matches_exhaustive_search(tasks in arb_dag()) {
                let plan = TaskGraph::from_tasks(&tasks).plan().unwrap();
                prop_assert_eq!(plan.critical_path_len, brute_force_longest(&tasks));
                // The reported chain really is a dependency chain.
                for pair in plan.critical_path.windows(2) {
                    let dependent = tasks.iter().find(|t| t.id == pair[1]).unwrap();
                    prop_assert!(dependent.depends_on(&pair[0]));
                }
            }

            #[test]
            fn prop_batch_members_are_mutually_unreachable(tasks in arb_dag()) {
                let plan = TaskGraph::from_tasks(&tasks).plan().unwrap();
                for batch in &plan.batches {
                    for a in batch {
                        for b in batch {
                            if a != b {
                                prop_assert!(!reachable(&tasks, a, b));
                            }
                        }
                    }
                }
            }
        }
    }
}
