use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use taskdeps_errors::{DependencyError, DependencyResult};
use tracing::debug;

use crate::entities::TaskDependency;
use crate::value_objects::{ChainDirection, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub dependency_id: i64,
    pub predecessor: TaskId,
    pub successor: TaskId,
}

/// Adjacency-list view of the active dependency edges, keyed by task id.
///
/// Edges are directed predecessor -> successor. Built fresh from storage for
/// each check, so it never outlives the transaction that read it.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    successors: BTreeMap<TaskId, Vec<Edge>>,
    predecessors: BTreeMap<TaskId, Vec<Edge>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from active dependencies only.
    pub fn from_dependencies<'a, I>(dependencies: I) -> Self
    where
        I: IntoIterator<Item = &'a TaskDependency>,
    {
        let mut graph = Self::new();
        for dependency in dependencies.into_iter().filter(|d| d.is_active) {
            graph.add_edge(
                dependency.id,
                dependency.predecessor_task_id,
                dependency.successor_task_id,
            );
        }
        graph
    }

    pub fn add_edge(&mut self, dependency_id: i64, predecessor: TaskId, successor: TaskId) {
        let edge = Edge {
            dependency_id,
            predecessor,
            successor,
        };
        self.successors.entry(predecessor).or_default().push(edge);
        self.predecessors.entry(successor).or_default().push(edge);
    }

    pub fn add_node(&mut self, task_id: TaskId) {
        self.successors.entry(task_id).or_default();
    }

    pub fn successors_of(&self, task_id: TaskId) -> &[Edge] {
        self.successors.get(&task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors_of(&self, task_id: TaskId) -> &[Edge] {
        self.predecessors.get(&task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.successors.values().map(Vec::len).sum()
    }

    /// Iterative DFS along successor edges.
    pub fn has_path(&self, from: TaskId, to: TaskId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(
                self.successors_of(current)
                    .iter()
                    .map(|edge| edge.successor)
                    .filter(|next| !visited.contains(next)),
            );
        }

        false
    }

    /// Adding `predecessor -> successor` closes a cycle iff the successor
    /// already reaches the predecessor.
    pub fn would_create_cycle(&self, predecessor: TaskId, successor: TaskId) -> bool {
        if predecessor == successor {
            return true; // 自引用
        }
        let cyclic = self.has_path(successor, predecessor);
        if cyclic {
            debug!(predecessor, successor, "dependency would close a cycle");
        }
        cyclic
    }

    pub fn ensure_acyclic_insert(&self, predecessor: TaskId, successor: TaskId) -> DependencyResult<()> {
        if self.would_create_cycle(predecessor, successor) {
            return Err(DependencyError::cyclic(predecessor, successor));
        }
        Ok(())
    }

    /// Dependency ids reachable from `task_id`, in DFS pre-order, each once.
    pub fn chain(&self, task_id: TaskId, direction: ChainDirection) -> Vec<i64> {
        let mut visited_tasks = HashSet::new();
        let mut seen_edges = HashSet::new();
        let mut chain = Vec::new();
        let mut stack = vec![task_id];

        while let Some(current) = stack.pop() {
            if !visited_tasks.insert(current) {
                continue;
            }
            let edges = match direction {
                ChainDirection::Forward => self.successors_of(current),
                ChainDirection::Backward => self.predecessors_of(current),
            };
            // reversed so that the first edge is explored first
            for edge in edges.iter().rev() {
                let next = match direction {
                    ChainDirection::Forward => edge.successor,
                    ChainDirection::Backward => edge.predecessor,
                };
                stack.push(next);
            }
            for edge in edges {
                if seen_edges.insert(edge.dependency_id) {
                    chain.push(edge.dependency_id);
                }
            }
        }

        chain
    }

    /// Kahn's algorithm. Ties are broken by task id so the order is stable.
    pub fn topological_order(&self) -> DependencyResult<Vec<TaskId>> {
        let mut in_degree: HashMap<TaskId, usize> = HashMap::new();
        for (&task, edges) in &self.successors {
            in_degree.entry(task).or_insert(0);
            for edge in edges {
                *in_degree.entry(edge.successor).or_insert(0) += 1;
            }
        }

        let mut roots: Vec<TaskId> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&task, _)| task)
            .collect();
        roots.sort_unstable();
        let mut queue: VecDeque<TaskId> = roots.into();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(current) = queue.pop_front() {
            order.push(current);
            let mut released = Vec::new();
            for edge in self.successors_of(current) {
                if let Some(degree) = in_degree.get_mut(&edge.successor) {
                    *degree -= 1;
                    if *degree == 0 {
                        released.push(edge.successor);
                    }
                }
            }
            released.sort_unstable();
            queue.extend(released);
        }

        if order.len() != in_degree.len() {
            let stuck = in_degree
                .iter()
                .filter(|(_, &degree)| degree > 0)
                .map(|(&task, _)| task)
                .min()
                .unwrap_or_default();
            return Err(DependencyError::cyclic(stuck, stuck));
        }

        Ok(order)
    }
}
