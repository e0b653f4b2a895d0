use crate::task::{Task, TaskId};
use petgraph::Direction;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use std::collections::HashMap;

/// Predecessor graph of one project. Edges run predecessor -> successor;
/// links to tasks outside the set are dropped.
pub struct TaskGraph {
    pub graph: DiGraph<TaskId, ()>,
    pub id_to_index: HashMap<TaskId, NodeIndex>,
}

impl TaskGraph {
    pub fn build(tasks: &[Task]) -> Self {
        let mut graph: DiGraph<TaskId, ()> = DiGraph::with_capacity(tasks.len(), tasks.len());
        let mut id_to_index: HashMap<TaskId, NodeIndex> = HashMap::with_capacity(tasks.len());

        // Add nodes first
        for task in tasks {
            let node_ix = graph.add_node(task.id);
            id_to_index.insert(task.id, node_ix);
        }

        // Add edges: pred -> task
        for task in tasks {
            let Some(pred_id) = task.predecessor_id else {
                continue;
            };
            if let (Some(&u), Some(&v)) = (id_to_index.get(&pred_id), id_to_index.get(&task.id)) {
                graph.add_edge(u, v, ());
            }
        }

        Self { graph, id_to_index }
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.id_to_index.contains_key(&task_id)
    }

    /// Tasks that name `task_id` as their predecessor.
    pub fn direct_dependents(&self, task_id: TaskId) -> Vec<TaskId> {
        let Some(&node_ix) = self.id_to_index.get(&task_id) else {
            return Vec::new();
        };
        let mut ids: Vec<TaskId> = self
            .graph
            .neighbors_directed(node_ix, Direction::Outgoing)
            .map(|ix| self.graph[ix])
            .collect();
        ids.sort_unstable();
        ids
    }

    /// `root` followed by every transitive dependent, in breadth-first order.
    /// Each task appears once even if the links form a cycle.
    pub fn dependents_closure(&self, root: TaskId) -> Vec<TaskId> {
        let Some(&start) = self.id_to_index.get(&root) else {
            return Vec::new();
        };
        let mut bfs = Bfs::new(&self.graph, start);
        let mut order = Vec::new();
        while let Some(node_ix) = bfs.next(&self.graph) {
            order.push(self.graph[node_ix]);
        }
        order
    }

    pub fn has_cycle(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }
}
