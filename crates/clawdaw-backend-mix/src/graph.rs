//! Signal dependency graph and its topological schedule.
//!
//! Nodes are tracks, busses and the master. An edge `a -> b` means `b`
//! consumes the output of `a`, so `a` must be scheduled first.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::MixError;

/// A schedulable scope. Variant order is the tie-break order of the
/// schedule: tracks before busses before master.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Node {
    Track(usize),
    Bus(String),
    Master,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Track(i) => write!(f, "track:{}", i),
            Node::Bus(name) => write!(f, "bus:{}", name),
            Node::Master => f.write_str("master"),
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Why an edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Track into its bus.
    Member,
    /// Bus into its output bus or master.
    Route,
    /// Track send into a return bus.
    Send,
    /// Sidechain key source into the ducked track.
    Sidechain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: Node,
    pub to: Node,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<Node>,
    adjacency: BTreeMap<Node, BTreeSet<Node>>,
    edges: Vec<Edge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node);
    }

    /// Adds an edge, registering both endpoints. Repeated edges between
    /// the same pair are stored once.
    pub fn add_edge(&mut self, from: Node, to: Node, kind: EdgeKind) {
        self.nodes.insert(from.clone());
        self.nodes.insert(to.clone());
        if self
            .adjacency
            .entry(from.clone())
            .or_default()
            .insert(to.clone())
        {
            self.edges.push(Edge { from, to, kind });
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    fn successors(&self, node: &Node) -> impl Iterator<Item = &Node> {
        self.adjacency.get(node).into_iter().flatten()
    }

    /// Kahn's algorithm with an ordered ready set, so the schedule is
    /// deterministic. A cycle is reported as one edge lying on it.
    pub fn topological_order(&self) -> Result<Vec<Node>, MixError> {
        let mut indegree: BTreeMap<&Node, usize> = self.nodes.iter().map(|n| (n, 0)).collect();
        for targets in self.adjacency.values() {
            for to in targets {
                if let Some(d) = indegree.get_mut(to) {
                    *d += 1;
                }
            }
        }

        let mut ready: BTreeSet<&Node> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_first() {
            order.push(node.clone());
            for next in self.successors(node) {
                if let Some(d) = indegree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(next);
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            return Ok(order);
        }

        let scheduled: BTreeSet<&Node> = order.iter().collect();
        let residual: BTreeSet<&Node> = self
            .nodes
            .iter()
            .filter(|n| !scheduled.contains(n))
            .collect();
        match self.find_back_edge(&residual) {
            Some((from, to)) => Err(MixError::Cycle { from, to }),
            // Unreachable for a finite graph: every unscheduled node keeps an
            // unscheduled predecessor, so the residue always holds a cycle.
            None => Err(MixError::Cycle {
                from: Node::Master,
                to: Node::Master,
            }),
        }
    }

    /// Depth-first search over the unscheduled residue; the first edge
    /// into a node still on the stack closes a cycle.
    fn find_back_edge(&self, residual: &BTreeSet<&Node>) -> Option<(Node, Node)> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }

        fn visit<'a>(
            graph: &'a DependencyGraph,
            node: &'a Node,
            residual: &BTreeSet<&Node>,
            marks: &mut BTreeMap<&'a Node, Mark>,
        ) -> Option<(Node, Node)> {
            marks.insert(node, Mark::Active);
            for next in graph.successors(node) {
                if !residual.contains(next) {
                    continue;
                }
                match marks.get(next) {
                    Some(Mark::Active) => return Some((node.clone(), next.clone())),
                    Some(Mark::Done) => {}
                    None => {
                        if let Some(edge) = visit(graph, next, residual, marks) {
                            return Some(edge);
                        }
                    }
                }
            }
            marks.insert(node, Mark::Done);
            None
        }

        let mut marks = BTreeMap::new();
        for start in residual {
            if marks.contains_key(*start) {
                continue;
            }
            if let Some(edge) = visit(self, start, residual, &mut marks) {
                return Some(edge);
            }
        }
        None
    }
}
