//! Dependency-graph capture and validation.
//!
//! The graph records, for every cell one pass created, which cells it was
//! computed from. Roots (no parents) are the only cells whose values ship
//! in the payload; everything else is recomputed after restore. The graph
//! invariants are validated, not assumed: a parentless node must be a root
//! and vice versa, every parent id must exist, and cycles are forbidden.
//!
//! Policy (capture path): dangling parent edges are dropped with a warning
//! (they cannot break replay). A cycle fails the capture outright; a
//! payload built from a cyclic graph could not be restored correctly, and
//! shipping it silently would be worse than losing the pass.

use std::collections::{BTreeMap, BTreeSet};

use grappelli_reactive::{CellId, Registry};

/// One cell in the captured graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
	/// The cell's replay-stable id.
	pub id: CellId,
	/// Ids of the cells this cell reads.
	pub parents: Vec<CellId>,
}

/// Integrity violations of a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
	/// A node references a parent id that is not in the graph.
	#[error("cell {node} references unknown parent {parent}")]
	DanglingParent {
		/// The referencing node.
		node: CellId,
		/// The missing parent id.
		parent: CellId,
	},
	/// The graph contains a dependency cycle.
	#[error("dependency cycle through cell {through}")]
	Cycle {
		/// A cell on the cycle.
		through: CellId,
	},
	/// The root set disagrees with a node's parent list.
	#[error("cell {node} root flag disagrees with its parent list")]
	RootFlagMismatch {
		/// The inconsistent node.
		node: CellId,
	},
}

/// The captured (node id → parent ids) graph plus its root set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
	nodes: BTreeMap<CellId, GraphNode>,
	roots: BTreeSet<CellId>,
}

impl DependencyGraph {
	/// Captures the graph of every cell registered with `registry`.
	pub fn capture(registry: &Registry) -> Self {
		let mut nodes = BTreeMap::new();
		let mut roots = BTreeSet::new();
		for cell in registry.snapshot() {
			if cell.parents.is_empty() {
				roots.insert(cell.id);
			}
			nodes.insert(
				cell.id,
				GraphNode {
					id: cell.id,
					parents: cell.parents,
				},
			);
		}
		Self { nodes, roots }
	}

	/// Builds a graph from explicit nodes and roots (tests, tooling).
	pub fn from_parts(nodes: Vec<GraphNode>, roots: impl IntoIterator<Item = CellId>) -> Self {
		Self {
			nodes: nodes.into_iter().map(|node| (node.id, node)).collect(),
			roots: roots.into_iter().collect(),
		}
	}

	/// The number of nodes.
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	/// Whether the graph is empty.
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// The root id set.
	pub fn roots(&self) -> &BTreeSet<CellId> {
		&self.roots
	}

	/// A node by id.
	pub fn node(&self, id: CellId) -> Option<&GraphNode> {
		self.nodes.get(&id)
	}

	/// Drops edges whose parent id is not in the graph, warning per edge.
	///
	/// A node stripped of its last parent joins the root set, keeping the
	/// parentless ⇔ root invariant intact. Returns the number of edges
	/// dropped.
	pub fn drop_dangling_edges(&mut self) -> usize {
		let known: BTreeSet<CellId> = self.nodes.keys().copied().collect();
		let mut dropped = 0;
		for node in self.nodes.values_mut() {
			let node_id = node.id;
			node.parents.retain(|parent| {
				let keep = known.contains(parent);
				if !keep {
					tracing::warn!(node = %node_id, parent = %parent, "dropping dangling dependency edge");
					dropped += 1;
				}
				keep
			});
			if node.parents.is_empty() {
				self.roots.insert(node.id);
			}
		}
		dropped
	}

	/// Checks referential integrity: known parents, parentless ⇔ root,
	/// no cycles.
	pub fn validate(&self) -> Result<(), GraphError> {
		for node in self.nodes.values() {
			for parent in &node.parents {
				if !self.nodes.contains_key(parent) {
					return Err(GraphError::DanglingParent {
						node: node.id,
						parent: *parent,
					});
				}
			}
			let is_root = self.roots.contains(&node.id);
			if node.parents.is_empty() != is_root {
				return Err(GraphError::RootFlagMismatch { node: node.id });
			}
		}
		self.find_cycle()
	}

	fn find_cycle(&self) -> Result<(), GraphError> {
		#[derive(Clone, Copy, PartialEq)]
		enum Mark {
			Visiting,
			Done,
		}

		let mut marks: BTreeMap<CellId, Mark> = BTreeMap::new();
		for &start in self.nodes.keys() {
			if marks.contains_key(&start) {
				continue;
			}
			// Iterative DFS; a back edge to a Visiting node is a cycle.
			let mut stack = vec![(start, 0usize)];
			marks.insert(start, Mark::Visiting);
			while let Some((id, child)) = stack.pop() {
				let parents = self
					.nodes
					.get(&id)
					.map(|node| node.parents.as_slice())
					.unwrap_or_default();
				if child >= parents.len() {
					marks.insert(id, Mark::Done);
					continue;
				}
				stack.push((id, child + 1));
				let parent = parents[child];
				match marks.get(&parent) {
					Some(Mark::Visiting) => return Err(GraphError::Cycle { through: parent }),
					Some(Mark::Done) => {}
					None => {
						marks.insert(parent, Mark::Visiting);
						stack.push((parent, 0));
					}
				}
			}
		}
		Ok(())
	}
}
