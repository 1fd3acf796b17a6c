//! Cursor-driven resolution (no structure map).
//!
//! When a component has no structure map to resolve against, hydration
//! falls back to a sequential claim cursor: one position per re-entered
//! parent scope, advanced only by successful claims. A claim compares the
//! node at the cursor against what the live pass is constructing (kind,
//! and for text/comments the textual payload), and on the first mismatch
//! the branch is failed: the remaining siblings are removed so no
//! ambiguous partial state survives, and every later claim in that scope
//! reports no-match so the caller constructs fresh nodes.
//!
//! The cursor is an owned object threaded through scopes explicitly;
//! frames are pushed on entry and popped on exit, stack-style.

use grappelli_dom::{NodeKind, NodeRef};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::markers;

/// Result of claiming one construction step against the pre-rendered tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
	/// The pre-rendered node matched and was consumed.
	Reused(NodeRef),
	/// No match; the caller constructs a fresh node, substituting `anchor`
	/// (the stale node at the divergence point) when one exists.
	Fresh {
		/// The stale node the fresh construction replaces, if any.
		anchor: Option<NodeRef>,
	},
}

struct Frame {
	nodes: Vec<NodeRef>,
	position: usize,
	failed: bool,
	path: String,
}

/// Sequential claim cursor over a pre-rendered subtree.
pub struct HydrationCursor {
	frames: Vec<Frame>,
	component: String,
	diagnostics: Diagnostics,
}

impl HydrationCursor {
	/// Creates a cursor positioned at a component's physical roots.
	pub fn new(roots: Vec<NodeRef>, component: &str, diagnostics: Diagnostics) -> Self {
		Self {
			frames: vec![Frame {
				nodes: roots,
				position: 0,
				failed: false,
				path: String::new(),
			}],
			component: component.to_string(),
			diagnostics,
		}
	}

	/// Pushes a frame over `parent`'s children.
	pub fn enter(&mut self, parent: &NodeRef) {
		let path = match self.frames.last() {
			Some(frame) if frame.path.is_empty() => parent.describe(),
			Some(frame) => format!("{}/{}", frame.path, parent.describe()),
			None => parent.describe(),
		};
		self.frames.push(Frame {
			nodes: parent.children(),
			position: 0,
			failed: false,
			path,
		});
	}

	/// Pops the current frame.
	pub fn exit(&mut self) {
		self.frames.pop();
	}

	/// Claims an element by tag.
	pub fn claim_element(&mut self, tag: &str) -> Claim {
		self.claim(tag, |node| {
			node.kind() == NodeKind::Element && node.tag().as_deref() == Some(tag)
		})
	}

	/// Claims a text node by payload.
	pub fn claim_text(&mut self, value: &str) -> Claim {
		self.claim("#text", |node| {
			node.kind() == NodeKind::Text && node.text_content().as_deref() == Some(value)
		})
	}

	/// Claims a comment node by payload.
	pub fn claim_comment(&mut self, value: &str) -> Claim {
		self.claim("#comment", |node| {
			node.kind() == NodeKind::Comment && node.text_content().as_deref() == Some(value)
		})
	}

	/// Claims a component boundary by id.
	pub fn claim_component(&mut self, component_id: &str) -> Claim {
		self.claim(&format!("#component:{}", component_id), |node| {
			markers::boundary_id(node).as_deref() == Some(component_id)
		})
	}

	/// Advances past `count` nodes without claiming them.
	///
	/// Used by the scope after a marker-boundary component: the component's
	/// root siblings were claimed by the child and must not be offered to
	/// the parent's subsequent claims.
	pub fn skip(&mut self, count: usize) {
		if let Some(frame) = self.frames.last_mut() {
			frame.position = (frame.position + count).min(frame.nodes.len());
		}
	}

	/// Peeks at the node a component boundary claim would consume.
	pub fn peek_component(&self, component_id: &str) -> Option<NodeRef> {
		let frame = self.frames.last()?;
		if frame.failed {
			return None;
		}
		frame
			.nodes
			.get(frame.position)
			.filter(|node| markers::boundary_id(node).as_deref() == Some(component_id))
			.cloned()
	}

	fn claim(&mut self, expected: &str, matches: impl Fn(&NodeRef) -> bool) -> Claim {
		let Some(frame) = self.frames.last_mut() else {
			return Claim::Fresh { anchor: None };
		};
		if frame.failed {
			return Claim::Fresh { anchor: None };
		}
		match frame.nodes.get(frame.position) {
			Some(node) if matches(node) => {
				let node = node.clone();
				frame.position += 1;
				Claim::Reused(node)
			}
			Some(node) => {
				// Divergence: fail the branch and clear everything after
				// the divergence point; the node at the point itself is
				// handed back as the substitution anchor.
				frame.failed = true;
				let anchor = node.clone();
				let path = frame.path.clone();
				for stale in &frame.nodes[frame.position + 1..] {
					stale.detach();
				}
				self.diagnostics.emit(Diagnostic {
					component: self.component.clone(),
					index: None,
					path,
					expected: expected.to_string(),
					found: Some(anchor.describe()),
				});
				Claim::Fresh {
					anchor: Some(anchor),
				}
			}
			None => Claim::Fresh { anchor: None },
		}
	}
}
