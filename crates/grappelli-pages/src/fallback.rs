//! Transient-state preservation across subtree reconstruction.
//!
//! A reconciliation failure replaces a stale physical subtree with a
//! freshly constructed one. What must not be lost in that swap is state the
//! *user* put there: typed input, a selection, focus. Before the stale
//! subtree is discarded it is walked depth-first, recording that state per
//! relative path; after the fresh subtree is in place the same paths are
//! looked up again and whatever still exists gets the state back.

use std::collections::BTreeMap;

use grappelli_dom::NodeRef;

/// User-mutable state of one form control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldState {
	/// The control's current value.
	pub value: Option<String>,
	/// The selection range within the value.
	pub selection: Option<(u32, u32)>,
	/// Whether the control held focus.
	pub focused: bool,
}

/// Transient state captured from a stale subtree, keyed by relative path.
///
/// Paths are child-index chains from the subtree root: the root itself is
/// `""`, its first child `"0"`, that child's third child `"0/2"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransientState {
	entries: BTreeMap<String, FieldState>,
}

impl TransientState {
	/// Whether anything worth restoring was captured.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// The number of controls captured.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// The captured state at a relative path, if any.
	pub fn get(&self, path: &str) -> Option<&FieldState> {
		self.entries.get(path)
	}
}

/// Walks `root` depth-first, capturing user-mutable state.
pub fn capture(root: &NodeRef) -> TransientState {
	let mut state = TransientState::default();
	capture_into(root, String::new(), &mut state);
	state
}

fn capture_into(node: &NodeRef, path: String, state: &mut TransientState) {
	if node.is_form_control() {
		let field = FieldState {
			value: node.value(),
			selection: node.selection(),
			focused: node.focused(),
		};
		if field.value.is_some() || field.selection.is_some() || field.focused {
			state.entries.insert(path.clone(), field);
		}
	}
	for (index, child) in node.children().iter().enumerate() {
		let child_path = if path.is_empty() {
			index.to_string()
		} else {
			format!("{}/{}", path, index)
		};
		capture_into(child, child_path, state);
	}
}

/// Reapplies captured state onto `root` wherever the paths still exist.
///
/// Paths that no longer lead to a form control are silently dropped; the
/// fresh subtree owns its shape.
pub fn restore(root: &NodeRef, state: &TransientState) {
	for (path, field) in &state.entries {
		let Some(node) = lookup(root, path) else {
			continue;
		};
		if !node.is_form_control() {
			continue;
		}
		if let Some(value) = &field.value {
			node.set_value(value.clone());
		}
		if let Some((start, end)) = field.selection {
			node.set_selection(start, end);
		}
		if field.focused {
			node.set_focused(true);
		}
	}
}

fn lookup(root: &NodeRef, path: &str) -> Option<NodeRef> {
	if path.is_empty() {
		return Some(root.clone());
	}
	let mut node = root.clone();
	for segment in path.split('/') {
		let index: usize = segment.parse().ok()?;
		node = node.children().get(index)?.clone();
	}
	Some(node)
}
