//! Tree nodes and navigation.
//!
//! A [`NodeRef`] is a shared handle to one node. Equality is identity:
//! two handles compare equal when they point at the same node, which is
//! what claim/reuse bookkeeping needs.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// The kind of a rendered-output node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
	/// An element with a tag name.
	Element,
	/// A text node.
	Text,
	/// A comment / marker node.
	Comment,
}

/// Errors for structural tree mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
	/// The reference node passed to `insert_before` is not a child of the parent.
	#[error("reference node is not a child of the target parent")]
	NotAChild,
	/// The operation only applies to element nodes.
	#[error("operation requires an element node, found {0:?}")]
	NotAnElement(NodeKind),
}

enum NodeData {
	Element {
		tag: String,
		attrs: BTreeMap<String, String>,
		value: Option<String>,
		selection: Option<(u32, u32)>,
		focused: bool,
	},
	Text {
		text: String,
	},
	Comment {
		text: String,
	},
}

struct NodeInner {
	data: NodeData,
	parent: Weak<RefCell<NodeInner>>,
	children: Vec<NodeRef>,
}

/// A shared handle to a node in the rendered-output tree.
#[derive(Clone)]
pub struct NodeRef {
	inner: Rc<RefCell<NodeInner>>,
}

impl PartialEq for NodeRef {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for NodeRef {}

impl NodeRef {
	fn from_data(data: NodeData) -> Self {
		Self {
			inner: Rc::new(RefCell::new(NodeInner {
				data,
				parent: Weak::new(),
				children: Vec::new(),
			})),
		}
	}

	/// Creates a detached element node.
	pub fn element(tag: impl Into<String>) -> Self {
		Self::from_data(NodeData::Element {
			tag: tag.into(),
			attrs: BTreeMap::new(),
			value: None,
			selection: None,
			focused: false,
		})
	}

	/// Creates a detached text node.
	pub fn text(text: impl Into<String>) -> Self {
		Self::from_data(NodeData::Text { text: text.into() })
	}

	/// Creates a detached comment node.
	pub fn comment(text: impl Into<String>) -> Self {
		Self::from_data(NodeData::Comment { text: text.into() })
	}

	/// A stable identity token for this node, usable as a hash key.
	///
	/// Valid for as long as any handle to the node is alive.
	pub fn handle_id(&self) -> usize {
		Rc::as_ptr(&self.inner) as *const () as usize
	}

	/// The kind of this node.
	pub fn kind(&self) -> NodeKind {
		match self.inner.borrow().data {
			NodeData::Element { .. } => NodeKind::Element,
			NodeData::Text { .. } => NodeKind::Text,
			NodeData::Comment { .. } => NodeKind::Comment,
		}
	}

	/// The tag name, for element nodes.
	pub fn tag(&self) -> Option<String> {
		match &self.inner.borrow().data {
			NodeData::Element { tag, .. } => Some(tag.clone()),
			_ => None,
		}
	}

	/// The textual payload of a text or comment node.
	pub fn text_content(&self) -> Option<String> {
		match &self.inner.borrow().data {
			NodeData::Text { text } | NodeData::Comment { text } => Some(text.clone()),
			NodeData::Element { .. } => None,
		}
	}

	/// Replaces the textual payload of a text or comment node. No-op on elements.
	pub fn set_text_content(&self, new_text: impl Into<String>) {
		match &mut self.inner.borrow_mut().data {
			NodeData::Text { text } | NodeData::Comment { text } => *text = new_text.into(),
			NodeData::Element { .. } => {}
		}
	}

	/// Reads an attribute of an element node.
	pub fn get_attribute(&self, name: &str) -> Option<String> {
		match &self.inner.borrow().data {
			NodeData::Element { attrs, .. } => attrs.get(name).cloned(),
			_ => None,
		}
	}

	/// Sets an attribute on an element node.
	pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) -> Result<(), DomError> {
		match &mut self.inner.borrow_mut().data {
			NodeData::Element { attrs, .. } => {
				attrs.insert(name.into(), value.into());
				Ok(())
			}
			NodeData::Text { .. } => Err(DomError::NotAnElement(NodeKind::Text)),
			NodeData::Comment { .. } => Err(DomError::NotAnElement(NodeKind::Comment)),
		}
	}

	/// The parent node, if attached.
	pub fn parent(&self) -> Option<NodeRef> {
		self.inner.borrow().parent.upgrade().map(|inner| NodeRef { inner })
	}

	/// A snapshot of the direct children, in tree order.
	pub fn children(&self) -> Vec<NodeRef> {
		self.inner.borrow().children.clone()
	}

	/// The first direct child, if any.
	pub fn first_child(&self) -> Option<NodeRef> {
		self.inner.borrow().children.first().cloned()
	}

	/// The next sibling under the same parent, if any.
	pub fn next_sibling(&self) -> Option<NodeRef> {
		let parent = self.parent()?;
		let siblings = parent.inner.borrow();
		let pos = siblings.children.iter().position(|c| c == self)?;
		siblings.children.get(pos + 1).cloned()
	}

	/// Appends `child` as the last child of this node, detaching it first.
	pub fn append_child(&self, child: &NodeRef) {
		child.detach();
		child.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
		self.inner.borrow_mut().children.push(child.clone());
	}

	/// Inserts `child` before `reference` (or appends when `reference` is `None`).
	pub fn insert_before(&self, child: &NodeRef, reference: Option<&NodeRef>) -> Result<(), DomError> {
		let Some(reference) = reference else {
			self.append_child(child);
			return Ok(());
		};
		child.detach();
		let mut inner = self.inner.borrow_mut();
		let pos = inner
			.children
			.iter()
			.position(|c| c == reference)
			.ok_or(DomError::NotAChild)?;
		child.inner.borrow_mut().parent = Rc::downgrade(&self.inner);
		inner.children.insert(pos, child.clone());
		Ok(())
	}

	/// Detaches this node from its parent. No-op when already detached.
	pub fn detach(&self) {
		let Some(parent) = self.parent() else {
			return;
		};
		parent.inner.borrow_mut().children.retain(|c| c != self);
		self.inner.borrow_mut().parent = Weak::new();
	}

	/// Whether this element holds user-mutable transient state.
	///
	/// Only form controls carry a current value / selection / focus that is
	/// worth preserving across a subtree reconstruction.
	pub fn is_form_control(&self) -> bool {
		matches!(
			self.tag().as_deref(),
			Some("input") | Some("textarea") | Some("select")
		)
	}

	/// The current (user-visible) value of a form control.
	pub fn value(&self) -> Option<String> {
		match &self.inner.borrow().data {
			NodeData::Element { value, .. } => value.clone(),
			_ => None,
		}
	}

	/// Sets the current value of a form control.
	pub fn set_value(&self, new_value: impl Into<String>) {
		if let NodeData::Element { value, .. } = &mut self.inner.borrow_mut().data {
			*value = Some(new_value.into());
		}
	}

	/// The current selection range of a form control.
	pub fn selection(&self) -> Option<(u32, u32)> {
		match &self.inner.borrow().data {
			NodeData::Element { selection, .. } => *selection,
			_ => None,
		}
	}

	/// Sets the selection range of a form control.
	pub fn set_selection(&self, start: u32, end: u32) {
		if let NodeData::Element { selection, .. } = &mut self.inner.borrow_mut().data {
			*selection = Some((start, end));
		}
	}

	/// Whether this node currently holds focus.
	pub fn focused(&self) -> bool {
		match &self.inner.borrow().data {
			NodeData::Element { focused, .. } => *focused,
			_ => false,
		}
	}

	/// Sets or clears focus on this node.
	pub fn set_focused(&self, is_focused: bool) {
		if let NodeData::Element { focused, .. } = &mut self.inner.borrow_mut().data {
			*focused = is_focused;
		}
	}

	/// A short human-readable description of the node, used in diagnostics.
	pub fn describe(&self) -> String {
		match &self.inner.borrow().data {
			NodeData::Element { tag, .. } => tag.clone(),
			NodeData::Text { .. } => "#text".to_string(),
			NodeData::Comment { .. } => "#comment".to_string(),
		}
	}
}

impl fmt::Debug for NodeRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.inner.borrow().data {
			NodeData::Element { tag, attrs, .. } => {
				write!(f, "<{}", tag)?;
				for (k, v) in attrs {
					write!(f, " {}={:?}", k, v)?;
				}
				write!(f, ">[{} children]", self.inner.borrow().children.len())
			}
			NodeData::Text { text } => write!(f, "#text({:?})", text),
			NodeData::Comment { text } => write!(f, "#comment({:?})", text),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_element_kind_and_tag() {
		let div = NodeRef::element("div");
		assert_eq!(div.kind(), NodeKind::Element);
		assert_eq!(div.tag(), Some("div".to_string()));
		assert_eq!(div.text_content(), None);
	}

	#[test]
	fn test_text_and_comment_payload() {
		let text = NodeRef::text("hello");
		assert_eq!(text.kind(), NodeKind::Text);
		assert_eq!(text.text_content(), Some("hello".to_string()));

		let comment = NodeRef::comment("marker");
		assert_eq!(comment.kind(), NodeKind::Comment);
		comment.set_text_content("other");
		assert_eq!(comment.text_content(), Some("other".to_string()));
	}

	#[test]
	fn test_append_and_navigation() {
		let parent = NodeRef::element("div");
		let a = NodeRef::element("h1");
		let b = NodeRef::text("x");
		parent.append_child(&a);
		parent.append_child(&b);

		assert_eq!(parent.children().len(), 2);
		assert_eq!(a.parent(), Some(parent.clone()));
		assert_eq!(a.next_sibling(), Some(b.clone()));
		assert_eq!(b.next_sibling(), None);
		assert_eq!(parent.first_child(), Some(a));
	}

	#[test]
	fn test_insert_before_and_detach() {
		let parent = NodeRef::element("ul");
		let first = NodeRef::element("li");
		let second = NodeRef::element("li");
		parent.append_child(&second);
		parent.insert_before(&first, Some(&second)).unwrap();

		assert_eq!(parent.children(), vec![first.clone(), second.clone()]);

		second.detach();
		assert_eq!(parent.children(), vec![first.clone()]);
		assert_eq!(second.parent(), None);

		// Reference no longer a child.
		let err = parent.insert_before(&NodeRef::text("y"), Some(&second));
		assert_eq!(err, Err(DomError::NotAChild));
	}

	#[test]
	fn test_reparenting_detaches_from_old_parent() {
		let old_parent = NodeRef::element("div");
		let new_parent = NodeRef::element("section");
		let child = NodeRef::text("moved");
		old_parent.append_child(&child);
		new_parent.append_child(&child);

		assert!(old_parent.children().is_empty());
		assert_eq!(child.parent(), Some(new_parent));
	}

	#[test]
	fn test_attributes_require_element() {
		let div = NodeRef::element("div");
		div.set_attribute("id", "app").unwrap();
		assert_eq!(div.get_attribute("id"), Some("app".to_string()));

		let text = NodeRef::text("x");
		assert_eq!(
			text.set_attribute("id", "app"),
			Err(DomError::NotAnElement(NodeKind::Text))
		);
	}

	#[test]
	fn test_transient_state_on_form_controls() {
		let input = NodeRef::element("input");
		assert!(input.is_form_control());
		input.set_value("typed");
		input.set_selection(2, 5);
		input.set_focused(true);

		assert_eq!(input.value(), Some("typed".to_string()));
		assert_eq!(input.selection(), Some((2, 5)));
		assert!(input.focused());

		let div = NodeRef::element("div");
		assert!(!div.is_form_control());
	}

	#[test]
	fn test_identity_equality() {
		let a = NodeRef::element("div");
		let b = NodeRef::element("div");
		assert_ne!(a, b);
		let a2 = a.clone();
		assert_eq!(a, a2);
	}
}
