//! Structured mismatch diagnostics.
//!
//! Divergence between the pre-rendered tree and the live construction
//! sequence is the normal case this system exists to handle, so it is never
//! surfaced as an error. Every mismatch produces one [`Diagnostic`] naming
//! the expected and found kinds and where the divergence occurred; the
//! collector also mirrors each entry to `tracing` at warn level.

use std::cell::RefCell;
use std::rc::Rc;

/// One structural mismatch observed during resolution or claiming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
	/// Id of the component whose map was being resolved.
	pub component: String,
	/// Structure-map index at which divergence occurred, when known.
	pub index: Option<usize>,
	/// Slash-separated path from the component root to the divergence point.
	pub path: String,
	/// The kind tag the map called for.
	pub expected: String,
	/// What was actually found at that position, if anything.
	pub found: Option<String>,
}

/// Shared collector for one reconciliation pass.
#[derive(Clone, Default)]
pub struct Diagnostics {
	entries: Rc<RefCell<Vec<Diagnostic>>>,
}

impl Diagnostics {
	/// Creates an empty collector.
	pub fn new() -> Self {
		Self::default()
	}

	/// Records one diagnostic and mirrors it to the log.
	pub fn emit(&self, diagnostic: Diagnostic) {
		tracing::warn!(
			component = %diagnostic.component,
			index = ?diagnostic.index,
			path = %diagnostic.path,
			expected = %diagnostic.expected,
			found = ?diagnostic.found,
			"hydration mismatch"
		);
		self.entries.borrow_mut().push(diagnostic);
	}

	/// The number of diagnostics collected so far.
	pub fn len(&self) -> usize {
		self.entries.borrow().len()
	}

	/// Whether no diagnostics were collected.
	pub fn is_empty(&self) -> bool {
		self.entries.borrow().is_empty()
	}

	/// Drains the collected diagnostics.
	pub fn take(&self) -> Vec<Diagnostic> {
		self.entries.borrow_mut().drain(..).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_emit_and_take() {
		let diagnostics = Diagnostics::new();
		assert!(diagnostics.is_empty());

		diagnostics.emit(Diagnostic {
			component: "c0".to_string(),
			index: Some(1),
			path: "div/h1".to_string(),
			expected: "h1".to_string(),
			found: Some("h2".to_string()),
		});
		assert_eq!(diagnostics.len(), 1);

		let drained = diagnostics.take();
		assert_eq!(drained.len(), 1);
		assert_eq!(drained[0].expected, "h1");
		assert!(diagnostics.is_empty());
	}

	#[test]
	fn test_clones_share_the_collector() {
		let diagnostics = Diagnostics::new();
		let alias = diagnostics.clone();
		alias.emit(Diagnostic {
			component: "c0".to_string(),
			index: None,
			path: String::new(),
			expected: "#text".to_string(),
			found: None,
		});
		assert_eq!(diagnostics.len(), 1);
	}
}
