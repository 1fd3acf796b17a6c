//! Map-driven node resolution.
//!
//! Given a structure map and the physical roots handed to a component, this
//! reconstructs the index → node correspondence up front: map roots are
//! assigned 1:1 to physical roots in order, then each resolved parent's
//! expected children are matched against its physical children with a
//! strictly left-to-right, first-match-wins scan. A failed search consumes
//! nothing; a successful match is consumed and never revisited.
//!
//! Failure is local: an index that cannot be matched is left unresolved
//! (one diagnostic, fallback construction for that subtree only), and its
//! descendants are simply never visited.

use grappelli_dom::NodeRef;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::structure::{KindTag, StructureMap};

/// The index → node correspondence for one component.
#[derive(Debug, Default)]
pub struct Resolution {
	nodes: Vec<Option<NodeRef>>,
	/// For an unresolved index: the stale physical node its fresh
	/// replacement should substitute, when one could be paired.
	anchors: Vec<Option<NodeRef>>,
}

impl Resolution {
	fn with_len(len: usize) -> Self {
		Self {
			nodes: vec![None; len],
			anchors: vec![None; len],
		}
	}

	/// The physical node resolved for a map index, if any.
	pub fn node(&self, index: usize) -> Option<NodeRef> {
		self.nodes.get(index).cloned().flatten()
	}

	/// The stale node paired with an unresolved index, if any.
	pub fn anchor(&self, index: usize) -> Option<NodeRef> {
		self.anchors.get(index).cloned().flatten()
	}

	/// How many indices resolved to a physical node.
	pub fn resolved_count(&self) -> usize {
		self.nodes.iter().filter(|slot| slot.is_some()).count()
	}
}

/// Resolves `map` against the physical roots handed to `component`.
pub fn resolve(
	map: &StructureMap,
	physical_roots: &[NodeRef],
	component: &str,
	diagnostics: &Diagnostics,
) -> Resolution {
	let mut resolution = Resolution::with_len(map.len());
	let map_roots = map.roots();

	for (slot, &root_index) in map_roots.iter().enumerate() {
		let Some(entry) = map.get(root_index) else {
			continue;
		};
		match physical_roots.get(slot) {
			Some(node) if entry.tag.matches(node) => {
				resolution.nodes[root_index] = Some(node.clone());
				resolve_children(map, &mut resolution, root_index, &entry.tag.as_wire(), component, diagnostics);
			}
			found => {
				diagnostics.emit(Diagnostic {
					component: component.to_string(),
					index: Some(root_index),
					path: entry.tag.as_wire(),
					expected: entry.tag.as_wire(),
					found: found.map(|node| node.describe()),
				});
				resolution.anchors[root_index] = found.cloned();
			}
		}
	}

	resolution
}

fn resolve_children(
	map: &StructureMap,
	resolution: &mut Resolution,
	parent_index: usize,
	parent_path: &str,
	component: &str,
	diagnostics: &Diagnostics,
) {
	let Some(parent_entry) = map.get(parent_index) else {
		return;
	};
	// Nested-component boundaries are opaque here; the child component
	// resolves its own map.
	if matches!(parent_entry.tag, KindTag::Component(_)) || parent_entry.children.is_empty() {
		return;
	}
	let Some(parent_node) = resolution.node(parent_index) else {
		return;
	};

	let physical = parent_node.children();
	let mut claimed = vec![false; physical.len()];
	let mut cursor = 0usize;
	// Outcome per expected child: claimed physical position, or the scan
	// start to pair an anchor against later.
	let mut outcomes: Vec<Result<usize, usize>> = Vec::with_capacity(parent_entry.children.len());

	for &child_index in &parent_entry.children {
		let Some(child_entry) = map.get(child_index) else {
			outcomes.push(Err(cursor));
			continue;
		};
		let mut probe = cursor;
		let mut found = None;
		while probe < physical.len() {
			if child_entry.tag.matches(&physical[probe]) {
				found = Some(probe);
				break;
			}
			probe += 1;
		}
		match found {
			Some(position) => {
				claimed[position] = true;
				resolution.nodes[child_index] = Some(physical[position].clone());
				cursor = position + 1;
				outcomes.push(Ok(position));
			}
			None => {
				// A failed search consumes nothing; later siblings rescan
				// from the same position.
				diagnostics.emit(Diagnostic {
					component: component.to_string(),
					index: Some(child_index),
					path: format!("{}/{}", parent_path, child_entry.tag.as_wire()),
					expected: child_entry.tag.as_wire(),
					found: physical.get(cursor).map(|node| node.describe()),
				});
				outcomes.push(Err(cursor));
			}
		}
	}

	// Pair each failure with the stale node it displaced: the first
	// unclaimed physical child at or after its scan start, but not past the
	// next sibling that did resolve.
	for (slot, outcome) in outcomes.iter().enumerate() {
		let Err(scan_start) = *outcome else {
			continue;
		};
		let bound = outcomes[slot + 1..]
			.iter()
			.find_map(|later| later.ok())
			.unwrap_or(physical.len());
		let anchor = (scan_start..bound).find(|&i| !claimed[i]);
		if let Some(position) = anchor {
			claimed[position] = true;
			let child_index = parent_entry.children[slot];
			resolution.anchors[child_index] = Some(physical[position].clone());
		}
	}

	// Descend only under resolved children.
	for &child_index in &parent_entry.children {
		if resolution.node(child_index).is_some() {
			let path = match map.get(child_index) {
				Some(entry) => format!("{}/{}", parent_path, entry.tag.as_wire()),
				None => parent_path.to_string(),
			};
			resolve_children(map, resolution, child_index, &path, component, diagnostics);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use grappelli_dom::NodeRef;

	/// `div > [h1("X"), p("Y")]`, encoded in creation order
	/// `[#text, h1, #text, p, div]`.
	fn sample_map() -> StructureMap {
		serde_json::from_str(r##"[["#text"],["h1",0],["#text"],["p",2],["div",1,3]]"##).unwrap()
	}

	fn physical_tree(h1_tag: &str) -> NodeRef {
		let div = NodeRef::element("div");
		let h1 = NodeRef::element(h1_tag);
		h1.append_child(&NodeRef::text("X"));
		let p = NodeRef::element("p");
		p.append_child(&NodeRef::text("Y"));
		div.append_child(&h1);
		div.append_child(&p);
		div
	}

	#[test]
	fn test_exact_match_resolves_every_index() {
		let diagnostics = Diagnostics::new();
		let div = physical_tree("h1");
		let resolution = resolve(&sample_map(), &[div.clone()], "c0", &diagnostics);

		assert_eq!(resolution.resolved_count(), 5);
		assert!(diagnostics.is_empty());
		assert_eq!(resolution.node(4), Some(div.clone()));
		assert_eq!(resolution.node(1), Some(div.children()[0].clone()));
		assert_eq!(resolution.node(3), Some(div.children()[1].clone()));
		assert_eq!(resolution.node(0), Some(div.children()[0].children()[0].clone()));
	}

	#[test]
	fn test_tag_mismatch_degrades_one_subtree() {
		let diagnostics = Diagnostics::new();
		let div = physical_tree("h2");
		let resolution = resolve(&sample_map(), &[div.clone()], "c0", &diagnostics);

		// The div and the p (and its text) still resolve.
		assert_eq!(resolution.node(4), Some(div.clone()));
		assert_eq!(resolution.node(3), Some(div.children()[1].clone()));
		assert_eq!(resolution.node(2).is_some(), true);
		// The h1 does not, and neither does its text child.
		assert_eq!(resolution.node(1), None);
		assert_eq!(resolution.node(0), None);
		// The stale h2 is paired as the anchor for the fresh h1.
		assert_eq!(resolution.anchor(1), Some(div.children()[0].clone()));

		let drained = diagnostics.take();
		assert_eq!(drained.len(), 1);
		assert_eq!(drained[0].expected, "h1");
		assert_eq!(drained[0].found, Some("h2".to_string()));
		assert_eq!(drained[0].path, "div/h1");
	}

	#[test]
	fn test_root_kind_mismatch() {
		let diagnostics = Diagnostics::new();
		let section = NodeRef::element("section");
		let resolution = resolve(&sample_map(), &[section.clone()], "c0", &diagnostics);

		assert_eq!(resolution.resolved_count(), 0);
		assert_eq!(resolution.anchor(4), Some(section));
		assert_eq!(diagnostics.len(), 1);
	}

	#[test]
	fn test_missing_physical_root() {
		let diagnostics = Diagnostics::new();
		let resolution = resolve(&sample_map(), &[], "c0", &diagnostics);
		assert_eq!(resolution.resolved_count(), 0);
		assert_eq!(resolution.anchor(4), None);
		assert_eq!(diagnostics.len(), 1);
	}

	#[test]
	fn test_failed_search_consumes_nothing() {
		// Expected children [em, strong] against physical [strong]: the em
		// fails, but the strong must still be found from the same position.
		let map: StructureMap =
			serde_json::from_str(r#"[["em"],["strong"],["div",0,1]]"#).unwrap();
		let div = NodeRef::element("div");
		let strong = NodeRef::element("strong");
		div.append_child(&strong);

		let diagnostics = Diagnostics::new();
		let resolution = resolve(&map, &[div], "c0", &diagnostics);

		assert_eq!(resolution.node(1), Some(strong.clone()));
		assert_eq!(resolution.node(0), None);
		// The strong resolved, so it cannot be stolen as the em's anchor.
		assert_eq!(resolution.anchor(0), None);
		assert_eq!(diagnostics.len(), 1);
	}

	#[test]
	fn test_foreign_children_are_skipped() {
		let map: StructureMap = serde_json::from_str(r#"[["span"],["div",0]]"#).unwrap();
		let div = NodeRef::element("div");
		// A node this pass did not produce sits ahead of the expected span.
		div.append_child(&NodeRef::element("script"));
		let span = NodeRef::element("span");
		div.append_child(&span);

		let diagnostics = Diagnostics::new();
		let resolution = resolve(&map, &[div], "c0", &diagnostics);
		assert_eq!(resolution.node(0), Some(span));
		assert!(diagnostics.is_empty());
	}

	#[test]
	fn test_component_boundaries_are_not_descended() {
		let map: StructureMap =
			serde_json::from_str(r##"[["#component:c1"],["div",0]]"##).unwrap();
		let div = NodeRef::element("div");
		let nested = NodeRef::element("section");
		crate::markers::tag_boundary(&nested, "c1");
		// The nested component's internals belong to c1's own map.
		nested.append_child(&NodeRef::text("inside"));
		div.append_child(&nested);

		let diagnostics = Diagnostics::new();
		let resolution = resolve(&map, &[div], "c0", &diagnostics);
		assert_eq!(resolution.node(0), Some(nested));
		assert!(diagnostics.is_empty());
	}
}
