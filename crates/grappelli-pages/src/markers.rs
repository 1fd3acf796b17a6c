//! Component-boundary markers.
//!
//! A nested component's footprint in its parent is collapsed to a single
//! boundary node. Two encodings exist: an attribute on the component's
//! single element root, or a dedicated comment node when the component has
//! zero or several roots.
//!
//! ```text
//! Single element root:          Multiple roots:
//! <div data-g-c="c1">...</div>  <!--g-c:c1--><li>..</li><li>..</li>
//! ```

use grappelli_dom::{NodeKind, NodeRef};

/// Attribute carrying the boundary id on an element root.
pub const COMPONENT_ATTR: &str = "data-g-c";

/// Payload prefix of a boundary comment node.
pub const MARKER_PREFIX: &str = "g-c:";

/// Builds the comment payload for a component id.
pub fn marker_text(component_id: &str) -> String {
	format!("{}{}", MARKER_PREFIX, component_id)
}

/// Tags an element as the boundary of `component_id`.
pub fn tag_boundary(node: &NodeRef, component_id: &str) {
	// Only elements carry attributes; comment boundaries encode the id in
	// their payload instead.
	let _ = node.set_attribute(COMPONENT_ATTR, component_id);
}

/// Reads the boundary id a node carries, if any.
pub fn boundary_id(node: &NodeRef) -> Option<String> {
	match node.kind() {
		NodeKind::Element => node.get_attribute(COMPONENT_ATTR),
		NodeKind::Comment => node
			.text_content()
			.and_then(|text| text.strip_prefix(MARKER_PREFIX).map(str::to_string)),
		NodeKind::Text => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_element_boundary_round_trip() {
		let div = NodeRef::element("div");
		assert_eq!(boundary_id(&div), None);
		tag_boundary(&div, "c3");
		assert_eq!(boundary_id(&div), Some("c3".to_string()));
	}

	#[test]
	fn test_comment_boundary_round_trip() {
		let marker = NodeRef::comment(marker_text("c7"));
		assert_eq!(boundary_id(&marker), Some("c7".to_string()));

		let plain = NodeRef::comment("just a comment");
		assert_eq!(boundary_id(&plain), None);
	}

	#[test]
	fn test_text_nodes_never_carry_boundaries() {
		let text = NodeRef::text("g-c:c1");
		assert_eq!(boundary_id(&text), None);
	}
}
