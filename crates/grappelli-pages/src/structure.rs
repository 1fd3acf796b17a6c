//! Structure maps: flat encodings of one pass's node topology.
//!
//! A structure map has one entry per tracked node, in creation order; the
//! entry index *is* the node's identity for that pass. Each entry carries a
//! kind tag and the creation indices of the node's direct structural
//! children, so the original parent/child graph can be re-derived from the
//! map plus the ordered physical nodes alone; no tree-order metadata is
//! needed beyond what the tuples hold.
//!
//! Wire form (one tuple per entry): `["div", 1, 3]`, `["#text"]`,
//! `["#component:c2"]`.

use std::collections::{HashMap, HashSet};
use std::fmt;

use grappelli_dom::{NodeKind, NodeRef};
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The closed set of kind tags a tracked node can carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindTag {
	/// An element, tagged by its element kind.
	Element(String),
	/// A text node.
	Text,
	/// A comment / marker node.
	Comment,
	/// The boundary of a nested component, carrying that component's id.
	Component(String),
}

impl KindTag {
	/// Whether a physical node satisfies this tag.
	///
	/// Elements match by tag-name equality, text and comments by node kind,
	/// and component boundaries by an element carrying the boundary id or a
	/// marker comment encoding it.
	pub fn matches(&self, node: &NodeRef) -> bool {
		match self {
			KindTag::Element(tag) => node.kind() == NodeKind::Element && node.tag().as_deref() == Some(tag),
			KindTag::Text => node.kind() == NodeKind::Text,
			KindTag::Comment => node.kind() == NodeKind::Comment,
			KindTag::Component(id) => crate::markers::boundary_id(node).as_deref() == Some(id),
		}
	}

	/// The wire spelling of this tag.
	pub fn as_wire(&self) -> String {
		match self {
			KindTag::Element(tag) => tag.clone(),
			KindTag::Text => "#text".to_string(),
			KindTag::Comment => "#comment".to_string(),
			KindTag::Component(id) => format!("#component:{}", id),
		}
	}

	/// Parses the wire spelling back into a tag.
	pub fn from_wire(raw: &str) -> Self {
		match raw {
			"#text" => KindTag::Text,
			"#comment" => KindTag::Comment,
			_ => match raw.strip_prefix("#component:") {
				Some(id) => KindTag::Component(id.to_string()),
				None => KindTag::Element(raw.to_string()),
			},
		}
	}
}

impl fmt::Display for KindTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.as_wire())
	}
}

/// One structure-map tuple: a kind tag plus child creation indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
	/// The node's kind tag.
	pub tag: KindTag,
	/// Creation indices of the node's direct structural children, in tree order.
	pub children: Vec<usize>,
}

/// Integrity violations a structure map can carry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructureMapError {
	/// A tuple references a child index outside the map.
	#[error("entry {parent} references out-of-bounds child index {child}")]
	ChildOutOfBounds {
		/// Index of the referencing tuple.
		parent: usize,
		/// The out-of-bounds child index.
		child: usize,
	},
	/// A child index is referenced by more than one tuple.
	#[error("child index {child} is claimed by entries {first} and {second}")]
	ChildClaimedTwice {
		/// The doubly-referenced child index.
		child: usize,
		/// First referencing tuple.
		first: usize,
		/// Second referencing tuple.
		second: usize,
	},
	/// A tuple lists itself as its own child.
	#[error("entry {index} references itself")]
	SelfReference {
		/// The self-referencing tuple.
		index: usize,
	},
	/// A component-boundary tuple carries child indices.
	#[error("component boundary entry {index} must not list children")]
	BoundaryWithChildren {
		/// The offending tuple.
		index: usize,
	},
}

/// Flat, index-addressed encoding of one component's tracked nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructureMap {
	entries: Vec<MapEntry>,
}

impl StructureMap {
	/// Builds the map for one component from its tracked nodes.
	///
	/// `tracked` is the component's nodes in creation order. The
	/// `nested_boundary` predicate identifies nodes that delimit a *nested*
	/// component (returning that component's id); such nodes are emitted as
	/// boundary tuples with no children, because the nested component owns
	/// its own map. Physical children that are not tracked by this
	/// component (nested-component internals, foreign nodes) are skipped.
	pub fn build<F>(tracked: &[NodeRef], nested_boundary: F) -> Self
	where
		F: Fn(&NodeRef) -> Option<String>,
	{
		let mut creation_index = HashMap::with_capacity(tracked.len());
		for (i, node) in tracked.iter().enumerate() {
			creation_index.insert(node.handle_id(), i);
		}

		let entries = tracked
			.iter()
			.map(|node| {
				if let Some(component_id) = nested_boundary(node) {
					return MapEntry {
						tag: KindTag::Component(component_id),
						children: Vec::new(),
					};
				}
				let tag = match node.kind() {
					NodeKind::Element => KindTag::Element(node.tag().unwrap_or_default()),
					NodeKind::Text => KindTag::Text,
					NodeKind::Comment => KindTag::Comment,
				};
				let children = node
					.children()
					.iter()
					.filter_map(|child| creation_index.get(&child.handle_id()).copied())
					.collect();
				MapEntry { tag, children }
			})
			.collect();

		Self { entries }
	}

	/// Wraps pre-built entries (tests, deserialized payloads).
	pub fn from_entries(entries: Vec<MapEntry>) -> Self {
		Self { entries }
	}

	/// The number of tuples.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Whether the map holds no tuples.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// The tuple at `index`, if in bounds.
	pub fn get(&self, index: usize) -> Option<&MapEntry> {
		self.entries.get(index)
	}

	/// All tuples, in creation order.
	pub fn entries(&self) -> &[MapEntry] {
		&self.entries
	}

	/// Indices never referenced as a child: the pass's structural roots,
	/// in creation order.
	pub fn roots(&self) -> Vec<usize> {
		let mut referenced = HashSet::new();
		for entry in &self.entries {
			referenced.extend(entry.children.iter().copied());
		}
		(0..self.entries.len())
			.filter(|i| !referenced.contains(i))
			.collect()
	}

	/// Checks referential integrity: in-bounds, single-parent, no
	/// self-references, childless boundaries.
	pub fn validate(&self) -> Result<(), StructureMapError> {
		let mut claimed_by: HashMap<usize, usize> = HashMap::new();
		for (parent, entry) in self.entries.iter().enumerate() {
			if matches!(entry.tag, KindTag::Component(_)) && !entry.children.is_empty() {
				return Err(StructureMapError::BoundaryWithChildren { index: parent });
			}
			for &child in &entry.children {
				if child == parent {
					return Err(StructureMapError::SelfReference { index: parent });
				}
				if child >= self.entries.len() {
					return Err(StructureMapError::ChildOutOfBounds { parent, child });
				}
				if let Some(&first) = claimed_by.get(&child) {
					return Err(StructureMapError::ChildClaimedTwice {
						child,
						first,
						second: parent,
					});
				}
				claimed_by.insert(child, parent);
			}
		}
		Ok(())
	}
}

impl Serialize for MapEntry {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut seq = serializer.serialize_seq(Some(1 + self.children.len()))?;
		seq.serialize_element(&self.tag.as_wire())?;
		for &child in &self.children {
			seq.serialize_element(&(child as u64))?;
		}
		seq.end()
	}
}

impl<'de> Deserialize<'de> for MapEntry {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		struct EntryVisitor;

		impl<'de> Visitor<'de> for EntryVisitor {
			type Value = MapEntry;

			fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str("a structure-map tuple: [kindTag, childIndex...]")
			}

			fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
				let raw_tag: String = seq
					.next_element()?
					.ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
				let mut children = Vec::new();
				while let Some(child) = seq.next_element::<u64>()? {
					children.push(child as usize);
				}
				Ok(MapEntry {
					tag: KindTag::from_wire(&raw_tag),
					children,
				})
			}
		}

		deserializer.deserialize_seq(EntryVisitor)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::markers;
	use rstest::rstest;

	fn entry(tag: KindTag, children: &[usize]) -> MapEntry {
		MapEntry {
			tag,
			children: children.to_vec(),
		}
	}

	/// Builds the `div > [h1("X"), p("Y")]` tree with nodes listed in
	/// creation order (children before parents).
	fn sample_tracked() -> Vec<NodeRef> {
		let text_x = NodeRef::text("X");
		let h1 = NodeRef::element("h1");
		h1.append_child(&text_x);
		let text_y = NodeRef::text("Y");
		let p = NodeRef::element("p");
		p.append_child(&text_y);
		let div = NodeRef::element("div");
		div.append_child(&h1);
		div.append_child(&p);
		vec![text_x, h1, text_y, p, div]
	}

	#[test]
	fn test_build_encodes_creation_order_topology() {
		let map = StructureMap::build(&sample_tracked(), |_| None);
		assert_eq!(
			map.entries(),
			&[
				entry(KindTag::Text, &[]),
				entry(KindTag::Element("h1".to_string()), &[0]),
				entry(KindTag::Text, &[]),
				entry(KindTag::Element("p".to_string()), &[2]),
				entry(KindTag::Element("div".to_string()), &[1, 3]),
			]
		);
		assert_eq!(map.roots(), vec![4]);
		map.validate().unwrap();
	}

	#[test]
	fn test_build_collapses_nested_boundaries() {
		let tracked = sample_tracked();
		// Pretend the h1 is a nested component's root.
		markers::tag_boundary(&tracked[1], "c1");
		let map = StructureMap::build(&tracked, markers::boundary_id);

		assert_eq!(
			map.get(1),
			Some(&entry(KindTag::Component("c1".to_string()), &[]))
		);
		// The div still references the boundary by index; the boundary's
		// own text child is absent from the boundary tuple.
		assert_eq!(map.get(4).unwrap().children, vec![1, 3]);
	}

	#[test]
	fn test_build_skips_foreign_children() {
		let tracked = sample_tracked();
		let foreign = NodeRef::element("script");
		tracked[4].append_child(&foreign);
		let map = StructureMap::build(&tracked, |_| None);
		// The foreign node is invisible to the map.
		assert_eq!(map.get(4).unwrap().children, vec![1, 3]);
	}

	#[test]
	fn test_wire_round_trip() {
		let map = StructureMap::build(&sample_tracked(), |_| None);
		let json = serde_json::to_string(&map).unwrap();
		assert_eq!(json, r##"[["#text"],["h1",0],["#text"],["p",2],["div",1,3]]"##);
		let back: StructureMap = serde_json::from_str(&json).unwrap();
		assert_eq!(back, map);
	}

	#[rstest]
	#[case("#text", KindTag::Text)]
	#[case("#comment", KindTag::Comment)]
	#[case("#component:c4", KindTag::Component("c4".to_string()))]
	#[case("div", KindTag::Element("div".to_string()))]
	fn test_kind_tag_wire_spellings(#[case] wire: &str, #[case] tag: KindTag) {
		assert_eq!(KindTag::from_wire(wire), tag);
		assert_eq!(tag.as_wire(), wire);
	}

	#[test]
	fn test_kind_tag_matching() {
		let div = NodeRef::element("div");
		assert!(KindTag::Element("div".to_string()).matches(&div));
		assert!(!KindTag::Element("span".to_string()).matches(&div));
		assert!(!KindTag::Text.matches(&div));

		let text = NodeRef::text("x");
		assert!(KindTag::Text.matches(&text));

		markers::tag_boundary(&div, "c2");
		assert!(KindTag::Component("c2".to_string()).matches(&div));
		assert!(!KindTag::Component("c20".to_string()).matches(&div));

		let marker = NodeRef::comment(markers::marker_text("c2"));
		assert!(KindTag::Component("c2".to_string()).matches(&marker));
		assert!(KindTag::Comment.matches(&marker));
	}

	#[test]
	fn test_validate_rejects_double_claim() {
		let map = StructureMap::from_entries(vec![
			entry(KindTag::Text, &[]),
			entry(KindTag::Element("a".to_string()), &[0]),
			entry(KindTag::Element("b".to_string()), &[0]),
		]);
		assert_eq!(
			map.validate(),
			Err(StructureMapError::ChildClaimedTwice {
				child: 0,
				first: 1,
				second: 2
			})
		);
	}

	#[test]
	fn test_validate_rejects_out_of_bounds_and_self_reference() {
		let oob = StructureMap::from_entries(vec![entry(KindTag::Element("a".to_string()), &[5])]);
		assert_eq!(
			oob.validate(),
			Err(StructureMapError::ChildOutOfBounds { parent: 0, child: 5 })
		);

		let selfref = StructureMap::from_entries(vec![entry(KindTag::Element("a".to_string()), &[0])]);
		assert_eq!(
			selfref.validate(),
			Err(StructureMapError::SelfReference { index: 0 })
		);
	}

	#[test]
	fn test_multiple_roots_are_reported_in_order() {
		let map = StructureMap::from_entries(vec![
			entry(KindTag::Element("li".to_string()), &[]),
			entry(KindTag::Element("li".to_string()), &[]),
		]);
		assert_eq!(map.roots(), vec![0, 1]);
	}
}
