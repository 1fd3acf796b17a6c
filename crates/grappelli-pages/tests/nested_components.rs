//! Nested-component boundary tests
//!
//! Success Criteria:
//! 1. Each component owns its own structure map; a parent map collapses a
//!    nested component to a single boundary tuple
//! 2. Single-element-root components anchor on a tagged element, multi-root
//!    components on a marker comment
//! 3. Reconciliation routes each component to its own map and reuses
//!    across the boundary
//! 4. Divergence inside a nested component stays inside it

use grappelli_dom::{NodeKind, NodeRef};
use grappelli_pages::{BuildScope, RenderContext, capture, reconcile, render};

fn single_root_page(s: &mut BuildScope) {
	s.element("main", |s| {
		s.text("header");
		s.component(|s| {
			s.element("section", |s| {
				s.text("inner");
			});
		});
	});
}

#[tokio::test]
async fn test_single_root_component_maps_and_reuses() {
	let ctx = RenderContext::new(1);
	let pass = render(&ctx, single_root_page);
	let payload = capture(&pass).await.unwrap();

	// Both components captured their own map.
	assert!(payload.components.contains_key("c0"));
	assert!(payload.components.contains_key("c1"));

	// The parent map collapses the nested component to a boundary tuple;
	// its internals live only in c1's map.
	let parent_json = serde_json::to_string(payload.components.get("c0").unwrap()).unwrap();
	assert_eq!(parent_json, r##"[["#text"],["#component:c1"],["main",0,1]]"##);
	let child_json = serde_json::to_string(payload.components.get("c1").unwrap()).unwrap();
	assert_eq!(child_json, r##"[["#text"],["section",0]]"##);

	let main = pass.roots()[0].clone();
	let section = main.children()[1].clone();
	assert_eq!(
		section.get_attribute("data-g-c").as_deref(),
		Some("c1")
	);

	let live = reconcile(Some(payload), vec![main.clone()], single_root_page);
	assert!(live.diagnostics.is_empty());
	assert_eq!(live.created, 0);
	// 3 tracked in c0 + 2 in c1.
	assert_eq!(live.reused, 5);
	// The nested section is the exact pre-rendered node.
	assert_eq!(main.children()[1], section);
}

fn multi_root_page(s: &mut BuildScope) {
	s.element("ul", |s| {
		s.component(|s| {
			s.element("li", |s| {
				s.text("one");
			});
			s.element("li", |s| {
				s.text("two");
			});
		});
	});
}

#[tokio::test]
async fn test_multi_root_component_uses_marker_comment() {
	let ctx = RenderContext::new(1);
	let pass = render(&ctx, multi_root_page);

	let ul = pass.roots()[0].clone();
	let children = ul.children();
	assert_eq!(children.len(), 3);
	assert_eq!(children[0].kind(), NodeKind::Comment);
	assert_eq!(children[0].text_content().as_deref(), Some("g-c:c1"));

	let payload = capture(&pass).await.unwrap();
	// The marker is the only footprint in the parent map; the li roots are
	// skipped there and owned by c1's map.
	let parent_json = serde_json::to_string(payload.components.get("c0").unwrap()).unwrap();
	assert_eq!(parent_json, r##"[["#component:c1"],["ul",0]]"##);

	let live = reconcile(Some(payload), vec![ul.clone()], multi_root_page);
	assert!(live.diagnostics.is_empty());
	assert_eq!(live.created, 0);
	assert_eq!(ul.children().len(), 3);
}

#[tokio::test]
async fn test_divergence_inside_nested_component_is_scoped() {
	let ctx = RenderContext::new(1);
	let pass = render(&ctx, multi_root_page);
	let payload = capture(&pass).await.unwrap();

	// Mutate the first li of the nested component into a p.
	let ul = pass.roots()[0].clone();
	let first_li = ul.children()[1].clone();
	let p = NodeRef::element("p");
	p.append_child(&NodeRef::text("one"));
	ul.insert_before(&p, Some(&first_li)).unwrap();
	first_li.detach();

	let live = reconcile(Some(payload), vec![ul.clone()], multi_root_page);

	// One diagnostic, attributed to the nested component.
	assert_eq!(live.diagnostics.len(), 1);
	assert_eq!(live.diagnostics[0].component, "c1");

	// The parent's nodes and the second li are reused; only the first li
	// subtree is fresh.
	let children = ul.children();
	assert_eq!(children.len(), 3);
	assert_eq!(children[0].kind(), NodeKind::Comment);
	assert_eq!(children[1].tag().as_deref(), Some("li"));
	assert_eq!(
		children[1].children()[0].text_content().as_deref(),
		Some("one")
	);
	assert_eq!(p.parent(), None);
	// marker + ul + second li + its text reused; li + text fresh.
	assert_eq!(live.reused, 4);
	assert_eq!(live.created, 2);
}

#[tokio::test]
async fn test_component_ids_replay_across_passes() {
	fn page(s: &mut BuildScope) {
		s.element("div", |s| {
			s.component(|s| {
				s.element("em", |_| {});
			});
			s.component(|s| {
				s.element("strong", |_| {});
			});
		});
	}

	let ctx = RenderContext::new(1);
	let pass = render(&ctx, page);
	let payload = capture(&pass).await.unwrap();
	assert_eq!(
		payload.components.keys().cloned().collect::<Vec<_>>(),
		vec!["c0".to_string(), "c1".to_string(), "c2".to_string()]
	);

	let live = reconcile(Some(payload), pass.roots().to_vec(), page);
	assert!(live.diagnostics.is_empty());
	assert_eq!(live.created, 0);
}
