//! Pass state and the construction scope.
//!
//! A component body never touches the tree directly: it asks its
//! [`BuildScope`] for elements, text, comments, and nested components. In a
//! producing pass each request creates a fresh node and records it; in a
//! consuming pass each request is first *claimed* against the pre-rendered
//! tree (map-driven when a structure map exists for the component,
//! cursor-driven otherwise) and only constructs a fresh node at the point
//! of divergence.
//!
//! Creation order is the single source of truth: the i-th node a component
//! records is map index i, which is why claims and records are interleaved
//! identically in both kinds of pass.
//!
//! Staging vs. tracking: each scope keeps a stack of staging frames that
//! mirror *tree* positions (so fresh nodes land next to reused siblings),
//! while the tracked list mirrors *creation* order (children before their
//! parent, the order the structure map is keyed by).

use std::cell::{Cell as RawCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use grappelli_dom::{NodeKind, NodeRef};

use crate::context::RenderContext;
use crate::cursor::{Claim, HydrationCursor};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::fallback;
use crate::markers;
use crate::resolve::{Resolution, resolve};
use crate::structure::{KindTag, StructureMap};

/// Failure of deferred asynchronous work registered during a producing pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("deferred work failed: {0}")]
pub struct PendingError(pub String);

type PendingWork = LocalBoxFuture<'static, Result<(), PendingError>>;

/// Handle for registering deferred asynchronous work with a pass.
///
/// Cloneable so deferred work can itself enqueue follow-up work; the
/// driver's settle loop keeps draining until the queue stays empty.
#[derive(Clone, Default)]
pub struct DeferQueue {
	queue: Rc<RefCell<Vec<PendingWork>>>,
}

impl DeferQueue {
	/// Enqueues one piece of deferred work.
	pub fn defer<F>(&self, work: F)
	where
		F: Future<Output = Result<(), PendingError>> + 'static,
	{
		self.queue.borrow_mut().push(Box::pin(work));
	}

	/// The number of queued items not yet drained.
	pub fn len(&self) -> usize {
		self.queue.borrow().len()
	}

	/// Whether the queue is currently empty.
	pub fn is_empty(&self) -> bool {
		self.queue.borrow().is_empty()
	}

	pub(crate) fn drain(&self) -> Vec<PendingWork> {
		self.queue.borrow_mut().drain(..).collect()
	}
}

/// How one component's construction sequence meets the physical tree.
pub(crate) enum Strategy {
	/// Fresh construction; nothing to claim against.
	Produce,
	/// Map-driven resolution against this component's structure map.
	Mapped {
		map: Rc<StructureMap>,
		resolution: Resolution,
	},
	/// Sequential claim cursor (no map available).
	Cursor(HydrationCursor),
}

pub(crate) struct ComponentRecord {
	pub id: String,
	pub tracked: Vec<NodeRef>,
}

/// State shared by every scope of one pass.
pub(crate) struct PassInner {
	pub ctx: Rc<RenderContext>,
	pub diagnostics: Diagnostics,
	pub components: RefCell<Vec<ComponentRecord>>,
	pub pending: DeferQueue,
	maps: HashMap<String, Rc<StructureMap>>,
	pub reused: RawCell<usize>,
	pub created: RawCell<usize>,
}

impl PassInner {
	pub fn new(
		ctx: Rc<RenderContext>,
		maps: HashMap<String, Rc<StructureMap>>,
		diagnostics: Diagnostics,
	) -> Self {
		Self {
			ctx,
			diagnostics,
			components: RefCell::new(Vec::new()),
			pending: DeferQueue::default(),
			maps,
			reused: RawCell::new(0),
			created: RawCell::new(0),
		}
	}

	pub fn map_for(&self, component_id: &str) -> Option<Rc<StructureMap>> {
		self.maps.get(component_id).cloned()
	}

	/// Picks the strategy for a component given its physical roots.
	pub fn strategy_for(&self, component_id: &str, physical_roots: Vec<NodeRef>) -> Strategy {
		match self.map_for(component_id) {
			Some(map) => {
				let resolution = resolve(&map, &physical_roots, component_id, &self.diagnostics);
				Strategy::Mapped { map, resolution }
			}
			None if physical_roots.is_empty() => Strategy::Produce,
			None => Strategy::Cursor(HydrationCursor::new(
				physical_roots,
				component_id,
				self.diagnostics.clone(),
			)),
		}
	}

	/// Derives a nested component's physical roots from its boundary node
	/// and picks its strategy.
	///
	/// An element boundary is itself the component's single root. A marker
	/// comment announces roots among the *following siblings*; how many is
	/// only knowable from the child's map, so a marker without a map
	/// degrades to fresh construction.
	fn child_strategy(&self, component_id: &str, boundary: Option<NodeRef>) -> (Strategy, usize) {
		let Some(boundary) = boundary else {
			return (Strategy::Produce, 0);
		};
		match boundary.kind() {
			NodeKind::Element => (self.strategy_for(component_id, vec![boundary]), 0),
			NodeKind::Comment => {
				let Some(map) = self.map_for(component_id) else {
					return (Strategy::Produce, 0);
				};
				let want = map.roots().len();
				let mut roots = Vec::with_capacity(want);
				let mut next = boundary.next_sibling();
				while roots.len() < want {
					match next {
						Some(node) => {
							next = node.next_sibling();
							roots.push(node);
						}
						None => break,
					}
				}
				let skip = roots.len();
				(self.strategy_for(component_id, roots), skip)
			}
			NodeKind::Text => (Strategy::Produce, 0),
		}
	}
}

/// The construction scope handed to one component's body.
pub struct BuildScope<'p> {
	pass: &'p PassInner,
	component_id: String,
	strategy: Strategy,
	/// Tracked nodes in creation order; the next claim index is `tracked.len()`.
	tracked: Vec<NodeRef>,
	/// Staging frames in tree order; the bottom frame holds the component's roots.
	frames: Vec<Vec<NodeRef>>,
	/// Depth of enclosing fallback reconstruction; claims are suppressed inside.
	fresh_depth: usize,
}

impl<'p> BuildScope<'p> {
	pub(crate) fn new(pass: &'p PassInner, component_id: String, strategy: Strategy) -> Self {
		Self {
			pass,
			component_id,
			strategy,
			tracked: Vec::new(),
			frames: vec![Vec::new()],
			fresh_depth: 0,
		}
	}

	/// The render context this pass runs under.
	pub fn context(&self) -> &Rc<RenderContext> {
		&self.pass.ctx
	}

	/// Registers pending asynchronous work with the pass.
	///
	/// The driver's settle loop awaits all registered work, including work
	/// enqueued by other deferred work, before a payload is captured.
	pub fn defer<F>(&mut self, work: F)
	where
		F: Future<Output = Result<(), PendingError>> + 'static,
	{
		self.pass.pending.defer(work);
	}

	/// A cloneable handle to the pass's deferred-work queue, for work that
	/// needs to enqueue follow-ups after the synchronous body returns.
	pub fn defer_queue(&self) -> DeferQueue {
		self.pass.pending.clone()
	}

	fn stage(&mut self, node: NodeRef) {
		if let Some(frame) = self.frames.last_mut() {
			frame.push(node);
		}
	}

	fn record(&mut self, node: NodeRef) {
		self.tracked.push(node);
	}

	fn note_reused(&self) {
		self.pass.reused.set(self.pass.reused.get() + 1);
	}

	fn note_created(&self) {
		self.pass.created.set(self.pass.created.get() + 1);
	}

	/// Claims the next construction step against the pre-rendered tree.
	fn claim(&mut self, want: &KindTag, payload: Option<&str>) -> Claim {
		if self.fresh_depth > 0 {
			return Claim::Fresh { anchor: None };
		}
		let index = self.tracked.len();
		let component = self.component_id.clone();
		let diagnostics = self.pass.diagnostics.clone();
		match &mut self.strategy {
			Strategy::Produce => Claim::Fresh { anchor: None },
			Strategy::Mapped { map, resolution } => {
				let Some(entry) = map.get(index) else {
					// The live pass constructs more nodes than the producer
					// did; everything past the map is fresh by definition.
					tracing::trace!(component = %component, index, "construction ran past structure map");
					return Claim::Fresh { anchor: None };
				};
				if entry.tag != *want {
					// Live divergence: the construction sequence itself
					// changed between the producing and consuming builds.
					// Build fresh without substituting: the resolved node
					// may still be claimed by a later step, so displacing it
					// here could cascade.
					diagnostics.emit(Diagnostic {
						component,
						index: Some(index),
						path: String::new(),
						expected: entry.tag.as_wire(),
						found: Some(want.as_wire()),
					});
					return Claim::Fresh {
						anchor: resolution.anchor(index),
					};
				}
				match resolution.node(index) {
					Some(node) => Claim::Reused(node),
					// resolve() already emitted the diagnostic for this index.
					None => Claim::Fresh {
						anchor: resolution.anchor(index),
					},
				}
			}
			Strategy::Cursor(cursor) => match want {
				KindTag::Element(tag) => cursor.claim_element(tag),
				KindTag::Text => cursor.claim_text(payload.unwrap_or_default()),
				KindTag::Comment => cursor.claim_comment(payload.unwrap_or_default()),
				KindTag::Component(id) => cursor.claim_component(id),
			},
		}
	}

	/// Builds an element, running `f` to build its children.
	///
	/// Children are constructed (and recorded) before the element itself,
	/// so the element's creation index follows its subtree, the order the
	/// structure map encodes.
	pub fn element(&mut self, tag: &str, f: impl FnOnce(&mut BuildScope<'p>)) -> NodeRef {
		let in_cursor = matches!(self.strategy, Strategy::Cursor(_)) && self.fresh_depth == 0;
		if in_cursor {
			// The cursor needs the parent claimed first so its children
			// frame can be entered; recording still happens afterwards.
			let claim = self.claim(&KindTag::Element(tag.to_string()), None);
			match claim {
				Claim::Reused(node) => {
					if let Strategy::Cursor(cursor) = &mut self.strategy {
						cursor.enter(&node);
					}
					self.frames.push(Vec::new());
					f(self);
					let staged = self.frames.pop().unwrap_or_default();
					if let Strategy::Cursor(cursor) = &mut self.strategy {
						cursor.exit();
					}
					attach_in_order(&node, &staged);
					self.note_reused();
					self.stage(node.clone());
					self.record(node.clone());
					node
				}
				Claim::Fresh { anchor } => self.build_fresh_element(tag, f, anchor),
			}
		} else {
			self.frames.push(Vec::new());
			f(self);
			let staged = self.frames.pop().unwrap_or_default();
			let claim = self.claim(&KindTag::Element(tag.to_string()), None);
			match claim {
				Claim::Reused(node) => {
					attach_in_order(&node, &staged);
					self.note_reused();
					self.stage(node.clone());
					self.record(node.clone());
					node
				}
				Claim::Fresh { anchor } => {
					let node = NodeRef::element(tag);
					let state = anchor.as_ref().map(fallback::capture);
					attach_in_order(&node, &staged);
					self.substitute(&node, anchor);
					if let Some(state) = state {
						fallback::restore(&node, &state);
					}
					self.note_created();
					self.stage(node.clone());
					self.record(node.clone());
					node
				}
			}
		}
	}

	/// Fresh element construction with claim suppression for the subtree.
	fn build_fresh_element(
		&mut self,
		tag: &str,
		f: impl FnOnce(&mut BuildScope<'p>),
		anchor: Option<NodeRef>,
	) -> NodeRef {
		let node = NodeRef::element(tag);
		let state = anchor.as_ref().map(fallback::capture);
		self.fresh_depth += 1;
		self.frames.push(Vec::new());
		f(self);
		let staged = self.frames.pop().unwrap_or_default();
		self.fresh_depth -= 1;
		attach_in_order(&node, &staged);
		self.substitute(&node, anchor);
		if let Some(state) = state {
			fallback::restore(&node, &state);
		}
		self.note_created();
		self.stage(node.clone());
		self.record(node.clone());
		node
	}

	/// Builds a text node.
	pub fn text(&mut self, value: &str) -> NodeRef {
		let claim = self.claim(&KindTag::Text, Some(value));
		self.leaf(claim, || NodeRef::text(value), |node| {
			// Structural equivalence only: the live value wins.
			if node.text_content().as_deref() != Some(value) {
				node.set_text_content(value);
			}
		})
	}

	/// Builds a comment node.
	pub fn comment(&mut self, value: &str) -> NodeRef {
		let claim = self.claim(&KindTag::Comment, Some(value));
		self.leaf(claim, || NodeRef::comment(value), |node| {
			if node.text_content().as_deref() != Some(value) {
				node.set_text_content(value);
			}
		})
	}

	fn leaf(
		&mut self,
		claim: Claim,
		build: impl FnOnce() -> NodeRef,
		patch: impl FnOnce(&NodeRef),
	) -> NodeRef {
		match claim {
			Claim::Reused(node) => {
				patch(&node);
				self.note_reused();
				self.stage(node.clone());
				self.record(node.clone());
				node
			}
			Claim::Fresh { anchor } => {
				let node = build();
				let state = anchor.as_ref().map(fallback::capture);
				self.substitute(&node, anchor);
				if let Some(state) = state {
					fallback::restore(&node, &state);
				}
				self.note_created();
				self.stage(node.clone());
				self.record(node.clone());
				node
			}
		}
	}

	/// Builds a nested component, running `f` as its body.
	///
	/// The nested component gets its own tracked list (and so its own
	/// structure map); its footprint in this scope is a single boundary
	/// node. Returns the component's root nodes.
	pub fn component(&mut self, f: impl FnOnce(&mut BuildScope<'p>)) -> Vec<NodeRef> {
		let component_id = self.pass.ctx.next_component_id();
		let (child_strategy, skip_after_boundary) = self.plan_child(&component_id);

		let mut child = BuildScope::new(self.pass, component_id.clone(), child_strategy);
		f(&mut child);
		let child_roots = child.finish();

		// The boundary claims at this component call's creation index in
		// the parent; the child body recorded nothing here, so the index
		// is the one plan_child peeked at.
		let claim = self.claim(&KindTag::Component(component_id.clone()), None);
		let boundary = match claim {
			Claim::Reused(node) => {
				self.note_reused();
				node
			}
			Claim::Fresh { anchor } => {
				let node = match child_roots.as_slice() {
					[only]
						if only.kind() == NodeKind::Element
							&& markers::boundary_id(only).is_none() =>
					{
						markers::tag_boundary(only, &component_id);
						only.clone()
					}
					_ => NodeRef::comment(self.pass.ctx.marker_for(&component_id)),
				};
				let state = anchor.as_ref().map(fallback::capture);
				self.substitute(&node, anchor);
				if let Some(state) = state {
					fallback::restore(&node, &state);
				}
				self.note_created();
				node
			}
		};
		self.stage(boundary.clone());
		self.record(boundary.clone());
		for root in &child_roots {
			if *root != boundary {
				self.stage(root.clone());
			}
		}
		if skip_after_boundary > 0 {
			if let Strategy::Cursor(cursor) = &mut self.strategy {
				cursor.skip(skip_after_boundary);
			}
		}
		child_roots
	}

	/// Works out a nested component's strategy (and how many claimed root
	/// siblings the parent cursor must step over) before its body runs.
	fn plan_child(&self, component_id: &str) -> (Strategy, usize) {
		if self.fresh_depth > 0 {
			return (Strategy::Produce, 0);
		}
		match &self.strategy {
			Strategy::Produce => (Strategy::Produce, 0),
			Strategy::Mapped { map, resolution } => {
				let index = self.tracked.len();
				let boundary = match map.get(index) {
					Some(entry) if entry.tag == KindTag::Component(component_id.to_string()) => {
						resolution.node(index)
					}
					_ => None,
				};
				// The parent's scan skips the marker's root siblings on its
				// own (they are not in the parent's map), so no skip here.
				let (strategy, _skip) = self.pass.child_strategy(component_id, boundary);
				(strategy, 0)
			}
			Strategy::Cursor(cursor) => {
				let boundary = cursor.peek_component(component_id);
				self.pass.child_strategy(component_id, boundary)
			}
		}
	}

	/// Physically places a fresh node: in the stale anchor's position when
	/// one exists, otherwise deferred to the enclosing frame's attachment.
	fn substitute(&self, node: &NodeRef, anchor: Option<NodeRef>) {
		let Some(anchor) = anchor else {
			return;
		};
		if let Some(parent) = anchor.parent() {
			let _ = parent.insert_before(node, Some(&anchor));
		}
		anchor.detach();
	}

	/// Closes the scope: pushes the component record and returns the roots.
	pub(crate) fn finish(mut self) -> Vec<NodeRef> {
		let roots = self.frames.pop().unwrap_or_default();
		self.pass.components.borrow_mut().push(ComponentRecord {
			id: self.component_id,
			tracked: self.tracked,
		});
		roots
	}
}

/// Ensures `staged` are children of `parent` in staging order, moving only
/// the nodes that are not already in place.
///
/// Claimed nodes are already attached in the correct relative order (the
/// scan is monotonic), so only fresh nodes move: each is inserted right
/// after the previously placed sibling.
fn attach_in_order(parent: &NodeRef, staged: &[NodeRef]) {
	let mut prev: Option<NodeRef> = None;
	for child in staged {
		if child.parent().as_ref() != Some(parent) {
			let before = match &prev {
				Some(placed) => placed.next_sibling(),
				None => parent.first_child(),
			};
			let _ = parent.insert_before(child, before.as_ref());
		}
		prev = Some(child.clone());
	}
}
