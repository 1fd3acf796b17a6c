//! The reconciliation driver.
//!
//! Two entry points bracket the whole machinery:
//!
//! - [`render`] runs a producing pass: the component tree executes under a
//!   fresh render context and builds real nodes. [`capture`] then settles
//!   any deferred work, builds the per-component structure maps, validates
//!   the dependency graph, and emits the [`HydrationPayload`].
//! - [`reconcile`] runs a consuming pass: it re-creates the context with
//!   the producer's id, seeds restored observable values *before* the tree
//!   executes, and routes every construction step through the resolver so
//!   pre-rendered nodes are claimed instead of rebuilt.
//!
//! A missing payload is not an error; reconcile then degrades to a plain
//! render. Mismatches never abort anything; they surface as diagnostics
//! on the returned [`LiveTree`].

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use grappelli_dom::NodeRef;

use crate::context::RenderContext;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::graph::{DependencyGraph, GraphError};
use crate::markers;
use crate::pass::{BuildScope, PassInner, PendingError, Strategy};
use crate::payload::HydrationPayload;
use crate::structure::StructureMap;

/// Errors that abort a capture. No partial payload is ever emitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
	/// Deferred work registered during the pass failed.
	#[error(transparent)]
	Pending(#[from] PendingError),
	/// The dependency graph cannot replay (a cycle was detected).
	#[error("dependency graph cannot replay: {0}")]
	Graph(#[from] GraphError),
}

/// A completed producing pass, ready for capture.
pub struct RenderedPass {
	inner: PassInner,
	context: Rc<RenderContext>,
	roots: Vec<NodeRef>,
}

impl RenderedPass {
	/// The root nodes the pass produced.
	pub fn roots(&self) -> &[NodeRef] {
		&self.roots
	}

	/// The render context the pass ran under.
	pub fn context(&self) -> &Rc<RenderContext> {
		&self.context
	}

	/// Awaits all deferred work registered with the pass.
	///
	/// Loops because resolving one piece of work may enqueue more; returns
	/// once the queue stays empty, so the captured payload reflects a
	/// quiescent pass, never a mid-flight one.
	pub async fn settle(&self) -> Result<(), PendingError> {
		let _guard = self.context.enter();
		loop {
			let batch = self.inner.pending.drain();
			if batch.is_empty() {
				return Ok(());
			}
			for work in batch {
				work.await?;
			}
		}
	}
}

/// Runs a producing pass: executes `body` under a fresh scope of `ctx`.
pub fn render(ctx: &Rc<RenderContext>, body: impl FnOnce(&mut BuildScope)) -> RenderedPass {
	let pass = PassInner::new(Rc::clone(ctx), HashMap::new(), Diagnostics::new());
	let roots = {
		let _guard = ctx.enter();
		let root_component = ctx.next_component_id();
		let mut scope = BuildScope::new(&pass, root_component, Strategy::Produce);
		body(&mut scope);
		scope.finish()
	};
	RenderedPass {
		inner: pass,
		context: Rc::clone(ctx),
		roots,
	}
}

/// Captures a settled producing pass into a hydration payload.
pub async fn capture(pass: &RenderedPass) -> Result<HydrationPayload, CaptureError> {
	pass.settle().await?;

	let mut components = BTreeMap::new();
	for record in pass.inner.components.borrow().iter() {
		let own_id = record.id.clone();
		let map = StructureMap::build(&record.tracked, |node| {
			markers::boundary_id(node).filter(|id| *id != own_id)
		});
		components.insert(record.id.clone(), map);
	}

	let registry = pass.context.registry();
	let mut graph = DependencyGraph::capture(registry);
	// Dangling edges cannot break replay; cycles can, and fail the pass.
	graph.drop_dangling_edges();
	graph.validate()?;

	Ok(HydrationPayload {
		context_id: pass.context.context_id(),
		observables: registry.serialize_root_values(),
		components,
	})
}

/// The outcome of one reconciliation pass.
#[derive(Debug)]
pub struct LiveTree {
	/// Root nodes of the live tree (reused where possible).
	pub roots: Vec<NodeRef>,
	/// The context the consuming pass ran under.
	pub context: Rc<RenderContext>,
	/// Every structural mismatch observed, in emission order.
	pub diagnostics: Vec<Diagnostic>,
	/// Tracked nodes reused from the pre-rendered tree.
	pub reused: usize,
	/// Tracked nodes constructed fresh.
	pub created: usize,
}

/// Runs a consuming pass, reconciling `body` against `physical_roots`.
///
/// With a payload, the context replays the producer's id assignment and
/// restored observable values are seeded before `body` runs. Without one,
/// this is a plain render.
pub fn reconcile(
	payload: Option<HydrationPayload>,
	physical_roots: Vec<NodeRef>,
	body: impl FnOnce(&mut BuildScope),
) -> LiveTree {
	let diagnostics = Diagnostics::new();
	let (context, maps, hydrating) = match payload {
		Some(payload) => {
			let context = RenderContext::new(payload.context_id);
			for (id, value) in payload.observables {
				context.registry().seed(id, value);
			}
			let maps: HashMap<String, Rc<StructureMap>> = payload
				.components
				.into_iter()
				.map(|(id, map)| (id, Rc::new(map)))
				.collect();
			(context, maps, true)
		}
		None => (RenderContext::new(0), HashMap::new(), false),
	};

	let pass = PassInner::new(Rc::clone(&context), maps, diagnostics.clone());
	let roots = {
		let _guard = context.enter();
		let root_component = context.next_component_id();
		let strategy = if hydrating {
			pass.strategy_for(&root_component, physical_roots)
		} else {
			Strategy::Produce
		};
		let mut scope = BuildScope::new(&pass, root_component, strategy);
		body(&mut scope);
		scope.finish()
	};

	LiveTree {
		roots,
		context,
		diagnostics: diagnostics.take(),
		reused: pass.reused.get(),
		created: pass.created.get(),
	}
}
