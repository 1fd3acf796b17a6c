//! Render context: per-request identity and counters.
//!
//! Everything that must replay identically between a producing pass and a
//! consuming pass hangs off one [`RenderContext`]: the cell registry (cell
//! id counter), the component id counter, and the boundary-marker cache.
//! A context is an explicit value created per request (there is no global
//! counter anywhere) and it is entered on the current thread for the
//! duration of a pass with a scope guard, the same discipline the registry
//! itself uses.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use grappelli_reactive::{Registry, RegistryGuard};

use crate::markers;

/// Per-request state holder with replay-stable counters.
pub struct RenderContext {
	context_id: u64,
	component_counter: Cell<u64>,
	registry: Rc<Registry>,
	markers: RefCell<HashMap<String, String>>,
}

impl std::fmt::Debug for RenderContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RenderContext")
			.field("context_id", &self.context_id)
			.field("component_counter", &self.component_counter)
			.field("markers", &self.markers)
			.finish_non_exhaustive()
	}
}

thread_local! {
	static ACTIVE: RefCell<Vec<Rc<RenderContext>>> = const { RefCell::new(Vec::new()) };
}

impl RenderContext {
	/// Creates a fresh context with zeroed counters.
	///
	/// A consuming pass must construct its context with the *producer's*
	/// `context_id` so replayed id assignment lines up.
	pub fn new(context_id: u64) -> Rc<Self> {
		Rc::new(Self {
			context_id,
			component_counter: Cell::new(0),
			registry: Registry::new(),
			markers: RefCell::new(HashMap::new()),
		})
	}

	/// The id shared by the producing and consuming passes of one request.
	pub fn context_id(&self) -> u64 {
		self.context_id
	}

	/// The cell registry owned by this context.
	pub fn registry(&self) -> &Rc<Registry> {
		&self.registry
	}

	/// Enters this context on the current thread.
	///
	/// Installs the context's registry as well, so cells created inside the
	/// pass register against it. The guard leaves the context on drop.
	pub fn enter(self: &Rc<Self>) -> ContextGuard {
		let registry_guard = self.registry.install();
		ACTIVE.with(|stack| stack.borrow_mut().push(Rc::clone(self)));
		ContextGuard {
			_registry: registry_guard,
		}
	}

	/// The context entered on this thread, if any.
	pub fn current() -> Option<Rc<RenderContext>> {
		ACTIVE.with(|stack| stack.borrow().last().cloned())
	}

	/// Hands out the next component id (`c0`, `c1`, ...).
	pub(crate) fn next_component_id(&self) -> String {
		let n = self.component_counter.get();
		self.component_counter.set(n + 1);
		format!("c{}", n)
	}

	/// The boundary-marker payload for a component id, cached per context.
	pub(crate) fn marker_for(&self, component_id: &str) -> String {
		self.markers
			.borrow_mut()
			.entry(component_id.to_string())
			.or_insert_with(|| markers::marker_text(component_id))
			.clone()
	}
}

/// Leaves the context (and uninstalls its registry) when dropped.
pub struct ContextGuard {
	_registry: RegistryGuard,
}

impl Drop for ContextGuard {
	fn drop(&mut self) {
		ACTIVE.with(|stack| {
			stack.borrow_mut().pop();
		});
	}
}
