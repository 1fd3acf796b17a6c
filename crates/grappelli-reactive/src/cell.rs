//! `Cell` and `Derived`: the two observable flavors.
//!
//! Classification happens at construction time and never changes: a value
//! built from other cells is derived, everything else is a root. Only roots
//! are ever serialized; a derived value is recomputed from its closure on
//! every read, which keeps the hydration payload proportional to the amount
//! of independent state.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::registry::{CellId, CellRecord, Registry, RestoreFn, SerializeFn};

/// A root observable: a piece of independent reactive state.
///
/// `Cell<T>` is a cheap clone; all clones share the same value. When a
/// registry is active at construction time the cell registers itself under
/// the next creation-order id, and adopts a seeded (restored) value for
/// that id when one is waiting.
#[derive(Clone)]
pub struct Cell<T: 'static> {
	id: Option<CellId>,
	value: Rc<RefCell<T>>,
}

impl<T: Serialize + DeserializeOwned + 'static> Cell<T> {
	/// Creates a root cell, registering it with the active registry.
	///
	/// When the active registry holds a seeded value for the assigned id
	/// (a consuming pass replaying a capture), that value wins over
	/// `initial`.
	pub fn new(initial: T) -> Self {
		let Some(registry) = Registry::active() else {
			return Self::detached(initial);
		};
		let id = registry.allocate();
		let seeded = registry.take_seed(id).and_then(|raw| {
			match serde_json::from_value::<T>(raw) {
				Ok(value) => Some(value),
				Err(err) => {
					tracing::warn!(cell = %id, %err, "seeded value failed to deserialize, keeping initial");
					None
				}
			}
		});
		let value = Rc::new(RefCell::new(seeded.unwrap_or(initial)));
		let serialize: SerializeFn = {
			let value = Rc::clone(&value);
			Box::new(move || serde_json::to_value(&*value.borrow()).ok())
		};
		let restore: RestoreFn = {
			let value = Rc::clone(&value);
			Box::new(move |raw: &serde_json::Value| {
				match serde_json::from_value::<T>(raw.clone()) {
					Ok(restored) => {
						*value.borrow_mut() = restored;
						true
					}
					Err(_) => false,
				}
			})
		};
		registry.register(
			id,
			CellRecord {
				is_derived: false,
				skip_serialize: false,
				parents: Vec::new(),
				serialize: Some(serialize),
				restore: Some(restore),
			},
		);
		Self {
			id: Some(id),
			value,
		}
	}
}

impl<T: 'static> Cell<T> {
	/// Creates a root cell that opts out of serialization.
	///
	/// Ephemeral cells participate in id assignment and the dependency
	/// graph but never appear in a captured payload; use them for state
	/// that is meaningless to replay (timers, connection handles).
	pub fn ephemeral(initial: T) -> Self {
		let Some(registry) = Registry::active() else {
			return Self::detached(initial);
		};
		let id = registry.allocate();
		registry.register(
			id,
			CellRecord {
				is_derived: false,
				skip_serialize: true,
				parents: Vec::new(),
				serialize: None,
				restore: None,
			},
		);
		Self {
			id: Some(id),
			value: Rc::new(RefCell::new(initial)),
		}
	}

	fn detached(initial: T) -> Self {
		Self {
			id: None,
			value: Rc::new(RefCell::new(initial)),
		}
	}

	/// The id assigned by the registry, when one was active at creation.
	pub fn id(&self) -> Option<CellId> {
		self.id
	}

	/// Reads the current value, recording a dependency on this cell when a
	/// derived cell is computing.
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		if let (Some(id), Some(registry)) = (self.id, Registry::active()) {
			registry.track(id);
		}
		self.get_untracked()
	}

	/// Reads the current value without recording a dependency.
	pub fn get_untracked(&self) -> T
	where
		T: Clone,
	{
		self.value.borrow().clone()
	}

	/// Replaces the value.
	pub fn set(&self, value: T) {
		*self.value.borrow_mut() = value;
	}

	/// Mutates the value in place.
	pub fn update<F>(&self, f: F)
	where
		F: FnOnce(&mut T),
	{
		f(&mut self.value.borrow_mut());
	}
}

impl<T: fmt::Debug + 'static> fmt::Debug for Cell<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Cell")
			.field("id", &self.id)
			.field("value", &*self.value.borrow())
			.finish()
	}
}

/// A derived observable: a value computed from other cells.
///
/// The closure runs once at construction (under an observer frame, so the
/// registry learns its parent edges) and again on every [`Derived::get`].
/// Derived cells are never serialized.
#[derive(Clone)]
pub struct Derived<T: 'static> {
	id: Option<CellId>,
	compute: Rc<dyn Fn() -> T>,
}

impl<T: 'static> Derived<T> {
	/// Creates a derived cell from a transform closure.
	pub fn new(compute: impl Fn() -> T + 'static) -> Self {
		let compute: Rc<dyn Fn() -> T> = Rc::new(compute);
		let Some(registry) = Registry::active() else {
			return Self { id: None, compute };
		};
		let id = registry.allocate();
		registry.register(
			id,
			CellRecord {
				is_derived: true,
				skip_serialize: true,
				parents: Vec::new(),
				serialize: None,
				restore: None,
			},
		);
		// First run records parent edges for this id.
		registry.push_observer(Some(id));
		let _ = compute();
		registry.pop_observer();
		Self {
			id: Some(id),
			compute,
		}
	}

	/// The id assigned by the registry, when one was active at creation.
	pub fn id(&self) -> Option<CellId> {
		self.id
	}

	/// Recomputes and returns the value.
	///
	/// Reads performed by the transform are suppressed from tracking; a
	/// derived cell read inside another derived cell contributes itself,
	/// not its own parents, as the dependency.
	pub fn get(&self) -> T {
		let Some(registry) = Registry::active() else {
			return (self.compute)();
		};
		if let Some(id) = self.id {
			registry.track(id);
		}
		registry.untracked(|| (self.compute)())
	}
}

impl<T: 'static> fmt::Debug for Derived<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Derived").field("id", &self.id).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_cell_get_set_update() {
		let count = Cell::new(0);
		assert_eq!(count.get(), 0);
		count.set(42);
		assert_eq!(count.get(), 42);
		count.update(|n| *n += 1);
		assert_eq!(count.get_untracked(), 43);
	}

	#[test]
	fn test_cell_without_registry_is_detached() {
		let cell = Cell::new("loose".to_string());
		assert_eq!(cell.id(), None);
		assert_eq!(cell.get(), "loose");
	}

	#[test]
	fn test_ids_follow_creation_order() {
		let registry = Registry::new();
		let _guard = registry.install();

		let a = Cell::new(1);
		let b = Cell::new(2);
		let c = Derived::new(move || 3);

		assert_eq!(a.id().unwrap().as_u64(), 0);
		assert_eq!(b.id().unwrap().as_u64(), 1);
		assert_eq!(c.id().unwrap().as_u64(), 2);
	}

	#[test]
	fn test_derived_records_parents() {
		let registry = Registry::new();
		let _guard = registry.install();

		let count = Cell::new(5);
		let doubled = Derived::new({
			let count = count.clone();
			move || count.get() * 2
		});
		assert_eq!(doubled.get(), 10);

		let snapshot = registry.snapshot();
		let derived = snapshot
			.iter()
			.find(|cell| cell.id == doubled.id().unwrap())
			.unwrap();
		assert!(derived.is_derived);
		assert_eq!(derived.parents, vec![count.id().unwrap()]);

		let root = snapshot
			.iter()
			.find(|cell| cell.id == count.id().unwrap())
			.unwrap();
		assert!(!root.is_derived);
		assert!(root.parents.is_empty());
	}

	#[test]
	fn test_nested_derived_tracks_direct_dependency_only() {
		let registry = Registry::new();
		let _guard = registry.install();

		let count = Cell::new(2);
		let doubled = Derived::new({
			let count = count.clone();
			move || count.get() * 2
		});
		let quadrupled = Derived::new({
			let doubled = doubled.clone();
			move || doubled.get() * 2
		});
		assert_eq!(quadrupled.get(), 8);

		let snapshot = registry.snapshot();
		let outer = snapshot
			.iter()
			.find(|cell| cell.id == quadrupled.id().unwrap())
			.unwrap();
		assert_eq!(outer.parents, vec![doubled.id().unwrap()]);
	}

	#[test]
	fn test_serialize_roots_omits_derived_and_ephemeral() {
		let registry = Registry::new();
		let _guard = registry.install();

		let count = Cell::new(5);
		let _doubled = Derived::new({
			let count = count.clone();
			move || count.get() * 2
		});
		let _scratch: Cell<i32> = Cell::ephemeral(99);

		let values = registry.serialize_root_values();
		assert_eq!(values.len(), 1);
		assert_eq!(
			values.get(&count.id().unwrap()),
			Some(&serde_json::json!(5))
		);
	}

	#[test]
	fn test_seeded_value_wins_over_initial() {
		let registry = Registry::new();
		registry.seed("0".parse().unwrap(), serde_json::json!(7));
		let _guard = registry.install();

		let count = Cell::new(0);
		assert_eq!(count.get(), 7);
	}

	#[test]
	fn test_seed_updates_existing_cell_in_place() {
		let registry = Registry::new();
		let _guard = registry.install();

		let count = Cell::new(1);
		registry.seed(count.id().unwrap(), serde_json::json!(9));
		assert_eq!(count.get(), 9);
	}

	#[test]
	fn test_derived_recomputes_after_restore() {
		let registry = Registry::new();
		registry.seed("0".parse().unwrap(), serde_json::json!(5));
		let _guard = registry.install();

		let count = Cell::new(0);
		let doubled = Derived::new({
			let count = count.clone();
			move || count.get() * 2
		});
		assert_eq!(doubled.get(), 10);

		count.set(6);
		assert_eq!(doubled.get(), 12);
	}
}
