//! Per-pass cell registry.
//!
//! The registry is the collector one render pass uses to account for every
//! reactive cell created while it runs. Ids are handed out from a plain
//! counter, so a consuming pass that replays the same construction sequence
//! observes the same ids; that replay is the whole restore mechanism.

use std::cell::{Cell as RawCell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Identifier of a reactive cell within one render context.
///
/// Assigned in creation order from the active [`Registry`]; stable across a
/// producing pass and a consuming pass that replays the same construction
/// sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellId(u64);

impl CellId {
	/// The raw counter value.
	pub fn as_u64(self) -> u64 {
		self.0
	}
}

impl fmt::Display for CellId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Error parsing a [`CellId`] from its wire form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cell id: {0:?}")]
pub struct ParseCellIdError(pub String);

impl FromStr for CellId {
	type Err = ParseCellIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.parse::<u64>()
			.map(CellId)
			.map_err(|_| ParseCellIdError(s.to_string()))
	}
}

pub(crate) type SerializeFn = Box<dyn Fn() -> Option<serde_json::Value>>;
pub(crate) type RestoreFn = Box<dyn Fn(&serde_json::Value) -> bool>;

pub(crate) struct CellRecord {
	pub(crate) is_derived: bool,
	pub(crate) skip_serialize: bool,
	pub(crate) parents: Vec<CellId>,
	pub(crate) serialize: Option<SerializeFn>,
	pub(crate) restore: Option<RestoreFn>,
}

/// A serialization-free view of one registered cell, used to capture the
/// dependency graph without touching cell values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellSnapshot {
	/// The cell's replay-stable id.
	pub id: CellId,
	/// Whether the cell was constructed as a transform of other cells.
	pub is_derived: bool,
	/// Whether the cell opted out of serialization.
	pub skip_serialize: bool,
	/// Ids of the cells this cell reads.
	pub parents: Vec<CellId>,
}

/// The per-pass cell collector.
///
/// One registry belongs to one render context; it is installed on the
/// current thread for the duration of a pass and never shared across
/// threads, so concurrent requests cannot observe each other's counters.
pub struct Registry {
	next_id: RawCell<u64>,
	records: RefCell<BTreeMap<CellId, CellRecord>>,
	/// Stack of currently-computing derived cells; `None` frames suppress tracking.
	observers: RefCell<Vec<Option<CellId>>>,
	/// Restored values waiting for their cell to be re-created by replay.
	seeds: RefCell<BTreeMap<CellId, serde_json::Value>>,
}

thread_local! {
	static ACTIVE: RefCell<Vec<Rc<Registry>>> = const { RefCell::new(Vec::new()) };
}

impl Registry {
	/// Creates an empty registry.
	pub fn new() -> Rc<Self> {
		Rc::new(Self {
			next_id: RawCell::new(0),
			records: RefCell::new(BTreeMap::new()),
			observers: RefCell::new(Vec::new()),
			seeds: RefCell::new(BTreeMap::new()),
		})
	}

	/// Installs this registry as the active one on the current thread.
	///
	/// The returned guard uninstalls it on drop. Installs nest; the most
	/// recently installed registry wins.
	pub fn install(self: &Rc<Self>) -> RegistryGuard {
		ACTIVE.with(|stack| stack.borrow_mut().push(Rc::clone(self)));
		RegistryGuard { _private: () }
	}

	/// The registry currently installed on this thread, if any.
	pub fn active() -> Option<Rc<Registry>> {
		ACTIVE.with(|stack| stack.borrow().last().cloned())
	}

	/// Hands out the next creation-order id.
	pub fn allocate(&self) -> CellId {
		let id = CellId(self.next_id.get());
		self.next_id.set(id.0 + 1);
		id
	}

	pub(crate) fn register(&self, id: CellId, record: CellRecord) {
		self.records.borrow_mut().insert(id, record);
	}

	/// Records `id` as a parent of the currently-computing derived cell.
	pub fn track(&self, id: CellId) {
		let observers = self.observers.borrow();
		let Some(Some(observer)) = observers.last().copied() else {
			return;
		};
		drop(observers);
		if observer == id {
			return;
		}
		let mut records = self.records.borrow_mut();
		if let Some(record) = records.get_mut(&observer) {
			if !record.parents.contains(&id) {
				record.parents.push(id);
			}
		}
	}

	pub(crate) fn push_observer(&self, observer: Option<CellId>) {
		self.observers.borrow_mut().push(observer);
	}

	pub(crate) fn pop_observer(&self) {
		self.observers.borrow_mut().pop();
	}

	/// Runs `f` with dependency tracking suppressed.
	pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
		self.push_observer(None);
		let result = f();
		self.pop_observer();
		result
	}

	/// Feeds one restored value into the registry.
	///
	/// When a cell is already registered under `id` (a previous hydration
	/// attempt on the same context), its value is updated in place.
	/// Otherwise the value is stashed and adopted by the cell that replay
	/// creates under this id.
	pub fn seed(&self, id: CellId, value: serde_json::Value) {
		let records = self.records.borrow();
		if let Some(record) = records.get(&id) {
			if let Some(restore) = &record.restore {
				if !restore(&value) {
					tracing::warn!(cell = %id, "restored value rejected by existing cell");
				}
				return;
			}
			tracing::warn!(cell = %id, "restored value targets a non-restorable cell");
			return;
		}
		drop(records);
		self.seeds.borrow_mut().insert(id, value);
	}

	pub(crate) fn take_seed(&self, id: CellId) -> Option<serde_json::Value> {
		self.seeds.borrow_mut().remove(&id)
	}

	/// The number of cells registered so far.
	pub fn cell_count(&self) -> usize {
		self.records.borrow().len()
	}

	/// Captures the id / classification / parent view of every cell.
	pub fn snapshot(&self) -> Vec<CellSnapshot> {
		self.records
			.borrow()
			.iter()
			.map(|(id, record)| CellSnapshot {
				id: *id,
				is_derived: record.is_derived,
				skip_serialize: record.skip_serialize,
				parents: record.parents.clone(),
			})
			.collect()
	}

	/// Serializes every root (non-derived, non-opted-out) cell's value.
	pub fn serialize_root_values(&self) -> BTreeMap<CellId, serde_json::Value> {
		let records = self.records.borrow();
		let mut values = BTreeMap::new();
		for (id, record) in records.iter() {
			if record.is_derived || record.skip_serialize {
				continue;
			}
			let Some(serialize) = &record.serialize else {
				continue;
			};
			match serialize() {
				Some(value) => {
					values.insert(*id, value);
				}
				None => {
					tracing::warn!(cell = %id, "root cell value failed to serialize, omitted");
				}
			}
		}
		values
	}
}

/// Uninstalls a registry when dropped.
pub struct RegistryGuard {
	_private: (),
}

impl Drop for RegistryGuard {
	fn drop(&mut self) {
		ACTIVE.with(|stack| {
			stack.borrow_mut().pop();
		});
	}
}
