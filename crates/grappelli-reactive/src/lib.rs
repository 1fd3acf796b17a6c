//! Reactive cells for Grappelli.
//!
//! The reactive system here is intentionally narrow: it provides the state
//! primitive the hydration core serializes and restores, not a full
//! change-propagation scheduler.
//!
//! - [`Cell`]: a root observable holding an independent value. Serialized
//!   during capture, restored by creation-order replay during hydration.
//! - [`Derived`]: a computed observable. Never serialized; recomputed on
//!   demand once its root dependencies are restored.
//! - [`Registry`]: the per-pass collector that assigns deterministic
//!   [`CellId`]s in creation order, records root/derived classification and
//!   parent edges, and holds seeded values waiting to be adopted.
//!
//! A registry is installed for the duration of one pass with an explicit
//! guard; concurrent passes on other threads each install their own, so id
//! counters are never shared.
//!
//! ## Example
//!
//! ```ignore
//! let registry = Registry::new();
//! let _guard = registry.install();
//!
//! let count = Cell::new(5);
//! let doubled = Derived::new({
//! 	let count = count.clone();
//! 	move || count.get() * 2
//! });
//!
//! assert_eq!(doubled.get(), 10);
//! ```

mod cell;
mod registry;

pub use cell::{Cell, Derived};
pub use registry::{CellId, CellSnapshot, ParseCellIdError, Registry, RegistryGuard};
