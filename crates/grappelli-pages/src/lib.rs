//! Grappelli Pages: hydration core
//!
//! A component tree is executed twice: once ahead of time, producing a
//! rendered node tree plus a compact description of execution order and
//! reactive-state dependencies, and once live in the consuming environment.
//! This crate reconciles the two into a single live tree that reuses the
//! pre-rendered nodes instead of rebuilding them, with the reactive state
//! that produced the output restored exactly.
//!
//! ## Architecture
//!
//! ```text
//! producing pass                       consuming pass
//! ──────────────                       ──────────────
//! render(ctx, body)                    reconcile(payload, roots, body)
//!   │ nodes recorded in creation order   │ context counters replayed
//!   ▼                                    │ observables seeded
//! capture(&pass)                         ▼
//!   │ settle deferred work             claims: map-driven resolution,
//!   │ structure maps per component     or sequential cursor fallback
//!   │ dependency graph validated         │ mismatch → fallback subtree
//!   ▼                                    ▼
//! HydrationPayload ──── wire (JSON) ──▶ LiveTree + diagnostics
//! ```
//!
//! Key modules:
//!
//! - [`context`]: per-request [`RenderContext`] with replay-stable counters
//! - [`structure`]: flat [`StructureMap`] encoding of one pass's topology
//! - [`resolve`] / [`cursor`]: the two node-resolution strategies
//! - [`fallback`]: transient-state preservation across reconstruction
//! - [`graph`]: dependency-graph capture and validation
//! - [`payload`]: the wire-shaped [`HydrationPayload`]
//! - [`driver`]: [`render`] / [`capture`] / [`reconcile`]
//!
//! Divergence between the two executions is not an error condition: it is
//! recovered per subtree and reported through the diagnostics channel.

pub mod context;
pub mod cursor;
pub mod diagnostics;
pub mod driver;
pub mod fallback;
pub mod graph;
pub mod markers;
pub mod pass;
pub mod payload;
pub mod resolve;
pub mod structure;

pub use context::RenderContext;
pub use cursor::{Claim, HydrationCursor};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use driver::{CaptureError, LiveTree, RenderedPass, capture, reconcile, render};
pub use fallback::{FieldState, TransientState};
pub use graph::{DependencyGraph, GraphError, GraphNode};
pub use pass::{BuildScope, DeferQueue, PendingError};
pub use payload::{HydrationPayload, STATE_VAR};
pub use resolve::{Resolution, resolve};
pub use structure::{KindTag, MapEntry, StructureMap, StructureMapError};

// Re-export the collaborating crates for single-import consumers.
pub use grappelli_dom as dom;
pub use grappelli_reactive as reactive;
