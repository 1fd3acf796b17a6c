//! In-memory rendered-output tree for Grappelli.
//!
//! This crate is the concrete "rendered-output tree provider" the hydration
//! core works against: a small node tree with a queryable kind, a textual
//! payload, parent/child navigation, and a component-boundary tag. Handles
//! are cheap `Rc`-backed clones, so a node can be held by the live tree and
//! by a resolver at the same time, the way a browser element handle would be.
//!
//! The tree deliberately stops short of a markup serializer; equivalence is
//! asserted structurally, not byte-wise.

mod node;

pub use node::{DomError, NodeKind, NodeRef};
