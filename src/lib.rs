//! Declarative extraction and classification of regions in a DOM-shaped tree.
//!
//! An author writes a **ruleset**: an unordered pile of rules, each mapping a
//! selector (its left-hand side) to annotations (its right-hand side):
//! types, multiplicatively combined scores, and arbitrary notes, all merged
//! onto per-element **fnodes**. Binding the ruleset to a document and asking
//! a question ("the highest-scoring fnode typed `titley`, please") makes the
//! engine plan and run the smallest sufficient subset of rules, in an order
//! that respects their data dependencies, caching everything it learns.
//!
//! ```text
//! rules ─ Ruleset::new ─▶ ruleset ─ against(doc) ─▶ bound ─ get(query) ─▶ fnodes
//!                         (indices)                (fnode store, caches)
//! ```
//!
//! The pieces:
//!
//! - [`dom`], [`of_type`], [`and`] + [`typ`], [`score`], [`note`], [`props`],
//!   [`out`]: the construction surface (see `api.rs`).
//! - [`Ruleset`] / [`BoundRuleset`]: compilation and per-document state.
//! - `engine`: query planning and execution.
//! - [`distance`] / [`clusters`]: tree proximity and grouping, usable
//!   standalone or through the `best_cluster` aggregate.
//! - [`Annealer`]: offline tuning of score coefficients.

#[macro_use]
mod macros;

mod api;
mod clusters;
mod dom;
mod engine;
mod error;
mod fnode;
mod optimize;
mod rule;
mod ruleset;

pub use api::{and, dom, note, of_type, out, props, rule, score, typ};
pub use clusters::{clusters, distance, distance_with, DistanceCosts};
pub use dom::{inner_text, select, ElementId, TreeDoc, TreeDocument};
pub use engine::RunDetails;
pub use error::{Error, Result};
pub use fnode::{Fnode, FnodeId, Note};
pub use optimize::{Annealable, Annealer};
pub use rule::{ClusterOpts, Fact, Lhs, Rhs, Rule};
pub use ruleset::{BoundRuleset, Query, Ruleset};

/// A user-chosen label: the namespace over which scores, notes, and type
/// selection are keyed.
pub type Type = &'static str;
