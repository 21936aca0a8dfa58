//! Query planning and execution.
//!
//! This module is the operational core of the crate. Answering a query is a
//! pipeline:
//!
//! ```text
//! rules (all) ──┐
//!               │  Ruleset::new            (ruleset.rs)
//!               └── emit/add/out indices
//!                               │
//! get(query) ───────────────────┼─ resolve to an out rule / synthetic LHS
//!                               v
//!                     planner::plan (planner.rs)
//!                       - walk prerequisite edges
//!                       - prune rules already done
//!                       - topo-sort, detect cycles
//!                               │
//!                               v
//!                     executor::run_plan (executor.rs)
//!                       - materialize LHS matches
//!                       - merge facts onto fnodes
//!                       - maintain by-type and aggregate caches
//!                               │
//!                               v
//!                     sink callbacks -> Vec<FnodeId>
//! ```
//!
//! ## Responsibilities by module
//!
//! - `planner.rs`: turns the prerequisite relation into a concrete,
//!   deterministic execution order for one query, failing fast on cycles.
//! - `executor.rs`: runs the plan leaves-first, enforcing that an inward rule
//!   runs at most once per bound ruleset (score multiplication is not
//!   idempotent), then drives the outward rule's callbacks.
//! - `metrics.rs`: opt-in timing/count data for a run; the plain `get` path
//!   allocates nothing extra.

#[path = "engine/executor.rs"]
pub(crate) mod executor;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/planner.rs"]
pub(crate) mod planner;

pub use metrics::RunDetails;
