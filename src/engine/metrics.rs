//! Query run details.
//!
//! [`RunDetails`] is the opt-in observability surface for one `get`:
//!
//! - `BoundRuleset::get` for normal operation.
//! - `BoundRuleset::get_with_details` for profiling and for inspecting how
//!   much of the ruleset a query actually pulled in.
//!
//! Details are collected from data the engine computes anyway, so the plain
//! path pays nothing beyond two clock reads.

use std::time::Duration;

/// Timings and counts for a single query.
#[derive(Debug, Default, Clone)]
pub struct RunDetails {
    /// Total elapsed time for the `get`.
    pub total: Duration,
    /// Time spent computing the execution plan.
    pub plan: Duration,
    /// Time spent executing rules and sink callbacks.
    pub execute: Duration,
    /// Inward rules the planner selected (after pruning already-done rules).
    pub rules_planned: usize,
    /// Inward rules actually executed this call.
    pub rules_run: usize,
    /// Number of fnodes in the query result.
    pub results: usize,
}
