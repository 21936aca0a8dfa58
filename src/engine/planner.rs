//! Rule-graph planning.
//!
//! Given a query, decide which rules must run and in what order. The
//! prerequisite relation is derived from each rule's type metadata:
//!
//! - For every type a rule *finalizes* (aggregates over, changes away from,
//!   or publishes out of the system), every rule that may **emit** that type
//!   must run first: the scores it reads have to be complete.
//! - For every other mentioned type, only the rules that may **add** the type
//!   must run first; scoring and noting by other rules commute, so they can
//!   land in any order.
//!
//! ```text
//! out("best") ── finalizes "titley" ──▶ emitters("titley")
//!                                          ├─ dom(..) -> typ("titley")     (adder)
//!                                          └─ of_type("titley") -> score   (emitter)
//! ```
//!
//! A rule is never its own prerequisite: its own contribution lands when it
//! runs. Rules already marked done on the bound ruleset are pruned together
//! with their entire subtree (their prerequisites ran before they did).
//!
//! The plan is emitted leaves-first, so the executor can walk it front to
//! back. Ties between independent rules fall back to ruleset insertion order,
//! which is observable and therefore guaranteed.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::rule::{Lhs, Rule};
use crate::ruleset::{RuleId, Ruleset};
use crate::Type;

/// Plan everything the outward rule `root` needs. `root` itself is not part
/// of the plan; the executor runs it separately once the plan has finished.
pub(crate) fn plan_for_rule(ruleset: &Ruleset, done: &HashSet<RuleId>, root: RuleId) -> Result<Vec<RuleId>> {
    plan(ruleset, done, &prerequisites(ruleset, ruleset.rule(root), Some(root)))
}

/// Plan for a query-supplied LHS. The synthesized outward rule around it
/// finalizes every type the LHS mentions, exactly like a real sink.
pub(crate) fn plan_for_lhs(ruleset: &Ruleset, done: &HashSet<RuleId>, lhs: &Lhs) -> Result<Vec<RuleId>> {
    plan(ruleset, done, &prerequisites_for_types(ruleset, &lhs.mentioned_types(), &[], None))
}

/// Direct prerequisites of one rule, in ruleset insertion order.
fn prerequisites(ruleset: &Ruleset, rule: &Rule, exclude: Option<RuleId>) -> Vec<RuleId> {
    let finalized = rule.finalized_types();
    let mentioned = rule.mentioned_types();
    let nonfinal: Vec<Type> = mentioned.into_iter().filter(|typ| !finalized.contains(typ)).collect();
    prerequisites_for_types(ruleset, &finalized, &nonfinal, exclude)
}

fn prerequisites_for_types(
    ruleset: &Ruleset,
    finalized: &[Type],
    nonfinal: &[Type],
    exclude: Option<RuleId>,
) -> Vec<RuleId> {
    let mut ids: Vec<RuleId> = Vec::new();
    for &typ in finalized {
        ids.extend_from_slice(ruleset.emitters_of(typ));
    }
    for &typ in nonfinal {
        ids.extend_from_slice(ruleset.adders_of(typ));
    }
    ids.sort_unstable();
    ids.dedup();
    if let Some(skip) = exclude {
        ids.retain(|&id| id != skip);
    }
    ids
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    InProgress,
    Planned,
}

/// Depth-first topological sort over the prerequisite graph, leaves first.
/// Fails with [`Error::Cycle`] before anything has executed.
fn plan(ruleset: &Ruleset, done: &HashSet<RuleId>, seeds: &[RuleId]) -> Result<Vec<RuleId>> {
    let mut marks: HashMap<RuleId, Mark> = HashMap::new();
    let mut order: Vec<RuleId> = Vec::new();
    for &seed in seeds {
        visit(ruleset, done, seed, &mut marks, &mut order)?;
    }
    tracing::debug!(planned = order.len(), "execution plan ready");
    Ok(order)
}

fn visit(
    ruleset: &Ruleset,
    done: &HashSet<RuleId>,
    id: RuleId,
    marks: &mut HashMap<RuleId, Mark>,
    order: &mut Vec<RuleId>,
) -> Result<()> {
    if done.contains(&id) {
        return Ok(());
    }
    match marks.get(&id) {
        Some(Mark::InProgress) => return Err(Error::Cycle(ruleset.rule(id).label())),
        Some(Mark::Planned) => return Ok(()),
        None => {}
    }
    marks.insert(id, Mark::InProgress);
    for prerequisite in prerequisites(ruleset, ruleset.rule(id), Some(id)) {
        visit(ruleset, done, prerequisite, marks, order)?;
    }
    marks.insert(id, Mark::Planned);
    order.push(id);
    Ok(())
}
