//! Plan execution.
//!
//! Walks a plan leaves-first, materializing each rule's LHS matches and
//! merging the resulting facts onto fnodes. All mutation of the bound
//! ruleset's state happens here:
//!
//! ```text
//! for rule in plan:                 (inward rules only)
//!     inputs  = lhs_matches(rule)   de-duplicated by element
//!     facts   = rhs.fact(input)     one per input
//!     targets = apply_fact(..)      redirect / type / score / note
//!     done_inward += rule           run-at-most-once, enforced centrally
//!     by_type[t]  += targets        for every type each target now bears
//!
//! out rule:  matches -> through -> all_through -> query result
//! ```
//!
//! The run-at-most-once contract lives here and nowhere else: both LHS
//! caching and RHS redirection could otherwise re-enter a rule, and score
//! multiplication must happen exactly once per rule per fnode.

use crate::clusters;
use crate::dom::select;
use crate::error::{Error, Result};
use crate::fnode::FnodeId;
use crate::rule::{ClusterOpts, Fact, Lhs, LhsKind, Rule};
use crate::ruleset::{BoundRuleset, RuleId};
use crate::Type;

/// Run every planned inward rule, leaves first.
pub(crate) fn run_plan(bound: &mut BoundRuleset, plan: &[RuleId]) -> Result<()> {
    for &id in plan {
        run_inward(bound, id)?;
    }
    Ok(())
}

/// Run one inward rule and fold its facts into the store.
fn run_inward(bound: &mut BoundRuleset, id: RuleId) -> Result<()> {
    let ruleset = bound.ruleset;
    let rule = ruleset.rule(id);
    if bound.done_inward.contains(&id) {
        return Err(Error::DoubleExecution(rule.label()));
    }
    let doc = bound.doc;
    let inward = rule.rhs.as_inward().expect("planned rules are inward");

    let inputs = lhs_matches(bound, &rule.lhs)?;
    tracing::trace!(rule = %rule.label(), matches = inputs.len(), "running inward rule");

    // One rule's outputs are de-duplicated by fnode even when facts redirect
    // several inputs onto one element.
    let mut outputs: Vec<FnodeId> = Vec::new();
    for input in inputs {
        let fact = inward.fact(&bound.fnodes[input], doc);
        let target = apply_fact(bound, rule, input, fact)?;
        if !outputs.contains(&target) {
            outputs.push(target);
        }
    }

    bound.done_inward.insert(id);
    for &target in &outputs {
        let types: Vec<Type> = bound.fnodes[target].types().collect();
        for typ in types {
            bound.index_type(typ, target);
        }
    }
    Ok(())
}

/// Merge one fact per the data-model rules; returns the target fnode.
fn apply_fact(bound: &mut BoundRuleset, rule: &Rule, input: FnodeId, fact: Fact) -> Result<FnodeId> {
    let inferable = rule.lhs.inferable_type();
    let target = match fact.element {
        Some(el) => bound.fnode_for(el),
        None => input,
    };
    let effective = fact.typ.or(inferable);

    if fact.conserve_score {
        let source_type = inferable.ok_or_else(|| Error::ConserveScoreWithoutType(rule.label()))?;
        let conserved = bound.fnodes[input].score_for(source_type);
        let typ = effective.ok_or_else(|| Error::ScoreWithoutInferableType(rule.label()))?;
        bound.fnodes[target].multiply_score(typ, conserved);
    }
    if let Some(typ) = fact.typ {
        bound.fnodes[target].add_type(typ);
    }
    if let Some(factor) = fact.score {
        let typ = effective.ok_or_else(|| Error::ScoreWithoutInferableType(rule.label()))?;
        bound.fnodes[target].multiply_score(typ, factor);
    }
    if let Some(note) = fact.note {
        let typ = effective.ok_or_else(|| Error::NoteWithoutInferableType(rule.label()))?;
        bound.fnodes[target].set_note(typ, note)?;
    }
    Ok(target)
}

/// Run an outward rule: matches, then the sink's callbacks.
pub(crate) fn run_out_rule(bound: &mut BoundRuleset, id: RuleId) -> Result<Vec<FnodeId>> {
    let ruleset = bound.ruleset;
    let rule = ruleset.rule(id);
    let outward = rule.rhs.as_outward().expect("out rules publish to a sink");
    let doc = bound.doc;

    let mut ids = lhs_matches(bound, &rule.lhs)?;
    if let Some(through) = &outward.through {
        let mut mapped = Vec::new();
        for fid in ids {
            let redirected = through(&bound.fnodes[fid], doc);
            if let Some(el) = redirected {
                mapped.push(bound.fnode_for(el));
            }
        }
        ids = mapped;
    }
    if let Some(all_through) = &outward.all_through {
        ids = all_through(ids, bound);
    }
    tracing::debug!(key = outward.key, results = ids.len(), "out rule published");
    Ok(ids)
}

/// Run a query-supplied LHS after its plan has executed.
pub(crate) fn run_lhs_query(bound: &mut BoundRuleset, lhs: &Lhs) -> Result<Vec<FnodeId>> {
    lhs_matches(bound, lhs)
}

/// Materialize an LHS against the current store. Matches are unique by
/// element; predicates filter last.
fn lhs_matches(bound: &mut BoundRuleset, lhs: &Lhs) -> Result<Vec<FnodeId>> {
    let doc = bound.doc;
    let mut ids: Vec<FnodeId> = match &lhs.kind {
        LhsKind::Dom(selector) => {
            let elements = select(doc, selector)?;
            elements.into_iter().map(|el| bound.fnode_for(el)).collect()
        }
        LhsKind::OfType(typ) => bound.fnodes_of_type(*typ).to_vec(),
        LhsKind::Max(typ) => max_of_type(bound, *typ),
        LhsKind::BestCluster(typ, opts) => best_cluster_of_type(bound, *typ, opts),
        LhsKind::And(_) => {
            let types = lhs.and_types().expect("and() members validated at construction");
            and_matches(bound, &types)
        }
    };
    for predicate in &lhs.predicates {
        ids.retain(|&id| predicate(&bound.fnodes[id], doc));
    }
    Ok(ids)
}

/// All fnodes of `typ` sharing the maximum score, cached per type.
fn max_of_type(bound: &mut BoundRuleset, typ: Type) -> Vec<FnodeId> {
    if let Some(cached) = bound.max_cache.get(typ) {
        return cached.clone();
    }
    let mut best: Vec<FnodeId> = Vec::new();
    let mut best_score = f64::NEG_INFINITY;
    for &id in bound.fnodes_of_type(typ) {
        let score = bound.fnodes[id].score_for(typ);
        if score > best_score {
            best_score = score;
            best.clear();
            best.push(id);
        } else if score == best_score {
            best.push(id);
        }
    }
    bound.max_cache.insert(typ, best.clone());
    best
}

/// The cluster of `typ` fnodes whose scores sum highest, cached per type.
/// Zero fnodes of the type yield an empty result, not an error.
fn best_cluster_of_type(bound: &mut BoundRuleset, typ: Type, opts: &ClusterOpts) -> Vec<FnodeId> {
    if let Some(cached) = bound.cluster_cache.get(typ) {
        return cached.clone();
    }
    let doc = bound.doc;
    let ids = bound.fnodes_of_type(typ).to_vec();
    let best = if ids.is_empty() {
        Vec::new()
    } else {
        let fnodes = &bound.fnodes;
        let groups = clusters::clusters(&ids, opts.splitting_distance, |&a, &b| {
            clusters::distance(doc, fnodes[a].element(), fnodes[b].element(), &opts.costs)
        });
        let mut best_group: Vec<FnodeId> = Vec::new();
        let mut best_sum = f64::NEG_INFINITY;
        for group in groups {
            let total: f64 = group.iter().map(|&id| fnodes[id].score_for(typ)).sum();
            if total > best_sum {
                best_sum = total;
                best_group = group;
            }
        }
        best_group
    };
    bound.cluster_cache.insert(typ, best.clone());
    best
}

/// Fnodes bearing every listed type; iterates the smallest membership list.
fn and_matches(bound: &BoundRuleset, types: &[Type]) -> Vec<FnodeId> {
    let seed = match types.iter().copied().min_by_key(|&typ| bound.fnodes_of_type(typ).len()) {
        Some(typ) => typ,
        None => return Vec::new(),
    };
    bound
        .fnodes_of_type(seed)
        .iter()
        .copied()
        .filter(|&id| types.iter().all(|&typ| bound.fnodes[id].has_type(typ)))
        .collect()
}
