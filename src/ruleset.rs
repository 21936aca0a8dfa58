//! Rule collections, unbound and bound.
//!
//! [`Ruleset::new`] is the compile step: it validates every rule and derives
//! the indices the planner needs (which rules may emit or add each type, and
//! which outward rule owns each key). The ruleset is immutable afterwards and
//! can be bound to any number of documents.
//!
//! [`Ruleset::against`] produces a [`BoundRuleset`]: the per-document mutable
//! state (the fnode arena, the per-type membership lists, the aggregate
//! caches, and the set of inward rules that have already run). All queries go
//! through [`BoundRuleset::get`].

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::dom::{ElementId, TreeDoc};
use crate::engine::{executor, planner, RunDetails};
use crate::error::{Error, Result};
use crate::fnode::{Fnode, FnodeId};
use crate::rule::{Lhs, Rule};
use crate::Type;

/// Rule identifier (index into the rules vector, i.e. insertion order).
pub(crate) type RuleId = usize;

/// An immutable, validated collection of rules with precomputed indices.
pub struct Ruleset {
    rules: Vec<Rule>,
    /// Rules that may yield (or leave intact) a fact bearing the type.
    emitters_by_type: HashMap<Type, Vec<RuleId>>,
    /// Emitters that may introduce the type on an fnode that lacked it.
    adders_by_type: HashMap<Type, Vec<RuleId>>,
    out_rules: HashMap<&'static str, RuleId>,
}

impl Ruleset {
    /// Validate `rules` and build the emit/add/out indices.
    pub fn new(rules: Vec<Rule>) -> Result<Self> {
        let mut emitters_by_type: HashMap<Type, Vec<RuleId>> = HashMap::new();
        let mut adders_by_type: HashMap<Type, Vec<RuleId>> = HashMap::new();
        let mut out_rules: HashMap<&'static str, RuleId> = HashMap::new();

        for (id, rule) in rules.iter().enumerate() {
            rule.validate()?;
            for typ in rule.could_emit()? {
                emitters_by_type.entry(typ).or_default().push(id);
            }
            for typ in rule.could_add()? {
                adders_by_type.entry(typ).or_default().push(id);
            }
            if let Some(key) = rule.out_key() {
                if out_rules.insert(key, id).is_some() {
                    return Err(Error::DuplicateOutKey(key.to_string()));
                }
            }
        }

        Ok(Ruleset { rules, emitters_by_type, adders_by_type, out_rules })
    }

    /// The rules in insertion order. Feeding these back to [`Ruleset::new`]
    /// yields a ruleset that behaves identically on every query.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Bind this ruleset to a document, producing fresh per-document state.
    pub fn against<'a>(&'a self, doc: &'a dyn TreeDoc) -> BoundRuleset<'a> {
        BoundRuleset {
            ruleset: self,
            doc,
            fnodes: Vec::new(),
            by_element: HashMap::new(),
            by_type: HashMap::new(),
            max_cache: HashMap::new(),
            cluster_cache: HashMap::new(),
            done_inward: HashSet::new(),
        }
    }

    pub(crate) fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    pub(crate) fn emitters_of(&self, typ: Type) -> &[RuleId] {
        self.emitters_by_type.get(typ).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn adders_of(&self, typ: Type) -> &[RuleId] {
        self.adders_by_type.get(typ).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn out_rule(&self, key: &str) -> Option<RuleId> {
        self.out_rules.get(key).copied()
    }
}

/// What to ask a bound ruleset for.
pub enum Query {
    /// Run the outward rule with this key and return its sink output.
    Out(&'static str),
    /// Synthesize an outward rule around an LHS and return its matches.
    Lhs(Lhs),
    /// Return the fnode for an element without running any rules. The fnode
    /// may be missing annotations that rules would have added.
    Element(ElementId),
}

impl From<&'static str> for Query {
    fn from(key: &'static str) -> Query {
        Query::Out(key)
    }
}

impl From<Lhs> for Query {
    fn from(lhs: Lhs) -> Query {
        Query::Lhs(lhs)
    }
}

impl From<ElementId> for Query {
    fn from(el: ElementId) -> Query {
        Query::Element(el)
    }
}

/// A ruleset bound to one document: the fnode store plus every cache one
/// query session accumulates. Dropping it discards all annotations.
pub struct BoundRuleset<'a> {
    pub(crate) ruleset: &'a Ruleset,
    pub(crate) doc: &'a dyn TreeDoc,
    pub(crate) fnodes: Vec<Fnode>,
    pub(crate) by_element: HashMap<ElementId, FnodeId>,
    /// Built lazily as inward rules execute.
    pub(crate) by_type: HashMap<Type, Vec<FnodeId>>,
    pub(crate) max_cache: HashMap<Type, Vec<FnodeId>>,
    pub(crate) cluster_cache: HashMap<Type, Vec<FnodeId>>,
    pub(crate) done_inward: HashSet<RuleId>,
}

impl<'a> BoundRuleset<'a> {
    /// Answer a query, executing exactly the rules it transitively needs.
    /// Inward rules that already ran are skipped; aggregate caches are reused.
    pub fn get(&mut self, query: impl Into<Query>) -> Result<Vec<FnodeId>> {
        self.get_with_details(query).map(|(ids, _)| ids)
    }

    /// Like [`get`](Self::get), but also report plan/execution timings and
    /// counts for profiling.
    pub fn get_with_details(&mut self, query: impl Into<Query>) -> Result<(Vec<FnodeId>, RunDetails)> {
        let total_start = Instant::now();
        match query.into() {
            Query::Element(el) => {
                let id = self.fnode_for(el);
                Ok((vec![id], RunDetails { total: total_start.elapsed(), results: 1, ..RunDetails::default() }))
            }
            Query::Out(key) => {
                let rule_id =
                    self.ruleset.out_rule(key).ok_or_else(|| Error::MissingOutKey(key.to_string()))?;
                let plan_start = Instant::now();
                let plan = planner::plan_for_rule(self.ruleset, &self.done_inward, rule_id)?;
                let plan_elapsed = plan_start.elapsed();

                let execute_start = Instant::now();
                executor::run_plan(self, &plan)?;
                let ids = executor::run_out_rule(self, rule_id)?;
                let details = RunDetails {
                    total: total_start.elapsed(),
                    plan: plan_elapsed,
                    execute: execute_start.elapsed(),
                    rules_planned: plan.len(),
                    rules_run: plan.len(),
                    results: ids.len(),
                };
                Ok((ids, details))
            }
            Query::Lhs(lhs) => {
                let plan_start = Instant::now();
                let plan = planner::plan_for_lhs(self.ruleset, &self.done_inward, &lhs)?;
                let plan_elapsed = plan_start.elapsed();

                let execute_start = Instant::now();
                executor::run_plan(self, &plan)?;
                let ids = executor::run_lhs_query(self, &lhs)?;
                let details = RunDetails {
                    total: total_start.elapsed(),
                    plan: plan_elapsed,
                    execute: execute_start.elapsed(),
                    rules_planned: plan.len(),
                    rules_run: plan.len(),
                    results: ids.len(),
                };
                Ok((ids, details))
            }
        }
    }

    pub fn fnode(&self, id: FnodeId) -> &Fnode {
        &self.fnodes[id]
    }

    pub fn doc(&self) -> &'a dyn TreeDoc {
        self.doc
    }

    /// Fnode for `el`, created on first lookup. A second lookup returns the
    /// same fnode.
    pub(crate) fn fnode_for(&mut self, el: ElementId) -> FnodeId {
        if let Some(&id) = self.by_element.get(&el) {
            return id;
        }
        let id = self.fnodes.len();
        self.fnodes.push(Fnode::new(el));
        self.by_element.insert(el, id);
        id
    }

    pub(crate) fn fnodes_of_type(&self, typ: Type) -> &[FnodeId] {
        self.by_type.get(typ).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn index_type(&mut self, typ: Type, id: FnodeId) {
        let list = self.by_type.entry(typ).or_default();
        if !list.contains(&id) {
            list.push(id);
        }
    }
}
