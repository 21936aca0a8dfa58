//! Rule descriptors.
//!
//! A [`Rule`] pairs a left-hand side (which elements or typed fnodes to feed
//! in) with a right-hand side (what fact to merge back, or which named sink to
//! publish to). Both sides are immutable descriptors; all execution state
//! lives on the bound ruleset.
//!
//! Besides holding the user's closures, this module computes the static
//! metadata the planner orders rules by:
//!
//! - **mentioned** types: every type the LHS reads;
//! - **guaranteed** types: types certainly present on every match;
//! - **emitted / added** types: what the RHS may leave on or introduce to an
//!   fnode, derived from a [`TypeSpec`];
//! - **finalized** types: mentioned types whose scores must be complete
//!   before this rule runs (aggregates, type-changing rules, and sinks).

use std::sync::Arc;

use crate::clusters::DistanceCosts;
use crate::dom::{ElementId, TreeDoc};
use crate::error::{Error, Result};
use crate::fnode::{Fnode, FnodeId, Note};
use crate::ruleset::BoundRuleset;
use crate::Type;

pub type Predicate = Arc<dyn Fn(&Fnode, &dyn TreeDoc) -> bool + Send + Sync>;
pub type ScoreFn = Arc<dyn Fn(&Fnode, &dyn TreeDoc) -> f64 + Send + Sync>;
pub type NoteFn = Arc<dyn Fn(&Fnode, &dyn TreeDoc) -> Option<Note> + Send + Sync>;
pub type PropsFn = Arc<dyn Fn(&Fnode, &dyn TreeDoc) -> Fact + Send + Sync>;
pub type ThroughFn = Arc<dyn Fn(&Fnode, &dyn TreeDoc) -> Option<ElementId> + Send + Sync>;
pub type AllThroughFn = Arc<dyn Fn(Vec<FnodeId>, &BoundRuleset) -> Vec<FnodeId> + Send + Sync>;

/// What one RHS invocation asks the executor to do for one input fnode.
#[derive(Clone, Default)]
pub struct Fact {
    /// Redirect the fact onto another element's fnode instead of the input's.
    pub element: Option<ElementId>,
    /// Bear this type on the target (added if absent).
    pub typ: Option<Type>,
    /// Multiply the target's score for the effective type by this factor.
    pub score: Option<f64>,
    /// Set the note for the effective type.
    pub note: Option<Note>,
    /// Also multiply the input's score for the LHS type into the target.
    pub conserve_score: bool,
}

/// Options for the `best_cluster` aggregate.
#[derive(Clone, Debug)]
pub struct ClusterOpts {
    pub splitting_distance: f64,
    pub costs: DistanceCosts,
}

impl Default for ClusterOpts {
    fn default() -> Self {
        ClusterOpts { splitting_distance: 3.0, costs: DistanceCosts::default() }
    }
}

// --- Left-hand sides ----------------------------------------------------------

#[derive(Clone)]
pub(crate) enum LhsKind {
    /// Elements matching a selector, in document order. Guarantees no type.
    Dom(String),
    /// Fnodes currently bearing a type.
    OfType(Type),
    /// The top-scoring fnodes of a type (ties included). Aggregates.
    Max(Type),
    /// The highest-scoring cluster of a type's fnodes. Aggregates.
    BestCluster(Type, ClusterOpts),
    /// Fnodes bearing every listed type.
    And(Vec<Lhs>),
}

/// Selects the input fnodes for a rule. Built with [`crate::dom()`],
/// [`crate::of_type()`], or [`crate::and()`], then refined with the chainable
/// methods here.
#[derive(Clone)]
pub struct Lhs {
    pub(crate) kind: LhsKind,
    pub(crate) predicates: Vec<Predicate>,
}

impl Lhs {
    pub(crate) fn new(kind: LhsKind) -> Self {
        Lhs { kind, predicates: Vec::new() }
    }

    /// Aggregate: keep only the maximum-scoring fnodes of the type.
    ///
    /// # Panics
    /// If called on anything but a plain `of_type` selector.
    pub fn max(self) -> Lhs {
        match self.kind {
            LhsKind::OfType(typ) => Lhs { kind: LhsKind::Max(typ), predicates: self.predicates },
            _ => panic!("max() applies to of_type() selectors"),
        }
    }

    /// Aggregate: keep only the best-scoring cluster of the type's fnodes.
    ///
    /// # Panics
    /// If called on anything but a plain `of_type` selector.
    pub fn best_cluster(self, opts: ClusterOpts) -> Lhs {
        match self.kind {
            LhsKind::OfType(typ) => Lhs { kind: LhsKind::BestCluster(typ, opts), predicates: self.predicates },
            _ => panic!("best_cluster() applies to of_type() selectors"),
        }
    }

    /// Clone this selector with an additional post-filter over its matches.
    pub fn when(mut self, predicate: impl Fn(&Fnode, &dyn TreeDoc) -> bool + Send + Sync + 'static) -> Lhs {
        self.predicates.push(Arc::new(predicate));
        self
    }

    /// Types certainly present on every fnode this LHS yields.
    pub(crate) fn guaranteed_types(&self) -> Vec<Type> {
        match &self.kind {
            LhsKind::Dom(_) => Vec::new(),
            LhsKind::OfType(typ) | LhsKind::Max(typ) | LhsKind::BestCluster(typ, _) => vec![*typ],
            LhsKind::And(parts) => parts.iter().flat_map(|part| part.guaranteed_types()).collect(),
        }
    }

    /// The single type score/note application may default to, if unambiguous.
    pub(crate) fn inferable_type(&self) -> Option<Type> {
        let guaranteed = self.guaranteed_types();
        match guaranteed.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub(crate) fn mentioned_types(&self) -> Vec<Type> {
        self.guaranteed_types()
    }

    /// The type this LHS consumes an aggregate of, if any.
    pub(crate) fn aggregated_type(&self) -> Option<Type> {
        match &self.kind {
            LhsKind::Max(typ) | LhsKind::BestCluster(typ, _) => Some(*typ),
            _ => None,
        }
    }

    /// The member types of an `and()`, once validation has passed.
    pub(crate) fn and_types(&self) -> Option<Vec<Type>> {
        match &self.kind {
            LhsKind::And(parts) => parts
                .iter()
                .map(|part| match &part.kind {
                    LhsKind::OfType(typ) => Some(*typ),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    pub(crate) fn label(&self) -> String {
        match &self.kind {
            LhsKind::Dom(selector) => format!("dom({selector:?})"),
            LhsKind::OfType(typ) => format!("of_type({typ:?})"),
            LhsKind::Max(typ) => format!("of_type({typ:?}).max()"),
            LhsKind::BestCluster(typ, _) => format!("of_type({typ:?}).best_cluster(..)"),
            LhsKind::And(parts) => {
                let inner: Vec<String> = parts.iter().map(|part| part.label()).collect();
                format!("and({})", inner.join(", "))
            }
        }
    }
}

// --- Right-hand sides ---------------------------------------------------------

/// What the RHS declares about the types it may set on a fact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TypeSpec {
    /// The RHS never sets a type.
    Never,
    /// The RHS always sets exactly this type.
    Fixed(Type),
    /// A props function constrained by `type_in()`.
    In(Vec<Type>),
    /// A props function with no declaration; emission is undecidable.
    Unknown,
}

#[derive(Clone, Default)]
pub(crate) struct InwardRhs {
    pub typ: Option<Type>,
    pub score: Option<ScoreFn>,
    pub note: Option<NoteFn>,
    pub props: Option<PropsFn>,
    pub type_in: Option<Vec<Type>>,
    pub conserve: bool,
}

#[derive(Clone)]
pub(crate) struct OutwardRhs {
    pub key: &'static str,
    pub through: Option<ThroughFn>,
    pub all_through: Option<AllThroughFn>,
}

#[derive(Clone)]
pub(crate) enum RhsKind {
    Inward(InwardRhs),
    Outward(OutwardRhs),
}

/// Produces facts for a rule's matches (inward), or publishes them to a named
/// sink (outward). Built with [`crate::typ()`], [`crate::score()`],
/// [`crate::note()`], [`crate::props()`], or [`crate::out()`], then refined
/// with the chainable methods here. Chained setters win over the corresponding
/// field of a props-produced fact.
#[derive(Clone)]
pub struct Rhs {
    pub(crate) kind: RhsKind,
}

impl Rhs {
    pub(crate) fn inward(inner: InwardRhs) -> Self {
        Rhs { kind: RhsKind::Inward(inner) }
    }

    fn inward_mut(&mut self, method: &str) -> &mut InwardRhs {
        match &mut self.kind {
            RhsKind::Inward(inner) => inner,
            RhsKind::Outward(_) => panic!("{method}() does not apply to out() right-hand sides"),
        }
    }

    fn outward_mut(&mut self, method: &str) -> &mut OutwardRhs {
        match &mut self.kind {
            RhsKind::Outward(inner) => inner,
            RhsKind::Inward(_) => panic!("{method}() applies only to out() right-hand sides"),
        }
    }

    /// Bear `typ` on the target fnode.
    pub fn typ(mut self, typ: Type) -> Rhs {
        self.inward_mut("typ").typ = Some(typ);
        self
    }

    /// Multiply the effective type's score by a constant factor.
    pub fn score(mut self, factor: f64) -> Rhs {
        self.inward_mut("score").score = Some(Arc::new(move |_, _| factor));
        self
    }

    /// Multiply the effective type's score by a per-fnode factor.
    pub fn score_fn(mut self, f: impl Fn(&Fnode, &dyn TreeDoc) -> f64 + Send + Sync + 'static) -> Rhs {
        self.inward_mut("score_fn").score = Some(Arc::new(f));
        self
    }

    /// Attach a note to the effective type. Returning `None` is a no-op.
    pub fn note(mut self, f: impl Fn(&Fnode, &dyn TreeDoc) -> Option<Note> + Send + Sync + 'static) -> Rhs {
        self.inward_mut("note").note = Some(Arc::new(f));
        self
    }

    /// Declare the set of types a props function may emit.
    pub fn type_in(mut self, types: impl IntoIterator<Item = Type>) -> Rhs {
        self.inward_mut("type_in").type_in = Some(types.into_iter().collect());
        self
    }

    /// Also fold the input's score for the LHS type into the target.
    pub fn conserve_score(mut self) -> Rhs {
        self.inward_mut("conserve_score").conserve = true;
        self
    }

    /// Map each published fnode to another element, or drop it with `None`.
    pub fn through(mut self, f: impl Fn(&Fnode, &dyn TreeDoc) -> Option<ElementId> + Send + Sync + 'static) -> Rhs {
        self.outward_mut("through").through = Some(Arc::new(f));
        self
    }

    /// Transform the whole published sequence at once.
    pub fn all_through(mut self, f: impl Fn(Vec<FnodeId>, &BoundRuleset) -> Vec<FnodeId> + Send + Sync + 'static) -> Rhs {
        self.outward_mut("all_through").all_through = Some(Arc::new(f));
        self
    }

    pub(crate) fn as_inward(&self) -> Option<&InwardRhs> {
        match &self.kind {
            RhsKind::Inward(inner) => Some(inner),
            RhsKind::Outward(_) => None,
        }
    }

    pub(crate) fn as_outward(&self) -> Option<&OutwardRhs> {
        match &self.kind {
            RhsKind::Outward(inner) => Some(inner),
            RhsKind::Inward(_) => None,
        }
    }

    pub(crate) fn label(&self) -> String {
        match &self.kind {
            RhsKind::Inward(inner) => match inner.typ {
                Some(typ) => format!("typ({typ:?})"),
                None => "props(..)".to_string(),
            },
            RhsKind::Outward(outer) => format!("out({:?})", outer.key),
        }
    }
}

impl InwardRhs {
    /// Assemble the fact for one input fnode. Starts from the props function's
    /// fact (if any), then lets chained setters override field by field.
    pub(crate) fn fact(&self, fnode: &Fnode, doc: &dyn TreeDoc) -> Fact {
        let mut fact = match &self.props {
            Some(props) => props(fnode, doc),
            None => Fact::default(),
        };
        if let Some(typ) = self.typ {
            fact.typ = Some(typ);
        }
        if let Some(score) = &self.score {
            fact.score = Some(score(fnode, doc));
        }
        if let Some(note) = &self.note {
            if let Some(value) = note(fnode, doc) {
                fact.note = Some(value);
            }
        }
        if self.conserve {
            fact.conserve_score = true;
        }
        fact
    }

    pub(crate) fn type_spec(&self) -> TypeSpec {
        if let Some(typ) = self.typ {
            TypeSpec::Fixed(typ)
        } else if self.props.is_some() {
            match &self.type_in {
                Some(types) => TypeSpec::In(types.clone()),
                None => TypeSpec::Unknown,
            }
        } else {
            TypeSpec::Never
        }
    }
}

// --- Rules --------------------------------------------------------------------

/// An immutable (LHS, RHS) pair.
#[derive(Clone)]
pub struct Rule {
    pub(crate) lhs: Lhs,
    pub(crate) rhs: Rhs,
}

impl Rule {
    pub(crate) fn new(lhs: Lhs, rhs: Rhs) -> Self {
        Rule { lhs, rhs }
    }

    pub(crate) fn is_inward(&self) -> bool {
        matches!(self.rhs.kind, RhsKind::Inward(_))
    }

    pub(crate) fn out_key(&self) -> Option<&'static str> {
        self.rhs.as_outward().map(|outer| outer.key)
    }

    pub(crate) fn mentioned_types(&self) -> Vec<Type> {
        self.lhs.mentioned_types()
    }

    /// Whether the RHS may put a type on a fnode that the LHS did not already
    /// guarantee, thereby changing what the fnode is.
    fn could_change_type(&self) -> bool {
        let inward = match self.rhs.as_inward() {
            Some(inner) => inner,
            None => return false,
        };
        let guaranteed = self.lhs.guaranteed_types();
        match inward.type_spec() {
            TypeSpec::Never => false,
            TypeSpec::Fixed(typ) => !guaranteed.contains(&typ),
            TypeSpec::In(types) => types.iter().any(|typ| !guaranteed.contains(typ)),
            TypeSpec::Unknown => true,
        }
    }

    /// Types a fact from this rule could bear. Outward rules emit nothing.
    pub(crate) fn could_emit(&self) -> Result<Vec<Type>> {
        let inward = match self.rhs.as_inward() {
            Some(inner) => inner,
            None => return Ok(Vec::new()),
        };
        let guaranteed = self.lhs.guaranteed_types();
        if !self.could_change_type() {
            if guaranteed.is_empty() {
                // The RHS can't put a type on the fnode and the LHS brings
                // none along, so the fact would be typeless.
                return Err(match self.lhs.kind {
                    LhsKind::Dom(_) => Error::DomRuleMustAssignType(self.label()),
                    _ => Error::UnderspecifiedEmission(self.label()),
                });
            }
            return Ok(guaranteed);
        }
        match inward.type_spec() {
            TypeSpec::Fixed(typ) => Ok(vec![typ]),
            TypeSpec::In(types) => Ok(types),
            TypeSpec::Never | TypeSpec::Unknown => Err(Error::UnderspecifiedEmission(self.label())),
        }
    }

    /// Types this rule could introduce on an fnode that lacked them.
    pub(crate) fn could_add(&self) -> Result<Vec<Type>> {
        let guaranteed = self.lhs.guaranteed_types();
        Ok(self.could_emit()?.into_iter().filter(|typ| !guaranteed.contains(typ)).collect())
    }

    /// Mentioned types whose emitters must all have run before this rule.
    pub(crate) fn finalized_types(&self) -> Vec<Type> {
        if !self.is_inward() {
            // Sink output leaves the system; every mentioned score must be final.
            return self.mentioned_types();
        }
        let mut finalized = Vec::new();
        if let Some(typ) = self.lhs.aggregated_type() {
            finalized.push(typ);
        }
        if self.could_change_type() {
            for typ in self.lhs.guaranteed_types() {
                if !finalized.contains(&typ) {
                    finalized.push(typ);
                }
            }
        }
        finalized
    }

    /// Construction-time checks; every failure here names the rule.
    pub(crate) fn validate(&self) -> Result<()> {
        if let LhsKind::And(parts) = &self.lhs.kind {
            for part in parts {
                let simple = matches!(part.kind, LhsKind::OfType(_)) && part.predicates.is_empty();
                if !simple {
                    return Err(Error::UnsupportedAnd(part.label()));
                }
            }
        }
        if let Some(inward) = self.rhs.as_inward() {
            if inward.conserve && self.lhs.inferable_type().is_none() {
                return Err(Error::ConserveScoreWithoutType(self.label()));
            }
        }
        self.could_emit()?;
        Ok(())
    }

    pub(crate) fn label(&self) -> String {
        format!("rule({} -> {})", self.lhs.label(), self.rhs.label())
    }
}
