use thiserror::Error;

use crate::dom::ElementId;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while building a ruleset or answering a query.
///
/// Construction-time variants (`DomRuleMustAssignType`, `UnderspecifiedEmission`,
/// `ConserveScoreWithoutType`, `UnsupportedAnd`, `DuplicateOutKey`) are raised by
/// [`crate::Ruleset::new`] before any document is touched. The rest surface from
/// [`crate::BoundRuleset::get`]; state mutated before the error stays in the
/// bound ruleset.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cyclic rule dependency reached through {0}")]
    Cycle(String),

    #[error("no out() rule is keyed {0:?}")]
    MissingOutKey(String),

    #[error("more than one out() rule is keyed {0:?}")]
    DuplicateOutKey(String),

    #[error("{0} asks to conserve score, but its selector guarantees no type to conserve")]
    ConserveScoreWithoutType(String),

    #[error("{0} produced a score with no explicit type and no type inferable from its selector")]
    ScoreWithoutInferableType(String),

    #[error("{0} produced a note with no explicit type and no type inferable from its selector")]
    NoteWithoutInferableType(String),

    #[error("cannot tell what types {0} may emit; declare them with type_in()")]
    UnderspecifiedEmission(String),

    #[error("{0} selects raw DOM nodes, so its right-hand side must assign a type")]
    DomRuleMustAssignType(String),

    #[error("note for type {typ:?} on element {element:?} was already set and may not be overwritten")]
    NoteOverwrite { typ: &'static str, element: ElementId },

    #[error("and() accepts only plain type() selectors, got {0}")]
    UnsupportedAnd(String),

    #[error("{0} was scheduled to run twice in one bound ruleset; this is a planner bug")]
    DoubleExecution(String),

    #[error("unparseable selector {0:?}")]
    BadSelector(String),
}
