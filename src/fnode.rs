//! Per-element annotation records.
//!
//! An [`Fnode`] is the unit the executor merges facts onto: one record per
//! element, holding a score and an optional note for every type the element
//! bears. The arena of fnodes lives on the bound ruleset; an `FnodeId` is an
//! index into it, so nothing here points back at its owner.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dom::ElementId;
use crate::error::{Error, Result};
use crate::Type;

/// Index of an fnode in its bound ruleset's arena.
pub type FnodeId = usize;

/// Heterogeneous note payload. Cloning shares the underlying value.
pub type Note = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
struct TypeRecord {
    score: f64,
    note: Option<Note>,
}

/// One element's annotations: which types it bears, and a score and optional
/// note per type.
///
/// Invariants:
/// - a record exists for a type iff the fnode bears that type;
/// - a freshly borne type has score 1.0; scoring multiplies in place;
/// - a note, once set, may not be replaced ([`Error::NoteOverwrite`]).
#[derive(Clone)]
pub struct Fnode {
    element: ElementId,
    types: HashMap<Type, TypeRecord>,
}

impl Fnode {
    pub(crate) fn new(element: ElementId) -> Self {
        Fnode { element, types: HashMap::new() }
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn has_type(&self, typ: Type) -> bool {
        self.types.contains_key(typ)
    }

    /// The score for `typ`, or 1.0 (the multiplicative identity) if the fnode
    /// does not bear it.
    pub fn score_for(&self, typ: Type) -> f64 {
        self.types.get(typ).map(|record| record.score).unwrap_or(1.0)
    }

    pub fn note_for(&self, typ: Type) -> Option<&Note> {
        self.types.get(typ).and_then(|record| record.note.as_ref())
    }

    /// Downcast the note for `typ` to a concrete type.
    pub fn note_as<T: 'static>(&self, typ: Type) -> Option<&T> {
        self.note_for(typ).and_then(|note| note.downcast_ref::<T>())
    }

    /// The types this fnode bears, in no particular order.
    pub fn types(&self) -> impl Iterator<Item = Type> + '_ {
        self.types.keys().copied()
    }

    fn record_mut(&mut self, typ: Type) -> &mut TypeRecord {
        self.types.entry(typ).or_insert(TypeRecord { score: 1.0, note: None })
    }

    pub(crate) fn add_type(&mut self, typ: Type) {
        self.record_mut(typ);
    }

    pub(crate) fn multiply_score(&mut self, typ: Type, factor: f64) {
        self.record_mut(typ).score *= factor;
    }

    /// Set the note for `typ`, bearing the type if necessary. Fails if a note
    /// is already present; note-setting is not idempotent the way scoring is
    /// commutative, so a silent overwrite would hide a rule-ordering bug.
    pub(crate) fn set_note(&mut self, typ: Type, note: Note) -> Result<()> {
        let element = self.element;
        let record = self.record_mut(typ);
        if record.note.is_some() {
            return Err(Error::NoteOverwrite { typ, element });
        }
        record.note = Some(note);
        Ok(())
    }
}

impl fmt::Debug for Fnode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fnode({:?}, ", self.element)?;
        let mut map = f.debug_map();
        for (typ, record) in &self.types {
            map.entry(typ, &format_args!("score={} note={}", record.score, record.note.is_some()));
        }
        map.finish()?;
        write!(f, ")")
    }
}
