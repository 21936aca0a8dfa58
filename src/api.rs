//! Rule construction surface.
//!
//! Rules are built from small combinators: an LHS constructor ([`dom`],
//! [`of_type`], [`and`]) optionally refined with [`Lhs::max`],
//! [`Lhs::best_cluster`], or [`Lhs::when`]; an RHS constructor ([`typ`],
//! [`score`], [`note`], [`props`], [`out`]) refined with the chainable
//! methods on [`Rhs`]; and [`rule`] to pair them.
//!
//! ```
//! use plumb::{dom, of_type, out, rule, typ, Ruleset, TreeDoc, TreeDocument};
//!
//! let ruleset = Ruleset::new(vec![
//!     rule(dom("p"), typ("para").score(2.0)),
//!     rule(of_type("para").max(), out("best")),
//! ])?;
//!
//! let mut doc = TreeDocument::new("html");
//! let body = doc.append(doc.root(), "body");
//! doc.append(body, "p");
//!
//! let mut bound = ruleset.against(&doc);
//! let best = bound.get("best")?;
//! assert_eq!(best.len(), 1);
//! assert_eq!(bound.fnode(best[0]).score_for("para"), 2.0);
//! # Ok::<(), plumb::Error>(())
//! ```

use std::sync::Arc;

use crate::dom::TreeDoc;
use crate::fnode::{Fnode, Note};
use crate::rule::{Fact, InwardRhs, Lhs, LhsKind, OutwardRhs, Rhs, RhsKind, Rule};
use crate::Type;

/// Select elements matching a CSS-subset selector, in document order.
/// Guarantees no type, so the paired RHS must assign one.
pub fn dom(selector: &str) -> Lhs {
    Lhs::new(LhsKind::Dom(selector.to_string()))
}

/// Select the fnodes currently bearing `typ`.
pub fn of_type(typ: Type) -> Lhs {
    Lhs::new(LhsKind::OfType(typ))
}

/// Select the fnodes bearing every one of the given types. Only plain
/// [`of_type`] arguments are supported.
pub fn and(parts: impl IntoIterator<Item = Lhs>) -> Lhs {
    Lhs::new(LhsKind::And(parts.into_iter().collect()))
}

/// Pair a selector with a right-hand side.
pub fn rule(lhs: Lhs, rhs: Rhs) -> Rule {
    Rule::new(lhs, rhs)
}

/// RHS: bear a type on each matched fnode.
pub fn typ(typ: Type) -> Rhs {
    Rhs::inward(InwardRhs { typ: Some(typ), ..InwardRhs::default() })
}

/// RHS: multiply the inferable type's score by a constant.
pub fn score(factor: f64) -> Rhs {
    Rhs::inward(InwardRhs::default()).score(factor)
}

/// RHS: attach a note to the inferable type.
pub fn note(f: impl Fn(&Fnode, &dyn TreeDoc) -> Option<Note> + Send + Sync + 'static) -> Rhs {
    Rhs::inward(InwardRhs::default()).note(f)
}

/// RHS: compute a whole [`Fact`] per input. Declare the emitted types with
/// [`Rhs::type_in`] unless a chained [`Rhs::typ`] pins them down.
pub fn props(f: impl Fn(&Fnode, &dyn TreeDoc) -> Fact + Send + Sync + 'static) -> Rhs {
    Rhs::inward(InwardRhs { props: Some(Arc::new(f)), ..InwardRhs::default() })
}

/// RHS: publish the matches to a named sink instead of mutating the store.
pub fn out(key: &'static str) -> Rhs {
    Rhs { kind: RhsKind::Outward(OutwardRhs { key, through: None, all_through: None }) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{inner_text, TreeDocument};
    use crate::rule::ClusterOpts;
    use crate::ruleset::Ruleset;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn content_note() -> impl Fn(&Fnode, &dyn TreeDoc) -> Option<Note> + Send + Sync + 'static {
        |fnode, doc| doc.attr(fnode.element(), "content").map(|text| Arc::new(text.to_string()) as Note)
    }

    fn title_ruleset() -> Ruleset {
        ruleset![
            rule(dom("meta[property='og:title']"), typ("titley").score(40.0).note(content_note())),
            rule(dom("meta[property='twitter:title']"), typ("titley").score(30.0).note(content_note())),
            rule(dom("meta[name='hdl']"), typ("titley").score(20.0).note(content_note())),
            rule(
                dom("title"),
                typ("titley")
                    .score(10.0)
                    .note(|fnode, doc| Some(Arc::new(inner_text(doc, fnode.element())) as Note)),
            ),
            rule(of_type("titley").max(), out("bestTitle")),
        ]
        .unwrap()
    }

    fn title_doc() -> TreeDocument {
        let mut doc = TreeDocument::new("html");
        let head = doc.append(doc.root(), "head");
        doc.append_with(head, "meta", &[("name", "hdl"), ("content", "HDL")]);
        doc.append_with(head, "meta", &[("property", "og:title"), ("content", "OpenGraph")]);
        doc.append_with(head, "meta", &[("property", "twitter:title"), ("content", "Twitter")]);
        let title = doc.append(head, "title");
        doc.set_text(title, "Title");
        doc
    }

    #[test]
    fn best_title_wins() {
        let ruleset = title_ruleset();
        let doc = title_doc();
        let mut bound = ruleset.against(&doc);

        let best = bound.get("bestTitle").unwrap();
        assert_eq!(best.len(), 1);
        let fnode = bound.fnode(best[0]);
        assert_eq!(fnode.score_for("titley"), 40.0);
        assert_eq!(fnode.note_as::<String>("titley").unwrap(), "OpenGraph");
    }

    #[test]
    fn logout_detection_unions_parallel_evidence() {
        let signoutish = regex!(r"(?i)\b(signout|sign-out|logout|log-out|logoff)\b");

        let class_match = move |fnode: &Fnode, doc: &dyn TreeDoc| {
            doc.attr(fnode.element(), "class").map(|value| signoutish.is_match(value)).unwrap_or(false)
        };
        let href_match = move |fnode: &Fnode, doc: &dyn TreeDoc| {
            doc.attr(fnode.element(), "href").map(|value| signoutish.is_match(value)).unwrap_or(false)
        };
        let to_page_root =
            |_: &Fnode, doc: &dyn TreeDoc| Fact { element: Some(doc.root()), ..Fact::default() };

        let ruleset = Ruleset::new(vec![
            rule(dom("a").when(class_match), typ("signoutClass").score(2.0)),
            rule(dom("a").when(href_match), typ("signoutHref").score(2.0)),
            rule(of_type("signoutClass"), props(to_page_root).typ("loggedIn").conserve_score()),
            rule(of_type("signoutHref"), props(to_page_root).typ("loggedIn").conserve_score()),
            rule(of_type("loggedIn").max(), out("loggedIn")),
        ])
        .unwrap();

        let mut doc = TreeDocument::new("html");
        let body = doc.append(doc.root(), "body");
        let anchor = doc.append_with(
            body,
            "a",
            &[("href", "/authentication/signout/"), ("class", "signout")],
        );
        doc.set_text(anchor, "Sign Out");

        let mut bound = ruleset.against(&doc);
        let hits = bound.get("loggedIn").unwrap();
        assert_eq!(hits.len(), 1);
        let page = bound.fnode(hits[0]);
        assert_eq!(page.element(), doc.root());
        // Both evidence paths conserved their score of 2 into the page fnode.
        assert!(page.score_for("loggedIn") > 1.0);
        assert_eq!(page.score_for("loggedIn"), 4.0);
    }

    #[test]
    fn caching_skips_done_inward_rules_but_answers_identically() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dom_calls = calls.clone();
        let type_calls = calls.clone();

        let ruleset = Ruleset::new(vec![
            rule(
                dom("p"),
                typ("smoo").score_fn(move |_, _| {
                    dom_calls.fetch_add(1, Ordering::SeqCst);
                    2.0
                }),
            ),
            rule(
                of_type("smoo"),
                score(3.0).note(move |_, _| {
                    type_calls.fetch_add(1, Ordering::SeqCst);
                    None
                }),
            ),
            rule(of_type("smoo").max(), out("best")),
        ])
        .unwrap();

        let mut doc = TreeDocument::new("html");
        let body = doc.append(doc.root(), "body");
        doc.append(body, "p");
        doc.append(body, "p");

        let mut bound = ruleset.against(&doc);
        let first = bound.get("best").unwrap();
        let after_first = calls.load(Ordering::SeqCst);
        assert_eq!(after_first, 4);

        let second = bound.get("best").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), after_first);
        assert_eq!(first, second);
        for &id in &first {
            assert_eq!(bound.fnode(id).score_for("smoo"), 6.0);
        }
    }

    #[test]
    fn conflicting_notes_surface_note_overwrite() {
        let ruleset = Ruleset::new(vec![
            rule(dom("p"), typ("para").note(|_, _| Some(Arc::new("first".to_string()) as Note))),
            rule(of_type("para"), note(|_, _| Some(Arc::new("second".to_string()) as Note))),
        ])
        .unwrap();

        let mut doc = TreeDocument::new("html");
        let body = doc.append(doc.root(), "body");
        doc.append(body, "p");

        let mut bound = ruleset.against(&doc);
        let err = bound.get(of_type("para"));
        assert!(matches!(err, Err(crate::Error::NoteOverwrite { typ: "para", .. })));
    }

    #[test]
    fn lhs_queries_are_repeatable() {
        let ruleset = title_ruleset();
        let doc = title_doc();
        let mut bound = ruleset.against(&doc);

        let first = bound.get(of_type("titley")).unwrap();
        let second = bound.get(of_type("titley")).unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[test]
    fn best_cluster_prefers_the_heavier_grove() {
        let ruleset = Ruleset::new(vec![
            rule(dom("a"), typ("linkish")),
            rule(dom("a.hot"), typ("linkish").score(5.0)),
        ])
        .unwrap();

        let mut doc = TreeDocument::new("html");
        let body = doc.append(doc.root(), "body");
        let cold = doc.append(body, "div");
        for _ in 0..3 {
            doc.append(cold, "a");
        }
        doc.append(body, "div");
        doc.append(body, "div");
        let hot = doc.append(body, "div");
        for _ in 0..2 {
            doc.append_with(hot, "a", &[("class", "hot")]);
        }

        let mut bound = ruleset.against(&doc);
        let best = bound.get(of_type("linkish").best_cluster(ClusterOpts::default())).unwrap();
        // Two anchors at score 5 outweigh three at score 1.
        assert_eq!(best.len(), 2);
        for &id in &best {
            assert_eq!(bound.fnode(id).score_for("linkish"), 5.0);
        }
    }

    #[test]
    fn best_cluster_over_nothing_is_empty() {
        let ruleset = Ruleset::new(vec![rule(dom("video"), typ("mediaish"))]).unwrap();
        let doc = title_doc();
        let mut bound = ruleset.against(&doc);
        let best = bound.get(of_type("mediaish").best_cluster(ClusterOpts::default())).unwrap();
        assert!(best.is_empty());
    }

    #[test]
    fn cycles_surface_on_get_not_construction() {
        let ruleset = Ruleset::new(vec![
            rule(of_type("a"), typ("b")),
            rule(of_type("b"), typ("a")),
            rule(of_type("a").max(), out("best")),
        ])
        .unwrap();
        let doc = title_doc();
        let mut bound = ruleset.against(&doc);
        assert!(matches!(bound.get("best"), Err(crate::Error::Cycle(_))));
        // Nothing executed before the cycle was detected.
        assert!(bound.done_inward.is_empty());
    }

    #[test]
    fn run_details_reflect_pruning() {
        let ruleset = title_ruleset();
        let doc = title_doc();
        let mut bound = ruleset.against(&doc);

        let (_, first) = bound.get_with_details("bestTitle").unwrap();
        assert_eq!(first.rules_run, 4);
        assert_eq!(first.results, 1);

        let (_, second) = bound.get_with_details("bestTitle").unwrap();
        assert_eq!(second.rules_run, 0);
        assert_eq!(second.results, 1);
    }

    #[test]
    fn through_and_all_through_shape_sink_output() {
        let ruleset = Ruleset::new(vec![
            rule(dom("a"), typ("linkish")),
            rule(
                of_type("linkish"),
                out("containers")
                    .through(|fnode, doc| doc.parent(fnode.element()))
                    .all_through(|ids, _bound| {
                        let mut seen = Vec::new();
                        for id in ids {
                            if !seen.contains(&id) {
                                seen.push(id);
                            }
                        }
                        seen
                    }),
            ),
        ])
        .unwrap();

        let mut doc = TreeDocument::new("html");
        let body = doc.append(doc.root(), "body");
        let nav = doc.append(body, "nav");
        doc.append(nav, "a");
        doc.append(nav, "a");

        let mut bound = ruleset.against(&doc);
        let containers = bound.get("containers").unwrap();
        // Two anchors map to one shared parent.
        assert_eq!(containers.len(), 1);
        assert_eq!(bound.fnode(containers[0]).element(), nav);
    }
}
