//! Minimal document tree.
//!
//! The engine only ever needs to walk a tree: parent and child links, tag
//! names, attributes, and a way to run a selector in document order. That
//! contract is the [`TreeDoc`] trait; [`TreeDocument`] is the built-in arena
//! implementation used by the test suite and by callers who build trees
//! programmatically. Any other tree shape can implement `TreeDoc` and gets
//! [`select`] for free, since the selector engine is written against the
//! walking interface alone.
//!
//! The selector language is the subset rulesets actually use: a tag name or
//! `*`, `#id`, `.class`, `[attr]`, `[attr=value]` (value optionally quoted),
//! compounds of those, and comma-separated groups. No combinators.

use crate::error::{Error, Result};

/// Opaque handle to one element of a document. Stable for the lifetime of the
/// document it came from; meaningless across documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub(crate) u32);

/// The tree shape the engine runs against.
///
/// Implementations must report children in document order; [`select`] and the
/// clustering distance metric both rely on it.
pub trait TreeDoc {
    fn root(&self) -> ElementId;
    fn parent(&self, el: ElementId) -> Option<ElementId>;
    fn children(&self, el: ElementId) -> &[ElementId];
    fn tag(&self, el: ElementId) -> &str;
    fn attr(&self, el: ElementId, name: &str) -> Option<&str>;
    /// Text directly inside the element, not including descendants.
    fn text(&self, el: ElementId) -> &str;
}

// --- Arena implementation ----------------------------------------------------

#[derive(Debug)]
struct ElementData {
    tag: String,
    // Kept as a Vec to preserve source order; lookups go through attr().
    attrs: Vec<(String, String)>,
    text: String,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

/// Owned element arena. Element 0 is the root and always exists.
#[derive(Debug)]
pub struct TreeDocument {
    nodes: Vec<ElementData>,
}

impl TreeDocument {
    pub fn new(root_tag: &str) -> Self {
        TreeDocument {
            nodes: vec![ElementData {
                tag: root_tag.to_string(),
                attrs: Vec::new(),
                text: String::new(),
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Append a new element as the last child of `parent`.
    pub fn append(&mut self, parent: ElementId, tag: &str) -> ElementId {
        let id = ElementId(self.nodes.len() as u32);
        self.nodes.push(ElementData {
            tag: tag.to_string(),
            attrs: Vec::new(),
            text: String::new(),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0 as usize].children.push(id);
        id
    }

    /// Append a new element with attributes in one go.
    pub fn append_with(&mut self, parent: ElementId, tag: &str, attrs: &[(&str, &str)]) -> ElementId {
        let id = self.append(parent, tag);
        for (name, value) in attrs {
            self.set_attr(id, name, value);
        }
        id
    }

    pub fn set_attr(&mut self, el: ElementId, name: &str, value: &str) {
        let attrs = &mut self.nodes[el.0 as usize].attrs;
        if let Some(slot) = attrs.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value.to_string();
        } else {
            attrs.push((name.to_string(), value.to_string()));
        }
    }

    pub fn set_text(&mut self, el: ElementId, text: &str) {
        self.nodes[el.0 as usize].text = text.to_string();
    }
}

impl TreeDoc for TreeDocument {
    fn root(&self) -> ElementId {
        ElementId(0)
    }

    fn parent(&self, el: ElementId) -> Option<ElementId> {
        self.nodes[el.0 as usize].parent
    }

    fn children(&self, el: ElementId) -> &[ElementId] {
        &self.nodes[el.0 as usize].children
    }

    fn tag(&self, el: ElementId) -> &str {
        &self.nodes[el.0 as usize].tag
    }

    fn attr(&self, el: ElementId, name: &str) -> Option<&str> {
        self.nodes[el.0 as usize].attrs.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    fn text(&self, el: ElementId) -> &str {
        &self.nodes[el.0 as usize].text
    }
}

// --- Tree helpers -------------------------------------------------------------

/// Ancestor chain of `el`, starting at `el` itself and ending at the root.
pub(crate) fn ancestor_chain(doc: &dyn TreeDoc, el: ElementId) -> Vec<ElementId> {
    let mut chain = vec![el];
    let mut cursor = el;
    while let Some(parent) = doc.parent(cursor) {
        chain.push(parent);
        cursor = parent;
    }
    chain
}

/// Position of `el` among its parent's children. `None` for the root.
pub(crate) fn index_in_parent(doc: &dyn TreeDoc, el: ElementId) -> Option<usize> {
    let parent = doc.parent(el)?;
    doc.children(parent).iter().position(|&c| c == el)
}

/// Concatenated text of `el` and all its descendants, in document order.
pub fn inner_text(doc: &dyn TreeDoc, el: ElementId) -> String {
    fn walk(doc: &dyn TreeDoc, el: ElementId, out: &mut String) {
        out.push_str(doc.text(el));
        for &child in doc.children(el) {
            walk(doc, child, out);
        }
    }
    let mut out = String::new();
    walk(doc, el, &mut out);
    out
}

// --- Selector engine ----------------------------------------------------------

#[derive(Debug, Clone)]
struct AttrTest {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

/// A parsed comma-group of compound selectors.
#[derive(Debug, Clone)]
pub(crate) struct Selector {
    groups: Vec<Compound>,
}

impl Selector {
    pub(crate) fn parse(input: &str) -> Result<Selector> {
        let mut groups = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(Error::BadSelector(input.to_string()));
            }
            groups.push(parse_compound(part).ok_or_else(|| Error::BadSelector(input.to_string()))?);
        }
        Ok(Selector { groups })
    }

    pub(crate) fn matches(&self, doc: &dyn TreeDoc, el: ElementId) -> bool {
        self.groups.iter().any(|compound| compound_matches(compound, doc, el))
    }
}

fn parse_compound(part: &str) -> Option<Compound> {
    // One simple selector per iteration; a bare tag (or *) is only legal first.
    let token = regex!(
        r#"(?x)^(?:
            (?P<tag>  [A-Za-z][A-Za-z0-9-]* | \* )
          | \# (?P<id>    [A-Za-z0-9_-]+ )
          | \. (?P<class> [A-Za-z0-9_-]+ )
          | \[ \s* (?P<attr> [A-Za-z0-9_-]+ ) \s* (?: = \s* (?P<val> [^\]]*? ) \s* )? \]
        )"#
    );

    let mut compound = Compound::default();
    let mut rest = part;
    let mut first = true;
    while !rest.is_empty() {
        let caps = token.captures(rest)?;
        if let Some(tag) = caps.name("tag") {
            if !first {
                return None;
            }
            if tag.as_str() != "*" {
                compound.tag = Some(tag.as_str().to_string());
            }
        } else if let Some(id) = caps.name("id") {
            compound.id = Some(id.as_str().to_string());
        } else if let Some(class) = caps.name("class") {
            compound.classes.push(class.as_str().to_string());
        } else if let Some(attr) = caps.name("attr") {
            compound.attrs.push(AttrTest {
                name: attr.as_str().to_string(),
                value: caps.name("val").map(|v| strip_quotes(v.as_str()).to_string()),
            });
        }
        rest = &rest[caps.get(0).unwrap().end()..];
        first = false;
    }
    Some(compound)
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'\'' || bytes[0] == b'"') && bytes[bytes.len() - 1] == bytes[0] {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn compound_matches(compound: &Compound, doc: &dyn TreeDoc, el: ElementId) -> bool {
    if let Some(tag) = &compound.tag {
        if !doc.tag(el).eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if doc.attr(el, "id") != Some(id.as_str()) {
            return false;
        }
    }
    for class in &compound.classes {
        let listed = doc
            .attr(el, "class")
            .map(|cls| cls.split_ascii_whitespace().any(|c| c == class))
            .unwrap_or(false);
        if !listed {
            return false;
        }
    }
    for test in &compound.attrs {
        match (doc.attr(el, &test.name), &test.value) {
            (None, _) => return false,
            (Some(_), None) => {}
            (Some(actual), Some(wanted)) => {
                if actual != wanted {
                    return false;
                }
            }
        }
    }
    true
}

/// Run `selector` over the whole document, returning matches in document
/// order (preorder). Each element appears at most once even if several comma
/// groups match it.
pub fn select(doc: &dyn TreeDoc, selector: &str) -> Result<Vec<ElementId>> {
    let parsed = Selector::parse(selector)?;
    let mut out = Vec::new();
    let mut stack = vec![doc.root()];
    while let Some(el) = stack.pop() {
        if parsed.matches(doc, el) {
            out.push(el);
        }
        for &child in doc.children(el).iter().rev() {
            stack.push(child);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_doc() -> TreeDocument {
        let mut doc = TreeDocument::new("html");
        let head = doc.append(doc.root(), "head");
        doc.append_with(head, "meta", &[("name", "hdl"), ("content", "HDL")]);
        doc.append_with(head, "meta", &[("property", "og:title"), ("content", "OpenGraph")]);
        let title = doc.append(head, "title");
        doc.set_text(title, "Title");
        let body = doc.append(doc.root(), "body");
        doc.append_with(body, "a", &[("class", "signout button"), ("href", "/signout")]);
        doc
    }

    #[test]
    fn select_by_tag_in_document_order() {
        let doc = meta_doc();
        let metas = select(&doc, "meta").unwrap();
        assert_eq!(metas.len(), 2);
        assert_eq!(doc.attr(metas[0], "content"), Some("HDL"));
        assert_eq!(doc.attr(metas[1], "content"), Some("OpenGraph"));
    }

    #[test]
    fn select_by_attribute_value_with_quotes() {
        let doc = meta_doc();
        for selector in ["meta[property=og:title]", "meta[property='og:title']", "meta[property=\"og:title\"]"] {
            let hits = select(&doc, selector).unwrap();
            assert_eq!(hits.len(), 1, "selector {selector:?}");
            assert_eq!(doc.attr(hits[0], "content"), Some("OpenGraph"));
        }
    }

    #[test]
    fn select_by_class_and_presence() {
        let doc = meta_doc();
        assert_eq!(select(&doc, "a.signout").unwrap().len(), 1);
        assert_eq!(select(&doc, "a.button").unwrap().len(), 1);
        assert_eq!(select(&doc, "a.missing").unwrap().len(), 0);
        assert_eq!(select(&doc, "[href]").unwrap().len(), 1);
    }

    #[test]
    fn comma_groups_union_their_matches() {
        let doc = meta_doc();
        let hits = select(&doc, "title, a").unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn bad_selectors_are_rejected() {
        let doc = meta_doc();
        assert!(matches!(select(&doc, "div p"), Err(Error::BadSelector(_))));
        assert!(matches!(select(&doc, ""), Err(Error::BadSelector(_))));
        assert!(matches!(select(&doc, "a,,b"), Err(Error::BadSelector(_))));
    }

    #[test]
    fn inner_text_concatenates_descendants() {
        let mut doc = TreeDocument::new("div");
        let p = doc.append(doc.root(), "p");
        doc.set_text(p, "Hello ");
        let b = doc.append(p, "b");
        doc.set_text(b, "world");
        assert_eq!(inner_text(&doc, doc.root()), "Hello world");
    }
}
