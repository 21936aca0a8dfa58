//! Tree distance and agglomerative clustering.
//!
//! The distance metric prices the walk between two elements of the same
//! document:
//!
//! ```text
//!            LCA
//!           /   \            depth term:  levels one path has over the other
//!        div     div         tag term:    per lockstep level, cheaper when
//!        / \       \                      the two ancestors share a tag
//!      a#A  a  …  div        stride term: elements sitting between the two
//!                   \                     paths at each level
//!                   a#B
//! ```
//!
//! Identical elements are at distance 0; an element and its descendant are
//! infinitely far apart (`f64::MAX`), since nesting is containment, not
//! proximity.
//! The metric is symmetric by construction and makes no triangle-inequality
//! promise.
//!
//! [`clusters`] is the single-link agglomerative grouping built on top: start
//! with singletons, repeatedly merge the two closest clusters (closest =
//! nearest cross-cluster pair), stop when the nearest pair is farther than
//! the splitting distance. O(n²) distance computations and memory.

use crate::dom::{ancestor_chain, index_in_parent, ElementId, TreeDoc};

/// Cost knobs for [`distance`]. The defaults are tuned for telling visually
/// distinct page regions apart and are not contractual.
#[derive(Clone, Debug)]
pub struct DistanceCosts {
    /// Per level of depth difference between the two elements.
    pub different_depth_cost: f64,
    /// Per lockstep ancestor pair with differing tags.
    pub different_tag_cost: f64,
    /// Per lockstep ancestor pair sharing a tag.
    pub same_tag_cost: f64,
    /// Per element lying between the two ancestor paths.
    pub stride_cost: f64,
}

impl Default for DistanceCosts {
    fn default() -> Self {
        DistanceCosts { different_depth_cost: 2.0, different_tag_cost: 2.0, same_tag_cost: 1.0, stride_cost: 1.0 }
    }
}

/// Distance between two elements of `doc` under the default extra cost of 0.
pub fn distance(doc: &dyn TreeDoc, a: ElementId, b: ElementId, costs: &DistanceCosts) -> f64 {
    distance_with(doc, a, b, costs, |_, _| 0.0)
}

/// Distance between two elements, plus a caller-supplied extra cost (for
/// example, disparity in text length).
pub fn distance_with(
    doc: &dyn TreeDoc,
    a: ElementId,
    b: ElementId,
    costs: &DistanceCosts,
    additional_cost: impl Fn(ElementId, ElementId) -> f64,
) -> f64 {
    if a == b {
        return 0.0;
    }
    let a_chain = ancestor_chain(doc, a);
    let b_chain = ancestor_chain(doc, b);
    if a_chain.contains(&b) || b_chain.contains(&a) {
        return f64::MAX;
    }

    // Trim the shared suffix; what remains are the two paths strictly below
    // the lowest common ancestor, endpoint first.
    let mut m = a_chain.len();
    let mut n = b_chain.len();
    while m > 0 && n > 0 && a_chain[m - 1] == b_chain[n - 1] {
        m -= 1;
        n -= 1;
    }
    let a_path = &a_chain[..m];
    let b_path = &b_chain[..n];

    let mut cost = costs.different_depth_cost * (m as f64 - n as f64).abs();

    // Lockstep tag walk from just below the LCA toward the endpoints.
    for level in 0..m.min(n) {
        let x = a_path[m - 1 - level];
        let y = b_path[n - 1 - level];
        cost += if doc.tag(x).eq_ignore_ascii_case(doc.tag(y)) {
            costs.same_tag_cost
        } else {
            costs.different_tag_cost
        };
    }

    if costs.stride_cost != 0.0 {
        cost += costs.stride_cost * count_strides(doc, a_path, b_path) as f64;
    }

    cost + additional_cost(a, b)
}

/// Count the elements topologically between the two paths, level by level
/// from just below the LCA down.
///
/// At the top level the two path nodes are siblings: everything strictly
/// between them counts. Below that the paths sit in different parents, so
/// each side contributes its node's siblings facing the other path; once the
/// shallower path has ended, the deeper path keeps contributing its facing
/// siblings down to its endpoint.
fn count_strides(doc: &dyn TreeDoc, a_path: &[ElementId], b_path: &[ElementId]) -> usize {
    let m = a_path.len();
    let n = b_path.len();
    // Document order of the two paths, decided where they diverge.
    let a_top = index_in_parent(doc, a_path[m - 1]).unwrap_or(0);
    let b_top = index_in_parent(doc, b_path[n - 1]).unwrap_or(0);
    let a_first = a_top < b_top;

    let mut strides = 0;
    for level in 0..m.max(n) {
        let a_node = (level < m).then(|| a_path[m - 1 - level]);
        let b_node = (level < n).then(|| b_path[n - 1 - level]);
        match (a_node, b_node) {
            (Some(x), Some(y)) if doc.parent(x) == doc.parent(y) => {
                let xi = index_in_parent(doc, x).unwrap_or(0);
                let yi = index_in_parent(doc, y).unwrap_or(0);
                strides += xi.abs_diff(yi).saturating_sub(1);
            }
            (Some(x), Some(y)) => {
                strides += facing_siblings(doc, x, a_first);
                strides += facing_siblings(doc, y, !a_first);
            }
            (Some(x), None) => strides += facing_siblings(doc, x, a_first),
            (None, Some(y)) => strides += facing_siblings(doc, y, !a_first),
            (None, None) => {}
        }
    }
    strides
}

/// Siblings of `el` on the side of its parent facing the other path:
/// following siblings when facing forward in document order, preceding ones
/// otherwise.
fn facing_siblings(doc: &dyn TreeDoc, el: ElementId, facing_forward: bool) -> usize {
    match (doc.parent(el), index_in_parent(doc, el)) {
        (Some(parent), Some(idx)) => {
            if facing_forward {
                doc.children(parent).len() - idx - 1
            } else {
                idx
            }
        }
        _ => 0,
    }
}

/// Single-link agglomerative clustering.
///
/// Generic over the item type: pass raw elements, fnode ids, or anything
/// else, along with a matching distance function. Returns disjoint non-empty
/// clusters whose union is `items`; every cross-cluster distance exceeds
/// `splitting_distance`.
pub fn clusters<T: Clone>(items: &[T], splitting_distance: f64, dist: impl Fn(&T, &T) -> f64) -> Vec<Vec<T>> {
    let n = items.len();
    if n == 0 {
        return Vec::new();
    }

    // Pairwise distances, upper triangle only.
    let mut matrix = vec![0.0_f64; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            matrix[i * n + j] = dist(&items[i], &items[j]);
        }
    }
    let pair = |i: usize, j: usize| if i < j { matrix[i * n + j] } else { matrix[j * n + i] };

    let mut groups: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    loop {
        let mut best: Option<(usize, usize, f64)> = None;
        for gi in 0..groups.len() {
            for gj in (gi + 1)..groups.len() {
                let mut link = f64::INFINITY;
                for &i in &groups[gi] {
                    for &j in &groups[gj] {
                        link = link.min(pair(i, j));
                    }
                }
                if best.map(|(_, _, d)| link < d).unwrap_or(true) {
                    best = Some((gi, gj, link));
                }
            }
        }
        match best {
            Some((gi, gj, link)) if link <= splitting_distance => {
                // gj > gi, so gi stays valid across the removal.
                let absorbed = groups.swap_remove(gj);
                groups[gi].extend(absorbed);
            }
            _ => break,
        }
    }

    groups.into_iter().map(|group| group.into_iter().map(|i| items[i].clone()).collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::TreeDocument;

    #[test]
    fn identity_and_symmetry() {
        let mut doc = TreeDocument::new("body");
        let left = doc.append(doc.root(), "div");
        let x = doc.append(left, "a");
        let right = doc.append(doc.root(), "div");
        let y = doc.append(right, "a");

        let costs = DistanceCosts::default();
        assert_eq!(distance(&doc, x, x, &costs), 0.0);
        assert_eq!(distance(&doc, x, y, &costs), distance(&doc, y, x, &costs));
    }

    #[test]
    fn containment_is_infinitely_far() {
        // <body><div id="b"><div id="a"/></div></body>
        let mut doc = TreeDocument::new("body");
        let b = doc.append(doc.root(), "div");
        let a = doc.append(b, "div");

        let costs = DistanceCosts::default();
        assert_eq!(distance(&doc, a, b, &costs), f64::MAX);
        assert_eq!(distance(&doc, b, a, &costs), f64::MAX);
    }

    #[test]
    fn shared_parent_tags_are_closer_than_differing_ones() {
        // Same shape twice, but one pair of parents differs in tag.
        let mut same = TreeDocument::new("body");
        let p1 = same.append(same.root(), "div");
        let x1 = same.append(p1, "i");
        let p2 = same.append(same.root(), "div");
        let y1 = same.append(p2, "i");

        let mut diff = TreeDocument::new("body");
        let p3 = diff.append(diff.root(), "div");
        let x2 = diff.append(p3, "i");
        let p4 = diff.append(diff.root(), "section");
        let y2 = diff.append(p4, "i");

        let costs = DistanceCosts::default();
        assert!(distance(&diff, x2, y2, &costs) > distance(&same, x1, y1, &costs));
    }

    #[test]
    fn strides_add_distance_between_siblings() {
        let mut doc = TreeDocument::new("div");
        let a = doc.append(doc.root(), "a");
        doc.append(doc.root(), "span");
        doc.append(doc.root(), "span");
        let b = doc.append(doc.root(), "a");

        let costs = DistanceCosts::default();
        // One shared-tag level plus two stride nodes.
        assert_eq!(distance(&doc, a, b, &costs), 3.0);

        let no_strides = DistanceCosts { stride_cost: 0.0, ..DistanceCosts::default() };
        assert_eq!(distance(&doc, a, b, &no_strides), 1.0);
    }

    #[test]
    fn depth_disparity_is_priced_per_level() {
        let mut doc = TreeDocument::new("body");
        let shallow = doc.append(doc.root(), "a");
        let wrap = doc.append(doc.root(), "div");
        let inner = doc.append(wrap, "div");
        let deep = doc.append(inner, "a");

        let costs = DistanceCosts::default();
        // Depth gap 2 -> 4; lockstep pair (a, div) -> 2; no strides.
        assert_eq!(distance(&doc, shallow, deep, &costs), 6.0);
    }

    #[test]
    fn additional_cost_is_added_on_top() {
        let mut doc = TreeDocument::new("div");
        let a = doc.append(doc.root(), "a");
        let b = doc.append(doc.root(), "a");

        let costs = DistanceCosts::default();
        let base = distance(&doc, a, b, &costs);
        let padded = distance_with(&doc, a, b, &costs, |_, _| 5.0);
        assert_eq!(padded, base + 5.0);
    }

    #[test]
    fn clusters_partition_their_input() {
        let points = [0.0_f64, 1.0, 2.0, 10.0, 11.0, 20.0];
        let groups = clusters(&points, 1.5, |a, b| (a - b).abs());

        let mut all: Vec<f64> = groups.iter().flatten().copied().collect();
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(all, points.to_vec());
        assert_eq!(groups.len(), 3);

        // Every cross-cluster distance exceeds the cut-off.
        for (gi, group) in groups.iter().enumerate() {
            for (gj, other) in groups.iter().enumerate() {
                if gi == gj {
                    continue;
                }
                for a in group {
                    for b in other {
                        assert!((a - b).abs() > 1.5);
                    }
                }
            }
        }
    }

    #[test]
    fn empty_and_singleton_inputs() {
        let empty: Vec<u32> = Vec::new();
        assert!(clusters(&empty, 5.0, |_, _| 0.0).is_empty());
        assert_eq!(clusters(&[7u32], 5.0, |_, _| 0.0), vec![vec![7u32]]);
    }

    /// Two groups of three adjacent anchors, plus one anchor nested three
    /// levels deep past a run of empty stride divs, split at distance 10.
    #[test]
    fn link_groves_split_from_the_deep_outlier() {
        let mut doc = TreeDocument::new("html");
        let body = doc.append(doc.root(), "body");
        let left = doc.append(body, "div");
        let right = doc.append(body, "div");
        let mut anchors = Vec::new();
        for _ in 0..3 {
            anchors.push(doc.append(left, "a"));
        }
        for _ in 0..3 {
            anchors.push(doc.append(right, "a"));
        }
        for _ in 0..4 {
            doc.append(body, "div"); // stride nodes
        }
        let outer = doc.append(body, "div");
        let middle = doc.append(outer, "div");
        let innermost = doc.append(middle, "div");
        let deep = doc.append(innermost, "a");
        anchors.push(deep);

        let costs = DistanceCosts::default();
        let groups = clusters(&anchors, 10.0, |&a, &b| distance(&doc, a, b, &costs));

        assert_eq!(groups.len(), 2);
        let (small, large): (Vec<_>, Vec<_>) = groups.into_iter().partition(|g| g.len() == 1);
        assert_eq!(small.len(), 1);
        assert_eq!(small[0], vec![deep]);
        assert_eq!(large[0].len(), 6);
    }
}
