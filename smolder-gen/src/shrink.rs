//! The structural minimizer over draw trees.
//!
//! The shrinker is independent of the value type: it only sees the tree.
//! Candidates come out lazily, in move-priority order:
//!
//! 1. delete an optional subtree (some → none)
//! 2. remove one element from a sequence (internal positions first)
//! 3. halve a length
//! 4. lower a chosen variant index toward 0
//! 5. replace a primitive draw with its shrink target, then the midpoint
//!    toward the original - the runner's adopt-and-restart loop turns the
//!    midpoint move into a binary search
//!
//! Every candidate strictly decreases the (size, magnitude) metric, which
//! bounds the number of adoptions and guarantees termination.

use crate::tree::{DrawTree, NodeKind};

/// A tree location as child indices from the root.
type Path = Vec<usize>;

/// Lazily enumerate shrink candidates for a tree, highest priority first.
pub fn candidates(tree: &DrawTree) -> impl Iterator<Item = DrawTree> + '_ {
    let optional_deletes = optional_delete_paths(tree).into_iter().map(|path| {
        edit_at(tree, &path, |node| {
            if let DrawTree::Node { children, .. } = node {
                children.truncate(1);
                children[0] = DrawTree::Choice { index: 0, arity: 2 };
            }
        })
    });

    let removals = removal_moves(tree).into_iter().map(|(path, index)| {
        edit_at(tree, &path, move |node| {
            if let DrawTree::Node { children, .. } = node {
                children.remove(1 + index);
                if let Some(DrawTree::Len { value, .. }) = children.first_mut() {
                    *value -= 1;
                }
            }
        })
    });

    let halvings = halving_moves(tree).into_iter().map(|(path, new_len)| {
        edit_at(tree, &path, move |node| {
            if let DrawTree::Node { children, .. } = node {
                children.truncate(1 + new_len);
                if let Some(DrawTree::Len { value, .. }) = children.first_mut() {
                    *value = new_len;
                }
            }
        })
    });

    let variant_lowerings = variant_moves(tree).into_iter().map(|(path, target)| {
        edit_at(tree, &path, move |node| {
            if let DrawTree::Node { children, .. } = node {
                if let Some(DrawTree::Choice { index, .. }) = children.first_mut() {
                    *index = target;
                }
            }
        })
    });

    let leaf_shrinks = leaf_moves(tree).into_iter().map(|(path, replacement)| {
        edit_at(tree, &path, move |node| *node = replacement)
    });

    optional_deletes
        .chain(removals)
        .chain(halvings)
        .chain(variant_lowerings)
        .chain(leaf_shrinks)
}

/// Convenience wrapper collecting all candidates.
pub fn all_candidates(tree: &DrawTree) -> Vec<DrawTree> {
    candidates(tree).collect()
}

// ── Move discovery ──────────────────────────────────────────────────────────

fn optional_delete_paths(tree: &DrawTree) -> Vec<Path> {
    let mut out = Vec::new();
    walk(tree, &mut Vec::new(), &mut |path, node, _| {
        if let DrawTree::Node { kind: NodeKind::Optional, children } = node {
            if matches!(children.first(), Some(DrawTree::Choice { index: 1, .. })) {
                out.push(path.to_vec());
            }
        }
    });
    out
}

/// (node path, element index) pairs for single-element removal. Internal
/// positions come before endpoints.
fn removal_moves(tree: &DrawTree) -> Vec<(Path, usize)> {
    let mut out = Vec::new();
    walk(tree, &mut Vec::new(), &mut |path, node, _| {
        let DrawTree::Node { kind, children } = node else { return };
        if !has_length(*kind) {
            return;
        }
        let Some(DrawTree::Len { value: n, lo, .. }) = children.first() else { return };
        if *n == 0 || *n <= *lo {
            return;
        }
        let n = *n;
        let mut order: Vec<usize> = (1..n.saturating_sub(1)).collect();
        order.push(n - 1);
        if n > 1 {
            order.push(0);
        } else {
            order.insert(0, 0);
        }
        order.dedup();
        for index in order {
            if index < n {
                out.push((path.to_vec(), index));
            }
        }
    });
    out
}

fn halving_moves(tree: &DrawTree) -> Vec<(Path, usize)> {
    let mut out = Vec::new();
    walk(tree, &mut Vec::new(), &mut |path, node, _| {
        let DrawTree::Node { kind, children } = node else { return };
        if !has_length(*kind) {
            return;
        }
        let Some(DrawTree::Len { value: n, lo, .. }) = children.first() else { return };
        let new_len = (*n / 2).max(*lo);
        if new_len < *n {
            out.push((path.to_vec(), new_len));
        }
    });
    out
}

fn variant_moves(tree: &DrawTree) -> Vec<(Path, usize)> {
    let mut out = Vec::new();
    walk(tree, &mut Vec::new(), &mut |path, node, _| {
        let DrawTree::Node { kind: NodeKind::OneOf, children } = node else { return };
        let Some(DrawTree::Choice { index, .. }) = children.first() else { return };
        if *index == 0 {
            return;
        }
        out.push((path.to_vec(), 0));
        let mid = index / 2;
        if mid != 0 && mid != *index {
            out.push((path.to_vec(), mid));
        }
    });
    out
}

/// Primitive-leaf replacements: shrink target first, then the midpoint
/// toward the original value, then one step toward the target. Leaves are
/// visited from the largest distance-to-target down.
fn leaf_moves(tree: &DrawTree) -> Vec<(Path, DrawTree)> {
    let mut per_leaf: Vec<(f64, Vec<(Path, DrawTree)>)> = Vec::new();
    walk(tree, &mut Vec::new(), &mut |path, node, parent| {
        // Choices owned by Optional/OneOf nodes are structural decisions;
        // editing them without their subtree makes no sense, and the
        // dedicated moves above already handle them.
        let structural = matches!(parent, Some(NodeKind::Optional | NodeKind::OneOf));
        let mut moves = Vec::new();
        match node {
            DrawTree::Int { value, lo, hi, origin } if value != origin => {
                let (value, lo, hi, origin) = (*value, *lo, *hi, *origin);
                moves.push((path.to_vec(), DrawTree::Int { value: origin, lo, hi, origin }));
                let mid = midpoint_i64(origin, value);
                if mid != value && mid != origin {
                    moves.push((path.to_vec(), DrawTree::Int { value: mid, lo, hi, origin }));
                }
                // One step toward the origin closes the gap binary search
                // leaves: a fixed point really is the boundary value.
                let step = value - (value - origin).signum();
                if step != mid && step != origin {
                    moves.push((path.to_vec(), DrawTree::Int { value: step, lo, hi, origin }));
                }
            }
            DrawTree::Float { value, origin } if value != origin => {
                let (value, origin) = (*value, *origin);
                moves.push((path.to_vec(), DrawTree::Float { value: origin, origin }));
                let mid = origin + (value - origin) / 2.0;
                if mid != value && mid != origin && mid.is_finite() {
                    moves.push((path.to_vec(), DrawTree::Float { value: mid, origin }));
                }
            }
            DrawTree::Choice { index, arity } if *index > 0 && !structural => {
                let (index, arity) = (*index, *arity);
                moves.push((path.to_vec(), DrawTree::Choice { index: 0, arity }));
                let mid = index / 2;
                if mid != 0 {
                    moves.push((path.to_vec(), DrawTree::Choice { index: mid, arity }));
                }
                if index - 1 != 0 && index - 1 != mid {
                    moves.push((path.to_vec(), DrawTree::Choice { index: index - 1, arity }));
                }
            }
            // Lengths are only reduced together with their children, by the
            // removal and halving moves.
            _ => {}
        }
        if !moves.is_empty() {
            per_leaf.push((node.magnitude(), moves));
        }
    });
    // Largest leaves first; the sort is stable, so equal-magnitude leaves
    // keep tree order and candidate streams stay deterministic.
    per_leaf.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    per_leaf.into_iter().flat_map(|(_, moves)| moves).collect()
}

fn midpoint_i64(a: i64, b: i64) -> i64 {
    ((a as i128 + b as i128) / 2) as i64
}

fn has_length(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::Seq | NodeKind::Text | NodeKind::Blob)
}

// ── Tree plumbing ───────────────────────────────────────────────────────────

fn walk(
    tree: &DrawTree,
    path: &mut Path,
    visit: &mut impl FnMut(&[usize], &DrawTree, Option<NodeKind>),
) {
    walk_inner(tree, path, None, visit);
}

fn walk_inner(
    tree: &DrawTree,
    path: &mut Path,
    parent: Option<NodeKind>,
    visit: &mut impl FnMut(&[usize], &DrawTree, Option<NodeKind>),
) {
    visit(path, tree, parent);
    if let DrawTree::Node { kind, children } = tree {
        for (i, child) in children.iter().enumerate() {
            path.push(i);
            walk_inner(child, path, Some(*kind), visit);
            path.pop();
        }
    }
}

/// Clone the tree and apply `f` to the node at `path`.
fn edit_at(tree: &DrawTree, path: &[usize], f: impl FnOnce(&mut DrawTree)) -> DrawTree {
    let mut out = tree.clone();
    let mut node = &mut out;
    for index in path {
        let DrawTree::Node { children, .. } = node else {
            // Paths are discovered on this same tree; a miss is a bug.
            unreachable!("edit path does not address a node");
        };
        node = &mut children[*index];
    }
    f(node);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(value: i64) -> DrawTree {
        DrawTree::Int { value, lo: -1000, hi: 1000, origin: 0 }
    }

    fn seq(items: Vec<DrawTree>) -> DrawTree {
        let mut children = vec![DrawTree::Len { value: items.len(), lo: 0, hi: 10 }];
        children.extend(items);
        DrawTree::node(NodeKind::Seq, children)
    }

    #[test]
    fn every_candidate_strictly_decreases_the_metric() {
        let tree = DrawTree::node(
            NodeKind::Record,
            vec![
                seq(vec![int(5), int(-3), int(900)]),
                DrawTree::node(
                    NodeKind::Optional,
                    vec![DrawTree::Choice { index: 1, arity: 2 }, int(7)],
                ),
                DrawTree::node(
                    NodeKind::OneOf,
                    vec![DrawTree::Choice { index: 2, arity: 3 }, int(1)],
                ),
            ],
        );
        let metric = tree.metric();
        let all: Vec<DrawTree> = candidates(&tree).collect();
        assert!(!all.is_empty());
        for cand in &all {
            assert!(
                cand.metric().is_smaller_than(&metric),
                "candidate did not shrink: {cand:?}"
            );
        }
    }

    #[test]
    fn optional_deletion_comes_first() {
        let tree = DrawTree::node(
            NodeKind::Optional,
            vec![DrawTree::Choice { index: 1, arity: 2 }, int(7)],
        );
        let first = candidates(&tree).next().unwrap();
        assert_eq!(
            first,
            DrawTree::node(NodeKind::Optional, vec![DrawTree::Choice { index: 0, arity: 2 }])
        );
    }

    #[test]
    fn removal_prefers_internal_positions() {
        let tree = seq(vec![int(1), int(2), int(3), int(4)]);
        let moves = removal_moves(&tree);
        let indices: Vec<usize> = moves.iter().map(|(_, i)| *i).collect();
        assert_eq!(indices, vec![1, 2, 3, 0]);
    }

    #[test]
    fn removal_respects_minimum_length() {
        let mut children = vec![DrawTree::Len { value: 2, lo: 2, hi: 5 }];
        children.extend([int(1), int(2)]);
        let tree = DrawTree::node(NodeKind::Seq, children);
        assert!(removal_moves(&tree).is_empty());
        assert!(halving_moves(&tree).is_empty());
    }

    #[test]
    fn leaf_moves_offer_target_then_midpoint() {
        let tree = int(100);
        let all: Vec<DrawTree> = candidates(&tree).collect();
        assert_eq!(all[0], int(0));
        assert_eq!(all[1], int(50));
    }

    #[test]
    fn structural_choices_are_not_edited_directly() {
        let tree = DrawTree::node(
            NodeKind::OneOf,
            vec![DrawTree::Choice { index: 2, arity: 3 }, int(0)],
        );
        // The only candidates are the variant-lowering ones.
        let all: Vec<DrawTree> = candidates(&tree).collect();
        assert_eq!(all.len(), 2);
        for cand in &all {
            let DrawTree::Node { children, .. } = cand else { panic!() };
            assert!(matches!(children[0], DrawTree::Choice { index: 0 | 1, .. }));
        }
    }

    #[test]
    fn fixed_point_has_no_candidates() {
        let tree = DrawTree::node(
            NodeKind::Record,
            vec![int(0), DrawTree::node(NodeKind::Optional, vec![DrawTree::Choice {
                index: 0,
                arity: 2,
            }])],
        );
        assert_eq!(candidates(&tree).count(), 0);
    }
}
