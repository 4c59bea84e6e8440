//! The memoized BDD operators: AND, OR, ITE, and `override_path`, the single
//! recursive primitive behind set `add`/`remove` and map `set` (SPEC_FULL
//! §4.2, §4.4).
//!
//! `and`/`or`/`ite` treat every `NodeId` operand as borrowed: the caller
//! keeps its own reference and always receives a freshly owned result.
//! Recursive cofactor calls borrow the same way, so no operand ever needs an
//! extra `incref` just to be read.

use crate::node::{NodeId, Variable};
use crate::store::NodeStore;

fn ordered_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a.raw() <= b.raw() {
        (a, b)
    } else {
        (b, a)
    }
}

/// `variable < infinity` for every real variable; terminals sort as
/// infinite, matching SPEC_FULL's "treating terminals as having infinite
/// variable" convention used throughout §4.2.
fn top_variable(candidates: &[Option<Variable>]) -> Variable {
    candidates
        .iter()
        .filter_map(|v| *v)
        .min()
        .expect("at least one operand must be a nonterminal")
}

pub fn and(store: &mut NodeStore, a: NodeId, b: NodeId) -> NodeId {
    if let (Some(x), Some(y)) = (a.as_terminal(), b.as_terminal()) {
        return store.terminal(if x != 0 && y != 0 { 1 } else { 0 });
    }
    if a == b {
        store.incref(a);
        return a;
    }
    if a.is_zero() || b.is_zero() {
        return store.terminal(0);
    }
    if a.is_one() {
        store.incref(b);
        return b;
    }
    if b.is_one() {
        store.incref(a);
        return a;
    }

    let key = ordered_pair(a, b);
    if let Some(hit) = store.and_cache_get(key) {
        store.incref(hit);
        return hit;
    }

    let result = apply_binary(store, a, b, And);
    store.and_cache_insert(key, result);
    result
}

pub fn or(store: &mut NodeStore, a: NodeId, b: NodeId) -> NodeId {
    if let (Some(x), Some(y)) = (a.as_terminal(), b.as_terminal()) {
        return store.terminal(if x != 0 || y != 0 { 1 } else { 0 });
    }
    if a == b {
        store.incref(a);
        return a;
    }
    if a.is_one() || b.is_one() {
        return store.terminal(1);
    }
    if a.is_zero() {
        store.incref(b);
        return b;
    }
    if b.is_zero() {
        store.incref(a);
        return a;
    }

    let key = ordered_pair(a, b);
    if let Some(hit) = store.or_cache_get(key) {
        store.incref(hit);
        return hit;
    }

    let result = apply_binary(store, a, b, Or);
    store.or_cache_insert(key, result);
    result
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum BinaryOp {
    And,
    Or,
}
use BinaryOp::{And, Or};

fn apply_binary(store: &mut NodeStore, a: NodeId, b: NodeId, op: BinaryOp) -> NodeId {
    let va = store.variable_of(a);
    let vb = store.variable_of(b);
    let v = top_variable(&[va, vb]);

    let (a_low, a_high) = if va == Some(v) {
        let node = store.children(a);
        (node.low, node.high)
    } else {
        (a, a)
    };
    let (b_low, b_high) = if vb == Some(v) {
        let node = store.children(b);
        (node.low, node.high)
    } else {
        (b, b)
    };

    let (low, high) = match op {
        And => (and(store, a_low, b_low), and(store, a_high, b_high)),
        Or => (or(store, a_low, b_low), or(store, a_high, b_high)),
    };
    store.nonterminal(v, low, high)
}

/// If-then-else. `f` selects `g` or `h`.
pub fn ite(store: &mut NodeStore, f: NodeId, g: NodeId, h: NodeId) -> NodeId {
    if let Some(value) = f.as_terminal() {
        let chosen = if value != 0 { g } else { h };
        store.incref(chosen);
        return chosen;
    }
    if g == h {
        store.incref(g);
        return g;
    }
    if g.is_one() && h.is_zero() {
        store.incref(f);
        return f;
    }

    let key = (f, g, h);
    if let Some(hit) = store.ite_cache_get(key) {
        store.incref(hit);
        return hit;
    }

    let vf = store.variable_of(f);
    let vg = store.variable_of(g);
    let vh = store.variable_of(h);
    let v = top_variable(&[vf, vg, vh]);

    let (f_low, f_high) = if vf == Some(v) {
        let node = store.children(f);
        (node.low, node.high)
    } else {
        (f, f)
    };
    let (g_low, g_high) = if vg == Some(v) {
        let node = store.children(g);
        (node.low, node.high)
    } else {
        (g, g)
    };
    let (h_low, h_high) = if vh == Some(v) {
        let node = store.children(h);
        (node.low, node.high)
    } else {
        (h, h)
    };

    let low = ite(store, f_low, g_low, h_low);
    let high = ite(store, f_high, g_high, h_high);
    let result = store.nonterminal(v, low, high);

    store.ite_cache_insert(key, result);
    result
}

/// Overrides the subtree of `root` selected by `path` (a strictly
/// variable-ascending list of concrete bits) to evaluate to `value` for
/// every extension of that path, leaving every other path through `root`
/// unchanged. This is the one primitive behind set `add`/`remove` (value =
/// the boolean terminal 1/0) and `IpMap::set` (value = an arbitrary
/// terminal). `root` is borrowed; the result is a fresh owned reference.
///
/// Canonical interning means that when the override has no actual effect
/// (the path already evaluated to `value` everywhere it's taken), the
/// recursion reconstructs the identical node ids all the way to the root,
/// so `override_path(..) == root` for a caller to compare against.
pub fn override_path(store: &mut NodeStore, root: NodeId, path: &[(Variable, bool)], value: NodeId) -> NodeId {
    debug_assert!(value.is_terminal(), "override value must be a terminal");

    let (head, rest) = match path.split_first() {
        None => {
            store.incref(value);
            return value;
        }
        Some(pair) => pair,
    };
    let (var, bit) = *head;

    match store.variable_of(root) {
        None => build_chain(store, head, rest, value, root),
        Some(rv) if rv == var => {
            let node = store.children(root);
            if bit {
                store.incref(node.low);
                let new_high = override_path(store, node.high, rest, value);
                store.nonterminal(rv, node.low, new_high)
            } else {
                store.incref(node.high);
                let new_low = override_path(store, node.low, rest, value);
                store.nonterminal(rv, new_low, node.high)
            }
        }
        Some(rv) if rv < var => {
            let node = store.children(root);
            let new_low = override_path(store, node.low, path, value);
            let new_high = override_path(store, node.high, path, value);
            store.nonterminal(rv, new_low, new_high)
        }
        Some(_) => build_chain(store, head, rest, value, root),
    }
}

/// Builds a fresh linear chain starting at `(var, bit)` followed by `rest`,
/// with `value` on the path and `background` (borrowed, re-incref'd at
/// every level it is used) on every off-path branch. Used both when `root`
/// is a terminal and when `root`'s variable lies strictly ahead of `var`
/// (the existing BDD never tested `var` along this branch, so the whole
/// untouched function is `background` there).
fn build_chain(
    store: &mut NodeStore,
    head: &(Variable, bool),
    rest: &[(Variable, bool)],
    value: NodeId,
    background: NodeId,
) -> NodeId {
    let (var, bit) = *head;
    let on_path = match rest.split_first() {
        None => {
            store.incref(value);
            value
        }
        Some((next_head, next_rest)) => build_chain(store, next_head, next_rest, value, background),
    };
    store.incref(background);
    if bit {
        store.nonterminal(var, background, on_path)
    } else {
        store.nonterminal(var, on_path, background)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Variable;

    fn var(v: u32) -> Variable {
        Variable(v)
    }

    fn single_path_bdd(store: &mut NodeStore, path: &[(Variable, bool)]) -> NodeId {
        override_path(store, NodeId::zero(), path, NodeId::one())
    }

    #[test]
    fn and_or_terminal_shortcuts() {
        let mut store = NodeStore::new();
        assert_eq!(NodeId::one(), and(&mut store, NodeId::one(), NodeId::one()));
        assert_eq!(NodeId::zero(), and(&mut store, NodeId::one(), NodeId::zero()));
        assert_eq!(NodeId::one(), or(&mut store, NodeId::zero(), NodeId::one()));
        assert_eq!(NodeId::zero(), or(&mut store, NodeId::zero(), NodeId::zero()));
    }

    #[test]
    fn or_of_two_single_paths_accepts_both() {
        let mut store = NodeStore::new();
        let path_a = vec![(var(0), true), (var(1), false)];
        let path_b = vec![(var(0), true), (var(1), true)];
        let a = single_path_bdd(&mut store, &path_a);
        let b = single_path_bdd(&mut store, &path_b);
        let union = or(&mut store, a, b);

        // A reduced BDD may stop testing variables before the path's end
        // (e.g. once a variable becomes "don't care"), so evaluation must
        // stop as soon as a terminal is reached rather than walking the
        // whole path.
        let mut eval = |path: &[(Variable, bool)]| -> i32 {
            let mut node = union;
            while let Some(variable) = store.variable_of(node) {
                let bit = path.iter().find(|(var, _)| *var == variable).map(|(_, bit)| *bit).unwrap();
                let n = store.children(node);
                node = if bit { n.high } else { n.low };
            }
            node.as_terminal().unwrap()
        };
        assert_eq!(1, eval(&path_a));
        assert_eq!(1, eval(&path_b));
    }

    #[test]
    fn override_path_add_then_remove_restores_original_root() {
        let mut store = NodeStore::new();
        let path = vec![(var(0), true), (var(1), false), (var(2), true)];

        let added = override_path(&mut store, NodeId::zero(), &path, NodeId::one());
        let removed = override_path(&mut store, added, &path, NodeId::zero());
        assert_eq!(NodeId::zero(), removed);
    }

    #[test]
    fn override_path_add_twice_is_idempotent_and_reports_unchanged() {
        let mut store = NodeStore::new();
        let path = vec![(var(0), false), (var(1), true)];
        let once = override_path(&mut store, NodeId::zero(), &path, NodeId::one());
        store.incref(once);
        let twice = override_path(&mut store, once, &path, NodeId::one());
        assert_eq!(once, twice);
    }

    #[test]
    fn ite_selects_branch_by_condition() {
        let mut store = NodeStore::new();
        let g = single_path_bdd(&mut store, &[(var(0), true)]);
        let h = single_path_bdd(&mut store, &[(var(0), false)]);
        let result = ite(&mut store, NodeId::one(), g, h);
        assert_eq!(g, result);
    }
}
