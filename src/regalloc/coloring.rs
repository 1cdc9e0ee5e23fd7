//! Graph-coloring register allocation (spec §4.7).
//!
//! Classic Chaitin-Briggs phases over a working copy of the interference
//! graph: simplify (remove low-degree non-move nodes), coalesce (Briggs'
//! conservative test), freeze (give up coalescing a move so its node can
//! simplify), select-spill (push a high-degree node as a spill
//! candidate), then select (pop the stack, assign the first compatible
//! color still free among already-colored neighbors; a node with none
//! free becomes an actual spill).

use crate::reg::Register;
use crate::regalloc::interference::InterferenceGraph;
use rustc_hash::{FxHashMap, FxHashSet};

pub struct ColoringResult {
    pub colors: FxHashMap<Register, Register>,
    pub spilled: Vec<Register>,
}

/// Attempt to color `candidates` against `palette`, given `precolored`
/// registers that already occupy a fixed color (e.g. ABI-mandated
/// registers) and a `compatible` predicate the caller can use to forbid
/// certain candidate/color pairings (coprocessor-bank constraints, spec
/// §4.7 "respecting the compatibility predicate").
pub fn color(
    graph: &InterferenceGraph,
    candidates: &[Register],
    precolored: &FxHashMap<Register, Register>,
    palette: &[Register],
    compatible: &dyn Fn(Register, Register) -> bool,
) -> ColoringResult {
    let _t = crate::timing::start("graph_coloring");
    let k = palette.len();

    let mut adjacency: FxHashMap<Register, FxHashSet<Register>> = FxHashMap::default();
    for &r in candidates {
        adjacency.insert(r, graph.neighbors(r).filter(|n| candidates.contains(n) || precolored.contains_key(n)).collect());
    }

    let mut uf: FxHashMap<Register, Register> = candidates.iter().map(|&r| (r, r)).collect();
    let mut members: FxHashMap<Register, Vec<Register>> = candidates.iter().map(|&r| (r, vec![r])).collect();
    let mut remaining: FxHashSet<Register> = candidates.iter().copied().collect();
    let mut moves: Vec<(Register, Register)> = graph
        .moves
        .iter()
        .copied()
        .filter(|(a, b)| remaining.contains(a) && remaining.contains(b))
        .collect();
    let mut stack: Vec<Register> = Vec::new();

    while !remaining.is_empty() {
        let move_related: FxHashSet<Register> = moves.iter().flat_map(|&(a, b)| [a, b]).collect();

        if let Some(&r) = remaining
            .iter()
            .find(|&&r| !move_related.contains(&r) && adjacency[&r].len() < k)
        {
            remove_node(&mut adjacency, &mut remaining, r);
            stack.push(r);
            continue;
        }

        if let Some(idx) = moves.iter().position(|&(a, b)| coalescable(&adjacency, a, b, k)) {
            let (a, b) = moves.remove(idx);
            let (keep, drop) = (find(&mut uf, a), find(&mut uf, b));
            if keep != drop {
                merge_nodes(&mut adjacency, &mut remaining, &mut uf, &mut members, keep, drop);
            }
            moves.retain(|&(x, y)| find(&mut uf, x) != find(&mut uf, y));
            continue;
        }

        if let Some(&r) = remaining.iter().find(|&&r| move_related.contains(&r) && adjacency[&r].len() < k) {
            // Freeze: drop every move involving `r` so it can simplify next round.
            moves.retain(|&(a, b)| a != r && b != r);
            continue;
        }

        // Select-spill candidate: highest current degree.
        let r = *remaining.iter().max_by_key(|&&r| adjacency[&r].len()).expect("remaining is non-empty");
        remove_node(&mut adjacency, &mut remaining, r);
        stack.push(r);
    }

    let mut colors: FxHashMap<Register, Register> = precolored.clone();
    let mut spilled = Vec::new();

    // Neighbors of a coalesced group are the union of every merged member's
    // original neighbors, not just the representative's own — otherwise a
    // color could be picked that conflicts with a member absorbed via
    // coalescing.
    let mut full_adjacency: FxHashMap<Register, FxHashSet<Register>> = FxHashMap::default();
    for &r in candidates {
        let rep = find(&mut uf, r);
        full_adjacency.entry(rep).or_default().extend(graph.neighbors(r));
    }

    while let Some(r) = stack.pop() {
        let rep = find(&mut uf, r);
        let group = members.get(&rep).cloned().unwrap_or_else(|| vec![rep]);
        if let Some(&already) = colors.get(&rep) {
            for m in group {
                colors.insert(m, already);
            }
            continue;
        }
        let used: FxHashSet<Register> = full_adjacency
            .get(&rep)
            .into_iter()
            .flatten()
            .filter_map(|n| colors.get(n).copied())
            .collect();
        match palette.iter().find(|&&c| !used.contains(&c) && compatible(rep, c)) {
            Some(&c) => {
                for m in group {
                    colors.insert(m, c);
                }
            }
            None => spilled.extend(group),
        }
    }

    ColoringResult { colors, spilled }
}

fn remove_node(adjacency: &mut FxHashMap<Register, FxHashSet<Register>>, remaining: &mut FxHashSet<Register>, r: Register) {
    remaining.remove(&r);
    if let Some(neighbors) = adjacency.get(&r).cloned() {
        for n in neighbors {
            if let Some(set) = adjacency.get_mut(&n) {
                set.remove(&r);
            }
        }
    }
}

fn coalescable(adjacency: &FxHashMap<Register, FxHashSet<Register>>, a: Register, b: Register, k: usize) -> bool {
    let empty = FxHashSet::default();
    let na = adjacency.get(&a).unwrap_or(&empty);
    let nb = adjacency.get(&b).unwrap_or(&empty);
    if na.contains(&b) {
        return false; // already interferes, can never coalesce.
    }
    let merged: FxHashSet<Register> = na.union(nb).copied().collect();
    merged.iter().filter(|&&n| adjacency.get(&n).map(FxHashSet::len).unwrap_or(0) >= k).count() < k
}

fn merge_nodes(
    adjacency: &mut FxHashMap<Register, FxHashSet<Register>>,
    remaining: &mut FxHashSet<Register>,
    uf: &mut FxHashMap<Register, Register>,
    members: &mut FxHashMap<Register, Vec<Register>>,
    keep: Register,
    drop: Register,
) {
    let drop_neighbors = adjacency.remove(&drop).unwrap_or_default();
    for n in &drop_neighbors {
        if let Some(set) = adjacency.get_mut(n) {
            set.remove(&drop);
            set.insert(keep);
        }
        adjacency.entry(keep).or_default().insert(*n);
    }
    remaining.remove(&drop);
    uf.insert(drop, keep);
    let dropped_members = members.remove(&drop).unwrap_or_else(|| vec![drop]);
    members.entry(keep).or_insert_with(|| vec![keep]).extend(dropped_members);
}

fn find(uf: &mut FxHashMap<Register, Register>, r: Register) -> Register {
    let p = *uf.get(&r).unwrap_or(&r);
    if p == r {
        r
    } else {
        let root = find(uf, p);
        uf.insert(r, root);
        root
    }
}
