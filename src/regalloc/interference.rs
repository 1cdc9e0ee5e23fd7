//! Interference graph construction (spec §4.7 "build").
//!
//! Walks each block's instructions in reverse, starting from its
//! live-out set: every pair of registers simultaneously live across a
//! definition interferes, except a move's own `(dst, src)` pair, which is
//! recorded separately as a coalescing candidate instead (the standard
//! Chaitin-Briggs move-aware construction).

use crate::lir::LirCfg;
use crate::reg::Register;
use crate::regalloc::liveness::Liveness;
use rustc_hash::{FxHashMap, FxHashSet};

pub struct InterferenceGraph {
    adjacency: FxHashMap<Register, FxHashSet<Register>>,
    /// `(dst, src)` move pairs, in the order encountered, for coalescing.
    pub moves: Vec<(Register, Register)>,
}

impl InterferenceGraph {
    fn add_node(&mut self, r: Register) {
        self.adjacency.entry(r).or_default();
    }

    fn add_edge(&mut self, a: Register, b: Register) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn neighbors(&self, r: Register) -> impl Iterator<Item = Register> + '_ {
        self.adjacency.get(&r).into_iter().flatten().copied()
    }

    pub fn degree(&self, r: Register) -> usize {
        self.adjacency.get(&r).map(FxHashSet::len).unwrap_or(0)
    }

    pub fn interferes(&self, a: Register, b: Register) -> bool {
        self.adjacency.get(&a).map(|s| s.contains(&b)).unwrap_or(false)
    }

    pub fn remove_node(&mut self, r: Register) {
        if let Some(neighbors) = self.adjacency.remove(&r) {
            for n in neighbors {
                if let Some(set) = self.adjacency.get_mut(&n) {
                    set.remove(&r);
                }
            }
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = Register> + '_ {
        self.adjacency.keys().copied()
    }
}

pub fn build(lir: &LirCfg, live: &Liveness) -> InterferenceGraph {
    let _t = crate::timing::start("build_interference");
    let mut graph = InterferenceGraph { adjacency: FxHashMap::default(), moves: Vec::new() };

    for b in lir.blocks_iter() {
        let insts = &lir.block(b).insts;
        let after = &live.after_inst[&b];
        for (inst, live_after) in insts.iter().zip(after.iter()) {
            for r in live_after {
                graph.add_node(*r);
            }
            let move_src = inst.get_from().filter(|_| inst.get_to().is_some());
            for d in inst.defs() {
                graph.add_node(d);
                for &other in live_after {
                    if Some(other) == move_src {
                        continue;
                    }
                    graph.add_edge(d, other);
                }
            }
            if let (Some(dst), Some(src)) = (inst.get_to(), inst.get_from()) {
                graph.moves.push((dst, src));
            }
        }
    }
    graph
}
