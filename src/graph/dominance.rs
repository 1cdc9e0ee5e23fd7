//! Dominance computation (spec §4.2 "Dominance").
//!
//! Implements the iterative Cooper-Harvey-Kennedy algorithm: number blocks
//! in reverse postorder, initialize `idom` to "undefined" except the
//! entry block, then iterate computing each block's new `idom` as the
//! intersection of all predecessors' current `idom`s using postorder
//! numbers and the "finger" walking technique, to a fixed point.
//! Dominance frontiers are then computed in one pass per spec.

use crate::ir::{BlockId, Cfg, TieBreak};
use rustc_hash::FxHashMap;

/// Computed dominance information for one function.
pub struct Dominance {
    /// Reverse-postorder number assigned to each reachable block; higher
    /// numbers are later in RPO (entry is 0).
    rpo_number: FxHashMap<BlockId, u32>,
    idom: FxHashMap<BlockId, BlockId>,
    children: FxHashMap<BlockId, Vec<BlockId>>,
    frontier: FxHashMap<BlockId, Vec<BlockId>>,
    entry: BlockId,
}

impl Dominance {
    /// Compute dominance for `cfg`. Requires `cfg`'s entry block to reach
    /// every block the caller cares about; unreachable blocks simply get
    /// no entry in the tables.
    pub fn compute(cfg: &mut Cfg) -> Self {
        let _t = crate::timing::start("dominance");
        let rpo = cfg.reverse_postorder(TieBreak::Ascending);
        let entry = cfg.entry();

        let mut rpo_number = FxHashMap::default();
        for (i, &b) in rpo.iter().enumerate() {
            rpo_number.insert(b, i as u32);
        }

        let mut idom: FxHashMap<BlockId, BlockId> = FxHashMap::default();
        idom.insert(entry, entry);

        // Predecessors restricted to reachable blocks, in the same order
        // as they appear in `rpo` (skip entry, which is block 0).
        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                let preds: Vec<BlockId> = cfg
                    .pred_iter(b)
                    .filter(|p| rpo_number.contains_key(p))
                    .collect();
                let mut new_idom = None;
                for &p in &preds {
                    if !idom.contains_key(&p) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => Self::intersect(&idom, &rpo_number, cur, p),
                    });
                }
                if let Some(new_idom) = new_idom {
                    if idom.get(&b) != Some(&new_idom) {
                        idom.insert(b, new_idom);
                        changed = true;
                    }
                }
            }
        }
        // The entry's own idom edge is an artifact of the algorithm's
        // seeding; spec leaves entry's idom undefined (it dominates
        // itself trivially but is nobody's "proper ancestor").
        idom.remove(&entry);

        let mut children: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        for (&b, &d) in &idom {
            children.entry(d).or_default().push(b);
        }

        let mut dom = Dominance {
            rpo_number,
            idom,
            children,
            frontier: FxHashMap::default(),
            entry,
        };
        dom.compute_frontiers(cfg);
        dom
    }

    fn intersect(
        idom: &FxHashMap<BlockId, BlockId>,
        rpo_number: &FxHashMap<BlockId, u32>,
        mut a: BlockId,
        mut b: BlockId,
    ) -> BlockId {
        while a != b {
            while rpo_number[&a] > rpo_number[&b] {
                a = idom[&a];
            }
            while rpo_number[&b] > rpo_number[&a] {
                b = idom[&b];
            }
        }
        a
    }

    /// For every block with >=2 predecessors, walk up the dominator tree
    /// from each predecessor until (not including) the block's idom,
    /// adding the block to each ancestor's frontier along the way.
    fn compute_frontiers(&mut self, cfg: &Cfg) {
        for b in cfg.blocks_iter() {
            if cfg.pred_count(b) < 2 {
                continue;
            }
            for p in cfg.pred_iter(b) {
                if !self.rpo_number.contains_key(&p) {
                    continue;
                }
                let mut runner = p;
                let idom_b = self.idom.get(&b).copied();
                while Some(runner) != idom_b {
                    self.frontier.entry(runner).or_default().push(b);
                    match self.idom.get(&runner) {
                        Some(&next) if next != runner => runner = next,
                        _ => break,
                    }
                }
            }
        }
        for v in self.frontier.values_mut() {
            v.sort();
            v.dedup();
        }
    }

    /// Immediate dominator of `b`, or `None` for the entry block or an
    /// unreachable block.
    pub fn idom(&self, b: BlockId) -> Option<BlockId> {
        self.idom.get(&b).copied()
    }

    pub fn dom_children(&self, b: BlockId) -> &[BlockId] {
        self.children.get(&b).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dominance_frontier(&self, b: BlockId) -> &[BlockId] {
        self.frontier.get(&b).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True iff `a` dominates `b` (every path from entry to `b` passes
    /// through `a`); every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut cur = b;
        while let Some(&d) = self.idom.get(&cur) {
            if d == a {
                return true;
            }
            if d == cur {
                break;
            }
            cur = d;
        }
        false
    }

    pub fn is_reachable(&self, b: BlockId) -> bool {
        b == self.entry || self.idom.contains_key(&b)
    }

    /// Walk the dominator tree in preorder starting at the entry block.
    pub fn preorder(&self) -> Vec<BlockId> {
        let mut order = Vec::new();
        let mut stack = vec![self.entry];
        while let Some(b) = stack.pop() {
            order.push(b);
            let mut children = self.dom_children(b).to_vec();
            children.sort();
            children.reverse();
            stack.extend(children);
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Cfg;

    /// Diamond: entry -> a -> {b, c} -> d -> exit.
    fn diamond() -> (Cfg, BlockId, BlockId, BlockId, BlockId) {
        let mut cfg = Cfg::new("diamond");
        let a = cfg.add_node();
        let b = cfg.add_node();
        let c = cfg.add_node();
        let d = cfg.add_node();
        cfg.add_edge(cfg.entry(), a);
        cfg.add_edge(a, b);
        cfg.add_edge(a, c);
        cfg.add_edge(b, d);
        cfg.add_edge(c, d);
        cfg.add_edge(d, cfg.exit());
        (cfg, a, b, c, d)
    }

    #[test]
    fn idom_is_proper_ancestor() {
        let (mut cfg, ..) = diamond();
        let blocks: Vec<_> = cfg.blocks_iter().collect();
        let dom = Dominance::compute(&mut cfg);
        for &b in &blocks {
            if b == cfg.entry() || !dom.is_reachable(b) {
                continue;
            }
            let idom = dom.idom(b).expect("reachable non-entry block has idom");
            assert!(dom.dominates(idom, b));
            assert_ne!(idom, b);
        }
    }

    #[test]
    fn merge_point_frontier() {
        let (mut cfg, a, ..) = diamond();
        let dom = Dominance::compute(&mut cfg);
        // `a`'s idom is entry; a's two successors b, c each have
        // dominance frontier {d} since d is where paths through b or c
        // rejoin without being strictly dominated by b or c.
        let succs: Vec<_> = cfg.succ_iter(a).collect();
        for s in succs {
            let frontier = dom.dominance_frontier(s);
            assert_eq!(frontier.len(), 1);
        }
    }
}
