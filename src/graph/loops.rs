//! Natural-loop analysis (spec §4.2 "Loop analysis").
//!
//! For every back edge `(u, v)` with `v` dominating `u`, the natural loop
//! is the set of blocks that can reach `u` without passing through `v`,
//! plus `v` itself. Each block's `loop_level` property is incremented
//! once per loop it belongs to, so nested loops accumulate depth.

use crate::graph::dominance::Dominance;
use crate::ir::{BlockId, Cfg};
use rustc_hash::FxHashSet;

/// One natural loop: its header (`v` in the back edge) and its member
/// blocks (including the header).
pub struct NaturalLoop {
    pub header: BlockId,
    pub members: FxHashSet<BlockId>,
}

/// Compute all natural loops in `cfg` and increment `loop_level` on every
/// member block's [`crate::ir::BlockProps`] once per loop it belongs to.
pub fn analyze_loops(cfg: &mut Cfg, dom: &Dominance) -> Vec<NaturalLoop> {
    let _t = crate::timing::start("loop_analysis");
    let edges = cfg.back_edges(dom);
    let mut loops = Vec::new();

    for (u, v) in edges {
        let mut members = FxHashSet::default();
        members.insert(v);
        let mut stack = vec![u];
        members.insert(u);
        while let Some(b) = stack.pop() {
            for p in cfg.pred_iter(b) {
                if members.insert(p) {
                    stack.push(p);
                }
            }
        }
        loops.push(NaturalLoop { header: v, members });
    }

    for lp in &loops {
        for &b in &lp.members {
            cfg.block_mut(b).props.loop_level += 1;
        }
    }

    loops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::TieBreak;

    #[test]
    fn single_loop_body_has_level_one() {
        let mut cfg = Cfg::new("loop");
        let head = cfg.add_node();
        let body = cfg.add_node();
        let after = cfg.add_node();
        cfg.add_edge(cfg.entry(), head);
        cfg.add_edge(head, body);
        cfg.add_edge(body, head); // back edge
        cfg.add_edge(head, after);
        cfg.add_edge(after, cfg.exit());
        let _ = cfg.reverse_postorder(TieBreak::Ascending);
        let dom = Dominance::compute(&mut cfg);
        let loops = analyze_loops(&mut cfg, &dom);
        assert_eq!(loops.len(), 1);
        assert_eq!(cfg.block(body).props.loop_level, 1);
        assert_eq!(cfg.block(after).props.loop_level, 0);
        assert_eq!(cfg.block(head).props.loop_level, 1);
    }
}
