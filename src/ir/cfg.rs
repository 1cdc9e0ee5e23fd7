//! Control-flow graph (spec §3 "Control-flow graph (CFG)", §4.2).
//!
//! Grounded on `cranelift_codegen::flowgraph::ControlFlowGraph` for the
//! general shape (bforest-backed predecessor/successor sets rebuilt from
//! the function body) but generalized to own its basic blocks and nodes
//! directly in arenas, per the REDESIGN FLAGS in spec §9: a CFG is a
//! monotonically-growing region freed whole, rather than a graph of
//! individually `delete`d heap nodes.

use crate::ir::block::{BasicBlock, BlockRole};
use crate::ir::entities::{BlockId, HandlerTag, NodeId};
use crate::ir::node::MirNode;
use cranelift_bforest::SetForest;
use cranelift_entity::PrimaryMap;
use rustc_hash::FxHashSet;

/// Two tie-break policies for ordering sibling successors when multiple
/// visit orders are otherwise equally valid (spec §4.2: "two tie-break
/// policies are provided; the dominance pass requires one of them").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TieBreak {
    /// Visit successors in ascending `BlockId` order. Used by the
    /// dominance pass so that reverse-postorder numbering is
    /// deterministic across runs.
    Ascending,
    /// Visit successors in the order edges were added (CFG construction
    /// order). Useful for matching source-level branch layout.
    InsertionOrder,
}

/// A control-flow graph of [`BasicBlock`]s plus the MIR node arena they
/// reference (spec §3).
pub struct Cfg {
    pub name: String,
    blocks: PrimaryMap<BlockId, BasicBlock>,
    nodes: PrimaryMap<NodeId, MirNode>,
    entry: BlockId,
    exit: BlockId,
    edge_forest: SetForest<BlockId>,
    pub is_ssa: bool,
    /// Iteration cache: last-computed reverse postorder, invalidated on
    /// any graph edit (spec §3: "an iteration cache (sorted orders)").
    rpo_cache: Option<Vec<BlockId>>,
}

impl Cfg {
    /// Create an empty CFG with just its entry and exit blocks
    /// (spec §3 invariant: entry has no predecessors, exit has no
    /// successors).
    pub fn new(name: impl Into<String>) -> Self {
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(BasicBlock::new(BlockRole::Entry));
        let exit = blocks.push(BasicBlock::new(BlockRole::Exit));
        Cfg {
            name: name.into(),
            blocks,
            nodes: PrimaryMap::new(),
            entry,
            exit,
            edge_forest: SetForest::new(),
            is_ssa: false,
            rpo_cache: None,
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn exit(&self) -> BlockId {
        self.exit
    }

    /// Allocate a new ordinary block (spec: `add_node`).
    pub fn add_node(&mut self) -> BlockId {
        self.rpo_cache = None;
        self.blocks.push(BasicBlock::new(BlockRole::Ordinary))
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id]
    }

    pub fn blocks_iter(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.keys()
    }

    /// Allocate a MIR node, returning its id.
    pub fn add_stmt(&mut self, node: MirNode) -> NodeId {
        self.nodes.push(node)
    }

    pub fn node(&self, id: NodeId) -> &MirNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut MirNode {
        &mut self.nodes[id]
    }

    pub fn nodes(&self) -> &PrimaryMap<NodeId, MirNode> {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut PrimaryMap<NodeId, MirNode> {
        &mut self.nodes
    }

    /// Add a directed edge `from -> to`, consistency-preserving in both
    /// directions (spec §4.2 `add_edge`).
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.rpo_cache = None;
        self.blocks[from].add_succ(&mut self.edge_forest, to);
        self.blocks[to].add_pred(&mut self.edge_forest, from);
    }

    /// Remove a directed edge, in both directions (spec §4.2 `delete_edge`).
    pub fn delete_edge(&mut self, from: BlockId, to: BlockId) {
        self.rpo_cache = None;
        self.blocks[from].remove_succ(&mut self.edge_forest, to);
        self.blocks[to].remove_pred(&mut self.edge_forest, from);
    }

    /// Remove a block entirely: all of its edges are first severed so no
    /// dangling reference remains (spec §4.2 `delete_node`). The node
    /// arena entries the block's statements pointed to are left in place
    /// (node storage is freed only when the whole `Cfg` drops) but the
    /// block itself becomes unreachable from `blocks_iter`'s callers once
    /// they recompute successors/predecessors; we mark it by clearing its
    /// statement list and edges rather than physically compacting the
    /// arena, which would invalidate every other `BlockId` in the
    /// function.
    pub fn delete_node(&mut self, id: BlockId) {
        let preds: Vec<BlockId> = self.pred_iter(id).collect();
        let succs: Vec<BlockId> = self.succ_iter(id).collect();
        for p in preds {
            self.delete_edge(p, id);
        }
        for s in succs {
            self.delete_edge(id, s);
        }
        self.blocks[id].stmts_mut().clear();
        self.rpo_cache = None;
    }

    pub fn pred_iter(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks[id].preds_set().iter(&self.edge_forest)
    }

    pub fn succ_iter(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks[id].succs_set().iter(&self.edge_forest)
    }

    pub fn pred_count(&self, id: BlockId) -> usize {
        self.pred_iter(id).count()
    }

    pub fn succ_count(&self, id: BlockId) -> usize {
        self.succ_iter(id).count()
    }

    /// An owning list of every block id currently live in the CFG
    /// (spec §4.2 `get_bb_list`; in Rust this is just an owned `Vec`,
    /// there is no separate release step).
    pub fn get_bb_list(&self) -> Vec<BlockId> {
        self.blocks
            .keys()
            .filter(|&b| b == self.entry || !self.blocks[b].is_empty() || self.pred_count(b) > 0)
            .collect()
    }

    fn successors_ordered(&self, id: BlockId, tie: TieBreak) -> Vec<BlockId> {
        let mut succs: Vec<BlockId> = self.succ_iter(id).collect();
        match tie {
            TieBreak::Ascending => succs.sort(),
            TieBreak::InsertionOrder => {}
        }
        succs
    }

    /// Preorder DFS from the entry block.
    pub fn preorder(&self, tie: TieBreak) -> Vec<BlockId> {
        let mut visited = FxHashSet::default();
        let mut order = Vec::new();
        let mut stack = vec![self.entry];
        while let Some(b) = stack.pop() {
            if !visited.insert(b) {
                continue;
            }
            order.push(b);
            let mut succs = self.successors_ordered(b, tie);
            succs.reverse();
            stack.extend(succs);
        }
        order
    }

    /// Postorder DFS from the entry block.
    pub fn postorder(&self, tie: TieBreak) -> Vec<BlockId> {
        let mut visited = FxHashSet::default();
        let mut order = Vec::new();
        self.postorder_visit(self.entry, tie, &mut visited, &mut order);
        order
    }

    fn postorder_visit(
        &self,
        b: BlockId,
        tie: TieBreak,
        visited: &mut FxHashSet<BlockId>,
        order: &mut Vec<BlockId>,
    ) {
        if !visited.insert(b) {
            return;
        }
        for s in self.successors_ordered(b, tie) {
            self.postorder_visit(s, tie, visited, order);
        }
        order.push(b);
    }

    /// Reverse postorder, cached until the next graph edit
    /// (spec §3: "an iteration cache (sorted orders)").
    pub fn reverse_postorder(&mut self, tie: TieBreak) -> Vec<BlockId> {
        if let Some(cached) = &self.rpo_cache {
            return cached.clone();
        }
        let mut po = self.postorder(tie);
        po.reverse();
        self.rpo_cache = Some(po.clone());
        po
    }

    /// Edges `(u, v)` such that `v` dominates `u` (spec §4.2 `back_edges`).
    /// Requires a computed dominator tree; see [`crate::graph::dominance`].
    pub fn back_edges(&self, dom: &crate::graph::dominance::Dominance) -> Vec<(BlockId, BlockId)> {
        let mut edges = Vec::new();
        for u in self.blocks_iter() {
            for v in self.succ_iter(u) {
                if dom.dominates(v, u) {
                    edges.push((u, v));
                }
            }
        }
        edges
    }

    /// True iff `(u, v)` is a critical edge: `u` has more than one
    /// successor and `v` has more than one predecessor (spec §4.2, GLOSSARY).
    pub fn is_critical_edge(&self, u: BlockId, v: BlockId) -> bool {
        self.succ_count(u) > 1 && self.pred_count(v) > 1
    }

    pub fn handler_tag_of(&self, b: BlockId) -> Option<HandlerTag> {
        self.blocks[b].handler_tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (Cfg, BlockId, BlockId) {
        let mut cfg = Cfg::new("diamond");
        let a = cfg.add_node();
        let b = cfg.add_node();
        cfg.add_edge(cfg.entry(), a);
        cfg.add_edge(a, b);
        cfg.add_edge(a, cfg.exit());
        cfg.add_edge(b, cfg.exit());
        (cfg, a, b)
    }

    #[test]
    fn edges_consistent_both_directions() {
        let (cfg, a, b) = diamond();
        assert_eq!(cfg.succ_iter(a).collect::<Vec<_>>(), vec![b, cfg.exit()]);
        assert_eq!(cfg.pred_iter(b).collect::<Vec<_>>(), vec![a]);
        assert_eq!(cfg.pred_count(cfg.entry()), 0);
        assert_eq!(cfg.succ_count(cfg.exit()), 0);
    }

    #[test]
    fn delete_node_severs_all_edges() {
        let (mut cfg, a, b) = diamond();
        cfg.delete_node(a);
        assert_eq!(cfg.pred_count(b), 0);
        assert_eq!(cfg.pred_count(cfg.exit()), 1);
    }

    #[test]
    fn critical_edge_detection() {
        let (cfg, a, b) = diamond();
        // a -> exit is NOT critical: exit has two preds but a has two succs... check definition
        assert!(cfg.is_critical_edge(a, cfg.exit()));
        assert!(!cfg.is_critical_edge(b, cfg.exit()));
    }
}
