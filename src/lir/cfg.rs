//! LIR-level control-flow graph (spec §4.6: "the corresponding LIR block
//! that the CFG-copy pass pre-created").
//!
//! Mirrors [`crate::ir::Cfg`]'s block/edge shape exactly (same `BlockId`
//! numbering, same edges, same handler tags) but each block owns a
//! straight-line sequence of [`LirInst`] instead of a tree of MIR
//! statement roots — instruction selection never invents new control
//! flow, it only fills in bodies the copy pre-created.

use crate::ir::entities::{BlockId, HandlerTag};
use crate::ir::Cfg;
use crate::lir::inst::LirInst;
use cranelift_bforest::{Set, SetForest};
use cranelift_entity::PrimaryMap;

/// The control-flow shape a block ends with, as selection derived it from
/// the MIR terminator (spec §4.6 / §4.8). The trace builder rewrites this
/// in place to exploit fall-through once layout order is known.
#[derive(Clone, Debug)]
pub enum Terminator {
    /// Falls through to its unique successor with no explicit jump
    /// instruction (common right after instruction selection, before any
    /// block has been placed next to another).
    Fallthrough(BlockId),
    Jump(BlockId),
    /// `inverted` records whether the trace builder swapped
    /// `true_target`/`false_target` to exploit fall-through on the
    /// (now-)false arm; the emitter flips the underlying compare's
    /// condition code accordingly.
    Branch {
        true_target: BlockId,
        false_target: BlockId,
        inverted: bool,
    },
    Switch {
        cases: Vec<(i64, BlockId)>,
        default: BlockId,
    },
    Return,
}

pub struct LirBlock {
    pub insts: Vec<LirInst>,
    pub handler_tag: Option<HandlerTag>,
    preds: Set<BlockId>,
    succs: Set<BlockId>,
    /// Set by the trace builder (spec §3 "Trace").
    pub layout_next: Option<BlockId>,
    pub terminator: Terminator,
}

impl LirBlock {
    fn new(handler_tag: Option<HandlerTag>) -> Self {
        LirBlock {
            insts: Vec::new(),
            handler_tag,
            preds: Set::new(),
            succs: Set::new(),
            layout_next: None,
            terminator: Terminator::Return,
        }
    }
}

pub struct LirCfg {
    pub name: String,
    blocks: PrimaryMap<BlockId, LirBlock>,
    entry: BlockId,
    exit: BlockId,
    edge_forest: SetForest<BlockId>,
}

impl LirCfg {
    /// The CFG-copy pass: allocate one empty LIR block per MIR block,
    /// with identical ids, edges, and handler tags, ready for instruction
    /// selection to fill in.
    pub fn mirror_from(mir: &Cfg) -> Self {
        let mut blocks = PrimaryMap::new();
        for b in mir.blocks_iter() {
            let id = blocks.push(LirBlock::new(mir.handler_tag_of(b)));
            debug_assert_eq!(id, b, "LirCfg must reuse the MIR CFG's BlockId numbering");
        }
        let mut edge_forest = SetForest::new();
        for b in mir.blocks_iter() {
            for s in mir.succ_iter(b) {
                blocks[b].succs.insert(s, &mut edge_forest, &());
                blocks[s].preds.insert(b, &mut edge_forest, &());
            }
        }
        LirCfg {
            name: mir.name.clone(),
            blocks,
            entry: mir.entry(),
            exit: mir.exit(),
            edge_forest,
        }
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn exit(&self) -> BlockId {
        self.exit
    }

    pub fn block(&self, id: BlockId) -> &LirBlock {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut LirBlock {
        &mut self.blocks[id]
    }

    pub fn blocks_iter(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.keys()
    }

    pub fn pred_iter(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks[id].preds.iter(&self.edge_forest)
    }

    pub fn succ_iter(&self, id: BlockId) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks[id].succs.iter(&self.edge_forest)
    }

    pub fn succ_count(&self, id: BlockId) -> usize {
        self.succ_iter(id).count()
    }

    /// Allocate a new block with no edges yet, inheriting `handler_tag`
    /// (used by the coprocessor-access splitter, spec §4.6).
    pub fn add_block(&mut self, handler_tag: Option<HandlerTag>) -> BlockId {
        self.blocks.push(LirBlock::new(handler_tag))
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from].succs.insert(to, &mut self.edge_forest, &());
        self.blocks[to].preds.insert(from, &mut self.edge_forest, &());
    }

    pub fn delete_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from].succs.remove(to, &mut self.edge_forest);
        self.blocks[to].preds.remove(from, &mut self.edge_forest);
    }
}
