//! Basic blocks (spec §3 "Basic block").

use crate::ir::entities::{HandlerTag, NodeId};
use cranelift_bforest::{Set, SetForest};

/// Reserved block identifiers for the unique entry and exit blocks
/// (spec §3: "Reserved identifiers mark the unique entry and exit
/// blocks"). Concrete numeric identity is assigned by the owning
/// [`crate::ir::cfg::Cfg`]; these are semantic roles, tracked per block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockRole {
    Entry,
    Exit,
    Ordinary,
}

/// Per-block results of analyses (spec §3): immediate dominator, dominator
/// tree children, dominance frontier, loop nesting level. Kept as a fixed
/// struct (REDESIGN FLAGS, spec §9) rather than a string-keyed map because
/// every later pass touches these.
#[derive(Clone, Debug, Default)]
pub struct BlockProps {
    pub idom: Option<crate::ir::entities::BlockId>,
    pub dom_children: Vec<crate::ir::entities::BlockId>,
    pub dom_frontier: Vec<crate::ir::entities::BlockId>,
    pub loop_level: u32,
    /// Reverse-postorder number, assigned by the dominance pass and
    /// reused by later passes that need a topological-ish order.
    pub rpo_number: Option<u32>,
    /// Block that follows this one in emission order, set by the trace
    /// builder (spec §3 "Trace": "this property alone determines
    /// fall-through behavior in the emitter").
    pub layout_next: Option<crate::ir::entities::BlockId>,
}

/// A basic block: an ordered list of MIR statement roots plus typed edges
/// to predecessors and successors (spec §3).
pub struct BasicBlock {
    pub role: BlockRole,
    stmts: Vec<NodeId>,
    preds: Set<crate::ir::entities::BlockId>,
    succs: Set<crate::ir::entities::BlockId>,
    pub handler_tag: Option<HandlerTag>,
    pub props: BlockProps,
}

impl BasicBlock {
    pub fn new(role: BlockRole) -> Self {
        BasicBlock {
            role,
            stmts: Vec::new(),
            preds: Set::new(),
            succs: Set::new(),
            handler_tag: None,
            props: BlockProps::default(),
        }
    }

    /// Append a statement root. Only one terminator may ever be appended
    /// (spec §3 invariant) — callers push ordinary statements, then
    /// exactly one terminator last.
    pub fn push_stmt(&mut self, id: NodeId) {
        self.stmts.push(id);
    }

    pub fn stmts(&self) -> &[NodeId] {
        &self.stmts
    }

    pub fn stmts_mut(&mut self) -> &mut Vec<NodeId> {
        &mut self.stmts
    }

    pub fn terminator(&self) -> Option<NodeId> {
        self.stmts.last().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    pub(crate) fn preds_set(&self) -> &Set<crate::ir::entities::BlockId> {
        &self.preds
    }

    pub(crate) fn succs_set(&self) -> &Set<crate::ir::entities::BlockId> {
        &self.succs
    }

    pub(crate) fn add_pred(&mut self, forest: &mut SetForest<crate::ir::entities::BlockId>, b: crate::ir::entities::BlockId) {
        self.preds.insert(b, forest, &());
    }

    pub(crate) fn remove_pred(&mut self, forest: &mut SetForest<crate::ir::entities::BlockId>, b: crate::ir::entities::BlockId) {
        self.preds.remove(b, forest);
    }

    pub(crate) fn add_succ(&mut self, forest: &mut SetForest<crate::ir::entities::BlockId>, b: crate::ir::entities::BlockId) {
        self.succs.insert(b, forest, &());
    }

    pub(crate) fn remove_succ(&mut self, forest: &mut SetForest<crate::ir::entities::BlockId>, b: crate::ir::entities::BlockId) {
        self.succs.remove(b, forest);
    }
}
