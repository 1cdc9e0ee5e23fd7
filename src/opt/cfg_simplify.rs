//! Control-flow simplification (spec §4.4 step 5).
//!
//! Six sub-rewrites, each re-run to a fixed point since one can expose
//! another: constant-condition branches/switches collapse to a plain
//! jump, a switch left with only one reachable case besides its default
//! collapses to an if, jump-to-jump blocks get threaded away, empty
//! single-pred/single-succ blocks are elided, and blocks no longer
//! reachable from entry are deleted.

use crate::error::CodegenResult;
use crate::ir::node::StmtExt;
use crate::ir::{BlockId, Cfg, MirNode, NodeId, Opcode, Operand};
use crate::opt::OptPass;

pub struct ControlFlowSimplify;

impl OptPass for ControlFlowSimplify {
    fn name(&self) -> &'static str {
        "cfg_simplify"
    }

    fn run(&mut self, cfg: &mut Cfg) -> CodegenResult<bool> {
        let mut changed = false;
        loop {
            let mut round = false;
            round |= simplify_constant_terminators(cfg);
            round |= simplify_single_case_switches(cfg);
            round |= thread_jump_to_jump_blocks(cfg);
            round |= eliminate_empty_blocks(cfg);
            round |= remove_unreachable_blocks(cfg);
            changed |= round;
            if !round {
                break;
            }
        }
        Ok(changed)
    }
}

fn as_int_const(cfg: &Cfg, id: NodeId) -> Option<i64> {
    let node = cfg.node(id);
    match (node.opcode, node.operand) {
        (Opcode::Const, Some(Operand::Int(v))) => Some(v),
        _ => None,
    }
}

/// Rewrite a `Branch`/`Switch` whose condition/scrutinee is a known
/// constant into an unconditional `Jump`, pruning the edges to whichever
/// targets are now provably unreachable.
fn simplify_constant_terminators(cfg: &mut Cfg) -> bool {
    let mut changed = false;
    for b in cfg.blocks_iter().collect::<Vec<_>>() {
        let Some(term) = cfg.block(b).terminator() else {
            continue;
        };
        let node = cfg.node(term);
        match (&node.stmt, node.kid(0)) {
            (Some(StmtExt::Branch { true_target, false_target }), Some(cond)) => {
                let Some(c) = as_int_const(cfg, cond) else { continue };
                let (taken, dropped) = if c != 0 {
                    (*true_target, *false_target)
                } else {
                    (*false_target, *true_target)
                };
                rewrite_as_jump(cfg, b, term, taken, dropped);
                changed = true;
            }
            (Some(StmtExt::Switch { cases, default }), Some(scrut)) => {
                let Some(c) = as_int_const(cfg, scrut) else { continue };
                let taken = cases
                    .iter()
                    .find(|(v, _)| *v == c)
                    .map(|(_, t)| *t)
                    .unwrap_or(*default);
                let all_targets: Vec<BlockId> = cases
                    .iter()
                    .map(|(_, t)| *t)
                    .chain(std::iter::once(*default))
                    .collect();
                for t in all_targets {
                    if t != taken {
                        cfg.delete_edge(b, t);
                    }
                }
                let node = cfg.node_mut(term);
                node.opcode = Opcode::Jump;
                node.set_kid(0, None);
                node.stmt = Some(StmtExt::Jump { target: taken });
                changed = true;
            }
            _ => {}
        }
    }
    changed
}

/// Rewrite a `Switch` with only one reachable case target besides its
/// default into an `if` (`Branch` on `scrutinee == case_value`): a switch
/// with a single case is no more expressive than a two-way branch, and
/// the branch form lets later passes (constant folding, instruction
/// selection) treat it like any other conditional instead of special-
/// casing a one-arm switch table.
fn simplify_single_case_switches(cfg: &mut Cfg) -> bool {
    let mut changed = false;
    for b in cfg.blocks_iter().collect::<Vec<_>>() {
        let Some(term) = cfg.block(b).terminator() else {
            continue;
        };
        let node = cfg.node(term);
        let Some(scrut) = node.kid(0) else { continue };
        let Some(StmtExt::Switch { cases, default }) = &node.stmt else {
            continue;
        };
        if cases.len() != 1 {
            continue;
        }
        let (value, taken) = cases[0];
        let default = *default;

        let value_node = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(value)));
        let cond = cfg.add_stmt(MirNode::new(Opcode::Eq).with_kid0(scrut).with_kid1(value_node));

        let node = cfg.node_mut(term);
        node.opcode = Opcode::Branch;
        node.set_kid(0, Some(cond));
        node.stmt = Some(StmtExt::Branch { true_target: taken, false_target: default });
        changed = true;
    }
    changed
}

fn rewrite_as_jump(cfg: &mut Cfg, block: BlockId, term: NodeId, taken: BlockId, dropped: BlockId) {
    cfg.delete_edge(block, dropped);
    let node = cfg.node_mut(term);
    node.opcode = Opcode::Jump;
    node.set_kid(0, None);
    node.stmt = Some(StmtExt::Jump { target: taken });
}

/// Retarget every predecessor of a block whose entire body is a single
/// unconditional jump directly to that jump's target, then drop the
/// now-unreachable empty block.
fn thread_jump_to_jump_blocks(cfg: &mut Cfg) -> bool {
    let mut changed = false;
    for b in cfg.blocks_iter().collect::<Vec<_>>() {
        if b == cfg.entry() || b == cfg.exit() {
            continue;
        }
        let stmts = cfg.block(b).stmts();
        if stmts.len() != 1 {
            continue;
        }
        let only = stmts[0];
        let Some(StmtExt::Jump { target }) = cfg.node(only).stmt.clone() else {
            continue;
        };
        if target == b {
            continue; // self-loop, nothing useful to thread.
        }
        for pred in cfg.pred_iter(b).collect::<Vec<_>>() {
            retarget_terminator(cfg, pred, b, target);
            cfg.delete_edge(pred, b);
            cfg.add_edge(pred, target);
            changed = true;
        }
    }
    changed
}

fn retarget_terminator(cfg: &mut Cfg, block: BlockId, from: BlockId, to: BlockId) {
    let Some(term) = cfg.block(block).terminator() else {
        return;
    };
    let node = cfg.node_mut(term);
    if let Some(stmt) = &mut node.stmt {
        match stmt {
            StmtExt::Jump { target } if *target == from => *target = to,
            StmtExt::Branch { true_target, false_target } => {
                if *true_target == from {
                    *true_target = to;
                }
                if *false_target == from {
                    *false_target = to;
                }
            }
            StmtExt::Switch { cases, default } => {
                for (_, t) in cases.iter_mut() {
                    if *t == from {
                        *t = to;
                    }
                }
                if *default == from {
                    *default = to;
                }
            }
            _ => {}
        }
    }
}

/// Elide a block with exactly one predecessor, exactly one successor, and
/// no statements of its own, by redirecting its predecessor's terminator
/// straight to its successor. Unlike [`thread_jump_to_jump_blocks`], this
/// targets blocks that carry no `Jump` statement at all (e.g. ones left
/// behind once [`remove_unreachable_blocks`] or another rewrite empties
/// them out), so it is not subsumed by the jump-threading rewrite.
fn eliminate_empty_blocks(cfg: &mut Cfg) -> bool {
    let mut changed = false;
    for b in cfg.blocks_iter().collect::<Vec<_>>() {
        if b == cfg.entry() || b == cfg.exit() {
            continue;
        }
        if !cfg.block(b).stmts().is_empty() {
            continue;
        }
        if cfg.pred_count(b) != 1 || cfg.succ_count(b) != 1 {
            continue;
        }
        let Some(pred) = cfg.pred_iter(b).next() else { continue };
        let Some(succ) = cfg.succ_iter(b).next() else { continue };
        if pred == b || succ == b {
            continue; // self-loop through an empty block, leave it alone.
        }
        retarget_terminator(cfg, pred, b, succ);
        cfg.delete_edge(pred, b);
        cfg.delete_edge(b, succ);
        cfg.add_edge(pred, succ);
        changed = true;
    }
    changed
}

/// Delete any non-entry block with no remaining predecessors.
fn remove_unreachable_blocks(cfg: &mut Cfg) -> bool {
    let mut changed = false;
    for b in cfg.blocks_iter().collect::<Vec<_>>() {
        if b == cfg.entry() || b == cfg.exit() {
            continue;
        }
        if cfg.pred_count(b) == 0 {
            cfg.delete_node(b);
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MirNode;

    #[test]
    fn constant_branch_collapses_to_jump() {
        let mut cfg = Cfg::new("f");
        let t = cfg.add_node();
        let f = cfg.add_node();
        cfg.add_edge(cfg.entry(), t);
        cfg.add_edge(cfg.entry(), f);
        cfg.add_edge(t, cfg.exit());
        cfg.add_edge(f, cfg.exit());

        let cond = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(1)));
        let branch = cfg
            .add_stmt(MirNode::new(Opcode::Branch).with_kid0(cond).with_stmt(StmtExt::Branch {
                true_target: t,
                false_target: f,
            }));
        cfg.block_mut(cfg.entry()).push_stmt(branch);

        let mut pass = ControlFlowSimplify;
        assert!(pass.run(&mut cfg).unwrap());
        assert_eq!(cfg.node(branch).opcode, Opcode::Jump);
        assert_eq!(cfg.pred_count(f), 0);
    }

    #[test]
    fn empty_jump_block_is_threaded_away() {
        let mut cfg = Cfg::new("f");
        let mid = cfg.add_node();
        let tgt = cfg.add_node();
        cfg.add_edge(cfg.entry(), mid);
        cfg.add_edge(mid, tgt);
        cfg.add_edge(tgt, cfg.exit());

        let jump = cfg.add_stmt(MirNode::new(Opcode::Jump).with_stmt(StmtExt::Jump { target: tgt }));
        cfg.block_mut(mid).push_stmt(jump);
        let entry_jump = cfg.add_stmt(MirNode::new(Opcode::Jump).with_stmt(StmtExt::Jump { target: mid }));
        cfg.block_mut(cfg.entry()).push_stmt(entry_jump);

        let mut pass = ControlFlowSimplify;
        assert!(pass.run(&mut cfg).unwrap());
        assert_eq!(cfg.pred_count(mid), 0);
        assert!(cfg.pred_iter(tgt).any(|p| p == cfg.entry()));
    }
}
