//! SSA destruction (spec §4.3 "Destruction", "Spurious φ removal").
//!
//! Precondition: no critical edges (run [`crate::graph::split_critical_edges`]
//! first). For every `x_k = phi(x_i from P1, x_j from P2, ...)`, emits a
//! copy `x_k <- x_iα` at the tail of each predecessor `Pα` (before its
//! terminator) and deletes the phi. `Invalid` arguments are skipped: they
//! mark a path where the variable was never defined.

use crate::ir::node::{PhiArg, StmtExt};
use crate::ir::{BlockId, Cfg, MirNode, NodeId, Opcode};

/// Destroy SSA form in `cfg`, replacing every phi with copies on
/// predecessor edges.
pub fn destruct_ssa(cfg: &mut Cfg) {
    let _t = crate::timing::start("ssa_destruct");
    debug_assert!(
        !has_critical_edges(cfg),
        "SSA destruction requires critical edges to have been split first"
    );

    for b in cfg.blocks_iter().collect::<Vec<_>>() {
        let preds: Vec<BlockId> = cfg.pred_iter(b).collect();
        let phis: Vec<NodeId> = cfg
            .block(b)
            .stmts()
            .iter()
            .copied()
            .take_while(|&s| matches!(cfg.node(s).opcode, Opcode::Phi))
            .collect();
        if phis.is_empty() {
            continue;
        }

        for &phi in &phis {
            let dst = cfg.node(phi).defined_reg().expect("phi defines a register");
            let Some(StmtExt::Phi { args }) = cfg.node(phi).stmt.clone() else {
                continue;
            };
            for (idx, arg) in args.into_iter().enumerate() {
                let PhiArg::Reg(src) = arg else { continue };
                if src == dst {
                    continue; // trivial self-copy, nothing to do.
                }
                let Some(&pred) = preds.get(idx) else { continue };
                insert_copy_before_terminator(cfg, pred, dst, src);
            }
        }

        // Remove the phi statements now that every use has a copy feeding it.
        cfg.block_mut(b)
            .stmts_mut()
            .retain(|s| !phis.contains(s));
    }

    cfg.is_ssa = false;
}

fn insert_copy_before_terminator(
    cfg: &mut Cfg,
    block: BlockId,
    dst: crate::reg::Register,
    src: crate::reg::Register,
) {
    let copy = MirNode::new(Opcode::Copy).with_def(dst).with_kid0(
        cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(src)),
    );
    let handler_tag = cfg.handler_tag_of(block);
    let copy = match handler_tag {
        Some(t) => copy.with_handler_tag(t),
        None => copy,
    };
    let id = cfg.add_stmt(copy);
    let stmts = cfg.block_mut(block).stmts_mut();
    let insert_at = if stmts.last().map(|&t| cfg_is_terminator(cfg, t)).unwrap_or(false) {
        stmts.len() - 1
    } else {
        stmts.len()
    };
    stmts.insert(insert_at, id);
}

fn cfg_is_terminator(cfg: &Cfg, id: NodeId) -> bool {
    cfg.node(id).is_terminator()
}

fn has_critical_edges(cfg: &Cfg) -> bool {
    cfg.blocks_iter().any(|u| {
        cfg.succ_iter(u)
            .any(|v| cfg.is_critical_edge(u, v))
    })
}

/// Remove any phi whose result register is never used, re-iterating to a
/// fixed point since deleting one phi can render another's only use dead
/// (spec §4.3 "Spurious φ removal").
pub fn remove_spurious_phis(cfg: &mut Cfg) {
    let _t = crate::timing::start("remove_spurious_phis");
    loop {
        let used = collect_used_registers(cfg);
        let mut changed = false;
        for b in cfg.blocks_iter().collect::<Vec<_>>() {
            let dead: Vec<NodeId> = cfg
                .block(b)
                .stmts()
                .iter()
                .copied()
                .take_while(|&s| matches!(cfg.node(s).opcode, Opcode::Phi))
                .filter(|&s| {
                    cfg.node(s)
                        .defined_reg()
                        .map(|r| !used.contains(&r))
                        .unwrap_or(false)
                })
                .collect();
            if !dead.is_empty() {
                changed = true;
                cfg.block_mut(b).stmts_mut().retain(|s| !dead.contains(s));
            }
        }
        if !changed {
            break;
        }
    }
}

/// A phi is only a real use of its arguments if it is itself useful, i.e.
/// transitively reaches a non-phi use; otherwise a cycle of phis that only
/// feed each other would never be recognized as dead (spec §4.4's
/// phi-aware DCE applies here too, since spurious-phi removal is the same
/// kind of liveness question).
fn collect_used_registers(cfg: &Cfg) -> rustc_hash::FxHashSet<crate::reg::Register> {
    let mut used = rustc_hash::FxHashSet::default();
    let mut phis: Vec<(crate::reg::Register, Vec<PhiArg>)> = Vec::new();

    for b in cfg.blocks_iter() {
        for &stmt in cfg.block(b).stmts() {
            collect_uses_in_subtree(cfg, stmt, &mut used);
            let node = cfg.node(stmt);
            if let Some(StmtExt::Phi { args }) = &node.stmt {
                if let Some(r) = node.defined_reg() {
                    phis.push((r, args.clone()));
                }
            }
        }
    }

    loop {
        let mut added = false;
        for (def, args) in &phis {
            if used.contains(def) {
                for a in args {
                    if let PhiArg::Reg(r) = a {
                        if used.insert(*r) {
                            added = true;
                        }
                    }
                }
            }
        }
        if !added {
            break;
        }
    }

    used
}

fn collect_uses_in_subtree(cfg: &Cfg, node_id: NodeId, used: &mut rustc_hash::FxHashSet<crate::reg::Register>) {
    let node = cfg.node(node_id);
    if matches!(node.opcode, Opcode::VarRef) {
        if let Some(r) = node.defined_reg() {
            used.insert(r);
        }
    }
    for kid in node.kids() {
        collect_uses_in_subtree(cfg, kid, used);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Dominance;
    use crate::ir::Opcode;
    use crate::reg::{RegSpace, RegisterManager};
    use crate::ssa::construct_ssa;

    #[test]
    fn destruction_removes_all_phis_and_leaves_copies() {
        let mut cfg = Cfg::new("diamond");
        let mut rm = RegisterManager::new();
        let s = rm.new_register(RegSpace::Virtual);

        let a = cfg.add_node();
        let b = cfg.add_node();
        let merge = cfg.add_node();
        cfg.add_edge(cfg.entry(), a);
        cfg.add_edge(cfg.entry(), b);
        cfg.add_edge(a, merge);
        cfg.add_edge(b, merge);
        cfg.add_edge(merge, cfg.exit());

        let def_a = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(s));
        cfg.block_mut(a).push_stmt(def_a);
        let def_b = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(s));
        cfg.block_mut(b).push_stmt(def_b);
        let read = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(s));
        cfg.block_mut(merge).push_stmt(read);

        let dom = Dominance::compute(&mut cfg);
        construct_ssa(&mut cfg, &dom).unwrap();
        destruct_ssa(&mut cfg);

        for blk in cfg.blocks_iter() {
            assert!(cfg
                .block(blk)
                .stmts()
                .iter()
                .all(|&s| !matches!(cfg.node(s).opcode, Opcode::Phi)));
        }
        // Each predecessor of `merge` now ends with a copy into `s`.
        for pred in [a, b] {
            let copies = cfg
                .block(pred)
                .stmts()
                .iter()
                .filter(|&&s| matches!(cfg.node(s).opcode, Opcode::Copy))
                .count();
            assert_eq!(copies, 1);
        }
    }
}
