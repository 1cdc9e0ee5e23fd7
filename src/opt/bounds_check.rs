//! Bounds-check elimination (spec §4.4 "Bounds-check elimination";
//! `opt_level >= 2`, gated by the `bounds-check` cargo feature).
//!
//! A [`Opcode::BoundsCheck`] node guards that its offset subtree plus a
//! required length stays inside the packet. If a dominating block already
//! proved the same offset safe for at least as many bytes, the later
//! check is redundant: it is turned into a `Nop` and its
//! [`crate::ir::node::NodeProps::bounds_proven`] flag is set so later
//! passes/diagnostics can see why it vanished.

use crate::error::CodegenResult;
use crate::graph::Dominance;
use crate::ir::{BlockId, Cfg, NodeId, Opcode, Operand};
use crate::opt::OptPass;
use crate::reg::Register;

pub struct BoundsCheckElimination;

impl OptPass for BoundsCheckElimination {
    fn name(&self) -> &'static str {
        "bounds_check_elim"
    }

    fn run(&mut self, cfg: &mut Cfg) -> CodegenResult<bool> {
        let dom = Dominance::compute(cfg);
        let entry = cfg.entry();
        let mut active: Vec<(OffsetKey, i64)> = Vec::new();
        let mut changed = false;
        walk(cfg, &dom, entry, &mut active, &mut changed);
        Ok(changed)
    }
}

/// Structural key identifying "the same offset expression": a variable
/// register, optionally a variable plus a constant displacement.
#[derive(Copy, Clone, PartialEq, Eq)]
enum OffsetKey {
    Var(Register),
    VarPlusConst(Register, i64),
    Const(i64),
}

fn offset_key(cfg: &Cfg, id: NodeId) -> Option<OffsetKey> {
    let node = cfg.node(id);
    match node.opcode {
        Opcode::VarRef => node.defined_reg().map(OffsetKey::Var),
        Opcode::Const => match node.operand {
            Some(Operand::Int(v)) => Some(OffsetKey::Const(v)),
            _ => None,
        },
        Opcode::Add => {
            let k0 = node.kid(0)?;
            let k1 = node.kid(1)?;
            let base = cfg.node(k0);
            let disp = cfg.node(k1);
            match (base.opcode, base.defined_reg(), disp.opcode, disp.operand) {
                (Opcode::VarRef, Some(r), Opcode::Const, Some(Operand::Int(c))) => {
                    Some(OffsetKey::VarPlusConst(r, c))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn walk(
    cfg: &mut Cfg,
    dom: &Dominance,
    block: BlockId,
    active: &mut Vec<(OffsetKey, i64)>,
    changed: &mut bool,
) {
    let pushed_here = process_block(cfg, block, active, changed);
    for child in dom.dom_children(block).to_vec() {
        walk(cfg, dom, child, active, changed);
    }
    active.truncate(active.len() - pushed_here);
}

fn process_block(
    cfg: &mut Cfg,
    block: BlockId,
    active: &mut Vec<(OffsetKey, i64)>,
    changed: &mut bool,
) -> usize {
    let mut pushed = 0;
    for &stmt in cfg.block(block).stmts().to_vec().iter() {
        if cfg.node(stmt).opcode != Opcode::BoundsCheck {
            continue;
        }
        let Some(offset) = cfg.node(stmt).kid(0) else { continue };
        let Some(key) = offset_key(cfg, offset) else { continue };
        let Some(Operand::Int(required)) = cfg.node(stmt).operand else { continue };

        if let Some(&(_, proven_len)) = active.iter().find(|(k, _)| *k == key) {
            if proven_len >= required {
                let node = cfg.node_mut(stmt);
                node.opcode = Opcode::Nop;
                node.props.bounds_proven = true;
                node.set_kid(0, None);
                *changed = true;
                continue;
            }
        }
        active.push((key, required));
        pushed += 1;
    }
    pushed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MirNode;
    use crate::reg::{RegSpace, RegisterManager};

    #[test]
    fn redundant_check_in_dominated_block_is_removed() {
        let mut cfg = Cfg::new("f");
        let mut rm = RegisterManager::new();
        let off = rm.new_register(RegSpace::Virtual);

        let guard = cfg.add_node();
        let body = cfg.add_node();
        cfg.add_edge(cfg.entry(), guard);
        cfg.add_edge(guard, body);
        cfg.add_edge(body, cfg.exit());

        let off_ref1 = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(off));
        let check1 = cfg
            .add_stmt(MirNode::new(Opcode::BoundsCheck).with_kid0(off_ref1).with_operand(Operand::Int(4)));
        cfg.block_mut(guard).push_stmt(check1);

        let off_ref2 = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(off));
        let check2 = cfg
            .add_stmt(MirNode::new(Opcode::BoundsCheck).with_kid0(off_ref2).with_operand(Operand::Int(2)));
        cfg.block_mut(body).push_stmt(check2);

        let mut pass = BoundsCheckElimination;
        assert!(pass.run(&mut cfg).unwrap());
        assert_eq!(cfg.node(check2).opcode, Opcode::Nop);
        assert!(cfg.node(check2).props.bounds_proven);
        assert_eq!(cfg.node(check1).opcode, Opcode::BoundsCheck);
    }
}
