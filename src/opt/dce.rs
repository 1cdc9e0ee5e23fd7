//! Dead-code elimination (spec §4.4 step 3).
//!
//! A statement is dead if its root has no side effect and its defined
//! register (if any) is never used by a later statement. Runs to a local
//! fixed point per call since removing one dead statement can expose
//! another (spec §4.4: "iterates ... until no further statement can be
//! removed").

use crate::error::CodegenResult;
use crate::ir::node::{PhiArg, StmtExt};
use crate::ir::{Cfg, NodeId, Opcode};
use crate::opt::OptPass;
use crate::reg::Register;
use rustc_hash::FxHashSet;

pub struct DeadCodeElimination;

impl OptPass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&mut self, cfg: &mut Cfg) -> CodegenResult<bool> {
        let mut changed = false;
        loop {
            let used = collect_used_registers(cfg);
            let mut removed_this_round = false;
            for b in cfg.blocks_iter().collect::<Vec<_>>() {
                let dead: Vec<NodeId> = cfg
                    .block(b)
                    .stmts()
                    .iter()
                    .copied()
                    .filter(|&s| is_dead(cfg, s, &used))
                    .collect();
                if !dead.is_empty() {
                    removed_this_round = true;
                    cfg.block_mut(b).stmts_mut().retain(|s| !dead.contains(s));
                }
            }
            changed |= removed_this_round;
            if !removed_this_round {
                break;
            }
        }
        Ok(changed)
    }
}

fn is_dead(cfg: &Cfg, id: NodeId, used: &FxHashSet<Register>) -> bool {
    let node = cfg.node(id);
    if node.has_side_effect() {
        return false;
    }
    match node.defined_reg() {
        Some(r) => !used.contains(&r),
        None => true,
    }
}

/// A φ is "useful" iff it transitively reaches a non-φ use (spec §4.4);
/// its arguments only count as uses once the φ itself is known useful, so
/// a cycle of φs that only feed each other is recognized as dead instead
/// of keeping itself alive.
fn collect_used_registers(cfg: &Cfg) -> FxHashSet<Register> {
    let mut used = FxHashSet::default();
    let mut phis: Vec<(Register, Vec<PhiArg>)> = Vec::new();

    for b in cfg.blocks_iter() {
        for &stmt in cfg.block(b).stmts() {
            let node = cfg.node(stmt);
            // A root with no side effect and no def cannot contribute a
            // use that keeps anything alive beyond its own kids, which
            // we still walk below; roots that *do* have side effects or
            // defs always count their kids as uses.
            collect_uses_in_subtree(cfg, stmt, &mut used);
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

fn collect_uses_in_subtree(cfg: &Cfg, id: NodeId, used: &mut FxHashSet<Register>) {
    let node = cfg.node(id);
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
    use crate::ir::{MirNode, Operand};
    use crate::reg::{RegSpace, RegisterManager};

    #[test]
    fn unused_definition_is_removed() {
        let mut cfg = Cfg::new("f");
        let mut rm = RegisterManager::new();
        let dead = rm.new_register(RegSpace::Virtual);

        let c = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(7)));
        let def = cfg.add_stmt(MirNode::new(Opcode::Copy).with_def(dead).with_kid0(c));
        cfg.block_mut(cfg.entry()).push_stmt(def);

        let mut pass = DeadCodeElimination;
        assert!(pass.run(&mut cfg).unwrap());
        assert!(cfg.block(cfg.entry()).stmts().is_empty());
    }

    #[test]
    fn used_definition_survives() {
        let mut cfg = Cfg::new("f");
        let mut rm = RegisterManager::new();
        let live = rm.new_register(RegSpace::Virtual);

        let c = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(7)));
        let def = cfg.add_stmt(MirNode::new(Opcode::Copy).with_def(live).with_kid0(c));
        let read = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(live));
        let ret = cfg.add_stmt(MirNode::new(Opcode::Return).with_kid0(read));
        let b = cfg.block_mut(cfg.entry());
        b.push_stmt(def);
        b.push_stmt(ret);

        let mut pass = DeadCodeElimination;
        assert!(!pass.run(&mut cfg).unwrap());
        assert_eq!(cfg.block(cfg.entry()).stmts().len(), 2);
    }
}
