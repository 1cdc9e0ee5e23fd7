//! Constant propagation (spec §4.4 step 4).
//!
//! Sound because the optimizer runs in SSA form (spec §4.4: "the scalar
//! optimizer runs between SSA construction and destruction"): every
//! register has exactly one defining statement, so a register whose sole
//! definition is a constant can have every `VarRef` to it replaced by
//! that constant directly, with no reaching-definitions analysis needed.

use crate::error::CodegenResult;
use crate::ir::{Cfg, NodeId, Opcode, Operand};
use crate::opt::OptPass;
use crate::reg::Register;
use rustc_hash::FxHashMap;

pub struct ConstPropagation;

impl OptPass for ConstPropagation {
    fn name(&self) -> &'static str {
        "const_prop"
    }

    fn run(&mut self, cfg: &mut Cfg) -> CodegenResult<bool> {
        let consts = collect_constant_defs(cfg);
        if consts.is_empty() {
            return Ok(false);
        }
        let mut changed = false;
        for b in cfg.blocks_iter().collect::<Vec<_>>() {
            for &stmt in cfg.block(b).stmts().to_vec().iter() {
                changed |= propagate_subtree(cfg, stmt, &consts);
            }
        }
        Ok(changed)
    }
}

/// Registers whose unique definition in the function is a plain `Const`.
fn collect_constant_defs(cfg: &Cfg) -> FxHashMap<Register, i64> {
    let mut map = FxHashMap::default();
    for b in cfg.blocks_iter() {
        for &stmt in cfg.block(b).stmts() {
            let node = cfg.node(stmt);
            if let (Opcode::Const, Some(reg), Some(Operand::Int(v))) =
                (node.opcode, node.defined_reg(), node.operand)
            {
                map.insert(reg, v);
            }
        }
    }
    map
}

fn propagate_subtree(cfg: &mut Cfg, id: NodeId, consts: &FxHashMap<Register, i64>) -> bool {
    let mut changed = false;
    for kid in cfg.node(id).kids().collect::<Vec<_>>() {
        changed |= propagate_subtree(cfg, kid, consts);
    }
    let node = cfg.node(id);
    if matches!(node.opcode, Opcode::VarRef) {
        if let Some(v) = node.defined_reg().and_then(|r| consts.get(&r)).copied() {
            let node = cfg.node_mut(id);
            node.opcode = Opcode::Const;
            node.operand = Some(Operand::Int(v));
            node.set_defined_reg(None);
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MirNode;
    use crate::reg::RegSpace;
    use crate::reg::RegisterManager;

    #[test]
    fn var_ref_to_const_def_is_replaced() {
        let mut cfg = Cfg::new("f");
        let mut rm = RegisterManager::new();
        let s = rm.new_register(RegSpace::Virtual);

        let def = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(s).with_operand(Operand::Int(42)));
        let read = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(s));
        let ret = cfg.add_stmt(MirNode::new(Opcode::Return).with_kid0(read));
        let b = cfg.block_mut(cfg.entry());
        b.push_stmt(def);
        b.push_stmt(ret);

        let mut pass = ConstPropagation;
        assert!(pass.run(&mut cfg).unwrap());
        assert_eq!(cfg.node(read).opcode, Opcode::Const);
        assert_eq!(cfg.node(read).operand, Some(Operand::Int(42)));
    }
}
