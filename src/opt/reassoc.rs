//! Reassociation (spec §4.4: runs once per outer round, after the driver
//! reaches a fixed point, and can itself trigger another round).
//!
//! Canonicalizes commutative binary ops so a constant operand always sits
//! on the right (`c + x` becomes `x + c`), independent of how the source
//! order happened to place it. This exposes the nested-constant shape
//! [`crate::opt::operand_redistribute`] and `const_fold` look for, and is
//! why the driver re-enters its inner fixed point whenever reassociation
//! changes anything.

use crate::error::CodegenResult;
use crate::ir::{Cfg, NodeId, Opcode, Operand};
use crate::opt::OptPass;

pub struct Reassociate;

impl OptPass for Reassociate {
    fn name(&self) -> &'static str {
        "reassociate"
    }

    fn run(&mut self, cfg: &mut Cfg) -> CodegenResult<bool> {
        let mut changed = false;
        for b in cfg.blocks_iter().collect::<Vec<_>>() {
            for &stmt in cfg.block(b).stmts().to_vec().iter() {
                changed |= reassoc_subtree(cfg, stmt);
            }
        }
        Ok(changed)
    }
}

fn reassoc_subtree(cfg: &mut Cfg, id: NodeId) -> bool {
    let mut changed = false;
    for kid in cfg.node(id).kids().collect::<Vec<_>>() {
        changed |= reassoc_subtree(cfg, kid);
    }

    let opcode = cfg.node(id).opcode;
    if !is_commutative(opcode) {
        return changed;
    }
    let k0 = cfg.node(id).kid(0);
    let k1 = cfg.node(id).kid(1);
    let lhs_is_const = k0.map(|k| is_const(cfg, k)).unwrap_or(false);
    let rhs_is_const = k1.map(|k| is_const(cfg, k)).unwrap_or(false);
    if lhs_is_const && !rhs_is_const {
        let node = cfg.node_mut(id);
        node.set_kid(0, k1);
        node.set_kid(1, k0);
        changed = true;
    }
    changed
}

fn is_commutative(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::Add | Opcode::Mul | Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Eq | Opcode::Ne
    )
}

fn is_const(cfg: &Cfg, id: NodeId) -> bool {
    matches!((cfg.node(id).opcode, cfg.node(id).operand), (Opcode::Const, Some(Operand::Int(_))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MirNode;

    #[test]
    fn constant_on_left_moves_right() {
        let mut cfg = Cfg::new("f");
        let x = cfg.add_stmt(MirNode::new(Opcode::VarRef));
        let c = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(9)));
        let add = cfg.add_stmt(MirNode::new(Opcode::Add).with_kid0(c).with_kid1(x));
        cfg.block_mut(cfg.entry()).push_stmt(add);

        let mut pass = Reassociate;
        assert!(pass.run(&mut cfg).unwrap());
        assert_eq!(cfg.node(add).kid(0), Some(x));
        assert_eq!(cfg.node(add).kid(1), Some(c));
    }
}
