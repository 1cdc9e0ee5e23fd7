//! Operand redistribution (spec §4.4 step 6).
//!
//! Pushes a constant operand inward through a nested associative/
//! commutative op so two constants end up as siblings, e.g.
//! `(x + c1) + c2` becomes `x + (c1 + c2)`: the inner add is now pure
//! constant and collapses on the next `const_fold` round. Narrower than
//! [`crate::opt::reassoc`], which reshapes whole chains; this pass only
//! ever touches a node and its immediate child.

use crate::error::CodegenResult;
use crate::ir::{Cfg, NodeId, Opcode, Operand};
use crate::opt::OptPass;

pub struct OperandRedistribute;

impl OptPass for OperandRedistribute {
    fn name(&self) -> &'static str {
        "operand_redistribute"
    }

    fn run(&mut self, cfg: &mut Cfg) -> CodegenResult<bool> {
        let mut changed = false;
        for b in cfg.blocks_iter().collect::<Vec<_>>() {
            for &stmt in cfg.block(b).stmts().to_vec().iter() {
                changed |= redistribute_subtree(cfg, stmt);
            }
        }
        Ok(changed)
    }
}

fn redistribute_subtree(cfg: &mut Cfg, id: NodeId) -> bool {
    let mut changed = false;
    for kid in cfg.node(id).kids().collect::<Vec<_>>() {
        changed |= redistribute_subtree(cfg, kid);
    }

    let opcode = cfg.node(id).opcode;
    if !is_associative(opcode) {
        return changed;
    }
    let outer_c1 = cfg.node(id).kid(1).and_then(|k| as_int_const(cfg, k));
    let Some(outer_const) = outer_c1 else { return changed };
    let Some(inner) = cfg.node(id).kid(0) else { return changed };
    if cfg.node(inner).opcode != opcode {
        return changed;
    }
    let Some(inner_x) = cfg.node(inner).kid(0) else { return changed };
    let Some(inner_c) = cfg.node(inner).kid(1).and_then(|k| as_int_const(cfg, k)) else {
        return changed;
    };

    let combined = combine(opcode, inner_c, outer_const);
    let new_const = cfg.add_stmt(crate::ir::MirNode::new(Opcode::Const).with_operand(Operand::Int(combined)));
    let node = cfg.node_mut(id);
    node.set_kid(0, Some(inner_x));
    node.set_kid(1, Some(new_const));
    true
}

fn is_associative(op: Opcode) -> bool {
    matches!(op, Opcode::Add | Opcode::Mul | Opcode::And | Opcode::Or | Opcode::Xor)
}

fn combine(op: Opcode, a: i64, b: i64) -> i64 {
    match op {
        Opcode::Add => a.wrapping_add(b),
        Opcode::Mul => a.wrapping_mul(b),
        Opcode::And => a & b,
        Opcode::Or => a | b,
        Opcode::Xor => a ^ b,
        _ => unreachable!("is_associative filters to these opcodes"),
    }
}

fn as_int_const(cfg: &Cfg, id: NodeId) -> Option<i64> {
    let node = cfg.node(id);
    match (node.opcode, node.operand) {
        (Opcode::Const, Some(Operand::Int(v))) => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MirNode;

    #[test]
    fn nested_add_constants_are_combined() {
        let mut cfg = Cfg::new("f");
        let x = cfg.add_stmt(MirNode::new(Opcode::VarRef));
        let c1 = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(2)));
        let inner = cfg.add_stmt(MirNode::new(Opcode::Add).with_kid0(x).with_kid1(c1));
        let c2 = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(3)));
        let outer = cfg.add_stmt(MirNode::new(Opcode::Add).with_kid0(inner).with_kid1(c2));
        cfg.block_mut(cfg.entry()).push_stmt(outer);

        let mut pass = OperandRedistribute;
        assert!(pass.run(&mut cfg).unwrap());
        assert_eq!(cfg.node(outer).kid(0), Some(x));
        let new_const = cfg.node(outer).kid(1).unwrap();
        assert_eq!(cfg.node(new_const).operand, Some(Operand::Int(5)));
    }
}
