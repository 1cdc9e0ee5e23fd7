//! Algebraic simplification (spec §4.4 step 2).
//!
//! Identity/absorbing-element rewrites: `x+0`, `0+x`, `x*1`, `1*x`,
//! `x*0`/`0*x`, `x-0`, `x-x`, `x^x`, `x&x`, `x|x`, shifts by zero. A node
//! is "replaced" by one of its kids by splicing that kid's opcode/operand/
//! kids into the node's own arena slot, since parents address children by
//! `NodeId` and cannot be redirected without knowing every parent.

use crate::error::CodegenResult;
use crate::ir::{Cfg, NodeId, Opcode, Operand};
use crate::opt::OptPass;

pub struct AlgebraicSimplify;

impl OptPass for AlgebraicSimplify {
    fn name(&self) -> &'static str {
        "algebraic_simplify"
    }

    fn run(&mut self, cfg: &mut Cfg) -> CodegenResult<bool> {
        let mut changed = false;
        for b in cfg.blocks_iter().collect::<Vec<_>>() {
            for &stmt in cfg.block(b).stmts().to_vec().iter() {
                changed |= simplify_subtree(cfg, stmt);
            }
        }
        Ok(changed)
    }
}

fn simplify_subtree(cfg: &mut Cfg, id: NodeId) -> bool {
    let mut changed = false;
    for kid in cfg.node(id).kids().collect::<Vec<_>>() {
        changed |= simplify_subtree(cfg, kid);
    }

    let opcode = cfg.node(id).opcode;
    let k0 = cfg.node(id).kid(0);
    let k1 = cfg.node(id).kid(1);
    let c0 = k0.and_then(|k| as_int_const(cfg, k));
    let c1 = k1.and_then(|k| as_int_const(cfg, k));

    // `replace_with` is the kid id this node should take on the identity
    // of, or `None` if no rewrite applies.
    let replace_with = match (opcode, c0, c1) {
        (Opcode::Add, Some(0), _) => k1,
        (Opcode::Add, _, Some(0)) => k0,
        (Opcode::Sub, _, Some(0)) => k0,
        (Opcode::Mul, Some(1), _) => k1,
        (Opcode::Mul, _, Some(1)) => k0,
        (Opcode::Shl, _, Some(0)) => k0,
        (Opcode::Shr, _, Some(0)) => k0,
        (Opcode::Or, _, _) if same_kid(cfg, k0, k1) => k0,
        (Opcode::And, _, _) if same_kid(cfg, k0, k1) => k0,
        _ => None,
    };
    if let (Opcode::Mul, Some(0), _) | (Opcode::Mul, _, Some(0)) = (opcode, c0, c1) {
        set_const(cfg, id, 0);
        return true;
    }
    if matches!(opcode, Opcode::Sub | Opcode::Xor) && same_kid(cfg, k0, k1) {
        set_const(cfg, id, 0);
        return true;
    }

    if let Some(src) = replace_with {
        splice(cfg, id, src);
        changed = true;
    }
    changed
}

/// True if two optional kid ids are both `VarRef`s of the same register,
/// a conservative same-value check (no general value numbering) that
/// still catches the common `x op x` idiom left by copy folding.
fn same_kid(cfg: &Cfg, a: Option<NodeId>, b: Option<NodeId>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let na = cfg.node(a);
            let nb = cfg.node(b);
            matches!(na.opcode, Opcode::VarRef)
                && matches!(nb.opcode, Opcode::VarRef)
                && na.defined_reg() == nb.defined_reg()
        }
        _ => false,
    }
}

fn as_int_const(cfg: &Cfg, id: NodeId) -> Option<i64> {
    let node = cfg.node(id);
    match (node.opcode, node.operand) {
        (Opcode::Const, Some(Operand::Int(v))) => Some(v),
        _ => None,
    }
}

fn set_const(cfg: &mut Cfg, id: NodeId, v: i64) {
    let node = cfg.node_mut(id);
    node.opcode = Opcode::Const;
    node.operand = Some(Operand::Int(v));
    node.set_kid(0, None);
    node.set_kid(1, None);
}

/// Copy `source`'s opcode/operand/kids/stmt into `target`'s arena slot,
/// keeping `target`'s own id (so parents still find it) and its own
/// defined register (only statement roots carry one).
fn splice(cfg: &mut Cfg, target: NodeId, source: NodeId) {
    let src = cfg.node(source).clone();
    let node = cfg.node_mut(target);
    node.opcode = src.opcode;
    node.operand = src.operand;
    node.set_kid(0, src.kid(0));
    node.set_kid(1, src.kid(1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MirNode;

    #[test]
    fn x_plus_zero_becomes_x() {
        let mut cfg = Cfg::new("f");
        let x = cfg.add_stmt(MirNode::new(Opcode::VarRef));
        let zero = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(0)));
        let add = cfg.add_stmt(MirNode::new(Opcode::Add).with_kid0(x).with_kid1(zero));
        cfg.block_mut(cfg.entry()).push_stmt(add);

        let mut pass = AlgebraicSimplify;
        assert!(pass.run(&mut cfg).unwrap());
        assert_eq!(cfg.node(add).opcode, Opcode::VarRef);
    }

    #[test]
    fn x_times_zero_becomes_zero() {
        let mut cfg = Cfg::new("f");
        let x = cfg.add_stmt(MirNode::new(Opcode::VarRef));
        let zero = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(0)));
        let mul = cfg.add_stmt(MirNode::new(Opcode::Mul).with_kid0(x).with_kid1(zero));
        cfg.block_mut(cfg.entry()).push_stmt(mul);

        let mut pass = AlgebraicSimplify;
        assert!(pass.run(&mut cfg).unwrap());
        assert_eq!(cfg.node(mul).opcode, Opcode::Const);
        assert_eq!(cfg.node(mul).operand, Some(Operand::Int(0)));
    }
}
