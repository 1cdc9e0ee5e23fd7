//! Constant folding (spec §4.4 step 1).

use crate::error::CodegenResult;
use crate::ir::{Cfg, NodeId, Opcode, Operand};
use crate::opt::OptPass;

pub struct ConstFold;

impl OptPass for ConstFold {
    fn name(&self) -> &'static str {
        "const_fold"
    }

    fn run(&mut self, cfg: &mut Cfg) -> CodegenResult<bool> {
        let mut changed = false;
        for b in cfg.blocks_iter().collect::<Vec<_>>() {
            for &stmt in cfg.block(b).stmts().to_vec().iter() {
                changed |= fold_subtree(cfg, stmt);
            }
        }
        Ok(changed)
    }
}

fn fold_subtree(cfg: &mut Cfg, id: NodeId) -> bool {
    let mut changed = false;
    let kids: Vec<NodeId> = cfg.node(id).kids().collect();
    for kid in &kids {
        changed |= fold_subtree(cfg, *kid);
    }

    let opcode = cfg.node(id).opcode;
    let lhs = kids.first().and_then(|&k| as_int_const(cfg, k));
    let rhs = kids.get(1).and_then(|&k| as_int_const(cfg, k));

    let folded = match (opcode, lhs, rhs) {
        (Opcode::Add, Some(a), Some(b)) => Some(a.wrapping_add(b)),
        (Opcode::Sub, Some(a), Some(b)) => Some(a.wrapping_sub(b)),
        (Opcode::Mul, Some(a), Some(b)) => Some(a.wrapping_mul(b)),
        (Opcode::Div, Some(a), Some(b)) if b != 0 => Some(a.wrapping_div(b)),
        (Opcode::And, Some(a), Some(b)) => Some(a & b),
        (Opcode::Or, Some(a), Some(b)) => Some(a | b),
        (Opcode::Xor, Some(a), Some(b)) => Some(a ^ b),
        (Opcode::Shl, Some(a), Some(b)) => Some(a.wrapping_shl(b as u32)),
        (Opcode::Shr, Some(a), Some(b)) => Some(a.wrapping_shr(b as u32)),
        (Opcode::Neg, Some(a), _) => Some(-a),
        (Opcode::Not, Some(a), _) => Some(!a),
        (Opcode::Eq, Some(a), Some(b)) => Some((a == b) as i64),
        (Opcode::Ne, Some(a), Some(b)) => Some((a != b) as i64),
        (Opcode::Lt, Some(a), Some(b)) => Some((a < b) as i64),
        (Opcode::Le, Some(a), Some(b)) => Some((a <= b) as i64),
        (Opcode::Gt, Some(a), Some(b)) => Some((a > b) as i64),
        (Opcode::Ge, Some(a), Some(b)) => Some((a >= b) as i64),
        _ => None,
    };

    if let Some(v) = folded {
        let node = cfg.node_mut(id);
        node.opcode = Opcode::Const;
        node.operand = Some(Operand::Int(v));
        node.set_kid(0, None);
        node.set_kid(1, None);
        changed = true;
    }
    changed
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
    fn folds_nested_constant_arithmetic() {
        let mut cfg = Cfg::new("f");
        let a = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(2)));
        let b = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(3)));
        let add = cfg.add_stmt(MirNode::new(Opcode::Add).with_kid0(a).with_kid1(b));
        let c = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(4)));
        let mul = cfg.add_stmt(MirNode::new(Opcode::Mul).with_kid0(add).with_kid1(c));
        cfg.block_mut(cfg.entry()).push_stmt(mul);

        let mut pass = ConstFold;
        let changed = pass.run(&mut cfg).unwrap();
        assert!(changed);
        assert_eq!(cfg.node(mul).opcode, Opcode::Const);
        assert_eq!(cfg.node(mul).operand, Some(Operand::Int(20)));
    }
}
