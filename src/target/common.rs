//! Shared BURG rule table (spec §4.6, §4.10).
//!
//! Every register-machine target (x86-32, x86-64, netproc) reduces the
//! same canonicalized MIR shapes the same way, down to a small set of
//! generic mnemonics (`"add"`, `"mov"`, `"ldw"`, ...). [`build_rules`]
//! builds one such [`BurgTable`]; what differs per target is only how its
//! [`crate::emit::InstEncoder`] maps those mnemonics to real bytes, so the
//! rule table itself is written once here instead of three times.
//!
//! `Rule::emit` is a bare `fn` pointer (no captured state, spec §4.6's
//! `EmitFn`), so every rule below reads a node's own fields rather than
//! any target-supplied configuration.

use crate::ir::node::{AccessSize, MemSpace, Opcode};
use crate::ir::{MirNode, Operand};
use crate::lir::burg::{Arity, BurgTable, EmitFn, Rule};
use crate::lir::inst::{LirInst, LirOperand, MemOperand};

pub fn build_rules() -> BurgTable {
    let mut t = BurgTable::new();

    leaf_value(&mut t, "const", |n| matches!(n.opcode, Opcode::Const), 1, |sel, node, _| {
        let v = match sel.cfg.node(node).operand {
            Some(Operand::Int(v)) => v,
            _ => 0,
        };
        let dst = sel.cfg.node(node).defined_reg().unwrap_or_else(|| sel.fresh());
        sel.emit(LirInst::new("mov").with_dst(LirOperand::Reg(dst)).with_src(LirOperand::Imm(v)));
        Ok(Some(dst))
    });

    leaf_value(&mut t, "var_ref", |n| matches!(n.opcode, Opcode::VarRef), 0, |sel, node, _| {
        Ok(sel.cfg.node(node).defined_reg())
    });

    t.add_rule(Rule {
        name: "copy",
        nonterm: "stmt",
        arity: Arity::Unary("reg"),
        matches: |n| matches!(n.opcode, Opcode::Copy),
        cost: 1,
        emit: |sel, node, kids| {
            let dst = sel.cfg.node(node).defined_reg().expect("a Copy always names its destination");
            sel.emit(LirInst::copy("mov", dst, kids[0]));
            Ok(Some(dst))
        },
    });

    t.add_rule(Rule {
        name: "load_base",
        nonterm: "stmt",
        arity: Arity::Leaf,
        matches: |n| matches!(n.opcode, Opcode::LoadBase(_)),
        cost: 1,
        emit: |sel, node, _kids| {
            let space = match sel.cfg.node(node).opcode {
                Opcode::LoadBase(s) => space_id(s),
                _ => unreachable!(),
            };
            let dst = sel.cfg.node(node).defined_reg().unwrap_or_else(|| sel.fresh());
            sel.emit(LirInst::new("ldbase").with_dst(LirOperand::Reg(dst)).with_src(LirOperand::Imm(space)));
            Ok(Some(dst))
        },
    });

    macro_rules! binop {
        ($opc:pat, $name:literal, $mnem:literal) => {
            binary_value(&mut t, $name, |n| matches!(n.opcode, $opc), 1, |sel, node, kids| {
                let dst = sel.cfg.node(node).defined_reg().unwrap_or_else(|| sel.fresh());
                sel.emit(
                    LirInst::new($mnem)
                        .with_dst(LirOperand::Reg(dst))
                        .with_src(LirOperand::Reg(kids[0]))
                        .with_src(LirOperand::Reg(kids[1])),
                );
                Ok(Some(dst))
            });
        };
    }
    binop!(Opcode::Add, "add", "add");
    binop!(Opcode::Sub, "sub", "sub");
    binop!(Opcode::Mul, "mul", "mul");
    binop!(Opcode::Div, "div", "div");
    binop!(Opcode::And, "and", "and");
    binop!(Opcode::Or, "or", "or");
    binop!(Opcode::Xor, "xor", "xor");
    binop!(Opcode::Shl, "shl", "shl");
    binop!(Opcode::Shr, "shr", "shr");
    binop!(Opcode::Eq, "cmp_eq", "seteq");
    binop!(Opcode::Ne, "cmp_ne", "setne");
    binop!(Opcode::Lt, "cmp_lt", "setlt");
    binop!(Opcode::Le, "cmp_le", "setle");
    binop!(Opcode::Gt, "cmp_gt", "setgt");
    binop!(Opcode::Ge, "cmp_ge", "setge");

    macro_rules! unop {
        ($opc:pat, $name:literal, $mnem:literal) => {
            unary_value(&mut t, $name, |n| matches!(n.opcode, $opc), 1, |sel, node, kids| {
                let dst = sel.cfg.node(node).defined_reg().unwrap_or_else(|| sel.fresh());
                sel.emit(LirInst::new($mnem).with_dst(LirOperand::Reg(dst)).with_src(LirOperand::Reg(kids[0])));
                Ok(Some(dst))
            });
        };
    }
    unop!(Opcode::Neg, "neg", "neg");
    unop!(Opcode::Not, "not", "not");

    unary_value(&mut t, "load_indexed", |n| matches!(n.opcode, Opcode::LoadIndexed(_)), 1, |sel, node, kids| {
        let size = match sel.cfg.node(node).opcode {
            Opcode::LoadIndexed(s) => s,
            _ => unreachable!(),
        };
        let dst = sel.cfg.node(node).defined_reg().unwrap_or_else(|| sel.fresh());
        let mem = MemOperand { base: kids[0], index: None, disp: 0, scale: 1 };
        sel.emit(LirInst::new(load_mnemonic(size)).with_dst(LirOperand::Reg(dst)).with_src(LirOperand::Mem(mem)));
        Ok(Some(dst))
    });

    t.add_rule(Rule {
        name: "store_indexed",
        nonterm: "stmt",
        arity: Arity::Binary("reg", "reg"),
        matches: |n| matches!(n.opcode, Opcode::StoreIndexed(_)),
        cost: 1,
        emit: |sel, node, kids| {
            let size = match sel.cfg.node(node).opcode {
                Opcode::StoreIndexed(s) => s,
                _ => unreachable!(),
            };
            let mem = MemOperand { base: kids[0], index: None, disp: 0, scale: 1 };
            sel.emit(
                LirInst::new(store_mnemonic(size))
                    .with_dst(LirOperand::Mem(mem))
                    .with_src(LirOperand::Reg(kids[1]))
                    .with_side_effect(),
            );
            Ok(None)
        },
    });

    t.add_rule(Rule {
        name: "jump",
        nonterm: "stmt",
        arity: Arity::Leaf,
        matches: |n| matches!(n.opcode, Opcode::Jump),
        cost: 0,
        emit: |_sel, _node, _kids| Ok(None),
    });

    t.add_rule(Rule {
        name: "return",
        nonterm: "stmt",
        arity: Arity::Leaf,
        matches: |n| matches!(n.opcode, Opcode::Return),
        cost: 0,
        emit: |_sel, _node, _kids| Ok(None),
    });

    t.add_rule(Rule {
        name: "nop",
        nonterm: "stmt",
        arity: Arity::Leaf,
        matches: |n| matches!(n.opcode, Opcode::Nop),
        cost: 0,
        emit: |_sel, _node, _kids| Ok(None),
    });

    t.add_rule(Rule {
        name: "branch",
        nonterm: "stmt",
        arity: Arity::Unary("reg"),
        matches: |n| matches!(n.opcode, Opcode::Branch),
        cost: 1,
        emit: |sel, _node, kids| {
            sel.emit(LirInst::new("test").with_src(LirOperand::Reg(kids[0])).with_side_effect());
            Ok(None)
        },
    });

    t.add_rule(Rule {
        name: "switch",
        nonterm: "stmt",
        arity: Arity::Unary("reg"),
        matches: |n| matches!(n.opcode, Opcode::Switch),
        cost: 1,
        emit: |sel, _node, kids| {
            sel.emit(LirInst::new("test").with_src(LirOperand::Reg(kids[0])).with_side_effect());
            Ok(None)
        },
    });

    t.add_rule(Rule {
        name: "coprocessor_call",
        nonterm: "stmt",
        arity: Arity::Leaf,
        matches: |n| matches!(n.opcode, Opcode::CoprocessorCall),
        cost: 1,
        emit: |sel, node, _kids| {
            let mut inst = LirInst::new("call").with_coprocessor_call();
            if let Some(crate::ir::node::StmtExt::Call { args }) = &sel.cfg.node(node).stmt {
                for a in args {
                    inst = inst.with_src(LirOperand::Reg(*a));
                }
            }
            let dst = sel.cfg.node(node).defined_reg();
            if let Some(dst) = dst {
                inst = inst.with_dst(LirOperand::Reg(dst));
            }
            if let Some(tag) = sel.cfg.node(node).handler_tag {
                inst = inst.with_handler_tag(tag);
            }
            sel.emit(inst);
            Ok(dst)
        },
    });

    t.add_rule(Rule {
        name: "send_packet",
        nonterm: "stmt",
        arity: Arity::Leaf,
        matches: |n| matches!(n.opcode, Opcode::SendPacket),
        cost: 1,
        emit: |sel, node, _kids| {
            let mut inst = LirInst::new("send").with_side_effect();
            if let Some(crate::ir::node::StmtExt::Call { args }) = &sel.cfg.node(node).stmt {
                for a in args {
                    inst = inst.with_src(LirOperand::Reg(*a));
                }
            }
            sel.emit(inst);
            Ok(None)
        },
    });

    t.add_rule(Rule {
        name: "lookup_table_op",
        nonterm: "stmt",
        arity: Arity::Unary("reg"),
        matches: |n| matches!(n.opcode, Opcode::LookupTableOp(_)),
        cost: 1,
        emit: |sel, node, kids| {
            let dst = sel.cfg.node(node).defined_reg();
            let mut inst = LirInst::new("lookup").with_src(LirOperand::Reg(kids[0])).with_side_effect();
            if let Some(dst) = dst {
                inst = inst.with_dst(LirOperand::Reg(dst));
            }
            sel.emit(inst);
            Ok(dst)
        },
    });

    t.add_rule(Rule {
        name: "bounds_check",
        nonterm: "stmt",
        arity: Arity::Unary("reg"),
        matches: |n| matches!(n.opcode, Opcode::BoundsCheck),
        cost: 1,
        emit: |sel, _node, kids| {
            sel.emit(LirInst::new("bchk").with_src(LirOperand::Reg(kids[0])).with_side_effect());
            Ok(None)
        },
    });

    t
}

fn load_mnemonic(size: AccessSize) -> &'static str {
    match size {
        AccessSize::Byte => "ldb",
        AccessSize::Half => "ldh",
        AccessSize::Word => "ldw",
    }
}

fn store_mnemonic(size: AccessSize) -> &'static str {
    match size {
        AccessSize::Byte => "stb",
        AccessSize::Half => "sth",
        AccessSize::Word => "stw",
    }
}

fn space_id(space: MemSpace) -> i64 {
    match space {
        MemSpace::Packet => 0,
        MemSpace::Info => 1,
        MemSpace::Data => 2,
        MemSpace::Shared => 3,
        MemSpace::Exchange => 4,
    }
}

/// Register a value-producing rule under both `"reg"` (used as an operand
/// of an enclosing expression) and `"stmt"` (used as a statement root),
/// since every opcode these three helpers cover can appear in either
/// position.
fn leaf_value(t: &mut BurgTable, name: &'static str, matches: fn(&MirNode) -> bool, cost: u32, emit: EmitFn) {
    t.add_rule(Rule { name, nonterm: "reg", arity: Arity::Leaf, matches, cost, emit });
    t.add_rule(Rule { name, nonterm: "stmt", arity: Arity::Leaf, matches, cost, emit });
}

fn unary_value(t: &mut BurgTable, name: &'static str, matches: fn(&MirNode) -> bool, cost: u32, emit: EmitFn) {
    t.add_rule(Rule { name, nonterm: "reg", arity: Arity::Unary("reg"), matches, cost, emit });
    t.add_rule(Rule { name, nonterm: "stmt", arity: Arity::Unary("reg"), matches, cost, emit });
}

fn binary_value(t: &mut BurgTable, name: &'static str, matches: fn(&MirNode) -> bool, cost: u32, emit: EmitFn) {
    t.add_rule(Rule { name, nonterm: "reg", arity: Arity::Binary("reg", "reg"), matches, cost, emit });
    t.add_rule(Rule { name, nonterm: "stmt", arity: Arity::Binary("reg", "reg"), matches, cost, emit });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cfg, MirNode, Opcode as Op, Operand as Opr};
    use crate::lir::burg::Selector;
    use crate::reg::RegisterManager;

    #[test]
    fn const_reduces_to_a_register() {
        let mut cfg = Cfg::new("f");
        let c = cfg.add_stmt(MirNode::new(Op::Const).with_operand(Opr::Int(7)));
        cfg.block_mut(cfg.entry()).push_stmt(c);

        let table = build_rules();
        let mut regs = RegisterManager::new();
        let mut out = Vec::new();
        let mut sel = Selector { cfg: &cfg, out: &mut out, regs: &mut regs };
        table.select(&mut sel, c, "stmt").unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].mnemonic, "mov");
    }

    #[test]
    fn add_of_two_consts_emits_three_instructions() {
        let mut cfg = Cfg::new("f");
        let a = cfg.add_stmt(MirNode::new(Op::Const).with_operand(Opr::Int(1)));
        let b = cfg.add_stmt(MirNode::new(Op::Const).with_operand(Opr::Int(2)));
        let add = cfg.add_stmt(MirNode::new(Op::Add).with_kid0(a).with_kid1(b));
        cfg.block_mut(cfg.entry()).push_stmt(add);

        let table = build_rules();
        let mut regs = RegisterManager::new();
        let mut out = Vec::new();
        let mut sel = Selector { cfg: &cfg, out: &mut out, regs: &mut regs };
        table.select(&mut sel, add, "stmt").unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].mnemonic, "add");
    }
}
