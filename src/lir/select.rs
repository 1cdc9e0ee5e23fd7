//! Instruction-selection pass (spec §4.6).
//!
//! Drives a [`BurgTable`] over a MIR [`Cfg`] in preorder, reducing every
//! statement root to `"stmt"` into the `LirCfg`'s pre-created mirror
//! block, then runs the coprocessor-access splitter some targets require.

use crate::error::CodegenResult;
use crate::graph::TieBreak;
use crate::ir::node::{Opcode, StmtExt};
use crate::ir::Cfg;
use crate::lir::burg::{BurgTable, Selector};
use crate::lir::cfg::{LirCfg, Terminator};
use crate::reg::RegisterManager;

/// Select instructions for every block of `mir` into a freshly mirrored
/// `LirCfg`, then split any block whose coprocessor call is not last.
pub fn select_instructions(mir: &mut Cfg, table: &BurgTable, regs: &mut RegisterManager) -> CodegenResult<LirCfg> {
    let _t = crate::timing::start("instruction_selection");
    let mut lir = LirCfg::mirror_from(mir);
    for b in mir.preorder(TieBreak::Ascending) {
        let stmts = mir.block(b).stmts().to_vec();
        let mut out = Vec::new();
        {
            let mut sel = Selector { cfg: mir, out: &mut out, regs };
            for stmt in stmts {
                table.select(&mut sel, stmt, "stmt")?;
            }
        }
        lir.block_mut(b).insts = out;
        lir.block_mut(b).terminator = mir_terminator(mir, b);
    }
    split_coprocessor_blocks(&mut lir);
    Ok(lir)
}

/// Derive a block's control-flow shape from its MIR terminator statement,
/// or a plain fall-through if the block has none (common right after
/// critical-edge splitting, which can leave a block with a single
/// successor and no explicit jump).
fn mir_terminator(mir: &Cfg, b: crate::ir::entities::BlockId) -> Terminator {
    if let Some(term_id) = mir.block(b).terminator() {
        let node = mir.node(term_id);
        match &node.stmt {
            Some(StmtExt::Jump { target }) => return Terminator::Jump(*target),
            Some(StmtExt::Branch { true_target, false_target }) => {
                return Terminator::Branch {
                    true_target: *true_target,
                    false_target: *false_target,
                    inverted: false,
                }
            }
            Some(StmtExt::Switch { cases, default }) => {
                return Terminator::Switch { cases: cases.clone(), default: *default }
            }
            _ => {}
        }
        if matches!(node.opcode, Opcode::Return) {
            return Terminator::Return;
        }
    }
    match mir.succ_iter(b).next() {
        Some(s) => Terminator::Fallthrough(s),
        None => Terminator::Return,
    }
}

/// For every block whose coprocessor call is not its last instruction,
/// split the block right after that call into a fresh successor block,
/// moving the remaining instructions and this block's successor edges
/// onto it (spec §4.6: "preserving successor edges and handler tags").
fn split_coprocessor_blocks(lir: &mut LirCfg) {
    for b in lir.blocks_iter().collect::<Vec<_>>() {
        loop {
            let insts = &lir.block(b).insts;
            let Some(pos) = insts.iter().position(|i| i.is_coprocessor_call) else {
                break;
            };
            if pos + 1 == insts.len() {
                break; // already last.
            }

            let handler_tag = lir.block(b).handler_tag;
            let new_block = lir.add_block(handler_tag);
            let tail: Vec<_> = lir.block_mut(b).insts.split_off(pos + 1);
            lir.block_mut(new_block).insts = tail;
            lir.block_mut(new_block).terminator = lir.block(b).terminator.clone();
            lir.block_mut(b).terminator = Terminator::Fallthrough(new_block);

            for succ in lir.succ_iter(b).collect::<Vec<_>>() {
                lir.delete_edge(b, succ);
                lir.add_edge(new_block, succ);
            }
            lir.add_edge(b, new_block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{MirNode, Opcode, Operand};
    use crate::lir::burg::{Arity, Rule};
    use crate::lir::inst::{LirInst, LirOperand};
    use crate::reg::RegSpace;

    fn test_table() -> BurgTable {
        let mut t = BurgTable::new();
        t.add_rule(Rule {
            name: "const_to_reg",
            nonterm: "stmt",
            arity: Arity::Leaf,
            matches: |n| matches!(n.opcode, Opcode::Const),
            cost: 1,
            emit: |sel, node, _kids| {
                let Some(Operand::Int(v)) = sel.cfg.node(node).operand else {
                    unreachable!()
                };
                let dst = sel.fresh();
                sel.emit(LirInst::new("movl").with_dst(LirOperand::Reg(dst)).with_src(LirOperand::Imm(v)));
                Ok(Some(dst))
            },
        });
        t
    }

    #[test]
    fn selection_fills_mirrored_block() {
        let mut cfg = Cfg::new("f");
        let c = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(5)));
        cfg.block_mut(cfg.entry()).push_stmt(c);

        let mut regs = RegisterManager::new();
        let table = test_table();
        let lir = select_instructions(&mut cfg, &table, &mut regs).unwrap();
        assert_eq!(lir.block(cfg.entry()).insts.len(), 1);
        assert_eq!(regs.get_latest_name(RegSpace::Virtual), Some(0));
    }
}
