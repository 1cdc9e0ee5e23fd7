//! Memory-access canonicalization (spec §2 component 6, §4.5).
//!
//! Rewrites every typed `Load(space, size)`/`Store(space, size)` into the
//! canonical `(base, offset, size)` triple the instruction selector's
//! BURG rules are written against: a `LoadBase(space)` materializes the
//! space's runtime base pointer into a fresh virtual register once per
//! distinct base per block, and every access against that space becomes
//! `LoadIndexed`/`StoreIndexed` over `Add(base, offset)` (kept as an
//! ordinary `Add` node rather than a new address-mode node so the two-kid
//! node shape stays uniform, per the REDESIGN FLAGS in spec §9). This
//! mirrors NetBee's `mem_translator` pass, folded here into one `Cfg`-wide
//! rewrite instead of a separate visitor per target.

use crate::ir::{BlockId, Cfg, MemSpace, MirNode, NodeId, Opcode};
use crate::reg::{RegSpace, Register, RegisterManager};
use rustc_hash::FxHashMap;

/// Canonicalize every memory access in `cfg`.
pub fn canonicalize_memory(cfg: &mut Cfg, regs: &mut RegisterManager) {
    let _t = crate::timing::start("mem_translate");
    for b in cfg.blocks_iter().collect::<Vec<_>>() {
        let mut bases: FxHashMap<MemSpace, Register> = FxHashMap::default();
        let stmts = cfg.block(b).stmts().to_vec();
        let mut rewritten = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            canonicalize_subtree(cfg, stmt, b, &mut bases, regs, &mut rewritten);
            rewritten.push(stmt);
        }
        *cfg.block_mut(b).stmts_mut() = rewritten;
    }
}

/// Return the register holding `space`'s base pointer, materializing a
/// `LoadBase` statement into `prelude` the first time `space` is touched
/// in this block.
fn base_for(
    cfg: &mut Cfg,
    space: MemSpace,
    bases: &mut FxHashMap<MemSpace, Register>,
    regs: &mut RegisterManager,
    prelude: &mut Vec<NodeId>,
) -> Register {
    if let Some(&r) = bases.get(&space) {
        return r;
    }
    let r = regs.new_register(RegSpace::Virtual);
    let id = cfg.add_stmt(MirNode::new(Opcode::LoadBase(space)).with_def(r));
    prelude.push(id);
    bases.insert(space, r);
    r
}

fn canonicalize_subtree(
    cfg: &mut Cfg,
    id: NodeId,
    block: BlockId,
    bases: &mut FxHashMap<MemSpace, Register>,
    regs: &mut RegisterManager,
    prelude: &mut Vec<NodeId>,
) {
    let _ = block;
    for kid in cfg.node(id).kids().collect::<Vec<_>>() {
        canonicalize_subtree(cfg, kid, block, bases, regs, prelude);
    }

    match cfg.node(id).opcode {
        Opcode::Load(space, size) => {
            let base = base_for(cfg, space, bases, regs, prelude);
            let offset = cfg.node(id).kid(0).expect("Load carries an offset kid");
            let address = address_node(cfg, base, offset);
            let node = cfg.node_mut(id);
            node.opcode = Opcode::LoadIndexed(size);
            node.set_kid(0, Some(address));
            node.set_kid(1, None);
        }
        Opcode::Store(space, size) => {
            let base = base_for(cfg, space, bases, regs, prelude);
            let offset = cfg.node(id).kid(0).expect("Store carries an offset kid");
            let value = cfg.node(id).kid(1);
            let address = address_node(cfg, base, offset);
            let node = cfg.node_mut(id);
            node.opcode = Opcode::StoreIndexed(size);
            node.set_kid(0, Some(address));
            node.set_kid(1, value);
        }
        _ => {}
    }
}

fn address_node(cfg: &mut Cfg, base: Register, offset: NodeId) -> NodeId {
    let base_leaf = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(base));
    cfg.add_stmt(MirNode::new(Opcode::Add).with_kid0(base_leaf).with_kid1(offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Operand;

    #[test]
    fn load_gets_one_shared_base_per_block() {
        let mut cfg = Cfg::new("f");
        let mut rm = RegisterManager::new();

        let off1 = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(4)));
        let load1 = cfg.add_stmt(MirNode::new(Opcode::Load(MemSpace::Packet, crate::ir::AccessSize::Byte)).with_kid0(off1));
        let off2 = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(8)));
        let load2 = cfg.add_stmt(MirNode::new(Opcode::Load(MemSpace::Packet, crate::ir::AccessSize::Half)).with_kid0(off2));
        let blk = cfg.block_mut(cfg.entry());
        blk.push_stmt(load1);
        blk.push_stmt(load2);

        canonicalize_memory(&mut cfg, &mut rm);

        let base_count = cfg
            .block(cfg.entry())
            .stmts()
            .iter()
            .filter(|&&s| matches!(cfg.node(s).opcode, Opcode::LoadBase(MemSpace::Packet)))
            .count();
        assert_eq!(base_count, 1);
        assert!(matches!(cfg.node(load1).opcode, Opcode::LoadIndexed(_)));
        assert!(matches!(cfg.node(load2).opcode, Opcode::LoadIndexed(_)));
    }
}
