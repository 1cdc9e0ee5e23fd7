//! Spill code insertion (spec §4.7 "rewrite").
//!
//! Each spilled virtual gets one stack slot (a [`RegSpace::Spill`]
//! register). Every use is preceded by a load into a fresh virtual with a
//! live range of exactly one instruction; every def is redirected to a
//! fresh virtual followed by a store. Operands are patched directly
//! rather than via a blanket rename, since a single instruction can both
//! use and define the same spilled register (e.g. a memory operand's
//! base register alongside an unrelated destination) with different
//! storage after the rewrite.

use crate::lir::cfg::LirCfg;
use crate::lir::inst::{LirInst, LirOperand};
use crate::reg::{RegSpace, Register, RegisterManager};
use rustc_hash::FxHashMap;

/// Supplies the mnemonics used for the loads/stores a spill pass inserts.
/// A target that needs a different move instruction per register class
/// can implement this instead of using [`DefaultSpiller`].
pub trait Spiller {
    fn load_mnemonic(&self) -> &'static str {
        "movl"
    }
    fn store_mnemonic(&self) -> &'static str {
        "movl"
    }
}

pub struct DefaultSpiller;

impl Spiller for DefaultSpiller {}

/// Rewrite `lir` so that every register in `spilled` lives in a stack
/// slot instead, returning the register-to-slot assignment for
/// diagnostics. `regs` supplies both the spill slots and the fresh
/// load/store virtuals.
pub fn spill(spiller: &dyn Spiller, lir: &mut LirCfg, regs: &mut RegisterManager, spilled: &[Register]) -> FxHashMap<Register, Register> {
    let _t = crate::timing::start("spill");
    let slots: FxHashMap<Register, Register> = spilled.iter().map(|&r| (r, regs.new_register(RegSpace::Spill))).collect();
    if slots.is_empty() {
        return slots;
    }

    for b in lir.blocks_iter().collect::<Vec<_>>() {
        let old_insts = std::mem::take(&mut lir.block_mut(b).insts);
        let mut new_insts = Vec::with_capacity(old_insts.len());
        for mut inst in old_insts {
            let used_spilled: Vec<Register> = inst.uses().into_iter().filter(|r| slots.contains_key(r)).collect();
            for r in used_spilled {
                let slot = slots[&r];
                let fresh = regs.new_register(RegSpace::Virtual);
                new_insts.push(LirInst::new(spiller.load_mnemonic()).with_dst(LirOperand::Reg(fresh)).with_src(LirOperand::Reg(slot)));
                patch_uses(&mut inst, r, fresh);
            }

            let mut post_store = None;
            if let Some(LirOperand::Reg(d)) = inst.dst {
                if let Some(&slot) = slots.get(&d) {
                    let fresh = regs.new_register(RegSpace::Virtual);
                    inst.dst = Some(LirOperand::Reg(fresh));
                    post_store = Some((fresh, slot));
                }
            }

            new_insts.push(inst);
            if let Some((fresh, slot)) = post_store {
                new_insts.push(
                    LirInst::new(spiller.store_mnemonic())
                        .with_dst(LirOperand::Reg(slot))
                        .with_src(LirOperand::Reg(fresh))
                        .with_side_effect(),
                );
            }
        }
        lir.block_mut(b).insts = new_insts;
    }
    slots
}

/// Rewrite every *use* occurrence of `old` in `inst` to `new`: `srcs`,
/// plus `dst`'s base/index if `dst` is a memory operand (a store's
/// address registers are reads, not the instruction's def).
fn patch_uses(inst: &mut LirInst, old: Register, new: Register) {
    for src in &mut inst.srcs {
        patch_operand(src, old, new);
    }
    if let Some(LirOperand::Mem(m)) = &mut inst.dst {
        if m.base == old {
            m.base = new;
        }
        if m.index == Some(old) {
            m.index = Some(new);
        }
    }
}

fn patch_operand(op: &mut LirOperand, old: Register, new: Register) {
    match op {
        LirOperand::Reg(r) if *r == old => *r = new,
        LirOperand::Mem(m) => {
            if m.base == old {
                m.base = new;
            }
            if m.index == Some(old) {
                m.index = Some(new);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Cfg;

    #[test]
    fn spilled_use_gets_load_and_def_gets_store() {
        let mir = Cfg::new("f");
        let mut lir = LirCfg::mirror_from(&mir);
        let mut regs = RegisterManager::new();
        let v0 = regs.new_register(RegSpace::Virtual);
        let v1 = regs.new_register(RegSpace::Virtual);
        lir.block_mut(mir.entry()).insts.push(
            LirInst::new("addl")
                .with_dst(LirOperand::Reg(v1))
                .with_src(LirOperand::Reg(v0))
                .with_src(LirOperand::Imm(1)),
        );

        let slots = spill(&DefaultSpiller, &mut lir, &mut regs, &[v0, v1]);
        assert_eq!(slots.len(), 2);
        let insts = &lir.block(mir.entry()).insts;
        assert_eq!(insts.len(), 3);
        assert_eq!(insts[0].mnemonic, "movl"); // load v0
        assert_eq!(insts[1].mnemonic, "addl");
        assert_eq!(insts[2].mnemonic, "movl"); // store v1
        assert!(!insts[1].uses().contains(&v0));
        assert_ne!(insts[1].dst, Some(LirOperand::Reg(v1)));
    }
}
