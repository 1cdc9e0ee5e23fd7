//! Register allocation driver (spec §4.7).
//!
//! Ties together [`liveness`], [`interference`], [`coloring`], and
//! [`spill`] into the "re-run until coloring succeeds" loop: build the
//! interference graph, attempt a coloring, and if any candidate spills,
//! rewrite the LIR around fresh loads/stores and retry. Bounded so a
//! pathological function fails fast with [`CodegenError::RegallocInfeasible`]
//! instead of looping forever.

pub mod coloring;
pub mod interference;
pub mod liveness;
pub mod spill;

use crate::error::{CodegenError, CodegenResult};
use crate::lir::cfg::LirCfg;
use crate::lir::inst::{LirInst, LirOperand};
use crate::reg::{RegSpace, Register, RegisterManager};
use crate::regalloc::spill::Spiller;
use rustc_hash::{FxHashMap, FxHashSet};

/// Bound on build/color/spill retries before giving up (spec §4.7's loop
/// terminates once spilling stops helping; this caps pathological cases
/// where every candidate keeps re-spilling).
const MAX_ROUNDS: usize = 32;

pub struct Allocation {
    /// Every virtual register's final machine register, including
    /// precolored ones.
    pub colors: FxHashMap<Register, Register>,
    /// Spill slot assigned to each virtual that was ultimately spilled.
    pub spill_slots: FxHashMap<Register, Register>,
}

/// Allocate registers for `lir` in place: after this returns `Ok`, every
/// register operand in `lir` has been rewritten to a member of `palette`
/// or a spill slot plus fresh loads/stores around it.
pub fn allocate(
    lir: &mut LirCfg,
    regs: &mut RegisterManager,
    precolored: &FxHashMap<Register, Register>,
    palette: &[Register],
    compatible: &dyn Fn(Register, Register) -> bool,
    spiller: &dyn Spiller,
) -> CodegenResult<Allocation> {
    let _t = crate::timing::start("regalloc");
    let mut spill_slots: FxHashMap<Register, Register> = FxHashMap::default();

    for _ in 0..MAX_ROUNDS {
        let live = liveness::compute(lir);
        let graph = interference::build(lir, &live);
        let candidates = virtual_registers(lir, precolored);

        let result = coloring::color(&graph, &candidates, precolored, palette, compatible);
        if result.spilled.is_empty() {
            commit_colors(lir, &result.colors);
            return Ok(Allocation { colors: result.colors, spill_slots });
        }

        let new_slots = spill::spill(spiller, lir, regs, &result.spilled);
        spill_slots.extend(new_slots);
    }

    Err(CodegenError::RegallocInfeasible)
}

fn virtual_registers(lir: &LirCfg, precolored: &FxHashMap<Register, Register>) -> Vec<Register> {
    let mut seen = FxHashSet::default();
    for b in lir.blocks_iter() {
        for inst in &lir.block(b).insts {
            for r in inst.defs().into_iter().chain(inst.uses()) {
                if r.space() == RegSpace::Virtual && !precolored.contains_key(&r) {
                    seen.insert(r);
                }
            }
        }
    }
    seen.into_iter().collect()
}

fn commit_colors(lir: &mut LirCfg, colors: &FxHashMap<Register, Register>) {
    for b in lir.blocks_iter().collect::<Vec<_>>() {
        for inst in &mut lir.block_mut(b).insts {
            rewrite_inst(inst, colors);
        }
    }
}

fn rewrite_inst(inst: &mut LirInst, colors: &FxHashMap<Register, Register>) {
    if let Some(dst) = &mut inst.dst {
        rewrite_operand(dst, colors);
    }
    for src in &mut inst.srcs {
        rewrite_operand(src, colors);
    }
}

fn rewrite_operand(op: &mut LirOperand, colors: &FxHashMap<Register, Register>) {
    match op {
        LirOperand::Reg(r) => {
            if let Some(&c) = colors.get(r) {
                *r = c;
            }
        }
        LirOperand::Mem(m) => {
            if let Some(&c) = colors.get(&m.base) {
                m.base = c;
            }
            if let Some(i) = m.index {
                if let Some(&c) = colors.get(&i) {
                    m.index = Some(c);
                }
            }
        }
        LirOperand::Imm(_) | LirOperand::Label(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Cfg;
    use crate::regalloc::spill::DefaultSpiller;

    #[test]
    fn two_virtuals_fit_in_single_color_palette_via_spill() {
        let mir = Cfg::new("f");
        let mut lir = LirCfg::mirror_from(&mir);
        let mut regs = RegisterManager::new();
        let v0 = regs.new_register(RegSpace::Virtual);
        let v1 = regs.new_register(RegSpace::Virtual);
        let entry = mir.entry();
        lir.block_mut(entry).insts.push(LirInst::new("movl").with_dst(LirOperand::Reg(v0)).with_src(LirOperand::Imm(1)));
        lir.block_mut(entry).insts.push(LirInst::new("movl").with_dst(LirOperand::Reg(v1)).with_src(LirOperand::Imm(2)));
        lir.block_mut(entry).insts.push(
            LirInst::new("addl")
                .with_dst(LirOperand::Reg(v0))
                .with_src(LirOperand::Reg(v0))
                .with_src(LirOperand::Reg(v1)),
        );

        let m0 = regs.new_register(RegSpace::Machine);
        let palette = [m0];
        let precolored = FxHashMap::default();
        let alloc = allocate(&mut lir, &mut regs, &precolored, &palette, &|_, _| true, &DefaultSpiller).unwrap();
        assert!(!alloc.colors.is_empty() || !alloc.spill_slots.is_empty());
    }
}
