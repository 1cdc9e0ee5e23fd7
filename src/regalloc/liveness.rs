//! Liveness analysis over LIR (spec §4.7 "Liveness").
//!
//! Bit-vector-style sets indexed by dense register identity (the register
//! allocator's precondition is that candidate registers were already
//! densely renamed, spec §4.1 Register_Mapping). SSA is gone by the time
//! LIR exists (out-of-SSA runs before instruction selection, spec §2
//! "Data flow"), so unlike the MIR-level analyses there is no φ-use
//! edge attribution to worry about here.

use crate::ir::entities::BlockId;
use crate::lir::LirCfg;
use crate::reg::Register;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

/// Live-in/live-out per block, plus the live-out set immediately after
/// each instruction (used by [`crate::regalloc::interference`] to build
/// the interference graph without re-deriving per-instruction liveness).
pub struct Liveness {
    pub live_in: FxHashMap<BlockId, FxHashSet<Register>>,
    pub live_out: FxHashMap<BlockId, FxHashSet<Register>>,
    /// Per block, the live set immediately after each instruction (same
    /// length and order as the block's instruction list).
    pub after_inst: FxHashMap<BlockId, Vec<FxHashSet<Register>>>,
}

/// Compute liveness for every block of `lir` (spec §4.7: "computed in
/// reverse order").
pub fn compute(lir: &LirCfg) -> Liveness {
    let _t = crate::timing::start("liveness");
    let mut uses: FxHashMap<BlockId, FxHashSet<Register>> = FxHashMap::default();
    let mut defs: FxHashMap<BlockId, FxHashSet<Register>> = FxHashMap::default();
    for b in lir.blocks_iter() {
        let mut u = FxHashSet::default();
        let mut d = FxHashSet::default();
        for inst in &lir.block(b).insts {
            for use_reg in inst.uses() {
                if !d.contains(&use_reg) {
                    u.insert(use_reg);
                }
            }
            for def_reg in inst.defs() {
                d.insert(def_reg);
            }
        }
        uses.insert(b, u);
        defs.insert(b, d);
    }

    let mut live_in: FxHashMap<BlockId, FxHashSet<Register>> =
        lir.blocks_iter().map(|b| (b, FxHashSet::default())).collect();
    let mut live_out: FxHashMap<BlockId, FxHashSet<Register>> =
        lir.blocks_iter().map(|b| (b, FxHashSet::default())).collect();

    let mut changed = true;
    while changed {
        changed = false;
        for b in lir.blocks_iter() {
            let mut out = FxHashSet::default();
            for s in lir.succ_iter(b) {
                out.extend(live_in[&s].iter().copied());
            }
            let mut new_in = uses[&b].clone();
            new_in.extend(out.difference(&defs[&b]).copied());
            if out != live_out[&b] || new_in != live_in[&b] {
                changed = true;
            }
            live_out.insert(b, out);
            live_in.insert(b, new_in);
        }
    }

    let mut after_inst: FxHashMap<BlockId, Vec<FxHashSet<Register>>> = FxHashMap::default();
    for b in lir.blocks_iter() {
        let insts = &lir.block(b).insts;
        let mut live = live_out[&b].clone();
        let mut after = vec![FxHashSet::default(); insts.len()];
        for (i, inst) in insts.iter().enumerate().rev() {
            after[i] = live.clone();
            for d in inst.defs() {
                live.remove(&d);
            }
            for u in inst.uses() {
                live.insert(u);
            }
        }
        after_inst.insert(b, after);
    }

    Liveness { live_in, live_out, after_inst }
}
