//! Copy folding (spec §4.4, run by the driver right after out-of-SSA
//! destruction, spec §2 data flow "out-of-SSA -> copy fold -> ... -> LIR").
//!
//! Builds a block-granular interference approximation, collects `dst <-
//! src` copy pairs, closes them into coalescing classes via union-find
//! (transitive: `a<-b`, `b<-c` merge `a`, `b`, `c` together), then
//! rewrites every reference to a folded register to its class
//! representative. A `compatible` predicate lets a caller veto a coalesce
//! — e.g. forbidding merges across incompatible machine-register banks.

use crate::ir::{Cfg, NodeId, Opcode};
use crate::opt::OptPass;
use crate::reg::Register;
use rustc_hash::{FxHashMap, FxHashSet};
use crate::ir::entities::BlockId;

/// The default pass registered in the scalar-optimizer driver: folds
/// copies with no compatibility restriction beyond interference.
pub struct CopyFold;

impl OptPass for CopyFold {
    fn name(&self) -> &'static str {
        "copy_fold"
    }

    fn run(&mut self, cfg: &mut Cfg) -> crate::error::CodegenResult<bool> {
        Ok(fold_copies(cfg, |_, _| true))
    }
}

/// Fold copies in `cfg`, consulting `compatible(dst, src)` before
/// accepting any merge. Returns whether anything changed.
pub fn fold_copies(cfg: &mut Cfg, compatible: impl Fn(Register, Register) -> bool) -> bool {
    let live_out = compute_live_out(cfg);
    let pairs = collect_copy_pairs(cfg);
    if pairs.is_empty() {
        return false;
    }

    let mut uf = UnionFind::new();
    for &(dst, src, block) in &pairs {
        uf.make(dst);
        uf.make(src);
        if !compatible(dst, src) {
            continue;
        }
        if interferes(dst, src, block, &live_out) {
            continue;
        }
        uf.union(dst, src);
    }

    let mut rewrites: FxHashMap<Register, Register> = FxHashMap::default();
    for &(dst, src, _) in &pairs {
        let rep = uf.find(dst);
        rewrites.entry(dst).or_insert(rep);
        rewrites.entry(src).or_insert(rep);
    }

    let mut changed = false;
    for b in cfg.blocks_iter().collect::<Vec<_>>() {
        for &stmt in cfg.block(b).stmts().to_vec().iter() {
            changed |= rewrite_subtree(cfg, stmt, &rewrites);
        }
    }

    // Copies whose dst now equals src's representative are pure
    // self-copies; drop them so DCE doesn't need a special case for them.
    for b in cfg.blocks_iter().collect::<Vec<_>>() {
        let dead: Vec<NodeId> = cfg
            .block(b)
            .stmts()
            .iter()
            .copied()
            .filter(|&s| is_self_copy(cfg, s))
            .collect();
        if !dead.is_empty() {
            changed = true;
            cfg.block_mut(b).stmts_mut().retain(|s| !dead.contains(s));
        }
    }

    changed
}

fn is_self_copy(cfg: &Cfg, id: NodeId) -> bool {
    let node = cfg.node(id);
    matches!(node.opcode, Opcode::Copy)
        && node
            .kid(0)
            .and_then(|k| cfg.node(k).defined_reg())
            .zip(node.defined_reg())
            .map(|(src, dst)| src == dst)
            .unwrap_or(false)
}

fn rewrite_subtree(cfg: &mut Cfg, id: NodeId, rewrites: &FxHashMap<Register, Register>) -> bool {
    let mut changed = false;
    for kid in cfg.node(id).kids().collect::<Vec<_>>() {
        changed |= rewrite_subtree(cfg, kid, rewrites);
    }
    let node = cfg.node_mut(id);
    if let Some(r) = node.defined_reg() {
        if let Some(&rep) = rewrites.get(&r) {
            if rep != r {
                node.set_defined_reg(Some(rep));
                changed = true;
            }
        }
    }
    changed
}

fn collect_copy_pairs(cfg: &Cfg) -> Vec<(Register, Register, BlockId)> {
    let mut pairs = Vec::new();
    for b in cfg.blocks_iter() {
        for &stmt in cfg.block(b).stmts() {
            let node = cfg.node(stmt);
            if matches!(node.opcode, Opcode::Copy) {
                if let (Some(dst), Some(src_node)) = (node.defined_reg(), node.kid(0)) {
                    if let Some(src) = cfg.node(src_node).defined_reg() {
                        pairs.push((dst, src, b));
                    }
                }
            }
        }
    }
    pairs
}

/// Block-granular: two registers "interfere" if both are live out of some
/// block other than the one holding the copy linking them. Coarser than
/// the per-instruction liveness the register allocator computes (spec
/// §4.7), but cheap and sufficient to keep folding from merging variables
/// with genuinely overlapping lifetimes.
fn interferes(
    a: Register,
    b: Register,
    copy_block: BlockId,
    live_out: &FxHashMap<BlockId, FxHashSet<Register>>,
) -> bool {
    live_out.iter().any(|(&blk, set)| blk != copy_block && set.contains(&a) && set.contains(&b))
}

fn compute_live_out(cfg: &Cfg) -> FxHashMap<BlockId, FxHashSet<Register>> {
    let mut uses: FxHashMap<BlockId, FxHashSet<Register>> = FxHashMap::default();
    let mut defs: FxHashMap<BlockId, FxHashSet<Register>> = FxHashMap::default();
    for b in cfg.blocks_iter() {
        let mut u = FxHashSet::default();
        let mut d = FxHashSet::default();
        for &stmt in cfg.block(b).stmts() {
            collect_uses(cfg, stmt, &mut u);
            if let Some(r) = cfg.node(stmt).defined_reg() {
                d.insert(r);
            }
        }
        uses.insert(b, u);
        defs.insert(b, d);
    }

    let mut live_in: FxHashMap<BlockId, FxHashSet<Register>> =
        cfg.blocks_iter().map(|b| (b, FxHashSet::default())).collect();
    let mut live_out: FxHashMap<BlockId, FxHashSet<Register>> =
        cfg.blocks_iter().map(|b| (b, FxHashSet::default())).collect();

    let mut changed = true;
    while changed {
        changed = false;
        for b in cfg.blocks_iter() {
            let mut out = FxHashSet::default();
            for s in cfg.succ_iter(b) {
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
    live_out
}

fn collect_uses(cfg: &Cfg, id: NodeId, used: &mut FxHashSet<Register>) {
    let node = cfg.node(id);
    if matches!(node.opcode, Opcode::VarRef) {
        if let Some(r) = node.defined_reg() {
            used.insert(r);
        }
    }
    for kid in node.kids() {
        collect_uses(cfg, kid, used);
    }
}

/// Minimal union-find over [`Register`] for transitive copy coalescing.
struct UnionFind {
    parent: FxHashMap<Register, Register>,
}

impl UnionFind {
    fn new() -> Self {
        UnionFind { parent: FxHashMap::default() }
    }

    fn make(&mut self, r: Register) {
        self.parent.entry(r).or_insert(r);
    }

    fn find(&mut self, r: Register) -> Register {
        let p = *self.parent.get(&r).unwrap_or(&r);
        if p == r {
            r
        } else {
            let root = self.find(p);
            self.parent.insert(r, root);
            root
        }
    }

    fn union(&mut self, a: Register, b: Register) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::MirNode;
    use crate::reg::RegSpace;
    use crate::reg::RegisterManager;

    #[test]
    fn non_interfering_copy_chain_folds_transitively() {
        let mut cfg = Cfg::new("f");
        let mut rm = RegisterManager::new();
        let a = rm.new_register(RegSpace::Virtual);
        let b = rm.new_register(RegSpace::Virtual);
        let c = rm.new_register(RegSpace::Virtual);

        let def_a = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(a));
        let read_a = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(a));
        let copy_b = cfg.add_stmt(MirNode::new(Opcode::Copy).with_def(b).with_kid0(read_a));
        let read_b = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(b));
        let copy_c = cfg.add_stmt(MirNode::new(Opcode::Copy).with_def(c).with_kid0(read_b));
        let read_c = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(c));
        let ret = cfg.add_stmt(MirNode::new(Opcode::Return).with_kid0(read_c));

        let blk = cfg.block_mut(cfg.entry());
        blk.push_stmt(def_a);
        blk.push_stmt(copy_b);
        blk.push_stmt(copy_c);
        blk.push_stmt(ret);

        let changed = fold_copies(&mut cfg, |_, _| true);
        assert!(changed);
        assert_eq!(cfg.node(ret).kid(0).and_then(|k| cfg.node(k).defined_reg()), Some(a));
    }
}
