//! SSA construction (spec §4.3 "Placement", "Renaming").
//!
//! Variables are the virtual-space registers (version 0) that a MIR tree
//! assigns via a statement root's `defined_reg`, and reads via a
//! [`crate::ir::Opcode::VarRef`] leaf whose own `defined_reg` names the
//! variable being read. Minimal-SSA placement inserts phis at dominance
//! frontiers; renaming then walks the dominator tree assigning fresh
//! versions, so that after this pass every `VarRef` and phi def carries a
//! positive SSA version (spec §3 invariant).

use crate::error::{CodegenError, CodegenResult};
use crate::graph::Dominance;
use crate::ir::node::{PhiArg, StmtExt};
use crate::ir::{BlockId, Cfg, MirNode, Opcode};
use crate::reg::{RegSpace, Register};
use rustc_hash::{FxHashMap, FxHashSet};

/// A pre-SSA variable: a virtual register at version 0.
type Var = Register;

fn is_var(reg: Register) -> bool {
    reg.space() == RegSpace::Virtual && reg.version() == Register::NO_VERSION
}

/// Construct minimal SSA form for `cfg`. Idempotent to call on a CFG that
/// is already in SSA form only if callers have not mutated it since;
/// generally call this exactly once per function, right after MIR
/// construction and before the scalar optimizer.
pub fn construct_ssa(cfg: &mut Cfg, dom: &Dominance) -> CodegenResult<()> {
    let _t = crate::timing::start("ssa_construct");

    let defsites = collect_defsites(cfg);
    let orig = collect_orig(cfg);

    place_phis(cfg, dom, &defsites, &orig);
    rename(cfg, dom)?;

    cfg.is_ssa = true;
    Ok(())
}

fn collect_defsites(cfg: &Cfg) -> FxHashMap<Var, Vec<BlockId>> {
    let mut sites: FxHashMap<Var, Vec<BlockId>> = FxHashMap::default();
    for b in cfg.blocks_iter() {
        for &stmt in cfg.block(b).stmts() {
            if let Some(reg) = cfg.node(stmt).defined_reg() {
                if is_var(reg) {
                    let list = sites.entry(reg).or_default();
                    if list.last() != Some(&b) {
                        list.push(b);
                    }
                }
            }
        }
    }
    sites
}

fn collect_orig(cfg: &Cfg) -> FxHashMap<BlockId, FxHashSet<Var>> {
    let mut orig: FxHashMap<BlockId, FxHashSet<Var>> = FxHashMap::default();
    for b in cfg.blocks_iter() {
        let set = orig.entry(b).or_default();
        for &stmt in cfg.block(b).stmts() {
            if let Some(reg) = cfg.node(stmt).defined_reg() {
                if is_var(reg) {
                    set.insert(reg);
                }
            }
        }
    }
    orig
}

fn place_phis(
    cfg: &mut Cfg,
    dom: &Dominance,
    defsites: &FxHashMap<Var, Vec<BlockId>>,
    orig: &FxHashMap<BlockId, FxHashSet<Var>>,
) {
    let empty = FxHashSet::default();
    for (&v, sites) in defsites {
        let mut worklist = sites.clone();
        let mut in_worklist: FxHashSet<BlockId> = sites.iter().copied().collect();
        let mut has_phi: FxHashSet<BlockId> = FxHashSet::default();

        while let Some(b) = worklist.pop() {
            for &f in dom.dominance_frontier(b) {
                if has_phi.insert(f) {
                    let pred_count = cfg.pred_count(f);
                    let mut phi = MirNode::new(Opcode::Phi)
                        .with_def(v)
                        .with_stmt(StmtExt::Phi {
                            args: vec![PhiArg::Invalid; pred_count],
                        });
                    if let Some(tag) = cfg.handler_tag_of(f) {
                        phi = phi.with_handler_tag(tag);
                    }
                    let id = cfg.add_stmt(phi);
                    cfg.block_mut(f).stmts_mut().insert(0, id);

                    let defines_originally = orig.get(&f).unwrap_or(&empty).contains(&v);
                    if !defines_originally && in_worklist.insert(f) {
                        worklist.push(f);
                    }
                }
            }
        }
    }
}

struct RenameState {
    next_version: u32,
    stack: Vec<u32>,
}

impl RenameState {
    fn new() -> Self {
        RenameState {
            next_version: 1,
            stack: Vec::new(),
        }
    }
}

fn rename(cfg: &mut Cfg, dom: &Dominance) -> CodegenResult<()> {
    let mut state: FxHashMap<Var, RenameState> = FxHashMap::default();
    rename_block(cfg, dom, dom_entry(cfg), &mut state)
}

fn dom_entry(cfg: &Cfg) -> BlockId {
    cfg.entry()
}

fn rename_block(
    cfg: &mut Cfg,
    dom: &Dominance,
    b: BlockId,
    state: &mut FxHashMap<Var, RenameState>,
) -> CodegenResult<()> {
    let mut pushed_this_block: Vec<Var> = Vec::new();

    // Step 1: rename phi defs at the head of this block.
    let stmts = cfg.block(b).stmts().to_vec();
    for &stmt in &stmts {
        if matches!(cfg.node(stmt).opcode, Opcode::Phi) {
            let var = cfg.node(stmt).defined_reg().expect("phi always defines");
            let version = push_fresh(state, var);
            cfg.node_mut(stmt).set_defined_reg(Some(var.with_version(version)));
            pushed_this_block.push(var);
        } else {
            break; // phis are always the block's prefix.
        }
    }

    // Step 2: for each remaining statement, rename uses then push a
    // fresh version for any def.
    for &stmt in &stmts {
        if matches!(cfg.node(stmt).opcode, Opcode::Phi) {
            continue;
        }
        rename_uses_in_subtree(cfg, stmt, state)?;
        if let Some(var) = cfg.node(stmt).defined_reg() {
            if is_var(var) {
                let version = push_fresh(state, var);
                cfg.node_mut(stmt).set_defined_reg(Some(var.with_version(version)));
                pushed_this_block.push(var);
            }
        }
    }

    // Step 3: fill in phi argument slots at every successor.
    for succ in cfg.succ_iter(b).collect::<Vec<_>>() {
        let preds: Vec<BlockId> = cfg.pred_iter(succ).collect();
        let Some(pos) = preds.iter().position(|&p| p == b) else {
            continue;
        };
        for &stmt in cfg.block(succ).stmts().to_vec().iter() {
            if !matches!(cfg.node(stmt).opcode, Opcode::Phi) {
                break;
            }
            let var_storage = cfg.node(stmt).defined_reg().unwrap().storage();
            let arg = match state.get(&var_storage).and_then(|s| s.stack.last()) {
                Some(&version) => PhiArg::Reg(var_storage.with_version(version)),
                None => PhiArg::Invalid,
            };
            if let Some(StmtExt::Phi { args }) = &mut cfg.node_mut(stmt).stmt {
                if pos < args.len() {
                    args[pos] = arg;
                }
            }
        }
    }

    // Step 4: recurse into dominator-tree children.
    for child in dom.dom_children(b).to_vec() {
        rename_block(cfg, dom, child, state)?;
    }

    // Step 5: pop versions pushed at steps 1 and 2.
    for var in pushed_this_block.into_iter().rev() {
        if let Some(s) = state.get_mut(&var) {
            s.stack.pop();
        }
    }

    Ok(())
}

fn push_fresh(state: &mut FxHashMap<Var, RenameState>, var: Var) -> u32 {
    let s = state.entry(var).or_insert_with(RenameState::new);
    let version = s.next_version;
    s.next_version += 1;
    s.stack.push(version);
    version
}

fn rename_uses_in_subtree(
    cfg: &mut Cfg,
    node_id: crate::ir::NodeId,
    state: &mut FxHashMap<Var, RenameState>,
) -> CodegenResult<()> {
    if matches!(cfg.node(node_id).opcode, Opcode::VarRef) {
        let var = cfg
            .node(node_id)
            .defined_reg()
            .expect("VarRef always names the variable it reads")
            .storage();
        let version = state
            .get(&var)
            .and_then(|s| s.stack.last().copied())
            .ok_or_else(|| CodegenError::UndefinedLocals(vec![format!("{}", var)]))?;
        cfg.node_mut(node_id).set_defined_reg(Some(var.with_version(version)));
    }
    let kids: Vec<_> = cfg.node(node_id).kids().collect();
    for kid in kids {
        rename_uses_in_subtree(cfg, kid, state)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::StmtExt;
    use crate::reg::RegisterManager;

    /// `if (c) { s = 1 } else { s = 2 }; use(s)` — classic diamond merge
    /// requiring exactly one phi for `s`.
    #[test]
    fn diamond_merge_inserts_phi() {
        let mut cfg = Cfg::new("diamond");
        let mut rm = RegisterManager::new();
        let s = rm.new_register(RegSpace::Virtual);

        let a = cfg.add_node();
        let b = cfg.add_node();
        let merge = cfg.add_node();
        cfg.add_edge(cfg.entry(), a);
        cfg.add_edge(cfg.entry(), b);
        cfg.add_edge(a, merge);
        cfg.add_edge(b, merge);
        cfg.add_edge(merge, cfg.exit());

        let def_a = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(s).with_operand(crate::ir::Operand::Int(1)));
        cfg.block_mut(a).push_stmt(def_a);
        let def_b = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(s).with_operand(crate::ir::Operand::Int(2)));
        cfg.block_mut(b).push_stmt(def_b);

        let read = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(s));
        cfg.block_mut(merge).push_stmt(read);

        let dom = Dominance::compute(&mut cfg);
        construct_ssa(&mut cfg, &dom).unwrap();

        let phis: Vec<_> = cfg
            .block(merge)
            .stmts()
            .iter()
            .filter(|&&st| matches!(cfg.node(st).opcode, Opcode::Phi))
            .copied()
            .collect();
        assert_eq!(phis.len(), 1);
        if let Some(StmtExt::Phi { args }) = &cfg.node(phis[0]).stmt {
            assert_eq!(args.len(), 2);
            assert!(args.iter().all(|a| matches!(a, PhiArg::Reg(_))));
        } else {
            panic!("expected phi stmt ext");
        }

        // The read of `s` must now carry a positive SSA version.
        assert!(cfg.node(read).defined_reg().unwrap().is_ssa());
    }
}
