//! Inline-mode handler linking (spec §4.10 "inline mode").
//!
//! Merges every handler's MIR CFG into one function-wide CFG (spec:
//! "build one global MIR CFG by concatenating all handler CFGs") and
//! rewrites `SendPacket` statements whose destination resolves to exactly
//! one statically-known peer handler into a direct jump to that handler's
//! entry block, pruning the edge to `exit` the send used to take.
//!
//! Resolving a send's destination when a PE's port could route to more
//! than one candidate handler is the "candidate-protocol resolution"
//! question spec §9 calls out as not evident from the driver and not to
//! be guessed here; this pass only links a send when its source PE's port
//! names exactly one connected peer PE with exactly one `Push` handler,
//! and leaves every other send as a runtime call for the backend to lower
//! normally. Only the common NetVM pattern of "send, then return" is
//! linked: a `SendPacket` statement immediately followed by the block's
//! `Return` terminator. Sends that are not block-final are left alone;
//! a from-scratch iterative splitter would be needed to link those, and
//! nothing in `original_source`'s `jit_interface.cpp` shows that case
//! occurring in practice.

use crate::app::NetvmApp;
use crate::ir::entities::{BlockId, HandlerTag, NodeId};
use crate::ir::node::{MirNode, Opcode, StmtExt};
use crate::ir::Cfg;
use crate::reg::RegisterManager;
use cranelift_entity::EntityRef;
use rustc_hash::FxHashMap;

/// Where one source handler landed after merging.
struct Placement {
    entry: BlockId,
    pe_idx: usize,
}

/// Merge every handler of every PE in `app` into one CFG, linking
/// statically-resolvable sends along the way. Returns the merged CFG, the
/// single [`RegisterManager`] every further pass over it must use, and
/// the entry-selector register a caller sets before jumping into the
/// synthetic entry's dispatch switch.
pub fn build_inline_unit(app: &NetvmApp) -> (Cfg, RegisterManager) {
    let _t = crate::timing::start("inline_merge");
    let mut merged = Cfg::new("inline_unit");
    let mut regs = RegisterManager::new();

    // First pass: copy every handler's blocks and nodes, recording where
    // each landed. A handler's own synthetic entry/exit blocks are
    // dropped; callers into it are rewired to the first real block.
    let mut placements: FxHashMap<(usize, usize), Placement> = FxHashMap::default();
    let mut selector_cases: Vec<(i64, BlockId)> = Vec::new();
    let mut next_selector = 0i64;

    for (pe_idx, pe) in app.pes.iter().enumerate() {
        for (h_idx, handler) in pe.handlers.iter().enumerate() {
            let tag = HandlerTag::new(placements.len());
            let entry = merge_one(&mut merged, &handler.cfg, &mut regs, tag);
            placements.insert((pe_idx, h_idx), Placement { entry, pe_idx });
            selector_cases.push((next_selector, entry));
            next_selector += 1;
        }
    }

    // Synthetic entry dispatches on a selector virtual the embedding
    // runtime is expected to set before invoking the merged function
    // (spec §4.10: "compiles the whole graph as one function").
    let selector = regs.new_register(crate::reg::RegSpace::Virtual);
    let default = selector_cases.first().map(|&(_, b)| b).unwrap_or(merged.exit());
    let scrutinee = merged.add_stmt(MirNode::new(Opcode::VarRef).with_def(selector));
    let dispatch = merged
        .add_stmt(MirNode::new(Opcode::Switch).with_kid0(scrutinee).with_stmt(StmtExt::Switch { cases: selector_cases.clone(), default }));
    merged.block_mut(merged.entry()).push_stmt(scrutinee);
    merged.block_mut(merged.entry()).push_stmt(dispatch);
    for &(_, target) in &selector_cases {
        merged.add_edge(merged.entry(), target);
    }

    // Second pass: link sends whose destination PE has exactly one Push
    // handler and whose port names exactly that one peer.
    for (pe_idx, pe) in app.pes.iter().enumerate() {
        for port in &pe.ports {
            let Some(peer_idx) = port.is_connected_pe else { continue };
            let push_handlers: Vec<usize> = app.pes[peer_idx]
                .handlers
                .iter()
                .enumerate()
                .filter(|(_, h)| h.kind == crate::app::HandlerKind::Push)
                .map(|(i, _)| i)
                .collect();
            let [only_push] = push_handlers.as_slice() else { continue };
            let Some(target) = placements.get(&(peer_idx, *only_push)) else { continue };
            link_sends_for_pe(&mut merged, &placements, pe_idx, target.entry);
        }
    }

    (merged, regs)
}

/// Copy `src`'s blocks and nodes into `dst`'s arenas (everything but
/// `src`'s own exit block, which every copied edge is redirected onto
/// `dst`'s shared exit instead). Returns the `BlockId` `src.entry()`
/// landed at.
///
/// Every register `src` names was minted by its own, independent
/// [`RegisterManager`] (spec §5: "an implementation must reset \[the
/// register model's counters\] between compilation units or scope them
/// per unit") — two unrelated handlers can and normally do both use
/// virtual register name 0. Copying nodes verbatim would make the merged
/// CFG's SSA construction see those as the *same* variable, so every
/// register this handler's nodes name is remapped to a fresh one minted
/// from `dst_regs`, the one manager the whole merged unit shares from
/// here on.
fn merge_one(dst: &mut Cfg, src: &Cfg, dst_regs: &mut RegisterManager, tag: HandlerTag) -> BlockId {
    let mut block_map: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    let mut node_map: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut reg_map: FxHashMap<crate::reg::Register, crate::reg::Register> = FxHashMap::default();

    for b in src.blocks_iter() {
        if b == src.exit() {
            continue;
        }
        let nb = dst.add_node();
        dst.block_mut(nb).handler_tag = Some(tag);
        block_map.insert(b, nb);
    }

    for (nid, node) in src.nodes().iter() {
        let mut copy = node.clone();
        copy.set_kid(0, node.kid(0).map(|k| node_map[&k]));
        copy.set_kid(1, node.kid(1).map(|k| node_map[&k]));
        copy.handler_tag = Some(tag);
        if let Some(orig) = copy.defined_reg() {
            copy.set_defined_reg(Some(remap_register(orig, &mut reg_map, dst_regs)));
        }
        if let Some(ext) = &mut copy.stmt {
            remap_stmt_targets(ext, &block_map, dst.exit());
            if let StmtExt::Call { args } = ext {
                for a in args.iter_mut() {
                    *a = remap_register(*a, &mut reg_map, dst_regs);
                }
            }
        }
        let new_id = dst.add_stmt(copy);
        node_map.insert(nid, new_id);
    }

    for &b in &block_map.keys().copied().collect::<Vec<_>>() {
        let new_b = block_map[&b];
        for &stmt in src.block(b).stmts() {
            dst.block_mut(new_b).push_stmt(node_map[&stmt]);
        }
        for succ in src.succ_iter(b) {
            let new_succ = if succ == src.exit() { dst.exit() } else { block_map[&succ] };
            dst.add_edge(new_b, new_succ);
        }
    }

    block_map[&src.entry()]
}

fn remap_register(
    r: crate::reg::Register,
    reg_map: &mut FxHashMap<crate::reg::Register, crate::reg::Register>,
    regs: &mut RegisterManager,
) -> crate::reg::Register {
    *reg_map.entry(r).or_insert_with(|| regs.new_register(r.space()))
}

fn remap_stmt_targets(ext: &mut StmtExt, block_map: &FxHashMap<BlockId, BlockId>, exit: BlockId) {
    let remap = |b: BlockId| *block_map.get(&b).unwrap_or(&exit);
    match ext {
        StmtExt::Jump { target } => *target = remap(*target),
        StmtExt::Branch { true_target, false_target } => {
            *true_target = remap(*true_target);
            *false_target = remap(*false_target);
        }
        StmtExt::Switch { cases, default } => {
            for (_, t) in cases.iter_mut() {
                *t = remap(*t);
            }
            *default = remap(*default);
        }
        StmtExt::Phi { .. } | StmtExt::Call { .. } | StmtExt::Store { .. } => {}
    }
}

/// Within every block tagged as belonging to `pe_idx`, rewrite a
/// `SendPacket` that is immediately followed by the block's `Return`
/// terminator into a jump to `target`, dropping the `Return` and
/// redirecting the block's edge to `exit` onto `target` instead.
fn link_sends_for_pe(cfg: &mut Cfg, placements: &FxHashMap<(usize, usize), Placement>, pe_idx: usize, target: BlockId) {
    let candidate_blocks: Vec<BlockId> = placements
        .values()
        .filter(|p| p.pe_idx == pe_idx)
        .map(|p| p.entry)
        .collect();
    let mut to_rewrite = Vec::new();
    for &start in &candidate_blocks {
        for b in reachable_from(cfg, start) {
            let stmts = cfg.block(b).stmts().to_vec();
            if stmts.len() < 2 {
                continue;
            }
            let send = stmts[stmts.len() - 2];
            let ret = stmts[stmts.len() - 1];
            if cfg.node(send).opcode == Opcode::SendPacket && cfg.node(ret).opcode == Opcode::Return {
                to_rewrite.push((b, send));
            }
        }
    }

    for (b, send) in to_rewrite {
        cfg.node_mut(send).opcode = Opcode::Jump;
        cfg.node_mut(send).stmt = Some(StmtExt::Jump { target });
        cfg.block_mut(b).stmts_mut().pop();
        cfg.delete_edge(b, cfg.exit());
        cfg.add_edge(b, target);
    }
}

fn reachable_from(cfg: &Cfg, start: BlockId) -> Vec<BlockId> {
    let mut seen = vec![start];
    let mut stack = vec![start];
    while let Some(b) = stack.pop() {
        for s in cfg.succ_iter(b) {
            if !seen.contains(&s) {
                seen.push(s);
                stack.push(s);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Handler, HandlerKind, Port, ProcessingElement};
    use crate::ir::node::Opcode;

    fn trivial_handler(kind: HandlerKind) -> Handler {
        let mut cfg = Cfg::new("h");
        let ret = cfg.add_stmt(MirNode::new(Opcode::Return));
        cfg.block_mut(cfg.entry()).push_stmt(ret);
        cfg.add_edge(cfg.entry(), cfg.exit());
        Handler::new(kind, cfg, RegisterManager::new())
    }

    #[test]
    fn merge_keeps_one_entry_per_handler_reachable() {
        let mut app = NetvmApp::new();
        let mut pe = ProcessingElement::new("a");
        pe.handlers.push(trivial_handler(HandlerKind::Init));
        pe.handlers.push(trivial_handler(HandlerKind::Push));
        app.add_pe(pe);

        let (merged, _regs) = build_inline_unit(&app);
        assert_eq!(merged.succ_count(merged.entry()), 2);
    }

    #[test]
    fn send_followed_by_return_links_to_peer_push_handler() {
        let mut app = NetvmApp::new();

        let mut sender_cfg = Cfg::new("sender");
        let send = sender_cfg.add_stmt(MirNode::new(Opcode::SendPacket).with_stmt(StmtExt::Call { args: Default::default() }));
        let ret = sender_cfg.add_stmt(MirNode::new(Opcode::Return));
        sender_cfg.block_mut(sender_cfg.entry()).push_stmt(send);
        sender_cfg.block_mut(sender_cfg.entry()).push_stmt(ret);
        sender_cfg.add_edge(sender_cfg.entry(), sender_cfg.exit());

        let mut sender_pe = ProcessingElement::new("sender");
        sender_pe.handlers.push(Handler::new(HandlerKind::Push, sender_cfg, RegisterManager::new()));
        sender_pe.ports.push(Port { is_connected_pe: Some(1), is_connected_socket: false });
        app.add_pe(sender_pe);

        let mut receiver_pe = ProcessingElement::new("receiver");
        receiver_pe.handlers.push(trivial_handler(HandlerKind::Push));
        app.add_pe(receiver_pe);

        let (merged, _regs) = build_inline_unit(&app);
        let sender_entry = merged.succ_iter(merged.entry()).next().unwrap();
        assert!(merged.succ_iter(sender_entry).any(|s| s != merged.exit()));
    }
}
