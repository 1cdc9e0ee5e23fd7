//! Trace builder and layout (spec §3 "Trace", §4.8).
//!
//! Greedy trace formation from the entry block, followed by terminator
//! normalization that exploits the chosen layout's fall-through, and a
//! branch-reach classifier the binary emitter runs once block offsets are
//! known.

use crate::ir::entities::BlockId;
use crate::lir::{LirCfg, Terminator};
use rustc_hash::{FxHashMap, FxHashSet};

/// The successor a block's terminator treats as its natural fall-through
/// target, used to bias greedy placement (spec §4.8: "heaviest successor
/// (preferably a fall-through candidate)"). We have no profile data, so
/// the terminator kind alone decides: a jump's only target, or a
/// branch's false arm (the arm §4.8 says to "leave as is" when it already
/// lines up with layout), or a switch's default case.
fn preferred_successor(term: &Terminator) -> Option<BlockId> {
    match term {
        Terminator::Fallthrough(t) | Terminator::Jump(t) => Some(*t),
        Terminator::Branch { false_target, .. } => Some(*false_target),
        Terminator::Switch { default, .. } => Some(*default),
        Terminator::Return => None,
    }
}

/// Greedily order every block of `lir` for emission (spec §4.8): place
/// the entry first, then follow each block's preferred successor while
/// it is unplaced, falling back to the next unplaced block in ascending
/// `BlockId` order (our stand-in for "some deterministic order", since
/// there is no execution-frequency profile to consult).
pub fn build_trace(lir: &LirCfg) -> Vec<BlockId> {
    let _t = crate::timing::start("trace_build");
    let all: Vec<BlockId> = lir.blocks_iter().collect();
    let mut placed: FxHashSet<BlockId> = FxHashSet::default();
    let mut order = Vec::with_capacity(all.len());
    let mut fallback_idx = 0usize;
    let mut current = Some(lir.entry());

    while order.len() < all.len() {
        let b = match current {
            Some(b) if !placed.contains(&b) => b,
            _ => {
                while fallback_idx < all.len() && placed.contains(&all[fallback_idx]) {
                    fallback_idx += 1;
                }
                match all.get(fallback_idx) {
                    Some(&b) => b,
                    None => break,
                }
            }
        };
        placed.insert(b);
        order.push(b);
        current = preferred_successor(&lir.block(b).terminator).filter(|s| !placed.contains(s));
    }
    order
}

/// Record each block's chosen successor in layout order (spec §3
/// "Trace": "this property alone determines fall-through behavior").
pub fn assign_layout(lir: &mut LirCfg, order: &[BlockId]) {
    for pair in order.windows(2) {
        lir.block_mut(pair[0]).layout_next = Some(pair[1]);
    }
}

/// Normalize every block's terminator against the now-known layout (spec
/// §4.8). A one-successor terminator becomes a bare [`Terminator::Fallthrough`]
/// when its target is already next in layout, or stays an explicit
/// [`Terminator::Jump`] otherwise. A two-successor branch swaps its arms
/// (and flips `inverted`) when the *true* arm is next in layout, so that
/// the false arm — the emitter's implicit fall-through slot — always
/// lines up with layout whenever any arm does; when neither arm lines up,
/// the branch is left as is and the emitter is expected to fall through
/// to the false arm and patch in a jump to the true arm.
pub fn normalize_terminators(lir: &mut LirCfg, order: &[BlockId]) {
    let _t = crate::timing::start("terminator_normalization");
    for &b in order {
        let layout_next = lir.block(b).layout_next;
        let term = lir.block(b).terminator.clone();
        let new_term = match term {
            Terminator::Fallthrough(target) | Terminator::Jump(target) => {
                if Some(target) == layout_next {
                    Terminator::Fallthrough(target)
                } else {
                    Terminator::Jump(target)
                }
            }
            Terminator::Branch { true_target, false_target, inverted } => {
                if Some(true_target) == layout_next {
                    Terminator::Branch {
                        true_target: false_target,
                        false_target: true_target,
                        inverted: !inverted,
                    }
                } else {
                    Terminator::Branch { true_target, false_target, inverted }
                }
            }
            other @ (Terminator::Switch { .. } | Terminator::Return) => other,
        };
        lir.block_mut(b).terminator = new_term;
    }
}

/// Whether a branch's target fits a short displacement encoding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BranchReach {
    Short,
    Long,
}

/// Classify every block's outgoing branch(es) once the binary emitter's
/// first layout pass has produced byte offsets (spec §4.9: "a post-pass
/// classifies each branch as short/long by measuring displacement in
/// emitted bytes"). `short_range` is the maximum absolute displacement,
/// in bytes, the target's short encoding can reach; a block with
/// multiple targets (a branch or switch) is `Long` if any one of them
/// would be.
pub fn classify_branches(
    lir: &LirCfg,
    order: &[BlockId],
    block_start: &FxHashMap<BlockId, u32>,
    block_end: &FxHashMap<BlockId, u32>,
    short_range: i64,
) -> FxHashMap<BlockId, BranchReach> {
    let _t = crate::timing::start("branch_classification");
    let mut result = FxHashMap::default();
    for &b in order {
        let from = *block_end.get(&b).unwrap_or(&0) as i64;
        let targets: Vec<BlockId> = match &lir.block(b).terminator {
            Terminator::Jump(t) => vec![*t],
            Terminator::Branch { true_target, false_target, .. } => vec![*true_target, *false_target],
            Terminator::Switch { cases, default } => cases.iter().map(|(_, t)| *t).chain(std::iter::once(*default)).collect(),
            Terminator::Fallthrough(_) | Terminator::Return => Vec::new(),
        };
        if targets.is_empty() {
            continue;
        }
        let any_long = targets.iter().any(|t| {
            let to = *block_start.get(t).unwrap_or(&0) as i64;
            (to - from).abs() > short_range
        });
        result.insert(b, if any_long { BranchReach::Long } else { BranchReach::Short });
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Cfg;

    fn chain_of_three() -> Cfg {
        let mut mir = Cfg::new("f");
        let a = mir.add_node();
        let b = mir.add_node();
        mir.add_edge(mir.entry(), a);
        mir.add_edge(a, b);
        mir.add_edge(b, mir.exit());
        mir
    }

    #[test]
    fn straight_line_trace_matches_program_order() {
        let mir = chain_of_three();
        let lir = LirCfg::mirror_from(&mir);
        let order = build_trace(&lir);
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], mir.entry());
        assert_eq!(order[3], mir.exit());
    }

    #[test]
    fn jump_to_layout_next_becomes_fallthrough() {
        let mir = chain_of_three();
        let mut lir = LirCfg::mirror_from(&mir);
        let a = mir.succ_iter(mir.entry()).next().unwrap();
        let b = mir.succ_iter(a).next().unwrap();
        lir.block_mut(mir.entry()).terminator = Terminator::Jump(a);
        lir.block_mut(a).terminator = Terminator::Jump(b);

        let order = build_trace(&lir);
        assign_layout(&mut lir, &order);
        normalize_terminators(&mut lir, &order);

        assert!(matches!(lir.block(mir.entry()).terminator, Terminator::Fallthrough(t) if t == a));
    }

    #[test]
    fn branch_with_true_arm_next_gets_inverted() {
        let mut mir = Cfg::new("f");
        let t = mir.add_node();
        let f = mir.add_node();
        mir.add_edge(mir.entry(), t);
        mir.add_edge(mir.entry(), f);
        mir.add_edge(t, mir.exit());
        mir.add_edge(f, mir.exit());
        let mut lir = LirCfg::mirror_from(&mir);
        lir.block_mut(mir.entry()).terminator = Terminator::Branch { true_target: t, false_target: f, inverted: false };

        // Force a layout where `t` lands immediately after the entry by
        // making `f`'s preferred successor something else unplaced last.
        let order = vec![mir.entry(), t, f, mir.exit()];
        assign_layout(&mut lir, &order);
        normalize_terminators(&mut lir, &order);

        match lir.block(mir.entry()).terminator {
            Terminator::Branch { true_target, false_target, inverted } => {
                assert_eq!(true_target, f);
                assert_eq!(false_target, t);
                assert!(inverted);
            }
            _ => panic!("expected a branch terminator"),
        }
    }
}
