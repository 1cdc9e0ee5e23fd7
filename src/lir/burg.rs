//! BURG-style tree-pattern instruction selector (spec §4.6).
//!
//! A [`BurgTable`] is a set of [`Rule`]s, each covering a MIR opcode shape
//! (leaf, unary, or binary) and reducing it to a named non-terminal at a
//! cost. [`BurgTable::select`] runs the two spec-mandated passes:
//! **label** (bottom-up dynamic program computing, at every node, the
//! cheapest rule for every reachable non-terminal) then **reduce**
//! (top-down, starting at the goal non-terminal, recursively reducing
//! kids before calling the chosen rule's `emit`). Targets build one
//! `BurgTable` each (`crate::target::x86_32`, etc.) and hand it to
//! [`crate::lir::select::select_instructions`].

use crate::error::{CodegenError, CodegenResult};
use crate::ir::{Cfg, MirNode, NodeId};
use crate::lir::inst::LirInst;
use crate::reg::{Register, RegSpace, RegisterManager};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Grammar non-terminal name, e.g. `"reg"`, `"addr"`, `"stmt"`.
pub type Nonterm = &'static str;

/// How many MIR kids a rule's pattern expects.
pub enum Arity {
    Leaf,
    Unary(Nonterm),
    Binary(Nonterm, Nonterm),
}

impl Arity {
    fn expected_kids(&self) -> usize {
        match self {
            Arity::Leaf => 0,
            Arity::Unary(_) => 1,
            Arity::Binary(..) => 2,
        }
    }
}

/// Context threaded through a rule's `emit` function: the MIR being
/// selected from, the LIR instructions accumulated for the current
/// block, and the register manager for allocating fresh virtual LIR
/// registers (spec §4.6: "may create fresh virtual LIR registers").
pub struct Selector<'a> {
    pub cfg: &'a Cfg,
    pub out: &'a mut Vec<LirInst>,
    pub regs: &'a mut RegisterManager,
}

impl<'a> Selector<'a> {
    pub fn emit(&mut self, inst: LirInst) {
        self.out.push(inst);
    }

    pub fn fresh(&mut self) -> Register {
        self.regs.new_register(RegSpace::Virtual)
    }
}

pub type EmitFn = fn(&mut Selector, NodeId, &[Register]) -> CodegenResult<Option<Register>>;
pub type MatchFn = fn(&MirNode) -> bool;

pub struct Rule {
    pub name: &'static str,
    pub nonterm: Nonterm,
    pub arity: Arity,
    pub matches: MatchFn,
    pub cost: u32,
    pub emit: EmitFn,
}

/// Per-node labelling state: for each non-terminal reached, the winning
/// rule's index and total subtree cost.
type NodeStates = FxHashMap<Nonterm, (usize, u32)>;

pub struct BurgTable {
    rules: Vec<Rule>,
}

impl BurgTable {
    pub fn new() -> Self {
        BurgTable { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Select instructions for one MIR statement root, appending to
    /// `sel.out`. `goal` is almost always `"stmt"`.
    pub fn select(&self, sel: &mut Selector, root: NodeId, goal: Nonterm) -> CodegenResult<()> {
        let mut memo: FxHashMap<NodeId, NodeStates> = FxHashMap::default();
        self.label(sel.cfg, root, &mut memo)?;
        self.reduce(sel, &memo, root, goal)?;
        Ok(())
    }

    fn label(&self, cfg: &Cfg, node: NodeId, memo: &mut FxHashMap<NodeId, NodeStates>) -> CodegenResult<()> {
        if memo.contains_key(&node) {
            return Ok(());
        }
        for kid in cfg.node(node).kids().collect::<Vec<_>>() {
            self.label(cfg, kid, memo)?;
        }

        let n = cfg.node(node);
        let actual_kids = n.kids().count();
        let mut states: NodeStates = FxHashMap::default();
        for (rule_idx, rule) in self.rules.iter().enumerate() {
            if !(rule.matches)(n) {
                continue;
            }
            let expected = rule.arity.expected_kids();
            if expected != actual_kids {
                return Err(CodegenError::Arity {
                    rule: rule.name.to_string(),
                    expected,
                    actual: actual_kids,
                });
            }
            let kid_cost = match &rule.arity {
                Arity::Leaf => Some(0u32),
                Arity::Unary(k0) => n.kid(0).and_then(|id| memo[&id].get(k0)).map(|&(_, c)| c),
                Arity::Binary(k0, k1) => {
                    let c0 = n.kid(0).and_then(|id| memo[&id].get(k0)).map(|&(_, c)| c);
                    let c1 = n.kid(1).and_then(|id| memo[&id].get(k1)).map(|&(_, c)| c);
                    c0.zip(c1).map(|(a, b)| a + b)
                }
            };
            let Some(kid_cost) = kid_cost else { continue };
            let total = kid_cost + rule.cost;
            let better = states.get(rule.nonterm).map(|&(_, c)| total < c).unwrap_or(true);
            if better {
                states.insert(rule.nonterm, (rule_idx, total));
            }
        }
        memo.insert(node, states);
        Ok(())
    }

    fn reduce(
        &self,
        sel: &mut Selector,
        memo: &FxHashMap<NodeId, NodeStates>,
        node: NodeId,
        goal: Nonterm,
    ) -> CodegenResult<Option<Register>> {
        let states = memo.get(&node).ok_or_else(|| CodegenError::NtermNotFound(goal.to_string()))?;
        let &(rule_idx, _) = states.get(goal).ok_or_else(|| {
            if states.is_empty() {
                CodegenError::RuleNotFound {
                    opcode: format!("{:?}", sel.cfg.node(node).opcode),
                    nonterm: goal.to_string(),
                }
            } else {
                CodegenError::NtermNotFound(goal.to_string())
            }
        })?;
        let rule = &self.rules[rule_idx];
        let kid_regs: SmallVec<[Register; 2]> = match &rule.arity {
            Arity::Leaf => SmallVec::new(),
            Arity::Unary(k0) => {
                let id = sel.cfg.node(node).kid(0).expect("arity already checked");
                let r = self.reduce(sel, memo, id, k0)?;
                r.into_iter().collect()
            }
            Arity::Binary(k0, k1) => {
                let id0 = sel.cfg.node(node).kid(0).expect("arity already checked");
                let id1 = sel.cfg.node(node).kid(1).expect("arity already checked");
                let r0 = self.reduce(sel, memo, id0, k0)?;
                let r1 = self.reduce(sel, memo, id1, k1)?;
                r0.into_iter().chain(r1).collect()
            }
        };
        (rule.emit)(sel, node, &kid_regs)
    }
}

impl Default for BurgTable {
    fn default() -> Self {
        Self::new()
    }
}
