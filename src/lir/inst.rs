//! LIR instructions (spec §3 "LIR instruction").
//!
//! One target-agnostic instruction shape is shared by every backend
//! (REDESIGN FLAGS, spec §9: a single `LirInst` value type plus
//! target-supplied mnemonics/encodings, instead of one Rust type per
//! target's instruction set) — a target's BURG rule table only ever picks
//! a mnemonic string and an addressing mode out of what is defined here.

use crate::ir::entities::{BlockId, HandlerTag};
use crate::reg::Register;
use smallvec::SmallVec;

/// A memory operand's addressing mode: `[base + index*scale + disp]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemOperand {
    pub base: Register,
    pub index: Option<Register>,
    pub disp: i32,
    pub scale: u8,
}

/// One LIR operand (spec §3: "register, immediate, label, or memory").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LirOperand {
    Reg(Register),
    Imm(i64),
    Label(BlockId),
    Mem(MemOperand),
}

impl LirOperand {
    fn reg(&self) -> Option<Register> {
        match self {
            LirOperand::Reg(r) => Some(*r),
            _ => None,
        }
    }
}

/// A single LIR instruction: one per selected MIR node (spec §3: "Per-
/// target class implementing a common interface").
#[derive(Clone, Debug)]
pub struct LirInst {
    /// Target-chosen mnemonic, e.g. `"movl"`, `"addq"`, used verbatim by
    /// the assembly emitter and looked up by the binary emitter's
    /// per-target encoding table.
    pub mnemonic: &'static str,
    pub dst: Option<LirOperand>,
    pub srcs: SmallVec<[LirOperand; 2]>,
    /// True for a pure register-to-register move, enabling copy folding
    /// and coalescing (spec §3 `is_copy`/`get_from`/`get_to`).
    pub is_copy: bool,
    /// True if this instruction has an effect beyond its `dst` (store,
    /// call, branch) and so must not be treated as dead even if `dst` is
    /// unused.
    pub side_effect: bool,
    /// True for a coprocessor dispatch call; some targets require these
    /// to be the last instruction of a block (spec §4.6), which the
    /// post-selection splitter enforces.
    pub is_coprocessor_call: bool,
    pub handler_tag: Option<HandlerTag>,
}

impl LirInst {
    pub fn new(mnemonic: &'static str) -> Self {
        LirInst {
            mnemonic,
            dst: None,
            srcs: SmallVec::new(),
            is_copy: false,
            side_effect: false,
            is_coprocessor_call: false,
            handler_tag: None,
        }
    }

    pub fn with_coprocessor_call(mut self) -> Self {
        self.is_coprocessor_call = true;
        self.side_effect = true;
        self
    }

    pub fn with_dst(mut self, dst: LirOperand) -> Self {
        self.dst = Some(dst);
        self
    }

    pub fn with_src(mut self, src: LirOperand) -> Self {
        self.srcs.push(src);
        self
    }

    pub fn copy(mnemonic: &'static str, dst: Register, src: Register) -> Self {
        LirInst {
            mnemonic,
            dst: Some(LirOperand::Reg(dst)),
            srcs: SmallVec::from_slice(&[LirOperand::Reg(src)]),
            is_copy: true,
            side_effect: false,
            is_coprocessor_call: false,
            handler_tag: None,
        }
    }

    pub fn with_side_effect(mut self) -> Self {
        self.side_effect = true;
        self
    }

    pub fn with_handler_tag(mut self, tag: HandlerTag) -> Self {
        self.handler_tag = Some(tag);
        self
    }

    /// Registers this instruction defines.
    pub fn defs(&self) -> SmallVec<[Register; 1]> {
        self.dst.and_then(|d| d.reg()).into_iter().collect()
    }

    /// Registers this instruction reads, including base/index registers
    /// of any memory operand (on either side) and, for a store-shaped
    /// instruction (`dst` is `Mem`), the value operand plus `dst`'s own
    /// base/index.
    pub fn uses(&self) -> SmallVec<[Register; 4]> {
        let mut uses = SmallVec::new();
        for src in &self.srcs {
            collect_operand_uses(src, &mut uses);
        }
        if let Some(LirOperand::Mem(m)) = &self.dst {
            uses.push(m.base);
            if let Some(i) = m.index {
                uses.push(i);
            }
        }
        uses
    }

    pub fn get_from(&self) -> Option<Register> {
        self.is_copy.then(|| self.srcs.first().and_then(|s| s.reg())).flatten()
    }

    pub fn get_to(&self) -> Option<Register> {
        self.is_copy.then(|| self.dst.and_then(|d| d.reg())).flatten()
    }

    /// Rewrite every occurrence of `old` to `new` (spill slot assignment,
    /// register-allocation color commit, coalescing).
    pub fn rewrite_reg(&mut self, old: Register, new: Register) {
        if let Some(dst) = &mut self.dst {
            rewrite_operand(dst, old, new);
        }
        for src in &mut self.srcs {
            rewrite_operand(src, old, new);
        }
    }
}

fn collect_operand_uses(op: &LirOperand, uses: &mut SmallVec<[Register; 4]>) {
    match op {
        LirOperand::Reg(r) => uses.push(*r),
        LirOperand::Mem(m) => {
            uses.push(m.base);
            if let Some(i) = m.index {
                uses.push(i);
            }
        }
        LirOperand::Imm(_) | LirOperand::Label(_) => {}
    }
}

fn rewrite_operand(op: &mut LirOperand, old: Register, new: Register) {
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
