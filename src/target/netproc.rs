//! Network-processor native target (spec §4.10).
//!
//! Reuses the shared rule table and the coprocessor-access splitter
//! ([`crate::lir::select::select_instructions`] already runs this for
//! every native target); what's specific to this target is its encoder,
//! which tags every encoded instruction with a one-byte bundle marker so
//! a downstream packer can merge independent instructions into VLIW
//! bundles. Real dependency-aware bundle packing is not implemented here
//! (TODO: port `original_source`'s scheduler once a target actually
//! needs bundle-level parallelism exercised).

use crate::emit::binary::{FixupSite, InstEncoder};
use crate::ir::Cfg;
use crate::lir::{LirInst, LirOperand, Terminator};
use crate::reg::{Register, RegSpace, RegisterManager};
use crate::regalloc::spill::{DefaultSpiller, Spiller};
use crate::target::common::build_rules;
use crate::target::NativeTarget;
use crate::lir::burg::BurgTable;
use rustc_hash::FxHashMap;

const GP_REGISTERS: usize = 16;

pub struct NetprocTarget {
    table: BurgTable,
    palette: Vec<Register>,
    encoder: NetprocEncoder,
    spiller: DefaultSpiller,
}

impl NetprocTarget {
    pub fn new() -> Self {
        let mut namer = RegisterManager::new();
        let palette = (0..GP_REGISTERS).map(|_| namer.new_register(RegSpace::Machine)).collect();
        NetprocTarget { table: build_rules(), palette, encoder: NetprocEncoder, spiller: DefaultSpiller }
    }
}

impl Default for NetprocTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeTarget for NetprocTarget {
    fn burg_table(&self) -> &BurgTable {
        &self.table
    }

    fn encoder(&self) -> &dyn InstEncoder {
        &self.encoder
    }

    fn allocatable_registers(&self) -> &[Register] {
        &self.palette
    }

    fn precolored(&self, _cfg: &Cfg) -> FxHashMap<Register, Register> {
        FxHashMap::default()
    }

    fn spiller(&self) -> &dyn Spiller {
        &self.spiller
    }

    fn short_branch_range(&self) -> i64 {
        // The coprocessor's branch unit only carries an 8-bit bundle-
        // relative displacement.
        63
    }
}

const BUNDLE_MARKER: u8 = 0xFA;

struct NetprocEncoder;

fn reg_code(r: Register) -> u8 {
    r.name() as u8
}

fn encode_operand(op: LirOperand, out: &mut Vec<u8>) {
    match op {
        LirOperand::Reg(r) => out.push(reg_code(r)),
        LirOperand::Imm(v) => out.extend_from_slice(&(v as i32).to_le_bytes()),
        LirOperand::Label(_) => unreachable!("labels are resolved by encode_terminator, not encode_inst"),
        LirOperand::Mem(m) => {
            out.push(reg_code(m.base));
            out.push(m.index.map(reg_code).unwrap_or(0xFF));
            out.extend_from_slice(&m.disp.to_le_bytes());
        }
    }
}

fn opcode_byte(mnemonic: &str) -> u8 {
    match mnemonic {
        "mov" => 0x01,
        "ldbase" => 0x02,
        "add" => 0x10,
        "sub" => 0x11,
        "mul" => 0x12,
        "div" => 0x13,
        "and" => 0x14,
        "or" => 0x15,
        "xor" => 0x16,
        "shl" => 0x17,
        "shr" => 0x18,
        "neg" => 0x19,
        "not" => 0x1A,
        "seteq" | "setne" | "setlt" | "setle" | "setgt" | "setge" => 0x20,
        "ldb" | "ldh" | "ldw" => 0x30,
        "stb" | "sth" | "stw" => 0x31,
        "test" => 0x40,
        "call" => 0x50,
        "send" => 0x51,
        "lookup" => 0x52,
        "bchk" => 0x53,
        _ => 0x00,
    }
}

impl InstEncoder for NetprocEncoder {
    fn prologue(&self, out: &mut Vec<u8>) {
        out.push(BUNDLE_MARKER);
    }

    fn epilogue(&self, _out: &mut Vec<u8>) {}

    fn encode_inst(&self, inst: &LirInst, out: &mut Vec<u8>) {
        out.push(BUNDLE_MARKER);
        out.push(opcode_byte(inst.mnemonic));
        if let Some(dst) = inst.dst {
            encode_operand(dst, out);
        }
        for &src in &inst.srcs {
            encode_operand(src, out);
        }
    }

    fn encode_terminator(&self, term: &Terminator, out: &mut Vec<u8>, fixups: &mut Vec<FixupSite>) {
        match term {
            Terminator::Fallthrough(_) => {}
            Terminator::Jump(target) => {
                out.push(BUNDLE_MARKER);
                out.push(0x60);
                let offset = out.len() as u32;
                out.extend_from_slice(&0i32.to_le_bytes());
                fixups.push(FixupSite { offset, target: *target, pc_relative_from: out.len() as u32 });
            }
            Terminator::Branch { true_target, false_target, inverted } => {
                let (taken, fallthrough) = if *inverted { (false_target, true_target) } else { (true_target, false_target) };
                out.push(BUNDLE_MARKER);
                out.push(0x61);
                let offset = out.len() as u32;
                out.extend_from_slice(&0i32.to_le_bytes());
                fixups.push(FixupSite { offset, target: *taken, pc_relative_from: out.len() as u32 });
                out.push(BUNDLE_MARKER);
                out.push(0x60);
                let offset = out.len() as u32;
                out.extend_from_slice(&0i32.to_le_bytes());
                fixups.push(FixupSite { offset, target: *fallthrough, pc_relative_from: out.len() as u32 });
            }
            Terminator::Switch { cases, default } => {
                for (_value, target) in cases {
                    out.push(BUNDLE_MARKER);
                    out.push(0x61);
                    let offset = out.len() as u32;
                    out.extend_from_slice(&0i32.to_le_bytes());
                    fixups.push(FixupSite { offset, target: *target, pc_relative_from: out.len() as u32 });
                }
                out.push(BUNDLE_MARKER);
                out.push(0x60);
                let offset = out.len() as u32;
                out.extend_from_slice(&0i32.to_le_bytes());
                fixups.push(FixupSite { offset, target: *default, pc_relative_from: out.len() as u32 });
            }
            Terminator::Return => {
                out.push(BUNDLE_MARKER);
                out.push(0x70);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_bundle_starts_with_the_marker_byte() {
        let encoder = NetprocEncoder;
        let mut out = Vec::new();
        encoder.encode_inst(&LirInst::new("add"), &mut out);
        assert_eq!(out[0], BUNDLE_MARKER);
    }

    #[test]
    fn palette_has_no_duplicate_registers() {
        let target = NetprocTarget::new();
        let mut seen = std::collections::HashSet::new();
        assert!(target.allocatable_registers().iter().all(|r| seen.insert(*r)));
    }
}
