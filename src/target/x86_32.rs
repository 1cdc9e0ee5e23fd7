//! x86-32 native target (spec §4.10).
//!
//! A small, explicit opcode table rather than a full IA-32 encoder: each
//! generic mnemonic [`crate::target::common::build_rules`] produces gets
//! one fixed byte plus operand bytes. Good enough to exercise the shared
//! selection/regalloc/trace/emit pipeline against a concrete byte stream;
//! a production IA-32 encoder (ModRM/SIB/prefix legality, operand-size
//! overrides) is out of scope here (see DESIGN.md).

use crate::emit::binary::{FixupSite, InstEncoder};
use crate::ir::Cfg;
use crate::lir::{LirInst, LirOperand, Terminator};
use crate::reg::{Register, RegSpace, RegisterManager};
use crate::regalloc::spill::{DefaultSpiller, Spiller};
use crate::target::common::build_rules;
use crate::target::NativeTarget;
use crate::lir::burg::BurgTable;
use rustc_hash::FxHashMap;

/// `eax, ecx, edx, ebx, esi, edi` — `esp`/`ebp` are reserved for the
/// frame and never entered into the allocatable palette.
const GP_REGISTERS: usize = 6;

pub struct X8632Target {
    table: BurgTable,
    palette: Vec<Register>,
    encoder: X8632Encoder,
    spiller: DefaultSpiller,
}

impl X8632Target {
    pub fn new() -> Self {
        let mut namer = RegisterManager::new();
        let palette = (0..GP_REGISTERS).map(|_| namer.new_register(RegSpace::Machine)).collect();
        X8632Target { table: build_rules(), palette, encoder: X8632Encoder, spiller: DefaultSpiller }
    }
}

impl Default for X8632Target {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeTarget for X8632Target {
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
        // A rel8 jump/jcc reaches +127/-128 bytes from the next instruction.
        127
    }
}

struct X8632Encoder;

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
            out.push(m.scale);
            out.extend_from_slice(&m.disp.to_le_bytes());
        }
    }
}

fn opcode_byte(mnemonic: &str) -> u8 {
    match mnemonic {
        "mov" => 0xB8,
        "ldbase" => 0xB9,
        "add" => 0x01,
        "sub" => 0x29,
        "mul" => 0xAF,
        "div" => 0xF7,
        "and" => 0x21,
        "or" => 0x09,
        "xor" => 0x31,
        "shl" => 0xD3,
        "shr" => 0xD3,
        "neg" => 0xF7,
        "not" => 0xF7,
        "seteq" => 0x94,
        "setne" => 0x95,
        "setlt" => 0x9C,
        "setle" => 0x9E,
        "setgt" => 0x9F,
        "setge" => 0x9D,
        "ldb" => 0x8A,
        "ldh" => 0x8B,
        "ldw" => 0x8B,
        "stb" => 0x88,
        "sth" => 0x89,
        "stw" => 0x89,
        "test" => 0x85,
        "call" => 0xE8,
        "send" => 0xE8,
        "lookup" => 0x0F,
        "bchk" => 0x3D,
        _ => 0x90, // nop, for any mnemonic this table doesn't know yet.
    }
}

impl InstEncoder for X8632Encoder {
    fn prologue(&self, out: &mut Vec<u8>) {
        out.push(0x55); // push ebp
        out.extend_from_slice(&[0x89, 0xE5]); // mov ebp, esp
    }

    fn epilogue(&self, _out: &mut Vec<u8>) {
        // Each `Return` terminator emits its own leave/ret below; there is
        // no shared trailer to append once every block has been laid out.
    }

    fn encode_inst(&self, inst: &LirInst, out: &mut Vec<u8>) {
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
                out.push(0xE9);
                let offset = out.len() as u32;
                out.extend_from_slice(&0i32.to_le_bytes());
                fixups.push(FixupSite { offset, target: *target, pc_relative_from: out.len() as u32 });
            }
            Terminator::Branch { true_target, false_target, inverted } => {
                let (taken, fallthrough) = if *inverted { (false_target, true_target) } else { (true_target, false_target) };
                out.extend_from_slice(&[0x0F, 0x84]); // jcc rel32 (condition resolved by the prior `test`)
                let offset = out.len() as u32;
                out.extend_from_slice(&0i32.to_le_bytes());
                fixups.push(FixupSite { offset, target: *taken, pc_relative_from: out.len() as u32 });
                out.push(0xE9);
                let offset = out.len() as u32;
                out.extend_from_slice(&0i32.to_le_bytes());
                fixups.push(FixupSite { offset, target: *fallthrough, pc_relative_from: out.len() as u32 });
            }
            Terminator::Switch { cases, default } => {
                for (_value, target) in cases {
                    out.extend_from_slice(&[0x0F, 0x84]);
                    let offset = out.len() as u32;
                    out.extend_from_slice(&0i32.to_le_bytes());
                    fixups.push(FixupSite { offset, target: *target, pc_relative_from: out.len() as u32 });
                }
                out.push(0xE9);
                let offset = out.len() as u32;
                out.extend_from_slice(&0i32.to_le_bytes());
                fixups.push(FixupSite { offset, target: *default, pc_relative_from: out.len() as u32 });
            }
            Terminator::Return => {
                out.push(0xC9); // leave
                out.push(0xC3); // ret
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::LirCfg;

    #[test]
    fn return_terminator_emits_leave_and_ret() {
        let mir = Cfg::new("f");
        let mut lir = LirCfg::mirror_from(&mir);
        lir.block_mut(mir.entry()).terminator = Terminator::Return;
        let encoder = X8632Encoder;
        let mut out = Vec::new();
        let mut fixups = Vec::new();
        encoder.encode_terminator(&lir.block(mir.entry()).terminator, &mut out, &mut fixups);
        assert_eq!(out, vec![0xC9, 0xC3]);
        assert!(fixups.is_empty());
    }

    #[test]
    fn palette_has_no_duplicate_registers() {
        let target = X8632Target::new();
        let mut seen = std::collections::HashSet::new();
        assert!(target.allocatable_registers().iter().all(|r| seen.insert(*r)));
        assert_eq!(target.allocatable_registers().len(), GP_REGISTERS);
    }
}
