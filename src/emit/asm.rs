//! Text-assembly emission (spec §6 "Compiled assembly text").
//!
//! Format per instruction: an optional hexadecimal offset, a left-aligned
//! mnemonic field, comma-separated operands, and an optional `;` comment.
//! Block labels are `lbl<N>` matching the block's identifier, per spec.

use crate::ir::entities::BlockId;
use crate::lir::{LirCfg, LirInst, LirOperand, MemOperand, Terminator};
use cranelift_entity::EntityRef;
use std::io::{self, Write};

/// Emit `lir` in trace `order` as text assembly to `sink`. `offsets`, if
/// given, supplies the hexadecimal byte offset column (only meaningful
/// once a target encoder has sized every instruction; pure text-only
/// output omits the column).
pub fn emit_asm<W: Write>(lir: &LirCfg, order: &[BlockId], sink: &mut W, mut offsets: Option<&dyn Fn(BlockId, usize) -> u32>) -> io::Result<()> {
    let _t = crate::timing::start("asm_emission");
    for &b in order {
        writeln!(sink, "lbl{}:", b.index())?;
        for (i, inst) in lir.block(b).insts.iter().enumerate() {
            write_offset(sink, offsets.as_deref_mut().map(|f| f(b, i)))?;
            write_inst(sink, inst)?;
        }
        write_terminator(sink, &lir.block(b).terminator)?;
    }
    Ok(())
}

fn write_offset<W: Write>(sink: &mut W, offset: Option<u32>) -> io::Result<()> {
    match offset {
        Some(o) => write!(sink, "{:08x}  ", o),
        None => Ok(()),
    }
}

fn write_inst<W: Write>(sink: &mut W, inst: &LirInst) -> io::Result<()> {
    let operands: Vec<String> = inst.dst.into_iter().chain(inst.srcs.iter().copied()).map(format_operand).collect();
    writeln!(sink, "    {:<8}{}", inst.mnemonic, operands.join(", "))
}

fn write_terminator<W: Write>(sink: &mut W, term: &Terminator) -> io::Result<()> {
    match term {
        Terminator::Fallthrough(target) => writeln!(sink, "    ; falls through to lbl{}", target.index()),
        Terminator::Jump(t) => writeln!(sink, "    {:<8}lbl{}", "jmp", t.index()),
        Terminator::Branch { true_target, false_target, inverted } => {
            writeln!(sink, "    {:<8}lbl{}", "jcc", true_target.index())?;
            let comment = if *inverted { "; inverted, falls through" } else { "; falls through" };
            writeln!(sink, "    {:<8}lbl{}  {}", "jmp", false_target.index(), comment)
        }
        Terminator::Switch { cases, default } => {
            for (v, t) in cases {
                writeln!(sink, "    {:<8}{}, lbl{}", "case", v, t.index())?;
            }
            writeln!(sink, "    {:<8}lbl{}", "default", default.index())
        }
        Terminator::Return => writeln!(sink, "    {:<8}", "ret"),
    }
}

fn format_operand(op: LirOperand) -> String {
    match op {
        LirOperand::Reg(r) => r.to_string(),
        LirOperand::Imm(v) => v.to_string(),
        LirOperand::Label(b) => format!("lbl{}", b.index()),
        LirOperand::Mem(m) => format_mem(m),
    }
}

fn format_mem(m: MemOperand) -> String {
    let mut s = format!("[{}", m.base);
    if let Some(idx) = m.index {
        s.push_str(&format!("+{idx}*{}", m.scale));
    }
    match m.disp.cmp(&0) {
        std::cmp::Ordering::Greater => s.push_str(&format!("+{}", m.disp)),
        std::cmp::Ordering::Less => s.push_str(&m.disp.to_string()),
        std::cmp::Ordering::Equal => {}
    }
    s.push(']');
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Cfg;
    use crate::reg::{RegSpace, RegisterManager};

    #[test]
    fn emits_labels_and_left_aligned_mnemonics() {
        let mir = Cfg::new("f");
        let mut lir = LirCfg::mirror_from(&mir);
        let mut regs = RegisterManager::new();
        let v0 = regs.new_register(RegSpace::Virtual);
        lir.block_mut(mir.entry()).insts.push(LirInst::new("movl").with_dst(LirOperand::Reg(v0)).with_src(LirOperand::Imm(1)));
        lir.block_mut(mir.entry()).terminator = Terminator::Return;

        let mut out = Vec::new();
        emit_asm(&lir, &[mir.entry()], &mut out, None).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("lbl0:\n"));
        assert!(text.contains("movl"));
        assert!(text.trim_end().ends_with("ret"));
    }
}
