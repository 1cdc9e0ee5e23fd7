//! Binary code emission (spec §4.9).
//!
//! Two passes over the trace: the first encodes every instruction and
//! terminator while recording a (byte offset, target block) fixup site
//! for every forward reference; once every block's start address is
//! known, the second pass patches the 32-bit displacement fields in
//! place.

use crate::emit::buffer::CodeBuffer;
use crate::error::{CodegenError, CodegenResult};
use crate::ir::entities::BlockId;
use crate::lir::{LirCfg, LirInst, Terminator};
use rustc_hash::FxHashMap;

/// A displacement field left blank during the first encoding pass.
pub struct FixupSite {
    /// Byte offset of the 4-byte little-endian displacement field.
    pub offset: u32,
    /// Block whose start address the displacement should resolve to.
    pub target: BlockId,
    /// Byte offset the displacement is relative to (typically the end of
    /// the branch instruction, for PC-relative encodings).
    pub pc_relative_from: u32,
}

/// Per-target encoding of [`LirInst`]s and [`Terminator`]s into bytes,
/// implemented once per backend (spec §4.10: "encoding tables").
pub trait InstEncoder {
    fn prologue(&self, out: &mut Vec<u8>);
    fn epilogue(&self, out: &mut Vec<u8>);
    fn encode_inst(&self, inst: &LirInst, out: &mut Vec<u8>);
    fn encode_terminator(&self, term: &Terminator, out: &mut Vec<u8>, fixups: &mut Vec<FixupSite>);
}

/// Encode `lir` in `order` into a fresh executable buffer.
pub fn emit_binary(lir: &LirCfg, order: &[BlockId], encoder: &dyn InstEncoder) -> CodegenResult<CodeBuffer> {
    let _t = crate::timing::start("binary_emission");
    let mut bytes = Vec::new();
    let mut fixups = Vec::new();
    let mut block_start: FxHashMap<BlockId, u32> = FxHashMap::default();

    encoder.prologue(&mut bytes);
    for &b in order {
        block_start.insert(b, bytes.len() as u32);
        for inst in &lir.block(b).insts {
            encoder.encode_inst(inst, &mut bytes);
        }
        encoder.encode_terminator(&lir.block(b).terminator, &mut bytes, &mut fixups);
    }
    encoder.epilogue(&mut bytes);

    let mut buf = CodeBuffer::new(bytes.len())?;
    buf.write(&bytes);

    for site in &fixups {
        let target_off = *block_start
            .get(&site.target)
            .ok_or_else(|| CodegenError::Internal(format!("fixup target {:?} has no recorded block start", site.target)))?;
        let disp = target_off as i64 - site.pc_relative_from as i64;
        let disp32 = i32::try_from(disp).map_err(|_| CodegenError::Internal("branch displacement exceeds 32 bits".into()))?;
        buf.patch(site.offset as usize, &disp32.to_le_bytes());
    }

    buf.make_executable();
    Ok(buf)
}
