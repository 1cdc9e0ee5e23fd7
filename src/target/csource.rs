//! C-source target (spec §4.10 "C-source target").
//!
//! Bypasses instruction selection, register allocation, and the trace
//! builder entirely: canonicalized MIR is walked directly and lowered to
//! a C function body, one `goto`-labelled block at a time. NetBee's own
//! C backend (`original_source/netbee`) works the same way — a
//! register-allocation-free "portable" target that a real C compiler
//! does the rest of the optimization and scheduling work for.

use crate::error::{CodegenError, CodegenResult};
use crate::ir::node::{MemSpace, Opcode, Operand, StmtExt};
use crate::ir::{Cfg, NodeId};
use crate::reg::Register;
use crate::target::SourceTarget;
use cranelift_entity::EntityRef;
use std::io::Write;

pub struct CSourceTarget;

impl SourceTarget for CSourceTarget {
    fn emit_function(&self, cfg: &Cfg, name: &str, out: &mut dyn Write) -> CodegenResult<()> {
        let _t = crate::timing::start("csource_emission");
        writeln!(out, "void {name}(struct nv_handler_state *state) {{").map_err(io_err)?;
        for b in cfg.blocks_iter() {
            writeln!(out, "lbl{}:", b.index()).map_err(io_err)?;
            for &stmt in cfg.block(b).stmts() {
                emit_stmt(cfg, stmt, out)?;
            }
        }
        writeln!(out, "}}").map_err(io_err)?;
        Ok(())
    }

    fn emit_precompile_header(&self, handler_names: &[String], out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "#ifndef NETBEE_JIT_PRECOMPILE_H")?;
        writeln!(out, "#define NETBEE_JIT_PRECOMPILE_H")?;
        writeln!(out)?;
        writeln!(out, "struct nv_handler_state;")?;
        for name in handler_names {
            writeln!(out, "void {name}(struct nv_handler_state *state);")?;
        }
        writeln!(out)?;
        writeln!(out, "#endif")
    }
}

fn io_err(e: std::io::Error) -> CodegenError {
    CodegenError::Internal(format!("C emission write failed: {e}"))
}

fn var_name(r: Register) -> String {
    format!("_{}{}_{}", r.space(), r.name(), r.version())
}

fn emit_stmt(cfg: &Cfg, id: NodeId, out: &mut dyn Write) -> CodegenResult<()> {
    let node = cfg.node(id);
    match &node.stmt {
        Some(StmtExt::Jump { target }) => {
            writeln!(out, "  goto lbl{};", target.index()).map_err(io_err)
        }
        Some(StmtExt::Branch { true_target, false_target }) => {
            let cond = emit_expr(cfg, node.kid(0).expect("branch carries a condition kid"))?;
            writeln!(out, "  if ({cond}) goto lbl{}; else goto lbl{};", true_target.index(), false_target.index()).map_err(io_err)
        }
        Some(StmtExt::Switch { cases, default }) => {
            let scrutinee = emit_expr(cfg, node.kid(0).expect("switch carries a scrutinee kid"))?;
            writeln!(out, "  switch ({scrutinee}) {{").map_err(io_err)?;
            for (value, target) in cases {
                writeln!(out, "    case {value}: goto lbl{};", target.index()).map_err(io_err)?;
            }
            writeln!(out, "    default: goto lbl{};", default.index()).map_err(io_err)?;
            writeln!(out, "  }}").map_err(io_err)
        }
        Some(StmtExt::Call { args }) => {
            let arg_list = args.iter().map(|a| var_name(*a)).collect::<Vec<_>>().join(", ");
            match node.opcode {
                Opcode::CoprocessorCall => {
                    let (coproc, op) = match node.operand {
                        Some(Operand::Coprocessor(c, o)) => (c, o),
                        _ => (0, 0),
                    };
                    match node.defined_reg() {
                        Some(dst) => writeln!(out, "  {} = nv_coproc_call({coproc}, {op}, {arg_list});", var_name(dst)).map_err(io_err),
                        None => writeln!(out, "  nv_coproc_call({coproc}, {op}, {arg_list});").map_err(io_err),
                    }
                }
                Opcode::SendPacket => writeln!(out, "  nv_send_packet({arg_list});").map_err(io_err),
                _ => writeln!(out, "  nv_call({arg_list});").map_err(io_err),
            }
        }
        Some(StmtExt::Store { offset }) => {
            let base = node.kid(0).expect("store carries an address kid");
            let value = node.kid(1).expect("store carries a value kid");
            let addr = emit_expr(cfg, base)?;
            let val = emit_expr(cfg, value)?;
            let off = offset.unwrap_or(0);
            writeln!(out, "  *({addr} + {off}) = {val};").map_err(io_err)
        }
        None => match node.opcode {
            Opcode::Return => writeln!(out, "  return;").map_err(io_err),
            Opcode::Nop => Ok(()),
            Opcode::BoundsCheck => {
                let guard = emit_expr(cfg, node.kid(0).expect("bounds check carries a guarded offset"))?;
                writeln!(out, "  nv_bounds_check({guard});").map_err(io_err)
            }
            Opcode::LookupTableOp(kind) => {
                let key = emit_expr(cfg, node.kid(0).expect("lookup table op carries a key"))?;
                let table = match node.operand {
                    Some(Operand::LookupTable(t)) => t.index(),
                    _ => 0,
                };
                match (kind, node.defined_reg()) {
                    (crate::ir::node::LookupTableOpKind::Lookup, Some(dst)) => {
                        writeln!(out, "  {} = nv_lut_lookup({table}, {key});", var_name(dst)).map_err(io_err)
                    }
                    _ => writeln!(out, "  nv_lut_op({table}, {key});").map_err(io_err),
                }
            }
            _ => {
                // A value-producing statement root: evaluate for its
                // side effects and, if it names a destination, bind it.
                let expr = emit_expr(cfg, id)?;
                match node.defined_reg() {
                    Some(dst) => writeln!(out, "  {} = {expr};", var_name(dst)).map_err(io_err),
                    None => writeln!(out, "  {expr};").map_err(io_err),
                }
            }
        },
    }
}

fn emit_expr(cfg: &Cfg, id: NodeId) -> CodegenResult<String> {
    let node = cfg.node(id);
    let bin = |op: &str| -> CodegenResult<String> {
        let a = emit_expr(cfg, node.kid(0).expect("binary op carries a left kid"))?;
        let b = emit_expr(cfg, node.kid(1).expect("binary op carries a right kid"))?;
        Ok(format!("({a} {op} {b})"))
    };
    let un = |op: &str| -> CodegenResult<String> {
        let a = emit_expr(cfg, node.kid(0).expect("unary op carries a kid"))?;
        Ok(format!("({op}{a})"))
    };
    match node.opcode {
        Opcode::Const => Ok(match node.operand {
            Some(Operand::Int(v)) => v.to_string(),
            _ => "0".to_string(),
        }),
        Opcode::VarRef => Ok(var_name(node.defined_reg().expect("VarRef always names the variable it reads"))),
        Opcode::Copy => emit_expr(cfg, node.kid(0).expect("copy carries its source kid")),
        Opcode::Add => bin("+"),
        Opcode::Sub => bin("-"),
        Opcode::Mul => bin("*"),
        Opcode::Div => bin("/"),
        Opcode::And => bin("&"),
        Opcode::Or => bin("|"),
        Opcode::Xor => bin("^"),
        Opcode::Shl => bin("<<"),
        Opcode::Shr => bin(">>"),
        Opcode::Neg => un("-"),
        Opcode::Not => un("~"),
        Opcode::Eq => bin("=="),
        Opcode::Ne => bin("!="),
        Opcode::Lt => bin("<"),
        Opcode::Le => bin("<="),
        Opcode::Gt => bin(">"),
        Opcode::Ge => bin(">="),
        Opcode::LoadBase(space) => Ok(format!("nv_base_{}", space_name(space))),
        Opcode::LoadIndexed(size) => {
            let addr = emit_expr(cfg, node.kid(0).expect("LoadIndexed carries an address kid"))?;
            Ok(format!("nv_mem_read{}({addr})", size.bytes() * 8))
        }
        _ => Err(CodegenError::Internal(format!("{:?} has no C expression form", node.opcode))),
    }
}

fn space_name(space: MemSpace) -> &'static str {
    match space {
        MemSpace::Packet => "packet",
        MemSpace::Info => "info",
        MemSpace::Data => "data",
        MemSpace::Shared => "shared",
        MemSpace::Exchange => "exchange",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{MirNode, Operand as Opr};

    #[test]
    fn straight_line_function_emits_labels_and_return() {
        let mut cfg = Cfg::new("f");
        let c = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Opr::Int(1)));
        cfg.block_mut(cfg.entry()).push_stmt(c);
        let ret = cfg.add_stmt(MirNode::new(Opcode::Return));
        cfg.block_mut(cfg.entry()).push_stmt(ret);

        let mut out = Vec::new();
        CSourceTarget.emit_function(&cfg, "pe_handler", &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("void pe_handler"));
        assert!(text.contains("lbl0:"));
        assert!(text.contains("return;"));
    }

    #[test]
    fn precompile_header_declares_every_handler() {
        let mut out = Vec::new();
        CSourceTarget.emit_precompile_header(&["a_init".to_string(), "a_push".to_string()], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("void a_init(struct nv_handler_state *state);"));
        assert!(text.contains("void a_push(struct nv_handler_state *state);"));
    }
}
