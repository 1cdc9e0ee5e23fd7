//! Top-level compilation driver (spec §2 "Driver", §4.10, §6, §7).
//!
//! `compile_unit` is the crate's single public entry point: given an
//! application's PE graph and the run's [`TargetOptions`], it walks every
//! handler through the fixed pipeline (SSA construction, the scalar
//! optimizer, SSA destruction, memory canonicalization, and then either
//! the native LIR pipeline or direct C emission) and wires each compiled
//! handler's entry point into the runtime connection table its PE graph
//! describes (spec §6 "Runtime handler state"). One handler's failure is
//! caught and recorded, never aborting the rest of the unit (spec §7).

use crate::app::{CompiledHandler, Handler, HandlerKind, NetvmApp};
pub use crate::app::{ExchangeBuffer, HandlerFn, HandlerState};
use crate::emit::{emit_asm, emit_binary};
use crate::error::{CodegenError, CodegenResult, CompileReport, FunctionError};
use crate::graph::{split_critical_edges, Dominance};
use crate::memtranslate::canonicalize_memory;
use crate::opt::{default_passes, run_to_fixed_point};
use crate::ssa::{construct_ssa, destruct_ssa, remove_spurious_phis};
use crate::target::{Backend, NativeTarget, SourceTarget, TargetOptions};
use crate::trace;
use std::io::Write;

/// Compile every handler of every PE in `app`, in PE-postorder so a PE's
/// peers are always compiled first (spec §4.10 "for each PE in
/// postorder"). Returns a report of installed and failed handlers;
/// failures never abort the rest of the unit (spec §7).
pub fn compile_unit(app: &mut NetvmApp, opts: &TargetOptions, backend: Backend<'_>) -> CompileReport {
    let _t = crate::timing::start("compile_unit");
    let mut report = CompileReport::default();

    if let Err(e) = opts.verify() {
        report.failures.push(FunctionError { function_name: "<options>".to_string(), handler: None, error: e, source_line: None });
        return report;
    }

    if opts.flags.inline {
        return compile_inline(app, opts, &backend);
    }

    for pe_idx in app.pe_postorder() {
        let pe_name = app.pes[pe_idx].name.clone();
        for handler in &mut app.pes[pe_idx].handlers {
            let qualified = handler.qualified_name(&pe_name);
            match compile_handler(handler, &qualified, opts, &backend) {
                Ok(compiled) => {
                    handler.compiled = Some(compiled);
                    report.installed.push(qualified);
                }
                Err(error) => {
                    let handler_tag = handler.cfg.handler_tag_of(handler.cfg.entry());
                    let source_line = handler.line_map.line_for(0);
                    report.failures.push(FunctionError { function_name: qualified, handler: handler_tag, error, source_line });
                }
            }
        }
    }

    report
}

/// Build one global CFG linking every handler in `app` (spec §4.10
/// "inline mode") and compile it as a single function.
fn compile_inline(app: &NetvmApp, opts: &TargetOptions, backend: &Backend<'_>) -> CompileReport {
    let mut report = CompileReport::default();
    let (cfg, regs) = crate::inline::build_inline_unit(app);
    let mut handler = Handler::new(HandlerKind::Init, cfg, regs);
    const NAME: &str = "inline_unit";
    match compile_handler(&mut handler, NAME, opts, backend) {
        Ok(compiled) => {
            report.inline = Some(compiled);
            report.installed.push(NAME.to_string());
        }
        Err(error) => report.failures.push(FunctionError { function_name: NAME.to_string(), handler: None, error, source_line: None }),
    }
    report
}

/// Run one handler through the fixed pipeline (spec §4.2–§4.9).
fn compile_handler(handler: &mut Handler, qualified_name: &str, opts: &TargetOptions, backend: &Backend<'_>) -> CodegenResult<CompiledHandler> {
    let cfg = &mut handler.cfg;
    let regs = &mut handler.regs;

    split_critical_edges(cfg);
    let dom = Dominance::compute(cfg);
    construct_ssa(cfg, &dom)?;

    if opts.optimizer_enabled() {
        let mut passes = default_passes(opts.bounds_check_enabled());
        if let Backend::Native(target) = backend {
            passes.extend(target.extra_passes());
        }
        run_to_fixed_point(cfg, &mut passes)?;
    }

    split_critical_edges(cfg);
    destruct_ssa(cfg);
    remove_spurious_phis(cfg);

    // Copy folding (spec §2 data flow: "out-of-SSA -> copy fold -> ...
    // -> LIR"): the copies destruct_ssa inserted for phi resolution are
    // folded back into their sources wherever that doesn't merge two
    // interfering lifetimes.
    crate::opt::copy_fold::fold_copies(cfg, |_, _| true);

    canonicalize_memory(cfg, regs);

    match backend {
        Backend::Native(target) => compile_native(handler, opts, *target),
        Backend::Source(target) => compile_source(handler, qualified_name, *target),
    }
}

fn compile_native(handler: &mut Handler, opts: &TargetOptions, target: &dyn NativeTarget) -> CodegenResult<CompiledHandler> {
    let cfg = &mut handler.cfg;
    let regs = &mut handler.regs;

    let mut lir = crate::lir::select_instructions(cfg, target.burg_table(), regs)?;

    let precolored = target.precolored(cfg);
    let compatible = |a, b| target.compatible(a, b);
    crate::regalloc::allocate(&mut lir, regs, &precolored, target.allocatable_registers(), &compatible, target.spiller())?;

    let order = trace::build_trace(&lir);
    trace::assign_layout(&mut lir, &order);
    trace::normalize_terminators(&mut lir, &order);

    if opts.flags.assembly {
        let mut text = Vec::new();
        emit_asm(&lir, &order, &mut text, None).map_err(|e| CodegenError::Internal(e.to_string()))?;
        return Ok(CompiledHandler::Assembly { text: String::from_utf8_lossy(&text).into_owned() });
    }

    let buf = emit_binary(&lir, &order, target.encoder())?;
    Ok(CompiledHandler::Native { entry: buf })
}

fn compile_source(handler: &Handler, qualified_name: &str, target: &dyn SourceTarget) -> CodegenResult<CompiledHandler> {
    let mut text = Vec::new();
    target.emit_function(&handler.cfg, qualified_name, &mut text as &mut dyn Write)?;
    Ok(CompiledHandler::Source { text: String::from_utf8_lossy(&text).into_owned() })
}
