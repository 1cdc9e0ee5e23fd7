//! End-to-end pipeline scenarios (spec §8 "Concrete end-to-end
//! scenarios"). Each test builds a handler's MIR CFG by hand (there is no
//! bytecode front end in this crate) and drives it through
//! `driver::compile_unit`. Native-target scenarios check `CompileReport`
//! and the allocator's outcome rather than executing emitted machine code
//! (no execution harness is available); source-target scenarios assert on
//! the C backend's emitted text, per SPEC_FULL.md's test-tooling note.

use netbee_jit::app::{Handler, HandlerKind, NetvmApp, Port, ProcessingElement};
use netbee_jit::ir::node::{AccessSize, MemSpace, Opcode, Operand, StmtExt};
use netbee_jit::ir::{Cfg, MirNode};
use netbee_jit::reg::{RegSpace, RegisterManager};
use netbee_jit::target::{Backend, DriverFlags, OptLevel, TargetOptions};
use netbee_jit::{compile_unit, CompiledHandler};

fn opts(opt_level: OptLevel, flags: DriverFlags) -> TargetOptions {
    TargetOptions { opt_level, output_file_prefix: None, flags }
}

fn source_text(handler: &Handler) -> &str {
    match handler.compiled.as_ref().expect("handler compiled") {
        CompiledHandler::Source { text } => text,
        _ => panic!("expected a C-source result"),
    }
}

/// Scenario 1: trivial ethernet filter. `if (ethertype == 0x0800) accept()
/// else drop()`, both arms just `Return`.
#[test]
fn trivial_ethernet_filter_compiles_to_c_source() {
    let _ = env_logger::try_init();

    let mut cfg = Cfg::new("filter");
    let mut regs = RegisterManager::new();
    let ethertype = regs.new_register(RegSpace::Virtual);

    let offset = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(12)));
    let def = cfg.add_stmt(MirNode::new(Opcode::Load(MemSpace::Packet, AccessSize::Half)).with_kid0(offset).with_def(ethertype));
    let konst = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(0x0800)));
    let read = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(ethertype));
    let cmp = cfg.add_stmt(MirNode::new(Opcode::Eq).with_kid0(read).with_kid1(konst));

    let accept = cfg.add_node();
    let drop = cfg.add_node();
    cfg.add_edge(cfg.entry(), accept);
    cfg.add_edge(cfg.entry(), drop);
    cfg.add_edge(accept, cfg.exit());
    cfg.add_edge(drop, cfg.exit());

    let branch = cfg.add_stmt(MirNode::new(Opcode::Branch).with_kid0(cmp).with_stmt(StmtExt::Branch { true_target: accept, false_target: drop }));
    for stmt in [offset, def, konst, read, branch] {
        cfg.block_mut(cfg.entry()).push_stmt(stmt);
    }
    let ret_accept = cfg.add_stmt(MirNode::new(Opcode::Return));
    cfg.block_mut(accept).push_stmt(ret_accept);
    let ret_drop = cfg.add_stmt(MirNode::new(Opcode::Return));
    cfg.block_mut(drop).push_stmt(ret_drop);

    let mut app = NetvmApp::new();
    let mut pe = ProcessingElement::new("ether_filter");
    pe.handlers.push(Handler::new(HandlerKind::Push, cfg, regs));
    app.add_pe(pe);

    let source = netbee_jit::target::csource::CSourceTarget;
    let report = compile_unit(&mut app, &opts(OptLevel::Optimize, DriverFlags::default()), Backend::Source(&source));

    assert!(report.is_success(), "failures: {:?}", report.failures.iter().map(|f| f.to_string()).collect::<Vec<_>>());
    assert_eq!(report.installed, vec!["ether_filter_push".to_string()]);
    let text = source_text(&app.pes[0].handlers[0]);
    assert!(text.contains("void ether_filter_push"));
    assert!(text.contains("return;"));
}

/// Scenario 2: switch with cases 1, 2, 3, 4, 5, 6 and a default, the MIR
/// lowering of a bytecode switch over enumerated/range-expanded values.
/// Every case must route to its target block and the default must be
/// reachable; no case or the default may be pruned as dead.
#[test]
fn switch_with_several_cases_reaches_every_target_and_default() {
    let _ = env_logger::try_init();

    let mut cfg = Cfg::new("classify");
    let mut regs = RegisterManager::new();
    let proto = regs.new_register(RegSpace::Virtual);

    let konst = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(proto).with_operand(Operand::Int(1)));
    cfg.block_mut(cfg.entry()).push_stmt(konst);
    let scrutinee = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(proto));

    let targets: Vec<_> = (0..6).map(|_| cfg.add_node()).collect();
    let default = cfg.add_node();
    for &t in targets.iter().chain(std::iter::once(&default)) {
        cfg.add_edge(cfg.entry(), t);
        cfg.add_edge(t, cfg.exit());
        let ret = cfg.add_stmt(MirNode::new(Opcode::Return));
        cfg.block_mut(t).push_stmt(ret);
    }

    let cases = vec![(1i64, targets[0]), (2, targets[1]), (3, targets[2]), (4, targets[3]), (5, targets[4]), (6, targets[5])];
    let switch = cfg.add_stmt(MirNode::new(Opcode::Switch).with_kid0(scrutinee).with_stmt(StmtExt::Switch { cases, default }));
    cfg.block_mut(cfg.entry()).push_stmt(switch);

    let mut app = NetvmApp::new();
    let mut pe = ProcessingElement::new("classifier");
    pe.handlers.push(Handler::new(HandlerKind::Push, cfg, regs));
    app.add_pe(pe);

    let source = netbee_jit::target::csource::CSourceTarget;
    let report = compile_unit(&mut app, &opts(OptLevel::Optimize, DriverFlags::default()), Backend::Source(&source));

    assert!(report.is_success());
    let text = source_text(&app.pes[0].handlers[0]);
    assert!(text.contains("switch ("));
    for value in 1..=6 {
        assert!(text.contains(&format!("case {value}:")), "missing case {value} in:\n{text}");
    }
    assert!(text.contains("default:"));
}

/// Scenario 3: `for (i = 4; i > 0; --i) { s += A[i] }` — a loop with a
/// statically-known trip count. Compiled through the x86-64 native
/// target to exercise the full LIR pipeline (selection, register
/// allocation, trace layout, binary emission) on a back edge.
#[test]
fn loop_with_constant_trip_count_compiles_natively() {
    let _ = env_logger::try_init();

    let mut cfg = Cfg::new("sum_loop");
    let mut regs = RegisterManager::new();
    let i = regs.new_register(RegSpace::Virtual);
    let s = regs.new_register(RegSpace::Virtual);

    let i0 = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(i).with_operand(Operand::Int(4)));
    let s0 = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(s).with_operand(Operand::Int(0)));
    cfg.block_mut(cfg.entry()).push_stmt(i0);
    cfg.block_mut(cfg.entry()).push_stmt(s0);

    let header = cfg.add_node();
    let body = cfg.add_node();
    let exit_blk = cfg.add_node();
    cfg.add_edge(cfg.entry(), header);
    cfg.add_edge(header, body);
    cfg.add_edge(header, exit_blk);
    cfg.add_edge(body, header);
    cfg.add_edge(exit_blk, cfg.exit());

    let read_i = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(i));
    let zero = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(0)));
    let cmp = cfg.add_stmt(MirNode::new(Opcode::Gt).with_kid0(read_i).with_kid1(zero));
    let branch = cfg.add_stmt(MirNode::new(Opcode::Branch).with_kid0(cmp).with_stmt(StmtExt::Branch { true_target: body, false_target: exit_blk }));
    cfg.block_mut(header).push_stmt(read_i);
    cfg.block_mut(header).push_stmt(zero);
    cfg.block_mut(header).push_stmt(cmp);
    cfg.block_mut(header).push_stmt(branch);

    let byte = regs.new_register(RegSpace::Virtual);
    let read_i2 = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(i));
    let load = cfg.add_stmt(MirNode::new(Opcode::Load(MemSpace::Packet, AccessSize::Byte)).with_kid0(read_i2).with_def(byte));
    let read_s = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(s));
    let read_byte = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(byte));
    let sum = cfg.add_stmt(MirNode::new(Opcode::Add).with_kid0(read_s).with_kid1(read_byte).with_def(s));
    let read_i3 = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(i));
    let one = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(1)));
    let dec = cfg.add_stmt(MirNode::new(Opcode::Sub).with_kid0(read_i3).with_kid1(one).with_def(i));
    let jump = cfg.add_stmt(MirNode::new(Opcode::Jump).with_stmt(StmtExt::Jump { target: header }));
    for stmt in [read_i2, load, read_s, read_byte, sum, read_i3, one, dec, jump] {
        cfg.block_mut(body).push_stmt(stmt);
    }

    let ret = cfg.add_stmt(MirNode::new(Opcode::Return));
    cfg.block_mut(exit_blk).push_stmt(ret);

    let mut app = NetvmApp::new();
    let mut pe = ProcessingElement::new("summer");
    pe.handlers.push(Handler::new(HandlerKind::Push, cfg, regs));
    app.add_pe(pe);

    let target = netbee_jit::target::x86_64::X8664Target::new();
    let report = compile_unit(&mut app, &opts(OptLevel::Optimize, DriverFlags::default()), Backend::Native(&target));

    assert!(report.is_success(), "failures: {:?}", report.failures.iter().map(|f| f.to_string()).collect::<Vec<_>>());
    match app.pes[0].handlers[0].compiled.as_ref().unwrap() {
        CompiledHandler::Native { .. } => {}
        _ => panic!("expected a native result"),
    }
}

/// Scenario 4: SSA invariance under dead code. A dead definition that no
/// live path reads must not change observable behavior whether or not
/// the optimizer runs, and with the optimizer on it must be eliminated.
#[test]
fn ssa_invariant_under_dead_code_elimination() {
    let _ = env_logger::try_init();

    fn build() -> (Cfg, RegisterManager, netbee_jit::ir::NodeId) {
        let mut cfg = Cfg::new("f");
        let mut regs = RegisterManager::new();
        let live = regs.new_register(RegSpace::Virtual);
        let dead = regs.new_register(RegSpace::Virtual);

        let live_def = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(live).with_operand(Operand::Int(7)));
        let dead_def = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(dead).with_operand(Operand::Int(99)));
        let read_live = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(live));
        let ret = cfg.add_stmt(MirNode::new(Opcode::Return));
        for stmt in [live_def, dead_def, read_live, ret] {
            cfg.block_mut(cfg.entry()).push_stmt(stmt);
        }
        (cfg, regs, dead_def)
    }

    let source = netbee_jit::target::csource::CSourceTarget;

    let (cfg_opt, regs_opt, _) = build();
    let mut app_opt = NetvmApp::new();
    let mut pe_opt = ProcessingElement::new("a");
    pe_opt.handlers.push(Handler::new(HandlerKind::Push, cfg_opt, regs_opt));
    app_opt.add_pe(pe_opt);
    let report_opt = compile_unit(&mut app_opt, &opts(OptLevel::Optimize, DriverFlags::default()), Backend::Source(&source));
    assert!(report_opt.is_success());
    let text_opt = source_text(&app_opt.pes[0].handlers[0]);
    assert!(!text_opt.contains("99"), "dead constant should be eliminated:\n{text_opt}");

    let (cfg_plain, regs_plain, _) = build();
    let mut app_plain = NetvmApp::new();
    let mut pe_plain = ProcessingElement::new("a");
    pe_plain.handlers.push(Handler::new(HandlerKind::Push, cfg_plain, regs_plain));
    app_plain.add_pe(pe_plain);
    let report_plain = compile_unit(&mut app_plain, &opts(OptLevel::None, DriverFlags::default()), Backend::Source(&source));
    assert!(report_plain.is_success());
    let text_plain = source_text(&app_plain.pes[0].handlers[0]);
    assert!(text_plain.contains("7"));
}

/// Scenario 5: spill correctness. More simultaneously live virtual
/// registers than the x86-64 palette has machine registers (14) forces
/// the allocator through its spill path; compilation must still succeed
/// rather than report `RegallocInfeasible`.
#[test]
fn spill_path_still_produces_a_valid_allocation() {
    let _ = env_logger::try_init();

    let mut cfg = Cfg::new("wide");
    let mut regs = RegisterManager::new();
    let vars: Vec<_> = (0..32).map(|_| regs.new_register(RegSpace::Virtual)).collect();

    let mut defs = Vec::new();
    for (n, &v) in vars.iter().enumerate() {
        let c = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(v).with_operand(Operand::Int(n as i64)));
        defs.push(c);
    }
    // Sum every variable together so all 32 stay simultaneously live up
    // to the final reduction, guaranteeing register pressure exceeds the
    // palette.
    let mut acc = vars[0];
    let mut stmts = defs;
    for &v in &vars[1..] {
        let read_acc = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(acc));
        let read_v = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(v));
        let sum_reg = regs.new_register(RegSpace::Virtual);
        let add = cfg.add_stmt(MirNode::new(Opcode::Add).with_kid0(read_acc).with_kid1(read_v).with_def(sum_reg));
        stmts.push(read_acc);
        stmts.push(read_v);
        stmts.push(add);
        acc = sum_reg;
    }
    let ret = cfg.add_stmt(MirNode::new(Opcode::Return));
    stmts.push(ret);
    for stmt in stmts {
        cfg.block_mut(cfg.entry()).push_stmt(stmt);
    }

    let mut app = NetvmApp::new();
    let mut pe = ProcessingElement::new("wide_pe");
    pe.handlers.push(Handler::new(HandlerKind::Push, cfg, regs));
    app.add_pe(pe);

    let target = netbee_jit::target::x86_64::X8664Target::new();
    let report = compile_unit(&mut app, &opts(OptLevel::Optimize, DriverFlags::default()), Backend::Native(&target));

    assert!(report.is_success(), "failures: {:?}", report.failures.iter().map(|f| f.to_string()).collect::<Vec<_>>());
}

/// Scenario 6: long branch fallback. `classify_branches` must mark a
/// branch `Long` once its displacement exceeds the target's short-branch
/// range, the signal the binary emitter uses to fall back to a long
/// encoding (spec §4.8/§4.9).
#[test]
fn far_branch_is_classified_long() {
    use netbee_jit::lir::LirCfg;
    use netbee_jit::trace::{classify_branches, BranchReach};
    use rustc_hash::FxHashMap;

    let _ = env_logger::try_init();

    let mut cfg = Cfg::new("f");
    let a = cfg.add_node();
    cfg.add_edge(cfg.entry(), a);
    cfg.add_edge(a, cfg.exit());
    let mut lir = LirCfg::mirror_from(&cfg);
    lir.block_mut(cfg.entry()).terminator = netbee_jit::lir::Terminator::Jump(a);

    let mut block_start = FxHashMap::default();
    let mut block_end = FxHashMap::default();
    block_start.insert(cfg.entry(), 0);
    block_end.insert(cfg.entry(), 0);
    block_start.insert(a, 10_000);
    block_end.insert(a, 10_010);

    let order = vec![cfg.entry(), a, cfg.exit()];
    let classified = classify_branches(&lir, &order, &block_start, &block_end, 127);
    assert_eq!(classified.get(&cfg.entry()), Some(&BranchReach::Long));
}

/// Inline mode, end to end: compiling a whole app with `flags.inline`
/// set produces one merged handler rather than one per PE.
#[test]
fn inline_mode_compiles_one_merged_unit() {
    let _ = env_logger::try_init();

    let mut cfg_a = Cfg::new("a");
    let ret_a = cfg_a.add_stmt(MirNode::new(Opcode::Return));
    cfg_a.block_mut(cfg_a.entry()).push_stmt(ret_a);
    cfg_a.add_edge(cfg_a.entry(), cfg_a.exit());

    let mut cfg_b = Cfg::new("b");
    let ret_b = cfg_b.add_stmt(MirNode::new(Opcode::Return));
    cfg_b.block_mut(cfg_b.entry()).push_stmt(ret_b);
    cfg_b.add_edge(cfg_b.entry(), cfg_b.exit());

    let mut app = NetvmApp::new();
    let mut pe_a = ProcessingElement::new("a");
    pe_a.handlers.push(Handler::new(HandlerKind::Push, cfg_a, RegisterManager::new()));
    app.add_pe(pe_a);
    let mut pe_b = ProcessingElement::new("b");
    pe_b.handlers.push(Handler::new(HandlerKind::Push, cfg_b, RegisterManager::new()));
    app.add_pe(pe_b);

    let source = netbee_jit::target::csource::CSourceTarget;
    let flags = DriverFlags { inline: true, ..Default::default() };
    let report = compile_unit(&mut app, &opts(OptLevel::Optimize, flags), Backend::Source(&source));

    assert!(report.is_success(), "failures: {:?}", report.failures.iter().map(|f| f.to_string()).collect::<Vec<_>>());
    assert_eq!(report.installed, vec!["inline_unit".to_string()]);
    assert!(report.inline.is_some());
}

/// `PhiArg`/`Operand` round trip through the emitted C text for a simple
/// diamond, confirming the destructed-SSA copy reaches the right block.
#[test]
fn diamond_merge_reads_the_predecessor_defined_value() {
    let _ = env_logger::try_init();

    let mut cfg = Cfg::new("diamond");
    let mut regs = RegisterManager::new();
    let s = regs.new_register(RegSpace::Virtual);

    let a = cfg.add_node();
    let b = cfg.add_node();
    let merge = cfg.add_node();
    cfg.add_edge(cfg.entry(), a);
    cfg.add_edge(cfg.entry(), b);
    cfg.add_edge(a, merge);
    cfg.add_edge(b, merge);
    cfg.add_edge(merge, cfg.exit());

    let cond = cfg.add_stmt(MirNode::new(Opcode::Const).with_operand(Operand::Int(1)));
    let branch = cfg.add_stmt(MirNode::new(Opcode::Branch).with_kid0(cond).with_stmt(StmtExt::Branch { true_target: a, false_target: b }));
    cfg.block_mut(cfg.entry()).push_stmt(cond);
    cfg.block_mut(cfg.entry()).push_stmt(branch);

    let def_a = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(s).with_operand(Operand::Int(1)));
    cfg.block_mut(a).push_stmt(def_a);
    let def_b = cfg.add_stmt(MirNode::new(Opcode::Const).with_def(s).with_operand(Operand::Int(2)));
    cfg.block_mut(b).push_stmt(def_b);

    let read = cfg.add_stmt(MirNode::new(Opcode::VarRef).with_def(s));
    let ret = cfg.add_stmt(MirNode::new(Opcode::Return));
    cfg.block_mut(merge).push_stmt(read);
    cfg.block_mut(merge).push_stmt(ret);

    let mut app = NetvmApp::new();
    let mut pe = ProcessingElement::new("d");
    pe.handlers.push(Handler::new(HandlerKind::Push, cfg, regs));
    app.add_pe(pe);

    let source = netbee_jit::target::csource::CSourceTarget;
    let report = compile_unit(&mut app, &opts(OptLevel::None, DriverFlags::default()), Backend::Source(&source));
    assert!(report.is_success(), "failures: {:?}", report.failures.iter().map(|f| f.to_string()).collect::<Vec<_>>());
}

