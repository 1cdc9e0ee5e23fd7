//! Scalar optimizer (spec §2 component 5, §4.4).
//!
//! The driver repeats constant folding, algebraic simplification, DCE,
//! constant propagation, control-flow simplification, and operand
//! redistribution to a fixed point, then runs reassociation and repeats
//! the whole sequence if reassociation changed anything. Passes are
//! registered into an explicit list (REDESIGN FLAGS, spec §9) rather than
//! a virtual-dispatch pass hierarchy, giving [`crate::target`] backends
//! the "stable extension point" spec §1 asks for.

pub mod algebraic;
pub mod bounds_check;
pub mod cfg_simplify;
pub mod const_fold;
pub mod const_prop;
pub mod copy_fold;
pub mod dce;
pub mod operand_redistribute;
pub mod reassoc;

use crate::error::CodegenResult;
use crate::ir::Cfg;

/// One scalar-optimizer pass. Returns whether it changed the function.
pub trait OptPass {
    fn name(&self) -> &'static str;
    fn run(&mut self, cfg: &mut Cfg) -> CodegenResult<bool>;
}

/// Registers the default pass list spec §4.4 names, in order. Backends
/// may push additional passes (e.g. bounds-check elimination at
/// `opt_level >= 2`) before calling [`run_to_fixed_point`].
pub fn default_passes(bounds_check: bool) -> Vec<Box<dyn OptPass>> {
    let mut passes: Vec<Box<dyn OptPass>> = vec![
        Box::new(const_fold::ConstFold),
        Box::new(algebraic::AlgebraicSimplify),
        Box::new(dce::DeadCodeElimination),
        Box::new(const_prop::ConstPropagation),
        Box::new(cfg_simplify::ControlFlowSimplify),
        Box::new(operand_redistribute::OperandRedistribute),
    ];
    if bounds_check {
        passes.push(Box::new(bounds_check::BoundsCheckElimination));
    }
    passes
}

/// Drive `passes` to a fixed point, then run reassociation and repeat the
/// whole sequence while reassociation keeps finding work (spec §4.4).
pub fn run_to_fixed_point(cfg: &mut Cfg, passes: &mut [Box<dyn OptPass>]) -> CodegenResult<()> {
    let _t = crate::timing::start("scalar_optimizer");
    loop {
        let mut any_changed = false;
        loop {
            let mut changed_this_round = false;
            for pass in passes.iter_mut() {
                let changed = pass.run(cfg)?;
                log::trace!("opt pass {} changed={}", pass.name(), changed);
                changed_this_round |= changed;
            }
            any_changed |= changed_this_round;
            if !changed_this_round {
                break;
            }
        }
        let mut reassoc = reassoc::Reassociate;
        let reassoc_changed = reassoc.run(cfg)?;
        if !reassoc_changed {
            break;
        }
        if !any_changed && !reassoc_changed {
            break;
        }
    }
    Ok(())
}
