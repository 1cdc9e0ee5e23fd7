//! Target drivers (spec §4.10).
//!
//! Two shapes of backend share the driver: a [`NativeTarget`] runs the
//! common LIR pipeline (instruction selection, register allocation,
//! trace/layout, binary or assembly emission) against its own BURG table
//! and encoder; a [`SourceTarget`] bypasses all of that and lowers MIR
//! directly to text (the C-source backend). [`TargetOptions`] is the
//! public configuration surface both are built from (spec §6 "Driver
//! options").

pub mod common;
#[cfg(feature = "csource")]
pub mod csource;
#[cfg(feature = "netproc")]
pub mod netproc;
#[cfg(feature = "x86-32")]
pub mod x86_32;
#[cfg(feature = "x86-64")]
pub mod x86_64;

use crate::emit::InstEncoder;
use crate::error::CodegenResult;
use crate::ir::Cfg;
use crate::lir::burg::BurgTable;
use crate::opt::OptPass;
use crate::reg::Register;
use crate::regalloc::spill::Spiller;
use rustc_hash::FxHashMap;
use std::io::Write;

/// Optimization level (spec §6): 0 disables the scalar optimizer
/// (canonicalization only), 1 enables it, 2 additionally enables
/// bounds-check elimination.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptLevel {
    None = 0,
    Optimize = 1,
    BoundsCheck = 2,
}

/// Output/mode flags (spec §6 "flags: bitset of {native, assembly, init,
/// inline, bounds_check}"). Kept as a plain struct of bools (REDESIGN
/// FLAGS spec §9 prefers a fixed struct over a string-keyed map) rather
/// than pulling in a bitflags dependency for five booleans.
#[derive(Copy, Clone, Debug, Default)]
pub struct DriverFlags {
    pub native: bool,
    pub assembly: bool,
    pub init: bool,
    pub inline: bool,
    pub bounds_check: bool,
}

/// Public configuration surface (spec §6 "Driver options").
pub struct TargetOptions {
    pub opt_level: OptLevel,
    pub output_file_prefix: Option<String>,
    pub flags: DriverFlags,
}

impl TargetOptions {
    /// Verify internal consistency (spec §4.10 "`compile()` verifies
    /// options"): bounds-check elimination requires `opt_level >= 2`.
    pub fn verify(&self) -> CodegenResult<()> {
        if self.flags.bounds_check && self.opt_level < OptLevel::BoundsCheck {
            return Err(crate::error::CodegenError::Internal(
                "bounds_check flag requires opt_level 2".into(),
            ));
        }
        Ok(())
    }

    pub fn optimizer_enabled(&self) -> bool {
        self.opt_level >= OptLevel::Optimize
    }

    pub fn bounds_check_enabled(&self) -> bool {
        self.opt_level >= OptLevel::BoundsCheck && self.flags.bounds_check
    }
}

/// A backend that goes through the shared LIR pipeline (spec §4.10: the
/// two native register-machine targets and the network-processor
/// target).
pub trait NativeTarget {
    fn burg_table(&self) -> &BurgTable;
    fn encoder(&self) -> &dyn InstEncoder;
    fn allocatable_registers(&self) -> &[Register];
    fn precolored(&self, cfg: &Cfg) -> FxHashMap<Register, Register>;
    fn compatible(&self, a: Register, b: Register) -> bool {
        let _ = (a, b);
        true
    }
    fn spiller(&self) -> &dyn Spiller;
    /// Maximum absolute displacement, in bytes, a short branch encoding
    /// can reach (spec §4.8 "classifies each branch as short/long").
    fn short_branch_range(&self) -> i64;
    /// Additional optimizer passes this target wants beyond spec §4.4's
    /// default list (e.g. netproc's VLIW merge), appended after the
    /// default passes and before bounds-check elimination.
    fn extra_passes(&self) -> Vec<Box<dyn OptPass>> {
        Vec::new()
    }
}

/// A backend that bypasses register allocation entirely and emits C
/// source text (spec §4.10 "C-source target").
pub trait SourceTarget {
    fn emit_function(&self, cfg: &Cfg, name: &str, out: &mut dyn Write) -> CodegenResult<()>;
    fn emit_precompile_header(&self, handler_names: &[String], out: &mut dyn Write) -> std::io::Result<()>;
}

/// Which shape of backend a given run is targeting.
pub enum Backend<'a> {
    Native(&'a dyn NativeTarget),
    Source(&'a dyn SourceTarget),
}
