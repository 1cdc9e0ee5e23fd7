//! `netbee-jit`: NetVM JIT compiler core (spec §1).
//!
//! Takes a handler's already-built MIR [`ir::Cfg`] (front-end bytecode
//! decoding is out of this crate's scope) and drives it through SSA
//! construction, the fixed-point scalar optimizer, SSA destruction,
//! memory-access canonicalization, and then either the shared LIR
//! pipeline (instruction selection, graph-coloring register allocation,
//! trace layout, binary/assembly emission) or direct C-source emission,
//! depending on the selected [`target::Backend`]. [`driver::compile_unit`]
//! is the crate's single entry point.

pub mod app;
pub mod driver;
pub mod emit;
pub mod error;
pub mod graph;
pub mod inline;
pub mod ir;
pub mod lir;
pub mod memtranslate;
pub mod opt;
pub mod reg;
pub mod regalloc;
pub mod ssa;
pub mod target;
pub mod timing;
pub mod trace;

pub use app::{CompiledHandler, ExchangeBuffer, Handler, HandlerFn, HandlerKind, HandlerState, LineMap, NetvmApp, Port, ProcessingElement};
pub use driver::compile_unit;
pub use error::{CodegenError, CodegenResult, CompileReport, FunctionError};
pub use target::{Backend, DriverFlags, NativeTarget, OptLevel, SourceTarget, TargetOptions};
