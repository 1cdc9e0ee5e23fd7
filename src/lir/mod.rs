//! Low-level IR and instruction selection (spec §2 component 7, §4.6).

pub mod burg;
pub mod cfg;
pub mod inst;
pub mod select;

pub use cfg::{LirCfg, Terminator};
pub use inst::{LirInst, LirOperand, MemOperand};
pub use select::select_instructions;
