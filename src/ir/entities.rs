//! Dense entity references used throughout the MIR/CFG (spec §3).
//!
//! Grounded on `cranelift_codegen::ir::entities`: entities are never raw
//! pointers or Rust references (REDESIGN FLAGS, spec §9) but small `u32`
//! indices into arenas owned by the [`crate::ir::cfg::Cfg`] they belong to.
//! `cranelift_entity`'s `entity_impl!` gives each one `Display`,
//! `EntityRef`, and the map/set types we build the CFG out of.

use cranelift_entity::entity_impl;

/// A basic block in a function's CFG.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);
entity_impl!(BlockId, "block");

/// A MIR node, addressed by its position in the function's node arena.
/// Only statement *roots* (spec §3 "ordered list of IR statement roots")
/// are ever referenced from a [`crate::ir::block::BasicBlock`]; a node's
/// children are owned inline by the arena entry and not separately
/// addressable from outside their parent tree.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);
entity_impl!(NodeId, "node");

/// A symbol in the global or per-function symbol table.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);
entity_impl!(SymbolId, "sym");

/// A lookup-table descriptor.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LookupTableId(u32);
entity_impl!(LookupTableId, "lut");

/// Tags the source handler (init/push/pull of some PE) a block came from.
/// Propagated by every CFG-rewriting transformation (spec §3 invariant).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct HandlerTag(u32);
entity_impl!(HandlerTag, "handler");
