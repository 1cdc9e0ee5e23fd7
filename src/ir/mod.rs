//! Medium-level IR: tree nodes, basic blocks, the CFG, symbols, and
//! lookup tables (spec §2 components 1–2, §3).

pub mod block;
pub mod cfg;
pub mod entities;
pub mod lookup_table;
pub mod node;
pub mod symbol;

pub use block::{BasicBlock, BlockProps, BlockRole};
pub use cfg::{Cfg, TieBreak};
pub use entities::{BlockId, HandlerTag, LookupTableId, NodeId, SymbolId};
pub use lookup_table::LookupTableDescriptor;
pub use node::{AccessSize, MemSpace, MirNode, NodeProps, Opcode, Operand, PhiArg, StmtExt};
pub use symbol::{LocalScope, Symbol, SymbolTable};
