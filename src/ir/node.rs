//! Medium-level IR (MIR) tree nodes (spec §3 "IR nodes", §2 component 2).
//!
//! A node is a small fixed-size struct: opcode, up to two kids, an
//! optional defined register, an optional operand, and a property map.
//! Statement-level nodes (jump/switch/phi/call/store) carry an
//! [`StmtExt`] with their extra fields rather than being separate Rust
//! types, so that a `Vec<MirNode>` arena can hold every kind uniformly
//! (REDESIGN FLAGS, spec §9: "a small set of sum types" instead of a
//! template-heavy per-node-type hierarchy).

use crate::ir::entities::{HandlerTag, LookupTableId, NodeId, SymbolId};
use crate::reg::Register;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// The address spaces load/store opcodes address before memory
/// canonicalization rewrites them to `(base, offset, size)` form (spec §4.5).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemSpace {
    /// The packet buffer currently being processed.
    Packet,
    /// Per-invocation scalar info words (e.g. packet length, timestamp).
    Info,
    /// PE-local persistent data segment.
    Data,
    /// Memory shared across PE instances.
    Shared,
    /// The exchange buffer linking adjacent PEs.
    Exchange,
}

/// Size, in bytes, of a memory access. NetVM bytecode only ever needs
/// byte/half/word granularities.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessSize {
    Byte,
    Half,
    Word,
}

impl AccessSize {
    /// Size in bytes.
    pub fn bytes(self) -> u32 {
        match self {
            AccessSize::Byte => 1,
            AccessSize::Half => 2,
            AccessSize::Word => 4,
        }
    }
}

/// Binary/unary/control opcodes a MIR node can carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    // --- values ---
    /// Loads an immediate/symbol operand into the defined register.
    Const,
    /// Reads the current reaching definition of a source-level variable.
    VarRef,
    /// `dst <- src`; introduced by SSA destruction (spec §4.3) and
    /// consumed by copy folding (spec §4.4) and copy-coalescing in the
    /// register allocator (spec §4.7).
    Copy,
    // --- arithmetic / logic ---
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Neg,
    Not,
    // --- comparisons, producing a 0/1 value ---
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // --- memory, pre-canonicalization ---
    Load(MemSpace, AccessSize),
    Store(MemSpace, AccessSize),
    // --- memory, post-canonicalization (spec §4.5) ---
    LoadBase(MemSpace),
    LoadIndexed(AccessSize),
    StoreIndexed(AccessSize),
    // --- control flow statements ---
    Jump,
    Branch,
    Switch,
    Phi,
    Return,
    /// A call to a coprocessor dispatch table entry (spec §6).
    CoprocessorCall,
    /// A NetVM "send packet to port" statement (spec §4.10 inline mode).
    SendPacket,
    /// A symbolic lookup-table operation (spec §3 "Lookup table").
    LookupTableOp(LookupTableOpKind),
    /// A runtime-checked guard over a packet-relative offset, eligible for
    /// bounds-check elimination (spec §4.4).
    BoundsCheck,
    /// A no-op placeholder left behind by simplification passes until DCE
    /// sweeps it out; never reaches instruction selection.
    Nop,
}

/// Symbolic lookup-table operations (spec §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LookupTableOpKind {
    Lookup,
    Insert,
    Update,
    Delete,
}

/// A literal or symbolic operand carried by a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Int(i64),
    Symbol(SymbolId),
    LookupTable(LookupTableId),
    /// Coprocessor (id, operation id) pair for [`Opcode::CoprocessorCall`].
    Coprocessor(u16, u16),
}

/// Fixed, hot per-node properties (REDESIGN FLAGS, spec §9: prefer a fixed
/// struct for hot properties over a string-keyed map in hot passes).
#[derive(Clone, Debug, Default)]
pub struct NodeProps {
    /// True once a pass has proven this node has no observable effect
    /// beyond its own value (no load/store/call); used by DCE.
    pub pure_value: bool,
    /// True if a prior bounds-check elimination pass proved this memory
    /// access's offset is already range-checked by a dominating guard.
    pub bounds_proven: bool,
}

/// Extra fields for statement-level nodes (spec §3: "Statement-level
/// nodes... extend a generic node with extra fields").
#[derive(Clone, Debug)]
pub enum StmtExt {
    /// Unconditional jump target block (as an index into the owning
    /// block's successor list, resolved by the CFG).
    Jump { target: crate::ir::entities::BlockId },
    /// Two-way conditional branch: kid 0 is the condition.
    Branch {
        true_target: crate::ir::entities::BlockId,
        false_target: crate::ir::entities::BlockId,
    },
    /// N-way switch: kid 0 is the scrutinee.
    Switch {
        cases: Vec<(i64, crate::ir::entities::BlockId)>,
        default: crate::ir::entities::BlockId,
    },
    /// SSA phi: one argument per predecessor, ordered consistently with
    /// every other phi in the same block (spec §3 invariant).
    Phi { args: Vec<PhiArg> },
    /// Call-like statement (coprocessor call / runtime helper).
    Call { args: SmallVec<[Register; 4]> },
    /// Store: base/offset/size recorded once memory canonicalization has
    /// run; `None` before that pass.
    Store { offset: Option<i32> },
}

/// One phi argument: either a reaching register from a predecessor, or
/// `Invalid` marking a path where the variable was never defined
/// (spec §4.3 destruction: "undefined ... arguments are ignored").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PhiArg {
    Reg(Register),
    Invalid,
}

/// A MIR tree node.
#[derive(Clone, Debug)]
pub struct MirNode {
    pub opcode: Opcode,
    kids: [Option<NodeId>; 2],
    def: Option<Register>,
    pub operand: Option<Operand>,
    pub props: NodeProps,
    pub stmt: Option<StmtExt>,
    /// Handler this node's root statement originated from, propagated by
    /// every transformation (spec §3).
    pub handler_tag: Option<HandlerTag>,
    side_table: Option<Box<FxHashMap<&'static str, i64>>>,
}

impl MirNode {
    /// Build a leaf or internal node. `kids` must match the opcode's
    /// arity; this is enforced by instruction selection's "arity" error,
    /// not here, since MIR construction itself is a front-end concern.
    pub fn new(opcode: Opcode) -> Self {
        MirNode {
            opcode,
            kids: [None, None],
            def: None,
            operand: None,
            props: NodeProps::default(),
            stmt: None,
            handler_tag: None,
            side_table: None,
        }
    }

    pub fn with_kid0(mut self, kid: NodeId) -> Self {
        self.kids[0] = Some(kid);
        self
    }

    pub fn with_kid1(mut self, kid: NodeId) -> Self {
        self.kids[1] = Some(kid);
        self
    }

    pub fn with_def(mut self, reg: Register) -> Self {
        self.def = Some(reg);
        self
    }

    pub fn with_operand(mut self, op: Operand) -> Self {
        self.operand = Some(op);
        self
    }

    pub fn with_stmt(mut self, ext: StmtExt) -> Self {
        self.stmt = Some(ext);
        self
    }

    pub fn with_handler_tag(mut self, tag: HandlerTag) -> Self {
        self.handler_tag = Some(tag);
        self
    }

    /// Defined register, if this node's opcode class permits a definition
    /// (spec §3 invariant: not every opcode may define).
    pub fn defined_reg(&self) -> Option<Register> {
        self.def
    }

    pub fn set_defined_reg(&mut self, reg: Option<Register>) {
        self.def = reg;
    }

    pub fn kid(&self, i: usize) -> Option<NodeId> {
        self.kids[i]
    }

    pub fn kids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.kids.iter().filter_map(|k| *k)
    }

    pub fn set_kid(&mut self, i: usize, kid: Option<NodeId>) {
        self.kids[i] = kid;
    }

    /// True for opcodes that are statement terminators (must be last in a
    /// block, spec §3 invariant).
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.opcode,
            Opcode::Jump | Opcode::Branch | Opcode::Switch | Opcode::Return
        )
    }

    /// True for opcodes with an observable side effect beyond producing a
    /// value (loads don't count as side-effecting for DCE purposes since a
    /// dead load can be removed; stores/calls/sends do).
    pub fn has_side_effect(&self) -> bool {
        matches!(
            self.opcode,
            Opcode::Store(..)
                | Opcode::StoreIndexed(..)
                | Opcode::CoprocessorCall
                | Opcode::SendPacket
                | Opcode::LookupTableOp(_)
                | Opcode::Return
                | Opcode::Jump
                | Opcode::Branch
                | Opcode::Switch
        )
    }

    /// Rare, cold per-node facts keyed by name (REDESIGN FLAGS auxiliary
    /// side-table, spec §9).
    pub fn side_fact(&self, key: &'static str) -> Option<i64> {
        self.side_table.as_ref().and_then(|t| t.get(key).copied())
    }

    pub fn set_side_fact(&mut self, key: &'static str, value: i64) {
        self.side_table
            .get_or_insert_with(|| Box::new(FxHashMap::default()))
            .insert(key, value);
    }

    /// Deep-copy this node's subtree, allocating fresh entries in `arena`
    /// for every descendant (spec §3: "copying a node deep-copies its
    /// subtree"). Returns the id of the copied root.
    pub fn deep_copy(
        node_id: NodeId,
        src: &cranelift_entity::PrimaryMap<NodeId, MirNode>,
        dst: &mut cranelift_entity::PrimaryMap<NodeId, MirNode>,
    ) -> NodeId {
        let orig = &src[node_id];
        let mut copy = orig.clone();
        copy.kids = [None, None];
        for i in 0..2 {
            if let Some(kid) = orig.kid(i) {
                copy.kids[i] = Some(Self::deep_copy(kid, src, dst));
            }
        }
        dst.push(copy)
    }
}
