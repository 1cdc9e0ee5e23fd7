//! Application model the JIT driver compiles (spec §4.10, §6).
//!
//! `original_source/netbee/src/nbnetvm/jit/jit_interface.cpp` resolves the
//! handlers it compiles from the application's PE graph rather than a
//! flat list, and wires compiled function pointers into peer PEs' port
//! tables by following each port's connection flags — both kept here
//! (spec.md §6 "Runtime handler state").
//!
//! Building a handler's MIR `Cfg` from NetVM bytecode bytes is a front-end
//! concern out of this crate's scope (spec §1); a `Handler` already owns
//! its built `Cfg`, which the driver takes as read-only input.

use crate::emit::CodeBuffer;
use crate::ir::Cfg;
use crate::reg::RegisterManager;

/// A handler's role within its PE (spec GLOSSARY "Handler").
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    Init,
    Push,
    Pull,
}

/// ABI every native-compiled handler is called through (spec §6):
/// `int32 (*)(ExchangeBuffer **, int32 port_count, HandlerState *)`.
pub type HandlerFn = unsafe extern "C" fn(*mut *mut ExchangeBuffer, i32, *mut HandlerState) -> i32;

/// Opaque runtime types this crate never looks inside of; their layout is
/// owned by the embedding runtime (spec §6 "Shared resources").
#[repr(C)]
pub struct ExchangeBuffer {
    _private: [u8; 0],
}

#[repr(C)]
pub struct HandlerState {
    _private: [u8; 0],
}

/// A successfully compiled handler, the form the driver wires into the
/// runtime's connection table (spec §6: "writes a function pointer...
/// into the runtime's connection table entry, or leaves it null if only
/// assembly was requested").
pub enum CompiledHandler {
    Native { entry: CodeBuffer },
    Assembly { text: String },
    Source { text: String },
}

/// One compilation unit: a handler's already-built MIR CFG, the
/// [`RegisterManager`] it was built with (so every further virtual
/// register the driver allocates keeps landing in a namespace that
/// cannot collide with names the front end already used), and its
/// bytecode-line mapping, used only to annotate errors (spec §4.10's
/// `get_bytecode_line`).
///
/// `compiled` is `None` until the driver installs a successful result
/// (spec §6); a peer PE following `is_connected_pe` reads a connected
/// handler's `compiled` field to find the pointer it wires into its own
/// port table, since the runtime's actual connection-table storage is
/// outside this crate's scope (spec §1: "plus a small set of runtime
/// glue points").
pub struct Handler {
    pub kind: HandlerKind,
    pub cfg: Cfg,
    pub regs: RegisterManager,
    pub line_map: LineMap,
    pub compiled: Option<CompiledHandler>,
}

impl Handler {
    pub fn new(kind: HandlerKind, cfg: Cfg, regs: RegisterManager) -> Self {
        Handler { kind, cfg, regs, line_map: LineMap::default(), compiled: None }
    }

    /// Name used for diagnostics and `CompileReport` entries: `"<pe>.<kind>"`.
    pub fn qualified_name(&self, pe_name: &str) -> String {
        let kind = match self.kind {
            HandlerKind::Init => "init",
            HandlerKind::Push => "push",
            HandlerKind::Pull => "pull",
        };
        format!("{pe_name}_{kind}")
    }
}

/// Maps a bytecode instruction pointer to its source line, for error
/// messages only (spec §4.10's `get_bytecode_line(ip)`).
#[derive(Clone, Debug, Default)]
pub struct LineMap {
    entries: Vec<(u32, u32)>,
}

impl LineMap {
    pub fn insert(&mut self, ip: u32, line: u32) {
        self.entries.push((ip, line));
    }

    pub fn line_for(&self, ip: u32) -> Option<u32> {
        self.entries.iter().rev().find(|&&(i, _)| i <= ip).map(|&(_, l)| l)
    }
}

/// A PE's output port: which peer PE (if any) receives this PE's compiled
/// handler pointer, or whether it connects to a runtime socket instead
/// (spec §6: "following `is_connected_pe` / `is_connected_socket` flags").
#[derive(Clone, Debug, Default)]
pub struct Port {
    pub is_connected_pe: Option<usize>,
    pub is_connected_socket: bool,
}

/// A Processing Element: a named unit owning one or more handlers and the
/// output ports that wire it to peers (spec GLOSSARY "PE").
pub struct ProcessingElement {
    pub name: String,
    pub handlers: Vec<Handler>,
    pub ports: Vec<Port>,
}

impl ProcessingElement {
    pub fn new(name: impl Into<String>) -> Self {
        ProcessingElement { name: name.into(), handlers: Vec::new(), ports: Vec::new() }
    }
}

/// The whole application: a graph of PEs connected through ports.
#[derive(Default)]
pub struct NetvmApp {
    pub pes: Vec<ProcessingElement>,
}

impl NetvmApp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pe(&mut self, pe: ProcessingElement) -> usize {
        self.pes.push(pe);
        self.pes.len() - 1
    }

    /// Postorder over the PE graph following `is_connected_pe` edges, so
    /// that a PE's peers are compiled (and their pointers available to
    /// wire in) before the PE itself (spec §4.10 "for each PE in
    /// postorder").
    pub fn pe_postorder(&self) -> Vec<usize> {
        let mut visited = vec![false; self.pes.len()];
        let mut order = Vec::with_capacity(self.pes.len());
        for start in 0..self.pes.len() {
            self.visit(start, &mut visited, &mut order);
        }
        order
    }

    fn visit(&self, idx: usize, visited: &mut Vec<bool>, order: &mut Vec<usize>) {
        if visited[idx] {
            return;
        }
        visited[idx] = true;
        for port in &self.pes[idx].ports {
            if let Some(peer) = port.is_connected_pe {
                self.visit(peer, visited, order);
            }
        }
        order.push(idx);
    }
}
