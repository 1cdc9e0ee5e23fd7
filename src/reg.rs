//! Register model and register manager (spec §3 "Register", §4.1).
//!
//! A [`Register`] is a value object identified by `(space, name, version)`;
//! equality is structural across all three components. Only the register
//! allocator may introduce mappings into [`RegSpace::Machine`], and only the
//! spiller into [`RegSpace::Spill`] — callers elsewhere construct registers
//! through [`RegisterManager::new_register`], never by hand.
//!
//! Grounded on `cranelift_codegen::regalloc::register_set` for the general
//! shape of a small, dense, per-space name space, generalized here to the
//! multi-space model spec §3 requires (virtual/machine/spill/coprocessor/
//! constant/flags) rather than a single machine register file.

use rustc_hash::FxHashMap;
use std::fmt;

/// Partitions the register universe (spec §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegSpace {
    /// SSA-able virtual registers assigned by the front end / MIR builder.
    Virtual,
    /// Real machine registers, populated only by the allocator's commit step.
    Machine,
    /// Stack spill slots, populated only by the spiller.
    Spill,
    /// One bank per coprocessor id; banks are distinguished by `name`'s
    /// high bits when more than one coprocessor is in play (see
    /// `RegSpace::coprocessor`).
    Coprocessor,
    /// Compile-time constants materialized as pseudo-registers.
    Constant,
    /// Condition-code / flag pseudo-registers.
    Flags,
}

impl RegSpace {
    /// Construct the coprocessor space tag for a given coprocessor id.
    /// We keep a single `Coprocessor` variant and fold the id into the
    /// dense name via [`Register::coprocessor`] rather than multiplying
    /// enum variants per coprocessor, since the id set is runtime data.
    pub fn coprocessor() -> Self {
        RegSpace::Coprocessor
    }
}

impl fmt::Display for RegSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegSpace::Virtual => "v",
            RegSpace::Machine => "m",
            RegSpace::Spill => "s",
            RegSpace::Coprocessor => "c",
            RegSpace::Constant => "k",
            RegSpace::Flags => "f",
        };
        f.write_str(s)
    }
}

/// A symbolic register: `(space, name, version)`.
///
/// Two registers with the same `(space, name)` but different `version`
/// denote distinct SSA values but the same storage after out-of-SSA
/// (spec §3 invariant). A register's space never changes after creation;
/// [`RegisterManager::rename`] changes `(space, name)` in place for the
/// callers that are allowed to (the allocator, the spiller).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register {
    space: RegSpace,
    name: u32,
    version: u32,
}

impl Register {
    /// Version used for every register outside of SSA form.
    pub const NO_VERSION: u32 = 0;

    fn new(space: RegSpace, name: u32) -> Self {
        Register {
            space,
            name,
            version: Self::NO_VERSION,
        }
    }

    /// Register space.
    pub fn space(&self) -> RegSpace {
        self.space
    }

    /// Dense name within `space`.
    pub fn name(&self) -> u32 {
        self.name
    }

    /// SSA version; 0 outside SSA.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// True if this register is an SSA value (non-zero version) rather
    /// than a plain post-destruction storage location.
    pub fn is_ssa(&self) -> bool {
        self.version != Self::NO_VERSION
    }

    /// Return a copy of this register with a fresh SSA version. Used by
    /// SSA construction's renaming pass.
    pub fn with_version(&self, version: u32) -> Self {
        Register {
            version,
            ..*self
        }
    }

    /// Return a copy of this register with version reset to 0 (the
    /// storage location after out-of-SSA, keyed on `(space, name)` only).
    pub fn storage(&self) -> Self {
        self.with_version(Self::NO_VERSION)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.space, self.name)?;
        if self.version != Self::NO_VERSION {
            write!(f, "@{}", self.version)?;
        }
        Ok(())
    }
}

/// Transient per-register facts: size hint, ownership, and (for registers
/// that name basic blocks in the dominance side-tables) dominator info.
/// Kept as a loose property bag rather than a fixed struct because these
/// properties are genuinely sparse and register-keyed, unlike the
/// per-node hot properties in [`crate::ir::node`].
#[derive(Clone, Debug, Default)]
pub struct RegisterProps {
    /// Size in bytes, when known statically.
    pub size_hint: Option<u8>,
    /// True if this register is defined by a coprocessor call as opposed
    /// to an ordinary MIR node (affects liveness flag attribution, §6).
    pub coprocessor_owned: bool,
}

/// Process-wide-in-spirit, but scoped-per-unit-in-practice naming of
/// symbolic registers (spec §4.1, and the REDESIGN FLAGS note in spec §9
/// that counters must be scoped per compilation unit rather than global
/// statics). One `RegisterManager` is created per [`crate::driver`]
/// compilation unit.
#[derive(Default)]
pub struct RegisterManager {
    next_name: FxHashMap<RegSpace, u32>,
    props: FxHashMap<Register, RegisterProps>,
}

impl RegisterManager {
    /// Create a fresh, empty register manager for one compilation unit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a register with a fresh dense name in `space` and version 0.
    pub fn new_register(&mut self, space: RegSpace) -> Register {
        let slot = self.next_name.entry(space).or_insert(0);
        let name = *slot;
        *slot += 1;
        Register::new(space, name)
    }

    /// Highest dense name used so far in `space`, or `None` if none have
    /// been allocated.
    pub fn get_latest_name(&self, space: RegSpace) -> Option<u32> {
        self.next_name.get(&space).map(|&n| n.wrapping_sub(1))
    }

    /// Rewrite the underlying model for `reg` to `(new_space, new_name)`.
    /// All copies of `reg` elsewhere in the function still compare equal
    /// to each other structurally — callers are expected to rewrite every
    /// occurrence themselves (the allocator's "commit colors" step and the
    /// spiller's slot assignment both do this by walking all uses/defs),
    /// this method only bumps the manager's bookkeeping so that
    /// subsequent `new_register` calls in `new_space` stay dense.
    pub fn rename(&mut self, reg: Register, new_space: RegSpace, new_name: u32) -> Register {
        let slot = self.next_name.entry(new_space).or_insert(0);
        if new_name >= *slot {
            *slot = new_name + 1;
        }
        if let Some(props) = self.props.remove(&reg) {
            self.props.insert(
                Register {
                    space: new_space,
                    name: new_name,
                    version: Register::NO_VERSION,
                },
                props,
            );
        }
        Register {
            space: new_space,
            name: new_name,
            version: Register::NO_VERSION,
        }
    }

    /// Fetch (or default-initialize) the property bag for `reg`.
    pub fn props(&mut self, reg: Register) -> &mut RegisterProps {
        self.props.entry(reg).or_default()
    }

    /// Fetch the property bag for `reg` if one has been recorded.
    pub fn props_ref(&self, reg: Register) -> Option<&RegisterProps> {
        self.props.get(&reg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_names_per_space() {
        let mut rm = RegisterManager::new();
        let v0 = rm.new_register(RegSpace::Virtual);
        let v1 = rm.new_register(RegSpace::Virtual);
        let m0 = rm.new_register(RegSpace::Machine);
        assert_eq!(v0.name(), 0);
        assert_eq!(v1.name(), 1);
        assert_eq!(m0.name(), 0);
        assert_eq!(rm.get_latest_name(RegSpace::Virtual), Some(1));
    }

    #[test]
    fn version_distinguishes_ssa_values_same_storage() {
        let mut rm = RegisterManager::new();
        let v = rm.new_register(RegSpace::Virtual);
        let v1 = v.with_version(1);
        let v2 = v.with_version(2);
        assert_ne!(v1, v2);
        assert_eq!(v1.storage(), v2.storage());
    }

    #[test]
    fn rename_keeps_target_space_dense() {
        let mut rm = RegisterManager::new();
        let v = rm.new_register(RegSpace::Virtual);
        let m = rm.rename(v, RegSpace::Machine, 3);
        assert_eq!(m.space(), RegSpace::Machine);
        assert_eq!(m.name(), 3);
        let next = rm.new_register(RegSpace::Machine);
        assert_eq!(next.name(), 4);
    }
}
