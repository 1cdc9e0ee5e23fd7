//! SSA construction and destruction (spec §2 component 4, §4.3).

pub mod construct;
pub mod destruct;

pub use construct::construct_ssa;
pub use destruct::{destruct_ssa, remove_spurious_phis};
