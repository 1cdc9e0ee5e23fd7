//! Pass-timing facade.
//!
//! Grounded on `cranelift_codegen::timing`: each top-level pass wraps its
//! body in a named scope guard whose `Drop` impl accumulates elapsed time
//! into a process-wide table, readable back for profiling. This is not a
//! metrics/observability *service* (host-level infra is out of scope,
//! spec §1) — it is the same lightweight in-process facade the teacher
//! ships as part of the codegen crate itself.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::{Duration, Instant};

thread_local! {
    static TOTALS: RefCell<HashMap<&'static str, Duration>> = RefCell::new(HashMap::new());
}

/// RAII guard that adds its lifetime to the named pass's running total.
pub struct PassTimer {
    name: &'static str,
    start: Instant,
}

impl Drop for PassTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        TOTALS.with(|totals| {
            *totals.borrow_mut().entry(self.name).or_insert(Duration::ZERO) += elapsed;
        });
    }
}

/// Start timing a pass named `name`. Hold the returned guard for the
/// duration of the pass.
pub fn start(name: &'static str) -> PassTimer {
    PassTimer {
        name,
        start: Instant::now(),
    }
}

/// Snapshot of accumulated time per pass name, for diagnostics.
pub fn snapshot() -> Vec<(&'static str, Duration)> {
    TOTALS.with(|totals| totals.borrow().iter().map(|(k, v)| (*k, *v)).collect())
}

/// Clear all accumulated timings. Intended for use between compilation
/// units in long-running hosts, and in tests.
pub fn clear() {
    TOTALS.with(|totals| totals.borrow_mut().clear());
}

macro_rules! pass_timer {
    ($name:ident) => {
        pub fn $name() -> crate::timing::PassTimer {
            crate::timing::start(stringify!($name))
        }
    };
}

pub(crate) use pass_timer;
