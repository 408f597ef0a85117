// id.rs — Stable identifiers for IR variables
//
// Every `Var` carries a `VarId` that is unique for the lifetime of the
// process. Identity, not name, decides whether two vars are the same: a
// rewrite may rebind a fresh var under an existing name.

use std::sync::atomic::{AtomicU32, Ordering};

/// Stable identifier for a bound variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

static NEXT_VAR: AtomicU32 = AtomicU32::new(0);

impl VarId {
    /// Allocate a fresh id. Ids increase monotonically in allocation order.
    pub fn fresh() -> Self {
        VarId(NEXT_VAR.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct_and_increasing() {
        let a = VarId::fresh();
        let b = VarId::fresh();
        assert_ne!(a, b);
        assert!(a < b);
    }
}
