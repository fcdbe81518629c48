//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable, thread-safe cancellation flag.
///
/// The solvers check it between Newton iterations and between time steps and
/// abort at the next such boundary, returning whatever partial result has
/// been collected.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_to_clones() {
        let token = CancelToken::new();
        let seen_by_solver = token.clone();
        assert!(!seen_by_solver.is_cancelled());
        token.cancel();
        assert!(seen_by_solver.is_cancelled());
    }
}
