//! Write gate for single-writer backends
//!
//! Embedded engines such as SQLite reject a write while another write
//! transaction is open (`database is locked`). Every record insert and every
//! post-delete `VACUUM` goes through this gate so writers from this process
//! queue up instead of failing. The gate is inert for backends with their
//! own write concurrency control.
//!
//! This only coordinates writers inside the current process.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct WriteGate {
    lock: Option<Arc<Mutex<()>>>,
}

/// Held for the span of one storage call, released on drop.
#[derive(Debug)]
pub struct GateGuard<'a> {
    held: Option<MutexGuard<'a, ()>>,
}

impl GateGuard<'_> {
    /// Whether this guard actually holds the lock
    pub fn is_exclusive(&self) -> bool {
        self.held.is_some()
    }
}

impl WriteGate {
    /// Gate that serializes writers
    pub fn exclusive() -> Self {
        Self {
            lock: Some(Arc::new(Mutex::new(()))),
        }
    }

    /// Gate that never blocks
    pub fn inert() -> Self {
        Self { lock: None }
    }

    pub fn for_backend(single_writer: bool) -> Self {
        if single_writer {
            Self::exclusive()
        } else {
            Self::inert()
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock.is_some()
    }

    /// Wait for exclusive access. Returns immediately for an inert gate.
    pub async fn acquire(&self) -> GateGuard<'_> {
        match &self.lock {
            Some(lock) => GateGuard {
                held: Some(lock.lock().await),
            },
            None => GateGuard { held: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_inert_gate_never_blocks() {
        let gate = WriteGate::inert();
        let first = gate.acquire().await;
        let second = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;

        assert!(!first.is_exclusive());
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_exclusive_gate_blocks_second_writer() {
        let gate = WriteGate::exclusive();
        let first = gate.acquire().await;
        assert!(first.is_exclusive());

        let blocked = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(blocked.is_err());

        drop(first);
        let after = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(after.is_ok());
    }

    #[tokio::test]
    async fn test_clones_share_the_lock() {
        let gate = WriteGate::for_backend(true);
        let clone = gate.clone();
        let _held = gate.acquire().await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), clone.acquire()).await;
        assert!(blocked.is_err());
    }

    #[tokio::test]
    async fn test_released_when_holder_errors() {
        let gate = WriteGate::exclusive();

        async fn failing_write(gate: &WriteGate) -> Result<(), &'static str> {
            let _guard = gate.acquire().await;
            Err("write failed")
        }

        assert!(failing_write(&gate).await.is_err());
        let after = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(after.is_ok());
    }
}
