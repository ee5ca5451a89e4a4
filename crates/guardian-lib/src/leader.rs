//! Leadership signal consumed by the engine
//!
//! Election itself happens elsewhere; the engine only asks "am I leader".

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait LeaderSignal: Send + Sync {
    fn is_leader(&self) -> bool;
}

/// Shared flag flipped by an external elector
#[derive(Debug, Clone, Default)]
pub struct LeaderFlag {
    leader: Arc<AtomicBool>,
}

impl LeaderFlag {
    pub fn new(leader: bool) -> Self {
        Self {
            leader: Arc::new(AtomicBool::new(leader)),
        }
    }

    pub fn set(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }
}

impl LeaderSignal for LeaderFlag {
    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }
}

/// Single-replica deployments lead unconditionally
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysLeader;

impl LeaderSignal for AlwaysLeader {
    fn is_leader(&self) -> bool {
        true
    }
}

/// Leader while a marker file exists, e.g. one written by a sidecar elector
#[derive(Debug, Clone)]
pub struct FileLeader {
    path: PathBuf,
}

impl FileLeader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LeaderSignal for FileLeader {
    fn is_leader(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_shared_between_clones() {
        let flag = LeaderFlag::new(false);
        let observer = flag.clone();
        assert!(!observer.is_leader());
        flag.set(true);
        assert!(observer.is_leader());
    }

    #[test]
    fn test_file_leader() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("leader");
        let signal = FileLeader::new(&marker);
        assert!(!signal.is_leader());

        std::fs::write(&marker, "guardian-0").unwrap();
        assert!(signal.is_leader());
        assert!(AlwaysLeader.is_leader());
    }
}
