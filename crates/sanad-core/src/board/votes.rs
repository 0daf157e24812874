//! Vote ledger persistence
//!
//! Remembers which comments this voter has already rated, so each comment
//! gets at most one vote per voter across sessions.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{BoardError, BoardResult};

/// Votes cast by this voter, keyed by comment id
#[derive(Debug, Default)]
pub struct VoteLedger {
    votes: BTreeMap<String, bool>,
    /// Path to persist the ledger
    path: Option<PathBuf>,
}

impl VoteLedger {
    /// Create a ledger (in-memory only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger that persists to disk
    pub fn with_path(path: PathBuf) -> BoardResult<Self> {
        let mut ledger = Self {
            votes: BTreeMap::new(),
            path: Some(path.clone()),
        };

        if path.exists() {
            ledger.load()?;
        }

        Ok(ledger)
    }

    pub fn has_voted(&self, comment_id: &str) -> bool {
        self.votes.contains_key(comment_id)
    }

    /// The vote cast on a comment, if any
    pub fn get(&self, comment_id: &str) -> Option<bool> {
        self.votes.get(comment_id).copied()
    }

    /// Record a vote; `false` if one was already recorded
    pub fn record(&mut self, comment_id: &str, helpful: bool) -> bool {
        if self.has_voted(comment_id) {
            return false;
        }
        self.votes.insert(comment_id.to_string(), helpful);
        true
    }

    /// Drop a recorded vote
    pub fn forget(&mut self, comment_id: &str) -> Option<bool> {
        self.votes.remove(comment_id)
    }

    /// Save ledger to disk
    pub fn save(&self) -> BoardResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(&self.votes).map_err(|e| {
            BoardError::LedgerFormat {
                path: path.clone(),
                details: e.to_string(),
            }
        })?;

        let io_err = |source: std::io::Error| BoardError::Ledger {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, json).map_err(io_err)?;

        debug!("Saved {} vote(s) to {:?}", self.votes.len(), path);
        Ok(())
    }

    /// Load ledger from disk
    fn load(&mut self) -> BoardResult<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        let json = fs::read_to_string(path).map_err(|source| BoardError::Ledger {
            path: path.clone(),
            source,
        })?;
        self.votes = serde_json::from_str(&json).map_err(|e| BoardError::LedgerFormat {
            path: path.clone(),
            details: e.to_string(),
        })?;

        Ok(())
    }

    /// Number of comments voted on
    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_once() {
        let mut ledger = VoteLedger::new();
        assert!(ledger.record("c1", true));
        assert!(!ledger.record("c1", false));
        assert_eq!(ledger.get("c1"), Some(true));
        assert_eq!(ledger.get("c2"), None);
    }

    #[test]
    fn test_forget_allows_new_vote() {
        let mut ledger = VoteLedger::new();
        ledger.record("c1", true);
        assert_eq!(ledger.forget("c1"), Some(true));
        assert!(!ledger.has_voted("c1"));
        assert!(ledger.record("c1", false));
        assert_eq!(ledger.forget("c2"), None);
    }

    #[test]
    fn test_ledger_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("votes.json");

        {
            let mut ledger = VoteLedger::with_path(path.clone()).unwrap();
            ledger.record("c1", true);
            ledger.record("c2", false);
            ledger.save().unwrap();
        }

        {
            let ledger = VoteLedger::with_path(path).unwrap();
            assert_eq!(ledger.len(), 2);
            assert_eq!(ledger.get("c2"), Some(false));
        }
    }

    #[test]
    fn test_corrupt_ledger() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("votes.json");
        fs::write(&path, "not json").unwrap();

        let err = VoteLedger::with_path(path).unwrap_err();
        assert!(matches!(err, BoardError::LedgerFormat { .. }));
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let mut ledger = VoteLedger::new();
        ledger.record("c1", true);
        assert!(ledger.save().is_ok());
    }
}
