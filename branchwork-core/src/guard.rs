//! Protected-branch guard
//!
//! Branch names are matched by exact, case-sensitive string comparison.
//! The check never touches the remote.

use std::collections::BTreeSet;

use tracing::warn;

use crate::{Error, Result};

/// Set of branch names that reject direct commits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedBranches {
    names: BTreeSet<String>,
}

impl ProtectedBranches {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn is_protected(&self, branch: &str) -> bool {
        self.names.contains(branch)
    }

    /// Reject `branch` with [`Error::ProtectedBranch`] if it is in the set
    pub fn check(&self, branch: &str) -> Result<()> {
        if self.is_protected(branch) {
            warn!(branch, "Rejected commit to protected branch");
            return Err(Error::ProtectedBranch(branch.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_member() {
        let guard = ProtectedBranches::new(["main", "release"]);
        let err = guard.check("main").unwrap_err();
        assert!(matches!(err, Error::ProtectedBranch(ref b) if b == "main"));
    }

    #[test]
    fn test_allows_non_member() {
        let guard = ProtectedBranches::new(["main"]);
        assert!(guard.check("feature/x").is_ok());
    }

    #[test]
    fn test_match_is_exact() {
        let guard = ProtectedBranches::new(["main"]);
        assert!(guard.check("Main").is_ok());
        assert!(guard.check("main ").is_ok());
        assert!(guard.check("refs/heads/main").is_ok());
    }

    #[test]
    fn test_empty_set_allows_everything() {
        assert!(ProtectedBranches::default().check("main").is_ok());
    }
}
