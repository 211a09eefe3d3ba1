//! Tree reader
//!
//! Read operations against the workspace's active branch or a pinned commit.
//! A missing file is an error; a missing directory lists as empty.

use std::collections::HashSet;

use base64::Engine;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::gateway::{CommitSummary, ContentKind, Contents, EntryKind, GatewayError};
use crate::workspace::Workspace;
use crate::{Error, Result};

/// Single-level directory listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryListing {
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

impl DirectoryListing {
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }
}

/// Outcome of reading one path in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRead {
    pub path: String,
    #[serde(flatten)]
    pub status: ReadStatus,
}

/// Serializes as `{"status": ...}`; found content carries an `encoding`
/// of `utf-8` or, for binary files, `base64`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStatus {
    Found {
        content: Vec<u8>,
    },
    NotFound,
    Failed {
        error: String,
    },
}

impl FileRead {
    pub fn content(&self) -> Option<&[u8]> {
        match &self.status {
            ReadStatus::Found { content } => Some(content),
            _ => None,
        }
    }
}

impl Serialize for ReadStatus {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        match self {
            ReadStatus::Found { content } => {
                map.serialize_entry("status", "found")?;
                match std::str::from_utf8(content) {
                    Ok(text) => {
                        map.serialize_entry("encoding", "utf-8")?;
                        map.serialize_entry("content", text)?;
                    }
                    Err(_) => {
                        let encoded = base64::engine::general_purpose::STANDARD.encode(content);
                        map.serialize_entry("encoding", "base64")?;
                        map.serialize_entry("content", &encoded)?;
                    }
                }
            }
            ReadStatus::NotFound => map.serialize_entry("status", "not_found")?,
            ReadStatus::Failed { error } => {
                map.serialize_entry("status", "failed")?;
                map.serialize_entry("error", error)?;
            }
        }
        map.end()
    }
}

/// Decode file content from the remote's transfer encoding
fn decode_content(path: &str, content: &str, encoding: &str) -> Result<Vec<u8>> {
    match encoding {
        "base64" => {
            // The remote wraps base64 payloads at fixed widths
            let compact: String = content.split_whitespace().collect();
            base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| Error::Decode {
                    path: path.to_string(),
                    reason: e.to_string(),
                })
        }
        "utf-8" | "utf8" => Ok(content.as_bytes().to_vec()),
        other => Err(Error::Decode {
            path: path.to_string(),
            reason: format!("unsupported encoding '{}'", other),
        }),
    }
}

impl Workspace {
    /// List paths in the active branch's tree, recursively
    ///
    /// With `only_blobs`, directory entries are dropped. Remote order is kept.
    pub async fn list_files(&self, only_blobs: bool) -> Result<Vec<String>> {
        let branch = self.current_branch();
        debug!(repo = %self.slug(), branch, only_blobs, "Listing files");

        let listing = self
            .call(self.gateway().get_tree(self.slug(), branch, true))
            .await
            .map_err(|e| match e {
                GatewayError::NotFound(_) => {
                    Error::NotFound(format!("tree of branch '{}'", branch))
                }
                other => other.into(),
            })?;

        if listing.truncated {
            warn!(
                branch,
                count = listing.entries.len(),
                "Tree listing was truncated by the remote"
            );
        }

        Ok(listing
            .entries
            .into_iter()
            .filter(|entry| !only_blobs || entry.kind == EntryKind::Blob)
            .map(|entry| entry.path)
            .collect())
    }

    /// List one directory level at the active branch
    ///
    /// An absent path yields an empty listing rather than an error.
    pub async fn list_directory(&self, path: &str) -> Result<DirectoryListing> {
        let branch = self.current_branch();
        debug!(repo = %self.slug(), branch, path, "Listing directory");

        let contents = match self
            .call(self.gateway().get_content(self.slug(), path, branch))
            .await
        {
            Ok(contents) => contents,
            Err(GatewayError::NotFound(_)) => {
                debug!(branch, path, "Directory is empty or does not exist");
                return Ok(DirectoryListing::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut listing = DirectoryListing::default();
        match contents {
            Contents::Directory(entries) => {
                for entry in entries {
                    match entry.kind {
                        ContentKind::Dir => listing.directories.push(entry.path),
                        ContentKind::File => listing.files.push(entry.path),
                        ContentKind::Symlink | ContentKind::Submodule => {}
                    }
                }
            }
            Contents::File { .. } => listing.files.push(path.to_string()),
        }
        Ok(listing)
    }

    /// Read a file at the active branch head
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let branch = self.current_branch().to_string();
        self.read_at(path, &branch).await
    }

    /// Read a file as of `commit`, independent of the active branch
    pub async fn read_file_at_commit(&self, path: &str, commit: &str) -> Result<Vec<u8>> {
        self.read_at(path, commit).await
    }

    async fn read_at(&self, path: &str, git_ref: &str) -> Result<Vec<u8>> {
        debug!(repo = %self.slug(), path, git_ref, "Reading file");

        let contents = self
            .call(self.gateway().get_content(self.slug(), path, git_ref))
            .await
            .map_err(|e| match e {
                GatewayError::NotFound(_) => {
                    Error::NotFound(format!("{} at {}", path, git_ref))
                }
                other => other.into(),
            })?;

        match contents {
            Contents::File {
                content, encoding, ..
            } => decode_content(path, &content, &encoding),
            Contents::Directory(_) => Err(Error::Other(format!(
                "{} at {} is a directory, not a file",
                path, git_ref
            ))),
        }
    }

    /// Read several files, isolating failures per path
    ///
    /// Each distinct path is read once, in first-requested order.
    pub async fn read_files<S: AsRef<str>>(&self, paths: &[S]) -> Vec<FileRead> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for path in paths.iter().map(AsRef::as_ref) {
            if !seen.insert(path) {
                continue;
            }
            let status = match self.read_file(path).await {
                Ok(content) => ReadStatus::Found { content },
                Err(Error::NotFound(_)) => ReadStatus::NotFound,
                Err(e) => {
                    warn!(path, error = %e, "Failed to read file");
                    ReadStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            results.push(FileRead {
                path: path.to_string(),
                status,
            });
        }

        results
    }

    /// Commit history of `branch`, or of the active branch
    pub async fn list_commits(&self, branch: Option<&str>) -> Result<Vec<CommitSummary>> {
        let branch = branch.unwrap_or(self.current_branch());
        debug!(repo = %self.slug(), branch, "Listing commits");

        let commits = self
            .call(self.gateway().list_commits(self.slug(), branch))
            .await?;
        debug!(branch, count = commits.len(), "Fetched commits");
        Ok(commits)
    }

    /// Paths changed by `commit`
    pub async fn commit_files(&self, commit: &str) -> Result<Vec<String>> {
        debug!(repo = %self.slug(), commit, "Listing commit files");
        Ok(self
            .call(self.gateway().commit_files(self.slug(), commit))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailOn, MemoryGateway};
    use crate::workspace::tests::workspace;

    fn seeded() -> MemoryGateway {
        let gateway = MemoryGateway::new();
        gateway.seed_branch(
            "main",
            &[
                ("README.md", "old"),
                ("a.txt", "alpha"),
                ("src/lib.rs", "pub fn x() {}"),
                ("src/bin/tool.rs", "fn main() {}"),
            ],
        );
        gateway
    }

    #[tokio::test]
    async fn test_list_files_only_blobs() {
        let gateway = seeded();
        let ws = workspace(&gateway);

        let files = ws.list_files(true).await.unwrap();
        assert_eq!(
            files,
            vec!["README.md", "a.txt", "src/bin/tool.rs", "src/lib.rs"]
        );
    }

    #[tokio::test]
    async fn test_list_files_with_directories() {
        let gateway = seeded();
        let ws = workspace(&gateway);

        let all = ws.list_files(false).await.unwrap();
        assert!(all.contains(&"src".to_string()));
        assert!(all.contains(&"src/bin".to_string()));
        assert_eq!(all.len(), 6);
    }

    #[tokio::test]
    async fn test_list_files_missing_branch_is_not_found() {
        let gateway = MemoryGateway::new();
        let ws = workspace(&gateway);

        assert!(ws.list_files(true).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_directory() {
        let gateway = seeded();
        let ws = workspace(&gateway);

        let listing = ws.list_directory("src").await.unwrap();
        assert_eq!(listing.directories, vec!["src/bin"]);
        assert_eq!(listing.files, vec!["src/lib.rs"]);

        let root = ws.list_directory("").await.unwrap();
        assert_eq!(root.directories, vec!["src"]);
        assert_eq!(root.files, vec!["README.md", "a.txt"]);
    }

    #[tokio::test]
    async fn test_list_directory_absent_is_empty() {
        let gateway = seeded();
        let ws = workspace(&gateway);

        let listing = ws.list_directory("does/not/exist").await.unwrap();
        assert!(listing.is_empty());
    }

    #[tokio::test]
    async fn test_list_directory_propagates_transport_errors() {
        let gateway = seeded();
        gateway.fail_on(FailOn::GetContent(GatewayError::RateLimited));
        let ws = workspace(&gateway);

        assert!(matches!(
            ws.list_directory("src").await,
            Err(Error::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_read_file() {
        let gateway = seeded();
        let ws = workspace(&gateway);

        assert_eq!(ws.read_file("README.md").await.unwrap(), b"old");
        assert!(ws.read_file("missing.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_read_file_at_commit_ignores_active_branch() {
        let gateway = seeded();
        let first = gateway.branch_head("main").unwrap();
        gateway.seed_branch("main", &[("README.md", "rewritten")]);
        let ws = workspace(&gateway);

        assert_eq!(
            ws.read_file_at_commit("README.md", &first).await.unwrap(),
            b"old"
        );
        assert_eq!(ws.read_file("README.md").await.unwrap(), b"rewritten");
    }

    #[tokio::test]
    async fn test_read_files_isolates_missing_paths() {
        let gateway = seeded();
        let ws = workspace(&gateway);

        let results = ws.read_files(&["a.txt", "missing.txt", "a.txt"]).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "a.txt");
        assert_eq!(results[0].content(), Some(&b"alpha"[..]));
        assert_eq!(results[1].path, "missing.txt");
        assert_eq!(results[1].status, ReadStatus::NotFound);
    }

    #[test]
    fn test_file_read_serializes_as_text() {
        let read = FileRead {
            path: "a.txt".to_string(),
            status: ReadStatus::Found {
                content: b"alpha".to_vec(),
            },
        };
        let json = serde_json::to_value(&read).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "path": "a.txt",
                "status": "found",
                "encoding": "utf-8",
                "content": "alpha"
            })
        );

        let missing = FileRead {
            path: "b".to_string(),
            status: ReadStatus::NotFound,
        };
        assert_eq!(
            serde_json::to_value(&missing).unwrap(),
            serde_json::json!({"path": "b", "status": "not_found"})
        );
    }

    #[test]
    fn test_binary_file_read_serializes_as_base64() {
        let read = FileRead {
            path: "logo.png".to_string(),
            status: ReadStatus::Found {
                content: vec![0xff, 0x00, 0xfe],
            },
        };
        let json = serde_json::to_value(&read).unwrap();
        assert_eq!(json["encoding"], "base64");
        assert_eq!(json["content"], "/wD+");

        let encoded = json["content"].as_str().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded, vec![0xff, 0x00, 0xfe]);

        let failed = FileRead {
            path: "c".to_string(),
            status: ReadStatus::Failed {
                error: "boom".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"path": "c", "status": "failed", "error": "boom"})
        );
    }

    #[test]
    fn test_decode_wrapped_base64() {
        let decoded = decode_content("x", "aGVs\nbG8=\n", "base64").unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn test_decode_rejects_unknown_encoding() {
        assert!(matches!(
            decode_content("big.bin", "", "none"),
            Err(Error::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_commits_and_commit_files() {
        let gateway = seeded();
        let ws = workspace(&gateway);
        let head = gateway.branch_head("main").unwrap();

        let commits = ws.list_commits(None).await.unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].sha, head);

        let files = ws.commit_files(&head).await.unwrap();
        assert_eq!(files.len(), 4);

        assert!(ws.commit_files("nope").await.unwrap_err().is_not_found());
        assert!(ws.list_commits(Some("nope")).await.unwrap_err().is_not_found());
    }
}
