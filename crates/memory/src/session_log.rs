//! Per-identity transcript persistence: one JSONL file per identity under the
//! session log directory.
//!
//! This is separate from [`MemoryStore`](crate::MemoryStore).  Memory folds old
//! turns into a summary; the log keeps every completed turn verbatim so that
//! the raw history stays auditable.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::conversation::ConversationTurn;

// ── Identity naming ─────────────────────────────────────────────────────────

/// File-system safe name for an identity: ASCII alphanumerics, `-` and `_`
/// kept (at most 32 of them), everything else replaced by `_`, followed by a
/// short hash of the full identity so distinct identities never collide.
pub fn identity_slug(identity: &str) -> String {
    let readable: String = identity
        .chars()
        .take(32)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let digest = Sha256::digest(identity.as_bytes());
    let suffix: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    if readable.is_empty() {
        suffix
    } else {
        format!("{readable}-{suffix}")
    }
}

// ── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub identity: String,
    #[serde(flatten)]
    pub turn: ConversationTurn,
}

// ── Log ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionLog {
    dir: PathBuf,
}

impl SessionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", identity_slug(identity)))
    }

    /// Append one turn.  Creates the directory and file when missing.
    pub async fn append(&self, identity: &str, turn: &ConversationTurn) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create session log dir {}", self.dir.display()))?;

        let record = SessionRecord {
            identity: identity.to_string(),
            turn: turn.clone(),
        };
        let mut line = serde_json::to_string(&record).context("serialize session record")?;
        line.push('\n');

        let path = self.path_for(identity);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("open session log {}", path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Up to `max_turns` most recent turns, oldest first.  Unreadable lines
    /// are skipped; a missing file is an empty log.
    pub async fn load_recent(&self, identity: &str, max_turns: usize) -> Result<Vec<ConversationTurn>> {
        let path = self.path_for(identity);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)
            .await
            .with_context(|| format!("read session log {}", path.display()))?;

        let mut turns: Vec<ConversationTurn> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| serde_json::from_str::<SessionRecord>(line).ok())
            .map(|record| record.turn)
            .collect();

        if turns.len() > max_turns {
            turns.drain(..turns.len() - max_turns);
        }
        Ok(turns)
    }

    /// Delete an identity's log.  Returns whether a file was removed.
    pub async fn clear(&self, identity: &str) -> Result<bool> {
        let path = self.path_for(identity);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(false);
        }
        fs::remove_file(&path)
            .await
            .with_context(|| format!("remove session log {}", path.display()))?;
        Ok(true)
    }

    /// Copy an identity's log to `dest`.
    pub async fn export(&self, identity: &str, dest: &Path) -> Result<()> {
        let path = self.path_for(identity);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            anyhow::bail!("no session log for {identity} ({} does not exist)", path.display());
        }
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(&path, dest)
            .await
            .with_context(|| format!("copy {} -> {}", path.display(), dest.display()))?;
        Ok(())
    }

    /// Identities that have a log on disk, read from the first record of
    /// each file.
    pub async fn identities(&self) -> Result<Vec<String>> {
        let mut identities = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(identities),
            Err(err) => return Err(err).context("list session logs"),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let raw = fs::read_to_string(&path).await.unwrap_or_default();
            if let Some(record) = raw
                .lines()
                .find_map(|line| serde_json::from_str::<SessionRecord>(line.trim()).ok())
            {
                identities.push(record.identity);
            }
        }
        identities.sort();
        identities.dedup();
        Ok(identities)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_safe_and_distinct() {
        let a = identity_slug("alice");
        assert!(a.starts_with("alice-"));
        assert_eq!(a.len(), "alice-".len() + 8);

        let weird = identity_slug("../../etc/passwd");
        assert!(!weird.contains('/'));
        assert!(!weird.contains('.'));

        assert_ne!(identity_slug("a b"), identity_slug("a_b"));
        assert_eq!(identity_slug("alice"), identity_slug("alice"));
        assert_eq!(identity_slug("").len(), 8);
    }

    #[tokio::test]
    async fn append_and_load_recent() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path().join("sessions"));

        for i in 0..5 {
            log.append("alice", &ConversationTurn::new(format!("q{i}"), format!("a{i}")))
                .await
                .unwrap();
        }
        log.append("bob", &ConversationTurn::new("hi", "hello")).await.unwrap();

        let recent = log.load_recent("alice", 3).await.unwrap();
        let queries: Vec<_> = recent.iter().map(|t| t.query.as_str()).collect();
        assert_eq!(queries, ["q2", "q3", "q4"]);
        assert_eq!(log.load_recent("bob", 10).await.unwrap().len(), 1);
        assert!(log.load_recent("nobody", 10).await.unwrap().is_empty());
        assert_eq!(log.identities().await.unwrap(), ["alice", "bob"]);
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path());
        log.append("x", &ConversationTurn::new("q", "a")).await.unwrap();
        let path = log.path_for("x");
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("not json\n\n");
        std::fs::write(&path, raw).unwrap();
        log.append("x", &ConversationTurn::new("q2", "a2")).await.unwrap();

        assert_eq!(log.load_recent("x", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clear_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let log = SessionLog::new(dir.path().join("logs"));
        assert!(log.export("alice", &dir.path().join("out.jsonl")).await.is_err());

        log.append("alice", &ConversationTurn::new("q", "a")).await.unwrap();
        let dest = dir.path().join("export").join("alice.jsonl");
        log.export("alice", &dest).await.unwrap();
        assert!(std::fs::read_to_string(&dest).unwrap().contains("\"identity\":\"alice\""));

        assert!(log.clear("alice").await.unwrap());
        assert!(!log.clear("alice").await.unwrap());
        assert!(log.load_recent("alice", 5).await.unwrap().is_empty());
    }
}
