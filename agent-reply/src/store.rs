use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::envelope::{backup_file_name, reply_id_from_file_name, PersistedReply, ReplyEnvelope};
use crate::error::ReplyError;

/// Writes `envelope` to `dir` as a new backup file, atomically (temp file +
/// rename) and `0600`-permissioned (§4.5). A no-op if a file for this
/// `reply_id` already exists — the suffix-match "already present" rule.
pub async fn persist(dir: &Path, envelope: &ReplyEnvelope) -> Result<(), ReplyError> {
    if already_present(dir, envelope.reply_id).await? {
        debug!(target: "durability", reply_id = %envelope.reply_id, "reply already persisted, skipping rewrite");
        return Ok(());
    }

    tokio::fs::create_dir_all(dir).await?;

    let name = backup_file_name(envelope.reply_id, now());
    let path = dir.join(&name);
    let tmp_path = dir.join(format!(".{name}.tmp"));

    let body = serde_json::to_vec(&envelope.to_persisted())?;
    tokio::fs::write(&tmp_path, &body).await?;
    set_owner_only(&tmp_path).await?;
    tokio::fs::rename(&tmp_path, &path).await?;

    debug!(target: "durability", reply_id = %envelope.reply_id, file = %name, "persisted failed reply");
    Ok(())
}

/// Deletes a backup file by name, tolerating it already being gone — the
/// durability loop and the worker that loaded it may race to delete the
/// same file (§9: "disk contention").
pub async fn delete_backup(dir: &Path, file_name: &str) {
    match tokio::fs::remove_file(dir.join(file_name)).await {
        Ok(()) => debug!(target: "durability", file = %file_name, "deleted acked backup file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(target: "durability", file = %file_name, "failed to delete backup file: {e}"),
    }
}

/// Lists backup file names in chronological order (lexicographic order on
/// the `YYYY-MM-DDTHH-mm-ss_<uuid>` name equals chronological order, §4.5).
/// Missing directory is treated as empty, not an error — the durability
/// loop may run before any reply has ever been persisted.
pub async fn list_sorted(dir: &Path) -> Result<Vec<String>, ReplyError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Reads and decodes one backup file. Returns `Ok(None)` if the file
/// vanished between listing and reading (§9 disk contention), which the
/// durability loop treats as success rather than an error.
pub async fn load(dir: &Path, file_name: &str) -> Result<Option<PersistedReply>, ReplyError> {
    let path = dir.join(file_name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn already_present(dir: &Path, reply_id: Uuid) -> Result<bool, ReplyError> {
    Ok(list_sorted(dir).await?.iter().any(|name| reply_id_from_file_name(name) == Some(reply_id)))
}

#[cfg(unix)]
async fn set_owner_only(path: &Path) -> Result<(), ReplyError> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_owner_only(_path: &Path) -> Result<(), ReplyError> {
    Ok(())
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// `<data_store_root>/<short_instance_id>/replies-mgs/`. Delegates to
/// `agent_core::DurabilityConfig::failed_reply_dir` so the path is defined
/// in exactly one place.
pub fn failed_reply_dir(data_store_root: &Path, short_instance_id: &str) -> PathBuf {
    data_store_root.join(short_instance_id).join("replies-mgs")
}

#[cfg(test)]
mod tests {
    use agent_core::{DocumentResult, DocumentStatus, ResultType};
    use tempfile::tempdir;

    use super::*;

    fn sample_envelope() -> ReplyEnvelope {
        let result = DocumentResult::builder().message_id("msg-1".to_string()).result_type(ResultType::AgentComplete).status(DocumentStatus::Success).build();
        ReplyEnvelope::new(result, Uuid::new_v4())
    }

    #[tokio::test]
    async fn persist_then_list_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let envelope = sample_envelope();
        persist(dir.path(), &envelope).await.unwrap();

        let names = list_sorted(dir.path()).await.unwrap();
        assert_eq!(names.len(), 1);

        let loaded = load(dir.path(), &names[0]).await.unwrap().unwrap();
        assert_eq!(loaded.reply_id, envelope.reply_id);
    }

    #[tokio::test]
    async fn persisting_twice_is_a_noop() {
        let dir = tempdir().unwrap();
        let envelope = sample_envelope();
        persist(dir.path(), &envelope).await.unwrap();
        persist(dir.path(), &envelope).await.unwrap();

        let names = list_sorted(dir.path()).await.unwrap();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn delete_backup_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        delete_backup(dir.path(), "2026-01-01T00-00-00_does-not-exist").await;
    }

    #[tokio::test]
    async fn list_sorted_on_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(list_sorted(&missing).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_vanished_file_returns_none() {
        let dir = tempdir().unwrap();
        assert!(load(dir.path(), "2026-01-01T00-00-00_does-not-exist").await.unwrap().is_none());
    }
}
