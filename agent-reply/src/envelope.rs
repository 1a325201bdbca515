use serde::{Deserialize, Serialize};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use uuid::Uuid;

use agent_core::{DocumentResult, ReplyPolicy};

const FILENAME_TIMESTAMP: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]");

/// In-flight reply with its policy and, if reloaded from the failed-reply
/// directory, the backup file it came from (§3 data model). The reply UUID
/// is assigned once at enqueue time and is distinct from the message id
/// embedded in the `DocumentResult`.
#[derive(Debug, Clone)]
pub struct ReplyEnvelope {
    pub result: DocumentResult,
    pub reply_id: Uuid,
    pub policy: ReplyPolicy,
    pub backup_file: Option<String>,
    pub retry_count: u32,
}

impl ReplyEnvelope {
    pub fn new(result: DocumentResult, reply_id: Uuid) -> Self {
        let policy = result.result_type.policy();
        Self {
            result,
            reply_id,
            policy,
            backup_file: None,
            retry_count: 0,
        }
    }

    /// Reconstructs an envelope loaded from disk, carrying the file name so
    /// the worker can delete it on eventual ack (§4.5).
    pub fn from_persisted(persisted: PersistedReply, backup_file: String) -> Self {
        let policy = persisted.agent_result.result_type.policy();
        Self {
            result: persisted.agent_result,
            reply_id: persisted.reply_id,
            policy,
            backup_file: Some(backup_file),
            retry_count: persisted.retry_number,
        }
    }

    pub fn to_persisted(&self) -> PersistedReply {
        PersistedReply {
            agent_result: self.result.clone(),
            reply_id: self.reply_id,
            retry_number: self.retry_count,
        }
    }
}

/// On-disk record for a reply awaiting redelivery (§4.5): the JSON encoding
/// of `{AgentResult, ReplyId, RetryNumber}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedReply {
    #[serde(rename = "AgentResult")]
    pub agent_result: DocumentResult,
    #[serde(rename = "ReplyId")]
    pub reply_id: Uuid,
    #[serde(rename = "RetryNumber")]
    pub retry_number: u32,
}

/// Builds the `YYYY-MM-DDTHH-mm-ss_<reply-uuid>` file name whose
/// lexicographic order matches chronological order (§4.5).
pub fn backup_file_name(reply_id: Uuid, now: OffsetDateTime) -> String {
    format!("{}_{}", now.format(FILENAME_TIMESTAMP).expect("fixed format never fails"), reply_id)
}

/// Extracts the reply-id suffix from a backup file name, for the
/// suffix-match "already present on disk" check (§4.5).
pub fn reply_id_from_file_name(name: &str) -> Option<Uuid> {
    let (_, suffix) = name.rsplit_once('_')?;
    Uuid::parse_str(suffix).ok()
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn file_name_is_chronologically_sortable() {
        let id = Uuid::nil();
        let earlier = backup_file_name(id, datetime!(2026-01-01 00:00:00 UTC));
        let later = backup_file_name(id, datetime!(2026-01-02 00:00:00 UTC));
        let mut names = vec![later.clone(), earlier.clone()];
        names.sort();
        assert_eq!(names, vec![earlier, later]);
    }

    #[test]
    fn reply_id_round_trips_through_file_name() {
        let id = Uuid::new_v4();
        let name = backup_file_name(id, datetime!(2026-01-01 00:00:00 UTC));
        assert_eq!(reply_id_from_file_name(&name), Some(id));
    }

    #[test]
    fn malformed_file_name_yields_none() {
        assert_eq!(reply_id_from_file_name("not-a-valid-name"), None);
    }
}
