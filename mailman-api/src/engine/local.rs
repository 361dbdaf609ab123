//! Directory-backed engine.
//!
//! Lists are JSON records stored as `<lists_dir>/<name>.json`. Injected posts
//! go to the inbound [`Spool`]. Locks are in-process: one async mutex per list,
//! held by the [`LockedList`] guard until it is dropped.
//!
//! The engine only *reports* membership conditions. Confirmation mail,
//! moderation queues and digests are run by whatever consumes these records.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::address;
use super::{
    EngineError, ListEngine, LockedList, MailingList, MemberDesc, RemovalNotice,
    SubscribeOutcome, UnsubscribeOutcome,
};
use crate::queue::Spool;

const RECORD_EXTENSION: &str = "json";

// =============================================================================
// List Records
// =============================================================================

/// How new subscriptions are admitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribePolicy {
    #[default]
    Open,
    Confirm,
    Approve,
    ConfirmAndApprove,
}

/// A subscribed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
    #[serde(default)]
    pub digest: bool,
}

impl From<MemberDesc> for MemberRecord {
    fn from(desc: MemberDesc) -> Self {
        Self {
            address: desc.address,
            fullname: desc.fullname,
            digest: desc.digest,
        }
    }
}

/// On-disk list record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRecord {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub archive_private: bool,
    /// Defaults to `<name>@<default domain>` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posting_address: Option<String>,
    #[serde(default)]
    pub subscribe_policy: SubscribePolicy,
    /// Exact addresses, or regular expressions when the entry starts with `^`.
    #[serde(default)]
    pub ban_list: Vec<String>,
    #[serde(default)]
    pub members: Vec<MemberRecord>,
}

impl ListRecord {
    fn member_index(&self, address: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|m| m.address.eq_ignore_ascii_case(address))
    }

    fn is_banned(&self, address: &str) -> bool {
        self.ban_list.iter().any(|entry| {
            if entry.starts_with('^') {
                match RegexBuilder::new(entry).case_insensitive(true).build() {
                    Ok(re) => re.is_match(address),
                    Err(e) => {
                        warn!(pattern = %entry, error = %e, "ban_pattern_invalid");
                        false
                    }
                }
            } else {
                entry.eq_ignore_ascii_case(address)
            }
        })
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Engine over a directory of list records and an inbound spool directory.
pub struct LocalEngine {
    lists_dir: PathBuf,
    default_domain: String,
    spool: Spool,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LocalEngine {
    pub fn new(
        lists_dir: impl Into<PathBuf>,
        inqueue_dir: impl Into<PathBuf>,
        default_domain: impl Into<String>,
    ) -> Self {
        Self {
            lists_dir: lists_dir.into(),
            default_domain: default_domain.into(),
            spool: Spool::new(inqueue_dir),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn spool(&self) -> &Spool {
        &self.spool
    }

    /// Write a list record, creating or replacing the list.
    pub async fn create_list(&self, name: &str, record: &ListRecord) -> Result<(), EngineError> {
        let name = normalize_name(name)?;
        fs::create_dir_all(&self.lists_dir).await?;
        write_record(&self.record_path(&name), record).await?;
        info!(listname = %name, "list_created");
        Ok(())
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.lists_dir.join(format!("{}.{}", name, RECORD_EXTENSION))
    }

    async fn read_record(&self, name: &str) -> Result<ListRecord, EngineError> {
        let raw = match fs::read(self.record_path(name)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::NoSuchList(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&raw).map_err(|source| EngineError::CorruptList {
            list: name.to_string(),
            source,
        })
    }

    fn list_lock(&self, name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[async_trait]
impl ListEngine for LocalEngine {
    async fn list_names(&self) -> Result<Vec<String>, EngineError> {
        let mut dir = match fs::read_dir(&self.lists_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(lists_dir = %self.lists_dir.display(), "lists_dir_missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if normalize_name(stem).ok().as_deref() == Some(stem) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();

        Ok(names)
    }

    async fn get_list(&self, name: &str) -> Result<MailingList, EngineError> {
        let name = normalize_name(name)?;
        let record = self.read_record(&name).await?;

        let posting_address = record
            .posting_address
            .unwrap_or_else(|| format!("{}@{}", name, self.default_domain));

        Ok(MailingList {
            description: record.description,
            archive_private: record.archive_private,
            posting_address,
            members: record.members.into_iter().map(|m| m.address).collect(),
            name,
        })
    }

    async fn lock_list(&self, name: &str) -> Result<Box<dyn LockedList>, EngineError> {
        let name = normalize_name(name)?;

        // Unknown names never get a lock entry.
        if !fs::try_exists(self.record_path(&name)).await? {
            return Err(EngineError::NoSuchList(name));
        }

        let guard = self.list_lock(&name).lock_owned().await;
        debug!(listname = %name, "list_locked");

        // On error the guard drops here and the lock is released.
        let record = self.read_record(&name).await?;

        Ok(Box::new(LocalLockedList {
            path: self.record_path(&name),
            name,
            record,
            dirty: false,
            _guard: guard,
        }))
    }

    async fn inject(&self, listname: &str, message: &[u8]) -> Result<(), EngineError> {
        let name = normalize_name(listname)?;
        self.spool.enqueue(&name, message).await?;
        Ok(())
    }
}

// =============================================================================
// Locked List
// =============================================================================

struct LocalLockedList {
    name: String,
    path: PathBuf,
    record: ListRecord,
    dirty: bool,
    _guard: OwnedMutexGuard<()>,
}

impl LocalLockedList {
    /// First condition that blocks `address` from joining, in engine order.
    fn check_subscription(&self, address: &str) -> SubscribeOutcome {
        if let Err(problem) = address::validate(address) {
            debug!(listname = %self.name, problem = ?problem, "member_address_rejected");
            return SubscribeOutcome::InvalidAddress;
        }
        if self.record.is_banned(address) {
            return SubscribeOutcome::Banned;
        }
        if self.record.member_index(address).is_some() {
            return SubscribeOutcome::AlreadyMember;
        }

        match self.record.subscribe_policy {
            SubscribePolicy::Open => SubscribeOutcome::Subscribed,
            SubscribePolicy::Confirm | SubscribePolicy::ConfirmAndApprove => {
                SubscribeOutcome::NeedsConfirmation
            }
            SubscribePolicy::Approve => SubscribeOutcome::NeedsApproval,
        }
    }
}

#[async_trait]
impl LockedList for LocalLockedList {
    fn name(&self) -> &str {
        &self.name
    }

    fn add_member(&mut self, member: MemberDesc) -> Result<SubscribeOutcome, EngineError> {
        let outcome = self.check_subscription(&member.address);

        if outcome == SubscribeOutcome::Subscribed {
            info!(
                listname = %self.name,
                address = %member.address,
                digest = member.digest,
                "member_added"
            );
            self.record.members.push(member.into());
            self.dirty = true;
        }

        Ok(outcome)
    }

    fn delete_member(
        &mut self,
        address: &str,
        notice: RemovalNotice,
    ) -> Result<UnsubscribeOutcome, EngineError> {
        let index = match self.record.member_index(address) {
            Some(index) => index,
            None => return Ok(UnsubscribeOutcome::NotAMember),
        };

        let removed = self.record.members.remove(index);
        self.dirty = true;

        info!(
            listname = %self.name,
            address = %removed.address,
            admin_notif = notice.admin_notif,
            userack = notice.userack,
            "member_removed"
        );

        Ok(UnsubscribeOutcome::Unsubscribed)
    }

    async fn save(&mut self) -> Result<(), EngineError> {
        if !self.dirty {
            return Ok(());
        }
        write_record(&self.path, &self.record).await?;
        self.dirty = false;
        debug!(listname = %self.name, "list_saved");
        Ok(())
    }
}

impl Drop for LocalLockedList {
    fn drop(&mut self) {
        debug!(listname = %self.name, "list_unlocked");
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Lowercase a list name and reject anything unsafe as a file name.
fn normalize_name(name: &str) -> Result<String, EngineError> {
    let lowered = name.to_ascii_lowercase();
    let valid = !lowered.is_empty()
        && !lowered.starts_with('.')
        && lowered
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(lowered)
    } else {
        Err(EngineError::NoSuchList(name.to_string()))
    }
}

/// Replace a record atomically.
async fn write_record(path: &Path, record: &ListRecord) -> Result<(), EngineError> {
    let body = serde_json::to_vec_pretty(record)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &body).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(address: &str) -> MemberDesc {
        MemberDesc {
            address: address.to_string(),
            fullname: None,
            digest: false,
        }
    }

    async fn engine_with(record: ListRecord) -> (tempfile::TempDir, LocalEngine) {
        let dir = tempfile::tempdir().unwrap();
        let engine = LocalEngine::new(
            dir.path().join("lists"),
            dir.path().join("qfiles/in"),
            "example.com",
        );
        engine.create_list("dev", &record).await.unwrap();
        (dir, engine)
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Dev-List").unwrap(), "dev-list");
        assert!(normalize_name("").is_err());
        assert!(normalize_name("../etc").is_err());
        assert!(normalize_name(".hidden").is_err());
        assert!(normalize_name("a/b").is_err());
    }

    #[test]
    fn test_is_banned_exact_and_pattern() {
        let record = ListRecord {
            ban_list: vec![
                "spammer@example.com".to_string(),
                r"^.*@bad\.example$".to_string(),
            ],
            ..Default::default()
        };
        assert!(record.is_banned("Spammer@Example.com"));
        assert!(record.is_banned("anyone@bad.example"));
        assert!(!record.is_banned("friend@example.com"));
    }

    #[tokio::test]
    async fn test_get_list_defaults_posting_address() {
        let (_dir, engine) = engine_with(ListRecord::default()).await;
        let list = engine.get_list("DEV").await.unwrap();
        assert_eq!(list.name, "dev");
        assert_eq!(list.posting_address, "dev@example.com");
    }

    #[tokio::test]
    async fn test_get_list_missing() {
        let (_dir, engine) = engine_with(ListRecord::default()).await;
        let err = engine.get_list("nope").await.unwrap_err();
        assert!(matches!(err, EngineError::NoSuchList(_)));
    }

    #[tokio::test]
    async fn test_list_names_sorted() {
        let (_dir, engine) = engine_with(ListRecord::default()).await;
        engine
            .create_list("announce", &ListRecord::default())
            .await
            .unwrap();
        assert_eq!(engine.list_names().await.unwrap(), vec!["announce", "dev"]);
    }

    #[tokio::test]
    async fn test_add_member_persists_after_save() {
        let (_dir, engine) = engine_with(ListRecord::default()).await;

        let mut list = engine.lock_list("dev").await.unwrap();
        let outcome = list.add_member(member("alice@example.com")).unwrap();
        assert_eq!(outcome, SubscribeOutcome::Subscribed);
        list.save().await.unwrap();
        drop(list);

        let list = engine.get_list("dev").await.unwrap();
        assert_eq!(list.members, vec!["alice@example.com"]);
    }

    #[tokio::test]
    async fn test_add_member_policy_outcomes() {
        let record = ListRecord {
            subscribe_policy: SubscribePolicy::Approve,
            ..Default::default()
        };
        let (_dir, engine) = engine_with(record).await;

        let mut list = engine.lock_list("dev").await.unwrap();
        assert_eq!(
            list.add_member(member("new@example.com")).unwrap(),
            SubscribeOutcome::NeedsApproval
        );

        let record = ListRecord {
            subscribe_policy: SubscribePolicy::ConfirmAndApprove,
            ..Default::default()
        };
        engine.create_list("confirmed", &record).await.unwrap();
        let mut list = engine.lock_list("confirmed").await.unwrap();
        assert_eq!(
            list.add_member(member("new@example.com")).unwrap(),
            SubscribeOutcome::NeedsConfirmation
        );
    }

    #[tokio::test]
    async fn test_add_member_checks_before_policy() {
        let record = ListRecord {
            subscribe_policy: SubscribePolicy::Confirm,
            ban_list: vec!["banned@example.com".to_string()],
            members: vec![MemberRecord {
                address: "alice@example.com".to_string(),
                fullname: None,
                digest: false,
            }],
            ..Default::default()
        };
        let (_dir, engine) = engine_with(record).await;

        let mut list = engine.lock_list("dev").await.unwrap();
        assert_eq!(
            list.add_member(member("not-an-address")).unwrap(),
            SubscribeOutcome::InvalidAddress
        );
        assert_eq!(
            list.add_member(member("")).unwrap(),
            SubscribeOutcome::InvalidAddress
        );
        assert_eq!(
            list.add_member(member("banned@example.com")).unwrap(),
            SubscribeOutcome::Banned
        );
        assert_eq!(
            list.add_member(member("alice@example.com")).unwrap(),
            SubscribeOutcome::AlreadyMember
        );
    }

    #[tokio::test]
    async fn test_banned_member_reported_as_banned() {
        let record = ListRecord {
            ban_list: vec![r"^.*@example\.com$".to_string()],
            members: vec![MemberRecord {
                address: "alice@example.com".to_string(),
                fullname: None,
                digest: false,
            }],
            ..Default::default()
        };
        let (_dir, engine) = engine_with(record).await;

        let mut list = engine.lock_list("dev").await.unwrap();
        assert_eq!(
            list.add_member(member("alice@example.com")).unwrap(),
            SubscribeOutcome::Banned
        );
    }

    #[tokio::test]
    async fn test_delete_member() {
        let (_dir, engine) = engine_with(ListRecord::default()).await;
        let notice = RemovalNotice {
            admin_notif: false,
            userack: true,
        };

        let mut list = engine.lock_list("dev").await.unwrap();
        assert_eq!(
            list.delete_member("alice@example.com", notice).unwrap(),
            UnsubscribeOutcome::NotAMember
        );
        list.add_member(member("alice@example.com")).unwrap();
        assert_eq!(
            list.delete_member("alice@example.com", notice).unwrap(),
            UnsubscribeOutcome::Unsubscribed
        );
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let (_dir, engine) = engine_with(ListRecord::default()).await;

        let first = engine.lock_list("dev").await.unwrap();
        drop(first);

        let second = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            engine.lock_list("dev"),
        )
        .await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_lock_released_when_record_missing() {
        let (_dir, engine) = engine_with(ListRecord::default()).await;

        assert!(engine.lock_list("ghost").await.is_err());
        assert!(engine.list_lock("ghost").try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_lists_leave_no_lock_entries() {
        let (_dir, engine) = engine_with(ListRecord::default()).await;

        for i in 0..50 {
            let err = engine.lock_list(&format!("ghost{}", i)).await.err().unwrap();
            assert!(matches!(err, EngineError::NoSuchList(_)));
        }
        drop(engine.lock_list("dev").await.unwrap());

        let locks = engine.locks.lock().unwrap();
        assert_eq!(locks.len(), 1);
        assert!(locks.contains_key("dev"));
    }

    #[tokio::test]
    async fn test_inject_writes_spool_entry() {
        let (_dir, engine) = engine_with(ListRecord::default()).await;
        engine.inject("dev", b"Subject: x\r\n\r\nbody").await.unwrap();

        let pending = engine.spool().pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].listname, "dev");
    }
}
