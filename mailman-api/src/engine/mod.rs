//! Mailing-list engine contract.
//!
//! The engine is the system of record for list configuration, membership
//! and the inbound mail queue. The REST layer only talks to it through the
//! [`ListEngine`] and [`LockedList`] traits defined here.
//!
//! ## Locking
//!
//! ```text
//! lock_list() → Box<dyn LockedList> → add/delete member → save() → drop (unlock)
//! ```
//!
//! Dropping the boxed guard releases the list lock, so every exit path of a
//! handler (early return, `?`, panic unwinding) unlocks exactly once.

pub mod address;
pub mod local;

use async_trait::async_trait;
use thiserror::Error;

pub use local::LocalEngine;

/// Errors the engine can raise outside of the expected membership outcomes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no such list: {0}")]
    NoSuchList(String),

    #[error("corrupt list record for {list}: {source}")]
    CorruptList {
        list: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("engine i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue entry json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read-only view of a mailing list, taken without a lock.
#[derive(Debug, Clone)]
pub struct MailingList {
    pub name: String,
    pub description: String,
    /// Whether the list archive is private.
    pub archive_private: bool,
    /// Address that posts to the list are sent to.
    pub posting_address: String,
    pub members: Vec<String>,
}

impl MailingList {
    /// Membership test, ignoring ASCII case like the engine does.
    pub fn has_member(&self, address: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.eq_ignore_ascii_case(address))
    }
}

/// A prospective member handed to [`LockedList::add_member`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDesc {
    pub address: String,
    pub fullname: Option<String>,
    /// Receive periodic digests instead of every post.
    pub digest: bool,
}

/// Result of asking the engine to add a member.
///
/// The engine checks conditions in a fixed order: address validity, the ban
/// list, existing membership, then the list's subscribe policy. Only the
/// first condition that holds is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    /// Malformed or hostile address.
    InvalidAddress,
    Banned,
    AlreadyMember,
    NeedsConfirmation,
    NeedsApproval,
}

/// Result of asking the engine to remove a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotAMember,
}

/// Notification flags for a member removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalNotice {
    /// Notify the list administrators.
    pub admin_notif: bool,
    /// Send the removed member an acknowledgement.
    pub userack: bool,
}

/// A list held under the engine's lock.
///
/// Implementations release the lock when dropped.
#[async_trait]
pub trait LockedList: Send {
    fn name(&self) -> &str;

    fn add_member(&mut self, member: MemberDesc) -> Result<SubscribeOutcome, EngineError>;

    fn delete_member(
        &mut self,
        address: &str,
        notice: RemovalNotice,
    ) -> Result<UnsubscribeOutcome, EngineError>;

    /// Persist pending changes.
    async fn save(&mut self) -> Result<(), EngineError>;
}

/// Operations the REST layer needs from the mailing-list engine.
#[async_trait]
pub trait ListEngine: Send + Sync {
    /// Names of every list known to the engine.
    async fn list_names(&self) -> Result<Vec<String>, EngineError>;

    /// Open a list without locking it.
    async fn get_list(&self, name: &str) -> Result<MailingList, EngineError>;

    /// Open a list for mutation. The lock is held until the guard is dropped.
    async fn lock_list(&self, name: &str) -> Result<Box<dyn LockedList>, EngineError>;

    /// Hand a raw RFC 5322 message to the list's inbound queue.
    async fn inject(&self, listname: &str, message: &[u8]) -> Result<(), EngineError>;
}
