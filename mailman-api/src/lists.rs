//! List and membership operations exposed over REST.
//!
//! Thin layer over [`ListEngine`]: it decides when a list is locked, when it
//! is saved, and how membership outcomes read to the caller.

use std::sync::Arc;

use serde::ser::{Serialize, SerializeSeq, Serializer};
use tracing::info;

use crate::engine::{
    EngineError, ListEngine, MemberDesc, RemovalNotice, SubscribeOutcome, UnsubscribeOutcome,
};

/// One row of the list index.
///
/// Serializes as the bare name when no extra field was requested, otherwise
/// as `[name, description?, private?]` with only the requested fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSummary {
    pub name: String,
    pub description: Option<String>,
    pub private: Option<bool>,
}

impl Serialize for ListSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.description.is_none() && self.private.is_none() {
            return serializer.serialize_str(&self.name);
        }

        let len = 1 + self.description.is_some() as usize + self.private.is_some() as usize;
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.name)?;
        if let Some(description) = &self.description {
            seq.serialize_element(description)?;
        }
        if let Some(private) = &self.private {
            seq.serialize_element(private)?;
        }
        seq.end()
    }
}

/// Options for [`ListService::list_all`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Only lists this address is subscribed to.
    pub address: Option<String>,
    pub include_description: bool,
    pub include_private: bool,
}

/// Message shown to the caller for a subscribe outcome.
pub fn subscribe_message(outcome: SubscribeOutcome) -> &'static str {
    match outcome {
        SubscribeOutcome::Subscribed => "Subscription succeeded!",
        SubscribeOutcome::NeedsConfirmation => {
            "A confirmation was sent to you, please check your email."
        }
        SubscribeOutcome::NeedsApproval => {
            "Your subscription was sent successfully! Please wait for the list's admin approval."
        }
        SubscribeOutcome::AlreadyMember => "You are already a member of this list.",
        SubscribeOutcome::Banned => "You are banned from this list!",
        SubscribeOutcome::InvalidAddress => "Invalid address.",
    }
}

/// Message shown to the caller for an unsubscribe outcome.
pub fn unsubscribe_message(outcome: UnsubscribeOutcome) -> &'static str {
    match outcome {
        UnsubscribeOutcome::Unsubscribed => "Unsubscription succeeded!",
        UnsubscribeOutcome::NotAMember => "Not a member.",
    }
}

#[derive(Clone)]
pub struct ListService {
    engine: Arc<dyn ListEngine>,
}

impl ListService {
    pub fn new(engine: Arc<dyn ListEngine>) -> Self {
        Self { engine }
    }

    /// Every list known to the engine, optionally filtered by membership.
    pub async fn list_all(&self, filter: &ListFilter) -> Result<Vec<ListSummary>, EngineError> {
        let mut lists = Vec::new();

        for name in self.engine.list_names().await? {
            let mlist = self.engine.get_list(&name).await?;

            if let Some(address) = filter.address.as_deref() {
                if !mlist.has_member(address) {
                    continue;
                }
            }

            lists.push(ListSummary {
                name,
                description: filter.include_description.then_some(mlist.description),
                private: filter.include_private.then_some(mlist.archive_private),
            });
        }

        Ok(lists)
    }

    /// Add `member` to `listname`.
    ///
    /// The list is saved whatever the outcome; the lock is released when the
    /// guard goes out of scope.
    pub async fn subscribe(
        &self,
        listname: &str,
        member: MemberDesc,
    ) -> Result<SubscribeOutcome, EngineError> {
        let mut mlist = self.engine.lock_list(listname).await?;
        let address = member.address.clone();

        let outcome = mlist.add_member(member)?;
        mlist.save().await?;

        info!(listname = %mlist.name(), address = %address, outcome = ?outcome, "subscribe_handled");
        Ok(outcome)
    }

    /// Remove `address` from `listname`, acknowledging to the member only.
    pub async fn unsubscribe(
        &self,
        listname: &str,
        address: &str,
    ) -> Result<UnsubscribeOutcome, EngineError> {
        let mut mlist = self.engine.lock_list(listname).await?;
        let notice = RemovalNotice {
            admin_notif: false,
            userack: true,
        };

        let outcome = mlist.delete_member(address, notice)?;
        if outcome == UnsubscribeOutcome::Unsubscribed {
            mlist.save().await?;
        }

        info!(listname = %mlist.name(), address = %address, outcome = ?outcome, "unsubscribe_handled");
        Ok(outcome)
    }

    /// Member addresses of `listname`. Takes no lock.
    pub async fn members(&self, listname: &str) -> Result<Vec<String>, EngineError> {
        Ok(self.engine.get_list(listname).await?.members)
    }
}
