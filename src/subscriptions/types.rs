//! Subscription records and the snapshots that hold them.

use crate::query::{Query, QueryDescriptor};
use crate::types::{SubscriptionId, SubscriptionSetState, Timestamp, Version};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// One registered query against one object type.
///
/// Read-only. Two subscriptions are equal when their ids are.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subscription {
    id: SubscriptionId,
    created_at: Timestamp,
    updated_at: Timestamp,
    name: Option<String>,
    object_type: String,
    query_string: String,
}

impl Subscription {
    pub(crate) fn new(name: Option<String>, descriptor: &QueryDescriptor) -> Self {
        let now = Timestamp::now();
        Self {
            id: SubscriptionId::generate(),
            created_at: now,
            updated_at: now,
            name,
            object_type: descriptor.object_type.clone(),
            query_string: descriptor.query_string.clone(),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Changes only when a named subscription's query is replaced.
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn descriptor(&self) -> QueryDescriptor {
        QueryDescriptor {
            object_type: self.object_type.clone(),
            query_string: self.query_string.clone(),
        }
    }

    pub(crate) fn matches(&self, descriptor: &QueryDescriptor) -> bool {
        self.object_type == descriptor.object_type && self.query_string == descriptor.query_string
    }

    /// Point this subscription at a new query, keeping its id and creation time.
    pub(crate) fn replace_query(&mut self, descriptor: &QueryDescriptor) {
        self.object_type = descriptor.object_type.clone();
        self.query_string = descriptor.query_string.clone();
        self.updated_at = Timestamp::after(self.updated_at);
    }

    /// Field-by-field comparison, unlike `==` which only looks at ids.
    pub(crate) fn same_content(&self, other: &Subscription) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.updated_at == other.updated_at
            && self.object_type == other.object_type
            && self.query_string == other.query_string
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscription {}

impl Hash for Subscription {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Options for [`MutableSubscriptionSet::add`](super::MutableSubscriptionSet::add).
#[derive(Clone, Debug, Default)]
pub struct SubscriptionOptions {
    /// Label, unique within a set.
    pub name: Option<String>,

    /// Fail instead of replacing the query of an existing subscription
    /// with the same name.
    pub throw_on_update: bool,
}

impl SubscriptionOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            throw_on_update: false,
        }
    }

    pub fn throw_on_update(mut self) -> Self {
        self.throw_on_update = true;
        self
    }
}

/// Synchronization status of the latest version, as persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionStatus {
    Pending,
    Complete,
    Error(String),
}

impl VersionStatus {
    pub fn state(&self) -> SubscriptionSetState {
        match self {
            VersionStatus::Pending => SubscriptionSetState::Pending,
            VersionStatus::Complete => SubscriptionSetState::Complete,
            VersionStatus::Error(_) => SubscriptionSetState::Error,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            VersionStatus::Error(message) => Some(message.as_str()),
            _ => None,
        }
    }
}

/// Immutable contents of one committed version.
#[derive(Debug, Default)]
pub(crate) struct SetSnapshot {
    pub version: Version,
    pub subscriptions: Vec<Subscription>,
}

impl SetSnapshot {
    pub fn new(version: Version, subscriptions: Vec<Subscription>) -> Self {
        Self {
            version,
            subscriptions,
        }
    }
}

pub(crate) fn find_by_name<'a>(subs: &'a [Subscription], name: &str) -> Option<&'a Subscription> {
    subs.iter().find(|s| s.name() == Some(name))
}

pub(crate) fn find_by_query<'a>(subs: &'a [Subscription], query: &Query) -> Option<&'a Subscription> {
    let descriptor = query.descriptor();
    subs.iter().find(|s| s.matches(&descriptor))
}
