//! Write scope handed to `update` callbacks.

use super::types::{self, SetSnapshot, Subscription, SubscriptionOptions};
use crate::error::{Result, SyncError};
use crate::query::{validate, Query};
use crate::realm::Realm;
use crate::types::Version;
use std::ops::Index;

/// A private copy of the latest version, editable inside one `update`
/// callback.
///
/// Changes are invisible to every other reader until the callback returns
/// `Ok` and the scope commits. The borrow ends with the callback, so the
/// scope cannot be used afterwards.
#[derive(Debug)]
pub struct MutableSubscriptionSet<'a> {
    realm: &'a Realm,
    version: Version,
    subscriptions: Vec<Subscription>,
}

impl<'a> MutableSubscriptionSet<'a> {
    pub(crate) fn new(realm: &'a Realm, base: &SetSnapshot) -> Self {
        Self {
            realm,
            version: base.version,
            subscriptions: base.subscriptions.clone(),
        }
    }

    pub(crate) fn into_subscriptions(self) -> Vec<Subscription> {
        self.subscriptions
    }

    /// Subscribe to `query`.
    ///
    /// Without a name, an unnamed subscription on the same query is
    /// returned unchanged; otherwise a new one is appended. Sort
    /// descriptors are not part of the query. With a name:
    /// - no subscription has it: appended
    /// - it has the same query: returned unchanged
    /// - it has a different query: the query is replaced in place (same id,
    ///   later `updated_at`), or `DuplicateSubscriptionName` with
    ///   `throw_on_update`
    pub fn add(&mut self, query: &Query, options: SubscriptionOptions) -> Result<Subscription> {
        validate(query, self.realm.schema())?;
        let descriptor = query.descriptor();

        let name = match options.name {
            Some(name) => name,
            None => {
                if let Some(existing) = self
                    .subscriptions
                    .iter()
                    .find(|s| s.name().is_none() && s.matches(&descriptor))
                {
                    return Ok(existing.clone());
                }
                let subscription = Subscription::new(None, &descriptor);
                self.subscriptions.push(subscription.clone());
                return Ok(subscription);
            }
        };

        if let Some(existing) = self
            .subscriptions
            .iter_mut()
            .find(|s| s.name() == Some(name.as_str()))
        {
            if existing.matches(&descriptor) {
                return Ok(existing.clone());
            }
            if options.throw_on_update {
                return Err(SyncError::DuplicateSubscriptionName { name });
            }
            existing.replace_query(&descriptor);
            return Ok(existing.clone());
        }

        let subscription = Subscription::new(Some(name), &descriptor);
        self.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    /// Remove the first subscription on the same object type and filter.
    pub fn remove(&mut self, query: &Query) -> bool {
        let descriptor = query.descriptor();
        self.remove_first(|s| s.matches(&descriptor))
    }

    pub fn remove_by_name(&mut self, name: &str) -> bool {
        self.remove_first(|s| s.name() == Some(name))
    }

    pub fn remove_subscription(&mut self, subscription: &Subscription) -> bool {
        self.remove_first(|s| s.id() == subscription.id())
    }

    /// Returns how many were removed.
    pub fn remove_by_object_type(&mut self, object_type: &str) -> usize {
        self.remove_where(|s| s.object_type() == object_type)
    }

    pub fn remove_all(&mut self) -> usize {
        self.remove_where(|_| true)
    }

    /// Remove subscriptions added without a name, keeping named ones.
    pub fn remove_unnamed(&mut self) -> usize {
        self.remove_where(|s| s.name().is_none())
    }

    fn remove_first(&mut self, pred: impl Fn(&Subscription) -> bool) -> bool {
        match self.subscriptions.iter().position(pred) {
            Some(index) => {
                self.subscriptions.remove(index);
                true
            }
            None => false,
        }
    }

    fn remove_where(&mut self, pred: impl Fn(&Subscription) -> bool) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| !pred(s));
        before - self.subscriptions.len()
    }

    // --- Reads ---

    /// Version this scope was derived from. The commit gets the next one.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Subscription> {
        self.subscriptions.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Subscription> {
        self.subscriptions.iter()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Subscription> {
        types::find_by_name(&self.subscriptions, name)
    }

    pub fn find_by_query(&self, query: &Query) -> Option<&Subscription> {
        types::find_by_query(&self.subscriptions, query)
    }

    pub fn realm(&self) -> &'a Realm {
        self.realm
    }
}

impl Index<usize> for MutableSubscriptionSet<'_> {
    type Output = Subscription;

    fn index(&self, index: usize) -> &Subscription {
        &self.subscriptions[index]
    }
}

impl<'s> IntoIterator for &'s MutableSubscriptionSet<'_> {
    type Item = &'s Subscription;
    type IntoIter = std::slice::Iter<'s, Subscription>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
