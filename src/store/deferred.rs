//! DeferredResolver — lazy fixup of forward DN references observed
//! before their target exists.
//!
//! Two reverse-lookup maps (dn-key → waiting referrers) let a newly
//! ingested entity resolve *targeted* waiters in O(waiters-for-this-dn)
//! rather than rescanning the whole table: `Store::apply_record` calls
//! [`DeferredResolver::take_manager_waiters`] / [`take_member_waiters`] on
//! every new entity's DN and re-attempts resolution for each waiter. The
//! full rescan used by `ResolveAllDeferred` at the end of a bulk load
//! instead walks [`DeferredResolver::still_deferred`] and re-attempts
//! every one of them, which is needed because a DN change can invalidate
//! a pending-map entry that was registered under the old DN.

use std::collections::HashSet;
use std::sync::RwLock;

use crate::core::{Entity, Tag, ci_key};

#[derive(Default)]
pub struct DeferredResolver {
    /// target-dn-key -> tags of entities whose `managerDeferredDn` names it.
    pending_manager: RwLock<im::HashMap<String, im::HashSet<Tag>>>,
    /// target-dn-key -> tags of groups whose `directMembersDeferredDn` names it.
    pending_member: RwLock<im::HashMap<String, im::HashSet<Tag>>>,
}

impl DeferredResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_manager_wait(&self, target_dn: &str, referrer: Tag) {
        let mut guard = self.pending_manager.write().expect("deferred lock poisoned");
        guard.entry(ci_key(target_dn)).or_default().insert(referrer);
    }

    pub fn register_member_wait(&self, target_dn: &str, group: Tag) {
        let mut guard = self.pending_member.write().expect("deferred lock poisoned");
        guard.entry(ci_key(target_dn)).or_default().insert(group);
    }

    pub fn remove_manager_wait(&self, target_dn: &str, referrer: Tag) {
        let mut guard = self.pending_manager.write().expect("deferred lock poisoned");
        let key = ci_key(target_dn);
        if let Some(set) = guard.get_mut(&key) {
            set.remove(&referrer);
            if set.is_empty() {
                guard.remove(&key);
            }
        }
    }

    pub fn remove_member_wait(&self, target_dn: &str, group: Tag) {
        let mut guard = self.pending_member.write().expect("deferred lock poisoned");
        let key = ci_key(target_dn);
        if let Some(set) = guard.get_mut(&key) {
            set.remove(&group);
            if set.is_empty() {
                guard.remove(&key);
            }
        }
    }

    /// Drains and returns the set of entities waiting for `dn` as a
    /// manager target. Called for every newly-ingested entity.
    pub fn take_manager_waiters(&self, dn: &str) -> HashSet<Tag> {
        let mut guard = self.pending_manager.write().expect("deferred lock poisoned");
        guard
            .remove(&ci_key(dn))
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    /// Drains and returns the set of groups waiting for `dn` as a member.
    pub fn take_member_waiters(&self, dn: &str) -> HashSet<Tag> {
        let mut guard = self.pending_member.write().expect("deferred lock poisoned");
        guard
            .remove(&ci_key(dn))
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    /// Tags of entities still carrying at least one unresolved forward
    /// reference, for `Store::deferred_objects()`.
    pub fn still_deferred<'a>(entities: impl Iterator<Item = (Tag, &'a Entity)>) -> Vec<Tag> {
        entities
            .filter(|(_, e)| e.manager_deferred_dn.is_some() || !e.direct_members_deferred_dn.is_empty())
            .map(|(tag, _)| tag)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_waiters_are_targeted_by_dn() {
        let resolver = DeferredResolver::new();
        resolver.register_manager_wait("CN=Boss,DC=x", 7);
        resolver.register_manager_wait("CN=Boss,DC=x", 8);
        resolver.register_manager_wait("CN=Other,DC=x", 9);

        let waiters = resolver.take_manager_waiters("cn=boss,dc=x");
        assert_eq!(waiters, HashSet::from([7, 8]));
        // Drained: a second take finds nothing.
        assert!(resolver.take_manager_waiters("cn=boss,dc=x").is_empty());
        assert_eq!(resolver.take_manager_waiters("cn=other,dc=x"), HashSet::from([9]));
    }

    #[test]
    fn remove_wait_drops_only_the_named_referrer() {
        let resolver = DeferredResolver::new();
        resolver.register_member_wait("CN=M,DC=x", 1);
        resolver.register_member_wait("CN=M,DC=x", 2);
        resolver.remove_member_wait("CN=M,DC=x", 1);
        assert_eq!(resolver.take_member_waiters("CN=M,DC=x"), HashSet::from([2]));
    }
}
