//! Indexes — the eight secondary-index families over `TagTable`.
//!
//! Each scalar index is `RwLock<im::HashMap<_, Tag>>`: installs and
//! removals take the write lock for the duration of a single map
//! operation (clone-on-write is O(log n) thanks to `im`'s structural
//! sharing), and lookups take the read lock just long enough to clone the
//! map handle or read a single key. `primaryGroupMembers` additionally
//! carries a per-entry lock around each membership set so a reader
//! iterating one group's members never contends with writers touching an
//! unrelated group.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};

use crate::core::{Guid, Tag, ci_key};

/// Records that an index install observed a key already mapped to a
/// different tag. Non-fatal: the caller logs it to the defect log and the
/// later writer wins the slot.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateKey {
    pub existing: Tag,
    pub incoming: Tag,
}

#[derive(Default)]
struct ScalarIndex<K: Eq + std::hash::Hash + Clone + Ord> {
    map: RwLock<im::HashMap<K, Tag>>,
}

impl<K: Eq + std::hash::Hash + Clone + Ord> ScalarIndex<K> {
    fn new() -> Self {
        Self {
            map: RwLock::new(im::HashMap::new()),
        }
    }

    fn insert(&self, key: K, tag: Tag) -> Option<DuplicateKey> {
        let mut guard = self.map.write().expect("index lock poisoned");
        let previous = guard.insert(key, tag);
        previous.filter(|&existing| existing != tag).map(|existing| DuplicateKey { existing, incoming: tag })
    }

    fn remove(&self, key: &K) {
        let mut guard = self.map.write().expect("index lock poisoned");
        guard.remove(key);
    }

    /// Only removes the mapping if it still points at `expected_tag` —
    /// guards against a later writer's duplicate-key install being
    /// clobbered by a stale remove during update reconciliation.
    fn remove_if(&self, key: &K, expected_tag: Tag) {
        let mut guard = self.map.write().expect("index lock poisoned");
        if guard.get(key) == Some(&expected_tag) {
            guard.remove(key);
        }
    }

    fn get(&self, key: &K) -> Option<Tag> {
        let guard = self.map.read().expect("index lock poisoned");
        guard.get(key).copied()
    }
}

/// The per-group set of tags whose `primaryGroupId` points at this
/// group's `primaryGroupToken`. Guarded by its own lock so a reader
/// iterating one group's membership never contends with writers touching
/// an unrelated group.
type PrimaryGroupSet = Arc<Mutex<HashSet<Tag>>>;

#[derive(Default)]
pub struct Indexes {
    by_dn: ScalarIndex<String>,
    by_guid: RwLock<im::HashMap<Guid, Tag>>,
    by_sam_account_name: ScalarIndex<String>,
    by_upn: ScalarIndex<String>,
    by_email: ScalarIndex<String>,
    by_sid_or_sid_history: ScalarIndex<String>,
    by_foreign_sid: ScalarIndex<String>,
    by_primary_group_token: RwLock<im::HashMap<u32, Tag>>,
    primary_group_members: RwLock<im::HashMap<u32, PrimaryGroupSet>>,
}

impl Indexes {
    pub fn new() -> Self {
        Self {
            by_dn: ScalarIndex::new(),
            by_guid: RwLock::new(im::HashMap::new()),
            by_sam_account_name: ScalarIndex::new(),
            by_upn: ScalarIndex::new(),
            by_email: ScalarIndex::new(),
            by_sid_or_sid_history: ScalarIndex::new(),
            by_foreign_sid: ScalarIndex::new(),
            by_primary_group_token: RwLock::new(im::HashMap::new()),
            primary_group_members: RwLock::new(im::HashMap::new()),
        }
    }

    // ---- DN (case-insensitive, bijective over live entities) ----

    pub fn insert_dn(&self, dn: &str, tag: Tag) -> Option<DuplicateKey> {
        self.by_dn.insert(ci_key(dn), tag)
    }

    pub fn remove_dn(&self, dn: &str, expected_tag: Tag) {
        self.by_dn.remove_if(&ci_key(dn), expected_tag)
    }

    pub fn get_dn(&self, dn: &str) -> Option<Tag> {
        self.by_dn.get(&ci_key(dn))
    }

    // ---- GUID (exact, injective) ----

    pub fn insert_guid(&self, guid: Guid, tag: Tag) -> Option<DuplicateKey> {
        let mut guard = self.by_guid.write().expect("index lock poisoned");
        let previous = guard.insert(guid, tag);
        previous.filter(|&existing| existing != tag).map(|existing| DuplicateKey { existing, incoming: tag })
    }

    pub fn get_guid(&self, guid: &Guid) -> Option<Tag> {
        let guard = self.by_guid.read().expect("index lock poisoned");
        guard.get(guid).copied()
    }

    // ---- SAM account name (case-insensitive, domain-prefix aware) ----

    /// Strips a leading `"DOMAIN\"` prefix from `raw` when `DOMAIN`
    /// case-insensitively matches `flat_name`.
    pub fn normalize_sam_lookup<'a>(raw: &'a str, flat_name: &str) -> &'a str {
        if let Some((domain, rest)) = raw.split_once('\\') {
            if domain.eq_ignore_ascii_case(flat_name) {
                return rest;
            }
        }
        raw
    }

    pub fn insert_sam(&self, sam: &str, tag: Tag) -> Option<DuplicateKey> {
        self.by_sam_account_name.insert(ci_key(sam), tag)
    }

    pub fn remove_sam(&self, sam: &str, expected_tag: Tag) {
        self.by_sam_account_name.remove_if(&ci_key(sam), expected_tag)
    }

    pub fn get_sam(&self, sam: &str, flat_name: &str) -> Option<Tag> {
        let normalized = Self::normalize_sam_lookup(sam, flat_name);
        self.by_sam_account_name.get(&ci_key(normalized))
    }

    // ---- UPN (case-insensitive) ----

    pub fn insert_upn(&self, upn: &str, tag: Tag) -> Option<DuplicateKey> {
        self.by_upn.insert(ci_key(upn), tag)
    }

    pub fn remove_upn(&self, upn: &str, expected_tag: Tag) {
        self.by_upn.remove_if(&ci_key(upn), expected_tag)
    }

    pub fn get_upn(&self, upn: &str) -> Option<Tag> {
        self.by_upn.get(&ci_key(upn))
    }

    // ---- Email (case-insensitive, multi-keyed by primary + aliases) ----

    pub fn insert_email(&self, email: &str, tag: Tag) -> Option<DuplicateKey> {
        self.by_email.insert(ci_key(email), tag)
    }

    pub fn remove_email(&self, email: &str, expected_tag: Tag) {
        self.by_email.remove_if(&ci_key(email), expected_tag)
    }

    pub fn get_email(&self, email: &str) -> Option<Tag> {
        self.by_email.get(&ci_key(email))
    }

    // ---- SID / SID history (multi-keyed, exact) ----

    pub fn insert_sid(&self, sid: &str, tag: Tag) -> Option<DuplicateKey> {
        self.by_sid_or_sid_history.insert(sid.to_string(), tag)
    }

    pub fn remove_sid(&self, sid: &str, expected_tag: Tag) {
        self.by_sid_or_sid_history.remove_if(&sid.to_string(), expected_tag)
    }

    pub fn get_sid(&self, sid: &str) -> Option<Tag> {
        self.by_sid_or_sid_history.get(&sid.to_string())
    }

    // ---- Foreign SID (separate namespace, never mixed with byCI SID) ----

    pub fn insert_foreign_sid(&self, sid: &str, tag: Tag) -> Option<DuplicateKey> {
        self.by_foreign_sid.insert(sid.to_string(), tag)
    }

    pub fn remove_foreign_sid(&self, sid: &str, expected_tag: Tag) {
        self.by_foreign_sid.remove_if(&sid.to_string(), expected_tag)
    }

    pub fn get_foreign_sid(&self, sid: &str) -> Option<Tag> {
        self.by_foreign_sid.get(&sid.to_string())
    }

    // ---- Primary group token (group -> token it publishes) ----

    pub fn insert_primary_group_token(&self, token: u32, tag: Tag) -> Option<DuplicateKey> {
        let mut guard = self.by_primary_group_token.write().expect("index lock poisoned");
        let previous = guard.insert(token, tag);
        previous.filter(|&existing| existing != tag).map(|existing| DuplicateKey { existing, incoming: tag })
    }

    pub fn remove_primary_group_token(&self, token: u32, expected_tag: Tag) {
        let mut guard = self.by_primary_group_token.write().expect("index lock poisoned");
        if guard.get(&token) == Some(&expected_tag) {
            guard.remove(&token);
        }
    }

    pub fn get_primary_group_token(&self, token: u32) -> Option<Tag> {
        let guard = self.by_primary_group_token.read().expect("index lock poisoned");
        guard.get(&token).copied()
    }

    // ---- primaryGroupMembers: primaryGroupId -> set<tag>, per-entry lock ----

    fn set_for(&self, primary_group_id: u32) -> PrimaryGroupSet {
        {
            let guard = self.primary_group_members.read().expect("index lock poisoned");
            if let Some(set) = guard.get(&primary_group_id) {
                return Arc::clone(set);
            }
        }
        let mut guard = self.primary_group_members.write().expect("index lock poisoned");
        Arc::clone(
            guard
                .entry(primary_group_id)
                .or_insert_with(|| Arc::new(Mutex::new(HashSet::new()))),
        )
    }

    pub fn add_primary_group_member(&self, primary_group_id: u32, tag: Tag) {
        let set = self.set_for(primary_group_id);
        set.lock().expect("primary group set lock poisoned").insert(tag);
    }

    pub fn remove_primary_group_member(&self, primary_group_id: u32, tag: Tag) {
        let set = self.set_for(primary_group_id);
        set.lock().expect("primary group set lock poisoned").remove(&tag);
    }

    /// Snapshot of the membership set for one primary group token. Taken
    /// under the set's own short-held lock; the returned `HashSet` is a
    /// plain owned copy the caller can iterate lock-free.
    pub fn primary_group_members(&self, primary_group_id: u32) -> HashSet<Tag> {
        let guard = self.primary_group_members.read().expect("index lock poisoned");
        match guard.get(&primary_group_id) {
            Some(set) => set.lock().expect("primary group set lock poisoned").clone(),
            None => HashSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dn_lookup_is_case_insensitive() {
        let idx = Indexes::new();
        idx.insert_dn("CN=Alice,DC=example,DC=com", 1);
        assert_eq!(idx.get_dn("cn=alice,dc=example,dc=com"), Some(1));
    }

    #[test]
    fn duplicate_sam_reports_conflict_and_last_writer_wins() {
        let idx = Indexes::new();
        assert!(idx.insert_sam("jdoe", 1).is_none());
        let dup = idx.insert_sam("JDOE", 2).expect("should report a duplicate");
        assert_eq!(dup.existing, 1);
        assert_eq!(dup.incoming, 2);
        assert_eq!(idx.get_sam("jdoe", "EXAMPLE"), Some(2));
    }

    #[test]
    fn sam_strips_matching_domain_prefix() {
        let idx = Indexes::new();
        idx.insert_sam("jdoe", 7);
        assert_eq!(idx.get_sam(r"EXAMPLE\jdoe", "EXAMPLE"), Some(7));
        assert_eq!(idx.get_sam(r"OTHER\jdoe", "EXAMPLE"), None);
    }

    #[test]
    fn primary_group_members_are_independent_per_token() {
        let idx = Indexes::new();
        idx.add_primary_group_member(513, 10);
        idx.add_primary_group_member(513, 11);
        idx.add_primary_group_member(515, 20);
        assert_eq!(idx.primary_group_members(513), HashSet::from([10, 11]));
        assert_eq!(idx.primary_group_members(515), HashSet::from([20]));
        idx.remove_primary_group_member(513, 10);
        assert_eq!(idx.primary_group_members(513), HashSet::from([11]));
    }

    #[test]
    fn remove_if_does_not_clobber_a_newer_writer() {
        let idx = Indexes::new();
        idx.insert_dn("CN=A", 1);
        idx.insert_dn("CN=A", 2); // last-writer-wins
        idx.remove_dn("CN=A", 1); // stale remove from the first writer's cleanup
        assert_eq!(idx.get_dn("CN=A"), Some(2));
    }
}
