//! Store — owns `TagTable` + `Indexes`, exposes the ingestion protocol
//! (`apply_record`), deletion, and the bulk-load sweep, and maintains
//! every cross-structure invariant over the entity graph.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::core::{DirError, Entity, EntityStatus, Guid, RawRecord, RecordSource, Result, Tag};
use crate::metrics::MetricSink;
use crate::store::deferred::DeferredResolver;
use crate::store::indexes::Indexes;
use crate::store::tag_table::TagTable;
use crate::store::transitive::TransitiveEngine;

/// One non-fatal defect observed during ingestion.
#[derive(Debug, Clone)]
pub struct Defect {
    pub kind: DefectKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefectKind {
    ParseError,
    IndexConflict,
}

pub struct Store {
    table: TagTable,
    indexes: Indexes,
    deferred: DeferredResolver,
    domain_flat_name: Mutex<String>,
    defects: Mutex<Vec<Defect>>,
    metrics: Arc<dyn MetricSink>,
}

impl Store {
    pub fn new(domain_flat_name: impl Into<String>, metrics: Arc<dyn MetricSink>) -> Self {
        Self {
            table: TagTable::new(),
            indexes: Indexes::new(),
            deferred: DeferredResolver::new(),
            domain_flat_name: Mutex::new(domain_flat_name.into()),
            defects: Mutex::new(Vec::new()),
            metrics,
        }
    }

    pub fn domain_flat_name(&self) -> String {
        self.domain_flat_name.lock().expect("lock poisoned").clone()
    }

    fn record_defect(&self, kind: DefectKind, message: impl Into<String>) {
        let message = message.into();
        warn!(kind = ?kind, %message, "directory ingestion defect");
        self.metrics.counter("store.defects").increment(1);
        self.defects.lock().expect("lock poisoned").push(Defect { kind, message });
    }

    pub fn drain_defects(&self) -> Vec<Defect> {
        std::mem::take(&mut self.defects.lock().expect("lock poisoned"))
    }

    // ---- lookups ----

    pub fn get(&self, tag: Tag) -> Option<Arc<Entity>> {
        self.table.get(tag)
    }

    pub fn lookup_by_dn(&self, dn: &str) -> Option<Arc<Entity>> {
        self.indexes.get_dn(dn).and_then(|tag| self.table.get(tag))
    }

    pub fn lookup_by_guid(&self, guid: &Guid) -> Option<Arc<Entity>> {
        self.indexes.get_guid(guid).and_then(|tag| self.table.get(tag))
    }

    pub fn lookup_by_sam(&self, sam: &str) -> Option<Arc<Entity>> {
        let flat_name = self.domain_flat_name();
        self.indexes.get_sam(sam, &flat_name).and_then(|tag| self.table.get(tag))
    }

    pub fn lookup_by_upn(&self, upn: &str) -> Option<Arc<Entity>> {
        self.indexes.get_upn(upn).and_then(|tag| self.table.get(tag))
    }

    pub fn lookup_by_email(&self, email: &str) -> Option<Arc<Entity>> {
        self.indexes.get_email(email).and_then(|tag| self.table.get(tag))
    }

    pub fn lookup_by_sid(&self, sid: &str) -> Option<Arc<Entity>> {
        self.indexes.get_sid(sid).and_then(|tag| self.table.get(tag))
    }

    pub fn lookup_by_foreign_sid(&self, sid: &str) -> Option<Arc<Entity>> {
        self.indexes.get_foreign_sid(sid).and_then(|tag| self.table.get(tag))
    }

    pub fn iter_live(&self) -> impl Iterator<Item = (Tag, Arc<Entity>)> {
        self.table.iter_live()
    }

    /// The `primaryGroupId → {tag}` set for one RID: every entity with a
    /// resolved `primaryGroupId=p` appears in `primaryGroupMembers[p]`,
    /// independent of whether any group currently publishes that token.
    pub fn primary_group_members(&self, primary_group_id: u32) -> HashSet<Tag> {
        self.indexes.primary_group_members(primary_group_id)
    }

    // ---- transitive queries ----

    pub fn all_members(&self, g: Tag) -> HashSet<Tag> {
        TransitiveEngine::new(&self.table, &self.indexes).all_members(g)
    }

    pub fn all_member_ofs(&self, e: Tag) -> HashSet<Tag> {
        TransitiveEngine::new(&self.table, &self.indexes).all_member_ofs(e)
    }

    pub fn has_member(&self, g: Tag, x: Tag) -> bool {
        TransitiveEngine::new(&self.table, &self.indexes).has_member(g, x)
    }

    pub fn all_group_type_members(&self, g: Tag) -> HashSet<Tag> {
        TransitiveEngine::new(&self.table, &self.indexes).all_group_type_members(g)
    }

    // ---- deferred reporting ----

    pub fn deferred_objects(&self) -> Vec<Tag> {
        let snap: Vec<(Tag, Arc<Entity>)> = self.table.iter_live().collect();
        DeferredResolver::still_deferred(snap.iter().map(|(tag, e)| (*tag, e.as_ref())))
    }

    /// Attempts to resolve `tag`'s own `managerDeferredDn` and
    /// `directMembersDeferredDn` against the current `byDn` index. Any DN
    /// that still fails to resolve is (re-)registered as a pending waiter.
    fn resolve_self_deferred(&self, tag: Tag) {
        let Some(current) = self.table.get(tag) else { return };
        let mut updated = (*current).clone();
        let mut changed = false;

        if let Some(deferred) = updated.manager_deferred_dn.clone() {
            if let Some(target) = self.indexes.get_dn(&deferred.0) {
                updated.manager = Some(target);
                updated.manager_deferred_dn = None;
                changed = true;
                self.add_manages_backlink(target, tag);
            } else {
                self.deferred.register_manager_wait(&deferred.0, tag);
            }
        }

        let pending_members = std::mem::take(&mut updated.direct_members_deferred_dn);
        let mut still_pending = Vec::with_capacity(pending_members.len());
        for deferred in pending_members {
            if let Some(member_tag) = self.indexes.get_dn(&deferred.0) {
                updated.direct_members.insert(member_tag);
                changed = true;
                self.add_direct_member_of_backlink(member_tag, tag);
            } else {
                self.deferred.register_member_wait(&deferred.0, tag);
                still_pending.push(deferred);
            }
        }
        updated.direct_members_deferred_dn = still_pending;

        if changed {
            self.table.replace(tag, updated);
        }
    }

    fn add_manages_backlink(&self, manager_tag: Tag, managed_tag: Tag) {
        if let Some(manager_entity) = self.table.get(manager_tag) {
            let mut updated = (*manager_entity).clone();
            updated.manages.insert(managed_tag);
            self.table.replace(manager_tag, updated);
        }
    }

    fn remove_manages_backlink(&self, manager_tag: Tag, managed_tag: Tag) {
        if let Some(manager_entity) = self.table.get(manager_tag) {
            let mut updated = (*manager_entity).clone();
            updated.manages.remove(&managed_tag);
            self.table.replace(manager_tag, updated);
        }
    }

    fn add_direct_member_of_backlink(&self, member_tag: Tag, group_tag: Tag) {
        if let Some(member_entity) = self.table.get(member_tag) {
            let mut updated = (*member_entity).clone();
            updated.direct_member_ofs.insert(group_tag);
            self.table.replace(member_tag, updated);
        }
    }

    fn remove_direct_member_of_backlink(&self, member_tag: Tag, group_tag: Tag) {
        if let Some(member_entity) = self.table.get(member_tag) {
            let mut updated = (*member_entity).clone();
            updated.direct_member_ofs.remove(&group_tag);
            self.table.replace(member_tag, updated);
        }
    }

    /// Resolves every referrer that was waiting on `dn` as a manager or
    /// member target, now that `dn` has just been installed in `byDn`.
    fn resolve_waiters_for(&self, dn: &str) {
        for referrer in self.deferred.take_manager_waiters(dn) {
            self.resolve_self_deferred(referrer);
        }
        for referrer in self.deferred.take_member_waiters(dn) {
            self.resolve_self_deferred(referrer);
        }
    }

    /// Full rescan of every entity still carrying a deferred reference,
    /// used at the end of a bulk load (`ResolveAllDeferred`) and whenever
    /// a DN change could have invalidated a pending-map entry keyed on
    /// the old DN.
    pub fn resolve_all_deferred(&self) {
        for tag in self.deferred_objects() {
            self.resolve_self_deferred(tag);
        }
    }

    // ---- ingestion protocol ----

    pub fn apply_record(&self, raw: RawRecord, source: RecordSource) -> Result<()> {
        let Some(guid) = raw.object_guid else {
            self.record_defect(DefectKind::ParseError, format!("record for dn={:?} has no objectGuid", raw.dn));
            return Ok(());
        };

        let existing_tag = self.indexes.get_guid(&guid);
        if let Some(existing_tag) = existing_tag {
            let existing = self.table.get(existing_tag).ok_or_else(|| {
                DirError::Consistency(format!("byGuid points at tag {existing_tag} with no entity"))
            })?;
            if matches!(source, RecordSource::BulkLoad) && existing.is_change_notified {
                debug!(tag = existing_tag, "bulk-load replay skipped: change-notified record has priority");
                return Ok(());
            }
        }

        let domain_flat_name = self.domain_flat_name();
        let candidate = raw.into_entity(&domain_flat_name);

        let tag = match existing_tag {
            None => self.ingest_new(candidate, guid),
            Some(existing_tag) => self.ingest_update(existing_tag, candidate)?,
        };

        self.resolve_self_deferred(tag);

        let dn = self.table.get(tag).map(|e| e.dn.clone()).unwrap_or_default();
        self.resolve_waiters_for(&dn);

        self.finalize(tag, source);
        self.metrics.counter("store.records_applied").increment(1);
        Ok(())
    }

    fn ingest_new(&self, candidate: Entity, guid: Guid) -> Tag {
        let tag = self.table.append_with(move |assigned| {
            let mut candidate = candidate;
            candidate.tag = assigned;
            candidate
        });
        if let Some(dup) = self.indexes.insert_guid(guid, tag) {
            self.record_defect(
                DefectKind::IndexConflict,
                format!("duplicate objectGuid {guid}: tag {} displaced by tag {}", dup.existing, dup.incoming),
            );
        }
        self.install_indexes_and_backlinks(tag);
        tag
    }

    fn ingest_update(&self, tag: Tag, mut candidate: Entity) -> Result<Tag> {
        let existing = self
            .table
            .get(tag)
            .ok_or_else(|| DirError::Consistency(format!("update for tag {tag} with no existing entity")))?;
        candidate.tag = tag;

        if !candidate.dn.eq_ignore_ascii_case(&existing.dn) {
            // A DN change can make a deferred reference keyed on the old DN
            // resolvable elsewhere, or orphan one that was keyed on it —
            // run the full rescan before the old mapping disappears.
            self.resolve_all_deferred();
            self.indexes.remove_dn(&existing.dn, tag);
        }

        if existing.manager != candidate.manager {
            if let Some(old_manager) = existing.manager {
                self.remove_manages_backlink(old_manager, tag);
            }
        } else {
            // Unchanged resolved manager: preserve it so step 6/7 doesn't
            // have to re-resolve a link that never moved.
            candidate.manager = existing.manager;
        }
        if candidate.manager_deferred_dn.is_none() && candidate.manager.is_none() {
            candidate.manager_deferred_dn = existing.manager_deferred_dn.clone();
        }

        if existing.direct_members != candidate.direct_members {
            for &old_member in existing.direct_members.difference(&candidate.direct_members) {
                self.remove_direct_member_of_backlink(old_member, tag);
            }
        } else {
            candidate.direct_members = existing.direct_members.clone();
        }
        if candidate.direct_members_deferred_dn.is_empty() {
            candidate.direct_members_deferred_dn = existing.direct_members_deferred_dn.clone();
        }

        if existing.primary_group_id != candidate.primary_group_id {
            if let Some(old_pgid) = existing.primary_group_id {
                self.indexes.remove_primary_group_member(old_pgid, tag);
            }
        }

        if !opt_eq_ci(&existing.sam_account_name, &candidate.sam_account_name) {
            if let Some(old_sam) = &existing.sam_account_name {
                self.indexes.remove_sam(old_sam, tag);
            }
        }
        if !opt_eq_ci(&existing.user_principal_name, &candidate.user_principal_name) {
            if let Some(old_upn) = &existing.user_principal_name {
                self.indexes.remove_upn(old_upn, tag);
            }
        }
        if existing.sid != candidate.sid {
            if let Some(old_sid) = &existing.sid {
                if existing.is_foreign_security_principal() {
                    self.indexes.remove_foreign_sid(old_sid, tag);
                } else {
                    self.indexes.remove_sid(old_sid, tag);
                }
            }
        }
        for old_hist in existing.sid_history.difference(&candidate.sid_history) {
            self.indexes.remove_sid(old_hist, tag);
        }
        // A value-unchanged email/alias set still needs withdrawing if the
        // candidate has lost mail eligibility (mailbox cleared, hidden from
        // the address book, or disabled) — the index is only ever present
        // for an eligible entity, regardless of whether the address itself
        // changed.
        if candidate.is_mail_enabled() {
            if !opt_eq_ci(&existing.email, &candidate.email) {
                if let Some(old_email) = &existing.email {
                    self.indexes.remove_email(old_email, tag);
                }
            }
            for old_alias in existing.email_aliases.difference(&candidate.email_aliases) {
                self.indexes.remove_email(old_alias, tag);
            }
        } else {
            if let Some(old_email) = &existing.email {
                self.indexes.remove_email(old_email, tag);
            }
            for old_alias in &existing.email_aliases {
                self.indexes.remove_email(old_alias, tag);
            }
        }

        // Backlinks derived from other entities survive re-ingestion.
        candidate.manages = existing.manages.clone();
        candidate.direct_member_ofs = existing.direct_member_ofs.clone();

        self.table.replace(tag, candidate);
        self.install_indexes_and_backlinks(tag);
        Ok(tag)
    }

    /// Step 7: install/refresh every index and forward-link backlink for
    /// the entity currently sitting at `tag`. Idempotent — safe to call
    /// for both new and updated entities.
    fn install_indexes_and_backlinks(&self, tag: Tag) {
        let Some(entity) = self.table.get(tag) else { return };

        if let Some(dup) = self.indexes.insert_dn(&entity.dn, tag) {
            self.record_defect(DefectKind::IndexConflict, format!("duplicate dn {:?}: tag {} displaced by tag {}", entity.dn, dup.existing, dup.incoming));
        }

        if let Some(manager_tag) = entity.manager {
            self.add_manages_backlink(manager_tag, tag);
        }
        for &member_tag in &entity.direct_members {
            self.add_direct_member_of_backlink(member_tag, tag);
        }

        if let Some(sam) = &entity.sam_account_name {
            if let Some(dup) = self.indexes.insert_sam(sam, tag) {
                self.record_defect(DefectKind::IndexConflict, format!("duplicate sAMAccountName {sam:?}: tag {} displaced by tag {}", dup.existing, dup.incoming));
            }
        }
        if let Some(upn) = &entity.user_principal_name {
            if let Some(dup) = self.indexes.insert_upn(upn, tag) {
                self.record_defect(DefectKind::IndexConflict, format!("duplicate userPrincipalName {upn:?}: tag {} displaced by tag {}", dup.existing, dup.incoming));
            }
        }
        if let Some(sid) = &entity.sid {
            let dup = if entity.is_foreign_security_principal() {
                self.indexes.insert_foreign_sid(sid, tag)
            } else {
                self.indexes.insert_sid(sid, tag)
            };
            if let Some(dup) = dup {
                self.record_defect(DefectKind::IndexConflict, format!("duplicate sid {sid:?}: tag {} displaced by tag {}", dup.existing, dup.incoming));
            }
        }
        for hist in &entity.sid_history {
            self.indexes.insert_sid(hist, tag);
        }
        if entity.is_mail_enabled() {
            if let Some(email) = &entity.email {
                if let Some(dup) = self.indexes.insert_email(email, tag) {
                    self.record_defect(DefectKind::IndexConflict, format!("duplicate mail {email:?}: tag {} displaced by tag {}", dup.existing, dup.incoming));
                }
            }
            for alias in &entity.email_aliases {
                self.indexes.insert_email(alias, tag);
            }
        }
        if let Some(token) = entity.primary_group_token {
            if let Some(dup) = self.indexes.insert_primary_group_token(token, tag) {
                self.record_defect(DefectKind::IndexConflict, format!("duplicate primaryGroupToken {token}: tag {} displaced by tag {}", dup.existing, dup.incoming));
            }
        }
        if let Some(pgid) = entity.primary_group_id {
            self.indexes.add_primary_group_member(pgid, tag);
        }
    }

    fn finalize(&self, tag: Tag, source: RecordSource) {
        if let Some(entity) = self.table.get(tag) {
            let mut updated = (*entity).clone();
            updated.status = EntityStatus::Exists;
            updated.is_change_notified = matches!(source, RecordSource::ChangeNotify);
            self.table.replace(tag, updated);
        }
    }

    // ---- bulk-load sweep ----

    pub fn mark_all_as_detecting(&self) {
        for (tag, entity) in self.table.iter_live() {
            if entity.status != EntityStatus::Detecting {
                let mut updated = (*entity).clone();
                updated.status = EntityStatus::Detecting;
                self.table.replace(tag, updated);
            }
        }
    }

    /// Deletes every entity still `Detecting` after a bulk load completed
    /// — it was never re-observed during the sweep. An entity that was
    /// change-notified during the sweep is exempt even if it is still
    /// `Detecting`: the priority rule at `apply_record` returns before
    /// `finalize` can flip a replayed bulk-load record's status back to
    /// `Exists`, so `is_change_notified` is the only record of "this one
    /// is current, just not re-observed by this load."
    pub fn delete_undetected(&self) {
        let still_detecting: Vec<Tag> = self
            .table
            .iter_live()
            .filter(|(_, e)| e.status == EntityStatus::Detecting && !e.is_change_notified)
            .map(|(tag, _)| tag)
            .collect();
        for tag in still_detecting {
            self.delete(tag);
        }
    }

    /// Removes every index entry, withdraws the entity from every
    /// backlink set, and NULLs its slot. The tag is never reused.
    pub fn delete(&self, tag: Tag) {
        let Some(entity) = self.table.get(tag) else { return };

        self.indexes.remove_dn(&entity.dn, tag);
        if let Some(manager_tag) = entity.manager {
            self.remove_manages_backlink(manager_tag, tag);
        }
        for &member_tag in &entity.direct_members {
            self.remove_direct_member_of_backlink(member_tag, tag);
        }
        for &parent_tag in &entity.direct_member_ofs {
            if let Some(parent) = self.table.get(parent_tag) {
                let mut updated = (*parent).clone();
                updated.direct_members.remove(&tag);
                self.table.replace(parent_tag, updated);
            }
        }
        for &managed_tag in &entity.manages {
            if let Some(managed) = self.table.get(managed_tag) {
                let mut updated = (*managed).clone();
                updated.manager = None;
                self.table.replace(managed_tag, updated);
            }
        }
        if let Some(sam) = &entity.sam_account_name {
            self.indexes.remove_sam(sam, tag);
        }
        if let Some(upn) = &entity.user_principal_name {
            self.indexes.remove_upn(upn, tag);
        }
        if let Some(sid) = &entity.sid {
            if entity.is_foreign_security_principal() {
                self.indexes.remove_foreign_sid(sid, tag);
            } else {
                self.indexes.remove_sid(sid, tag);
            }
        }
        for hist in &entity.sid_history {
            self.indexes.remove_sid(hist, tag);
        }
        if let Some(email) = &entity.email {
            self.indexes.remove_email(email, tag);
        }
        for alias in &entity.email_aliases {
            self.indexes.remove_email(alias, tag);
        }
        if let Some(token) = entity.primary_group_token {
            self.indexes.remove_primary_group_token(token, tag);
        }
        if let Some(pgid) = entity.primary_group_id {
            self.indexes.remove_primary_group_member(pgid, tag);
        }

        self.table.null_out(tag);
    }

    // ---- snapshot support ----

    /// Rebuilds the store from a previously deserialized tag sequence
    /// (`SnapshotCodec::load`). Installs indexes and backlinks exactly as
    /// ingestion does, but never touches the deferred resolver — a
    /// snapshot is internally consistent by construction.
    pub fn rebuild_from_snapshot(domain_flat_name: impl Into<String>, metrics: Arc<dyn MetricSink>, entities: Vec<Option<Entity>>) -> Self {
        let store = Self {
            table: TagTable::from_entities(entities),
            indexes: Indexes::new(),
            deferred: DeferredResolver::new(),
            domain_flat_name: Mutex::new(domain_flat_name.into()),
            defects: Mutex::new(Vec::new()),
            metrics,
        };
        for (tag, _) in store.table.iter_live().collect::<Vec<_>>() {
            store.install_indexes_and_backlinks(tag);
        }
        store
    }

    /// Snapshot of the full tag sequence, for `SnapshotCodec::save`.
    pub fn snapshot_entities(&self) -> im::Vector<Option<Arc<Entity>>> {
        self.table.snapshot()
    }
}

fn opt_eq_ci(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}
