//! TagTable — the append-only, tag-indexed sequence of entities.
//!
//! The backing collection is a COW `RwLock<im::Vector<_>>`: a reader takes
//! the read lock just long enough to clone the vector handle (O(1),
//! structural sharing) and then iterates without holding any lock at all.
//! Because the old and new versions of the vector share structure, a
//! reader that captured a length before a concurrent append still sees a
//! fully valid, unchanged prefix — growth never invalidates a
//! previously-observed slot, which falls out of persistent-vector
//! semantics for free.

use std::sync::{Arc, RwLock};

use crate::core::{Entity, Tag};

#[derive(Default)]
pub struct TagTable {
    slots: RwLock<im::Vector<Option<Arc<Entity>>>>,
}

impl TagTable {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(im::Vector::new()),
        }
    }

    /// Assigns the next tag and publishes the entity. Single-writer.
    pub fn append(&self, entity: Entity) -> Tag {
        let mut guard = self.slots.write().expect("tag table lock poisoned");
        let tag = guard.len() as Tag;
        guard.push_back(Some(Arc::new(entity)));
        tag
    }

    /// Assigns the next tag and builds the entity from it in one step, so
    /// the stored `Entity::tag` field always agrees with its slot index
    /// without a separate corrective write.
    pub fn append_with(&self, f: impl FnOnce(Tag) -> Entity) -> Tag {
        let mut guard = self.slots.write().expect("tag table lock poisoned");
        let tag = guard.len() as Tag;
        guard.push_back(Some(Arc::new(f(tag))));
        tag
    }

    /// Returns the slot at `tag`, or `None` if never assigned or deleted.
    pub fn get(&self, tag: Tag) -> Option<Arc<Entity>> {
        let guard = self.slots.read().expect("tag table lock poisoned");
        guard.get(tag as usize).cloned().flatten()
    }

    /// Single-writer replacement. `entity.tag` must equal `tag`.
    pub fn replace(&self, tag: Tag, entity: Entity) {
        debug_assert_eq!(entity.tag, tag, "replace must preserve the slot's tag");
        let mut guard = self.slots.write().expect("tag table lock poisoned");
        guard.set(tag as usize, Some(Arc::new(entity)));
    }

    /// Marks the slot deleted. The tag itself is never reused.
    pub fn null_out(&self, tag: Tag) {
        let mut guard = self.slots.write().expect("tag table lock poisoned");
        if (tag as usize) < guard.len() {
            guard.set(tag as usize, None);
        }
    }

    /// Lock-free (post-clone) read of the current length, for iteration
    /// bounds that won't retroactively shrink underneath a reader.
    pub fn snapshot_len(&self) -> usize {
        self.slots.read().expect("tag table lock poisoned").len()
    }

    /// Clones the current persistent vector handle. O(1); the clone shares
    /// structure with the live table and is unaffected by subsequent
    /// writer mutations.
    pub fn snapshot(&self) -> im::Vector<Option<Arc<Entity>>> {
        self.slots.read().expect("tag table lock poisoned").clone()
    }

    /// Iterates all live (non-deleted) entities in tag order, over a
    /// point-in-time snapshot taken without holding any lock during
    /// iteration.
    pub fn iter_live(&self) -> impl Iterator<Item = (Tag, Arc<Entity>)> {
        let snap = self.snapshot();
        snap.into_iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|e| (i as Tag, e)))
    }

    /// Reconstructs a table from an ordered sequence of entities (used by
    /// `SnapshotCodec` on load). Tags are assigned by position.
    pub fn from_entities(entities: Vec<Option<Entity>>) -> Self {
        let mut v = im::Vector::new();
        for slot in entities {
            v.push_back(slot.map(Arc::new));
        }
        Self {
            slots: RwLock::new(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntityStatus, ObjectClass, RawRecord};
    use uuid::Uuid;

    fn sample(dn: &str) -> Entity {
        RawRecord::new(dn, Uuid::new_v4(), ObjectClass::new("top.user")).into_entity("EXAMPLE")
    }

    #[test]
    fn append_assigns_dense_tags_and_is_readable() {
        let table = TagTable::new();
        let t0 = table.append(sample("CN=A"));
        let t1 = table.append(sample("CN=B"));
        assert_eq!(t0, 0);
        assert_eq!(t1, 1);
        assert_eq!(table.get(t0).unwrap().dn, "CN=A");
        assert_eq!(table.get(t1).unwrap().dn, "CN=B");
    }

    #[test]
    fn snapshot_is_stable_across_concurrent_growth() {
        let table = TagTable::new();
        table.append(sample("CN=A"));
        let snap = table.snapshot();
        assert_eq!(snap.len(), 1);
        table.append(sample("CN=B"));
        // The earlier snapshot is untouched by the later append.
        assert_eq!(snap.len(), 1);
        assert_eq!(table.snapshot_len(), 2);
    }

    #[test]
    fn null_out_keeps_the_tag_but_clears_the_slot() {
        let table = TagTable::new();
        let t0 = table.append(sample("CN=A"));
        table.null_out(t0);
        assert!(table.get(t0).is_none());
        let t1 = table.append(sample("CN=B"));
        assert_eq!(t1, 1, "tag 0 must never be reused");
    }

    #[test]
    fn replace_preserves_tag_and_updates_value() {
        let table = TagTable::new();
        let t0 = table.append(sample("CN=A"));
        let mut updated = (*table.get(t0).unwrap()).clone();
        updated.dn = "CN=A2".to_string();
        updated.status = EntityStatus::Exists;
        table.replace(t0, updated);
        assert_eq!(table.get(t0).unwrap().dn, "CN=A2");
    }

    #[test]
    fn iter_live_skips_deleted_slots() {
        let table = TagTable::new();
        let t0 = table.append(sample("CN=A"));
        table.append(sample("CN=B"));
        table.null_out(t0);
        let dns: Vec<_> = table.iter_live().map(|(_, e)| e.dn.clone()).collect();
        assert_eq!(dns, vec!["CN=B".to_string()]);
    }
}
