//! TransitiveEngine — derived queries over the composite membership
//! graph: direct `group -> member` edges plus primary-group "virtual"
//! edges (`primaryGroupToken(group) -> {e | e.primaryGroupId == token}`).
//!
//! Every traversal carries an explicit `visited` set and adds a node
//! before recursing into it, so a group that (directly or transitively)
//! contains itself terminates instead of looping.

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::{Entity, Tag};
use crate::store::indexes::Indexes;
use crate::store::tag_table::TagTable;

pub struct TransitiveEngine<'a> {
    table: &'a TagTable,
    indexes: &'a Indexes,
}

impl<'a> TransitiveEngine<'a> {
    pub fn new(table: &'a TagTable, indexes: &'a Indexes) -> Self {
        Self { table, indexes }
    }

    fn entity(&self, tag: Tag) -> Option<Arc<Entity>> {
        self.table.get(tag)
    }

    /// Primary-group members of `group_tag`: flat, never recursed into —
    /// a primary-group member is, by directory convention, never itself
    /// a group.
    fn primary_group_members(&self, group_tag: Tag) -> HashSet<Tag> {
        match self.entity(group_tag).and_then(|g| g.primary_group_token) {
            Some(token) => self.indexes.primary_group_members(token),
            None => HashSet::new(),
        }
    }

    /// All members of `g`, direct and transitive, including primary-group
    /// members of every reachable subgroup.
    pub fn all_members(&self, g: Tag) -> HashSet<Tag> {
        let mut visited = HashSet::new();
        let mut acc = HashSet::new();
        self.collect_members(g, &mut visited, &mut acc);
        acc
    }

    fn collect_members(&self, g: Tag, visited: &mut HashSet<Tag>, acc: &mut HashSet<Tag>) {
        if !visited.insert(g) {
            return;
        }
        acc.extend(self.primary_group_members(g));
        let Some(group) = self.entity(g) else { return };
        for &member in &group.direct_members {
            acc.insert(member);
            if self.entity(member).map(|e| e.is_group()).unwrap_or(false) {
                self.collect_members(member, visited, acc);
            }
        }
    }

    /// All groups `e` transitively belongs to: direct `directMemberOfs`
    /// plus the group whose token matches `e`'s primary group, walked
    /// upward.
    pub fn all_member_ofs(&self, e: Tag) -> HashSet<Tag> {
        let mut visited = HashSet::new();
        let mut acc = HashSet::new();
        let Some(entity) = self.entity(e) else { return acc };

        if let Some(primary_group_id) = entity.primary_group_id {
            if let Some(group_tag) = self.indexes.get_primary_group_token(primary_group_id) {
                acc.insert(group_tag);
                self.collect_member_ofs(group_tag, &mut visited, &mut acc);
            }
        }
        self.collect_member_ofs(e, &mut visited, &mut acc);
        acc.remove(&e);
        acc
    }

    fn collect_member_ofs(&self, e: Tag, visited: &mut HashSet<Tag>, acc: &mut HashSet<Tag>) {
        if !visited.insert(e) {
            return;
        }
        let Some(entity) = self.entity(e) else { return };
        for &parent in &entity.direct_member_ofs {
            acc.insert(parent);
            self.collect_member_ofs(parent, visited, acc);
        }
    }

    /// Short-circuit membership test: is `x` a member of `g`, directly,
    /// transitively, or via a primary-group edge at any frame?
    pub fn has_member(&self, g: Tag, x: Tag) -> bool {
        let mut visited = HashSet::new();
        self.has_member_inner(g, x, &mut visited)
    }

    fn has_member_inner(&self, g: Tag, x: Tag, visited: &mut HashSet<Tag>) -> bool {
        if !visited.insert(g) {
            return false;
        }
        if self.primary_group_members(g).contains(&x) {
            return true;
        }
        let Some(group) = self.entity(g) else { return false };
        if group.direct_members.contains(&x) {
            return true;
        }
        group
            .direct_members
            .iter()
            .filter(|&&m| self.entity(m).map(|e| e.is_group()).unwrap_or(false))
            .any(|&m| self.has_member_inner(m, x, visited))
    }

    /// `AllMembers(g)` restricted to nodes whose class indicates a group.
    pub fn all_group_type_members(&self, g: Tag) -> HashSet<Tag> {
        self.all_members(g)
            .into_iter()
            .filter(|&tag| self.entity(tag).map(|e| e.is_group()).unwrap_or(false))
            .collect()
    }
}
