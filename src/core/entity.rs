//! The entity record and the raw, pre-ingestion record shape the sync
//! pipeline feeds into the store.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{EntityStatus, GroupType, ObjectClass, SamAccountType, UserAccountControl};
use super::ids::{Guid, Tag};

/// A forward reference to another object by distinguished name, captured
/// before the target is known to exist. `directMembers` on a group can
/// carry many of these; `manager` carries at most one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredDn(pub String);

/// One directory object as ingested from a raw feed record, before it is
/// assigned a tag and installed into the store.
///
/// Fields that are only meaningful once the entity is resolved into the
/// graph (`manager` tag, `manages`, `directMembers` tags,
/// `directMemberOfs`) start empty/unresolved and are filled in by
/// `Store::apply_record` and the `DeferredResolver`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub tag: Tag,
    pub dn: String,
    pub object_guid: Guid,
    pub class: ObjectClass,
    pub sid: Option<String>,
    pub sid_history: HashSet<String>,
    pub sam_account_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub domain_flat_name: String,
    pub sam_account_type: Option<SamAccountType>,
    pub user_account_control: Option<UserAccountControl>,
    pub group_type: Option<GroupType>,
    pub when_created: Option<DateTime<Utc>>,
    pub password_last_set: Option<DateTime<Utc>>,
    pub last_logon_time_stamp: Option<DateTime<Utc>>,
    pub account_expires: Option<DateTime<Utc>>,
    pub email: Option<String>,
    pub email_aliases: HashSet<String>,
    pub target_email: Option<String>,
    pub mailbox_guid: Option<Guid>,
    pub hide_from_address_book: bool,
    pub sip_address: Option<String>,
    pub primary_group_id: Option<u32>,
    pub primary_group_token: Option<u32>,

    /// Unresolved manager DN, pending `DeferredResolver` lookup.
    pub manager_deferred_dn: Option<DeferredDn>,
    /// Resolved manager tag.
    pub manager: Option<Tag>,
    /// Backlink: entities this one manages. Derived, carried across updates.
    pub manages: HashSet<Tag>,

    /// Unresolved member DNs, pending `DeferredResolver` lookup. Only
    /// populated for groups.
    pub direct_members_deferred_dn: Vec<DeferredDn>,
    /// Resolved direct member tags. Only populated for groups.
    pub direct_members: HashSet<Tag>,
    /// Backlink: groups this entity directly belongs to. Derived.
    pub direct_member_ofs: HashSet<Tag>,

    pub other_attributes_text: HashMap<String, String>,
    pub other_attributes_binary: HashMap<String, Vec<u8>>,

    pub status: EntityStatus,
    pub is_change_notified: bool,
}

impl Entity {
    /// Whether this entity is eligible for the foreign-SID index rather
    /// than the regular SID index.
    pub fn is_foreign_security_principal(&self) -> bool {
        self.class.is_foreign_security_principal()
    }

    pub fn is_group(&self) -> bool {
        self.class.is_group()
    }

    /// Whether the mailbox-related fields should be indexed: mailbox
    /// enabled (has a mailbox GUID) and not hidden/disabled.
    pub fn is_mail_enabled(&self) -> bool {
        self.mailbox_guid.is_some()
            && !self.hide_from_address_book
            && !self
                .user_account_control
                .map(|uac| uac.is_disabled())
                .unwrap_or(false)
    }
}

/// A pre-ingestion candidate record as handed to `Store::apply_record`.
/// Produced by parsing a raw feed attribute set (the LDAP client is an
/// opaque collaborator out of scope for this crate — see `sync::feed`).
///
/// Distinct from `Entity` in that it carries no `tag` yet and its forward
/// references are plain DN strings, never resolved tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub dn: String,
    pub object_guid: Option<Guid>,
    pub class: ObjectClass,
    pub sid: Option<String>,
    pub sid_history: HashSet<String>,
    pub sam_account_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub domain_flat_name: Option<String>,
    pub sam_account_type: Option<SamAccountType>,
    pub user_account_control: Option<UserAccountControl>,
    pub group_type: Option<GroupType>,
    pub when_created_filetime: Option<i64>,
    pub password_last_set_filetime: Option<i64>,
    pub last_logon_time_stamp_filetime: Option<i64>,
    pub account_expires_filetime: Option<i64>,
    pub email: Option<String>,
    pub email_aliases: HashSet<String>,
    pub target_email: Option<String>,
    pub mailbox_guid: Option<Guid>,
    pub hide_from_address_book: bool,
    pub sip_address: Option<String>,
    pub primary_group_id: Option<u32>,
    pub primary_group_token: Option<u32>,
    pub manager_dn: Option<String>,
    /// Member DNs, already de-ranged by the feed layer if the directory
    /// delivered them as `member;range=0-999` chunks.
    pub member_dns: Vec<String>,
    pub other_attributes_text: HashMap<String, String>,
    pub other_attributes_binary: HashMap<String, Vec<u8>>,
}

impl RawRecord {
    pub fn new(dn: impl Into<String>, object_guid: Guid, class: ObjectClass) -> Self {
        Self {
            dn: dn.into(),
            object_guid: Some(object_guid),
            class,
            sid: None,
            sid_history: HashSet::new(),
            sam_account_name: None,
            user_principal_name: None,
            domain_flat_name: None,
            sam_account_type: None,
            user_account_control: None,
            group_type: None,
            when_created_filetime: None,
            password_last_set_filetime: None,
            last_logon_time_stamp_filetime: None,
            account_expires_filetime: None,
            email: None,
            email_aliases: HashSet::new(),
            target_email: None,
            mailbox_guid: None,
            hide_from_address_book: false,
            sip_address: None,
            primary_group_id: None,
            primary_group_token: None,
            manager_dn: None,
            member_dns: Vec::new(),
            other_attributes_text: HashMap::new(),
            other_attributes_binary: HashMap::new(),
        }
    }

    /// Materializes a fresh `Entity` from this record. `tag` is assigned
    /// by the caller (`Store`); backlink fields start empty and are
    /// populated by ingestion.
    pub fn into_entity(self, default_domain_flat_name: &str) -> Entity {
        use super::filetime::filetime_to_utc;

        Entity {
            tag: 0,
            dn: self.dn,
            object_guid: self.object_guid.expect("caller drops records with no objectGuid"),
            class: self.class,
            sid: self.sid,
            sid_history: self.sid_history,
            sam_account_name: self.sam_account_name,
            user_principal_name: self.user_principal_name,
            domain_flat_name: self
                .domain_flat_name
                .unwrap_or_else(|| default_domain_flat_name.to_string()),
            sam_account_type: self.sam_account_type,
            user_account_control: self.user_account_control,
            group_type: self.group_type,
            when_created: self.when_created_filetime.and_then(filetime_to_utc),
            password_last_set: self.password_last_set_filetime.and_then(filetime_to_utc),
            last_logon_time_stamp: self.last_logon_time_stamp_filetime.and_then(filetime_to_utc),
            account_expires: self.account_expires_filetime.and_then(filetime_to_utc),
            email: self.email,
            email_aliases: self.email_aliases,
            target_email: self.target_email,
            mailbox_guid: self.mailbox_guid,
            hide_from_address_book: self.hide_from_address_book,
            sip_address: self.sip_address,
            primary_group_id: self.primary_group_id,
            primary_group_token: self.primary_group_token,
            manager_deferred_dn: self.manager_dn.map(DeferredDn),
            manager: None,
            manages: HashSet::new(),
            direct_members_deferred_dn: self.member_dns.into_iter().map(DeferredDn).collect(),
            direct_members: HashSet::new(),
            direct_member_ofs: HashSet::new(),
            other_attributes_text: self.other_attributes_text,
            other_attributes_binary: self.other_attributes_binary,
            status: EntityStatus::Exists,
            is_change_notified: false,
        }
    }
}
