use std::sync::Arc;

use dirstore::{Guid, ObjectClass, RawRecord, RecordSource, SnapshotCodec, Store};

fn store() -> Store {
    Store::new("EXAMPLE", Arc::new(dirstore::NoopMetricSink))
}

fn user(dn: &str, guid: Guid) -> RawRecord {
    RawRecord::new(dn, guid, ObjectClass::new("top.user"))
}

fn group(dn: &str, guid: Guid) -> RawRecord {
    RawRecord::new(dn, guid, ObjectClass::new("top.group"))
}

#[test]
fn basic_ingestion_and_lookup() {
    let store = store();
    let g1 = Guid::new_v4();
    let mut rec = user("CN=A,DC=x", g1);
    rec.sam_account_name = Some("A".to_string());
    rec.sid = Some("S-1-5-21-111-222-333-1001".to_string());
    store.apply_record(rec, RecordSource::BulkLoad).unwrap();

    let by_dn = store.lookup_by_dn("CN=A,DC=x").expect("dn lookup");
    assert_eq!(by_dn.sam_account_name.as_deref(), Some("A"));

    let by_guid = store.lookup_by_guid(&g1).expect("guid lookup");
    assert_eq!(by_guid.sam_account_name.as_deref(), Some("A"));

    let by_sid = store.lookup_by_sid("S-1-5-21-111-222-333-1001").expect("sid lookup");
    assert_eq!(by_sid.sam_account_name.as_deref(), Some("A"));
}

#[test]
fn manager_reference_resolves_once_the_manager_arrives() {
    let store = store();
    let g1 = Guid::new_v4();
    let g2 = Guid::new_v4();

    let mut a = user("CN=A", g1);
    a.manager_dn = Some("CN=B".to_string());
    store.apply_record(a, RecordSource::BulkLoad).unwrap();

    let pending = store.lookup_by_dn("CN=A").unwrap();
    assert!(pending.manager.is_none());
    assert!(pending.manager_deferred_dn.is_some());

    store.apply_record(user("CN=B", g2), RecordSource::BulkLoad).unwrap();

    let a = store.lookup_by_dn("CN=A").unwrap();
    let b = store.lookup_by_dn("CN=B").unwrap();
    assert_eq!(a.manager, Some(b.tag));
    assert!(b.manages.contains(&a.tag));
}

#[test]
fn dn_change_moves_the_dn_index_entry_without_changing_the_tag() {
    let store = store();
    let g1 = Guid::new_v4();
    store.apply_record(user("CN=A", g1), RecordSource::BulkLoad).unwrap();
    let original_tag = store.lookup_by_dn("CN=A").unwrap().tag;

    store.apply_record(user("CN=A2", g1), RecordSource::BulkLoad).unwrap();

    assert!(store.lookup_by_dn("CN=A").is_none());
    let renamed = store.lookup_by_dn("CN=A2").expect("new dn present");
    assert_eq!(renamed.tag, original_tag);
}

#[test]
fn primary_group_membership_counts_toward_has_member_and_all_member_ofs() {
    let store = store();
    let g2 = Guid::new_v4();
    let g1 = Guid::new_v4();

    let mut grp = group("CN=Grp", g2);
    grp.primary_group_token = Some(513);
    store.apply_record(grp, RecordSource::BulkLoad).unwrap();

    let mut usr = user("CN=U", g1);
    usr.primary_group_id = Some(513);
    store.apply_record(usr, RecordSource::BulkLoad).unwrap();

    let group_tag = store.lookup_by_guid(&g2).unwrap().tag;
    let user_tag = store.lookup_by_guid(&g1).unwrap().tag;

    assert!(store.has_member(group_tag, user_tag));
    assert!(store.all_member_ofs(user_tag).contains(&group_tag));
}

#[test]
fn change_notify_priority_survives_a_stale_bulk_load_replay() {
    let store = store();
    let g1 = Guid::new_v4();

    store.apply_record(user("CN=A-old", g1), RecordSource::BulkLoad).unwrap();
    store.apply_record(user("CN=A-new", g1), RecordSource::ChangeNotify).unwrap();
    store.apply_record(user("CN=A-old", g1), RecordSource::BulkLoad).unwrap();

    assert!(store.lookup_by_dn("CN=A-new").is_some());
    assert!(store.lookup_by_dn("CN=A-old").is_none());
}

#[test]
fn cyclic_group_membership_terminates_and_includes_both_groups() {
    let store = store();
    let g1_guid = Guid::new_v4();
    let g2_guid = Guid::new_v4();

    let mut g1 = group("CN=G1", g1_guid);
    g1.member_dns = vec!["CN=G2".to_string()];
    store.apply_record(g1, RecordSource::BulkLoad).unwrap();

    let mut g2 = group("CN=G2", g2_guid);
    g2.member_dns = vec!["CN=G1".to_string()];
    store.apply_record(g2, RecordSource::BulkLoad).unwrap();

    let g1_tag = store.lookup_by_guid(&g1_guid).unwrap().tag;
    let g2_tag = store.lookup_by_guid(&g2_guid).unwrap().tag;

    let members = store.all_members(g1_tag);
    assert!(members.contains(&g1_tag));
    assert!(members.contains(&g2_tag));
    assert_eq!(members.len(), 2);
    assert!(store.has_member(g1_tag, g1_tag));
}

#[test]
fn applying_the_same_record_twice_is_idempotent() {
    let store = store();
    let g1 = Guid::new_v4();
    let mut rec = user("CN=A", g1);
    rec.sam_account_name = Some("a".to_string());

    store.apply_record(rec.clone(), RecordSource::BulkLoad).unwrap();
    let tag_after_first = store.lookup_by_dn("CN=A").unwrap().tag;

    store.apply_record(rec, RecordSource::BulkLoad).unwrap();
    let after_second = store.lookup_by_dn("CN=A").unwrap();

    assert_eq!(after_second.tag, tag_after_first);
    assert_eq!(after_second.sam_account_name.as_deref(), Some("a"));
    assert_eq!(store.iter_live().count(), 1);
}

#[test]
fn bulk_load_sweep_deletes_entities_never_redetected() {
    let store = store();
    let survivor_guid = Guid::new_v4();
    let victim_guid = Guid::new_v4();

    store.apply_record(user("CN=Survivor", survivor_guid), RecordSource::BulkLoad).unwrap();
    store.apply_record(user("CN=Victim", victim_guid), RecordSource::BulkLoad).unwrap();

    store.mark_all_as_detecting();
    store.apply_record(user("CN=Survivor", survivor_guid), RecordSource::BulkLoad).unwrap();
    store.delete_undetected();

    assert!(store.lookup_by_dn("CN=Survivor").is_some());
    assert!(store.lookup_by_dn("CN=Victim").is_none());
}

#[test]
fn snapshot_round_trips_through_a_file_and_preserves_the_graph() {
    let store = store();
    let g1 = Guid::new_v4();
    let g2 = Guid::new_v4();

    let mut grp = group("CN=Grp", g1);
    grp.member_dns = vec!["CN=Member".to_string()];
    store.apply_record(grp, RecordSource::BulkLoad).unwrap();
    store.apply_record(user("CN=Member", g2), RecordSource::BulkLoad).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.bin");
    SnapshotCodec::save(&path, &store.snapshot_entities()).unwrap();

    let loaded = SnapshotCodec::load(&path).unwrap().expect("snapshot present");
    let rebuilt = Store::rebuild_from_snapshot("EXAMPLE", Arc::new(dirstore::NoopMetricSink), loaded);

    let group_tag = rebuilt.lookup_by_dn("CN=Grp").unwrap().tag;
    let member_tag = rebuilt.lookup_by_dn("CN=Member").unwrap().tag;
    assert!(rebuilt.has_member(group_tag, member_tag));
    assert!(rebuilt.all_member_ofs(member_tag).contains(&group_tag));
}

#[test]
fn missing_snapshot_file_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.bin");
    assert!(SnapshotCodec::load(&path).unwrap().is_none());
}
