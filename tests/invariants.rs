//! Property-based invariant checks: whatever sequence of bulk-load
//! records the store ingests, the cross-structure invariants over the
//! entity graph must hold afterward, and replaying the same sequence
//! again must not change the result (idempotence).

use std::collections::HashSet;

use dirstore::{Guid, ObjectClass, RawRecord, RecordSource, Store};
use proptest::prelude::*;

const UNIVERSE: usize = 5;

fn guid_for(slot: usize) -> Guid {
    Guid::from_u128(slot as u128 + 1)
}

fn dn_for(slot: usize) -> String {
    format!("CN=Entity{slot}")
}

#[derive(Debug, Clone)]
struct Op {
    slot: usize,
    is_group: bool,
    manager_slot: Option<usize>,
    primary_group_id: Option<u32>,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    (
        0..UNIVERSE,
        any::<bool>(),
        proptest::option::of(0..UNIVERSE),
        proptest::option::of(prop_oneof![Just(1000u32), Just(1001u32)]),
    )
        .prop_map(|(slot, is_group, manager_slot, primary_group_id)| Op {
            slot,
            is_group,
            manager_slot: manager_slot.filter(|m| *m != slot),
            primary_group_id,
        })
}

fn apply_ops(store: &Store, ops: &[Op]) {
    for op in ops {
        let class = if op.is_group { "top.group" } else { "top.user" };
        let mut rec = RawRecord::new(dn_for(op.slot), guid_for(op.slot), ObjectClass::new(class));
        if let Some(m) = op.manager_slot {
            rec.manager_dn = Some(dn_for(m));
        }
        if op.is_group {
            // Every group publishes a token derived from its own slot so
            // `primary_group_id` values in the 1000..1002 range can resolve
            // against whichever slot currently holds that token.
            rec.primary_group_token = Some(1000 + op.slot as u32);
        } else {
            rec.primary_group_id = op.primary_group_id;
        }
        store.apply_record(rec, RecordSource::BulkLoad).unwrap();
    }
}

fn check_invariants(store: &Store) {
    let live: Vec<_> = store.iter_live().collect();

    let mut seen_guids = HashSet::new();
    for (tag, entity) in &live {
        assert_eq!(entity.tag, *tag, "slot's own tag must match its TagTable index");
        assert!(seen_guids.insert(entity.object_guid), "byGuid must be injective over live entities");
        assert_eq!(
            store.lookup_by_guid(&entity.object_guid).map(|e| e.tag),
            Some(*tag),
            "byGuid must route back to the same tag it was installed under"
        );
    }

    let mut seen_dns = HashSet::new();
    for (tag, entity) in &live {
        assert!(seen_dns.insert(entity.dn.to_lowercase()), "byDn must be bijective over live entities");
        assert_eq!(store.lookup_by_dn(&entity.dn).map(|e| e.tag), Some(*tag));
    }

    for (tag, entity) in &live {
        if let Some(manager_tag) = entity.manager {
            let manager = store.get(manager_tag).expect("resolved manager must still exist");
            assert!(manager.manages.contains(tag), "manager.manages must contain every entity it manages");
        }
        for managed_tag in &entity.manages {
            let managed = store.get(*managed_tag).expect("a manages-backlink target must still exist");
            assert_eq!(managed.manager, Some(*tag), "manages must be the exact inverse of manager");
        }

        for member_tag in &entity.direct_members {
            let member = store.get(*member_tag).expect("a direct member must still exist");
            assert!(member.direct_member_ofs.contains(tag), "directMemberOfs must mirror every directMembers edge");
        }
        for group_tag in &entity.direct_member_ofs {
            let group = store.get(*group_tag).expect("a directMemberOfs target must still exist");
            assert!(group.direct_members.contains(tag), "directMembers must mirror every directMemberOfs edge");
        }

        if let Some(pgid) = entity.primary_group_id {
            assert!(
                store.primary_group_members(pgid).contains(tag),
                "primaryGroupMembers[p] must contain every entity whose primaryGroupId resolves to p"
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_after_any_sequence_of_bulk_load_records(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let store = Store::new("EXAMPLE", std::sync::Arc::new(dirstore::NoopMetricSink));
        apply_ops(&store, &ops);
        check_invariants(&store);
    }

    #[test]
    fn replaying_the_same_sequence_is_idempotent(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let store = Store::new("EXAMPLE", std::sync::Arc::new(dirstore::NoopMetricSink));
        apply_ops(&store, &ops);
        let before: HashSet<_> = store.iter_live().map(|(tag, e)| (tag, e.dn.clone(), e.manager, e.primary_group_id)).collect();

        apply_ops(&store, &ops);
        let after: HashSet<_> = store.iter_live().map(|(tag, e)| (tag, e.dn.clone(), e.manager, e.primary_group_id)).collect();

        prop_assert_eq!(before, after);
        check_invariants(&store);
    }
}
