//! SnapshotCodec — self-describing binary persistence for the full
//! `TagTable`.
//!
//! Each written element is an explicit, versioned `rmp_serde` encoding of
//! one `Entity`, framed with its own length prefix — the same
//! length-prefixed-msgpack discipline used for write-ahead-log entries and
//! full-snapshot bodies elsewhere. `elementSize` is therefore reserved
//! (written as `0`) rather than a fixed stride, since elements are
//! variable length; the schema `descriptor` is what guards against
//! incompatible layouts, not a fixed byte count. Durability comes from a
//! temp-file + `fs::rename` write pattern rather than in-place writes.
//!
//! Deleted slots are not written at all — only live entities, each
//! carrying its own `tag` — so `elementsWritten` (live count) and
//! `originalArrayLength` (the full backing array length, including
//! deleted slots) can differ. On load, a `Vec<Option<Entity>>` of length
//! `originalArrayLength` is allocated, and each decoded entity is placed
//! at its own `tag` index. Indexes are rebuilt afterward by
//! `Store::rebuild_from_snapshot`, which deliberately never invokes the
//! deferred resolver — a snapshot is internally consistent by
//! construction.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::core::{DirError, Entity, Result};

const MAGIC_START: u32 = 0xFEED_BEEF;
const MAGIC_MID: u32 = 0xCAFE_F00D;
const MAGIC_END: u32 = 0xDEAD_BEEF;

/// NUL-joined field list, in `Entity`'s declaration order. Any change to
/// `Entity`'s shape must update this descriptor, which is exactly the
/// point: a stale descriptor makes an incompatible cache file fail fast
/// instead of decoding into garbage.
const FIELD_DESCRIPTOR: &str = concat!(
    "tag\0dn\0object_guid\0class\0sid\0sid_history\0sam_account_name\0",
    "user_principal_name\0domain_flat_name\0sam_account_type\0",
    "user_account_control\0group_type\0when_created\0password_last_set\0",
    "last_logon_time_stamp\0account_expires\0email\0email_aliases\0",
    "target_email\0mailbox_guid\0hide_from_address_book\0sip_address\0",
    "primary_group_id\0primary_group_token\0manager_deferred_dn\0manager\0",
    "manages\0direct_members_deferred_dn\0direct_members\0direct_member_ofs\0",
    "other_attributes_text\0other_attributes_binary\0status\0is_change_notified",
);

pub struct SnapshotCodec;

impl SnapshotCodec {
    /// Writes `entities` (tag-ordered, `None` for deleted slots) to
    /// `path` via a temp file + atomic rename. Only live entities are
    /// written; `original_len` preserves the full array length so tags
    /// can be reconstructed on load.
    pub fn save(path: &Path, entities: &im::Vector<Option<Arc<Entity>>>) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| DirError::SnapshotIo(format!("failed to create snapshot directory: {e}")))?;
            }
        }

        let temp_path = path.with_extension("tmp");
        let temp_file = File::create(&temp_path).map_err(|e| DirError::SnapshotIo(format!("failed to create temp file: {e}")))?;
        let mut writer = BufWriter::new(temp_file);

        let live: Vec<&Arc<Entity>> = entities.iter().filter_map(|slot| slot.as_ref()).collect();

        writer.write_all(&MAGIC_START.to_le_bytes()).map_err(io_err)?;
        writer.write_all(&0u32.to_le_bytes()).map_err(io_err)?; // elementSize: reserved, see module doc
        let descriptor_bytes = FIELD_DESCRIPTOR.as_bytes();
        writer.write_all(&(descriptor_bytes.len() as u32).to_le_bytes()).map_err(io_err)?;
        writer.write_all(descriptor_bytes).map_err(io_err)?;

        writer.write_all(&MAGIC_MID.to_le_bytes()).map_err(io_err)?;
        writer.write_all(&(live.len() as u32).to_le_bytes()).map_err(io_err)?;
        writer.write_all(&(entities.len() as u32).to_le_bytes()).map_err(io_err)?;

        for entity in live {
            let encoded = rmp_serde::to_vec(entity.as_ref())
                .map_err(|e| DirError::SnapshotFormat(format!("failed to encode entity {}: {e}", entity.tag)))?;
            writer.write_all(&(encoded.len() as u32).to_le_bytes()).map_err(io_err)?;
            writer.write_all(&encoded).map_err(io_err)?;
        }

        writer.write_all(&MAGIC_END.to_le_bytes()).map_err(io_err)?;
        writer.flush().map_err(io_err)?;
        writer.get_mut().sync_all().map_err(io_err)?;
        fs::rename(&temp_path, path).map_err(|e| DirError::SnapshotIo(format!("failed to rename snapshot into place: {e}")))?;
        Ok(())
    }

    /// Loads a snapshot, returning `Ok(None)` if the file does not exist —
    /// the caller should start empty in that case.
    pub fn load(path: &Path) -> Result<Option<Vec<Option<Entity>>>> {
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(path).map_err(|e| DirError::SnapshotIo(format!("failed to open snapshot: {e}")))?;
        let mut reader = BufReader::new(file);

        let magic_start = read_u32(&mut reader)?;
        if magic_start != MAGIC_START {
            return Err(DirError::SnapshotFormat("missing MAGIC_START".to_string()));
        }
        let _element_size = read_u32(&mut reader)?;
        let descriptor_len = read_u32(&mut reader)? as usize;
        let mut descriptor = vec![0u8; descriptor_len];
        reader.read_exact(&mut descriptor).map_err(io_err)?;
        if descriptor != FIELD_DESCRIPTOR.as_bytes() {
            return Err(DirError::SnapshotFormat("incompatible element layout".to_string()));
        }

        let magic_mid = read_u32(&mut reader)?;
        if magic_mid != MAGIC_MID {
            return Err(DirError::SnapshotFormat("missing MAGIC_MID".to_string()));
        }
        let elements_written = read_u32(&mut reader)? as usize;
        let original_len = read_u32(&mut reader)? as usize;

        let mut slots: Vec<Option<Entity>> = vec![None; original_len];
        for _ in 0..elements_written {
            let len = read_u32(&mut reader)? as usize;
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf).map_err(io_err)?;
            let entity: Entity = rmp_serde::from_slice(&buf)
                .map_err(|e| DirError::SnapshotFormat(format!("failed to decode entity: {e}")))?;
            let tag = entity.tag as usize;
            if tag >= slots.len() {
                return Err(DirError::SnapshotFormat(format!("entity tag {tag} exceeds originalArrayLength {original_len}")));
            }
            slots[tag] = Some(entity);
        }

        let magic_end = read_u32(&mut reader)?;
        if magic_end != MAGIC_END {
            return Err(DirError::SnapshotFormat("missing MAGIC_END".to_string()));
        }

        Ok(Some(slots))
    }
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(io_err)?;
    Ok(u32::from_le_bytes(buf))
}

fn io_err(e: std::io::Error) -> DirError {
    DirError::SnapshotIo(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ObjectClass, RawRecord};
    use tempfile::tempdir;
    use uuid::Uuid;

    fn sample(tag: crate::core::Tag, dn: &str) -> Entity {
        let mut e = RawRecord::new(dn, Uuid::new_v4(), ObjectClass::new("top.user")).into_entity("EXAMPLE");
        e.tag = tag;
        e
    }

    #[test]
    fn round_trips_live_entities_and_preserves_gaps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.cache");

        let mut v: im::Vector<Option<Arc<Entity>>> = im::Vector::new();
        v.push_back(Some(Arc::new(sample(0, "CN=A"))));
        v.push_back(None); // tag 1 was deleted
        v.push_back(Some(Arc::new(sample(2, "CN=C"))));

        SnapshotCodec::save(&path, &v).expect("save should succeed");
        let loaded = SnapshotCodec::load(&path).expect("load should succeed").expect("file should exist");

        assert_eq!(loaded.len(), 3);
        assert!(loaded[1].is_none());
        assert_eq!(loaded[0].as_ref().unwrap().dn, "CN=A");
        assert_eq!(loaded[2].as_ref().unwrap().dn, "CN=C");
    }

    #[test]
    fn missing_file_yields_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.cache");
        assert!(SnapshotCodec::load(&path).unwrap().is_none());
    }

    #[test]
    fn descriptor_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.cache");
        let mut writer = BufWriter::new(File::create(&path).unwrap());
        writer.write_all(&MAGIC_START.to_le_bytes()).unwrap();
        writer.write_all(&0u32.to_le_bytes()).unwrap();
        let bogus = b"not.the.real.descriptor";
        writer.write_all(&(bogus.len() as u32).to_le_bytes()).unwrap();
        writer.write_all(bogus).unwrap();
        writer.flush().unwrap();

        let err = SnapshotCodec::load(&path).unwrap_err();
        assert!(matches!(err, DirError::SnapshotFormat(_)));
    }
}
