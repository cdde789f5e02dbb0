//! `SqlSink` — the pluggable SQL exporter: an external collaborator that
//! accepts the serialized entity list. This crate does not talk to a
//! database; it defines the seam and a JSON view a real implementation (or
//! `dirstore inspect --json`) can serialize without reaching into
//! `Entity`'s internal tag/backlink bookkeeping.

use serde::Serialize;

use crate::core::{Entity, Result};

/// A flattened, serializable view of one live entity — the shape handed to
/// a `SqlSink` and to the `inspect` CLI subcommand's `--json` output.
#[derive(Debug, Serialize)]
pub struct EntityView {
    pub tag: crate::core::Tag,
    pub dn: String,
    pub object_guid: crate::core::Guid,
    pub class: String,
    pub sam_account_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub email: Option<String>,
    pub is_group: bool,
}

impl From<&Entity> for EntityView {
    fn from(e: &Entity) -> Self {
        Self {
            tag: e.tag,
            dn: e.dn.clone(),
            object_guid: e.object_guid,
            class: e.class.to_string(),
            sam_account_name: e.sam_account_name.clone(),
            user_principal_name: e.user_principal_name.clone(),
            email: e.email.clone(),
            is_group: e.is_group(),
        }
    }
}

/// Accepts the serialized entity list on a cadence the host application
/// controls (e.g. after every snapshot write). Out of scope to implement
/// against a real database here — `NoopSqlSink` is the library default.
pub trait SqlSink: Send + Sync {
    fn export(&self, entities: &[EntityView]) -> Result<()>;
}

pub struct NoopSqlSink;

impl SqlSink for NoopSqlSink {
    fn export(&self, _entities: &[EntityView]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ObjectClass, RawRecord};
    use uuid::Uuid;

    #[test]
    fn entity_view_flattens_the_fields_a_sink_needs() {
        let mut raw = RawRecord::new("CN=A,DC=x", Uuid::new_v4(), ObjectClass::new("top.group"));
        raw.sam_account_name = Some("A".to_string());
        let entity = raw.into_entity("EXAMPLE");
        let view = EntityView::from(&entity);
        assert_eq!(view.dn, "CN=A,DC=x");
        assert_eq!(view.sam_account_name.as_deref(), Some("A"));
        assert!(view.is_group);
    }

    #[test]
    fn noop_sink_accepts_anything() {
        assert!(NoopSqlSink.export(&[]).is_ok());
    }
}
