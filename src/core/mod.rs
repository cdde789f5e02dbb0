//! Core types shared across the store, sync pipeline, and snapshot codec.

pub mod entity;
pub mod enums;
pub mod error;
pub mod filetime;
pub mod ids;

pub use entity::{DeferredDn, Entity, RawRecord};
pub use enums::{EntityStatus, GroupType, ObjectClass, RecordSource, SamAccountType, UserAccountControl};
pub use error::{DirError, Result};
pub use ids::{Guid, Tag, ci_key};
