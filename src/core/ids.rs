use uuid::Uuid;

/// A dense, monotonically assigned integer identifying an entity for the
/// lifetime of the process. Never reused once assigned.
pub type Tag = u64;

/// The durable identity of a directory object, stable across renames.
pub type Guid = Uuid;

/// Lowercases a string for use as a case-insensitive map key. `byDn`,
/// `bySamAccountName`, `byUpn`, and `byEmail` all key on this normalized
/// form while the stored entity keeps its original casing.
pub fn ci_key(s: &str) -> String {
    s.to_lowercase()
}
