use serde::{Deserialize, Serialize};

/// Lifecycle status of an entity within the store.
///
/// `Detecting` is a transient state used during a bulk-load sweep: every
/// existing entity is flipped to `Detecting` at the start of a full load,
/// flipped back to `Exists` by observation, and anything left `Detecting`
/// once the load completes is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityStatus {
    Exists,
    Detecting,
    Deleted,
}

/// Which feed most recently wrote an entity. Determines ingestion
/// priority: a bulk-load record must never overwrite a change-notified one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordSource {
    BulkLoad,
    ChangeNotify,
}

/// `sAMAccountType` as published by the directory. Values match the
/// well-known constants; unrecognized values round-trip through `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamAccountType {
    UserObject,
    GroupObject,
    AliasObject,
    ComputerObject,
    ForeignSecurityPrincipal,
    Other(u32),
}

impl SamAccountType {
    pub fn from_raw(v: u32) -> Self {
        match v {
            0x3000_0000 => Self::UserObject,
            0x1000_0000 => Self::GroupObject,
            0x2000_0000 => Self::AliasObject,
            0x0000_0100 | 0x0000_1000 => Self::ComputerObject,
            0x3000_0001 => Self::ForeignSecurityPrincipal,
            other => Self::Other(other),
        }
    }
}

/// `userAccountControl` bit flags (subset relevant to mirroring). Modeled
/// as a thin wrapper over the raw bitmask rather than a flags-crate type,
/// matching the plain-`u32` style the rest of this module uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccountControl(pub u32);

impl UserAccountControl {
    pub const ACCOUNT_DISABLE: u32 = 0x0002;
    pub const PASSWD_NOTREQD: u32 = 0x0020;
    pub const NORMAL_ACCOUNT: u32 = 0x0200;
    pub const DONT_EXPIRE_PASSWORD: u32 = 0x10000;
    pub const PASSWORD_EXPIRED: u32 = 0x800000;

    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn is_disabled(&self) -> bool {
        self.contains(Self::ACCOUNT_DISABLE)
    }
}

/// `groupType` bit flags: scope bits plus the security-enabled bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupType(pub u32);

impl GroupType {
    pub const GLOBAL_SCOPE: u32 = 0x0000_0002;
    pub const DOMAIN_LOCAL_SCOPE: u32 = 0x0000_0004;
    pub const UNIVERSAL_SCOPE: u32 = 0x0000_0008;
    pub const SECURITY_ENABLED: u32 = 0x8000_0000u32;

    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn is_security_enabled(&self) -> bool {
        self.contains(Self::SECURITY_ENABLED)
    }
}

/// A dot-joined class path, e.g. `"top.group"`, `"top.foreignSecurityPrincipal"`.
/// Stored as the raw string plus a cheap classifier for the handful of
/// classes the store's invariants care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectClass(pub String);

impl ObjectClass {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    fn last_segment(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    pub fn is_group(&self) -> bool {
        self.last_segment().eq_ignore_ascii_case("group")
    }

    pub fn is_foreign_security_principal(&self) -> bool {
        self.last_segment().eq_ignore_ascii_case("foreignSecurityPrincipal")
    }

    pub fn is_user(&self) -> bool {
        self.last_segment().eq_ignore_ascii_case("user")
    }

    pub fn is_computer(&self) -> bool {
        self.last_segment().eq_ignore_ascii_case("computer")
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self.last_segment().to_ascii_lowercase().as_str(),
            "organizationalunit" | "container" | "builtindomain"
        )
    }
}

impl std::fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_group_and_fsp() {
        assert!(ObjectClass::new("top.group").is_group());
        assert!(ObjectClass::new("top.foreignSecurityPrincipal").is_foreign_security_principal());
        assert!(!ObjectClass::new("top.user").is_group());
    }

    #[test]
    fn uac_disabled_bit() {
        let uac = UserAccountControl(UserAccountControl::NORMAL_ACCOUNT | UserAccountControl::ACCOUNT_DISABLE);
        assert!(uac.is_disabled());
        assert!(!UserAccountControl(UserAccountControl::NORMAL_ACCOUNT).is_disabled());
    }
}
