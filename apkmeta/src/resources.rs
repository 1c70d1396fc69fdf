use std::fmt;

/// Package id of the Android framework (`android.R`).
const FRAMEWORK_PACKAGE: u8 = 0x01;

/// A resource identifier `0xPPTTEEEE`: package, type and entry index.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceId(u32);

impl From<u32> for ResourceId {
    fn from(id: u32) -> Self {
        ResourceId(id)
    }
}

impl From<ResourceId> for u32 {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl ResourceId {
    pub const fn from_parts(package_id: u8, type_id: u8, entry_id: u16) -> ResourceId {
        ResourceId((package_id as u32) << 24 | (type_id as u32) << 16 | entry_id as u32)
    }

    pub fn package_id(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// 1-based index into the package's type string pool.
    pub fn type_id(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn entry_id(self) -> u16 {
        self.0 as u16
    }

    pub fn is_framework(self) -> bool {
        self.package_id() == FRAMEWORK_PACKAGE
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({:#010x})", self.0)
    }
}

/// Reference notation as printed by aapt, e.g. `@0x7f030000`.
impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:#010x}", self.0)
    }
}
