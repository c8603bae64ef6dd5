//! Identifier types used throughout the cache.
//!
//! PV and VG identifiers are fixed-width, not necessarily NUL-terminated
//! strings in the on-disk format this cache mirrors (`ID_LEN` below matches
//! the historical 32-byte LVM identifier). We keep them as opaque byte
//! arrays rather than `String` so that padding/truncation happens once, at
//! construction, instead of being re-derived at every comparison.

use std::fmt;

/// Width of a PV/VG identifier, padding included.
pub const ID_LEN: usize = 32;

/// The distinguished empty VG name that denotes the orphan grouping.
pub const ORPHAN_VG_NAME: &str = "";

/// The sentinel lock name for the global lock.
pub const VG_GLOBAL: &str = "#global";

/// The sentinel lock name for the orphan lock.
pub const VG_ORPHANS: &str = "#orphans";

fn pad(s: &str) -> [u8; ID_LEN] {
    let mut buf = [0u8; ID_LEN];
    let bytes = s.as_bytes();
    let n = bytes.len().min(ID_LEN);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

fn trimmed(buf: &[u8; ID_LEN]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(ID_LEN);
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// A physical volume identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pvid([u8; ID_LEN]);

impl Pvid {
    pub fn new(s: &str) -> Self {
        Pvid(pad(s))
    }

    pub fn as_str(&self) -> String {
        trimmed(&self.0)
    }
}

impl fmt::Debug for Pvid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pvid({:?})", self.as_str())
    }
}

impl fmt::Display for Pvid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Pvid {
    fn from(s: &str) -> Self {
        Pvid::new(s)
    }
}

impl serde::Serialize for Pvid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Pvid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Pvid::new(&String::deserialize(deserializer)?))
    }
}

/// A volume group identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vgid([u8; ID_LEN]);

impl Vgid {
    pub fn new(s: &str) -> Self {
        Vgid(pad(s))
    }

    pub fn as_str(&self) -> String {
        trimmed(&self.0)
    }
}

impl fmt::Debug for Vgid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vgid({:?})", self.as_str())
    }
}

impl fmt::Display for Vgid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Vgid {
    fn from(s: &str) -> Self {
        Vgid::new(s)
    }
}

impl serde::Serialize for Vgid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Vgid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Vgid::new(&String::deserialize(deserializer)?))
    }
}

/// Opaque handle to a device, as resolved by the external device enumerator.
/// The cache never interprets this beyond equality/hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct DeviceId(pub u64);

/// A lock name: the global sentinel, the orphan sentinel, or a real VG name.
///
/// `Ord` on this type implements the lock acquisition order: global
/// first, then VG names lexicographically, then the orphan sentinel last.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockName {
    Global,
    Orphan,
    Vg(String),
}

impl LockName {
    pub fn for_vgname(vgname: &str) -> Self {
        if vgname == ORPHAN_VG_NAME {
            LockName::Orphan
        } else {
            LockName::Vg(vgname.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LockName::Global => VG_GLOBAL,
            LockName::Orphan => VG_ORPHANS,
            LockName::Vg(name) => name,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            LockName::Global => 0,
            LockName::Vg(_) => 1,
            LockName::Orphan => 2,
        }
    }
}

impl PartialOrd for LockName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LockName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (LockName::Vg(a), LockName::Vg(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
