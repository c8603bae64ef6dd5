//! External collaborators. These are interfaces only — the label
//! reader, metadata codec, device enumerator, and lock manager all live
//! outside this cache; it only defines the shape it expects from them.

use crate::entity::VgSummary;
use crate::ids::{DeviceId, Pvid};

/// One PV discovered by a label scan, fed into the update pipeline.
#[derive(Debug, Clone)]
pub struct ScannedPv {
    pub pvid: Pvid,
    pub device: DeviceId,
    pub fmt: Option<String>,
    pub vg_summary: Option<VgSummary>,
}

/// Provides `(PV identifier, device, optional VG summary)` tuples.
/// The cache does not prescribe an on-disk format; this is a pure producer.
pub trait LabelScanner {
    /// Scans all visible devices, reporting every PV label found.
    fn scan_all(&mut self) -> Vec<ScannedPv>;

    /// Scans exactly the given devices (used by per-VG rescan).
    fn scan_devices(&mut self, devices: &[DeviceId]) -> Vec<ScannedPv>;
}

/// A VG's metadata as an opaque serialized buffer; round-trip fidelity
/// through `MetadataCodec` is the only contract.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SerializedVg(pub String);

/// Parsed VG content produced by `MetadataCodec::import` and consumed by the
/// saved-VG store.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ParsedVg {
    pub name: String,
    pub vgid: crate::ids::Vgid,
    pub seqno: u32,
    pub raw: SerializedVg,
}

/// Exports/reimports VG metadata. The saved-VG store calls `export`
/// then `import` to produce an independent copy decoupled from the live
/// structure's lifetime.
pub trait MetadataCodec {
    fn export(&self, vgid: crate::ids::Vgid, name: &str, seqno: u32) -> Result<SerializedVg, String>;
    fn import(&self, buf: &SerializedVg) -> Result<ParsedVg, String>;
}

/// A metadata format type: declares whether it owns independent
/// metadata areas and, if so, how to scan them.
pub trait FormatType {
    fn name(&self) -> &str;

    /// Whether this format reads metadata from a source other than the PV
    /// itself (tracked as `independent_metadata_location`).
    fn has_independent_metadata_location(&self) -> bool {
        false
    }

    fn create_instance(&self) -> Box<dyn FormatType>;

    /// Invoked by scan orchestration for formats that own independent
    /// metadata areas.
    fn scan(&mut self) -> Vec<ScannedPv> {
        Vec::new()
    }
}

/// Resolves a device name to identity facts the duplicate arbitrator needs.
pub trait DeviceEnumerator {
    fn device_size(&self, dev: DeviceId) -> Option<u64>;
    fn is_used_by_lv(&self, dev: DeviceId) -> bool;
    fn has_mounted_fs(&self, dev: DeviceId) -> bool;
    fn is_device_mapper(&self, dev: DeviceId) -> bool;
    fn subsystem(&self, dev: DeviceId) -> Option<String>;
    /// Component devices of the multi-device (md) subsystem are known-benign
    /// and filtered from the unused-duplicates list.
    fn is_multi_device_subsystem(&self, dev: DeviceId) -> bool;
}
