//! `PvInfo` — per-device cached state.

use crate::ids::{DeviceId, Pvid};

/// A metadata area on a PV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetadataArea {
    pub offset: u64,
    pub size: u64,
    /// Whether tools should skip this MDA (e.g. user-requested `--metadataignore`).
    pub ignored: bool,
}

/// A data area on a PV (the region usable for extents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DataArea {
    pub offset: u64,
    pub size: u64,
}

/// A bootloader area on a PV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BootloaderArea {
    pub offset: u64,
    pub size: u64,
}

use crate::bitflags_lite::bitflags_lite;

bitflags_lite! {
    /// Opaque PV status bits, including the lock-state mirror.
    pub struct PvStatus: u32 {
        const LOCKED = 0b0000_0001;
        const ALLOCATABLE = 0b0000_0010;
        const EXPORTED = 0b0000_0100;
        const MISSING = 0b0000_1000;
    }
}

/// One per device believed to carry a PV label.
#[derive(Debug, Clone)]
pub struct PvInfo {
    pvid: Pvid,
    dev: DeviceId,
    /// Owning VG record; `None` means "not yet bound" (not the same as orphan —
    /// an orphan PV *is* bound, to the orphan VgInfo).
    vg: Option<crate::index::VgKey>,
    /// Opaque label/format-type handles, as resolved by the external labeller.
    label: Option<String>,
    fmt: Option<String>,
    device_size: u64,
    ext_version: u32,
    ext_flags: u32,
    status: PvStatus,
    mdas: Vec<MetadataArea>,
    das: Vec<DataArea>,
    bas: Vec<BootloaderArea>,
}

impl PvInfo {
    pub(crate) fn new(pvid: Pvid, dev: DeviceId, fmt: Option<String>, label: Option<String>) -> Self {
        PvInfo {
            pvid,
            dev,
            vg: None,
            label,
            fmt,
            device_size: 0,
            ext_version: 0,
            ext_flags: 0,
            status: PvStatus::empty(),
            mdas: Vec::new(),
            das: Vec::new(),
            bas: Vec::new(),
        }
    }

    pub fn pvid(&self) -> Pvid {
        self.pvid
    }

    pub fn device(&self) -> DeviceId {
        self.dev
    }

    pub(crate) fn set_device(&mut self, dev: DeviceId) {
        self.dev = dev;
    }

    pub fn vg(&self) -> Option<crate::index::VgKey> {
        self.vg
    }

    pub(crate) fn set_vg(&mut self, vg: Option<crate::index::VgKey>) {
        self.vg = vg;
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    pub fn fmt(&self) -> Option<&str> {
        self.fmt.as_deref()
    }

    pub(crate) fn set_fmt(&mut self, fmt: Option<String>) {
        self.fmt = fmt;
    }

    pub fn device_size(&self) -> u64 {
        self.device_size
    }

    pub fn set_device_size(&mut self, size: u64) {
        self.device_size = size;
    }

    pub fn ext_version(&self) -> u32 {
        self.ext_version
    }

    pub fn set_ext_version(&mut self, version: u32) {
        self.ext_version = version;
    }

    pub fn ext_flags(&self) -> u32 {
        self.ext_flags
    }

    pub fn set_ext_flags(&mut self, flags: u32) {
        self.ext_flags = flags;
    }

    pub fn is_locked(&self) -> bool {
        self.status.contains(PvStatus::LOCKED)
    }

    pub(crate) fn set_locked(&mut self, locked: bool) {
        self.status.set(PvStatus::LOCKED, locked);
    }

    pub fn status(&self) -> PvStatus {
        self.status
    }

    pub fn set_status(&mut self, status: PvStatus) {
        self.status = status;
    }

    pub fn mdas(&self) -> &[MetadataArea] {
        &self.mdas
    }

    pub fn das(&self) -> &[DataArea] {
        &self.das
    }

    pub fn bas(&self) -> &[BootloaderArea] {
        &self.bas
    }

    pub fn add_mda(&mut self, mda: MetadataArea) {
        self.mdas.push(mda);
    }

    pub fn add_da(&mut self, da: DataArea) {
        self.das.push(da);
    }

    pub fn add_ba(&mut self, ba: BootloaderArea) {
        self.bas.push(ba);
    }

    pub fn clear_mdas(&mut self) {
        self.mdas.clear();
    }

    pub fn clear_das(&mut self) {
        self.das.clear();
    }

    pub fn clear_bas(&mut self) {
        self.bas.clear();
    }

    /// Zero or more MDAs is always valid, but a PV reporting no MDAs
    /// belongs in the orphan VG by default — used by the pipeline when
    /// binding a PV for the first time.
    pub fn mdas_empty(&self) -> bool {
        self.mdas.is_empty() || self.mdas.iter().all(|m| m.ignored)
    }

    /// A bootloader-area count greater than one is invalid.
    pub fn has_valid_ba_count(&self) -> bool {
        self.bas.len() <= 1
    }

    /// A data-area count other than one is invalid when populating a
    /// physical-volume view.
    pub fn has_valid_da_count_for_pv_view(&self) -> bool {
        self.das.len() == 1
    }
}

/// Caller-provided physical-volume view populated by `Index::populate_pv_view`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PvView {
    pub device_size: u64,
    pub ext_version: u32,
    pub ext_flags: u32,
    pub das: Vec<DataArea>,
    pub bas: Vec<BootloaderArea>,
}

impl PvInfo {
    /// Fills `view` from this record's cached fields, enforcing the
    /// invariants (bootloader-area count <= 1, exactly one data area).
    pub fn populate_pv_view(&self, view: &mut PvView) -> Result<(), &'static str> {
        if !self.has_valid_ba_count() {
            return Err("bootloader-area count exceeds one");
        }
        if !self.has_valid_da_count_for_pv_view() {
            return Err("data-area count other than one");
        }
        view.device_size = self.device_size;
        view.ext_version = self.ext_version;
        view.ext_flags = self.ext_flags;
        view.das = self.das.clone();
        view.bas = self.bas.clone();
        Ok(())
    }
}
