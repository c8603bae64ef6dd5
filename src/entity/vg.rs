//! `VgInfo` — per-(name, identifier) cached state.

use crate::bitflags_lite::bitflags_lite;
use crate::ids::{Vgid, ORPHAN_VG_NAME};
use crate::index::{PvKey, VgKey};

bitflags_lite! {
    /// Opaque VG status bits.
    pub struct VgStatus: u32 {
        const EXPORTED = 0b0000_0001;
        const RESIZEABLE = 0b0000_0010;
        const CLUSTERED = 0b0000_0100;
        const PARTIAL = 0b0000_1000;
    }
}

/// Summary of a VG as reported by a single device during a scan.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VgSummary {
    pub vgname: String,
    pub vgid: Vgid,
    pub status: VgStatus,
    pub creation_host: Option<String>,
    pub lock_type: Option<String>,
    pub system_id: Option<String>,
    /// `None` on the vg_read path; `Some` on a label scan.
    pub scan_summary: Option<ScanSummary>,
}

/// The `(seqno, checksum, size)` triple that two devices of the same VG may
/// disagree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScanSummary {
    pub seqno: u32,
    pub mda_checksum: u32,
    pub mda_size: usize,
}

/// One per (VG identifier) seen; multiple records may share a VG name.
#[derive(Debug, Clone)]
pub struct VgInfo {
    name: String,
    vgid: Vgid,
    fmt: Option<String>,
    status: VgStatus,
    creation_host: Option<String>,
    system_id: Option<String>,
    lock_type: Option<String>,
    mda_checksum: u32,
    mda_size: usize,
    seqno: u32,
    independent_metadata_location: bool,
    scan_summary_mismatch: bool,
    members: Vec<PvKey>,
    /// Collision link to the next VgInfo sharing this name.
    next: Option<VgKey>,
}

impl VgInfo {
    pub(crate) fn new(name: String, vgid: Vgid) -> Self {
        VgInfo {
            name,
            vgid,
            fmt: None,
            status: VgStatus::empty(),
            creation_host: None,
            system_id: None,
            lock_type: None,
            mda_checksum: 0,
            mda_size: 0,
            seqno: 0,
            independent_metadata_location: false,
            scan_summary_mismatch: false,
            members: Vec::new(),
            next: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_orphan(&self) -> bool {
        self.name == ORPHAN_VG_NAME
    }

    pub fn vgid(&self) -> Vgid {
        self.vgid
    }

    pub fn fmt(&self) -> Option<&str> {
        self.fmt.as_deref()
    }

    pub fn set_fmt(&mut self, fmt: Option<String>) {
        self.fmt = fmt;
    }

    pub fn status(&self) -> VgStatus {
        self.status
    }

    pub fn set_status(&mut self, status: VgStatus) {
        self.status = status;
    }

    pub fn is_exported(&self) -> bool {
        self.status.contains(VgStatus::EXPORTED)
    }

    pub fn creation_host(&self) -> Option<&str> {
        self.creation_host.as_deref()
    }

    pub fn set_creation_host(&mut self, host: Option<String>) {
        self.creation_host = host;
    }

    pub fn system_id(&self) -> Option<&str> {
        self.system_id.as_deref()
    }

    pub fn set_system_id(&mut self, id: Option<String>) {
        self.system_id = id;
    }

    pub fn lock_type(&self) -> Option<&str> {
        self.lock_type.as_deref()
    }

    pub fn set_lock_type(&mut self, lock_type: Option<String>) {
        self.lock_type = lock_type;
    }

    pub fn mda_checksum(&self) -> u32 {
        self.mda_checksum
    }

    pub fn mda_size(&self) -> usize {
        self.mda_size
    }

    pub fn seqno(&self) -> u32 {
        self.seqno
    }

    pub fn independent_metadata_location(&self) -> bool {
        self.independent_metadata_location
    }

    pub fn set_independent_metadata_location(&mut self, v: bool) {
        self.independent_metadata_location = v;
    }

    pub fn scan_summary_mismatch(&self) -> bool {
        self.scan_summary_mismatch
    }

    pub fn members(&self) -> &[PvKey] {
        &self.members
    }

    pub fn is_memberless(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn attach_member(&mut self, pv: PvKey) {
        if !self.members.contains(&pv) {
            self.members.push(pv);
        }
    }

    pub(crate) fn detach_member(&mut self, pv: PvKey) {
        self.members.retain(|&m| m != pv);
    }

    pub fn next(&self) -> Option<VgKey> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<VgKey>) {
        self.next = next;
    }

    /// First sight sets the summary fields; subsequent
    /// disagreeing sights set `scan_summary_mismatch` and otherwise preserve
    /// the first values.
    pub(crate) fn reconcile_scan_summary(&mut self, summary: &ScanSummary) {
        if self.seqno == 0 {
            self.seqno = summary.seqno;
        } else if self.seqno != summary.seqno {
            self.scan_summary_mismatch = true;
            return;
        }

        if self.mda_size == 0 {
            self.mda_checksum = summary.mda_checksum;
            self.mda_size = summary.mda_size;
        } else if self.mda_size != summary.mda_size || self.mda_checksum != summary.mda_checksum {
            self.scan_summary_mismatch = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(seqno: u32, checksum: u32, size: usize) -> ScanSummary {
        ScanSummary { seqno, mda_checksum: checksum, mda_size: size }
    }

    #[test]
    fn first_scan_summary_sets_fields() {
        let mut vg = VgInfo::new("vg0".into(), Vgid::new("A"));
        vg.reconcile_scan_summary(&summary(7, 0xAAAA, 512));
        assert_eq!(vg.seqno(), 7);
        assert_eq!(vg.mda_checksum(), 0xAAAA);
        assert_eq!(vg.mda_size(), 512);
        assert!(!vg.scan_summary_mismatch());
    }

    #[test]
    fn disagreeing_seqno_sets_mismatch_and_preserves_first() {
        let mut vg = VgInfo::new("vg0".into(), Vgid::new("A"));
        vg.reconcile_scan_summary(&summary(7, 0xAAAA, 512));
        vg.reconcile_scan_summary(&summary(8, 0xBBBB, 512));
        assert_eq!(vg.seqno(), 7, "seqno must stay at first-seen value");
        assert!(vg.scan_summary_mismatch());
    }

    #[test]
    fn orphan_detection() {
        let vg = VgInfo::new(String::new(), Vgid::new(""));
        assert!(vg.is_orphan());
    }

    #[test]
    fn attach_and_detach_member() {
        use crate::index::Index;
        let mut idx = Index::new();
        let pv_key = idx.test_alloc_pv_key();
        let mut vg = VgInfo::new("vg0".into(), Vgid::new("A"));
        vg.attach_member(pv_key);
        assert_eq!(vg.members(), &[pv_key]);
        vg.attach_member(pv_key);
        assert_eq!(vg.members().len(), 1, "attach is idempotent");
        vg.detach_member(pv_key);
        assert!(vg.is_memberless());
    }
}
