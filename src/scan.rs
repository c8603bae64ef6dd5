//! Scan orchestration: a thin driver that invokes the external label
//! scanner, feeds results into the update pipeline, then runs the
//! arbitrator.

use tracing::debug;

use crate::duplicates::{arbitrate, ArbitrationResult};
use crate::error::{CacheError, Result};
use crate::external::{DeviceEnumerator, FormatType, LabelScanner};
use crate::ids::{DeviceId, Pvid, Vgid};
use crate::index::Index;
use crate::pipeline::update_pv;

/// Drives a full scan. Guards against recursive scans with
/// a reentrancy flag, since a lookup that fails to resolve a PV identifier
/// may otherwise try to restart the scan from inside another scan.
#[derive(Debug, Default)]
pub struct ScanOrchestrator {
    scanning: bool,
    /// Carried across arbitration passes within one command for the
    /// stability guarantee.
    unused_duplicates: Vec<DeviceId>,
}

impl ScanOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn unused_duplicates(&self) -> &[DeviceId] {
        &self.unused_duplicates
    }

    /// Runs a full scan pass: refresh, reset duplicates, scan, arbitrate,
    /// scan independent-metadata formats. Returns the number of non-orphan
    /// VGs indexed afterward.
    pub fn scan(
        &mut self,
        index: &mut Index,
        hostname: &str,
        scanner: &mut dyn LabelScanner,
        enumerator: &dyn DeviceEnumerator,
        independent_formats: &mut [Box<dyn FormatType>],
    ) -> Result<usize> {
        if self.scanning {
            return Err(CacheError::AllocationFailed("recursive scan attempted".into()));
        }
        self.scanning = true;
        let result = self.scan_inner(index, hostname, scanner, enumerator, independent_formats);
        self.scanning = false;
        result
    }

    fn scan_inner(
        &mut self,
        index: &mut Index,
        hostname: &str,
        scanner: &mut dyn LabelScanner,
        enumerator: &dyn DeviceEnumerator,
        independent_formats: &mut [Box<dyn FormatType>],
    ) -> Result<usize> {
        // Step 1: refresh filters is an external-scanner concern; invoking
        // `scan_all` below is what triggers it in that collaborator.
        // Step 2: clear the found-duplicates list.
        let mut found_duplicates: Vec<(Pvid, DeviceId)> = Vec::new();

        // Step 3: invoke the external label scanner, feed the pipeline.
        for scanned in scanner.scan_all() {
            let mut dup_devices = Vec::new();
            update_pv(
                index,
                hostname,
                scanned.pvid,
                scanned.device,
                scanned.fmt,
                scanned.vg_summary.as_ref(),
                &mut dup_devices,
            );
            for dev in dup_devices {
                found_duplicates.push((scanned.pvid, dev));
            }
        }

        // Step 4: arbitrate and apply drop/add if duplicates were found.
        if !found_duplicates.is_empty() {
            let result = arbitrate(index, enumerator, &found_duplicates, &self.unused_duplicates);
            self.apply_arbitration(index, hostname, scanner, &result);
            self.unused_duplicates = result.unused_duplicates;
        }

        // Step 5: formats owning independent metadata areas get their own
        // scan invocation.
        for format in independent_formats.iter_mut() {
            if !format.has_independent_metadata_location() {
                continue;
            }
            for scanned in format.scan() {
                let mut dup_devices = Vec::new();
                update_pv(
                    index,
                    hostname,
                    scanned.pvid,
                    scanned.device,
                    scanned.fmt,
                    scanned.vg_summary.as_ref(),
                    &mut dup_devices,
                );
            }
        }

        // Step 6: number of non-orphan VGs indexed.
        Ok(index.registry().iter().filter(|k| index.vg(**k).map(|vg| !vg.is_orphan()).unwrap_or(false)).count())
    }

    fn apply_arbitration(
        &mut self,
        index: &mut Index,
        hostname: &str,
        scanner: &mut dyn LabelScanner,
        result: &ArbitrationResult,
    ) {
        for dropped in &result.drop_set {
            if let Some(key) = index_pv_key_by_device(index, *dropped) {
                index.delete_pv(key);
            }
        }

        if result.add_set.is_empty() {
            return;
        }
        for scanned in scanner.scan_devices(&result.add_set) {
            let mut dup_devices = Vec::new();
            update_pv(
                index,
                hostname,
                scanned.pvid,
                scanned.device,
                scanned.fmt,
                scanned.vg_summary.as_ref(),
                &mut dup_devices,
            );
        }
    }

    /// Per-VG rescan: collects the VG's current members, deletes every
    /// PVInfo (destroying the VGInfo), rescans those devices, and verifies
    /// the VGInfo reappeared. A no-op for VGs with
    /// `independent_metadata_location` set, since re-reading devices would
    /// destroy associations established from the independent source.
    pub fn rescan_vg(
        &mut self,
        index: &mut Index,
        hostname: &str,
        scanner: &mut dyn LabelScanner,
        vgname: &str,
        vgid: Vgid,
    ) -> bool {
        let Some(vg_key) = index.find_vg_by_name_and_id(vgname, vgid) else { return false };
        let Some(vg) = index.vg(vg_key) else { return false };

        if vg.independent_metadata_location() {
            debug!(vgname, "rescan skipped: vg metadata is independently sourced");
            return true;
        }

        let devices: Vec<DeviceId> =
            vg.members().iter().filter_map(|pv_key| index.pv(*pv_key)).map(|pv| pv.device()).collect();

        let member_keys: Vec<_> = vg.members().to_vec();
        for pv_key in member_keys {
            index.delete_pv(pv_key);
        }

        for scanned in scanner.scan_devices(&devices) {
            let mut dup_devices = Vec::new();
            update_pv(
                index,
                hostname,
                scanned.pvid,
                scanned.device,
                scanned.fmt,
                scanned.vg_summary.as_ref(),
                &mut dup_devices,
            );
        }

        index.find_vg_by_name_and_id(vgname, vgid).is_some()
    }
}

fn index_pv_key_by_device(index: &Index, device: DeviceId) -> Option<crate::index::PvKey> {
    index.registry().iter().find_map(|vg_key| {
        index.vg(*vg_key)?.members().iter().copied().find(|pv_key| {
            index.pv(*pv_key).map(|pv| pv.device() == device).unwrap_or(false)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::VgStatus;
    use crate::entity::VgSummary;
    use crate::external::ScannedPv;

    struct FixedScanner {
        pvs: Vec<ScannedPv>,
    }

    impl LabelScanner for FixedScanner {
        fn scan_all(&mut self) -> Vec<ScannedPv> {
            self.pvs.clone()
        }
        fn scan_devices(&mut self, devices: &[DeviceId]) -> Vec<ScannedPv> {
            self.pvs.iter().filter(|p| devices.contains(&p.device)).cloned().collect()
        }
    }

    struct NullEnumerator;
    impl DeviceEnumerator for NullEnumerator {
        fn device_size(&self, _dev: DeviceId) -> Option<u64> {
            None
        }
        fn is_used_by_lv(&self, _dev: DeviceId) -> bool {
            false
        }
        fn has_mounted_fs(&self, _dev: DeviceId) -> bool {
            false
        }
        fn is_device_mapper(&self, _dev: DeviceId) -> bool {
            false
        }
        fn subsystem(&self, _dev: DeviceId) -> Option<String> {
            None
        }
        fn is_multi_device_subsystem(&self, _dev: DeviceId) -> bool {
            false
        }
    }

    fn summary(vgname: &str, vgid: &str) -> VgSummary {
        VgSummary {
            vgname: vgname.to_string(),
            vgid: Vgid::new(vgid),
            status: VgStatus::empty(),
            creation_host: None,
            lock_type: None,
            system_id: None,
            scan_summary: None,
        }
    }

    #[test]
    fn scan_indexes_non_orphan_vgs_and_reports_count() {
        let mut index = Index::new();
        let mut scanner = FixedScanner {
            pvs: vec![ScannedPv {
                pvid: Pvid::new("p1"),
                device: DeviceId(1),
                fmt: None,
                vg_summary: Some(summary("vg0", "A")),
            }],
        };
        let enumerator = NullEnumerator;
        let mut orchestrator = ScanOrchestrator::new();

        let count = orchestrator
            .scan(&mut index, "host0", &mut scanner, &enumerator, &mut [])
            .unwrap();

        assert_eq!(count, 1);
        assert!(!orchestrator.is_scanning());
    }

    #[test]
    fn rescan_vg_reindexes_members() {
        let mut index = Index::new();
        let mut scanner = FixedScanner {
            pvs: vec![ScannedPv {
                pvid: Pvid::new("p1"),
                device: DeviceId(1),
                fmt: None,
                vg_summary: Some(summary("vg0", "A")),
            }],
        };
        let enumerator = NullEnumerator;
        let mut orchestrator = ScanOrchestrator::new();
        orchestrator.scan(&mut index, "host0", &mut scanner, &enumerator, &mut []).unwrap();

        let reappeared = orchestrator.rescan_vg(&mut index, "host0", &mut scanner, "vg0", Vgid::new("A"));
        assert!(reappeared);
    }
}
