//! The update pipeline: merges a freshly scanned `(pvid, device, VG
//! summary)` tuple into the index.

use tracing::{debug, error};

use crate::entity::{PvInfo, ScanSummary, VgSummary};
use crate::ids::{DeviceId, Pvid};
use crate::index::{Index, PvKey};

/// Outcome of feeding one scanned tuple through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The PVInfo was created or updated in place.
    Updated(PvKey),
    /// A second device reported the same PV identifier as an existing
    /// entry; the new device was appended to `found_duplicates` and no
    /// further reconciliation happened.
    DuplicateFound,
    /// `pvid` was empty and the update was rejected; logged, the index is
    /// left untouched.
    Rejected,
}

/// Feeds one label-scan result into `index`.
///
/// `found_duplicates` accumulates alternate devices for PV identifiers that
/// already have a different device indexed; the caller runs the arbitrator
/// over it once the scan completes.
pub fn update_pv(
    index: &mut Index,
    config_hostname: &str,
    pvid: Pvid,
    dev: DeviceId,
    fmt: Option<String>,
    vg_summary: Option<&VgSummary>,
    found_duplicates: &mut Vec<DeviceId>,
) -> UpdateOutcome {
    // Step 1: locate-or-create PVInfo by PV identifier.
    let pv_key = match index.pv_key_by_pvid(pvid) {
        Some(existing_key) => {
            let existing_dev = index.pv(existing_key).map(|pv| pv.device());
            if existing_dev.is_some() && existing_dev != Some(dev) {
                debug!(%pvid, ?dev, "duplicate device for pv identifier");
                found_duplicates.push(dev);
                return UpdateOutcome::DuplicateFound;
            }
            existing_key
        }
        None => match index.create_pv(pvid, dev, fmt.clone(), None) {
            Ok(key) => key,
            Err(e) => {
                error!(%pvid, ?dev, error = %e, "rejecting scanned pv");
                return UpdateOutcome::Rejected;
            }
        },
    };

    // Step 2: reconcile label / fmt (re-label, format change).
    reconcile_label(index, pv_key, pvid, fmt);

    let Some(summary) = vg_summary else {
        return UpdateOutcome::Updated(pv_key);
    };

    // Step 3: rebind to VG, respecting primary-selection on first sight.
    rebind_to_vg(index, pv_key, summary, config_hostname);

    // Step 5: reconcile VG-summary fields.
    if let Some(vg_key) = index.pv(pv_key).and_then(|pv| pv.vg()) {
        if let Some(vg) = index.vg_mut(vg_key) {
            if let Some(scan_summary) = &summary.scan_summary {
                vg.reconcile_scan_summary(scan_summary);
            }
            vg.set_creation_host(summary.creation_host.clone());
            vg.set_lock_type(summary.lock_type.clone());
            vg.set_system_id(summary.system_id.clone());
            vg.set_status(summary.status);
        }
    }

    UpdateOutcome::Updated(pv_key)
}

fn reconcile_label(index: &mut Index, pv_key: PvKey, pvid: Pvid, fmt: Option<String>) {
    let Some(pv) = index.pv_mut(pv_key) else { return };
    if pv.pvid() != pvid {
        // a re-label: the identifier changed under us.
        pv.set_label(None);
    }
    if pv.fmt() != fmt.as_deref() {
        // format change: destroy and recreate the label reference.
        pv.set_label(None);
        pv.set_fmt(fmt);
    }
}

/// Detaches the PV from its current VG if the VG name changed, then
/// locates or creates the VGInfo for the newly reported name and attaches.
fn rebind_to_vg(index: &mut Index, pv_key: PvKey, summary: &VgSummary, hostname: &str) {
    let current_vg = index.pv(pv_key).and_then(|pv: &PvInfo| pv.vg());
    let current_name = current_vg.and_then(|k| index.vg(k)).map(|vg| vg.name().to_string());

    if let (Some(vg_key), Some(name)) = (current_vg, &current_name) {
        if name != &summary.vgname {
            index.detach(pv_key, vg_key);
            index.drop_if_dangling(vg_key);
        }
    }

    let exported = summary.status.contains(crate::entity::VgStatus::EXPORTED);
    let vg_key = index.locate_or_create_vg_for_scan(
        &summary.vgname,
        summary.vgid,
        summary.creation_host.as_deref(),
        exported,
        hostname,
    );
    index.attach(pv_key, vg_key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::VgStatus;
    use crate::ids::Vgid;

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
    fn first_sight_creates_pv_and_vg() {
        let mut index = Index::new();
        let mut dups = Vec::new();
        let outcome = update_pv(
            &mut index,
            "host0",
            Pvid::new("p1"),
            DeviceId(1),
            Some("lvm2".into()),
            Some(&summary("vg0", "A")),
            &mut dups,
        );
        assert!(matches!(outcome, UpdateOutcome::Updated(_)));
        assert!(dups.is_empty());
        assert!(index.primary_vg_key_by_name("vg0").is_some());
    }

    #[test]
    fn second_device_with_same_pvid_is_a_duplicate() {
        let mut index = Index::new();
        let mut dups = Vec::new();
        update_pv(&mut index, "host0", Pvid::new("p1"), DeviceId(1), None, None, &mut dups);
        let outcome =
            update_pv(&mut index, "host0", Pvid::new("p1"), DeviceId(2), None, None, &mut dups);

        assert_eq!(outcome, UpdateOutcome::DuplicateFound);
        assert_eq!(dups, vec![DeviceId(2)]);
        // the original device stays indexed under the pvid.
        assert_eq!(index.pv_key_by_pvid(Pvid::new("p1")).and_then(|k| index.pv(k)).unwrap().device(), DeviceId(1));
    }

    #[test]
    fn idempotent_for_identical_input() {
        let mut index = Index::new();
        let mut dups = Vec::new();
        let s = summary("vg0", "A");

        update_pv(&mut index, "host0", Pvid::new("p1"), DeviceId(1), None, Some(&s), &mut dups);
        let before = index.registry().len();
        update_pv(&mut index, "host0", Pvid::new("p1"), DeviceId(1), None, Some(&s), &mut dups);
        let after = index.registry().len();

        assert_eq!(before, after);
        assert!(dups.is_empty());
    }

    #[test]
    fn scan_summary_mismatch_preserves_first_values() {
        let mut index = Index::new();
        let mut dups = Vec::new();

        let mut s1 = summary("vg0", "A");
        s1.scan_summary = Some(ScanSummary { seqno: 7, mda_checksum: 1, mda_size: 512 });
        update_pv(&mut index, "host0", Pvid::new("p1"), DeviceId(1), None, Some(&s1), &mut dups);

        let mut s2 = summary("vg0", "A");
        s2.scan_summary = Some(ScanSummary { seqno: 8, mda_checksum: 2, mda_size: 512 });
        update_pv(&mut index, "host0", Pvid::new("p2"), DeviceId(2), None, Some(&s2), &mut dups);

        let vg_key = index.primary_vg_key_by_name("vg0").unwrap();
        let vg = index.vg(vg_key).unwrap();
        assert_eq!(vg.seqno(), 7);
        assert!(vg.scan_summary_mismatch());
    }

    #[test]
    fn rebinding_to_different_vg_detaches_and_drops_dangling_previous() {
        let mut index = Index::new();
        let mut dups = Vec::new();

        update_pv(&mut index, "host0", Pvid::new("p1"), DeviceId(1), None, Some(&summary("vg0", "A")), &mut dups);
        let old_vg = index.primary_vg_key_by_name("vg0").unwrap();

        update_pv(&mut index, "host0", Pvid::new("p1"), DeviceId(1), None, Some(&summary("vg1", "B")), &mut dups);

        assert!(index.vg(old_vg).is_none(), "vg0 had one member which moved away, so it should be dropped");
        assert!(index.primary_vg_key_by_name("vg1").is_some());
    }

    #[test]
    fn empty_pvid_is_rejected_not_panicked() {
        let mut index = Index::new();
        let mut dups = Vec::new();
        let outcome = update_pv(&mut index, "host0", Pvid::new(""), DeviceId(1), None, None, &mut dups);
        assert_eq!(outcome, UpdateOutcome::Rejected);
        assert!(index.pv_key_by_pvid(Pvid::new("")).is_none());
    }
}
