//! Property-based checks of the cache's core invariants.

use proptest::prelude::*;

use crate::entity::{VgStatus, VgSummary};
use crate::ids::{DeviceId, Pvid, Vgid};
use crate::index::Index;
use crate::pipeline::update_pv;

fn arb_pvid() -> impl Strategy<Value = Pvid> {
    "[a-z]{1,8}".prop_map(|s| Pvid::new(&s))
}

fn arb_vgname() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn summary(vgname: String, vgid: &str) -> VgSummary {
    VgSummary {
        vgname,
        vgid: Vgid::new(vgid),
        status: VgStatus::empty(),
        creation_host: None,
        lock_type: None,
        system_id: None,
        scan_summary: None,
    }
}

proptest! {
    /// Idempotence: feeding the same `(pvid, device, summary)`
    /// twice yields the same state as feeding it once.
    #[test]
    fn idempotent_for_repeated_identical_input(
        pvid in arb_pvid(),
        dev_raw in 1u64..100,
        vgname in arb_vgname(),
    ) {
        let mut index = Index::new();
        let mut dups = Vec::new();
        let dev = DeviceId(dev_raw);
        let s = summary(vgname, "A");

        update_pv(&mut index, "host0", pvid, dev, None, Some(&s), &mut dups);
        let registry_once = index.registry().len();
        let members_once = index
            .primary_vg_key_by_name(&s.vgname)
            .and_then(|k| index.vg(k))
            .map(|vg| vg.members().len());

        update_pv(&mut index, "host0", pvid, dev, None, Some(&s), &mut dups);
        let registry_twice = index.registry().len();
        let members_twice = index
            .primary_vg_key_by_name(&s.vgname)
            .and_then(|k| index.vg(k))
            .map(|vg| vg.members().len());

        prop_assert_eq!(registry_once, registry_twice);
        prop_assert_eq!(members_once, members_twice);
        prop_assert!(dups.is_empty());
    }

    /// Invariant: every PV identifier in the by-PV-id index resolves to
    /// a PVInfo whose device carries that identifier.
    #[test]
    fn pvid_index_invariant_holds_after_updates(
        pvids in prop::collection::vec(arb_pvid(), 1..6),
    ) {
        let mut index = Index::new();
        let mut dups = Vec::new();
        for (i, pvid) in pvids.into_iter().enumerate() {
            update_pv(&mut index, "host0", pvid, DeviceId(i as u64 + 1), None, None, &mut dups);
        }
        prop_assert!(index.invariant_pvid_matches_stored_pv());
        prop_assert!(index.invariant_members_back_reference());
        prop_assert!(index.invariant_orphans_last());
        prop_assert!(index.invariant_nonorphan_registry_entries_nonempty());
    }

    /// Invariant: orphan-named VGInfo only ever appear after every
    /// non-orphan entry in the registry, regardless of insertion order.
    #[test]
    fn orphans_always_sort_last_in_registry(
        vgnames in prop::collection::vec(arb_vgname(), 0..6),
    ) {
        let mut index = Index::new();
        for (i, name) in vgnames.into_iter().enumerate() {
            index.locate_or_create_vg(&name, Vgid::new(&format!("v{i}")));
        }
        index.locate_or_create_vg("", Vgid::new("orphan"));
        prop_assert!(index.invariant_orphans_last());
    }
}
