//! Duplicate-PV arbitration: when several devices report the same PV
//! identifier, decide which one is "preferred" and quarantine the rest.

use std::collections::HashMap;

use tracing::debug;

use crate::external::DeviceEnumerator;
use crate::ids::{DeviceId, Pvid};
use crate::index::Index;

/// One resolved duplicate group: the grouping by PV identifier plus the
/// per-comparison decision between incumbent and alternate.
#[derive(Debug, Clone)]
pub struct ArbitrationOutcome {
    pub pvid: Pvid,
    /// `Some` only when the incumbent changed.
    pub changed: Option<ChangedIncumbent>,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ChangedIncumbent {
    pub dropped: DeviceId,
    pub chosen: DeviceId,
}

/// Result of a full arbitration pass over every duplicate group found during
/// a scan.
#[derive(Debug, Clone, Default)]
pub struct ArbitrationResult {
    /// Devices to remove from the index (previous incumbents that lost).
    pub drop_set: Vec<DeviceId>,
    /// Devices to re-scan and re-feed through the pipeline (new incumbents).
    pub add_set: Vec<DeviceId>,
    /// Carried forward into the next arbitration for rule (1) stability.
    pub unused_duplicates: Vec<DeviceId>,
}

/// Runs the arbitrator over `found_duplicates`, grouped by PV identifier
/// against the currently indexed incumbent.
///
/// `previous_unused` is the caller-retained list from the prior arbitration
/// within this command; it feeds rule (1), keeping a device that was
/// previously passed over from flip-flopping back in on a tie.
pub fn arbitrate(
    index: &Index,
    enumerator: &dyn DeviceEnumerator,
    found_duplicates: &[(Pvid, DeviceId)],
    previous_unused: &[DeviceId],
) -> ArbitrationResult {
    let mut groups: HashMap<Pvid, Vec<DeviceId>> = HashMap::new();
    for (pvid, dev) in found_duplicates {
        groups.entry(*pvid).or_default().push(*dev);
    }

    let mut result = ArbitrationResult::default();

    for (pvid, alternates) in groups {
        let Some((_, incumbent_pv)) = index.find_pv_by_pvid(pvid) else { continue };
        let original_incumbent = incumbent_pv.device();
        let mut incumbent = original_incumbent;
        let mut losers = Vec::new();

        // Compare every alternate against the *running* winner, one at a
        // time, but only ever record a single drop/add pair for the group:
        // the original incumbent (if it was ultimately displaced) and the
        // final winner. Every device that loses along the way, including an
        // intermediate winner later displaced by a later alternate, goes to
        // `losers`, never to `add_set`.
        for alternate in alternates {
            let outcome = compare(index, enumerator, pvid, incumbent, alternate, previous_unused);
            debug!(%pvid, ?incumbent, ?alternate, reason = outcome.reason, "duplicate arbitration");

            match outcome.changed {
                Some(changed) => {
                    losers.push(changed.dropped);
                    incumbent = changed.chosen;
                }
                None => losers.push(alternate),
            }
        }

        if incumbent != original_incumbent {
            result.drop_set.push(original_incumbent);
            result.add_set.push(incumbent);
        }
        result.unused_duplicates.extend(losers);
    }

    result.unused_duplicates.retain(|dev| !enumerator.is_multi_device_subsystem(*dev));
    result
}

/// Applies the per-comparison rules, in order, to `(incumbent, alternate)`
/// for `pvid`.
fn compare(
    index: &Index,
    enumerator: &dyn DeviceEnumerator,
    pvid: Pvid,
    incumbent: DeviceId,
    alternate: DeviceId,
    previous_unused: &[DeviceId],
) -> ArbitrationOutcome {
    let incumbent_was_unpreferred = previous_unused.contains(&incumbent);
    let alternate_was_unpreferred = previous_unused.contains(&alternate);

    // Rule 1: previous preference.
    if incumbent_was_unpreferred != alternate_was_unpreferred {
        let winner = if incumbent_was_unpreferred { alternate } else { incumbent };
        return decide(pvid, incumbent, winner, "previous preference");
    }

    // Rule 2: device currently used by a live logical volume.
    let incumbent_used = enumerator.is_used_by_lv(incumbent);
    let alternate_used = enumerator.is_used_by_lv(alternate);
    if incumbent_used != alternate_used {
        let winner = if alternate_used { alternate } else { incumbent };
        return decide(pvid, incumbent, winner, "device is used by LV");
    }

    // Rule 3: device size matches the cached PV size.
    let cached_size = index.find_pv_by_pvid(pvid).map(|(_, pv)| pv.device_size());
    if let Some(cached_size) = cached_size {
        let incumbent_matches = enumerator.device_size(incumbent) == Some(cached_size);
        let alternate_matches = enumerator.device_size(alternate) == Some(cached_size);
        if incumbent_matches != alternate_matches {
            let winner = if alternate_matches { alternate } else { incumbent };
            return decide(pvid, incumbent, winner, "device size is correct");
        }
    }

    // Rule 4: device has a mounted filesystem.
    let incumbent_mounted = enumerator.has_mounted_fs(incumbent);
    let alternate_mounted = enumerator.has_mounted_fs(alternate);
    if incumbent_mounted != alternate_mounted {
        let winner = if alternate_mounted { alternate } else { incumbent };
        return decide(pvid, incumbent, winner, "device has fs mounted");
    }

    // Rule 5: device belongs to the local device-mapper subsystem.
    let incumbent_dm = enumerator.is_device_mapper(incumbent);
    let alternate_dm = enumerator.is_device_mapper(alternate);
    if incumbent_dm != alternate_dm {
        let winner = if alternate_dm { alternate } else { incumbent };
        return decide(pvid, incumbent, winner, "device is in dm subsystem");
    }

    // Rule 6: device belongs to any known subsystem.
    let incumbent_subsystem = enumerator.subsystem(incumbent).is_some();
    let alternate_subsystem = enumerator.subsystem(alternate).is_some();
    if incumbent_subsystem != alternate_subsystem {
        let winner = if alternate_subsystem { alternate } else { incumbent };
        return decide(pvid, incumbent, winner, "device is in subsystem");
    }

    // Rule 7: fallback, incumbent wins.
    decide(pvid, incumbent, incumbent, "device was seen first")
}

fn decide(pvid: Pvid, incumbent: DeviceId, winner: DeviceId, reason: &'static str) -> ArbitrationOutcome {
    if winner == incumbent {
        ArbitrationOutcome { pvid, changed: None, reason }
    } else {
        ArbitrationOutcome {
            pvid,
            changed: Some(ChangedIncumbent { dropped: incumbent, chosen: winner }),
            reason,
        }
    }
}
