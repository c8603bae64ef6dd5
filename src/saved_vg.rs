//! The saved-VG store: a two-slot (committed / precommitted) shadow
//! of each VG's parsed metadata, used by the clustered caller to serve
//! activation/resume while underlying devices are suspended.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{CacheError, Result};
use crate::external::{MetadataCodec, ParsedVg};
use crate::ids::Vgid;

/// One VG's two-phase shadow.
#[derive(Debug, Default)]
struct SavedVgEntry {
    committed: bool,
    old: Option<ParsedVg>,
    new: Option<ParsedVg>,
}

/// Committed/precommitted shadows for the clustered caller. A no-op
/// store (every method short-circuits) when the cache isn't clustered,
/// matching `CacheConfig::clustered`.
#[derive(Debug, Default)]
pub struct SavedVgStore {
    enabled: bool,
    entries: HashMap<Vgid, SavedVgEntry>,
    /// Parsed VGs displaced from a slot; freed only at `teardown` since a
    /// concurrent activation path may still hold a reference.
    deferred_free: Vec<ParsedVg>,
}

impl SavedVgStore {
    pub fn new(clustered: bool) -> Self {
        SavedVgStore { enabled: clustered, ..Default::default() }
    }

    /// Serializes the live VG via `codec`, reimports it to produce an
    /// independent copy, and installs it into the requested slot. A no-op
    /// when the store isn't enabled or the slot already holds the same
    /// sequence number.
    pub fn save(
        &mut self,
        codec: &dyn MetadataCodec,
        vgid: Vgid,
        name: &str,
        seqno: u32,
        precommitted: bool,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let entry = self.entries.entry(vgid).or_default();
        let slot = if precommitted { &entry.new } else { &entry.old };
        if slot.as_ref().map(|v| v.seqno) == Some(seqno) {
            return Ok(());
        }

        let buf = codec
            .export(vgid, name, seqno)
            .map_err(CacheError::ExportFailed)?;
        let parsed = codec.import(&buf).map_err(CacheError::ImportFailed)?;

        let slot_mut = if precommitted { &mut entry.new } else { &mut entry.old };
        if let Some(previous) = slot_mut.replace(parsed) {
            self.deferred_free.push(previous);
        }
        Ok(())
    }

    /// Returns the requested slot. If asking for `old` while a
    /// `new` exists with a higher seqno, the `old` slot is invalidated
    /// first. Returns `None` with a warning if the requested slot is absent
    /// while its counterpart exists.
    pub fn get(&mut self, vgid: Vgid, precommitted: bool) -> Option<ParsedVg> {
        let entry = self.entries.get_mut(&vgid)?;

        if !precommitted {
            if let (Some(old), Some(new)) = (&entry.old, &entry.new) {
                if new.seqno > old.seqno {
                    if let Some(stale) = entry.old.take() {
                        self.deferred_free.push(stale);
                    }
                }
            }
        }

        let wanted = if precommitted { entry.new.clone() } else { entry.old.clone() };
        if wanted.is_none() {
            let other_exists = if precommitted { entry.old.is_some() } else { entry.new.is_some() };
            if other_exists {
                warn!(%vgid, precommitted, "requested saved-vg slot is absent");
            }
        }
        wanted
    }

    /// `new` if the committed flag is set, otherwise `old`.
    pub fn get_latest(&mut self, vgid: Vgid) -> Option<ParsedVg> {
        let committed = self.entries.get(&vgid).map(|e| e.committed).unwrap_or(false);
        self.get(vgid, committed)
    }

    /// Reflects a remote commit notification: sets the committed flag so
    /// `get_latest` starts returning `new`.
    pub fn commit(&mut self, vgid: Vgid) {
        if let Some(entry) = self.entries.get_mut(&vgid) {
            entry.committed = true;
        }
    }

    /// Invalidates slots. `drop_precommitted` invalidates only `new`;
    /// otherwise both. Aborted if `global_lock_held` (the cache is trusted
    /// to stay consistent while the global lock is held).
    pub fn drop_vg(&mut self, vgid: Vgid, drop_precommitted: bool, global_lock_held: bool) {
        if global_lock_held {
            warn!(%vgid, "saved-vg drop aborted: global lock held");
            return;
        }
        let Some(entry) = self.entries.get_mut(&vgid) else { return };
        if let Some(stale) = entry.new.take() {
            self.deferred_free.push(stale);
        }
        if !drop_precommitted {
            if let Some(stale) = entry.old.take() {
                self.deferred_free.push(stale);
            }
        }
    }

    /// Frees every slot and the deferred-free list.
    pub fn teardown(&mut self) {
        self.entries.clear();
        self.deferred_free.clear();
    }

    pub fn deferred_free_len(&self) -> usize {
        self.deferred_free.len()
    }
}
