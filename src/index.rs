//! The indexed entity store.
//!
//! `PVInfo` and `VGInfo` reference each other (a VG's member list, a PV's
//! owning VG), which in an owned tree would need `Rc<RefCell<_>>` on both
//! sides. Instead we hold both kinds in arenas keyed by a monotonic `u64`
//! and let the records reference each other by key, sidestepping the
//! aliasing problem entirely.

use std::collections::HashMap;

use crate::entity::{PvInfo, VgInfo};
use crate::error::{CacheError, Result};
use crate::ids::{DeviceId, Pvid, Vgid, ORPHAN_VG_NAME};

/// Reports whether `lock_type` names the `sanlock` locking scheme.
pub fn is_sanlock(lock_type: &str) -> bool {
    lock_type.eq_ignore_ascii_case("sanlock")
}

/// Handle to a `PvInfo` in the arena. Opaque outside this module's crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PvKey(u64);

/// Handle to a `VgInfo` in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VgKey(u64);

/// The four keyed mappings plus the VGInfo traversal registry.
pub struct Index {
    pvs: HashMap<PvKey, PvInfo>,
    vgs: HashMap<VgKey, VgInfo>,
    next_key: u64,

    by_pvid: HashMap<Pvid, PvKey>,
    by_vgid: HashMap<Vgid, VgKey>,
    /// name -> primary VgKey; collisions reachable via `VgInfo::next`.
    by_vgname: HashMap<String, VgKey>,

    /// Traversal order: orphans last, everything else inserted at the head.
    registry: Vec<VgKey>,
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Index {
    pub fn new() -> Self {
        Index {
            pvs: HashMap::new(),
            vgs: HashMap::new(),
            next_key: 0,
            by_pvid: HashMap::new(),
            by_vgid: HashMap::new(),
            by_vgname: HashMap::new(),
            registry: Vec::new(),
        }
    }

    fn alloc_pv_key(&mut self) -> PvKey {
        let k = PvKey(self.next_key);
        self.next_key += 1;
        k
    }

    fn alloc_vg_key(&mut self) -> VgKey {
        let k = VgKey(self.next_key);
        self.next_key += 1;
        k
    }

    #[cfg(test)]
    pub(crate) fn test_alloc_pv_key(&mut self) -> PvKey {
        self.alloc_pv_key()
    }

    // -- PVInfo lookups --------------------------------------------------

    pub fn pv(&self, key: PvKey) -> Option<&PvInfo> {
        self.pvs.get(&key)
    }

    pub fn pv_mut(&mut self, key: PvKey) -> Option<&mut PvInfo> {
        self.pvs.get_mut(&key)
    }

    pub fn pv_key_by_pvid(&self, pvid: Pvid) -> Option<PvKey> {
        self.by_pvid.get(&pvid).copied()
    }

    pub fn find_pv_by_pvid(&self, pvid: Pvid) -> Option<(PvKey, &PvInfo)> {
        let key = self.pv_key_by_pvid(pvid)?;
        self.pv(key).map(|pv| (key, pv))
    }

    // -- VGInfo lookups ----------------------------------------------------

    pub fn vg(&self, key: VgKey) -> Option<&VgInfo> {
        self.vgs.get(&key)
    }

    pub fn vg_mut(&mut self, key: VgKey) -> Option<&mut VgInfo> {
        self.vgs.get_mut(&key)
    }

    pub fn vg_key_by_vgid(&self, vgid: Vgid) -> Option<VgKey> {
        self.by_vgid.get(&vgid).copied()
    }

    /// Primary VgKey reachable from the name index; does not traverse the
    /// collision chain.
    pub fn primary_vg_key_by_name(&self, name: &str) -> Option<VgKey> {
        self.by_vgname.get(name).copied()
    }

    /// Walks the primary and its collision chain looking for `vgid`.
    pub fn find_vg_by_name_and_id(&self, name: &str, vgid: Vgid) -> Option<VgKey> {
        let mut cur = self.primary_vg_key_by_name(name)?;
        loop {
            let vg = self.vgs.get(&cur)?;
            if vg.vgid() == vgid {
                return Some(cur);
            }
            cur = vg.next()?;
        }
    }

    pub fn registry(&self) -> &[VgKey] {
        &self.registry
    }

    // -- PVInfo lifecycle -----------------------

    /// Allocates a fresh PVInfo, bound to `dev` and indexed under `pvid`.
    /// The label is supplied by the caller.
    pub fn create_pv(
        &mut self,
        pvid: Pvid,
        dev: DeviceId,
        fmt: Option<String>,
        label: Option<String>,
    ) -> Result<PvKey> {
        if pvid.as_str().is_empty() {
            return Err(CacheError::NullKey);
        }
        let key = self.alloc_pv_key();
        self.pvs.insert(key, PvInfo::new(pvid, dev, fmt, label));
        self.by_pvid.insert(pvid, key);
        Ok(key)
    }

    /// Removes `key` from the PV-id index, detaches it from its VG, and
    /// drops the record. If this leaves a non-orphan VGInfo memberless, that
    /// VGInfo is destroyed too.
    pub fn delete_pv(&mut self, key: PvKey) {
        let Some(pv) = self.pvs.remove(&key) else { return };
        self.by_pvid.remove(&pv.pvid());
        if let Some(vg_key) = pv.vg() {
            self.detach(key, vg_key);
            self.drop_if_dangling(vg_key);
        }
    }

    // -- Attach / detach ---------------------------------------------

    pub fn attach(&mut self, pv_key: PvKey, vg_key: VgKey) {
        if let Some(vg) = self.vgs.get_mut(&vg_key) {
            vg.attach_member(pv_key);
        }
        if let Some(pv) = self.pvs.get_mut(&pv_key) {
            pv.set_vg(Some(vg_key));
        }
    }

    pub fn detach(&mut self, pv_key: PvKey, vg_key: VgKey) {
        if let Some(vg) = self.vgs.get_mut(&vg_key) {
            vg.detach_member(pv_key);
        }
        if let Some(pv) = self.pvs.get_mut(&pv_key) {
            pv.set_vg(None);
        }
    }

    /// Destroys `vg_key` only if it is non-orphan and memberless.
    pub fn drop_if_dangling(&mut self, vg_key: VgKey) {
        let Some(vg) = self.vgs.get(&vg_key) else { return };
        if vg.is_orphan() || !vg.is_memberless() {
            return;
        }
        self.destroy_vg(vg_key);
    }

    fn destroy_vg(&mut self, vg_key: VgKey) {
        let Some(vg) = self.vgs.remove(&vg_key) else { return };
        self.by_vgid.remove(&vg.vgid());
        self.unlink_from_name_chain(&vg, vg_key);
        self.registry.retain(|&k| k != vg_key);
    }

    fn unlink_from_name_chain(&mut self, removed: &VgInfo, removed_key: VgKey) {
        let Some(&primary_key) = self.by_vgname.get(removed.name()) else { return };

        if primary_key == removed_key {
            match removed.next() {
                Some(new_primary) => {
                    self.by_vgname.insert(removed.name().to_string(), new_primary);
                }
                None => {
                    self.by_vgname.remove(removed.name());
                }
            }
            return;
        }

        let mut cur = primary_key;
        loop {
            let Some(vg) = self.vgs.get(&cur) else { return };
            match vg.next() {
                Some(next_key) if next_key == removed_key => {
                    let grandchild = removed.next();
                    if let Some(vg_mut) = self.vgs.get_mut(&cur) {
                        vg_mut.set_next(grandchild);
                    }
                    return;
                }
                Some(next_key) => cur = next_key,
                None => return,
            }
        }
    }

    // -- VGInfo creation with primary-selection rules ---

    /// Locates the VgKey for `(name, vgid)`, creating a fresh VgInfo and
    /// wiring the name-index / collision-chain / registry if none existed.
    /// Primary-selection only ever compares against a local hostname
    /// of `""`, which never matches a real `creation_host` — callers that
    /// need rules 2-4 to fire should go through `locate_or_create_vg_for_scan`.
    ///
    /// A freshly created VgInfo is registered immediately, before any PV is
    /// attached, so a caller that creates one and never attaches a member
    /// leaves a memberless non-orphan entry in the registry. The pipeline's
    /// own caller always attaches a PV in the same step, so this never
    /// surfaces in practice, but a direct caller of this function should
    /// attach promptly rather than relying on `drop_if_dangling` to clean up
    /// a VgInfo it never populated.
    pub fn locate_or_create_vg(&mut self, name: &str, vgid: Vgid) -> VgKey {
        self.locate_or_create_vg_for_scan(name, vgid, None, false, "")
    }

    /// As `locate_or_create_vg`, but stamps `creation_host` and `exported`
    /// before running primary-selection so rules 1-4 see the incoming
    /// summary's values immediately, and compares against `hostname` for
    /// rules 2 and 4. Carries the same create-before-attach caveat.
    pub fn locate_or_create_vg_for_scan(
        &mut self,
        name: &str,
        vgid: Vgid,
        creation_host: Option<&str>,
        exported: bool,
        hostname: &str,
    ) -> VgKey {
        if let Some(key) = self.find_vg_by_name_and_id(name, vgid) {
            return key;
        }

        let key = self.alloc_vg_key();
        let mut vg = VgInfo::new(name.to_string(), vgid);
        vg.set_creation_host(creation_host.map(str::to_string));
        if exported {
            vg.set_status(crate::entity::VgStatus::EXPORTED);
        }
        self.vgs.insert(key, vg);
        self.by_vgid.insert(vgid, key);
        self.insert_into_name_index(name, key, hostname);
        self.insert_into_registry(name, key);
        key
    }

    /// Applies the primary-selection rules when `key` shares `name` with
    /// an existing primary.
    fn insert_into_name_index(&mut self, name: &str, key: VgKey, hostname: &str) {
        let Some(&existing_primary) = self.by_vgname.get(name) else {
            self.by_vgname.insert(name.to_string(), key);
            return;
        };

        if self.new_entry_should_displace_primary(existing_primary, key, hostname) {
            if let Some(new_vg) = self.vgs.get_mut(&key) {
                new_vg.set_next(Some(existing_primary));
            }
            self.by_vgname.insert(name.to_string(), key);
        } else {
            // existing primary is kept; append `key` to the tail of its chain
            let mut cur = existing_primary;
            loop {
                let next = self.vgs.get(&cur).and_then(|vg| vg.next());
                match next {
                    Some(n) => cur = n,
                    None => break,
                }
            }
            if let Some(vg) = self.vgs.get_mut(&cur) {
                vg.set_next(Some(key));
            }
        }
    }

    /// Rules 1-5, applied in order; the first rule that distinguishes the
    /// two records decides.
    fn new_entry_should_displace_primary(&self, primary: VgKey, candidate: VgKey, hostname: &str) -> bool {
        let (Some(p), Some(c)) = (self.vgs.get(&primary), self.vgs.get(&candidate)) else {
            return false;
        };

        // Rule 1: not exported wins over exported.
        if p.is_exported() != c.is_exported() {
            return !c.is_exported();
        }

        // Rule 2: creation host equals local host wins.
        let p_is_local = p.creation_host() == Some(hostname) && !hostname.is_empty();
        let c_is_local = c.creation_host() == Some(hostname) && !hostname.is_empty();
        if p_is_local != c_is_local {
            return c_is_local;
        }

        // Rule 3: having a recorded creation host wins over lacking one.
        let p_has_host = p.creation_host().is_some();
        let c_has_host = c.creation_host().is_some();
        if p_has_host != c_has_host {
            return c_has_host;
        }

        // Rule 4: new entry whose creation host equals local host displaces
        // the current primary (only reachable if rule 2 found both/neither
        // local, so this only fires for the "both local" case — i.e. two
        // same-named VGs both claiming the local host, candidate wins ties).
        if c_is_local {
            return true;
        }

        // Rule 5: otherwise the existing primary is kept.
        false
    }

    fn insert_into_registry(&mut self, name: &str, key: VgKey) {
        if name == ORPHAN_VG_NAME {
            self.registry.push(key);
        } else {
            self.registry.insert(0, key);
        }
    }

    // -- Supplemented read accessors -----------------------

    /// Fills a caller-provided physical-volume view from the cached
    /// PVInfo for `key`.
    pub fn populate_pv_view(
        &self,
        key: PvKey,
        view: &mut crate::entity::PvView,
    ) -> Result<()> {
        let pv = self.pv(key).ok_or(CacheError::NullKey)?;
        pv.populate_pv_view(view)
            .map_err(|e| CacheError::AllocationFailed(e.to_string()))
    }

    /// Returns the VG name owning `vgid`, if cached.
    pub fn vgname_from_vgid(&self, vgid: Vgid) -> Option<&str> {
        self.vg_key_by_vgid(vgid).and_then(|k| self.vgs.get(&k)).map(|vg| vg.name())
    }

    /// Returns the (primary) VG identifier for `name`, if cached.
    pub fn vgid_from_vgname(&self, name: &str) -> Option<Vgid> {
        self.primary_vg_key_by_name(name).and_then(|k| self.vgs.get(&k)).map(|vg| vg.vgid())
    }

    /// Reports whether any member of `vg_key` appears in `unused_duplicates`.
    pub fn vg_has_duplicate_pvs(&self, vg_key: VgKey, unused_duplicates: &[DeviceId]) -> bool {
        let Some(vg) = self.vg(vg_key) else { return false };
        vg.members()
            .iter()
            .filter_map(|pv_key| self.pv(*pv_key))
            .any(|pv| unused_duplicates.contains(&pv.device()))
    }

    /// Returns `(longest VG name, longest PV-id)` among cached entries.
    pub fn max_name_lengths(&self) -> (usize, usize) {
        let max_vg = self.vgs.values().map(|vg| vg.name().len()).max().unwrap_or(0);
        let max_pv = self.pvs.values().map(|pv| pv.pvid().as_str().len()).max().unwrap_or(0);
        (max_vg, max_pv)
    }

    /// Returns the stored lock-type string for `vg_key`, if any.
    pub fn lock_type_of(&self, vg_key: VgKey) -> Option<&str> {
        self.vg(vg_key).and_then(|vg| vg.lock_type())
    }

    // -- Invariant checks, exposed for tests/property tests ------------

    #[cfg(test)]
    pub(crate) fn invariant_pvid_matches_stored_pv(&self) -> bool {
        self.by_pvid
            .iter()
            .all(|(pvid, key)| self.pvs.get(key).map(|pv| pv.pvid() == *pvid).unwrap_or(false))
    }

    #[cfg(test)]
    pub(crate) fn invariant_members_back_reference(&self) -> bool {
        self.vgs.iter().all(|(key, vg)| {
            vg.members()
                .iter()
                .all(|pv_key| self.pvs.get(pv_key).and_then(|pv| pv.vg()) == Some(*key))
        })
    }

    #[cfg(test)]
    pub(crate) fn invariant_nonorphan_registry_entries_nonempty(&self) -> bool {
        self.registry.iter().all(|key| {
            self.vgs
                .get(key)
                .map(|vg| vg.is_orphan() || !vg.is_memberless())
                .unwrap_or(true)
        })
    }

    #[cfg(test)]
    pub(crate) fn invariant_orphans_last(&self) -> bool {
        let mut seen_orphan = false;
        for key in &self.registry {
            let Some(vg) = self.vgs.get(key) else { continue };
            if vg.is_orphan() {
                seen_orphan = true;
            } else if seen_orphan {
                return false;
            }
        }
        true
    }
}
