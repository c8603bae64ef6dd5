//! The lock registry: per-name advisory locks layered beneath a
//! global lock and an orphan lock, with alphabetical acquisition order
//! enforced to prevent deadlock.

use std::collections::BTreeSet;

use tracing::{error, warn};

use crate::error::{CacheError, Result};
use crate::ids::LockName;
use crate::index::Index;

/// A mapping from name to presence, plus the bookkeeping this registry
/// needs around resets and epoch invalidation.
#[derive(Debug, Default)]
pub struct LockRegistry {
    held: BTreeSet<LockName>,
    suppress_ordering: bool,
    held_count: u32,
    /// Bumped every time the held-count drops back to zero; an external
    /// device cache watches this to invalidate cached device sizes.
    device_cache_epoch: u64,
    /// Set by `teardown` when the global lock was held at that point, so
    /// the next `reinit_global_lock` can re-assert it transparently.
    global_lock_pending_reinit: bool,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_suppress_ordering(&mut self, suppress: bool) {
        self.suppress_ordering = suppress;
    }

    pub fn device_cache_epoch(&self) -> u64 {
        self.device_cache_epoch
    }

    pub fn is_locked(&self, name: &LockName) -> bool {
        self.held.contains(name)
    }

    pub fn vgs_locked(&self) -> impl Iterator<Item = &LockName> {
        self.held.iter()
    }

    /// Acquires `name`, mirroring the "locked" bit into every PVInfo
    /// attached to the matching VGInfo (non-global names only) and bumping
    /// the held-count.
    pub fn acquire(&mut self, index: &mut Index, name: LockName) -> Result<()> {
        if self.held.contains(&name) {
            error!(%name, "nested locking attempted");
            return Err(CacheError::NestedLock(name.to_string()));
        }

        if !self.suppress_ordering {
            if let Some(held) = self.held.iter().find(|h| **h > name) {
                error!(%name, held = %held, "lock order violation");
                return Err(CacheError::LockOrderViolation {
                    attempted: name.to_string(),
                    held: held.to_string(),
                });
            }
        }

        if let LockName::Vg(vgname) = &name {
            mirror_locked_bit(index, vgname, true);
        } else if let LockName::Orphan = &name {
            mirror_locked_bit(index, "", true);
        }

        self.held.insert(name);
        self.held_count += 1;
        Ok(())
    }

    /// Releases `name`, clearing the mirrored bits and, if the held-count
    /// drops to zero, bumping the device-cache epoch.
    pub fn release(&mut self, index: &mut Index, name: &LockName) -> Result<()> {
        if !self.held.remove(name) {
            error!(%name, "attempt to unlock unheld lock");
            return Err(CacheError::UnlockNotHeld(name.to_string()));
        }

        if let LockName::Vg(vgname) = name {
            mirror_locked_bit(index, vgname, false);
        } else if let LockName::Orphan = name {
            mirror_locked_bit(index, "", false);
        }

        self.held_count = self.held_count.saturating_sub(1);
        if self.held_count == 0 {
            self.device_cache_epoch += 1;
        }
        Ok(())
    }

    /// Cache teardown: any lock other than the global sentinel
    /// still held is a programming error, logged but not propagated since
    /// teardown must complete regardless.
    pub fn teardown(&mut self) {
        let global_held = self.held.contains(&LockName::Global);
        for name in self.held.iter().filter(|n| **n != LockName::Global) {
            error!(%name, "lock still held at cache teardown");
        }
        self.held.clear();
        self.held_count = 0;
        self.global_lock_pending_reinit = global_held;
    }

    /// Reasserts the global lock transparently if teardown observed it
    /// held, so a query of the global lock's status reads as locked again
    /// without the caller re-acquiring it.
    pub fn reinit_after_teardown(&mut self) {
        if self.global_lock_pending_reinit {
            self.held.insert(LockName::Global);
            self.held_count += 1;
            self.global_lock_pending_reinit = false;
        }
    }
}

fn mirror_locked_bit(index: &mut Index, vgname: &str, locked: bool) {
    let Some(vg_key) = index.primary_vg_key_by_name(vgname) else {
        warn!(vgname, "mirror_locked_bit: no such vg cached");
        return;
    };
    let members: Vec<_> = index.vg(vg_key).map(|vg| vg.members().to_vec()).unwrap_or_default();
    for pv_key in members {
        if let Some(pv) = index.pv_mut(pv_key) {
            pv.set_locked(locked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_order_rejects_out_of_order_vg_lock() {
        let mut index = Index::new();
        let mut locks = LockRegistry::new();

        locks.acquire(&mut index, LockName::Global).unwrap();
        locks.acquire(&mut index, LockName::Vg("vgA".into())).unwrap();
        locks.acquire(&mut index, LockName::Vg("vgB".into())).unwrap();

        let err = locks.acquire(&mut index, LockName::Vg("vgA".into()));
        assert!(err.is_err(), "vgA after vgB violates ascending order");
    }

    #[test]
    fn nested_lock_on_same_name_is_rejected() {
        let mut index = Index::new();
        let mut locks = LockRegistry::new();
        locks.acquire(&mut index, LockName::Vg("vgA".into())).unwrap();
        assert!(locks.acquire(&mut index, LockName::Vg("vgA".into())).is_err());
    }

    #[test]
    fn release_without_acquire_is_rejected() {
        let mut index = Index::new();
        let mut locks = LockRegistry::new();
        assert!(locks.release(&mut index, &LockName::Vg("vgA".into())).is_err());
    }

    #[test]
    fn release_to_zero_bumps_epoch() {
        let mut index = Index::new();
        let mut locks = LockRegistry::new();
        locks.acquire(&mut index, LockName::Global).unwrap();
        let before = locks.device_cache_epoch();
        locks.release(&mut index, &LockName::Global).unwrap();
        assert_eq!(locks.device_cache_epoch(), before + 1);
    }

    #[test]
    fn suppressed_ordering_allows_out_of_order_acquisition() {
        let mut index = Index::new();
        let mut locks = LockRegistry::new();
        locks.set_suppress_ordering(true);
        locks.acquire(&mut index, LockName::Vg("vgB".into())).unwrap();
        assert!(locks.acquire(&mut index, LockName::Vg("vgA".into())).is_ok());
    }

    #[test]
    fn teardown_reasserts_global_lock_transparently() {
        let mut index = Index::new();
        let mut locks = LockRegistry::new();
        locks.acquire(&mut index, LockName::Global).unwrap();

        locks.teardown();
        assert!(!locks.is_locked(&LockName::Global));

        locks.reinit_after_teardown();
        assert!(locks.is_locked(&LockName::Global));
    }

    #[test]
    fn acquiring_vg_lock_mirrors_locked_bit_into_members() {
        let mut index = Index::new();
        let pv = index.create_pv(crate::ids::Pvid::new("p1"), crate::ids::DeviceId(1), None, None).unwrap();
        let vg = index.locate_or_create_vg("vgA", crate::ids::Vgid::new("A"));
        index.attach(pv, vg);

        let mut locks = LockRegistry::new();
        locks.acquire(&mut index, LockName::Vg("vgA".into())).unwrap();
        assert!(index.pv(pv).unwrap().is_locked());

        locks.release(&mut index, &LockName::Vg("vgA".into())).unwrap();
        assert!(!index.pv(pv).unwrap().is_locked());
    }
}
