//! The top-level cache context: "global mutable state in the source becomes
//! a cache context passed to every operation."

use crate::duplicates::arbitrate;
use crate::error::Result;
use crate::external::{DeviceEnumerator, FormatType, LabelScanner, MetadataCodec, ParsedVg};
use crate::ids::{DeviceId, LockName, Pvid, Vgid};
use crate::index::{Index, PvKey, VgKey};
use crate::locks::LockRegistry;
use crate::pipeline::{self, UpdateOutcome};
use crate::saved_vg::SavedVgStore;
use crate::scan::ScanOrchestrator;

/// Process-wide defaults for this cache instance. Constructed once
/// per command and handed to `LvmCache::new`.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub hostname: String,
    pub clustered: bool,
    pub suppress_lock_ordering: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { hostname: String::new(), clustered: false, suppress_lock_ordering: false }
    }
}

/// The cache: indexed entity store, lock registry, saved-VG store, and scan
/// orchestration, composed behind one explicit context (single-threaded,
/// no internal parallelism — callers own any cross-thread hand-off).
pub struct LvmCache {
    config: CacheConfig,
    index: Index,
    locks: LockRegistry,
    saved_vgs: SavedVgStore,
    scanner_state: ScanOrchestrator,
    found_duplicates: Vec<(Pvid, DeviceId)>,
}

impl LvmCache {
    pub fn new(config: CacheConfig) -> Self {
        let mut locks = LockRegistry::new();
        locks.set_suppress_ordering(config.suppress_lock_ordering);
        let saved_vgs = SavedVgStore::new(config.clustered);
        LvmCache {
            config,
            index: Index::new(),
            locks,
            saved_vgs,
            scanner_state: ScanOrchestrator::new(),
            found_duplicates: Vec::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut Index {
        &mut self.index
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    // -- Update pipeline ----------------------------------------------

    pub fn update_pv(
        &mut self,
        pvid: Pvid,
        dev: DeviceId,
        fmt: Option<String>,
        vg_summary: Option<&crate::entity::VgSummary>,
    ) -> UpdateOutcome {
        let mut dup_devices = Vec::new();
        let outcome = pipeline::update_pv(
            &mut self.index,
            &self.config.hostname,
            pvid,
            dev,
            fmt,
            vg_summary,
            &mut dup_devices,
        );
        self.found_duplicates.extend(dup_devices.into_iter().map(|d| (pvid, d)));
        outcome
    }

    // -- Scan orchestration --------------------------------------------

    pub fn scan(
        &mut self,
        scanner: &mut dyn LabelScanner,
        enumerator: &dyn DeviceEnumerator,
        independent_formats: &mut [Box<dyn FormatType>],
    ) -> Result<usize> {
        self.scanner_state.scan(
            &mut self.index,
            &self.config.hostname,
            scanner,
            enumerator,
            independent_formats,
        )
    }

    pub fn rescan_vg(&mut self, scanner: &mut dyn LabelScanner, vgname: &str, vgid: Vgid) -> bool {
        self.scanner_state.rescan_vg(&mut self.index, &self.config.hostname, scanner, vgname, vgid)
    }

    // -- Duplicate arbitration, for callers driving it outside a scan --

    /// Arbitrates over duplicates accumulated since the last call (via
    /// `update_pv` or a scan), then clears that accumulator. The caller is
    /// responsible for applying `drop_set`/`add_set` back into the cache.
    pub fn arbitrate_now(&mut self, enumerator: &dyn DeviceEnumerator) -> crate::duplicates::ArbitrationResult {
        let result = arbitrate(
            &self.index,
            enumerator,
            &self.found_duplicates,
            self.scanner_state.unused_duplicates(),
        );
        self.found_duplicates.clear();
        result
    }

    // -- Lock registry -------------------------------------------------

    pub fn lock(&mut self, name: LockName) -> Result<()> {
        self.locks.acquire(&mut self.index, name)
    }

    pub fn unlock(&mut self, name: &LockName) -> Result<()> {
        self.locks.release(&mut self.index, name)
    }

    pub fn is_vg_locked(&self, name: &LockName) -> bool {
        self.locks.is_locked(name)
    }

    // -- Saved-VG store ------------------------------------------------

    pub fn save_vg(
        &mut self,
        codec: &dyn MetadataCodec,
        vgid: Vgid,
        name: &str,
        seqno: u32,
        precommitted: bool,
    ) -> Result<()> {
        self.saved_vgs.save(codec, vgid, name, seqno, precommitted)
    }

    pub fn get_saved_vg(&mut self, vgid: Vgid, precommitted: bool) -> Option<ParsedVg> {
        self.saved_vgs.get(vgid, precommitted)
    }

    pub fn get_saved_vg_latest(&mut self, vgid: Vgid) -> Option<ParsedVg> {
        self.saved_vgs.get_latest(vgid)
    }

    pub fn commit_vg(&mut self, vgid: Vgid) {
        self.saved_vgs.commit(vgid)
    }

    pub fn drop_saved_vg(&mut self, vgid: Vgid, drop_precommitted: bool) {
        let global_held = self.is_vg_locked(&LockName::Global);
        self.saved_vgs.drop_vg(vgid, drop_precommitted, global_held)
    }

    // -- Entity lookups, re-exposed for convenience ---------------

    pub fn find_pv(&self, pvid: Pvid) -> Option<PvKey> {
        self.index.pv_key_by_pvid(pvid)
    }

    pub fn find_vg(&self, name: &str, vgid: Vgid) -> Option<VgKey> {
        self.index.find_vg_by_name_and_id(name, vgid)
    }

    // -- Teardown ----------------

    /// Resets all process-wide state. If the global sentinel was held at
    /// teardown, the next `reinit` re-asserts it without the caller
    /// noticing a gap.
    pub fn teardown(&mut self, retain_orphans: bool) {
        self.locks.teardown();
        self.saved_vgs.teardown();
        if !retain_orphans {
            self.index = Index::new();
        }
        self.found_duplicates.clear();
    }

    /// Companion to `teardown`: re-initializes per-command state, carrying
    /// the global-lock flag forward.
    pub fn reinit(&mut self) {
        self.locks.reinit_after_teardown();
    }
}
