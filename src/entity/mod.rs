//! Cached entity types: `PvInfo` and `VgInfo`.

pub mod pv;
pub mod vg;

pub use pv::{BootloaderArea, DataArea, MetadataArea, PvInfo, PvStatus, PvView};
pub use vg::{ScanSummary, VgInfo, VgStatus, VgSummary};
