//! In-process metadata cache for a block-device volume manager.
//!
//! Maps physical volumes and volume groups to cached per-device state and
//! per-VG summaries so higher-level commands can consult this cache instead
//! of re-reading on-disk labels. Single-threaded: the cache is owned by one
//! command's call stack for its lifetime (see [`cache::LvmCache`]).

pub mod bitflags_lite;
pub mod cache;
pub mod duplicates;
pub mod entity;
pub mod error;
pub mod external;
pub mod ids;
pub mod index;
pub mod locks;
pub mod pipeline;
pub mod saved_vg;
pub mod scan;

#[cfg(test)]
mod tests;

pub use cache::{CacheConfig, LvmCache};
pub use error::{CacheError, Result};
pub use ids::{DeviceId, LockName, Pvid, Vgid};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
