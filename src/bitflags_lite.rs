//! A tiny hand-rolled bitflags macro.
//!
//! We only ever need a handful of bits for PV/VG status, so a dependency on
//! `bitflags` isn't worth it — this macro gives the same `contains`/`insert`/
//! `remove`/`set` surface the status-bit call sites expect. The generated
//! type still derives `serde::{Serialize, Deserialize}`, matching the
//! teacher's habit of deriving both on every cache-facing data struct
//! (`core/block.rs`).

macro_rules! bitflags_lite {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $ty:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
        pub struct $name($ty);

        impl $name {
            $(pub const $flag: $name = $name($value);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub fn contains(&self, other: $name) -> bool {
                (self.0 & other.0) == other.0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: $name) {
                self.0 &= !other.0;
            }

            pub fn set(&mut self, other: $name, on: bool) {
                if on {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }

            pub fn bits(&self) -> $ty {
                self.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

pub(crate) use bitflags_lite;
