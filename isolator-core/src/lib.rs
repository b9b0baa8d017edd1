//! Core of the isolator container runtime.
//!
//! This crate implements image materialization, tar extraction, the recipe
//! build pipeline, the rootfs registry, and the namespace-based container
//! launcher/init. It never parses CLI arguments or configuration files --
//! callers (e.g. `isolator-cli`) hand it already-resolved values.

pub mod archive;
pub mod container;
pub mod image;
pub mod recipe;
pub mod registry;
pub mod run_config;
pub mod slug;

pub use anyhow::{anyhow, Context as ErrContext, Error, Result};

/// Builds an ad hoc [`anyhow::Error`] from a format string.
#[macro_export]
macro_rules! err {
    ($it:ident) => {
        Err($crate::Error::msg($it))
    };
    ($lit:literal) => {
        Err($crate::Error::msg($lit))
    };
    ($($tt:tt)*) => {
        Err($crate::Error::msg(format!($($tt)*)))
    };
}

/// Default host path under which rootfs directories are materialized.
pub const DEFAULT_BASE_DIR: &str = "/var/lib/isolator/rootfs";
