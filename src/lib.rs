#![doc = include_str!("../readme.md")]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

// For macros and doc links to be able to use the `trenchbroom_mapio` path.
extern crate self as trenchbroom_mapio;

#[macro_use]
pub mod util;

pub mod brush;
pub mod config;
pub mod entity;
pub mod format;
pub mod geometry;
pub mod node;
pub mod patch;
pub mod prelude;
pub mod qmap;
pub mod status;
pub mod tasks;

pub(crate) use prelude::*;

// Re-exports
pub use anyhow;
pub use enumflags2;
