//! End-to-end tests for cellar-xlsx.
//!
//! Packages are built in memory with [`common::PackageBuilder`], opened,
//! changed, saved into a `Cursor<Vec<u8>>` or a temporary directory, and
//! read back.

mod common;
mod lifecycle;
mod objects;
mod streaming;
mod styles;

pub use common::*;
