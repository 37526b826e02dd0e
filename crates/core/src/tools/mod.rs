//! Tool bootstrap model.
//!
//! - [`Platform`], [`Os`], [`Arch`] - Platform identification types
//! - [`ToolSpec`] - Archive locations and layout of one external tool
//!
//! Installation itself lives in the `depot-tools-archive` crate.

mod platform;
mod spec;

pub use platform::{Arch, Os, Platform};
pub use spec::{DEFAULT_ARCHIVE_KEY, ToolSpec, expand_template};
