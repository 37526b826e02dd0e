//! Tool bootstrap for depot.
//!
//! [`ToolBootstrapper::ensure_installed`] makes sure a named tool version is
//! unpacked under `<tools_root>/<name>/<version>/` and returns the path of its
//! executable. The archive URL comes from a [`ToolSpec`](depot_core::tools::ToolSpec)
//! template selected by platform. A present executable short-circuits any
//! download.

pub mod bootstrap;
pub mod extract;
pub mod source;

pub use bootstrap::ToolBootstrapper;
pub use extract::{ArchiveFormat, unpack};
pub use source::{ArchiveSource, HttpArchiveSource};
