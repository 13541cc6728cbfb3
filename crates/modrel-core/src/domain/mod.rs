//! Domain types for module releases.

pub mod error;
pub mod module;

pub use error::{ReleaseError, Result};
pub use module::{ModuleRelease, VERSION_FILE};
