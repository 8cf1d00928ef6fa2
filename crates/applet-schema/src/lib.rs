//! Shared types and wire format for applet packages.

pub mod hash;
pub mod types;
pub mod version;
pub mod wire;

// Re-exports
pub use hash::*;
pub use types::*;
pub use version::AppletVersion;
pub use wire::{PackageFile, WireError, encode_applet, encode_solution, is_solution_file};

/// File extension of a single applet package.
pub const APPLET_EXTENSION: &str = "pak";

/// File suffix marking a solution envelope on disk.
pub const SOLUTION_SUFFIX: &str = ".sln.pak";
