//! Install command

use crate::context::{Overrides, read_package};
use anyhow::{Context, Result};
use applet_schema::{PackageFile, ScopeId};
use crossterm::style::Stylize;
use std::path::Path;

/// Install an applet into the global scope, or a solution into its own scope.
pub fn install(overrides: &Overrides, file: &Path, upgrade: bool) -> Result<()> {
    let package = read_package(file)?;
    let (ctx, _) = overrides.open_loaded()?;

    match package {
        PackageFile::Applet(applet) => {
            let manifest = ctx
                .registry()
                .install(&ScopeId::GLOBAL, &applet, upgrade)
                .with_context(|| format!("Failed to install '{}'", applet.meta.id))?;
            println!(
                "  {} {} {}",
                "✓".green(),
                manifest.id(),
                manifest.version().as_str().dark_grey()
            );
        }
        PackageFile::Solution(solution) => {
            let record = ctx
                .solutions
                .install_solution(&solution, upgrade)
                .with_context(|| format!("Failed to install solution '{}'", solution.meta.id))?;
            println!(
                "  {} {} {}  ({} applets)",
                "✓".green(),
                record.id,
                record.version.as_str().dark_grey(),
                record.includes.len()
            );
        }
    }
    Ok(())
}
