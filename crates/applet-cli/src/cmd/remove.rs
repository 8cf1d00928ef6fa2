//! Uninstall commands

use crate::context::Overrides;
use anyhow::{Context, Result};
use applet_schema::PackageId;
use crossterm::style::Stylize;

/// Remove an applet from the global scope.
pub fn uninstall(overrides: &Overrides, id: &str) -> Result<()> {
    let id = PackageId::new(id);
    let (ctx, _) = overrides.open_loaded()?;
    ctx.registry()
        .uninstall(&id)
        .with_context(|| format!("Failed to uninstall '{id}'"))?;
    println!("  {} removed {id}", "✓".green());
    Ok(())
}

/// Remove a solution and its private scope. Promoted applets stay global.
pub fn uninstall_solution(overrides: &Overrides, id: &str) -> Result<()> {
    let id = PackageId::new(id);
    let (ctx, _) = overrides.open_loaded()?;
    ctx.solutions
        .uninstall_solution(&id)
        .with_context(|| format!("Failed to uninstall solution '{id}'"))?;
    println!("  {} removed solution {id}", "✓".green());
    Ok(())
}
