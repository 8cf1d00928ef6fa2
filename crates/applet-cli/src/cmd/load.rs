//! Load command

use crate::context::Overrides;
use anyhow::Result;
use crossterm::style::Stylize;

/// Restore installed state from disk and report what was found.
/// Fails on the first untrusted or corrupt package.
pub fn load(overrides: &Overrides) -> Result<()> {
    let (ctx, summary) = overrides.open_loaded()?;
    println!(
        "  {} loaded {} solution(s) and {} applet(s) from {}",
        "✓".green(),
        summary.solutions,
        summary.applets,
        ctx.settings.applet_directory.display()
    );
    if summary.skipped > 0 {
        println!("  {} skipped {} duplicate(s)", "!".yellow(), summary.skipped);
    }
    Ok(())
}
