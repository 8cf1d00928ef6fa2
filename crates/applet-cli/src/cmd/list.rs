use crate::context::Overrides;
use anyhow::{Result, bail};
use applet_schema::{PackageId, ScopeId};
use crossterm::style::Stylize;

/// List the applets in one scope.
pub fn list(overrides: &Overrides, scope: Option<&str>) -> Result<()> {
    let (ctx, _) = overrides.open_loaded()?;
    let scope = scope.map_or(ScopeId::GLOBAL, ScopeId::from);
    if !ctx.registry().scopes().contains(&scope) {
        bail!("No solution named '{scope}' is installed");
    }

    let snapshot = ctx.registry().list_scope(&scope).snapshot();
    if snapshot.is_empty() {
        println!();
        println!("  No applets installed in {scope}.");
        return Ok(());
    }

    println!();
    println!(
        "  {} {} {}",
        format!("{:<32}", "ID").bold(),
        format!("{:<12}", "VERSION").bold(),
        "NAME".bold()
    );
    for manifest in snapshot.iter() {
        println!(
            "  {:<32} {:<12} {}",
            manifest.id().as_str(),
            manifest.version().as_str(),
            manifest.info.name.as_deref().unwrap_or("").dark_grey()
        );
    }
    println!();
    println!("  {} applet(s) in {scope}", snapshot.len());
    Ok(())
}

/// List installed solutions.
pub fn solutions(overrides: &Overrides) -> Result<()> {
    let (ctx, _) = overrides.open_loaded()?;
    let solutions = ctx.solutions.solutions();
    if solutions.is_empty() {
        println!();
        println!("  No solutions installed.");
        return Ok(());
    }

    println!();
    for record in &solutions {
        println!(
            "  {} {}  {}",
            record.id.as_str().white().bold(),
            record.version.as_str().dark_grey(),
            record.author
        );
        let ids: Vec<&str> = record.includes.iter().map(PackageId::as_str).collect();
        println!("    {}", ids.join(", "));
    }
    Ok(())
}
