//! Inspect command

use crate::context::read_package;
use anyhow::Result;
use applet_schema::PackageFile;
use crossterm::style::Stylize;
use std::path::Path;

/// Print the metadata of a package file.
pub fn inspect(file: &Path, json: bool) -> Result<()> {
    let package = read_package(file)?;
    let meta = package.meta();

    if json {
        println!("{}", serde_json::to_string_pretty(meta)?);
        return Ok(());
    }

    let lw = 12;
    println!();
    println!(
        "  {} {}",
        meta.id.as_str().white().bold(),
        meta.version.as_str().dark_grey()
    );
    if package.is_solution() {
        println!("  solution envelope");
    }
    println!();

    println!("  {:<lw$}{}", "author", meta.author);
    println!("  {:<lw$}{}", "hash", meta.content_hash);
    println!(
        "  {:<lw$}{}",
        "signed",
        if meta.signature.is_some() { "yes" } else { "no" }
    );
    if !meta.public_key_token.is_empty() {
        println!("  {:<lw$}{}", "publisher", meta.public_key_token);
    }
    println!(
        "  {:<lw$}{}",
        "timestamp",
        meta.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if !meta.dependencies.is_empty() {
        let deps: Vec<String> = meta.dependencies.iter().map(ToString::to_string).collect();
        println!("  {:<lw$}{}", "requires", deps.join(", "));
    }

    match &package {
        PackageFile::Solution(solution) => {
            for (i, include) in solution.include.iter().enumerate() {
                let label = if i == 0 { "includes" } else { "" };
                println!("  {label:<lw$}{} {}", include.meta.id, include.meta.version);
            }
        }
        PackageFile::Applet(applet) => {
            // A manifest that fails to decode is reported at install time.
            if let Ok(manifest) = applet.unpack() {
                for (i, template) in manifest.templates.iter().enumerate() {
                    let label = if i == 0 { "templates" } else { "" };
                    println!("  {label:<lw$}{}", template.mnemonic);
                }
            }
        }
    }
    println!();
    Ok(())
}
