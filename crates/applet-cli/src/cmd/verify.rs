//! Verify command

use crate::context::{Overrides, read_package};
use anyhow::{Result, bail};
use applet_core::{IntegrityError, Verification};
use applet_schema::{PackageFile, PackageId};
use crossterm::style::Stylize;
use std::path::Path;

/// Verify a package (and, for a solution, every included applet) against
/// the configured trust settings without installing anything.
pub fn verify(overrides: &Overrides, file: &Path) -> Result<()> {
    let ctx = overrides.open()?;
    let verifier = ctx.registry().verifier();
    let config = ctx.registry().config();

    let mut failures = 0usize;
    match read_package(file)? {
        PackageFile::Applet(applet) => {
            failures += report(&applet.meta.id, verifier.verify(&applet, config));
        }
        PackageFile::Solution(solution) => {
            failures += report(&solution.meta.id, verifier.verify(&solution, config));
            for include in &solution.include {
                failures += report(&include.meta.id, verifier.verify(include, config));
            }
        }
    }

    if failures > 0 {
        bail!("{failures} package(s) failed verification");
    }
    Ok(())
}

/// Print one result line. Returns 1 on failure.
fn report(id: &PackageId, result: Result<Verification, IntegrityError>) -> usize {
    match result {
        Ok(Verification::Signed {
            subject,
            thumbprint,
        }) => {
            println!("  {} {id}  signed by {subject} ({thumbprint})", "✓".green());
            0
        }
        Ok(Verification::Unsigned) => {
            println!("  {} {id}  unsigned, allowed by configuration", "✓".yellow());
            0
        }
        Err(e) => {
            println!("  {} {id}  {e}", "✗".red());
            1
        }
    }
}
