//! applet - administrative CLI for applet packages
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Verifies, inspects, installs and removes `.pak` files in a local applet
//! directory. Every command that touches installed state first rebuilds the
//! registry from disk, exactly as a host process does at startup.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.applets/
//! ├── config.toml         # Settings
//! ├── trust/              # Trusted publisher and issuer certificates
//! └── applets/
//!     ├── {id}.pak
//!     ├── {solution}.sln.pak
//!     └── {solution}/{id}.pak
//! ```

pub mod cmd;
pub mod context;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "applet")]
#[command(author, version, about = "applet - verify and install signed applet packages")]
pub struct Cli {
    /// Path to config.toml (defaults to $APPLET_HOME/config.toml)
    #[arg(long, global = true, env = "APPLET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the applet directory from the config
    #[arg(long, global = true)]
    pub applet_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check a package's hash and signature without installing it
    Verify {
        /// Package file
        file: PathBuf,
    },
    /// Print a package's metadata
    Inspect {
        /// Package file
        file: PathBuf,
        /// Print the metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// Install an applet or solution package
    Install {
        /// Package file
        file: PathBuf,
        /// Replace an installed package with the same id
        #[arg(long, short = 'u')]
        upgrade: bool,
    },
    /// Remove an applet from the global scope
    Uninstall {
        /// Applet id
        id: String,
    },
    /// Remove a solution and its private scope
    #[command(name = "uninstall-solution")]
    UninstallSolution {
        /// Solution id
        id: String,
    },
    /// List installed applets
    List {
        /// Scope to list (a solution id); defaults to the global scope
        #[arg(long)]
        scope: Option<String>,
    },
    /// List installed solutions
    Solutions,
    /// Load every installed package and report what was restored
    Load,
}
