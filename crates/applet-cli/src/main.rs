//! applet - administrative CLI for applet packages

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use applet_cli::cmd;
use applet_cli::context::Overrides;
use applet_cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = Overrides {
        config: cli.config,
        applet_dir: cli.applet_dir,
    };

    match cli.command {
        Commands::Verify { file } => cmd::verify::verify(&overrides, &file),
        Commands::Inspect { file, json } => cmd::inspect::inspect(&file, json),
        Commands::Install { file, upgrade } => cmd::install::install(&overrides, &file, upgrade),
        Commands::Uninstall { id } => cmd::remove::uninstall(&overrides, &id),
        Commands::UninstallSolution { id } => cmd::remove::uninstall_solution(&overrides, &id),
        Commands::List { scope } => cmd::list::list(&overrides, scope.as_deref()),
        Commands::Solutions => cmd::list::solutions(&overrides),
        Commands::Load => cmd::load::load(&overrides),
    }
}
