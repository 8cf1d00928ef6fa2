//! Shared command context.
//!
//! Resolves configuration, opens the trust store and builds the registry that
//! every command operates on.

use anyhow::{Context as _, Result};
use applet_core::config::{default_config_path, try_applet_home};
use applet_core::{
    AppletRegistry, InMemoryTemplateRegistry, LoadSummary, Settings, SolutionManager,
    X509TrustStore, load_all,
};
use applet_schema::PackageFile;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Groups the state a command needs.
#[derive(Clone)]
pub struct Context {
    pub settings: Settings,
    pub solutions: SolutionManager,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Build a context from CLI overrides, without loading installed packages.
    pub fn open(config: Option<&Path>, applet_dir: Option<&Path>) -> Result<Self> {
        let home = try_applet_home().context("Could not determine the applet home directory")?;
        let config_path = config.map_or_else(|| default_config_path(&home), Path::to_path_buf);
        let mut settings = Settings::load(&config_path, &home)?;
        if let Some(dir) = applet_dir {
            settings.applet_directory = dir.to_path_buf();
        }
        tracing::debug!(
            applet_dir = %settings.applet_directory.display(),
            trust_store = %settings.trust_store.display(),
            "resolved settings"
        );

        let trust = X509TrustStore::load_dir(&settings.trust_store).with_context(|| {
            format!(
                "Failed to read trust store {}",
                settings.trust_store.display()
            )
        })?;

        let registry = AppletRegistry::new(
            Arc::new(settings.clone()),
            Arc::new(trust),
            Arc::new(InMemoryTemplateRegistry::new()),
        );
        Ok(Self {
            settings,
            solutions: SolutionManager::new(registry),
        })
    }

    pub fn registry(&self) -> &AppletRegistry {
        self.solutions.registry()
    }
}

/// Read and decode a package file.
pub fn read_package(path: &Path) -> Result<PackageFile> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    PackageFile::from_bytes(&bytes)
        .with_context(|| format!("{} is not a valid package", path.display()))
}

/// CLI overrides passed down to every command.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub applet_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn open(&self) -> Result<Context> {
        Context::open(self.config.as_deref(), self.applet_dir.as_deref())
    }

    /// Open a context and restore installed state from disk.
    pub fn open_loaded(&self) -> Result<(Context, LoadSummary)> {
        let ctx = self.open()?;
        let summary = load_all(&ctx.solutions).context("Failed to load installed packages")?;
        Ok((ctx, summary))
    }
}
