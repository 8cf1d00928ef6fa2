//! Configuration provider and default paths.
//!
//! The registry only sees the [`AppletConfig`] trait. [`Settings`] is the
//! concrete provider used by the CLI, loaded from `config.toml` under the
//! applet home (`$APPLET_HOME`, else `~/.applets`).

use anyhow::{Context, Result};
use applet_schema::Thumbprint;
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// What to do when a package's dependencies are not installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyPolicy {
    /// Log a warning and install anyway.
    #[default]
    Warn,
    /// Fail the install with `DependencyUnsatisfied`.
    Reject,
}

/// Configuration the registry reads at verification and install time.
pub trait AppletConfig: Send + Sync {
    /// Root directory for package files.
    fn applet_directory(&self) -> PathBuf;

    /// Thumbprints of certificates trusted as publishers (and their issuers).
    fn trusted_publishers(&self) -> HashSet<Thumbprint>;

    /// Whether packages without a signature may be installed.
    fn allow_unsigned_packages(&self) -> bool;

    /// Install-time handling of unsatisfied dependencies.
    fn dependency_policy(&self) -> DependencyPolicy {
        DependencyPolicy::Warn
    }
}

impl<T: AppletConfig + ?Sized> AppletConfig for std::sync::Arc<T> {
    fn applet_directory(&self) -> PathBuf {
        (**self).applet_directory()
    }
    fn trusted_publishers(&self) -> HashSet<Thumbprint> {
        (**self).trusted_publishers()
    }
    fn allow_unsigned_packages(&self) -> bool {
        (**self).allow_unsigned_packages()
    }
    fn dependency_policy(&self) -> DependencyPolicy {
        (**self).dependency_policy()
    }
}

/// Returns the applet home directory, or None if the user's home cannot be resolved.
pub fn try_applet_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("APPLET_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".applets"))
}

/// Default config file: `{home}/config.toml`
pub fn default_config_path(home: &Path) -> PathBuf {
    home.join("config.toml")
}

/// File-backed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Package directory.
    pub applet_directory: PathBuf,
    /// Directory of trusted publisher / issuer certificates (`.der`, `.cer`, `.pem`, `.crt`).
    pub trust_store: PathBuf,
    /// Hex thumbprints of trusted publishers.
    pub trusted_publishers: Vec<String>,
    /// Accept unsigned packages.
    pub allow_unsigned_packages: bool,
    /// Install-time dependency handling.
    pub dependency_policy: DependencyPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_home(Path::new(".applets"))
    }
}

impl Settings {
    /// Defaults rooted at `home`: `home/applets` and `home/trust`.
    pub fn with_home(home: &Path) -> Self {
        Self {
            applet_directory: home.join("applets"),
            trust_store: home.join("trust"),
            trusted_publishers: Vec::new(),
            allow_unsigned_packages: false,
            dependency_policy: DependencyPolicy::Warn,
        }
    }

    /// Parse settings from TOML text. Relative paths are resolved against `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a thumbprint is not hex.
    pub fn from_toml(text: &str, base: &Path) -> Result<Self> {
        let mut settings: Settings = toml::from_str(text).context("Failed to parse config")?;
        if settings.applet_directory.is_relative() {
            settings.applet_directory = base.join(&settings.applet_directory);
        }
        if settings.trust_store.is_relative() {
            settings.trust_store = base.join(&settings.trust_store);
        }
        for entry in &settings.trusted_publishers {
            Thumbprint::from_hex(entry)
                .with_context(|| format!("Invalid trusted publisher thumbprint '{entry}'"))?;
        }
        Ok(settings)
    }

    /// Load settings from `path`, falling back to defaults under `home` if the
    /// file does not exist. `APPLET_ALLOW_UNSIGNED=1` forces unsigned packages on.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path, home: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let base = path.parent().unwrap_or(home);
            Self::from_toml(&text, base)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::with_home(home)
        };

        if std::env::var("APPLET_ALLOW_UNSIGNED")
            .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        {
            settings.allow_unsigned_packages = true;
        }
        Ok(settings)
    }
}

impl AppletConfig for Settings {
    fn applet_directory(&self) -> PathBuf {
        self.applet_directory.clone()
    }

    fn trusted_publishers(&self) -> HashSet<Thumbprint> {
        // Entries were validated when the settings were parsed.
        self.trusted_publishers
            .iter()
            .filter_map(|s| Thumbprint::from_hex(s).ok())
            .collect()
    }

    fn allow_unsigned_packages(&self) -> bool {
        self.allow_unsigned_packages
    }

    fn dependency_policy(&self) -> DependencyPolicy {
        self.dependency_policy
    }
}
