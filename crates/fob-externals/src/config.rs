//! Externals configuration.
//!
//! `ExternalsConfig` is the input object of the engine. It can be built in code
//! or loaded from the `[externals]` table of a `fob.toml`, with
//! `FOB_EXTERNALS_*` environment variables taking precedence.
//!
//! Priority: Environment > File > Defaults

use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::node_modules::normalize_slashes;
use crate::{Error, Result};

/// Configuration file read from the working directory when no path is given.
const DEFAULT_CONFIG_FILE: &str = "fob.toml";

/// Table name inside `fob.toml`.
const CONFIG_KEY: &str = "externals";

/// Environment variable prefix.
const ENV_PREFIX: &str = "FOB_EXTERNALS_";

/// How multiple versions of the same package are placed in the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicyKind {
    /// Every version gets an isolated directory; consumers see their own
    /// version through nested links.
    #[default]
    Shadowed,
    /// One version per package name wins; for targets that cannot nest links.
    Flat,
}

/// Configuration for externals classification, tracing and materialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalsConfig {
    /// Id prefixes that are always inlined by the bundler.
    pub inline: Vec<String>,

    /// Id prefixes that are always externalized without tracing.
    pub external: Vec<String>,

    /// Trace externalized packages and materialize their closure.
    pub trace: bool,

    /// Extra ids whose resolved files are added to the trace roots.
    pub trace_include: Vec<String>,

    /// Path substrings the tracer records as ignored and does not follow.
    pub trace_ignore: Vec<String>,

    /// Output directory; `node_modules` and the manifest are written here.
    pub out_dir: PathBuf,

    /// Directories bare ids are resolved from. Empty means the current
    /// working directory.
    pub module_directories: Vec<PathBuf>,

    /// Export conditions used for resolution, in priority order.
    pub export_conditions: Vec<String>,

    /// Placement policy for packages with several versions.
    pub conflict_policy: ConflictPolicyKind,

    /// Maximum number of files copied concurrently.
    pub copy_concurrency: usize,

    /// Attempts per file copy before the build fails.
    pub copy_retries: u32,

    /// `name` field of the emitted manifest.
    pub manifest_name: String,

    /// `version` field of the emitted manifest.
    pub manifest_version: String,
}

impl Default for ExternalsConfig {
    fn default() -> Self {
        Self {
            inline: Vec::new(),
            external: Vec::new(),
            trace: true,
            trace_include: Vec::new(),
            trace_ignore: Vec::new(),
            out_dir: PathBuf::from(".output/server"),
            module_directories: Vec::new(),
            export_conditions: default_export_conditions(),
            conflict_policy: ConflictPolicyKind::default(),
            copy_concurrency: default_copy_concurrency(),
            copy_retries: 3,
            manifest_name: "fob-output".to_string(),
            manifest_version: "0.0.0".to_string(),
        }
    }
}

/// Export conditions for a production server build.
pub fn default_export_conditions() -> Vec<String> {
    ["default", "production", "module", "node", "import"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// File copies are I/O bound; allow more workers than cores, but keep the
/// number of open descriptors bounded.
pub fn default_copy_concurrency() -> usize {
    (num_cpus::get() * 2).clamp(4, 32)
}

impl ExternalsConfig {
    /// Create a configuration writing to `out_dir`, defaults elsewhere.
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file and the environment.
    ///
    /// The file is optional; a missing file leaves the defaults in place.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut figment =
            Figment::new().merge(Serialized::default(CONFIG_KEY, Self::default()));

        // Figment reads the file itself; a missing file is an empty provider.
        let config_file = match config_path {
            Some(path) => Toml::file(path),
            None => Toml::file_exact(DEFAULT_CONFIG_FILE),
        };
        figment = figment.merge(config_file);

        figment = figment.merge(
            Env::prefixed(ENV_PREFIX).map(|key| format!("{CONFIG_KEY}.{key}").into()),
        );

        let config: Self = figment
            .extract_inner(CONFIG_KEY)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        config.validate()?;
        Ok(config.normalized())
    }

    /// Check invariants the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.copy_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "copy_concurrency must be at least 1".to_string(),
            ));
        }
        if self.copy_retries == 0 {
            return Err(Error::InvalidConfig(
                "copy_retries must be at least 1".to_string(),
            ));
        }
        if self.out_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("out_dir must not be empty".to_string()));
        }
        Ok(())
    }

    /// Normalize the prefix lists to forward slashes.
    pub fn normalized(mut self) -> Self {
        self.inline = self.inline.iter().map(|p| normalize_slashes(p)).collect();
        self.external = self.external.iter().map(|p| normalize_slashes(p)).collect();
        self
    }

    /// Search roots for bare-id resolution, falling back to `cwd`.
    pub fn search_roots(&self, cwd: &Path) -> Vec<PathBuf> {
        if self.module_directories.is_empty() {
            vec![cwd.to_path_buf()]
        } else {
            self.module_directories
                .iter()
                .map(|dir| if dir.is_absolute() { dir.clone() } else { cwd.join(dir) })
                .collect()
        }
    }

    pub fn with_inline<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inline
            .extend(prefixes.into_iter().map(|p| normalize_slashes(&p.into())));
        self
    }

    pub fn with_external<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.external
            .extend(prefixes.into_iter().map(|p| normalize_slashes(&p.into())));
        self
    }

    pub fn with_module_directories<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.module_directories = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_trace_include<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trace_include = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicyKind) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn with_copy_concurrency(mut self, concurrency: usize) -> Self {
        self.copy_concurrency = concurrency;
        self
    }

    pub fn with_copy_retries(mut self, retries: u32) -> Self {
        self.copy_retries = retries;
        self
    }
}
