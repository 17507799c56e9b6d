//! # Project Configuration
//!
//! The per-project `sitrep.json` file: which components to track, their
//! weights and file patterns, where build logs live, and how fixes are
//! verified. Missing fields fall back to defaults so old config files keep
//! working as the format grows.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sitrep_core::context::DEFAULT_RETENTION;
use sitrep_core::score::WeightTable;

/// Config file name, relative to the project root.
pub const CONFIG_FILE: &str = "sitrep.json";

/// Data directory name, relative to the project root.
pub const DATA_DIR: &str = ".sitrep";

/// Database file name inside the data directory.
pub const DB_FILE: &str = "sitrep.redb";

/// Signal name for the version-control collector.
pub const VCS_SIGNAL: &str = "version_control";

/// Signal name for the build-output collector.
pub const BUILD_SIGNAL: &str = "build";

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// =============================================================================
// COMPONENT SPEC
// =============================================================================

/// One tracked filesystem component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Component name; becomes the signal name.
    pub name: String,

    /// Weight in the readiness average.
    pub weight: f64,

    /// Directory to inventory, relative to the project root.
    pub path: PathBuf,

    /// File extensions counted as part of this component.
    pub extensions: Vec<String>,

    /// Expected file count for a complete component.
    pub expected_files: u64,
}

// =============================================================================
// PROJECT CONFIG
// =============================================================================

/// The full project configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub project_name: String,

    /// Tracked filesystem components, in weight-table declaration order.
    pub components: Vec<ComponentSpec>,

    /// Weight of the version-control signal.
    pub vcs_weight: f64,

    /// Weight of the build signal.
    pub build_weight: f64,

    /// Context log retention bound.
    pub retention: usize,

    /// Per-collector timeout.
    pub collector_timeout_ms: u64,

    /// How many recent errors a status report carries.
    pub recent_error_limit: usize,

    /// Candidate build log locations, relative to the project root; the
    /// newest existing one is read.
    pub build_logs: Vec<PathBuf>,

    /// Shell command used to verify fixes; `None` disables verification.
    pub verify_command: Option<String>,

    /// Bounded wait for the verification build.
    pub verify_timeout_ms: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_name: "project".to_string(),
            components: vec![ComponentSpec {
                name: "sources".to_string(),
                weight: 3.0,
                path: PathBuf::from("src"),
                extensions: vec!["rs".to_string()],
                expected_files: 1,
            }],
            vcs_weight: 1.0,
            build_weight: 2.0,
            retention: DEFAULT_RETENTION,
            collector_timeout_ms: 2_000,
            recent_error_limit: 5,
            build_logs: vec![PathBuf::from("build.log")],
            verify_command: None,
            verify_timeout_ms: 120_000,
        }
    }
}

impl ProjectConfig {
    /// The registered weight table: components in declaration order, then
    /// version control, then build.
    #[must_use]
    pub fn weight_table(&self) -> WeightTable {
        let mut table = WeightTable::new();
        for spec in &self.components {
            table = table.with(spec.name.clone(), spec.weight);
        }
        table
            .with(VCS_SIGNAL, self.vcs_weight)
            .with(BUILD_SIGNAL, self.build_weight)
    }

    /// Path of the config file under `root`.
    #[must_use]
    pub fn path(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE)
    }

    /// Path of the database file under `root`.
    #[must_use]
    pub fn db_path(root: &Path) -> PathBuf {
        root.join(DATA_DIR).join(DB_FILE)
    }

    /// Load the config under `root`, or defaults when no file exists.
    pub fn load(root: &Path) -> ConfigResult<Self> {
        let path = Self::path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write this config under `root`.
    pub fn save(&self, root: &Path) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(root), content)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
