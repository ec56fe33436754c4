//! TOML configuration document set and `from_settings` glue (§6).
//!
//! `sourcemerge.toml` under the config root is the single document; it is
//! parsed once at startup and turned into the option structs each core
//! component's constructor expects. Validation here is basic field-level
//! checking, not the legacy migration/self-healing engine spec.md excludes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use sourcemerge_core::merge_workflow::MergeWorkflowOptions;
use sourcemerge_core::mount_command::MountCommandOptions;
use sourcemerge_core::mount_snapshot::MountSnapshotOptions;
use sourcemerge_core::pipeline::TriggerPipelineOptions;
use sourcemerge_core::reconcile::ActionKind;
use sourcemerge_core::rename_processor::ChapterRenameOptions;

use crate::supervisor::SupervisorOptions;

const CONFIG_FILE_NAME: &str = "sourcemerge.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path} as TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub paths: PathsSettings,
    #[serde(default)]
    pub rename: RenameSettings,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub shutdown: ShutdownSettings,
    #[serde(default)]
    pub diagnostics: DiagnosticsSettings,
    #[serde(default)]
    pub manga_equivalents: MangaEquivalents,
    #[serde(default)]
    pub source_priority: SourcePriority,
    #[serde(default)]
    pub scene_tags: SceneTags,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSettings {
    pub sources_root: PathBuf,
    pub override_root: PathBuf,
    pub merged_root: PathBuf,
    pub branch_links_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenameSettings {
    pub delay_secs: u64,
    pub rescan_grace_secs: u64,
    pub quiet_window_secs: u64,
    pub poll_interval_secs: u64,
    pub rescan_interval_secs: u64,
    pub excluded_sources: Vec<String>,
}

impl Default for RenameSettings {
    fn default() -> Self {
        Self {
            delay_secs: 30,
            rescan_grace_secs: 60,
            quiet_window_secs: 10,
            poll_interval_secs: 5,
            rescan_interval_secs: 600,
            excluded_sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub inotify_poll_timeout_secs: u64,
    pub merge_interval_secs: u64,
    pub startup_rescan_enabled: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            inotify_poll_timeout_secs: 1,
            merge_interval_secs: 300,
            startup_rescan_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub mergerfs_binary: String,
    pub mergerfs_options_base: String,
    pub fusermount_binary: String,
    pub findmnt_binary: String,
    pub command_timeout_secs: u64,
    pub readiness_timeout_secs: u64,
    pub mount_snapshot_timeout_secs: u64,
    pub high_priority_wrapper: Vec<String>,
    pub max_consecutive_mount_failures: u32,
    pub coalescer_min_interval_secs: u64,
    pub coalescer_retry_delay_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            mergerfs_binary: "mergerfs".to_string(),
            mergerfs_options_base: "cache.files=partial,dropcacheonclose=true".to_string(),
            fusermount_binary: "fusermount3".to_string(),
            findmnt_binary: "findmnt".to_string(),
            command_timeout_secs: 15,
            readiness_timeout_secs: 5,
            mount_snapshot_timeout_secs: 5,
            high_priority_wrapper: Vec::new(),
            max_consecutive_mount_failures: 3,
            coalescer_min_interval_secs: 5,
            coalescer_retry_delay_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    pub stop_timeout_secs: u64,
    pub lockfile_path: Option<PathBuf>,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 20,
            lockfile_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSettings {
    pub log_filter: String,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MangaEquivalentsEntry {
    pub canonical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MangaEquivalents {
    #[serde(default)]
    pub groups: Vec<MangaEquivalentsEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcePriority {
    #[serde(default)]
    pub ordered_source_names: Vec<String>,
}

/// Opaque from the core's perspective; reserved for the metadata-enrichment
/// subsystem spec.md explicitly leaves out of scope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SceneTags {
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Settings {
    pub fn load(config_root: &Path) -> Result<Self, ConfigError> {
        let path = config_root.join(CONFIG_FILE_NAME);
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let settings: Settings =
            toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("paths.sources_root", &self.paths.sources_root),
            ("paths.override_root", &self.paths.override_root),
            ("paths.merged_root", &self.paths.merged_root),
            ("paths.branch_links_root", &self.paths.branch_links_root),
        ] {
            if value.as_os_str().is_empty() {
                return Err(ConfigError::InvalidSetting {
                    field,
                    reason: "path must not be empty".to_string(),
                });
            }
            if !value.is_absolute() {
                return Err(ConfigError::InvalidSetting {
                    field,
                    reason: "path must be absolute".to_string(),
                });
            }
        }
        if self.rename.delay_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "rename.delay_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.scan.inotify_poll_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "scan.inotify_poll_timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.runtime.mergerfs_binary.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "runtime.mergerfs_binary",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn to_trigger_pipeline_options(&self) -> TriggerPipelineOptions {
        TriggerPipelineOptions {
            sources_root: self.paths.sources_root.clone(),
            override_root: self.paths.override_root.clone(),
            inotify_poll_timeout: Duration::from_secs(self.scan.inotify_poll_timeout_secs),
            rename_poll_interval: Duration::from_secs(self.rename.poll_interval_secs),
            rename_rescan_interval: Duration::from_secs(self.rename.rescan_interval_secs),
            merge_interval: Duration::from_secs(self.scan.merge_interval_secs),
            startup_rescan_enabled: self.scan.startup_rescan_enabled,
        }
    }

    pub fn to_chapter_rename_options(&self) -> ChapterRenameOptions {
        ChapterRenameOptions {
            sources_root: self.paths.sources_root.clone(),
            excluded_sources: self.rename.excluded_sources.clone(),
            rename_delay: Duration::from_secs(self.rename.delay_secs),
            rename_rescan_grace: Duration::from_secs(self.rename.rescan_grace_secs),
            rename_quiet_window: Duration::from_secs(self.rename.quiet_window_secs),
        }
    }

    pub fn to_merge_workflow_options(&self) -> MergeWorkflowOptions {
        MergeWorkflowOptions {
            sources_root: self.paths.sources_root.clone(),
            override_root: self.paths.override_root.clone(),
            merged_root: self.paths.merged_root.clone(),
            branch_links_root: self.paths.branch_links_root.clone(),
            max_consecutive_mount_failures: self.runtime.max_consecutive_mount_failures,
        }
    }

    pub fn to_mount_snapshot_options(&self) -> MountSnapshotOptions {
        MountSnapshotOptions {
            command: self.runtime.findmnt_binary.clone(),
            arguments: vec![
                "-o".to_string(),
                "TARGET,FSTYPE,SOURCE,OPTIONS".to_string(),
                "-t".to_string(),
                "fuse.mergerfs".to_string(),
                "-P".to_string(),
            ],
            timeout: Duration::from_secs(self.runtime.mount_snapshot_timeout_secs),
        }
    }

    pub fn to_mount_command_options(&self) -> MountCommandOptions {
        MountCommandOptions {
            mergerfs_binary: self.runtime.mergerfs_binary.clone(),
            mergerfs_options_base: self.runtime.mergerfs_options_base.clone(),
            fusermount_binary: self.runtime.fusermount_binary.clone(),
            command_timeout: Duration::from_secs(self.runtime.command_timeout_secs),
            readiness_timeout: Duration::from_secs(self.runtime.readiness_timeout_secs),
            high_priority_wrapper: self.runtime.high_priority_wrapper.clone(),
            high_priority_kinds: vec![ActionKind::Mount, ActionKind::Remount],
        }
    }

    pub fn to_supervisor_options(&self, config_root: &Path) -> SupervisorOptions {
        let lockfile_path = self
            .shutdown
            .lockfile_path
            .clone()
            .unwrap_or_else(|| config_root.join("sourcemerged.lock"));
        SupervisorOptions {
            lockfile_path,
            stop_timeout: Duration::from_secs(self.shutdown.stop_timeout_secs),
            tick_interval: Duration::from_secs(1),
        }
    }

    pub fn coalescer_min_interval(&self) -> Duration {
        Duration::from_secs(self.runtime.coalescer_min_interval_secs)
    }

    pub fn coalescer_retry_delay(&self) -> Duration {
        Duration::from_secs(self.runtime.coalescer_retry_delay_secs)
    }

}
