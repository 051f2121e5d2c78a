//! Bot configuration stored in `citybot.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Bot configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to values that
/// work against a local emulator; only the detection API key has no usable
/// default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CitybotConfig {
    pub vision: VisionConfig,
    pub adb: AdbConfig,
    pub cycle: CycleConfig,
    pub tasks: TaskSettings,
    /// Game instances keyed by instance id (the ledger key).
    pub instances: BTreeMap<String, InstanceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VisionConfig {
    pub api_key: String,
    /// Base URL of the hosted inference API; the model id is appended.
    pub endpoint: String,
    pub gameplay_model_id: String,
    pub tutorial_model_id: String,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "https://detect.roboflow.com".to_string(),
            gameplay_model_id: "rok_gameplay/1".to_string(),
            tutorial_model_id: "rok_tutorial/1".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdbConfig {
    /// `adb` executable (looked up on `PATH` when not absolute).
    pub path: String,
    pub command_timeout_secs: u64,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            path: "adb".to_string(),
            command_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CycleConfig {
    /// Pause between main-loop cycles.
    pub refresh_interval_ms: u64,
    /// Upper bound on tutorial-loop iterations before giving up.
    pub tutorial_max_iterations: u32,
    pub tree_clearing_max_attempts: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1000,
            tutorial_max_iterations: 500,
            tree_clearing_max_attempts: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskSettings {
    /// Ignore side quests and only claim the main quest.
    pub claim_only_main_quest: bool,
    /// How long a skipped build task waits before it is retried.
    pub build_skip_cooldown_secs: u64,
    /// Upper bound on build tasks attempted in one cycle.
    pub max_builds_per_cycle: u32,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            claim_only_main_quest: false,
            build_skip_cooldown_secs: 600,
            max_builds_per_cycle: 2,
        }
    }
}

impl TaskSettings {
    pub fn skip_cooldown(&self) -> TimeDelta {
        i64::try_from(self.build_skip_cooldown_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstanceConfig {
    /// ADB serial of the device (`adb devices`).
    pub device_id: String,
    pub preferred_civilization: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            device_id: "emulator-5554".to_string(),
            preferred_civilization: "china".to_string(),
        }
    }
}

impl CitybotConfig {
    /// Configuration written by `citybot init`.
    pub fn starter() -> Self {
        let mut cfg = Self::default();
        cfg.instances
            .insert("instance1".to_string(), InstanceConfig::default());
        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.cycle.refresh_interval_ms == 0 {
            return Err(anyhow!("cycle.refresh_interval_ms must be > 0"));
        }
        if self.vision.timeout_secs == 0 {
            return Err(anyhow!("vision.timeout_secs must be > 0"));
        }
        if self.adb.command_timeout_secs == 0 {
            return Err(anyhow!("adb.command_timeout_secs must be > 0"));
        }
        if self.adb.path.trim().is_empty() {
            return Err(anyhow!("adb.path must be non-empty"));
        }
        if self.tasks.max_builds_per_cycle == 0 {
            return Err(anyhow!("tasks.max_builds_per_cycle must be > 0"));
        }
        for (id, instance) in &self.instances {
            if instance.device_id.trim().is_empty() {
                return Err(anyhow!("instances.{id}.device_id must be non-empty"));
            }
        }
        Ok(())
    }

    /// Checks that only matter once the bot talks to the detection service.
    pub fn validate_for_run(&self) -> Result<()> {
        self.validate()?;
        if self.vision.api_key.trim().is_empty() {
            return Err(anyhow!("vision.api_key must be set to run the bot"));
        }
        if self.vision.gameplay_model_id.trim().is_empty()
            || self.vision.tutorial_model_id.trim().is_empty()
        {
            return Err(anyhow!("vision model ids must be non-empty"));
        }
        Ok(())
    }

    pub fn instance(&self, id: &str) -> Result<&InstanceConfig> {
        self.instances
            .get(id)
            .with_context(|| format!("instance {id:?} is not configured"))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.cycle.refresh_interval_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CitybotConfig::default()`.
pub fn load_config(path: &Path) -> Result<CitybotConfig> {
    if !path.exists() {
        let cfg = CitybotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CitybotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CitybotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, "toml.tmp", &buf)
}
