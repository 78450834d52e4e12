//! Controller configuration stored as TOML (default `planrunner.toml`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "planrunner.toml";

/// Controller configuration (TOML).
///
/// Missing fields fall back to the defaults below, so an empty file and a
/// missing file behave the same.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Handler re-dispatches allowed per plan run, shared by all steps.
    pub max_recovery_attempts: u32,

    /// Upper bound for a single step's handler call.
    pub step_timeout_secs: u64,

    /// Wall-clock budget for a whole plan run.
    pub plan_timeout_secs: u64,

    /// Truncate shell stdout/stderr beyond this many bytes.
    pub shell_output_limit_bytes: usize,

    pub shell: ShellConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    /// Interpreter prefix; the command string is appended as the last argument.
    pub program: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        let program = if cfg!(windows) {
            vec!["cmd".to_string(), "/C".to_string()]
        } else {
            vec!["sh".to_string(), "-c".to_string()]
        };
        Self { program }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_recovery_attempts: 3,
            step_timeout_secs: 5 * 60,
            plan_timeout_secs: 30 * 60,
            shell_output_limit_bytes: 100_000,
            shell: ShellConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.step_timeout_secs == 0 {
            return Err(anyhow!("step_timeout_secs must be > 0"));
        }
        if self.plan_timeout_secs == 0 {
            return Err(anyhow!("plan_timeout_secs must be > 0"));
        }
        if self.shell_output_limit_bytes == 0 {
            return Err(anyhow!("shell_output_limit_bytes must be > 0"));
        }
        if self.shell.program.is_empty() || self.shell.program[0].trim().is_empty() {
            return Err(anyhow!("shell.program must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ControllerConfig::default()`.
pub fn load_config(path: &Path) -> Result<ControllerConfig> {
    if !path.exists() {
        let cfg = ControllerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ControllerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ControllerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ControllerConfig::default());
        assert_eq!(cfg.max_recovery_attempts, 3);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("planrunner.toml");
        let cfg = ControllerConfig {
            max_recovery_attempts: 0,
            step_timeout_secs: 10,
            ..ControllerConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("planrunner.toml");
        fs::write(&path, "plan_timeout_secs = 60\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.plan_timeout_secs, 60);
        assert_eq!(cfg.step_timeout_secs, 300);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("planrunner.toml");
        fs::write(&path, "step_timeout_secs = 0\n").expect("write");
        let err = load_config(&path).expect_err("must reject");
        assert!(format!("{err:#}").contains("step_timeout_secs must be > 0"));
    }
}
