use anyhow::{bail, Context, Result};
use bids_core::{MergePolicy, SessionPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Run settings as read from a TOML file. Command-line flags override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub schema: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub allow_conflicts: bool,
    pub session_required: bool,
    pub empty_text_is_absent: bool,
    pub jobs: usize,
    pub log_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            schema: None,
            output: None,
            allow_conflicts: false,
            session_required: true,
            empty_text_is_absent: false,
            jobs: 1,
            log_dir: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl RunConfig {
    pub fn session_policy(&self) -> SessionPolicy {
        if self.session_required {
            SessionPolicy::Required
        } else {
            SessionPolicy::Optional
        }
    }

    pub fn merge_policy(&self) -> MergePolicy {
        MergePolicy {
            empty_text_is_absent: self.empty_text_is_absent,
        }
    }

    pub fn schema_path(&self) -> Result<&Path> {
        match self.schema.as_deref() {
            Some(path) => Ok(path),
            None => bail!("no participant schema configured (use --schema or `schema = ...`)"),
        }
    }

    pub fn output_dir(&self) -> Result<&Path> {
        match self.output.as_deref() {
            Some(path) => Ok(path),
            None => bail!("no output directory configured (use --output or `output = ...`)"),
        }
    }
}

/// Reads a config file; no path means defaults.
pub fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: RunConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    if config.jobs == 0 {
        bail!("jobs must be at least 1 in {}", path.display());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_gives_defaults() {
        let config = load_config(None).expect("defaults");
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.session_policy(), SessionPolicy::Required);
        assert!(config.schema_path().is_err());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bids.toml");
        fs::write(
            &path,
            "schema = \"participants.json\"\nallow_conflicts = true\nsession_required = false\n",
        )
        .expect("write config");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(
            config.schema_path().expect("schema"),
            Path::new("participants.json")
        );
        assert!(config.allow_conflicts);
        assert_eq!(config.session_policy(), SessionPolicy::Optional);
        assert_eq!(config.jobs, 1);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn invalid_files_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bids.toml");
        fs::write(&path, "jobs = \"many\"\n").expect("write config");
        assert!(load_config(Some(&path)).is_err());

        fs::write(&path, "jobs = 0\n").expect("write config");
        assert!(load_config(Some(&path)).is_err());
    }
}
