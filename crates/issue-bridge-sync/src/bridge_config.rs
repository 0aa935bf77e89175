use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use issue_bridge_github::RepoRef;
use serde::Deserialize;
use thiserror::Error;

use crate::labels::LabelPolicy;

pub const DEFAULT_FALLBACK_LABEL_PREFIX: &str = "discord/tag/";
pub const DEFAULT_STATE_FILE: &str = "tmp/discord_issue_bridge_state.json";
pub const DEFAULT_MAX_THREADS_PER_RUN: usize = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config is missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
    #[error("config key discord_channel_id cannot be empty")]
    EmptyChannel,
    #[error("config key max_threads_per_run must be greater than 0")]
    ZeroThreadCap,
    #[error("config key github_repo is invalid: {0}")]
    InvalidRepo(#[source] issue_bridge_github::GithubError),
}

/// Scalar keys written either as JSON strings or numbers (Discord ids).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScalarText {
    Text(String),
    Number(serde_json::Number),
}

impl ScalarText {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawBridgeConfig {
    discord_channel_id: Option<ScalarText>,
    github_repo: Option<String>,
    issue_title_prefix: Option<String>,
    issue_body_template: Option<String>,
    #[serde(default)]
    default_labels: Vec<String>,
    #[serde(default)]
    tag_label_map: BTreeMap<String, Vec<String>>,
    fallback_label_prefix: Option<String>,
    #[serde(default)]
    assignees: Vec<String>,
    state_file: Option<PathBuf>,
    state_backup_enabled: Option<bool>,
    max_threads_per_run: Option<usize>,
}

/// Validated static policy for one bridge deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub discord_channel_id: String,
    pub github_repo: RepoRef,
    pub issue_title_prefix: String,
    pub issue_body_template: String,
    pub default_labels: Vec<String>,
    pub tag_label_map: BTreeMap<String, Vec<String>>,
    pub fallback_label_prefix: String,
    pub assignees: Vec<String>,
    /// Absolute, or relative to the directory holding the config file.
    pub state_file: PathBuf,
    pub state_backup_enabled: bool,
    pub max_threads_per_run: usize,
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: RawBridgeConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let base_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self::from_raw(parsed, base_dir)
    }

    /// Parses a config document whose relative `state_file` resolves against
    /// `base_dir`.
    pub fn from_json_str(raw: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let parsed: RawBridgeConfig =
            serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<inline>"),
                source,
            })?;
        Self::from_raw(parsed, base_dir)
    }

    fn from_raw(raw: RawBridgeConfig, base_dir: &Path) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        if raw.discord_channel_id.is_none() {
            missing.push("discord_channel_id");
        }
        if raw.github_repo.is_none() {
            missing.push("github_repo");
        }
        if raw.issue_title_prefix.is_none() {
            missing.push("issue_title_prefix");
        }
        if raw.issue_body_template.is_none() {
            missing.push("issue_body_template");
        }
        let (Some(channel), Some(repo), Some(title_prefix), Some(body_template)) = (
            raw.discord_channel_id,
            raw.github_repo,
            raw.issue_title_prefix,
            raw.issue_body_template,
        ) else {
            return Err(ConfigError::MissingKeys(
                missing.into_iter().map(ToOwned::to_owned).collect(),
            ));
        };

        let discord_channel_id = channel.into_string().trim().to_string();
        if discord_channel_id.is_empty() {
            return Err(ConfigError::EmptyChannel);
        }
        let github_repo = RepoRef::parse(&repo).map_err(ConfigError::InvalidRepo)?;
        let max_threads_per_run = raw
            .max_threads_per_run
            .unwrap_or(DEFAULT_MAX_THREADS_PER_RUN);
        if max_threads_per_run == 0 {
            return Err(ConfigError::ZeroThreadCap);
        }
        let state_file = raw
            .state_file
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE));
        let state_file = if state_file.is_absolute() {
            state_file
        } else {
            base_dir.join(state_file)
        };

        Ok(Self {
            discord_channel_id,
            github_repo,
            issue_title_prefix: title_prefix,
            issue_body_template: body_template,
            default_labels: raw.default_labels,
            tag_label_map: raw.tag_label_map,
            fallback_label_prefix: raw
                .fallback_label_prefix
                .unwrap_or_else(|| DEFAULT_FALLBACK_LABEL_PREFIX.to_string()),
            assignees: raw.assignees,
            state_file,
            state_backup_enabled: raw.state_backup_enabled.unwrap_or(true),
            max_threads_per_run,
        })
    }

    pub fn label_policy(&self) -> LabelPolicy {
        LabelPolicy {
            default_labels: self.default_labels.clone(),
            tag_label_map: self.tag_label_map.clone(),
            fallback_label_prefix: self.fallback_label_prefix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;
    use tempfile::tempdir;

    use super::{BridgeConfig, ConfigError, DEFAULT_MAX_THREADS_PER_RUN};

    fn minimal() -> serde_json::Value {
        json!({
            "discord_channel_id": 1234567890,
            "github_repo": "acme/widgets",
            "issue_title_prefix": "[Discord] ",
            "issue_body_template": "{{content}}"
        })
    }

    #[test]
    fn unit_optional_keys_take_defaults() {
        let config =
            BridgeConfig::from_json_str(&minimal().to_string(), Path::new("/etc/bridge"))
                .expect("config");
        assert_eq!(config.discord_channel_id, "1234567890");
        assert_eq!(config.github_repo.as_slug(), "acme/widgets");
        assert!(config.default_labels.is_empty());
        assert!(config.tag_label_map.is_empty());
        assert_eq!(config.fallback_label_prefix, "discord/tag/");
        assert!(config.assignees.is_empty());
        assert!(config.state_backup_enabled);
        assert_eq!(config.max_threads_per_run, DEFAULT_MAX_THREADS_PER_RUN);
        assert_eq!(
            config.state_file,
            Path::new("/etc/bridge/tmp/discord_issue_bridge_state.json")
        );
    }

    #[test]
    fn functional_load_resolves_state_file_next_to_config() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("bridge.json");
        let mut document = minimal();
        document["state_file"] = json!("state/ledger.json");
        document["tag_label_map"] = json!({"7": ["bug"]});
        document["max_threads_per_run"] = json!(5);
        std::fs::write(&path, document.to_string()).expect("write");

        let config = BridgeConfig::load(&path).expect("config");

        assert_eq!(config.state_file, temp.path().join("state/ledger.json"));
        assert_eq!(config.max_threads_per_run, 5);
        assert_eq!(config.label_policy().tag_label_map["7"], vec!["bug"]);
    }

    #[test]
    fn regression_all_missing_required_keys_are_reported_together() {
        let error = BridgeConfig::from_json_str(r#"{"github_repo": "acme/widgets"}"#, Path::new("."))
            .expect_err("missing keys");
        match error {
            ConfigError::MissingKeys(keys) => assert_eq!(
                keys,
                vec!["discord_channel_id", "issue_title_prefix", "issue_body_template"]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn regression_invalid_values_are_rejected_at_load() {
        let mut bad_repo = minimal();
        bad_repo["github_repo"] = json!("widgets");
        assert!(matches!(
            BridgeConfig::from_json_str(&bad_repo.to_string(), Path::new(".")),
            Err(ConfigError::InvalidRepo(_))
        ));

        let mut empty_channel = minimal();
        empty_channel["discord_channel_id"] = json!("  ");
        assert!(matches!(
            BridgeConfig::from_json_str(&empty_channel.to_string(), Path::new(".")),
            Err(ConfigError::EmptyChannel)
        ));

        let mut zero_cap = minimal();
        zero_cap["max_threads_per_run"] = json!(0);
        assert!(matches!(
            BridgeConfig::from_json_str(&zero_cap.to_string(), Path::new(".")),
            Err(ConfigError::ZeroThreadCap)
        ));
    }
}
