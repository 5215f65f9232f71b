//! Configuration model for the deploy dispatcher.
//!
//! The config file is a JSON document (`projects.json` style) and is
//! reloaded in full on every inbound webhook, so edits take effect without
//! a restart. Loading always produces a complete, validated snapshot; a
//! snapshot is never mutated after it is handed out.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{HookError, Result};

const DEFAULT_WEBHOOK_PORT: u16 = 4000;
const DEFAULT_WEBHOOK_PATH: &str = "/github";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub projects: Vec<ProjectSpec>,
    #[serde(default)]
    pub tunnel: TunnelConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_path")]
    pub path: String,
    /// Empty secret disables signature verification entirely.
    #[serde(default)]
    pub secret: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_WEBHOOK_PORT,
            path: DEFAULT_WEBHOOK_PATH.to_string(),
            secret: String::new(),
        }
    }
}

/// Credentials used by the commit-status reporter.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GithubConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// Override for the API base URL. Defaults to https://api.github.com
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    pub name: String,
    /// Full repository identifier, e.g. "org/app". Matched exactly.
    pub repo: String,
    /// Branch filter. Absent or empty matches every branch of the repo.
    #[serde(default)]
    pub branch: Option<String>,
    /// Working directory for the deploy process. Defaults to the server's cwd.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    pub deploy_script: String,
    #[serde(default)]
    pub deploy_args: Vec<String>,
    /// Extra environment variables for the deploy process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Name of the environment variable consulted first when resolving a
    /// status token for this project. Defaults to GITHUB_TOKEN.
    #[serde(default)]
    pub credentials_scope: Option<String>,
    /// Published hostname settings, consumed by the tunnel-sync binary.
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
}

impl ProjectSpec {
    /// Returns the branch filter, treating an empty string the same as
    /// an absent filter (match any branch).
    pub fn branch_filter(&self) -> Option<&str> {
        self.branch.as_deref().filter(|b| !b.is_empty())
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.as_deref().unwrap_or(Path::new("."))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Name of the tunnel profile this hostname belongs to.
    pub profile: String,
    pub subdomain: String,
    pub local_port: u16,
    #[serde(default)]
    pub local_path: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TunnelConfig {
    #[serde(default)]
    pub profiles: HashMap<String, TunnelProfile>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TunnelProfile {
    pub root_domain: String,
    /// Routing-table document updated in place by tunnel-sync.
    pub config_file: PathBuf,
    pub tunnel_name: String,
    #[serde(default)]
    pub service_name: Option<String>,
}

impl Config {
    /// Load and validate the configuration file.
    pub fn load(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path).map_err(|e| {
            HookError::ConfigError(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = serde_json::from_str(&raw).map_err(|e| {
            HookError::ConfigError(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.webhook.path.starts_with('/') {
            return Err(HookError::ConfigError(format!(
                "webhook.path must start with '/', got '{}'",
                self.webhook.path
            )));
        }
        for (idx, project) in self.projects.iter().enumerate() {
            if project.name.is_empty() {
                return Err(HookError::ConfigError(format!(
                    "projects[{}]: 'name' must not be empty",
                    idx
                )));
            }
            if project.repo.is_empty() {
                return Err(HookError::ConfigError(format!(
                    "projects[{}] ('{}'): 'repo' must not be empty",
                    idx, project.name
                )));
            }
            if project.deploy_script.is_empty() {
                return Err(HookError::ConfigError(format!(
                    "projects[{}] ('{}'): 'deployScript' must not be empty",
                    idx, project.name
                )));
            }
        }
        Ok(())
    }
}

fn default_port() -> u16 {
    DEFAULT_WEBHOOK_PORT
}

fn default_path() -> String {
    DEFAULT_WEBHOOK_PATH.to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(json: &str) -> Config {
        let config: Config = serde_json::from_str(json).expect("config should parse");
        config.validate().expect("config should validate");
        config
    }

    #[test]
    fn defaults_applied_when_webhook_section_missing() {
        let config = parse(r#"{ "projects": [] }"#);
        assert_eq!(config.webhook.port, 4000);
        assert_eq!(config.webhook.path, "/github");
        assert!(config.webhook.secret.is_empty());
    }

    #[test]
    fn full_project_entry_parses() {
        let config = parse(
            r#"{
                "webhook": { "port": 9000, "path": "/hooks/gh", "secret": "s3cret" },
                "projects": [{
                    "name": "app",
                    "repo": "org/app",
                    "branch": "main",
                    "workDir": "/srv/app",
                    "deployScript": "./deploy.sh",
                    "deployArgs": ["--fast"],
                    "env": { "NODE_ENV": "production" },
                    "credentialsScope": "APP_TOKEN"
                }]
            }"#,
        );
        let project = &config.projects[0];
        assert_eq!(config.webhook.port, 9000);
        assert_eq!(project.repo, "org/app");
        assert_eq!(project.branch_filter(), Some("main"));
        assert_eq!(project.work_dir(), Path::new("/srv/app"));
        assert_eq!(project.deploy_args, vec!["--fast"]);
        assert_eq!(project.credentials_scope.as_deref(), Some("APP_TOKEN"));
    }

    #[test]
    fn empty_branch_filter_means_match_any() {
        let config = parse(
            r#"{ "projects": [
                { "name": "a", "repo": "org/a", "branch": "", "deployScript": "x" },
                { "name": "b", "repo": "org/b", "deployScript": "x" }
            ] }"#,
        );
        assert_eq!(config.projects[0].branch_filter(), None);
        assert_eq!(config.projects[1].branch_filter(), None);
    }

    #[test]
    fn relative_webhook_path_is_rejected() {
        let config: Config = serde_json::from_str(
            r#"{ "webhook": { "path": "github" }, "projects": [] }"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_repo_is_rejected() {
        let config: Config = serde_json::from_str(
            r#"{ "projects": [{ "name": "a", "repo": "", "deployScript": "x" }] }"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_and_validates_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "projects": [{{ "name": "a", "repo": "org/a", "deployScript": "/bin/true" }}] }}"#
        )
        .unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.projects.len(), 1);
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = Config::load(Path::new("/nonexistent/projects.json")).unwrap_err();
        assert!(matches!(err, HookError::ConfigError(_)));
    }
}
