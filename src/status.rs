//! Commit-status reporting back to the source-control host.
//!
//! Reporting is strictly best-effort: a missing credential is a logged
//! no-op and a network or API failure is logged and swallowed. Nothing in
//! this module can affect a deploy outcome or a webhook response.

use reqwest::Client;
use serde_json::json;
use std::fs;
use tracing::{info, warn};

use crate::config::{GithubConfig, ProjectSpec};

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";
const USER_AGENT: &str = concat!("hookdeploy/", env!("CARGO_PKG_VERSION"));

/// Commit states understood by the GitHub status API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// Deploy process launched and still running.
    Pending,
    /// Deploy process exited 0.
    Success,
    /// Deploy process exited non-zero.
    Failure,
    /// Deploy process could not be spawned.
    Error,
}

impl CommitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Failure => "failure",
            CommitState::Error => "error",
        }
    }
}

/// Resolves an access token for a project: the environment variable named
/// by the project's credentials scope, then the config token, then the
/// config token file. Returns None when the whole chain comes up empty.
pub fn resolve_token(github: &GithubConfig, scope: Option<&str>) -> Option<String> {
    let env_name = scope.unwrap_or(DEFAULT_TOKEN_ENV);
    if let Ok(token) = std::env::var(env_name) {
        if !token.trim().is_empty() {
            return Some(token.trim().to_string());
        }
    }

    if let Some(token) = &github.token {
        if !token.trim().is_empty() {
            return Some(token.trim().to_string());
        }
    }

    if let Some(path) = &github.token_file {
        if let Ok(contents) = fs::read_to_string(path) {
            let token = contents.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    None
}

pub struct StatusReporter {
    client: Client,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Posts one commit-status update. Fire-and-forget: every failure path
    /// is logged here and never propagated.
    pub async fn report(
        &self,
        github: &GithubConfig,
        project: &ProjectSpec,
        sha: &str,
        state: CommitState,
        description: &str,
    ) {
        let Some(token) = resolve_token(github, project.credentials_scope.as_deref()) else {
            info!(
                project = %project.name,
                "No status credential found (env, config, token file); skipping commit status"
            );
            return;
        };

        let api_url = github.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
        let url = format!(
            "{}/repos/{}/statuses/{}",
            api_url.trim_end_matches('/'),
            project.repo,
            sha
        );
        let body = json!({
            "state": state.as_str(),
            "description": description,
            "context": format!("deploy/{}", project.name),
        });

        match self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .json(&body)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!(
                    project = %project.name,
                    sha,
                    state = state.as_str(),
                    "Commit status updated"
                );
            }
            Ok(response) => {
                warn!(
                    project = %project.name,
                    sha,
                    status = %response.status(),
                    "Commit status update rejected"
                );
            }
            Err(e) => {
                warn!(project = %project.name, sha, "Commit status update failed: {}", e);
            }
        }
    }
}
